use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::{json, Value};
use tileboard_core::{StoreError, StoreResult};

use super::{store_error, ApiResult};
use crate::state::AppState;
use crate::store::PaletteRepo;

const TARGET: &str = "tileboard.api.palette";

/// Remove a palette entry. Order matters: cell references are nulled before
/// the row goes, or the store's foreign key rejects the delete.
///
/// 1. look the entry up (for its image address)
/// 2. null every cell reference
/// 3. remove the stored image, when it lives in our bucket
/// 4. remove the row
pub async fn delete_palette_entry(repo: &PaletteRepo, id: &str) -> StoreResult<()> {
    let entry = repo
        .find_palette(id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("palette {}", id)))?;

    repo.clear_cell_refs(id).await?;

    if let Some(path) = entry.image_url.as_deref().and_then(|url| repo.object_path(url)) {
        repo.remove_object(&path).await?;
    }

    repo.delete_palette(id).await?;
    log::info!(target: TARGET, "Deleted palette entry {}", id);
    Ok(())
}

/// DELETE /api/palette/{id}
pub async fn delete_palette(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let repo = state.repo().map_err(|e| store_error(TARGET, e))?;
    delete_palette_entry(&repo, &id)
        .await
        .map_err(|e| store_error(TARGET, e))?;
    Ok(Json(json!({ "ok": true })))
}

/// GET /api/palette/{id} -- answers without touching the store.
pub async fn probe_palette(Path(id): Path<String>) -> Json<Value> {
    Json(json!({ "ok": true, "id": id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::store::memory::MemoryStore;
    use axum::http::StatusCode;

    fn seeded() -> (PaletteRepo, String) {
        let store = MemoryStore::new();
        store
            .put_object("uploaded/1-cat.png", vec![1, 2], "image/png")
            .unwrap();
        let repo = PaletteRepo::Memory(store);
        let url = repo.public_url("uploaded/1-cat.png");
        let PaletteRepo::Memory(store) = &repo else {
            unreachable!()
        };
        let cat = store.insert_palette("cat", Some(&url));
        for x in 0..3 {
            store.insert_cell(x, 0, Some(cat.id.clone())).unwrap();
        }
        (repo, cat.id)
    }

    #[tokio::test]
    async fn test_delete_referenced_entry_succeeds() {
        let (repo, id) = seeded();
        delete_palette_entry(&repo, &id).await.unwrap();

        let PaletteRepo::Memory(store) = &repo else {
            unreachable!()
        };
        assert!(store.palette(&id).is_none());
        assert!(store.cells().iter().all(|c| c.palette_id.is_none()));
        assert!(!store.has_object("uploaded/1-cat.png"));
    }

    #[tokio::test]
    async fn test_delete_unknown_entry_is_not_found() {
        let repo = PaletteRepo::Memory(MemoryStore::new());
        let err = delete_palette_entry(&repo, "ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_handler_reports_json() {
        let (repo, id) = seeded();
        let state = AppState::with_repo(ServerConfig::default(), repo);

        let Json(body) = delete_palette(State(state.clone()), Path(id.clone()))
            .await
            .unwrap();
        assert_eq!(body, json!({ "ok": true }));

        let (status, Json(err)) = delete_palette(State(state), Path(id))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!err.ok);
    }

    #[tokio::test]
    async fn test_probe_echoes_id() {
        let Json(body) = probe_palette(Path("abc".into())).await;
        assert_eq!(body, json!({ "ok": true, "id": "abc" }));
    }
}
