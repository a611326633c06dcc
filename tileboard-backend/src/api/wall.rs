use axum::{extract::State, response::Json};
use serde::Serialize;
use tileboard_core::types::{PaletteId, WALL_NAME};
use tileboard_core::StoreResult;

use super::{store_error, ApiResult};
use crate::state::AppState;
use crate::store::PaletteRepo;

const TARGET: &str = "tileboard.api.wall";

#[derive(Debug, Serialize)]
pub struct WallResponse {
    pub id: PaletteId,
}

/// Id of the wall entry, creating it when no entry named "wall" (any case)
/// exists. Lookup-then-create: two first requests racing each other can
/// both create one.
pub async fn ensure_wall_entry(repo: &PaletteRepo) -> StoreResult<PaletteId> {
    if let Some(existing) = repo.find_palette_by_name(WALL_NAME).await? {
        return Ok(existing.id);
    }
    let created = repo.insert_palette(WALL_NAME, None).await?;
    log::info!(target: TARGET, "Created wall entry {}", created.id);
    Ok(created.id)
}

/// GET /api/wall
pub async fn get_wall(State(state): State<AppState>) -> ApiResult<Json<WallResponse>> {
    let repo = state.repo().map_err(|e| store_error(TARGET, e))?;
    let id = ensure_wall_entry(&repo)
        .await
        .map_err(|e| store_error(TARGET, e))?;
    Ok(Json(WallResponse { id }))
}
