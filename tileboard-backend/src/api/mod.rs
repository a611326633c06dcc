use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tileboard_core::StoreError;

mod events;
pub mod palette;
pub mod upload;
pub mod wall;

use crate::state::AppState;

/// Axum REST API routes.
///
///   GET    /api/wall              -> id of the wall entry (created when missing)
///   POST   /api/upload            -> multipart `file` (+ `name`) -> new palette entry
///   DELETE /api/palette/:id       -> clear cell references, remove file, remove entry
///   GET    /api/palette/:id       -> diagnostic probe
///   GET    /status                -> health check
///   GET    /logs                  -> recent log lines
///   GET    /logs/stream           -> SSE stream of log lines
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/wall", get(wall::get_wall))
        .route("/api/upload", post(upload::upload_palette))
        .route(
            "/api/palette/{id}",
            get(palette::probe_palette).delete(palette::delete_palette),
        )
        .route("/status", get(events::status))
        .route("/logs", get(events::list_logs))
        .route("/logs/stream", get(events::stream_logs))
}

// ── Shared types and helpers used across sub-modules ────────────────────

/// Every failure leaves the API as this JSON shape.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: message.into(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn api_error(status: StatusCode, target: &'static str, message: impl Into<String>) -> ApiError {
    let message = message.into();
    log_api_issue(status, target, &message);
    (status, Json(ErrorResponse::new(message)))
}

/// Map a store failure to a response. Store messages go out verbatim.
pub fn store_error(target: &'static str, error: StoreError) -> ApiError {
    let status = match &error {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Network(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, target, error.to_string())
}

fn log_api_issue(status: StatusCode, target: &'static str, message: impl AsRef<str>) {
    let message = message.as_ref();
    if status.is_server_error() {
        log::error!(target: target, "{}", message);
    } else {
        log::warn!(target: target, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_shape() {
        let (status, Json(body)) = store_error("tileboard.test", StoreError::backend("boom"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "ok": false, "error": "boom" }));
    }

    #[test]
    fn test_config_error_is_server_error() {
        let (status, Json(body)) = store_error(
            "tileboard.test",
            StoreError::Config("Missing SUPABASE_URL or SUPABASE_SERVICE_ROLE".into()),
        );
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Missing SUPABASE_URL or SUPABASE_SERVICE_ROLE");
    }

    mod session_flow {
        use std::sync::Arc;

        use tileboard_core::store::{BoardStore, NoBroadcast, UploadRequest, WriteApi};
        use tileboard_core::types::{Appearance, Cell, CellId, PaletteEntry, PaletteId, Selection};
        use tileboard_core::{BoardSession, StoreResult};

        use crate::api::{palette, upload, wall};
        use crate::store::memory::MemoryStore;
        use crate::store::PaletteRepo;

        /// Session backend that calls the endpoint logic in-process.
        #[derive(Clone)]
        struct InProcess(Arc<PaletteRepo>);

        impl InProcess {
            fn memory(&self) -> &MemoryStore {
                match self.0.as_ref() {
                    PaletteRepo::Memory(store) => store,
                    PaletteRepo::Remote(_) => unreachable!(),
                }
            }
        }

        impl BoardStore for InProcess {
            async fn fetch_cells(&self) -> StoreResult<Vec<Cell>> {
                self.memory().fetch_cells().await
            }

            async fn fetch_cell(&self, id: CellId) -> StoreResult<Cell> {
                self.memory().fetch_cell(id).await
            }

            async fn fetch_palettes(&self) -> StoreResult<Vec<PaletteEntry>> {
                self.memory().fetch_palettes().await
            }

            async fn create_cell(
                &self,
                x: u32,
                y: u32,
                palette_id: Option<PaletteId>,
            ) -> StoreResult<Cell> {
                self.memory().create_cell(x, y, palette_id).await
            }

            async fn update_cell(&self, id: CellId, palette_id: Option<PaletteId>) -> StoreResult<()> {
                self.memory().update_cell(id, palette_id).await
            }

            async fn update_cells(
                &self,
                ids: &[CellId],
                palette_id: Option<PaletteId>,
            ) -> StoreResult<()> {
                self.memory().update_cells(ids, palette_id).await
            }
        }

        impl WriteApi for InProcess {
            async fn ensure_wall(&self) -> StoreResult<PaletteId> {
                wall::ensure_wall_entry(&self.0).await
            }

            async fn delete_palette(&self, id: &str) -> StoreResult<()> {
                palette::delete_palette_entry(&self.0, id).await
            }

            async fn upload_palette(&self, upload: UploadRequest) -> StoreResult<PaletteEntry> {
                let file = upload::UploadedFile {
                    file_name: upload.file_name,
                    content_type: upload.content_type,
                    bytes: upload.bytes,
                };
                upload::create_uploaded_palette(&self.0, "uploaded", file, upload.name.as_deref())
                    .await
            }
        }

        fn session() -> (InProcess, BoardSession<InProcess, InProcess, NoBroadcast>) {
            let backend = InProcess(Arc::new(PaletteRepo::Memory(MemoryStore::new())));
            let session = BoardSession::new(5, backend.clone(), backend.clone(), NoBroadcast);
            (backend, session)
        }

        #[tokio::test]
        async fn test_upload_paint_delete_leaves_cells_blank() {
            let (backend, mut session) = session();
            session.start().await;
            assert!(session.state().error().is_none());

            let entry = session
                .upload_palette(UploadRequest {
                    file_name: "art.png".into(),
                    bytes: vec![0x89, 0x50],
                    content_type: None,
                    name: None,
                })
                .await
                .unwrap();
            assert_eq!(entry.name.as_deref(), Some("art"));

            assert!(session.select_palette(&entry.id).await);
            for x in 1..4 {
                assert!(session.click(x, 2).await);
            }
            let painted = backend
                .memory()
                .cells()
                .into_iter()
                .filter(|c| c.references(&entry.id))
                .count();
            assert_eq!(painted, 3);

            assert!(session.delete_palette(&entry.id, |_| true).await);
            assert!(session.state().palettes().iter().all(|p| p.id != entry.id));
            assert!(backend.memory().palette(&entry.id).is_none());
            for x in 1..4 {
                let cell = session.state().cell_at(x, 2).unwrap();
                assert_eq!(session.state().appearance(&cell), Appearance::Blank);
            }
        }

        #[tokio::test]
        async fn test_dot_file_upload_gets_default_name() {
            let (_, mut session) = session();
            let entry = session
                .upload_palette(UploadRequest {
                    file_name: ".hidden".into(),
                    bytes: vec![1],
                    content_type: None,
                    name: None,
                })
                .await
                .unwrap();
            assert_eq!(entry.name.as_deref(), Some("palette"));
        }

        #[tokio::test]
        async fn test_wall_paint_persists_wall_reference() {
            let (backend, mut session) = session();
            session.start().await;
            let wall_id = session.state().wall_id().map(str::to_string).unwrap();
            assert_eq!(
                session.state().selection(),
                &Selection::Wall { wall_id: Some(wall_id.clone()) }
            );

            assert!(session.click(2, 2).await);
            let stored = backend
                .memory()
                .cells()
                .into_iter()
                .find(|c| c.x == 2 && c.y == 2)
                .unwrap();
            assert_eq!(stored.palette_id.as_deref(), Some(wall_id.as_str()));
            let cell = session.state().cell_at(2, 2).unwrap();
            assert_eq!(session.state().appearance(&cell), Appearance::Wall);
        }
    }
}
