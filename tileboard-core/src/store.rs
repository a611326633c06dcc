/// Seams between a board session and the outside world.
///
/// `BoardStore` is the row API the client reads and paints through with the
/// public key. `WriteApi` reaches the privileged write endpoints.
/// `Broadcaster` sends best-effort hints to other clients.
use std::future::Future;

use crate::error::StoreResult;
use crate::events::BroadcastMessage;
use crate::types::{Cell, CellId, PaletteEntry, PaletteId};

pub trait BoardStore: Send + Sync {
    /// All persisted cells ordered by (y, x), palette join included.
    fn fetch_cells(&self) -> impl Future<Output = StoreResult<Vec<Cell>>> + Send;

    /// One cell with its palette join.
    fn fetch_cell(&self, id: CellId) -> impl Future<Output = StoreResult<Cell>> + Send;

    /// All palette entries, newest first.
    fn fetch_palettes(&self) -> impl Future<Output = StoreResult<Vec<PaletteEntry>>> + Send;

    fn create_cell(
        &self,
        x: u32,
        y: u32,
        palette_id: Option<PaletteId>,
    ) -> impl Future<Output = StoreResult<Cell>> + Send;

    fn update_cell(
        &self,
        id: CellId,
        palette_id: Option<PaletteId>,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn update_cells(
        &self,
        ids: &[CellId],
        palette_id: Option<PaletteId>,
    ) -> impl Future<Output = StoreResult<()>> + Send;
}

/// File handed to the upload endpoint.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub name: Option<String>,
}

pub trait WriteApi: Send + Sync {
    /// Id of the wall entry, created server-side when missing.
    fn ensure_wall(&self) -> impl Future<Output = StoreResult<PaletteId>> + Send;

    fn delete_palette(&self, id: &str) -> impl Future<Output = StoreResult<()>> + Send;

    fn upload_palette(
        &self,
        upload: UploadRequest,
    ) -> impl Future<Output = StoreResult<PaletteEntry>> + Send;
}

pub trait Broadcaster: Send + Sync {
    /// Fire and forget. Delivery is not acknowledged.
    fn send(&self, message: BroadcastMessage);
}

/// Broadcaster for sessions with no other clients to notify.
pub struct NoBroadcast;

impl Broadcaster for NoBroadcast {
    fn send(&self, _message: BroadcastMessage) {}
}
