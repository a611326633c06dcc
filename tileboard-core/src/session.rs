/// Board session: drives a `BoardState` against the store, the write
/// endpoints and the broadcast channel.
///
/// One session per mounted board. All mutation goes through `&mut self`, so
/// overlapping network completions are applied one at a time, each touching
/// one cell or one list.
use std::collections::VecDeque;

use tokio::sync::mpsc;

use crate::board::BoardState;
use crate::error::StoreError;
use crate::events::{BroadcastMessage, ChangeEvent, Followup, Inbound};
use crate::media;
use crate::store::{BoardStore, Broadcaster, UploadRequest, WriteApi};
use crate::types::{CellId, PaletteEntry, Selection};

const MAX_SENT_REFRESHES: usize = 32;

pub struct BoardSession<S, W, B> {
    state: BoardState,
    store: S,
    api: W,
    broadcaster: B,
    /// Timestamps of palette refreshes this session sent, to skip echoes.
    sent_refreshes: VecDeque<i64>,
}

impl<S, W, B> BoardSession<S, W, B>
where
    S: BoardStore,
    W: WriteApi,
    B: Broadcaster,
{
    pub fn new(size: u32, store: S, api: W, broadcaster: B) -> Self {
        Self {
            state: BoardState::new(size),
            store,
            api,
            broadcaster,
            sent_refreshes: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mount: resolve the wall entry, load the board, border it.
    pub async fn start(&mut self) {
        self.ensure_wall().await;
        self.load().await;
        self.auto_fill_edges().await;
    }

    /// Initial load of cells and palette entries. Whatever arrives is
    /// applied even when the other half failed.
    pub async fn load(&mut self) {
        let (cells, palettes) = tokio::join!(self.store.fetch_cells(), self.store.fetch_palettes());
        let cells = cells.unwrap_or_else(|e| {
            log::warn!(target: "tileboard.session", "Failed to load cells: {}", e);
            self.state.set_error(e.user_message());
            Vec::new()
        });
        let palettes = palettes.unwrap_or_else(|e| {
            log::warn!(target: "tileboard.session", "Failed to load palette: {}", e);
            self.state.set_error(e.user_message());
            Vec::new()
        });
        log::info!(
            target: "tileboard.session",
            "Loaded {} cells and {} palette entries",
            cells.len(),
            palettes.len()
        );
        self.state.load(cells, palettes);
    }

    pub async fn ensure_wall(&mut self) {
        match self.api.ensure_wall().await {
            Ok(id) => {
                log::debug!(target: "tileboard.session", "Wall entry is {}", id);
                self.state.set_wall_id(id);
            }
            Err(e) => {
                log::warn!(target: "tileboard.session", "Failed to prepare wall: {}", e);
                self.state.set_error(e.user_message());
            }
        }
    }

    /// Switch paint mode. Entering wall mode borders the board.
    pub async fn select(&mut self, selection: Selection) {
        self.state.select(selection);
        self.auto_fill_edges().await;
    }

    pub async fn select_palette(&mut self, id: &str) -> bool {
        let selected = self.state.select_palette(id);
        if selected {
            self.auto_fill_edges().await;
        }
        selected
    }

    /// Paint the cell at (x, y) with the current selection. Returns whether
    /// a write went through. A failed write leaves its overlay visible.
    pub async fn click(&mut self, x: u32, y: u32) -> bool {
        let Some(plan) = self.state.begin_paint(x, y) else {
            return false;
        };

        let written: Result<CellId, StoreError> = if plan.create {
            match self
                .store
                .create_cell(plan.x, plan.y, plan.palette_id.clone())
                .await
            {
                Ok(created) => {
                    let id = created.id;
                    self.state.adopt_created(plan.cell_id, created);
                    // The insert notification may have raced the response.
                    self.refetch_cell(id).await;
                    Ok(id)
                }
                Err(e) => Err(e),
            }
        } else {
            self.store
                .update_cell(plan.cell_id, plan.palette_id.clone())
                .await
                .map(|_| plan.cell_id)
        };

        match written {
            Ok(id) => {
                self.broadcaster.send(BroadcastMessage::CellUpdate { id });
                true
            }
            Err(e) => {
                log::warn!(
                    target: "tileboard.session",
                    "Paint at ({}, {}) failed: {}",
                    plan.x,
                    plan.y,
                    e
                );
                self.state.set_error(e.user_message());
                false
            }
        }
    }

    /// Authoritative re-fetch of one cell. Confirms it and drops its overlay.
    pub async fn refetch_cell(&mut self, id: CellId) {
        match self.store.fetch_cell(id).await {
            Ok(cell) => self.state.confirm_cell(cell),
            Err(StoreError::NotFound(_)) => self.state.remove_cell(id),
            Err(e) => {
                log::warn!(target: "tileboard.session", "Failed to re-fetch cell {}: {}", id, e);
            }
        }
    }

    pub async fn refresh_palettes(&mut self) {
        match self.store.fetch_palettes().await {
            Ok(palettes) => self.state.set_palettes(palettes),
            Err(e) => {
                log::warn!(target: "tileboard.session", "Failed to refresh palette: {}", e);
            }
        }
    }

    async fn run_followups(&mut self, followups: Vec<Followup>) {
        for followup in followups {
            match followup {
                Followup::RefetchCell(id) => self.refetch_cell(id).await,
                Followup::RefetchPalettes => self.refresh_palettes().await,
            }
        }
    }

    /// Absorb a change and run its re-fetches. Any cell re-fetch may have
    /// left an edge cell unassigned, so the border is refilled after it.
    pub async fn handle_change(&mut self, event: ChangeEvent) {
        let followups = self.state.absorb(event);
        let refetched_cell = followups
            .iter()
            .any(|f| matches!(f, Followup::RefetchCell(_)));
        self.run_followups(followups).await;
        if refetched_cell {
            self.auto_fill_edges().await;
        }
    }

    pub async fn handle_broadcast(&mut self, message: BroadcastMessage) {
        match message {
            BroadcastMessage::CellUpdate { id } => {
                self.refetch_cell(id).await;
                self.auto_fill_edges().await;
            }
            BroadcastMessage::PaletteListRefresh { at } => {
                if self.sent_refreshes.contains(&at) {
                    log::trace!(target: "tileboard.session", "Ignoring own palette refresh {}", at);
                    return;
                }
                self.refresh_palettes().await;
            }
        }
    }

    pub async fn handle(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Change(event) => self.handle_change(event).await,
            Inbound::Broadcast(message) => self.handle_broadcast(message).await,
        }
    }

    /// Process inbound messages until every sender is gone.
    pub async fn run(&mut self, inbound: &mut mpsc::Receiver<Inbound>) {
        while let Some(message) = inbound.recv().await {
            self.handle(message).await;
        }
        log::info!(target: "tileboard.session", "Inbound feed closed");
    }

    fn broadcast_palette_refresh(&mut self) {
        let message = BroadcastMessage::palette_refresh_now();
        if let BroadcastMessage::PaletteListRefresh { at } = message {
            self.sent_refreshes.push_back(at);
            while self.sent_refreshes.len() > MAX_SENT_REFRESHES {
                self.sent_refreshes.pop_front();
            }
        }
        self.broadcaster.send(message);
    }

    /// Delete a palette entry once `confirm` agrees. Cells referencing it go
    /// blank locally; other clients are told to refresh their list.
    pub async fn delete_palette<F>(&mut self, id: &str, confirm: F) -> bool
    where
        F: FnOnce(&PaletteEntry) -> bool,
    {
        let Some(entry) = self.state.palettes().iter().find(|p| p.id == id) else {
            log::warn!(target: "tileboard.session", "Unknown palette entry {}", id);
            return false;
        };
        if !confirm(entry) {
            return false;
        }

        match self.api.delete_palette(id).await {
            Ok(()) => {
                self.state.remove_palette(id);
                self.broadcast_palette_refresh();
                true
            }
            Err(e) => {
                log::warn!(target: "tileboard.session", "Failed to delete palette {}: {}", id, e);
                self.state
                    .set_error(format!("Delete failed: {}", e.user_message()));
                false
            }
        }
    }

    /// Upload an image as a new palette entry named after the file.
    pub async fn upload_palette(&mut self, mut upload: UploadRequest) -> Option<PaletteEntry> {
        if upload.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            upload.name = Some(media::display_name(&upload.file_name)).filter(|n| !n.is_empty());
        }
        match self.api.upload_palette(upload).await {
            Ok(entry) => {
                self.state.add_palette(entry.clone());
                self.broadcast_palette_refresh();
                Some(entry)
            }
            Err(e) => {
                log::warn!(target: "tileboard.session", "Upload failed: {}", e);
                self.state
                    .set_error(format!("Upload failed: {}", e.user_message()));
                None
            }
        }
    }

    /// Paint unassigned outer-ring cells with the wall while wall mode is
    /// active and the wall id is known.
    pub async fn auto_fill_edges(&mut self) {
        let Selection::Wall {
            wall_id: Some(wall_id),
        } = self.state.selection().clone()
        else {
            return;
        };
        let targets = self.state.edge_fill_targets();
        if targets.is_empty() {
            return;
        }
        match self.store.update_cells(&targets, Some(wall_id.clone())).await {
            Ok(()) => {
                log::info!(target: "tileboard.session", "Walled {} edge cells", targets.len());
                self.state.assign_palette(&targets, Some(&wall_id));
            }
            Err(e) => {
                log::warn!(target: "tileboard.session", "Edge fill failed: {}", e);
                self.state.set_error(e.user_message());
            }
        }
    }
}
