/// Client-side board state.
///
/// Two layers:
/// - authoritative cells and palette list, as last read from the store
/// - optimistic overlay, keyed by cell id, written on click and dropped when
///   the store confirms the cell
///
/// Rendering reads both through `appearance`, the single resolution point.
use std::collections::HashMap;

use crate::events::{ChangeEvent, ChangeKind, Followup, PaletteChange};
use crate::grid;
use crate::types::{
    Appearance, Cell, CellId, Paint, PaletteEntry, PaletteId, PaletteSnapshot, Selection,
};

/// Write a click turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaintPlan {
    pub cell_id: CellId,
    pub x: u32,
    pub y: u32,
    pub palette_id: Option<PaletteId>,
    /// The cell is a placeholder and needs a row created.
    pub create: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCell {
    pub cell: Cell,
    pub appearance: Appearance,
}

#[derive(Debug, Clone)]
pub struct BoardState {
    size: u32,
    cells: HashMap<CellId, Cell>,
    palettes: Vec<PaletteEntry>,
    overlay: HashMap<CellId, Paint>,
    selection: Selection,
    wall_id: Option<PaletteId>,
    error: Option<String>,
}

impl BoardState {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            cells: HashMap::new(),
            palettes: Vec::new(),
            overlay: HashMap::new(),
            selection: Selection::default(),
            wall_id: None,
            error: None,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn wall_id(&self) -> Option<&str> {
        self.wall_id.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn palettes(&self) -> &[PaletteEntry] {
        &self.palettes
    }

    /// Palette entries offered for selection. The wall has its own button.
    pub fn palette_panel(&self) -> Vec<&PaletteEntry> {
        self.palettes.iter().filter(|p| !p.is_wall()).collect()
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    pub fn persisted_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    pub fn overlay(&self, id: CellId) -> Option<&Paint> {
        self.overlay.get(&id)
    }

    pub fn pending_paints(&self) -> usize {
        self.overlay.len()
    }

    /// Cell at a coordinate: the persisted record or a placeholder.
    pub fn cell_at(&self, x: u32, y: u32) -> Option<Cell> {
        if !grid::in_bounds(x, y, self.size) {
            return None;
        }
        let persisted = self
            .cells
            .values()
            .filter(|c| c.x == x && c.y == y)
            .min_by_key(|c| c.id);
        Some(match persisted {
            Some(cell) => cell.clone(),
            None => grid::placeholder_cell(x, y, self.size),
        })
    }

    /// Replace the authoritative layer with a fresh load.
    pub fn load(&mut self, cells: Vec<Cell>, palettes: Vec<PaletteEntry>) {
        self.cells = cells
            .into_iter()
            .filter(|c| !c.is_placeholder())
            .map(|c| (c.id, c))
            .collect();
        self.palettes = palettes;
    }

    /// Record the wall entry id; an empty wall selection picks it up.
    pub fn set_wall_id(&mut self, id: PaletteId) {
        if let Selection::Wall { wall_id } = &mut self.selection {
            if wall_id.is_none() {
                *wall_id = Some(id.clone());
            }
        }
        self.wall_id = Some(id);
    }

    pub fn select(&mut self, selection: Selection) {
        self.selection = match selection {
            Selection::Wall { wall_id: None } => Selection::Wall {
                wall_id: self.wall_id.clone(),
            },
            other => other,
        };
    }

    /// Select an image palette entry by id. Entries without an image cannot
    /// be painted with and are refused.
    pub fn select_palette(&mut self, id: &str) -> bool {
        let Some(entry) = self.palettes.iter().find(|p| p.id == id) else {
            return false;
        };
        if entry.is_wall() {
            self.select(Selection::Wall { wall_id: None });
            return true;
        }
        match entry.image_url.clone() {
            Some(url) => {
                self.selection = Selection::Image {
                    id: entry.id.clone(),
                    url,
                };
                true
            }
            None => false,
        }
    }

    /// Apply the optimistic overlay for a click at (x, y) and return the
    /// write it implies. `None` when the coordinate is off the board or the
    /// selection has no target yet.
    pub fn begin_paint(&mut self, x: u32, y: u32) -> Option<PaintPlan> {
        let cell = self.cell_at(x, y)?;
        let palette_id = self.selection.target()?;
        self.overlay.insert(cell.id, self.selection.paint());
        Some(PaintPlan {
            cell_id: cell.id,
            x: cell.x,
            y: cell.y,
            palette_id,
            create: cell.is_placeholder(),
        })
    }

    /// Take over the row created for a placeholder. The pending overlay moves
    /// to the new id and stays until that id is confirmed.
    pub fn adopt_created(&mut self, placeholder: CellId, created: Cell) {
        if let Some(paint) = self.overlay.remove(&placeholder) {
            self.overlay.insert(created.id, paint);
        }
        self.cells.entry(created.id).or_insert(created);
    }

    /// Authoritative record for one cell. Always drops its overlay.
    pub fn confirm_cell(&mut self, cell: Cell) {
        self.overlay.remove(&cell.id);
        if !cell.is_placeholder() {
            self.cells.insert(cell.id, cell);
        }
    }

    pub fn insert_if_absent(&mut self, cell: Cell) -> bool {
        if cell.is_placeholder() || self.cells.contains_key(&cell.id) {
            return false;
        }
        self.cells.insert(cell.id, cell);
        true
    }

    pub fn remove_cell(&mut self, id: CellId) {
        self.cells.remove(&id);
        self.overlay.remove(&id);
    }

    pub fn set_palettes(&mut self, palettes: Vec<PaletteEntry>) {
        self.palettes = palettes;
    }

    /// Add a freshly uploaded entry at the front of the list.
    pub fn add_palette(&mut self, entry: PaletteEntry) {
        self.palettes.retain(|p| p.id != entry.id);
        self.palettes.insert(0, entry);
    }

    /// Drop an entry and every local reference to it.
    pub fn remove_palette(&mut self, id: &str) {
        self.palettes.retain(|p| p.id != id);
        self.clear_palette_refs(id);
        self.deselect_palette(id);
    }

    /// An image selection pointing at a vanished entry falls back to wall.
    fn deselect_palette(&mut self, id: &str) {
        if matches!(&self.selection, Selection::Image { id: sel, .. } if sel == id) {
            self.select(Selection::Wall { wall_id: None });
        }
    }

    /// Null the palette reference of every cell pointing at `id`.
    pub fn clear_palette_refs(&mut self, id: &str) -> usize {
        let mut cleared = 0;
        for cell in self.cells.values_mut().filter(|c| c.references(id)) {
            cell.clear_palette();
            cleared += 1;
        }
        cleared
    }

    /// Point cells at a palette entry after a bulk write. The snapshot is
    /// dropped so rendering resolves the entry through the palette list.
    pub fn assign_palette(&mut self, ids: &[CellId], palette_id: Option<&str>) {
        for id in ids {
            if let Some(cell) = self.cells.get_mut(id) {
                cell.palette_id = palette_id.map(str::to_string);
                cell.palette = None;
            }
        }
    }

    /// An entry lost its image: cells keep the reference but show nothing.
    fn blank_palette_image(&mut self, entry: &PaletteEntry) {
        for cell in self.cells.values_mut().filter(|c| c.references(&entry.id)) {
            cell.palette = Some(PaletteSnapshot {
                name: entry.name.clone(),
                image_url: None,
            });
        }
    }

    /// Fold a change notification into local state. Safe to call twice with
    /// the same event or out of order; returns the re-fetches to run.
    pub fn absorb(&mut self, event: ChangeEvent) -> Vec<Followup> {
        match event {
            ChangeEvent::CellInserted(cell) => {
                let id = cell.id;
                self.insert_if_absent(cell);
                vec![Followup::RefetchCell(id)]
            }
            ChangeEvent::CellUpdated { id } => vec![Followup::RefetchCell(id)],
            ChangeEvent::CellDeleted { id } => {
                self.remove_cell(id);
                Vec::new()
            }
            ChangeEvent::Palette(change) => {
                self.absorb_palette_change(change);
                vec![Followup::RefetchPalettes]
            }
        }
    }

    fn absorb_palette_change(&mut self, change: PaletteChange) {
        match change.kind {
            ChangeKind::Delete => {
                let id = change.old_id.or(change.new.map(|p| p.id));
                if let Some(id) = id {
                    self.clear_palette_refs(&id);
                    self.deselect_palette(&id);
                }
            }
            ChangeKind::Update => {
                if let Some(entry) = change.new {
                    if entry.image_url.as_deref().map_or(true, str::is_empty) {
                        self.blank_palette_image(&entry);
                    }
                }
            }
            ChangeKind::Insert => {}
        }
    }

    /// Persisted outer-ring cells still without a palette reference. Empty
    /// until the wall id is known.
    pub fn edge_fill_targets(&self) -> Vec<CellId> {
        if self.wall_id.is_none() {
            return Vec::new();
        }
        let mut ids: Vec<CellId> = self
            .cells
            .values()
            .filter(|c| grid::is_edge(c.x, c.y, self.size) && c.palette_id.is_none())
            .map(|c| c.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Effective look of a cell: overlay, then the persisted reference, then
    /// blank.
    pub fn appearance(&self, cell: &Cell) -> Appearance {
        if let Some(paint) = self.overlay.get(&cell.id) {
            return Appearance::from_paint(paint);
        }
        let Some(palette_id) = cell.palette_id.as_deref() else {
            return Appearance::Blank;
        };
        match &cell.palette {
            Some(snapshot) => Appearance::from_snapshot(Some(snapshot)),
            None => {
                let snapshot = self
                    .palettes
                    .iter()
                    .find(|p| p.id == palette_id)
                    .map(PaletteEntry::snapshot);
                Appearance::from_snapshot(snapshot.as_ref())
            }
        }
    }

    pub fn grid(&self) -> Vec<Cell> {
        grid::derive_grid(self.cells.values(), self.size)
    }

    pub fn render(&self) -> Vec<RenderedCell> {
        self.grid()
            .into_iter()
            .map(|cell| RenderedCell {
                appearance: self.appearance(&cell),
                cell,
            })
            .collect()
    }
}
