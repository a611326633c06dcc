/// In-process stand-in for the hosted backend.
///
/// Keeps rows and stored objects behind one mutex and enforces the same
/// foreign key the hosted schema has: a palette row cannot be deleted while
/// a cell still references it. Used by `TILEBOARD_MEMORY_STORE=1` and by
/// tests.
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use tileboard_core::store::BoardStore;
use tileboard_core::types::{Cell, CellId, PaletteEntry, PaletteId};
use tileboard_core::{StoreError, StoreResult};

pub const MEMORY_PUBLIC_PREFIX: &str = "memory://palette/";

#[derive(Default)]
struct MemoryDb {
    cells: BTreeMap<CellId, Cell>,
    /// Insertion order doubles as `created_at`.
    palettes: Vec<PaletteEntry>,
    objects: HashMap<String, (String, Vec<u8>)>,
    next_cell_id: CellId,
    next_palette_id: u64,
}

impl MemoryDb {
    fn joined(&self, cell: &Cell) -> Cell {
        let mut cell = cell.clone();
        cell.palette = cell.palette_id.as_ref().and_then(|pid| {
            self.palettes
                .iter()
                .find(|p| &p.id == pid)
                .map(PaletteEntry::snapshot)
        });
        cell
    }

    fn check_palette_ref(&self, palette_id: Option<&str>) -> StoreResult<()> {
        match palette_id {
            Some(pid) if !self.palettes.iter().any(|p| p.id == pid) => Err(StoreError::backend(
                format!(
                    "insert or update on table \"board_cells\" violates foreign key constraint (palette_id={})",
                    pid
                ),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    db: Mutex<MemoryDb>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryDb> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn cells(&self) -> Vec<Cell> {
        let db = self.lock();
        db.cells.values().map(|c| db.joined(c)).collect()
    }

    pub fn palettes(&self) -> Vec<PaletteEntry> {
        self.lock().palettes.iter().rev().cloned().collect()
    }

    pub fn has_object(&self, path: &str) -> bool {
        self.lock().objects.contains_key(path)
    }

    pub fn cell(&self, id: CellId) -> StoreResult<Cell> {
        let db = self.lock();
        db.cells
            .get(&id)
            .map(|c| db.joined(c))
            .ok_or_else(|| StoreError::NotFound(format!("cell {}", id)))
    }

    pub fn insert_cell(&self, x: u32, y: u32, palette_id: Option<PaletteId>) -> StoreResult<Cell> {
        let mut db = self.lock();
        db.check_palette_ref(palette_id.as_deref())?;
        if db.cells.values().any(|c| c.x == x && c.y == y) {
            return Err(StoreError::backend(format!(
                "duplicate key value violates unique constraint (x, y)=({}, {})",
                x, y
            )));
        }
        db.next_cell_id += 1;
        let cell = Cell {
            id: db.next_cell_id,
            x,
            y,
            palette_id,
            palette: None,
        };
        db.cells.insert(cell.id, cell.clone());
        Ok(db.joined(&cell))
    }

    pub fn set_cells_palette(&self, ids: &[CellId], palette_id: Option<&str>) -> StoreResult<()> {
        let mut db = self.lock();
        db.check_palette_ref(palette_id)?;
        for id in ids {
            if let Some(cell) = db.cells.get_mut(id) {
                cell.palette_id = palette_id.map(str::to_string);
            }
        }
        Ok(())
    }

    pub fn clear_palette_refs(&self, palette_id: &str) -> usize {
        let mut db = self.lock();
        let mut cleared = 0;
        for cell in db.cells.values_mut().filter(|c| c.references(palette_id)) {
            cell.palette_id = None;
            cleared += 1;
        }
        cleared
    }

    pub fn palette(&self, id: &str) -> Option<PaletteEntry> {
        self.lock().palettes.iter().find(|p| p.id == id).cloned()
    }

    /// Oldest entry whose name matches case-insensitively.
    pub fn find_palette_by_name(&self, name: &str) -> Option<PaletteEntry> {
        self.lock()
            .palettes
            .iter()
            .find(|p| {
                p.name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
            .cloned()
    }

    pub fn insert_palette(&self, name: &str, image_url: Option<&str>) -> PaletteEntry {
        let mut db = self.lock();
        db.next_palette_id += 1;
        let entry = PaletteEntry {
            id: format!("pal-{}", db.next_palette_id),
            name: Some(name.to_string()),
            image_url: image_url.map(str::to_string),
        };
        db.palettes.push(entry.clone());
        entry
    }

    pub fn delete_palette(&self, id: &str) -> StoreResult<()> {
        let mut db = self.lock();
        if db.cells.values().any(|c| c.references(id)) {
            return Err(StoreError::backend(
                "update or delete on table \"palette\" violates foreign key constraint \"board_cells_palette_id_fkey\" on table \"board_cells\"",
            ));
        }
        db.palettes.retain(|p| p.id != id);
        Ok(())
    }

    pub fn put_object(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()> {
        let mut db = self.lock();
        if db.objects.contains_key(path) {
            return Err(StoreError::backend("The resource already exists"));
        }
        db.objects
            .insert(path.to_string(), (content_type.to_string(), bytes));
        Ok(())
    }

    pub fn remove_object(&self, path: &str) {
        self.lock().objects.remove(path);
    }
}

impl BoardStore for MemoryStore {
    async fn fetch_cells(&self) -> StoreResult<Vec<Cell>> {
        Ok(self.cells())
    }

    async fn fetch_cell(&self, id: CellId) -> StoreResult<Cell> {
        self.cell(id)
    }

    async fn fetch_palettes(&self) -> StoreResult<Vec<PaletteEntry>> {
        Ok(self.palettes())
    }

    async fn create_cell(
        &self,
        x: u32,
        y: u32,
        palette_id: Option<PaletteId>,
    ) -> StoreResult<Cell> {
        self.insert_cell(x, y, palette_id)
    }

    async fn update_cell(&self, id: CellId, palette_id: Option<PaletteId>) -> StoreResult<()> {
        self.set_cells_palette(&[id], palette_id.as_deref())
    }

    async fn update_cells(&self, ids: &[CellId], palette_id: Option<PaletteId>) -> StoreResult<()> {
        self.set_cells_palette(ids, palette_id.as_deref())
    }
}
