/// Board geometry: placeholder identities, edge ring, derived grid.
use std::collections::HashMap;

use crate::types::{Cell, CellId};

/// Linear index of a coordinate in row-major order.
pub fn linear_index(x: u32, y: u32, size: u32) -> usize {
    y as usize * size as usize + x as usize
}

/// Deterministic negative identity for a coordinate with no backing row.
pub fn placeholder_id(index: usize) -> CellId {
    -1 - index as CellId
}

pub fn placeholder_cell(x: u32, y: u32, size: u32) -> Cell {
    Cell {
        id: placeholder_id(linear_index(x, y, size)),
        x,
        y,
        palette_id: None,
        palette: None,
    }
}

pub fn in_bounds(x: u32, y: u32, size: u32) -> bool {
    x < size && y < size
}

/// Whether a coordinate lies on the outer ring of the board.
pub fn is_edge(x: u32, y: u32, size: u32) -> bool {
    size > 0 && (x == 0 || y == 0 || x == size - 1 || y == size - 1)
}

/// Exactly `size * size` cells in row-major order. Each coordinate takes the
/// persisted record when one exists, a placeholder otherwise. Input order does
/// not matter; records outside the board are ignored. If two records claim
/// the same coordinate the lower id wins so repeated calls agree.
pub fn derive_grid<'a, I>(cells: I, size: u32) -> Vec<Cell>
where
    I: IntoIterator<Item = &'a Cell>,
{
    let mut by_coord: HashMap<(u32, u32), &Cell> = HashMap::new();
    for cell in cells {
        if cell.is_placeholder() || !in_bounds(cell.x, cell.y, size) {
            continue;
        }
        by_coord
            .entry((cell.x, cell.y))
            .and_modify(|existing| {
                if cell.id < existing.id {
                    *existing = cell;
                }
            })
            .or_insert(cell);
    }

    let mut grid = Vec::with_capacity(size as usize * size as usize);
    for y in 0..size {
        for x in 0..size {
            match by_coord.get(&(x, y)) {
                Some(cell) => grid.push((*cell).clone()),
                None => grid.push(placeholder_cell(x, y, size)),
            }
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persisted(id: CellId, x: u32, y: u32) -> Cell {
        Cell {
            id,
            x,
            y,
            palette_id: None,
            palette: None,
        }
    }

    #[test]
    fn test_grid_has_n_squared_entries() {
        for size in [0u32, 1, 9, 11] {
            let grid = derive_grid(&[], size);
            assert_eq!(grid.len(), (size * size) as usize);
        }
        let some = vec![persisted(1, 0, 0), persisted(2, 3, 4)];
        assert_eq!(derive_grid(&some, 11).len(), 121);
    }

    #[test]
    fn test_grid_covers_every_coordinate_once() {
        let grid = derive_grid(&[persisted(7, 2, 1)], 9);
        let mut seen = std::collections::HashSet::new();
        for cell in &grid {
            assert!(in_bounds(cell.x, cell.y, 9));
            assert!(seen.insert((cell.x, cell.y)));
        }
        assert_eq!(seen.len(), 81);
    }

    #[test]
    fn test_grid_prefers_persisted_and_ignores_order() {
        let a = vec![persisted(10, 1, 0), persisted(11, 0, 1)];
        let b = vec![persisted(11, 0, 1), persisted(10, 1, 0)];
        let ga = derive_grid(&a, 3);
        let gb = derive_grid(&b, 3);
        assert_eq!(ga, gb);
        assert_eq!(ga[1].id, 10);
        assert_eq!(ga[3].id, 11);
        assert_eq!(ga[0].id, placeholder_id(0));
    }

    #[test]
    fn test_grid_drops_out_of_bounds_records() {
        let grid = derive_grid(&[persisted(5, 9, 0)], 9);
        assert!(grid.iter().all(|c| c.is_placeholder()));
    }

    #[test]
    fn test_placeholder_ids_are_negative_and_distinct() {
        assert_eq!(placeholder_id(0), -1);
        assert_eq!(placeholder_id(80), -81);
        assert_eq!(placeholder_cell(2, 1, 9).id, -12);
    }

    #[test]
    fn test_edge_ring() {
        assert!(is_edge(0, 4, 9));
        assert!(is_edge(8, 8, 9));
        assert!(!is_edge(4, 4, 9));
        let ring = derive_grid(&[], 11)
            .into_iter()
            .filter(|c| is_edge(c.x, c.y, 11))
            .count();
        assert_eq!(ring, 40);
    }
}
