//! A uniform-cell grid over 2D float positions, for area-of-interest
//! queries. Insert, remove and move are O(1); a neighbourhood query walks
//! the 3×3 block of cells centred on the query position.

use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

/// Default edge length of a grid cell in world units.
pub const DEFAULT_CELL_SIZE: f32 = 100.0;

/// A spatial index of entities keyed by `K` (any small copyable id type).
///
/// Each entity resides in exactly one cell, so query results never contain
/// duplicates.
#[derive(Debug)]
pub struct SpatialGrid<K> {
    cell_size: f32,
    inv_cell_size: f32,
    cells: FxHashMap<u64, FxHashSet<K>>,
    entity_cells: FxHashMap<K, u64>,
}

impl<K: Copy + Eq + Hash> SpatialGrid<K> {
    pub fn new(cell_size: f32) -> Self {
        assert!(cell_size > 0.0, "cell size must be positive");

        Self {
            cell_size,
            inv_cell_size: cell_size.recip(),
            cells: FxHashMap::default(),
            entity_cells: FxHashMap::default(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of entities currently indexed.
    pub fn len(&self) -> usize {
        self.entity_cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_cells.is_empty()
    }

    /// Number of occupied cells. Empty cells are erased eagerly, so this is
    /// bounded by `len`.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    fn to_cell(&self, v: f32) -> i32 {
        (v * self.inv_cell_size).floor() as i32
    }

    /// Packs two cell coordinates into one key. The y half is widened
    /// through `u32` so the sign bits of a negative y cannot smear across
    /// the x half.
    fn cell_key(cx: i32, cy: i32) -> u64 {
        ((cx as u64) << 32) | (cy as u32 as u64)
    }

    fn key_at(&self, x: f32, y: f32) -> u64 {
        Self::cell_key(self.to_cell(x), self.to_cell(y))
    }

    pub fn insert(&mut self, entity: K, x: f32, y: f32) {
        let key = self.key_at(x, y);
        self.cells.entry(key).or_default().insert(entity);
        self.entity_cells.insert(entity, key);
    }

    pub fn remove(&mut self, entity: K) {
        let Some(key) = self.entity_cells.remove(&entity) else {
            return;
        };

        if let Some(cell) = self.cells.get_mut(&key) {
            cell.remove(&entity);
            if cell.is_empty() {
                self.cells.remove(&key);
            }
        }
    }

    /// Moves an entity to a new position, re-hashing only when it crosses a
    /// cell boundary. Inserts if the entity was not indexed yet.
    pub fn move_to(&mut self, entity: K, x: f32, y: f32) {
        let new_key = self.key_at(x, y);

        let Some(key_slot) = self.entity_cells.get_mut(&entity) else {
            self.insert(entity, x, y);
            return;
        };

        let old_key = *key_slot;
        if old_key == new_key {
            return;
        }

        *key_slot = new_key;

        if let Some(cell) = self.cells.get_mut(&old_key) {
            cell.remove(&entity);
            if cell.is_empty() {
                self.cells.remove(&old_key);
            }
        }

        self.cells.entry(new_key).or_default().insert(entity);
    }

    /// Collects every entity in the 3×3 block of cells centred on `(x, y)`
    /// into `out`. The output is not cleared first.
    pub fn query_neighbors(&self, x: f32, y: f32, out: &mut Vec<K>) {
        let cx = self.to_cell(x);
        let cy = self.to_cell(y);

        for dx in -1..=1 {
            for dy in -1..=1 {
                let key = Self::cell_key(cx.wrapping_add(dx), cy.wrapping_add(dy));
                if let Some(cell) = self.cells.get(&key) {
                    out.extend(cell.iter().copied());
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.entity_cells.clear();
    }
}

impl<K: Copy + Eq + Hash> Default for SpatialGrid<K> {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(grid: &SpatialGrid<u64>, x: f32, y: f32) -> Vec<u64> {
        let mut out = vec![];
        grid.query_neighbors(x, y, &mut out);
        out.sort_unstable();
        out
    }

    #[test]
    fn query_covers_adjacent_cells_only() {
        let mut grid = SpatialGrid::default();
        grid.insert(1, 50.0, 50.0);
        grid.insert(2, 150.0, 50.0);
        grid.insert(3, 950.0, 950.0);

        // From the cell next to entity 1: sees 1 and 2, not the far one.
        assert_eq!(query(&grid, 120.0, 20.0), vec![1, 2]);
        assert_eq!(query(&grid, 950.0, 950.0), vec![3]);
        assert_eq!(query(&grid, 500.0, 500.0), vec![]);
    }

    #[test]
    fn move_within_cell_is_a_no_op() {
        let mut grid = SpatialGrid::default();
        grid.insert(7, 10.0, 10.0);

        grid.move_to(7, 10.0, 10.0);
        grid.move_to(7, 99.0, 99.0);

        assert_eq!(grid.cell_count(), 1);
        assert_eq!(query(&grid, 10.0, 10.0), vec![7]);
    }

    #[test]
    fn move_equals_remove_then_insert() {
        let mut a = SpatialGrid::default();
        a.insert(7, 10.0, 10.0);
        a.move_to(7, 510.0, -210.0);

        let mut b = SpatialGrid::default();
        b.insert(7, 10.0, 10.0);
        b.remove(7);
        b.insert(7, 510.0, -210.0);

        assert_eq!(a.cell_count(), b.cell_count());
        assert_eq!(query(&a, 510.0, -210.0), query(&b, 510.0, -210.0));
        assert_eq!(query(&a, 10.0, 10.0), vec![]);
    }

    #[test]
    fn move_of_unknown_entity_inserts() {
        let mut grid = SpatialGrid::default();
        grid.move_to(42, 0.0, 0.0);
        assert_eq!(query(&grid, 0.0, 0.0), vec![42]);
    }

    #[test]
    fn empty_cells_are_erased() {
        let mut grid = SpatialGrid::default();
        grid.insert(1, 0.0, 0.0);
        grid.insert(2, 1000.0, 1000.0);
        assert_eq!(grid.cell_count(), 2);

        grid.remove(1);
        assert_eq!(grid.cell_count(), 1);

        grid.move_to(2, 0.0, 0.0);
        assert_eq!(grid.cell_count(), 1);
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn negative_y_does_not_collide_with_positive_y() {
        // With sign extension, the cell at y = -1 would OR over the whole
        // upper half and collide with unrelated x cells.
        let mut grid = SpatialGrid::new(1.0);
        grid.insert(1, 0.0, -1.0);
        grid.insert(2, 0.0, 1.0);
        grid.insert(3, -1.0, 0.0);

        assert_eq!(grid.cell_count(), 3);
        assert_eq!(query(&grid, 0.0, 0.0), vec![1, 2, 3]);
        assert_eq!(query(&grid, 0.0, -1.0), vec![1, 3]);

        // Far apart on y, same magnitudes.
        let mut grid = SpatialGrid::new(1.0);
        grid.insert(1, 5.0, -100.0);
        grid.insert(2, 5.0, 100.0);
        assert_eq!(query(&grid, 5.0, -100.0), vec![1]);
        assert_eq!(query(&grid, 5.0, 100.0), vec![2]);
    }

    #[test]
    fn negative_coordinates_floor_toward_negative_infinity() {
        let mut grid = SpatialGrid::new(100.0);
        // -0.5 lies in cell -1, not cell 0; a truncating cast would merge
        // the two sides of the axis.
        grid.insert(1, -0.5, 0.0);
        grid.insert(2, -150.0, 0.0);

        assert_eq!(query(&grid, -50.0, 0.0), vec![1, 2]);
        assert_eq!(query(&grid, 250.0, 0.0), vec![]);
    }
}
