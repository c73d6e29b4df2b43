//! Uniform-cell spatial index over enemy positions.
//!
//! Space is cut into square cells of a fixed size; each key lives in the one
//! cell its position floor-divides into. A reverse index remembers which cell
//! every key is in so removal and updates never scan the grid.

use shared::{Rect, Vector2, CELL_SIZE};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Integer cell coordinates.
pub type CellKey = (i32, i32);

#[derive(Debug, Clone, Copy)]
struct Entry<K> {
    key: K,
    position: Vector2,
}

pub struct SpatialGrid<K> {
    cell_size: f32,
    cells: HashMap<CellKey, Vec<Entry<K>>>,
    /// key -> the cell it is currently stored under
    reverse: HashMap<K, CellKey>,
}

impl<K: Copy + Eq + Hash> Default for SpatialGrid<K> {
    fn default() -> Self {
        Self::new(CELL_SIZE)
    }
}

impl<K: Copy + Eq + Hash> SpatialGrid<K> {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(f32::EPSILON),
            cells: HashMap::new(),
            reverse: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn cell_key(&self, position: Vector2) -> CellKey {
        (
            (position.x / self.cell_size).floor() as i32,
            (position.y / self.cell_size).floor() as i32,
        )
    }

    /// Adds a key at `position`. Inserting a key that is already indexed
    /// duplicates it; callers remove or update instead.
    pub fn insert(&mut self, key: K, position: Vector2) {
        let cell = self.cell_key(position);
        self.cells
            .entry(cell)
            .or_default()
            .push(Entry { key, position });
        self.reverse.insert(key, cell);
    }

    /// Drops a key from the index. Unknown keys are ignored.
    pub fn remove(&mut self, key: K) -> bool {
        let Some(cell) = self.reverse.remove(&key) else {
            return false;
        };
        if let Some(entries) = self.cells.get_mut(&cell) {
            entries.retain(|e| e.key != key);
            if entries.is_empty() {
                self.cells.remove(&cell);
            }
        }
        true
    }

    /// Moves a key to its new position, changing cells only when needed.
    pub fn update_position(&mut self, key: K, position: Vector2) {
        let new_cell = self.cell_key(position);
        match self.reverse.get(&key).copied() {
            Some(cell) if cell == new_cell => {
                if let Some(entry) = self
                    .cells
                    .get_mut(&cell)
                    .and_then(|entries| entries.iter_mut().find(|e| e.key == key))
                {
                    entry.position = position;
                }
            }
            Some(_) => {
                self.remove(key);
                self.insert(key, position);
            }
            None => self.insert(key, position),
        }
    }

    /// Keys within `radius` of `position` (inclusive), without duplicates.
    pub fn query_radius(&self, position: Vector2, radius: f32) -> Vec<K> {
        let radius = radius.max(0.0);
        let (cx, cy) = self.cell_key(position);
        let reach = (radius / self.cell_size).ceil() as i32;
        let radius_sq = radius * radius;

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let Some(entries) = self.cells.get(&(cx + dx, cy + dy)) else {
                    continue;
                };
                for entry in entries {
                    if entry.position.distance_squared(&position) <= radius_sq
                        && seen.insert(entry.key)
                    {
                        result.push(entry.key);
                    }
                }
            }
        }
        result
    }

    /// Keys whose stored position lies inside `rect`.
    pub fn query_rect(&self, rect: &Rect) -> Vec<K> {
        let (min_x, min_y) = self.cell_key(rect.min());
        let (max_x, max_y) = self.cell_key(rect.max());

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let Some(entries) = self.cells.get(&(x, y)) else {
                    continue;
                };
                for entry in entries {
                    if rect.contains(&entry.position) && seen.insert(entry.key) {
                        result.push(entry.key);
                    }
                }
            }
        }
        result
    }

    /// The cell a key is indexed under, if any.
    pub fn cell_of(&self, key: K) -> Option<CellKey> {
        self.reverse.get(&key).copied()
    }

    pub fn contains(&self, key: K) -> bool {
        self.reverse.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.reverse.clear();
    }

    /// Checks that the reverse index and the cell lists describe the same
    /// placement. Used by tests and debug assertions.
    pub fn is_consistent(&self) -> bool {
        let stored: usize = self.cells.values().map(Vec::len).sum();
        if stored != self.reverse.len() {
            return false;
        }
        self.cells.iter().all(|(cell, entries)| {
            entries.iter().all(|e| {
                self.reverse.get(&e.key) == Some(cell) && self.cell_key(e.position) == *cell
            })
        })
    }
}
