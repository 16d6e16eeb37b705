//! Tile grid geometry.
//!
//! A representation extracted at one model position has `n × n` spatial
//! positions ("tiles") with `m` channels each. Similarity results are laid
//! out row-major: the value for `(col, row)` lives at `row * n + col`.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Shape of a representation: `n × n` tiles, `m` channels per tile.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    n: u32,
    m: u32,
}

impl GridShape {
    pub fn new(n: u32, m: u32) -> CoreResult<Self> {
        if n == 0 {
            return Err(CoreError::validation("grid side `n` must be positive"));
        }
        if m == 0 {
            return Err(CoreError::validation("channel count `m` must be positive"));
        }
        Ok(Self { n, m })
    }

    /// Spatial side length.
    pub fn n(&self) -> u32 {
        self.n
    }

    /// Channels per tile.
    pub fn m(&self) -> u32 {
        self.m
    }

    /// Number of tiles, i.e. the expected length of a similarity result.
    pub fn tile_count(&self) -> usize {
        (self.n as usize) * (self.n as usize)
    }

    /// Resolve pointer-derived coordinates to a tile, if inside the grid.
    pub fn tile_at(&self, col: i64, row: i64) -> Option<Tile> {
        let n = i64::from(self.n);
        if (0..n).contains(&col) && (0..n).contains(&row) {
            Some(Tile::new(col as u32, row as u32))
        } else {
            None
        }
    }

    pub fn contains(&self, tile: Tile) -> bool {
        tile.col < self.n && tile.row < self.n
    }

    /// Row-major index of `tile` in a similarity result.
    pub fn index_of(&self, tile: Tile) -> usize {
        tile.row as usize * self.n as usize + tile.col as usize
    }

    pub fn tile_from_index(&self, index: usize) -> Option<Tile> {
        if index >= self.tile_count() {
            return None;
        }
        let n = self.n as usize;
        Some(Tile::new((index % n) as u32, (index / n) as u32))
    }
}

/// One cell of the grid.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    pub col: u32,
    pub row: u32,
}

impl Tile {
    pub fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }

    /// Map a tile from a grid of side `from` onto a grid of side `to`.
    ///
    /// Uses `floor(x * to / from)` per axis.
    pub fn rescale(self, from: u32, to: u32) -> Self {
        if from == 0 || from == to {
            return self;
        }
        let scale = |x: u32| ((u64::from(x) * u64::from(to)) / u64::from(from)) as u32;
        Self::new(scale(self.col), scale(self.row))
    }
}
