//! Partition a 2D grid into rectangular chunks.
//!
//! Grids stored on disk are typically sub-divided into
//! rectangular tiles of a fixed size. Reading or writing along
//! tile boundaries is far cheaper than touching arbitrary
//! windows, so every computation in this crate is driven by a
//! [`ChunkingScheme`] matching the tiling of its destination.
//!
//! # Enumeration
//!
//! A scheme enumerates its [`ChunkPosition`]s in row-major
//! order. Positions never overlap and together cover the full
//! grid. Chunks on the bottom and right edges are clipped to
//! the grid rather than padded, so they may be smaller than
//! the nominal chunk size.
//!
//! The enumeration only depends on the grid dimensions and
//! the chunk size. Two passes over the same scheme (for
//! instance the map and apply passes of a coherent
//! composite) always visit identical positions.

/// Index of the row axis in `[row, col]` pairs.
pub const ROW: usize = 0;
/// Index of the column axis in `[row, col]` pairs.
pub const COL: usize = 1;

/// The location of one chunk in a grid: the coordinates of
/// its first pixel and its extent along each axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPosition {
    pub start: [usize; 2],
    pub length: [usize; 2],
}

impl ChunkPosition {
    pub fn new(start: [usize; 2], length: [usize; 2]) -> Self {
        ChunkPosition { start, length }
    }

    /// Number of values in the chunk.
    #[inline]
    pub fn values(&self) -> usize {
        self.length[ROW] * self.length[COL]
    }

    /// One past the last coordinate along each axis.
    #[inline]
    pub fn end(&self) -> [usize; 2] {
        [
            self.start[ROW] + self.length[ROW],
            self.start[COL] + self.length[COL],
        ]
    }

    pub fn contains(&self, coords: [usize; 2]) -> bool {
        let end = self.end();
        (0..2).all(|k| coords[k] >= self.start[k] && coords[k] < end[k])
    }

    pub fn overlaps(&self, other: &ChunkPosition) -> bool {
        let (a, b) = (self.end(), other.end());
        (0..2).all(|k| self.start[k] < b[k] && other.start[k] < a[k])
    }

    /// Row-major index of grid coordinates inside this chunk.
    #[inline]
    pub fn local_index(&self, coords: [usize; 2]) -> usize {
        (coords[ROW] - self.start[ROW]) * self.length[COL] + (coords[COL] - self.start[COL])
    }
}

/// Describes how a grid of `dims` is split into chunks of
/// `chunk_size`. Immutable once built; see the module docs
/// for the enumeration order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChunkingScheme {
    dims: [usize; 2],
    chunk_size: [usize; 2],
    chunk_counts: [usize; 2],
}

mod builder;
mod iters;
mod par_iters;
