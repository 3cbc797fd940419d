use super::{ChunkPosition, ChunkingScheme, COL, ROW};
use crate::Result;
use anyhow::ensure;

/// Constructors
impl ChunkingScheme {
    /// Construct a scheme for a grid of the given size, with
    /// the whole grid as a single chunk.
    pub fn with_dims(rows: usize, cols: usize) -> Self {
        let mut scheme = ChunkingScheme {
            dims: [rows, cols],
            chunk_size: [rows.max(1), cols.max(1)],
            chunk_counts: [0, 0],
        };
        scheme.adjust_counts();
        scheme
    }

    /// Construct a scheme from dimension and chunk size pairs.
    pub fn new(dims: [usize; 2], chunk_size: [usize; 2]) -> Result<Self> {
        ChunkingScheme::with_dims(dims[ROW], dims[COL]).with_chunk_size(chunk_size[ROW], chunk_size[COL])
    }

    /// Construct the scheme of a grid's storage tiles. Tile
    /// sizes of zero are raised to one.
    pub fn tiled(dims: [usize; 2], tile_dims: [usize; 2]) -> Self {
        let mut scheme = ChunkingScheme {
            dims,
            chunk_size: [tile_dims[ROW].max(1), tile_dims[COL].max(1)],
            chunk_counts: [0, 0],
        };
        scheme.adjust_counts();
        scheme
    }
}

/// Builder methods to configure the parameters
impl ChunkingScheme {
    /// Set the nominal chunk size.
    pub fn with_chunk_size(mut self, rows: usize, cols: usize) -> Result<Self> {
        ensure!(
            rows >= 1 && cols >= 1,
            "chunk size must be at least 1 along both axes, got {}x{}",
            rows,
            cols
        );
        self.chunk_size = [rows, cols];
        self.adjust_counts();
        Ok(self)
    }

    #[inline]
    fn adjust_counts(&mut self) {
        for k in 0..2 {
            self.chunk_counts[k] = div_ceil(self.dims[k], self.chunk_size[k]);
        }
    }
}

/// Getter methods to read the parameters of the scheme
impl ChunkingScheme {
    pub fn dims(&self) -> [usize; 2] {
        self.dims
    }

    pub fn chunk_size(&self) -> [usize; 2] {
        self.chunk_size
    }

    /// Number of chunks along `axis` ([`ROW`] or [`COL`]).
    pub fn chunk_count(&self, axis: usize) -> usize {
        self.chunk_counts[axis]
    }

    pub fn total_chunks(&self) -> usize {
        self.chunk_counts[ROW] * self.chunk_counts[COL]
    }

    /// The chunk containing the given grid coordinates.
    pub fn position_for(&self, coords: [usize; 2]) -> ChunkPosition {
        let mut pos = ChunkPosition::new([0, 0], [0, 0]);
        for k in 0..2 {
            pos.start[k] = (coords[k] / self.chunk_size[k]) * self.chunk_size[k];
            let end = (pos.start[k] + self.chunk_size[k]).min(self.dims[k]);
            pos.length[k] = end.saturating_sub(pos.start[k]);
        }
        pos
    }

    /// Check if a position is exactly one of the positions
    /// this scheme enumerates.
    pub fn is_native_position(&self, pos: &ChunkPosition) -> bool {
        (0..2).all(|k| pos.start[k] < self.dims[k]) && self.position_for(pos.start) == *pos
    }
}

#[inline]
fn div_ceil(num: usize, m: usize) -> usize {
    (num + m - 1) / m
}
