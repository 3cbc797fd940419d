use super::{ChunkPosition, ChunkingScheme, COL, ROW};
use std::{iter::*, ops::Range};

impl<'a> IntoIterator for &'a ChunkingScheme {
    type Item = ChunkPosition;
    type IntoIter = Map<Range<usize>, Box<dyn Fn(usize) -> ChunkPosition + 'a>>;

    fn into_iter(self) -> Self::IntoIter {
        let (count, func) = self.iter_mapper();
        (0..count).map(Box::new(func))
    }
}

impl ChunkingScheme {
    /// The position with the given row-major index.
    pub fn position(&self, index: usize) -> ChunkPosition {
        debug_assert!(index < self.total_chunks(), "chunk index out of range");
        let cols = self.chunk_counts[COL];
        let coords = [
            (index / cols) * self.chunk_size[ROW],
            (index % cols) * self.chunk_size[COL],
        ];
        self.position_for(coords)
    }

    pub(super) fn iter_mapper<'a>(&'a self) -> (usize, impl Fn(usize) -> ChunkPosition + 'a) {
        (self.total_chunks(), move |i| self.position(i))
    }

    /// Create an [ `ExactSizeIterator` ] over the positions.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = ChunkPosition> + '_ {
        let (count, func) = self.iter_mapper();
        (0..count).map(func)
    }

    /// Collect all positions in enumeration order.
    pub fn positions(&self) -> Vec<ChunkPosition> {
        self.iter().collect()
    }
}
