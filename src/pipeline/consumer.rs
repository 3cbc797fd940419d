use crate::chunking::{ChunkPosition, ChunkingScheme};
use crate::data::DataChunk;
use crate::dataset::CachedGrid;
use crate::Result;

/// A destination for computed chunks.
///
/// Each position is expected to be written once per run;
/// writes to distinct positions may arrive concurrently.
pub trait ChunkConsumer: Send + Sync {
    fn native_scheme(&self) -> ChunkingScheme;

    /// An empty chunk describing the expected output type.
    fn prototype(&self) -> DataChunk;

    fn put_chunk(&self, pos: &ChunkPosition, chunk: DataChunk) -> Result<()>;
}

impl ChunkConsumer for CachedGrid {
    fn native_scheme(&self) -> ChunkingScheme {
        self.scheme().clone()
    }

    fn prototype(&self) -> DataChunk {
        CachedGrid::prototype(self).clone()
    }

    fn put_chunk(&self, pos: &ChunkPosition, chunk: DataChunk) -> Result<()> {
        self.write_chunk(pos, &chunk)
    }
}
