use crate::chunking::ChunkPosition;
use crate::data::DataChunk;
use crate::Result;

/// A pure computation of one output chunk from the input
/// chunks of a position.
pub trait ChunkFunction: Send + Sync {
    fn apply(&self, pos: &ChunkPosition, inputs: Vec<DataChunk>) -> Result<DataChunk>;
}
