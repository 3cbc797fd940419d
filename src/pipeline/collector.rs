use super::ChunkProducer;
use crate::chunking::ChunkPosition;
use crate::data::DataChunk;
use crate::Result;
use std::sync::Arc;

/// Gathers the input chunks of one position.
pub trait Collector: Send + Sync {
    /// Number of chunks returned for each position.
    fn input_count(&self) -> usize;

    fn get_chunks(&self, pos: &ChunkPosition) -> Result<Vec<DataChunk>>;
}

/// Collects one chunk from each registered producer, in
/// registration order.
#[derive(Clone, Default)]
pub struct ChunkCollector {
    producers: Vec<Arc<dyn ChunkProducer>>,
}

impl ChunkCollector {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_producers(producers: Vec<Arc<dyn ChunkProducer>>) -> Self {
        ChunkCollector { producers }
    }

    /// Register a producer, returning its index in the
    /// collected list.
    pub fn add_producer(&mut self, producer: Arc<dyn ChunkProducer>) -> usize {
        self.producers.push(producer);
        self.producers.len() - 1
    }

    pub fn producers(&self) -> &[Arc<dyn ChunkProducer>] {
        &self.producers
    }
}

impl Collector for ChunkCollector {
    fn input_count(&self) -> usize {
        self.producers.len()
    }

    fn get_chunks(&self, pos: &ChunkPosition) -> Result<Vec<DataChunk>> {
        self.producers.iter().map(|p| p.get_chunk(pos)).collect()
    }
}
