use crate::chunking::{ChunkPosition, ChunkingScheme, COL, ROW};
use crate::data::{DataChunk, DataType, TypedChunk};
use crate::dataset::Grid;
use crate::Result;
use anyhow::Context;
use std::sync::Arc;

/// A source of chunks for arbitrary positions.
///
/// Producing twice for the same position must yield the
/// same data.
pub trait ChunkProducer: Send + Sync {
    /// The chunking the underlying storage is laid out in.
    fn native_scheme(&self) -> ChunkingScheme;

    /// An empty chunk describing the type and missing
    /// sentinel of produced chunks.
    fn prototype(&self) -> DataChunk;

    fn external_type(&self) -> DataType {
        self.prototype().data_type()
    }

    fn get_chunk(&self, pos: &ChunkPosition) -> Result<DataChunk>;
}

/// Produces chunks of a dataset variable.
#[derive(Clone, Debug)]
pub struct GridChunkProducer {
    grid: Arc<Grid>,
}

impl GridChunkProducer {
    pub fn new(grid: Arc<Grid>) -> Self {
        GridChunkProducer { grid }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }
}

impl ChunkProducer for GridChunkProducer {
    fn native_scheme(&self) -> ChunkingScheme {
        self.grid.scheme()
    }

    fn prototype(&self) -> DataChunk {
        self.grid.prototype()
    }

    fn get_chunk(&self, pos: &ChunkPosition) -> Result<DataChunk> {
        self.grid
            .read_chunk(pos)
            .with_context(|| format!("reading {} chunk at {:?}", self.grid.name, pos.start))
    }
}

type PixelFn = dyn Fn([usize; 2]) -> Option<i32> + Send + Sync;

/// Produces integer chunks computed pixel by pixel from grid
/// coordinates. `None` values are missing.
pub struct SyntheticChunkProducer {
    scheme: ChunkingScheme,
    func: Box<PixelFn>,
}

impl SyntheticChunkProducer {
    pub fn new<F>(scheme: ChunkingScheme, func: F) -> Self
    where
        F: Fn([usize; 2]) -> Option<i32> + Send + Sync + 'static,
    {
        SyntheticChunkProducer {
            scheme,
            func: Box::new(func),
        }
    }
}

impl ChunkProducer for SyntheticChunkProducer {
    fn native_scheme(&self) -> ChunkingScheme {
        self.scheme.clone()
    }

    fn prototype(&self) -> DataChunk {
        DataChunk::prototype::<i32>(Some(i32::MIN))
    }

    fn get_chunk(&self, pos: &ChunkPosition) -> Result<DataChunk> {
        let mut chunk = TypedChunk::<i32>::zeroed(pos.length, Some(i32::MIN))?;
        let end = pos.end();
        for i in pos.start[ROW]..end[ROW] {
            for j in pos.start[COL]..end[COL] {
                let idx = pos.local_index([i, j]);
                match (self.func)([i, j]) {
                    Some(val) => chunk.values_mut()[idx] = val,
                    None => chunk.set_missing(idx),
                }
            }
        }
        Ok(chunk.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_values() {
        let scheme = ChunkingScheme::new([4, 4], [2, 2]).unwrap();
        let producer = SyntheticChunkProducer::new(scheme, |[i, j]| if i == j { None } else { Some((i * 10 + j) as i32) });
        assert_eq!(producer.external_type(), DataType::Int);

        let chunk = producer.get_chunk(&ChunkPosition::new([2, 1], [2, 3])).unwrap();
        let chunk = chunk.as_typed::<i32>().unwrap();
        assert_eq!(chunk.values(), &[21, i32::MIN, 23, 31, 32, i32::MIN]);
        assert!(chunk.is_missing(1));
    }
}
