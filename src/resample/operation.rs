use super::map::ResamplingMapFactory;
use crate::chunking::{ChunkPosition, COL, ROW};
use crate::data::DataChunk;
use crate::pipeline::{ChunkConsumer, ChunkOperation, ChunkProducer};
use crate::Result;
use anyhow::{bail, Context};
use std::collections::HashMap;
use std::sync::Arc;

/// Resamples a set of source variables onto destination
/// grids, one destination chunk at a time.
///
/// For each destination position the map is created once
/// and shared by all variables. Source chunks are read along
/// each producer's native scheme, each at most once per
/// destination chunk. Destination pixels without a source
/// are missing.
pub struct ResamplingOperation {
    pairs: Vec<(Arc<dyn ChunkProducer>, Arc<dyn ChunkConsumer>)>,
    factory: Arc<dyn ResamplingMapFactory>,
}

impl ResamplingOperation {
    pub fn new(factory: Arc<dyn ResamplingMapFactory>) -> Self {
        ResamplingOperation { pairs: vec![], factory }
    }

    pub fn add_variable(&mut self, producer: Arc<dyn ChunkProducer>, consumer: Arc<dyn ChunkConsumer>) {
        self.pairs.push((producer, consumer));
    }

    pub fn variables(&self) -> usize {
        self.pairs.len()
    }

    fn missing_chunk(consumer: &dyn ChunkConsumer, pos: &ChunkPosition) -> Result<DataChunk> {
        let mut chunk = consumer.prototype().blank_copy(pos.length)?;
        for idx in 0..chunk.values() {
            chunk.set_missing(idx);
        }
        Ok(chunk)
    }
}

impl ChunkOperation for ResamplingOperation {
    fn perform(&self, pos: &ChunkPosition) -> Result<()> {
        let map = self
            .factory
            .create(pos)
            .with_context(|| format!("creating resampling map at {:?}", pos.start))?;

        let map = match map {
            Some(map) => map,
            None => {
                for (_, consumer) in &self.pairs {
                    consumer.put_chunk(pos, Self::missing_chunk(consumer.as_ref(), pos)?)?;
                }
                return Ok(());
            }
        };

        let end = pos.end();
        for (producer, consumer) in &self.pairs {
            let scheme = producer.native_scheme();
            let mut sources: HashMap<ChunkPosition, DataChunk> = HashMap::new();
            let mut output = consumer.prototype().blank_copy(pos.length)?;

            for i in pos.start[ROW]..end[ROW] {
                for j in pos.start[COL]..end[COL] {
                    let idx = pos.local_index([i, j]);
                    let src = match map.map([i, j]) {
                        Some(src) => src,
                        None => {
                            output.set_missing(idx);
                            continue;
                        }
                    };
                    let native = scheme.position_for(src);
                    if !sources.contains_key(&native) {
                        sources.insert(native, producer.get_chunk(&native)?);
                    }
                    let chunk = &sources[&native];
                    if !output.copy_value_from(idx, chunk, native.local_index(src)) {
                        bail!(
                            "can't resample {} values into {} grid",
                            chunk.data_type(),
                            output.data_type()
                        );
                    }
                }
            }
            consumer.put_chunk(pos, output)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkingScheme;
    use crate::dataset::{CachedGrid, Grid};
    use crate::geometry::EarthTransform;
    use crate::pipeline::{GridChunkProducer, SyntheticChunkProducer};
    use crate::resample::AffineResamplingMapFactory;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        inner: SyntheticChunkProducer,
        reads: AtomicUsize,
    }

    impl ChunkProducer for Counting {
        fn native_scheme(&self) -> ChunkingScheme {
            self.inner.native_scheme()
        }
        fn prototype(&self) -> DataChunk {
            self.inner.prototype()
        }
        fn get_chunk(&self, pos: &ChunkPosition) -> Result<DataChunk> {
            self.reads.fetch_add(1, Ordering::AcqRel);
            self.inner.get_chunk(pos)
        }
    }

    fn factory() -> Arc<AffineResamplingMapFactory> {
        let source = EarthTransform::regular([8, 8], 48., -128., 0.25);
        let dest = EarthTransform::regular([6, 6], 48.5, -128., 0.5);
        Arc::new(AffineResamplingMapFactory::new(&source, &dest).unwrap())
    }

    #[test]
    fn resample_onto_coarser_grid() {
        let scheme = ChunkingScheme::new([8, 8], [4, 4]).unwrap();
        let source = Arc::new(Counting {
            inner: SyntheticChunkProducer::new(scheme, |[i, j]| Some((i * 10 + j) as i32)),
            reads: AtomicUsize::new(0),
        });
        let dest = Arc::new(CachedGrid::new("sst", [6, 6], [3, 3], source.prototype()));

        let mut op = ResamplingOperation::new(factory());
        op.add_variable(source.clone(), dest.clone());
        assert_eq!(op.variables(), 1);
        for pos in dest.scheme().positions() {
            op.perform(&pos).unwrap();
        }
        // Each destination chunk reads the native chunks it
        // touches once: 2 + 1 + 2 + 1.
        assert_eq!(source.reads.load(Ordering::Acquire), 6);

        let grid = dest.assemble().unwrap();
        let all = grid.read_chunk(&ChunkPosition::new([0, 0], [6, 6])).unwrap();
        let all = all.as_typed::<i32>().unwrap();
        assert!((0..6).all(|j| all.is_missing(j)));
        assert_eq!(all.values()[6], 11);
        assert_eq!(all.values()[2 * 6 + 3], 37);
        assert!(all.is_missing(2 * 6 + 4));
        assert!(all.is_missing(5 * 6));
    }

    #[test]
    fn type_mismatch_fails() {
        let source = Grid::from_values("sst", [8, 8], [8, 8], vec![1f32; 64], None).unwrap();
        let source = Arc::new(GridChunkProducer::new(Arc::new(source)));
        let dest = Arc::new(CachedGrid::new("sst", [6, 6], [6, 6], DataChunk::prototype::<i16>(None)));
        let mut op = ResamplingOperation::new(factory());
        op.add_variable(source, dest);
        assert!(op.perform(&ChunkPosition::new([0, 0], [6, 6])).is_err());
    }
}
