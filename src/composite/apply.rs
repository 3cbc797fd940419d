//! Second pass of a coherent composite: selecting values
//! through the source index map.

use crate::chunking::ChunkPosition;
use crate::data::DataChunk;
use crate::pipeline::{ChunkFunction, ChunkProducer, Collector};
use crate::Result;
use anyhow::{anyhow, bail, ensure};
use std::sync::Arc;

/// Collects the map chunk first, then one chunk per input
/// file in registration order.
///
/// Files the map chunk never refers to are not read; their
/// place in the list holds an empty chunk.
pub struct CompositeMapApplicationCollector {
    map: Arc<dyn ChunkProducer>,
    producers: Vec<Arc<dyn ChunkProducer>>,
}

impl CompositeMapApplicationCollector {
    pub fn new(map: Arc<dyn ChunkProducer>, producers: Vec<Arc<dyn ChunkProducer>>) -> Self {
        CompositeMapApplicationCollector { map, producers }
    }
}

impl Collector for CompositeMapApplicationCollector {
    fn input_count(&self) -> usize {
        1 + self.producers.len()
    }

    fn get_chunks(&self, pos: &ChunkPosition) -> Result<Vec<DataChunk>> {
        let map = self.map.get_chunk(pos)?;
        let indices = map
            .as_typed::<i16>()
            .ok_or_else(|| anyhow!("source index map holds {} values", map.data_type()))?;

        let mut referenced = vec![false; self.producers.len()];
        for idx in 0..indices.values().len() {
            let file = indices.values()[idx];
            if indices.is_missing(idx) || file < 0 {
                continue;
            }
            match referenced.get_mut(file as usize) {
                Some(r) => *r = true,
                None => bail!(
                    "source index map refers to file {} of {} at {:?}",
                    file,
                    self.producers.len(),
                    pos.start
                ),
            }
        }

        let mut chunks = Vec::with_capacity(self.input_count());
        chunks.push(map);
        for (producer, &used) in self.producers.iter().zip(referenced.iter()) {
            chunks.push(if used { producer.get_chunk(pos)? } else { producer.prototype() });
        }
        Ok(chunks)
    }
}

/// Picks each pixel's value from the input file named by the
/// map chunk. The map alone decides: a pixel the map has no
/// source for is missing, and a selected file's missing value
/// stays missing.
#[derive(Clone, Debug)]
pub struct CompositeMapApplicationFunction {
    files: usize,
    prototype: DataChunk,
}

impl CompositeMapApplicationFunction {
    pub fn new(files: usize, prototype: DataChunk) -> Self {
        CompositeMapApplicationFunction { files, prototype }
    }
}

impl ChunkFunction for CompositeMapApplicationFunction {
    fn apply(&self, pos: &ChunkPosition, inputs: Vec<DataChunk>) -> Result<DataChunk> {
        ensure!(
            inputs.len() == self.files + 1,
            "expected map and {} input chunks, found {} chunks",
            self.files,
            inputs.len()
        );
        let (map, files) = inputs.split_at(1);
        let map = map[0]
            .as_typed::<i16>()
            .ok_or_else(|| anyhow!("source index map holds {} values", map[0].data_type()))?;
        ensure!(map.dims() == pos.length, "map chunk doesn't match position {:?}", pos.start);

        let mut output = self.prototype.blank_copy(pos.length)?;
        for idx in 0..pos.values() {
            let file = map.values()[idx];
            if map.is_missing(idx) || file < 0 {
                output.set_missing(idx);
                continue;
            }
            let src = files
                .get(file as usize)
                .filter(|c| c.dims() == pos.length)
                .ok_or_else(|| anyhow!("no chunk of input file {} at {:?}", file, pos.start))?;
            if !output.copy_value_from(idx, src, idx) {
                bail!(
                    "input file {} has {} values, expected {}",
                    file,
                    src.data_type(),
                    output.data_type()
                );
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkingScheme;
    use crate::composite::NO_SOURCE;
    use crate::dataset::Grid;
    use crate::pipeline::GridChunkProducer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const M: f32 = -1.;

    fn var(vals: Vec<f32>) -> DataChunk {
        DataChunk::from_values([1, 5], vals, Some(M)).unwrap()
    }

    #[test]
    fn selects_through_map() {
        let func = CompositeMapApplicationFunction::new(5, DataChunk::prototype::<f32>(Some(M)));
        let inputs = vec![
            DataChunk::from_values([1, 5], vec![0i16, 1, 2, 3, 4], Some(NO_SOURCE)).unwrap(),
            var(vec![0., 1., 2., 3., 4.]),
            var(vec![5., 6., 7., 8., 9.]),
            var(vec![10., 11., 12., 13., 14.]),
            var(vec![15., 16., 17., 18., 19.]),
            var(vec![20., 21., 22., 23., M]),
        ];
        let out = func.apply(&ChunkPosition::new([0, 0], [1, 5]), inputs).unwrap();
        assert_eq!(out.as_typed::<f32>().unwrap().values(), &[0., 6., 12., 18., M]);
    }

    #[test]
    fn map_governs_missing() {
        let func = CompositeMapApplicationFunction::new(2, DataChunk::prototype::<f32>(Some(M)));
        let inputs = vec![
            DataChunk::from_values([1, 5], vec![NO_SOURCE, 1, 0, NO_SOURCE, 1], Some(NO_SOURCE)).unwrap(),
            var(vec![0., 1., M, 3., 4.]),
            var(vec![5., 6., 7., 8., M]),
        ];
        let out = func.apply(&ChunkPosition::new([0, 0], [1, 5]), inputs).unwrap();
        assert_eq!(out.as_typed::<f32>().unwrap().values(), &[M, 6., M, M, M]);
    }

    #[test]
    fn wrong_input_count_fails() {
        let func = CompositeMapApplicationFunction::new(2, DataChunk::prototype::<f32>(None));
        let inputs = vec![DataChunk::from_values([1, 1], vec![0i16], None).unwrap(), var(vec![0.; 5])];
        assert!(func.apply(&ChunkPosition::new([0, 0], [1, 1]), inputs).is_err());
    }

    struct Counting {
        inner: GridChunkProducer,
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

    fn counting(grid: Grid) -> Arc<Counting> {
        Arc::new(Counting {
            inner: GridChunkProducer::new(Arc::new(grid)),
            reads: AtomicUsize::new(0),
        })
    }

    #[test]
    fn collector_reads_referenced_files_only() {
        let map = Grid::from_values("source_index", [1, 4], [1, 4], vec![1i16, 1, NO_SOURCE, 1], Some(NO_SOURCE)).unwrap();
        let map = Arc::new(GridChunkProducer::new(Arc::new(map)));
        let a = counting(Grid::from_values("sst", [1, 4], [1, 4], vec![1f32; 4], None).unwrap());
        let b = counting(Grid::from_values("sst", [1, 4], [1, 4], vec![2f32; 4], None).unwrap());

        let collector = CompositeMapApplicationCollector::new(map, vec![a.clone() as Arc<dyn ChunkProducer>, b.clone()]);
        assert_eq!(collector.input_count(), 3);
        let chunks = collector.get_chunks(&ChunkPosition::new([0, 0], [1, 4])).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].data_type(), crate::data::DataType::Short);
        assert!(chunks[1].is_empty());
        assert_eq!(chunks[2].values(), 4);
        assert_eq!(a.reads.load(Ordering::Acquire), 0);
        assert_eq!(b.reads.load(Ordering::Acquire), 1);

        let func = CompositeMapApplicationFunction::new(2, DataChunk::prototype::<f32>(None));
        let out = func.apply(&ChunkPosition::new([0, 0], [1, 4]), chunks).unwrap();
        let out = out.as_typed::<f32>().unwrap();
        assert_eq!(out.values()[0], 2.);
        assert!(out.is_missing(2));
    }
}
