//! The source index map of a coherent composite.
//!
//! The map goes through two phases, each held by its own
//! type. A [`CoherentMapBuilder`] owns the map grid while
//! pass 1 writes it; computing consumes the builder and
//! yields a [`ComputedMap`], which is persisted either into
//! the composite output or into a scratch dataset. Only the
//! resulting [`CoherentMap`] hands out a producer for pass 2,
//! so values can't be applied before the map is complete.

use super::map::{CompositeMapFunction, NO_SOURCE};
use crate::chunking::ChunkingScheme;
use crate::context::LogContext;
use crate::data::DataChunk;
use crate::dataset::{CachedGrid, DatasetReader, DatasetWriter, EarthDataInfo, Grid};
use crate::pipeline::{run_operation, ChunkCollector, ChunkComputation, ChunkProducer, Execution, GridChunkProducer, ProgressFn};
use crate::{verbose, Result};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempPath;

/// Name of the map variable.
pub const SOURCE_INDEX: &str = "source_index";
/// Map attribute listing the input files, one per line, in
/// index order.
pub const INPUT_FILES_ATTR: &str = "input_files";

/// Where a computed map is kept for pass 2.
pub enum MapStorage<'a> {
    /// Added to the composite output as a regular variable.
    Output(&'a mut DatasetWriter),
    /// In a scratch dataset, deleted with the map.
    Scratch(&'a EarthDataInfo),
}

pub struct CoherentMapBuilder {
    grid: Arc<CachedGrid>,
}

impl CoherentMapBuilder {
    pub fn new(dims: [usize; 2], tile_dims: [usize; 2], input_files: &[String]) -> Self {
        let mut grid = CachedGrid::new(SOURCE_INDEX, dims, tile_dims, DataChunk::prototype(Some(NO_SOURCE)));
        grid.set_attribute(INPUT_FILES_ATTR, input_files.join("\n"));
        CoherentMapBuilder { grid: Arc::new(grid) }
    }

    pub fn scheme(&self) -> ChunkingScheme {
        self.grid.scheme().clone()
    }

    /// Run pass 1 over every position of the map.
    pub fn compute(
        self,
        ctx: &LogContext,
        collector: ChunkCollector,
        function: CompositeMapFunction,
        execution: Execution,
        progress: Option<Box<ProgressFn>>,
    ) -> Result<ComputedMap> {
        let positions = self.grid.scheme().positions();
        verbose!(ctx, "computing source index map over {} chunks", positions.len());
        let computation = ChunkComputation::new(Arc::new(collector), Arc::new(function), self.grid.clone());
        run_operation(ctx, Arc::new(computation), positions, execution, progress)
            .context("computing source index map")?;
        let grid = self.grid.assemble()?;
        Ok(ComputedMap { grid })
    }
}

/// A complete map not yet available for reading.
pub struct ComputedMap {
    grid: Grid,
}

impl ComputedMap {
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Flush the map to its storage and reopen it for
    /// reading.
    pub fn persist(self, storage: MapStorage) -> Result<CoherentMap> {
        match storage {
            MapStorage::Output(writer) => {
                writer.add_grid(self.grid.clone())?;
                Ok(CoherentMap {
                    producer: Arc::new(GridChunkProducer::new(Arc::new(self.grid))),
                    scratch: None,
                })
            }
            MapStorage::Scratch(info) => {
                let path = tempfile::Builder::new()
                    .prefix("cwcomposite_map_")
                    .suffix(".cw")
                    .tempfile()
                    .context("creating scratch map file")?
                    .into_temp_path();
                tracing::debug!("writing source index map to {}", path.display());

                let mut writer = DatasetWriter::create(&path, info.clone())?;
                writer.add_grid(self.grid)?;
                writer.close()?;

                let reader = DatasetReader::open(&path)?;
                Ok(CoherentMap {
                    producer: Arc::new(GridChunkProducer::new(reader.variable(SOURCE_INDEX)?)),
                    scratch: Some(path),
                })
            }
        }
    }
}

/// A map ready to be applied.
pub struct CoherentMap {
    producer: Arc<GridChunkProducer>,
    scratch: Option<TempPath>,
}

impl CoherentMap {
    pub fn producer(&self) -> Arc<dyn ChunkProducer> {
        self.producer.clone()
    }

    pub fn scratch_path(&self) -> Option<&Path> {
        self.scratch.as_deref()
    }

    /// Release the map, deleting its scratch file.
    pub fn close(self) -> Result<()> {
        if let Some(path) = self.scratch {
            path.close().context("removing scratch map file")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkPosition;
    use crate::composite::Optimization;
    use crate::geometry::EarthTransform;
    use crate::pipeline::SyntheticChunkProducer;
    use tempdir::TempDir;

    fn collector(scheme: &ChunkingScheme) -> ChunkCollector {
        let mut collector = ChunkCollector::new();
        for file in 0..3 {
            collector.add_producer(Arc::new(SyntheticChunkProducer::new(scheme.clone(), move |[i, j]| {
                if i == 0 && j == 0 {
                    None
                } else {
                    Some(((i + j + file) % 3) as i32)
                }
            })));
        }
        collector
    }

    fn build(storage: MapStorage, execution: Execution) -> CoherentMap {
        let files = vec!["a.cw".to_string(), "b.cw".into(), "c.cw".into()];
        let builder = CoherentMapBuilder::new([5, 6], [2, 4], &files);
        let collector = collector(&builder.scheme());
        let function = CompositeMapFunction::new(3, Some(Optimization::Max), 0).unwrap();
        let ctx = LogContext::quiet("test");
        builder
            .compute(&ctx, collector, function, execution, None)
            .unwrap()
            .persist(storage)
            .unwrap()
    }

    fn read_all(map: &CoherentMap) -> Vec<i16> {
        let chunk = map.producer().get_chunk(&ChunkPosition::new([0, 0], [5, 6])).unwrap();
        chunk.as_typed::<i16>().unwrap().values().to_vec()
    }

    #[test]
    fn scratch_map_is_removed_on_close() {
        let info = EarthDataInfo::new(EarthTransform::regular([5, 6], 40., -120., 0.5));
        let map = build(MapStorage::Scratch(&info), Execution::Parallel(3));
        let path = map.scratch_path().unwrap().to_path_buf();
        assert!(path.exists());

        let vals = read_all(&map);
        assert_eq!(vals[0], NO_SOURCE);
        // Value (i + j + file) % 3 is largest (2) for the file
        // with file = (2 - i - j) mod 3.
        assert_eq!(vals[1], 1);
        assert_eq!(vals[6 + 1], 0);
        assert_eq!(map.producer().native_scheme().chunk_size(), [2, 4]);

        map.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn saved_map_goes_to_output() {
        let tmp_dir = TempDir::new("cwchunk_map").unwrap();
        let path = tmp_dir.path().join("out.cw");
        let info = EarthDataInfo::new(EarthTransform::regular([5, 6], 40., -120., 0.5));
        let mut writer = DatasetWriter::create(&path, info).unwrap();

        let map = build(MapStorage::Output(&mut writer), Execution::Serial);
        assert!(map.scratch_path().is_none());
        let vals = read_all(&map);
        map.close().unwrap();

        let ds = writer.close().unwrap();
        let saved = &ds.grids[0];
        assert_eq!(saved.name, SOURCE_INDEX);
        assert_eq!(saved.attributes[INPUT_FILES_ATTR], "a.cw\nb.cw\nc.cw");
        let all = saved.read_chunk(&ChunkPosition::new([0, 0], [5, 6])).unwrap();
        assert_eq!(all.as_typed::<i16>().unwrap().values(), &vals[..]);
    }
}
