//! Resampling maps: for each destination pixel, the source
//! pixel its value comes from.

use crate::chunking::{ChunkPosition, COL, ROW};
use crate::dataset::Grid;
use crate::geometry::{index_transformer, transform_between, EarthTransform, PixelTransform};
use crate::Result;
use anyhow::ensure;
use std::sync::Arc;

/// Maps destination pixels of one chunk to source pixels.
pub trait ResamplingMap: Send + Sync {
    /// The source pixel for a destination pixel of the
    /// chunk, or `None` if it has no source.
    fn map(&self, dest: [usize; 2]) -> Option<[usize; 2]>;
}

/// Creates the resampling map of a destination chunk.
pub trait ResamplingMapFactory: Send + Sync {
    /// `None` if no pixel of the chunk has a source.
    fn create(&self, pos: &ChunkPosition) -> Result<Option<Box<dyn ResamplingMap>>>;
}

/// A resampling map tabulated for one chunk.
#[derive(Clone, Debug)]
pub struct TableMap {
    pos: ChunkPosition,
    coords: Vec<Option<[usize; 2]>>,
}

impl TableMap {
    /// Tabulate a map; `None` if every pixel is unmapped.
    pub fn tabulate<F>(pos: &ChunkPosition, func: F) -> Option<Self>
    where
        F: Fn([usize; 2]) -> Option<[usize; 2]>,
    {
        let end = pos.end();
        let mut coords = Vec::with_capacity(pos.values());
        for i in pos.start[ROW]..end[ROW] {
            for j in pos.start[COL]..end[COL] {
                coords.push(func([i, j]));
            }
        }
        if coords.iter().all(Option::is_none) {
            None
        } else {
            Some(TableMap { pos: *pos, coords })
        }
    }
}

impl ResamplingMap for TableMap {
    fn map(&self, dest: [usize; 2]) -> Option<[usize; 2]> {
        if !self.pos.contains(dest) {
            return None;
        }
        self.coords[self.pos.local_index(dest)]
    }
}

/// Maps through the affine transforms of the two grids:
/// each destination pixel centre falls into one source
/// pixel.
#[derive(Clone, Debug)]
pub struct AffineResamplingMapFactory {
    dest_to_source: PixelTransform,
    source_dims: [usize; 2],
}

impl AffineResamplingMapFactory {
    pub fn new(source: &EarthTransform, dest: &EarthTransform) -> Result<Self> {
        Ok(AffineResamplingMapFactory {
            dest_to_source: transform_between(dest, source)?,
            source_dims: source.dims,
        })
    }
}

impl ResamplingMapFactory for AffineResamplingMapFactory {
    fn create(&self, pos: &ChunkPosition) -> Result<Option<Box<dyn ResamplingMap>>> {
        let transformer = index_transformer(self.dest_to_source, self.source_dims);
        Ok(TableMap::tabulate(pos, transformer).map(|m| Box::new(m) as Box<dyn ResamplingMap>))
    }
}

/// Maps through previously saved source row and column
/// grids of the destination's dimensions.
#[derive(Clone, Debug)]
pub struct GridDataResamplingMapFactory {
    rows: Arc<Grid>,
    cols: Arc<Grid>,
    source_dims: [usize; 2],
}

impl GridDataResamplingMapFactory {
    pub fn new(rows: Arc<Grid>, cols: Arc<Grid>, source_dims: [usize; 2]) -> Result<Self> {
        ensure!(
            rows.dims() == cols.dims(),
            "source row grid {} is {:?} but source column grid {} is {:?}",
            rows.name,
            rows.dims(),
            cols.name,
            cols.dims()
        );
        ensure!(
            !rows.data_type().is_floating() && !cols.data_type().is_floating(),
            "source coordinate grids must hold integers"
        );
        Ok(GridDataResamplingMapFactory { rows, cols, source_dims })
    }

    pub fn dims(&self) -> [usize; 2] {
        self.rows.dims()
    }
}

impl ResamplingMapFactory for GridDataResamplingMapFactory {
    fn create(&self, pos: &ChunkPosition) -> Result<Option<Box<dyn ResamplingMap>>> {
        let rows = self.rows.read_chunk(pos)?;
        let cols = self.cols.read_chunk(pos)?;
        let dims = self.source_dims;
        let map = TableMap::tabulate(pos, |coords| {
            let idx = pos.local_index(coords);
            let (row, col) = (rows.value_f64(idx), cols.value_f64(idx));
            if row.is_nan() || col.is_nan() || row < 0. || col < 0. {
                return None;
            }
            let (row, col) = (row as usize, col as usize);
            if row < dims[ROW] && col < dims[COL] {
                Some([row, col])
            } else {
                None
            }
        });
        Ok(map.map(|m| Box::new(m) as Box<dyn ResamplingMap>))
    }
}
