//! Full in-memory grids of a dataset variable.

use crate::chunking::{ChunkPosition, ChunkingScheme, COL, ROW};
use crate::data::{DataChunk, DataType, Sample, TypedChunk};
use crate::error::ToolError;
use crate::Result;
use anyhow::{bail, ensure};
use ndarray::{s, Array2};
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Values of a grid in one primitive type, with its missing
/// sentinel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridArray<T> {
    pub values: Array2<T>,
    pub missing: Option<T>,
}

impl<T: Sample> GridArray<T> {
    /// A grid with every value set to the missing sentinel
    /// (or zero if there is none).
    pub fn filled(dims: [usize; 2], missing: Option<T>) -> Result<Self> {
        let len = dims[ROW] * dims[COL];
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| ToolError::ResourceExhausted {
                values: len,
                type_name: T::NAME,
            })?;
        buf.resize(len, missing.unwrap_or_default());
        Ok(GridArray {
            values: Array2::from_shape_vec((dims[ROW], dims[COL]), buf)?,
            missing,
        })
    }

    pub fn read_chunk(&self, pos: &ChunkPosition) -> Result<TypedChunk<T>> {
        let end = pos.end();
        let view = self
            .values
            .slice(s![pos.start[ROW]..end[ROW], pos.start[COL]..end[COL]]);

        let mut buf = Vec::new();
        buf.try_reserve_exact(pos.values())
            .map_err(|_| ToolError::ResourceExhausted {
                values: pos.values(),
                type_name: T::NAME,
            })?;
        buf.extend(view.iter().cloned());
        TypedChunk::new(pos.length, buf, self.missing)
    }

    /// Write a chunk, translating its missing values into
    /// this grid's sentinel.
    pub fn write_chunk(&mut self, pos: &ChunkPosition, chunk: &TypedChunk<T>) {
        let end = pos.end();
        let fill = self.missing.unwrap_or_else(T::default_missing);
        let mut view = self
            .values
            .slice_mut(s![pos.start[ROW]..end[ROW], pos.start[COL]..end[COL]]);
        for (idx, dst) in view.iter_mut().enumerate() {
            *dst = if chunk.is_missing(idx) {
                fill
            } else {
                chunk.values()[idx]
            };
        }
    }
}

/// The values of a grid in any supported type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GridValues {
    Byte(GridArray<i8>),
    Short(GridArray<i16>),
    Int(GridArray<i32>),
    Long(GridArray<i64>),
    Float(GridArray<f32>),
    Double(GridArray<f64>),
}

/// Evaluate an expression with `$g` bound to the
/// [`GridArray`] inside a [`GridValues`].
#[macro_export]
macro_rules! dispatch_grid {
    ($grid:expr, $g:ident => $body:expr) => {
        match $grid {
            $crate::dataset::GridValues::Byte($g) => $body,
            $crate::dataset::GridValues::Short($g) => $body,
            $crate::dataset::GridValues::Int($g) => $body,
            $crate::dataset::GridValues::Long($g) => $body,
            $crate::dataset::GridValues::Float($g) => $body,
            $crate::dataset::GridValues::Double($g) => $body,
        }
    };
}

macro_rules! grid_values_from {
    ($($t:ty => $variant:ident),*) => {
        $(impl From<GridArray<$t>> for GridValues {
            fn from(array: GridArray<$t>) -> Self {
                GridValues::$variant(array)
            }
        })*
    };
}
grid_values_from!(i8 => Byte, i16 => Short, i32 => Int, i64 => Long, f32 => Float, f64 => Double);

impl GridValues {
    pub fn data_type(&self) -> DataType {
        match self {
            GridValues::Byte(_) => DataType::Byte,
            GridValues::Short(_) => DataType::Short,
            GridValues::Int(_) => DataType::Int,
            GridValues::Long(_) => DataType::Long,
            GridValues::Float(_) => DataType::Float,
            GridValues::Double(_) => DataType::Double,
        }
    }

    pub fn dims(&self) -> [usize; 2] {
        dispatch_grid!(self, g => {
            let (rows, cols) = g.values.dim();
            [rows, cols]
        })
    }

    /// A grid of the same type and missing sentinel as a
    /// prototype chunk.
    pub fn filled_like(proto: &DataChunk, dims: [usize; 2]) -> Result<GridValues> {
        Ok(crate::dispatch_chunk!(proto, c => GridArray::filled(dims, c.missing())?.into()))
    }
}

/// A named variable of a dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    /// Storage tile dimensions, `[rows, cols]`.
    pub tile_dims: [usize; 2],
    pub values: GridValues,
}

impl Grid {
    pub fn new(name: &str, tile_dims: [usize; 2], values: GridValues) -> Self {
        let dims = values.dims();
        let tile_dims = [tile_dims[ROW].max(1).min(dims[ROW].max(1)), tile_dims[COL].max(1).min(dims[COL].max(1))];
        Grid {
            name: name.into(),
            attributes: BTreeMap::new(),
            tile_dims,
            values,
        }
    }

    /// Wrap row-major values as a grid variable.
    pub fn from_values<T: Sample>(
        name: &str,
        dims: [usize; 2],
        tile_dims: [usize; 2],
        values: Vec<T>,
        missing: Option<T>,
    ) -> Result<Self>
    where
        GridArray<T>: Into<GridValues>,
    {
        let values = Array2::from_shape_vec((dims[ROW], dims[COL]), values)?;
        Ok(Grid::new(name, tile_dims, GridArray { values, missing }.into()))
    }

    pub fn with_attribute(mut self, key: &str, value: String) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn dims(&self) -> [usize; 2] {
        self.values.dims()
    }

    pub fn data_type(&self) -> DataType {
        self.values.data_type()
    }

    /// The chunking scheme matching the storage tiles.
    pub fn scheme(&self) -> ChunkingScheme {
        ChunkingScheme::tiled(self.dims(), self.tile_dims)
    }

    /// An empty chunk with this grid's type and missing
    /// sentinel.
    pub fn prototype(&self) -> DataChunk {
        dispatch_grid!(&self.values, g => DataChunk::prototype(g.missing))
    }

    fn check_bounds(&self, pos: &ChunkPosition) -> Result<()> {
        let dims = self.dims();
        let end = pos.end();
        ensure!(
            end[ROW] <= dims[ROW] && end[COL] <= dims[COL],
            "chunk at {:?} of size {:?} exceeds {}x{} grid {}",
            pos.start,
            pos.length,
            dims[ROW],
            dims[COL],
            self.name
        );
        Ok(())
    }

    pub fn read_chunk(&self, pos: &ChunkPosition) -> Result<DataChunk> {
        self.check_bounds(pos)?;
        Ok(dispatch_grid!(&self.values, g => g.read_chunk(pos)?.into()))
    }

    pub fn write_chunk(&mut self, pos: &ChunkPosition, chunk: &DataChunk) -> Result<()> {
        self.check_bounds(pos)?;
        ensure!(
            chunk.dims() == pos.length,
            "chunk of size {:?} written at position of size {:?}",
            chunk.dims(),
            pos.length
        );
        macro_rules! write_typed {
            ($($variant:ident),*) => {
                match (&mut self.values, chunk) {
                    $((GridValues::$variant(g), DataChunk::$variant(c)) => g.write_chunk(pos, c),)*
                    (g, c) => bail!("can't write {} chunk into {} grid {}", c.data_type(), g.data_type(), self.name),
                }
            };
        }
        write_typed!(Byte, Short, Int, Long, Float, Double);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_chunks() {
        let mut grid = Grid::new(
            "sst",
            [2, 2],
            GridArray::<f32>::filled([3, 5], Some(-999.)).unwrap().into(),
        );
        assert_eq!(grid.scheme().total_chunks(), 6);

        let pos = ChunkPosition::new([2, 4], [1, 1]);
        let chunk = DataChunk::from_values([1, 1], vec![3.5f32], None).unwrap();
        grid.write_chunk(&pos, &chunk).unwrap();

        let back = grid.read_chunk(&ChunkPosition::new([2, 3], [1, 2])).unwrap();
        let back = back.as_typed::<f32>().unwrap();
        assert_eq!(back.values(), &[-999., 3.5]);
        assert!(back.is_missing(0));

        assert!(grid.read_chunk(&ChunkPosition::new([2, 4], [2, 1])).is_err());
        let wrong = DataChunk::from_values([1, 1], vec![1i16], None).unwrap();
        assert!(grid.write_chunk(&pos, &wrong).is_err());
    }
}
