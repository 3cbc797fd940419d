//! Typed buffers of grid values for one chunk position.
//!
//! A [`DataChunk`] holds the dense, row-major values of one
//! chunk in its external numeric type, together with the
//! sentinel marking missing values. Floating point values are
//! also missing when NaN.
//!
//! Code that needs to work on the values generically does so
//! through [`TypedChunk`] and the [`Sample`] trait, usually
//! via the [`dispatch_chunk!`] macro.

use crate::chunking::{ChunkPosition, COL, ROW};
use crate::error::ToolError;
use crate::Result;
use anyhow::{bail, ensure};
use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// External numeric type of grid values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl DataType {
    pub fn is_floating(self) -> bool {
        matches!(self, DataType::Float | DataType::Double)
    }

    pub fn bytes(self) -> usize {
        match self {
            DataType::Byte => 1,
            DataType::Short => 2,
            DataType::Int | DataType::Float => 4,
            DataType::Long | DataType::Double => 8,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DataType::Byte => "byte",
            DataType::Short => "short",
            DataType::Int => "int",
            DataType::Long => "long",
            DataType::Float => "float",
            DataType::Double => "double",
        };
        f.write_str(name)
    }
}

/// A primitive type that chunk values can be stored in.
pub trait Sample: Copy + PartialEq + PartialOrd + Default + Send + Sync + fmt::Debug + 'static {
    const TYPE: DataType;
    const NAME: &'static str;

    /// The sentinel used when a chunk of this type needs to
    /// mark values missing but has none of its own.
    fn default_missing() -> Self;

    fn to_f64(self) -> f64;

    /// Convert back from `f64`, rounding to nearest and
    /// saturating for integer types. A result equal to the
    /// chunk's missing sentinel is not moved off it and reads
    /// back as missing.
    fn from_f64(val: f64) -> Self;

    fn is_nan(self) -> bool;

    fn wrap(chunk: TypedChunk<Self>) -> DataChunk;
    fn typed(chunk: &DataChunk) -> Option<&TypedChunk<Self>>;
    fn typed_mut(chunk: &mut DataChunk) -> Option<&mut TypedChunk<Self>>;
}

macro_rules! impl_sample {
    ($t:ty, $variant:ident, $name:expr, $missing:expr, int) => {
        impl_sample!(@common $t, $variant, $name, $missing);
        impl Sample for $t {
            const TYPE: DataType = DataType::$variant;
            const NAME: &'static str = $name;
            #[inline]
            fn default_missing() -> Self {
                $missing
            }
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
            #[inline]
            fn from_f64(val: f64) -> Self {
                val.round() as $t
            }
            #[inline]
            fn is_nan(self) -> bool {
                false
            }
            impl_sample!(@wrap $t, $variant);
        }
    };
    ($t:ty, $variant:ident, $name:expr, $missing:expr, float) => {
        impl_sample!(@common $t, $variant, $name, $missing);
        impl Sample for $t {
            const TYPE: DataType = DataType::$variant;
            const NAME: &'static str = $name;
            #[inline]
            fn default_missing() -> Self {
                $missing
            }
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
            #[inline]
            fn from_f64(val: f64) -> Self {
                val as $t
            }
            #[inline]
            fn is_nan(self) -> bool {
                <$t>::is_nan(self)
            }
            impl_sample!(@wrap $t, $variant);
        }
    };
    (@common $t:ty, $variant:ident, $name:expr, $missing:expr) => {
        impl From<TypedChunk<$t>> for DataChunk {
            fn from(chunk: TypedChunk<$t>) -> Self {
                DataChunk::$variant(chunk)
            }
        }
    };
    (@wrap $t:ty, $variant:ident) => {
        #[inline]
        fn wrap(chunk: TypedChunk<Self>) -> DataChunk {
            DataChunk::$variant(chunk)
        }
        #[inline]
        fn typed(chunk: &DataChunk) -> Option<&TypedChunk<Self>> {
            match chunk {
                DataChunk::$variant(c) => Some(c),
                _ => None,
            }
        }
        #[inline]
        fn typed_mut(chunk: &mut DataChunk) -> Option<&mut TypedChunk<Self>> {
            match chunk {
                DataChunk::$variant(c) => Some(c),
                _ => None,
            }
        }
    };
}

impl_sample!(i8, Byte, "byte", i8::MIN, int);
impl_sample!(i16, Short, "short", i16::MIN, int);
impl_sample!(i32, Int, "int", i32::MIN, int);
impl_sample!(i64, Long, "long", i64::MIN, int);
impl_sample!(f32, Float, "float", f32::NAN, float);
impl_sample!(f64, Double, "double", f64::NAN, float);

/// Values of one chunk in a concrete primitive type.
#[derive(Clone, Debug, PartialEq)]
pub struct TypedChunk<T> {
    dims: [usize; 2],
    values: Vec<T>,
    missing: Option<T>,
}

impl<T: Sample> TypedChunk<T> {
    /// Wrap row-major values.
    pub fn new(dims: [usize; 2], values: Vec<T>, missing: Option<T>) -> Result<Self> {
        ensure!(
            dims[0] * dims[1] == values.len(),
            "{}x{} chunk given {} values",
            dims[0],
            dims[1],
            values.len()
        );
        Ok(TypedChunk {
            dims,
            values,
            missing,
        })
    }

    /// A zero-filled chunk, failing cleanly if the buffer
    /// can't be allocated.
    pub fn zeroed(dims: [usize; 2], missing: Option<T>) -> Result<Self> {
        let len = dims[0] * dims[1];
        let mut values = Vec::new();
        values
            .try_reserve_exact(len)
            .map_err(|_| ToolError::ResourceExhausted {
                values: len,
                type_name: T::NAME,
            })?;
        values.resize(len, T::default());
        Ok(TypedChunk {
            dims,
            values,
            missing,
        })
    }

    #[inline]
    pub fn dims(&self) -> [usize; 2] {
        self.dims
    }

    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<T> {
        self.values
    }

    #[inline]
    pub fn missing(&self) -> Option<T> {
        self.missing
    }

    #[inline]
    pub fn is_missing(&self, idx: usize) -> bool {
        let val = self.values[idx];
        val.is_nan() || Some(val) == self.missing
    }

    /// Mark a value missing, adopting the type's default
    /// sentinel if the chunk has none yet.
    #[inline]
    pub fn set_missing(&mut self, idx: usize) {
        let missing = *self.missing.get_or_insert_with(T::default_missing);
        self.values[idx] = missing;
    }

    /// Adopt the type's default sentinel if there is no
    /// missing value yet.
    pub fn with_default_missing(mut self) -> Self {
        self.missing.get_or_insert_with(T::default_missing);
        self
    }

    /// The value as `f64`, or NaN if missing.
    #[inline]
    pub fn value_f64(&self, idx: usize) -> f64 {
        if self.is_missing(idx) {
            f64::NAN
        } else {
            self.values[idx].to_f64()
        }
    }

    /// Copy the values where two chunk positions overlap.
    /// Missing values of `src` are written as this chunk's
    /// sentinel.
    pub fn copy_overlap(&mut self, pos: &ChunkPosition, src: &TypedChunk<T>, src_pos: &ChunkPosition) {
        let (end, src_end) = (pos.end(), src_pos.end());
        let start = [pos.start[ROW].max(src_pos.start[ROW]), pos.start[COL].max(src_pos.start[COL])];
        let end = [end[ROW].min(src_end[ROW]), end[COL].min(src_end[COL])];
        for i in start[ROW]..end[ROW] {
            for j in start[COL]..end[COL] {
                let s = src_pos.local_index([i, j]);
                let d = pos.local_index([i, j]);
                if src.is_missing(s) {
                    self.set_missing(d);
                } else {
                    self.values[d] = src.values[s];
                }
            }
        }
    }
}

/// A chunk of values in one of the supported external types.
#[derive(Clone, Debug, PartialEq)]
pub enum DataChunk {
    Byte(TypedChunk<i8>),
    Short(TypedChunk<i16>),
    Int(TypedChunk<i32>),
    Long(TypedChunk<i64>),
    Float(TypedChunk<f32>),
    Double(TypedChunk<f64>),
}

/// Evaluate an expression with `$c` bound to the
/// [`TypedChunk`] inside a [`DataChunk`], whatever its type.
#[macro_export]
macro_rules! dispatch_chunk {
    ($chunk:expr, $c:ident => $body:expr) => {
        match $chunk {
            $crate::data::DataChunk::Byte($c) => $body,
            $crate::data::DataChunk::Short($c) => $body,
            $crate::data::DataChunk::Int($c) => $body,
            $crate::data::DataChunk::Long($c) => $body,
            $crate::data::DataChunk::Float($c) => $body,
            $crate::data::DataChunk::Double($c) => $body,
        }
    };
}

impl DataChunk {
    pub fn from_values<T: Sample>(dims: [usize; 2], values: Vec<T>, missing: Option<T>) -> Result<Self> {
        Ok(T::wrap(TypedChunk::new(dims, values, missing)?))
    }

    /// An empty chunk of the given type, used as a prototype
    /// describing the output of a consumer.
    pub fn prototype<T: Sample>(missing: Option<T>) -> Self {
        T::wrap(TypedChunk {
            dims: [0, 0],
            values: vec![],
            missing,
        })
    }

    pub fn data_type(&self) -> DataType {
        match self {
            DataChunk::Byte(_) => DataType::Byte,
            DataChunk::Short(_) => DataType::Short,
            DataChunk::Int(_) => DataType::Int,
            DataChunk::Long(_) => DataType::Long,
            DataChunk::Float(_) => DataType::Float,
            DataChunk::Double(_) => DataType::Double,
        }
    }

    pub fn dims(&self) -> [usize; 2] {
        dispatch_chunk!(self, c => c.dims())
    }

    pub fn values(&self) -> usize {
        dispatch_chunk!(self, c => c.values().len())
    }

    pub fn is_empty(&self) -> bool {
        self.values() == 0
    }

    /// A zero-filled chunk with this chunk's type and missing
    /// sentinel.
    pub fn blank_copy(&self, dims: [usize; 2]) -> Result<DataChunk> {
        Ok(dispatch_chunk!(self, c => TypedChunk::zeroed(dims, c.missing())?.into()))
    }

    pub fn with_default_missing(self) -> Self {
        dispatch_chunk!(self, c => c.with_default_missing().into())
    }

    #[inline]
    pub fn is_missing(&self, idx: usize) -> bool {
        dispatch_chunk!(self, c => c.is_missing(idx))
    }

    pub fn set_missing(&mut self, idx: usize) {
        dispatch_chunk!(self, c => c.set_missing(idx))
    }

    /// Check if at least one value is not missing.
    pub fn any_valid(&self) -> bool {
        dispatch_chunk!(self, c => (0..c.values().len()).any(|i| !c.is_missing(i)))
    }

    #[inline]
    pub fn value_f64(&self, idx: usize) -> f64 {
        dispatch_chunk!(self, c => c.value_f64(idx))
    }

    /// All values as `f64`, missing values as NaN.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.values()).map(|i| self.value_f64(i)).collect()
    }

    /// Copy one raw value from a chunk of the same type.
    /// Returns false if the types differ.
    #[inline]
    pub fn copy_value_from(&mut self, dst_idx: usize, src: &DataChunk, src_idx: usize) -> bool {
        macro_rules! copy {
            ($($variant:ident),*) => {
                match (self, src) {
                    $((DataChunk::$variant(d), DataChunk::$variant(s)) => {
                        if s.is_missing(src_idx) {
                            d.set_missing(dst_idx);
                        } else {
                            d.values_mut()[dst_idx] = s.values()[src_idx];
                        }
                        true
                    })*
                    _ => false,
                }
            };
        }
        copy!(Byte, Short, Int, Long, Float, Double)
    }

    /// See [`TypedChunk::copy_overlap`]. Fails if the types
    /// differ.
    pub fn copy_overlap(&mut self, pos: &ChunkPosition, src: &DataChunk, src_pos: &ChunkPosition) -> Result<()> {
        macro_rules! copy {
            ($($variant:ident),*) => {
                match (self, src) {
                    $((DataChunk::$variant(d), DataChunk::$variant(s)) => {
                        d.copy_overlap(pos, s, src_pos);
                        Ok(())
                    })*
                    (d, s) => bail!("can't copy {} values into {} chunk", s.data_type(), d.data_type()),
                }
            };
        }
        copy!(Byte, Short, Int, Long, Float, Double)
    }

    pub fn as_typed<T: Sample>(&self) -> Option<&TypedChunk<T>> {
        T::typed(self)
    }
}
