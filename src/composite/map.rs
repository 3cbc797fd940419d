//! Per-pixel selection of the input file a coherent
//! composite takes its values from.

use crate::chunking::ChunkPosition;
use crate::data::{DataChunk, TypedChunk};
use crate::error::ToolError;
use crate::pipeline::ChunkFunction;
use crate::Result;
use anyhow::ensure;
use std::fmt;
use std::str::FromStr;

/// Map value of pixels no input file qualifies for.
pub const NO_SOURCE: i16 = i16::MIN;

/// Direction of an optimization variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Optimization {
    Min,
    Max,
}

impl Optimization {
    /// Whether `candidate` is strictly better than `current`.
    #[inline]
    pub fn is_better(self, candidate: f64, current: f64) -> bool {
        match self {
            Optimization::Min => candidate < current,
            Optimization::Max => candidate > current,
        }
    }
}

impl FromStr for Optimization {
    type Err = ToolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "min" => Ok(Optimization::Min),
            "max" => Ok(Optimization::Max),
            _ => Err(ToolError::configuration(format!("unknown optimization type '{}'", s))),
        }
    }
}

impl fmt::Display for Optimization {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Optimization::Min => "min",
            Optimization::Max => "max",
        })
    }
}

/// Computes the source index map of a coherent composite.
///
/// Inputs are laid out as one optimization chunk per file (if
/// optimizing), followed by one chunk per file for each
/// priority variable in priority order. The output holds the
/// 0-based index of the selected file, or [`NO_SOURCE`].
///
/// * Optimization only: the file with the best valid value.
/// * Priorities only: for the first priority variable valid
///   in any file, the last such file.
/// * Both: for the first priority variable valid in any file
///   that also has a valid optimization value, the best of
///   those files.
///
/// Ties keep the lowest index.
#[derive(Clone, Debug)]
pub struct CompositeMapFunction {
    files: usize,
    optimization: Option<Optimization>,
    priority_vars: usize,
}

impl CompositeMapFunction {
    pub fn new(files: usize, optimization: Option<Optimization>, priority_vars: usize) -> Result<Self> {
        if optimization.is_none() && priority_vars == 0 {
            return Err(ToolError::configuration("coherent map needs an optimization or a priority variable").into());
        }
        ensure!(
            files <= i16::MAX as usize,
            "too many input files for a source index map: {}",
            files
        );
        Ok(CompositeMapFunction {
            files,
            optimization,
            priority_vars,
        })
    }

    pub fn input_count(&self) -> usize {
        let opt = if self.optimization.is_some() { 1 } else { 0 };
        self.files * (opt + self.priority_vars)
    }

    fn best_file(&self, opt: Option<(Optimization, &[DataChunk])>, candidates: impl Iterator<Item = usize>, idx: usize) -> Option<usize> {
        match opt {
            Some((dir, chunks)) => {
                let mut best: Option<(usize, f64)> = None;
                for file in candidates {
                    let val = chunks[file].value_f64(idx);
                    if val.is_nan() {
                        continue;
                    }
                    match best {
                        Some((_, cur)) if !dir.is_better(val, cur) => {}
                        _ => best = Some((file, val)),
                    }
                }
                best.map(|(file, _)| file)
            }
            None => candidates.last(),
        }
    }
}

impl ChunkFunction for CompositeMapFunction {
    fn apply(&self, pos: &ChunkPosition, inputs: Vec<DataChunk>) -> Result<DataChunk> {
        ensure!(
            inputs.len() == self.input_count(),
            "expected {} input chunks for source index map, found {}",
            self.input_count(),
            inputs.len()
        );
        let len = pos.values();
        ensure!(
            inputs.iter().all(|c| c.values() == len),
            "input chunk size doesn't match position {:?}",
            pos.start
        );

        let (opt_chunks, priority) = match self.optimization {
            Some(_) => inputs.split_at(self.files),
            None => inputs.split_at(0),
        };
        let opt = self.optimization.map(|dir| (dir, opt_chunks));
        let priority: Vec<&[DataChunk]> = priority.chunks(self.files.max(1)).collect();

        let mut map = vec![NO_SOURCE; len];
        for (idx, out) in map.iter_mut().enumerate() {
            let file = if priority.is_empty() {
                self.best_file(opt, 0..self.files, idx)
            } else {
                priority.iter().find_map(|var| {
                    let valid = (0..self.files).filter(|&f| !var[f].is_missing(idx));
                    self.best_file(opt, valid, idx)
                })
            };
            if let Some(file) = file {
                *out = file as i16;
            }
        }
        Ok(TypedChunk::new(pos.length, map, Some(NO_SOURCE))?.into())
    }
}
