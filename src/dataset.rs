//! Earth datasets stored on disk.
//!
//! A dataset is a set of named 2D grid variables sharing the
//! navigation and metadata in an [`EarthDataInfo`]. On disk
//! it is a single CBOR document, read through a memory map.
//!
//! Reading loads the dataset whole; producers then share
//! the grids read-only, so concurrent reads of disjoint
//! chunks need no locking. Writing goes through a
//! [`DatasetWriter`], which collects finished grids and
//! persists them when closed.

use crate::error::ToolError;
use crate::Result;
use anyhow::{anyhow, Context};
use regex::Regex;
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

mod cached;
mod grid;
mod info;

pub use cached::CachedGrid;
pub use grid::{Grid, GridArray, GridValues};
pub use info::{merge_info, EarthDataInfo, MergeOptions, TimePeriod};

/// Default storage tile size, in values.
pub const DEFAULT_TILE_VALUES: usize = 512 * 512;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub info: EarthDataInfo,
    pub grids: Vec<Grid>,
}

pub fn write_bin<T: serde::Serialize>(path: &Path, data: &T) -> Result<()> {
    let file = File::create(path)?;
    let buf = std::io::BufWriter::with_capacity(0x100000, file);
    serde_cbor::to_writer(buf, data)?;
    Ok(())
}

pub fn read_bin<T: for<'a> serde::Deserialize<'a>>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    let file = unsafe { memmap::MmapOptions::new().map(&file)? };
    Ok(serde_cbor::from_slice(file.as_ref())?)
}

/// Regular expression selecting variables by name. The
/// expression must match the whole name.
#[derive(Clone, Debug)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
            ToolError::configuration(format!("invalid variable pattern '{}': {}", pattern, e))
        })?;
        Ok(NamePattern {
            source: pattern.into(),
            regex,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for NamePattern {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        NamePattern::new(s)
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A dataset opened for reading.
#[derive(Clone, Debug)]
pub struct DatasetReader {
    path: PathBuf,
    info: EarthDataInfo,
    grids: Vec<Arc<Grid>>,
}

impl DatasetReader {
    pub fn open(path: &Path) -> Result<Self> {
        let ds: Dataset = read_bin(path).with_context(|| format!("reading dataset {}", path.display()))?;
        Ok(DatasetReader::from_dataset(path, ds))
    }

    pub fn from_dataset(path: &Path, ds: Dataset) -> Self {
        DatasetReader {
            path: path.into(),
            info: ds.info,
            grids: ds.grids.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &EarthDataInfo {
        &self.info
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.grids.iter().map(|g| g.name.as_str())
    }

    pub fn find_variable(&self, name: &str) -> Option<&Arc<Grid>> {
        self.grids.iter().find(|g| g.name == name)
    }

    pub fn variable(&self, name: &str) -> Result<Arc<Grid>> {
        self.find_variable(name)
            .cloned()
            .ok_or_else(|| anyhow!("variable {} not found in {}", name, self.path.display()))
    }
}

/// Collects the grids of a dataset being created and writes
/// them out on [`close`](DatasetWriter::close).
pub struct DatasetWriter {
    path: PathBuf,
    info: EarthDataInfo,
    grids: Vec<Grid>,
}

impl DatasetWriter {
    /// Start a dataset at `path`. The file is created (and
    /// truncated) immediately so that failures to open it
    /// surface before any work is done.
    pub fn create(path: &Path, info: EarthDataInfo) -> Result<Self> {
        File::create(path).with_context(|| format!("creating dataset {}", path.display()))?;
        Ok(DatasetWriter {
            path: path.into(),
            info,
            grids: vec![],
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &EarthDataInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut EarthDataInfo {
        &mut self.info
    }

    pub fn add_grid(&mut self, grid: Grid) -> Result<()> {
        if self.grids.iter().any(|g| g.name == grid.name) {
            return Err(anyhow!("variable {} already in {}", grid.name, self.path.display()));
        }
        self.grids.push(grid);
        Ok(())
    }

    /// Assemble a cached grid and add it.
    pub fn add_cached(&mut self, grid: &CachedGrid) -> Result<()> {
        let grid = grid.assemble()?;
        self.add_grid(grid)
    }

    pub fn grids(&self) -> &[Grid] {
        &self.grids
    }

    /// Persist the dataset, returning it for further reading.
    pub fn close(self) -> Result<Dataset> {
        let path = self.path;
        let ds = Dataset {
            info: self.info,
            grids: self.grids,
        };
        write_bin(&path, &ds).with_context(|| format!("writing dataset {}", path.display()))?;
        Ok(ds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::EarthTransform;
    use tempdir::TempDir;

    #[test]
    fn variable_patterns() -> Result<()> {
        let sst: NamePattern = "sst.*".parse()?;
        assert!(sst.matches("sst"));
        assert!(sst.matches("sst_night"));
        assert!(!sst.matches("night_sst"));

        let either = NamePattern::new("sst|chlor_a")?;
        assert!(either.matches("sst"));
        assert!(either.matches("chlor_a"));
        assert!(!either.matches("sst_night"));
        assert!(!either.matches("chlor_a_err"));

        let zenith = NamePattern::new(".*zenith.*")?;
        assert!(zenith.matches("sat_zenith_angle"));
        assert_eq!(zenith.as_str(), ".*zenith.*");

        let err = NamePattern::new("sst(").unwrap_err();
        assert!(matches!(err.downcast_ref::<ToolError>(), Some(ToolError::Configuration(_))));
        Ok(())
    }

    #[test]
    fn create_read_dataset() -> Result<()> {
        let tmp_dir = TempDir::new("cwchunk_test").unwrap();
        let path = tmp_dir.path().join("foo.cw");

        let info = EarthDataInfo::new(EarthTransform::regular([2, 3], 10., 20., 0.5));
        let mut writer = DatasetWriter::create(&path, info.clone())?;
        writer.add_grid(Grid::from_values("sst", [2, 3], [2, 3], vec![1f32, 2., 3., 4., 5., f32::NAN], None)?)?;
        writer.add_grid(Grid::from_values("cloud", [2, 3], [1, 3], vec![0i8; 6], Some(-1))?)?;
        assert!(writer
            .add_grid(Grid::from_values("sst", [2, 3], [1, 1], vec![0i8; 6], None)?)
            .is_err());
        writer.close()?;

        let reader = DatasetReader::open(&path)?;
        assert_eq!(reader.info(), &info);
        assert_eq!(reader.variable_names().collect::<Vec<_>>(), vec!["sst", "cloud"]);
        let sst = reader.variable("sst")?;
        assert_eq!(sst.tile_dims, [2, 3]);
        assert!(reader.find_variable("chlor_a").is_none());
        assert!(reader.variable("chlor_a").is_err());
        Ok(())
    }
}
