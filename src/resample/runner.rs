//! Register the variables of a dataset onto the grid of a
//! master dataset.

use super::diagnostic::{DiagnosticSummary, ResamplingDiagnostic, DEFAULT_SAMPLING_FACTOR};
use super::map::{AffineResamplingMapFactory, GridDataResamplingMapFactory, ResamplingMapFactory};
use super::operation::ResamplingOperation;
use crate::chunking::ChunkingScheme;
use crate::context::LogContext;
use crate::data::DataChunk;
use crate::dataset::{CachedGrid, DatasetReader, DatasetWriter, Grid, NamePattern};
use crate::error::ToolError;
use crate::geometry::EarthTransform;
use crate::pipeline::{run_operation, ChunkProducer, Execution, GridChunkProducer, ProgressFactory, SyntheticChunkProducer};
use crate::{verbose, Result};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Variable holding the source row of each destination pixel.
pub const SOURCE_ROW: &str = "source_row";
/// Variable holding the source column of each destination
/// pixel.
pub const SOURCE_COL: &str = "source_col";

/// Default tile size of registered variables.
pub const DEFAULT_TILE_DIMS: [usize; 2] = [512, 512];

/// A resampling map saved by an earlier registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedMap {
    pub path: PathBuf,
    pub row_var: String,
    pub col_var: String,
}

impl SavedMap {
    pub fn new(path: PathBuf) -> Self {
        SavedMap {
            path,
            row_var: SOURCE_ROW.into(),
            col_var: SOURCE_COL.into(),
        }
    }

    /// Parse `FILE` or `FILE/ROWVAR/COLVAR`. A spec naming an
    /// existing file is always taken as a plain file name.
    pub fn parse(spec: &str) -> Result<Self> {
        if spec.is_empty() {
            return Err(ToolError::configuration("empty map specification").into());
        }
        if Path::new(spec).exists() {
            return Ok(SavedMap::new(spec.into()));
        }
        let parts: Vec<&str> = spec.rsplitn(3, '/').collect();
        match parts[..] {
            [col, row, path] if !col.is_empty() && !row.is_empty() && !path.is_empty() => Ok(SavedMap {
                path: path.into(),
                row_var: row.into(),
                col_var: col.into(),
            }),
            _ => Ok(SavedMap::new(spec.into())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RegisterConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Dataset whose grid is the destination.
    pub master: PathBuf,
    pub saved_map: Option<SavedMap>,
    /// Write `source_row` and `source_col` to the output.
    pub save_map: bool,
    pub tile_dims: [usize; 2],
    /// Regular expression selecting the variables.
    pub match_pattern: Option<NamePattern>,
    pub execution: Execution,
    /// Sampling factor of the accuracy diagnostic, if run.
    pub diagnostic: Option<f64>,
    /// Overwrite an existing output.
    pub clobber: bool,
    pub history: Option<String>,
}

impl RegisterConfig {
    pub fn new(input: PathBuf, output: PathBuf, master: PathBuf) -> Self {
        RegisterConfig {
            input,
            output,
            master,
            saved_map: None,
            save_map: false,
            tile_dims: DEFAULT_TILE_DIMS,
            match_pattern: None,
            execution: Execution::from_flags(false, None),
            diagnostic: None,
            clobber: false,
            history: None,
        }
    }

    pub fn with_diagnostic(mut self) -> Self {
        self.diagnostic = Some(DEFAULT_SAMPLING_FACTOR);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_dims.iter().any(|&d| d == 0) {
            return Err(ToolError::configuration(format!("invalid tile dimensions {:?}", self.tile_dims)).into());
        }
        if self.output.exists() && !self.clobber {
            return Err(ToolError::configuration(format!(
                "output file {} already exists and clobber not specified",
                self.output.display()
            ))
            .into());
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct RegisterSummary {
    /// Names of the variables written, in output order.
    pub variables: Vec<String>,
    pub chunks: usize,
    pub diagnostic: Option<DiagnosticSummary>,
}

fn map_factory(ctx: &LogContext, config: &RegisterConfig, source: &EarthTransform, dest: &EarthTransform) -> Result<Arc<dyn ResamplingMapFactory>> {
    match &config.saved_map {
        Some(saved) => {
            verbose!(ctx, "accessing saved resampling map {}", saved.path.display());
            let reader = DatasetReader::open(&saved.path)?;
            let factory = GridDataResamplingMapFactory::new(
                reader.variable(&saved.row_var)?,
                reader.variable(&saved.col_var)?,
                source.dims,
            )?;
            if factory.dims() != dest.dims {
                return Err(ToolError::validation(format!(
                    "saved map is {:?} but destination grid is {:?}",
                    factory.dims(),
                    dest.dims
                ))
                .into());
            }
            Ok(Arc::new(factory))
        }
        None => {
            verbose!(ctx, "initializing direct resampling map");
            Ok(Arc::new(AffineResamplingMapFactory::new(source, dest)?))
        }
    }
}

fn coordinate_grid(name: &str, long_name: &str, dims: [usize; 2], tile_dims: [usize; 2]) -> Arc<CachedGrid> {
    let mut grid = CachedGrid::new(name, dims, tile_dims, DataChunk::prototype(Some(i32::MIN)));
    grid.set_attribute("long_name", long_name.into());
    Arc::new(grid)
}

/// Resample every selected variable of the input onto the
/// master grid.
///
/// All validation happens before the output file is created.
pub fn run_register(ctx: &LogContext, config: &RegisterConfig, progress: Option<&ProgressFactory>) -> Result<RegisterSummary> {
    config.validate()?;
    verbose!(ctx, "opening input file {}", config.input.display());
    let reader = DatasetReader::open(&config.input)?;
    let source = reader.info().transform.clone();
    verbose!(ctx, "accessing master file {}", config.master.display());
    let dest = DatasetReader::open(&config.master)
        .context("reading master file")?
        .info()
        .transform
        .clone();

    let variables: Vec<Arc<Grid>> = reader
        .variable_names()
        .filter(|name| config.match_pattern.as_ref().map_or(true, |p| p.matches(name)))
        .map(|name| reader.variable(name))
        .collect::<Result<_>>()?;
    if variables.is_empty() {
        return Err(ToolError::validation("no variables found for registration").into());
    }

    let mut factory = map_factory(ctx, config, &source, &dest)?;
    let diagnostic = match config.diagnostic {
        Some(factor) => {
            let diag = Arc::new(ResamplingDiagnostic::new(source.clone(), dest.clone(), factory.clone(), factor)?);
            factory = diag.clone();
            Some(diag)
        }
        None => None,
    };

    let mut info = reader.info().clone();
    info.transform = dest.clone();
    if let Some(command) = &config.history {
        info.push_history(command);
    }
    verbose!(ctx, "creating output file {}", config.output.display());
    let mut writer = DatasetWriter::create(&config.output, info)?;

    let mut operation = ResamplingOperation::new(factory);
    let mut outputs = vec![];
    for var in &variables {
        verbose!(ctx, "creating output variable {}", var.name);
        let mut grid = CachedGrid::new(&var.name, dest.dims, config.tile_dims, var.prototype());
        for (key, value) in &var.attributes {
            grid.set_attribute(key, value.clone());
        }
        let grid = Arc::new(grid);
        operation.add_variable(Arc::new(GridChunkProducer::new(var.clone())), grid.clone());
        outputs.push(grid);
    }

    if config.save_map {
        let scheme = variables[0].scheme();
        let coords: [(&str, &str, usize); 2] = [
            (SOURCE_ROW, "Row from source coordinate system", 0),
            (SOURCE_COL, "Column from source coordinate system", 1),
        ];
        for &(name, long_name, axis) in &coords {
            verbose!(ctx, "creating mapping variable {}", name);
            let producer: Arc<dyn ChunkProducer> = Arc::new(SyntheticChunkProducer::new(scheme.clone(), move |pixel| Some(pixel[axis] as i32)));
            let grid = coordinate_grid(name, long_name, dest.dims, config.tile_dims);
            operation.add_variable(producer, grid.clone());
            outputs.push(grid);
        }
    }

    let scheme = ChunkingScheme::new(dest.dims, config.tile_dims)?;
    let positions = scheme.positions();
    verbose!(ctx, "source has size {}x{}", source.dims[0], source.dims[1]);
    verbose!(ctx, "destination has size {}x{}", dest.dims[0], dest.dims[1]);
    verbose!(
        ctx,
        "processing {} chunks of size {}x{}",
        positions.len() * operation.variables(),
        scheme.chunk_size()[0],
        scheme.chunk_size()[1]
    );
    let hook = progress.and_then(|f| f("resampling", positions.len()));
    let chunks = run_operation(ctx, Arc::new(operation), positions, config.execution, hook).context("resampling")?;

    let mut names = Vec::with_capacity(outputs.len());
    for grid in &outputs {
        writer.add_cached(grid)?;
        names.push(grid.name().to_string());
    }
    verbose!(ctx, "closing files");
    writer.close()?;

    let diagnostic = match diagnostic {
        Some(diag) => {
            verbose!(ctx, "performing diagnostic");
            Some(diag.complete()?)
        }
        None => None,
    };
    Ok(RegisterSummary {
        variables: names,
        chunks,
        diagnostic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkPosition;
    use crate::dataset::{read_bin, Dataset, EarthDataInfo};
    use tempdir::TempDir;

    fn write(path: &Path, transform: EarthTransform, grids: Vec<Grid>) {
        let mut writer = DatasetWriter::create(path, EarthDataInfo::new(transform)).unwrap();
        for grid in grids {
            writer.add_grid(grid).unwrap();
        }
        writer.close().unwrap();
    }

    /// An 8x8 input at 0.25 degrees and a 6x6 master at 0.5
    /// degrees starting half a degree further north.
    fn setup(dir: &Path) -> (PathBuf, PathBuf) {
        let input = dir.join("input.cw");
        let sst: Vec<f32> = (0..64).map(|k| ((k / 8) * 10 + k % 8) as f32).collect();
        let cloud: Vec<i8> = (0..64).map(|k| (k % 3) as i8).collect();
        write(
            &input,
            EarthTransform::regular([8, 8], 48., -128., 0.25),
            vec![
                Grid::from_values("sst", [8, 8], [4, 4], sst, None)
                    .unwrap()
                    .with_attribute("units", "celsius".into()),
                Grid::from_values("cloud", [8, 8], [8, 8], cloud, Some(-1)).unwrap(),
            ],
        );
        let master = dir.join("master.cw");
        write(&master, EarthTransform::regular([6, 6], 48.5, -128., 0.5), vec![]);
        (input, master)
    }

    fn read_var(path: &Path, name: &str) -> Vec<f64> {
        let ds: Dataset = read_bin(path).unwrap();
        let grid = ds.grids.iter().find(|g| g.name == name).unwrap();
        grid.read_chunk(&ChunkPosition::new([0, 0], grid.dims())).unwrap().to_f64_vec()
    }

    #[test]
    fn register_onto_master() {
        let tmp_dir = TempDir::new("cwchunk_register").unwrap();
        let (input, master) = setup(tmp_dir.path());
        let output = tmp_dir.path().join("out.cw");
        let mut config = RegisterConfig::new(input, output.clone(), master);
        config.tile_dims = [4, 4];
        config.history = Some("cwregister2 input.cw out.cw".into());

        let summary = run_register(&LogContext::quiet("test"), &config, None).unwrap();
        assert_eq!(summary.variables, vec!["sst", "cloud"]);
        assert_eq!(summary.chunks, 4);
        assert!(summary.diagnostic.is_none());

        let ds: Dataset = read_bin(&output).unwrap();
        assert_eq!(ds.info.transform, EarthTransform::regular([6, 6], 48.5, -128., 0.5));
        assert_eq!(ds.info.history, vec!["cwregister2 input.cw out.cw"]);
        assert_eq!(ds.grids[0].tile_dims, [4, 4]);
        assert_eq!(ds.grids[0].attributes["units"], "celsius");

        let sst = read_var(&output, "sst");
        assert!(sst[..6].iter().all(|v| v.is_nan()));
        assert_eq!(sst[6], 11.);
        assert_eq!(sst[2 * 6 + 3], 37.);
        assert!(sst[2 * 6 + 4].is_nan());
        let cloud = read_var(&output, "cloud");
        assert_eq!(cloud[6], ((8 + 1) % 3) as f64);
        assert!(cloud[0].is_nan());
    }

    #[test]
    fn saved_map_reproduces_registration() {
        let tmp_dir = TempDir::new("cwchunk_register").unwrap();
        let (input, master) = setup(tmp_dir.path());
        let first = tmp_dir.path().join("first.cw");
        let mut config = RegisterConfig::new(input.clone(), first.clone(), master.clone());
        config.save_map = true;
        config.execution = Execution::Parallel(3);
        let summary = run_register(&LogContext::quiet("test"), &config, None).unwrap();
        assert_eq!(summary.variables, vec!["sst", "cloud", SOURCE_ROW, SOURCE_COL]);

        let rows = read_var(&first, SOURCE_ROW);
        let cols = read_var(&first, SOURCE_COL);
        assert!(rows[0].is_nan());
        assert_eq!((rows[6], cols[6]), (1., 1.));
        assert_eq!((rows[2 * 6 + 3], cols[2 * 6 + 3]), (3., 7.));

        let second = tmp_dir.path().join("second.cw");
        let mut config = RegisterConfig::new(input, second.clone(), master);
        config.saved_map = Some(SavedMap::parse(first.to_str().unwrap()).unwrap());
        config.match_pattern = Some("s.*".parse().unwrap());
        config.execution = Execution::Serial;
        let summary = run_register(&LogContext::quiet("test"), &config, None).unwrap();
        assert_eq!(summary.variables, vec!["sst"]);

        let (a, b) = (read_var(&first, "sst"), read_var(&second, "sst"));
        for (x, y) in a.iter().zip(b.iter()) {
            assert!(x == y || (x.is_nan() && y.is_nan()));
        }
    }

    #[test]
    fn diagnostic_summary() {
        let tmp_dir = TempDir::new("cwchunk_register").unwrap();
        let (input, master) = setup(tmp_dir.path());
        let mut config = RegisterConfig::new(input, tmp_dir.path().join("out.cw"), master).with_diagnostic();
        config.diagnostic = Some(1.);
        let summary = run_register(&LogContext::quiet("test"), &config, None).unwrap();
        let diag = summary.diagnostic.unwrap();
        // Rows 1..5 and columns 0..4 of the destination map
        // into the source.
        assert_eq!(diag.samples, 16);
        assert!(diag.omega.min() >= 0. && diag.omega.max() <= 1.);
        assert!(diag.distance.max() < 30.);
    }

    #[test]
    fn refuses_to_clobber() {
        let tmp_dir = TempDir::new("cwchunk_register").unwrap();
        let (input, master) = setup(tmp_dir.path());
        let output = tmp_dir.path().join("out.cw");
        std::fs::write(&output, b"keep").unwrap();

        let mut config = RegisterConfig::new(input, output.clone(), master);
        let err = run_register(&LogContext::quiet("test"), &config, None).unwrap_err();
        assert!(matches!(err.downcast_ref::<ToolError>(), Some(ToolError::Configuration(_))));
        assert_eq!(std::fs::read(&output).unwrap(), b"keep");

        config.clobber = true;
        assert!(run_register(&LogContext::quiet("test"), &config, None).is_ok());
    }

    #[test]
    fn variables_selected_by_expression() {
        let tmp_dir = TempDir::new("cwchunk_register").unwrap();
        let (input, master) = setup(tmp_dir.path());
        let ctx = LogContext::quiet("test");

        let mut config = RegisterConfig::new(input.clone(), tmp_dir.path().join("both.cw"), master.clone());
        config.match_pattern = Some("cloud|sst".parse().unwrap());
        assert_eq!(run_register(&ctx, &config, None).unwrap().variables, vec!["sst", "cloud"]);

        // The expression has to match the whole name.
        let mut config = RegisterConfig::new(input, tmp_dir.path().join("one.cw"), master);
        config.match_pattern = Some("clou".parse().unwrap());
        assert!(run_register(&ctx, &config, None).is_err());
        config.match_pattern = Some("c.*d".parse().unwrap());
        assert_eq!(run_register(&ctx, &config, None).unwrap().variables, vec!["cloud"]);
    }

    #[test]
    fn no_matching_variables() {
        let tmp_dir = TempDir::new("cwchunk_register").unwrap();
        let (input, master) = setup(tmp_dir.path());
        let output = tmp_dir.path().join("out.cw");
        let mut config = RegisterConfig::new(input, output.clone(), master);
        config.match_pattern = Some("chlor.*".parse().unwrap());
        let err = run_register(&LogContext::quiet("test"), &config, None).unwrap_err();
        assert!(matches!(err.downcast_ref::<ToolError>(), Some(ToolError::Validation(_))));
        assert!(!output.exists());
    }

    #[test]
    fn saved_map_must_match_destination() {
        let tmp_dir = TempDir::new("cwchunk_register").unwrap();
        let (input, master) = setup(tmp_dir.path());
        let map = tmp_dir.path().join("map.cw");
        write(
            &map,
            EarthTransform::regular([2, 2], 0., 0., 1.),
            vec![
                Grid::from_values("r", [2, 2], [2, 2], vec![0i32; 4], None).unwrap(),
                Grid::from_values("c", [2, 2], [2, 2], vec![0i32; 4], None).unwrap(),
            ],
        );
        let mut config = RegisterConfig::new(input, tmp_dir.path().join("out.cw"), master);
        config.saved_map = Some(SavedMap::parse(&format!("{}/r/c", map.display())).unwrap());
        let err = run_register(&LogContext::quiet("test"), &config, None).unwrap_err();
        assert!(matches!(err.downcast_ref::<ToolError>(), Some(ToolError::Validation(_))));
    }

    #[test]
    fn map_specifications() {
        let saved = SavedMap::parse("maps/grid.cw/row/col").unwrap();
        assert_eq!(saved.path, PathBuf::from("maps/grid.cw"));
        assert_eq!((saved.row_var.as_str(), saved.col_var.as_str()), ("row", "col"));
        let plain = SavedMap::parse("grid.cw").unwrap();
        assert_eq!(plain.row_var, SOURCE_ROW);
        assert!(SavedMap::parse("").is_err());
    }
}
