//! Composite a set of input datasets into one output dataset.

use super::apply::{CompositeMapApplicationCollector, CompositeMapApplicationFunction};
use super::coherent::{CoherentMap, CoherentMapBuilder, MapStorage};
use super::function::CompositeFunction;
use super::map::{CompositeMapFunction, Optimization};
use super::reduction::{Method, ValidThreshold};
use crate::chunking::ChunkingScheme;
use crate::context::LogContext;
use crate::dataset::{merge_info, CachedGrid, DatasetReader, DatasetWriter, MergeOptions, NamePattern};
use crate::error::ToolError;
use crate::pipeline::{
    run_operation, ChunkCollector, ChunkComputation, ChunkConsumer, ChunkFunction, ChunkProducer, Collector,
    Execution, GridChunkProducer, ProgressFactory,
};
use crate::{verbose, Result};
use anyhow::{anyhow, Context};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// An optimization variable and its direction, given as
/// `VARIABLE/min` or `VARIABLE/max`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptimalVariable {
    pub name: String,
    pub optimization: Optimization,
}

impl FromStr for OptimalVariable {
    type Err = ToolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || ToolError::configuration(format!("invalid optimal parameter '{}'", s));
        let (name, dir) = s.rsplit_once('/').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        Ok(OptimalVariable {
            name: name.into(),
            optimization: dir.parse()?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct CompositeConfig {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub method: Method,
    /// Minimum number of valid values for a pixel.
    pub min_valid: usize,
    pub threshold: ValidThreshold,
    /// Priority variables of coherent mode, in order.
    pub coherent: Vec<String>,
    pub optimal: Option<OptimalVariable>,
    /// Keep the coherent map in the output.
    pub save_map: bool,
    /// Regular expression selecting the variables.
    pub match_pattern: Option<NamePattern>,
    pub merge: MergeOptions,
    pub execution: Execution,
    /// Command line to append to the output history.
    pub history: Option<String>,
}

impl CompositeConfig {
    pub fn new(inputs: Vec<PathBuf>, output: PathBuf) -> Self {
        CompositeConfig {
            inputs,
            output,
            method: Method::Mean,
            min_valid: 1,
            threshold: ValidThreshold::default(),
            coherent: vec![],
            optimal: None,
            save_map: false,
            match_pattern: None,
            merge: MergeOptions::default(),
            execution: Execution::from_flags(false, None),
            history: None,
        }
    }

    pub fn is_coherent(&self) -> bool {
        self.method == Method::Optimal || !self.coherent.is_empty()
    }

    /// Check option combinations.
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(ToolError::configuration("no input files specified").into());
        }
        if self.is_coherent() && !self.method.allows_coherent() {
            return Err(ToolError::configuration(format!(
                "coherent mode is not supported with method {}",
                self.method
            ))
            .into());
        }
        if self.optimal.is_some() && self.method != Method::Optimal {
            return Err(ToolError::configuration("an optimal variable requires method optimal").into());
        }
        if self.min_valid == 0 {
            return Err(ToolError::configuration("minimum valid count must be at least 1").into());
        }
        Ok(())
    }
}

/// Locate a satellite or sensor zenith angle variable.
pub fn find_zenith_variable(reader: &DatasetReader) -> Option<String> {
    reader
        .variable_names()
        .find(|name| {
            let name = name.to_lowercase().replace(|c: char| c == '_' || c == '-', " ");
            name.contains("zenith") && (name.contains("sat") || name.contains("sensor"))
        })
        .map(String::from)
}

fn producer(reader: &DatasetReader, name: &str) -> Result<Arc<dyn ChunkProducer>> {
    Ok(Arc::new(GridChunkProducer::new(reader.variable(name)?)))
}

fn missing_from<'a>(inputs: &'a [DatasetReader], name: &'a str) -> impl Iterator<Item = &'a DatasetReader> + 'a {
    inputs.iter().filter(move |r| r.find_variable(name).is_none())
}

/// The tile size shared by most of the grids, the first one
/// seen on ties.
fn most_common_tile_dims(schemes: impl Iterator<Item = ChunkingScheme>) -> Option<[usize; 2]> {
    let mut counts: Vec<([usize; 2], usize)> = vec![];
    for scheme in schemes {
        let dims = scheme.chunk_size();
        match counts.iter_mut().find(|(d, _)| *d == dims) {
            Some((_, n)) => *n += 1,
            None => counts.push((dims, 1)),
        }
    }
    let mut best: Option<([usize; 2], usize)> = None;
    for (dims, n) in counts {
        if best.map_or(true, |(_, b)| n > b) {
            best = Some((dims, n));
        }
    }
    best.map(|(dims, _)| dims)
}

/// Open the inputs and check they fit together.
fn open_inputs(ctx: &LogContext, config: &CompositeConfig) -> Result<Vec<DatasetReader>> {
    let mut inputs = Vec::with_capacity(config.inputs.len());
    for path in &config.inputs {
        verbose!(ctx, "reading input {}", path.display());
        let reader = DatasetReader::open(path)?;
        if let Some(first) = inputs.first().map(|r: &DatasetReader| r.info()) {
            if !reader.info().transform.is_congruent(&first.transform) {
                return Err(ToolError::validation(format!(
                    "earth transform of {} doesn't match {}",
                    path.display(),
                    config.inputs[0].display()
                ))
                .into());
            }
        }
        inputs.push(reader);
    }
    if config.method == Method::Latest {
        inputs.sort_by_key(|r| r.info().start_date());
    }
    Ok(inputs)
}

/// Names of the variables to composite.
fn select_variables(inputs: &[DatasetReader], pattern: Option<&NamePattern>) -> Result<Vec<String>> {
    let names: BTreeSet<&str> = inputs
        .iter()
        .flat_map(|r| r.variable_names())
        .filter(|name| pattern.map_or(true, |p| p.matches(name)))
        .collect();
    if names.is_empty() {
        return Err(ToolError::validation("no matching variables found in input files").into());
    }
    Ok(names.into_iter().map(String::from).collect())
}

/// Each variable must have a single type across the inputs.
fn check_types(inputs: &[DatasetReader], variables: &[String]) -> Result<()> {
    for name in variables {
        let mut grids = inputs.iter().filter_map(|r| r.find_variable(name).map(|g| (r, g)));
        if let Some((first, grid)) = grids.next() {
            for (reader, other) in grids {
                if other.data_type() != grid.data_type() {
                    return Err(ToolError::validation(format!(
                        "variable {} is {} in {} but {} in {}",
                        name,
                        grid.data_type(),
                        first.path().display(),
                        other.data_type(),
                        reader.path().display()
                    ))
                    .into());
                }
            }
        }
    }
    Ok(())
}

/// Selection rules of a coherent composite, checked against
/// every input.
struct CoherentPlan {
    optimal: Option<OptimalVariable>,
    priority: Vec<String>,
}

impl CoherentPlan {
    fn new(config: &CompositeConfig, inputs: &[DatasetReader], variables: &[String]) -> Result<Self> {
        let optimal = match (&config.optimal, config.method) {
            (Some(opt), _) => Some(opt.clone()),
            (None, Method::Optimal) => {
                let name = find_zenith_variable(&inputs[0]).ok_or_else(|| {
                    ToolError::configuration("cannot locate satellite zenith angle data, use an explicit optimal variable")
                })?;
                Some(OptimalVariable {
                    name,
                    optimization: Optimization::Min,
                })
            }
            (None, _) => None,
        };

        let required = optimal
            .iter()
            .map(|o| o.name.as_str())
            .chain(config.coherent.iter().map(String::as_str))
            .chain(variables.iter().map(String::as_str));
        for name in required {
            if let Some(reader) = missing_from(inputs, name).next() {
                return Err(ToolError::validation(format!(
                    "variable {} required in coherent mode is missing from {}",
                    name,
                    reader.path().display()
                ))
                .into());
            }
        }
        Ok(CoherentPlan {
            optimal,
            priority: config.coherent.clone(),
        })
    }

    fn selection_variables(&self) -> impl Iterator<Item = &str> {
        self.optimal
            .iter()
            .map(|o| o.name.as_str())
            .chain(self.priority.iter().map(String::as_str))
    }

    fn build_map(
        &self,
        ctx: &LogContext,
        inputs: &[DatasetReader],
        writer: &mut DatasetWriter,
        config: &CompositeConfig,
        progress: Option<&ProgressFactory>,
    ) -> Result<CoherentMap> {
        let mut collector = ChunkCollector::new();
        for name in self.selection_variables() {
            for reader in inputs {
                collector.add_producer(producer(reader, name)?);
            }
        }
        let tile_dims = most_common_tile_dims(collector.producers().iter().map(|p| p.native_scheme()))
            .ok_or_else(|| anyhow!("no variables to build the source index map from"))?;
        let files: Vec<String> = inputs.iter().map(|r| r.path().display().to_string()).collect();
        let function = CompositeMapFunction::new(
            inputs.len(),
            self.optimal.as_ref().map(|o| o.optimization),
            self.priority.len(),
        )?;
        if let Some(opt) = &self.optimal {
            verbose!(ctx, "selecting the {} value of {}", opt.optimization, opt.name);
        }

        let builder = CoherentMapBuilder::new(writer.info().dims(), tile_dims, &files);
        let hook = progress.and_then(|f| f(super::coherent::SOURCE_INDEX, builder.scheme().total_chunks()));
        let computed = builder.compute(ctx, collector, function, config.execution, hook)?;
        if config.save_map {
            computed.persist(MapStorage::Output(writer))
        } else {
            let info = writer.info().clone();
            computed.persist(MapStorage::Scratch(&info))
        }
    }
}

/// Composite every selected variable of the inputs into the
/// output dataset, returning the names written.
///
/// All validation happens before the output file is created.
pub fn run_composite(ctx: &LogContext, config: &CompositeConfig, progress: Option<&ProgressFactory>) -> Result<Vec<String>> {
    config.validate()?;
    let inputs = open_inputs(ctx, config)?;
    let variables = select_variables(&inputs, config.match_pattern.as_ref())?;
    check_types(&inputs, &variables)?;
    let plan = if config.is_coherent() {
        Some(CoherentPlan::new(config, &inputs, &variables)?)
    } else {
        None
    };

    let infos: Vec<_> = inputs.iter().map(|r| r.info()).collect();
    let mut info = merge_info(&infos, config.merge).ok_or_else(|| anyhow!("no input metadata"))?;
    if let Some(command) = &config.history {
        info.push_history(command);
    }
    let dims = info.dims();
    let mut writer = DatasetWriter::create(&config.output, info)?;

    let map = match &plan {
        Some(plan) => Some(plan.build_map(ctx, &inputs, &mut writer, config, progress)?),
        None => None,
    };

    for name in &variables {
        let proto_grid = inputs
            .iter()
            .find_map(|r| r.find_variable(name))
            .ok_or_else(|| anyhow!("variable {} vanished from inputs", name))?;
        let prototype = proto_grid.prototype();
        let mut grid = CachedGrid::new(name, dims, proto_grid.tile_dims, prototype.clone());
        for (key, value) in &proto_grid.attributes {
            grid.set_attribute(key, value.clone());
        }
        let grid = Arc::new(grid);

        let (collector, function): (Arc<dyn Collector>, Arc<dyn ChunkFunction>) = match &map {
            Some(map) => {
                let producers = inputs.iter().map(|r| producer(r, name)).collect::<Result<Vec<_>>>()?;
                (
                    Arc::new(CompositeMapApplicationCollector::new(map.producer(), producers)),
                    Arc::new(CompositeMapApplicationFunction::new(inputs.len(), grid.prototype().clone())),
                )
            }
            None => {
                let reduction = config
                    .method
                    .reduction()
                    .ok_or_else(|| anyhow!("method {} needs coherent mode", config.method))?;
                if reduction.is_arithmetic() && !prototype.data_type().is_floating() {
                    ctx.warn(format_args!(
                        "computing the {} of integer variable {}, results are rounded",
                        config.method, name
                    ));
                }
                let producers = inputs
                    .iter()
                    .filter(|r| r.find_variable(name).is_some())
                    .map(|r| producer(r, name))
                    .collect::<Result<Vec<_>>>()?;
                (
                    Arc::new(ChunkCollector::with_producers(producers)),
                    Arc::new(CompositeFunction::new(
                        reduction,
                        config.min_valid,
                        config.threshold,
                        grid.prototype().clone(),
                    )),
                )
            }
        };

        verbose!(ctx, "compositing {} from {} inputs", name, collector.input_count() - map.iter().count());
        let computation = ChunkComputation::new(collector, function, grid.clone()).tracked();
        let computation = Arc::new(computation);
        let positions = grid.native_scheme().positions();
        let hook = progress.and_then(|f| f(name.as_str(), positions.len()));
        run_operation(ctx, computation.clone(), positions, config.execution, hook)
            .with_context(|| format!("compositing {}", name))?;
        if let Some(times) = computation.times() {
            tracing::debug!(
                "{}: collect {:.3}s, compute {:.3}s, write {:.3}s",
                name,
                times.collect_secs,
                times.apply_secs,
                times.consume_secs
            );
        }
        writer.add_cached(&grid)?;
    }

    if let Some(map) = map {
        map.close()?;
    }
    writer.close()?;
    Ok(variables)
}
