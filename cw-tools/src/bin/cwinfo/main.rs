use rayon::prelude::*;
use serde_derive::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use cw_tools::{cli::*, utils::*, *};
use cwchunk::data::DataType;
use cwchunk::dataset::{DatasetReader, EarthDataInfo, Grid};
use cwchunk::stats::SampleStats;

// Main function
cw_tools::sync_main!(run());

fn run() -> Result<()> {
    // Parse command line
    let args = parse_cmd_line();
    init_logging(args.verbose);

    let reader = DatasetReader::open(&args.input)?;
    let mut variables = vec![];
    for name in reader.variable_names() {
        let grid = reader.variable(name)?;
        let stats = if args.stats {
            Some(grid_stats(&grid, args.verbose)?)
        } else {
            None
        };
        variables.push(VariableSummary {
            name: grid.name.clone(),
            data_type: grid.data_type(),
            dims: grid.dims(),
            tile_dims: grid.tile_dims,
            attributes: grid.attributes.clone(),
            stats,
        });
    }

    print_json(&DatasetSummary {
        path: args.input.display().to_string(),
        info: reader.info(),
        variables,
    })?;
    Ok(())
}

#[derive(Serialize)]
struct DatasetSummary<'a> {
    path: String,
    info: &'a EarthDataInfo,
    variables: Vec<VariableSummary>,
}

#[derive(Serialize)]
struct VariableSummary {
    name: String,
    data_type: DataType,
    dims: [usize; 2],
    tile_dims: [usize; 2],
    attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<SampleStats>,
}

/// Statistics of the valid values, accumulated tile by tile.
fn grid_stats(grid: &Grid, track: bool) -> Result<SampleStats> {
    let scheme = grid.scheme();
    let tracker = if track {
        Some(Tracker::new(&grid.name, scheme.total_chunks()))
    } else {
        None
    };
    scheme
        .par_iter()
        .map(|pos| -> Result<SampleStats> {
            let chunk = grid.read_chunk(&pos)?;
            let mut stats = SampleStats::default();
            for val in chunk.to_f64_vec() {
                stats += val;
            }
            if let Some(tracker) = &tracker {
                tracker.increment();
            }
            Ok(stats)
        })
        .try_reduce(SampleStats::default, |mut acc, other| {
            acc += &other;
            Ok(acc)
        })
}

/// Program arguments
struct Args {
    input: PathBuf,
    stats: bool,
    verbose: bool,
}

fn parse_cmd_line() -> Args {
    use clap::*;
    let matches = args_parser!("cwinfo")
        .about("Print the metadata and variables of an earth dataset as JSON.")
        .arg(arg!("input").required(true).help("Input dataset"))
        .arg(flag!("no stats").short("n").help("Skip the value statistics of each variable"))
        .arg(flag!("verbose").short("v").help("Print verbose messages"))
        .get_matches();

    Args {
        input: value_t!(matches, "input", PathBuf).unwrap_or_else(|e| e.exit()),
        stats: !matches.is_present("no stats"),
        verbose: matches.is_present("verbose"),
    }
}
