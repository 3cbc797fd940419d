use cw_tools::{cli::*, utils::*, *};
use cwchunk::composite::{CompositeConfig, OptimalVariable, ValidThreshold};
use cwchunk::dataset::MergeOptions;
use cwchunk::pipeline::Execution;
use std::path::PathBuf;

/// Program arguments
pub struct Args {
    /// Input files given on the command line
    pub inputs: Vec<PathBuf>,
    /// File listing the inputs, `-` for stdin
    pub input_list: Option<String>,
    /// Output filename
    pub output: PathBuf,
    /// Composite method name
    pub method: String,
    pub min_valid: usize,
    /// Apply the valid count to arithmetic methods only
    pub arithmetic_valid: bool,
    pub coherent: Vec<String>,
    pub optimal: Option<String>,
    pub save_map: bool,
    pub match_pattern: Option<String>,
    pub merge: MergeOptions,
    pub serial: bool,
    pub threads: Option<usize>,
    pub verbose: bool,
}

pub fn parse_cmd_line() -> Args {
    use clap::*;
    let matches = args_parser!("cwcomposite")
        .about("Combine a time series of earth datasets into one composite.")
        .arg(
            arg!("files")
                .required(true)
                .multiple(true)
                .help("Input files followed by the output file (only the output with --inputs)"),
        )
        .arg(
            opt!("inputs")
                .short("i")
                .help("Text file listing the inputs, one per line, or - for standard input"),
        )
        .arg(
            opt!("method")
                .short("M")
                .help("Composite method: mean, geomean, median, min, max, latest, explicit or optimal (default: mean)"),
        )
        .arg(
            opt!("valid")
                .short("V")
                .help("Minimum number of valid values for a composite pixel (default: 1)"),
        )
        .arg(flag!("arithmetic valid").help("Apply --valid to the mean, geomean and median methods only"))
        .arg(
            opt!("coherent")
                .short("c")
                .help("Coherent mode with priority variables VAR1[/VAR2...]"),
        )
        .arg(
            opt!("optimal")
                .short("o")
                .help("Optimization variable and type VARIABLE/{min|max} (default: satellite zenith/min)"),
        )
        .arg(flag!("savemap").short("S").help("Save the source index map in coherent mode"))
        .arg(opt!("match").short("m").help("Composite only variables whose names match the regular expression"))
        .arg(flag!("keephistory").short("k").help("Retain all input history metadata"))
        .arg(flag!("pedantic").short("p").help("Retain repeated metadata values"))
        .arg(flag!("collapsetime").short("t").help("Collapse input time periods into one"))
        .arg(flag!("serial").help("Process chunks serially"))
        .arg(opt!("threads").help("Maximum number of worker threads"))
        .arg(flag!("verbose").short("v").help("Print verbose messages"))
        .get_matches();

    let mut files: Vec<PathBuf> = values_t!(matches, "files", PathBuf).unwrap_or_else(|e| e.exit());
    let output = match files.pop() {
        Some(output) => output,
        None => usage_error("missing output file"),
    };
    let input_list = matches.value_of("inputs").map(String::from);
    if input_list.is_some() && !files.is_empty() {
        usage_error("input files can't be given both on the command line and with --inputs");
    }

    let min_valid = if matches.is_present("valid") {
        value_t!(matches, "valid", usize).unwrap_or_else(|e| e.exit())
    } else {
        1
    };
    let threads = if matches.is_present("threads") {
        Some(value_t!(matches, "threads", usize).unwrap_or_else(|e| e.exit()))
    } else {
        None
    };

    Args {
        inputs: files,
        input_list,
        output,
        method: matches.value_of("method").unwrap_or("mean").into(),
        min_valid,
        arithmetic_valid: matches.is_present("arithmetic valid"),
        coherent: matches
            .value_of("coherent")
            .map(|c| split_values(c).into_iter().map(String::from).collect())
            .unwrap_or_default(),
        optimal: matches.value_of("optimal").map(String::from),
        save_map: matches.is_present("savemap"),
        match_pattern: matches.value_of("match").map(String::from),
        merge: MergeOptions {
            pedantic: matches.is_present("pedantic"),
            keep_history: matches.is_present("keephistory"),
            collapse_time: matches.is_present("collapsetime"),
        },
        serial: matches.is_present("serial"),
        threads,
        verbose: matches.is_present("verbose"),
    }
}

impl Args {
    /// The engine configuration. Option values are checked
    /// here and fail as runtime errors.
    pub fn into_config(self) -> Result<CompositeConfig> {
        let inputs = match &self.input_list {
            Some(list) => read_input_list(list)?,
            None => self.inputs,
        };
        let mut config = CompositeConfig::new(inputs, self.output);
        config.method = self.method.parse()?;
        config.min_valid = self.min_valid;
        config.threshold = if self.arithmetic_valid {
            ValidThreshold::ArithmeticOnly
        } else {
            ValidThreshold::AllOperators
        };
        config.coherent = self.coherent;
        config.optimal = match &self.optimal {
            Some(opt) => Some(opt.parse::<OptimalVariable>()?),
            None => None,
        };
        config.save_map = self.save_map;
        config.match_pattern = match &self.match_pattern {
            Some(pattern) => Some(pattern.parse()?),
            None => None,
        };
        config.merge = self.merge;
        config.execution = Execution::from_flags(self.serial, self.threads);
        config.history = Some(command_line());
        Ok(config)
    }
}
