use cw_tools::{cli::*, utils::*, *};
use cwchunk::pipeline::Execution;
use cwchunk::resample::{RegisterConfig, SavedMap, DEFAULT_TILE_DIMS};
use std::path::PathBuf;

/// Program arguments
pub struct Args {
    pub input: PathBuf,
    pub output: PathBuf,
    /// File providing the destination grid
    pub master: PathBuf,
    /// Saved map specification `FILE[/ROWVAR/COLVAR]`
    pub usemap: Option<String>,
    pub save_map: bool,
    pub tile_dims: [usize; 2],
    pub match_pattern: Option<String>,
    pub serial: bool,
    pub threads: Option<usize>,
    pub diagnostic: bool,
    /// List every suboptimal diagnostic sample
    pub diagnostic_long: bool,
    pub clobber: bool,
    pub verbose: bool,
}

pub fn parse_cmd_line() -> Args {
    use clap::*;
    let matches = args_parser!("cwregister2")
        .about("Resample the grids of an earth dataset onto the grid of a master dataset.")
        .arg(arg!("input").required(true).help("Input dataset"))
        .arg(arg!("output").required(true).help("Output dataset"))
        .arg(
            opt!("master")
                .short("M")
                .required(true)
                .help("Dataset whose earth transform is the destination"),
        )
        .arg(
            opt!("usemap")
                .short("u")
                .help("Resample with a saved map FILE[/ROWVAR/COLVAR] (default variables: source_row, source_col)"),
        )
        .arg(flag!("savemap").short("S").help("Write the source_row and source_col variables"))
        .arg(
            opt!("tiledims")
                .short("t")
                .help("Output tile dimensions ROWS/COLS (default: 512/512)"),
        )
        .arg(opt!("match").short("m").help("Register only variables whose names match the regular expression"))
        .arg(flag!("serial").help("Process chunks serially"))
        .arg(opt!("threads").help("Maximum number of worker threads"))
        .arg(flag!("diagnostic").short("d").help("Check the resampling accuracy"))
        .arg(
            flag!("diagnostic long")
                .short("D")
                .help("Check the resampling accuracy and list suboptimal samples"),
        )
        .arg(flag!("clobber").short("c").help("Overwrite an existing output"))
        .arg(flag!("verbose").short("v").help("Print verbose messages"))
        .get_matches();

    let input = value_t!(matches, "input", PathBuf).unwrap_or_else(|e| e.exit());
    let output = value_t!(matches, "output", PathBuf).unwrap_or_else(|e| e.exit());
    let master = value_t!(matches, "master", PathBuf).unwrap_or_else(|e| e.exit());

    let tile_dims = match matches.value_of("tiledims") {
        Some(dims) => match parse_dims(dims) {
            Some(dims) if dims[0] > 0 && dims[1] > 0 => dims,
            _ => usage_error(&format!("invalid tile dimensions '{}'", dims)),
        },
        None => DEFAULT_TILE_DIMS,
    };
    let threads = if matches.is_present("threads") {
        Some(value_t!(matches, "threads", usize).unwrap_or_else(|e| e.exit()))
    } else {
        None
    };
    let diagnostic_long = matches.is_present("diagnostic long");
    let diagnostic = diagnostic_long || matches.is_present("diagnostic");

    Args {
        input,
        output,
        master,
        usemap: matches.value_of("usemap").map(String::from),
        save_map: matches.is_present("savemap"),
        tile_dims,
        match_pattern: matches.value_of("match").map(String::from),
        serial: matches.is_present("serial"),
        threads,
        diagnostic,
        diagnostic_long,
        clobber: matches.is_present("clobber"),
        verbose: diagnostic || matches.is_present("verbose"),
    }
}

impl Args {
    pub fn to_config(&self) -> Result<RegisterConfig> {
        let mut config = RegisterConfig::new(self.input.clone(), self.output.clone(), self.master.clone());
        if let Some(spec) = &self.usemap {
            config.saved_map = Some(SavedMap::parse(spec)?);
        }
        config.save_map = self.save_map;
        config.tile_dims = self.tile_dims;
        config.match_pattern = match &self.match_pattern {
            Some(pattern) => Some(pattern.parse()?),
            None => None,
        };
        config.execution = Execution::from_flags(self.serial, self.threads);
        if self.diagnostic {
            config = config.with_diagnostic();
        }
        config.clobber = self.clobber;
        config.history = Some(command_line());
        Ok(config)
    }
}
