pub mod args;
pub use args::{parse_dims, split_values};
pub mod progress;
pub use progress::Progress;
pub mod counters;
pub use counters::{ChunkCounter, Counter};

use cwchunk::error::ToolError;
use cwchunk::Result;

/// Exit code of command-line parse errors.
pub const USAGE_ERROR: i32 = 1;
/// Exit code of every failure after the command line is
/// parsed.
pub const RUNTIME_ERROR: i32 = 2;

/// Install the log subscriber. `RUST_LOG` overrides the
/// level picked by the verbose flag.
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[inline]
pub fn unwrap_or_exit<T>(res: Result<T>) -> T {
    match res {
        Err(e) => {
            if ToolError::is_resource_exhausted(&e) {
                eprintln!("Error: out of memory, try fewer threads or smaller tiles ({:#})", e);
            } else {
                eprintln!("Error: {:#}", e);
            }
            std::process::exit(RUNTIME_ERROR)
        }
        Ok(t) => t,
    }
}

#[macro_export]
macro_rules! sync_main {
    ($name:expr) => {
        fn main() {
            $crate::cli::unwrap_or_exit({ $name });
        }
    };
}

/// Report an invalid option value and exit as a usage error.
pub fn usage_error(msg: &str) -> ! {
    clap::Error::with_description(msg, clap::ErrorKind::InvalidValue).exit()
}
