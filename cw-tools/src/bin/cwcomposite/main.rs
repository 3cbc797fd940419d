use cw_tools::{cli::*, utils::*, *};
use cwchunk::composite::run_composite;
use cwchunk::context::LogContext;
use cwchunk::pipeline::ProgressFactory;
use cwchunk::verbose;

mod args;

// Main function
cw_tools::sync_main!(run());

fn run() -> Result<()> {
    // Parse command line
    let args = args::parse_cmd_line();
    init_logging(args.verbose);
    let ctx = LogContext::new("cwcomposite", args.verbose);
    let config = args.into_config()?;
    config.validate()?;

    let mut cleanup = CleanupGuard::new();
    cleanup.schedule(&config.output);

    let progress: Option<&ProgressFactory> = if ctx.is_verbose() {
        Some(&track_chunks as &ProgressFactory)
    } else {
        None
    };
    let written = run_composite(&ctx, &config, progress)?;
    verbose!(ctx, "wrote {} variables to {}", written.len(), config.output.display());

    cleanup.disarm();
    Ok(())
}
