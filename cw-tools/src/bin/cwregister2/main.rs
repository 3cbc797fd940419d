use cw_tools::{cli::*, utils::*, *};
use cwchunk::context::LogContext;
use cwchunk::pipeline::ProgressFactory;
use cwchunk::resample::{run_register, DiagnosticSummary};
use cwchunk::verbose;

mod args;

// Main function
cw_tools::sync_main!(run());

fn run() -> Result<()> {
    // Parse command line
    let args = args::parse_cmd_line();
    init_logging(args.verbose);
    let ctx = LogContext::new("cwregister2", args.verbose);
    let config = args.to_config()?;

    // An existing output is only scheduled for removal once
    // it may be overwritten.
    config.validate()?;
    let mut cleanup = CleanupGuard::new();
    cleanup.schedule(&config.output);

    let progress: Option<&ProgressFactory> = if ctx.is_verbose() {
        Some(&track_chunks as &ProgressFactory)
    } else {
        None
    };
    let summary = run_register(&ctx, &config, progress)?;
    verbose!(ctx, "registered {} variables", summary.variables.len());
    if let Some(diag) = &summary.diagnostic {
        report(&ctx, diag, args.diagnostic_long);
    }

    cleanup.disarm();
    Ok(())
}

fn report(ctx: &LogContext, diag: &DiagnosticSummary, long: bool) {
    verbose!(
        ctx,
        "diagnostic summary statistics\n  Distance (km)       min = {:.6}, max = {:.6}, avg = {:.6}\n  Distance error (km) min = {:.6}, max = {:.6}, avg = {:.6}\n  Norm perf metric    min = {:.6}, max = {:.6}, avg = {:.6}",
        diag.distance.min(),
        diag.distance.max(),
        diag.distance.mean(),
        diag.distance_error.min(),
        diag.distance_error.max(),
        diag.distance_error.mean(),
        diag.omega.min(),
        diag.omega.max(),
        diag.omega.mean()
    );
    verbose!(
        ctx,
        "found {} suboptimal of {} samples ({:.2}%)",
        diag.suboptimal,
        diag.samples,
        diag.suboptimal_percent()
    );
    if !long {
        return;
    }
    for (i, sample) in diag.suboptimal_samples.iter().enumerate() {
        verbose!(
            ctx,
            "suboptimal diagnostic sample [{:3}/{:3}]\n  dest    = {:?}\n  source  = {:?}, dist = {:.6} km\n  optimal = {:?}, dist = {:.6} km\n  error   = {:.6} km",
            i + 1,
            diag.suboptimal,
            sample.dest,
            sample.source,
            sample.actual_dist,
            sample.optimal_source,
            sample.optimal_dist,
            sample.distance_error()
        );
    }
}
