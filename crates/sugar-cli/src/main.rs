//! sugar: compiles Sugar templates to PHP.

mod cli;
mod config;
mod orchestrator;
mod output;

use clap::Parser;
use cli::Args;
use miette::Result;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter, e.g. `SUGAR_LOG=debug`.
const LOG_ENV: &str = "SUGAR_LOG";

fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    // logs go to stderr so JSON output on stdout stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let summary = orchestrator::run(args)?;
    if summary.error_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}
