//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - sets up logging
//! - runs the batch pipeline
//! - prints the run summary
//! - maps the outcome to a process exit code

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;
use crate::report::{format_run_summary, FileStatus, RunSummary};

pub mod pipeline;

/// Entry point for the `transit-plotter` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_tracing(cli.verbose);
    let config = cli.into_config();

    if config.dry_run {
        let outcomes = pipeline::plan(&config)?;
        for o in &outcomes {
            match o.status {
                FileStatus::Ok => println!("{}: {} transit(s)", o.file, o.transits),
                FileStatus::Failed => println!(
                    "{}: would fail ({})",
                    o.file,
                    o.error.as_deref().unwrap_or("unknown error")
                ),
            }
        }
        return Ok(());
    }

    let outcomes = pipeline::run(&config)?;
    let summary = RunSummary::from_outcomes(&outcomes);
    print!("{}", format_run_summary(&outcomes, &summary));

    if summary.files_failed > 0 {
        return Err(AppError::new(
            1,
            format!("{} file(s) failed to process", summary.files_failed),
        ));
    }
    Ok(())
}

/// Logs go to stderr so stdout stays clean for the summary.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
