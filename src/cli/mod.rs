//! Command-line parsing for the transit batch pipeline.
//!
//! Parsing stays separate from the pipeline code; `Cli::into_config` is the
//! only bridge between clap types and the run configuration.

use std::path::PathBuf;

use clap::Parser;

use crate::domain::RunConfig;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "transit-plotter",
    version,
    about = "Batch transit light-curve fitter and plotter"
)]
pub struct Cli {
    /// Directory containing input light-curve CSV files.
    #[arg(short = 'i', long, default_value = "data")]
    pub input_dir: PathBuf,

    /// Directory for plots, summary CSVs, and the failed-transit sidecar.
    #[arg(short = 'o', long, default_value = "plots")]
    pub output_dir: PathBuf,

    /// Process only these files (basenames within the input directory).
    /// Repeatable; default is every *.csv in the input directory.
    #[arg(short = 'f', long = "file", value_name = "NAME")]
    pub files: Vec<String>,

    /// Plot width (pixels).
    #[arg(long, default_value_t = 1000)]
    pub width: u32,

    /// Plot height (pixels).
    #[arg(long, default_value_t = 800)]
    pub height: u32,

    /// Half-window width around each transit, as a multiple of the transit
    /// duration (values below 1 are clamped to 1).
    #[arg(long, default_value_t = 1.25)]
    pub window_mult: f64,

    /// Worker threads for per-file parallelism (default: number of cores).
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Skip model fitting; plot raw windows with catalog parameters.
    #[arg(long)]
    pub skip_fitting: bool,

    /// Re-render existing plots and retry previously failed fits.
    #[arg(long)]
    pub force: bool,

    /// List the files and transits that would be processed, then exit.
    #[arg(long)]
    pub dry_run: bool,

    /// Increase log verbosity (debug-level tracing).
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    pub fn into_config(self) -> RunConfig {
        RunConfig {
            input_dir: self.input_dir,
            output_dir: self.output_dir,
            files: self.files,
            plot_width: self.width,
            plot_height: self.height,
            window_mult: self.window_mult,
            jobs: self.jobs,
            skip_fitting: self.skip_fitting,
            force: self.force,
            dry_run: self.dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cli = Cli::parse_from(["transit-plotter"]);
        assert_eq!(cli.input_dir, PathBuf::from("data"));
        assert_eq!(cli.output_dir, PathBuf::from("plots"));
        assert!(cli.files.is_empty());
        assert_eq!(cli.width, 1000);
        assert_eq!(cli.height, 800);
        assert_eq!(cli.window_mult, 1.25);
        assert_eq!(cli.jobs, None);
        assert!(!cli.skip_fitting);
        assert!(!cli.force);
        assert!(!cli.dry_run);
    }

    #[test]
    fn file_flag_is_repeatable() {
        let cli = Cli::parse_from([
            "transit-plotter",
            "-f",
            "kplr001.csv",
            "--file",
            "kplr002.csv",
        ]);
        assert_eq!(cli.files, vec!["kplr001.csv", "kplr002.csv"]);
    }

    #[test]
    fn into_config_carries_all_flags() {
        let cli = Cli::parse_from([
            "transit-plotter",
            "-i",
            "/tmp/in",
            "-o",
            "/tmp/out",
            "--width",
            "640",
            "--height",
            "480",
            "--window-mult",
            "2.0",
            "-j",
            "4",
            "--skip-fitting",
            "--force",
            "--dry-run",
        ]);
        let config = cli.into_config();
        assert_eq!(config.input_dir, PathBuf::from("/tmp/in"));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.plot_width, 640);
        assert_eq!(config.plot_height, 480);
        assert_eq!(config.window_mult, 2.0);
        assert_eq!(config.jobs, Some(4));
        assert!(config.skip_fitting);
        assert!(config.force);
        assert!(config.dry_run);
    }
}
