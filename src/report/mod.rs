//! Run reporting: per-file outcomes and the formatted terminal summary.
//!
//! Formatting lives in one place so the pipeline code stays clean and output
//! changes are localized.

/// How processing of one input file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Ok,
    /// The file could not be loaded or segmented; the run continues with the
    /// remaining files and exits nonzero at the end.
    Failed,
}

/// Per-file processing outcome.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file: String,
    pub status: FileStatus,
    /// Transits with in-transit data.
    pub transits: usize,
    pub plots_written: usize,
    pub plots_skipped: usize,
    /// Transits recorded without a fitted mid-time.
    pub unfitted: usize,
    /// Load/segmentation error, `Failed` files only.
    pub error: Option<String>,
}

/// Aggregate counts for the whole run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub files_ok: usize,
    pub files_failed: usize,
    pub transits: usize,
    pub plots_written: usize,
    pub plots_skipped: usize,
    pub unfitted: usize,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[FileOutcome]) -> Self {
        let mut summary = Self::default();
        for o in outcomes {
            match o.status {
                FileStatus::Ok => summary.files_ok += 1,
                FileStatus::Failed => summary.files_failed += 1,
            }
            summary.transits += o.transits;
            summary.plots_written += o.plots_written;
            summary.plots_skipped += o.plots_skipped;
            summary.unfitted += o.unfitted;
        }
        summary
    }
}

/// Format the full run summary for the terminal.
pub fn format_run_summary(outcomes: &[FileOutcome], summary: &RunSummary) -> String {
    let mut out = String::new();

    out.push_str("=== transit-plotter run summary ===\n");
    out.push_str(&format!(
        "Files: {} ok, {} failed\n",
        summary.files_ok, summary.files_failed
    ));
    out.push_str(&format!(
        "Transits: {} ({} unfitted)\n",
        summary.transits, summary.unfitted
    ));
    out.push_str(&format!(
        "Plots: {} written, {} skipped\n",
        summary.plots_written, summary.plots_skipped
    ));

    let failed: Vec<&FileOutcome> = outcomes
        .iter()
        .filter(|o| o.status == FileStatus::Failed)
        .collect();
    if !failed.is_empty() {
        out.push_str("\nFailed files:\n");
        for o in &failed {
            out.push_str(&format!(
                "- {}: {}\n",
                o.file,
                o.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    out
}
