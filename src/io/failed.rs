//! Failed-transit sidecar.
//!
//! `_failed_transits.json` in the output directory maps input filename to the
//! 0-based transit indices whose fit failed on a previous run. Later runs use
//! it to skip refitting known-bad transits (unless `--force`). A missing or
//! unreadable sidecar simply means "nothing failed yet"; losing it only costs
//! redundant fit attempts.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::warn;

use crate::error::AppError;

pub const FAILED_TRANSITS_FILE: &str = "_failed_transits.json";

/// Filename -> failed transit indices. BTreeMap keeps the JSON key order
/// stable across runs.
pub type FailedTransits = BTreeMap<String, Vec<usize>>;

/// Load the sidecar, tolerating absence and corruption.
pub fn load(dir: &Path) -> FailedTransits {
    let path = dir.join(FAILED_TRANSITS_FILE);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(_) => return FailedTransits::new(),
    };
    match serde_json::from_str(&text) {
        Ok(map) => map,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring corrupt failed-transit sidecar");
            FailedTransits::new()
        }
    }
}

/// Write the sidecar, replacing any previous contents.
pub fn store(dir: &Path, failed: &FailedTransits) -> Result<(), AppError> {
    let path = dir.join(FAILED_TRANSITS_FILE);
    let json = serde_json::to_string_pretty(failed)
        .map_err(|e| AppError::new(2, format!("failed to encode failed-transit sidecar: {e}")))?;
    std::fs::write(&path, json)
        .map_err(|e| AppError::new(2, format!("failed to write '{}': {e}", path.display())))
}
