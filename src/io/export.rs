//! Summary CSV exports.
//!
//! Two tables are written per run, both replaced wholesale so their contents
//! always reflect exactly the inputs just processed:
//!
//! - `transits.csv`: one row per detected transit across every file.
//! - `curves.csv`: one row per input file.
//!
//! Rows are sorted by (file, transit index) before writing, so output is
//! byte-identical across runs regardless of worker scheduling. Optional
//! columns serialize as empty cells.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const TRANSITS_CSV: &str = "transits.csv";
pub const CURVES_CSV: &str = "curves.csv";

// Written explicitly when there are no records; `serialize` only emits the
// header alongside the first row, and downstream importers expect the header
// even in an empty table.
const TRANSIT_COLUMNS: &[&str] = &[
    "file",
    "transit_index",
    "t0_expected",
    "t0_fitted",
    "ttv_minutes",
    "rp_fitted",
    "a_fitted",
    "rms_residuals",
    "period",
    "duration",
    "inc",
    "u1",
    "u2",
    "plot_file",
];

const CURVE_COLUMNS: &[&str] = &[
    "file",
    "data_type",
    "object_name",
    "time_min",
    "time_max",
    "expected_transits",
    "found_transits",
    "period",
    "epoch",
    "duration",
    "rp",
    "a",
    "inc",
    "u1",
    "u2",
    "star_radius",
    "teff",
    "logg",
    "noise_sigma",
    "gt_n_spots",
    "gt_spot_size_min",
    "gt_spot_size_max",
    "gt_spot_contrast",
    "gt_moon_radius",
    "gt_moon_period",
    "gt_moon_a",
    "gt_ttv_amplitude",
    "gt_ttv_period",
    "gt_ttv_phase",
];

/// One row of `transits.csv`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitRecord {
    pub file: String,
    pub transit_index: usize,
    pub t0_expected: f64,
    pub t0_fitted: Option<f64>,
    pub ttv_minutes: Option<f64>,
    pub rp_fitted: f64,
    pub a_fitted: f64,
    pub rms_residuals: Option<f64>,
    pub period: f64,
    pub duration: f64,
    pub inc: f64,
    pub u1: f64,
    pub u2: f64,
    pub plot_file: String,
}

/// One row of `curves.csv`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveRecord {
    pub file: String,
    pub data_type: String,
    pub object_name: Option<String>,
    pub time_min: f64,
    pub time_max: f64,
    pub expected_transits: usize,
    pub found_transits: usize,
    pub period: f64,
    pub epoch: f64,
    pub duration: f64,
    pub rp: f64,
    pub a: f64,
    pub inc: f64,
    pub u1: f64,
    pub u2: f64,
    pub star_radius: Option<f64>,
    pub teff: Option<f64>,
    pub logg: Option<f64>,
    pub noise_sigma: Option<f64>,
    // Ground-truth parameters, simulated files only.
    pub gt_n_spots: Option<u32>,
    pub gt_spot_size_min: Option<f64>,
    pub gt_spot_size_max: Option<f64>,
    pub gt_spot_contrast: Option<f64>,
    pub gt_moon_radius: Option<f64>,
    pub gt_moon_period: Option<f64>,
    pub gt_moon_a: Option<f64>,
    pub gt_ttv_amplitude: Option<f64>,
    pub gt_ttv_period: Option<f64>,
    pub gt_ttv_phase: Option<f64>,
}

/// Write `transits.csv`, replacing any previous contents.
pub fn write_transits_csv(path: &Path, records: &[TransitRecord]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| {
        AppError::new(2, format!("failed to create '{}': {e}", path.display()))
    })?;
    if records.is_empty() {
        writer
            .write_record(TRANSIT_COLUMNS)
            .map_err(|e| AppError::new(2, format!("failed to write transit header: {e}")))?;
    }
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| AppError::new(2, format!("failed to write transit row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("failed to flush '{}': {e}", path.display())))
}

/// Write `curves.csv`, replacing any previous contents.
pub fn write_curves_csv(path: &Path, records: &[CurveRecord]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| {
        AppError::new(2, format!("failed to create '{}': {e}", path.display()))
    })?;
    if records.is_empty() {
        writer
            .write_record(CURVE_COLUMNS)
            .map_err(|e| AppError::new(2, format!("failed to write curve header: {e}")))?;
    }
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| AppError::new(2, format!("failed to write curve row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("failed to flush '{}': {e}", path.display())))
}
