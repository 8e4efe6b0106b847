//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable where they
//! cross the export boundary:
//!
//! - used in-memory during segmentation and fitting
//! - exported to the two summary CSV tables
//! - reloaded later by downstream consumers (the web backend's importer)

use std::path::PathBuf;

// Defaults applied when an optional header parameter is absent. These match
// the values catalog files in the field actually omit most often.
pub const DEFAULT_U1: f64 = 0.65;
pub const DEFAULT_U2: f64 = 0.08;
pub const DEFAULT_INC_DEG: f64 = 89.0;
pub const DEFAULT_ECC: f64 = 0.0;
pub const DEFAULT_W_DEG: f64 = 90.0;
pub const DEFAULT_EXP_TIME_D: f64 = 0.00068113;
pub const DEFAULT_SUPERSAMPLE: u32 = 15;
pub const DEFAULT_DURATION_D: f64 = 0.2;

/// Whether a light curve is simulated or a real observation.
///
/// Resolved from the `Type` header line; simulated files carry a different
/// recognized-key table (and optional ground-truth parameters).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Simulated,
    Real,
}

impl DataKind {
    /// Label used in the per-file CSV's `data_type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            DataKind::Simulated => "simulated",
            DataKind::Real => "real",
        }
    }
}

/// Orbital and observational parameters parsed from a light-curve header.
///
/// Immutable once parsed; one instance per input file.
#[derive(Debug, Clone)]
pub struct OrbitalParameters {
    /// Orbital period in days.
    pub period_d: f64,
    /// Reference mid-transit epoch (BJD).
    pub epoch_bjd: f64,
    /// Transit duration in days.
    pub duration_d: f64,
    /// Planet-to-star radius ratio (Rp/R*).
    pub rp: f64,
    /// Semi-major axis in stellar radii (a/R*).
    pub a: f64,
    /// Orbital inclination in degrees.
    pub inc_deg: f64,
    /// Quadratic limb-darkening coefficients.
    pub u1: f64,
    pub u2: f64,
    /// Orbital eccentricity.
    pub ecc: f64,
    /// Argument of periapsis in degrees.
    pub w_deg: f64,
    /// Exposure time in days (for supersampled model evaluation).
    pub exp_time_d: f64,
    /// Supersampling factor for exposure-time integration.
    pub supersample: u32,

    // Informational header fields, carried through to the per-file export.
    pub star_radius_rsol: Option<f64>,
    pub teff_k: Option<f64>,
    pub logg: Option<f64>,
    pub noise_sigma: Option<f64>,
    pub object_name: Option<String>,
}

/// Ground-truth simulation parameters, present only in simulated files.
///
/// These are never used by the fitter; they are carried through to the
/// per-file CSV so downstream analysis can compare fitted TTVs against the
/// injected signal.
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    pub n_spots: Option<u32>,
    pub spot_size_min: Option<f64>,
    pub spot_size_max: Option<f64>,
    pub spot_contrast: Option<f64>,
    pub moon_radius: Option<f64>,
    pub moon_period_d: Option<f64>,
    pub moon_a: Option<f64>,
    pub ttv_amplitude_d: Option<f64>,
    pub ttv_period_orbits: Option<f64>,
    pub ttv_phase_rad: Option<f64>,
}

/// A loaded light curve: ordered (time, flux) samples plus header metadata.
///
/// Read-only after loading.
#[derive(Debug, Clone)]
pub struct LightCurve {
    /// Source filename (basename, as referenced by the output tables).
    pub file: String,
    /// Observation timestamps (BJD), in file order.
    pub time: Vec<f64>,
    /// Normalized flux samples, same length as `time`.
    pub flux: Vec<f64>,
    pub params: OrbitalParameters,
    pub ground_truth: GroundTruth,
    pub kind: DataKind,
}

impl LightCurve {
    pub fn time_min(&self) -> f64 {
        self.time.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn time_max(&self) -> f64 {
        self.time.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

/// One expected transit and the samples bracketing it.
///
/// Indices are 0-based, unique, and chronological per light curve.
#[derive(Debug, Clone)]
pub struct TransitWindow {
    pub index: usize,
    /// Expected mid-transit time from the ephemeris.
    pub t0_expected: f64,
    /// Samples within `t0_expected ± window half-width`, in time order.
    pub time: Vec<f64>,
    pub flux: Vec<f64>,
}

/// A full run's configuration, derived from CLI flags plus defaults.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Specific filenames to process; empty means every `*.csv` in `input_dir`.
    pub files: Vec<String>,
    /// PNG dimensions in pixels.
    pub plot_width: u32,
    pub plot_height: u32,
    /// Half-window width as a multiple of transit duration (clamped to >= 1).
    pub window_mult: f64,
    /// Worker threads for per-file parallelism; `None` uses the core count.
    pub jobs: Option<usize>,
    pub skip_fitting: bool,
    pub force: bool,
    pub dry_run: bool,
}
