//! Transit model fitting.
//!
//! Two levels of fit, both deterministic grid searches with a parabolic
//! polish (no RNG, no iterative solver state):
//!
//! - [`global`]: one shared (radius ratio, semi-major axis) pair per file,
//!   fitted across every transit window.
//! - [`fitter`]: the per-transit mid-transit time, with the shape parameters
//!   held fixed.

pub mod fitter;
pub mod global;

pub use fitter::{fit_transit_t0, rms_residuals, FitFailure, FitOptions};
pub use global::fit_global_shape;
