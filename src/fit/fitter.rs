//! Per-transit mid-time fitting.
//!
//! Given a transit window and fixed shape parameters (period, radius ratio,
//! semi-major axis, inclination, limb darkening), we fit only the mid-transit
//! time `t0` by minimizing the sum of squared residuals between the model and
//! the observed flux.
//!
//! The minimizer is a multi-start bounded grid search: several start offsets
//! around the smoothed flux minimum, a coarse SSE grid per start with two
//! zoom rounds, then a parabolic polish on the samples around the grid
//! winner. This is deterministic and cannot leave the window bounds.

use tracing::debug;

use crate::domain::TransitWindow;
use crate::math::{parabola_vertex, rolling_median};
use crate::model::{light_curve, ModelParams};

/// Why a per-transit fit produced no mid-time.
///
/// These are transit-level failures: the pipeline records the transit as
/// unfitted and keeps going.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FitFailure {
    #[error("too few samples in window ({n} < {min})")]
    TooFewPoints { n: usize, min: usize },
    #[error("constant flux in window")]
    ConstantFlux,
    #[error("no converging fit candidate")]
    NoConvergence,
}

/// Knobs for the mid-time search.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Minimum samples required to attempt a fit.
    pub min_points: usize,
    /// Start offsets (days) around the smoothed-minimum initial guess.
    pub start_offsets: Vec<f64>,
    /// Points in the coarse SSE grid per start.
    pub coarse_steps: usize,
    /// Zoom-in rounds after the coarse grid.
    pub refine_rounds: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            min_points: 10,
            start_offsets: vec![-0.0075, -0.003, 0.0, 0.003, 0.0075],
            coarse_steps: 64,
            refine_rounds: 2,
        }
    }
}

/// Fit the mid-transit time for one window.
///
/// `base` supplies every model parameter except `t0`; `duration` sets the
/// search margin around the initial guess. The result is always inside the
/// window's time span.
pub fn fit_transit_t0(
    window: &TransitWindow,
    base: &ModelParams,
    duration: f64,
    opts: &FitOptions,
) -> Result<f64, FitFailure> {
    let n = window.time.len();
    if n < opts.min_points {
        return Err(FitFailure::TooFewPoints {
            n,
            min: opts.min_points,
        });
    }

    let first = window.flux[0];
    if window.flux.iter().all(|&f| f == first) {
        return Err(FitFailure::ConstantFlux);
    }

    // Window bounds are hard constraints on t0.
    let t_lo = window.time[0];
    let t_hi = window.time[n - 1];
    if !(t_lo.is_finite() && t_hi.is_finite()) || t_hi <= t_lo {
        return Err(FitFailure::NoConvergence);
    }

    let t0_initial = initial_t0(&window.time, &window.flux);
    let margin = duration / 2.0 + 0.02;

    let mut best_t0 = None;
    let mut best_sse = f64::INFINITY;

    for &offset in &opts.start_offsets {
        let start = t0_initial + offset;
        let lo = (start - margin).max(t_lo);
        let hi = (start + margin).min(t_hi);
        if lo >= hi {
            continue;
        }

        if let Some((t0, sse)) = minimize_sse(window, base, lo, hi, opts) {
            if sse < best_sse {
                best_sse = sse;
                best_t0 = Some(t0);
            }
        }
    }

    match best_t0 {
        Some(t0) if best_sse.is_finite() => {
            debug!(t0, sse = best_sse, "mid-time fit converged");
            Ok(t0)
        }
        _ => Err(FitFailure::NoConvergence),
    }
}

/// Initial mid-time guess: the time of the rolling-median-smoothed flux
/// minimum, so a single noisy sample cannot hijack the search.
fn initial_t0(time: &[f64], flux: &[f64]) -> f64 {
    let smoothed = rolling_median(flux, 5);
    let mut min_idx = 0;
    let mut min_val = f64::INFINITY;
    for (i, &v) in smoothed.iter().enumerate() {
        if v.is_finite() && v < min_val {
            min_val = v;
            min_idx = i;
        }
    }
    time[min_idx]
}

/// Bounded SSE minimization over `[lo, hi]`: coarse grid, zoom rounds, then
/// a parabolic polish around the winner.
fn minimize_sse(
    window: &TransitWindow,
    base: &ModelParams,
    lo: f64,
    hi: f64,
    opts: &FitOptions,
) -> Option<(f64, f64)> {
    let steps = opts.coarse_steps.max(8);

    let mut lo = lo;
    let mut hi = hi;
    let mut best: Option<(f64, f64)> = None;

    for _ in 0..=opts.refine_rounds {
        let (t0, sse) = grid_minimum(window, base, lo, hi, steps)?;
        if best.as_ref().is_none_or(|&(_, b)| sse < b) {
            best = Some((t0, sse));
        }
        // Zoom in around the winner for the next round.
        let span = (hi - lo) / steps as f64 * 4.0;
        lo = (t0 - span).max(lo);
        hi = (t0 + span).min(hi);
        if hi <= lo {
            break;
        }
    }

    let (grid_t0, grid_sse) = best?;

    // Parabolic polish: sample SSE on a tight bracket around the winner and
    // jump to the fitted vertex if it improves.
    let h = (hi - lo).max(1e-6) / 8.0;
    let xs: Vec<f64> = (-2..=2).map(|i| grid_t0 + i as f64 * h).collect();
    let ys: Vec<f64> = xs.iter().map(|&t| sse_at(window, base, t)).collect();
    if let Some(vertex) = parabola_vertex(&xs, &ys) {
        let clamped = vertex.clamp(window.time[0], *window.time.last()?);
        let polished = sse_at(window, base, clamped);
        if polished.is_finite() && polished < grid_sse {
            return Some((clamped, polished));
        }
    }

    grid_sse.is_finite().then_some((grid_t0, grid_sse))
}

fn grid_minimum(
    window: &TransitWindow,
    base: &ModelParams,
    lo: f64,
    hi: f64,
    steps: usize,
) -> Option<(f64, f64)> {
    let mut best = None;
    for i in 0..=steps {
        let t0 = lo + (hi - lo) * i as f64 / steps as f64;
        let sse = sse_at(window, base, t0);
        if !sse.is_finite() {
            continue;
        }
        match best {
            None => best = Some((t0, sse)),
            Some((_, b)) if sse < b => best = Some((t0, sse)),
            _ => {}
        }
    }
    best
}

pub(crate) fn sse_at(window: &TransitWindow, base: &ModelParams, t0: f64) -> f64 {
    let model = light_curve(&base.with_t0(t0), &window.time);
    let mut sse = 0.0;
    for (&f, m) in window.flux.iter().zip(model) {
        let r = f - m;
        sse += r * r;
    }
    sse
}

/// RMS of (observed - model) over the window for the given mid-time.
pub fn rms_residuals(window: &TransitWindow, base: &ModelParams, t0: f64) -> Option<f64> {
    if window.time.is_empty() {
        return None;
    }
    let sse = sse_at(window, base, t0);
    let rms = (sse / window.time.len() as f64).sqrt();
    rms.is_finite().then_some(rms)
}
