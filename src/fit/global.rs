//! Global transit-shape fit.
//!
//! One (radius ratio, semi-major axis) pair is fitted per light curve, shared
//! by every transit window in the file. The search is a bounded grid around
//! the catalog values (±15%), scored by the summed SSE of a cheap per-window
//! mid-time fit. Candidates are evaluated in parallel; ties break toward the
//! lowest grid index so the result is deterministic regardless of thread
//! scheduling.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::domain::{LightCurve, TransitWindow};
use crate::fit::fitter::{sse_at, FitOptions};
use crate::model::ModelParams;

const GRID_STEPS: usize = 9;
const SHAPE_BOUND_FRAC: f64 = 0.15;

/// Fit the shared (rp, a) pair for a light curve.
///
/// Returns the catalog values unchanged when no window has enough samples or
/// no candidate produces a finite score.
pub fn fit_global_shape(
    curve: &LightCurve,
    windows: &[TransitWindow],
    opts: &FitOptions,
) -> (f64, f64) {
    let rp0 = curve.params.rp;
    let a0 = curve.params.a;

    // Windows too sparse for even the cheap inner fit are excluded from the
    // score rather than failing the whole file.
    let usable: Vec<&TransitWindow> = windows.iter().filter(|w| w.time.len() > 5).collect();
    if usable.is_empty() {
        warn!(file = %curve.file, "no usable windows for shape fit, keeping catalog values");
        return (rp0, a0);
    }

    let rp_lo = (rp0 * (1.0 - SHAPE_BOUND_FRAC)).max(1e-4);
    let rp_hi = (rp0 * (1.0 + SHAPE_BOUND_FRAC)).min(1.0);
    let a_lo = (a0 * (1.0 - SHAPE_BOUND_FRAC)).max(1.0);
    let a_hi = a0 * (1.0 + SHAPE_BOUND_FRAC);

    let mut candidates = Vec::with_capacity(GRID_STEPS * GRID_STEPS);
    for i in 0..GRID_STEPS {
        let rp = rp_lo + (rp_hi - rp_lo) * i as f64 / (GRID_STEPS - 1) as f64;
        for j in 0..GRID_STEPS {
            let a = a_lo + (a_hi - a_lo) * j as f64 / (GRID_STEPS - 1) as f64;
            candidates.push((rp, a));
        }
    }

    let inner = FitOptions {
        coarse_steps: opts.coarse_steps.min(32),
        refine_rounds: 1,
        ..opts.clone()
    };

    let scored: Vec<(usize, f64)> = candidates
        .par_iter()
        .enumerate()
        .map(|(idx, &(rp, a))| (idx, score_candidate(curve, &usable, rp, a, &inner)))
        .collect();

    let mut best: Option<(usize, f64)> = None;
    for (idx, score) in scored {
        if !score.is_finite() {
            continue;
        }
        match best {
            None => best = Some((idx, score)),
            Some((_, b)) if score < b => best = Some((idx, score)),
            _ => {}
        }
    }

    match best {
        Some((idx, score)) => {
            let (rp, a) = candidates[idx];
            debug!(file = %curve.file, rp, a, score, "shape fit converged");
            (rp, a)
        }
        None => {
            warn!(file = %curve.file, "shape fit produced no finite score, keeping catalog values");
            (rp0, a0)
        }
    }
}

/// Summed best-SSE across windows for one (rp, a) candidate.
///
/// Each window gets a coarse mid-time grid search around the expected epoch;
/// the candidate pays for its shape mismatch through the residuals left after
/// the best mid-time shift.
fn score_candidate(
    curve: &LightCurve,
    windows: &[&TransitWindow],
    rp: f64,
    a: f64,
    opts: &FitOptions,
) -> f64 {
    let mut total = 0.0;
    for window in windows {
        let base = ModelParams::from_orbital(&curve.params, window.t0_expected, rp, a);
        let margin = curve.params.duration_d / 4.0;
        let lo = (window.t0_expected - margin).max(window.time[0]);
        let hi = (window.t0_expected + margin).min(*window.time.last().unwrap_or(&lo));
        if hi <= lo {
            total += sse_at(window, &base, window.t0_expected);
            continue;
        }

        let steps = opts.coarse_steps.max(8);
        let mut best = f64::INFINITY;
        for i in 0..=steps {
            let t0 = lo + (hi - lo) * i as f64 / steps as f64;
            let sse = sse_at(window, &base, t0);
            if sse < best {
                best = sse;
            }
        }
        total += best;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataKind, GroundTruth, OrbitalParameters};
    use crate::model::model_flux_at;

    fn synthetic_curve(rp_true: f64, a_true: f64, rp_catalog: f64, a_catalog: f64) -> LightCurve {
        let params = OrbitalParameters {
            period_d: 2.36,
            epoch_bjd: 1000.0,
            duration_d: 0.12,
            rp: rp_catalog,
            a: a_catalog,
            inc_deg: 89.0,
            u1: 0.4,
            u2: 0.1,
            ecc: 0.0,
            w_deg: 90.0,
            exp_time_d: 0.0,
            supersample: 1,
            star_radius_rsol: None,
            teff_k: None,
            logg: None,
            noise_sigma: None,
            object_name: None,
        };

        let truth = ModelParams {
            t0: 0.0, // set per sample below via the ephemeris
            period: params.period_d,
            rp: rp_true,
            a: a_true,
            inc_deg: params.inc_deg,
            u1: params.u1,
            u2: params.u2,
            ecc: params.ecc,
            w_deg: params.w_deg,
            exp_time: 0.0,
            supersample: 1,
        };

        let cadence = 2.0 / 60.0 / 24.0;
        let mut time = Vec::new();
        let mut flux = Vec::new();
        for k in 0..3 {
            let t_k = params.epoch_bjd + k as f64 * params.period_d;
            let mut t = t_k - 0.15;
            while t <= t_k + 0.15 {
                time.push(t);
                flux.push(model_flux_at(&truth.with_t0(t_k), t));
                t += cadence;
            }
        }

        LightCurve {
            file: "synthetic.csv".to_string(),
            time,
            flux,
            params,
            ground_truth: GroundTruth::default(),
            kind: DataKind::Simulated,
        }
    }

    #[test]
    fn recovers_true_radius_ratio_within_grid_resolution() {
        // Catalog says rp = 0.10, data was generated with rp = 0.11.
        let curve = synthetic_curve(0.11, 8.0, 0.10, 8.0);
        let seg = crate::segment::segment(&curve, 1.25).unwrap();
        let (rp, _a) = fit_global_shape(&curve, &seg.windows, &FitOptions::default());

        let grid_step = (0.10 * 0.30) / 8.0;
        assert!(
            (rp - 0.11).abs() <= grid_step + 1e-9,
            "fitted rp {rp}, expected near 0.11"
        );
        assert!(rp > 0.10, "fit should move toward the deeper true transit");
    }

    #[test]
    fn no_usable_windows_falls_back_to_catalog() {
        let curve = synthetic_curve(0.1, 8.0, 0.1, 8.0);
        let windows = vec![TransitWindow {
            index: 0,
            t0_expected: 1000.0,
            time: vec![999.99, 1000.0, 1000.01],
            flux: vec![0.99, 0.98, 0.99],
        }];
        let (rp, a) = fit_global_shape(&curve, &windows, &FitOptions::default());
        assert_eq!((rp, a), (0.1, 8.0));
    }

    #[test]
    fn result_is_deterministic() {
        let curve = synthetic_curve(0.105, 8.5, 0.10, 8.0);
        let seg = crate::segment::segment(&curve, 1.25).unwrap();
        let first = fit_global_shape(&curve, &seg.windows, &FitOptions::default());
        let second = fit_global_shape(&curve, &seg.windows, &FitOptions::default());
        assert_eq!(first, second);
    }

    #[test]
    fn result_stays_inside_bounds() {
        let curve = synthetic_curve(0.2, 12.0, 0.1, 8.0);
        let seg = crate::segment::segment(&curve, 1.25).unwrap();
        let (rp, a) = fit_global_shape(&curve, &seg.windows, &FitOptions::default());
        assert!(rp >= 0.1 * 0.85 - 1e-12 && rp <= 0.1 * 1.15 + 1e-12);
        assert!(a >= 8.0 * 0.85 - 1e-12 && a <= 8.0 * 1.15 + 1e-12);
    }
}
