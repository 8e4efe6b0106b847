//! Transit segmentation: from an ephemeris to per-transit sample windows.
//!
//! Candidate mid-transit times are `epoch + k * period` for every integer `k`
//! that lands inside the observed time span. A candidate is kept only when at
//! least one sample falls strictly inside the in-transit interval
//! `(t_k - duration/2, t_k + duration/2)`; candidates over data gaps are
//! dropped silently, which is the expected behavior for sparse time series.
//! Kept windows get sequential 0-based indices in chronological order.

use crate::domain::{LightCurve, TransitWindow};
use crate::error::CurveError;

/// Segmentation output: every candidate epoch plus the windows actually kept.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// All candidate mid-transit times covering the observed span, in time
    /// order. The per-file export reports this count as `expected_transits`.
    pub expected: Vec<f64>,
    /// Windows with in-transit data, indexed 0..n in chronological order.
    pub windows: Vec<TransitWindow>,
}

/// Slice a light curve into per-transit windows.
///
/// `window_mult` scales the half-window width relative to the transit
/// duration and is clamped to at least 1 so the full transit always fits.
pub fn segment(curve: &LightCurve, window_mult: f64) -> Result<Segmentation, CurveError> {
    let period = curve.params.period_d;
    let epoch = curve.params.epoch_bjd;
    let duration = curve.params.duration_d;

    if !period.is_finite() || period <= 0.0 {
        return Err(CurveError::InvalidEphemeris(format!(
            "period must be positive, got {period}"
        )));
    }
    if !duration.is_finite() || duration <= 0.0 {
        return Err(CurveError::InvalidEphemeris(format!(
            "duration must be positive, got {duration}"
        )));
    }
    if !epoch.is_finite() {
        return Err(CurveError::InvalidEphemeris(format!(
            "epoch must be finite, got {epoch}"
        )));
    }

    let t_min = curve.time_min();
    let t_max = curve.time_max();
    if !(t_min.is_finite() && t_max.is_finite()) || curve.time.is_empty() {
        return Ok(Segmentation {
            expected: Vec::new(),
            windows: Vec::new(),
        });
    }

    let k_start = ((t_min - epoch) / period).ceil() as i64;
    let k_end = ((t_max - epoch) / period).floor() as i64;

    let mut expected = Vec::new();
    for k in k_start..=k_end {
        expected.push(epoch + k as f64 * period);
    }

    let half_window = duration * window_mult.max(1.0);
    let half_transit = duration / 2.0;

    let mut windows = Vec::new();
    for &t_k in &expected {
        let in_transit = curve
            .time
            .iter()
            .any(|&t| t > t_k - half_transit && t < t_k + half_transit);
        if !in_transit {
            continue;
        }

        let mut time = Vec::new();
        let mut flux = Vec::new();
        for (&t, &f) in curve.time.iter().zip(curve.flux.iter()) {
            if t >= t_k - half_window && t <= t_k + half_window {
                time.push(t);
                flux.push(f);
            }
        }

        windows.push(TransitWindow {
            index: windows.len(),
            t0_expected: t_k,
            time,
            flux,
        });
    }

    Ok(Segmentation { expected, windows })
}
