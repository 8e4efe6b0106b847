//! One PNG per transit: observed flux with the model overlay on top, fit
//! residuals below.
//!
//! Rendering is deliberately font-free: the bitmap backend is compiled
//! without a text rasterizer so the binary has no fontconfig/freetype native
//! dependency, and every number a reader could want (TTV, RMS, fitted
//! parameters) lives in the exported CSV tables instead of on the image.

use std::path::Path;

use plotters::prelude::*;
use tracing::{debug, warn};

use crate::domain::TransitWindow;
use crate::error::AppError;
use crate::model::{light_curve, ModelParams};

/// Points in the dense model curve drawn across the window.
const MODEL_CURVE_POINTS: usize = 201;

/// Fraction of the image height given to the flux panel; the rest shows
/// residuals.
const FLUX_PANEL_FRAC: f64 = 0.72;

/// What to draw for one transit.
#[derive(Debug)]
pub struct PlotSpec<'a> {
    pub window: &'a TransitWindow,
    /// Model parameters with the mid-time already set (fitted, or the
    /// initial guess when the fit failed).
    pub model: &'a ModelParams,
    pub width: u32,
    pub height: u32,
}

/// Whether a plot file was produced or left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Written,
    /// Target already exists and `force` was not set.
    Skipped,
    /// The window has no plottable time span (a single sample, or no finite
    /// timestamps). No file is produced.
    NoData,
}

/// Output filename for one transit of one input file.
///
/// `stem` is the input filename without extension; indices are zero-padded so
/// lexical and numeric order agree.
pub fn plot_filename(stem: &str, index: usize) -> String {
    format!("{stem}_transit_{index:03}.png")
}

/// Render one transit plot, unless the target already exists.
///
/// Existing files are never overwritten here; the caller opts into
/// re-rendering by passing `force`. A window too sparse to span any time axis
/// is reported as [`RenderOutcome::NoData`] rather than an error: only actual
/// write failures are fatal for the run (exit code 2).
pub fn render_transit(
    path: &Path,
    spec: &PlotSpec<'_>,
    force: bool,
) -> Result<RenderOutcome, AppError> {
    let Some((t_lo, t_hi)) = time_bounds(&spec.window.time) else {
        warn!(path = %path.display(), "no data in plot window, skipping");
        return Ok(RenderOutcome::NoData);
    };
    if !force && path.exists() {
        debug!(path = %path.display(), "plot exists, skipping");
        return Ok(RenderOutcome::Skipped);
    }
    draw(path, spec, t_lo, t_hi).map_err(|e| {
        AppError::new(2, format!("failed to render {}: {e}", path.display()))
    })?;
    debug!(path = %path.display(), "plot written");
    Ok(RenderOutcome::Written)
}

fn draw(
    path: &Path,
    spec: &PlotSpec<'_>,
    t_lo: f64,
    t_hi: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let window = spec.window;

    // Dense model curve across the full window.
    let model_time: Vec<f64> = (0..MODEL_CURVE_POINTS)
        .map(|i| t_lo + (t_hi - t_lo) * i as f64 / (MODEL_CURVE_POINTS - 1) as f64)
        .collect();
    let model_flux = light_curve(spec.model, &model_time);

    let residuals: Vec<f64> = {
        let at_samples = light_curve(spec.model, &window.time);
        window
            .flux
            .iter()
            .zip(at_samples)
            .map(|(&f, m)| f - m)
            .collect()
    };

    let (flux_lo, flux_hi) = padded_bounds(window.flux.iter().chain(model_flux.iter()))?;
    let (res_lo, res_hi) = padded_bounds(residuals.iter())?;
    // Keep zero visible in the residual panel.
    let res_lo = res_lo.min(-1e-6);
    let res_hi = res_hi.max(1e-6);

    let root = BitMapBackend::new(path, (spec.width, spec.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let flux_px = (spec.height as f64 * FLUX_PANEL_FRAC) as u32;
    let (upper, lower) = root.split_vertically(flux_px);

    // Flux panel: observed samples as dots, model as a line.
    let mut flux_chart = ChartBuilder::on(&upper)
        .margin(12)
        .build_cartesian_2d(t_lo..t_hi, flux_lo..flux_hi)?;

    flux_chart.draw_series(
        window
            .time
            .iter()
            .zip(window.flux.iter())
            .map(|(&t, &f)| Circle::new((t, f), 2, BLACK.filled())),
    )?;
    flux_chart.draw_series(LineSeries::new(
        model_time.iter().copied().zip(model_flux.iter().copied()),
        &RED,
    ))?;

    // Residual panel: dots around a zero line.
    let mut res_chart = ChartBuilder::on(&lower)
        .margin(12)
        .build_cartesian_2d(t_lo..t_hi, res_lo..res_hi)?;

    res_chart.draw_series(LineSeries::new([(t_lo, 0.0), (t_hi, 0.0)], &RED))?;
    res_chart.draw_series(
        window
            .time
            .iter()
            .zip(residuals.iter())
            .map(|(&t, &r)| Circle::new((t, r), 2, BLACK.filled())),
    )?;

    root.present()?;
    Ok(())
}

/// `None` when the window cannot span a time axis: fewer than two samples,
/// non-finite timestamps, or zero width.
fn time_bounds(time: &[f64]) -> Option<(f64, f64)> {
    let lo = time.first().copied().unwrap_or(f64::NAN);
    let hi = time.last().copied().unwrap_or(f64::NAN);
    if !(lo.is_finite() && hi.is_finite()) || hi <= lo {
        return None;
    }
    Some((lo, hi))
}

/// Min/max of the values with 10% headroom on each side.
fn padded_bounds<'a>(
    values: impl Iterator<Item = &'a f64>,
) -> Result<(f64, f64), Box<dyn std::error::Error>> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &v in values {
        if v.is_finite() {
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }
    if !(lo.is_finite() && hi.is_finite()) {
        return Err("no finite values to plot".into());
    }
    let pad = ((hi - lo) * 0.1).max(1e-6);
    Ok((lo - pad, hi + pad))
}
