//! Per-transit PNG rendering.

mod render;

pub use render::{plot_filename, render_transit, PlotSpec, RenderOutcome};
