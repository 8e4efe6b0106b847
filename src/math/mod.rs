//! Numerical helpers shared by the fitter.

mod ols;
mod smooth;

pub use ols::{parabola_vertex, solve_least_squares};
pub use smooth::rolling_median;
