//! Small least-squares problems for the fitter's refinement step.
//!
//! The transit model is nonlinear in every fitted parameter, so the fitter
//! works by deterministic grid search. The grid winner is then polished by
//! fitting a parabola to the SSE samples around it and jumping to the vertex;
//! that parabola fit is the one linear regression in the project.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if the strict solve fails; SSE
    // samples near a flat minimum can make the design matrix near-singular.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Fit `y = c0 + c1 x + c2 x^2` through the samples and return the vertex
/// `-c1 / (2 c2)`.
///
/// Returns `None` unless the fitted parabola is convex (`c2 > 0`), i.e. the
/// samples actually bracket a minimum.
pub fn parabola_vertex(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() < 3 || xs.len() != ys.len() {
        return None;
    }
    let n = xs.len();
    let mut x = DMatrix::<f64>::zeros(n, 3);
    let mut y = DVector::<f64>::zeros(n);
    for i in 0..n {
        if !(xs[i].is_finite() && ys[i].is_finite()) {
            return None;
        }
        x[(i, 0)] = 1.0;
        x[(i, 1)] = xs[i];
        x[(i, 2)] = xs[i] * xs[i];
        y[i] = ys[i];
    }

    let beta = solve_least_squares(&x, &y)?;
    let c2 = beta[2];
    if !c2.is_finite() || c2 <= 0.0 {
        return None;
    }
    let vertex = -beta[1] / (2.0 * c2);
    vertex.is_finite().then_some(vertex)
}
