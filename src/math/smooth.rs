//! Rolling-median smoothing for initial-guess location.
//!
//! The fitter seeds its mid-transit search at the minimum of a median-smoothed
//! flux series so that a single noisy sample cannot hijack the initial guess.

/// Centered rolling median with a shrinking window at the edges.
///
/// Each output element is the median of up to `window` input elements centered
/// on it; near the boundaries the window is truncated rather than padded.
pub fn rolling_median(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let half = window / 2;
    let n = values.len();
    let mut out = Vec::with_capacity(n);
    let mut buf = Vec::with_capacity(window);

    for i in 0..n {
        let lo = i.saturating_sub(half);
        let hi = (i + half + 1).min(n);
        buf.clear();
        buf.extend(values[lo..hi].iter().copied().filter(|v| v.is_finite()));
        if buf.is_empty() {
            out.push(values[i]);
            continue;
        }
        buf.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = buf.len() / 2;
        let median = if buf.len() % 2 == 1 {
            buf[mid]
        } else {
            (buf[mid - 1] + buf[mid]) / 2.0
        };
        out.push(median);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_suppresses_single_outlier() {
        let values = [1.0, 1.0, 100.0, 1.0, 1.0];
        let smoothed = rolling_median(&values, 5);
        assert!((smoothed[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn window_shrinks_at_edges() {
        let values = [3.0, 1.0, 2.0];
        let smoothed = rolling_median(&values, 5);
        assert_eq!(smoothed.len(), 3);
        // Edge windows cover the available elements only.
        assert!((smoothed[0] - 2.0).abs() < 1e-12); // median of [3,1,2]
    }
}
