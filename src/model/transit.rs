//! Quadratic limb-darkened occultation model.
//!
//! The model is evaluated in three steps:
//!
//! 1. Orbit: mean anomaly from the mid-transit epoch, Kepler's equation by
//!    Newton iteration, true anomaly, and the sky-projected planet-star
//!    separation `z` in stellar radii. Eccentric orbits are supported via the
//!    argument of periapsis; circular orbits fall out of the same formulas.
//! 2. Occultation: flux loss of a quadratically limb-darkened star occulted
//!    by an opaque disk of radius `rp`, using the small-planet treatment
//!    (exact overlap area, band-averaged intensity under the planet). For
//!    radius ratios up to ~0.15 this is accurate to well below typical
//!    photometric noise.
//! 3. Exposure: supersampled averaging across the exposure time, so long
//!    cadences don't bias the fitted mid-transit time.

use std::f64::consts::PI;

/// Parameters for one model evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ModelParams {
    /// Mid-transit time (BJD).
    pub t0: f64,
    /// Orbital period in days.
    pub period: f64,
    /// Planet-to-star radius ratio.
    pub rp: f64,
    /// Semi-major axis in stellar radii.
    pub a: f64,
    /// Inclination in degrees.
    pub inc_deg: f64,
    /// Quadratic limb-darkening coefficients.
    pub u1: f64,
    pub u2: f64,
    /// Eccentricity.
    pub ecc: f64,
    /// Argument of periapsis in degrees.
    pub w_deg: f64,
    /// Exposure time in days.
    pub exp_time: f64,
    /// Supersampling factor for exposure integration.
    pub supersample: u32,
}

impl ModelParams {
    pub fn from_orbital(p: &crate::domain::OrbitalParameters, t0: f64, rp: f64, a: f64) -> Self {
        Self {
            t0,
            period: p.period_d,
            rp,
            a,
            inc_deg: p.inc_deg,
            u1: p.u1,
            u2: p.u2,
            ecc: p.ecc,
            w_deg: p.w_deg,
            exp_time: p.exp_time_d,
            supersample: p.supersample,
        }
    }

    pub fn with_t0(mut self, t0: f64) -> Self {
        self.t0 = t0;
        self
    }
}

/// Evaluate the model over a time series.
pub fn light_curve(params: &ModelParams, time: &[f64]) -> Vec<f64> {
    time.iter().map(|&t| model_flux_at(params, t)).collect()
}

/// Model flux at a single timestamp, averaged over the exposure.
pub fn model_flux_at(params: &ModelParams, t: f64) -> f64 {
    let n = params.supersample.max(1);
    if n == 1 || params.exp_time <= 0.0 {
        return instantaneous_flux(params, t);
    }

    let mut sum = 0.0;
    for i in 0..n {
        // Sub-exposure midpoints spanning [t - exp/2, t + exp/2].
        let u = (i as f64 + 0.5) / n as f64 - 0.5;
        sum += instantaneous_flux(params, t + u * params.exp_time);
    }
    sum / n as f64
}

fn instantaneous_flux(params: &ModelParams, t: f64) -> f64 {
    match sky_separation(params, t) {
        Some(z) => occulted_flux(z, params.rp, params.u1, params.u2),
        // Planet behind the star: no occultation.
        None => 1.0,
    }
}

/// Sky-projected planet-star separation in stellar radii.
///
/// Returns `None` when the planet is on the far side of the star (secondary
/// eclipse geometry), in which case the transit depth is zero.
fn sky_separation(params: &ModelParams, t: f64) -> Option<f64> {
    let ecc = params.ecc.clamp(0.0, 0.99);
    let w = params.w_deg.to_radians();
    let inc = params.inc_deg.to_radians();

    // True anomaly at inferior conjunction (mid-transit).
    let nu0 = PI / 2.0 - w;
    let e0 = 2.0 * (((1.0 - ecc) / (1.0 + ecc)).sqrt() * (nu0 / 2.0).tan()).atan();
    let m0 = e0 - ecc * e0.sin();

    let m = m0 + 2.0 * PI * (t - params.t0) / params.period;
    let e_anom = solve_kepler(m, ecc);
    let nu = 2.0 * (((1.0 + ecc) / (1.0 - ecc)).sqrt() * (e_anom / 2.0).tan()).atan();

    // Planet in front of the star only when sin(w + nu) > 0.
    if (w + nu).sin() <= 0.0 {
        return None;
    }

    let r = params.a * (1.0 - ecc * ecc) / (1.0 + ecc * nu.cos());
    let s = (w + nu).sin() * inc.sin();
    Some(r * (1.0 - s * s).max(0.0).sqrt())
}

/// Solve Kepler's equation `M = E - e sin E` by Newton iteration.
fn solve_kepler(m: f64, ecc: f64) -> f64 {
    if ecc == 0.0 {
        return m;
    }
    let mut e = if ecc < 0.8 { m } else { PI };
    for _ in 0..30 {
        let f = e - ecc * e.sin() - m;
        let fp = 1.0 - ecc * e.cos();
        let step = f / fp;
        e -= step;
        if step.abs() < 1e-13 {
            break;
        }
    }
    e
}

/// Flux of a quadratically limb-darkened star occulted by an opaque disk of
/// radius `p` at projected separation `z` (both in stellar radii).
fn occulted_flux(z: f64, p: f64, u1: f64, u2: f64) -> f64 {
    if p <= 0.0 || z >= 1.0 + p {
        return 1.0;
    }

    // Total stellar flux is pi * omega.
    let omega = 1.0 - u1 / 3.0 - u2 / 6.0;
    if omega <= 0.0 {
        return 1.0;
    }

    let area = overlap_area(z, p);
    if area <= 0.0 {
        return 1.0;
    }

    // Band-averaged intensity under the planet: the exact integral of I(r)
    // over the annulus [z-p, z+p] clipped to the stellar disk, normalized by
    // the annulus area.
    let r_lo = (z - p).max(0.0);
    let r_hi = (z + p).min(1.0);
    let band_area = r_hi * r_hi - r_lo * r_lo;
    let mean_intensity = if band_area > 1e-12 {
        (intensity_integral(r_hi, u1, u2) - intensity_integral(r_lo, u1, u2)) / band_area
    } else {
        // Planet centered on the disk center: intensity at r = 0.
        1.0
    };

    (1.0 - mean_intensity * area / (PI * omega)).clamp(0.0, 1.0)
}

/// `H(r) = ∫₀ʳ I(s) 2s ds` for quadratic limb darkening
/// `I(r) = 1 - u1 (1-μ) - u2 (1-μ)²`, `μ = sqrt(1-r²)`.
fn intensity_integral(r: f64, u1: f64, u2: f64) -> f64 {
    let r2 = r * r;
    let mu3 = (1.0 - r2).max(0.0).powf(1.5);
    let a = r2;
    let b = r2 - (2.0 / 3.0) * (1.0 - mu3);
    let c = 2.0 * r2 - (4.0 / 3.0) * (1.0 - mu3) - r2 * r2 / 2.0;
    a - u1 * b - u2 * c
}

/// Overlap area of a disk of radius `p` centered `z` away from a unit disk.
fn overlap_area(z: f64, p: f64) -> f64 {
    if z >= 1.0 + p {
        return 0.0;
    }
    if z <= (1.0 - p).abs() {
        // One disk fully inside the other.
        return if p <= 1.0 { PI * p * p } else { PI };
    }

    let z2 = z * z;
    let p2 = p * p;
    let k0 = ((z2 + p2 - 1.0) / (2.0 * z * p)).clamp(-1.0, 1.0).acos();
    let k1 = ((z2 + 1.0 - p2) / (2.0 * z)).clamp(-1.0, 1.0).acos();
    let s = ((1.0 + p - z) * (z + p - 1.0) * (z - p + 1.0) * (z + p + 1.0)).max(0.0);
    p2 * k0 + k1 - 0.5 * s.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circular(t0: f64, rp: f64) -> ModelParams {
        ModelParams {
            t0,
            period: 2.36,
            rp,
            a: 8.0,
            inc_deg: 90.0,
            u1: 0.0,
            u2: 0.0,
            ecc: 0.0,
            w_deg: 90.0,
            exp_time: 0.0,
            supersample: 1,
        }
    }

    #[test]
    fn out_of_transit_flux_is_unity() {
        let p = circular(100.0, 0.1);
        let f = model_flux_at(&p, 100.0 + p.period / 4.0);
        assert!((f - 1.0).abs() < 1e-12);
    }

    #[test]
    fn uniform_disk_depth_is_radius_ratio_squared() {
        // With u1 = u2 = 0 the mid-transit depth is exactly rp^2.
        let p = circular(100.0, 0.1);
        let f = model_flux_at(&p, 100.0);
        assert!((f - (1.0 - 0.01)).abs() < 1e-9);
    }

    #[test]
    fn limb_darkened_transit_is_deeper_at_center() {
        let mut p = circular(100.0, 0.1);
        p.u1 = 0.4;
        p.u2 = 0.2;
        let f = model_flux_at(&p, 100.0);
        // Center of the disk is brighter than average, so the central depth
        // exceeds rp^2.
        assert!(f < 1.0 - 0.01);
        assert!(f > 0.9);
    }

    #[test]
    fn circular_transit_is_symmetric() {
        let mut p = circular(50.0, 0.08);
        p.u1 = 0.5;
        p.u2 = 0.1;
        for dt in [0.01, 0.03, 0.05] {
            let before = model_flux_at(&p, 50.0 - dt);
            let after = model_flux_at(&p, 50.0 + dt);
            assert!(
                (before - after).abs() < 1e-9,
                "asymmetric at dt={dt}: {before} vs {after}"
            );
        }
    }

    #[test]
    fn no_secondary_eclipse_dip() {
        // Half a period after mid-transit the planet is behind the star.
        let p = circular(10.0, 0.1);
        let f = model_flux_at(&p, 10.0 + p.period / 2.0);
        assert!((f - 1.0).abs() < 1e-12);
    }

    #[test]
    fn supersampling_averages_over_the_exposure() {
        // t = 0.05 d sits on the ingress slope for these parameters
        // (z = 8 sin(2*pi*0.05/2.36) ~ 1.06, between 1-rp and 1+rp).
        let sharp = circular(0.0, 0.1);
        let t_ingress = 0.05;
        let f_sharp = model_flux_at(&sharp, t_ingress);
        assert!(f_sharp < 1.0 - 1e-6 && f_sharp > 1.0 - 0.01);

        let mut smeared_params = sharp;
        smeared_params.exp_time = 0.02;
        smeared_params.supersample = 15;
        let smeared = model_flux_at(&smeared_params, t_ingress);

        // The exposure average differs from the instantaneous value but stays
        // bounded by the extremes across the exposure.
        assert!(smeared.is_finite());
        assert!((smeared - f_sharp).abs() > 1e-9);
        assert!(smeared <= 1.0);
        assert!(smeared >= model_flux_at(&sharp, 0.0));
    }

    #[test]
    fn kepler_solver_matches_circular_limit() {
        for m in [-2.0, 0.0, 0.5, 3.0] {
            assert!((solve_kepler(m, 0.0) - m).abs() < 1e-12);
        }
        // Eccentric case: residual of Kepler's equation must vanish.
        let m = 1.3;
        let ecc = 0.4;
        let e = solve_kepler(m, ecc);
        assert!((e - ecc * e.sin() - m).abs() < 1e-10);
    }
}
