//! Lens distortion formulas.
//!
//! Two mutually exclusive coefficient layouts are supported:
//! - the rational pinhole model `[k1, k2, p1, p2, k3, k4, k5, k6]`,
//! - the Kannala-Brandt wide-angle model `[k1, k2, k3, k4]` acting on the
//!   incidence angle `theta`.
//!
//! All functions work on normalized image coordinates (`X/Z`, `Y/Z`).

use serde::{Deserialize, Serialize};

pub const PINHOLE_COEFFS: usize = 8;
pub const WIDE_ANGLE_COEFFS: usize = 4;

const UNDISTORT_ITERS: usize = 20;
const THETA_EPS: f64 = 1e-8;

/// Distortion coefficients tagged with their layout.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", content = "coefficients", rename_all = "snake_case")]
pub enum Distortion {
    Pinhole([f64; PINHOLE_COEFFS]),
    WideAngle([f64; WIDE_ANGLE_COEFFS]),
}

impl Distortion {
    pub fn zero_pinhole() -> Self {
        Distortion::Pinhole([0.0; PINHOLE_COEFFS])
    }

    pub fn zero_wide_angle() -> Self {
        Distortion::WideAngle([0.0; WIDE_ANGLE_COEFFS])
    }

    /// Build from a plain coefficient list.
    ///
    /// Pinhole lists shorter than eight entries (4, 5 or 8 are common) are
    /// zero-padded. Wide-angle lists must have exactly four entries.
    pub fn from_coefficients(wide_angle: bool, coeffs: &[f64]) -> Option<Self> {
        if wide_angle {
            let arr: [f64; WIDE_ANGLE_COEFFS] = coeffs.try_into().ok()?;
            Some(Distortion::WideAngle(arr))
        } else {
            if coeffs.len() > PINHOLE_COEFFS {
                return None;
            }
            let mut arr = [0.0; PINHOLE_COEFFS];
            arr[..coeffs.len()].copy_from_slice(coeffs);
            Some(Distortion::Pinhole(arr))
        }
    }

    pub fn coefficients(&self) -> &[f64] {
        match self {
            Distortion::Pinhole(c) => c,
            Distortion::WideAngle(c) => c,
        }
    }

    pub fn coefficients_mut(&mut self) -> &mut [f64] {
        match self {
            Distortion::Pinhole(c) => c,
            Distortion::WideAngle(c) => c,
        }
    }

    pub fn is_wide_angle(&self) -> bool {
        matches!(self, Distortion::WideAngle(_))
    }

    /// Map an ideal normalized point to its distorted normalized position.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Distortion::Pinhole(c) => distort_rational(c, x, y),
            Distortion::WideAngle(c) => distort_kannala_brandt(c, x, y),
        }
    }

    /// Invert [`Distortion::distort`] iteratively.
    ///
    /// Pinhole points beyond the radius where the radial factor changes sign
    /// come back unchanged. Returns `None` for non-finite results and for
    /// wide-angle points whose incidence angle does not converge below 90°.
    pub fn undistort(&self, xd: f64, yd: f64) -> Option<(f64, f64)> {
        match self {
            Distortion::Pinhole(c) => undistort_rational(c, xd, yd),
            Distortion::WideAngle(c) => undistort_kannala_brandt(c, xd, yd),
        }
    }
}

fn distort_rational(c: &[f64; PINHOLE_COEFFS], x: f64, y: f64) -> (f64, f64) {
    let [k1, k2, p1, p2, k3, k4, k5, k6] = *c;
    let r2 = x * x + y * y;
    let r4 = r2 * r2;
    let r6 = r4 * r2;
    let radial = (1.0 + k1 * r2 + k2 * r4 + k3 * r6) / (1.0 + k4 * r2 + k5 * r4 + k6 * r6);
    let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
    let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
    (xd, yd)
}

fn undistort_rational(c: &[f64; PINHOLE_COEFFS], xd: f64, yd: f64) -> Option<(f64, f64)> {
    let [k1, k2, p1, p2, k3, k4, k5, k6] = *c;
    let (mut x, mut y) = (xd, yd);
    for _ in 0..UNDISTORT_ITERS {
        let r2 = x * x + y * y;
        let icdist =
            (1.0 + ((k6 * r2 + k5) * r2 + k4) * r2) / (1.0 + ((k3 * r2 + k2) * r2 + k1) * r2);
        if !icdist.is_finite() {
            return None;
        }
        if icdist < 0.0 {
            // Outside the invertible radius: keep the distorted position.
            return Some((xd, yd));
        }
        let dx = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let dy = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        x = (xd - dx) * icdist;
        y = (yd - dy) * icdist;
    }
    (x.is_finite() && y.is_finite()).then_some((x, y))
}

#[inline]
fn theta_poly(c: &[f64; WIDE_ANGLE_COEFFS], theta: f64) -> f64 {
    let t2 = theta * theta;
    let t4 = t2 * t2;
    let t6 = t4 * t2;
    let t8 = t4 * t4;
    theta * (1.0 + c[0] * t2 + c[1] * t4 + c[2] * t6 + c[3] * t8)
}

fn distort_kannala_brandt(c: &[f64; WIDE_ANGLE_COEFFS], x: f64, y: f64) -> (f64, f64) {
    let r = (x * x + y * y).sqrt();
    if r < THETA_EPS {
        return (x, y);
    }
    let theta = r.atan();
    let scale = theta_poly(c, theta) / r;
    (x * scale, y * scale)
}

fn undistort_kannala_brandt(c: &[f64; WIDE_ANGLE_COEFFS], xd: f64, yd: f64) -> Option<(f64, f64)> {
    let theta_d = (xd * xd + yd * yd)
        .sqrt()
        .clamp(-std::f64::consts::FRAC_PI_2, std::f64::consts::FRAC_PI_2);
    if theta_d < THETA_EPS {
        return Some((xd, yd));
    }

    // Newton on theta_poly(theta) = theta_d.
    let mut theta = theta_d;
    let mut converged = false;
    for _ in 0..10 {
        let t2 = theta * theta;
        let t4 = t2 * t2;
        let t6 = t4 * t2;
        let t8 = t4 * t4;
        let derivative =
            1.0 + 3.0 * c[0] * t2 + 5.0 * c[1] * t4 + 7.0 * c[2] * t6 + 9.0 * c[3] * t8;
        let fix = (theta_poly(c, theta) - theta_d) / derivative;
        theta -= fix;
        if fix.abs() < THETA_EPS {
            converged = true;
            break;
        }
    }

    if !converged || theta < 0.0 || theta >= std::f64::consts::FRAC_PI_2 {
        return None;
    }
    let scale = theta.tan() / theta_d;
    Some((xd * scale, yd * scale))
}
