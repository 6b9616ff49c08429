use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// Compute the absolute difference between two angles (radians),
/// normalized into `[0, π]`.
pub fn angle_diff_abs(a: f32, b: f32) -> f32 {
    let two_pi = 2.0 * PI;
    let mut diff = (b - a).rem_euclid(two_pi);
    if diff >= PI {
        diff -= two_pi;
    }
    diff.abs()
}

/// Check whether two directions (given as angles in radians)
/// are approximately orthogonal within the given `tolerance`.
pub fn is_orthogonal(reference_angle: f32, other_angle: f32, tolerance: f32) -> bool {
    let diff_abs = angle_diff_abs(reference_angle, other_angle);
    (FRAC_PI_2 - diff_abs).abs() <= tolerance.abs()
}

/// Angle between an undirected axis `axis_angle` (defined modulo π) and a
/// directed vector angle `vec_angle`, in `[0, π/2]`.
pub fn axis_vec_diff(axis_angle: f32, vec_angle: f32) -> f32 {
    let diff_abs = angle_diff_abs(axis_angle, vec_angle);
    diff_abs.min(PI - diff_abs)
}

/// Dominant direction of a set of angles taken modulo π/2.
///
/// Uses the quadruple-angle mean so that two orthogonal families reinforce
/// instead of cancelling. Returns an angle in `[-π/4, π/4)`.
pub fn dominant_quarter_angle<I>(angles: I) -> Option<f32>
where
    I: IntoIterator<Item = (f32, f32)>,
{
    let (mut sx, mut sy, mut wsum) = (0.0f32, 0.0f32, 0.0f32);
    for (theta, weight) in angles {
        if weight <= 0.0 {
            continue;
        }
        sx += weight * (4.0 * theta).cos();
        sy += weight * (4.0 * theta).sin();
        wsum += weight;
    }
    if wsum <= 0.0 {
        return None;
    }
    let (mx, my) = (sx / wsum, sy / wsum);
    if mx * mx + my * my < 1e-6 {
        return None;
    }
    Some(wrap_quarter(0.25 * my.atan2(mx)))
}

/// Wrap an angle into `[-π/4, π/4)`.
pub fn wrap_quarter(theta: f32) -> f32 {
    (theta + FRAC_PI_4).rem_euclid(FRAC_PI_2) - FRAC_PI_4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_and_orthogonal_cases() {
        let tol = 1e-3;
        assert!(is_orthogonal(0.0, FRAC_PI_2, tol));
        assert!(!is_orthogonal(0.0, 0.25, 0.05));
    }

    #[test]
    fn axis_difference_ignores_direction() {
        assert!(axis_vec_diff(0.0, PI).abs() < 1e-6);
        assert!((axis_vec_diff(0.0, FRAC_PI_2) - FRAC_PI_2).abs() < 1e-6);
        assert!((axis_vec_diff(FRAC_PI_4, 0.0) - FRAC_PI_4).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_families_reinforce() {
        let angles = [(FRAC_PI_4, 1.0), (3.0 * FRAC_PI_4, 1.0), (-FRAC_PI_4, 0.5)];
        let theta = dominant_quarter_angle(angles).expect("dominant");
        assert!((theta + FRAC_PI_4).abs() < 1e-5, "{theta}");

        let rotated = [(0.1, 1.0), (0.1 + FRAC_PI_2, 1.0), (0.1 + PI, 1.0)];
        let theta = dominant_quarter_angle(rotated).expect("dominant");
        assert!((theta - 0.1).abs() < 1e-5);
    }
}
