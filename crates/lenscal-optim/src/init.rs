//! Closed-form starting points for the bundle adjustment.

use lenscal_core::{estimate_homography, CameraModel, Distortion, Homography, ImageSize, ViewPose};
use nalgebra::{
    DMatrix, DVector, Isometry3, Matrix3, Point2, Point3, Rotation3, Translation3, UnitQuaternion,
    Vector3,
};

/// Principal point guess at the geometric image centre.
pub fn centre_principal_point(size: ImageSize) -> (f64, f64) {
    (
        (size.width as f64 - 1.0) * 0.5,
        (size.height as f64 - 1.0) * 0.5,
    )
}

/// Focal lengths from the orthogonality of the homography columns.
///
/// Each board-to-pixel homography gives two linear constraints on
/// `(1/fx^2, 1/fy^2)` once the principal point is removed: the projected
/// board axes are orthogonal, and so are their diagonals.
pub fn pinhole_focal_from_homographies(
    homographies: &[Homography],
    principal: (f64, f64),
    aspect_ratio: Option<f64>,
) -> Option<(f64, f64)> {
    if homographies.is_empty() {
        return None;
    }
    let shift = Matrix3::new(
        1.0, 0.0, -principal.0, //
        0.0, 1.0, -principal.1, //
        0.0, 0.0, 1.0,
    );
    let n = homographies.len();
    let mut a = DMatrix::zeros(2 * n, 2);
    let mut b = DVector::zeros(2 * n);

    for (i, hom) in homographies.iter().enumerate() {
        let h = shift * hom.h;
        let c0: Vector3<f64> = h.column(0).into_owned();
        let c1: Vector3<f64> = h.column(1).into_owned();
        let d1 = (c0 + c1) * 0.5;
        let d2 = (c0 - c1) * 0.5;
        let (c0, c1, d1, d2) = (
            c0.try_normalize(f64::EPSILON)?,
            c1.try_normalize(f64::EPSILON)?,
            d1.try_normalize(f64::EPSILON)?,
            d2.try_normalize(f64::EPSILON)?,
        );

        a[(2 * i, 0)] = c0.x * c1.x;
        a[(2 * i, 1)] = c0.y * c1.y;
        b[2 * i] = -c0.z * c1.z;
        a[(2 * i + 1, 0)] = d1.x * d2.x;
        a[(2 * i + 1, 1)] = d1.y * d2.y;
        b[2 * i + 1] = -d1.z * d2.z;
    }

    let f = a.svd(true, true).solve(&b, 1e-15).ok()?;
    if f[0].abs() < f64::EPSILON || f[1].abs() < f64::EPSILON {
        return None;
    }
    let mut fx = (1.0 / f[0]).abs().sqrt();
    let mut fy = (1.0 / f[1]).abs().sqrt();
    if let Some(ratio) = aspect_ratio {
        let tf = (fx + fy) / (ratio + 1.0);
        fx = ratio * tf;
        fy = tf;
    }
    (fx.is_finite() && fy.is_finite() && fx > 0.0 && fy > 0.0).then_some((fx, fy))
}

/// Kannala-Brandt starting point: equidistant projection spanning the
/// larger image side over a half turn.
pub fn wide_angle_initial_model(size: ImageSize) -> CameraModel {
    let f = size.width.max(size.height) as f64 / std::f64::consts::PI;
    let cx = size.width as f64 * 0.5 - 0.5;
    let cy = size.height as f64 * 0.5 - 0.5;
    CameraModel::new(
        Matrix3::new(f, 0.0, cx, 0.0, f, cy, 0.0, 0.0, 1.0),
        Distortion::zero_wide_angle(),
    )
}

/// Board pose from a homography mapping board `(x, y)` to normalized
/// image coordinates.
pub fn pose_from_normalized_homography(h: &Matrix3<f64>) -> Option<ViewPose> {
    let h1: Vector3<f64> = h.column(0).into_owned();
    let h2: Vector3<f64> = h.column(1).into_owned();
    let h3: Vector3<f64> = h.column(2).into_owned();

    let norm = 0.5 * (h1.norm() + h2.norm());
    if !norm.is_finite() || norm <= f64::EPSILON {
        return None;
    }
    let mut lambda = 1.0 / norm;
    // Board in front of the camera.
    if (lambda * h3).z < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    let t = h3 * lambda;

    let approx = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = approx.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let fix = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0));
        r = u * fix * v_t;
    }

    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    let iso = Isometry3::from_parts(Translation3::from(t), rot);
    let pose = ViewPose::from_isometry(&iso);
    (pose.rvec.iter().chain(pose.tvec.iter()).all(|v| v.is_finite())).then_some(pose)
}

/// Homography from board `(x, y)` to the given 2D points.
pub fn board_homography(object: &[Point3<f64>], image: &[Point2<f64>]) -> Option<Homography> {
    let src: Vec<Point2<f64>> = object.iter().map(|p| Point2::new(p.x, p.y)).collect();
    estimate_homography(&src, image)
}
