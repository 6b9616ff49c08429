use nalgebra::{Isometry3, Matrix3, Point2, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::distortion::Distortion;

/// Largest magnitude accepted by [`CameraModel::check_range`].
pub const PARAM_ABS_LIMIT: f64 = 1e12;

/// Intrinsic matrix plus distortion coefficients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub camera_matrix: Matrix3<f64>,
    pub distortion: Distortion,
}

/// Rotation vector (axis * angle) plus translation, board frame to camera.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewPose {
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl ViewPose {
    pub fn isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.tvec),
            UnitQuaternion::from_scaled_axis(self.rvec),
        )
    }

    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        Self {
            rvec: iso.rotation.scaled_axis(),
            tvec: iso.translation.vector,
        }
    }

    /// `[rx, ry, rz, tx, ty, tz]` as persisted per view.
    pub fn sextuple(&self) -> [f64; 6] {
        [
            self.rvec.x,
            self.rvec.y,
            self.rvec.z,
            self.tvec.x,
            self.tvec.y,
            self.tvec.z,
        ]
    }
}

impl CameraModel {
    pub fn new(camera_matrix: Matrix3<f64>, distortion: Distortion) -> Self {
        Self {
            camera_matrix,
            distortion,
        }
    }

    pub fn is_wide_angle(&self) -> bool {
        self.distortion.is_wide_angle()
    }

    pub fn fx(&self) -> f64 {
        self.camera_matrix[(0, 0)]
    }

    pub fn fy(&self) -> f64 {
        self.camera_matrix[(1, 1)]
    }

    pub fn cx(&self) -> f64 {
        self.camera_matrix[(0, 2)]
    }

    pub fn cy(&self) -> f64 {
        self.camera_matrix[(1, 2)]
    }

    /// Project a point given in camera coordinates to pixels.
    #[inline]
    pub fn project_camera_point(&self, p: &Vector3<f64>) -> Point2<f64> {
        let (xd, yd) = self.distortion.distort(p.x / p.z, p.y / p.z);
        self.normalized_to_pixel(xd, yd)
    }

    /// Project board points through a view pose.
    pub fn project_points(&self, points: &[Point3<f32>], pose: &ViewPose) -> Vec<Point2<f32>> {
        let iso = pose.isometry();
        points
            .iter()
            .map(|p| {
                let pc = iso * Point3::new(p.x as f64, p.y as f64, p.z as f64);
                let px = self.project_camera_point(&pc.coords);
                Point2::new(px.x as f32, px.y as f32)
            })
            .collect()
    }

    /// Apply the intrinsic matrix to a distorted normalized point.
    #[inline]
    pub fn normalized_to_pixel(&self, xd: f64, yd: f64) -> Point2<f64> {
        let k = &self.camera_matrix;
        Point2::new(
            k[(0, 0)] * xd + k[(0, 1)] * yd + k[(0, 2)],
            k[(1, 1)] * yd + k[(1, 2)],
        )
    }

    /// Pixel to ideal (undistorted) normalized coordinates.
    pub fn undistort_pixel(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let k = &self.camera_matrix;
        let yd = (p.y - k[(1, 2)]) / k[(1, 1)];
        let xd = (p.x - k[(0, 2)] - k[(0, 1)] * yd) / k[(0, 0)];
        let (x, y) = self.distortion.undistort(xd, yd)?;
        Some(Point2::new(x, y))
    }

    /// Finite and bounded intrinsics and coefficients.
    pub fn check_range(&self) -> bool {
        self.camera_matrix
            .iter()
            .chain(self.distortion.coefficients())
            .all(|v| v.is_finite() && v.abs() <= PARAM_ABS_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pinhole() -> CameraModel {
        CameraModel::new(
            Matrix3::new(800.0, 0.0, 320.0, 0.0, 780.0, 240.0, 0.0, 0.0, 1.0),
            Distortion::Pinhole([-0.1, 0.01, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        )
    }

    #[test]
    fn projection_round_trips_through_undistort() {
        let cam = pinhole();
        let p = Vector3::new(0.12, -0.07, 1.0);
        let px = cam.project_camera_point(&p);
        let back = cam.undistort_pixel(px).expect("valid");
        assert_relative_eq!(back.x, 0.12, epsilon = 1e-8);
        assert_relative_eq!(back.y, -0.07, epsilon = 1e-8);
    }

    #[test]
    fn identity_pose_projects_onto_principal_point() {
        let cam = pinhole();
        let pose = ViewPose {
            rvec: Vector3::zeros(),
            tvec: Vector3::new(0.0, 0.0, 2.0),
        };
        let px = cam.project_points(&[Point3::new(0.0, 0.0, 0.0)], &pose);
        assert_relative_eq!(px[0].x, 320.0);
        assert_relative_eq!(px[0].y, 240.0);
    }

    #[test]
    fn check_range_rejects_non_finite() {
        let mut cam = pinhole();
        assert!(cam.check_range());
        cam.distortion.coefficients_mut()[0] = f64::NAN;
        assert!(!cam.check_range());
        let mut cam = pinhole();
        cam.camera_matrix[(0, 0)] = 1e13;
        assert!(!cam.check_range());
    }

    #[test]
    fn pose_sextuple_layout() {
        let pose = ViewPose {
            rvec: Vector3::new(0.1, 0.2, 0.3),
            tvec: Vector3::new(1.0, 2.0, 3.0),
        };
        assert_eq!(pose.sextuple(), [0.1, 0.2, 0.3, 1.0, 2.0, 3.0]);
        let back = ViewPose::from_isometry(&pose.isometry());
        assert_relative_eq!(back.rvec, pose.rvec, epsilon = 1e-12);
    }
}
