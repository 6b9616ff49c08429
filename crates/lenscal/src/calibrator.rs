//! Estimation over an observation set, reprojection errors and the range
//! check.

use lenscal_core::{
    apply_grid_width, natural_grid_width, object_points, BoardSize, CameraModel, ImageSize,
    ModelVariant, PatternKind, ViewPose,
};
use lenscal_optim::{CameraEstimator, LmEstimator, Observations};
use log::{info, warn};
use nalgebra::{Point2, Point3};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::CalibrationError;

/// Everything one estimation needs besides the estimator itself.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationRequest<'a> {
    pub image_points: &'a [Vec<Point2<f32>>],
    pub image_size: ImageSize,
    pub pattern: PatternKind,
    pub board: BoardSize,
    pub square_size: f32,
    pub variant: ModelVariant,
    /// Measured distance between the first and last point of the first row.
    /// When set, pinhole estimation also refines the target layout.
    pub grid_width: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct CalibrationResult {
    pub model: CameraModel,
    pub poses: Vec<ViewPose>,
    pub per_view_errors: Vec<f64>,
    /// Pooled reprojection RMS over all views.
    pub rms: f64,
    /// RMS reported by the optimizer itself.
    pub optimizer_rms: f64,
    /// Target layout the errors were computed against; refined when
    /// `released`.
    pub object_points: Vec<Point3<f32>>,
    pub released: bool,
}

/// `sqrt(sum(sq_sums) / sum(counts))`; zero when there are no points.
pub fn pooled_rms(sq_sums: &[f64], counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    (sq_sums.iter().sum::<f64>() / total as f64).sqrt()
}

/// Per-view RMS and the pooled RMS of `image_points` against the projection
/// of `template` through `model` and each view's pose.
pub fn reprojection_errors(
    model: &CameraModel,
    poses: &[ViewPose],
    template: &[Point3<f32>],
    image_points: &[Vec<Point2<f32>>],
) -> (Vec<f64>, f64) {
    let mut sq_sums = Vec::with_capacity(poses.len());
    let mut counts = Vec::with_capacity(poses.len());
    for (pose, observed) in poses.iter().zip(image_points) {
        let projected = model.project_points(template, pose);
        let sq: f64 = projected
            .iter()
            .zip(observed)
            .map(|(p, o)| (p - o).cast::<f64>().norm_squared())
            .sum();
        sq_sums.push(sq);
        counts.push(observed.len());
    }
    let per_view = sq_sums
        .iter()
        .zip(&counts)
        .map(|(sq, &n)| if n == 0 { 0.0 } else { (sq / n as f64).sqrt() })
        .collect();
    (per_view, pooled_rms(&sq_sums, &counts))
}

/// Runs a [`CameraEstimator`] over an observation set.
#[derive(Debug, Clone, Default)]
pub struct Calibrator<E = LmEstimator> {
    estimator: E,
}

impl Calibrator<LmEstimator> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: CameraEstimator> Calibrator<E> {
    pub fn with_estimator(estimator: E) -> Self {
        Self { estimator }
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip_all,
            fields(views = request.image_points.len(), released = request.grid_width.is_some())
        )
    )]
    pub fn calibrate(
        &self,
        request: &CalibrationRequest<'_>,
    ) -> Result<CalibrationResult, CalibrationError> {
        let board = request.board;
        let mut template = object_points(request.pattern, board, request.square_size);
        let grid_width = request
            .grid_width
            .unwrap_or_else(|| natural_grid_width(&template, board));
        apply_grid_width(&mut template, board, grid_width);

        let release = request.grid_width.is_some() && request.variant.supports_fixed_point();
        if request.grid_width.is_some() && !release {
            warn!("target release is not available for wide-angle lenses; keeping the layout rigid");
        }
        let fixed_point = release.then(|| board.width.saturating_sub(1));

        let objects = vec![template.clone(); request.image_points.len()];
        let observations = Observations {
            object_points: &objects,
            image_points: request.image_points,
            image_size: request.image_size,
        };
        let estimate = self
            .estimator
            .estimate(&observations, &request.variant, fixed_point)?;

        let released = estimate.refined_object_points.is_some();
        let object_points = estimate.refined_object_points.unwrap_or(template);
        let (per_view_errors, rms) = reprojection_errors(
            &estimate.model,
            &estimate.poses,
            &object_points,
            request.image_points,
        );

        if !estimate.model.check_range() {
            return Err(CalibrationError::OutOfRange {
                optimizer_rms: estimate.rms,
                avg_error: rms,
            });
        }
        info!(
            "estimated {} views, optimizer rms {:.4}, pooled rms {:.4}",
            estimate.poses.len(),
            estimate.rms,
            rms
        );

        Ok(CalibrationResult {
            model: estimate.model,
            poses: estimate.poses,
            per_view_errors,
            rms,
            optimizer_rms: estimate.rms,
            object_points,
            released,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use lenscal_core::{Distortion, PinholeFlags, WideAngleFlags};
    use lenscal_optim::{Estimate, EstimationError, SolveReport};
    use nalgebra::{Matrix3, Vector3};

    const SIZE: ImageSize = ImageSize::new(640, 480);
    const BOARD: BoardSize = BoardSize::new(7, 5);
    const SQUARE: f32 = 0.03;

    fn truth() -> CameraModel {
        CameraModel::new(
            Matrix3::new(600.0, 0.0, 320.0, 0.0, 600.0, 240.0, 0.0, 0.0, 1.0),
            Distortion::zero_pinhole(),
        )
    }

    fn poses() -> Vec<ViewPose> {
        [
            ([0.25, -0.15, 0.05], [-0.09, -0.06, 0.5]),
            ([-0.2, 0.25, -0.1], [-0.1, -0.05, 0.55]),
            ([0.1, 0.3, 0.2], [-0.08, -0.07, 0.45]),
            ([-0.3, -0.1, 0.0], [-0.06, -0.08, 0.6]),
            ([0.05, -0.35, -0.15], [-0.11, -0.04, 0.5]),
        ]
        .into_iter()
        .map(|(r, t)| ViewPose {
            rvec: Vector3::from(r),
            tvec: Vector3::from(t),
        })
        .collect()
    }

    fn synthetic_views() -> Vec<Vec<Point2<f32>>> {
        let template = object_points(PatternKind::Chessboard, BOARD, SQUARE);
        poses()
            .iter()
            .map(|p| truth().project_points(&template, p))
            .collect()
    }

    fn request(views: &[Vec<Point2<f32>>], variant: ModelVariant) -> CalibrationRequest<'_> {
        CalibrationRequest {
            image_points: views,
            image_size: SIZE,
            pattern: PatternKind::Chessboard,
            board: BOARD,
            square_size: SQUARE,
            variant,
            grid_width: None,
        }
    }

    #[test]
    fn pooled_rms_is_not_the_mean_of_views() {
        assert_relative_eq!(pooled_rms(&[4.0, 6.0], &[20, 20]), 0.5);
        // Views with 1.5 px and 1/6 px RMS.
        let pooled = pooled_rms(&[9.0, 1.0], &[4, 36]);
        assert_relative_eq!(pooled, 0.5);
        let mean = (1.5 + 1.0 / 6.0) / 2.0;
        assert!((pooled - mean).abs() > 0.3);
        assert_eq!(pooled_rms(&[], &[]), 0.0);
    }

    #[test]
    fn per_view_errors_follow_the_residuals() {
        let template = [Point3::new(0.0, 0.0, 0.0), Point3::new(0.03, 0.0, 0.0)];
        let pose = poses()[0];
        let mut observed = truth().project_points(&template, &pose);
        observed[0].x += 3.0;
        observed[1].y -= 4.0;
        let (per_view, total) =
            reprojection_errors(&truth(), &[pose, pose], &template, &[observed.clone(), observed]);
        let expected = (25.0f64 / 2.0).sqrt();
        assert_relative_eq!(per_view[0], expected, epsilon = 1e-4);
        assert_relative_eq!(total, expected, epsilon = 1e-4);
    }

    #[test]
    fn flat_pinhole_converges_to_near_zero_error() {
        let views = synthetic_views();
        let flags = PinholeFlags {
            zero_tangent_dist: true,
            fix_k: [false, false, true, true, true],
            ..PinholeFlags::default()
        };
        let result = Calibrator::new()
            .calibrate(&request(&views, ModelVariant::Pinhole(flags)))
            .expect("calibrates");
        assert!(result.rms < 0.5, "rms {}", result.rms);
        assert_eq!(result.per_view_errors.len(), views.len());
        assert!(!result.released);
        assert_relative_eq!(result.model.fx(), 600.0, max_relative = 1e-2);
    }

    #[test]
    fn grid_width_releases_pinhole_targets_only() {
        let views = synthetic_views();
        let flags = PinholeFlags {
            zero_tangent_dist: true,
            fix_k: [false, false, true, true, true],
            ..PinholeFlags::default()
        };
        let mut req = request(&views, ModelVariant::Pinhole(flags));
        req.grid_width = Some(0.18);
        let result = Calibrator::new().calibrate(&req).expect("calibrates");
        assert!(result.released);
        assert_relative_eq!(result.object_points[6].x, 0.18, epsilon = 1e-6);
        assert!(result.rms < 0.5, "rms {}", result.rms);
    }

    struct Fixed(CameraModel);

    impl CameraEstimator for Fixed {
        fn estimate(
            &self,
            observations: &Observations<'_>,
            _variant: &ModelVariant,
            fixed_point: Option<usize>,
        ) -> Result<Estimate, EstimationError> {
            if fixed_point.is_some() {
                return Err(EstimationError::FixedPointUnsupported);
            }
            Ok(Estimate {
                model: self.0.clone(),
                poses: poses()[..observations.image_points.len()].to_vec(),
                refined_object_points: None,
                rms: 0.25,
                report: SolveReport::default(),
            })
        }
    }

    #[test]
    fn out_of_range_models_are_rejected() {
        let views = synthetic_views();
        let mut broken = truth();
        broken.camera_matrix[(0, 0)] = f64::INFINITY;
        let err = Calibrator::with_estimator(Fixed(broken))
            .calibrate(&request(&views, ModelVariant::Pinhole(PinholeFlags::default())))
            .expect_err("non-finite focal length");
        assert!(matches!(
            err,
            CalibrationError::OutOfRange { optimizer_rms, .. } if optimizer_rms == 0.25
        ));
    }

    #[test]
    fn wide_angle_ignores_grid_width_release() {
        let views = synthetic_views();
        let mut req = request(&views, ModelVariant::WideAngle(WideAngleFlags::default()));
        req.grid_width = Some(0.2);
        let result = Calibrator::with_estimator(Fixed(truth()))
            .calibrate(&req)
            .expect("rigid target");
        assert!(!result.released);
        assert_relative_eq!(result.object_points[6].x, 0.2, epsilon = 1e-6);
    }
}
