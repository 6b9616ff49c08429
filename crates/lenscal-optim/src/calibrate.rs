use lenscal_core::{
    CameraModel, Distortion, ImageSize, ModelVariant, PinholeFlags, ViewPose, WideAngleFlags,
};
use log::{debug, warn};
use nalgebra::{DVector, Matrix3, Point2, Point3};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::bundle::{BundleProblem, Layout, LayoutMasks};
use crate::error::EstimationError;
use crate::init::{
    board_homography, centre_principal_point, pinhole_focal_from_homographies,
    pose_from_normalized_homography, wide_angle_initial_model,
};
use crate::lm::{solve, SolveOptions, SolveReport};

/// Fewest views an estimation accepts.
pub const MIN_VIEWS: usize = 1;
const MIN_POINTS: usize = 4;
const PLANARITY_EPS: f32 = 1e-6;

/// Matched target/image point lists, one entry per accepted view.
#[derive(Debug, Clone, Copy)]
pub struct Observations<'a> {
    pub object_points: &'a [Vec<Point3<f32>>],
    pub image_points: &'a [Vec<Point2<f32>>],
    pub image_size: ImageSize,
}

#[derive(Debug, Clone)]
pub struct Estimate {
    pub model: CameraModel,
    /// One pose per view, in input order.
    pub poses: Vec<ViewPose>,
    /// Refined target layout when object release was requested.
    pub refined_object_points: Option<Vec<Point3<f32>>>,
    /// Pooled reprojection RMS at the optimum, pixels.
    pub rms: f64,
    pub report: SolveReport,
}

/// Estimates a camera model from planar-target observations.
pub trait CameraEstimator {
    /// `fixed_point` requests object-point release around the given
    /// template index; only pinhole lenses support it.
    fn estimate(
        &self,
        observations: &Observations<'_>,
        variant: &ModelVariant,
        fixed_point: Option<usize>,
    ) -> Result<Estimate, EstimationError>;
}

/// Levenberg-Marquardt backed [`CameraEstimator`].
#[derive(Debug, Clone, Default)]
pub struct LmEstimator {
    pub options: SolveOptions,
}

impl LmEstimator {
    pub fn new(options: SolveOptions) -> Self {
        Self { options }
    }
}

impl CameraEstimator for LmEstimator {
    fn estimate(
        &self,
        observations: &Observations<'_>,
        variant: &ModelVariant,
        fixed_point: Option<usize>,
    ) -> Result<Estimate, EstimationError> {
        match variant {
            ModelVariant::Pinhole(flags) => {
                calibrate_pinhole(observations, flags, fixed_point, &self.options)
            }
            ModelVariant::WideAngle(flags) => {
                if fixed_point.is_some() {
                    return Err(EstimationError::FixedPointUnsupported);
                }
                calibrate_wide_angle(observations, flags, &self.options)
            }
        }
    }
}

struct Prepared {
    objects: Vec<Vec<Point3<f64>>>,
    images: Vec<Vec<Point2<f64>>>,
}

fn prepare(obs: &Observations<'_>) -> Result<Prepared, EstimationError> {
    let views = obs.image_points.len();
    if views < MIN_VIEWS || obs.object_points.len() < MIN_VIEWS {
        return Err(EstimationError::TooFewViews {
            got: views.min(obs.object_points.len()),
            min: MIN_VIEWS,
        });
    }
    if obs.object_points.len() != views {
        return Err(EstimationError::MismatchedView {
            view: views.min(obs.object_points.len()),
            object: obs.object_points.len(),
            image: views,
        });
    }

    let mut objects = Vec::with_capacity(views);
    let mut images = Vec::with_capacity(views);
    for (view, (obj, img)) in obs.object_points.iter().zip(obs.image_points).enumerate() {
        if obj.len() != img.len() {
            return Err(EstimationError::MismatchedView {
                view,
                object: obj.len(),
                image: img.len(),
            });
        }
        if img.len() < MIN_POINTS {
            return Err(EstimationError::TooFewPoints { view });
        }
        if obj.iter().any(|p| p.z.abs() > PLANARITY_EPS) {
            return Err(EstimationError::NonPlanarTarget { view });
        }
        objects.push(obj.iter().map(|p| p.cast::<f64>()).collect());
        images.push(img.iter().map(|p| p.cast::<f64>()).collect());
    }
    Ok(Prepared { objects, images })
}

/// Anchors for object release: first point, the requested one and the last.
fn release_anchors(
    prepared: &Prepared,
    fixed_point: Option<usize>,
) -> Result<Option<[usize; 3]>, EstimationError> {
    let Some(fixed) = fixed_point else {
        return Ok(None);
    };
    let template = &prepared.objects[0];
    let n = template.len();
    if fixed == 0 || fixed + 1 >= n {
        warn!("fixed point {fixed} outside 1..{}; keeping the target rigid", n.saturating_sub(1));
        return Ok(None);
    }
    if prepared.objects.iter().any(|o| o != template) {
        return Err(EstimationError::InconsistentTargets);
    }
    Ok(Some([0, fixed, n - 1]))
}

fn write_pose(base: &mut DVector<f64>, layout: &Layout, view: usize, pose: &ViewPose) {
    let o = layout.pose_offset(view);
    for (i, v) in pose.sextuple().into_iter().enumerate() {
        base[o + i] = v;
    }
}

fn write_model(base: &mut DVector<f64>, model: &CameraModel) {
    base[0] = model.fx();
    base[1] = model.fy();
    base[2] = model.cx();
    base[3] = model.cy();
    for (i, c) in model.distortion.coefficients().iter().enumerate() {
        base[4 + i] = *c;
    }
}

fn run_bundle(
    prepared: &Prepared,
    layout: Layout,
    model: &CameraModel,
    poses: &[ViewPose],
    opts: &SolveOptions,
) -> Result<Estimate, EstimationError> {
    let mut base = DVector::zeros(layout.full_len());
    write_model(&mut base, model);
    for (view, pose) in poses.iter().enumerate() {
        write_pose(&mut base, &layout, view, pose);
    }
    for (k, p) in prepared.objects[0].iter().take(layout.n_object).enumerate() {
        let o = layout.object_offset(k);
        base[o] = p.x;
        base[o + 1] = p.y;
        base[o + 2] = p.z;
    }

    let problem = BundleProblem::new(layout, base, &prepared.objects, &prepared.images);
    let (x, report) = solve(&problem, problem.initial_free(), opts);
    debug!(
        "bundle adjustment: {} params, {} iterations, cost {:.6e}, converged {}",
        x.len(),
        report.iterations,
        report.final_cost,
        report.converged
    );
    if !x.iter().all(|v| v.is_finite()) || !report.final_cost.is_finite() {
        return Err(EstimationError::NonFinite);
    }

    let full = problem.expand(&x);
    let layout = problem.layout();
    let poses = (0..layout.n_views)
        .map(|view| ViewPose::from_isometry(&problem.pose(&full, view)))
        .collect();
    let refined_object_points = (layout.n_object > 0).then(|| {
        (0..layout.n_object)
            .map(|k| problem.object_point(&full, 0, k).cast::<f32>())
            .collect()
    });
    let rms = (2.0 * report.final_cost / problem.total_points() as f64).sqrt();

    Ok(Estimate {
        model: problem.model(&full),
        poses,
        refined_object_points,
        rms,
        report,
    })
}

/// Rational-distortion pinhole calibration.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(views = obs.image_points.len()))
)]
pub fn calibrate_pinhole(
    obs: &Observations<'_>,
    flags: &PinholeFlags,
    fixed_point: Option<usize>,
    opts: &SolveOptions,
) -> Result<Estimate, EstimationError> {
    let prepared = prepare(obs)?;
    let anchors = release_anchors(&prepared, fixed_point)?;

    let homographies = prepared
        .objects
        .iter()
        .zip(&prepared.images)
        .enumerate()
        .map(|(view, (obj, img))| {
            board_homography(obj, img).ok_or(EstimationError::DegenerateView { view })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (cx, cy) = centre_principal_point(obs.image_size);
    let (fx, fy) =
        pinhole_focal_from_homographies(&homographies, (cx, cy), flags.fix_aspect_ratio)
            .ok_or(EstimationError::DegenerateIntrinsics)?;
    let k = Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0);
    let k_inv = k.try_inverse().ok_or(EstimationError::DegenerateIntrinsics)?;
    debug!("pinhole start: fx {fx:.2} fy {fy:.2} cx {cx:.2} cy {cy:.2}");

    let poses = homographies
        .iter()
        .enumerate()
        .map(|(view, h)| {
            pose_from_normalized_homography(&(k_inv * h.h))
                .ok_or(EstimationError::DegenerateView { view })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let model = CameraModel::new(k, Distortion::zero_pinhole());
    let mask = flags.distortion_mask();
    let anchor_list = anchors.map(|a| a.to_vec()).unwrap_or_default();
    let layout = Layout::new(
        false,
        flags.fix_aspect_ratio,
        prepared.images.len(),
        anchors.map_or(0, |_| prepared.objects[0].len()),
        &LayoutMasks {
            fix_principal_point: flags.fix_principal_point,
            distortion: &mask,
            anchors: &anchor_list,
        },
    );
    run_bundle(&prepared, layout, &model, &poses, opts)
}

/// Kannala-Brandt wide-angle calibration. Skew is always held at zero.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(views = obs.image_points.len()))
)]
pub fn calibrate_wide_angle(
    obs: &Observations<'_>,
    flags: &WideAngleFlags,
    opts: &SolveOptions,
) -> Result<Estimate, EstimationError> {
    let prepared = prepare(obs)?;
    let model = wide_angle_initial_model(obs.image_size);

    let mut poses = Vec::with_capacity(prepared.images.len());
    for (view, (obj, img)) in prepared.objects.iter().zip(&prepared.images).enumerate() {
        // Points beyond the initial model's field of view carry no pose information.
        let (board, normalized): (Vec<Point3<f64>>, Vec<Point2<f64>>) = obj
            .iter()
            .zip(img)
            .filter_map(|(o, p)| model.undistort_pixel(*p).map(|n| (*o, n)))
            .unzip();
        if normalized.len() < MIN_POINTS {
            return Err(EstimationError::TooFewPoints { view });
        }
        let h = board_homography(&board, &normalized)
            .ok_or(EstimationError::DegenerateView { view })?;
        poses.push(
            pose_from_normalized_homography(&h.h).ok_or(EstimationError::DegenerateView { view })?,
        );
    }

    let mask = flags.distortion_mask();
    let layout = Layout::new(
        true,
        None,
        prepared.images.len(),
        0,
        &LayoutMasks {
            fix_principal_point: flags.fix_principal_point,
            distortion: &mask,
            anchors: &[],
        },
    );
    run_bundle(&prepared, layout, &model, &poses, opts)
}
