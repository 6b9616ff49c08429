//! Joint reprojection problem over intrinsics, distortion, view poses and,
//! optionally, the target layout itself.

use lenscal_core::{CameraModel, Distortion, PINHOLE_COEFFS, WIDE_ANGLE_COEFFS};
use nalgebra::{
    DMatrix, DVector, Isometry3, Matrix3, Point2, Point3, Translation3, UnitQuaternion, Vector3,
};

use crate::lm::{fd_step, NllsProblem};

/// `fx, fy, cx, cy` lead the full parameter vector.
const INTRINSICS: usize = 4;
const POSE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Global,
    Pose(usize),
    Object(usize),
}

/// Full-vector layout:
/// `[fx, fy, cx, cy, dist.., (rvec, tvec) per view, (x, y, z) per released point]`.
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    pub wide_angle: bool,
    pub aspect_ratio: Option<f64>,
    pub n_views: usize,
    /// Released template size, zero when the target is rigid.
    pub n_object: usize,
    free: Vec<usize>,
}

pub(crate) struct LayoutMasks<'m> {
    pub fix_principal_point: bool,
    pub distortion: &'m [bool],
    /// Template points that stay put when the target is released.
    pub anchors: &'m [usize],
}

impl Layout {
    pub fn new(
        wide_angle: bool,
        aspect_ratio: Option<f64>,
        n_views: usize,
        n_object: usize,
        masks: &LayoutMasks<'_>,
    ) -> Self {
        let mut layout = Self {
            wide_angle,
            aspect_ratio,
            n_views,
            n_object,
            free: Vec::new(),
        };
        let mut free = Vec::with_capacity(layout.full_len());
        if aspect_ratio.is_none() {
            free.push(0);
        }
        free.push(1);
        if !masks.fix_principal_point {
            free.extend([2, 3]);
        }
        free.extend(
            masks
                .distortion
                .iter()
                .enumerate()
                .filter(|(_, fixed)| !**fixed)
                .map(|(i, _)| INTRINSICS + i),
        );
        free.extend(layout.pose_offset(0)..layout.object_offset(0));
        for k in (0..n_object).filter(|k| !masks.anchors.contains(k)) {
            let o = layout.object_offset(k);
            free.extend(o..o + 3);
        }
        layout.free = free;
        layout
    }

    pub fn n_dist(&self) -> usize {
        if self.wide_angle {
            WIDE_ANGLE_COEFFS
        } else {
            PINHOLE_COEFFS
        }
    }

    pub fn pose_offset(&self, view: usize) -> usize {
        INTRINSICS + self.n_dist() + POSE * view
    }

    pub fn object_offset(&self, point: usize) -> usize {
        self.pose_offset(self.n_views) + 3 * point
    }

    pub fn full_len(&self) -> usize {
        self.object_offset(self.n_object)
    }

    pub fn num_free(&self) -> usize {
        self.free.len()
    }

    fn slot(&self, full_index: usize) -> Slot {
        let poses = self.pose_offset(0);
        let objects = self.object_offset(0);
        if full_index < poses {
            Slot::Global
        } else if full_index < objects {
            Slot::Pose((full_index - poses) / POSE)
        } else {
            Slot::Object((full_index - objects) / 3)
        }
    }
}

pub(crate) struct BundleProblem<'a> {
    layout: Layout,
    /// Full vector holding the values of fixed parameters.
    base: DVector<f64>,
    objects: &'a [Vec<Point3<f64>>],
    images: &'a [Vec<Point2<f64>>],
    /// First point index of every view in the stacked residual.
    offsets: Vec<usize>,
    total_points: usize,
}

impl<'a> BundleProblem<'a> {
    pub fn new(
        layout: Layout,
        base: DVector<f64>,
        objects: &'a [Vec<Point3<f64>>],
        images: &'a [Vec<Point2<f64>>],
    ) -> Self {
        let mut offsets = Vec::with_capacity(images.len());
        let mut total_points = 0;
        for view in images {
            offsets.push(total_points);
            total_points += view.len();
        }
        Self {
            layout,
            base,
            objects,
            images,
            offsets,
            total_points,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn total_points(&self) -> usize {
        self.total_points
    }

    /// Free-parameter vector taken from the full base vector.
    pub fn initial_free(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.layout.free.len(),
            self.layout.free.iter().map(|&f| self.base[f]),
        )
    }

    pub fn expand(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut full = self.base.clone();
        for (&f, v) in self.layout.free.iter().zip(x.iter()) {
            full[f] = *v;
        }
        if let Some(ratio) = self.layout.aspect_ratio {
            full[0] = ratio * full[1];
        }
        full
    }

    pub fn model(&self, full: &DVector<f64>) -> CameraModel {
        let k = Matrix3::new(
            full[0], 0.0, full[2], //
            0.0, full[1], full[3], //
            0.0, 0.0, 1.0,
        );
        let d = INTRINSICS;
        let distortion = if self.layout.wide_angle {
            Distortion::WideAngle([full[d], full[d + 1], full[d + 2], full[d + 3]])
        } else {
            let mut c = [0.0; PINHOLE_COEFFS];
            c.copy_from_slice(&full.as_slice()[d..d + PINHOLE_COEFFS]);
            Distortion::Pinhole(c)
        };
        CameraModel::new(k, distortion)
    }

    pub fn pose(&self, full: &DVector<f64>, view: usize) -> Isometry3<f64> {
        let o = self.layout.pose_offset(view);
        let rvec = Vector3::new(full[o], full[o + 1], full[o + 2]);
        let tvec = Vector3::new(full[o + 3], full[o + 4], full[o + 5]);
        Isometry3::from_parts(
            Translation3::from(tvec),
            UnitQuaternion::from_scaled_axis(rvec),
        )
    }

    pub fn object_point(&self, full: &DVector<f64>, view: usize, point: usize) -> Point3<f64> {
        if self.layout.n_object > 0 {
            let o = self.layout.object_offset(point);
            Point3::new(full[o], full[o + 1], full[o + 2])
        } else {
            self.objects[view][point]
        }
    }

    #[inline]
    fn point_residual(
        &self,
        full: &DVector<f64>,
        model: &CameraModel,
        iso: &Isometry3<f64>,
        view: usize,
        point: usize,
    ) -> (f64, f64) {
        let pc = iso * self.object_point(full, view, point);
        let px = model.project_camera_point(&pc.coords);
        let obs = self.images[view][point];
        (px.x - obs.x, px.y - obs.y)
    }

    fn write_view(
        &self,
        full: &DVector<f64>,
        model: &CameraModel,
        view: usize,
        out: &mut DVector<f64>,
    ) {
        let iso = self.pose(full, view);
        let row = 2 * self.offsets[view];
        for point in 0..self.images[view].len() {
            let (dx, dy) = self.point_residual(full, model, &iso, view, point);
            out[row + 2 * point] = dx;
            out[row + 2 * point + 1] = dy;
        }
    }

    fn residuals_full(&self, full: &DVector<f64>) -> DVector<f64> {
        let model = self.model(full);
        let mut out = DVector::zeros(2 * self.total_points);
        for view in 0..self.images.len() {
            self.write_view(full, &model, view, &mut out);
        }
        out
    }
}

impl NllsProblem for BundleProblem<'_> {
    fn num_params(&self) -> usize {
        self.layout.num_free()
    }

    fn num_residuals(&self) -> usize {
        2 * self.total_points
    }

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        self.residuals_full(&self.expand(x))
    }

    /// Forward differences that only re-evaluate the residual rows a
    /// parameter touches.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let full = self.expand(x);
        let model = self.model(&full);
        let r0 = self.residuals_full(&full);
        let mut j = DMatrix::zeros(r0.len(), x.len());
        let mut xp = x.clone();

        for (c, &f) in self.layout.free.iter().enumerate() {
            let h = fd_step(x[c]);
            xp[c] = x[c] + h;
            let fp = self.expand(&xp);
            match self.layout.slot(f) {
                Slot::Global => {
                    let r = self.residuals_full(&fp);
                    j.set_column(c, &((r - &r0) / h));
                }
                Slot::Pose(view) => {
                    let iso = self.pose(&fp, view);
                    let row = 2 * self.offsets[view];
                    for point in 0..self.images[view].len() {
                        let (dx, dy) = self.point_residual(&fp, &model, &iso, view, point);
                        let i = row + 2 * point;
                        j[(i, c)] = (dx - r0[i]) / h;
                        j[(i + 1, c)] = (dy - r0[i + 1]) / h;
                    }
                }
                Slot::Object(point) => {
                    for view in 0..self.images.len() {
                        let iso = self.pose(&fp, view);
                        let (dx, dy) = self.point_residual(&fp, &model, &iso, view, point);
                        let i = 2 * (self.offsets[view] + point);
                        j[(i, c)] = (dx - r0[i]) / h;
                        j[(i + 1, c)] = (dy - r0[i + 1]) / h;
                    }
                }
            }
            xp[c] = x[c];
        }
        j
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn layout_respects_masks() {
        let masks = LayoutMasks {
            fix_principal_point: true,
            distortion: &[false, false, true, true, false, true, true, true],
            anchors: &[],
        };
        let layout = Layout::new(false, Some(1.0), 2, 0, &masks);
        // fy, k1, k2, k3 and two poses.
        assert_eq!(layout.num_free(), 1 + 3 + 12);
        assert_eq!(layout.full_len(), 4 + 8 + 12);
        assert_eq!(layout.slot(11), Slot::Global);
        assert_eq!(layout.slot(12), Slot::Pose(0));
        assert_eq!(layout.slot(23), Slot::Pose(1));
    }

    #[test]
    fn anchors_are_excluded_from_released_points() {
        let masks = LayoutMasks {
            fix_principal_point: false,
            distortion: &[false; 4],
            anchors: &[0, 2, 5],
        };
        let layout = Layout::new(true, None, 1, 6, &masks);
        assert_eq!(layout.num_free(), 4 + 4 + 6 + 3 * 3);
        assert_eq!(layout.slot(layout.object_offset(4) + 2), Slot::Object(4));
    }

    #[test]
    fn row_sparse_jacobian_matches_dense_differences() {
        let objects = vec![vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(0.0, 0.1, 0.0),
            Point3::new(0.1, 0.1, 0.0),
        ]];
        let images = vec![vec![
            Point2::new(300.0, 220.0),
            Point2::new(380.0, 225.0),
            Point2::new(305.0, 300.0),
            Point2::new(385.0, 302.0),
        ]];
        let masks = LayoutMasks {
            fix_principal_point: false,
            distortion: &[false, false, false, false, false, true, true, true],
            anchors: &[0, 1, 3],
        };
        let layout = Layout::new(false, None, 1, 4, &masks);
        let mut base = DVector::zeros(layout.full_len());
        base[0] = 800.0;
        base[1] = 800.0;
        base[2] = 320.0;
        base[3] = 240.0;
        let p = layout.pose_offset(0);
        base[p] = 0.05;
        base[p + 1] = -0.02;
        base[p + 5] = 1.0;
        for (k, pt) in objects[0].iter().enumerate() {
            let o = layout.object_offset(k);
            base[o] = pt.x;
            base[o + 1] = pt.y;
        }

        let problem = BundleProblem::new(layout, base, &objects, &images);
        let x = problem.initial_free();

        struct Dense<'p, 'a>(&'p BundleProblem<'a>);
        impl NllsProblem for Dense<'_, '_> {
            fn num_params(&self) -> usize {
                self.0.num_params()
            }
            fn num_residuals(&self) -> usize {
                self.0.num_residuals()
            }
            fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
                self.0.residuals(x)
            }
        }

        let sparse = problem.jacobian(&x);
        let dense = Dense(&problem).jacobian(&x);
        assert_relative_eq!(sparse, dense, epsilon = 1e-9);
    }
}
