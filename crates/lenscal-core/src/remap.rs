//! Undistortion lookup tables, cubic remapping and region-of-interest crops.

use nalgebra::{Matrix3, Point2, Vector3};

use crate::camera::CameraModel;
use crate::image::{ImageSize, PixelBuffer, PixelView};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Grid resolution used to probe the undistorted image boundary.
const RECT_PROBE_STEPS: usize = 9;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MapError {
    #[error("image size must be non-empty (got {0})")]
    EmptySize(ImageSize),
    #[error("camera matrix is singular")]
    SingularCameraMatrix,
    #[error("distortion model cannot be inverted at the image border")]
    DegenerateBorder,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CropError {
    #[error("crop {inner} does not fit inside {outer}")]
    DoesNotFit { outer: ImageSize, inner: ImageSize },
}

/// Axis-aligned crop rectangle in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Rectangle of size `inner` centered in `outer`; offsets are floored.
pub fn centered_crop(outer: ImageSize, inner: ImageSize) -> Result<CropRect, CropError> {
    if inner.width > outer.width || inner.height > outer.height {
        return Err(CropError::DoesNotFit { outer, inner });
    }
    Ok(CropRect {
        x: (outer.width - inner.width) >> 1,
        y: (outer.height - inner.height) >> 1,
        width: inner.width,
        height: inner.height,
    })
}

/// Copy the pixels inside `rect`; `rect` must lie inside `src`.
pub fn crop(src: &PixelView<'_>, rect: CropRect) -> Result<PixelBuffer, CropError> {
    if rect.x + rect.width > src.width || rect.y + rect.height > src.height {
        return Err(CropError::DoesNotFit {
            outer: src.size(),
            inner: ImageSize::new(rect.x + rect.width, rect.y + rect.height),
        });
    }
    let ch = src.channels;
    let mut out = PixelBuffer::new(rect.width, rect.height, ch);
    let row_len = rect.width * ch;
    for row in 0..rect.height {
        let src_start = ((rect.y + row) * src.width + rect.x) * ch;
        let dst_start = row * row_len;
        out.data[dst_start..dst_start + row_len]
            .copy_from_slice(&src.data[src_start..src_start + row_len]);
    }
    Ok(out)
}

/// Per-pixel source coordinates for every pixel of a target image.
#[derive(Clone, Debug)]
pub struct UndistortionMap {
    pub size: ImageSize,
    pub map_x: Vec<f32>,
    pub map_y: Vec<f32>,
    /// Intrinsics of the rectified output image.
    pub new_camera_matrix: Matrix3<f64>,
}

impl UndistortionMap {
    /// Build the map used by both the calibration preview and flattening.
    ///
    /// The output intrinsics keep every source pixel visible inside `target`
    /// (alpha 1 for the pinhole model, balance 1 for the wide-angle one).
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(source = %source, target = %target))
    )]
    pub fn build(
        model: &CameraModel,
        source: ImageSize,
        target: ImageSize,
    ) -> Result<Self, MapError> {
        let new_k = if model.is_wide_angle() {
            wide_angle_new_camera_matrix(model, source, 1.0, target)?
        } else {
            optimal_new_camera_matrix(model, source, 1.0, target)?
        };
        Self::with_camera_matrix(model, &new_k, target)
    }

    /// Map that renders the undistorted image with output intrinsics `new_k`.
    pub fn with_camera_matrix(
        model: &CameraModel,
        new_k: &Matrix3<f64>,
        target: ImageSize,
    ) -> Result<Self, MapError> {
        if target.is_empty() {
            return Err(MapError::EmptySize(target));
        }
        let inv = new_k.try_inverse().ok_or(MapError::SingularCameraMatrix)?;

        let mut map_x = Vec::with_capacity(target.area());
        let mut map_y = Vec::with_capacity(target.area());
        for v in 0..target.height {
            for u in 0..target.width {
                let ray = inv * Vector3::new(u as f64, v as f64, 1.0);
                let (sx, sy) = if ray.z > 0.0 {
                    let px = model.project_camera_point(&ray);
                    (px.x as f32, px.y as f32)
                } else {
                    (-1.0, -1.0)
                };
                map_x.push(sx);
                map_y.push(sy);
            }
        }

        Ok(Self {
            size: target,
            map_x,
            map_y,
            new_camera_matrix: *new_k,
        })
    }

    /// Resample `src` through the map with bicubic interpolation.
    ///
    /// Samples falling outside `src` read as zero.
    pub fn remap(&self, src: &PixelView<'_>) -> PixelBuffer {
        let ch = src.channels;
        let mut out = PixelBuffer::new(self.size.width, self.size.height, ch);
        let mut acc = vec![0.0f32; ch];

        for (idx, (&sx, &sy)) in self.map_x.iter().zip(&self.map_y).enumerate() {
            if !sample_cubic(src, sx, sy, &mut acc) {
                continue;
            }
            let dst = &mut out.data[idx * ch..(idx + 1) * ch];
            for (d, a) in dst.iter_mut().zip(&acc) {
                *d = a.round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }
}

const CUBIC_A: f32 = -0.75;

#[inline]
fn cubic_weights(t: f32) -> [f32; 4] {
    let a = CUBIC_A;
    let w0 = ((a * (t + 1.0) - 5.0 * a) * (t + 1.0) + 8.0 * a) * (t + 1.0) - 4.0 * a;
    let w1 = ((a + 2.0) * t - (a + 3.0)) * t * t + 1.0;
    let w2 = ((a + 2.0) * (1.0 - t) - (a + 3.0)) * (1.0 - t) * (1.0 - t) + 1.0;
    [w0, w1, w2, 1.0 - w0 - w1 - w2]
}

/// Accumulate the 4x4 cubic neighbourhood; false when no tap is inside.
#[inline]
fn sample_cubic(src: &PixelView<'_>, x: f32, y: f32, acc: &mut [f32]) -> bool {
    if !x.is_finite() || !y.is_finite() {
        return false;
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let ix = x0 as i64;
    let iy = y0 as i64;
    let (w, h) = (src.width as i64, src.height as i64);
    if ix + 2 < 0 || iy + 2 < 0 || ix - 1 >= w || iy - 1 >= h {
        return false;
    }

    let wx = cubic_weights(x - x0);
    let wy = cubic_weights(y - y0);
    acc.iter_mut().for_each(|a| *a = 0.0);
    let ch = src.channels;

    for (ky, wyk) in wy.iter().enumerate() {
        let yy = iy - 1 + ky as i64;
        if yy < 0 || yy >= h {
            continue;
        }
        for (kx, wxk) in wx.iter().enumerate() {
            let xx = ix - 1 + kx as i64;
            if xx < 0 || xx >= w {
                continue;
            }
            let weight = wyk * wxk;
            let base = (yy as usize * src.width + xx as usize) * ch;
            for (c, a) in acc.iter_mut().enumerate() {
                *a += weight * src.data[base + c] as f32;
            }
        }
    }
    true
}

fn probe_points(size: ImageSize) -> Vec<Point2<f64>> {
    let n = RECT_PROBE_STEPS;
    let mut out = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            out.push(Point2::new(
                j as f64 * (size.width as f64 - 1.0) / (n - 1) as f64,
                i as f64 * (size.height as f64 - 1.0) / (n - 1) as f64,
            ));
        }
    }
    out
}

/// Normalized-coordinate rectangle `(x, y, width, height)`.
#[derive(Clone, Copy, Debug, PartialEq)]
struct NormRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Inscribed and circumscribed rectangles of the undistorted image.
fn undistorted_rectangles(
    model: &CameraModel,
    size: ImageSize,
) -> Result<(NormRect, NormRect), MapError> {
    let n = RECT_PROBE_STEPS;
    let undistorted = probe_points(size)
        .into_iter()
        .map(|p| model.undistort_pixel(p))
        .collect::<Option<Vec<_>>>()
        .ok_or(MapError::DegenerateBorder)?;

    let (mut x_min, mut y_min) = (f64::MAX, f64::MAX);
    let (mut x_max, mut y_max) = (f64::MIN, f64::MIN);
    let (mut ix0, mut iy0) = (f64::MIN, f64::MIN);
    let (mut ix1, mut iy1) = (f64::MAX, f64::MAX);

    for i in 0..n {
        for j in 0..n {
            let p = undistorted[i * n + j];
            x_min = x_min.min(p.x);
            x_max = x_max.max(p.x);
            y_min = y_min.min(p.y);
            y_max = y_max.max(p.y);
            if j == 0 {
                ix0 = ix0.max(p.x);
            }
            if j == n - 1 {
                ix1 = ix1.min(p.x);
            }
            if i == 0 {
                iy0 = iy0.max(p.y);
            }
            if i == n - 1 {
                iy1 = iy1.min(p.y);
            }
        }
    }

    let inner = NormRect {
        x: ix0,
        y: iy0,
        width: ix1 - ix0,
        height: iy1 - iy0,
    };
    let outer = NormRect {
        x: x_min,
        y: y_min,
        width: x_max - x_min,
        height: y_max - y_min,
    };
    Ok((inner, outer))
}

/// Output intrinsics for a pinhole model.
///
/// `alpha = 0` keeps only valid pixels (inscribed rectangle), `alpha = 1`
/// keeps every source pixel (circumscribed rectangle); values in between
/// interpolate. The principal point is not forced to the center.
pub fn optimal_new_camera_matrix(
    model: &CameraModel,
    image_size: ImageSize,
    alpha: f64,
    new_size: ImageSize,
) -> Result<Matrix3<f64>, MapError> {
    if image_size.is_empty() {
        return Err(MapError::EmptySize(image_size));
    }
    if new_size.is_empty() {
        return Err(MapError::EmptySize(new_size));
    }
    let (inner, outer) = undistorted_rectangles(model, image_size)?;
    let w = new_size.width as f64 - 1.0;
    let h = new_size.height as f64 - 1.0;

    let fx0 = w / inner.width;
    let fy0 = h / inner.height;
    let cx0 = -fx0 * inner.x;
    let cy0 = -fy0 * inner.y;

    let fx1 = w / outer.width;
    let fy1 = h / outer.height;
    let cx1 = -fx1 * outer.x;
    let cy1 = -fy1 * outer.y;

    let lerp = |a: f64, b: f64| a * (1.0 - alpha) + b * alpha;
    let k = Matrix3::new(
        lerp(fx0, fx1),
        0.0,
        lerp(cx0, cx1),
        0.0,
        lerp(fy0, fy1),
        lerp(cy0, cy1),
        0.0,
        0.0,
        1.0,
    );
    if k.iter().all(|v| v.is_finite()) {
        Ok(k)
    } else {
        Err(MapError::DegenerateBorder)
    }
}

/// Output intrinsics for a wide-angle model.
///
/// `balance` blends between the minimal (1.0) and maximal (0.0) focal
/// length that keeps the image edges' midpoints inside the output.
pub fn wide_angle_new_camera_matrix(
    model: &CameraModel,
    image_size: ImageSize,
    balance: f64,
    new_size: ImageSize,
) -> Result<Matrix3<f64>, MapError> {
    if image_size.is_empty() {
        return Err(MapError::EmptySize(image_size));
    }
    if new_size.is_empty() {
        return Err(MapError::EmptySize(new_size));
    }
    let balance = balance.clamp(0.0, 1.0);
    let w = image_size.width as f64;
    let h = image_size.height as f64;

    let edges = [
        Point2::new(w / 2.0, 0.0),
        Point2::new(w, h / 2.0),
        Point2::new(w / 2.0, h),
        Point2::new(0.0, h / 2.0),
    ];
    let aspect = model.fx() / model.fy();
    let mut pts = edges
        .iter()
        .map(|p| model.undistort_pixel(*p))
        .collect::<Option<Vec<_>>>()
        .ok_or(MapError::DegenerateBorder)?;
    for p in pts.iter_mut() {
        p.y *= aspect;
    }
    let cn_x = pts.iter().map(|p| p.x).sum::<f64>() / pts.len() as f64;
    let cn_y = pts.iter().map(|p| p.y).sum::<f64>() / pts.len() as f64;

    let min_x = pts.iter().map(|p| p.x).fold(f64::MAX, f64::min);
    let max_x = pts.iter().map(|p| p.x).fold(f64::MIN, f64::max);
    let min_y = pts.iter().map(|p| p.y).fold(f64::MAX, f64::min);
    let max_y = pts.iter().map(|p| p.y).fold(f64::MIN, f64::max);

    let f1 = w * 0.5 / (cn_x - min_x);
    let f2 = w * 0.5 / (max_x - cn_x);
    let f3 = h * 0.5 * aspect / (cn_y - min_y);
    let f4 = h * 0.5 * aspect / (max_y - cn_y);
    let fmin = f1.min(f2).min(f3).min(f4);
    let fmax = f1.max(f2).max(f3).max(f4);
    let f = balance * fmin + (1.0 - balance) * fmax;

    let rx = new_size.width as f64 / w;
    let ry = new_size.height as f64 / h;
    let fx = f * rx;
    let fy = f / aspect * ry;
    let cx = (-cn_x * f + w * 0.5) * rx;
    let cy = (-cn_y * f + h * aspect * 0.5) / aspect * ry;

    let k = Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0);
    if k.iter().all(|v| v.is_finite()) {
        Ok(k)
    } else {
        Err(MapError::DegenerateBorder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortion::Distortion;
    use approx::assert_relative_eq;

    fn model(distortion: Distortion) -> CameraModel {
        CameraModel::new(
            Matrix3::new(500.0, 0.0, 319.5, 0.0, 500.0, 239.5, 0.0, 0.0, 1.0),
            distortion,
        )
    }

    #[test]
    fn crop_offset_is_floored_half_difference() {
        let rect = centered_crop(ImageSize::new(640, 480), ImageSize::new(600, 440)).expect("fits");
        assert_eq!((rect.x, rect.y), (20, 20));
        let rect = centered_crop(ImageSize::new(641, 480), ImageSize::new(600, 437)).expect("fits");
        assert_eq!((rect.x, rect.y), (20, 21));
        assert!(centered_crop(ImageSize::new(640, 480), ImageSize::new(641, 480)).is_err());
    }

    #[test]
    fn crop_copies_window() {
        let mut buf = PixelBuffer::new(4, 3, 1);
        for (i, v) in buf.data.iter_mut().enumerate() {
            *v = i as u8;
        }
        let rect = CropRect {
            x: 1,
            y: 1,
            width: 2,
            height: 2,
        };
        let out = crop(&buf.view(), rect).expect("inside");
        assert_eq!(out.data, vec![5, 6, 9, 10]);
    }

    #[test]
    fn zero_distortion_same_size_map_is_identity() {
        let cam = model(Distortion::zero_pinhole());
        let size = ImageSize::new(640, 480);
        let new_k = optimal_new_camera_matrix(&cam, size, 1.0, size).expect("matrix");
        assert_relative_eq!(new_k, cam.camera_matrix, epsilon = 1e-6);

        let map = UndistortionMap::build(&cam, size, size).expect("map");
        let idx = 100 * size.width + 200;
        assert_relative_eq!(map.map_x[idx], 200.0, epsilon = 1e-3);
        assert_relative_eq!(map.map_y[idx], 100.0, epsilon = 1e-3);
    }

    #[test]
    fn identity_map_reproduces_image() {
        let cam = model(Distortion::zero_pinhole());
        let size = ImageSize::new(32, 24);
        let map = UndistortionMap::with_camera_matrix(&cam, &cam.camera_matrix, size).expect("map");
        let mut src = PixelBuffer::new(32, 24, 3);
        for (i, v) in src.data.iter_mut().enumerate() {
            *v = (i * 7 % 251) as u8;
        }
        let out = map.remap(&src.view());
        assert_eq!(out.data, src.data);
    }

    #[test]
    fn barrel_distortion_alpha_one_shrinks_focal_length() {
        let cam = model(Distortion::Pinhole([-0.3, 0.05, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
        let size = ImageSize::new(640, 480);
        let k = optimal_new_camera_matrix(&cam, size, 1.0, size).expect("matrix");
        assert!(k[(0, 0)] < 500.0);
        assert!(k[(1, 1)] < 500.0);

        let bigger = ImageSize::new(800, 600);
        let kb = optimal_new_camera_matrix(&cam, size, 1.0, bigger).expect("matrix");
        assert!(kb[(0, 0)] > k[(0, 0)]);
    }

    #[test]
    fn strong_barrel_model_still_builds_a_map() {
        let cam = model(Distortion::Pinhole([-0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
        let source = ImageSize::new(640, 480);
        let target = ImageSize::new(800, 600);
        let map = UndistortionMap::build(&cam, source, target).expect("map");
        assert_eq!(map.size, target);
        assert_eq!(map.map_x.len(), target.area());
        let k = map.new_camera_matrix;
        assert!(k.iter().all(|v| v.is_finite()));
        assert!(k[(0, 0)] > 0.0 && k[(1, 1)] > 0.0);

        // The output principal point still sees the source centre region.
        let u = k[(0, 2)].round() as usize;
        let v = k[(1, 2)].round() as usize;
        let idx = v * target.width + u;
        assert!((map.map_x[idx] - 319.5).abs() < 2.0);
        assert!((map.map_y[idx] - 239.5).abs() < 2.0);
    }

    #[test]
    fn wide_angle_matrix_scales_with_target() {
        let cam = model(Distortion::WideAngle([0.02, -0.01, 0.0, 0.0]));
        let size = ImageSize::new(640, 480);
        let k = wide_angle_new_camera_matrix(&cam, size, 1.0, size).expect("matrix");
        let k2 = wide_angle_new_camera_matrix(&cam, size, 1.0, ImageSize::new(1280, 960))
            .expect("matrix");
        assert_relative_eq!(k2[(0, 0)], 2.0 * k[(0, 0)], epsilon = 1e-9);
        assert_relative_eq!(k2[(1, 2)], 2.0 * k[(1, 2)], epsilon = 1e-9);
    }

    #[test]
    fn cubic_weights_partition_unity() {
        for t in [0.0f32, 0.25, 0.5, 0.9] {
            let w = cubic_weights(t);
            assert_relative_eq!(w.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        }
        assert_eq!(cubic_weights(0.0), [0.0, 1.0, 0.0, 0.0]);
    }
}
