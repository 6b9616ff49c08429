//! Iterative gradient-based corner refinement.
//!
//! At the true corner `q` every image gradient `g_p` in the window is
//! orthogonal to `p - q`, so `q` solves `sum(g g^T) q = sum(g g^T) p`. The
//! system is re-centred on the new estimate until the shift drops below the
//! tolerance or the iteration budget runs out.

use nalgebra::Point2;

use crate::error::DetectError;
use crate::params::SubPixParams;
use crate::CornerRefiner;
use lenscal_core::{sample_bilinear, GrayImageView};

#[derive(Clone, Debug, Default)]
pub struct SubPixRefiner {
    pub params: SubPixParams,
}

impl SubPixRefiner {
    pub fn new(params: SubPixParams) -> Self {
        Self { params }
    }

    /// Window weights `exp(-x^2) * exp(-y^2)` with `x, y` scaled to `[-1, 1]`.
    fn mask(&self) -> Vec<f32> {
        let win = self.params.half_window.max(1) as i32;
        let side = (2 * win + 1) as usize;
        let mut mask = Vec::with_capacity(side * side);
        for i in -win..=win {
            let y = i as f32 / win as f32;
            for j in -win..=win {
                let x = j as f32 / win as f32;
                mask.push((-x * x).exp() * (-y * y).exp());
            }
        }
        mask
    }

    fn refine_point(
        &self,
        img: &GrayImageView<'_>,
        start: Point2<f32>,
        mask: &[f32],
        index: usize,
    ) -> Result<Point2<f32>, DetectError> {
        let win = self.params.half_window.max(1) as i32;
        let eps2 = self.params.epsilon.max(0.0).powi(2);
        let (w, h) = (img.width as f32, img.height as f32);
        let inside = |p: Point2<f32>| p.x >= 0.0 && p.y >= 0.0 && p.x <= w - 1.0 && p.y <= h - 1.0;
        if !inside(start) {
            return Err(DetectError::RefinementLeftImage { index });
        }

        let mut current = start;
        for _ in 0..self.params.max_iters.max(1) {
            let (mut a, mut b, mut c, mut bb1, mut bb2) = (0.0f64, 0.0f64, 0.0f64, 0.0f64, 0.0f64);
            let mut k = 0;
            for i in -win..=win {
                for j in -win..=win {
                    let m = mask[k] as f64;
                    k += 1;
                    let px = current.x + j as f32;
                    let py = current.y + i as f32;
                    let gx = 0.5
                        * (sample_bilinear(img, px + 1.0, py) - sample_bilinear(img, px - 1.0, py))
                            as f64;
                    let gy = 0.5
                        * (sample_bilinear(img, px, py + 1.0) - sample_bilinear(img, px, py - 1.0))
                            as f64;
                    let gxx = gx * gx * m;
                    let gxy = gx * gy * m;
                    let gyy = gy * gy * m;
                    a += gxx;
                    b += gxy;
                    c += gyy;
                    bb1 += gxx * j as f64 + gxy * i as f64;
                    bb2 += gxy * j as f64 + gyy * i as f64;
                }
            }

            let det = a * c - b * b;
            if det.abs() <= f64::EPSILON {
                break;
            }
            let scale = 1.0 / det;
            let dx = (c * bb1 - b * bb2) * scale;
            let dy = (a * bb2 - b * bb1) * scale;
            let next = Point2::new(current.x + dx as f32, current.y + dy as f32);
            if !next.x.is_finite() || !next.y.is_finite() {
                return Err(DetectError::RefinementDiverged { index });
            }
            if !inside(next) {
                return Err(DetectError::RefinementLeftImage { index });
            }
            let shift2 = (dx * dx + dy * dy) as f32;
            current = next;
            if shift2 <= eps2 {
                break;
            }
        }

        // Drifting further than the window means the gradients belonged to
        // another structure; keep the detector's estimate.
        if (current.x - start.x).abs() > win as f32 || (current.y - start.y).abs() > win as f32 {
            current = start;
        }
        Ok(current)
    }
}

impl CornerRefiner for SubPixRefiner {
    fn refine(&self, img: &GrayImageView<'_>, points: &mut [Point2<f32>]) -> Result<(), DetectError> {
        let mask = self.mask();
        for (index, p) in points.iter_mut().enumerate() {
            *p = self.refine_point(img, *p, &mask, index)?;
        }
        Ok(())
    }
}
