//! ChESS corner response and candidate extraction.
//!
//! The response at a pixel is computed from 16 samples on a ring of radius 5:
//! `R = SR - DR - 16 * |ring_mean - local_mean|`, where `SR` rewards opposite
//! quadrants agreeing while the orthogonal pair disagrees and `DR` penalises
//! opposite samples that differ (edges). Positive responses mark X-junctions.

use lenscal_core::{GrayImage, GrayImageView};
use nalgebra::Point2;

/// Integer offsets of the radius-5 sampling ring, clockwise from "up".
const RING: [(i32, i32); 16] = [
    (0, -5),
    (2, -5),
    (3, -3),
    (5, -2),
    (5, 0),
    (5, 2),
    (3, 3),
    (2, 5),
    (0, 5),
    (-2, 5),
    (-3, 3),
    (-5, 2),
    (-5, 0),
    (-5, -2),
    (-3, -3),
    (-2, -5),
];

const RING_MARGIN: usize = 5;

/// Detected X-junction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corner {
    pub position: Point2<f32>,
    /// Direction of the bright-square diagonal, modulo π.
    pub orientation: f32,
    pub strength: f32,
}

/// Dense response image; border pixels the ring cannot reach are zero.
#[derive(Clone, Debug)]
pub struct ResponseMap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl ResponseMap {
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }
}

#[inline]
fn ring_samples(img: &GrayImageView<'_>, x: usize, y: usize) -> [f32; 16] {
    let mut out = [0.0f32; 16];
    for (s, (dx, dy)) in out.iter_mut().zip(RING) {
        let sx = (x as i32 + dx) as usize;
        let sy = (y as i32 + dy) as usize;
        *s = img.data[sy * img.width + sx] as f32;
    }
    out
}

pub fn chess_response(img: &GrayImageView<'_>) -> ResponseMap {
    let (w, h) = (img.width, img.height);
    let mut data = vec![0.0f32; w * h];
    if w <= 2 * RING_MARGIN || h <= 2 * RING_MARGIN {
        return ResponseMap {
            width: w,
            height: h,
            data,
        };
    }

    for y in RING_MARGIN..h - RING_MARGIN {
        for x in RING_MARGIN..w - RING_MARGIN {
            let s = ring_samples(img, x, y);
            let mut sum_response = 0.0f32;
            for n in 0..4 {
                sum_response += ((s[n] + s[n + 8]) - (s[n + 4] + s[n + 12])).abs();
            }
            let mut diff_response = 0.0f32;
            for n in 0..8 {
                diff_response += (s[n] - s[n + 8]).abs();
            }
            let ring_mean = s.iter().sum::<f32>() / 16.0;
            let at = |xx: usize, yy: usize| img.data[yy * w + xx] as f32;
            let local_mean =
                (at(x, y) + at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1)) / 5.0;
            data[y * w + x] =
                sum_response - diff_response - 16.0 * (ring_mean - local_mean).abs();
        }
    }

    ResponseMap {
        width: w,
        height: h,
        data,
    }
}

/// Orientation of the bright diagonal from the ring samples, modulo π.
fn ring_orientation(img: &GrayImageView<'_>, x: usize, y: usize) -> f32 {
    let s = ring_samples(img, x, y);
    let mean = s.iter().sum::<f32>() / 16.0;
    let (mut c2, mut s2) = (0.0f32, 0.0f32);
    for (v, (dx, dy)) in s.iter().zip(RING) {
        let phi = (dy as f32).atan2(dx as f32);
        c2 += (v - mean) * (2.0 * phi).cos();
        s2 += (v - mean) * (2.0 * phi).sin();
    }
    (0.5 * s2.atan2(c2)).rem_euclid(std::f32::consts::PI)
}

/// Local maxima above `relative_threshold * max_response`.
///
/// Ties inside the suppression window are broken in scan order so a flat
/// plateau yields a single candidate. Positions are refined with the
/// response-weighted centroid of the 3x3 neighbourhood.
pub fn find_corners(
    img: &GrayImageView<'_>,
    relative_threshold: f32,
    nms_radius: usize,
) -> Vec<Corner> {
    let resp = chess_response(img);
    let max_r = resp.data.iter().copied().fold(0.0f32, f32::max);
    if max_r <= 0.0 {
        return Vec::new();
    }
    let threshold = max_r * relative_threshold.max(0.0);
    let (w, h) = (resp.width, resp.height);
    let r = nms_radius.max(1);
    let mut corners = Vec::new();

    for y in RING_MARGIN..h.saturating_sub(RING_MARGIN) {
        for x in RING_MARGIN..w.saturating_sub(RING_MARGIN) {
            let v = resp.at(x, y);
            if v <= threshold {
                continue;
            }
            if !is_scan_order_max(&resp, x, y, r) {
                continue;
            }

            let (mut sx, mut sy, mut sw) = (0.0f32, 0.0f32, 0.0f32);
            for yy in y - 1..=y + 1 {
                for xx in x - 1..=x + 1 {
                    let rv = resp.at(xx, yy);
                    if rv > 0.0 {
                        sx += rv * xx as f32;
                        sy += rv * yy as f32;
                        sw += rv;
                    }
                }
            }
            corners.push(Corner {
                position: Point2::new(sx / sw, sy / sw),
                orientation: ring_orientation(img, x, y),
                strength: v,
            });
        }
    }
    corners
}

fn is_scan_order_max(resp: &ResponseMap, x: usize, y: usize, r: usize) -> bool {
    let v = resp.at(x, y);
    let y0 = y.saturating_sub(r);
    let y1 = (y + r).min(resp.height - 1);
    let x0 = x.saturating_sub(r);
    let x1 = (x + r).min(resp.width - 1);
    for yy in y0..=y1 {
        for xx in x0..=x1 {
            if xx == x && yy == y {
                continue;
            }
            let o = resp.at(xx, yy);
            let earlier = (yy, xx) < (y, x);
            if o > v || (earlier && o == v) {
                return false;
            }
        }
    }
    true
}

/// Half-resolution copy using 2x2 box averaging.
pub fn downsample(img: &GrayImageView<'_>) -> GrayImage {
    let w = img.width / 2;
    let h = img.height / 2;
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let at = |xx: usize, yy: usize| img.data[yy * img.width + xx] as u32;
            let sum = at(2 * x, 2 * y)
                + at(2 * x + 1, 2 * y)
                + at(2 * x, 2 * y + 1)
                + at(2 * x + 1, 2 * y + 1);
            out.data[y * w + x] = ((sum + 2) / 4) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;

    /// Four quadrants meeting between pixels 19 and 20.
    fn x_junction(bright_main_diagonal: bool) -> GrayImage {
        let mut img = GrayImage::new(40, 40);
        for y in 0..40 {
            for x in 0..40 {
                let quadrant = (x >= 20) ^ (y >= 20);
                let bright = quadrant != bright_main_diagonal;
                img.data[y * 40 + x] = if bright { 255 } else { 0 };
            }
        }
        img
    }

    #[test]
    fn x_junction_gives_single_centered_corner() {
        let img = x_junction(true);
        let corners = find_corners(&img.view(), 0.2, 3);
        assert_eq!(corners.len(), 1, "{corners:?}");
        let c = corners[0];
        assert!((c.position.x - 19.5).abs() <= 1.0, "{c:?}");
        assert!((c.position.y - 19.5).abs() <= 1.0, "{c:?}");
    }

    #[test]
    fn orientation_follows_bright_diagonal() {
        let a = find_corners(&x_junction(true).view(), 0.2, 3);
        let b = find_corners(&x_junction(false).view(), 0.2, 3);
        assert!((a[0].orientation - FRAC_PI_4).abs() < 0.2, "{:?}", a[0]);
        assert!((b[0].orientation - 3.0 * FRAC_PI_4).abs() < 0.2, "{:?}", b[0]);
    }

    #[test]
    fn straight_edge_has_no_corner() {
        let mut img = GrayImage::new(40, 40);
        for y in 0..40 {
            for x in 20..40 {
                img.data[y * 40 + x] = 255;
            }
        }
        assert!(find_corners(&img.view(), 0.2, 3).is_empty());
    }

    #[test]
    fn downsample_averages_blocks() {
        let img = GrayImage {
            width: 4,
            height: 2,
            data: vec![0, 4, 8, 8, 4, 8, 8, 8],
        };
        let half = downsample(&img.view());
        assert_eq!((half.width, half.height), (2, 1));
        assert_eq!(half.data, vec![4, 8]);
    }
}
