//! BT.601 conversion between 8-bit Y4M planes and RGB images.
//!
//! Colour planes use the studio range (luma 16..235). Monochrome streams
//! carry plain gray values and are copied through unchanged.

use image::{Rgb, RgbImage};
use y4m::Colorspace;

/// Chroma plane layout of the supported 8-bit colorspaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subsampling {
    Mono,
    /// Half width, half height.
    S420,
    /// Half width, full height.
    S422,
    S444,
}

impl Subsampling {
    pub fn of(colorspace: Colorspace) -> Option<Self> {
        match colorspace {
            Colorspace::Cmono => Some(Subsampling::Mono),
            Colorspace::C420
            | Colorspace::C420jpeg
            | Colorspace::C420paldv
            | Colorspace::C420mpeg2 => Some(Subsampling::S420),
            Colorspace::C422 => Some(Subsampling::S422),
            Colorspace::C444 => Some(Subsampling::S444),
            _ => None,
        }
    }

    /// Chroma plane dimensions; odd sizes round up.
    pub fn chroma_size(&self, width: usize, height: usize) -> (usize, usize) {
        match self {
            Subsampling::Mono => (0, 0),
            Subsampling::S420 => (width.div_ceil(2), height.div_ceil(2)),
            Subsampling::S422 => (width.div_ceil(2), height),
            Subsampling::S444 => (width, height),
        }
    }

    fn factors(&self) -> (usize, usize) {
        match self {
            Subsampling::Mono | Subsampling::S444 => (1, 1),
            Subsampling::S420 => (2, 2),
            Subsampling::S422 => (2, 1),
        }
    }
}

#[inline]
fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = 1.164 * (y as f32 - 16.0);
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    [
        clamp_u8(c + 1.596 * e),
        clamp_u8(c - 0.392 * d - 0.813 * e),
        clamp_u8(c + 2.017 * d),
    ]
}

#[inline]
fn rgb_to_y(p: &Rgb<u8>) -> f32 {
    let [r, g, b] = p.0.map(f32::from);
    16.0 + 0.257 * r + 0.504 * g + 0.098 * b
}

#[inline]
fn rgb_to_uv(r: f32, g: f32, b: f32) -> (f32, f32) {
    (
        128.0 - 0.148 * r - 0.291 * g + 0.439 * b,
        128.0 + 0.439 * r - 0.368 * g - 0.071 * b,
    )
}

/// Decode one frame. Returns `None` when a plane is shorter than the layout
/// requires.
pub fn planes_to_rgb(
    layout: Subsampling,
    width: usize,
    height: usize,
    y: &[u8],
    u: &[u8],
    v: &[u8],
) -> Option<RgbImage> {
    let (cw, ch) = layout.chroma_size(width, height);
    if y.len() < width * height || u.len() < cw * ch || v.len() < cw * ch {
        return None;
    }
    let mut out = RgbImage::new(width as u32, height as u32);
    let (sx, sy) = layout.factors();
    for row in 0..height {
        for col in 0..width {
            let luma = y[row * width + col];
            let rgb = if layout == Subsampling::Mono {
                [luma; 3]
            } else {
                let ci = (row / sy) * cw + col / sx;
                yuv_to_rgb(luma, u[ci], v[ci])
            };
            out.put_pixel(col as u32, row as u32, Rgb(rgb));
        }
    }
    Some(out)
}

/// Encode one frame into `[y, u, v]` planes; chroma is box-averaged over
/// each subsampling block.
pub fn rgb_to_planes(layout: Subsampling, image: &RgbImage) -> [Vec<u8>; 3] {
    let (width, height) = (image.width() as usize, image.height() as usize);

    if layout == Subsampling::Mono {
        let luma = image
            .pixels()
            .map(|p| clamp_u8((p.0[0] as f32 + p.0[1] as f32 + p.0[2] as f32) / 3.0))
            .collect();
        return [luma, Vec::new(), Vec::new()];
    }

    let luma = image.pixels().map(|p| clamp_u8(rgb_to_y(p))).collect();

    let (cw, ch) = layout.chroma_size(width, height);
    let (sx, sy) = layout.factors();
    let mut u = Vec::with_capacity(cw * ch);
    let mut v = Vec::with_capacity(cw * ch);
    for crow in 0..ch {
        for ccol in 0..cw {
            let (mut r, mut g, mut b, mut n) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
            for row in crow * sy..((crow + 1) * sy).min(height) {
                for col in ccol * sx..((ccol + 1) * sx).min(width) {
                    let p = image.get_pixel(col as u32, row as u32).0;
                    r += p[0] as f32;
                    g += p[1] as f32;
                    b += p[2] as f32;
                    n += 1.0;
                }
            }
            let (cu, cv) = rgb_to_uv(r / n, g / n, b / n);
            u.push(clamp_u8(cu));
            v.push(clamp_u8(cv));
        }
    }
    [luma, u, v]
}
