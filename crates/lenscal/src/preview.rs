//! Presentation side effects of the calibration loop: detection overlays,
//! the capture blink, and the operator's key channel.
//!
//! None of this feeds back into the capture state except through [`Key`].

use image::{Rgb, RgbImage};
use lenscal_core::BoardSize;
use nalgebra::Point2;

/// Operator commands read after each shown frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    /// Stop the run without a final estimation.
    Escape,
    /// Switch between the raw and the undistorted preview.
    ToggleUndistorted,
    /// Clear the observations and start capturing again (live only).
    Reset,
}

impl Key {
    pub fn from_char(c: char) -> Option<Key> {
        match c {
            '\u{1b}' => Some(Key::Escape),
            'u' => Some(Key::ToggleUndistorted),
            'g' => Some(Key::Reset),
            _ => None,
        }
    }
}

/// Where preview frames go.
pub trait PreviewSink {
    /// Present a frame and return the key pressed meanwhile, if any.
    fn show(&mut self, frame: &RgbImage) -> Option<Key>;

    /// Block until the operator has seen `message`.
    fn acknowledge(&mut self, _message: &str) {}
}

/// Never blocks and never reports a key.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessSink {
    pub frames_shown: usize,
}

impl PreviewSink for HeadlessSink {
    fn show(&mut self, _frame: &RgbImage) -> Option<Key> {
        self.frames_shown += 1;
        None
    }
}

const ROW_COLOURS: [[u8; 3]; 7] = [
    [255, 0, 0],
    [255, 128, 0],
    [200, 200, 0],
    [0, 255, 0],
    [0, 200, 200],
    [0, 0, 255],
    [255, 0, 255],
];
const NOT_FOUND: [u8; 3] = [255, 0, 0];
const MARKER_RADIUS: i32 = 4;

fn put(img: &mut RgbImage, x: i32, y: i32, colour: [u8; 3]) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, Rgb(colour));
    }
}

fn draw_line(img: &mut RgbImage, a: Point2<f32>, b: Point2<f32>, colour: [u8; 3]) {
    let (mut x0, mut y0) = (a.x.round() as i32, a.y.round() as i32);
    let (x1, y1) = (b.x.round() as i32, b.y.round() as i32);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put(img, x0, y0, colour);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_marker(img: &mut RgbImage, p: Point2<f32>, colour: [u8; 3]) {
    let (cx, cy) = (p.x.round() as i32, p.y.round() as i32);
    let r = MARKER_RADIUS;
    // Midpoint circle.
    let (mut x, mut y, mut d) = (r, 0, 1 - r);
    while x >= y {
        for (ox, oy) in [(x, y), (y, x), (-y, x), (-x, y), (-x, -y), (-y, -x), (y, -x), (x, -y)] {
            put(img, cx + ox, cy + oy, colour);
        }
        y += 1;
        if d < 0 {
            d += 2 * y + 1;
        } else {
            x -= 1;
            d += 2 * (y - x) + 1;
        }
    }
    let off = Point2::new(r as f32 - 1.0, r as f32 - 1.0);
    draw_line(img, p - off.coords, p + off.coords, colour);
    let flip = Point2::new(off.x, -off.y);
    draw_line(img, p - flip.coords, p + flip.coords, colour);
}

/// Overlay detected points. A complete detection gets one colour per board
/// row with consecutive points joined; a partial one only red markers.
pub fn draw_points(img: &mut RgbImage, points: &[Point2<f32>], board: BoardSize, found: bool) {
    if !found {
        for p in points {
            draw_marker(img, *p, NOT_FOUND);
        }
        return;
    }
    let width = board.width.max(1);
    let mut prev: Option<Point2<f32>> = None;
    for (i, p) in points.iter().enumerate() {
        let colour = ROW_COLOURS[(i / width) % ROW_COLOURS.len()];
        if let Some(q) = prev {
            draw_line(img, q, *p, colour);
        }
        draw_marker(img, *p, colour);
        prev = Some(*p);
    }
}

/// Colour inversion used to signal a freshly captured frame.
pub fn invert(img: &mut RgbImage) {
    image::imageops::invert(img);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_from_characters() {
        assert_eq!(Key::from_char('\u{1b}'), Some(Key::Escape));
        assert_eq!(Key::from_char('u'), Some(Key::ToggleUndistorted));
        assert_eq!(Key::from_char('g'), Some(Key::Reset));
        assert_eq!(Key::from_char('x'), None);
    }

    #[test]
    fn headless_sink_counts_and_never_blocks() {
        let mut sink = HeadlessSink::default();
        let img = RgbImage::new(2, 2);
        assert_eq!(sink.show(&img), None);
        sink.acknowledge("ignored");
        assert_eq!(sink.frames_shown, 1);
    }

    #[test]
    fn overlay_colours_rows_and_stays_inside() {
        let mut img = RgbImage::new(40, 30);
        let points = [
            Point2::new(5.0, 5.0),
            Point2::new(20.0, 5.0),
            Point2::new(5.0, 20.0),
            Point2::new(39.5, 29.5),
        ];
        draw_points(&mut img, &points, BoardSize::new(2, 2), true);
        assert_eq!(img.get_pixel(12, 5).0, ROW_COLOURS[0]);
        assert_eq!(img.get_pixel(9, 20).0, ROW_COLOURS[1]);

        let mut partial = RgbImage::new(10, 10);
        draw_points(&mut partial, &[Point2::new(5.0, 5.0)], BoardSize::new(2, 2), false);
        assert_eq!(partial.get_pixel(5, 5).0, NOT_FOUND);
    }

    #[test]
    fn invert_flips_every_channel() {
        let mut img = RgbImage::from_pixel(1, 1, Rgb([0, 100, 255]));
        invert(&mut img);
        assert_eq!(img.get_pixel(0, 0).0, [255, 155, 0]);
    }
}
