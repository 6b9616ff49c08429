#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use lenscal::core::{BoardSize, ViewPose};
use nalgebra::{Matrix3, Point3, Vector3};

pub const WIDTH: u32 = 480;
pub const HEIGHT: u32 = 360;
pub const FOCAL: f64 = 600.0;
pub const BOARD: BoardSize = BoardSize::new(7, 5);

/// Tilts of the synthetic captures; the board centre stays on the optical
/// axis at depth 20 squares.
pub const TILTS: [[f64; 3]; 5] = [
    [0.15, 0.0, 0.0],
    [-0.15, 0.05, 0.0],
    [0.0, 0.18, 0.1],
    [0.1, -0.15, -0.05],
    [-0.12, -0.1, 0.2],
];

pub fn camera_matrix() -> Matrix3<f64> {
    Matrix3::new(
        FOCAL,
        0.0,
        (WIDTH as f64 - 1.0) / 2.0,
        0.0,
        FOCAL,
        (HEIGHT as f64 - 1.0) / 2.0,
        0.0,
        0.0,
        1.0,
    )
}

fn pose(rvec: [f64; 3]) -> ViewPose {
    let rvec = Vector3::from(rvec);
    let centre = Point3::new(
        (BOARD.width as f64 - 1.0) / 2.0,
        (BOARD.height as f64 - 1.0) / 2.0,
        0.0,
    );
    let rotated = ViewPose {
        rvec,
        tvec: Vector3::zeros(),
    }
    .isometry()
        * centre;
    ViewPose {
        rvec,
        tvec: Vector3::new(0.0, 0.0, 20.0) - rotated.coords,
    }
}

/// Render a chessboard with `BOARD` inner corners and unit squares seen
/// through a distortion-free pinhole camera, 2x2 supersampled.
pub fn render_view(rvec: [f64; 3]) -> RgbImage {
    let iso = pose(rvec).isometry();
    let rot = iso.rotation.to_rotation_matrix();
    let r = rot.matrix();
    let plane = Matrix3::from_columns(&[
        r.column(0).into_owned(),
        r.column(1).into_owned(),
        iso.translation.vector,
    ]);
    let to_board = (camera_matrix() * plane)
        .try_inverse()
        .expect("board plane faces the camera");

    let (cols, rows) = (BOARD.width as f64 + 1.0, BOARD.height as f64 + 1.0);
    RgbImage::from_fn(WIDTH, HEIGHT, |u, v| {
        let mut dark = 0u32;
        for (du, dv) in [(-0.25, -0.25), (0.25, -0.25), (-0.25, 0.25), (0.25, 0.25)] {
            let p = to_board * Vector3::new(u as f64 + du, v as f64 + dv, 1.0);
            let (x, y) = (p.x / p.z, p.y / p.z);
            let inside = (-1.0..cols - 1.0).contains(&x) && (-1.0..rows - 1.0).contains(&y);
            if inside && (x.floor() as i64 + y.floor() as i64).rem_euclid(2) == 0 {
                dark += 1;
            }
        }
        let level = (255 - dark * 255 / 4) as u8;
        Rgb([level, level, level])
    })
}

/// Write the synthetic captures as PNGs plus a JSON list referencing them
/// by relative path. Returns the list path.
pub fn write_views(dir: &Path, tilts: &[[f64; 3]]) -> PathBuf {
    let mut names = Vec::new();
    for (i, tilt) in tilts.iter().enumerate() {
        let name = format!("view{i:02}.png");
        render_view(*tilt).save(dir.join(&name)).expect("save view");
        names.push(name);
    }
    let list = dir.join("views.json");
    fs::write(&list, serde_json::to_string(&names).expect("json")).expect("write list");
    list
}

/// Blank captures without any pattern.
pub fn write_blank_views(dir: &Path, count: usize) -> PathBuf {
    let mut names = Vec::new();
    for i in 0..count {
        let name = format!("blank{i:02}.png");
        RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([180, 180, 180]))
            .save(dir.join(&name))
            .expect("save blank");
        names.push(name);
    }
    let list = dir.join("blank.json");
    fs::write(&list, serde_json::to_string(&names).expect("json")).expect("write list");
    list
}

pub fn calibration_settings(list: &Path, output: &Path, frames: usize) -> serde_json::Value {
    serde_json::json!({
        "Settings": {
            "BoardSize_Width": BOARD.width,
            "BoardSize_Height": BOARD.height,
            "Square_Size": 1.0,
            "Calibrate_Pattern": "CHESSBOARD",
            "Calibrate_NrOfFrameToUse": frames,
            "Calibrate_AssumeZeroTangentialDistortion": 1,
            "Fix_K3": 1,
            "Write_gridPoints": 1,
            "Write_outputFileName": output.to_string_lossy(),
            "Show_UndistortedImage": 1,
            "Input": list.to_string_lossy(),
        }
    })
}

/// 8-bit 4:2:0 clip of `frames` mid-gray frames.
pub fn write_y4m(path: &Path, width: usize, height: usize, frames: usize) {
    let file = fs::File::create(path).expect("create clip");
    let mut enc = y4m::encode(width, height, y4m::Ratio::new(30, 1))
        .with_colorspace(y4m::Colorspace::C420jpeg)
        .write_header(file)
        .expect("header");
    let y = vec![140u8; width * height];
    let c = vec![128u8; width.div_ceil(2) * height.div_ceil(2)];
    for _ in 0..frames {
        enc.write_frame(&y4m::Frame::new([&y[..], &c[..], &c[..]], None))
            .expect("frame");
    }
}

pub fn flatten_settings(
    input: &Path,
    original: (usize, usize),
    intermediate: (usize, usize),
    final_size: (usize, usize),
) -> serde_json::Value {
    let (w, h) = (original.0 as f64, original.1 as f64);
    serde_json::json!({
        "input": input.to_string_lossy(),
        "original_image_width": original.0,
        "original_image_height": original.1,
        "intermediate_image_width": intermediate.0,
        "intermediate_image_height": intermediate.1,
        "final_image_width": final_size.0,
        "final_image_height": final_size.1,
        "use_fisheye_model": false,
        "camera_matrix": [[w, 0.0, (w - 1.0) / 2.0], [0.0, w, (h - 1.0) / 2.0], [0.0, 0.0, 1.0]],
        "distortion_coefficients": [-0.05, 0.0, 0.0, 0.0, 0.0],
    })
}
