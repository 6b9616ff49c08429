//! Camera models, calibration-pattern geometry and undistortion maps.
//!
//! This crate holds the geometry shared by detection, estimation and the
//! application layer. It does not decode images or talk to devices.

mod camera;
mod distortion;
mod flags;
mod homography;
mod image;
mod logger;
mod pattern;
mod remap;

pub use camera::{CameraModel, ViewPose, PARAM_ABS_LIMIT};
pub use distortion::{Distortion, PINHOLE_COEFFS, WIDE_ANGLE_COEFFS};
pub use flags::{ModelVariant, PinholeFlags, WideAngleFlags};
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear, GrayImage, GrayImageView, ImageSize, PixelBuffer, PixelView};
pub use pattern::{
    apply_grid_width, natural_grid_width, object_points, BoardSize, PatternKind, UnknownPattern,
};
pub use remap::{
    centered_crop, crop, optimal_new_camera_matrix, wide_angle_new_camera_matrix, CropError,
    CropRect, MapError, UndistortionMap,
};

#[cfg(feature = "tracing")]
pub use logger::{init_tracing, init_tracing_with_level};

pub use logger::{default_directive, init_with_level, timestamp_prefix, verbosity_level};
