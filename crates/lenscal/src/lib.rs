//! Camera calibration from pattern captures and lens-distortion flattening.
//!
//! This crate ties the workspace together:
//! - settings files and input classification,
//! - frame sources over image lists and Y4M video,
//! - the capture state machine and calibration run loop,
//! - calibration records,
//! - the flatten pipeline for image lists and video.
//!
//! ## Quickstart
//!
//! ```no_run
//! use lenscal::{open_source, run_calibration, CalibrationSettings, Calibrator, HeadlessSink, RunOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = CalibrationSettings::load_json("default.json".as_ref())?;
//! let mut source = open_source(&settings.input)?;
//! let summary = run_calibration(
//!     &settings,
//!     &RunOptions::default(),
//!     &Calibrator::new(),
//!     source.as_mut(),
//!     &mut HeadlessSink::default(),
//! );
//! println!("calibrated: {}", summary.calibrated());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `lenscal::core`: camera models, pattern geometry, undistortion maps.
//! - `lenscal::detect`: chessboard and circle-grid detectors.
//! - `lenscal::optim`: the Levenberg-Marquardt camera estimator.

pub use lenscal_core as core;
pub use lenscal_detect as detect;
pub use lenscal_optim as optim;

mod calibrator;
mod capture;
mod convert;
mod error;
mod flatten;
mod persist;
mod preview;
mod run;
mod settings;
mod source;
mod yuv;

pub use calibrator::{
    pooled_rms, reprojection_errors, CalibrationRequest, CalibrationResult, Calibrator,
};
pub use capture::{CaptureState, CaptureStateMachine};
pub use convert::{pixel_view, rgb_from_buffer, to_gray};
pub use error::{CalibrationError, ConfigError, FlattenError, OutputError, SourceError};
pub use flatten::{flattened_video_path, FlattenPipeline, FlattenSummary, FLATTENED_SUFFIX};
pub use persist::{CalibrationRecord, ResultPersister};
pub use preview::{draw_points, invert, HeadlessSink, Key, PreviewSink};
pub use run::{run_calibration, RunOptions, RunSummary, ANNOTATED_SUFFIX, UNDISTORTED_SUFFIX};
pub use settings::{
    load_json, read_image_list, write_json, CalibrationSettings, FlattenInput, FlattenSettings,
    InputSpec, MatrixRepr, RawCalibrationSettings, RawFlattenSettings,
};
pub use source::{open_source, suffixed_path, Frame, FrameSource, ImageListSource, VideoInfo, Y4mSource};
pub use yuv::Subsampling;
