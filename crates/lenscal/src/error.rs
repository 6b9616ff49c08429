use std::path::PathBuf;

use lenscal_core::{CropError, ImageSize, MapError, UnknownPattern};
use lenscal_optim::EstimationError;
use thiserror::Error;

/// Fatal problems found before any frame is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not open the configuration file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid YAML in {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid board size: {width} {height}")]
    InvalidBoardSize { width: i64, height: i64 },
    #[error("invalid square size {0}")]
    InvalidSquareSize(f32),
    #[error("invalid number of frames {0}")]
    InvalidFrameCount(i64),
    #[error("calibration pattern does not exist: {0}")]
    UnknownPattern(#[from] UnknownPattern),
    #[error("no input configured")]
    MissingInput,
    #[error("input does not exist: {0}")]
    InputNotFound(String),
    #[error("image list {path:?}: {reason}")]
    BadImageList { path: PathBuf, reason: String },
    #[error("camera {0}: no camera backend is available")]
    CameraUnsupported(u32),
    #[error("invalid {name} image size {width} x {height}")]
    InvalidSize {
        name: &'static str,
        width: i64,
        height: i64,
    },
    #[error("intermediate size {intermediate} must be >= original size {original}")]
    IntermediateTooSmall {
        original: ImageSize,
        intermediate: ImageSize,
    },
    #[error("final size {final_size} must be <= intermediate size {intermediate}")]
    FinalTooLarge {
        intermediate: ImageSize,
        final_size: ImageSize,
    },
    #[error("invalid camera model: {0}")]
    InvalidModel(String),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Frame acquisition failures.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("could not open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("video stream: {0}")]
    Video(#[from] y4m::Error),
    #[error("unsupported Y4M colorspace {0:?}")]
    UnsupportedColorspace(y4m::Colorspace),
    #[error("could not decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Per-artifact write failures.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("could not save view to {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("could not write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not serialize {path:?}: {reason}")]
    Serialize { path: PathBuf, reason: String },
    #[error("video stream: {0}")]
    Video(#[from] y4m::Error),
    #[error("frame buffer does not match {0}")]
    FrameGeometry(ImageSize),
}

/// Estimation failed or produced an unusable model.
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error(transparent)]
    Estimation(#[from] EstimationError),
    #[error("estimated parameters are out of range (avg re projection error = {avg_error})")]
    OutOfRange { optimizer_rms: f64, avg_error: f64 },
}

#[derive(Error, Debug)]
pub enum FlattenError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("video stream is {actual}, configuration declares {declared}")]
    StreamMismatch {
        declared: ImageSize,
        actual: ImageSize,
    },
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Crop(#[from] CropError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Output(#[from] OutputError),
}
