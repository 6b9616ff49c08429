//! Planar-target camera calibration.
//!
//! Starting values come from closed-form homography decompositions; a dense
//! Levenberg-Marquardt solver then minimises the reprojection error over the
//! intrinsics, the distortion coefficients and one pose per view. Pinhole
//! lenses can additionally release the target layout around three anchor
//! points to absorb small manufacturing errors.

mod bundle;
mod calibrate;
mod error;
pub mod init;
pub mod lm;

pub use calibrate::{
    calibrate_pinhole, calibrate_wide_angle, CameraEstimator, Estimate, LmEstimator, Observations,
    MIN_VIEWS,
};
pub use error::EstimationError;
pub use lm::{NllsProblem, SolveOptions, SolveReport};
