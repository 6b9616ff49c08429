use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimationError {
    #[error("need at least {min} views, got {got}")]
    TooFewViews { got: usize, min: usize },
    #[error("view {view}: {object} object points but {image} image points")]
    MismatchedView {
        view: usize,
        object: usize,
        image: usize,
    },
    #[error("view {view} has fewer than four usable points")]
    TooFewPoints { view: usize },
    #[error("view {view}: target points are not planar")]
    NonPlanarTarget { view: usize },
    #[error("view {view}: homography is degenerate")]
    DegenerateView { view: usize },
    #[error("views do not constrain the focal length")]
    DegenerateIntrinsics,
    #[error("object-point release is not available for wide-angle lenses")]
    FixedPointUnsupported,
    #[error("released views must share the same target layout")]
    InconsistentTargets,
    #[error("optimisation produced non-finite parameters")]
    NonFinite,
}
