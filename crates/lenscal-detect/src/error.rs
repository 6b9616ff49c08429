use lenscal_core::ImageSize;

/// Per-frame detection failures; callers discard the frame and continue.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error("pattern not found")]
    NotFound,
    #[error("pre-check saw {seen} corner candidates, expected at least {expected}")]
    PrecheckRejected { seen: usize, expected: usize },
    #[error("image {0} is too small for detection")]
    ImageTooSmall(ImageSize),
    #[error("refined point {index} left the image")]
    RefinementLeftImage { index: usize },
    #[error("refinement of point {index} diverged")]
    RefinementDiverged { index: usize },
}
