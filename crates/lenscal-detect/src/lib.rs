//! Calibration-pattern detectors built on top of `lenscal-core`.
//!
//! Chessboards are found in three steps:
//! 1. ChESS X-junction candidates with their bright-diagonal orientation.
//! 2. A 4-connected grid graph whose edges must agree with the corner
//!    orientations and a median-spacing window.
//! 3. BFS grid coordinates; the component covering exactly the requested
//!    board is returned in row-major order.
//!
//! Circle grids replace step 1 with dark-blob extraction and use the same
//! graph. The staggered layout is recovered from its 45° lattice.

mod chess;
mod chessboard;
mod circles;
mod error;
mod geom;
mod gridgraph;
mod params;
mod subpix;

use lenscal_core::{BoardSize, GrayImageView, PatternKind};
use nalgebra::Point2;

pub use chess::{chess_response, find_corners, Corner, ResponseMap};
pub use chessboard::ChessboardDetector;
pub use circles::{find_blobs, otsu_threshold, Blob, CircleGridDetector};
pub use error::DetectError;
pub use gridgraph::{GridGraph, GridNode, NeighborDirection};
pub use params::{
    ChessboardParams, CircleGridParams, DetectorParams, GridGraphParams, SpacingWindow,
    SubPixParams,
};
pub use subpix::SubPixRefiner;

/// Finds a complete `width x height` pattern and returns its points in
/// row-major board order.
pub trait PatternDetector {
    fn detect(
        &self,
        img: &GrayImageView<'_>,
        board: BoardSize,
    ) -> Result<Vec<Point2<f32>>, DetectError>;
}

/// Refines detected points in place.
pub trait CornerRefiner {
    fn refine(&self, img: &GrayImageView<'_>, points: &mut [Point2<f32>]) -> Result<(), DetectError>;
}

/// Detector for `kind`. The chessboard pre-check is enabled by `fast_check`.
pub fn detector_for(
    kind: PatternKind,
    params: &DetectorParams,
    fast_check: bool,
) -> Box<dyn PatternDetector> {
    match kind {
        PatternKind::Chessboard => Box::new(
            ChessboardDetector::new(params.chessboard.clone()).with_fast_check(fast_check),
        ),
        PatternKind::CirclesGrid => Box::new(CircleGridDetector::symmetric(params.circles.clone())),
        PatternKind::AsymmetricCirclesGrid => {
            Box::new(CircleGridDetector::asymmetric(params.circles.clone()))
        }
    }
}
