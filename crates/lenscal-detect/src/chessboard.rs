use log::debug;
use nalgebra::Point2;

use crate::chess::{downsample, find_corners, Corner};
use crate::error::DetectError;
use crate::geom::{dominant_quarter_angle, wrap_quarter};
use crate::gridgraph::{
    assign_grid_coordinates, connected_components, median_nearest_distance, rectangular_grid,
    GridGraph, GridNode,
};
use crate::params::ChessboardParams;
use crate::PatternDetector;
use lenscal_core::{BoardSize, GrayImageView, ImageSize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Smallest side the ChESS ring can be evaluated on.
const MIN_SIDE: usize = 16;

/// Chessboard detector: ChESS corners assembled into a grid graph.
///
/// `width x height` counts inner corners. With `fast_check` a cheap
/// half-resolution corner count rejects frames without a board first.
#[derive(Clone, Debug, Default)]
pub struct ChessboardDetector {
    pub params: ChessboardParams,
    pub fast_check: bool,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self {
            params,
            fast_check: false,
        }
    }

    pub fn with_fast_check(mut self, enabled: bool) -> Self {
        self.fast_check = enabled;
        self
    }

    fn precheck(&self, img: &GrayImageView<'_>, board: BoardSize) -> Result<(), DetectError> {
        if img.width / 2 < MIN_SIDE || img.height / 2 < MIN_SIDE {
            return Ok(());
        }
        let half = downsample(img);
        let seen = find_corners(
            &half.view(),
            self.params.relative_threshold,
            (self.params.nms_radius / 2).max(1),
        )
        .len();
        let expected = (board.point_count() as f32 * self.params.precheck_ratio).ceil() as usize;
        if seen < expected {
            return Err(DetectError::PrecheckRejected { seen, expected });
        }
        Ok(())
    }

    /// Assemble a complete board from already detected corners.
    pub fn detect_from_corners(
        &self,
        corners: &[Corner],
        board: BoardSize,
    ) -> Result<Vec<Point2<f32>>, DetectError> {
        if corners.len() < board.point_count() {
            debug!(
                "{} corner candidates, board needs {}",
                corners.len(),
                board.point_count()
            );
            return Err(DetectError::NotFound);
        }

        let diagonal = dominant_quarter_angle(corners.iter().map(|c| (c.orientation, c.strength)))
            .ok_or(DetectError::NotFound)?;
        let axis = wrap_quarter(diagonal + std::f32::consts::FRAC_PI_4);

        let positions: Vec<Point2<f32>> = corners.iter().map(|c| c.position).collect();
        let spacing = median_nearest_distance(&positions).ok_or(DetectError::NotFound)?;
        let graph_params = self.params.grid.around_spacing(spacing, &self.params.spacing);

        let nodes: Vec<GridNode> = corners
            .iter()
            .map(|c| GridNode {
                position: c.position,
                orientation: Some(c.orientation),
            })
            .collect();
        let graph = GridGraph::new(&nodes, &graph_params, axis);

        let mut components = connected_components(&graph);
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));
        debug!(
            "grid axis {:.1} deg, spacing {:.1} px, largest component {}",
            axis.to_degrees(),
            spacing,
            components.first().map_or(0, Vec::len)
        );

        components
            .iter()
            .filter(|c| c.len() == board.point_count())
            .find_map(|component| {
                let coords = assign_grid_coordinates(&graph, component);
                rectangular_grid(&coords, board)
            })
            .map(|order| order.into_iter().map(|i| positions[i]).collect())
            .ok_or(DetectError::NotFound)
    }
}

impl PatternDetector for ChessboardDetector {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, img), fields(width = img.width, height = img.height))
    )]
    fn detect(
        &self,
        img: &GrayImageView<'_>,
        board: BoardSize,
    ) -> Result<Vec<Point2<f32>>, DetectError> {
        if img.width < MIN_SIDE || img.height < MIN_SIDE {
            return Err(DetectError::ImageTooSmall(ImageSize::new(img.width, img.height)));
        }
        if self.fast_check {
            self.precheck(img, board)?;
        }
        let corners = find_corners(img, self.params.relative_threshold, self.params.nms_radius);
        self.detect_from_corners(&corners, board)
    }
}
