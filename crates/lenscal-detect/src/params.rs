use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    pub k_neighbors: usize,
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 5.0,
            max_spacing_pix: 50.0,
            k_neighbors: 8,
            orientation_tolerance_deg: 22.5,
        }
    }
}

impl GridGraphParams {
    /// Spacing window scaled from a typical neighbour distance.
    pub fn around_spacing(&self, spacing: f32, window: &SpacingWindow) -> Self {
        Self {
            min_spacing_pix: spacing * window.min_ratio,
            max_spacing_pix: spacing * window.max_ratio,
            ..self.clone()
        }
    }
}

/// Accepted neighbour distances as ratios of the median nearest-neighbour
/// distance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpacingWindow {
    pub min_ratio: f32,
    pub max_ratio: f32,
}

impl Default for SpacingWindow {
    fn default() -> Self {
        Self {
            min_ratio: 0.5,
            max_ratio: 1.8,
        }
    }
}

/// Parameters specific to the chessboard detector.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// Candidates weaker than this fraction of the strongest response are dropped.
    pub relative_threshold: f32,
    /// Non-maximum suppression radius in pixels.
    pub nms_radius: usize,
    /// Minimal share of the expected corners the down-sampled pre-check must see.
    pub precheck_ratio: f32,
    pub spacing: SpacingWindow,
    pub grid: GridGraphParams,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            relative_threshold: 0.2,
            nms_radius: 3,
            precheck_ratio: 0.5,
            spacing: SpacingWindow::default(),
            grid: GridGraphParams::default(),
        }
    }
}

/// Parameters of the dark-blob circle-grid detector.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CircleGridParams {
    /// Smallest blob area in pixels.
    pub min_area: usize,
    /// Largest blob area as a fraction of the image area.
    pub max_area_fraction: f32,
    /// Minimal ratio of the minor to the major inertia axis.
    pub min_inertia_ratio: f32,
    /// Accepted ratio of the blob area to its moment-equivalent ellipse.
    pub ellipse_fill: (f32, f32),
    /// Accepted ratio of the blob area to its bounding box.
    pub box_fill: (f32, f32),
    pub spacing: SpacingWindow,
    pub grid: GridGraphParams,
}

impl Default for CircleGridParams {
    fn default() -> Self {
        Self {
            min_area: 12,
            max_area_fraction: 0.05,
            min_inertia_ratio: 0.2,
            ellipse_fill: (0.8, 1.2),
            box_fill: (0.55, 0.9),
            spacing: SpacingWindow::default(),
            grid: GridGraphParams::default(),
        }
    }
}

/// Stopping rule of the sub-pixel corner refiner.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SubPixParams {
    /// Half size of the search window; the window spans `2 * half_window + 1`.
    pub half_window: usize,
    pub max_iters: usize,
    pub epsilon: f32,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 11,
            max_iters: 30,
            epsilon: 1e-4,
        }
    }
}

/// Detector overrides accepted from configuration files.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectorParams {
    pub chessboard: ChessboardParams,
    pub circles: CircleGridParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_overrides_keep_defaults() {
        let params: DetectorParams =
            serde_json::from_str(r#"{"chessboard": {"nms_radius": 5}}"#).expect("parse");
        assert_eq!(params.chessboard.nms_radius, 5);
        assert_eq!(params.chessboard.relative_threshold, 0.2);
        assert_eq!(params.circles.min_area, 12);
    }

    #[test]
    fn spacing_window_scales() {
        let grid = GridGraphParams::default().around_spacing(20.0, &SpacingWindow::default());
        assert_eq!(grid.min_spacing_pix, 10.0);
        assert_eq!(grid.max_spacing_pix, 36.0);
        assert_eq!(grid.k_neighbors, 8);
    }
}
