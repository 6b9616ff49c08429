//! Canonical board coordinates for the supported calibration patterns.

use std::fmt;
use std::str::FromStr;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternKind {
    Chessboard,
    CirclesGrid,
    AsymmetricCirclesGrid,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Chessboard => "CHESSBOARD",
            PatternKind::CirclesGrid => "CIRCLES_GRID",
            PatternKind::AsymmetricCirclesGrid => "ASYMMETRIC_CIRCLES_GRID",
        }
    }

    /// Corner-based patterns go through sub-pixel refinement.
    pub fn is_corner_based(&self) -> bool {
        matches!(self, PatternKind::Chessboard)
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown calibration pattern {0:?}")]
pub struct UnknownPattern(pub String);

impl FromStr for PatternKind {
    type Err = UnknownPattern;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CHESSBOARD" => Ok(PatternKind::Chessboard),
            "CIRCLES_GRID" => Ok(PatternKind::CirclesGrid),
            "ASYMMETRIC_CIRCLES_GRID" => Ok(PatternKind::AsymmetricCirclesGrid),
            other => Err(UnknownPattern(other.to_string())),
        }
    }
}

/// Number of features per row (`width`) and rows (`height`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoardSize {
    pub width: usize,
    pub height: usize,
}

impl BoardSize {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn point_count(&self) -> usize {
        self.width * self.height
    }
}

/// Board-frame coordinates of every feature, row-major, `z = 0`.
pub fn object_points(kind: PatternKind, size: BoardSize, square_size: f32) -> Vec<Point3<f32>> {
    let mut out = Vec::with_capacity(size.point_count());
    for i in 0..size.height {
        for j in 0..size.width {
            let col = match kind {
                PatternKind::Chessboard | PatternKind::CirclesGrid => j,
                PatternKind::AsymmetricCirclesGrid => 2 * j + i % 2,
            };
            out.push(Point3::new(
                col as f32 * square_size,
                i as f32 * square_size,
                0.0,
            ));
        }
    }
    out
}

/// Distance between the first and the last feature of the first row.
pub fn natural_grid_width(template: &[Point3<f32>], size: BoardSize) -> f32 {
    match (template.first(), template.get(size.width.saturating_sub(1))) {
        (Some(first), Some(last)) => last.x - first.x,
        _ => 0.0,
    }
}

/// Overwrite the x coordinate of the `width-1` reference point so that it
/// lies `grid_width` away from the first point.
pub fn apply_grid_width(template: &mut [Point3<f32>], size: BoardSize, grid_width: f32) {
    let Some(first_x) = template.first().map(|p| p.x) else {
        return;
    };
    if let Some(reference) = template.get_mut(size.width.saturating_sub(1)) {
        reference.x = first_x + grid_width;
    }
}
