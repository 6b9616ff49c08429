//! Dark-blob circle-grid detection (symmetric and staggered layouts).

use std::collections::HashSet;

use log::debug;
use nalgebra::Point2;

use crate::error::DetectError;
use crate::geom::dominant_quarter_angle;
use crate::gridgraph::{
    assign_grid_coordinates, connected_components, median_nearest_distance, nearest_edge_angles,
    rectangular_grid, GridGraph, GridNode,
};
use crate::params::CircleGridParams;
use crate::PatternDetector;
use lenscal_core::{BoardSize, GrayImageView, ImageSize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Connected dark region with its first and second moments.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Blob {
    pub center: Point2<f32>,
    pub area: usize,
}

/// Otsu threshold; pixels `<= t` form the dark class.
pub fn otsu_threshold(img: &GrayImageView<'_>) -> u8 {
    let mut hist = [0usize; 256];
    for &v in img.data {
        hist[v as usize] += 1;
    }
    let total = img.data.len() as f64;
    let sum_all: f64 = hist.iter().enumerate().map(|(v, &n)| v as f64 * n as f64).sum();

    let (mut w0, mut sum0) = (0.0f64, 0.0f64);
    let (mut best_t, mut best_var) = (0u8, -1.0f64);
    for (t, &n) in hist.iter().enumerate() {
        w0 += n as f64;
        sum0 += t as f64 * n as f64;
        let w1 = total - w0;
        if w0 == 0.0 || w1 == 0.0 {
            continue;
        }
        let m0 = sum0 / w0;
        let m1 = (sum_all - sum0) / w1;
        let var = w0 * w1 * (m0 - m1) * (m0 - m1);
        if var > best_var {
            best_var = var;
            best_t = t as u8;
        }
    }
    best_t
}

#[derive(Default)]
struct Moments {
    area: usize,
    sx: f64,
    sy: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
    min_x: usize,
    max_x: usize,
    min_y: usize,
    max_y: usize,
    touches_border: bool,
}

/// Dark connected components (4-connectivity) passing the shape filters.
pub fn find_blobs(img: &GrayImageView<'_>, params: &CircleGridParams) -> Vec<Blob> {
    let (w, h) = (img.width, img.height);
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let threshold = otsu_threshold(img);
    let max_area = (params.max_area_fraction * (w * h) as f32) as usize;
    let mut visited = vec![false; w * h];
    let mut stack = Vec::new();
    let mut blobs = Vec::new();

    for start in 0..w * h {
        if visited[start] || img.data[start] > threshold {
            continue;
        }
        let mut m = Moments {
            min_x: usize::MAX,
            min_y: usize::MAX,
            ..Default::default()
        };
        visited[start] = true;
        stack.push(start);

        while let Some(idx) = stack.pop() {
            let (x, y) = (idx % w, idx / w);
            m.area += 1;
            let (fx, fy) = (x as f64, y as f64);
            m.sx += fx;
            m.sy += fy;
            m.sxx += fx * fx;
            m.syy += fy * fy;
            m.sxy += fx * fy;
            m.min_x = m.min_x.min(x);
            m.max_x = m.max_x.max(x);
            m.min_y = m.min_y.min(y);
            m.max_y = m.max_y.max(y);
            if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
                m.touches_border = true;
            }

            let mut visit = |n: usize| {
                if !visited[n] && img.data[n] <= threshold {
                    visited[n] = true;
                    stack.push(n);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < w {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - w);
            }
            if y + 1 < h {
                visit(idx + w);
            }
        }

        if let Some(blob) = accept_blob(&m, params, max_area) {
            blobs.push(blob);
        }
    }
    blobs
}

fn accept_blob(m: &Moments, params: &CircleGridParams, max_area: usize) -> Option<Blob> {
    if m.touches_border || m.area < params.min_area || m.area > max_area {
        return None;
    }
    let n = m.area as f64;
    let (cx, cy) = (m.sx / n, m.sy / n);
    let cxx = m.sxx / n - cx * cx;
    let cyy = m.syy / n - cy * cy;
    let cxy = m.sxy / n - cx * cy;

    let half_trace = 0.5 * (cxx + cyy);
    let disc = (0.25 * (cxx - cyy) * (cxx - cyy) + cxy * cxy).sqrt();
    let l_max = half_trace + disc;
    let l_min = half_trace - disc;
    if l_max <= 0.0 || l_min <= 0.0 || l_min / l_max < params.min_inertia_ratio as f64 {
        return None;
    }

    // A filled ellipse with semi-axes a, b has second moments a^2/4, b^2/4.
    let ellipse_area = std::f64::consts::PI * 4.0 * (l_max * l_min).sqrt();
    let ellipse_fill = n / ellipse_area;
    let box_area = ((m.max_x - m.min_x + 1) * (m.max_y - m.min_y + 1)) as f64;
    let box_fill = n / box_area;
    let in_range = |v: f64, (lo, hi): (f32, f32)| v >= lo as f64 && v <= hi as f64;
    if !in_range(ellipse_fill, params.ellipse_fill) || !in_range(box_fill, params.box_fill) {
        return None;
    }

    Some(Blob {
        center: Point2::new(cx as f32, cy as f32),
        area: m.area,
    })
}

/// Circle-grid detector for the regular and the staggered layout.
#[derive(Clone, Debug, Default)]
pub struct CircleGridDetector {
    pub params: CircleGridParams,
    pub asymmetric: bool,
}

impl CircleGridDetector {
    pub fn symmetric(params: CircleGridParams) -> Self {
        Self {
            params,
            asymmetric: false,
        }
    }

    pub fn asymmetric(params: CircleGridParams) -> Self {
        Self {
            params,
            asymmetric: true,
        }
    }

    /// Assemble the board from blob centres.
    pub fn detect_from_centers(
        &self,
        centers: &[Point2<f32>],
        board: BoardSize,
    ) -> Result<Vec<Point2<f32>>, DetectError> {
        if centers.len() < board.point_count() {
            debug!(
                "{} blobs, board needs {}",
                centers.len(),
                board.point_count()
            );
            return Err(DetectError::NotFound);
        }

        let spacing = median_nearest_distance(centers).ok_or(DetectError::NotFound)?;
        let axis = dominant_quarter_angle(nearest_edge_angles(centers).into_iter().map(|a| (a, 1.0)))
            .ok_or(DetectError::NotFound)?;
        let graph_params = self.params.grid.around_spacing(spacing, &self.params.spacing);
        let nodes: Vec<GridNode> = centers
            .iter()
            .map(|&position| GridNode {
                position,
                orientation: None,
            })
            .collect();
        let graph = GridGraph::new(&nodes, &graph_params, axis);

        let mut components = connected_components(&graph);
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));

        components
            .iter()
            .filter(|c| c.len() == board.point_count())
            .find_map(|component| {
                let coords = assign_grid_coordinates(&graph, component);
                if self.asymmetric {
                    staggered_grid(&coords, board)
                } else {
                    rectangular_grid(&coords, board)
                }
            })
            .map(|order| order.into_iter().map(|i| centers[i]).collect())
            .ok_or(DetectError::NotFound)
    }
}

/// Order a 45°-rotated lattice as a staggered board.
///
/// Nearest neighbours of the staggered layout are diagonal in board units,
/// so lattice coordinates `(a, b)` map to board columns `c = a - b` and rows
/// `r = a + b`. Every lattice symmetry is tried until row `r` holds the
/// columns `2 * j + r % 2`.
pub fn staggered_grid(coords: &[(usize, i32, i32)], board: BoardSize) -> Option<Vec<usize>> {
    if coords.len() != board.point_count() || coords.is_empty() {
        return None;
    }
    let symmetries: [fn(i32, i32) -> (i32, i32); 8] = [
        |a, b| (a, b),
        |a, b| (-a, b),
        |a, b| (a, -b),
        |a, b| (-a, -b),
        |a, b| (b, a),
        |a, b| (-b, a),
        |a, b| (b, -a),
        |a, b| (-b, -a),
    ];

    'symmetry: for sym in symmetries {
        let cr: Vec<(usize, i32, i32)> = coords
            .iter()
            .map(|&(node, a, b)| {
                let (a, b) = sym(a, b);
                (node, a - b, a + b)
            })
            .collect();
        let r0 = cr.iter().map(|c| c.2).min()?;
        let c0 = cr.iter().filter(|c| c.2 == r0).map(|c| c.1).min()?;

        let mut ordered = vec![usize::MAX; board.point_count()];
        let mut seen = HashSet::with_capacity(cr.len());
        for &(node, c, r) in &cr {
            let (c, r) = (c - c0, r - r0);
            if c < 0 || r < 0 || r as usize >= board.height {
                continue 'symmetry;
            }
            let shifted = c - r % 2;
            if shifted < 0 || shifted % 2 != 0 {
                continue 'symmetry;
            }
            let j = (shifted / 2) as usize;
            if j >= board.width || !seen.insert((j, r)) {
                continue 'symmetry;
            }
            ordered[r as usize * board.width + j] = node;
        }
        if !ordered.contains(&usize::MAX) {
            return Some(ordered);
        }
    }
    None
}

impl PatternDetector for CircleGridDetector {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, img), fields(width = img.width, height = img.height))
    )]
    fn detect(
        &self,
        img: &GrayImageView<'_>,
        board: BoardSize,
    ) -> Result<Vec<Point2<f32>>, DetectError> {
        if img.width < 3 || img.height < 3 {
            return Err(DetectError::ImageTooSmall(ImageSize::new(img.width, img.height)));
        }
        let blobs = find_blobs(img, &self.params);
        let centers: Vec<Point2<f32>> = blobs.iter().map(|b| b.center).collect();
        self.detect_from_centers(&centers, board)
    }
}
