use std::collections::{HashMap, VecDeque};

use crate::geom::{angle_diff_abs, axis_vec_diff, is_orthogonal};
use crate::params::GridGraphParams;
use lenscal_core::BoardSize;
use nalgebra::{Point2, Vector2};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

/// Graph vertex: a detected feature with an optional corner orientation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridNode {
    pub position: Point2<f32>,
    /// Bright-diagonal direction for X-junctions; `None` for blob centres.
    pub orientation: Option<f32>,
}

#[derive(Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

/// Classify `v` in the frame rotated by the grid axis angle.
fn direction_quadrant(v: &Vector2<f32>, axis_angle: f32) -> NeighborDirection {
    let (s, c) = axis_angle.sin_cos();
    let x = c * v.x + s * v.y;
    let y = -s * v.x + c * v.y;
    if x.abs() > y.abs() {
        if x >= 0.0 {
            NeighborDirection::Right
        } else {
            NeighborDirection::Left
        }
    } else if y >= 0.0 {
        NeighborDirection::Down
    } else {
        NeighborDirection::Up
    }
}

/// X-junction neighbour test.
///
/// Corner orientations are the bright diagonals, rotated 45° from the grid
/// directions, so adjacent corners must be orthogonal to each other and the
/// edge between them must sit at ~45° to both.
fn is_good_neighbor(
    node: &GridNode,
    neighbor: &GridNode,
    neighbor_index: usize,
    params: &GridGraphParams,
    axis_angle: f32,
) -> Option<NodeNeighbor> {
    let (Some(oi), Some(oj)) = (node.orientation, neighbor.orientation) else {
        return None;
    };
    let tol = params.orientation_tolerance_deg.to_radians();
    if !is_orthogonal(oi, oj, tol) {
        return None;
    }

    let vec_to_neighbor = neighbor.position - node.position;
    let distance = vec_to_neighbor.norm();
    if distance < params.min_spacing_pix || distance > params.max_spacing_pix {
        return None;
    }

    let edge_angle = vec_to_neighbor.y.atan2(vec_to_neighbor.x);
    let expected = std::f32::consts::FRAC_PI_4;
    let score_node = (axis_vec_diff(oi, edge_angle) - expected).abs();
    let score_neighbor = (axis_vec_diff(oj, edge_angle) - expected).abs();
    if score_node > tol || score_neighbor > tol {
        return None;
    }

    let score_orientation = (std::f32::consts::FRAC_PI_2 - angle_diff_abs(oi, oj)).abs();
    Some(NodeNeighbor {
        direction: direction_quadrant(&vec_to_neighbor, axis_angle),
        index: neighbor_index,
        distance,
        score: score_node + score_neighbor + score_orientation,
    })
}

/// Blob-lattice neighbour test: the edge must follow one of the two grid
/// axes. The nearest candidate per direction wins.
fn is_lattice_neighbor(
    node: &GridNode,
    neighbor: &GridNode,
    neighbor_index: usize,
    params: &GridGraphParams,
    axis_angle: f32,
) -> Option<NodeNeighbor> {
    let vec_to_neighbor = neighbor.position - node.position;
    let distance = vec_to_neighbor.norm();
    if distance < params.min_spacing_pix || distance > params.max_spacing_pix {
        return None;
    }

    let edge_angle = vec_to_neighbor.y.atan2(vec_to_neighbor.x);
    let off_axis = axis_vec_diff(axis_angle, edge_angle);
    let deviation = off_axis.min(std::f32::consts::FRAC_PI_2 - off_axis);
    if deviation > params.orientation_tolerance_deg.to_radians() {
        return None;
    }

    Some(NodeNeighbor {
        direction: direction_quadrant(&vec_to_neighbor, axis_angle),
        index: neighbor_index,
        distance,
        score: distance,
    })
}

/// Keep at most one neighbor per direction, choosing the lowest-score candidate.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates.into_iter() {
        let slot = match candidate.direction {
            NeighborDirection::Right => &mut best[0],
            NeighborDirection::Left => &mut best[1],
            NeighborDirection::Up => &mut best[2],
            NeighborDirection::Down => &mut best[3],
        };

        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.score < current.score
                    || (candidate.score == current.score && candidate.distance < current.distance)
            }
        };

        if replace {
            *slot = Some(candidate);
        }
    }

    best.into_iter().flatten().collect()
}

/// Indices of the `k` nearest other points, closest first.
fn nearest_n(points: &[Point2<f32>], query: usize, k: usize) -> Vec<usize> {
    let q = points[query];
    let mut order: Vec<(f32, usize)> = points
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != query)
        .map(|(i, p)| ((*p - q).norm_squared(), i))
        .collect();
    order.sort_by(|a, b| a.0.total_cmp(&b.0));
    order.into_iter().take(k).map(|(_, i)| i).collect()
}

/// Median distance from each point to its nearest neighbour.
pub fn median_nearest_distance(points: &[Point2<f32>]) -> Option<f32> {
    if points.len() < 2 {
        return None;
    }
    let mut dists: Vec<f32> = (0..points.len())
        .filter_map(|i| {
            nearest_n(points, i, 1)
                .first()
                .map(|&j| (points[j] - points[i]).norm())
        })
        .collect();
    dists.sort_by(f32::total_cmp);
    Some(dists[dists.len() / 2])
}

/// Directions of every point's nearest-neighbour edge, for axis estimation.
pub fn nearest_edge_angles(points: &[Point2<f32>]) -> Vec<f32> {
    (0..points.len())
        .filter_map(|i| {
            nearest_n(points, i, 1).first().map(|&j| {
                let v = points[j] - points[i];
                v.y.atan2(v.x)
            })
        })
        .collect()
}

pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>, // For each node, list of neighbors
}

impl GridGraph {
    /// Build the 4-connected graph; `axis_angle` is one grid axis in image
    /// space and fixes which edges count as right/left/up/down.
    pub fn new(nodes: &[GridNode], params: &GridGraphParams, axis_angle: f32) -> Self {
        let positions: Vec<Point2<f32>> = nodes.iter().map(|n| n.position).collect();
        let mut neighbors = Vec::with_capacity(nodes.len());

        for (i, node) in nodes.iter().enumerate() {
            let node_neighbors = nearest_n(&positions, i, params.k_neighbors)
                .into_iter()
                .filter_map(|j| {
                    let other = &nodes[j];
                    if node.orientation.is_some() {
                        is_good_neighbor(node, other, j, params, axis_angle)
                    } else {
                        is_lattice_neighbor(node, other, j, params, axis_angle)
                    }
                })
                .collect();
            neighbors.push(select_neighbors(node_neighbors));
        }

        Self { neighbors }
    }
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.neighbors.len()];
    let mut components = Vec::new();

    for start in 0..graph.neighbors.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);

            for neighbor in &graph.neighbors[node] {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }

        components.push(component);
    }

    components
}

/// BFS integer coordinates `(node, i, j)` with `i` to the right, `j` down.
pub fn assign_grid_coordinates(graph: &GridGraph, component: &[usize]) -> Vec<(usize, i32, i32)> {
    let mut coords = Vec::new();
    let Some(&start) = component.first() else {
        return coords;
    };
    let mut visited = vec![false; graph.neighbors.len()];
    let mut queue = VecDeque::new();
    queue.push_back((start, 0, 0));

    while let Some((node_idx, i, j)) = queue.pop_front() {
        if visited[node_idx] {
            continue;
        }
        visited[node_idx] = true;
        coords.push((node_idx, i, j));

        for neighbor in &graph.neighbors[node_idx] {
            let (di, dj) = match neighbor.direction {
                NeighborDirection::Right => (1, 0),
                NeighborDirection::Left => (-1, 0),
                NeighborDirection::Up => (0, -1),
                NeighborDirection::Down => (0, 1),
            };
            queue.push_back((neighbor.index, i + di, j + dj));
        }
    }

    coords
}

/// Coordinates shifted so the minimum is zero; `None` on duplicates.
pub fn normalized_coordinates(coords: &[(usize, i32, i32)]) -> Option<Vec<(usize, i32, i32)>> {
    let min_i = coords.iter().map(|c| c.1).min()?;
    let min_j = coords.iter().map(|c| c.2).min()?;
    let mut seen = HashMap::with_capacity(coords.len());
    let mut out = Vec::with_capacity(coords.len());
    for &(node, i, j) in coords {
        let key = (i - min_i, j - min_j);
        if seen.insert(key, node).is_some() {
            return None;
        }
        out.push((node, key.0, key.1));
    }
    Some(out)
}

/// Node indices of a complete `board` in row-major order.
///
/// The component must cover exactly `width x height` cells, possibly
/// transposed.
pub fn rectangular_grid(coords: &[(usize, i32, i32)], board: BoardSize) -> Option<Vec<usize>> {
    if coords.len() != board.point_count() || coords.is_empty() {
        return None;
    }
    let coords = normalized_coordinates(coords)?;
    let cols = coords.iter().map(|c| c.1).max()? as usize + 1;
    let rows = coords.iter().map(|c| c.2).max()? as usize + 1;

    let transposed = if (cols, rows) == (board.width, board.height) {
        false
    } else if (rows, cols) == (board.width, board.height) {
        true
    } else {
        return None;
    };

    let mut ordered = vec![usize::MAX; board.point_count()];
    for (node, i, j) in coords {
        let (col, row) = if transposed {
            (j as usize, i as usize)
        } else {
            (i as usize, j as usize)
        };
        ordered[row * board.width + col] = node;
    }
    (!ordered.contains(&usize::MAX)).then_some(ordered)
}
