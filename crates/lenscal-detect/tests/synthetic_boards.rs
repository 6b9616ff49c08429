use lenscal_core::{estimate_homography, object_points, BoardSize, GrayImage, PatternKind};
use lenscal_detect::{
    detector_for, ChessboardDetector, ChessboardParams, CornerRefiner, DetectError,
    DetectorParams, PatternDetector, SubPixParams, SubPixRefiner,
};
use nalgebra::Point2;

const MARGIN: usize = 40;

/// Board with `inner` corners; corner (k, m) sits at `MARGIN - 0.5 + square * (k + 1)`.
fn render_chessboard(inner: BoardSize, square: usize) -> GrayImage {
    let w = 2 * MARGIN + (inner.width + 1) * square;
    let h = 2 * MARGIN + (inner.height + 1) * square;
    let mut img = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let on_board = (MARGIN..w - MARGIN).contains(&x) && (MARGIN..h - MARGIN).contains(&y);
            let dark = on_board && ((x - MARGIN) / square + (y - MARGIN) / square) % 2 == 0;
            img.data[y * w + x] = if dark { 0 } else { 255 };
        }
    }
    img
}

fn chessboard_truth(inner: BoardSize, square: usize) -> Vec<Point2<f32>> {
    let mut out = Vec::new();
    for m in 0..inner.height {
        for k in 0..inner.width {
            out.push(Point2::new(
                MARGIN as f32 - 0.5 + (square * (k + 1)) as f32,
                MARGIN as f32 - 0.5 + (square * (m + 1)) as f32,
            ));
        }
    }
    out
}

fn render_disks(w: usize, h: usize, centers: &[Point2<f32>], radius: f32) -> GrayImage {
    let mut img = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let dark = centers.iter().any(|c| {
                let (dx, dy) = (x as f32 - c.x, y as f32 - c.y);
                dx * dx + dy * dy <= radius * radius
            });
            img.data[y * w + x] = if dark { 0 } else { 255 };
        }
    }
    img
}

/// Largest distance from a detected point to the nearest ground-truth point.
fn max_match_error(detected: &[Point2<f32>], truth: &[Point2<f32>]) -> f32 {
    detected
        .iter()
        .map(|d| {
            truth
                .iter()
                .map(|t| (d - t).norm())
                .fold(f32::INFINITY, f32::min)
        })
        .fold(0.0, f32::max)
}

/// The board ordering is valid when one homography maps the object grid onto
/// the detected points.
fn ordering_residual(kind: PatternKind, board: BoardSize, detected: &[Point2<f32>]) -> f64 {
    let src: Vec<Point2<f64>> = object_points(kind, board, 1.0)
        .iter()
        .map(|p| Point2::new(p.x as f64, p.y as f64))
        .collect();
    let dst: Vec<Point2<f64>> = detected
        .iter()
        .map(|p| Point2::new(p.x as f64, p.y as f64))
        .collect();
    let h = estimate_homography(&src, &dst).expect("homography");
    src.iter()
        .zip(&dst)
        .map(|(s, d)| (h.apply(*s) - d).norm())
        .fold(0.0, f64::max)
}

#[test]
fn chessboard_is_found_in_row_major_order() {
    let board = BoardSize::new(7, 5);
    let img = render_chessboard(board, 30);
    let detector = ChessboardDetector::new(ChessboardParams::default()).with_fast_check(true);

    let points = detector.detect(&img.view(), board).expect("board found");
    assert_eq!(points.len(), board.point_count());
    let truth = chessboard_truth(board, 30);
    assert!(max_match_error(&points, &truth) <= 1.0);
    assert!(ordering_residual(PatternKind::Chessboard, board, &points) < 0.75);
}

#[test]
fn refined_corners_land_on_square_boundaries() {
    let board = BoardSize::new(6, 4);
    let img = render_chessboard(board, 32);
    let detector = detector_for(PatternKind::Chessboard, &DetectorParams::default(), false);
    let mut points = detector.detect(&img.view(), board).expect("board found");

    let refiner = SubPixRefiner::new(SubPixParams::default());
    refiner.refine(&img.view(), &mut points).expect("refined");
    assert!(max_match_error(&points, &chessboard_truth(board, 32)) < 0.1);
}

#[test]
fn wrong_board_size_is_not_found() {
    let board = BoardSize::new(7, 5);
    let img = render_chessboard(board, 30);
    let detector = ChessboardDetector::default();
    let err = detector
        .detect(&img.view(), BoardSize::new(9, 6))
        .unwrap_err();
    assert_eq!(err, DetectError::NotFound);
}

#[test]
fn blank_frame_fails_precheck() {
    let mut img = GrayImage::new(200, 160);
    img.data.iter_mut().for_each(|v| *v = 200);
    let detector = ChessboardDetector::default().with_fast_check(true);
    let err = detector.detect(&img.view(), BoardSize::new(7, 5)).unwrap_err();
    assert!(matches!(err, DetectError::PrecheckRejected { seen: 0, .. }));
}

#[test]
fn symmetric_circle_grid_is_found() {
    let board = BoardSize::new(4, 3);
    let centers: Vec<Point2<f32>> = (0..board.point_count())
        .map(|k| {
            Point2::new(
                (MARGIN + 28 * (k % board.width)) as f32,
                (MARGIN + 28 * (k / board.width)) as f32,
            )
        })
        .collect();
    let img = render_disks(164, 136, &centers, 7.0);
    let detector = detector_for(PatternKind::CirclesGrid, &DetectorParams::default(), false);

    let points = detector.detect(&img.view(), board).expect("grid found");
    assert_eq!(points.len(), 12);
    assert!(max_match_error(&points, &centers) < 0.01);
    assert!(ordering_residual(PatternKind::CirclesGrid, board, &points) < 0.01);
}

#[test]
fn asymmetric_circle_grid_is_found() {
    let board = BoardSize::new(4, 5);
    let step = 15.0f32;
    let centers: Vec<Point2<f32>> = object_points(PatternKind::AsymmetricCirclesGrid, board, step)
        .iter()
        .map(|p| Point2::new(MARGIN as f32 + p.x, MARGIN as f32 + p.y))
        .collect();
    let img = render_disks(185, 140, &centers, 5.0);
    let detector = detector_for(
        PatternKind::AsymmetricCirclesGrid,
        &DetectorParams::default(),
        false,
    );

    let points = detector.detect(&img.view(), board).expect("grid found");
    assert_eq!(points.len(), 20);
    assert!(max_match_error(&points, &centers) < 0.01);
    assert!(ordering_residual(PatternKind::AsymmetricCirclesGrid, board, &points) < 0.01);
}
