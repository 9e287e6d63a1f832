use camcal_chessboard::synthetic::{project_corners, render_board};
use camcal_chessboard::{ChessboardDetector, PatternDetector};
use camcal_core::{Homography, PatternGeometry};
use image::DynamicImage;
use nalgebra::{Matrix3, Point2};

/// Board centred in a 640x480 frame, `square` px per square, rotated by
/// `angle_deg`, with a mild projective tilt.
fn board_pose(
    geometry: PatternGeometry,
    square: f64,
    angle_deg: f64,
    tilt: [f64; 2],
) -> Homography {
    let (s, c) = angle_deg.to_radians().sin_cos();
    let half_c = (geometry.cols() as f64 - 1.0) * 0.5;
    let half_r = (geometry.rows() as f64 - 1.0) * 0.5;
    let center = Matrix3::new(1.0, 0.0, -half_c, 0.0, 1.0, -half_r, 0.0, 0.0, 1.0);
    let similarity = Matrix3::new(
        square * c,
        -square * s,
        320.0,
        square * s,
        square * c,
        240.0,
        0.0,
        0.0,
        1.0,
    );
    let projective = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, tilt[0], tilt[1], 1.0);
    Homography::new(similarity * projective * center)
}

fn max_error(found: &[Point2<f32>], truth: &[Point2<f32>]) -> f32 {
    found
        .iter()
        .zip(truth)
        .map(|(a, b)| (a - b).norm())
        .fold(0.0, f32::max)
}

#[test]
fn detects_rendered_board_with_subpixel_accuracy() {
    let geometry = PatternGeometry::new(9, 6).expect("valid");
    let h = board_pose(geometry, 32.0, 4.0, [0.0, 0.0]);
    let gray = render_board(geometry, &h, 640, 480, 4).expect("render");
    let img = DynamicImage::ImageLuma8(gray);

    let corners = ChessboardDetector::default()
        .detect(&img, geometry)
        .expect("board found");
    assert_eq!(corners.len(), 54);

    let truth = project_corners(geometry, &h);
    let err = max_error(corners.points(), &truth);
    assert!(err < 0.3, "max corner error {err}");
}

#[test]
fn detects_tilted_board() {
    let geometry = PatternGeometry::new(7, 5).expect("valid");
    let h = board_pose(geometry, 36.0, -8.0, [0.02, -0.015]);
    let gray = render_board(geometry, &h, 640, 480, 4).expect("render");
    let img = DynamicImage::ImageLuma8(gray);

    let corners = ChessboardDetector::default()
        .detect(&img, geometry)
        .expect("board found");
    let truth = project_corners(geometry, &h);
    assert!(max_error(corners.points(), &truth) < 0.3);
}

#[test]
fn wrong_pattern_size_is_not_found() {
    let geometry = PatternGeometry::new(9, 6).expect("valid");
    let h = board_pose(geometry, 32.0, 0.0, [0.0, 0.0]);
    let img = DynamicImage::ImageLuma8(render_board(geometry, &h, 640, 480, 2).expect("render"));

    let other = PatternGeometry::new(8, 6).expect("valid");
    assert!(ChessboardDetector::default().detect(&img, other).is_none());
}

#[test]
fn detection_is_reproducible() {
    let geometry = PatternGeometry::new(9, 6).expect("valid");
    let h = board_pose(geometry, 30.0, 12.0, [0.01, 0.01]);
    let img = DynamicImage::ImageLuma8(render_board(geometry, &h, 640, 480, 3).expect("render"));

    let detector = ChessboardDetector::default();
    let a = detector.detect(&img, geometry);
    let b = detector.detect(&img, geometry);
    assert!(a.is_some());
    assert_eq!(a, b);
}
