//! Rendered checkerboard images with known corner positions.

use camcal_core::{Homography, PatternGeometry};
use image::{GrayImage, Luma};
use nalgebra::Point2;

const DARK: f32 = 25.0;
const LIGHT: f32 = 230.0;

/// Render a `geometry` board through `board_to_image`.
///
/// Board coordinates are in squares, with interior corner `(c, r)` at
/// `(c, r)`; so the printed squares span `[-1, cols] × [-1, rows]`. A one
/// square white margin surrounds them and everything else is mid gray.
/// Each pixel is averaged over `supersample²` samples.
pub fn render_board(
    geometry: PatternGeometry,
    board_to_image: &Homography,
    width: u32,
    height: u32,
    supersample: u32,
) -> Option<GrayImage> {
    let image_to_board = board_to_image.inverse()?;
    let cols = geometry.cols() as f64;
    let rows = geometry.rows() as f64;
    let ss = supersample.max(1);
    let inv = 1.0 / ss as f64;

    let shade = |p: Point2<f64>| -> f32 {
        let inside_board = p.x >= -1.0 && p.x < cols && p.y >= -1.0 && p.y < rows;
        if inside_board {
            let parity = (p.x.floor() as i64 + p.y.floor() as i64).rem_euclid(2);
            if parity == 0 {
                DARK
            } else {
                LIGHT
            }
        } else if p.x >= -2.0 && p.x < cols + 1.0 && p.y >= -2.0 && p.y < rows + 1.0 {
            LIGHT
        } else {
            128.0
        }
    };

    Some(GrayImage::from_fn(width, height, |x, y| {
        let mut acc = 0.0f32;
        for sy in 0..ss {
            for sx in 0..ss {
                let px = x as f64 + (sx as f64 + 0.5) * inv - 0.5;
                let py = y as f64 + (sy as f64 + 0.5) * inv - 0.5;
                acc += shade(image_to_board.apply(Point2::new(px, py)));
            }
        }
        Luma([(acc / (ss * ss) as f32).round() as u8])
    }))
}

/// Image positions of the interior corners, row-major.
pub fn project_corners(
    geometry: PatternGeometry,
    board_to_image: &Homography,
) -> Vec<Point2<f32>> {
    geometry
        .object_points()
        .iter()
        .map(|p| {
            let q = board_to_image.apply(Point2::new(p.x, p.y));
            Point2::new(q.x as f32, q.y as f32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    #[test]
    fn squares_alternate_around_corners() {
        let geometry = PatternGeometry::new(3, 3).expect("valid");
        // 20 px squares, origin corner at (40, 40).
        let h = Homography::new(Matrix3::new(20.0, 0.0, 40.0, 0.0, 20.0, 40.0, 0.0, 0.0, 1.0));
        let img = render_board(geometry, &h, 140, 140, 2).expect("render");
        let at = |x: u32, y: u32| img.get_pixel(x, y).0[0];
        // first square is dark, its right neighbour light
        assert!(at(30, 30) < 60);
        assert!(at(50, 30) > 200);
        assert!(at(50, 50) < 60);
        // margin is light, far background is mid gray
        assert!(at(10, 30) > 200);
        assert!(at(5, 5) > 200);
        assert!(at(135, 135) > 100 && at(135, 135) < 160);

        let corners = project_corners(geometry, &h);
        assert_eq!(corners[4], Point2::new(60.0, 60.0));
    }
}
