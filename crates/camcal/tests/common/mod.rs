#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use camcal::PatternGeometry;
use camcal_chessboard::synthetic::render_board;
use camcal_core::Homography;
use image::DynamicImage;
use nalgebra::{Matrix3, Rotation3, Vector3};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;
pub const FOCAL: f64 = 800.0;

/// Board distance from the camera, in squares.
const DISTANCE: f64 = 26.0;

/// `(rx, ry, rz)` per view.
const ORIENTATIONS: [(f64, f64, f64); 12] = [
    (0.25, 0.0, 0.05),
    (-0.25, 0.0, -0.05),
    (0.0, 0.25, 0.1),
    (0.0, -0.25, -0.1),
    (0.2, 0.2, 0.0),
    (-0.2, 0.2, 0.15),
    (0.2, -0.2, -0.15),
    (-0.2, -0.2, 0.08),
    (0.12, -0.05, 0.2),
    (-0.05, 0.15, -0.2),
    (0.18, 0.1, -0.03),
    (-0.1, -0.18, 0.12),
];

pub fn geometry() -> PatternGeometry {
    PatternGeometry::new(9, 6).expect("valid")
}

pub fn camera_matrix() -> Matrix3<f64> {
    Matrix3::new(
        FOCAL,
        0.0,
        WIDTH as f64 * 0.5,
        0.0,
        FOCAL,
        HEIGHT as f64 * 0.5,
        0.0,
        0.0,
        1.0,
    )
}

/// Pinhole projection of the board centred on the optical axis.
fn view_homography(geometry: PatternGeometry, k: usize) -> Homography {
    let (rx, ry, rz) = ORIENTATIONS[k % ORIENTATIONS.len()];
    let rot = Rotation3::from_euler_angles(rx, ry, rz);
    let centre = Vector3::new(
        (geometry.cols() as f64 - 1.0) * 0.5,
        (geometry.rows() as f64 - 1.0) * 0.5,
        0.0,
    );
    let t = Vector3::new(0.0, 0.0, DISTANCE) - rot * centre;
    let m = rot.matrix();
    let rt = Matrix3::from_columns(&[m.column(0).into_owned(), m.column(1).into_owned(), t]);
    Homography::new(camera_matrix() * rt)
}

pub fn render_view(geometry: PatternGeometry, k: usize) -> DynamicImage {
    let h = view_homography(geometry, k);
    DynamicImage::ImageLuma8(render_board(geometry, &h, WIDTH, HEIGHT, 2).expect("render"))
}

/// The twelve 9x6 views, rendered once per test binary.
pub fn views() -> &'static [DynamicImage] {
    static VIEWS: OnceLock<Vec<DynamicImage>> = OnceLock::new();
    VIEWS.get_or_init(|| {
        (0..ORIENTATIONS.len())
            .map(|k| render_view(geometry(), k))
            .collect()
    })
}

pub fn blank() -> DynamicImage {
    DynamicImage::ImageLuma8(image::GrayImage::from_pixel(WIDTH, HEIGHT, image::Luma([128])))
}

/// Write the first `n` views as PNG files under `dir`.
pub fn write_views(dir: &Path, n: usize) -> Vec<PathBuf> {
    views()
        .iter()
        .take(n)
        .enumerate()
        .map(|(k, img)| {
            let path = dir.join(format!("view{k:02}.png"));
            img.save(&path).expect("save png");
            path
        })
        .collect()
}
