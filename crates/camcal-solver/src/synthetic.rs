//! Deterministic synthetic calibration data.
//!
//! A fixed camera observes the board under a family of poses generated from
//! trigonometric sequences, so every run of a test sees the same data.

use camcal_core::{CorrespondenceStore, DetectedCorners, ImageSize, PatternGeometry};
use nalgebra::{Point2, Rotation3, Vector3};

use crate::camera::{BoardPose, CameraModel, Distortion, Intrinsics};

/// Reference image size for [`default_camera`].
pub const IMAGE_SIZE: ImageSize = ImageSize {
    width: 640,
    height: 480,
};

pub fn default_camera() -> CameraModel {
    CameraModel {
        intrinsics: Intrinsics {
            fx: 800.0,
            fy: 780.0,
            cx: 320.0,
            cy: 240.0,
        },
        distortion: Distortion {
            k1: -0.12,
            k2: 0.03,
            p1: 0.0008,
            p2: -0.0005,
            k3: 0.0,
        },
    }
}

/// `count` board poses, centred on the optical axis about 18 squares away.
pub fn board_poses(geometry: PatternGeometry, count: usize) -> Vec<BoardPose> {
    let center = Vector3::new(
        (geometry.cols() - 1) as f64 * 0.5,
        (geometry.rows() - 1) as f64 * 0.5,
        0.0,
    );
    (0..count)
        .map(|i| {
            let f = i as f64;
            let rotation = Rotation3::from_euler_angles(
                0.35 * (f * 1.3).sin(),
                0.35 * (f * 0.9).cos(),
                0.1 * (f * 0.7).sin(),
            );
            let offset = Vector3::new(
                (f * 1.1).cos(),
                0.7 * (f * 1.7).sin(),
                18.0 + 2.0 * (f * 0.5).sin(),
            );
            BoardPose::new(rotation, offset - rotation * center)
        })
        .collect()
}

/// Row-major image corners of `geometry` under `pose`.
pub fn project_view(
    camera: &CameraModel,
    pose: &BoardPose,
    geometry: PatternGeometry,
) -> Option<Vec<Point2<f32>>> {
    geometry
        .object_points()
        .iter()
        .map(|p| {
            camera
                .project(pose, p)
                .map(|q| Point2::new(q.x as f32, q.y as f32))
        })
        .collect()
}

/// Uniform value in `[-1, 1)` from `(seed, index)`, splitmix64.
pub fn jitter(seed: u64, index: u64) -> f64 {
    let mut z = seed
        .wrapping_add(index.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 11) as f64 / (1u64 << 52) as f64 - 1.0
}

/// A store holding `views` projected views with uniform pixel noise of
/// amplitude `noise_px`.
pub fn build_store(
    camera: &CameraModel,
    geometry: PatternGeometry,
    views: usize,
    noise_px: f64,
    seed: u64,
) -> Option<CorrespondenceStore> {
    let mut store = CorrespondenceStore::new(geometry);
    let mut index = 0u64;
    for pose in board_poses(geometry, views) {
        let mut points = project_view(camera, &pose, geometry)?;
        for p in &mut points {
            p.x += (noise_px * jitter(seed, index)) as f32;
            p.y += (noise_px * jitter(seed, index + 1)) as f32;
            index += 2;
        }
        let corners = DetectedCorners::new(geometry, points).ok()?;
        store.accept(&corners, IMAGE_SIZE).ok()?;
    }
    Some(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_is_bounded_and_deterministic() {
        for i in 0..1000 {
            let v = jitter(7, i);
            assert!((-1.0..1.0).contains(&v));
            assert_eq!(v, jitter(7, i));
        }
        assert_ne!(jitter(7, 0), jitter(8, 0));
    }

    #[test]
    fn views_stay_inside_the_image() {
        let geometry = PatternGeometry::new(9, 6).expect("valid");
        let camera = default_camera();
        for pose in board_poses(geometry, 15) {
            let pts = project_view(&camera, &pose, geometry).expect("in front");
            for p in pts {
                assert!(p.x > 10.0 && p.x < IMAGE_SIZE.width as f32 - 10.0, "{p:?}");
                assert!(p.y > 10.0 && p.y < IMAGE_SIZE.height as f32 - 10.0, "{p:?}");
            }
        }
    }
}
