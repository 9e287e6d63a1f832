//! Multi-view planar camera calibration.
//!
//! [`calibrate`] takes the accumulated [`CorrespondenceSet`] and solves for a
//! pinhole camera with Brown-Conrady distortion:
//!
//! 1. per view, a normalized DLT homography from board to image;
//! 2. closed-form intrinsics from the homographies (Zhang), falling back to
//!    a centred principal point when the closed form is implausible;
//! 3. per view, a pose decomposed from `K⁻¹H`;
//! 4. Levenberg-Marquardt over intrinsics, distortion and all poses,
//!    minimizing the pixel reprojection error.
//!
//! The procedure has no random component: identical input and options give
//! identical output.

mod bundle;
mod camera;
mod error;
mod lm;
mod pose;
pub mod synthetic;
mod zhang;

use camcal_core::{estimate_homography, point_spread, CorrespondenceSet, ImageSize};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

pub use camera::{BoardPose, CameraModel, Distortion, Intrinsics};
pub use error::{CalibrationError, SolveFailure};
pub use pose::pose_from_homography;
pub use zhang::initial_intrinsics;

use bundle::{BundleProblem, ParamLayout};

/// Accepted views required before a solve is attempted.
pub const MIN_VIEWS: usize = 9;

/// Views whose corners are closer to a line than this are rejected.
const MIN_VIEW_SPREAD: f64 = 1e-6;

/// Options for [`calibrate`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverOptions {
    /// Keep `k3` at zero.
    pub fix_k3: bool,
    /// Keep `p1`, `p2` at zero.
    pub fix_tangential: bool,
    /// LM patience: at most `max_iters * (params + 1)` residual evaluations.
    pub max_iters: usize,
    /// Relative tolerance on the cost reduction.
    pub ftol: f64,
    /// Relative tolerance on the step length.
    pub xtol: f64,
    /// Tolerance on the cosine between residuals and Jacobian columns.
    pub gtol: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            fix_k3: false,
            fix_tangential: false,
            max_iters: 100,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
        }
    }
}

/// Refined pose and fit of one view.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewExtrinsics {
    /// Rotation vector (axis × angle), board to camera.
    pub rotation: [f64; 3],
    /// Translation in board units.
    pub translation: [f64; 3],
    /// RMS reprojection error of this view, pixels.
    pub rms_error: f64,
}

/// Outcome of a successful solve.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CalibrationResult {
    /// RMS reprojection error over all corners of all views, pixels.
    pub rms_error: f64,
    /// Row-major `K`.
    pub camera_matrix: [[f64; 3]; 3],
    /// `[k1, k2, p1, p2, k3]`.
    pub distortion: Vec<f64>,
    pub image_size: ImageSize,
    pub views: Vec<ViewExtrinsics>,
    /// LM residual evaluations spent.
    pub iterations: usize,
}

impl CalibrationResult {
    pub fn camera_model(&self) -> CameraModel {
        let k = &self.camera_matrix;
        let mut coeffs = [0.0; 5];
        for (dst, src) in coeffs.iter_mut().zip(&self.distortion) {
            *dst = *src;
        }
        CameraModel {
            intrinsics: Intrinsics {
                fx: k[0][0],
                fy: k[1][1],
                cx: k[0][2],
                cy: k[1][2],
            },
            distortion: Distortion::from_array(coeffs),
        }
    }
}

fn to_f64(points: &[Point2<f32>]) -> Vec<Point2<f64>> {
    points
        .iter()
        .map(|p| Point2::new(p.x as f64, p.y as f64))
        .collect()
}

/// Calibrate from every view in `set`, all taken at `image_size`.
///
/// Fails with [`CalibrationError::InsufficientViews`] before any numerical
/// work when `set` holds fewer than [`MIN_VIEWS`] views.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(set, opts), fields(views = set.len()))
)]
pub fn calibrate(
    set: &CorrespondenceSet,
    image_size: ImageSize,
    opts: &SolverOptions,
) -> Result<CalibrationResult, CalibrationError> {
    if set.len() < MIN_VIEWS {
        return Err(CalibrationError::InsufficientViews {
            have: set.len(),
            need: MIN_VIEWS,
        });
    }
    if image_size.width == 0 || image_size.height == 0 {
        return Err(SolveFailure::InvalidImageSize {
            width: image_size.width,
            height: image_size.height,
        }
        .into());
    }

    let mut homographies = Vec::with_capacity(set.len());
    for (i, view) in set.views().enumerate() {
        let image = to_f64(view.image_points);
        let spread = point_spread(&image);
        if spread.is_nan() || spread < MIN_VIEW_SPREAD {
            return Err(SolveFailure::DegenerateView { view: i, spread }.into());
        }
        let board: Vec<Point2<f64>> = view
            .object_points
            .iter()
            .map(|p| Point2::new(p.x, p.y))
            .collect();
        let h = estimate_homography(&board, &image)
            .ok_or(SolveFailure::HomographyFailed { view: i })?;
        homographies.push(h.h);
    }

    let intrinsics = initial_intrinsics(&homographies, image_size)?;
    log::debug!(
        "initial intrinsics fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        intrinsics.fx,
        intrinsics.fy,
        intrinsics.cx,
        intrinsics.cy
    );
    let kmtx = intrinsics.matrix();
    let poses = homographies
        .iter()
        .enumerate()
        .map(|(i, h)| {
            pose_from_homography(&kmtx, h).ok_or(SolveFailure::PoseFailed { view: i })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let layout = ParamLayout {
        fix_tangential: opts.fix_tangential,
        fix_k3: opts.fix_k3,
        views: set.len(),
    };
    let initial = CameraModel {
        intrinsics,
        distortion: Distortion::default(),
    };
    let problem = BundleProblem::new(layout, set.views().collect());
    let x0 = layout.pack(&initial, &poses);

    let (x, report) = lm::refine(&problem, x0, opts)?;

    let camera = layout.camera(&x);
    if !camera.intrinsics.is_valid() || !x.iter().all(|v| v.is_finite()) {
        return Err(SolveFailure::NonFinite.into());
    }

    let points = set.point_count().max(1);
    let rms_error = (2.0 * report.final_cost / points as f64).sqrt();
    let views = problem
        .view_rms(&x)
        .into_iter()
        .enumerate()
        .map(|(i, rms)| {
            let pose = layout.pose(&x, i);
            ViewExtrinsics {
                rotation: pose.rotation.scaled_axis().into(),
                translation: pose.translation.into(),
                rms_error: rms,
            }
        })
        .collect();

    log::info!(
        "calibrated {} views: rms {:.4} px after {} evaluations ({:?})",
        set.len(),
        rms_error,
        report.evaluations,
        report.termination
    );

    let k = camera.intrinsics.matrix();
    Ok(CalibrationResult {
        rms_error,
        camera_matrix: [
            [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
            [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
            [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
        ],
        distortion: camera.distortion.to_array().to_vec(),
        image_size,
        views,
        iterations: report.evaluations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_core::PatternGeometry;

    #[test]
    fn partial_options_json_uses_defaults() {
        let json = r#"{"fix_k3": true, "max_iters": 50}"#;
        let opts: SolverOptions = serde_json::from_str(json).expect("parse");
        assert!(opts.fix_k3);
        assert!(!opts.fix_tangential);
        assert_eq!(opts.max_iters, 50);
        assert_eq!(opts.ftol, SolverOptions::default().ftol);
    }

    #[test]
    fn camera_model_reads_back_matrix() {
        let geometry = PatternGeometry::new(9, 6).expect("valid");
        let camera = synthetic::default_camera();
        let store = synthetic::build_store(&camera, geometry, 10, 0.0, 1).expect("store");
        let result = calibrate(store.set(), synthetic::IMAGE_SIZE, &SolverOptions::default())
            .expect("calibrate");
        let back = result.camera_model();
        assert_eq!(back.intrinsics.fx, result.camera_matrix[0][0]);
        assert_eq!(back.distortion.to_array().to_vec(), result.distortion);
        assert_eq!(result.camera_matrix[2], [0.0, 0.0, 1.0]);
    }
}
