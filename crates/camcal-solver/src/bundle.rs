//! Joint refinement of intrinsics, distortion and every view's pose.

use camcal_core::View;
use nalgebra::{DMatrix, DVector, Point2, Rotation3, Vector3};

use crate::camera::{BoardPose, CameraModel, Distortion, Intrinsics};

const POSE_PARAMS: usize = 6;

/// Layout of the flat parameter vector.
///
/// `[fx, fy, cx, cy, k1, k2, (p1, p2), (k3)]` followed by
/// `[rx, ry, rz, tx, ty, tz]` (rotation vector, translation) per view.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ParamLayout {
    pub fix_tangential: bool,
    pub fix_k3: bool,
    pub views: usize,
}

impl ParamLayout {
    pub fn shared(&self) -> usize {
        6 + if self.fix_tangential { 0 } else { 2 } + if self.fix_k3 { 0 } else { 1 }
    }

    pub fn len(&self) -> usize {
        self.shared() + POSE_PARAMS * self.views
    }

    fn pose_offset(&self, view: usize) -> usize {
        self.shared() + POSE_PARAMS * view
    }

    pub fn pack(&self, camera: &CameraModel, poses: &[BoardPose]) -> DVector<f64> {
        let mut x = DVector::zeros(self.len());
        let k = &camera.intrinsics;
        let d = &camera.distortion;
        let mut shared = vec![k.fx, k.fy, k.cx, k.cy, d.k1, d.k2];
        if !self.fix_tangential {
            shared.extend([d.p1, d.p2]);
        }
        if !self.fix_k3 {
            shared.push(d.k3);
        }
        x.rows_mut(0, shared.len()).copy_from_slice(&shared);

        for (i, pose) in poses.iter().enumerate() {
            let o = self.pose_offset(i);
            x.fixed_rows_mut::<3>(o).copy_from(&pose.rotation.scaled_axis());
            x.fixed_rows_mut::<3>(o + 3).copy_from(&pose.translation);
        }
        x
    }

    pub fn camera(&self, x: &DVector<f64>) -> CameraModel {
        let mut distortion = Distortion {
            k1: x[4],
            k2: x[5],
            ..Distortion::default()
        };
        let mut next = 6;
        if !self.fix_tangential {
            distortion.p1 = x[next];
            distortion.p2 = x[next + 1];
            next += 2;
        }
        if !self.fix_k3 {
            distortion.k3 = x[next];
        }
        CameraModel {
            intrinsics: Intrinsics {
                fx: x[0],
                fy: x[1],
                cx: x[2],
                cy: x[3],
            },
            distortion,
        }
    }

    pub fn pose(&self, x: &DVector<f64>, view: usize) -> BoardPose {
        let o = self.pose_offset(view);
        let rvec: Vector3<f64> = x.fixed_rows::<3>(o).into_owned();
        let t: Vector3<f64> = x.fixed_rows::<3>(o + 3).into_owned();
        BoardPose::new(Rotation3::from_scaled_axis(rvec), t)
    }
}

/// Reprojection residuals `projected - observed`, two rows per corner.
pub(crate) struct BundleProblem<'a> {
    layout: ParamLayout,
    views: Vec<View<'a>>,
    row_offsets: Vec<usize>,
    rows: usize,
}

impl<'a> BundleProblem<'a> {
    pub fn new(layout: ParamLayout, views: Vec<View<'a>>) -> Self {
        let mut row_offsets = Vec::with_capacity(views.len());
        let mut rows = 0;
        for v in &views {
            row_offsets.push(rows);
            rows += 2 * v.image_points.len();
        }
        Self {
            layout,
            views,
            row_offsets,
            rows,
        }
    }

    /// Write one view's residuals into `out` (length `2 * points`).
    ///
    /// A corner that projects behind the camera yields NaN so that the step
    /// producing it is rejected.
    fn view_residuals(
        &self,
        camera: &CameraModel,
        pose: &BoardPose,
        view: usize,
        out: &mut [f64],
    ) {
        let v = &self.views[view];
        for (k, (obs, obj)) in v.image_points.iter().zip(v.object_points).enumerate() {
            let pred = camera
                .project(pose, obj)
                .unwrap_or(Point2::new(f64::NAN, f64::NAN));
            out[2 * k] = pred.x - obs.x as f64;
            out[2 * k + 1] = pred.y - obs.y as f64;
        }
    }

    fn view_rows(&self, view: usize) -> std::ops::Range<usize> {
        let start = self.row_offsets[view];
        start..start + 2 * self.views[view].image_points.len()
    }

    pub fn num_params(&self) -> usize {
        self.layout.len()
    }

    pub fn num_residuals(&self) -> usize {
        self.rows
    }

    /// Per-view RMS of the point distances at `x`.
    pub fn view_rms(&self, x: &DVector<f64>) -> Vec<f64> {
        let r = self.residuals(x);
        (0..self.views.len())
            .map(|i| {
                let rows = self.view_rows(i);
                let n = rows.len() / 2;
                let ss: f64 = r.as_slice()[rows].iter().map(|v| v * v).sum();
                (ss / n.max(1) as f64).sqrt()
            })
            .collect()
    }
}

#[inline]
fn step_for(v: f64) -> f64 {
    1e-6 * v.abs().max(1.0)
}

impl BundleProblem<'_> {
    pub fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let camera = self.layout.camera(x);
        let mut r = DVector::zeros(self.rows);
        for i in 0..self.views.len() {
            let pose = self.layout.pose(x, i);
            let rows = self.view_rows(i);
            self.view_residuals(&camera, &pose, i, &mut r.as_mut_slice()[rows]);
        }
        r
    }

    /// Central differences. Shared parameters touch every row; a pose
    /// parameter only touches the rows of its own view.
    pub fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.rows, self.layout.len());
        let mut xp = x.clone();

        for p in 0..self.layout.shared() {
            let h = step_for(x[p]);
            xp[p] = x[p] + h;
            let r_plus = self.residuals(&xp);
            xp[p] = x[p] - h;
            let r_minus = self.residuals(&xp);
            xp[p] = x[p];
            jac.set_column(p, &((r_plus - r_minus) / (2.0 * h)));
        }

        let camera = self.layout.camera(x);
        for view in 0..self.views.len() {
            let rows = self.view_rows(view);
            let n = rows.len();
            let mut r_plus = vec![0.0; n];
            let mut r_minus = vec![0.0; n];
            let o = self.layout.pose_offset(view);
            for p in o..o + POSE_PARAMS {
                let h = step_for(x[p]);
                xp[p] = x[p] + h;
                self.view_residuals(&camera, &self.layout.pose(&xp, view), view, &mut r_plus);
                xp[p] = x[p] - h;
                self.view_residuals(&camera, &self.layout.pose(&xp, view), view, &mut r_minus);
                xp[p] = x[p];
                for (k, row) in rows.clone().enumerate() {
                    jac[(row, p)] = (r_plus[k] - r_minus[k]) / (2.0 * h);
                }
            }
        }
        jac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> CameraModel {
        CameraModel {
            intrinsics: Intrinsics {
                fx: 800.0,
                fy: 780.0,
                cx: 320.0,
                cy: 240.0,
            },
            distortion: Distortion {
                k1: -0.1,
                k2: 0.02,
                p1: 0.001,
                p2: -0.002,
                k3: 0.003,
            },
        }
    }

    fn poses() -> Vec<BoardPose> {
        vec![
            BoardPose::new(
                Rotation3::from_euler_angles(0.1, -0.2, 0.3),
                Vector3::new(-4.0, -3.0, 20.0),
            ),
            BoardPose::new(
                Rotation3::from_euler_angles(-0.3, 0.1, 0.0),
                Vector3::new(-3.0, -2.0, 18.0),
            ),
        ]
    }

    #[test]
    fn layout_round_trips_parameters() {
        let layout = ParamLayout {
            fix_tangential: false,
            fix_k3: false,
            views: 2,
        };
        assert_eq!(layout.shared(), 9);
        assert_eq!(layout.len(), 21);
        let x = layout.pack(&camera(), &poses());
        assert_eq!(layout.camera(&x), camera());
        for (i, pose) in poses().iter().enumerate() {
            let back = layout.pose(&x, i);
            assert!((back.rotation.matrix() - pose.rotation.matrix()).norm() < 1e-12);
            assert!((back.translation - pose.translation).norm() < 1e-12);
        }
    }

    #[test]
    fn fixed_coefficients_are_dropped() {
        let layout = ParamLayout {
            fix_tangential: true,
            fix_k3: true,
            views: 1,
        };
        assert_eq!(layout.shared(), 6);
        let x = layout.pack(&camera(), &poses()[..1]);
        let cam = layout.camera(&x);
        assert_eq!(cam.distortion.p1, 0.0);
        assert_eq!(cam.distortion.p2, 0.0);
        assert_eq!(cam.distortion.k3, 0.0);
        assert_eq!(cam.distortion.k1, -0.1);
    }

    #[test]
    fn residuals_vanish_at_ground_truth() {
        let cam = camera();
        let poses = poses();
        let object: Vec<nalgebra::Point3<f64>> = (0..12)
            .map(|i| nalgebra::Point3::new((i % 4) as f64, (i / 4) as f64, 0.0))
            .collect();
        let images: Vec<Vec<nalgebra::Point2<f32>>> = poses
            .iter()
            .map(|pose| {
                object
                    .iter()
                    .map(|p| {
                        let q = cam.project(pose, p).expect("visible");
                        nalgebra::Point2::new(q.x as f32, q.y as f32)
                    })
                    .collect()
            })
            .collect();
        let views: Vec<View<'_>> = images
            .iter()
            .map(|img| View {
                image_points: img,
                object_points: &object,
            })
            .collect();

        let layout = ParamLayout {
            fix_tangential: false,
            fix_k3: false,
            views: 2,
        };
        let problem = BundleProblem::new(layout, views);
        let x = layout.pack(&cam, &poses);
        assert_eq!(problem.num_residuals(), 48);
        let r = problem.residuals(&x);
        assert!(r.amax() < 1e-3, "max residual {}", r.amax());

        let jac = problem.jacobian(&x);
        assert_eq!(jac.shape(), (48, 21));
        // pose of view 1 does not affect rows of view 0
        assert!(jac.view((0, 15), (24, 6)).amax() == 0.0);
        // fx moves x residuals only
        assert!(jac[(0, 0)].abs() > 0.0);
        assert_eq!(jac[(1, 0)], 0.0);
    }
}
