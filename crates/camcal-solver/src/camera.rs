//! Pinhole intrinsics with Brown-Conrady distortion.

use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Pinhole camera intrinsics, zero skew.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Intrinsics {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
}

impl Intrinsics {
    /// Finite values and strictly positive focal lengths.
    pub fn is_valid(&self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx > 1e-12
            && self.fy > 1e-12
    }

    /// `K = [[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    #[inline]
    pub fn normalized_to_pixel(&self, xy: [f64; 2]) -> Point2<f64> {
        Point2::new(self.fx * xy[0] + self.cx, self.fy * xy[1] + self.cy)
    }
}

/// Brown-Conrady radial-tangential distortion coefficients.
///
/// Serialized and exported in the order `[k1, k2, p1, p2, k3]`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    /// Apply distortion to normalized coordinates.
    pub fn distort_normalized(&self, xy: [f64; 2]) -> [f64; 2] {
        let [x, y] = xy;
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        [x * radial + x_tan, y * radial + y_tan]
    }

    pub fn to_array(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn from_array(c: [f64; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }
}

/// Rigid transform from board coordinates into the camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardPose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl BoardPose {
    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * p.coords + self.translation)
    }
}

/// Intrinsics plus distortion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraModel {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
}

impl CameraModel {
    /// Project a camera-frame point; `None` behind (or on) the image plane.
    pub fn project_camera_point(&self, pc: &Point3<f64>) -> Option<Point2<f64>> {
        if pc.z <= 1e-12 {
            return None;
        }
        let xn = [pc.x / pc.z, pc.y / pc.z];
        let xd = self.distortion.distort_normalized(xn);
        let pix = self.intrinsics.normalized_to_pixel(xd);
        (pix.x.is_finite() && pix.y.is_finite()).then_some(pix)
    }

    /// Project a board point seen under `pose`.
    pub fn project(&self, pose: &BoardPose, board_point: &Point3<f64>) -> Option<Point2<f64>> {
        self.project_camera_point(&pose.transform_point(board_point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn zero_distortion_is_identity() {
        let d = Distortion::default();
        assert_eq!(d.distort_normalized([0.3, -0.2]), [0.3, -0.2]);
    }

    #[test]
    fn radial_distortion_scales_with_radius() {
        let d = Distortion {
            k1: -0.2,
            ..Distortion::default()
        };
        let [x, y] = d.distort_normalized([0.5, 0.0]);
        assert_abs_diff_eq!(x, 0.5 * (1.0 - 0.2 * 0.25), epsilon = 1e-12);
        assert_eq!(y, 0.0);
    }

    #[test]
    fn projects_principal_axis_to_principal_point() {
        let cam = CameraModel {
            intrinsics: Intrinsics {
                fx: 800.0,
                fy: 780.0,
                cx: 320.0,
                cy: 240.0,
            },
            distortion: Distortion {
                k1: 0.1,
                ..Distortion::default()
            },
        };
        let pose = BoardPose::new(Rotation3::identity(), Vector3::new(0.0, 0.0, 10.0));
        let p = cam.project(&pose, &Point3::origin()).expect("in front");
        assert_abs_diff_eq!(p.x, 320.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, 240.0, epsilon = 1e-12);

        let behind = BoardPose::new(Rotation3::identity(), Vector3::new(0.0, 0.0, -1.0));
        assert!(cam.project(&behind, &Point3::origin()).is_none());
    }
}
