//! Board pose from a plane-induced homography.

use nalgebra::{Matrix3, Rotation3, Vector3};

use crate::camera::BoardPose;

/// Decompose `H = K [r1 r2 t]` for a board on `Z = 0`.
///
/// The scale is the mean of the first two column norms of `K⁻¹H`, the
/// rotation is projected onto SO(3), and the sign is chosen so the board
/// lies in front of the camera.
pub fn pose_from_homography(kmtx: &Matrix3<f64>, hmtx: &Matrix3<f64>) -> Option<BoardPose> {
    let k_inv = kmtx.try_inverse()?;

    let k_inv_h1 = k_inv * hmtx.column(0);
    let k_inv_h2 = k_inv * hmtx.column(1);
    let k_inv_h3 = k_inv * hmtx.column(2);

    let norm1 = k_inv_h1.norm();
    let norm2 = k_inv_h2.norm();
    if norm1 <= 1e-12 || norm2 <= 1e-12 {
        return None;
    }
    let mut lambda = 2.0 / (norm1 + norm2);
    if (lambda * k_inv_h3).z < 0.0 {
        lambda = -lambda;
    }

    let r1: Vector3<f64> = lambda * k_inv_h1;
    let r2: Vector3<f64> = lambda * k_inv_h2;
    let t: Vector3<f64> = lambda * k_inv_h3;
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-12 {
        return None;
    }

    let r_mat = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = r_mat.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    if !r_orth.iter().all(|v| v.is_finite()) || !t.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(BoardPose::new(Rotation3::from_matrix_unchecked(r_orth), t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_kmtx() -> Matrix3<f64> {
        Matrix3::new(800.0, 0.0, 640.0, 0.0, 780.0, 360.0, 0.0, 0.0, 1.0)
    }

    fn homography_for(kmtx: &Matrix3<f64>, rot: &Rotation3<f64>, t: &Vector3<f64>) -> Matrix3<f64> {
        let r = rot.matrix();
        let mut hmtx = Matrix3::zeros();
        hmtx.set_column(0, &(kmtx * r.column(0)));
        hmtx.set_column(1, &(kmtx * r.column(1)));
        hmtx.set_column(2, &(kmtx * t));
        hmtx
    }

    #[test]
    fn planar_pose_from_h_recovers_pose() {
        let kmtx = make_kmtx();
        let rot = Rotation3::from_euler_angles(0.1, -0.05, 0.2);
        let t = Vector3::new(0.1, -0.05, 1.0);
        let hmtx = homography_for(&kmtx, &rot, &t);

        let pose = pose_from_homography(&kmtx, &hmtx).expect("pose");
        assert!((pose.translation - t).norm() < 1e-9);
        assert!((pose.rotation.matrix() - rot.matrix()).norm() < 1e-9);
    }

    #[test]
    fn negated_homography_gives_same_pose() {
        let kmtx = make_kmtx();
        let rot = Rotation3::from_euler_angles(-0.2, 0.3, 1.0);
        let t = Vector3::new(-0.3, 0.2, 2.5);
        let hmtx = -3.0 * homography_for(&kmtx, &rot, &t);

        let pose = pose_from_homography(&kmtx, &hmtx).expect("pose");
        assert!(pose.translation.z > 0.0);
        assert!((pose.translation - t).norm() < 1e-9);
        assert!((pose.rotation.matrix() - rot.matrix()).norm() < 1e-9);
    }

    #[test]
    fn rank_deficient_homography_is_rejected() {
        let kmtx = make_kmtx();
        let mut hmtx = Matrix3::identity();
        hmtx.set_column(1, &Vector3::zeros());
        assert!(pose_from_homography(&kmtx, &hmtx).is_none());
    }
}
