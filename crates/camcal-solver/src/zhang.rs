//! Closed-form intrinsics from plane homographies.

use camcal_core::ImageSize;
use nalgebra::{DMatrix, Matrix2, Matrix3, SVector, Vector2};

use crate::camera::Intrinsics;
use crate::error::SolveFailure;

/// Build the 6-vector v_ij(H) as in Zhang's method.
fn v_ij(hmtx: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = hmtx.column(i);
    let hj = hmtx.column(j);

    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Pixel normalisation: image centre to the origin, `(w + h) / 2` to 1.
fn pixel_normalization(size: ImageSize) -> (Matrix3<f64>, f64) {
    let w = size.width as f64;
    let h = size.height as f64;
    let s = 2.0 / (w + h);
    (
        Matrix3::new(s, 0.0, -s * w * 0.5, 0.0, s, -s * h * 0.5, 0.0, 0.0, 1.0),
        s,
    )
}

/// Zhang's closed form, solving `V b = 0` for the image of the absolute conic.
///
/// Skew is estimated as part of `B` and then dropped.
fn closed_form(hmtxs: &[Matrix3<f64>]) -> Option<Intrinsics> {
    if hmtxs.len() < 3 {
        return None;
    }

    let m = hmtxs.len();
    let mut vmtx = DMatrix::<f64>::zeros(2 * m, 6);
    for (k, hmtx) in hmtxs.iter().enumerate() {
        let v11 = v_ij(hmtx, 0, 0);
        let v22 = v_ij(hmtx, 1, 1);
        let v12 = v_ij(hmtx, 0, 1);

        // Row 2k: v_12^T
        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        // Row 2k+1: (v_11 - v_22)^T
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let svd = vmtx.svd(false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let b = v_t.row(min_idx);

    let b11 = b[0];
    let b12 = b[1];
    let b22 = b[2];
    let b13 = b[3];
    let b23 = b[4];
    let b33 = b[5];

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-9 {
        return None;
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda / b11 <= 0.0 || lambda * b11 / denom <= 0.0 {
        return None;
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    Some(Intrinsics {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
    })
}

/// Focal lengths with the principal point fixed at the (normalized) origin.
///
/// With `K = diag(fx, fy, 1)` the two orthogonality constraints per view
/// are linear in `a = 1/fx²`, `b = 1/fy²`; solved in the least-squares sense.
fn centered(hmtxs: &[Matrix3<f64>]) -> Option<Intrinsics> {
    let mut ata = Matrix2::<f64>::zeros();
    let mut atb = Vector2::<f64>::zeros();

    for h in hmtxs {
        let c1 = h.column(0);
        let c2 = h.column(1);
        let rows = [
            (
                Vector2::new(c1[0] * c2[0], c1[1] * c2[1]),
                -c1[2] * c2[2],
            ),
            (
                Vector2::new(c1[0] * c1[0] - c2[0] * c2[0], c1[1] * c1[1] - c2[1] * c2[1]),
                -(c1[2] * c1[2] - c2[2] * c2[2]),
            ),
        ];
        for (a, rhs) in rows {
            ata += a * a.transpose();
            atb += a * rhs;
        }
    }

    let x = ata.lu().solve(&atb)?;
    if x[0] <= 0.0 || x[1] <= 0.0 {
        return None;
    }
    Some(Intrinsics {
        fx: 1.0 / x[0].sqrt(),
        fy: 1.0 / x[1].sqrt(),
        cx: 0.0,
        cy: 0.0,
    })
}

/// Initial intrinsics from board-to-pixel homographies.
///
/// Homographies are first mapped into normalized pixel coordinates. The full
/// closed form is tried first; if it yields an implausible camera (principal
/// point outside the image, extreme aspect ratio) the centred estimate is
/// used instead.
pub fn initial_intrinsics(
    homographies: &[Matrix3<f64>],
    size: ImageSize,
) -> Result<Intrinsics, SolveFailure> {
    let (t, s) = pixel_normalization(size);
    let half_w = s * size.width as f64 * 0.5;
    let half_h = s * size.height as f64 * 0.5;

    let normalized: Vec<Matrix3<f64>> = homographies
        .iter()
        .filter_map(|h| {
            let hn = t * h;
            let norm = hn.norm();
            (norm > 0.0 && norm.is_finite()).then(|| hn / norm)
        })
        .collect();
    if normalized.len() != homographies.len() {
        return Err(SolveFailure::DegenerateIntrinsics);
    }

    let plausible = |k: &Intrinsics| {
        let aspect = k.fx / k.fy;
        k.is_valid()
            && k.cx.abs() <= half_w
            && k.cy.abs() <= half_h
            && (0.25..=4.0).contains(&aspect)
    };

    let k_n = closed_form(&normalized)
        .filter(plausible)
        .or_else(|| {
            log::debug!("closed-form intrinsics rejected, using centred estimate");
            centered(&normalized).filter(plausible)
        })
        .ok_or(SolveFailure::DegenerateIntrinsics)?;

    Ok(Intrinsics {
        fx: k_n.fx / s,
        fy: k_n.fy / s,
        cx: k_n.cx / s + size.width as f64 * 0.5,
        cy: k_n.cy / s + size.height as f64 * 0.5,
    })
}
