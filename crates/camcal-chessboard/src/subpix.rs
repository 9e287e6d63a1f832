//! Gradient-orthogonality corner refinement.
//!
//! At a saddle point every image gradient in the neighbourhood is
//! orthogonal to the vector from the corner to the gradient sample:
//! `g_k · (p_k - c) = 0`. Stacking these over a weighted window gives the
//! 2×2 normal system `G c = b`, re-solved around the updated estimate until
//! it stops moving.

use camcal_core::{sample_bilinear, GrayImageView};
use nalgebra::{Matrix2, Point2, Vector2};

use crate::params::SubpixParams;

/// Refine one corner. The input position is returned unchanged if the
/// system is singular, or if the estimate leaves the search window.
pub fn refine_corner(
    img: &GrayImageView<'_>,
    start: Point2<f32>,
    params: &SubpixParams,
) -> Point2<f32> {
    let win = params.half_window.max(1) as i32;
    let inv_w2 = 1.0 / (win * win) as f32;
    let eps2 = params.epsilon * params.epsilon;
    let max_iters = params.max_iters.max(1);

    let mut c = start;
    for _ in 0..max_iters {
        let mut g = Matrix2::<f32>::zeros();
        let mut b = Vector2::<f32>::zeros();

        for dy in -win..=win {
            for dx in -win..=win {
                let w = (-((dx * dx + dy * dy) as f32) * inv_w2).exp();
                let px = c.x + dx as f32;
                let py = c.y + dy as f32;

                let gx = 0.5
                    * (sample_bilinear(img, px + 1.0, py) - sample_bilinear(img, px - 1.0, py));
                let gy = 0.5
                    * (sample_bilinear(img, px, py + 1.0) - sample_bilinear(img, px, py - 1.0));

                let gxx = gx * gx * w;
                let gxy = gx * gy * w;
                let gyy = gy * gy * w;

                g[(0, 0)] += gxx;
                g[(0, 1)] += gxy;
                g[(1, 1)] += gyy;
                b.x += gxx * px + gxy * py;
                b.y += gxy * px + gyy * py;
            }
        }
        g[(1, 0)] = g[(0, 1)];

        let det = g[(0, 0)] * g[(1, 1)] - g[(0, 1)] * g[(0, 1)];
        if det.abs() <= f32::EPSILON * (g[(0, 0)] + g[(1, 1)]).powi(2).max(1.0) {
            break;
        }
        let Some(next) = g.try_inverse().map(|inv| inv * b) else {
            break;
        };

        let step = (next.x - c.x).powi(2) + (next.y - c.y).powi(2);
        c = Point2::new(next.x, next.y);
        if !c.x.is_finite() || !c.y.is_finite() {
            return start;
        }
        if step <= eps2 {
            break;
        }
    }

    let moved = (c - start).abs();
    if moved.x > win as f32 || moved.y > win as f32 {
        return start;
    }
    c
}

/// Refine every corner in place.
pub fn refine_corners(
    img: &GrayImageView<'_>,
    corners: &mut [Point2<f32>],
    params: &SubpixParams,
) {
    for p in corners.iter_mut() {
        *p = refine_corner(img, *p, params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_core::GrayImage;

    /// Anti-aliased saddle at `(cx, cy)`: quadrants about a rotated axis pair.
    fn render_saddle(w: usize, h: usize, cx: f32, cy: f32, theta: f32) -> GrayImage {
        let (s, c) = theta.sin_cos();
        let ss = 8;
        let mut data = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                let mut acc = 0.0f32;
                for sy in 0..ss {
                    for sx in 0..ss {
                        let fx = x as f32 + (sx as f32 + 0.5) / ss as f32 - 0.5 - cx;
                        let fy = y as f32 + (sy as f32 + 0.5) / ss as f32 - 0.5 - cy;
                        let u = c * fx + s * fy;
                        let v = -s * fx + c * fy;
                        acc += if (u >= 0.0) == (v >= 0.0) { 220.0 } else { 30.0 };
                    }
                }
                data[y * w + x] = (acc / (ss * ss) as f32).round() as u8;
            }
        }
        GrayImage::from_raw(w, h, data).expect("buffer")
    }

    #[test]
    fn converges_to_true_saddle() {
        let truth = Point2::new(20.37f32, 18.81f32);
        let img = render_saddle(40, 40, truth.x, truth.y, 0.2);
        let start = Point2::new(21.0, 18.0);
        let refined = refine_corner(&img.view(), start, &SubpixParams::default());
        let err = (refined - truth).norm();
        assert!(err < 0.2, "refined {refined:?}, truth {truth:?}, err {err}");
    }

    #[test]
    fn corner_near_border_is_not_pulled_by_the_edge() {
        let truth = Point2::new(3.4f32, 20.6f32);
        let img = render_saddle(40, 40, truth.x, truth.y, 0.15);
        let start = Point2::new(4.0, 20.0);
        let refined = refine_corner(&img.view(), start, &SubpixParams::default());
        let err = (refined - truth).norm();
        assert!(err < 0.3, "refined {refined:?}, truth {truth:?}, err {err}");
    }

    #[test]
    fn flat_patch_keeps_start() {
        let img = GrayImage::from_raw(16, 16, vec![128; 256]).expect("buffer");
        let start = Point2::new(8.0, 8.0);
        assert_eq!(
            refine_corner(&img.view(), start, &SubpixParams::default()),
            start
        );
    }

    #[test]
    fn refinement_is_deterministic() {
        let img = render_saddle(32, 32, 15.6, 16.2, -0.4);
        let mut a = vec![Point2::new(15.0, 16.0), Point2::new(16.0, 17.0)];
        let mut b = a.clone();
        refine_corners(&img.view(), &mut a, &SubpixParams::default());
        refine_corners(&img.view(), &mut b, &SubpixParams::default());
        assert_eq!(a, b);
    }
}
