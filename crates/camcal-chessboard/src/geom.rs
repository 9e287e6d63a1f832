use std::f32::consts::{FRAC_PI_2, PI};

use nalgebra::Vector2;

/// Compute the absolute difference between two angles (radians),
/// normalized into `[0, π]`.
pub fn angle_diff_abs(a: f32, b: f32) -> f32 {
    let two_pi = 2.0 * PI;
    // Normalize angle difference to [-π, π).
    let mut diff = (b - a).rem_euclid(two_pi);
    if diff >= PI {
        diff -= two_pi;
    }
    diff.abs()
}

/// Dominant grid direction of a set of edge vectors, in `[-π/4, π/4)`.
///
/// Grid edges come in four directions 90° apart, so angles are averaged in
/// quadruple-angle space where all four coincide. Edges are weighted by
/// length. Returns `None` when no direction dominates.
pub fn dominant_axis(edges: impl IntoIterator<Item = Vector2<f32>>) -> Option<f32> {
    let mut sum = Vector2::<f32>::zeros();
    let mut weight_sum = 0.0f32;

    for e in edges {
        let w = e.norm();
        if w <= 0.0 {
            continue;
        }
        let four_phi = 4.0 * e.y.atan2(e.x);
        sum += w * Vector2::new(four_phi.cos(), four_phi.sin());
        weight_sum += w;
    }

    if weight_sum <= 0.0 {
        return None;
    }
    let mean = sum / weight_sum;
    if mean.norm_squared() < 1e-4 {
        return None;
    }
    Some(0.25 * mean.y.atan2(mean.x))
}

/// Which of the four board axis directions a vector follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    pub const ALL: [NeighborDirection; 4] = [
        NeighborDirection::Right,
        NeighborDirection::Left,
        NeighborDirection::Up,
        NeighborDirection::Down,
    ];

    pub fn opposite(self) -> Self {
        match self {
            NeighborDirection::Right => NeighborDirection::Left,
            NeighborDirection::Left => NeighborDirection::Right,
            NeighborDirection::Up => NeighborDirection::Down,
            NeighborDirection::Down => NeighborDirection::Up,
        }
    }

    /// Grid step `(di, dj)` taken along this direction.
    pub fn step(self) -> (i32, i32) {
        match self {
            NeighborDirection::Right => (1, 0),
            NeighborDirection::Left => (-1, 0),
            NeighborDirection::Up => (0, -1),
            NeighborDirection::Down => (0, 1),
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            NeighborDirection::Right => 0,
            NeighborDirection::Left => 1,
            NeighborDirection::Up => 2,
            NeighborDirection::Down => 3,
        }
    }
}

/// Classify `edge` against the axis at angle `axis` (the `u` axis; `v` is
/// `u` rotated by +90°). Returns the direction and its angular deviation, or
/// `None` if the edge is more than `tolerance` away from every direction.
pub fn classify_edge(
    axis: f32,
    edge: &Vector2<f32>,
    tolerance: f32,
) -> Option<(NeighborDirection, f32)> {
    let phi = edge.y.atan2(edge.x);
    let candidates = [
        (NeighborDirection::Right, axis),
        (NeighborDirection::Down, axis + FRAC_PI_2),
        (NeighborDirection::Left, axis + PI),
        (NeighborDirection::Up, axis - FRAC_PI_2),
    ];

    let (dir, dev) = candidates
        .into_iter()
        .map(|(dir, a)| (dir, angle_diff_abs(a, phi)))
        .min_by(|a, b| a.1.total_cmp(&b.1))?;

    (dev <= tolerance.abs()).then_some((dir, dev))
}
