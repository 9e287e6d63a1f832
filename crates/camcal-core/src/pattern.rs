use std::fmt;

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Smallest accepted number of interior corners along either board axis.
pub const MIN_PATTERN_DIM: u32 = 3;
/// Largest accepted number of interior corners along either board axis.
pub const MAX_PATTERN_DIM: u32 = 20;

/// Errors produced while building pattern-level values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error(
        "pattern {axis} = {value} is outside [{min}, {max}]",
        min = MIN_PATTERN_DIM,
        max = MAX_PATTERN_DIM
    )]
    DimensionOutOfRange { axis: &'static str, value: u32 },
    #[error("expected {expected} corners for the pattern, got {got}")]
    CornerCountMismatch { expected: usize, got: usize },
}

/// Checkerboard size in interior corners, `cols × rows`.
///
/// Values are validated on construction and on deserialization, so a
/// `PatternGeometry` always satisfies `MIN_PATTERN_DIM <= dim <= MAX_PATTERN_DIM`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawGeometry", into = "RawGeometry")]
pub struct PatternGeometry {
    cols: u32,
    rows: u32,
}

#[derive(Serialize, Deserialize)]
struct RawGeometry {
    cols: u32,
    rows: u32,
}

impl TryFrom<RawGeometry> for PatternGeometry {
    type Error = PatternError;

    fn try_from(raw: RawGeometry) -> Result<Self, Self::Error> {
        PatternGeometry::new(raw.cols, raw.rows)
    }
}

impl From<PatternGeometry> for RawGeometry {
    fn from(g: PatternGeometry) -> Self {
        RawGeometry {
            cols: g.cols,
            rows: g.rows,
        }
    }
}

fn check_dim(axis: &'static str, value: u32) -> Result<u32, PatternError> {
    if (MIN_PATTERN_DIM..=MAX_PATTERN_DIM).contains(&value) {
        Ok(value)
    } else {
        Err(PatternError::DimensionOutOfRange { axis, value })
    }
}

impl PatternGeometry {
    pub fn new(cols: u32, rows: u32) -> Result<Self, PatternError> {
        Ok(Self {
            cols: check_dim("cols", cols)?,
            rows: check_dim("rows", rows)?,
        })
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    #[inline]
    pub fn corner_count(&self) -> usize {
        (self.cols * self.rows) as usize
    }

    /// Planar board coordinates in unit squares, z = 0.
    ///
    /// Ordered row-major: index `r * cols + c` holds `(c, r, 0)`. Detected
    /// corners use the same ordering.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        (0..self.rows)
            .flat_map(|r| (0..self.cols).map(move |c| Point3::new(c as f64, r as f64, 0.0)))
            .collect()
    }
}

impl Default for PatternGeometry {
    /// 9 × 6, the usual OpenCV sample board.
    fn default() -> Self {
        Self { cols: 9, rows: 6 }
    }
}

impl fmt::Display for PatternGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Subpixel corner positions of one board view, in pattern order.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedCorners {
    geometry: PatternGeometry,
    points: Vec<Point2<f32>>,
}

impl DetectedCorners {
    /// Fails unless `points.len() == geometry.corner_count()`.
    pub fn new(geometry: PatternGeometry, points: Vec<Point2<f32>>) -> Result<Self, PatternError> {
        let expected = geometry.corner_count();
        if points.len() != expected {
            return Err(PatternError::CornerCountMismatch {
                expected,
                got: points.len(),
            });
        }
        Ok(Self { geometry, points })
    }

    pub fn geometry(&self) -> PatternGeometry {
        self.geometry
    }

    pub fn points(&self) -> &[Point2<f32>] {
        &self.points
    }

    /// Corner at board position `(col, row)`.
    pub fn at(&self, col: u32, row: u32) -> Option<Point2<f32>> {
        if col >= self.geometry.cols || row >= self.geometry.rows {
            return None;
        }
        self.points
            .get((row * self.geometry.cols + col) as usize)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn into_points(self) -> Vec<Point2<f32>> {
        self.points
    }
}
