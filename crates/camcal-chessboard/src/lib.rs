//! Checkerboard detector built on top of ChESS corners and `camcal-core`.
//!
//! ## Quickstart
//!
//! ```no_run
//! use camcal_chessboard::{ChessboardDetector, PatternDetector};
//! use camcal_core::PatternGeometry;
//!
//! let img = image::open("board.png").unwrap();
//! let geometry = PatternGeometry::new(9, 6).unwrap();
//! let detector = ChessboardDetector::default();
//! if let Some(corners) = detector.detect(&img, geometry) {
//!     println!("found {} corners", corners.len());
//! }
//! ```
//!
//! Pipeline:
//! 1. Convert to 8-bit gray and stretch contrast between two percentiles.
//! 2. Detect ChESS corner candidates (response relative to the image maximum).
//! 3. For every candidate, take kd-tree neighbours within the spacing window
//!    and at most `side_ratio_max` times the nearest neighbour distance.
//! 4. Estimate the board axis from the edge directions (quadruple angle mean)
//!    and label edges right/left/up/down; keep one edge per direction and only
//!    edges confirmed from both ends.
//! 5. BFS each connected component into integer lattice coordinates.
//! 6. Accept a component that is exactly the `cols × rows` lattice (possibly
//!    transposed), order it row-major with `+col` towards `+x`.
//! 7. Refine every corner with the iterative gradient-orthogonality solver.

mod detector;
mod geom;
mod gridgraph;
mod normalize;
mod params;
mod subpix;
pub mod synthetic;

pub use detector::{gray_view, ChessboardDetector, PatternDetector};
pub use geom::NeighborDirection;
pub use gridgraph::{assemble_grid, GridGraph, NodeNeighbor};
pub use normalize::stretch_contrast;
pub use params::{ChessboardParams, GridGraphParams, SubpixParams};
pub use subpix::{refine_corner, refine_corners};
