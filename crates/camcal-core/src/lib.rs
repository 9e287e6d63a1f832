//! Core types and utilities for checkerboard camera calibration.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete corner detector, image decoder or solver; the
//! detector and solver crates build on the types defined here.
//!
//! - [`PatternGeometry`]: validated checkerboard size and its canonical
//!   planar object points.
//! - [`DetectedCorners`]: one image's ordered, refined corner set.
//! - [`CorrespondenceStore`]: append-only accumulation of views.
//! - [`Homography`] / [`estimate_homography`]: normalized DLT.

mod correspondence;
mod homography;
mod image;
mod logger;
mod pattern;

pub use correspondence::{CorrespondenceSet, CorrespondenceStore, StoreError, View};
pub use homography::{estimate_homography, point_spread, Homography};
pub use image::{sample_bilinear, GrayImage, GrayImageView, ImageSize};
pub use pattern::{
    DetectedCorners, PatternError, PatternGeometry, MAX_PATTERN_DIM, MIN_PATTERN_DIM,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
