//! Checkerboard camera calibration.
//!
//! This crate ties the pieces together:
//!
//! - [`source`]: a capture device polled on its own thread, or a finite
//!   [`ImageBatch`](source::ImageBatch);
//! - [`AcquisitionController`]: pulls images, detects the board, accumulates
//!   views and calibrates on request;
//! - [`CalibrationRecord`]: the exported result.
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use camcal::source::ReplayBackend;
//! use camcal::{AcquisitionController, CalibConfig};
//!
//! let mut ctl = AcquisitionController::from_config(
//!     &CalibConfig::default(),
//!     Arc::new(ReplayBackend::new()),
//! );
//! ctl.load_files(&["view01.png", "view02.png"]).unwrap();
//! while ctl.can_detect() {
//!     ctl.detect().unwrap();
//! }
//! if ctl.can_calibrate() {
//!     let result = ctl.calibrate().unwrap();
//!     println!("rms = {:.3}", result.rms_error);
//!     ctl.save_result(camcal::default_result_filename()).unwrap();
//! }
//! ```

mod config;
mod controller;
mod error;
mod events;
mod export;
mod overlay;
pub mod source;

pub use config::CalibConfig;
pub use controller::{AcquisitionController, AcquisitionState, Detection, DetectionOutcome};
pub use error::{AcquisitionError, ExportUnavailable, IoError};
pub use events::AcquisitionEvent;
pub use export::{default_result_filename, CalibrationRecord};
pub use overlay::draw_corners;

pub use camcal_chessboard::{ChessboardDetector, ChessboardParams, PatternDetector};
pub use camcal_core::{
    init_with_level, CorrespondenceStore, DetectedCorners, ImageSize, PatternGeometry,
};
#[cfg(feature = "tracing")]
pub use camcal_core::init_tracing;
pub use camcal_solver::{CalibrationError, CalibrationResult, SolverOptions, MIN_VIEWS};
