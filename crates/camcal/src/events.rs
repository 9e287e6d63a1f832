//! Status notifications for a presentation layer.

use std::fmt;

use camcal_core::{DetectedCorners, PatternGeometry};

/// Something the controller did or observed.
///
/// `Display` renders the user-facing status line.
#[derive(Clone, Debug, PartialEq)]
pub enum AcquisitionEvent {
    CameraOpened { index: u32 },
    /// The camera could not be opened.
    CameraFailed { index: u32, reason: String },
    /// The camera stopped delivering frames without being asked to.
    StreamTerminated { index: u32, reason: String },
    SourceClosed,
    BatchLoaded { images: usize },
    /// Detection is about to run on batch image `index` (1-based) of `total`.
    BatchProgress { index: usize, total: usize },
    BatchFinished,
    DetectionSucceeded { label: String, corners: DetectedCorners },
    DetectionFailed { label: String },
    ViewCountChanged { count: usize },
    PatternChanged { geometry: PatternGeometry },
    CalibrationSucceeded { rms_error: f64 },
    CalibrationFailed { reason: String },
}

impl fmt::Display for AcquisitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CameraOpened { index } => write!(f, "camera {index} opened"),
            Self::CameraFailed { index, reason } => {
                write!(f, "failed to open camera {index}: {reason}")
            }
            Self::StreamTerminated { index, reason } => write!(
                f,
                "camera {index} connection terminated ({reason}); permission may have been revoked"
            ),
            Self::SourceClosed => f.write_str("source closed"),
            Self::BatchLoaded { images } => write!(f, "loaded {images} images"),
            Self::BatchProgress { index, total } => write!(f, "detecting {index}/{total}"),
            Self::BatchFinished => f.write_str("all images processed, consider calibrating"),
            Self::DetectionSucceeded { label, corners } => {
                write!(f, "{label}: detected {} corners", corners.len())
            }
            Self::DetectionFailed { label } => {
                write!(f, "{label}: no checkerboard found, adjust the pose and retry")
            }
            Self::ViewCountChanged { count } => write!(f, "collected {count} views"),
            Self::PatternChanged { geometry } => {
                write!(f, "pattern set to {geometry}, collected views cleared")
            }
            Self::CalibrationSucceeded { rms_error } => {
                write!(f, "calibration done, reprojection error = {rms_error:.3}")
            }
            Self::CalibrationFailed { reason } => write!(f, "calibration failed: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_lines() {
        assert_eq!(
            AcquisitionEvent::BatchProgress { index: 3, total: 10 }.to_string(),
            "detecting 3/10"
        );
        assert_eq!(
            AcquisitionEvent::CalibrationSucceeded { rms_error: 0.12345 }.to_string(),
            "calibration done, reprojection error = 0.123"
        );
        let geometry = PatternGeometry::new(7, 5).expect("valid");
        assert_eq!(
            AcquisitionEvent::PatternChanged { geometry }.to_string(),
            "pattern set to 7x5, collected views cleared"
        );
    }
}
