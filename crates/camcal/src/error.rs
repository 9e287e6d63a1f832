use std::path::PathBuf;

use camcal_core::StoreError;
use camcal_solver::CalibrationError;

use crate::source::SourceError;

/// Reading or writing a JSON file.
#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl IoError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    pub(crate) fn json(path: impl Into<PathBuf>) -> impl FnOnce(serde_json::Error) -> Self {
        let path = path.into();
        move |source| Self::Json { path, source }
    }
}

/// Why [`export`](crate::AcquisitionController::export) has nothing to give.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportUnavailable {
    /// No calibration has succeeded yet.
    NoResult,
    /// Views were added or removed after the last successful calibration.
    Stale,
}

impl std::fmt::Display for ExportUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoResult => f.write_str("no calibration result"),
            Self::Stale => f.write_str("calibration result is stale, calibrate again"),
        }
    }
}

/// Errors surfaced by the acquisition controller.
///
/// All of them are recoverable: the controller stays usable after returning
/// any of these.
#[derive(thiserror::Error, Debug)]
pub enum AcquisitionError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error("no frame source is active")]
    NoActiveSource,
    #[error("export unavailable: {0}")]
    ExportUnavailable(ExportUnavailable),
    #[error(transparent)]
    Io(#[from] IoError),
}
