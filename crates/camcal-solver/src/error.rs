/// Numerical reason a calibration solve was abandoned.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolveFailure {
    #[error("image size {width}x{height} is not usable as a reference")]
    InvalidImageSize { width: u32, height: u32 },
    #[error("view {view} has degenerate corners (spread {spread:.3e})")]
    DegenerateView { view: usize, spread: f64 },
    #[error("homography estimation failed for view {view}")]
    HomographyFailed { view: usize },
    #[error("closed-form intrinsics are degenerate")]
    DegenerateIntrinsics,
    #[error("pose initialisation failed for view {view}")]
    PoseFailed { view: usize },
    #[error("optimizer stopped: {reason}")]
    OptimizerFailed { reason: String },
    #[error("non-finite residuals or parameters")]
    NonFinite,
    #[error("optimizer did not converge after {iterations} evaluations")]
    NotConverged { iterations: usize },
}

/// Errors returned by [`calibrate`](crate::calibrate).
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("need at least {need} views to calibrate, have {have}")]
    InsufficientViews { have: usize, need: usize },
    #[error("calibration failed: {0}")]
    SolveFailed(#[from] SolveFailure),
}
