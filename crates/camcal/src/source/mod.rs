//! Frame sources: a polled capture device or a finite batch of images.

mod batch;
mod device;
mod replay;

use std::path::PathBuf;
use std::sync::Arc;

use camcal_core::ImageSize;
use image::DynamicImage;

pub use batch::{BatchItem, ImageBatch};
pub use device::{
    CaptureBackend, CaptureDevice, DeviceOptions, DeviceSource, PendingReleases, ReadError,
    MAX_DEVICE_INDEX,
};
pub use replay::{ReplayBackend, ReplayTape};

/// One image handed out by a source.
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: Arc<DynamicImage>,
    /// Monotonic per source, starting at 0.
    pub sequence: u64,
}

impl Frame {
    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.image.width(), self.image.height())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    /// The device could not be opened.
    #[error("camera {index} unavailable: {reason}")]
    SourceUnavailable { index: u32, reason: String },
    /// The device stopped producing frames without a stop request.
    #[error("camera {index} stream terminated: {reason}")]
    StreamTerminated { index: u32, reason: String },
    #[error("all {total} images processed")]
    BatchExhausted { total: usize },
    /// The source was closed on request.
    #[error("source closed")]
    Closed,
    #[error("failed to load {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
