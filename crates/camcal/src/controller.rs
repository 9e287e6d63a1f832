//! The acquisition state machine.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use camcal_chessboard::{ChessboardDetector, PatternDetector};
use camcal_core::{CorrespondenceStore, DetectedCorners, PatternGeometry};
use camcal_solver::{calibrate, CalibrationError, CalibrationResult, SolverOptions, MIN_VIEWS};
use image::{DynamicImage, RgbImage};
use log::{info, warn};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::config::CalibConfig;
use crate::error::{AcquisitionError, ExportUnavailable};
use crate::events::AcquisitionEvent;
use crate::export::CalibrationRecord;
use crate::overlay::draw_corners;
use crate::source::{
    CaptureBackend, DeviceOptions, DeviceSource, Frame, ImageBatch, PendingReleases, SourceError,
};

/// Persisted controller state.
///
/// Detection itself is a transition inside [`AcquisitionController::detect`],
/// never a state the controller rests in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionState {
    /// No source active.
    Idle,
    /// A camera or batch is open and may be detected on.
    SourceActive,
    /// The last calibration succeeded and no view was added since.
    Calibrated,
}

/// Result of one detect trigger.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectionOutcome {
    /// Corners were found and accepted; `views` is the new view count.
    Detected {
        corners: DetectedCorners,
        views: usize,
    },
    NotFound,
}

/// One processed image.
#[derive(Clone, Debug)]
pub struct Detection {
    /// File path, `image N`, or `camera N frame M`.
    pub label: String,
    pub frame: Arc<DynamicImage>,
    pub outcome: DetectionOutcome,
}

impl Detection {
    pub fn is_detected(&self) -> bool {
        matches!(self.outcome, DetectionOutcome::Detected { .. })
    }

    /// The frame with the detected corners drawn on it.
    pub fn overlay(&self) -> Option<RgbImage> {
        match &self.outcome {
            DetectionOutcome::Detected { corners, .. } => {
                Some(draw_corners(&self.frame.to_rgb8(), corners))
            }
            DetectionOutcome::NotFound => None,
        }
    }
}

enum ActiveSource {
    None,
    Device(DeviceSource),
    Batch(ImageBatch),
}

struct StoredResult {
    result: CalibrationResult,
    /// Store revision the result was computed from.
    revision: u64,
}

/// Owns the frame source, the correspondence store and the latest result.
///
/// All transitions go through `&mut self`, so accepting a view and solving
/// can never overlap.
pub struct AcquisitionController<D = ChessboardDetector> {
    detector: D,
    backend: Arc<dyn CaptureBackend>,
    device_opts: DeviceOptions,
    solver_opts: SolverOptions,
    store: CorrespondenceStore,
    source: ActiveSource,
    /// Producers of closed cameras that have not exited yet.
    releases: PendingReleases,
    state: AcquisitionState,
    result: Option<StoredResult>,
    events: Vec<AcquisitionEvent>,
}

impl AcquisitionController<ChessboardDetector> {
    /// Controller with the checkerboard detector configured from `config`.
    pub fn from_config(config: &CalibConfig, backend: Arc<dyn CaptureBackend>) -> Self {
        Self::new(
            config.pattern,
            ChessboardDetector::new(config.detector.clone()),
            backend,
        )
        .with_device_options(config.device)
        .with_solver_options(config.solver)
    }
}

impl<D: PatternDetector> AcquisitionController<D> {
    pub fn new(geometry: PatternGeometry, detector: D, backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            detector,
            backend,
            device_opts: DeviceOptions::default(),
            solver_opts: SolverOptions::default(),
            store: CorrespondenceStore::new(geometry),
            source: ActiveSource::None,
            releases: PendingReleases::new(),
            state: AcquisitionState::Idle,
            result: None,
            events: Vec::new(),
        }
    }

    pub fn with_solver_options(mut self, opts: SolverOptions) -> Self {
        self.solver_opts = opts;
        self
    }

    pub fn with_device_options(mut self, opts: DeviceOptions) -> Self {
        self.device_opts = opts;
        self
    }

    fn emit(&mut self, event: AcquisitionEvent) {
        match &event {
            AcquisitionEvent::CameraFailed { .. }
            | AcquisitionEvent::StreamTerminated { .. }
            | AcquisitionEvent::CalibrationFailed { .. } => warn!("{event}"),
            _ => info!("{event}"),
        }
        self.events.push(event);
    }

    /// Take the events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<AcquisitionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn geometry(&self) -> PatternGeometry {
        self.store.geometry()
    }

    pub fn view_count(&self) -> usize {
        self.store.count()
    }

    pub fn store(&self) -> &CorrespondenceStore {
        &self.store
    }

    /// Index of the open camera, if any.
    pub fn device_index(&self) -> Option<u32> {
        match &self.source {
            ActiveSource::Device(dev) => Some(dev.index()),
            _ => None,
        }
    }

    /// `(cursor, total)` of the loaded batch, if any.
    pub fn batch_progress(&self) -> Option<(usize, usize)> {
        match &self.source {
            ActiveSource::Batch(batch) => Some((batch.cursor(), batch.len())),
            _ => None,
        }
    }

    pub fn can_detect(&self) -> bool {
        match &self.source {
            ActiveSource::None => false,
            ActiveSource::Device(dev) => dev.is_streaming(),
            ActiveSource::Batch(batch) => !batch.is_exhausted(),
        }
    }

    pub fn can_calibrate(&self) -> bool {
        self.store.count() >= MIN_VIEWS
    }

    pub fn can_export(&self) -> bool {
        self.fresh_result().is_some()
    }

    /// Latest successful calibration, fresh or stale.
    pub fn result(&self) -> Option<&CalibrationResult> {
        self.result.as_ref().map(|r| &r.result)
    }

    /// `true` when a result exists but views changed after it was computed.
    pub fn result_is_stale(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(|r| r.revision != self.store.revision())
    }

    fn fresh_result(&self) -> Option<&CalibrationResult> {
        self.result
            .as_ref()
            .filter(|r| r.revision == self.store.revision())
            .map(|r| &r.result)
    }

    /// Re-derive the resting state after a change to source or store.
    fn settle(&mut self) {
        self.state = if matches!(self.source, ActiveSource::None) {
            AcquisitionState::Idle
        } else if self.state == AcquisitionState::Calibrated && self.fresh_result().is_some() {
            AcquisitionState::Calibrated
        } else {
            AcquisitionState::SourceActive
        };
    }

    /// Close the active source; a camera gets `stall_timeout_ms` to let go.
    fn drop_source(&mut self) -> bool {
        let grace = Duration::from_millis(self.device_opts.stall_timeout_ms);
        match std::mem::replace(&mut self.source, ActiveSource::None) {
            ActiveSource::None => false,
            ActiveSource::Device(dev) => {
                dev.release(&mut self.releases, grace);
                true
            }
            ActiveSource::Batch(_) => true,
        }
    }

    /// `true` while the producer of a closed camera `index` is still blocked
    /// in the backend. Such an index cannot be opened yet.
    pub fn is_releasing(&self, index: u32) -> bool {
        self.releases.is_releasing(index)
    }

    /// Open camera `index`, replacing any active source.
    ///
    /// Collected views are kept. On failure the controller is left `Idle`.
    /// An index whose previous producer is still releasing is refused.
    pub fn open_device(&mut self, index: u32) -> Result<(), AcquisitionError> {
        self.drop_source();
        match DeviceSource::open(
            Arc::clone(&self.backend),
            index,
            self.device_opts,
            &mut self.releases,
        ) {
            Ok(dev) => {
                self.source = ActiveSource::Device(dev);
                self.state = AcquisitionState::SourceActive;
                self.emit(AcquisitionEvent::CameraOpened { index });
                Ok(())
            }
            Err(err) => {
                self.state = AcquisitionState::Idle;
                let reason = match &err {
                    SourceError::SourceUnavailable { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                self.emit(AcquisitionEvent::CameraFailed { index, reason });
                Err(err.into())
            }
        }
    }

    /// Start a new batch: any camera is stopped and collected views cleared.
    pub fn load_batch(&mut self, batch: ImageBatch) {
        self.drop_source();
        self.clear_views();
        let images = batch.len();
        if !batch.is_empty() {
            self.source = ActiveSource::Batch(batch);
        }
        self.settle();
        self.emit(AcquisitionEvent::BatchLoaded { images });
    }

    /// Decode `paths` and [`load_batch`](Self::load_batch) them.
    ///
    /// A file that fails to decode leaves the controller untouched.
    pub fn load_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<(), AcquisitionError> {
        let batch = ImageBatch::load(paths)?;
        self.load_batch(batch);
        Ok(())
    }

    /// Stop acquisition. Collected views and the result are kept.
    pub fn close_source(&mut self) {
        if self.drop_source() {
            self.emit(AcquisitionEvent::SourceClosed);
        }
        self.settle();
    }

    fn clear_views(&mut self) {
        let had_views = self.store.count() > 0;
        self.store.reset();
        if had_views {
            self.emit(AcquisitionEvent::ViewCountChanged { count: 0 });
        }
    }

    /// Switch pattern. A different geometry closes the source and clears
    /// every collected view.
    pub fn set_geometry(&mut self, geometry: PatternGeometry) {
        if geometry == self.store.geometry() {
            return;
        }
        if self.drop_source() {
            self.emit(AcquisitionEvent::SourceClosed);
        }
        let had_views = self.store.count() > 0;
        self.store.reset_with(geometry);
        if had_views {
            self.emit(AcquisitionEvent::ViewCountChanged { count: 0 });
        }
        self.state = AcquisitionState::Idle;
        self.emit(AcquisitionEvent::PatternChanged { geometry });
    }

    /// Pull the next image from the active source and try to detect on it.
    ///
    /// A camera frame is discarded after one attempt, found or not, so the
    /// next trigger waits for a fresh one. A batch image is consumed
    /// regardless of the outcome.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self), fields(views = self.store.count()))
    )]
    pub fn detect(&mut self) -> Result<Detection, AcquisitionError> {
        let geometry = self.store.geometry();
        let (label, frame) = match &mut self.source {
            ActiveSource::None => return Err(AcquisitionError::NoActiveSource),
            ActiveSource::Device(dev) => match dev.poll() {
                Ok(frame) => {
                    dev.discard(frame.sequence);
                    (format!("camera {} frame {}", dev.index(), frame.sequence), frame)
                }
                Err(err) => return Err(self.on_device_error(err)),
            },
            ActiveSource::Batch(batch) => {
                let total = batch.len();
                let (index, item, frame) = batch.next_frame()?;
                let label = item.label.clone();
                self.emit(AcquisitionEvent::BatchProgress {
                    index: index + 1,
                    total,
                });
                (label, frame)
            }
        };

        let outcome = self.detect_frame(&label, &frame, geometry);
        if let ActiveSource::Batch(batch) = &self.source {
            if batch.is_exhausted() {
                self.emit(AcquisitionEvent::BatchFinished);
            }
        }

        Ok(Detection {
            label,
            frame: frame.image,
            outcome: outcome?,
        })
    }

    fn detect_frame(
        &mut self,
        label: &str,
        frame: &Frame,
        geometry: PatternGeometry,
    ) -> Result<DetectionOutcome, AcquisitionError> {
        let Some(corners) = self.detector.detect(&frame.image, geometry) else {
            self.emit(AcquisitionEvent::DetectionFailed {
                label: label.to_string(),
            });
            return Ok(DetectionOutcome::NotFound);
        };

        let views = self.store.accept(&corners, frame.size())?;
        self.emit(AcquisitionEvent::DetectionSucceeded {
            label: label.to_string(),
            corners: corners.clone(),
        });
        self.emit(AcquisitionEvent::ViewCountChanged { count: views });
        if self.state == AcquisitionState::Calibrated {
            self.state = AcquisitionState::SourceActive;
        }
        Ok(DetectionOutcome::Detected { corners, views })
    }

    /// A lost stream is let go without waiting; a producer stuck in `read`
    /// stays parked until it returns.
    fn on_device_error(&mut self, err: SourceError) -> AcquisitionError {
        if let SourceError::StreamTerminated { index, reason } = &err {
            let event = AcquisitionEvent::StreamTerminated {
                index: *index,
                reason: reason.clone(),
            };
            if let ActiveSource::Device(dev) =
                std::mem::replace(&mut self.source, ActiveSource::None)
            {
                dev.release(&mut self.releases, Duration::ZERO);
            }
            self.settle();
            self.emit(event);
        }
        err.into()
    }

    /// Solve from every collected view.
    ///
    /// Below [`MIN_VIEWS`] nothing is solved. A failed solve keeps the
    /// previous result, if any.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self), fields(views = self.store.count()))
    )]
    pub fn calibrate(&mut self) -> Result<&CalibrationResult, AcquisitionError> {
        let Some(image_size) = self.store.image_size() else {
            let err = CalibrationError::InsufficientViews {
                have: 0,
                need: MIN_VIEWS,
            };
            self.emit(AcquisitionEvent::CalibrationFailed {
                reason: err.to_string(),
            });
            return Err(err.into());
        };

        match calibrate(self.store.set(), image_size, &self.solver_opts) {
            Ok(result) => {
                self.emit(AcquisitionEvent::CalibrationSucceeded {
                    rms_error: result.rms_error,
                });
                self.state = AcquisitionState::Calibrated;
                let stored = self.result.insert(StoredResult {
                    result,
                    revision: self.store.revision(),
                });
                Ok(&stored.result)
            }
            Err(err) => {
                self.emit(AcquisitionEvent::CalibrationFailed {
                    reason: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    /// The fresh result in its exchange layout.
    pub fn export(&self) -> Result<CalibrationRecord, AcquisitionError> {
        match &self.result {
            None => Err(AcquisitionError::ExportUnavailable(ExportUnavailable::NoResult)),
            Some(r) if r.revision != self.store.revision() => {
                Err(AcquisitionError::ExportUnavailable(ExportUnavailable::Stale))
            }
            Some(r) => Ok(CalibrationRecord::from(&r.result)),
        }
    }

    /// Export and write to `path` as pretty JSON.
    pub fn save_result(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<CalibrationRecord, AcquisitionError> {
        let record = self.export()?;
        record.write_json(path.as_ref())?;
        info!("result saved to {}", path.as_ref().display());
        Ok(record)
    }
}
