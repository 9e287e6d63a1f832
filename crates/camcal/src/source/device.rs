//! Live capture: one producer thread, one single-slot hand-off.
//!
//! The producer blocks on the device and publishes each frame into a slot
//! that holds at most one frame; a newer frame replaces an unread one. The
//! consumer reads the slot as often as it likes and discards the frame once
//! it has been used.
//!
//! A producer that cannot be joined promptly, because the backend is stuck in
//! `open` or `read`, is parked in [`PendingReleases`]. Its index cannot be
//! opened again until that thread has exited.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::DynamicImage;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{Frame, SourceError};

/// Highest accepted device index.
pub const MAX_DEVICE_INDEX: u32 = 9;

/// A blocking frame reader opened by a [`CaptureBackend`].
///
/// The device is released when the value is dropped.
pub trait CaptureDevice {
    fn read(&mut self) -> Result<DynamicImage, ReadError>;
}

/// Opens capture devices by index.
///
/// `open` runs on the producer thread, so the device itself never crosses
/// threads.
pub trait CaptureBackend: Send + Sync {
    fn open(&self, index: u32) -> Result<Box<dyn CaptureDevice>, String>;
}

/// A failed device read.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ReadError(pub String);

/// Bounded waits on the device.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceOptions {
    /// How long `open` waits for the device to come up.
    pub open_timeout_ms: u64,
    /// How long `poll` waits for a frame before declaring the stream dead.
    pub stall_timeout_ms: u64,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            open_timeout_ms: 5_000,
            stall_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Status {
    Opening,
    Streaming,
    Unavailable(String),
    Lost(String),
    Stopped,
}

#[derive(Debug)]
struct Slot {
    frame: Option<Frame>,
    status: Status,
    published: u64,
    /// Set by the producer as its last action.
    exited: bool,
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Slot>,
    changed: Condvar,
    stop: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        // a poisoned slot only means the producer panicked mid-update
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: Status) {
        self.lock().status = status;
        self.changed.notify_all();
    }

    /// Wait until `done` holds or `deadline` passes.
    fn wait_until(
        &self,
        deadline: Instant,
        mut done: impl FnMut(&Slot) -> bool,
    ) -> MutexGuard<'_, Slot> {
        let mut slot = self.lock();
        while !done(&slot) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            slot = self
                .changed
                .wait_timeout(slot, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        slot
    }
}

fn produce(backend: Arc<dyn CaptureBackend>, index: u32, shared: Arc<Shared>) {
    let end = stream(backend.as_ref(), index, &shared);
    let mut slot = shared.lock();
    if !matches!(slot.status, Status::Lost(_)) {
        slot.status = end;
    }
    slot.exited = true;
    drop(slot);
    shared.changed.notify_all();
}

/// Open the device and publish frames until a stop or a failed read.
fn stream(backend: &dyn CaptureBackend, index: u32, shared: &Shared) -> Status {
    let mut device = match backend.open(index) {
        Ok(device) => device,
        Err(reason) => return Status::Unavailable(reason),
    };
    if shared.stop.load(Ordering::Acquire) {
        return Status::Stopped;
    }
    shared.set_status(Status::Streaming);

    let mut sequence = 0u64;
    loop {
        if shared.stop.load(Ordering::Acquire) {
            break Status::Stopped;
        }
        match device.read() {
            Ok(image) => {
                if shared.stop.load(Ordering::Acquire) {
                    break Status::Stopped;
                }
                let mut slot = shared.lock();
                slot.frame = Some(Frame {
                    image: Arc::new(image),
                    sequence,
                });
                slot.published += 1;
                drop(slot);
                shared.changed.notify_all();
                sequence += 1;
            }
            Err(ReadError(reason)) => {
                if shared.stop.load(Ordering::Acquire) {
                    break Status::Stopped;
                }
                break Status::Lost(reason);
            }
        }
    }
}

/// Producer threads that were let go before they released their device,
/// keyed by device index.
#[derive(Debug, Default)]
pub struct PendingReleases {
    workers: HashMap<u32, JoinHandle<()>>,
}

impl PendingReleases {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while the producer parked for `index` is still running.
    pub fn is_releasing(&self, index: u32) -> bool {
        self.workers.get(&index).is_some_and(|w| !w.is_finished())
    }

    /// Number of parked producers, finished or not.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    fn park(&mut self, index: u32, worker: JoinHandle<()>) {
        debug!("camera {index} parked until its producer exits");
        if let Some(previous) = self.workers.insert(index, worker) {
            // only finished producers are ever replaced
            let _ = previous.join();
        }
    }

    /// Join the producer parked for `index` if it has exited.
    ///
    /// Returns `false` while it is still running.
    fn reclaim(&mut self, index: u32) -> bool {
        if self.is_releasing(index) {
            return false;
        }
        if let Some(worker) = self.workers.remove(&index) {
            if worker.join().is_err() {
                warn!("camera {index} producer panicked");
            }
            debug!("camera {index} released");
        }
        true
    }
}

/// A capture device polled from its own thread.
pub struct DeviceSource {
    index: u32,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    opts: DeviceOptions,
}

impl std::fmt::Debug for DeviceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSource")
            .field("index", &self.index)
            .field("status", &self.shared.lock().status)
            .finish()
    }
}

impl DeviceSource {
    /// Start the producer and wait until the device is streaming.
    ///
    /// Fails with [`SourceError::SourceUnavailable`] for an index outside
    /// `0..=MAX_DEVICE_INDEX`, while an earlier producer of the same index is
    /// still parked in `releases`, when the backend refuses the index, or
    /// when the device does not come up within `open_timeout_ms`. A timed-out
    /// producer is parked in `releases`.
    pub fn open(
        backend: Arc<dyn CaptureBackend>,
        index: u32,
        opts: DeviceOptions,
        releases: &mut PendingReleases,
    ) -> Result<Self, SourceError> {
        if index > MAX_DEVICE_INDEX {
            return Err(SourceError::SourceUnavailable {
                index,
                reason: format!("index out of range 0..={MAX_DEVICE_INDEX}"),
            });
        }
        if !releases.reclaim(index) {
            return Err(SourceError::SourceUnavailable {
                index,
                reason: "previous open still releasing".to_string(),
            });
        }

        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot {
                frame: None,
                status: Status::Opening,
                published: 0,
                exited: false,
            }),
            changed: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("camcal-capture-{index}"))
                .spawn(move || produce(backend, index, shared))
                .map_err(|e| SourceError::SourceUnavailable {
                    index,
                    reason: e.to_string(),
                })?
        };

        let deadline = Instant::now() + Duration::from_millis(opts.open_timeout_ms);
        let status = shared
            .wait_until(deadline, |slot| slot.status != Status::Opening)
            .status
            .clone();

        match status {
            Status::Streaming | Status::Lost(_) | Status::Stopped => {
                info!("camera {index} opened");
                Ok(Self {
                    index,
                    shared,
                    worker: Some(worker),
                    opts,
                })
            }
            Status::Unavailable(reason) => {
                let _ = worker.join();
                Err(SourceError::SourceUnavailable { index, reason })
            }
            Status::Opening => {
                shared.stop.store(true, Ordering::Release);
                releases.park(index, worker);
                warn!("camera {index} did not open within {} ms", opts.open_timeout_ms);
                Err(SourceError::SourceUnavailable {
                    index,
                    reason: "open timed out".to_string(),
                })
            }
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Frames published by the producer so far.
    pub fn frames_published(&self) -> u64 {
        self.shared.lock().published
    }

    /// `true` until the stream ends or the source is closed.
    pub fn is_streaming(&self) -> bool {
        self.worker.is_some() && self.shared.lock().status == Status::Streaming
    }

    /// The most recent frame, waiting up to `stall_timeout_ms` for one.
    ///
    /// The same frame is returned until the producer replaces it or it is
    /// [`discard`](Self::discard)ed. A pending frame is still handed out
    /// after the device is lost; after that the loss is reported as
    /// [`SourceError::StreamTerminated`].
    pub fn poll(&self) -> Result<Frame, SourceError> {
        if self.worker.is_none() {
            return Err(SourceError::Closed);
        }
        let deadline = Instant::now() + Duration::from_millis(self.opts.stall_timeout_ms);
        let mut slot = self.shared.lock();
        loop {
            if let Some(frame) = &slot.frame {
                return Ok(frame.clone());
            }
            match &slot.status {
                Status::Lost(reason) => {
                    return Err(SourceError::StreamTerminated {
                        index: self.index,
                        reason: reason.clone(),
                    })
                }
                Status::Stopped => return Err(SourceError::Closed),
                Status::Unavailable(reason) => {
                    return Err(SourceError::SourceUnavailable {
                        index: self.index,
                        reason: reason.clone(),
                    })
                }
                Status::Opening | Status::Streaming => {}
            }

            let now = Instant::now();
            if now >= deadline {
                let reason = format!("no frame within {} ms", self.opts.stall_timeout_ms);
                slot.status = Status::Lost(reason.clone());
                return Err(SourceError::StreamTerminated {
                    index: self.index,
                    reason,
                });
            }
            slot = self
                .shared
                .changed
                .wait_timeout(slot, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    /// Drop frame `sequence` from the slot unless it was already replaced.
    pub fn discard(&self, sequence: u64) {
        let mut slot = self.shared.lock();
        if slot.frame.as_ref().is_some_and(|f| f.sequence == sequence) {
            slot.frame = None;
        }
    }

    fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.changed.notify_all();
    }

    fn clear_slot(&self) {
        let mut slot = self.shared.lock();
        slot.frame = None;
        if slot.status == Status::Streaming {
            slot.status = Status::Stopped;
        }
    }

    /// Stop the producer and wait up to `grace` for it to exit.
    ///
    /// Returns the handle of a producer that is still running.
    fn shutdown(&mut self, grace: Duration) -> Option<JoinHandle<()>> {
        let worker = self.worker.take()?;
        self.request_stop();
        let exited = self
            .shared
            .wait_until(Instant::now() + grace, |slot| slot.exited)
            .exited;
        self.clear_slot();
        if !exited {
            return Some(worker);
        }
        if worker.join().is_err() {
            warn!("camera {} producer panicked", self.index);
        }
        debug!("camera {} released", self.index);
        None
    }

    /// Request a stop and block until the producer has released the device.
    pub fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.request_stop();
        if worker.join().is_err() {
            warn!("camera {} producer panicked", self.index);
        }
        self.clear_slot();
        debug!("camera {} released", self.index);
    }

    /// Request a stop and wait up to `grace` for the producer to exit.
    ///
    /// A producer still blocked in the backend afterwards is parked in
    /// `releases`, which keeps the index closed until it returns.
    pub fn release(mut self, releases: &mut PendingReleases, grace: Duration) {
        if let Some(worker) = self.shutdown(grace) {
            warn!("camera {} still blocked in the backend", self.index);
            releases.park(self.index, worker);
        }
    }
}

impl Drop for DeviceSource {
    fn drop(&mut self) {
        let grace = Duration::from_millis(self.opts.stall_timeout_ms);
        if self.shutdown(grace).is_some() {
            warn!("camera {} producer detached while blocked", self.index);
        }
    }
}
