use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use image::DynamicImage;

use super::device::{CaptureBackend, CaptureDevice, ReadError};

/// Frames served by one replayed device.
#[derive(Clone, Debug)]
pub struct ReplayTape {
    frames: Vec<DynamicImage>,
    looping: bool,
    interval: Duration,
}

impl ReplayTape {
    pub fn new(frames: Vec<DynamicImage>) -> Self {
        Self {
            frames,
            looping: false,
            interval: Duration::from_millis(10),
        }
    }

    /// Restart from the first frame instead of failing at the end.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Delay before each frame, standing in for the exposure time.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// A [`CaptureBackend`] playing back in-memory frames.
///
/// A non-looping tape fails its next read once every frame was served, the
/// way a device whose permission was revoked does.
#[derive(Clone, Debug, Default)]
pub struct ReplayBackend {
    devices: HashMap<u32, ReplayTape>,
}

impl ReplayBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, index: u32, tape: ReplayTape) -> Self {
        self.devices.insert(index, tape);
        self
    }
}

struct ReplayDevice {
    tape: ReplayTape,
    next: usize,
}

impl CaptureDevice for ReplayDevice {
    fn read(&mut self) -> Result<DynamicImage, ReadError> {
        thread::sleep(self.tape.interval);
        if self.next >= self.tape.frames.len() {
            if !self.tape.looping || self.tape.frames.is_empty() {
                return Err(ReadError("device lost".to_string()));
            }
            self.next = 0;
        }
        let frame = self.tape.frames[self.next].clone();
        self.next += 1;
        Ok(frame)
    }
}

impl CaptureBackend for ReplayBackend {
    fn open(&self, index: u32) -> Result<Box<dyn CaptureDevice>, String> {
        let tape = self
            .devices
            .get(&index)
            .ok_or_else(|| format!("no device at index {index}"))?;
        Ok(Box::new(ReplayDevice {
            tape: tape.clone(),
            next: 0,
        }))
    }
}
