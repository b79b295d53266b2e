use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

use fieldtrack_core::RgbImage;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Transient read failure; the frame is skipped.
    #[error("frame unavailable: {0}")]
    Unavailable(String),
}

/// Camera-like producer of RGB frames.
pub trait FrameSource {
    /// `Ok(None)` ends the stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameError> {
        (**self).next_frame()
    }
}

/// Frames from memory; `None` entries fail with [`FrameError::Unavailable`].
#[derive(Clone, Debug, Default)]
pub struct VecSource {
    frames: std::collections::VecDeque<Option<RgbImage>>,
}

impl VecSource {
    pub fn new(frames: impl IntoIterator<Item = Option<RgbImage>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl FrameSource for VecSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameError> {
        match self.frames.pop_front() {
            None => Ok(None),
            Some(Some(frame)) => Ok(Some(frame)),
            Some(None) => Err(FrameError::Unavailable("dropped frame".into())),
        }
    }
}

/// Wall-clock seconds used to stamp frames and telemetry.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Seconds since the UNIX epoch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Advances by a fixed step on every reading; for replays at a nominal rate.
#[derive(Clone, Debug)]
pub struct SteppedClock {
    next: Cell<f64>,
    step: f64,
}

impl SteppedClock {
    pub fn new(start: f64, step: f64) -> Self {
        Self {
            next: Cell::new(start),
            step,
        }
    }
}

impl Clock for SteppedClock {
    fn now(&self) -> f64 {
        let t = self.next.get();
        self.next.set(t + self.step);
        t
    }
}
