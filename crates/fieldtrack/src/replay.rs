//! Recorded sessions: frames on disk plus the fiducial detections for each.
//!
//! A session file looks like
//!
//! ```json
//! { "frames": [ { "image": "frame_000.png",
//!                 "tags": [ { "id": 0, "center": [10, 10],
//!                             "corners": [[5,5],[15,5],[15,15],[5,15]] } ] } ] }
//! ```
//!
//! Image paths are relative to the session file. Tag coordinates are in the
//! pixel space of the preprocessed (scaled) frame.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fieldtrack_core::{GrayImageView, RgbImage};
use fieldtrack_tags::{FiducialDetector, TagDetection};
use serde::{Deserialize, Serialize};

use crate::io::FieldTrackIoError;
use crate::pipeline::{FrameError, FrameSource, StartupError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionFrame {
    pub image: PathBuf,
    #[serde(default)]
    pub tags: Vec<TagDetection>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub frames: Vec<SessionFrame>,
    /// Directory image paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Session {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, FieldTrackIoError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let mut session: Session = serde_json::from_str(&raw)?;
        session.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(session)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), FieldTrackIoError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Split into a frame source and the detector that replays its tags.
    pub fn into_replay(self) -> (ReplaySource, ReplayDetector) {
        let shared = Arc::new(ReplayState {
            session: self,
            current: AtomicUsize::new(usize::MAX),
        });
        (
            ReplaySource {
                state: Arc::clone(&shared),
                next: 0,
            },
            ReplayDetector { state: shared },
        )
    }
}

/// Load and sanity-check a session for replay.
pub fn open_session(path: impl AsRef<Path>) -> Result<(ReplaySource, ReplayDetector), StartupError> {
    let path = path.as_ref();
    let session = Session::load_json(path).map_err(|source| StartupError::Load {
        what: format!("session {}", path.display()),
        source,
    })?;
    if session.frames.is_empty() {
        return Err(StartupError::Source(format!(
            "session {} has no frames",
            path.display()
        )));
    }
    log::info!("replaying {} frames from {}", session.frames.len(), path.display());
    Ok(session.into_replay())
}

#[derive(Debug)]
struct ReplayState {
    session: Session,
    /// Index of the frame most recently handed out.
    current: AtomicUsize,
}

/// Decodes session images in order.
#[derive(Debug)]
pub struct ReplaySource {
    state: Arc<ReplayState>,
    next: usize,
}

/// Returns the recorded detections of the frame the source produced last.
#[derive(Debug, Clone)]
pub struct ReplayDetector {
    state: Arc<ReplayState>,
}

/// Decode an image file into an RGB frame.
pub fn load_rgb(path: impl AsRef<Path>) -> Result<RgbImage, FieldTrackIoError> {
    let img = ::image::open(path)?.to_rgb8();
    let (w, h) = (img.width() as usize, img.height() as usize);
    RgbImage::from_raw(w, h, img.into_raw()).map_err(|e| {
        FieldTrackIoError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    })
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameError> {
        let session = &self.state.session;
        let Some(frame) = session.frames.get(self.next) else {
            return Ok(None);
        };
        let index = self.next;
        self.next += 1;
        self.state.current.store(index, Ordering::Release);

        let path = session.base_dir.join(&frame.image);
        load_rgb(&path)
            .map(Some)
            .map_err(|e| FrameError::Unavailable(format!("{}: {e}", path.display())))
    }
}

impl FiducialDetector for ReplayDetector {
    fn detect(&mut self, _gray: &GrayImageView<'_>) -> Vec<TagDetection> {
        let index = self.state.current.load(Ordering::Acquire);
        self.state
            .session
            .frames
            .get(index)
            .map(|f| f.tags.clone())
            .unwrap_or_default()
    }
}
