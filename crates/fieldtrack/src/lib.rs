//! High-level facade crate for the `fieldtrack-*` workspace.
//!
//! A fixed camera looks at a rectangular plane with four fiducial corner tags.
//! This crate turns each frame into plane coordinates for a tagged agent and
//! a colored object, latches the object into goal / miss zones and publishes
//! the result as rate-limited telemetry.
//!
//! ## Quickstart
//!
//! ```no_run
//! use fieldtrack::events::WriterPublisher;
//! use fieldtrack::pipeline::{run_frames, SystemClock};
//! use fieldtrack::replay::open_session;
//! use fieldtrack::{FieldTrackConfig, Pipeline};
//! use std::sync::atomic::AtomicBool;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FieldTrackConfig::default();
//! let (mut source, detector) = open_session("session.json")?;
//! let sink = WriterPublisher::new(std::io::stdout());
//! let mut pipeline = Pipeline::new(&config, detector, sink)?;
//!
//! let stop = AtomicBool::new(false);
//! let summary = run_frames(&mut pipeline, &mut source, &SystemClock, &config.source, &stop);
//! println!("{} frames, {} transitions", summary.frames_processed, summary.transitions);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `fieldtrack::core`: image buffers, preprocessing, homography estimation.
//! - `fieldtrack::tags`: fiducial records and role dispatch.
//! - `fieldtrack::blob`: color blob location.
//! - `fieldtrack::events`: zone latch and telemetry sinks.
//! - `fieldtrack::calibration` / `fieldtrack::pose`: plane rectification.
//! - `fieldtrack::pipeline`: per-frame pipeline and frame loop.
//! - `fieldtrack::replay` (feature `image`): recorded sessions.

pub use fieldtrack_blob as blob;
pub use fieldtrack_core as core;
pub use fieldtrack_events as events;
pub use fieldtrack_tags as tags;

pub mod calibration;
pub mod io;
pub mod pipeline;
pub mod pose;

#[cfg(feature = "image")]
pub mod replay;

pub use calibration::{CalibrationError, HomographyResolver, PlaneRect};
pub use io::{ConfigError, FieldTrackConfig, FieldTrackIoError};
pub use pipeline::{FrameReport, Pipeline, StartupError};
pub use pose::{heading_deg, transform_pose, AgentPose, PoseEstimate};
