//! The per-frame pipeline and the frame loop around it.
//!
//! One call to [`Pipeline::process_frame`] runs, in order: preprocessing,
//! fiducial detection and role dispatch, blob location, calibration, pose
//! projection, the zone latch and telemetry. Every per-frame failure is
//! recorded in the returned [`FrameReport`] and logged; none is fatal.

mod runner;
mod source;

pub use runner::{run_frames, RunSummary, SourceParams};
pub use source::{Clock, FrameError, FrameSource, SteppedClock, SystemClock, VecSource};

use fieldtrack_blob::{BlobCandidate, BlobLocator};
use fieldtrack_core::{preprocess_frame, PreprocessParams, RgbImageView};
use fieldtrack_events::{
    MessageKind, Publish, PublishOutcome, PublishStats, TelemetryMessage, TelemetryPublisher,
    ZoneEvent, ZoneState, ZoneTracker,
};
use fieldtrack_tags::{FiducialDetector, MarkerReadSummary, MarkerReader};
use nalgebra::Point2;

use crate::calibration::{CalibrationError, HomographyResolver};
use crate::io::{ConfigError, FieldTrackConfig, FieldTrackIoError};
use crate::pose::{transform_pose, PoseEstimate};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Conditions that prevent the pipeline from starting.
#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to load {what}: {source}")]
    Load {
        what: String,
        #[source]
        source: FieldTrackIoError,
    },
    #[error("frame source unavailable: {0}")]
    Source(String),
}

/// What happened to one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub timestamp: f64,
    pub markers: MarkerReadSummary,
    /// Best blob in pixel space.
    pub blob: Option<BlobCandidate>,
    /// Set when calibration is incomplete or the latest estimate was degenerate.
    pub calibration: Option<CalibrationError>,
    /// `None` until a homography is available.
    pub pose: Option<PoseEstimate>,
    pub event: Option<ZoneEvent>,
    pub status: String,
    pub publish: PublishOutcome,
}

pub struct Pipeline<D: FiducialDetector, P: Publish> {
    preprocess: PreprocessParams,
    detector: D,
    reader: MarkerReader,
    locator: BlobLocator,
    resolver: HomographyResolver,
    zones: ZoneTracker,
    telemetry: TelemetryPublisher<P>,
    last_object: Option<Point2<f64>>,
}

impl<D: FiducialDetector, P: Publish> Pipeline<D, P> {
    /// Validate `config` and assemble the stages around a detector and sink.
    pub fn new(config: &FieldTrackConfig, detector: D, sink: P) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            preprocess: config.preprocess,
            detector,
            reader: MarkerReader::new(config.tags),
            locator: BlobLocator::new(config.blob),
            resolver: HomographyResolver::new(config.plane, config.ransac),
            zones: ZoneTracker::new(
                config.zones.clone(),
                config.telemetry.neutral_label.clone(),
            ),
            telemetry: TelemetryPublisher::new(sink, config.telemetry.clone()),
            last_object: None,
        })
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, raw), fields(width = raw.width, height = raw.height))
    )]
    pub fn process_frame(&mut self, raw: &RgbImageView<'_>, now: f64) -> FrameReport {
        let frame = preprocess_frame(raw, &self.preprocess);
        let (detections, blob) = if frame.is_empty() {
            log::debug!("empty frame at {now:.3}");
            (Vec::new(), None)
        } else {
            (
                self.detector.detect(&frame.gray.view()),
                self.locator.locate(&frame.hsv.view()),
            )
        };
        let observation = self.reader.read(&detections);

        let (homography, calibration) = match self.resolver.observe(&observation.calibration) {
            Ok(h) => (Some(h), None),
            Err(err) => {
                match err {
                    CalibrationError::HomographyDegenerate => log::warn!("{err}"),
                    CalibrationError::InsufficientCalibration { .. } => log::debug!("{err}"),
                }
                (self.resolver.cached(), Some(err))
            }
        };

        let pose = homography.map(|h| {
            transform_pose(
                &h,
                observation.agent.as_ref(),
                blob.as_ref().map(|b| b.centroid),
            )
        });
        let object = pose.and_then(|p| p.object);
        if object.is_some() {
            self.last_object = object;
        }

        let event = self.zones.update(object, now);
        let status = self.zones.status().to_string();

        let mut msg = TelemetryMessage::new(MessageKind::Sample, status.clone(), now);
        if let Some(agent) = pose.and_then(|p| p.agent) {
            msg = msg.with_agent(agent.position, agent.heading_deg);
        }
        if let Some(o) = object {
            msg = msg.with_object(o);
        }
        let publish = if event.is_some() {
            self.telemetry.publish_transition(msg)
        } else {
            self.telemetry.publish_sample(msg)
        };

        FrameReport {
            timestamp: now,
            markers: observation.summary(),
            blob,
            calibration,
            pose,
            event,
            status,
            publish,
        }
    }

    /// Operator reset: release any lock now and announce it.
    pub fn reset_zones(&mut self, now: f64) -> Option<ZoneEvent> {
        let event = self.zones.reset(now)?;
        let msg = TelemetryMessage::new(MessageKind::Transition, event.status.clone(), now);
        self.telemetry.publish_transition(msg);
        Some(event)
    }

    pub fn request_recalibration(&mut self) {
        self.resolver.request_recalibration();
    }

    /// Publish the offline message. Call before releasing the frame source.
    pub fn shutdown(&mut self, now: f64) -> PublishOutcome {
        log::info!("shutting down, status was {}", self.zones.status());
        self.telemetry.publish_offline(now)
    }

    pub fn resolver(&self) -> &HomographyResolver {
        &self.resolver
    }

    pub fn zone_state(&self) -> ZoneState {
        self.zones.state()
    }

    pub fn status(&self) -> &str {
        self.zones.status()
    }

    /// Last plane position of the object from any earlier frame. Never
    /// published as a fresh observation.
    pub fn last_object(&self) -> Option<Point2<f64>> {
        self.last_object
    }

    pub fn telemetry_stats(&self) -> PublishStats {
        self.telemetry.stats()
    }

    pub fn sink(&self) -> &P {
        self.telemetry.sink()
    }
}
