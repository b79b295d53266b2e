//! Event derivation on the physical plane.
//!
//! [`ZoneTracker`] latches the tracked object into one of two zones for a
//! fixed dwell, and [`TelemetryPublisher`] turns snapshots and zone edges into
//! rate-limited messages on a [`Publish`] sink. Nothing here blocks: sinks
//! that need a network connection should be wrapped in a
//! [`BackgroundPublisher`].

mod telemetry;
mod zone;

pub use telemetry::{
    BackgroundPublisher, MessageKind, Publish, PublishError, PublishOutcome, PublishStats,
    RecordingPublisher, TelemetryMessage, TelemetryParams, TelemetryPublisher, WriterPublisher,
};
pub use zone::{Region, ZoneConfigError, ZoneEvent, ZoneId, ZoneSet, ZoneSpec, ZoneState, ZoneTracker};
