//! Outgoing telemetry: wire record, rate limiter and publish sinks.

mod message;
mod publisher;
mod sink;

pub use message::{MessageKind, TelemetryMessage};
pub use publisher::{PublishOutcome, PublishStats, TelemetryParams, TelemetryPublisher};
pub use sink::{BackgroundPublisher, Publish, PublishError, RecordingPublisher, WriterPublisher};
