use std::time::Duration;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use super::message::{MessageKind, TelemetryMessage};
use super::sink::{Publish, PublishError};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Rate control and labelling of outgoing telemetry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryParams {
    pub topic: String,
    /// Samples closer than this to the previous send are suppressed unless
    /// something changed past its dead-band.
    pub min_interval_s: f64,
    /// Heading change (degrees, wrap-aware) that forces a sample out.
    pub heading_deadband_deg: f64,
    /// Position change (plane units) that forces a sample out.
    pub position_deadband: f64,
    /// Status while no lock is held.
    pub neutral_label: String,
    /// Status of the final message on shutdown.
    pub offline_label: String,
    /// How long the final message may wait for a congested transport.
    pub offline_flush_ms: u64,
}

impl Default for TelemetryParams {
    fn default() -> Self {
        Self {
            topic: "ball/goal_status".to_string(),
            min_interval_s: 1.0,
            heading_deadband_deg: 10.0,
            position_deadband: 5.0,
            neutral_label: "WAITING".to_string(),
            offline_label: "SHUTDOWN".to_string(),
            offline_flush_ms: 1000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    /// Held back by the rate limiter.
    Suppressed,
    /// Handed to the transport, which failed; the message is gone.
    Dropped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishStats {
    pub sent: usize,
    pub suppressed: usize,
    pub dropped: usize,
}

/// Rate-limits samples, forwards edges immediately and never fails.
#[derive(Debug)]
pub struct TelemetryPublisher<P: Publish> {
    sink: P,
    params: TelemetryParams,
    last: Option<TelemetryMessage>,
    stats: PublishStats,
}

fn angle_diff_deg(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

fn moved(a: Option<Point2<f64>>, b: Option<Point2<f64>>, band: f64) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).norm() > band,
        (None, None) => false,
        _ => true,
    }
}

impl<P: Publish> TelemetryPublisher<P> {
    pub fn new(sink: P, params: TelemetryParams) -> Self {
        Self {
            sink,
            params,
            last: None,
            stats: PublishStats::default(),
        }
    }

    pub fn params(&self) -> &TelemetryParams {
        &self.params
    }

    pub fn stats(&self) -> PublishStats {
        self.stats
    }

    pub fn sink(&self) -> &P {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut P {
        &mut self.sink
    }

    /// Last message handed to the transport, whatever its outcome.
    pub fn last_sent(&self) -> Option<&TelemetryMessage> {
        self.last.as_ref()
    }

    /// Would a sample go out now?
    pub fn should_send(&self, msg: &TelemetryMessage) -> bool {
        let Some(last) = &self.last else {
            return true;
        };
        if msg.timestamp - last.timestamp >= self.params.min_interval_s {
            return true;
        }
        if msg.status != last.status || msg.agent_found != last.agent_found {
            return true;
        }
        if let (Some(a), Some(b)) = (msg.agent_theta, last.agent_theta) {
            if angle_diff_deg(a, b) > self.params.heading_deadband_deg {
                return true;
            }
        }
        let band = self.params.position_deadband;
        moved(msg.agent_position(), last.agent_position(), band)
            || moved(msg.object_position(), last.object_position(), band)
    }

    /// Periodic snapshot; goes out only if the rate limiter lets it.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, msg)))]
    pub fn publish_sample(&mut self, mut msg: TelemetryMessage) -> PublishOutcome {
        msg.kind = MessageKind::Sample;
        if !self.should_send(&msg) {
            self.stats.suppressed += 1;
            return PublishOutcome::Suppressed;
        }
        self.send(msg, None)
    }

    /// Zone edge; bypasses the rate limiter.
    pub fn publish_transition(&mut self, mut msg: TelemetryMessage) -> PublishOutcome {
        msg.kind = MessageKind::Transition;
        log::info!("publishing transition to {}", msg.status);
        self.send(msg, None)
    }

    /// Final "going offline" message; bypasses the rate limiter and waits up
    /// to `offline_flush_ms` for the transport to take it.
    pub fn publish_offline(&mut self, timestamp: f64) -> PublishOutcome {
        let msg = TelemetryMessage::new(
            MessageKind::Offline,
            self.params.offline_label.clone(),
            timestamp,
        );
        let wait = Duration::from_millis(self.params.offline_flush_ms);
        self.send(msg, Some(wait))
    }

    fn send(&mut self, msg: TelemetryMessage, final_wait: Option<Duration>) -> PublishOutcome {
        let topic = &self.params.topic;
        let result = msg.to_json().map_err(PublishError::from).and_then(|payload| {
            match final_wait {
                Some(wait) => self.sink.publish_final(topic, &payload, wait),
                None => self.sink.publish(topic, &payload),
            }
        });
        self.last = Some(msg);
        match result {
            Ok(()) => {
                self.stats.sent += 1;
                PublishOutcome::Sent
            }
            Err(err) => {
                log::warn!("telemetry dropped: {err}");
                self.stats.dropped += 1;
                PublishOutcome::Dropped
            }
        }
    }
}
