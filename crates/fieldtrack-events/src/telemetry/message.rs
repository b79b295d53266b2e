use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Periodic snapshot, subject to rate limiting.
    Sample,
    /// Zone state edge, always sent.
    Transition,
    /// Last message before shutdown.
    Offline,
}

/// Flat wire record.
///
/// Coordinates are in plane units, `agent_theta` in degrees `[0, 360)`,
/// `timestamp` in seconds since the UNIX epoch. Coordinates of an entity
/// that was not found serialize as `null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    pub kind: MessageKind,
    pub agent_found: bool,
    pub agent_x: Option<f64>,
    pub agent_y: Option<f64>,
    pub agent_theta: Option<f64>,
    pub object_found: bool,
    pub object_x: Option<f64>,
    pub object_y: Option<f64>,
    pub status: String,
    pub timestamp: f64,
}

impl TelemetryMessage {
    /// A message with neither agent nor object.
    pub fn new(kind: MessageKind, status: impl Into<String>, timestamp: f64) -> Self {
        Self {
            kind,
            agent_found: false,
            agent_x: None,
            agent_y: None,
            agent_theta: None,
            object_found: false,
            object_x: None,
            object_y: None,
            status: status.into(),
            timestamp,
        }
    }

    pub fn with_agent(mut self, position: Point2<f64>, heading_deg: f64) -> Self {
        self.agent_found = true;
        self.agent_x = Some(position.x);
        self.agent_y = Some(position.y);
        self.agent_theta = Some(heading_deg);
        self
    }

    pub fn with_object(mut self, position: Point2<f64>) -> Self {
        self.object_found = true;
        self.object_x = Some(position.x);
        self.object_y = Some(position.y);
        self
    }

    pub fn agent_position(&self) -> Option<Point2<f64>> {
        Some(Point2::new(self.agent_x?, self.agent_y?))
    }

    pub fn object_position(&self) -> Option<Point2<f64>> {
        Some(Point2::new(self.object_x?, self.object_y?))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
