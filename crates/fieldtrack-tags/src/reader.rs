use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::types::{AgentObservation, CalibrationCorners, TagDetection, TagRole, TagRoleMap};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Structured per-frame view of the raw detections.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TagObservation {
    /// Calibration corners seen in this frame only.
    pub calibration: CalibrationCorners,
    pub agent: Option<AgentObservation>,
    /// Detections whose id maps to no role.
    pub unknown_ids: Vec<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerReadSummary {
    /// Distinct calibration roles seen this frame.
    pub calibration_roles: usize,
    pub agent_found: bool,
    /// Detections with ids outside the role map.
    pub unknown: usize,
}

impl TagObservation {
    pub fn summary(&self) -> MarkerReadSummary {
        MarkerReadSummary {
            calibration_roles: self.calibration.count(),
            agent_found: self.agent.is_some(),
            unknown: self.unknown_ids.len(),
        }
    }
}

/// Dispatches raw detections into roles by fiducial id.
#[derive(Clone, Debug, Default)]
pub struct MarkerReader {
    roles: TagRoleMap,
}

impl MarkerReader {
    pub fn new(roles: TagRoleMap) -> Self {
        Self { roles }
    }

    pub fn roles(&self) -> &TagRoleMap {
        &self.roles
    }

    /// Classify one frame of detections.
    ///
    /// A role seen more than once keeps the last detection. Unknown ids are
    /// recorded but are not an error.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, detections), fields(n = detections.len()))
    )]
    pub fn read(&self, detections: &[TagDetection]) -> TagObservation {
        let mut obs = TagObservation::default();
        for det in detections {
            match self.roles.role_of(det.id) {
                Some(TagRole::Calibration(role)) => obs.calibration.set(role, det.center),
                Some(TagRole::Agent) => {
                    obs.agent = Some(AgentObservation {
                        center: det.center,
                        heading_ref: edge_midpoint(&det.corners),
                    });
                }
                None => obs.unknown_ids.push(det.id),
            }
        }
        if !obs.unknown_ids.is_empty() {
            log::debug!("ignoring fiducial ids {:?}", obs.unknown_ids);
        }
        obs
    }
}

fn edge_midpoint(corners: &[Point2<f32>; 4]) -> Point2<f32> {
    Point2::new(
        0.5 * (corners[0].x + corners[1].x),
        0.5 * (corners[0].y + corners[1].y),
    )
}
