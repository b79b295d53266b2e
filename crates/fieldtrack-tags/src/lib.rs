//! Fiducial role assignment.
//!
//! This crate does **not** decode fiducials. It consumes the raw detections of
//! an external detector (`id`, center, four corners) and dispatches them by id
//! into the four calibration-corner roles and the mobile agent role.

mod reader;
mod types;

pub use reader::{MarkerReadSummary, MarkerReader, TagObservation};
pub use types::{
    AgentObservation, CalibrationCorners, CalibrationRole, FiducialDetector, TagConfigError,
    TagDetection, TagRole, TagRoleMap,
};
