use fieldtrack_core::GrayImageView;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// One raw fiducial detection as reported by the external detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TagDetection {
    pub id: u32,
    /// Tag center in pixel coordinates.
    pub center: Point2<f32>,
    /// Tag corners in the detector's canonical order.
    pub corners: [Point2<f32>; 4],
}

/// External fiducial detector capability.
pub trait FiducialDetector {
    fn detect(&mut self, gray: &GrayImageView<'_>) -> Vec<TagDetection>;
}

impl<F> FiducialDetector for F
where
    F: FnMut(&GrayImageView<'_>) -> Vec<TagDetection>,
{
    fn detect(&mut self, gray: &GrayImageView<'_>) -> Vec<TagDetection> {
        self(gray)
    }
}

/// The four calibration corners, in the order their physical targets are listed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationRole {
    BottomLeft,
    BottomRight,
    TopRight,
    TopLeft,
}

impl CalibrationRole {
    pub const ALL: [CalibrationRole; 4] = [
        CalibrationRole::BottomLeft,
        CalibrationRole::BottomRight,
        CalibrationRole::TopRight,
        CalibrationRole::TopLeft,
    ];
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TagRole {
    Calibration(CalibrationRole),
    Agent,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TagConfigError {
    #[error("fiducial id {id} is assigned to more than one role")]
    DuplicateId { id: u32 },
}

/// Fiducial id assigned to each role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagRoleMap {
    pub bottom_left: u32,
    pub bottom_right: u32,
    pub top_right: u32,
    pub top_left: u32,
    pub agent: u32,
}

impl Default for TagRoleMap {
    fn default() -> Self {
        Self {
            bottom_left: 0,
            bottom_right: 1,
            top_right: 2,
            top_left: 3,
            agent: 4,
        }
    }
}

impl TagRoleMap {
    fn entries(&self) -> [(u32, TagRole); 5] {
        [
            (
                self.bottom_left,
                TagRole::Calibration(CalibrationRole::BottomLeft),
            ),
            (
                self.bottom_right,
                TagRole::Calibration(CalibrationRole::BottomRight),
            ),
            (
                self.top_right,
                TagRole::Calibration(CalibrationRole::TopRight),
            ),
            (self.top_left, TagRole::Calibration(CalibrationRole::TopLeft)),
            (self.agent, TagRole::Agent),
        ]
    }

    /// Role carried by fiducial `id`, if any.
    pub fn role_of(&self, id: u32) -> Option<TagRole> {
        self.entries()
            .into_iter()
            .find(|(tag_id, _)| *tag_id == id)
            .map(|(_, role)| role)
    }

    pub fn validate(&self) -> Result<(), TagConfigError> {
        let entries = self.entries();
        for (i, (id, _)) in entries.iter().enumerate() {
            if entries[i + 1..].iter().any(|(other, _)| other == id) {
                return Err(TagConfigError::DuplicateId { id: *id });
            }
        }
        Ok(())
    }
}

/// Pixel positions of the calibration corners observed so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCorners {
    pub bottom_left: Option<Point2<f32>>,
    pub bottom_right: Option<Point2<f32>>,
    pub top_right: Option<Point2<f32>>,
    pub top_left: Option<Point2<f32>>,
}

impl CalibrationCorners {
    pub fn get(&self, role: CalibrationRole) -> Option<Point2<f32>> {
        match role {
            CalibrationRole::BottomLeft => self.bottom_left,
            CalibrationRole::BottomRight => self.bottom_right,
            CalibrationRole::TopRight => self.top_right,
            CalibrationRole::TopLeft => self.top_left,
        }
    }

    pub fn set(&mut self, role: CalibrationRole, p: Point2<f32>) {
        let slot = match role {
            CalibrationRole::BottomLeft => &mut self.bottom_left,
            CalibrationRole::BottomRight => &mut self.bottom_right,
            CalibrationRole::TopRight => &mut self.top_right,
            CalibrationRole::TopLeft => &mut self.top_left,
        };
        *slot = Some(p);
    }

    /// Number of distinct roles with a position.
    pub fn count(&self) -> usize {
        CalibrationRole::ALL
            .iter()
            .filter(|&&r| self.get(r).is_some())
            .count()
    }

    /// All four corners in role order, once every role has been observed.
    pub fn complete(&self) -> Option<[Point2<f32>; 4]> {
        Some([
            self.bottom_left?,
            self.bottom_right?,
            self.top_right?,
            self.top_left?,
        ])
    }

    /// Overwrite roles present in `newer`, keep the rest.
    pub fn merge_from(&mut self, newer: &CalibrationCorners) {
        for role in CalibrationRole::ALL {
            if let Some(p) = newer.get(role) {
                self.set(role, p);
            }
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Mobile agent tag seen in the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentObservation {
    /// Tag center in pixels.
    pub center: Point2<f32>,
    /// Midpoint of the tag's first two corners; the agent faces from `center` toward it.
    pub heading_ref: Point2<f32>,
}
