//! Zone geometry and the latching zone state machine.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Closed region of the physical plane.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Region {
    /// Axis-aligned box, bounds inclusive.
    Rect {
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    },
    /// Points with `nx * x + ny * y >= offset`.
    HalfPlane { nx: f64, ny: f64, offset: f64 },
}

impl Region {
    pub fn contains(&self, p: Point2<f64>) -> bool {
        match *self {
            Region::Rect {
                min_x,
                min_y,
                max_x,
                max_y,
            } => p.x >= min_x && p.x <= max_x && p.y >= min_y && p.y <= max_y,
            Region::HalfPlane { nx, ny, offset } => nx * p.x + ny * p.y >= offset,
        }
    }

    fn is_valid(&self) -> bool {
        match *self {
            Region::Rect {
                min_x,
                min_y,
                max_x,
                max_y,
            } => {
                [min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite())
                    && min_x <= max_x
                    && min_y <= max_y
            }
            Region::HalfPlane { nx, ny, offset } => {
                [nx, ny, offset].iter().all(|v| v.is_finite()) && (nx != 0.0 || ny != 0.0)
            }
        }
    }
}

/// A latching zone: its label while locked, how long the lock holds and the
/// union of regions that trigger it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneSpec {
    pub label: String,
    pub dwell_s: f64,
    pub regions: Vec<Region>,
}

impl ZoneSpec {
    pub fn contains(&self, p: Point2<f64>) -> bool {
        self.regions.iter().any(|r| r.contains(p))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ZoneConfigError {
    #[error("zone {label:?} has no regions")]
    NoRegions { label: String },
    #[error("zone {label:?} has invalid dwell {dwell_s}")]
    InvalidDwell { label: String, dwell_s: f64 },
    #[error("zone {label:?} region {index} is malformed")]
    InvalidRegion { label: String, index: usize },
    #[error("zone label must not be empty")]
    EmptyLabel,
}

/// The two latching zones, checked in order A then B.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneSet {
    pub a: ZoneSpec,
    pub b: ZoneSpec,
}

impl ZoneSet {
    /// Goal layout on a `width` x `height` plane. A dead band of depth
    /// `0.15 * height` along the y = 0 edge belongs to no zone; that is the
    /// edge between the bottom-left and bottom-right calibration targets,
    /// which the default camera setup shows at the top of the image. The rest
    /// is split across x: the middle half is the goal, the outer quarters are
    /// misses.
    pub fn goal_layout(width: f64, height: f64) -> Self {
        let top = 0.15 * height;
        let left = 0.25 * width;
        let right = 0.75 * width;
        Self {
            a: ZoneSpec {
                label: "GOAL".to_string(),
                dwell_s: 5.0,
                regions: vec![Region::Rect {
                    min_x: left,
                    min_y: top,
                    max_x: right,
                    max_y: height,
                }],
            },
            b: ZoneSpec {
                label: "MISS".to_string(),
                dwell_s: 3.0,
                regions: vec![
                    Region::Rect {
                        min_x: 0.0,
                        min_y: top,
                        max_x: left,
                        max_y: height,
                    },
                    Region::Rect {
                        min_x: right,
                        min_y: top,
                        max_x: width,
                        max_y: height,
                    },
                ],
            },
        }
    }

    pub fn get(&self, id: ZoneId) -> &ZoneSpec {
        match id {
            ZoneId::A => &self.a,
            ZoneId::B => &self.b,
        }
    }

    pub fn validate(&self) -> Result<(), ZoneConfigError> {
        for zone in [&self.a, &self.b] {
            if zone.label.is_empty() {
                return Err(ZoneConfigError::EmptyLabel);
            }
            if !zone.dwell_s.is_finite() || zone.dwell_s < 0.0 {
                return Err(ZoneConfigError::InvalidDwell {
                    label: zone.label.clone(),
                    dwell_s: zone.dwell_s,
                });
            }
            if zone.regions.is_empty() {
                return Err(ZoneConfigError::NoRegions {
                    label: zone.label.clone(),
                });
            }
            if let Some(index) = zone.regions.iter().position(|r| !r.is_valid()) {
                return Err(ZoneConfigError::InvalidRegion {
                    label: zone.label.clone(),
                    index,
                });
            }
        }
        Ok(())
    }
}

impl Default for ZoneSet {
    fn default() -> Self {
        Self::goal_layout(140.0, 140.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneId {
    A,
    B,
}

/// Current latch. `since` is the lock timestamp in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ZoneState {
    Neutral,
    Locked { zone: ZoneId, since: f64 },
}

impl ZoneState {
    pub fn is_locked(&self) -> bool {
        matches!(self, ZoneState::Locked { .. })
    }
}

/// Edge emitted when the state changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneEvent {
    pub from: ZoneState,
    pub to: ZoneState,
    /// Status label of `to`.
    pub status: String,
    pub at: f64,
}

/// Neutral / locked-A / locked-B latch with per-zone dwell.
///
/// At most one transition happens per update. A lock that expires returns to
/// neutral on that update; the observation of the same update is not used to
/// re-lock.
#[derive(Clone, Debug)]
pub struct ZoneTracker {
    zones: ZoneSet,
    neutral_label: String,
    state: ZoneState,
}

impl ZoneTracker {
    pub fn new(zones: ZoneSet, neutral_label: impl Into<String>) -> Self {
        Self {
            zones,
            neutral_label: neutral_label.into(),
            state: ZoneState::Neutral,
        }
    }

    pub fn zones(&self) -> &ZoneSet {
        &self.zones
    }

    pub fn state(&self) -> ZoneState {
        self.state
    }

    pub fn label_of(&self, state: ZoneState) -> &str {
        match state {
            ZoneState::Neutral => &self.neutral_label,
            ZoneState::Locked { zone, .. } => &self.zones.get(zone).label,
        }
    }

    /// Label of the current state.
    pub fn status(&self) -> &str {
        self.label_of(self.state)
    }

    /// Zone containing `p`, A before B.
    pub fn classify(&self, p: Point2<f64>) -> Option<ZoneId> {
        [ZoneId::A, ZoneId::B]
            .into_iter()
            .find(|&id| self.zones.get(id).contains(p))
    }

    /// Advance the latch with this frame's object position (`None` when the
    /// object was not observed) at time `now`.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn update(&mut self, object: Option<Point2<f64>>, now: f64) -> Option<ZoneEvent> {
        let next = match self.state {
            ZoneState::Locked { zone, since } => {
                if now - since >= self.zones.get(zone).dwell_s {
                    ZoneState::Neutral
                } else {
                    return None;
                }
            }
            ZoneState::Neutral => {
                let zone = self.classify(object?)?;
                ZoneState::Locked { zone, since: now }
            }
        };
        Some(self.transition(next, now))
    }

    /// Drop any lock immediately. Emits an event only when a lock was held.
    pub fn reset(&mut self, now: f64) -> Option<ZoneEvent> {
        if self.state.is_locked() {
            Some(self.transition(ZoneState::Neutral, now))
        } else {
            None
        }
    }

    fn transition(&mut self, to: ZoneState, at: f64) -> ZoneEvent {
        let from = self.state;
        self.state = to;
        let status = self.label_of(to).to_string();
        log::info!("zone {} -> {status} at {at:.3}", self.label_of(from));
        ZoneEvent {
            from,
            to,
            status,
            at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ZoneTracker {
        ZoneTracker::new(ZoneSet::default(), "WAITING")
    }

    fn in_a() -> Point2<f64> {
        Point2::new(70.0, 100.0)
    }

    fn in_b() -> Point2<f64> {
        Point2::new(10.0, 100.0)
    }

    #[test]
    fn default_layout_classifies_goal_miss_and_dead_band() {
        let t = tracker();
        assert_eq!(t.classify(in_a()), Some(ZoneId::A));
        assert_eq!(t.classify(in_b()), Some(ZoneId::B));
        assert_eq!(t.classify(Point2::new(130.0, 30.0)), Some(ZoneId::B));
        assert_eq!(t.classify(Point2::new(70.0, 5.0)), None);
        // shared edge goes to A
        assert_eq!(t.classify(Point2::new(35.0, 50.0)), Some(ZoneId::A));
    }

    #[test]
    fn goal_layout_dead_band_runs_along_low_y_edge() {
        let zones = ZoneSet::goal_layout(200.0, 100.0);
        let in_any = |x: f64, y: f64| {
            zones.a.contains(Point2::new(x, y)) || zones.b.contains(Point2::new(x, y))
        };
        assert!(!in_any(100.0, 14.9));
        assert!(!in_any(10.0, 0.0));
        assert!(zones.a.contains(Point2::new(100.0, 15.0)));
        assert!(zones.a.contains(Point2::new(100.0, 100.0)));
        assert!(zones.b.contains(Point2::new(190.0, 99.0)));
    }

    #[test]
    fn lock_holds_for_dwell_then_releases() {
        let mut t = tracker();
        let ev = t.update(Some(in_a()), 0.0).expect("lock");
        assert_eq!(ev.status, "GOAL");
        assert_eq!(ev.from, ZoneState::Neutral);
        assert_eq!(t.status(), "GOAL");

        assert!(t.update(Some(in_a()), 2.0).is_none());
        assert!(t.update(None, 4.99).is_none());

        let ev = t.update(None, 5.01).expect("release");
        assert_eq!(ev.status, "WAITING");
        assert_eq!(ev.to, ZoneState::Neutral);
        assert_eq!(t.state(), ZoneState::Neutral);
    }

    #[test]
    fn lock_is_exclusive_during_dwell() {
        let mut t = tracker();
        t.update(Some(in_a()), 0.0).expect("lock A");
        for i in 1..10 {
            assert!(t.update(Some(in_b()), i as f64 * 0.5).is_none());
            assert_eq!(t.status(), "GOAL");
        }
        assert!(t.update(Some(in_b()), 5.0).is_some());
        let ev = t.update(Some(in_b()), 5.1).expect("lock B");
        assert_eq!(ev.to, ZoneState::Locked { zone: ZoneId::B, since: 5.1 });
        assert_eq!(ev.status, "MISS");
    }

    #[test]
    fn miss_uses_its_own_dwell() {
        let mut t = tracker();
        t.update(Some(in_b()), 10.0).expect("lock B");
        assert!(t.update(None, 12.9).is_none());
        assert!(t.update(None, 13.0).is_some());
    }

    #[test]
    fn missing_object_never_locks() {
        let mut t = tracker();
        assert!(t.update(None, 0.0).is_none());
        assert!(t.update(Some(Point2::new(70.0, 5.0)), 1.0).is_none());
        assert_eq!(t.state(), ZoneState::Neutral);
    }

    #[test]
    fn reset_releases_only_when_locked() {
        let mut t = tracker();
        assert!(t.reset(0.0).is_none());
        t.update(Some(in_a()), 1.0);
        let ev = t.reset(1.5).expect("reset");
        assert_eq!(ev.status, "WAITING");
        assert!(!t.state().is_locked());
    }

    #[test]
    fn half_plane_regions() {
        let zones = ZoneSet {
            a: ZoneSpec {
                label: "LEFT".into(),
                dwell_s: 1.0,
                regions: vec![Region::HalfPlane {
                    nx: -1.0,
                    ny: 0.0,
                    offset: -50.0,
                }],
            },
            b: ZoneSpec {
                label: "RIGHT".into(),
                dwell_s: 1.0,
                regions: vec![Region::HalfPlane {
                    nx: 1.0,
                    ny: 0.0,
                    offset: 90.0,
                }],
            },
        };
        zones.validate().expect("valid");
        let t = ZoneTracker::new(zones, "IDLE");
        assert_eq!(t.classify(Point2::new(10.0, 0.0)), Some(ZoneId::A));
        assert_eq!(t.classify(Point2::new(95.0, 0.0)), Some(ZoneId::B));
        assert_eq!(t.classify(Point2::new(70.0, 0.0)), None);
    }

    #[test]
    fn validation_catches_bad_zones() {
        let mut zones = ZoneSet::default();
        zones.b.regions.clear();
        assert!(matches!(
            zones.validate(),
            Err(ZoneConfigError::NoRegions { .. })
        ));

        let mut zones = ZoneSet::default();
        zones.a.dwell_s = -1.0;
        assert!(matches!(
            zones.validate(),
            Err(ZoneConfigError::InvalidDwell { .. })
        ));

        let mut zones = ZoneSet::default();
        zones.a.regions.push(Region::HalfPlane {
            nx: 0.0,
            ny: 0.0,
            offset: 1.0,
        });
        assert_eq!(
            zones.validate(),
            Err(ZoneConfigError::InvalidRegion {
                label: "GOAL".into(),
                index: 1
            })
        );
    }

    #[test]
    fn regions_parse_from_tagged_json() {
        let raw = r#"[{"type":"rect","min_x":0,"min_y":0,"max_x":1,"max_y":1},
                      {"type":"half_plane","nx":0,"ny":1,"offset":3}]"#;
        let regions: Vec<Region> = serde_json::from_str(raw).expect("parse");
        assert!(regions[0].contains(Point2::new(0.5, 1.0)));
        assert!(regions[1].contains(Point2::new(-4.0, 3.0)));
    }
}
