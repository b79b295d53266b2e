use fieldtrack_core::Homography;
use fieldtrack_tags::AgentObservation;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Agent position on the plane and the direction it faces.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentPose {
    pub position: Point2<f64>,
    /// Degrees in `[0, 360)`, counted from the plane's +x axis toward +y.
    pub heading_deg: f64,
}

/// Plane-space result for one frame. `None` marks an entity that was not
/// observed (or projected to infinity).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    pub agent: Option<AgentPose>,
    pub object: Option<Point2<f64>>,
}

/// Heading of the vector `from -> to` in degrees, normalized to `[0, 360)`.
pub fn heading_deg(from: Point2<f64>, to: Point2<f64>) -> f64 {
    let d = to - from;
    let deg = d.y.atan2(d.x).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative angles
    if deg >= 360.0 {
        0.0
    } else {
        deg
    }
}

fn to_f64(p: Point2<f32>) -> Point2<f64> {
    Point2::new(p.x as f64, p.y as f64)
}

/// Project the agent tag and the object centroid onto the plane.
///
/// All present points go through one batched projection. Absent inputs are
/// never projected.
pub fn transform_pose(
    h: &Homography,
    agent: Option<&AgentObservation>,
    object_px: Option<Point2<f32>>,
) -> PoseEstimate {
    let mut pixels = Vec::with_capacity(3);
    if let Some(a) = agent {
        pixels.push(to_f64(a.center));
        pixels.push(to_f64(a.heading_ref));
    }
    if let Some(o) = object_px {
        pixels.push(to_f64(o));
    }

    let projected = h.apply_many(&pixels);
    let mut it = projected.into_iter();

    let agent = agent.and_then(|_| {
        let center = it.next().flatten();
        let reference = it.next().flatten();
        let (center, reference) = (center?, reference?);
        Some(AgentPose {
            position: center,
            heading_deg: heading_deg(center, reference),
        })
    });
    let object = object_px.and_then(|_| it.next().flatten());

    PoseEstimate { agent, object }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn scale_half() -> Homography {
        Homography::from_array([[0.5, 0.0, -5.0], [0.0, 0.5, -5.0], [0.0, 0.0, 1.0]])
    }

    fn agent(cx: f32, cy: f32, rx: f32, ry: f32) -> AgentObservation {
        AgentObservation {
            center: Point2::new(cx, cy),
            heading_ref: Point2::new(rx, ry),
        }
    }

    #[test]
    fn headings_cover_all_quadrants() {
        let o = Point2::new(0.0, 0.0);
        assert_abs_diff_eq!(heading_deg(o, Point2::new(1.0, 0.0)), 0.0);
        assert_abs_diff_eq!(heading_deg(o, Point2::new(0.0, 1.0)), 90.0);
        assert_abs_diff_eq!(heading_deg(o, Point2::new(-1.0, 0.0)), 180.0);
        assert_abs_diff_eq!(heading_deg(o, Point2::new(0.0, -1.0)), 270.0);
        assert_abs_diff_eq!(heading_deg(o, Point2::new(1.0, -1.0)), 315.0);
        let tiny = heading_deg(o, Point2::new(1.0, -1e-300));
        assert!((0.0..360.0).contains(&tiny));
    }

    #[test]
    fn agent_and_object_are_projected() {
        let pose = transform_pose(
            &scale_half(),
            Some(&agent(110.0, 110.0, 110.0, 90.0)),
            Some(Point2::new(30.0, 50.0)),
        );
        let a = pose.agent.expect("agent");
        assert_abs_diff_eq!(a.position.x, 50.0);
        assert_abs_diff_eq!(a.position.y, 50.0);
        assert_abs_diff_eq!(a.heading_deg, 270.0);
        let o = pose.object.expect("object");
        assert_abs_diff_eq!(o.x, 10.0);
        assert_abs_diff_eq!(o.y, 20.0);
    }

    #[test]
    fn missing_object_stays_missing() {
        let pose = transform_pose(&scale_half(), Some(&agent(0.0, 0.0, 10.0, 0.0)), None);
        assert!(pose.agent.is_some());
        assert!(pose.object.is_none());

        let pose = transform_pose(&scale_half(), None, Some(Point2::new(20.0, 20.0)));
        assert!(pose.agent.is_none());
        let o = pose.object.expect("object");
        assert_abs_diff_eq!(o.x, 5.0);
    }

    #[test]
    fn same_inputs_same_outputs() {
        let h = Homography::from_array([[1.2, 0.1, 3.0], [-0.05, 0.9, 1.0], [1e-4, 2e-4, 1.0]]);
        let a = agent(100.0, 80.0, 104.0, 70.0);
        let first = transform_pose(&h, Some(&a), Some(Point2::new(300.0, 200.0)));
        let second = transform_pose(&h, Some(&a), Some(Point2::new(300.0, 200.0)));
        assert_eq!(first, second);
    }

    #[test]
    fn points_at_infinity_are_invalid() {
        // third row vanishes at x = 100
        let h = Homography::from_array([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [-0.01, 0.0, 1.0]]);
        let pose = transform_pose(&h, None, Some(Point2::new(100.0, 5.0)));
        assert!(pose.object.is_none());
    }
}
