//! Common utilities and types for the CaféBot navigation core

pub mod types {
    use super::normalize_angle;
    use nalgebra::{Point3, Vector2};
    use serde::{Deserialize, Serialize};
    use std::fmt;

    /// A 2D point in the world frame (meters)
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct WorldPoint {
        pub x: f64,
        pub y: f64,
    }

    impl WorldPoint {
        pub fn new(x: f64, y: f64) -> Self {
            WorldPoint { x, y }
        }

        pub fn distance_to(&self, other: &WorldPoint) -> f64 {
            (other.x - self.x).hypot(other.y - self.y)
        }

        /// Displacement from this point to `other`
        pub fn vector_to(&self, other: &WorldPoint) -> Vector2<f64> {
            Vector2::new(other.x - self.x, other.y - self.y)
        }

        pub fn is_finite(&self) -> bool {
            self.x.is_finite() && self.y.is_finite()
        }
    }

    impl From<(f64, f64)> for WorldPoint {
        fn from(p: (f64, f64)) -> Self {
            WorldPoint { x: p.0, y: p.1 }
        }
    }

    /// Robot pose (x, y, theta) in the world frame
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct Pose {
        pub x: f64,
        pub y: f64,
        pub theta: f64,
    }

    impl Pose {
        pub fn new(x: f64, y: f64, theta: f64) -> Self {
            Pose { x, y, theta }
        }

        pub fn position(&self) -> WorldPoint {
            WorldPoint::new(self.x, self.y)
        }

        /// Heading change needed to face `target`, normalized to (-pi, pi]
        pub fn bearing_to(&self, target: &WorldPoint) -> f64 {
            let d = self.position().vector_to(target);
            normalize_angle(d.y.atan2(d.x) - self.theta)
        }
    }

    /// Identifier of a body in the world (robot, ground plane, furniture...)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct ObstacleId(pub u32);

    impl fmt::Display for ObstacleId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    /// World-space axis-aligned bounding box of one body
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct ObstacleFootprint {
        pub id: ObstacleId,
        pub min: Point3<f64>,
        pub max: Point3<f64>,
    }

    impl ObstacleFootprint {
        pub fn new(id: ObstacleId, min: Point3<f64>, max: Point3<f64>) -> Self {
            ObstacleFootprint { id, min, max }
        }

        /// Box of half-extent `half` in x/y standing on the floor at `center`
        pub fn around(id: ObstacleId, center: WorldPoint, half: f64, height: f64) -> Self {
            ObstacleFootprint {
                id,
                min: Point3::new(center.x - half, center.y - half, 0.0),
                max: Point3::new(center.x + half, center.y + half, height),
            }
        }

        /// Returns why the box is unusable, if it is
        pub fn defect(&self) -> Option<String> {
            if self.min.iter().chain(self.max.iter()).any(|c| !c.is_finite()) {
                return Some("non-finite corner coordinate".to_string());
            }
            for axis in 0..3 {
                if self.min[axis] > self.max[axis] {
                    return Some(format!(
                        "min corner exceeds max corner on axis {} ({} > {})",
                        axis, self.min[axis], self.max[axis]
                    ));
                }
            }
            None
        }
    }
}

use std::f64::consts::PI;

/// Normalize an angle to (-pi, pi]
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::types::*;
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn normalize_wraps_into_half_open_range() {
        assert_relative_eq!(normalize_angle(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(normalize_angle(-PI), PI, epsilon = 1e-12);
        assert_relative_eq!(normalize_angle(-PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(normalize_angle(5.0 * PI / 2.0), PI / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn bearing_accounts_for_current_heading() {
        let pose = Pose::new(0.0, 0.0, PI / 2.0);
        let bearing = pose.bearing_to(&WorldPoint::new(1.0, 0.0));
        assert_relative_eq!(bearing, -PI / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn footprint_defects() {
        let ok = ObstacleFootprint::around(ObstacleId(1), WorldPoint::new(1.0, 1.0), 0.2, 1.0);
        assert!(ok.defect().is_none());

        let inverted = ObstacleFootprint::new(
            ObstacleId(2),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 1.0),
        );
        assert!(inverted.defect().is_some());

        let nan = ObstacleFootprint::new(
            ObstacleId(3),
            Point3::new(f64::NAN, 0.0, 0.0),
            Point3::new(0.0, 1.0, 1.0),
        );
        assert!(nan.defect().is_some());
    }
}
