//! Robot-facing ports
//!
//! The navigation core never talks to a concrete robot. Any backend, the
//! physical robot bridge or the kinematic simulator in [`crate::sim`],
//! implements these traits and is handed to the [`crate::navigation::Navigator`].

use crate::common::types::{ObstacleFootprint, ObstacleId, Pose};
use crate::error::RobotError;
use std::collections::HashSet;

/// Blocking locomotion primitives plus the pose accessor
pub trait MotionPort: Send + Sync {
    /// Current pose in the world frame
    fn pose(&self) -> Result<Pose, RobotError>;

    /// Rotate in place by `delta_theta` radians; returns once the motion completes
    fn rotate_by(&self, delta_theta: f64) -> Result<(), RobotError>;

    /// Drive straight ahead by `distance` meters; returns once the motion completes
    fn translate_by(&self, distance: f64) -> Result<(), RobotError>;
}

/// World geometry queries used to build the occupancy grid
pub trait SensingPort: Send + Sync {
    /// AABBs of every body except those in `exclude`
    fn obstacle_footprints(
        &self,
        exclude: &HashSet<ObstacleId>,
    ) -> Result<Vec<ObstacleFootprint>, RobotError>;
}

/// One raw proximity reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeReading {
    /// Direct distance, as reported by a sonar
    Distance(f64),
    /// Laser segment endpoint in the robot frame
    Segment { x: f64, y: f64 },
}

impl RangeReading {
    /// Euclidean distance represented by this reading
    pub fn distance(&self) -> f64 {
        match *self {
            RangeReading::Distance(d) => d,
            RangeReading::Segment { x, y } => x.hypot(y),
        }
    }
}

/// Fixed array of range sensors (sonars and/or laser segments)
pub trait RangeSensorSource: Send + Sync {
    fn read_ranges(&self) -> Result<Vec<RangeReading>, RobotError>;
}

/// Nearest body hit by a ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub id: ObstacleId,
    pub distance: f64,
    pub min_z: f64,
    pub max_z: f64,
}

/// Vertical slice a ray query cares about. Bodies entirely below `min_top`
/// or entirely above `max_bottom` are transparent to the ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightBand {
    pub min_top: f64,
    pub max_bottom: f64,
}

impl HeightBand {
    pub fn new(min_top: f64, max_bottom: f64) -> Self {
        HeightBand {
            min_top,
            max_bottom,
        }
    }

    /// Whether a body spanning `min_z..max_z` intersects the band
    pub fn admits(&self, min_z: f64, max_z: f64) -> bool {
        min_z <= self.max_bottom && max_z >= self.min_top
    }
}

/// Ray queries against the world
pub trait RayCaster: Send + Sync {
    /// Cast from `pose` along its heading, returning the first body inside
    /// `band` hit within `max_distance`. Bodies outside the band never
    /// shadow the ones behind them.
    fn cast_ray(
        &self,
        pose: &Pose,
        max_distance: f64,
        band: HeightBand,
    ) -> Result<Option<RayHit>, RobotError>;
}
