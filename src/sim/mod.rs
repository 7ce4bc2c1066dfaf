//! Kinematic simulation backend
//!
//! A point robot with a square body that moves exactly as commanded (up to
//! an optional translation scale error) inside a world of axis-aligned
//! boxes. Good enough to exercise every navigation path without a physics
//! engine.

use crate::common::normalize_angle;
use crate::common::types::{ObstacleFootprint, ObstacleId, Pose, WorldPoint};
use crate::error::RobotError;
use crate::navigation::snapshot::ObstacleStore;
use crate::robot::{
    HeightBand, MotionPort, RangeReading, RangeSensorSource, RayCaster, RayHit, SensingPort,
};
use nalgebra::Point3;
use std::collections::HashSet;
use std::f64::consts::PI;
use std::sync::Mutex;
use tracing::trace;

pub const GROUND_ID: ObstacleId = ObstacleId(0);
pub const ROBOT_ID: ObstacleId = ObstacleId(1);
pub const COUNTER_ID: ObstacleId = ObstacleId(7);
pub const PERSON_ID: ObstacleId = ObstacleId(12);

const ROBOT_HALF_WIDTH: f64 = 0.2;
const ROBOT_HEIGHT: f64 = 1.2;
const SONAR_RANGE: f64 = 3.0;
const SONAR_HEIGHT: f64 = 0.3;

/// Simulated robot living in an [`ObstacleStore`]
pub struct SimRobot {
    pose: Mutex<Pose>,
    world: ObstacleStore,
    body: ObstacleId,
    ground: ObstacleId,
    translation_scale: f64,
}

impl SimRobot {
    /// Place a robot at `pose`; its body is added to `world`
    pub fn new(world: ObstacleStore, pose: Pose) -> Result<Self, RobotError> {
        let robot = SimRobot {
            pose: Mutex::new(pose),
            world,
            body: ROBOT_ID,
            ground: GROUND_ID,
            translation_scale: 1.0,
        };
        robot.sync_body(&pose)?;
        Ok(robot)
    }

    /// Every translation travels `scale` times the commanded distance
    pub fn with_translation_scale(mut self, scale: f64) -> Self {
        self.translation_scale = scale;
        self
    }

    pub fn world(&self) -> &ObstacleStore {
        &self.world
    }

    /// Move the robot without simulating motion
    pub fn teleport(&self, pose: Pose) -> Result<(), RobotError> {
        *self.lock_pose()? = pose;
        self.sync_body(&pose)
    }

    fn lock_pose(&self) -> Result<std::sync::MutexGuard<'_, Pose>, RobotError> {
        self.pose
            .lock()
            .map_err(|_| RobotError::Motion("Failed to lock simulated pose".to_string()))
    }

    fn sync_body(&self, pose: &Pose) -> Result<(), RobotError> {
        self.world.upsert(ObstacleFootprint::around(
            self.body,
            pose.position(),
            ROBOT_HALF_WIDTH,
            ROBOT_HEIGHT,
        ))
    }

    fn is_self_or_ground(&self, id: ObstacleId) -> bool {
        id == self.body || id == self.ground
    }

    /// Nearest box along `heading` from `origin` accepted by `filter`
    fn nearest_hit(
        &self,
        origin: WorldPoint,
        heading: f64,
        max_distance: f64,
        filter: impl Fn(&ObstacleFootprint) -> bool,
    ) -> Result<Option<RayHit>, RobotError> {
        let direction = (heading.cos(), heading.sin());
        let mut best: Option<RayHit> = None;
        for footprint in self.world.snapshot()? {
            if self.is_self_or_ground(footprint.id) || !filter(&footprint) {
                continue;
            }
            let Some(distance) = ray_box_distance(origin, direction, &footprint) else {
                continue;
            };
            if distance > max_distance || best.is_some_and(|b| b.distance <= distance) {
                continue;
            }
            best = Some(RayHit {
                id: footprint.id,
                distance,
                min_z: footprint.min.z,
                max_z: footprint.max.z,
            });
        }
        Ok(best)
    }

    fn sonar(&self, pose: &Pose, heading: f64) -> Result<RangeReading, RobotError> {
        let hit = self.nearest_hit(pose.position(), heading, SONAR_RANGE, |f| {
            f.min.z <= SONAR_HEIGHT && f.max.z >= SONAR_HEIGHT
        })?;
        let distance = hit.map_or(SONAR_RANGE, |h| (h.distance - ROBOT_HALF_WIDTH).max(0.0));
        Ok(RangeReading::Distance(distance))
    }
}

/// 2D slab test. Returns the entry distance along a unit `direction`, or 0
/// when the origin is inside the box.
fn ray_box_distance(
    origin: WorldPoint,
    direction: (f64, f64),
    footprint: &ObstacleFootprint,
) -> Option<f64> {
    let mut t_enter = 0.0_f64;
    let mut t_exit = f64::INFINITY;
    let axes = [
        (origin.x, direction.0, footprint.min.x, footprint.max.x),
        (origin.y, direction.1, footprint.min.y, footprint.max.y),
    ];
    for (o, d, lo, hi) in axes {
        if d.abs() < 1e-12 {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let t1 = (lo - o) / d;
        let t2 = (hi - o) / d;
        t_enter = t_enter.max(t1.min(t2));
        t_exit = t_exit.min(t1.max(t2));
        if t_enter > t_exit {
            return None;
        }
    }
    Some(t_enter)
}

impl MotionPort for SimRobot {
    fn pose(&self) -> Result<Pose, RobotError> {
        Ok(*self.lock_pose()?)
    }

    fn rotate_by(&self, delta_theta: f64) -> Result<(), RobotError> {
        if !delta_theta.is_finite() {
            return Err(RobotError::Motion(format!("Invalid rotation {}", delta_theta)));
        }
        let mut pose = self.lock_pose()?;
        pose.theta = normalize_angle(pose.theta + delta_theta);
        trace!("Sim rotate {:.3} -> heading {:.3}", delta_theta, pose.theta);
        Ok(())
    }

    fn translate_by(&self, distance: f64) -> Result<(), RobotError> {
        if !distance.is_finite() {
            return Err(RobotError::Motion(format!("Invalid translation {}", distance)));
        }
        let moved = {
            let mut pose = self.lock_pose()?;
            let travelled = distance * self.translation_scale;
            pose.x += travelled * pose.theta.cos();
            pose.y += travelled * pose.theta.sin();
            *pose
        };
        trace!("Sim translate {:.3} -> ({:.3}, {:.3})", distance, moved.x, moved.y);
        self.sync_body(&moved)
    }
}

impl SensingPort for SimRobot {
    fn obstacle_footprints(
        &self,
        exclude: &HashSet<ObstacleId>,
    ) -> Result<Vec<ObstacleFootprint>, RobotError> {
        let mut footprints = self.world.snapshot_excluding(exclude)?;
        footprints.retain(|f| !self.is_self_or_ground(f.id));
        Ok(footprints)
    }
}

impl RayCaster for SimRobot {
    // The ray runs at body height, under anything hanging above the robot
    fn cast_ray(
        &self,
        pose: &Pose,
        max_distance: f64,
        band: HeightBand,
    ) -> Result<Option<RayHit>, RobotError> {
        self.nearest_hit(pose.position(), pose.theta, max_distance, |f| {
            f.min.z <= ROBOT_HEIGHT && band.admits(f.min.z, f.max.z)
        })
    }
}

/// Front and back sonar, measured from the body surface
impl RangeSensorSource for SimRobot {
    fn read_ranges(&self) -> Result<Vec<RangeReading>, RobotError> {
        let pose = self.pose()?;
        Ok(vec![
            self.sonar(&pose, pose.theta)?,
            self.sonar(&pose, pose.theta + PI)?,
        ])
    }
}

fn block(id: u32, min: (f64, f64, f64), max: (f64, f64, f64)) -> ObstacleFootprint {
    ObstacleFootprint::new(
        ObstacleId(id),
        Point3::new(min.0, min.1, min.2),
        Point3::new(max.0, max.1, max.2),
    )
}

/// The café: a 16 m square room with a door in the east wall, a counter on
/// the west side, four tables, a customer and a pendant lamp over the floor.
pub fn cafe_scene() -> Vec<ObstacleFootprint> {
    let wall = 0.1;
    let wall_height = 2.5;
    let mut scene = vec![
        block(GROUND_ID.0, (-10.0, -10.0, -0.01), (10.0, 10.0, 0.0)),
        block(2, (-8.0, 8.0 - wall, 0.0), (8.0, 8.0 + wall, wall_height)),
        block(3, (-8.0, -8.0 - wall, 0.0), (8.0, -8.0 + wall, wall_height)),
        block(4, (-8.0 - wall, -8.0, 0.0), (-8.0 + wall, 8.0, wall_height)),
        // East wall split by the door gap y in [-1.0, 0.0]
        block(5, (8.0 - wall, -8.0, 0.0), (8.0 + wall, -1.0, wall_height)),
        block(6, (8.0 - wall, 0.0, 0.0), (8.0 + wall, 8.0, wall_height)),
        block(COUNTER_ID.0, (-6.5, -1.5, 0.0), (-5.5, 1.5, 1.1)),
    ];
    for (k, (x, y)) in [(-2.5, -2.5), (2.5, -2.5), (2.5, 2.5), (-2.5, 2.5)]
        .into_iter()
        .enumerate()
    {
        scene.push(ObstacleFootprint::around(
            ObstacleId(8 + k as u32),
            WorldPoint::new(x, y),
            0.4,
            0.75,
        ));
    }
    scene.push(ObstacleFootprint::around(
        PERSON_ID,
        WorldPoint::new(4.5, 0.0),
        0.25,
        1.7,
    ));
    // Hangs above the robot; ignored by the grid and the forward ray
    scene.push(block(13, (-0.3, 4.7, 1.9), (0.3, 5.3, 2.2)));
    scene
}
