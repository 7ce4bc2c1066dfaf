//! Segment-by-segment path execution

use super::cancel::{Interrupt, Interruption};
use crate::common::types::{Pose, WorldPoint};
use crate::config::MotionConfig;
use crate::error::Result;
use crate::perception::ObstacleMonitor;
use crate::robot::MotionPort;
use serde::Serialize;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

// Shorter segments are treated as already reached
const MIN_SEGMENT: f64 = 1e-9;

/// What stopped execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockReason {
    /// The obstacle monitor reported something ahead
    Sensor,
    /// The next path cell became occupied in a fresh grid
    GridOccupied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    Blocked { segment: usize, reason: BlockReason },
    Interrupted(Interruption),
}

/// Realized pose after one segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExecutedStep {
    pub segment: usize,
    pub target: WorldPoint,
    pub pose: Pose,
    pub position_error: f64,
}

/// Turns a waypoint list into rotate-then-translate primitives
#[derive(Debug, Clone)]
pub struct MotionExecutor {
    angular_tolerance: f64,
    rotate_settle: Duration,
    translate_settle: Duration,
    record_trace: bool,
}

impl MotionExecutor {
    pub fn new(config: &MotionConfig) -> Self {
        MotionExecutor {
            angular_tolerance: config.angular_tolerance,
            rotate_settle: config.rotate_settle(),
            translate_settle: config.translate_settle(),
            record_trace: config.record_trace,
        }
    }

    fn settle(duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }

    /// Drive through `waypoints` in order.
    ///
    /// Before each segment `next_cell_blocked(segment)` is asked whether the
    /// target became occupied; the monitor is consulted after the rotation,
    /// right before the translation. The first positive answer aborts
    /// immediately and no later waypoint is visited.
    pub fn execute<F>(
        &self,
        motion: &dyn MotionPort,
        monitor: &dyn ObstacleMonitor,
        waypoints: &[WorldPoint],
        interrupt: &Interrupt,
        mut next_cell_blocked: F,
        steps: &mut Vec<ExecutedStep>,
    ) -> Result<ExecutionOutcome>
    where
        F: FnMut(usize) -> Result<bool>,
    {
        for (segment, target) in waypoints.iter().enumerate() {
            if let Some(interruption) = interrupt.check() {
                debug!("Execution interrupted before segment {}: {:?}", segment, interruption);
                return Ok(ExecutionOutcome::Interrupted(interruption));
            }

            if next_cell_blocked(segment)? {
                warn!("Waypoint {} ({:.2}, {:.2}) is now occupied", segment, target.x, target.y);
                return Ok(ExecutionOutcome::Blocked {
                    segment,
                    reason: BlockReason::GridOccupied,
                });
            }

            let pose = motion.pose()?;
            let distance = pose.position().distance_to(target);
            if distance < MIN_SEGMENT {
                continue;
            }

            let delta = pose.bearing_to(target);
            if delta.abs() > self.angular_tolerance {
                trace!("Segment {}: rotate {:.3} rad", segment, delta);
                motion.rotate_by(delta)?;
                Self::settle(self.rotate_settle);
            }

            let pose = motion.pose()?;
            if monitor.blocked(&pose) {
                warn!("{} reports an obstacle ahead of segment {}", monitor.name(), segment);
                return Ok(ExecutionOutcome::Blocked {
                    segment,
                    reason: BlockReason::Sensor,
                });
            }

            trace!("Segment {}: translate {:.3} m", segment, distance);
            motion.translate_by(distance)?;
            Self::settle(self.translate_settle);

            if self.record_trace {
                let pose = motion.pose()?;
                steps.push(ExecutedStep {
                    segment,
                    target: *target,
                    pose,
                    position_error: pose.position().distance_to(target),
                });
            }
        }

        Ok(ExecutionOutcome::Completed)
    }
}
