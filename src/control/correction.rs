//! Final goal correction
//!
//! Waypoints are cell centers, so a completed path leaves the robot up to
//! half a cell away from the requested goal. One direct rotate+translate
//! toward the exact goal removes that bias.

use crate::common::types::WorldPoint;
use crate::config::{CorrectionConfig, MotionConfig};
use crate::error::Result;
use crate::perception::ObstacleMonitor;
use crate::robot::MotionPort;
use serde::Serialize;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// What the corrector did
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CorrectionReport {
    pub residual_before: f64,
    pub residual_after: f64,
    pub applied: bool,
    pub skipped_for_obstacle: bool,
}

#[derive(Debug, Clone)]
pub struct GoalCorrector {
    threshold: f64,
    angular_tolerance: f64,
    check_obstacles: bool,
    rotate_settle: Duration,
    translate_settle: Duration,
}

impl GoalCorrector {
    pub fn new(config: &CorrectionConfig, motion: &MotionConfig) -> Self {
        GoalCorrector {
            threshold: config.threshold,
            angular_tolerance: motion.angular_tolerance,
            check_obstacles: config.check_obstacles,
            rotate_settle: motion.rotate_settle(),
            translate_settle: motion.translate_settle(),
        }
    }

    /// Move straight to `goal` if the residual exceeds the threshold
    pub fn correct(
        &self,
        motion: &dyn MotionPort,
        monitor: &dyn ObstacleMonitor,
        goal: WorldPoint,
    ) -> Result<CorrectionReport> {
        let pose = motion.pose()?;
        let residual = pose.position().distance_to(&goal);
        let mut report = CorrectionReport {
            residual_before: residual,
            residual_after: residual,
            applied: false,
            skipped_for_obstacle: false,
        };
        if residual <= self.threshold {
            return Ok(report);
        }

        debug!("Applying correction: residual {:.4} m", residual);
        let bearing = pose.bearing_to(&goal);
        // A skipped small turn must not leave more lateral error than the threshold
        let lateral = residual * bearing.sin().abs();
        if bearing.abs() > self.angular_tolerance || lateral > self.threshold {
            motion.rotate_by(bearing)?;
            if !self.rotate_settle.is_zero() {
                thread::sleep(self.rotate_settle);
            }
        }

        if self.check_obstacles && monitor.blocked(&motion.pose()?) {
            warn!("{} reports an obstacle, skipping goal correction", monitor.name());
            report.skipped_for_obstacle = true;
            return Ok(report);
        }

        motion.translate_by(residual)?;
        if !self.translate_settle.is_zero() {
            thread::sleep(self.translate_settle);
        }

        report.applied = true;
        report.residual_after = motion.pose()?.position().distance_to(&goal);
        Ok(report)
    }
}
