//! Obstacle monitors
//!
//! A monitor answers one question right before and after every motion
//! primitive: is something in the way? Sensor failures fail open: the error
//! is logged and the monitor reports a clear path, so a glitching sensor
//! never freezes the robot in place.

use crate::common::types::Pose;
use crate::config::{MonitorConfig, MonitorKind};
use crate::error::{NavError, Result, RobotError};
use crate::robot::{HeightBand, RangeSensorSource, RayCaster};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tracing::{trace, warn};

/// Trait for blocked-ahead detectors
pub trait ObstacleMonitor: Debug + Send + Sync {
    /// Whether the robot at `pose` should stop
    fn blocked(&self, pose: &Pose) -> bool;

    /// Get the name of this monitor
    fn name(&self) -> &str;

    /// Configure the monitor with parameters
    fn configure(&mut self, params: &HashMap<String, f64>) -> Result<()>;
}

/// Fuses a fixed array of range sensors against a distance threshold
pub struct ProximityMonitor {
    source: Arc<dyn RangeSensorSource>,
    distance_threshold: f64,
    // Only these reading indices are considered when set
    channels: Option<Vec<usize>>,
}

impl ProximityMonitor {
    pub fn new(source: Arc<dyn RangeSensorSource>, distance_threshold: f64) -> Self {
        ProximityMonitor {
            source,
            distance_threshold,
            channels: None,
        }
    }

    pub fn from_config(source: Arc<dyn RangeSensorSource>, config: &MonitorConfig) -> Self {
        Self::new(source, config.distance_threshold)
    }

    /// Restrict fusion to the given reading indices (e.g. the central front laser segments)
    pub fn with_channels(mut self, channels: Vec<usize>) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Smallest usable distance among the selected readings
    pub fn nearest(&self) -> std::result::Result<Option<f64>, RobotError> {
        let readings = self.source.read_ranges()?;
        let selected: Vec<f64> = match &self.channels {
            Some(channels) => channels
                .iter()
                .filter_map(|&i| readings.get(i))
                .map(|r| r.distance())
                .collect(),
            None => readings.iter().map(|r| r.distance()).collect(),
        };
        Ok(selected
            .into_iter()
            .filter(|d| d.is_finite())
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d)))))
    }
}

impl Debug for ProximityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProximityMonitor")
            .field("distance_threshold", &self.distance_threshold)
            .field("channels", &self.channels)
            .finish()
    }
}

impl ObstacleMonitor for ProximityMonitor {
    fn blocked(&self, _pose: &Pose) -> bool {
        match self.nearest() {
            Ok(Some(distance)) => {
                trace!("Proximity: nearest reading {:.2} m", distance);
                distance < self.distance_threshold
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Proximity sensor read failed, treating path as clear: {}", e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        "ProximityMonitor"
    }

    fn configure(&mut self, params: &HashMap<String, f64>) -> Result<()> {
        if let Some(&threshold) = params.get("distance_threshold") {
            if threshold <= 0.0 {
                return Err(NavError::Config(
                    "Distance threshold must be positive".to_string(),
                ));
            }
            self.distance_threshold = threshold;
        }
        Ok(())
    }
}

/// Casts a ray along the current heading
pub struct RayCastMonitor {
    caster: Arc<dyn RayCaster>,
    lookahead: f64,
    height_ceiling: f64,
    min_obstacle_height: f64,
}

impl RayCastMonitor {
    pub fn new(caster: Arc<dyn RayCaster>, lookahead: f64) -> Self {
        let defaults = MonitorConfig::default();
        RayCastMonitor {
            caster,
            lookahead,
            height_ceiling: defaults.height_ceiling,
            min_obstacle_height: defaults.min_obstacle_height,
        }
    }

    pub fn from_config(caster: Arc<dyn RayCaster>, config: &MonitorConfig) -> Self {
        RayCastMonitor {
            caster,
            lookahead: config.lookahead,
            height_ceiling: config.height_ceiling,
            min_obstacle_height: config.min_obstacle_height,
        }
    }
}

impl Debug for RayCastMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RayCastMonitor")
            .field("lookahead", &self.lookahead)
            .field("height_ceiling", &self.height_ceiling)
            .field("min_obstacle_height", &self.min_obstacle_height)
            .finish()
    }
}

impl ObstacleMonitor for RayCastMonitor {
    fn blocked(&self, pose: &Pose) -> bool {
        let band = HeightBand::new(self.min_obstacle_height, self.height_ceiling);
        match self.caster.cast_ray(pose, self.lookahead, band) {
            Ok(Some(hit)) => {
                let blocking =
                    hit.distance < self.lookahead && band.admits(hit.min_z, hit.max_z);
                trace!(
                    "Ray hit body {} at {:.2} m (z {:.2}..{:.2}), blocking={}",
                    hit.id,
                    hit.distance,
                    hit.min_z,
                    hit.max_z,
                    blocking
                );
                blocking
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Ray cast failed, treating path as clear: {}", e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        "RayCastMonitor"
    }

    fn configure(&mut self, params: &HashMap<String, f64>) -> Result<()> {
        if let Some(&lookahead) = params.get("lookahead") {
            if lookahead <= 0.0 {
                return Err(NavError::Config("Lookahead must be positive".to_string()));
            }
            self.lookahead = lookahead;
        }

        if let Some(&ceiling) = params.get("height_ceiling") {
            if ceiling <= 0.0 {
                return Err(NavError::Config(
                    "Height ceiling must be positive".to_string(),
                ));
            }
            self.height_ceiling = ceiling;
        }

        if let Some(&min_height) = params.get("min_obstacle_height") {
            if min_height < 0.0 {
                return Err(NavError::Config(
                    "Minimum obstacle height must be non-negative".to_string(),
                ));
            }
            self.min_obstacle_height = min_height;
        }

        Ok(())
    }
}

/// Blocked when any member monitor is blocked
#[derive(Debug, Default)]
pub struct CompositeMonitor {
    monitors: Vec<Box<dyn ObstacleMonitor>>,
}

impl CompositeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<M: ObstacleMonitor + 'static>(mut self, monitor: M) -> Self {
        self.monitors.push(Box::new(monitor));
        self
    }
}

impl ObstacleMonitor for CompositeMonitor {
    fn blocked(&self, pose: &Pose) -> bool {
        self.monitors.iter().any(|m| m.blocked(pose))
    }

    fn name(&self) -> &str {
        "CompositeMonitor"
    }

    fn configure(&mut self, params: &HashMap<String, f64>) -> Result<()> {
        for monitor in &mut self.monitors {
            monitor.configure(params)?;
        }
        Ok(())
    }
}

/// Build the strategy selected by `config.kind`
pub fn monitor_from_config(
    config: &MonitorConfig,
    ranges: Arc<dyn RangeSensorSource>,
    caster: Arc<dyn RayCaster>,
) -> Box<dyn ObstacleMonitor> {
    match config.kind {
        MonitorKind::Proximity => Box::new(ProximityMonitor::from_config(ranges, config)),
        MonitorKind::RayCast => Box::new(RayCastMonitor::from_config(caster, config)),
    }
}
