//! Perception module: blocked-ahead detection
pub mod monitor;

pub use self::monitor::{
    monitor_from_config, CompositeMonitor, ObstacleMonitor, ProximityMonitor, RayCastMonitor,
};
