//! Configuration loading for the navigation core

use crate::error::{NavError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct NavigationConfig {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub correction: CorrectionConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub replan: ReplanConfig,

    /// Wall-clock budget for one navigate call in milliseconds (none = unbounded)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Occupancy grid geometry
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GridConfig {
    /// Grid width in cells (default: 64)
    #[serde(default = "default_grid_cells")]
    pub width: usize,

    /// Grid height in cells (default: 64)
    #[serde(default = "default_grid_cells")]
    pub height: usize,

    /// Cell edge length in meters (default: 0.25)
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,

    /// Inflation radius around every sampled obstacle cell, in cells (default: 1)
    #[serde(default = "default_padding_cells")]
    pub padding_cells: i32,

    /// Bodies whose lowest point is above this height do not block (default: 1.0 m)
    #[serde(default = "default_height_ceiling")]
    pub height_ceiling: f64,

    /// Footprint sampling stride; clamped to half a cell (default: 0.1 m)
    #[serde(default = "default_sample_stride")]
    pub sample_stride: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: default_grid_cells(),
            height: default_grid_cells(),
            cell_size: default_cell_size(),
            padding_cells: default_padding_cells(),
            height_ceiling: default_height_ceiling(),
            sample_stride: default_sample_stride(),
        }
    }
}

/// Grid neighbourhood used by the planner
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Four,
    Eight,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PlannerConfig {
    #[serde(default = "default_connectivity")]
    pub connectivity: Connectivity,

    /// Give up after expanding this many cells (default: 200000)
    #[serde(default = "default_max_expansions")]
    pub max_expansions: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            connectivity: default_connectivity(),
            max_expansions: default_max_expansions(),
        }
    }
}

/// Motion executor pacing
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MotionConfig {
    /// Skip rotations smaller than this (radians, default: 0.01)
    #[serde(default = "default_angular_tolerance")]
    pub angular_tolerance: f64,

    /// Settle delay after each rotation in milliseconds (default: 300)
    #[serde(default = "default_rotate_settle_ms")]
    pub rotate_settle_ms: u64,

    /// Settle delay after each translation in milliseconds (default: 500)
    #[serde(default = "default_translate_settle_ms")]
    pub translate_settle_ms: u64,

    /// Record realized poses and per-step error in the trace (default: true)
    #[serde(default = "default_true")]
    pub record_trace: bool,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            angular_tolerance: default_angular_tolerance(),
            rotate_settle_ms: default_rotate_settle_ms(),
            translate_settle_ms: default_translate_settle_ms(),
            record_trace: default_true(),
        }
    }
}

impl MotionConfig {
    pub fn rotate_settle(&self) -> Duration {
        Duration::from_millis(self.rotate_settle_ms)
    }

    pub fn translate_settle(&self) -> Duration {
        Duration::from_millis(self.translate_settle_ms)
    }

    /// No settle delays, for simulation and tests
    pub fn immediate() -> Self {
        Self {
            rotate_settle_ms: 0,
            translate_settle_ms: 0,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CorrectionConfig {
    /// Residual distance above which a final correction is applied (default: 1e-4 m)
    #[serde(default = "default_correction_threshold")]
    pub threshold: f64,

    /// Consult the obstacle monitor before the correction move (default: false)
    #[serde(default)]
    pub check_obstacles: bool,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            threshold: default_correction_threshold(),
            check_obstacles: false,
        }
    }
}

/// Which obstacle monitor strategy to build
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorKind {
    Proximity,
    RayCast,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_kind")]
    pub kind: MonitorKind,

    /// Proximity readings below this distance block (default: 0.3 m)
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f64,

    /// Forward ray length (default: 0.5 m)
    #[serde(default = "default_lookahead")]
    pub lookahead: f64,

    /// Bodies starting above this height are ignored by the ray (default: 1.0 m)
    #[serde(default = "default_height_ceiling")]
    pub height_ceiling: f64,

    /// Bodies lower than this are traversable (default: 0.05 m)
    #[serde(default = "default_min_obstacle_height")]
    pub min_obstacle_height: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            kind: default_monitor_kind(),
            distance_threshold: default_distance_threshold(),
            lookahead: default_lookahead(),
            height_ceiling: default_height_ceiling(),
            min_obstacle_height: default_min_obstacle_height(),
        }
    }
}

/// Who reacts to a blocked path
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplanMode {
    /// Abort with `ObstacleBlocked`; the caller issues a fresh request
    Caller,
    /// Re-check the grid before every step and replan from the current pose
    GridOccupancy,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReplanConfig {
    #[serde(default = "default_replan_mode")]
    pub mode: ReplanMode,

    /// Replans allowed within one navigate call (default: 10)
    #[serde(default = "default_max_replans")]
    pub max_replans: usize,
}

impl Default for ReplanConfig {
    fn default() -> Self {
        Self {
            mode: default_replan_mode(),
            max_replans: default_max_replans(),
        }
    }
}

impl NavigationConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: NavigationConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        let g = &self.grid;
        if g.width == 0 || g.height == 0 {
            return Err(NavError::Config("Grid dimensions must be positive".to_string()));
        }
        if g.width > i32::MAX as usize || g.height > i32::MAX as usize {
            return Err(NavError::Config("Grid dimensions are too large".to_string()));
        }
        if !(g.cell_size > 0.0 && g.cell_size.is_finite()) {
            return Err(NavError::Config("Cell size must be positive".to_string()));
        }
        if g.padding_cells < 0 {
            return Err(NavError::Config("Padding must be non-negative".to_string()));
        }
        if !(g.sample_stride > 0.0) {
            return Err(NavError::Config("Sample stride must be positive".to_string()));
        }
        if self.planner.max_expansions == 0 {
            return Err(NavError::Config("Max expansions must be positive".to_string()));
        }
        if self.motion.angular_tolerance < 0.0 {
            return Err(NavError::Config(
                "Angular tolerance must be non-negative".to_string(),
            ));
        }
        if self.correction.threshold < 0.0 {
            return Err(NavError::Config(
                "Correction threshold must be non-negative".to_string(),
            ));
        }
        let m = &self.monitor;
        if m.distance_threshold <= 0.0 || m.lookahead <= 0.0 {
            return Err(NavError::Config(
                "Monitor distances must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// Default value functions
fn default_grid_cells() -> usize {
    64
}
fn default_cell_size() -> f64 {
    0.25
}
fn default_padding_cells() -> i32 {
    1
}
fn default_height_ceiling() -> f64 {
    1.0
}
fn default_sample_stride() -> f64 {
    0.1
}
fn default_connectivity() -> Connectivity {
    Connectivity::Eight
}
fn default_max_expansions() -> usize {
    200_000
}
fn default_angular_tolerance() -> f64 {
    0.01
}
fn default_rotate_settle_ms() -> u64 {
    300
}
fn default_translate_settle_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}
fn default_correction_threshold() -> f64 {
    1e-4
}
fn default_monitor_kind() -> MonitorKind {
    MonitorKind::RayCast
}
fn default_distance_threshold() -> f64 {
    0.3
}
fn default_lookahead() -> f64 {
    0.5
}
fn default_min_obstacle_height() -> f64 {
    0.05
}
fn default_replan_mode() -> ReplanMode {
    ReplanMode::Caller
}
fn default_max_replans() -> usize {
    10
}
