//! Error types for the navigation core

use thiserror::Error;

/// Failure reported by a robot backend (physical or simulated)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RobotError {
    #[error("Motion command failed: {0}")]
    Motion(String),

    #[error("Sensor read failed: {0}")]
    Sensor(String),
}

/// Navigation core error type
#[derive(Error, Debug)]
pub enum NavError {
    #[error("No path found from ({start_i},{start_j}) to ({goal_i},{goal_j})")]
    PathNotFound {
        start_i: i32,
        start_j: i32,
        goal_i: i32,
        goal_j: i32,
    },

    #[error("Cell ({i},{j}) lies outside the {width}x{height} grid")]
    OutOfBounds {
        i: i32,
        j: i32,
        width: usize,
        height: usize,
    },

    #[error("Malformed obstacle geometry for body {id}: {reason}")]
    MalformedObstacle { id: u32, reason: String },

    #[error("Robot error: {0}")]
    Robot(#[from] RobotError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, NavError>;
