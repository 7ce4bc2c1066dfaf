//! Navigation core for the CaféBot social-service robot.
//!
//! Builds an occupancy grid from obstacle footprints, plans with A*, drives
//! the path through blocking motion primitives while an obstacle monitor
//! watches ahead, and corrects onto the exact goal at the end. Robots are
//! reached only through the ports in [`robot`].
pub mod common;
pub mod config;
pub mod control;
pub mod error;
pub mod navigation;
pub mod perception;
pub mod robot;
pub mod sim;

pub use crate::config::NavigationConfig;
pub use crate::control::CancelToken;
pub use crate::error::{NavError, Result, RobotError};
pub use crate::navigation::{NavigationOutcome, NavigationRequest, NavigationResult, Navigator};
