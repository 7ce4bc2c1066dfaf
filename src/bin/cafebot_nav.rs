//! CaféBot navigation demo on the simulated café
//!
//! Usage: `cafebot_nav [config.toml] [trace.json]`
//!
//! A background patrol and a customer request share one navigator. The
//! customer request interrupts the patrol and then waits on the navigator's
//! lock, so the robot never receives overlapping motion commands.

use anyhow::{Context, Result};
use cafebot_core::common::types::{Pose, WorldPoint};
use cafebot_core::navigation::snapshot::ObstacleStore;
use cafebot_core::perception::monitor_from_config;
use cafebot_core::robot::MotionPort;
use cafebot_core::sim::{cafe_scene, SimRobot, GROUND_ID, ROBOT_ID};
use cafebot_core::{
    CancelToken, NavigationConfig, NavigationOutcome, NavigationRequest, NavigationResult,
    Navigator,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PATROL_ROUTE: [(f64, f64); 3] = [(4.0, 4.0), (-4.0, 4.0), (0.0, -4.0)];
const CAPPUCCINO_COUNTER: (f64, f64) = (-5.0, 0.0);
const REQUEST_BUDGET: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = match args.get(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            NavigationConfig::from_file(path).with_context(|| format!("Failed to load {}", path))?
        }
        None => {
            info!("Using default configuration");
            NavigationConfig::default()
        }
    };
    let trace_path = args.get(2).map(PathBuf::from);

    let robot = Arc::new(SimRobot::new(ObstacleStore::new(cafe_scene()), Pose::default())?);
    let monitor = monitor_from_config(&config.monitor, robot.clone(), robot.clone());
    let navigator = Arc::new(
        Navigator::new(&config, robot.clone(), robot.clone(), monitor)
            .with_ignored([ROBOT_ID, GROUND_ID]),
    );
    info!(
        "Navigator ready: planner {}, monitor {}",
        navigator.planner_name(),
        navigator.monitor_name()
    );

    let patrol_cancel = CancelToken::new();
    let patrol_task = {
        let navigator = Arc::clone(&navigator);
        let cancel = patrol_cancel.clone();
        tokio::task::spawn_blocking(move || patrol(&navigator, &cancel))
    };

    // Give the patrol a head start before the customer shows up
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("Customer asked for a cappuccino, interrupting patrol");
    patrol_cancel.cancel();

    let request_cancel = CancelToken::new();
    let mut request = {
        let navigator = Arc::clone(&navigator);
        let cancel = request_cancel.clone();
        let goal = WorldPoint::new(CAPPUCCINO_COUNTER.0, CAPPUCCINO_COUNTER.1);
        tokio::task::spawn_blocking(move || {
            navigator.navigate_with_cancel(&NavigationRequest::to(goal), &cancel)
        })
    };

    let result = match tokio::time::timeout(REQUEST_BUDGET, &mut request).await {
        Ok(joined) => joined.context("Navigation task failed")?,
        Err(_) => {
            warn!("Request exceeded {:?}, cancelling", REQUEST_BUDGET);
            request_cancel.cancel();
            request.await.context("Navigation task failed")?
        }
    };

    let patrolled = patrol_task.await.context("Patrol task failed")?;
    info!("Patrol completed {} waypoint(s)", patrolled);

    let pose = robot.pose()?;
    if result.outcome.is_reached() {
        info!(
            "Arrived at the counter: ({:.4}, {:.4}), {} replan(s)",
            pose.x, pose.y, result.trace.replans
        );
    } else {
        warn!("Customer request ended with {:?}", result.outcome);
    }

    if let Some(path) = trace_path {
        let json = result.trace.to_json().context("Failed to serialize trace")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Trace written to {}", path.display());
    }

    Ok(())
}

/// Visit the patrol route until cancelled; returns the number of waypoints reached
fn patrol(navigator: &Navigator, cancel: &CancelToken) -> usize {
    let mut reached = 0;
    for &(x, y) in PATROL_ROUTE.iter() {
        let NavigationResult { outcome, .. } =
            navigator.navigate_with_cancel(&NavigationRequest::to(WorldPoint::new(x, y)), cancel);
        info!("Patrol waypoint ({}, {}): {:?}", x, y, outcome);
        match outcome {
            NavigationOutcome::Reached => reached += 1,
            NavigationOutcome::Cancelled | NavigationOutcome::TimedOut => break,
            _ => {}
        }
    }
    reached
}
