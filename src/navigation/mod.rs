//! Navigation module for CaféBot
//!
//! [`Navigator::navigate`] is the single entry point: it rebuilds the
//! occupancy grid from a fresh obstacle snapshot, plans with A*, drives the
//! path segment by segment and finishes with a direct correction onto the
//! exact goal.
pub mod grid;
pub mod planner;
pub mod snapshot;
pub mod trace;

use self::grid::{GridBuilder, GridCell, GridTransform, OccupancyGrid};
use self::planner::{AStarPlanner, PathPlanner};
use self::trace::{NavigationTrace, PlannedAttempt};
use crate::common::types::{ObstacleId, WorldPoint};
use crate::config::{NavigationConfig, ReplanConfig, ReplanMode};
use crate::control::{
    BlockReason, CancelToken, ExecutionOutcome, GoalCorrector, Interrupt, Interruption,
    MotionExecutor,
};
use crate::error::{NavError, Result};
use crate::perception::ObstacleMonitor;
use crate::robot::{MotionPort, SensingPort};
use serde::Serialize;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where to go and which bodies to disregard while planning
#[derive(Debug, Clone, Default)]
pub struct NavigationRequest {
    pub goal: WorldPoint,
    pub ignore: HashSet<ObstacleId>,
}

impl NavigationRequest {
    pub fn to(goal: WorldPoint) -> Self {
        NavigationRequest {
            goal,
            ignore: HashSet::new(),
        }
    }

    /// Leave `ids` out of the grid (e.g. the person being approached)
    pub fn ignoring(mut self, ids: impl IntoIterator<Item = ObstacleId>) -> Self {
        self.ignore.extend(ids);
        self
    }
}

/// Terminal result of one navigate call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NavigationOutcome {
    Reached,
    ObstacleBlocked,
    PathNotFound,
    InvalidGoal,
    Cancelled,
    TimedOut,
    /// Unexpected failure, including panics inside collaborators
    Fault(String),
}

impl NavigationOutcome {
    pub fn is_reached(&self) -> bool {
        matches!(self, NavigationOutcome::Reached)
    }
}

impl From<Interruption> for NavigationOutcome {
    fn from(interruption: Interruption) -> Self {
        match interruption {
            Interruption::Cancelled => NavigationOutcome::Cancelled,
            Interruption::TimedOut => NavigationOutcome::TimedOut,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NavigationResult {
    pub outcome: NavigationOutcome,
    pub trace: NavigationTrace,
}

/// Plans and drives one robot.
///
/// The navigator owns its collaborators and serializes calls through an
/// in-flight lock, so a background patrol and a customer request sharing
/// one robot never issue overlapping motion commands.
pub struct Navigator {
    motion: Arc<dyn MotionPort>,
    sensing: Arc<dyn SensingPort>,
    monitor: Box<dyn ObstacleMonitor>,
    planner: Box<dyn PathPlanner>,
    builder: GridBuilder,
    executor: MotionExecutor,
    corrector: GoalCorrector,
    replan: ReplanConfig,
    timeout: Option<Duration>,
    in_flight: Mutex<()>,
}

impl Navigator {
    /// Create a navigator with the A* planner configured from `config`
    pub fn new(
        config: &NavigationConfig,
        motion: Arc<dyn MotionPort>,
        sensing: Arc<dyn SensingPort>,
        monitor: Box<dyn ObstacleMonitor>,
    ) -> Self {
        Navigator {
            motion,
            sensing,
            monitor,
            planner: Box::new(AStarPlanner::new(&config.planner)),
            builder: GridBuilder::new(&config.grid),
            executor: MotionExecutor::new(&config.motion),
            corrector: GoalCorrector::new(&config.correction, &config.motion),
            replan: config.replan.clone(),
            timeout: config.timeout(),
            in_flight: Mutex::new(()),
        }
    }

    /// Replace the path planner
    pub fn with_planner(mut self, planner: Box<dyn PathPlanner>) -> Self {
        self.planner = planner;
        self
    }

    /// Bodies that never enter the grid, such as the robot itself and the floor
    pub fn with_ignored(mut self, ids: impl IntoIterator<Item = ObstacleId>) -> Self {
        self.builder = self.builder.with_ignored(ids);
        self
    }

    pub fn transform(&self) -> &GridTransform {
        self.builder.transform()
    }

    pub fn planner_name(&self) -> &str {
        self.planner.name()
    }

    pub fn monitor_name(&self) -> &str {
        self.monitor.name()
    }

    /// Navigate to the request's goal, blocking until a terminal outcome.
    /// Waits for any call already in flight on this navigator.
    pub fn navigate(&self, request: &NavigationRequest) -> NavigationResult {
        self.navigate_with_cancel(request, &CancelToken::new())
    }

    /// Like [`Navigator::navigate`], stopping between segments once `cancel` fires
    pub fn navigate_with_cancel(
        &self,
        request: &NavigationRequest,
        cancel: &CancelToken,
    ) -> NavigationResult {
        let _guard = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.run_guarded(request, cancel)
    }

    /// Navigate only if no other call is in flight; `None` when busy
    pub fn try_navigate(&self, request: &NavigationRequest) -> Option<NavigationResult> {
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("Navigator busy, rejecting request");
                return None;
            }
        };
        Some(self.run_guarded(request, &CancelToken::new()))
    }

    fn run_guarded(&self, request: &NavigationRequest, cancel: &CancelToken) -> NavigationResult {
        info!(
            "Navigating to ({:.3}, {:.3}), ignoring {} bodies",
            request.goal.x,
            request.goal.y,
            request.ignore.len()
        );
        let interrupt = Interrupt::new(cancel.clone(), self.timeout);
        let mut trace = NavigationTrace::new(request.goal);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run(request, &interrupt, &mut trace)
        }));
        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!("Navigation failed: {}", e);
                NavigationOutcome::Fault(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Navigation panicked: {}", message);
                NavigationOutcome::Fault(format!("panic: {}", message))
            }
        };

        info!(
            "Navigation finished: {:?} after {} attempt(s), {} replan(s)",
            outcome,
            trace.attempts.len(),
            trace.replans
        );
        NavigationResult { outcome, trace }
    }

    fn run(
        &self,
        request: &NavigationRequest,
        interrupt: &Interrupt,
        trace: &mut NavigationTrace,
    ) -> Result<NavigationOutcome> {
        let transform = *self.builder.transform();
        let goal_cell = match transform.world_to_cell(request.goal) {
            Some(cell) => cell,
            None => {
                warn!(
                    "Goal ({}, {}) lies outside the {}x{} grid",
                    request.goal.x, request.goal.y, transform.width, transform.height
                );
                return Ok(NavigationOutcome::InvalidGoal);
            }
        };

        loop {
            if let Some(interruption) = interrupt.check() {
                trace.interruption = Some(interruption);
                return Ok(interruption.into());
            }

            // Planning
            let start_cell = self.current_cell(&transform)?;
            let grid = self.fresh_grid(&request.ignore)?;
            let cells = match self.planner.plan(&grid, start_cell, goal_cell) {
                Ok(cells) => cells,
                Err(e @ NavError::PathNotFound { .. }) => {
                    warn!("{}: {}", self.planner.name(), e);
                    return Ok(NavigationOutcome::PathNotFound);
                }
                Err(e) => return Err(e),
            };
            let waypoints: Vec<WorldPoint> =
                cells.iter().map(|&cell| transform.cell_to_world(cell)).collect();
            debug!(
                "{} planned {} steps from {} to {}",
                self.planner.name(),
                cells.len() - 1,
                start_cell,
                goal_cell
            );
            trace.attempts.push(PlannedAttempt {
                start: start_cell,
                goal: goal_cell,
                cells: cells.clone(),
                waypoints: waypoints.clone(),
            });

            // Executing
            let outcome = self.executor.execute(
                self.motion.as_ref(),
                self.monitor.as_ref(),
                &waypoints,
                interrupt,
                |segment| self.next_cell_occupied(&cells, segment, &request.ignore),
                &mut trace.steps,
            )?;

            match outcome {
                ExecutionOutcome::Completed => break,
                ExecutionOutcome::Interrupted(interruption) => {
                    trace.interruption = Some(interruption);
                    return Ok(interruption.into());
                }
                ExecutionOutcome::Blocked {
                    reason: BlockReason::Sensor,
                    segment,
                } => {
                    warn!("Obstacle ahead of waypoint {}, aborting", segment);
                    trace.block_reason = Some(BlockReason::Sensor);
                    return Ok(NavigationOutcome::ObstacleBlocked);
                }
                ExecutionOutcome::Blocked {
                    reason: BlockReason::GridOccupied,
                    segment,
                } => {
                    if trace.replans >= self.replan.max_replans {
                        warn!("Replan budget of {} exhausted", self.replan.max_replans);
                        trace.block_reason = Some(BlockReason::GridOccupied);
                        return Ok(NavigationOutcome::ObstacleBlocked);
                    }
                    trace.replans += 1;
                    info!(
                        "Cell {} became occupied, replanning ({}/{})",
                        cells[segment], trace.replans, self.replan.max_replans
                    );
                }
            }
        }

        // Correcting
        let report = self
            .corrector
            .correct(self.motion.as_ref(), self.monitor.as_ref(), request.goal)?;
        debug!(
            "Goal correction: {:.4} m -> {:.4} m",
            report.residual_before, report.residual_after
        );
        trace.correction = Some(report);
        Ok(NavigationOutcome::Reached)
    }

    fn current_cell(&self, transform: &GridTransform) -> Result<GridCell> {
        let position = self.motion.pose()?.position();
        transform.world_to_cell(position).ok_or_else(|| {
            let cell = transform.world_to_cell_unchecked(position);
            NavError::OutOfBounds {
                i: cell.i,
                j: cell.j,
                width: transform.width,
                height: transform.height,
            }
        })
    }

    fn fresh_grid(&self, ignore: &HashSet<ObstacleId>) -> Result<OccupancyGrid> {
        let footprints = self.sensing.obstacle_footprints(ignore)?;
        self.builder.build(&footprints, ignore)
    }

    // The robot already stands in the first cell, so only later cells are checked
    fn next_cell_occupied(
        &self,
        cells: &[GridCell],
        segment: usize,
        ignore: &HashSet<ObstacleId>,
    ) -> Result<bool> {
        if self.replan.mode != ReplanMode::GridOccupancy || segment == 0 {
            return Ok(false);
        }
        Ok(self.fresh_grid(ignore)?.is_occupied(cells[segment]))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
