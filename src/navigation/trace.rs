//! Diagnostic record of one navigation call
//!
//! Nothing in the navigation loop reads the trace back; it exists for
//! plotting, tests and the JSON dump of the demo binary.

use super::grid::GridCell;
use crate::common::types::WorldPoint;
use crate::control::{BlockReason, CorrectionReport, ExecutedStep, Interruption};
use serde::Serialize;

/// One planning attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedAttempt {
    pub start: GridCell,
    pub goal: GridCell,
    pub cells: Vec<GridCell>,
    pub waypoints: Vec<WorldPoint>,
}

impl PlannedAttempt {
    /// Number of cell-to-cell moves
    pub fn step_count(&self) -> usize {
        self.cells.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationTrace {
    pub goal: WorldPoint,
    pub attempts: Vec<PlannedAttempt>,
    pub steps: Vec<ExecutedStep>,
    pub correction: Option<CorrectionReport>,
    pub replans: usize,
    pub block_reason: Option<BlockReason>,
    pub interruption: Option<Interruption>,
}

impl NavigationTrace {
    pub fn new(goal: WorldPoint) -> Self {
        NavigationTrace {
            goal,
            attempts: Vec::new(),
            steps: Vec::new(),
            correction: None,
            replans: 0,
            block_reason: None,
            interruption: None,
        }
    }

    /// The attempt that was executed last
    pub fn last_attempt(&self) -> Option<&PlannedAttempt> {
        self.attempts.last()
    }

    /// Largest distance between a realized pose and its targeted waypoint
    pub fn max_step_error(&self) -> f64 {
        self.steps
            .iter()
            .map(|s| s.position_error)
            .fold(0.0, f64::max)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
