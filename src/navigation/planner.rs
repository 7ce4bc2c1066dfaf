//! Path planning module

use super::grid::{GridCell, OccupancyGrid};
use crate::config::{Connectivity, PlannerConfig};
use crate::error::{NavError, Result};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::f64::consts::SQRT_2;
use tracing::{debug, trace};

/// Trait for grid path planning algorithms
pub trait PathPlanner: Send + Sync {
    /// Plan a cell path from start to goal, both inclusive
    fn plan(&self, grid: &OccupancyGrid, start: GridCell, goal: GridCell) -> Result<Vec<GridCell>>;

    /// Get the name of this planner
    fn name(&self) -> &str;
}

const NEIGHBORS_4: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const NEIGHBORS_8: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Frontier entry, ordered by f-cost then by insertion sequence
#[derive(Debug, Clone, Copy)]
struct FrontierNode {
    cell: GridCell,
    g_cost: f64,
    f_cost: f64,
    seq: u64,
}

impl PartialEq for FrontierNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierNode {}

impl Ord for FrontierNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behaviour; earlier insertions win ties
        other
            .f_cost
            .partial_cmp(&self.f_cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for FrontierNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* over a binary occupancy grid.
///
/// Step cost is the Euclidean length of the move (1 or sqrt 2) and the
/// heuristic is the Euclidean distance to the goal, so returned paths are
/// cost-optimal for either connectivity.
#[derive(Debug, Clone)]
pub struct AStarPlanner {
    connectivity: Connectivity,
    max_expansions: usize,
}

impl AStarPlanner {
    pub fn new(config: &PlannerConfig) -> Self {
        AStarPlanner {
            connectivity: config.connectivity,
            max_expansions: config.max_expansions,
        }
    }

    fn offsets(&self) -> &'static [(i32, i32)] {
        match self.connectivity {
            Connectivity::Four => &NEIGHBORS_4,
            Connectivity::Eight => &NEIGHBORS_8,
        }
    }

    fn heuristic(from: GridCell, to: GridCell) -> f64 {
        ((to.i - from.i) as f64).hypot((to.j - from.j) as f64)
    }

    fn not_found(start: GridCell, goal: GridCell) -> NavError {
        NavError::PathNotFound {
            start_i: start.i,
            start_j: start.j,
            goal_i: goal.i,
            goal_j: goal.j,
        }
    }

    fn reconstruct(closed: &HashMap<GridCell, Option<GridCell>>, goal: GridCell) -> Vec<GridCell> {
        let mut path = vec![goal];
        let mut current = goal;
        while let Some(&Some(prev)) = closed.get(&current) {
            path.push(prev);
            current = prev;
        }
        path.reverse();
        path
    }
}

impl Default for AStarPlanner {
    fn default() -> Self {
        Self::new(&PlannerConfig::default())
    }
}

impl PathPlanner for AStarPlanner {
    fn plan(&self, grid: &OccupancyGrid, start: GridCell, goal: GridCell) -> Result<Vec<GridCell>> {
        let transform = grid.transform();
        for cell in [start, goal] {
            if !transform.contains(cell) {
                return Err(NavError::OutOfBounds {
                    i: cell.i,
                    j: cell.j,
                    width: transform.width,
                    height: transform.height,
                });
            }
        }
        if start == goal {
            return Ok(vec![start]);
        }
        if grid.is_occupied(goal) {
            debug!("Goal cell {} is occupied", goal);
            return Err(Self::not_found(start, goal));
        }

        let mut open = BinaryHeap::new();
        // Finalized cells and their predecessor
        let mut closed: HashMap<GridCell, Option<GridCell>> = HashMap::new();
        let mut parents: HashMap<GridCell, GridCell> = HashMap::new();
        let mut g_scores: HashMap<GridCell, f64> = HashMap::new();
        let mut seq = 0u64;

        g_scores.insert(start, 0.0);
        open.push(FrontierNode {
            cell: start,
            g_cost: 0.0,
            f_cost: Self::heuristic(start, goal),
            seq,
        });

        let mut expansions = 0usize;
        while let Some(node) = open.pop() {
            if closed.contains_key(&node.cell) {
                continue;
            }
            closed.insert(node.cell, parents.get(&node.cell).copied());

            if node.cell == goal {
                let path = Self::reconstruct(&closed, goal);
                trace!(
                    "A* reached {} in {} expansions, {} cells, cost {:.3}",
                    goal,
                    expansions,
                    path.len(),
                    node.g_cost
                );
                return Ok(path);
            }

            expansions += 1;
            if expansions > self.max_expansions {
                debug!("A* gave up after {} expansions", expansions);
                return Err(Self::not_found(start, goal));
            }

            for &(di, dj) in self.offsets() {
                let next = node.cell.offset(di, dj);
                if closed.contains_key(&next) || grid.is_occupied(next) {
                    continue;
                }
                let step = if di != 0 && dj != 0 { SQRT_2 } else { 1.0 };
                let tentative = node.g_cost + step;
                if tentative < g_scores.get(&next).copied().unwrap_or(f64::INFINITY) {
                    g_scores.insert(next, tentative);
                    parents.insert(next, node.cell);
                    seq += 1;
                    open.push(FrontierNode {
                        cell: next,
                        g_cost: tentative,
                        f_cost: tentative + Self::heuristic(next, goal),
                        seq,
                    });
                }
            }
        }

        debug!("A* exhausted the frontier after {} expansions", expansions);
        Err(Self::not_found(start, goal))
    }

    fn name(&self) -> &str {
        "AStarPlanner"
    }
}
