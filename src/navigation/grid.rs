//! Occupancy grid for navigation
//!
//! A binary grid in robot-world coordinates, centered on the world origin.
//! Grids are rebuilt wholesale from an obstacle snapshot on every planning
//! attempt; [`GridBuilder`] is the only code that writes cells.

use crate::common::types::{ObstacleFootprint, ObstacleId, WorldPoint};
use crate::config::GridConfig;
use crate::error::{NavError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, trace, warn};

const FALLBACK_SAMPLE_STRIDE: f64 = 0.05;

/// Integer grid index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCell {
    pub i: i32,
    pub j: i32,
}

impl GridCell {
    pub fn new(i: i32, j: i32) -> Self {
        GridCell { i, j }
    }

    pub fn offset(&self, di: i32, dj: i32) -> Self {
        GridCell::new(self.i + di, self.j + dj)
    }

    /// Number of 8-connected steps between two cells
    pub fn chebyshev_distance(&self, other: &GridCell) -> i32 {
        (self.i - other.i).abs().max((self.j - other.j).abs())
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.i, self.j)
    }
}

/// World <-> grid coordinate convention.
///
/// Cell `(W/2, H/2)` contains the world origin; `world_to_cell` floors, so
/// `cell_to_world` returns the cell center and a round trip lands within half
/// a cell of the input on each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridTransform {
    pub width: usize,
    pub height: usize,
    pub cell_size: f64,
}

impl GridTransform {
    pub fn new(width: usize, height: usize, cell_size: f64) -> Self {
        GridTransform {
            width,
            height,
            cell_size,
        }
    }

    pub fn from_config(config: &GridConfig) -> Self {
        Self::new(config.width, config.height, config.cell_size)
    }

    fn half_width(&self) -> i32 {
        (self.width / 2) as i32
    }

    fn half_height(&self) -> i32 {
        (self.height / 2) as i32
    }

    pub fn contains(&self, cell: GridCell) -> bool {
        cell.i >= 0 && cell.i < self.width as i32 && cell.j >= 0 && cell.j < self.height as i32
    }

    /// Grid index of a world point without a bounds check. Indices past the
    /// `i32` range saturate.
    pub fn world_to_cell_unchecked(&self, point: WorldPoint) -> GridCell {
        let i = (point.x / self.cell_size).floor() + self.half_width() as f64;
        let j = (point.y / self.cell_size).floor() + self.half_height() as f64;
        GridCell::new(i as i32, j as i32)
    }

    /// Grid index of a world point, `None` when it falls outside the grid
    pub fn world_to_cell(&self, point: WorldPoint) -> Option<GridCell> {
        if !point.is_finite() {
            return None;
        }
        let cell = self.world_to_cell_unchecked(point);
        self.contains(cell).then_some(cell)
    }

    /// World coordinates of the cell center
    pub fn cell_to_world(&self, cell: GridCell) -> WorldPoint {
        WorldPoint::new(
            (cell.i - self.half_width()) as f64 * self.cell_size + 0.5 * self.cell_size,
            (cell.j - self.half_height()) as f64 * self.cell_size + 0.5 * self.cell_size,
        )
    }

    fn index(&self, cell: GridCell) -> usize {
        cell.j as usize * self.width + cell.i as usize
    }
}

/// Binary occupancy grid
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    transform: GridTransform,
    cells: Vec<bool>,
}

impl OccupancyGrid {
    /// A grid with every cell free
    pub fn empty(transform: GridTransform) -> Self {
        OccupancyGrid {
            transform,
            cells: vec![false; transform.width * transform.height],
        }
    }

    /// A grid with exactly the given in-bounds cells occupied
    pub fn from_occupied(transform: GridTransform, occupied: impl IntoIterator<Item = GridCell>) -> Self {
        let mut grid = Self::empty(transform);
        for cell in occupied {
            grid.mark(cell);
        }
        grid
    }

    fn mark(&mut self, cell: GridCell) {
        if self.transform.contains(cell) {
            let index = self.transform.index(cell);
            self.cells[index] = true;
        }
    }

    pub fn transform(&self) -> &GridTransform {
        &self.transform
    }

    /// Out-of-bounds cells count as occupied
    pub fn is_occupied(&self, cell: GridCell) -> bool {
        if !self.transform.contains(cell) {
            return true;
        }
        self.cells[self.transform.index(cell)]
    }

    pub fn is_free(&self, cell: GridCell) -> bool {
        !self.is_occupied(cell)
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// ASCII rendering, north up, with `#` for occupied cells
    pub fn render(&self, path: &[GridCell]) -> String {
        let on_path: HashSet<&GridCell> = path.iter().collect();
        let mut out = String::with_capacity((self.transform.width + 1) * self.transform.height);
        for j in (0..self.transform.height as i32).rev() {
            for i in 0..self.transform.width as i32 {
                let cell = GridCell::new(i, j);
                out.push(if on_path.contains(&cell) {
                    '*'
                } else if self.is_occupied(cell) {
                    '#'
                } else {
                    '.'
                });
            }
            out.push('\n');
        }
        out
    }
}

/// Rasterizes obstacle footprints into an [`OccupancyGrid`]
#[derive(Debug, Clone)]
pub struct GridBuilder {
    transform: GridTransform,
    padding_cells: i32,
    height_ceiling: f64,
    sample_stride: f64,
    ignored: HashSet<ObstacleId>,
}

impl GridBuilder {
    pub fn new(config: &GridConfig) -> Self {
        let transform = GridTransform::from_config(config);
        let half_cell = 0.5 * config.cell_size;
        let mut sample_stride = if config.sample_stride > 0.0 {
            config.sample_stride.min(half_cell)
        } else {
            half_cell
        };
        if !(sample_stride > 0.0 && sample_stride.is_finite()) {
            warn!(
                "Unusable sample stride {} for cell size {}, using {} m",
                config.sample_stride, config.cell_size, FALLBACK_SAMPLE_STRIDE
            );
            sample_stride = FALLBACK_SAMPLE_STRIDE;
        }
        GridBuilder {
            transform,
            padding_cells: config.padding_cells.max(0),
            height_ceiling: config.height_ceiling,
            sample_stride,
            ignored: HashSet::new(),
        }
    }

    /// Bodies that never enter the grid (robot body, ground plane)
    pub fn with_ignored(mut self, ids: impl IntoIterator<Item = ObstacleId>) -> Self {
        self.ignored.extend(ids);
        self
    }

    pub fn transform(&self) -> &GridTransform {
        &self.transform
    }

    /// Build a fresh grid. `exclude` adds per-request exclusions on top of the
    /// builder's own ignore set.
    pub fn build(
        &self,
        footprints: &[ObstacleFootprint],
        exclude: &HashSet<ObstacleId>,
    ) -> Result<OccupancyGrid> {
        let mut seeds: HashSet<GridCell> = HashSet::new();
        let mut rasterized = 0usize;
        let mut above_ceiling = 0usize;

        for footprint in footprints {
            if self.ignored.contains(&footprint.id) || exclude.contains(&footprint.id) {
                continue;
            }
            if let Some(reason) = footprint.defect() {
                return Err(NavError::MalformedObstacle {
                    id: footprint.id.0,
                    reason,
                });
            }
            if footprint.min.z > self.height_ceiling {
                above_ceiling += 1;
                continue;
            }
            if self.sample_footprint(footprint, &mut seeds) {
                rasterized += 1;
            }
        }

        let grid = self.inflate(&seeds);
        debug!(
            "Built {}x{} grid: {} obstacles rasterized, {} above ceiling, {} cells occupied",
            self.transform.width,
            self.transform.height,
            rasterized,
            above_ceiling,
            grid.occupied_count()
        );
        Ok(grid)
    }

    /// World rectangle whose samples can still seed cells: the grid extent
    /// widened by the padding on every side
    fn sampling_window(&self) -> (WorldPoint, WorldPoint) {
        let t = &self.transform;
        let pad = self.padding_cells as f64;
        let lo = WorldPoint::new(
            (-(t.half_width() as f64) - pad) * t.cell_size,
            (-(t.half_height() as f64) - pad) * t.cell_size,
        );
        let hi = WorldPoint::new(
            (t.width as f64 - t.half_width() as f64 + pad) * t.cell_size,
            (t.height as f64 - t.half_height() as f64 + pad) * t.cell_size,
        );
        (lo, hi)
    }

    /// Sample the 2D rectangle of one footprint, clipped to the sampling
    /// window; returns false when it cannot touch the grid at all
    fn sample_footprint(&self, footprint: &ObstacleFootprint, seeds: &mut HashSet<GridCell>) -> bool {
        let (lo, hi) = self.sampling_window();
        if !(footprint.max.x >= lo.x
            && footprint.max.y >= lo.y
            && footprint.min.x < hi.x
            && footprint.min.y < hi.y)
        {
            trace!("Obstacle {} lies outside the grid", footprint.id);
            return false;
        }

        let min_x = footprint.min.x.max(lo.x);
        let min_y = footprint.min.y.max(lo.y);
        let span_x = (footprint.max.x.min(hi.x) - min_x).max(0.0);
        let span_y = (footprint.max.y.min(hi.y) - min_y).max(0.0);
        let steps_x = (span_x / self.sample_stride).ceil() as usize;
        let steps_y = (span_y / self.sample_stride).ceil() as usize;

        let pad = self.padding_cells;
        for sx in 0..=steps_x {
            let x = if steps_x == 0 {
                min_x
            } else {
                min_x + span_x * sx as f64 / steps_x as f64
            };
            for sy in 0..=steps_y {
                let y = if steps_y == 0 {
                    min_y
                } else {
                    min_y + span_y * sy as f64 / steps_y as f64
                };
                let cell = self.transform.world_to_cell_unchecked(WorldPoint::new(x, y));
                // Seeds just outside the border still inflate into the grid
                if cell.i >= -pad
                    && cell.j >= -pad
                    && cell.i < self.transform.width as i32 + pad
                    && cell.j < self.transform.height as i32 + pad
                {
                    seeds.insert(cell);
                }
            }
        }
        true
    }

    /// Mark every seed and its neighbours within the padding radius
    fn inflate(&self, seeds: &HashSet<GridCell>) -> OccupancyGrid {
        let mut grid = OccupancyGrid::empty(self.transform);
        let pad = self.padding_cells;
        for seed in seeds {
            for dj in -pad..=pad {
                for di in -pad..=pad {
                    grid.mark(seed.offset(di, dj));
                }
            }
        }
        grid
    }
}
