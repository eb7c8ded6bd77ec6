use bevy::prelude::*;

use super::config::GridConfig;
use super::math::planar;
use super::oracles::{AgentId, OccupancyOracle};

/// Uniform spatial hash of agent discs, rebuilt once per tick.
///
/// Each agent is stored in the single cell containing its centre. Queries scan
/// every cell within `radius + max_radius` of the probe, so footprints that
/// straddle cell borders are still found.
///
/// # Performance
///
/// - **Insert:** O(1)
/// - **Query:** O(k) where k = agents in nearby cells
/// - **Clear:** O(cells), reuses allocated vectors
#[derive(Resource, Debug)]
pub struct AgentDiscIndex {
    origin: Vec2,
    cell_size: f32,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<(AgentId, Vec2, f32)>>,
    /// Agents whose centre fell outside the hashed area. Always scanned.
    overflow: Vec<(AgentId, Vec2, f32)>,
    max_radius: f32,
}

impl AgentDiscIndex {
    pub fn new(origin: Vec3, width: f32, height: f32, cell_size: f32) -> Self {
        let cell_size = if cell_size > 0.0 { cell_size } else { 1.0 };
        let cols = (width.max(0.0) / cell_size).ceil() as usize + 1;
        let rows = (height.max(0.0) / cell_size).ceil() as usize + 1;
        Self {
            origin: planar(origin),
            cell_size,
            cols,
            rows,
            cells: vec![Vec::new(); cols * rows],
            overflow: Vec::new(),
            max_radius: 0.0,
        }
    }

    /// Index covering a navigation grid, hashed at four grid cells per bucket.
    pub fn for_grid(config: &GridConfig) -> Self {
        let extent = Vec2::new(config.width as f32, config.height as f32) * config.cell_size;
        Self::new(config.origin, extent.x, extent.y, config.cell_size * 4.0)
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.overflow.clear();
        self.max_radius = 0.0;
    }

    pub fn insert(&mut self, agent: AgentId, position: Vec3, radius: f32) {
        let p = planar(position);
        self.max_radius = self.max_radius.max(radius);
        match self.cell_of(p) {
            Some((col, row)) => self.cells[row * self.cols + col].push((agent, p, radius)),
            None => self.overflow.push((agent, p, radius)),
        }
    }

    /// Total number of indexed agents.
    pub fn len(&self) -> usize {
        self.cells.iter().map(|c| c.len()).sum::<usize>() + self.overflow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell_of(&self, p: Vec2) -> Option<(usize, usize)> {
        let local = (p - self.origin) / self.cell_size;
        if local.x < 0.0 || local.y < 0.0 {
            return None;
        }
        let (col, row) = (local.x as usize, local.y as usize);
        (col < self.cols && row < self.rows).then_some((col, row))
    }

    fn cell_range(&self, p: Vec2, reach: f32) -> (usize, usize, usize, usize) {
        let min = (p - Vec2::splat(reach) - self.origin) / self.cell_size;
        let max = (p + Vec2::splat(reach) - self.origin) / self.cell_size;
        // Clamp to 0 after the float floor to avoid usize underflow.
        let min_col = (min.x.floor() as isize).max(0) as usize;
        let min_row = (min.y.floor() as isize).max(0) as usize;
        let max_col = (max.x.floor() as isize).min(self.cols as isize - 1).max(0) as usize;
        let max_row = (max.y.floor() as isize).min(self.rows as isize - 1).max(0) as usize;
        (min_col, max_col, min_row, max_row)
    }
}

impl OccupancyOracle for AgentDiscIndex {
    fn is_disc_occupied(&self, center: Vec3, radius: f32, exclude: Option<AgentId>) -> bool {
        let p = planar(center);
        let overlaps = |&(id, pos, r): &(AgentId, Vec2, f32)| {
            Some(id) != exclude && pos.distance_squared(p) < (r + radius) * (r + radius)
        };

        if self.overflow.iter().any(overlaps) {
            return true;
        }

        let (min_col, max_col, min_row, max_row) = self.cell_range(p, radius + self.max_radius);
        for row in min_row..=max_row {
            for col in min_col..=max_col {
                if self.cells[row * self.cols + col].iter().any(overlaps) {
                    return true;
                }
            }
        }
        false
    }
}
