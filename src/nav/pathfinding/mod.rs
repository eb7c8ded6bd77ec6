mod types;
mod astar;
mod smoothing;
mod scheduler;

#[cfg(test)]
mod tests;

// ============================================================================
// PUBLIC API
// ============================================================================

pub use types::{RequestId, PathStatus, PathResult, PathCallback, PathRequest};
pub use astar::{PathSolver, octile_distance, nearest_walkable, STRAIGHT_COST, DIAGONAL_COST};
pub use smoothing::{smooth, smooth_to_world, has_line_of_sight, polyline_length};
pub use scheduler::{RequestScheduler, SchedulerStats, TickStats};

use bevy::prelude::*;
use crate::nav::config::SizeClass;
use crate::nav::grid::NavGrid;

/// Solve and smooth one request against `grid`.
///
/// Endpoints outside the grid are `Invalid` without running a search.
/// Found and Partial results carry smoothed waypoints and their length;
/// every other status leaves both empty.
pub fn compute_path(
    grid: &NavGrid,
    solver: &mut PathSolver,
    start: Vec3,
    end: Vec3,
    size_class: SizeClass,
    max_iterations: usize,
    request_id: RequestId,
) -> PathResult {
    let (Some(start_cell), Some(end_cell)) = (grid.world_to_cell_checked(start), grid.world_to_cell_checked(end)) else {
        debug!(
            "[PATHFINDING] Request {:?} has an endpoint outside the grid: {:?} -> {:?}",
            request_id, start, end
        );
        return PathResult::invalid(request_id);
    };

    let nav = grid.nav_array(size_class);
    let mut result = solver.solve(nav, grid.width(), start_cell, end_cell, max_iterations);
    result.request_id = request_id;

    if matches!(result.status, PathStatus::Found | PathStatus::Partial) {
        result.waypoints = smooth_to_world(&result.cells, nav, grid);
        result.length = polyline_length(&result.waypoints);
    }
    result
}
