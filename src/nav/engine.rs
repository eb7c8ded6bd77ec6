/// The navigation engine: one owned instance per world.
///
/// Holds the grid, the solver scratch space, the request queue and the
/// obstruction oracle the grid is baked from. Callers reach it through a
/// handle (a `&mut NavEngine` or the Bevy resource); nothing here is global.

use bevy::prelude::*;

use crate::nav::config::{NavConfig, SizeClass};
use crate::nav::grid::NavGrid;
use crate::nav::math::WorldBounds;
use crate::nav::obstacles::ObstacleSet;
use crate::nav::oracles::ObstructionOracle;
use crate::nav::pathfinding::{
    compute_path, PathResult, PathSolver, RequestId, RequestScheduler, SchedulerStats, TickStats,
};

#[derive(Resource)]
pub struct NavEngine<O: ObstructionOracle + Send + Sync + 'static = ObstacleSet> {
    config: NavConfig,
    grid: NavGrid,
    solver: PathSolver,
    scheduler: RequestScheduler,
    obstruction: O,
    tick: u64,
}

impl<O: ObstructionOracle + Send + Sync + 'static> NavEngine<O> {
    /// Build the engine and bake the grid from `obstruction`.
    ///
    /// An invalid grid layout is logged and replaced by the default layout.
    pub fn new(mut config: NavConfig, obstruction: O) -> Self {
        if let Err(e) = config.grid.validate() {
            error!("[NAVGRID] {}; using the default grid layout", e);
            config.grid = Default::default();
        }
        if let Err(e) = config.scheduler.validate() {
            error!("[SCHEDULER] {}; using the default budget", e);
            config.scheduler = Default::default();
        }

        let mut grid = NavGrid::new(config.grid.clone());
        grid.bake(&obstruction);
        let solver = PathSolver::new(grid.width(), grid.height(), config.solver.nearest_walkable_radius);
        let scheduler = RequestScheduler::new(config.scheduler.clone());

        info!(
            "[NAVGRID] Engine ready: {}x{} cells of {}, budget {} ms/tick",
            grid.width(),
            grid.height(),
            grid.cell_size(),
            config.scheduler.budget_ms
        );

        Self {
            config,
            grid,
            solver,
            scheduler,
            obstruction,
            tick: 0,
        }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn grid(&self) -> &NavGrid {
        &self.grid
    }

    pub fn obstruction(&self) -> &O {
        &self.obstruction
    }

    /// Mutate the obstruction source. The grid is stale until
    /// [`NavEngine::notify_obstacle_changed`] or [`NavEngine::rebake`].
    pub fn obstruction_mut(&mut self) -> &mut O {
        &mut self.obstruction
    }

    pub fn scheduler(&self) -> &RequestScheduler {
        &self.scheduler
    }

    /// Queue a path request. The callback runs once, during a later [`NavEngine::tick`].
    pub fn request_path<F>(&mut self, start: Vec3, end: Vec3, callback: F, priority: i32, size_class: SizeClass) -> RequestId
    where
        F: FnOnce(PathResult) + Send + Sync + 'static,
    {
        self.scheduler.enqueue(start, end, callback, priority, size_class)
    }

    /// Solve right now for the smallest size class, ignoring the tick budget.
    ///
    /// Expensive: one-off queries only.
    pub fn request_path_immediate(&mut self, start: Vec3, end: Vec3) -> PathResult {
        self.request_path_immediate_for(start, end, SizeClass::Small)
    }

    /// [`NavEngine::request_path_immediate`] for a given size class.
    pub fn request_path_immediate_for(&mut self, start: Vec3, end: Vec3, size_class: SizeClass) -> PathResult {
        compute_path(
            &self.grid,
            &mut self.solver,
            start,
            end,
            size_class,
            self.config.solver.immediate_max_iterations,
            RequestId::default(),
        )
    }

    /// Drop a queued request. `false` if it is unknown or already serviced.
    pub fn cancel_request(&mut self, id: RequestId) -> bool {
        self.scheduler.cancel(id)
    }

    /// Raw (uneroded) walkability under `pos`. Outside the grid is not walkable.
    pub fn is_position_walkable(&self, pos: Vec3) -> bool {
        self.grid
            .world_to_cell_checked(pos)
            .is_some_and(|cell| self.grid.is_raw_walkable(cell))
    }

    /// Walkability under `pos` for agents of `size_class`.
    pub fn is_position_navigable(&self, pos: Vec3, size_class: SizeClass) -> bool {
        self.grid.is_world_nav_walkable(pos, size_class)
    }

    /// Re-read the obstruction oracle around `bounds`.
    ///
    /// Returns whether any cells were rescanned. Must not run while a solve is
    /// in flight; [`NavEngine::tick`] never interleaves with it.
    pub fn notify_obstacle_changed(&mut self, bounds: WorldBounds) -> bool {
        self.grid.update_region(bounds, &self.obstruction)
    }

    /// Rebuild the whole grid from the obstruction oracle.
    pub fn rebake(&mut self) {
        self.grid.bake(&self.obstruction);
    }

    /// Service queued requests within the per-tick budget.
    pub fn tick(&mut self) -> TickStats {
        self.tick += 1;
        let stats = self.scheduler.tick(&self.grid, &mut self.solver);
        crate::profile_log!(
            self.tick,
            "[SCHEDULER] tick {}: served {} in {:?}, {} pending",
            self.tick,
            stats.served,
            stats.elapsed,
            stats.remaining
        );
        stats
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn pending_requests(&self) -> usize {
        self.scheduler.pending_len()
    }

    pub fn stats(&self) -> &SchedulerStats {
        self.scheduler.stats()
    }
}
