use bevy::prelude::*;
use std::time::{Duration, Instant};

use crate::nav::config::{SchedulerConfig, SizeClass};
use crate::nav::grid::NavGrid;
use crate::nav::profiling::profile;
use super::astar::PathSolver;
use super::compute_path;
use super::types::{PathRequest, PathResult, RequestId};

/// Counters for one [`RequestScheduler::tick`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickStats {
    pub served: usize,
    pub elapsed: Duration,
    /// Requests still queued after the tick.
    pub remaining: usize,
}

/// Running totals across ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SchedulerStats {
    pub last_tick: TickStats,
    pub ticks: u64,
    pub total_served: u64,
    pub total_cancelled: u64,
    pub total_time: Duration,
}

/// Pending path requests serviced under a per-tick wall-clock budget.
///
/// Each tick sorts by priority (lower first, enqueue order within a priority)
/// and starts requests until the budget is spent. A started solve always runs
/// to completion; its iteration cap shrinks with the remaining budget but never
/// drops below `min_iterations`. Whatever is left waits for the next tick.
#[derive(Debug)]
pub struct RequestScheduler {
    pending: Vec<PathRequest>,
    next_id: u64,
    config: SchedulerConfig,
    stats: SchedulerStats,
}

impl RequestScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            pending: Vec::new(),
            next_id: 1,
            config,
            stats: SchedulerStats::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: RequestId) -> bool {
        self.pending.iter().any(|r| r.id == id)
    }

    pub fn enqueue<F>(&mut self, start: Vec3, end: Vec3, callback: F, priority: i32, size_class: SizeClass) -> RequestId
    where
        F: FnOnce(PathResult) + Send + Sync + 'static,
    {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.pending.push(PathRequest {
            id,
            start,
            end,
            priority,
            size_class,
            callback: Box::new(callback),
        });
        id
    }

    /// Drop a queued request without invoking its callback.
    ///
    /// Returns `false` for unknown or already serviced ids.
    pub fn cancel(&mut self, id: RequestId) -> bool {
        match self.pending.iter().position(|r| r.id == id) {
            Some(pos) => {
                // Ids are monotonic, so the next sort restores enqueue order.
                self.pending.swap_remove(pos);
                self.stats.total_cancelled += 1;
                true
            }
            None => false,
        }
    }

    /// Iteration cap for a solve started with `remaining_ms` of budget left.
    pub fn iteration_cap(&self, remaining_ms: f32) -> usize {
        let scaled = (remaining_ms.max(0.0) * self.config.iters_per_ms) as usize;
        scaled.max(self.config.min_iterations)
    }

    /// Service requests until the wall-clock budget is spent.
    #[profile(4)]
    pub fn tick(&mut self, grid: &NavGrid, solver: &mut PathSolver) -> TickStats {
        let start = Instant::now();
        self.tick_with_clock(grid, solver, || start.elapsed())
    }

    /// [`RequestScheduler::tick`] with an injected elapsed-time source.
    pub fn tick_with_clock(
        &mut self,
        grid: &NavGrid,
        solver: &mut PathSolver,
        mut elapsed: impl FnMut() -> Duration,
    ) -> TickStats {
        // Configs built in code skip validation; an unrepresentable budget means unlimited.
        let budget = Duration::try_from_secs_f32(self.config.budget_ms.max(0.0) / 1000.0).unwrap_or(Duration::MAX);

        // Descending, so the lowest (priority, id) pops off the back.
        self.pending
            .sort_unstable_by(|a, b| (b.priority, b.id).cmp(&(a.priority, a.id)));

        let mut served = 0usize;
        let mut now = elapsed();
        while now < budget {
            let Some(request) = self.pending.pop() else {
                break;
            };
            let remaining_ms = (budget - now).as_secs_f32() * 1000.0;
            let cap = self.iteration_cap(remaining_ms);

            let result = compute_path(grid, solver, request.start, request.end, request.size_class, cap, request.id);
            trace!(
                "[SCHEDULER] Request {:?} -> {:?} ({} iterations, cap {})",
                request.id,
                result.status,
                result.iterations,
                cap
            );
            (request.callback)(result);
            served += 1;
            now = elapsed();
        }

        let stats = TickStats {
            served,
            elapsed: now,
            remaining: self.pending.len(),
        };
        if now > budget.saturating_mul(2) && served > 0 {
            warn!(
                "[SCHEDULER] Tick overran budget: {:?} for {} requests (budget {:?})",
                now, served, budget
            );
        }

        self.stats.last_tick = stats;
        self.stats.ticks += 1;
        self.stats.total_served += served as u64;
        self.stats.total_time += now;
        stats
    }
}
