/// Arrival contention: picking a free stand-in spot near an occupied destination.
///
/// Candidates lie on concentric rings around the destination. Ring `k` has
/// radius `k * ring_step_factor * agent_radius` and `samples_per_ring`
/// evenly spaced points starting on +X. The first ring holding a free point
/// wins, so the answer is always as close to the destination as the sampling
/// allows.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::nav::config::SizeClass;
use crate::nav::grid::NavGrid;
use crate::nav::oracles::{AgentId, OccupancyOracle};

/// Ring sampling parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArrivalSearch {
    pub samples_per_ring: usize,
    pub max_rings: usize,
    /// Ring spacing as a multiple of the agent radius.
    pub ring_step_factor: f32,
}

impl Default for ArrivalSearch {
    fn default() -> Self {
        Self {
            samples_per_ring: 8,
            max_rings: 3,
            ring_step_factor: 2.5,
        }
    }
}

/// Outcome of an arrival search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ArrivalResolution {
    /// The destination is free as given.
    Unchanged,
    /// Nearest free candidate.
    Relocated(Vec3),
    /// Every ring was tried and nothing was free.
    Exhausted,
}

impl ArrivalResolution {
    /// Position to move to. Exhausted falls back to the destination and leaves
    /// the contention to collision handling.
    pub fn position(self, destination: Vec3) -> Vec3 {
        match self {
            ArrivalResolution::Relocated(p) => p,
            ArrivalResolution::Unchanged | ArrivalResolution::Exhausted => destination,
        }
    }
}

/// Search for a spot an agent of `agent_radius` can stand on near `destination`.
pub fn resolve_arrival(
    destination: Vec3,
    agent_radius: f32,
    grid: &NavGrid,
    class: SizeClass,
    occupancy: &dyn OccupancyOracle,
    exclude: Option<AgentId>,
    search: &ArrivalSearch,
) -> ArrivalResolution {
    let is_free = |p: Vec3| grid.is_world_nav_walkable(p, class) && !occupancy.is_disc_occupied(p, agent_radius, exclude);

    if is_free(destination) {
        return ArrivalResolution::Unchanged;
    }

    let step = agent_radius * search.ring_step_factor;
    if !(step.is_finite() && step > 0.0) || search.samples_per_ring == 0 {
        return ArrivalResolution::Exhausted;
    }

    for ring in 1..=search.max_rings {
        let radius = ring as f32 * step;
        for i in 0..search.samples_per_ring {
            let angle = TAU * i as f32 / search.samples_per_ring as f32;
            let candidate = destination + Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius);
            if is_free(candidate) {
                debug!(
                    "[ARRIVAL] Relocated {:?} -> {:?} (ring {}, sample {})",
                    destination, candidate, ring, i
                );
                return ArrivalResolution::Relocated(candidate);
            }
        }
    }

    debug!(
        "[ARRIVAL] No free spot within {} rings of {:?}; keeping destination",
        search.max_rings, destination
    );
    ArrivalResolution::Exhausted
}

/// Free stand-in position for `destination`, or `destination` itself when it is
/// free or when no candidate is.
pub fn find_free_arrival_position(
    destination: Vec3,
    agent_radius: f32,
    grid: &NavGrid,
    class: SizeClass,
    occupancy: &dyn OccupancyOracle,
    exclude: Option<AgentId>,
    search: &ArrivalSearch,
) -> Vec3 {
    resolve_arrival(destination, agent_radius, grid, class, occupancy, exclude, search).position(destination)
}
