//! Budget-bounded navigation for RTS agents.
//!
//! The core ([`engine::NavEngine`]) is plain Rust: a grid eroded per size
//! class, an A* solver, a line-of-sight smoother and a request queue serviced
//! under a per-tick time budget. Formation planning and arrival resolution sit
//! beside it as pure functions. [`NavigationPlugin`] wires all of it into
//! Bevy's `FixedUpdate`.

use bevy::prelude::*;
use std::marker::PhantomData;

pub mod arrival;
pub mod components;
pub mod config;
pub mod engine;
pub mod events;
pub mod follower;
pub mod formation;
pub mod grid;
pub mod group_move;
pub mod math;
pub mod obstacles;
pub mod occupancy;
pub mod oracles;
pub mod pathfinding;
pub mod profiling;
pub mod systems;

pub use arrival::{find_free_arrival_position, resolve_arrival, ArrivalResolution, ArrivalSearch};
pub use components::{AgentVelocity, NavAgent, NavPosition};
pub use config::{load_nav_config, NavConfig, SizeClass};
pub use engine::NavEngine;
pub use events::{GroupMoveCommand, ObstacleChanged, StopCommand};
pub use follower::{AgentFollower, FollowerState};
pub use formation::FormationShape;
pub use grid::NavGrid;
pub use group_move::{execute_group_move, GroupMovePlan, MoveAgent};
pub use obstacles::{Obstacle, ObstacleSet};
pub use oracles::{AgentId, AvoidanceAgent, ObstructionOracle, OccupancyOracle};
pub use pathfinding::{PathResult, PathStatus, RequestId};
pub use systems::{NavOracle, PathMailbox};

/// Ordering of the navigation step inside `FixedUpdate`.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum NavSet {
    WorldSync, // Obstacle changes reach the grid, occupancy is rebuilt
    Commands,  // Group moves and stops queue or cancel requests
    Solve,     // Scheduler runs, results reach followers
    Follow,    // Followers write desired velocities
}

/// Runs the navigation step every fixed tick.
///
/// Insert a [`NavEngine<O>`] resource to activate it; every system is a no-op
/// without one. [`NavigationPlugin::new`] drives the default
/// `NavEngine<ObstacleSet>`; other oracles use [`NavigationPlugin::for_oracle`].
pub struct NavigationPlugin<O = ObstacleSet>(PhantomData<fn() -> O>);

impl NavigationPlugin {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl Default for NavigationPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: NavOracle> NavigationPlugin<O> {
    /// Plugin for a `NavEngine<O>` resource, e.g. `NavigationPlugin::<MyWorld>::for_oracle()`.
    pub fn for_oracle() -> Self {
        Self(PhantomData)
    }
}

impl<O: NavOracle> Plugin for NavigationPlugin<O> {
    fn build(&self, app: &mut App) {
        app.init_resource::<PathMailbox>()
            .add_message::<GroupMoveCommand>()
            .add_message::<StopCommand>()
            .add_message::<ObstacleChanged>();

        app.configure_sets(
            FixedUpdate,
            (NavSet::WorldSync, NavSet::Commands, NavSet::Solve, NavSet::Follow).chain(),
        );

        app.add_systems(
            FixedUpdate,
            (
                (systems::apply_obstacle_changes::<O>, systems::rebuild_occupancy::<O>)
                    .chain()
                    .in_set(NavSet::WorldSync),
                systems::issue_commands::<O>.in_set(NavSet::Commands),
                (systems::tick_scheduler::<O>, systems::deliver_path_results)
                    .chain()
                    .in_set(NavSet::Solve),
                systems::follow_paths::<O>.in_set(NavSet::Follow),
            ),
        );
    }
}
