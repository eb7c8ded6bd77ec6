/// FixedUpdate systems driving the engine from the ECS.
///
/// Order within a step: world changes reach the grid first, then new
/// commands queue requests, then the scheduler solves, then results are
/// handed to followers, then followers steer. The grid is never mutated
/// while a solve could observe it.

use bevy::prelude::*;
use rustc_hash::FxHashSet;
use std::sync::{Arc, Mutex, PoisonError};

use super::components::{AgentVelocity, NavAgent, NavPosition};
use super::engine::NavEngine;
use super::events::{GroupMoveCommand, ObstacleChanged, StopCommand};
use super::follower::{AgentFollower, FollowContext, FollowEvent};
use super::group_move::{execute_group_move, MoveAgent};
use super::occupancy::AgentDiscIndex;
use super::oracles::{AgentId, AvoidanceAgent, NoOccupancy, ObstructionOracle, OccupancyOracle};
use super::pathfinding::{PathCallback, PathResult};

/// Obstruction oracles a [`NavEngine`] resource can hold.
pub trait NavOracle: ObstructionOracle + Send + Sync + 'static {}

impl<T: ObstructionOracle + Send + Sync + 'static> NavOracle for T {}

// ============================================================================
// Result Delivery
// ============================================================================

/// Where scheduler callbacks drop finished paths until they are delivered.
#[derive(Resource, Clone, Default)]
pub struct PathMailbox(Arc<Mutex<Vec<(Entity, PathResult)>>>);

impl PathMailbox {
    /// Callback that posts the result for `entity`.
    pub fn callback_for(&self, entity: Entity) -> PathCallback {
        let inbox = Arc::clone(&self.0);
        Box::new(move |result: PathResult| {
            inbox
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((entity, result));
        })
    }

    pub fn drain(&self) -> Vec<(Entity, PathResult)> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// World Sync
// ============================================================================

pub fn apply_obstacle_changes<O: NavOracle>(engine: Option<ResMut<NavEngine<O>>>, mut changes: MessageReader<ObstacleChanged>) {
    let Some(mut engine) = engine else {
        return;
    };
    for change in changes.read() {
        engine.notify_obstacle_changed(change.bounds);
    }
}

/// Rebuild the agent occupancy index from scratch.
pub fn rebuild_occupancy<O: NavOracle>(
    mut commands: Commands,
    engine: Option<Res<NavEngine<O>>>,
    index: Option<ResMut<AgentDiscIndex>>,
    agents: Query<(Entity, &NavPosition, &NavAgent)>,
) {
    let Some(engine) = engine else {
        return;
    };
    let fill = |index: &mut AgentDiscIndex| {
        index.clear();
        for (entity, position, agent) in agents.iter() {
            index.insert(AgentId::from(entity), position.0, agent.radius);
        }
    };
    match index {
        Some(mut index) => fill(&mut *index),
        None => {
            let mut index = AgentDiscIndex::for_grid(engine.grid().config());
            fill(&mut index);
            commands.insert_resource(index);
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Queue group moves, then apply stops.
///
/// Stops run last so a stop written in the same step as a move wins, no
/// matter which message was written first.
pub fn issue_commands<O: NavOracle>(
    engine: Option<ResMut<NavEngine<O>>>,
    mailbox: Res<PathMailbox>,
    mut moves: MessageReader<GroupMoveCommand>,
    mut stops: MessageReader<StopCommand>,
    mut agents: Query<(&NavPosition, &NavAgent, &mut AgentFollower, &mut AgentVelocity)>,
) {
    let Some(mut engine) = engine else {
        return;
    };

    for command in moves.read() {
        let mut seen = FxHashSet::default();
        let members: Vec<MoveAgent> = command
            .agents
            .iter()
            .filter(|entity| seen.insert(**entity))
            .filter_map(|&entity| {
                let (position, agent, _, _) = agents.get(entity).ok()?;
                Some(MoveAgent {
                    id: AgentId::from(entity),
                    position: position.0,
                    size_class: agent.size_class,
                    formation_spacing: agent.formation_spacing,
                })
            })
            .collect();
        if members.is_empty() {
            debug!("[FORMATION] Group move to {:?} has no navigating agents", command.destination);
            continue;
        }

        let plan = execute_group_move(&mut *engine, &members, command.destination, command.shape, |id| {
            mailbox.callback_for(Entity::from(id))
        });

        for order in &plan.orders {
            let Ok((_, _, mut follower, _)) = agents.get_mut(Entity::from(order.agent)) else {
                continue;
            };
            if let Some(superseded) = follower.begin_request(order.request, order.target) {
                engine.cancel_request(superseded);
            }
        }
    }

    for stop in stops.read() {
        for &entity in &stop.agents {
            let Ok((_, _, mut follower, mut velocity)) = agents.get_mut(entity) else {
                continue;
            };
            if let Some(pending) = follower.stop() {
                engine.cancel_request(pending);
            }
            velocity.set_desired_velocity(Vec3::ZERO);
        }
    }
}

// ============================================================================
// Solve & Deliver
// ============================================================================

pub fn tick_scheduler<O: NavOracle>(engine: Option<ResMut<NavEngine<O>>>) {
    if let Some(mut engine) = engine {
        engine.tick();
    }
}

pub fn deliver_path_results(mailbox: Res<PathMailbox>, mut followers: Query<&mut AgentFollower>) {
    for (entity, result) in mailbox.drain() {
        match followers.get_mut(entity) {
            Ok(mut follower) => {
                if !follower.on_path_result(&result) {
                    trace!("[SCHEDULER] Dropped stale result {:?} for {:?}", result.request_id, entity);
                }
            }
            Err(_) => trace!("[SCHEDULER] Result {:?} for missing agent {:?}", result.request_id, entity),
        }
    }
}

// ============================================================================
// Following
// ============================================================================

pub fn follow_paths<O: NavOracle>(
    engine: Option<ResMut<NavEngine<O>>>,
    index: Option<Res<AgentDiscIndex>>,
    mailbox: Res<PathMailbox>,
    fixed_time: Res<Time<Fixed>>,
    mut agents: Query<(Entity, &NavPosition, &NavAgent, &mut AgentFollower, &mut AgentVelocity)>,
) {
    let Some(mut engine) = engine else {
        return;
    };
    let dt = fixed_time.delta_secs();
    let occupancy: &dyn OccupancyOracle = match index.as_deref() {
        Some(index) => index,
        None => &NoOccupancy,
    };

    let mut repaths = Vec::new();
    {
        let config = engine.config();
        let grid = engine.grid();
        for (entity, position, agent, mut follower, mut velocity) in agents.iter_mut() {
            let ctx = FollowContext {
                grid,
                occupancy,
                agent: Some(AgentId::from(entity)),
                size_class: agent.size_class,
                radius: agent.radius,
                speed: agent.speed,
                dt,
                config: &config.follower,
                arrival: &config.arrival,
            };
            match follower.update(position.0, &ctx, &mut *velocity) {
                FollowEvent::NeedsRepath(destination) => {
                    repaths.push((entity, position.0, destination, agent.size_class));
                }
                FollowEvent::Aborted => debug!("[FOLLOWER] {:?} gave up on its path", entity),
                FollowEvent::Arrived => trace!("[FOLLOWER] {:?} arrived", entity),
                FollowEvent::None => {}
            }
        }
    }

    let priority = engine.config().follower.repath_priority;
    for (entity, from, to, size_class) in repaths {
        let id = engine.request_path(from, to, mailbox.callback_for(entity), priority, size_class);
        if let Ok((_, _, _, mut follower, _)) = agents.get_mut(entity) {
            follower.begin_repath(id);
        }
    }
}
