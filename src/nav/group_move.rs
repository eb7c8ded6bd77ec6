/// Group move orchestration: one destination, many agents, one formation.

use bevy::prelude::*;

use crate::nav::config::SizeClass;
use crate::nav::engine::NavEngine;
use crate::nav::formation::{self, FormationShape};
use crate::nav::math::{lift, planar, rotate_local};
use crate::nav::oracles::{AgentId, ObstructionOracle};
use crate::nav::pathfinding::{PathCallback, RequestId};
use crate::nav::profiling::profile;

/// One agent taking part in a group move.
#[derive(Clone, Copy, Debug)]
pub struct MoveAgent {
    pub id: AgentId,
    pub position: Vec3,
    pub size_class: SizeClass,
    pub formation_spacing: f32,
}

/// The request issued for one agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentOrder {
    pub agent: AgentId,
    /// Index into [`GroupMovePlan::slots`].
    pub slot: usize,
    pub target: Vec3,
    pub request: RequestId,
}

/// What a group move decided, for callers that track requests or draw slots.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupMovePlan {
    pub requested_shape: FormationShape,
    /// Shape actually used; Column when the requested one did not fit.
    pub shape: FormationShape,
    /// World-space slot positions.
    pub slots: Vec<Vec3>,
    pub walkable_slots: usize,
    pub orders: Vec<AgentOrder>,
}

/// Move `agents` to `destination` in formation.
///
/// A single agent goes straight to the destination. Larger groups face from
/// their centroid toward the destination and use the widest spacing any
/// member asks for. When too few slots are walkable for the group's largest
/// size class, single file is tried instead and kept only if strictly more of
/// its slots are walkable. Each agent then gets one request to its slot, at
/// its own size class, with `make_callback` supplying the completion callback.
#[profile(2)]
pub fn execute_group_move<O, F>(
    engine: &mut NavEngine<O>,
    agents: &[MoveAgent],
    destination: Vec3,
    shape: FormationShape,
    mut make_callback: F,
) -> GroupMovePlan
where
    O: ObstructionOracle + Send + Sync + 'static,
    F: FnMut(AgentId) -> PathCallback,
{
    let mut plan = GroupMovePlan {
        requested_shape: shape,
        shape,
        ..Default::default()
    };
    let priority = engine.config().formation.request_priority;

    match agents {
        [] => return plan,
        [agent] => {
            let request = engine.request_path(agent.position, destination, make_callback(agent.id), priority, agent.size_class);
            plan.slots.push(destination);
            plan.walkable_slots = usize::from(engine.is_position_navigable(destination, agent.size_class));
            plan.orders.push(AgentOrder {
                agent: agent.id,
                slot: 0,
                target: destination,
                request,
            });
            return plan;
        }
        _ => {}
    }

    let formation_config = engine.config().formation.clone();
    let count = agents.len();
    let centroid = agents.iter().map(|a| a.position).sum::<Vec3>() / count as f32;
    let to_destination = planar(destination - centroid);
    let forward = if to_destination.length() > formation_config.facing_epsilon {
        to_destination.normalize()
    } else {
        Vec2::Y
    };
    let spacing = agents.iter().map(|a| a.formation_spacing).fold(0.0, f32::max);
    let class = agents.iter().map(|a| a.size_class).max().unwrap_or_default();

    let place = |offsets: &[Vec2]| -> Vec<Vec3> {
        offsets
            .iter()
            .map(|o| destination + lift(rotate_local(*o, forward), 0.0))
            .collect()
    };

    let mut offsets = formation::get_offsets(count, shape, spacing);
    let mut slots = place(&offsets);
    let mut walkable = formation::count_walkable_positions(&slots, engine.grid(), class);

    if (walkable as f32) < formation_config.min_walkable_ratio * count as f32 && shape != FormationShape::Column {
        let column_offsets = formation::get_offsets(count, FormationShape::Column, spacing);
        let column_slots = place(&column_offsets);
        let column_walkable = formation::count_walkable_positions(&column_slots, engine.grid(), class);
        debug!(
            "[FORMATION] {:?} has {}/{} walkable slots, Column has {}",
            shape, walkable, count, column_walkable
        );
        if column_walkable > walkable {
            offsets = column_offsets;
            slots = column_slots;
            walkable = column_walkable;
            plan.shape = FormationShape::Column;
        }
    }

    let positions: Vec<Vec2> = agents.iter().map(|a| planar(a.position)).collect();
    let assignment = formation::assign_slots_with_epsilon(&positions, &offsets, forward, formation_config.row_epsilon);

    for (agent, slot) in agents.iter().zip(assignment) {
        let Some(slot) = slot else {
            continue;
        };
        let target = slots[slot];
        let request = engine.request_path(agent.position, target, make_callback(agent.id), priority, agent.size_class);
        plan.orders.push(AgentOrder {
            agent: agent.id,
            slot,
            target,
            request,
        });
    }

    info!(
        "[FORMATION] {} agents -> {:?} in {:?} (spacing {:.2}, {}/{} slots walkable)",
        count, destination, plan.shape, spacing, walkable, count
    );

    plan.slots = slots;
    plan.walkable_slots = walkable;
    plan
}
