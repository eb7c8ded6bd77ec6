use bevy::prelude::*;
use smallvec::SmallVec;

use crate::nav::config::SizeClass;
use crate::nav::grid::NavGrid;
use crate::nav::math::lateral_axis;

/// Slots whose forward coordinates differ by less than this share a row.
pub const ROW_EPSILON: f32 = 0.01;

/// Pair agents with formation slots so that no two assigned paths cross.
///
/// Slots are grouped into rows along the forward axis, front row first.
/// Agents are ordered by how far forward they already are along
/// `movement_direction`, and the front-most batch takes the front row. Within a
/// batch both sides are sorted left to right and zipped.
///
/// Returns one entry per agent: the index into `offsets` it was assigned,
/// or `None` when there are more agents than slots.
pub fn assign_slots(agent_positions: &[Vec2], offsets: &[Vec2], movement_direction: Vec2) -> Vec<Option<usize>> {
    assign_slots_with_epsilon(agent_positions, offsets, movement_direction, ROW_EPSILON)
}

/// [`assign_slots`] with an explicit row tolerance.
pub fn assign_slots_with_epsilon(
    agent_positions: &[Vec2],
    offsets: &[Vec2],
    movement_direction: Vec2,
    row_epsilon: f32,
) -> Vec<Option<usize>> {
    let mut assignment = vec![None; agent_positions.len()];
    if agent_positions.is_empty() || offsets.is_empty() {
        return assignment;
    }

    let forward = movement_direction.try_normalize().unwrap_or(Vec2::Y);
    let lateral = lateral_axis(forward);

    // Slots front to back; ties keep slot order.
    let mut slots: Vec<usize> = (0..offsets.len()).collect();
    slots.sort_by(|&a, &b| offsets[b].y.total_cmp(&offsets[a].y).then(a.cmp(&b)));

    let mut rows: Vec<SmallVec<[usize; 8]>> = Vec::new();
    let mut prev_y = f32::NAN;
    for &slot in &slots {
        let y = offsets[slot].y;
        // NaN on the first slot, so it always opens a row.
        let continues_row = (prev_y - y).abs() <= row_epsilon;
        if continues_row && !rows.is_empty() {
            let last = rows.len() - 1;
            rows[last].push(slot);
        } else {
            rows.push(SmallVec::from_elem(slot, 1));
        }
        prev_y = y;
    }

    // Agents front-most first.
    let mut agents: Vec<usize> = (0..agent_positions.len()).collect();
    agents.sort_by(|&a, &b| {
        let pa = agent_positions[a].dot(forward);
        let pb = agent_positions[b].dot(forward);
        pb.total_cmp(&pa).then(a.cmp(&b))
    });

    let mut next_agent = 0usize;
    for row in &mut rows {
        if next_agent >= agents.len() {
            break;
        }
        let take = row.len().min(agents.len() - next_agent);
        let mut batch: SmallVec<[usize; 8]> = agents[next_agent..next_agent + take].iter().copied().collect();
        next_agent += take;

        batch.sort_by(|&a, &b| {
            agent_positions[a]
                .dot(lateral)
                .total_cmp(&agent_positions[b].dot(lateral))
                .then(a.cmp(&b))
        });
        row.sort_by(|&a, &b| offsets[a].x.total_cmp(&offsets[b].x).then(a.cmp(&b)));

        // A short batch takes the row's centre slots.
        let skip = (row.len() - take) / 2;
        for (agent, slot) in batch.iter().zip(row.iter().skip(skip)) {
            assignment[*agent] = Some(*slot);
        }
    }
    assignment
}

/// How many of `positions` are nav-walkable for `class`.
pub fn count_walkable_positions(positions: &[Vec3], grid: &NavGrid, class: SizeClass) -> usize {
    positions
        .iter()
        .filter(|p| grid.is_world_nav_walkable(**p, class))
        .count()
}
