//! Narrow interfaces to the collaborators the navigation core does not own.
//!
//! - [`ObstructionOracle`]: static/dynamic geometry, queried only while baking.
//! - [`OccupancyOracle`]: other agents' footprints, queried only by arrival resolution.
//! - [`AvoidanceAgent`]: the local-avoidance solver's per-agent velocity slot.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Opaque agent identity used to exclude an agent from its own occupancy queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl From<Entity> for AgentId {
    fn from(entity: Entity) -> Self {
        AgentId(entity.to_bits())
    }
}

impl From<AgentId> for Entity {
    fn from(id: AgentId) -> Self {
        Entity::from_bits(id.0)
    }
}

pub trait ObstructionOracle {
    /// Whether the axis-aligned box centred at `center` overlaps any obstacle on `layers`.
    fn is_box_obstructed(&self, center: Vec3, half_extents: Vec2, layers: u32) -> bool;
}

pub trait OccupancyOracle {
    /// Whether any agent other than `exclude` has a footprint overlapping the disc.
    fn is_disc_occupied(&self, center: Vec3, radius: f32, exclude: Option<AgentId>) -> bool;
}

/// Occupancy oracle that never reports contention.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOccupancy;

impl OccupancyOracle for NoOccupancy {
    fn is_disc_occupied(&self, _center: Vec3, _radius: f32, _exclude: Option<AgentId>) -> bool {
        false
    }
}

impl<F> OccupancyOracle for F
where
    F: Fn(Vec3, f32, Option<AgentId>) -> bool,
{
    fn is_disc_occupied(&self, center: Vec3, radius: f32, exclude: Option<AgentId>) -> bool {
        self(center, radius, exclude)
    }
}

/// The core writes a desired velocity and reads back whatever the avoidance
/// solver made of it. Collision arbitration never happens here.
pub trait AvoidanceAgent {
    fn set_desired_velocity(&mut self, velocity: Vec3);
    fn velocity(&self) -> Vec3;
}
