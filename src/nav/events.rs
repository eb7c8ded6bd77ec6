/// Commands into the navigation layer.

use bevy::prelude::*;

use super::formation::FormationShape;
use super::math::WorldBounds;

// ============================================================================
// Movement Commands
// ============================================================================

/// Move a set of agents to one point in formation.
#[derive(Event, Message, Debug, Clone)]
pub struct GroupMoveCommand {
    pub agents: Vec<Entity>,
    pub destination: Vec3,
    pub shape: FormationShape,
}

/// Stop agents where they stand, dropping any queued request.
#[derive(Event, Message, Debug, Clone)]
pub struct StopCommand {
    pub agents: Vec<Entity>,
}

// ============================================================================
// World Changes
// ============================================================================

/// Obstacles inside `bounds` changed; the grid there must be rescanned.
#[derive(Event, Message, Debug, Clone, Copy)]
pub struct ObstacleChanged {
    pub bounds: WorldBounds,
}
