/// ECS components for navigating agents.

use bevy::prelude::*;

use super::config::SizeClass;
use super::oracles::AvoidanceAgent;

// ============================================================================
// Agent Components
// ============================================================================

/// Static navigation properties of an agent.
#[derive(Component, Debug, Clone, Copy)]
pub struct NavAgent {
    pub size_class: SizeClass,
    /// Footprint radius, used for arrival contention and occupancy.
    pub radius: f32,
    /// Cruise speed in world units per second.
    pub speed: f32,
    /// Preferred distance between formation slots. A group uses its largest.
    pub formation_spacing: f32,
}

impl Default for NavAgent {
    fn default() -> Self {
        Self {
            size_class: SizeClass::Small,
            radius: 0.5,
            speed: 4.0,
            formation_spacing: 1.5,
        }
    }
}

impl NavAgent {
    pub fn new(size_class: SizeClass, radius: f32, speed: f32) -> Self {
        Self {
            size_class,
            radius,
            speed,
            formation_spacing: radius * 3.0,
        }
    }

    pub fn with_spacing(mut self, formation_spacing: f32) -> Self {
        self.formation_spacing = formation_spacing;
        self
    }
}

/// World position of an agent on the navigation plane.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NavPosition(pub Vec3);

/// The agent's slot in the local-avoidance solver.
///
/// Path following writes `desired`. The avoidance solver writes `adjusted`,
/// and movement integrates it. Without a solver this is a passthrough.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct AgentVelocity {
    pub desired: Vec3,
    pub adjusted: Vec3,
}

impl AvoidanceAgent for AgentVelocity {
    fn set_desired_velocity(&mut self, velocity: Vec3) {
        self.desired = velocity;
        self.adjusted = velocity;
    }

    fn velocity(&self) -> Vec3 {
        self.adjusted
    }
}
