use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::math::{planar, WorldBounds};
use super::oracles::ObstructionOracle;

/// Collision layers for filtering
pub mod layers {
    pub const NONE: u32 = 0;
    pub const UNIT: u32 = 1 << 0;
    pub const OBSTACLE: u32 = 1 << 1;
    pub const TERRAIN: u32 = 1 << 2;
    pub const ALL: u32 = u32::MAX;
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ObstacleShape {
    Circle { center: Vec2, radius: f32 },
    Rect { min: Vec2, max: Vec2 },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub shape: ObstacleShape,
    pub layer: u32,
}

impl Obstacle {
    pub fn circle(center: Vec3, radius: f32) -> Self {
        Self {
            shape: ObstacleShape::Circle { center: planar(center), radius },
            layer: layers::OBSTACLE,
        }
    }

    pub fn rect(min: Vec3, max: Vec3) -> Self {
        let (a, b) = (planar(min), planar(max));
        Self {
            shape: ObstacleShape::Rect { min: a.min(b), max: a.max(b) },
            layer: layers::OBSTACLE,
        }
    }

    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }

    /// World bounds covered by this obstacle, for `notify_obstacle_changed`.
    pub fn bounds(&self) -> WorldBounds {
        match self.shape {
            ObstacleShape::Circle { center, radius } => WorldBounds::new(
                Vec3::new(center.x - radius, 0.0, center.y - radius),
                Vec3::new(center.x + radius, 0.0, center.y + radius),
            ),
            ObstacleShape::Rect { min, max } => {
                WorldBounds::new(Vec3::new(min.x, 0.0, min.y), Vec3::new(max.x, 0.0, max.y))
            }
        }
    }

    fn overlaps_box(&self, center: Vec2, half_extents: Vec2) -> bool {
        match self.shape {
            ObstacleShape::Circle { center: c, radius } => {
                // Closest point on the box to the circle centre.
                let closest = c.clamp(center - half_extents, center + half_extents);
                closest.distance_squared(c) <= radius * radius
            }
            ObstacleShape::Rect { min, max } => {
                let bmin = center - half_extents;
                let bmax = center + half_extents;
                min.x <= bmax.x && max.x >= bmin.x && min.y <= bmax.y && max.y >= bmin.y
            }
        }
    }
}

/// In-memory obstruction oracle: a flat list of circles and rectangles.
///
/// Queries are a linear scan; the bake cost is dominated by the grid size,
/// and region updates only probe the cells near a change.
#[derive(Clone, Debug, Default)]
pub struct ObstacleSet {
    obstacles: Vec<Obstacle>,
}

impl ObstacleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an obstacle and return its handle.
    pub fn insert(&mut self, obstacle: Obstacle) -> usize {
        self.obstacles.push(obstacle);
        self.obstacles.len() - 1
    }

    /// Remove the obstacle at `index`, returning it. Later handles shift down by one.
    pub fn remove(&mut self, index: usize) -> Option<Obstacle> {
        (index < self.obstacles.len()).then(|| self.obstacles.remove(index))
    }

    pub fn clear(&mut self) {
        self.obstacles.clear();
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.iter()
    }
}

impl FromIterator<Obstacle> for ObstacleSet {
    fn from_iter<T: IntoIterator<Item = Obstacle>>(iter: T) -> Self {
        Self { obstacles: iter.into_iter().collect() }
    }
}

impl ObstructionOracle for ObstacleSet {
    fn is_box_obstructed(&self, center: Vec3, half_extents: Vec2, layers: u32) -> bool {
        let c = planar(center);
        self.obstacles
            .iter()
            .any(|o| o.layer & layers != 0 && o.overlaps_box(c, half_extents))
    }
}
