use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Project a world position onto the navigation plane (XZ).
#[inline]
pub fn planar(v: Vec3) -> Vec2 {
    Vec2::new(v.x, v.z)
}

/// Lift a planar point back to world space at the given height.
#[inline]
pub fn lift(v: Vec2, y: f32) -> Vec3 {
    Vec3::new(v.x, y, v.y)
}

/// Right-hand lateral axis for a planar forward direction.
///
/// Local formation space maps `x` to this axis and `y` to `forward`.
#[inline]
pub fn lateral_axis(forward: Vec2) -> Vec2 {
    Vec2::new(forward.y, -forward.x)
}

/// Rotate a local offset (`x` lateral, `y` forward) into the frame facing `forward`.
#[inline]
pub fn rotate_local(offset: Vec2, forward: Vec2) -> Vec2 {
    lateral_axis(forward) * offset.x + forward * offset.y
}

/// Axis-aligned world rectangle on the navigation plane.
///
/// Only X and Z are meaningful; Y of `min`/`max` is ignored.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl WorldBounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec2) -> Self {
        Self {
            min: Vec3::new(center.x - half_extents.x, center.y, center.z - half_extents.y),
            max: Vec3::new(center.x + half_extents.x, center.y, center.z + half_extents.y),
        }
    }

    /// Finite and not inverted on the plane.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min.x <= self.max.x && self.min.z <= self.max.z
    }

    pub fn expanded(&self, amount: f32) -> Self {
        Self {
            min: Vec3::new(self.min.x - amount, self.min.y, self.min.z - amount),
            max: Vec3::new(self.max.x + amount, self.max.y, self.max.z + amount),
        }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.z >= self.min.z && point.z <= self.max.z
    }
}
