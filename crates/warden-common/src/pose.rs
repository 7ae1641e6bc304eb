//! World-space pose of an actor.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Position and facing of an actor. Facing is a unit vector on the XZ plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// World position
    pub position: Vec3,
    /// Forward direction (unit length)
    pub forward: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::Z,
        }
    }
}

impl Pose {
    /// Creates a pose facing +Z.
    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Sets the facing direction. Zero vectors keep the current facing.
    #[must_use]
    pub fn facing(mut self, forward: Vec3) -> Self {
        if let Some(dir) = forward.try_normalize() {
            self.forward = dir;
        }
        self
    }

    /// Distance to a point.
    #[must_use]
    pub fn distance_to(&self, point: Vec3) -> f32 {
        self.position.distance(point)
    }

    /// Horizontal unit direction from this pose to `point`, if the two differ on the XZ plane.
    #[must_use]
    pub fn planar_direction_to(&self, point: Vec3) -> Option<Vec3> {
        let mut dir = point - self.position;
        dir.y = 0.0;
        dir.try_normalize()
    }
}
