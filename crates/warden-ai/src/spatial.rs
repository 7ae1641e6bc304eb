//! Spatial queries answered by the physics and navmesh collaborators.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use warden_common::{EntityId, EntityTag};

/// Bitmask of collision layers a query considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerMask(u32);

impl LayerMask {
    /// Static obstacles
    pub const OBSTACLE: Self = Self(1);
    /// Character hit boxes
    pub const HITBOX: Self = Self(1 << 1);
    /// Every layer
    pub const ALL: Self = Self(u32::MAX);

    /// Creates a mask from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if any layer of `other` is in this mask.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Union of two masks.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Part of a character a ray struck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyRegion {
    /// Head hit box
    Head,
    /// Torso hit box
    Body,
    /// Anything else (limbs, props, walls)
    Other,
}

/// Result of a raycast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayHit {
    /// Entity that was struck
    pub entity: EntityId,
    /// Tag of the struck entity
    pub tag: EntityTag,
    /// Region of the struck collider
    pub region: BodyRegion,
    /// World-space hit point
    pub point: Vec3,
    /// Distance from the ray origin
    pub distance: f32,
}

/// Physics and navmesh queries.
pub trait SpatialQuery {
    /// Casts a ray and returns the first hit within `max_distance` on `mask`.
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32, mask: LayerMask)
        -> Option<RayHit>;

    /// Finds the nearest navigable point within `radius` of `point`.
    fn sample_nav_point(&self, point: Vec3, radius: f32) -> Option<Vec3>;
}
