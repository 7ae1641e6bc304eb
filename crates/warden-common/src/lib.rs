//! # Warden Common
//!
//! Common types shared by the Warden NPC behavior crates:
//! - ID types (EntityId, PoolKey, PooledHandle)
//! - Typed entity tags and categories
//! - Actor pose
//! - Common error types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod ids;
pub mod pose;
pub mod tags;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::pose::*;
    pub use crate::tags::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_entity_id_generation() {
        let id1 = EntityId::new();
        let id2 = EntityId::new();
        assert_ne!(id1, id2);
        assert!(id1.is_valid());
        assert!(!EntityId::NULL.is_valid());
    }

    #[test]
    fn test_entity_id_ordering_follows_raw() {
        assert!(EntityId::from_raw(3) < EntityId::from_raw(7));
        assert_eq!(EntityId::from_raw(42).to_string(), "#42");
    }

    #[test]
    fn test_category_opposition() {
        assert!(EntityCategory::Npc.opposes(EntityCategory::Player));
        assert!(!EntityCategory::Npc.opposes(EntityCategory::Npc));
        assert!(!EntityCategory::Player.opposes(EntityCategory::Player));
        assert_eq!(EntityCategory::Player.tag(), EntityTag::Player);
    }

    #[test]
    fn test_pose_planar_direction() {
        let pose = Pose::at(Vec3::new(0.0, 1.0, 0.0));
        let dir = pose
            .planar_direction_to(Vec3::new(3.0, 5.0, 0.0))
            .expect("points differ on the plane");
        assert!((dir - Vec3::X).length() < 1e-5);
        assert!(pose.planar_direction_to(Vec3::new(0.0, 9.0, 0.0)).is_none());
    }

    #[test]
    fn test_pose_facing_ignores_zero() {
        let pose = Pose::default().facing(Vec3::ZERO);
        assert_eq!(pose.forward, Vec3::Z);
        let pose = pose.facing(Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(pose.forward, Vec3::X);
    }
}
