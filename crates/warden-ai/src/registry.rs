//! Tag registry.
//!
//! Resolves category lookups (the player, every obstacle, the detection
//! trigger) to typed entity ids. The host fills it when it builds a level.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use warden_common::{EntityId, EntityTag};

/// Obstacle usable as a hiding spot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverSpot {
    /// Obstacle entity
    pub id: EntityId,
    /// Obstacle centre
    pub position: Vec3,
    /// Collider size on the XZ plane, if the obstacle has a collider
    pub footprint: Option<Vec2>,
}

impl CoverSpot {
    /// Creates a cover spot with a collider footprint.
    #[must_use]
    pub const fn new(id: EntityId, position: Vec3, footprint: Vec2) -> Self {
        Self {
            id,
            position,
            footprint: Some(footprint),
        }
    }

    /// Creates a cover spot whose obstacle has no collider.
    #[must_use]
    pub const fn without_collider(id: EntityId, position: Vec3) -> Self {
        Self {
            id,
            position,
            footprint: None,
        }
    }
}

/// Registry of tagged entities.
#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    tagged: BTreeMap<EntityTag, Vec<EntityId>>,
    cover: Vec<CoverSpot>,
    detection_radius: Option<f32>,
}

impl TagRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags an entity. Tagging twice is a no-op.
    pub fn register(&mut self, tag: EntityTag, id: EntityId) {
        let ids = self.tagged.entry(tag).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// Removes an entity from every tag and from the cover list.
    pub fn unregister(&mut self, id: EntityId) {
        for ids in self.tagged.values_mut() {
            ids.retain(|e| *e != id);
        }
        self.cover.retain(|c| c.id != id);
    }

    /// First entity with `tag`.
    #[must_use]
    pub fn first(&self, tag: EntityTag) -> Option<EntityId> {
        self.tagged.get(&tag).and_then(|ids| ids.first().copied())
    }

    /// Every entity with `tag`, in registration order.
    #[must_use]
    pub fn all(&self, tag: EntityTag) -> &[EntityId] {
        self.tagged.get(&tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns true if `id` carries `tag`.
    #[must_use]
    pub fn has_tag(&self, id: EntityId, tag: EntityTag) -> bool {
        self.all(tag).contains(&id)
    }

    /// Adds an obstacle usable as cover.
    pub fn add_cover(&mut self, spot: CoverSpot) {
        self.register(EntityTag::Obstacle, spot.id);
        self.cover.retain(|c| c.id != spot.id);
        self.cover.push(spot);
    }

    /// Builder form of [`Self::add_cover`].
    #[must_use]
    pub fn with_cover(mut self, spot: CoverSpot) -> Self {
        self.add_cover(spot);
        self
    }

    /// All cover spots.
    #[must_use]
    pub fn cover_spots(&self) -> &[CoverSpot] {
        &self.cover
    }

    /// Registers the player detection trigger and its radius.
    pub fn set_detection_sphere(&mut self, id: EntityId, radius: f32) {
        self.register(EntityTag::PlayerDetectionSphere, id);
        self.detection_radius = Some(radius.max(0.0));
    }

    /// Builder form of [`Self::set_detection_sphere`].
    #[must_use]
    pub fn with_detection_sphere(mut self, id: EntityId, radius: f32) -> Self {
        self.set_detection_sphere(id, radius);
        self
    }

    /// Radius of the player detection trigger, if one is registered.
    #[must_use]
    pub fn detection_radius(&self) -> Option<f32> {
        self.first(EntityTag::PlayerDetectionSphere)
            .and(self.detection_radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = TagRegistry::new();
        let player = EntityId::from_raw(1);
        registry.register(EntityTag::Player, player);
        registry.register(EntityTag::Player, player);

        assert_eq!(registry.first(EntityTag::Player), Some(player));
        assert_eq!(registry.all(EntityTag::Player).len(), 1);
        assert!(registry.has_tag(player, EntityTag::Player));
        assert!(registry.all(EntityTag::Npc).is_empty());
    }

    #[test]
    fn test_cover_spots_are_obstacles() {
        let rock = EntityId::from_raw(5);
        let registry = TagRegistry::new().with_cover(CoverSpot::new(
            rock,
            Vec3::new(2.0, 0.0, 2.0),
            Vec2::splat(1.0),
        ));
        assert!(registry.has_tag(rock, EntityTag::Obstacle));
        assert_eq!(registry.cover_spots().len(), 1);
    }

    #[test]
    fn test_unregister_removes_everywhere() {
        let rock = EntityId::from_raw(5);
        let mut registry = TagRegistry::new().with_cover(CoverSpot::without_collider(rock, Vec3::ZERO));
        registry.unregister(rock);
        assert!(registry.cover_spots().is_empty());
        assert!(registry.first(EntityTag::Obstacle).is_none());
    }

    #[test]
    fn test_detection_radius_requires_sphere() {
        let mut registry = TagRegistry::new();
        assert_eq!(registry.detection_radius(), None);
        let sphere = EntityId::from_raw(9);
        registry.set_detection_sphere(sphere, 12.0);
        assert_eq!(registry.detection_radius(), Some(12.0));
        registry.unregister(sphere);
        assert_eq!(registry.detection_radius(), None);
    }
}
