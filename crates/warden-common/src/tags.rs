//! Typed entity tags and categories.
//!
//! Tags replace string lookups: collaborators register entities under a tag
//! and the behavior core resolves them through an injected registry.

use serde::{Deserialize, Serialize};

/// Category tag used to look entities up by role rather than identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityTag {
    /// The player-controlled actor
    Player,
    /// Any AI-controlled actor
    Npc,
    /// Static geometry usable as cover and blocking melee strikes
    Obstacle,
    /// A melee weapon collider
    MeleeWeapon,
    /// Trigger volume around the player that starts NPC perception polling
    PlayerDetectionSphere,
}

impl EntityTag {
    /// Returns all tags.
    #[must_use]
    pub const fn all() -> [Self; 5] {
        [
            Self::Player,
            Self::Npc,
            Self::Obstacle,
            Self::MeleeWeapon,
            Self::PlayerDetectionSphere,
        ]
    }

    /// Returns the display name for this tag.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Player => "Player",
            Self::Npc => "NPC",
            Self::Obstacle => "Obstacle",
            Self::MeleeWeapon => "MeleeWeapon",
            Self::PlayerDetectionSphere => "PlayerDetectionSphere",
        }
    }
}

/// Side an entity with health belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityCategory {
    /// The player
    Player,
    /// An NPC
    Npc,
}

impl EntityCategory {
    /// Returns true if an attack from `self` may hurt `other`.
    #[must_use]
    pub fn opposes(self, other: Self) -> bool {
        self != other
    }

    /// Returns the tag matching this category.
    #[must_use]
    pub const fn tag(self) -> EntityTag {
        match self {
            Self::Player => EntityTag::Player,
            Self::Npc => EntityTag::Npc,
        }
    }
}
