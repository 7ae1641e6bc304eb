//! # Warden AI
//!
//! NPC behavior core for Project Warden.
//!
//! This crate provides the per-entity behavior layer and its supporting systems:
//! - Finite state machines with polymorphic behavior states
//! - Soldier and melee warrior behavior sets
//! - Perception and cover search
//! - Cross-NPC coordination (attack turns, alerts)
//! - Health, firearms, magazines and melee blades
//! - Deferred actions on a logical clock
//! - Object pools
//! - Event bus for collaborator notifications
//! - Level simulation tying it all together
//!
//! Navigation, animation and spatial queries are external collaborators
//! consumed through the [`Navigation`], [`Animation`] and [`SpatialQuery`]
//! traits. The [`mock`] module has test doubles for each of them.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod animation;
pub mod behaviors;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod events;
pub mod fsm;
pub mod health;
pub mod level;
pub mod mock;
pub mod navigation;
pub mod npc;
pub mod perception;
pub mod pool;
pub mod random;
pub mod registry;
pub mod scheduler;
pub mod spatial;
pub mod weapon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::animation::*;
    pub use crate::config::*;
    pub use crate::context::*;
    pub use crate::coordinator::*;
    pub use crate::detector::*;
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::fsm::*;
    pub use crate::health::*;
    pub use crate::level::*;
    pub use crate::navigation::*;
    pub use crate::npc::*;
    pub use crate::perception::*;
    pub use crate::pool::*;
    pub use crate::random::*;
    pub use crate::registry::*;
    pub use crate::scheduler::*;
    pub use crate::spatial::*;
    pub use crate::weapon::*;
}

pub use prelude::*;
