//! Entity vitality.
//!
//! Health only counts down. Reaching zero is terminal: the entity is dead and
//! every later damage call is ignored. Each mutation reports what happened as
//! a [`HealthEvent`] so the owner can force its state machine into a hit
//! reaction, cover or death.

use serde::{Deserialize, Serialize};

use warden_common::EntityCategory;

/// Outcome of a health mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthEvent {
    /// Damage was taken and the entity survived
    Damaged {
        /// Side of the damaged entity
        category: EntityCategory,
        /// Damage applied
        amount: i32,
        /// Health left
        remaining: i32,
    },
    /// The entity died
    Died {
        /// Side of the dead entity
        category: EntityCategory,
    },
}

/// Health pool of a single entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    current: i32,
    max: i32,
    category: EntityCategory,
    dead: bool,
}

impl Health {
    /// Creates a full health pool.
    #[must_use]
    pub fn new(max: i32, category: EntityCategory) -> Self {
        let max = max.max(1);
        Self {
            current: max,
            max,
            category,
            dead: false,
        }
    }

    /// Current health.
    #[must_use]
    pub const fn current(&self) -> i32 {
        self.current
    }

    /// Maximum health.
    #[must_use]
    pub const fn max(&self) -> i32 {
        self.max
    }

    /// Side this entity belongs to.
    #[must_use]
    pub const fn category(&self) -> EntityCategory {
        self.category
    }

    /// Returns true once the entity has died.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.dead
    }

    /// Returns health as a fraction (0.0 to 1.0).
    #[must_use]
    pub fn fraction(&self) -> f32 {
        (self.current as f32 / self.max as f32).clamp(0.0, 1.0)
    }

    /// Applies damage. Negative amounts count as zero.
    ///
    /// Returns `None` if the entity was already dead.
    pub fn take_damage(&mut self, amount: i32) -> Option<HealthEvent> {
        if self.dead {
            return None;
        }
        let amount = amount.max(0);
        self.current = (self.current - amount).max(0);
        if self.current == 0 {
            return self.die();
        }
        Some(HealthEvent::Damaged {
            category: self.category,
            amount,
            remaining: self.current,
        })
    }

    /// Kills the entity outright. Only the first call reports a death.
    pub fn die(&mut self) -> Option<HealthEvent> {
        if self.dead {
            return None;
        }
        self.dead = true;
        self.current = 0;
        Some(HealthEvent::Died {
            category: self.category,
        })
    }
}
