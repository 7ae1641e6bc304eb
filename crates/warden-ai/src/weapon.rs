//! Firearms and melee blades.
//!
//! This module provides:
//! - Magazines with timed reloads
//! - Fire-rate gating on a timestamp, auto reload or dry fire when empty
//! - Hit resolution from a raycast to a region-based damage value
//! - Single-hit melee blades armed only while a strike is underway

use glam::Vec3;
use serde::{Deserialize, Serialize};

use warden_common::{EntityCategory, EntityId};

use crate::config::WeaponTuning;
use crate::spatial::{BodyRegion, LayerMask, SpatialQuery};

// ============================================================================
// Magazine
// ============================================================================

/// Detachable magazine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Magazine {
    capacity: u32,
    ammo: u32,
    reload_time: f32,
    reload_remaining: Option<f32>,
    spent: bool,
}

impl Magazine {
    /// Creates an empty magazine.
    #[must_use]
    pub fn new(capacity: u32, reload_time: f32) -> Self {
        Self {
            capacity: capacity.max(1),
            ammo: 0,
            reload_time: reload_time.max(0.0),
            reload_remaining: None,
            spent: false,
        }
    }

    /// Creates a magazine that starts full.
    #[must_use]
    pub fn loaded(capacity: u32, reload_time: f32) -> Self {
        let mut magazine = Self::new(capacity, reload_time);
        magazine.ammo = magazine.capacity;
        magazine
    }

    /// Rounds left.
    #[must_use]
    pub const fn ammo(&self) -> u32 {
        self.ammo
    }

    /// Maximum rounds.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Returns true if at least one round is left.
    #[must_use]
    pub const fn has_ammo(&self) -> bool {
        self.ammo > 0
    }

    /// Returns true while a reload is in progress.
    #[must_use]
    pub const fn is_reloading(&self) -> bool {
        self.reload_remaining.is_some()
    }

    /// Returns true once the magazine has been unloaded for good.
    #[must_use]
    pub const fn is_spent(&self) -> bool {
        self.spent
    }

    /// Starts a timed refill. Returns false if already reloading or spent.
    pub fn reload(&mut self) -> bool {
        if self.is_reloading() || self.spent {
            return false;
        }
        self.reload_remaining = Some(self.reload_time);
        true
    }

    /// Advances a reload in progress. Returns true when it completes.
    pub fn tick(&mut self, dt: f32) -> bool {
        let Some(remaining) = self.reload_remaining.as_mut() else {
            return false;
        };
        *remaining -= dt;
        if *remaining > 0.0 {
            return false;
        }
        self.reload_remaining = None;
        self.ammo = self.capacity;
        true
    }

    /// Empties the magazine and marks it unusable.
    pub fn unload(&mut self) {
        self.reload_remaining = None;
        self.ammo = 0;
        self.spent = true;
    }

    fn consume(&mut self) {
        self.ammo = self.ammo.saturating_sub(1);
    }
}

// ============================================================================
// Firearm
// ============================================================================

/// Result of pulling the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FireOutcome {
    /// A round was fired
    Fired {
        /// Rounds left
        ammo_left: u32,
    },
    /// The shot interval has not elapsed
    CoolingDown,
    /// The magazine is being refilled
    Reloading,
    /// The magazine was empty and a reload started
    ReloadStarted,
    /// The magazine was empty and no reload was possible
    DryFire,
    /// No magazine is attached
    NoMagazine,
}

/// A hit produced by [`HitResolver::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShotHit {
    /// Entity struck
    pub target: EntityId,
    /// Region struck
    pub region: BodyRegion,
    /// Damage to apply
    pub damage: i32,
    /// World-space hit point
    pub point: Vec3,
}

/// Maps a raycast hit to region-based damage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitResolver {
    /// Maximum hit distance
    pub fire_distance: f32,
    /// Damage for a head hit
    pub head_damage: i32,
    /// Damage for a body hit
    pub body_damage: i32,
}

impl Default for HitResolver {
    fn default() -> Self {
        Self::from_tuning(&WeaponTuning::default())
    }
}

impl HitResolver {
    /// Creates a resolver from weapon tuning.
    #[must_use]
    pub fn from_tuning(tuning: &WeaponTuning) -> Self {
        Self {
            fire_distance: tuning.fire_distance,
            head_damage: tuning.head_damage,
            body_damage: tuning.body_damage,
        }
    }

    /// Damage dealt to `region`, if any.
    #[must_use]
    pub const fn damage_for(&self, region: BodyRegion) -> Option<i32> {
        match region {
            BodyRegion::Head => Some(self.head_damage),
            BodyRegion::Body => Some(self.body_damage),
            BodyRegion::Other => None,
        }
    }

    /// Casts a shot from `origin` along `direction`, skipping `shooter`.
    pub fn resolve(
        &self,
        spatial: &dyn SpatialQuery,
        shooter: EntityId,
        origin: Vec3,
        direction: Vec3,
    ) -> Option<ShotHit> {
        let direction = direction.try_normalize()?;
        let hit = spatial.raycast(origin, direction, self.fire_distance, LayerMask::HITBOX)?;
        if hit.entity == shooter {
            return None;
        }
        let damage = self.damage_for(hit.region)?;
        Some(ShotHit {
            target: hit.entity,
            region: hit.region,
            damage,
            point: hit.point,
        })
    }
}

/// Magazine-fed firearm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weapon {
    shot_interval: f64,
    auto_reload: bool,
    magazine: Option<Magazine>,
    last_shot: Option<f64>,
    spare_capacity: u32,
    reload_time: f32,
    resolver: HitResolver,
}

impl Weapon {
    /// Creates a weapon with an empty magazine attached.
    #[must_use]
    pub fn from_tuning(tuning: &WeaponTuning) -> Self {
        Self {
            shot_interval: f64::from(tuning.shot_interval),
            auto_reload: tuning.auto_reload,
            magazine: Some(Magazine::new(tuning.magazine_capacity, tuning.reload_time)),
            last_shot: None,
            spare_capacity: tuning.magazine_capacity,
            reload_time: tuning.reload_time,
            resolver: HitResolver::from_tuning(tuning),
        }
    }

    /// Replaces the attached magazine.
    #[must_use]
    pub fn with_magazine(mut self, magazine: Option<Magazine>) -> Self {
        self.magazine = magazine;
        self
    }

    /// Attached magazine.
    #[must_use]
    pub const fn magazine(&self) -> Option<&Magazine> {
        self.magazine.as_ref()
    }

    /// Hit resolver for this weapon.
    #[must_use]
    pub const fn resolver(&self) -> &HitResolver {
        &self.resolver
    }

    /// Returns true if empty magazines reload on their own.
    #[must_use]
    pub const fn auto_reload(&self) -> bool {
        self.auto_reload
    }

    /// Pulls the trigger at time `now` (seconds).
    pub fn try_fire(&mut self, now: f64) -> FireOutcome {
        let Some(magazine) = self.magazine.as_mut() else {
            return FireOutcome::NoMagazine;
        };
        if magazine.is_reloading() {
            return FireOutcome::Reloading;
        }
        if magazine.has_ammo() {
            if self
                .last_shot
                .is_some_and(|last| now - last < self.shot_interval)
            {
                return FireOutcome::CoolingDown;
            }
            magazine.consume();
            self.last_shot = Some(now);
            return FireOutcome::Fired {
                ammo_left: magazine.ammo(),
            };
        }
        if self.auto_reload && magazine.reload() {
            FireOutcome::ReloadStarted
        } else {
            FireOutcome::DryFire
        }
    }

    /// Attaches a fresh magazine and starts loading it.
    /// Returns false if a usable magazine is already attached.
    pub fn attach_magazine(&mut self) -> bool {
        if self.magazine.as_ref().is_some_and(|m| !m.is_spent()) {
            return false;
        }
        let mut magazine = Magazine::new(self.spare_capacity, self.reload_time);
        magazine.reload();
        self.magazine = Some(magazine);
        true
    }

    /// Detaches and unloads the magazine.
    pub fn detach_magazine(&mut self) -> Option<Magazine> {
        let mut magazine = self.magazine.take()?;
        magazine.unload();
        Some(magazine)
    }

    /// Advances reload timers. Returns true when a reload completes.
    pub fn tick(&mut self, dt: f32) -> bool {
        self.magazine.as_mut().is_some_and(|m| m.tick(dt))
    }
}

// ============================================================================
// Melee blade
// ============================================================================

/// Blade collider that deals damage at most once per arming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeleeBlade {
    damage: i32,
    wielder: EntityCategory,
    armed: bool,
    has_struck: bool,
}

impl MeleeBlade {
    /// Creates a disarmed blade.
    #[must_use]
    pub const fn new(damage: i32, wielder: EntityCategory) -> Self {
        Self {
            damage,
            wielder,
            armed: false,
            has_struck: false,
        }
    }

    /// Returns true while the blade collider is live.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed
    }

    /// Enables the collider and resets the single-hit latch.
    pub fn arm(&mut self) {
        self.armed = true;
        self.has_struck = false;
    }

    /// Disables the collider.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Resolves a contact with an entity of `target` category.
    /// Returns the damage to apply, if the contact counts.
    pub fn strike(&mut self, target: EntityCategory) -> Option<i32> {
        if !self.armed || self.has_struck || !self.wielder.opposes(target) {
            return None;
        }
        self.has_struck = true;
        Some(self.damage)
    }
}
