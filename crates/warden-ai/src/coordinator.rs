//! Level-wide NPC coordination.
//!
//! The coordinator owns the set of NPCs in the level, the subset currently in
//! range of the player, and the single attacker slot. It is a plain value
//! owned by the level and lent to states each tick.

use glam::Vec3;
use std::collections::BTreeSet;
use tracing::{debug, info};

use warden_common::EntityId;

use crate::config::CoordinatorTuning;
use crate::random::RandomSource;

/// Arbitrates the attack turn and alert propagation.
#[derive(Debug, Clone)]
pub struct NpcCoordinator {
    all_in_level: BTreeSet<EntityId>,
    in_range: Vec<EntityId>,
    attacker: Option<EntityId>,
    attack_timer: Option<f32>,
    tuning: CoordinatorTuning,
}

impl Default for NpcCoordinator {
    fn default() -> Self {
        Self::new(CoordinatorTuning::default())
    }
}

impl NpcCoordinator {
    /// Creates a coordinator for a freshly loaded level.
    #[must_use]
    pub fn new(tuning: CoordinatorTuning) -> Self {
        Self {
            all_in_level: BTreeSet::new(),
            in_range: Vec::new(),
            attacker: None,
            attack_timer: Some(tuning.initial_delay),
            tuning,
        }
    }

    /// Tuning in use.
    #[must_use]
    pub const fn tuning(&self) -> &CoordinatorTuning {
        &self.tuning
    }

    /// Adds an NPC to the level roster.
    pub fn add_to_level(&mut self, id: EntityId) {
        self.all_in_level.insert(id);
    }

    /// Removes an NPC from the level and from every coordination slot.
    pub fn remove_from_level(&mut self, id: EntityId) {
        self.all_in_level.remove(&id);
        self.unregister_out_of_range(id);
        self.clear_attacker(id);
    }

    /// NPCs in the level.
    pub fn level_members(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.all_in_level.iter().copied()
    }

    /// Marks an NPC as in range of the player. Returns false if it already was.
    pub fn register_in_range(&mut self, id: EntityId) -> bool {
        if self.in_range.contains(&id) {
            return false;
        }
        self.in_range.push(id);
        debug!(entity = ?id, "NPC in range");
        true
    }

    /// Removes an NPC from the in-range set. Returns false if it was not in it.
    pub fn unregister_out_of_range(&mut self, id: EntityId) -> bool {
        let before = self.in_range.len();
        self.in_range.retain(|e| *e != id);
        let removed = self.in_range.len() != before;
        if removed {
            debug!(entity = ?id, "NPC out of range");
        }
        removed
    }

    /// Returns true if the NPC is in range of the player.
    #[must_use]
    pub fn is_in_range(&self, id: EntityId) -> bool {
        self.in_range.contains(&id)
    }

    /// NPCs in range, in registration order.
    #[must_use]
    pub fn in_range(&self) -> &[EntityId] {
        &self.in_range
    }

    /// Current attacker.
    #[must_use]
    pub const fn attacker(&self) -> Option<EntityId> {
        self.attacker
    }

    /// Returns true if any NPC holds the attack turn.
    #[must_use]
    pub const fn is_any_attacking(&self) -> bool {
        self.attacker.is_some()
    }

    /// Grants the attack turn to `id`.
    pub fn set_attacker(&mut self, id: EntityId) {
        self.attacker = Some(id);
    }

    /// Releases the attack turn if `id` holds it. Returns true if it did.
    pub fn clear_attacker(&mut self, id: EntityId) -> bool {
        if self.attacker != Some(id) {
            return false;
        }
        self.attacker = None;
        debug!(entity = ?id, "Attacker cleared");
        true
    }

    /// Seconds until the next attacker is picked, if a countdown is running.
    #[must_use]
    pub const fn attack_timer(&self) -> Option<f32> {
        self.attack_timer
    }

    /// Runs one arbitration step. Returns the newly selected attacker, if any.
    pub fn tick(&mut self, dt: f32, rng: &mut dyn RandomSource) -> Option<EntityId> {
        if self.in_range.is_empty() {
            self.attack_timer = None;
            return None;
        }
        if self.attacker.is_some() {
            return None;
        }
        let interval = self.tuning.attack_interval;
        let timer = self.attack_timer.get_or_insert_with(|| interval.sample(rng));
        *timer -= dt;
        if *timer > 0.0 {
            return None;
        }
        let index = rng.pick_index(self.in_range.len())?;
        let chosen = self.in_range[index];
        self.attacker = Some(chosen);
        self.attack_timer = Some(interval.sample(rng));
        info!(entity = ?chosen, "Attacker selected");
        Some(chosen)
    }

    /// NPCs to alert after one spotted the player at `position`.
    ///
    /// Returns every level member within the alert range that is not already
    /// in range of the player. `locate` resolves an NPC's current position.
    pub fn on_player_spotted(
        &self,
        position: Vec3,
        locate: impl Fn(EntityId) -> Option<Vec3>,
    ) -> Vec<EntityId> {
        self.all_in_level
            .iter()
            .copied()
            .filter(|id| !self.in_range.contains(id))
            .filter(|id| {
                locate(*id).is_some_and(|p| p.distance(position) <= self.tuning.alert_range)
            })
            .collect()
    }

    /// Drops all level state, as on a scene reload.
    pub fn reset(&mut self) {
        *self = Self::new(self.tuning.clone());
    }
}
