//! NPC entities.
//!
//! An [`Npc`] owns its state machine, blackboard, health, optional weapon
//! and its navigation and animation collaborators. Everything level-wide is
//! borrowed per call through a [`LevelContext`].

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use warden_common::{EntityCategory, EntityId, Pose};

use crate::animation::{Animation, NoAnimation};
use crate::behaviors::{melee, soldier};
use crate::config::AiConfig;
use crate::context::{Blackboard, Effect, LevelContext, NpcContext};
use crate::detector::PlayerDetector;
use crate::events::AiEvent;
use crate::fsm::{StateId, StateMachine, StateSignal};
use crate::health::{Health, HealthEvent};
use crate::navigation::Navigation;
use crate::perception::Perception;
use crate::registry::TagRegistry;
use crate::weapon::{MeleeBlade, Weapon};

/// NPC archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NpcKind {
    /// Ranged soldier with a firearm
    Soldier,
    /// Sword-wielding warrior
    Melee,
}

impl NpcKind {
    /// Returns all archetypes.
    #[must_use]
    pub const fn all() -> [Self; 2] {
        [Self::Soldier, Self::Melee]
    }

    /// Returns the display name for this archetype.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Soldier => "Soldier",
            Self::Melee => "Melee",
        }
    }
}

/// Description of an NPC to spawn.
pub struct NpcSpawn {
    id: EntityId,
    kind: NpcKind,
    pose: Pose,
    nav: Option<Box<dyn Navigation>>,
    anim: Option<Box<dyn Animation>>,
    route: Vec<Vec3>,
}

impl std::fmt::Debug for NpcSpawn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NpcSpawn")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("pose", &self.pose)
            .field("has_nav", &self.nav.is_some())
            .field("has_anim", &self.anim.is_some())
            .field("route", &self.route)
            .finish()
    }
}

impl NpcSpawn {
    fn new(id: EntityId, kind: NpcKind, pose: Pose) -> Self {
        Self {
            id,
            kind,
            pose,
            nav: None,
            anim: None,
            route: Vec::new(),
        }
    }

    /// A soldier.
    #[must_use]
    pub fn soldier(id: EntityId, pose: Pose) -> Self {
        Self::new(id, NpcKind::Soldier, pose)
    }

    /// A melee warrior.
    #[must_use]
    pub fn melee(id: EntityId, pose: Pose) -> Self {
        Self::new(id, NpcKind::Melee, pose)
    }

    /// Entity id to spawn under.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Sets the navigation agent.
    #[must_use]
    pub fn with_navigation(mut self, nav: impl Navigation + 'static) -> Self {
        self.nav = Some(Box::new(nav));
        self
    }

    /// Sets the animation sink.
    #[must_use]
    pub fn with_animation(mut self, anim: impl Animation + 'static) -> Self {
        self.anim = Some(Box::new(anim));
        self
    }

    /// Sets the patrol waypoints (soldiers only).
    #[must_use]
    pub fn with_patrol_route(mut self, route: Vec<Vec3>) -> Self {
        self.route = route;
        self
    }
}

/// An AI-controlled actor.
pub struct Npc {
    id: EntityId,
    kind: NpcKind,
    machine: StateMachine,
    body: Blackboard,
    health: Health,
    weapon: Option<Weapon>,
    nav: Option<Box<dyn Navigation>>,
    anim: Box<dyn Animation>,
    detector: Option<PlayerDetector>,
    cover_threshold: f32,
}

impl std::fmt::Debug for Npc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Npc")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.machine.current())
            .field("health", &self.health)
            .field("inert", &self.is_inert())
            .finish_non_exhaustive()
    }
}

impl Npc {
    /// Builds an NPC from a spawn description.
    ///
    /// Missing collaborators do not fail the spawn. Without navigation the
    /// NPC is inert; without animation it uses a silent sink; a melee NPC
    /// without a detection trigger in the level never polls for the player.
    #[must_use]
    pub fn from_spawn(spawn: NpcSpawn, config: &AiConfig, registry: &TagRegistry) -> Self {
        let NpcSpawn {
            id,
            kind,
            pose,
            mut nav,
            anim,
            route,
        } = spawn;

        if let Some(nav) = nav.as_mut() {
            nav.warp(pose.position);
        } else {
            error!(entity = ?id, "No navigation agent, NPC is inert");
        }
        let anim = anim.unwrap_or_else(|| {
            warn!(entity = ?id, "No animation sink, animation requests are dropped");
            Box::new(NoAnimation)
        });

        let (machine, body, weapon, detector) = match kind {
            NpcKind::Soldier => {
                let tuning = &config.soldier;
                let perception = Perception::soldier(
                    tuning.sight_distance,
                    tuning.sight_half_angle,
                    tuning.attack_distance,
                );
                let body = Blackboard::new(pose, perception, tuning.turn_rate)
                    .with_eye_height(config.weapon.muzzle_height);
                let machine = soldier::states(config, route)
                    .into_iter()
                    .fold(StateMachine::new(id), StateMachine::with_state);
                (machine, body, Some(Weapon::from_tuning(&config.weapon)), None)
            },
            NpcKind::Melee => {
                let tuning = &config.melee;
                let perception = Perception::melee(tuning.sight_half_angle, tuning.attack_distance);
                let body = Blackboard::new(pose, perception, tuning.turn_rate)
                    .with_eye_height(config.weapon.muzzle_height)
                    .with_blade(MeleeBlade::new(tuning.blade_damage, EntityCategory::Npc));
                let machine = melee::states(config)
                    .into_iter()
                    .fold(StateMachine::new(id), StateMachine::with_state);
                let detector = if registry.detection_radius().is_some() {
                    Some(PlayerDetector::new(config.detector.poll_interval))
                } else {
                    error!(entity = ?id, "No player detection sphere in level, detector disabled");
                    None
                };
                (machine, body, None, detector)
            },
        };

        Self {
            id,
            kind,
            machine,
            body,
            health: Health::new(config.health.npc_max_health, EntityCategory::Npc),
            weapon,
            nav,
            anim,
            detector,
            cover_threshold: config.health.cover_threshold,
        }
    }

    /// Entity id.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Archetype.
    #[must_use]
    pub const fn kind(&self) -> NpcKind {
        self.kind
    }

    /// Current state.
    #[must_use]
    pub const fn current_state(&self) -> Option<StateId> {
        self.machine.current()
    }

    /// State preceding the current one.
    #[must_use]
    pub const fn previous_state(&self) -> Option<StateId> {
        self.machine.previous()
    }

    /// Returns true if the NPC's state set contains `state`.
    #[must_use]
    pub fn has_state(&self, state: StateId) -> bool {
        self.machine.has_state(state)
    }

    /// Health.
    #[must_use]
    pub const fn health(&self) -> &Health {
        &self.health
    }

    /// Blackboard.
    #[must_use]
    pub const fn body(&self) -> &Blackboard {
        &self.body
    }

    /// Firearm, if carried.
    #[must_use]
    pub const fn weapon(&self) -> Option<&Weapon> {
        self.weapon.as_ref()
    }

    /// Mutable firearm, if carried.
    pub fn weapon_mut(&mut self) -> Option<&mut Weapon> {
        self.weapon.as_mut()
    }

    /// Navigation agent, if any.
    #[must_use]
    pub fn navigation(&self) -> Option<&dyn Navigation> {
        self.nav.as_deref()
    }

    /// Player detector, if any.
    #[must_use]
    pub const fn detector(&self) -> Option<&PlayerDetector> {
        self.detector.as_ref()
    }

    /// Returns true if the NPC lacks navigation and never acts.
    #[must_use]
    pub const fn is_inert(&self) -> bool {
        self.nav.is_none()
    }

    /// World position.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.nav
            .as_ref()
            .map_or(self.body.pose.position, |nav| nav.position())
    }

    fn split<'a>(
        &'a mut self,
        level: LevelContext<'a>,
    ) -> Option<(&'a mut StateMachine, NpcContext<'a>)> {
        let nav = self.nav.as_deref_mut()?;
        Some((
            &mut self.machine,
            NpcContext {
                id: self.id,
                kind: self.kind,
                body: &mut self.body,
                nav,
                anim: &mut *self.anim,
                health: &self.health,
                weapon: self.weapon.as_mut(),
                level,
            },
        ))
    }

    /// Enters the starting state.
    pub fn start(&mut self, level: LevelContext<'_>) {
        self.force_state(StateId::Idle, level);
    }

    /// Switches state from outside the state machine. Returns true on success.
    pub fn force_state(&mut self, state: StateId, level: LevelContext<'_>) -> bool {
        let Some((machine, mut ctx)) = self.split(level) else {
            return false;
        };
        machine.switch_state(Some(state), &mut ctx)
    }

    /// Runs one tick of the current state.
    pub fn update(&mut self, dt: f32, level: LevelContext<'_>) {
        let Some((machine, mut ctx)) = self.split(level) else {
            return;
        };
        machine.update(dt, &mut ctx);
        self.sync_pose();
    }

    /// Delivers a signal to the current state.
    pub fn signal(&mut self, signal: StateSignal, level: LevelContext<'_>) {
        if let Some((machine, mut ctx)) = self.split(level) {
            machine.signal(signal, &mut ctx);
        }
    }

    fn sync_pose(&mut self) {
        if let Some(nav) = self.nav.as_ref() {
            self.body.pose.position = nav.position();
        }
    }

    /// Applies damage and routes the outcome into the state machine.
    ///
    /// Death forces the death state and releases the NPC's coordination
    /// slots. Surviving a hit forces cover below the health threshold and a
    /// hit reaction otherwise.
    pub fn take_damage(
        &mut self,
        amount: i32,
        source: Option<EntityId>,
        mut level: LevelContext<'_>,
    ) -> Option<HealthEvent> {
        let event = self.health.take_damage(amount)?;
        let id = self.id;
        match event {
            HealthEvent::Damaged {
                category,
                amount,
                remaining,
            } => {
                level.events.publish(AiEvent::Damaged {
                    entity_id: id,
                    category,
                    amount,
                    remaining,
                    source,
                });
            },
            HealthEvent::Died { category } => {
                info!(entity = ?id, "NPC died");
                level.events.publish(AiEvent::Died {
                    entity_id: id,
                    category,
                });
                level.coordinator.unregister_out_of_range(id);
                if level.coordinator.clear_attacker(id) {
                    level.events.publish(AiEvent::AttackerCleared { entity_id: id });
                }
                self.body.has_spotted_player = false;
                if let Some(detector) = self.detector.as_mut() {
                    detector.stop();
                }
            },
        }
        self.route_health_event(event, level);
        Some(event)
    }

    fn route_health_event(&mut self, event: HealthEvent, level: LevelContext<'_>) {
        let next = match event {
            HealthEvent::Died { .. } => StateId::Death,
            HealthEvent::Damaged {
                category: EntityCategory::Npc,
                ..
            } => {
                if self.health.fraction() < self.cover_threshold {
                    StateId::Cover
                } else {
                    StateId::Hit
                }
            },
            HealthEvent::Damaged { .. } => return,
        };
        debug!(entity = ?self.id, state = ?next, "Damage response");
        self.force_state(next, level);
    }

    /// Reports a blade contact with an entity of `target` category.
    /// Returns the damage dealt, if the blade was armed and the target opposes its wielder.
    pub fn strike_with_blade(&mut self, target: EntityCategory) -> Option<i32> {
        if self.health.is_dead() {
            return None;
        }
        self.body.blade.as_mut()?.strike(target)
    }

    /// Starts visibility polling after the player entered the detection trigger.
    pub fn player_entered_detection(&mut self) {
        if self.health.is_dead() {
            return;
        }
        if let Some(detector) = self.detector.as_mut() {
            detector.start();
        }
    }

    /// Stops polling and releases the in-range slot after the player left the trigger.
    pub fn player_exited_detection(&mut self, mut level: LevelContext<'_>) {
        level.coordinator.unregister_out_of_range(self.id);
        self.body.has_spotted_player = false;
        if let Some(detector) = self.detector.as_mut() {
            detector.stop();
        }
    }

    /// Advances the detector. On a visible sample the NPC registers in
    /// range, raises an alert and starts chasing. Returns true if it did.
    pub fn poll_detector(&mut self, dt: f32, level: LevelContext<'_>) -> bool {
        let due = self
            .detector
            .as_mut()
            .is_some_and(|detector| detector.advance(dt));
        if !due || self.health.is_dead() {
            return false;
        }
        let spotted = {
            let Some((machine, mut ctx)) = self.split(level) else {
                return false;
            };
            if !ctx.player_visible() {
                return false;
            }
            if machine.has_state(StateId::Chase) {
                let position = ctx.nav.position();
                ctx.level.coordinator.register_in_range(ctx.id);
                ctx.body.has_spotted_player = true;
                info!(entity = ?ctx.id, "Player spotted");
                ctx.level.events.publish(AiEvent::PlayerSpotted {
                    entity_id: ctx.id,
                    position,
                });
                ctx.level.effects.push(Effect::AlertNearby {
                    source: ctx.id,
                    position,
                });
                machine.switch_state(Some(StateId::Chase), &mut ctx);
            }
            true
        };
        if let Some(detector) = self.detector.as_mut() {
            detector.stop();
        }
        spotted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAnimation, MockNavigation};

    fn spawn_soldier() -> NpcSpawn {
        NpcSpawn::soldier(EntityId::from_raw(1), Pose::at(Vec3::new(2.0, 0.0, 3.0)))
            .with_navigation(MockNavigation::default())
            .with_animation(MockAnimation::new())
    }

    #[test]
    fn test_soldier_state_set() {
        let npc = Npc::from_spawn(spawn_soldier(), &AiConfig::default(), &TagRegistry::new());
        for state in [
            StateId::Idle,
            StateId::Patrol,
            StateId::Wander,
            StateId::Chase,
            StateId::Attack,
            StateId::Cover,
            StateId::Hit,
            StateId::Death,
        ] {
            assert!(npc.has_state(state), "soldier lacks {state}");
        }
        assert!(!npc.has_state(StateId::Circling));
        assert!(!npc.has_state(StateId::Retreat));
        assert!(npc.weapon().is_some());
        assert!(npc.detector().is_none());
    }

    #[test]
    fn test_spawn_warps_navigation_to_pose() {
        let npc = Npc::from_spawn(spawn_soldier(), &AiConfig::default(), &TagRegistry::new());
        assert_eq!(npc.position(), Vec3::new(2.0, 0.0, 3.0));
        assert!(!npc.is_inert());
        assert_eq!(npc.current_state(), None);
    }

    #[test]
    fn test_melee_detector_follows_detection_sphere() {
        let spawn = || {
            NpcSpawn::melee(EntityId::from_raw(2), Pose::default())
                .with_navigation(MockNavigation::default())
        };
        let config = AiConfig::default();

        let npc = Npc::from_spawn(spawn(), &config, &TagRegistry::new());
        assert!(npc.detector().is_none());
        assert!(npc.has_state(StateId::Circling));
        assert!(!npc.has_state(StateId::Patrol));

        let registry = TagRegistry::new().with_detection_sphere(EntityId::from_raw(900), 12.0);
        let mut npc = Npc::from_spawn(spawn(), &config, &registry);
        let detector = npc.detector().expect("detector");
        assert!(!detector.is_polling());

        npc.player_entered_detection();
        assert!(npc.detector().is_some_and(PlayerDetector::is_polling));
    }

    #[test]
    fn test_missing_navigation_leaves_npc_inert() {
        let spawn = NpcSpawn::melee(EntityId::from_raw(3), Pose::at(Vec3::X));
        let npc = Npc::from_spawn(spawn, &AiConfig::default(), &TagRegistry::new());
        assert!(npc.is_inert());
        assert_eq!(npc.position(), Vec3::X);
        assert!(npc.navigation().is_none());
    }

    #[test]
    fn test_blade_strike_only_when_armed() {
        let spawn = NpcSpawn::melee(EntityId::from_raw(4), Pose::default())
            .with_navigation(MockNavigation::default());
        let mut npc = Npc::from_spawn(spawn, &AiConfig::default(), &TagRegistry::new());
        assert_eq!(npc.strike_with_blade(EntityCategory::Player), None);
        if let Some(blade) = npc.body.blade.as_mut() {
            blade.arm();
        }
        assert_eq!(npc.strike_with_blade(EntityCategory::Npc), None);
        assert_eq!(npc.strike_with_blade(EntityCategory::Player), Some(10));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(NpcKind::all().len(), 2);
        assert_eq!(NpcKind::Melee.display_name(), "Melee");
    }
}
