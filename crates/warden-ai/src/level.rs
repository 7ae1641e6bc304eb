//! Level simulation.
//!
//! A [`Level`] owns every NPC, the player and the level-scoped services
//! (coordinator, scheduler, random source, spatial queries, tag registry,
//! event bus and object pools). The host drives it with [`Level::tick`] and
//! reports trigger contacts through the `report_*` and `player_*` methods.
//!
//! One tick runs, in order:
//! 1. deferred tasks that came due,
//! 2. weapon reload timers,
//! 3. detector polls,
//! 4. per-NPC state updates,
//! 5. coordinator arbitration,
//! 6. queued cross-entity effects.

use std::collections::BTreeMap;

use glam::Vec3;
use tracing::{debug, info, trace, warn};

use warden_common::{EntityCategory, EntityError, EntityId, EntityTag, PoolKey, Pose};

use crate::config::AiConfig;
use crate::context::{Effect, LevelContext, TargetView};
use crate::coordinator::NpcCoordinator;
use crate::error::{AiError, AiResult};
use crate::events::{AiEvent, EventBus};
use crate::fsm::{StateId, StateSignal};
use crate::health::{Health, HealthEvent};
use crate::npc::{Npc, NpcSpawn};
use crate::pool::{ObjectPool, PoolRegistry, ShellCasing};
use crate::random::{FastRandom, RandomSource};
use crate::registry::TagRegistry;
use crate::scheduler::{DueTask, ScheduledAction, Scheduler};
use crate::spatial::SpatialQuery;

/// Upper bound on effect passes per tick.
const MAX_EFFECT_PASSES: usize = 8;

/// The player as tracked by the level.
#[derive(Debug, Clone)]
pub struct PlayerActor {
    /// Entity id
    pub id: EntityId,
    /// Current pose
    pub pose: Pose,
    /// Vitality
    pub health: Health,
}

impl PlayerActor {
    fn view(&self) -> TargetView {
        TargetView {
            id: self.id,
            position: self.pose.position,
            dead: self.health.is_dead(),
        }
    }
}

struct LevelServices {
    player: Option<PlayerActor>,
    coordinator: NpcCoordinator,
    scheduler: Scheduler,
    rng: Box<dyn RandomSource>,
    spatial: Box<dyn SpatialQuery>,
    registry: TagRegistry,
    events: EventBus,
    casings: PoolRegistry<ShellCasing>,
    effects: Vec<Effect>,
}

impl LevelServices {
    fn context(&mut self) -> LevelContext<'_> {
        LevelContext {
            now: self.scheduler.now(),
            target: self.player.as_ref().map(PlayerActor::view),
            spatial: &*self.spatial,
            registry: &self.registry,
            coordinator: &mut self.coordinator,
            scheduler: &mut self.scheduler,
            rng: &mut *self.rng,
            events: &self.events,
            effects: &mut self.effects,
        }
    }
}

/// A running level.
pub struct Level {
    config: AiConfig,
    npcs: BTreeMap<EntityId, Npc>,
    services: LevelServices,
}

impl std::fmt::Debug for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Level")
            .field("now", &self.services.scheduler.now())
            .field("npcs", &self.npcs.len())
            .field("player", &self.services.player.as_ref().map(|p| p.id))
            .field("attacker", &self.services.coordinator.attacker())
            .finish_non_exhaustive()
    }
}

impl Level {
    /// Creates an empty level.
    pub fn new(config: AiConfig, spatial: impl SpatialQuery + 'static, registry: TagRegistry) -> Self {
        let casings = PoolRegistry::new().with_pool(ObjectPool::new(
            PoolKey::CASING,
            config.pool.default_capacity,
            config.pool.max_size,
            ShellCasing::default,
        ));
        let services = LevelServices {
            player: None,
            coordinator: NpcCoordinator::new(config.coordinator.clone()),
            scheduler: Scheduler::new(),
            rng: Box::new(FastRandom::new()),
            spatial: Box::new(spatial),
            registry,
            events: EventBus::default(),
            casings,
            effects: Vec::new(),
        };
        Self {
            config,
            npcs: BTreeMap::new(),
            services,
        }
    }

    /// Replaces the random source.
    #[must_use]
    pub fn with_rng(mut self, rng: impl RandomSource + 'static) -> Self {
        self.services.rng = Box::new(rng);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Configuration the level was built with.
    #[must_use]
    pub const fn config(&self) -> &AiConfig {
        &self.config
    }

    /// Simulation time in seconds.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.services.scheduler.now()
    }

    /// NPC by id.
    #[must_use]
    pub fn npc(&self, id: EntityId) -> Option<&Npc> {
        self.npcs.get(&id)
    }

    /// All NPCs, ordered by id.
    pub fn npcs(&self) -> impl Iterator<Item = &Npc> + '_ {
        self.npcs.values()
    }

    /// The player, if spawned.
    #[must_use]
    pub const fn player(&self) -> Option<&PlayerActor> {
        self.services.player.as_ref()
    }

    /// Coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &NpcCoordinator {
        &self.services.coordinator
    }

    /// Scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.services.scheduler
    }

    /// Tag registry.
    #[must_use]
    pub const fn registry(&self) -> &TagRegistry {
        &self.services.registry
    }

    /// Shell casing pools.
    #[must_use]
    pub const fn casings(&self) -> &PoolRegistry<ShellCasing> {
        &self.services.casings
    }

    /// Event bus.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.services.events
    }

    /// Mutable event bus, for subscribing.
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.services.events
    }

    fn npc_mut(&mut self, id: EntityId) -> AiResult<&mut Npc> {
        self.npcs
            .get_mut(&id)
            .ok_or(AiError::Entity(EntityError::NotFound(id)))
    }

    // ========================================================================
    // Player
    // ========================================================================

    /// Adds the player to the level.
    pub fn spawn_player(&mut self, id: EntityId, pose: Pose) -> AiResult<()> {
        if !id.is_valid() {
            return Err(EntityError::Null.into());
        }
        if self.services.player.is_some() || self.npcs.contains_key(&id) {
            return Err(EntityError::AlreadyRegistered(id).into());
        }
        self.services.registry.register(EntityTag::Player, id);
        self.services.player = Some(PlayerActor {
            id,
            pose,
            health: Health::new(self.config.health.player_max_health, EntityCategory::Player),
        });
        info!(entity = ?id, "Player spawned");
        Ok(())
    }

    /// Moves the player.
    pub fn set_player_pose(&mut self, pose: Pose) -> AiResult<()> {
        let player = self.services.player.as_mut().ok_or(AiError::NoPlayer)?;
        player.pose = pose;
        Ok(())
    }

    /// Moves the player, keeping its facing.
    pub fn set_player_position(&mut self, position: Vec3) -> AiResult<()> {
        let player = self.services.player.as_mut().ok_or(AiError::NoPlayer)?;
        player.pose.position = position;
        Ok(())
    }

    /// Player health.
    pub fn player_health(&self) -> AiResult<&Health> {
        self.services
            .player
            .as_ref()
            .map(|p| &p.health)
            .ok_or(AiError::NoPlayer)
    }

    // ========================================================================
    // NPC lifecycle
    // ========================================================================

    /// Adds an NPC and enters its starting state.
    pub fn spawn_npc(&mut self, spawn: NpcSpawn) -> AiResult<EntityId> {
        let id = spawn.id();
        if !id.is_valid() {
            return Err(EntityError::Null.into());
        }
        if self.npcs.contains_key(&id) || self.services.player.as_ref().is_some_and(|p| p.id == id) {
            return Err(EntityError::AlreadyRegistered(id).into());
        }

        let mut npc = Npc::from_spawn(spawn, &self.config, &self.services.registry);
        let kind = npc.kind();
        self.services.registry.register(EntityTag::Npc, id);
        self.services.coordinator.add_to_level(id);
        self.services.events.publish(AiEvent::NpcSpawned { entity_id: id, kind });
        info!(entity = ?id, kind = kind.display_name(), "NPC spawned");

        npc.start(self.services.context());
        self.npcs.insert(id, npc);
        Ok(id)
    }

    /// Removes an NPC, cancelling everything it still has scheduled.
    pub fn despawn(&mut self, id: EntityId) -> AiResult<()> {
        if self.npcs.remove(&id).is_none() {
            return Err(EntityError::NotFound(id).into());
        }
        let cancelled = self.services.scheduler.cancel_owner(id);
        self.services.coordinator.remove_from_level(id);
        self.services.registry.unregister(id);
        self.services.events.publish(AiEvent::NpcDespawned { entity_id: id });
        info!(entity = ?id, cancelled, "NPC despawned");
        Ok(())
    }

    /// Switches an NPC's state from outside its state machine.
    pub fn force_state(&mut self, id: EntityId, state: StateId) -> AiResult<bool> {
        let Self { npcs, services, .. } = self;
        let npc = npcs
            .get_mut(&id)
            .ok_or(AiError::Entity(EntityError::NotFound(id)))?;
        if npc.is_inert() {
            return Err(AiError::MissingDependency {
                entity: id,
                dependency: "navigation",
            });
        }
        if !npc.has_state(state) {
            return Err(AiError::MissingState { entity: id, state });
        }
        Ok(npc.force_state(state, services.context()))
    }

    // ========================================================================
    // Damage
    // ========================================================================

    /// Applies damage to the player or an NPC.
    pub fn apply_damage(
        &mut self,
        target: EntityId,
        amount: i32,
        source: Option<EntityId>,
    ) -> AiResult<Option<HealthEvent>> {
        if let Some(player) = self.services.player.as_mut().filter(|p| p.id == target) {
            let event = player.health.take_damage(amount);
            match event {
                Some(HealthEvent::Damaged {
                    category,
                    amount,
                    remaining,
                }) => self.services.events.publish(AiEvent::Damaged {
                    entity_id: target,
                    category,
                    amount,
                    remaining,
                    source,
                }),
                Some(HealthEvent::Died { category }) => {
                    info!(entity = ?target, "Player died");
                    self.services.events.publish(AiEvent::Died {
                        entity_id: target,
                        category,
                    });
                },
                None => {},
            }
            return Ok(event);
        }

        let Self { npcs, services, .. } = self;
        let npc = npcs
            .get_mut(&target)
            .ok_or(AiError::Entity(EntityError::NotFound(target)))?;
        Ok(npc.take_damage(amount, source, services.context()))
    }

    // ========================================================================
    // Host-reported contacts
    // ========================================================================

    /// The player entered `npc`'s detection trigger.
    pub fn player_entered_detection(&mut self, npc: EntityId) -> AiResult<()> {
        self.npc_mut(npc)?.player_entered_detection();
        Ok(())
    }

    /// The player left `npc`'s detection trigger.
    pub fn player_exited_detection(&mut self, npc: EntityId) -> AiResult<()> {
        let Self { npcs, services, .. } = self;
        let npc = npcs
            .get_mut(&npc)
            .ok_or(AiError::Entity(EntityError::NotFound(npc)))?;
        npc.player_exited_detection(services.context());
        Ok(())
    }

    /// `npc` bumped into an obstacle.
    pub fn report_obstacle_contact(&mut self, npc: EntityId) -> AiResult<()> {
        let Self { npcs, services, .. } = self;
        let npc = npcs
            .get_mut(&npc)
            .ok_or(AiError::Entity(EntityError::NotFound(npc)))?;
        npc.signal(StateSignal::ObstacleContact, services.context());
        Ok(())
    }

    /// `wielder`'s blade touched `target`.
    pub fn report_blade_contact(
        &mut self,
        wielder: EntityId,
        target: EntityId,
    ) -> AiResult<Option<HealthEvent>> {
        let category = if self.services.player.as_ref().is_some_and(|p| p.id == target) {
            EntityCategory::Player
        } else if self.npcs.contains_key(&target) {
            EntityCategory::Npc
        } else {
            return Err(EntityError::NotFound(target).into());
        };
        let Some(amount) = self.npc_mut(wielder)?.strike_with_blade(category) else {
            trace!(?wielder, ?target, "Blade contact ignored");
            return Ok(None);
        };
        self.apply_damage(target, amount, Some(wielder))
    }

    // ========================================================================
    // Magazines
    // ========================================================================

    /// Attaches a fresh magazine to `npc`'s weapon. Returns false if one is in use.
    pub fn attach_magazine(&mut self, npc: EntityId) -> AiResult<bool> {
        let weapon = self
            .npc_mut(npc)?
            .weapon_mut()
            .ok_or(AiError::MissingDependency {
                entity: npc,
                dependency: "weapon",
            })?;
        let attached = weapon.attach_magazine();
        if attached {
            self.services
                .events
                .publish(AiEvent::MagazineAttached { entity_id: npc });
        }
        Ok(attached)
    }

    /// Detaches `npc`'s magazine. Returns false if none was attached.
    pub fn detach_magazine(&mut self, npc: EntityId) -> AiResult<bool> {
        let weapon = self
            .npc_mut(npc)?
            .weapon_mut()
            .ok_or(AiError::MissingDependency {
                entity: npc,
                dependency: "weapon",
            })?;
        let detached = weapon.detach_magazine().is_some();
        if detached {
            self.services
                .events
                .publish(AiEvent::MagazineDetached { entity_id: npc });
        }
        Ok(detached)
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advances the level by `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        for task in self.services.scheduler.advance(dt) {
            self.run_task(task);
        }

        for npc in self.npcs.values_mut() {
            let id = npc.id();
            if npc.weapon_mut().is_some_and(|w| w.tick(dt)) {
                debug!(entity = ?id, "Reload complete");
            }
        }

        let Self { npcs, services, .. } = self;
        for npc in npcs.values_mut() {
            npc.poll_detector(dt, services.context());
        }
        for npc in npcs.values_mut() {
            npc.update(dt, services.context());
        }

        if let Some(chosen) = services.coordinator.tick(dt, &mut *services.rng) {
            services
                .events
                .publish(AiEvent::AttackerSelected { entity_id: chosen });
        }

        self.apply_effects();
    }

    fn run_task(&mut self, task: DueTask) {
        match task.action {
            ScheduledAction::SwitchState { from, to } => {
                let Self { npcs, services, .. } = self;
                let Some(npc) = npcs.get_mut(&task.owner) else {
                    trace!(owner = ?task.owner, "Switch for missing entity dropped");
                    return;
                };
                if from.is_some() && npc.current_state() != from {
                    debug!(entity = ?task.owner, ?from, ?to, current = ?npc.current_state(), "Stale deferred switch dropped");
                    return;
                }
                npc.force_state(to, services.context());
            },
            ScheduledAction::Despawn => {
                if let Err(e) = self.despawn(task.owner) {
                    warn!(error = %e, "Scheduled despawn failed");
                }
            },
            ScheduledAction::ReturnToPool(handle) => {
                if self.services.casings.release(handle) {
                    self.services.events.publish(AiEvent::ReturnedToPool { handle });
                }
            },
        }
    }

    fn apply_effects(&mut self) {
        for _ in 0..MAX_EFFECT_PASSES {
            let effects = std::mem::take(&mut self.services.effects);
            if effects.is_empty() {
                return;
            }
            for effect in effects {
                self.apply_effect(effect);
            }
        }
        if !self.services.effects.is_empty() {
            warn!(pending = self.services.effects.len(), "Effects deferred to next tick");
        }
    }

    fn apply_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Damage {
                target,
                source,
                amount,
            } => {
                if let Err(e) = self.apply_damage(target, amount, Some(source)) {
                    debug!(error = %e, "Damage target vanished");
                }
            },
            Effect::AlertNearby { source, position } => self.alert_nearby(source, position),
            Effect::EjectCasing {
                source,
                position,
                forward,
            } => self.eject_casing(source, position, forward),
        }
    }

    fn alert_nearby(&mut self, source: EntityId, position: Vec3) {
        let Self { npcs, services, .. } = self;
        let alerted = services
            .coordinator
            .on_player_spotted(position, |id| npcs.get(&id).map(Npc::position));
        for id in alerted {
            if id == source {
                continue;
            }
            let Some(npc) = npcs.get_mut(&id) else {
                continue;
            };
            if npc.health().is_dead() || npc.body().has_spotted_player {
                continue;
            }
            if npc.force_state(StateId::Chase, services.context()) {
                debug!(entity = ?id, by = ?source, "Alerted");
                services.events.publish(AiEvent::Alerted {
                    entity_id: id,
                    by: source,
                });
            }
        }
    }

    fn eject_casing(&mut self, source: EntityId, position: Vec3, forward: Vec3) {
        let casings = &mut self.services.casings;
        let Some(handle) = casings.get(PoolKey::CASING) else {
            return;
        };
        if let Some(casing) = casings.get_mut(handle) {
            casing.position = position;
            casing.velocity = forward.cross(Vec3::Y) + Vec3::Y;
        }
        trace!(entity = ?source, slot = handle.slot, "Casing ejected");
        self.services.scheduler.schedule(
            EntityId::NULL,
            self.config.weapon.casing_lifetime,
            ScheduledAction::ReturnToPool(handle),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAnimation, MockNavigation, MockSpatial};
    use crate::random::ScriptedRandom;

    const PLAYER: EntityId = EntityId::from_raw(1000);
    const STEP: f32 = 1.0 / 60.0;

    fn level() -> Level {
        Level::new(AiConfig::default(), MockSpatial::new(), TagRegistry::new())
            .with_rng(ScriptedRandom::new())
    }

    fn soldier(raw: u64, position: Vec3) -> NpcSpawn {
        NpcSpawn::soldier(EntityId::from_raw(raw), Pose::at(position))
            .with_navigation(MockNavigation::at(position))
            .with_animation(MockAnimation::new())
    }

    fn melee(raw: u64, position: Vec3) -> NpcSpawn {
        NpcSpawn::melee(EntityId::from_raw(raw), Pose::at(position))
            .with_navigation(MockNavigation::at(position))
            .with_animation(MockAnimation::new())
    }

    fn run(level: &mut Level, seconds: f32) {
        let steps = (seconds / STEP).ceil() as usize;
        for _ in 0..steps {
            level.tick(STEP);
        }
    }

    #[test]
    fn test_spawn_rejects_duplicate_and_null_ids() {
        let mut level = level();
        let id = level.spawn_npc(soldier(1, Vec3::ZERO)).expect("first spawn");
        assert_eq!(level.npc(id).and_then(Npc::current_state), Some(StateId::Idle));

        let err = level.spawn_npc(soldier(1, Vec3::ZERO)).expect_err("duplicate id");
        assert_eq!(err, AiError::Entity(EntityError::AlreadyRegistered(id)));

        let err = level
            .spawn_npc(NpcSpawn::soldier(EntityId::NULL, Pose::default()))
            .expect_err("null id");
        assert_eq!(err, AiError::Entity(EntityError::Null));
    }

    #[test]
    fn test_spawn_without_navigation_is_inert() {
        let mut level = level();
        let id = level
            .spawn_npc(NpcSpawn::soldier(EntityId::from_raw(5), Pose::default()))
            .expect("spawn");
        let npc = level.npc(id).expect("npc");
        assert!(npc.is_inert());
        assert_eq!(npc.current_state(), None);
        level.tick(STEP);
        assert_eq!(level.npc(id).and_then(Npc::current_state), None);
    }

    #[test]
    fn test_damage_routes_to_hit_cover_and_death() {
        let mut level = level();
        let id = level.spawn_npc(soldier(1, Vec3::ZERO)).expect("spawn");

        level.apply_damage(id, 10, None).expect("damage");
        assert_eq!(level.npc(id).and_then(Npc::current_state), Some(StateId::Hit));

        level.apply_damage(id, 50, None).expect("damage");
        assert_eq!(level.npc(id).and_then(Npc::current_state), Some(StateId::Cover));

        let event = level.apply_damage(id, 40, None).expect("damage");
        assert_eq!(
            event,
            Some(HealthEvent::Died {
                category: EntityCategory::Npc
            })
        );
        assert_eq!(level.npc(id).and_then(Npc::current_state), Some(StateId::Death));
        assert_eq!(level.apply_damage(id, 10, None).expect("damage"), None);

        let events = level.events().drain();
        assert!(events.contains(&AiEvent::Died {
            entity_id: id,
            category: EntityCategory::Npc
        }));
    }

    #[test]
    fn test_death_releases_coordinator_slots() {
        let mut level = level();
        let id = level.spawn_npc(melee(1, Vec3::ZERO)).expect("spawn");
        level.services.coordinator.register_in_range(id);
        level.services.coordinator.set_attacker(id);

        level.apply_damage(id, 100, Some(PLAYER)).expect("damage");

        assert!(!level.coordinator().is_in_range(id));
        assert_eq!(level.coordinator().attacker(), None);
        assert!(level
            .events()
            .drain()
            .contains(&AiEvent::AttackerCleared { entity_id: id }));
    }

    #[test]
    fn test_corpse_despawns_after_delay() {
        let mut level = level();
        let id = level.spawn_npc(soldier(1, Vec3::ZERO)).expect("spawn");
        level.apply_damage(id, 100, None).expect("damage");

        level.tick(STEP);
        assert_eq!(level.npc(id).and_then(Npc::current_state), Some(StateId::Idle));
        assert_eq!(level.scheduler().pending_for(id), 1);

        let duration = level.config().soldier.corpse_delay + 0.1;
        run(&mut level, duration);
        assert!(level.npc(id).is_none());
        assert!(!level.coordinator().level_members().any(|m| m == id));
        let despawned = level
            .events()
            .drain()
            .into_iter()
            .filter(|e| matches!(e, AiEvent::NpcDespawned { .. }))
            .count();
        assert_eq!(despawned, 1);
    }

    #[test]
    fn test_despawn_cancels_pending_tasks() {
        let mut level = level();
        let id = level.spawn_npc(soldier(1, Vec3::ZERO)).expect("spawn");
        level.apply_damage(id, 100, None).expect("damage");
        level.tick(STEP);
        assert_eq!(level.scheduler().pending_for(id), 1);

        level.despawn(id).expect("despawn");
        assert_eq!(level.scheduler().pending_for(id), 0);
        assert!(level.despawn(id).is_err());

        run(&mut level, 6.0);
        let despawned = level
            .events()
            .drain()
            .into_iter()
            .filter(|e| matches!(e, AiEvent::NpcDespawned { .. }))
            .count();
        assert_eq!(despawned, 1);
    }

    #[test]
    fn test_player_death_marks_target_dead() {
        let mut level = level();
        level.spawn_player(PLAYER, Pose::at(Vec3::new(0.0, 0.0, 2.0))).expect("player");

        let event = level.apply_damage(PLAYER, 60, None).expect("damage");
        assert!(matches!(event, Some(HealthEvent::Damaged { remaining: 40, .. })));
        level.apply_damage(PLAYER, 40, None).expect("damage");

        assert!(level.player_health().expect("player").is_dead());
        let view = level.player().map(PlayerActor::view).expect("player");
        assert!(view.dead);
        assert!(level.events().drain().contains(&AiEvent::Died {
            entity_id: PLAYER,
            category: EntityCategory::Player
        }));
    }

    #[test]
    fn test_detector_spots_player_and_alerts_neighbours() {
        let registry = TagRegistry::new().with_detection_sphere(EntityId::from_raw(900), 20.0);
        let mut level = Level::new(AiConfig::default(), MockSpatial::new(), registry)
            .with_rng(ScriptedRandom::new());
        level.spawn_player(PLAYER, Pose::at(Vec3::new(0.0, 0.0, 10.0))).expect("player");
        let spotter = level.spawn_npc(melee(1, Vec3::ZERO)).expect("spawn");
        let neighbour = level.spawn_npc(melee(2, Vec3::new(3.0, 0.0, 0.0))).expect("spawn");
        let far = level.spawn_npc(melee(3, Vec3::new(40.0, 0.0, 0.0))).expect("spawn");

        level.player_entered_detection(spotter).expect("enter");
        level.tick(STEP);

        assert_eq!(level.npc(spotter).and_then(Npc::current_state), Some(StateId::Chase));
        assert!(level.coordinator().is_in_range(spotter));
        assert!(!level
            .npc(spotter)
            .and_then(Npc::detector)
            .is_some_and(|d| d.is_polling()));
        assert_eq!(level.npc(neighbour).and_then(Npc::current_state), Some(StateId::Chase));
        assert_ne!(level.npc(far).and_then(Npc::current_state), Some(StateId::Chase));

        let events = level.events().drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, AiEvent::PlayerSpotted { entity_id, .. } if *entity_id == spotter)));
        assert!(events.contains(&AiEvent::Alerted {
            entity_id: neighbour,
            by: spotter
        }));
    }

    #[test]
    fn test_exiting_detection_unregisters() {
        let registry = TagRegistry::new().with_detection_sphere(EntityId::from_raw(900), 20.0);
        let mut level = Level::new(AiConfig::default(), MockSpatial::new(), registry)
            .with_rng(ScriptedRandom::new());
        level.spawn_player(PLAYER, Pose::at(Vec3::new(0.0, 0.0, 10.0))).expect("player");
        let id = level.spawn_npc(melee(1, Vec3::ZERO)).expect("spawn");

        level.player_entered_detection(id).expect("enter");
        level.tick(STEP);
        assert!(level.coordinator().is_in_range(id));

        level.player_exited_detection(id).expect("exit");
        assert!(!level.coordinator().is_in_range(id));
        assert!(!level.npc(id).expect("npc").body().has_spotted_player);
    }

    #[test]
    fn test_blade_contact_requires_armed_blade_and_opposing_target() {
        let mut level = level();
        level.spawn_player(PLAYER, Pose::at(Vec3::new(0.0, 0.0, 0.5))).expect("player");
        let warrior = level.spawn_npc(melee(1, Vec3::ZERO)).expect("spawn");
        let other = level.spawn_npc(melee(2, Vec3::new(1.0, 0.0, 0.0))).expect("spawn");

        assert_eq!(level.report_blade_contact(warrior, PLAYER).expect("contact"), None);

        assert!(level.force_state(warrior, StateId::Attack).expect("force"));
        assert_eq!(level.report_blade_contact(warrior, other).expect("contact"), None);
        let event = level.report_blade_contact(warrior, PLAYER).expect("contact");
        assert!(matches!(event, Some(HealthEvent::Damaged { amount: 10, .. })));
        assert_eq!(level.report_blade_contact(warrior, PLAYER).expect("contact"), None);
    }

    #[test]
    fn test_soldier_shot_ejects_pooled_casing() {
        let mut level = level();
        level.spawn_player(PLAYER, Pose::at(Vec3::new(0.0, 0.0, 2.0))).expect("player");
        let id = level.spawn_npc(soldier(1, Vec3::ZERO)).expect("spawn");

        run(&mut level, 1.2);
        assert_eq!(level.npc(id).and_then(Npc::current_state), Some(StateId::Attack));
        let events = level.events().drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, AiEvent::WeaponFired { entity_id, .. } if *entity_id == id)));
        let pool = level.casings().pool(PoolKey::CASING).expect("casing pool");
        assert_eq!(pool.active_count(), 1);

        run(&mut level, 1.6);
        assert!(level
            .events()
            .drain()
            .iter()
            .any(|e| matches!(e, AiEvent::ReturnedToPool { .. })));
        let pool = level.casings().pool(PoolKey::CASING).expect("casing pool");
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_magazine_attach_and_detach_publish_events() {
        let mut level = level();
        let id = level.spawn_npc(soldier(1, Vec3::ZERO)).expect("spawn");

        assert!(!level.attach_magazine(id).expect("attach"));
        assert!(level.detach_magazine(id).expect("detach"));
        assert!(!level.detach_magazine(id).expect("detach"));
        assert!(level.attach_magazine(id).expect("attach"));

        let events = level.events().drain();
        assert!(events.contains(&AiEvent::MagazineDetached { entity_id: id }));
        assert!(events.contains(&AiEvent::MagazineAttached { entity_id: id }));

        let warrior = level.spawn_npc(melee(2, Vec3::ZERO)).expect("spawn");
        assert_eq!(
            level.attach_magazine(warrior),
            Err(AiError::MissingDependency {
                entity: warrior,
                dependency: "weapon"
            })
        );
    }

    #[test]
    fn test_force_state_checks_state_set() {
        let mut level = level();
        let warrior = level.spawn_npc(melee(1, Vec3::ZERO)).expect("spawn");
        assert_eq!(
            level.force_state(warrior, StateId::Patrol),
            Err(AiError::MissingState {
                entity: warrior,
                state: StateId::Patrol
            })
        );
        assert_eq!(level.force_state(warrior, StateId::Wander), Ok(true));
        assert_eq!(level.npc(warrior).and_then(Npc::previous_state), Some(StateId::Idle));
    }

    #[test]
    fn test_obstacle_contact_on_unknown_npc_fails() {
        let mut level = level();
        assert!(level.report_obstacle_contact(EntityId::from_raw(77)).is_err());
    }
}
