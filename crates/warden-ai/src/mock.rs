//! Mock collaborators for tests and headless runs.

use glam::Vec3;
use std::collections::HashMap;

use warden_common::{EntityCategory, EntityId, EntityTag, Pose};

use crate::animation::{AnimValue, Animation};
use crate::config::AiConfig;
use crate::context::{Blackboard, Effect, LevelContext, NpcContext, TargetView};
use crate::coordinator::NpcCoordinator;
use crate::events::EventBus;
use crate::health::Health;
use crate::navigation::Navigation;
use crate::npc::NpcKind;
use crate::perception::Perception;
use crate::random::ScriptedRandom;
use crate::registry::TagRegistry;
use crate::scheduler::Scheduler;
use crate::spatial::{BodyRegion, LayerMask, RayHit, SpatialQuery};
use crate::weapon::{MeleeBlade, Weapon};

/// Navigation agent that teleports on `move_by` and walks in straight lines on `advance`.
#[derive(Debug, Clone)]
pub struct MockNavigation {
    position: Vec3,
    destination: Option<Vec3>,
    stopping_distance: f32,
    stopped: bool,
    enabled: bool,
    speed: f32,
    reachable: bool,
}

impl Default for MockNavigation {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

impl MockNavigation {
    /// Creates an agent at `position`.
    #[must_use]
    pub const fn at(position: Vec3) -> Self {
        Self {
            position,
            destination: None,
            stopping_distance: 0.5,
            stopped: false,
            enabled: true,
            speed: 3.5,
            reachable: true,
        }
    }

    /// Makes every destination request fail.
    #[must_use]
    pub const fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Current destination.
    #[must_use]
    pub const fn destination(&self) -> Option<Vec3> {
        self.destination
    }

    /// Teleports the agent onto its destination.
    pub fn arrive(&mut self) {
        if let Some(destination) = self.destination {
            self.position = destination;
        }
    }

    /// Walks towards the destination at the current speed.
    pub fn advance(&mut self, dt: f32) {
        if !self.enabled || self.stopped {
            return;
        }
        let Some(destination) = self.destination else {
            return;
        };
        let to_go = destination - self.position;
        let step = self.speed * dt;
        if to_go.length() <= step {
            self.position = destination;
        } else {
            self.position += to_go.normalize_or_zero() * step;
        }
    }
}

impl Navigation for MockNavigation {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn set_destination(&mut self, point: Vec3) -> bool {
        if !self.enabled || !self.reachable {
            return false;
        }
        self.destination = Some(point);
        true
    }

    fn remaining_distance(&self) -> f32 {
        self.destination
            .map_or(0.0, |d| self.position.distance(d))
    }

    fn stopping_distance(&self) -> f32 {
        self.stopping_distance
    }

    fn set_stopping_distance(&mut self, distance: f32) {
        self.stopping_distance = distance.max(0.0);
    }

    fn has_path(&self) -> bool {
        self.destination.is_some()
    }

    fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn set_stopped(&mut self, stopped: bool) {
        self.stopped = stopped;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn speed(&self) -> f32 {
        self.speed
    }

    fn set_speed(&mut self, speed: f32) {
        self.speed = speed.max(0.0);
    }

    fn reset_path(&mut self) {
        self.destination = None;
    }

    fn move_by(&mut self, offset: Vec3) {
        if self.enabled {
            self.position += offset;
        }
    }

    fn warp(&mut self, position: Vec3) {
        self.position = position;
        self.destination = None;
    }
}

/// Animation sink that records every request.
#[derive(Debug, Clone, Default)]
pub struct MockAnimation {
    clip: Option<String>,
    normalized_time: f32,
    parameters: HashMap<String, AnimValue>,
    triggers: HashMap<String, usize>,
    cross_fades: Vec<String>,
}

impl MockAnimation {
    /// Creates an idle sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `clip` playing at `normalized_time`.
    #[must_use]
    pub fn with_clip(mut self, clip: &str, normalized_time: f32) -> Self {
        self.clip = Some(clip.to_string());
        self.normalized_time = normalized_time;
        self
    }

    /// Sets playback progress of the current clip.
    pub fn set_normalized_time(&mut self, t: f32) {
        self.normalized_time = t;
    }

    /// Last value written to a parameter.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<AnimValue> {
        self.parameters.get(name).copied()
    }

    /// Number of times a trigger fired.
    #[must_use]
    pub fn trigger_count(&self, name: &str) -> usize {
        self.triggers.get(name).copied().unwrap_or(0)
    }

    /// Clip currently playing.
    #[must_use]
    pub fn clip(&self) -> Option<&str> {
        self.clip.as_deref()
    }

    /// Every cross-fade requested, in order.
    #[must_use]
    pub fn cross_fades(&self) -> &[String] {
        &self.cross_fades
    }
}

impl Animation for MockAnimation {
    fn cross_fade(&mut self, clip: &str, _blend: f32) {
        self.clip = Some(clip.to_string());
        self.normalized_time = 0.0;
        self.cross_fades.push(clip.to_string());
    }

    fn set_parameter(&mut self, name: &str, value: AnimValue) {
        if value == AnimValue::Trigger {
            *self.triggers.entry(name.to_string()).or_default() += 1;
        }
        self.parameters.insert(name.to_string(), value);
    }

    fn is_playing(&self, clip: &str) -> bool {
        self.clip.as_deref() == Some(clip)
    }

    fn normalized_time(&self) -> f32 {
        self.normalized_time
    }
}

/// Spatial query with scripted ray hits and a permissive navmesh.
#[derive(Debug, Clone)]
pub struct MockSpatial {
    hits: Vec<(LayerMask, RayHit)>,
    navmesh: bool,
}

impl Default for MockSpatial {
    fn default() -> Self {
        Self {
            hits: Vec::new(),
            navmesh: true,
        }
    }
}

impl MockSpatial {
    /// Creates a query with no colliders and a navmesh everywhere.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a collider every ray passes through at `distance`.
    /// Obstacles sit on the obstacle layer, everything else on the hitbox layer.
    #[must_use]
    pub fn with_ray_hit(
        mut self,
        entity: EntityId,
        tag: EntityTag,
        region: BodyRegion,
        distance: f32,
    ) -> Self {
        let layer = if tag == EntityTag::Obstacle {
            LayerMask::OBSTACLE
        } else {
            LayerMask::HITBOX
        };
        self.hits.push((
            layer,
            RayHit {
                entity,
                tag,
                region,
                point: Vec3::ZERO,
                distance,
            },
        ));
        self
    }

    /// Makes every navmesh sample fail.
    #[must_use]
    pub fn without_navmesh(mut self) -> Self {
        self.navmesh = false;
        self
    }
}

impl SpatialQuery for MockSpatial {
    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<RayHit> {
        self.hits
            .iter()
            .filter(|(layer, hit)| mask.intersects(*layer) && hit.distance <= max_distance)
            .min_by(|a, b| a.1.distance.total_cmp(&b.1.distance))
            .map(|(_, hit)| RayHit {
                point: origin + direction * hit.distance,
                ..*hit
            })
    }

    fn sample_nav_point(&self, point: Vec3, _radius: f32) -> Option<Vec3> {
        self.navmesh.then_some(point)
    }
}

/// Owns everything an [`NpcContext`] borrows, for driving states directly.
#[derive(Debug)]
pub struct ContextRig {
    /// NPC under test
    pub id: EntityId,
    /// Archetype
    pub kind: NpcKind,
    /// Blackboard
    pub body: Blackboard,
    /// Navigation
    pub nav: MockNavigation,
    /// Animation
    pub anim: MockAnimation,
    /// Health
    pub health: Health,
    /// Firearm
    pub weapon: Option<Weapon>,
    /// Simulation time
    pub now: f64,
    /// Player snapshot
    pub target: Option<TargetView>,
    /// Spatial queries
    pub spatial: MockSpatial,
    /// Tag registry
    pub registry: TagRegistry,
    /// Coordinator
    pub coordinator: NpcCoordinator,
    /// Scheduler
    pub scheduler: Scheduler,
    /// Scripted random source
    pub rng: ScriptedRandom,
    /// Event bus
    pub events: EventBus,
    /// Queued effects
    pub effects: Vec<Effect>,
}

impl ContextRig {
    /// Player id used by rigs.
    pub const PLAYER: EntityId = EntityId::from_raw(1000);

    fn build(kind: NpcKind, config: &AiConfig) -> Self {
        let id = EntityId::from_raw(1);
        let (perception, turn_rate) = match kind {
            NpcKind::Soldier => (
                Perception::soldier(
                    config.soldier.sight_distance,
                    config.soldier.sight_half_angle,
                    config.soldier.attack_distance,
                ),
                config.soldier.turn_rate,
            ),
            NpcKind::Melee => (
                Perception::melee(config.melee.sight_half_angle, config.melee.attack_distance),
                config.melee.turn_rate,
            ),
        };
        let mut body = Blackboard::new(Pose::default(), perception, turn_rate)
            .with_eye_height(config.weapon.muzzle_height);
        let weapon = match kind {
            NpcKind::Soldier => Some(Weapon::from_tuning(&config.weapon)),
            NpcKind::Melee => {
                body.blade = Some(MeleeBlade::new(config.melee.blade_damage, EntityCategory::Npc));
                None
            },
        };
        Self {
            id,
            kind,
            body,
            nav: MockNavigation::default(),
            anim: MockAnimation::new(),
            health: Health::new(config.health.npc_max_health, EntityCategory::Npc),
            weapon,
            now: 0.0,
            target: None,
            spatial: MockSpatial::new(),
            registry: TagRegistry::new(),
            coordinator: NpcCoordinator::new(config.coordinator.clone()),
            scheduler: Scheduler::new(),
            rng: ScriptedRandom::new(),
            events: EventBus::default(),
            effects: Vec::new(),
        }
    }

    /// Soldier at the origin facing +Z.
    #[must_use]
    pub fn soldier() -> Self {
        Self::build(NpcKind::Soldier, &AiConfig::default())
    }

    /// Melee warrior at the origin facing +Z.
    #[must_use]
    pub fn melee() -> Self {
        Self::build(NpcKind::Melee, &AiConfig::default())
    }

    /// Places a living player at `position`.
    #[must_use]
    pub fn with_player_at(mut self, position: Vec3) -> Self {
        self.target = Some(TargetView {
            id: Self::PLAYER,
            position,
            dead: false,
        });
        self
    }

    /// Replaces the random script.
    #[must_use]
    pub fn with_rng(mut self, rng: ScriptedRandom) -> Self {
        self.rng = rng;
        self
    }

    /// Borrows everything as a context.
    pub fn ctx(&mut self) -> NpcContext<'_> {
        NpcContext {
            id: self.id,
            kind: self.kind,
            body: &mut self.body,
            nav: &mut self.nav,
            anim: &mut self.anim,
            health: &self.health,
            weapon: self.weapon.as_mut(),
            level: LevelContext {
                now: self.now,
                target: self.target,
                spatial: &self.spatial,
                registry: &self.registry,
                coordinator: &mut self.coordinator,
                scheduler: &mut self.scheduler,
                rng: &mut self.rng,
                events: &self.events,
                effects: &mut self.effects,
            },
        }
    }
}
