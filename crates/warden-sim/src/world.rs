//! Demo arena.
//!
//! Stands in for the host engine: moves navigation agents in straight lines,
//! plays clips on a fixed clock, answers raycasts against box obstacles and
//! the player's hitbox, walks the player around a loop and reports trigger
//! contacts to the level.

use glam::{Vec2, Vec3};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::{debug, info, trace};

use warden_ai::prelude::*;
use warden_common::{EntityId, EntityTag, Pose};

use crate::config::SimSettings;

/// Height of the player's hitbox.
const PLAYER_HEIGHT: f32 = 1.8;
/// Hitbox heights at or above this count as head shots.
const HEAD_HEIGHT: f32 = 1.5;
/// Radius of the player's hitbox.
const PLAYER_RADIUS: f32 = 0.4;
/// Height of cover boxes.
const COVER_HEIGHT: f32 = 1.2;
/// Length of every animation clip in seconds.
const CLIP_LENGTH: f32 = 0.8;
/// Extra reach of a blade beyond the wielder's capsule.
const BLADE_REACH: f32 = 1.6;
/// Distance to an obstacle that counts as touching it.
const CONTACT_MARGIN: f32 = 0.4;
/// Range of the player's return fire.
const RETURN_FIRE_RANGE: f32 = 15.0;

// ============================================================================
// Navigation
// ============================================================================

#[derive(Debug)]
struct Agent {
    position: Vec3,
    destination: Option<Vec3>,
    stopping_distance: f32,
    stopped: bool,
    enabled: bool,
    speed: f32,
    bounds: f32,
}

/// Straight-line navigation agent shared between the NPC and the arena.
#[derive(Debug, Clone)]
pub struct AgentHandle(Rc<RefCell<Agent>>);

impl AgentHandle {
    /// Creates an agent confined to a square of half side `bounds`.
    #[must_use]
    pub fn new(position: Vec3, bounds: f32) -> Self {
        Self(Rc::new(RefCell::new(Agent {
            position,
            destination: None,
            stopping_distance: 0.0,
            stopped: false,
            enabled: true,
            speed: 3.5,
            bounds,
        })))
    }

    /// Walks towards the destination.
    pub fn advance(&self, dt: f32) {
        let mut agent = self.0.borrow_mut();
        if !agent.enabled || agent.stopped {
            return;
        }
        let Some(destination) = agent.destination else {
            return;
        };
        let to_go = destination - agent.position;
        let step = agent.speed * dt;
        if to_go.length() <= step {
            agent.position = destination;
        } else {
            agent.position += to_go.normalize_or_zero() * step;
        }
    }

    fn clamp(&self, point: Vec3) -> Vec3 {
        let bounds = self.0.borrow().bounds;
        Vec3::new(point.x.clamp(-bounds, bounds), 0.0, point.z.clamp(-bounds, bounds))
    }
}

impl Navigation for AgentHandle {
    fn position(&self) -> Vec3 {
        self.0.borrow().position
    }

    fn set_destination(&mut self, point: Vec3) -> bool {
        let point = self.clamp(point);
        let mut agent = self.0.borrow_mut();
        if !agent.enabled {
            return false;
        }
        agent.destination = Some(point);
        true
    }

    fn remaining_distance(&self) -> f32 {
        let agent = self.0.borrow();
        agent.destination.map_or(0.0, |d| agent.position.distance(d))
    }

    fn stopping_distance(&self) -> f32 {
        self.0.borrow().stopping_distance
    }

    fn set_stopping_distance(&mut self, distance: f32) {
        self.0.borrow_mut().stopping_distance = distance.max(0.0);
    }

    fn has_path(&self) -> bool {
        self.0.borrow().destination.is_some()
    }

    fn is_stopped(&self) -> bool {
        self.0.borrow().stopped
    }

    fn set_stopped(&mut self, stopped: bool) {
        self.0.borrow_mut().stopped = stopped;
    }

    fn is_enabled(&self) -> bool {
        self.0.borrow().enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.0.borrow_mut().enabled = enabled;
    }

    fn speed(&self) -> f32 {
        self.0.borrow().speed
    }

    fn set_speed(&mut self, speed: f32) {
        self.0.borrow_mut().speed = speed.max(0.0);
    }

    fn reset_path(&mut self) {
        self.0.borrow_mut().destination = None;
    }

    fn move_by(&mut self, offset: Vec3) {
        let target = self.clamp(self.position() + offset);
        let mut agent = self.0.borrow_mut();
        if agent.enabled {
            agent.position = target;
        }
    }

    fn warp(&mut self, position: Vec3) {
        let mut agent = self.0.borrow_mut();
        agent.position = position;
        agent.destination = None;
    }
}

// ============================================================================
// Animation
// ============================================================================

#[derive(Debug)]
struct ClipPlayer {
    entity: EntityId,
    clip: Option<String>,
    time: f32,
}

/// Animator that logs requests and plays every clip for a fixed length.
#[derive(Debug, Clone)]
pub struct ClipHandle(Rc<RefCell<ClipPlayer>>);

impl ClipHandle {
    /// Creates an animator for `entity`.
    #[must_use]
    pub fn new(entity: EntityId) -> Self {
        Self(Rc::new(RefCell::new(ClipPlayer {
            entity,
            clip: None,
            time: 0.0,
        })))
    }

    /// Advances playback.
    pub fn advance(&self, dt: f32) {
        self.0.borrow_mut().time += dt;
    }

    /// Clip currently playing.
    #[must_use]
    pub fn clip(&self) -> Option<String> {
        self.0.borrow().clip.clone()
    }
}

impl Animation for ClipHandle {
    fn cross_fade(&mut self, clip: &str, blend: f32) {
        let mut player = self.0.borrow_mut();
        debug!(entity = %player.entity, clip, blend, "Cross-fade");
        player.clip = Some(clip.to_string());
        player.time = 0.0;
    }

    fn set_parameter(&mut self, name: &str, value: AnimValue) {
        trace!(entity = %self.0.borrow().entity, name, ?value, "Animator parameter");
    }

    fn is_playing(&self, clip: &str) -> bool {
        self.0.borrow().clip.as_deref() == Some(clip)
    }

    fn normalized_time(&self) -> f32 {
        self.0.borrow().time / CLIP_LENGTH
    }
}

// ============================================================================
// Spatial queries
// ============================================================================

/// Axis-aligned cover box.
#[derive(Debug, Clone, Copy)]
pub struct CoverBox {
    /// Obstacle entity
    pub id: EntityId,
    /// Centre on the ground
    pub center: Vec3,
    /// Size on the XZ plane
    pub footprint: Vec2,
}

impl CoverBox {
    fn min(&self) -> Vec3 {
        self.center - Vec3::new(self.footprint.x * 0.5, 0.0, self.footprint.y * 0.5)
    }

    fn max(&self) -> Vec3 {
        self.center + Vec3::new(self.footprint.x * 0.5, COVER_HEIGHT, self.footprint.y * 0.5)
    }

    /// Whether a point on the ground is within `margin` of the box.
    #[must_use]
    pub fn touches(&self, point: Vec3, margin: f32) -> bool {
        let (min, max) = (self.min(), self.max());
        point.x >= min.x - margin
            && point.x <= max.x + margin
            && point.z >= min.z - margin
            && point.z <= max.z + margin
    }
}

/// Raycasts against cover boxes and the player's cylinder hitbox.
#[derive(Debug, Clone)]
pub struct ArenaSpatial {
    half_extent: f32,
    cover: Vec<CoverBox>,
    player: Option<EntityId>,
    player_position: Rc<Cell<Vec3>>,
}

impl ArenaSpatial {
    /// Creates an empty arena.
    #[must_use]
    pub fn new(half_extent: f32) -> Self {
        Self {
            half_extent,
            cover: Vec::new(),
            player: None,
            player_position: Rc::new(Cell::new(Vec3::ZERO)),
        }
    }

    /// Adds a cover box.
    #[must_use]
    pub fn with_cover(mut self, cover: CoverBox) -> Self {
        self.cover.push(cover);
        self
    }

    /// Gives the player a hitbox whose position follows `position`.
    #[must_use]
    pub fn with_player(mut self, id: EntityId, position: Rc<Cell<Vec3>>) -> Self {
        self.player = Some(id);
        self.player_position = position;
        self
    }

    fn obstacle_hit(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit> {
        self.cover
            .iter()
            .filter_map(|cover| {
                let distance = ray_box(origin, direction, cover.min(), cover.max())?;
                (distance <= max_distance).then(|| RayHit {
                    entity: cover.id,
                    tag: EntityTag::Obstacle,
                    region: BodyRegion::Other,
                    point: origin + direction * distance,
                    distance,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    fn player_hit(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit> {
        let id = self.player?;
        let base = self.player_position.get();
        let distance = ray_cylinder(origin, direction, base, PLAYER_RADIUS, PLAYER_HEIGHT)?;
        if distance > max_distance {
            return None;
        }
        let point = origin + direction * distance;
        let region = if point.y - base.y >= HEAD_HEIGHT {
            BodyRegion::Head
        } else {
            BodyRegion::Body
        };
        Some(RayHit {
            entity: id,
            tag: EntityTag::Player,
            region,
            point,
            distance,
        })
    }
}

impl SpatialQuery for ArenaSpatial {
    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<RayHit> {
        let direction = direction.try_normalize()?;
        let obstacle = mask
            .intersects(LayerMask::OBSTACLE)
            .then(|| self.obstacle_hit(origin, direction, max_distance))
            .flatten();
        let player = mask
            .intersects(LayerMask::HITBOX)
            .then(|| self.player_hit(origin, direction, max_distance))
            .flatten();
        match (obstacle, player) {
            (Some(a), Some(b)) => Some(if a.distance <= b.distance { a } else { b }),
            (a, b) => a.or(b),
        }
    }

    fn sample_nav_point(&self, point: Vec3, radius: f32) -> Option<Vec3> {
        let limit = self.half_extent - 0.5;
        let mut sampled = Vec3::new(point.x.clamp(-limit, limit), 0.0, point.z.clamp(-limit, limit));
        if let Some(cover) = self.cover.iter().find(|c| c.touches(sampled, 0.0)) {
            let offset = sampled - cover.center;
            let away = Vec3::new(offset.x, 0.0, offset.z).try_normalize().unwrap_or(Vec3::X);
            sampled = cover.center + away * (cover.footprint.max_element() * 0.75 + 0.5);
        }
        let drift = Vec2::new(sampled.x - point.x, sampled.z - point.z).length();
        (drift <= radius).then_some(sampled)
    }
}

/// Slab test. Returns the entry distance, or zero when starting inside.
fn ray_box(origin: Vec3, direction: Vec3, min: Vec3, max: Vec3) -> Option<f32> {
    let inv = direction.recip();
    let t1 = (min - origin) * inv;
    let t2 = (max - origin) * inv;
    let near = t1.min(t2).max_element();
    let far = t1.max(t2).min_element();
    if far < near.max(0.0) || near.is_nan() || far.is_nan() {
        return None;
    }
    Some(near.max(0.0))
}

/// Vertical cylinder standing on `base`.
fn ray_cylinder(origin: Vec3, direction: Vec3, base: Vec3, radius: f32, height: f32) -> Option<f32> {
    let o = Vec2::new(origin.x - base.x, origin.z - base.z);
    let d = Vec2::new(direction.x, direction.z);
    let a = d.length_squared();
    let c = o.length_squared() - radius * radius;
    let t = if c <= 0.0 {
        0.0
    } else {
        if a <= f32::EPSILON {
            return None;
        }
        let b = 2.0 * o.dot(d);
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            return None;
        }
        let t = (-b - disc.sqrt()) / (2.0 * a);
        if t < 0.0 {
            return None;
        }
        t
    };
    let y = origin.y + direction.y * t - base.y;
    (0.0..=height).contains(&y).then_some(t)
}

// ============================================================================
// Arena
// ============================================================================

/// A level with its scripted surroundings.
pub struct Arena {
    level: Level,
    settings: SimSettings,
    player: EntityId,
    player_position: Rc<Cell<Vec3>>,
    player_angle: f32,
    cover: Vec<CoverBox>,
    agents: BTreeMap<EntityId, (AgentHandle, ClipHandle)>,
    in_detection: BTreeSet<EntityId>,
    touching_cover: BTreeSet<EntityId>,
    return_fire_timer: f32,
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("player", &self.player)
            .field("agents", &self.agents.len())
            .field("now", &self.level.now())
            .finish_non_exhaustive()
    }
}

impl Arena {
    /// Builds the demo arena: four cover boxes, a player on a loop, soldiers
    /// patrolling the outer ring and melee warriors waiting inside it.
    pub fn build(settings: &SimSettings, config: AiConfig) -> AiResult<Self> {
        let half = settings.arena_half_extent;
        let player = EntityId::new();
        let start = Vec3::new(settings.player_orbit_radius, 0.0, 0.0);
        let player_position = Rc::new(Cell::new(start));

        let offset = half * 0.3;
        let cover: Vec<CoverBox> = [(1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)]
            .into_iter()
            .map(|(x, z)| CoverBox {
                id: EntityId::new(),
                center: Vec3::new(x * offset, 0.0, z * offset),
                footprint: Vec2::new(2.0, 1.0),
            })
            .collect();

        let mut registry = TagRegistry::new();
        let mut spatial =
            ArenaSpatial::new(half).with_player(player, Rc::clone(&player_position));
        for c in &cover {
            registry.add_cover(CoverSpot::new(c.id, c.center, c.footprint));
            spatial = spatial.with_cover(*c);
        }
        if settings.melee > 0 {
            registry.set_detection_sphere(EntityId::new(), settings.detection_radius);
        }

        let mut level = Level::new(config, spatial, registry);
        if let Some(seed) = settings.seed {
            level = level.with_rng(FastRandom::with_seed(seed));
        }
        level.spawn_player(player, Pose::at(start))?;

        let mut arena = Self {
            level,
            settings: settings.clone(),
            player,
            player_position,
            player_angle: 0.0,
            cover,
            agents: BTreeMap::new(),
            in_detection: BTreeSet::new(),
            touching_cover: BTreeSet::new(),
            return_fire_timer: settings.return_fire_interval,
        };

        let ring = half * 0.7;
        for i in 0..settings.soldiers {
            let angle = std::f32::consts::TAU * i as f32 / settings.soldiers as f32;
            let home = Vec3::new(angle.cos() * ring, 0.0, angle.sin() * ring);
            let route = (0..4)
                .map(|k| {
                    let a = angle + std::f32::consts::FRAC_PI_4 * (k as f32 - 1.5);
                    Vec3::new(a.cos() * ring, 0.0, a.sin() * ring)
                })
                .collect();
            let spawn = NpcSpawn::soldier(EntityId::new(), Pose::at(home).facing(-home))
                .with_patrol_route(route);
            arena.spawn(spawn, home)?;
        }

        let inner = half * 0.5;
        for i in 0..settings.melee {
            let angle = std::f32::consts::TAU * (i as f32 + 0.5) / settings.melee as f32;
            let home = Vec3::new(angle.cos() * inner, 0.0, angle.sin() * inner);
            arena.spawn(NpcSpawn::melee(EntityId::new(), Pose::at(home)), home)?;
        }

        info!(
            soldiers = settings.soldiers,
            melee = settings.melee,
            cover = arena.cover.len(),
            "Arena ready"
        );
        Ok(arena)
    }

    fn spawn(&mut self, spawn: NpcSpawn, home: Vec3) -> AiResult<EntityId> {
        let agent = AgentHandle::new(home, self.settings.arena_half_extent);
        let clips = ClipHandle::new(spawn.id());
        let id = self.level.spawn_npc(
            spawn
                .with_navigation(agent.clone())
                .with_animation(clips.clone()),
        )?;
        self.agents.insert(id, (agent, clips));
        Ok(id)
    }

    /// The simulated level.
    #[must_use]
    pub fn level(&self) -> &Level {
        &self.level
    }

    /// The player's entity id.
    #[must_use]
    pub fn player(&self) -> EntityId {
        self.player
    }

    /// Whether the player is still standing.
    #[must_use]
    pub fn player_alive(&self) -> bool {
        self.level.player_health().is_ok_and(|h| !h.is_dead())
    }

    /// Advances the host side, then the level, by one tick.
    pub fn step(&mut self, dt: f32) -> AiResult<()> {
        if self.player_alive() {
            self.walk_player(dt)?;
        }
        for (agent, clips) in self.agents.values() {
            agent.advance(dt);
            clips.advance(dt);
        }
        self.report_detection()?;
        self.report_cover_contacts()?;
        self.report_blade_contacts()?;
        if self.player_alive() {
            self.return_fire(dt)?;
        }

        self.level.tick(dt);

        let level = &self.level;
        self.agents.retain(|id, _| level.npc(*id).is_some());
        self.in_detection.retain(|id| level.npc(*id).is_some());
        self.touching_cover.retain(|id| level.npc(*id).is_some());
        Ok(())
    }

    fn walk_player(&mut self, dt: f32) -> AiResult<()> {
        let radius = self.settings.player_orbit_radius;
        if radius <= f32::EPSILON {
            return Ok(());
        }
        self.player_angle += self.settings.player_speed / radius * dt;
        let (sin, cos) = self.player_angle.sin_cos();
        let position = Vec3::new(cos * radius, 0.0, sin * radius);
        let forward = Vec3::new(-sin, 0.0, cos);
        self.player_position.set(position);
        self.level.set_player_pose(Pose::at(position).facing(forward))
    }

    fn report_detection(&mut self) -> AiResult<()> {
        if self.level.registry().detection_radius().is_none() {
            return Ok(());
        }
        let player = self.player_position.get();
        let radius = self.settings.detection_radius;
        let candidates: Vec<(EntityId, bool)> = self
            .level
            .npcs()
            .filter(|npc| npc.detector().is_some())
            .map(|npc| (npc.id(), npc.position().distance(player) <= radius))
            .collect();
        for (id, inside) in candidates {
            if inside && self.in_detection.insert(id) {
                self.level.player_entered_detection(id)?;
            } else if !inside && self.in_detection.remove(&id) {
                self.level.player_exited_detection(id)?;
            }
        }
        Ok(())
    }

    fn report_cover_contacts(&mut self) -> AiResult<()> {
        let touching: Vec<(EntityId, bool)> = self
            .level
            .npcs()
            .filter(|npc| npc.kind() == NpcKind::Melee)
            .map(|npc| {
                let position = npc.position();
                (npc.id(), self.cover.iter().any(|c| c.touches(position, CONTACT_MARGIN)))
            })
            .collect();
        for (id, touches) in touching {
            if touches && self.touching_cover.insert(id) {
                debug!(entity = %id, "Obstacle contact");
                self.level.report_obstacle_contact(id)?;
            } else if !touches {
                self.touching_cover.remove(&id);
            }
        }
        Ok(())
    }

    fn report_blade_contacts(&mut self) -> AiResult<()> {
        let player = self.player_position.get();
        let wielders: Vec<EntityId> = self
            .level
            .npcs()
            .filter(|npc| npc.body().blade.as_ref().is_some_and(MeleeBlade::is_armed))
            .filter(|npc| npc.position().distance(player) <= BLADE_REACH)
            .map(Npc::id)
            .collect();
        for wielder in wielders {
            if let Some(event) = self.level.report_blade_contact(wielder, self.player)? {
                debug!(entity = %wielder, ?event, "Blade landed");
            }
        }
        Ok(())
    }

    fn return_fire(&mut self, dt: f32) -> AiResult<()> {
        if self.settings.return_fire_interval <= 0.0 {
            return Ok(());
        }
        self.return_fire_timer -= dt;
        if self.return_fire_timer > 0.0 {
            return Ok(());
        }
        self.return_fire_timer = self.settings.return_fire_interval;

        let player = self.player_position.get();
        let target = self
            .level
            .npcs()
            .filter(|npc| !npc.health().is_dead())
            .map(|npc| (npc.id(), npc.position().distance(player)))
            .filter(|(_, distance)| *distance <= RETURN_FIRE_RANGE)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((target, _)) = target {
            self.level
                .apply_damage(target, self.settings.return_fire_damage, Some(self.player))?;
        }
        Ok(())
    }
}
