//! Melee warrior behavior.
//!
//! Warriors idle and wander until their detector spots the player, then
//! chase to striking range and circle. Only the NPC holding the
//! coordinator's attack turn closes in to strike; afterwards it backs off to
//! circling distance and waits for its next turn.

use tracing::debug;

use crate::animation::clips;
use crate::config::{AiConfig, MeleeTuning};
use crate::context::NpcContext;
use crate::fsm::{NpcState, StateId, StateSignal, Transitions};
use crate::npc::NpcKind;
use crate::spatial::LayerMask;

use super::shared::{planar_dir, CoverState, Fallback};
use warden_common::EntityTag;

/// Builds the full melee state set.
#[must_use]
pub fn states(config: &AiConfig) -> Vec<Box<dyn NpcState>> {
    let tuning = &config.melee;
    vec![
        Box::new(IdleState::new(tuning)),
        Box::new(WanderState::new(tuning.wander_radius)),
        Box::new(ChaseState::new(tuning)),
        Box::new(CirclingState::new(tuning)),
        Box::new(AttackState::new(tuning)),
        Box::new(RetreatState::new(tuning)),
        Box::new(CoverState::new(
            NpcKind::Melee,
            tuning.cover_speed,
            tuning.cover_offset,
            config.health.cover_threshold,
        )),
        Box::new(HitState::new(tuning.action_delay)),
        Box::new(DeathState::new(tuning.corpse_delay)),
    ]
}

/// Stands still facing the player for a random while, then wanders off.
#[derive(Debug)]
pub struct IdleState {
    tuning: MeleeTuning,
    timer: f32,
}

impl IdleState {
    /// Creates an idle state.
    #[must_use]
    pub fn new(tuning: &MeleeTuning) -> Self {
        Self {
            tuning: tuning.clone(),
            timer: 0.0,
        }
    }
}

impl NpcState for IdleState {
    fn id(&self) -> StateId {
        StateId::Idle
    }

    fn enter(&mut self, ctx: &mut NpcContext<'_>) {
        if !ctx.nav.is_enabled() {
            return;
        }
        ctx.nav.set_stopped(true);
        ctx.nav.reset_path();
        self.timer = self.tuning.idle_time.sample(&mut *ctx.level.rng);
        ctx.disarm_blade();
    }

    fn update(&mut self, dt: f32, ctx: &mut NpcContext<'_>, fsm: &mut Transitions) {
        if ctx.is_dead() {
            return;
        }
        ctx.face_player(dt);
        self.timer -= dt;
        if self.timer <= 0.0 {
            fsm.switch_to(StateId::Wander);
        }
    }
}

/// Walks between random navigable points.
#[derive(Debug)]
pub struct WanderState {
    radius: f32,
    target_set: bool,
}

impl WanderState {
    /// Creates a wander state.
    #[must_use]
    pub const fn new(radius: f32) -> Self {
        Self {
            radius,
            target_set: false,
        }
    }

    fn new_target(&mut self, ctx: &mut NpcContext<'_>) {
        let here = ctx.nav.position();
        let point = ctx.random_nav_point(self.radius);
        self.target_set = point != here && ctx.nav.set_destination(point);
    }
}

impl NpcState for WanderState {
    fn id(&self) -> StateId {
        StateId::Wander
    }

    fn enter(&mut self, ctx: &mut NpcContext<'_>) {
        if !ctx.nav.is_enabled() {
            return;
        }
        ctx.nav.set_stopped(false);
        self.target_set = false;
        self.new_target(ctx);
        ctx.disarm_blade();
        ctx.cross_fade(clips::WALK);
    }

    fn update(&mut self, _dt: f32, ctx: &mut NpcContext<'_>, _fsm: &mut Transitions) {
        if self.target_set && ctx.nav.remaining_distance() <= ctx.nav.stopping_distance() {
            self.new_target(ctx);
        }
    }
}

/// Runs at the player until close enough to circle.
#[derive(Debug)]
pub struct ChaseState {
    stop_distance: f32,
    stop_buffer: f32,
    action_delay: f32,
    fallback: Fallback,
}

impl ChaseState {
    /// Creates a chase state.
    #[must_use]
    pub fn new(tuning: &MeleeTuning) -> Self {
        Self {
            stop_distance: tuning.chase_stop_distance,
            stop_buffer: tuning.stop_buffer,
            action_delay: tuning.action_delay,
            fallback: Fallback::default(),
        }
    }
}

impl NpcState for ChaseState {
    fn id(&self) -> StateId {
        StateId::Chase
    }

    fn enter(&mut self, ctx: &mut NpcContext<'_>) {
        if !ctx.nav.is_enabled() {
            return;
        }
        ctx.nav.reset_path();
        ctx.nav.set_stopping_distance(self.stop_distance);
        ctx.nav.set_stopped(false);
        ctx.disarm_blade();
        ctx.cross_fade(clips::RUN);
    }

    fn update(&mut self, dt: f32, ctx: &mut NpcContext<'_>, fsm: &mut Transitions) {
        ctx.face_player(dt);
        if let Some(target) = ctx.player_position() {
            ctx.nav.set_destination(target);
        }
        let fallback = self.fallback.refresh(StateId::Chase, fsm);

        let distance = ctx.distance_to_player();
        if distance <= self.stop_distance + self.stop_buffer {
            ctx.cross_fade(clips::IDLE);
            ctx.defer_switch(StateId::Chase, StateId::Circling, self.action_delay);
        } else if distance > ctx.detection_radius() {
            debug!(entity = ?ctx.id, "Lost the player");
            fsm.switch_to_opt(fallback);
        }
    }

    fn exit(&mut self, ctx: &mut NpcContext<'_>) {
        ctx.nav.set_stopped(false);
    }
}

/// Orbits the player until the coordinator grants the attack turn.
#[derive(Debug)]
pub struct CirclingState {
    tuning: MeleeTuning,
    timer: f32,
    direction: f32,
}

impl CirclingState {
    /// Creates a circling state.
    #[must_use]
    pub fn new(tuning: &MeleeTuning) -> Self {
        Self {
            tuning: tuning.clone(),
            timer: 0.0,
            direction: 1.0,
        }
    }

    /// Seconds of circling left.
    #[must_use]
    pub const fn timer(&self) -> f32 {
        self.timer
    }

    /// Overrides the remaining circling time.
    pub fn set_timer(&mut self, seconds: f32) {
        self.timer = seconds;
    }

    fn reach(&self) -> f32 {
        self.tuning.chase_stop_distance + self.tuning.stop_buffer
    }
}

impl NpcState for CirclingState {
    fn id(&self) -> StateId {
        StateId::Circling
    }

    fn enter(&mut self, ctx: &mut NpcContext<'_>) {
        if !ctx.nav.is_enabled() {
            return;
        }
        ctx.nav.set_stopped(false);
        ctx.nav.reset_path();
        ctx.disarm_blade();
        self.timer = self.tuning.circling_time.sample(&mut *ctx.level.rng);
        if ctx.level.rng.range_i32(0, 2) == 0 {
            self.direction = -1.0;
            ctx.cross_fade(clips::STRAFE_LEFT);
        } else {
            self.direction = 1.0;
            ctx.cross_fade(clips::STRAFE_RIGHT);
        }
    }

    fn update(&mut self, dt: f32, ctx: &mut NpcContext<'_>, fsm: &mut Transitions) {
        if ctx.player_dead() {
            fsm.switch_to(StateId::Wander);
            return;
        }
        let reach = self.reach();
        let distance = ctx.distance_to_player();

        if self.timer > 0.0 && distance <= reach {
            self.timer -= dt;
            if let Some(pivot) = ctx.player_position() {
                let here = ctx.nav.position();
                let degrees = self.tuning.circling_speed * self.direction * dt;
                let next = crate::perception::orbit_around(here, pivot, degrees);
                ctx.step(next - here);
            }
            ctx.face_player(dt);
        }
        if self.timer <= 0.0 || distance > reach {
            if ctx.level.coordinator.attacker() == Some(ctx.id) {
                ctx.defer_switch(StateId::Circling, StateId::Attack, self.tuning.action_delay);
            } else {
                self.timer = self.tuning.circling_time.sample(&mut *ctx.level.rng);
            }
        }
        if distance > reach && distance <= ctx.detection_radius() {
            ctx.defer_switch(StateId::Circling, StateId::Chase, self.tuning.action_delay);
        }
    }

    fn exit(&mut self, ctx: &mut NpcContext<'_>) {
        ctx.nav.reset_path();
        ctx.cross_fade(clips::IDLE);
    }

    fn on_signal(&mut self, signal: StateSignal, ctx: &mut NpcContext<'_>) {
        match signal {
            StateSignal::ObstacleContact => {
                debug!(entity = ?ctx.id, "Circling blocked by obstacle");
                self.timer = 0.0;
            },
        }
    }
}

/// Closes in and lands a single sword strike.
#[derive(Debug)]
pub struct AttackState {
    tuning: MeleeTuning,
    striking: bool,
    finished: bool,
}

impl AttackState {
    /// Creates an attack state.
    #[must_use]
    pub fn new(tuning: &MeleeTuning) -> Self {
        Self {
            tuning: tuning.clone(),
            striking: false,
            finished: false,
        }
    }

    /// Returns true once a strike has started.
    #[must_use]
    pub const fn is_striking(&self) -> bool {
        self.striking
    }

    fn obstacle_ahead(&self, ctx: &NpcContext<'_>) -> bool {
        let pose = ctx.pose();
        let eyes = pose.position + glam::Vec3::Y * ctx.body.eye_height;
        ctx.level
            .spatial
            .raycast(eyes, pose.forward, self.tuning.attack_distance, LayerMask::OBSTACLE)
            .is_some_and(|hit| hit.tag == EntityTag::Obstacle)
    }
}

impl NpcState for AttackState {
    fn id(&self) -> StateId {
        StateId::Attack
    }

    fn enter(&mut self, ctx: &mut NpcContext<'_>) {
        self.striking = false;
        self.finished = false;
        if !ctx.nav.is_enabled() {
            return;
        }
        ctx.nav.set_stopped(false);
        ctx.arm_blade();
        ctx.snap_to_player();
        ctx.level.coordinator.set_attacker(ctx.id);
        ctx.cross_fade(clips::WALK);
    }

    fn update(&mut self, dt: f32, ctx: &mut NpcContext<'_>, _fsm: &mut Transitions) {
        if self.striking {
            if !self.finished
                && ctx.anim.is_playing(clips::SWORD_SLASH)
                && ctx.anim.normalized_time() >= self.tuning.strike_complete_at
            {
                self.finished = true;
                ctx.cross_fade(clips::IDLE);
                ctx.defer_switch(StateId::Attack, StateId::Retreat, self.tuning.action_delay);
            }
            return;
        }

        let Some(target) = ctx.player_position() else {
            return;
        };
        let here = ctx.nav.position();
        let distance = here.distance(target);
        if let Some(dir) = planar_dir(here, target) {
            if distance > self.tuning.attack_distance {
                let speed = ctx.nav.speed();
                ctx.step(dir * speed * dt);
            }
            ctx.face_player(dt);
        }

        if distance <= self.tuning.attack_distance + self.tuning.strike_margin {
            if self.obstacle_ahead(ctx) {
                ctx.level.coordinator.clear_attacker(ctx.id);
                ctx.defer_switch(StateId::Attack, StateId::Retreat, self.tuning.action_delay);
            } else {
                ctx.cross_fade(clips::SWORD_SLASH);
                self.striking = true;
            }
        }
    }

    fn exit(&mut self, ctx: &mut NpcContext<'_>) {
        ctx.level.coordinator.clear_attacker(ctx.id);
        ctx.nav.reset_path();
        self.striking = false;
        self.finished = false;
    }
}

/// Backs away to circling distance.
#[derive(Debug)]
pub struct RetreatState {
    distance: f32,
    action_delay: f32,
}

impl RetreatState {
    /// Creates a retreat state.
    #[must_use]
    pub fn new(tuning: &MeleeTuning) -> Self {
        Self {
            distance: tuning.chase_stop_distance,
            action_delay: tuning.action_delay,
        }
    }
}

impl NpcState for RetreatState {
    fn id(&self) -> StateId {
        StateId::Retreat
    }

    fn enter(&mut self, ctx: &mut NpcContext<'_>) {
        if !ctx.nav.is_enabled() {
            return;
        }
        ctx.nav.set_stopped(false);
        ctx.disarm_blade();
        ctx.cross_fade(clips::WALK_BACKWARD);
    }

    fn update(&mut self, dt: f32, ctx: &mut NpcContext<'_>, _fsm: &mut Transitions) {
        let Some(target) = ctx.player_position() else {
            return;
        };
        let here = ctx.nav.position();
        // Measured against the player, not the agent's path: backing off uses
        // `step` and never sets a destination.
        if here.distance(target) < self.distance {
            if let Some(dir) = planar_dir(here, target) {
                let speed = ctx.nav.speed();
                ctx.step(-dir * speed * dt);
            }
            ctx.face_player(dt);
        } else {
            ctx.defer_switch(StateId::Retreat, StateId::Circling, self.action_delay);
        }
    }

    fn exit(&mut self, ctx: &mut NpcContext<'_>) {
        ctx.cross_fade(clips::IDLE);
    }
}

/// Flinches, then returns to the interrupted state after a pause.
#[derive(Debug)]
pub struct HitState {
    return_delay: f32,
    fallback: Fallback,
}

impl HitState {
    /// Creates a hit state.
    #[must_use]
    pub fn new(return_delay: f32) -> Self {
        Self {
            return_delay,
            fallback: Fallback::default(),
        }
    }
}

impl NpcState for HitState {
    fn id(&self) -> StateId {
        StateId::Hit
    }

    fn enter(&mut self, ctx: &mut NpcContext<'_>) {
        if !ctx.nav.is_enabled() {
            return;
        }
        ctx.disarm_blade();
        ctx.cross_fade(clips::HIT_IMPACT);
    }

    fn update(&mut self, _dt: f32, ctx: &mut NpcContext<'_>, fsm: &mut Transitions) {
        if let Some(back) = self.fallback.refresh(StateId::Hit, fsm) {
            ctx.defer_switch(StateId::Hit, back, self.return_delay);
        }
    }

    fn exit(&mut self, ctx: &mut NpcContext<'_>) {
        ctx.cross_fade(clips::IDLE);
    }
}

/// Drops the warrior and schedules the corpse for removal on exit.
#[derive(Debug)]
pub struct DeathState {
    corpse_delay: f32,
}

impl DeathState {
    /// Creates a death state.
    #[must_use]
    pub const fn new(corpse_delay: f32) -> Self {
        Self { corpse_delay }
    }
}

impl NpcState for DeathState {
    fn id(&self) -> StateId {
        StateId::Death
    }

    fn enter(&mut self, ctx: &mut NpcContext<'_>) {
        ctx.disarm_blade();
        if ctx.nav.is_enabled() {
            ctx.nav.set_stopped(true);
            ctx.nav.reset_path();
            ctx.nav.set_enabled(false);
        }
        ctx.cross_fade(clips::DEATH);
    }

    fn update(&mut self, _dt: f32, _ctx: &mut NpcContext<'_>, fsm: &mut Transitions) {
        fsm.switch_to(StateId::Idle);
    }

    fn exit(&mut self, ctx: &mut NpcContext<'_>) {
        super::schedule_despawn(ctx, self.corpse_delay);
    }
}
