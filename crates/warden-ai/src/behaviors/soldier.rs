//! Ranged soldier behavior.
//!
//! Soldiers stand idle, patrol a waypoint route or wander, chase the player
//! on sight and fire from within attack distance. A hit sends them straight
//! back to what they were doing; heavy damage sends them to cover.

use glam::Vec3;
use tracing::{debug, error};

use crate::animation::BehaviorCue;
use crate::config::{AiConfig, SoldierTuning};
use crate::context::NpcContext;
use crate::fsm::{NpcState, StateId, Transitions};
use crate::npc::NpcKind;
use crate::weapon::FireOutcome;

use super::shared::{halt, set_moving, CoverState, Fallback};

/// Builds the full soldier state set.
#[must_use]
pub fn states(config: &AiConfig, route: Vec<Vec3>) -> Vec<Box<dyn NpcState>> {
    let tuning = &config.soldier;
    vec![
        Box::new(IdleState),
        Box::new(PatrolState::new(tuning.patrol_speed, route)),
        Box::new(WanderState::new(tuning.wander_speed, tuning.wander_radius)),
        Box::new(ChaseState::new(tuning.chase_speed)),
        Box::new(AttackState),
        Box::new(CoverState::new(
            NpcKind::Soldier,
            tuning.cover_speed,
            tuning.cover_offset,
            config.health.cover_threshold,
        )),
        Box::new(HitState::new(tuning.hit_return_delay)),
        Box::new(DeathState::new(tuning)),
    ]
}

fn patrol_or_wander(ctx: &mut NpcContext<'_>) -> StateId {
    if ctx.coin_flip() {
        StateId::Patrol
    } else {
        StateId::Wander
    }
}

/// Standing guard. Decides between chase, patrol and wander on the next tick.
#[derive(Debug, Default)]
pub struct IdleState;

impl NpcState for IdleState {
    fn id(&self) -> StateId {
        StateId::Idle
    }

    fn enter(&mut self, ctx: &mut NpcContext<'_>) {
        if ctx.nav.is_enabled() {
            ctx.nav.set_stopped(true);
        }
        ctx.cue(BehaviorCue::Idle);
    }

    fn update(&mut self, _dt: f32, ctx: &mut NpcContext<'_>, fsm: &mut Transitions) {
        // Corpses settle here
        if ctx.is_dead() {
            return;
        }
        if ctx.player_visible() {
            fsm.switch_to(StateId::Chase);
        } else {
            fsm.switch_to(patrol_or_wander(ctx));
        }
    }
}

/// Walks between randomly chosen waypoints.
#[derive(Debug)]
pub struct PatrolState {
    speed: f32,
    route: Vec<Vec3>,
    last_index: Option<usize>,
}

impl PatrolState {
    /// Creates a patrol over `route`.
    #[must_use]
    pub fn new(speed: f32, route: Vec<Vec3>) -> Self {
        Self {
            speed,
            route,
            last_index: None,
        }
    }

    /// Index of the waypoint currently targeted.
    #[must_use]
    pub const fn last_index(&self) -> Option<usize> {
        self.last_index
    }

    fn next_point(&mut self, ctx: &mut NpcContext<'_>) -> Vec3 {
        let len = self.route.len();
        if len == 0 {
            error!(entity = ?ctx.id, "Patrol route is empty");
            return ctx.nav.position();
        }
        let index = match self.last_index {
            Some(last) if len > 1 => {
                let pick = ctx.level.rng.pick_index(len - 1).unwrap_or(0);
                if pick >= last {
                    pick + 1
                } else {
                    pick
                }
            },
            _ => ctx.level.rng.pick_index(len).unwrap_or(0),
        };
        self.last_index = Some(index);
        self.route[index]
    }
}

impl NpcState for PatrolState {
    fn id(&self) -> StateId {
        StateId::Patrol
    }

    fn enter(&mut self, ctx: &mut NpcContext<'_>) {
        if ctx.nav.is_enabled() {
            set_moving(ctx, self.speed);
            let target = self.next_point(ctx);
            ctx.nav.set_destination(target);
        }
        ctx.cue(BehaviorCue::Walk);
    }

    fn update(&mut self, _dt: f32, ctx: &mut NpcContext<'_>, fsm: &mut Transitions) {
        if ctx.nav.is_enabled()
            && !ctx.nav.path_pending()
            && ctx.nav.remaining_distance() <= ctx.nav.stopping_distance()
        {
            let target = self.next_point(ctx);
            ctx.nav.set_destination(target);
        }
        if ctx.player_visible() {
            fsm.switch_to(StateId::Chase);
        }
    }
}

/// Walks to random navigable points nearby.
#[derive(Debug)]
pub struct WanderState {
    speed: f32,
    radius: f32,
    target_set: bool,
}

impl WanderState {
    /// Creates a wander state.
    #[must_use]
    pub const fn new(speed: f32, radius: f32) -> Self {
        Self {
            speed,
            radius,
            target_set: false,
        }
    }
}

impl NpcState for WanderState {
    fn id(&self) -> StateId {
        StateId::Wander
    }

    fn enter(&mut self, ctx: &mut NpcContext<'_>) {
        if ctx.nav.is_enabled() {
            set_moving(ctx, self.speed);
            self.target_set = false;
        }
        ctx.cue(BehaviorCue::Walk);
    }

    fn update(&mut self, _dt: f32, ctx: &mut NpcContext<'_>, fsm: &mut Transitions) {
        if ctx.nav.is_enabled()
            && (!self.target_set || ctx.nav.remaining_distance() < ctx.nav.stopping_distance())
        {
            let here = ctx.nav.position();
            let candidate = here + ctx.level.rng.inside_unit_sphere() * self.radius;
            if let Some(point) = ctx.level.spatial.sample_nav_point(candidate, self.radius) {
                ctx.nav.set_destination(point);
                self.target_set = true;
            }
        }
        if ctx.player_visible() {
            fsm.switch_to(StateId::Chase);
        }
    }
}

/// Runs at the player. Falls back to the previous state when sight is lost.
#[derive(Debug)]
pub struct ChaseState {
    speed: f32,
    fallback: Fallback,
}

impl ChaseState {
    /// Creates a chase state.
    #[must_use]
    pub fn new(speed: f32) -> Self {
        Self {
            speed,
            fallback: Fallback::default(),
        }
    }
}

impl NpcState for ChaseState {
    fn id(&self) -> StateId {
        StateId::Chase
    }

    fn enter(&mut self, ctx: &mut NpcContext<'_>) {
        if ctx.nav.is_enabled() {
            set_moving(ctx, self.speed);
        }
        ctx.cue(BehaviorCue::Run);
    }

    fn update(&mut self, _dt: f32, ctx: &mut NpcContext<'_>, fsm: &mut Transitions) {
        let fallback = self.fallback.refresh(StateId::Chase, fsm);
        if !ctx.player_visible() {
            fsm.switch_to_opt(fallback);
            return;
        }
        if !ctx.nav.is_enabled() {
            return;
        }
        if let Some(target) = ctx.player_position() {
            ctx.nav.set_destination(target);
        }
        if ctx.nav.has_path() && ctx.player_attackable() {
            fsm.switch_to(StateId::Attack);
        }
    }
}

/// Stands and fires at the player.
#[derive(Debug, Default)]
pub struct AttackState;

impl NpcState for AttackState {
    fn id(&self) -> StateId {
        StateId::Attack
    }

    fn enter(&mut self, ctx: &mut NpcContext<'_>) {
        halt(ctx);
        ctx.cue(BehaviorCue::Attack);
    }

    fn update(&mut self, dt: f32, ctx: &mut NpcContext<'_>, fsm: &mut Transitions) {
        ctx.face_player(dt);
        if let Some(FireOutcome::Fired { .. }) = ctx.fire_weapon() {
            ctx.cue(BehaviorCue::Attack);
        }
        if ctx.player_attackable() {
            return;
        }
        if ctx.player_visible() {
            fsm.switch_to(StateId::Chase);
        } else {
            fsm.switch_to(patrol_or_wander(ctx));
        }
    }
}

/// Flinches, then hands control back to the state that was interrupted.
#[derive(Debug)]
pub struct HitState {
    return_delay: f32,
    fallback: Fallback,
}

impl HitState {
    /// Creates a hit state returning after `return_delay` seconds.
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
        halt(ctx);
        ctx.cue(BehaviorCue::Damage);
    }

    fn update(&mut self, _dt: f32, ctx: &mut NpcContext<'_>, fsm: &mut Transitions) {
        let Some(back) = self.fallback.refresh(StateId::Hit, fsm) else {
            return;
        };
        if self.return_delay > 0.0 {
            ctx.defer_switch(StateId::Hit, back, self.return_delay);
        } else {
            fsm.switch_to(back);
        }
    }
}

/// Stops all movement and schedules the corpse for removal on exit.
#[derive(Debug)]
pub struct DeathState {
    corpse_delay: f32,
}

impl DeathState {
    /// Creates a death state.
    #[must_use]
    pub fn new(tuning: &SoldierTuning) -> Self {
        Self {
            corpse_delay: tuning.corpse_delay,
        }
    }
}

impl NpcState for DeathState {
    fn id(&self) -> StateId {
        StateId::Death
    }

    fn enter(&mut self, ctx: &mut NpcContext<'_>) {
        ctx.nav.set_stopped(true);
        ctx.nav.reset_path();
        ctx.nav.set_enabled(false);
        ctx.cue(BehaviorCue::Death);
    }

    fn update(&mut self, _dt: f32, _ctx: &mut NpcContext<'_>, fsm: &mut Transitions) {
        fsm.switch_to(StateId::Idle);
    }

    fn exit(&mut self, ctx: &mut NpcContext<'_>) {
        super::schedule_despawn(ctx, self.corpse_delay);
        debug!(entity = ?ctx.id, delay = self.corpse_delay, "Corpse scheduled for removal");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{params, AnimValue};
    use crate::config::WeaponTuning;
    use crate::context::Effect;
    use crate::fsm::StateMachine;
    use crate::mock::{ContextRig, MockSpatial};
    use crate::navigation::Navigation;
    use crate::random::ScriptedRandom;
    use crate::scheduler::ScheduledAction;
    use crate::spatial::BodyRegion;
    use crate::weapon::{Magazine, Weapon};
    use warden_common::EntityTag;

    fn machine(rig: &ContextRig, route: Vec<Vec3>) -> StateMachine {
        states(&AiConfig::default(), route)
            .into_iter()
            .fold(StateMachine::new(rig.id), StateMachine::with_state)
    }

    fn route() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(-10.0, 0.0, 0.0),
        ]
    }

    #[test]
    fn test_idle_low_draw_patrols() {
        let mut rig = ContextRig::soldier().with_rng(ScriptedRandom::new().with_ints([30]));
        let mut fsm = machine(&rig, route());
        fsm.switch_state(Some(StateId::Idle), &mut rig.ctx());
        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(fsm.current(), Some(StateId::Patrol));
    }

    #[test]
    fn test_idle_high_draw_wanders() {
        let mut rig = ContextRig::soldier().with_rng(ScriptedRandom::new().with_ints([70]));
        let mut fsm = machine(&rig, route());
        fsm.switch_state(Some(StateId::Idle), &mut rig.ctx());
        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(fsm.current(), Some(StateId::Wander));
    }

    #[test]
    fn test_idle_chases_visible_player() {
        let mut rig = ContextRig::soldier().with_player_at(Vec3::new(0.0, 0.0, 5.0));
        let mut fsm = machine(&rig, route());
        fsm.switch_state(Some(StateId::Idle), &mut rig.ctx());
        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(fsm.current(), Some(StateId::Chase));
        assert_eq!(rig.anim.parameter(params::SPEED), Some(AnimValue::Float(0.7)));
    }

    #[test]
    fn test_player_behind_is_not_seen() {
        let mut rig = ContextRig::soldier()
            .with_player_at(Vec3::new(0.0, 0.0, -5.0))
            .with_rng(ScriptedRandom::new().with_ints([70]));
        let mut fsm = machine(&rig, route());
        fsm.switch_state(Some(StateId::Idle), &mut rig.ctx());
        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(fsm.current(), Some(StateId::Wander));
    }

    #[test]
    fn test_patrol_never_repeats_waypoint() {
        let mut rig = ContextRig::soldier().with_rng(ScriptedRandom::new().with_ints([1, 1, 0]));
        let mut fsm = machine(&rig, route());
        let points = route();

        fsm.switch_state(Some(StateId::Patrol), &mut rig.ctx());
        assert_eq!(rig.nav.destination(), Some(points[1]));

        rig.nav.arrive();
        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(rig.nav.destination(), Some(points[2]));

        rig.nav.arrive();
        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(rig.nav.destination(), Some(points[0]));
    }

    #[test]
    fn test_patrol_with_empty_route_stays_put() {
        let mut rig = ContextRig::soldier();
        let mut fsm = machine(&rig, Vec::new());
        fsm.switch_state(Some(StateId::Patrol), &mut rig.ctx());
        assert_eq!(rig.nav.destination(), Some(Vec3::ZERO));
    }

    #[test]
    fn test_wander_picks_sampled_point() {
        let rng = ScriptedRandom::new().with_points([Vec3::new(0.5, 0.0, 0.0)]);
        let mut rig = ContextRig::soldier().with_rng(rng);
        let mut fsm = machine(&rig, route());
        fsm.switch_state(Some(StateId::Wander), &mut rig.ctx());
        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(rig.nav.destination(), Some(Vec3::new(3.5, 0.0, 0.0)));
    }

    #[test]
    fn test_wander_without_navmesh_keeps_trying() {
        let mut rig = ContextRig::soldier();
        rig.spatial = MockSpatial::new().without_navmesh();
        let mut fsm = machine(&rig, route());
        fsm.switch_state(Some(StateId::Wander), &mut rig.ctx());
        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(rig.nav.destination(), None);
        assert_eq!(fsm.current(), Some(StateId::Wander));
    }

    #[test]
    fn test_chase_returns_to_previous_when_sight_lost() {
        let mut rig = ContextRig::soldier().with_player_at(Vec3::new(0.0, 0.0, 8.0));
        let mut fsm = machine(&rig, route());
        fsm.switch_state(Some(StateId::Wander), &mut rig.ctx());
        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(fsm.current(), Some(StateId::Chase));

        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(fsm.current(), Some(StateId::Chase));

        rig.target = None;
        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(fsm.current(), Some(StateId::Wander));
    }

    #[test]
    fn test_chase_attacks_within_range() {
        let mut rig = ContextRig::soldier().with_player_at(Vec3::new(0.0, 0.0, 2.0));
        let mut fsm = machine(&rig, route());
        fsm.switch_state(Some(StateId::Chase), &mut rig.ctx());
        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(fsm.current(), Some(StateId::Attack));
    }

    #[test]
    fn test_attack_fires_and_queues_damage() {
        let mut rig = ContextRig::soldier().with_player_at(Vec3::new(0.0, 0.0, 2.0));
        rig.weapon = Some(
            Weapon::from_tuning(&WeaponTuning::default())
                .with_magazine(Some(Magazine::loaded(25, 1.0))),
        );
        rig.spatial = MockSpatial::new().with_ray_hit(
            ContextRig::PLAYER,
            EntityTag::Player,
            BodyRegion::Head,
            2.0,
        );
        let mut fsm = machine(&rig, route());
        fsm.switch_state(Some(StateId::Attack), &mut rig.ctx());
        fsm.update(0.1, &mut rig.ctx());

        assert_eq!(fsm.current(), Some(StateId::Attack));
        assert_eq!(rig.anim.trigger_count(params::ATTACK), 2);
        assert!(rig.effects.contains(&Effect::Damage {
            target: ContextRig::PLAYER,
            source: rig.id,
            amount: 100,
        }));
        assert!(rig
            .effects
            .iter()
            .any(|e| matches!(e, Effect::EjectCasing { .. })));

        rig.effects.clear();
        fsm.update(0.1, &mut rig.ctx());
        assert!(rig.effects.is_empty());
    }

    #[test]
    fn test_attack_chases_when_player_backs_off() {
        let mut rig = ContextRig::soldier().with_player_at(Vec3::new(0.0, 0.0, 8.0));
        let mut fsm = machine(&rig, route());
        fsm.switch_state(Some(StateId::Attack), &mut rig.ctx());
        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(fsm.current(), Some(StateId::Chase));
    }

    #[test]
    fn test_hit_returns_to_interrupted_state() {
        let mut rig = ContextRig::soldier();
        let mut fsm = machine(&rig, route());
        fsm.switch_state(Some(StateId::Patrol), &mut rig.ctx());
        fsm.switch_state(Some(StateId::Hit), &mut rig.ctx());
        fsm.switch_state(Some(StateId::Hit), &mut rig.ctx());
        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(fsm.current(), Some(StateId::Patrol));
    }

    #[test]
    fn test_delayed_hit_return_is_scheduled_once() {
        let mut rig = ContextRig::soldier();
        let mut fsm = StateMachine::new(rig.id)
            .with_state(Box::new(IdleState))
            .with_state(Box::new(HitState::new(0.5)));
        fsm.switch_state(Some(StateId::Idle), &mut rig.ctx());
        fsm.switch_state(Some(StateId::Hit), &mut rig.ctx());
        fsm.update(0.1, &mut rig.ctx());
        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(fsm.current(), Some(StateId::Hit));
        assert_eq!(rig.scheduler.pending_for(rig.id), 1);

        let due = rig.scheduler.advance(0.5);
        assert_eq!(due.len(), 1);
        assert_eq!(
            due[0].action,
            ScheduledAction::SwitchState {
                from: Some(StateId::Hit),
                to: StateId::Idle
            }
        );
    }

    #[test]
    fn test_death_settles_and_schedules_removal() {
        let mut rig = ContextRig::soldier();
        let mut fsm = machine(&rig, route());
        fsm.switch_state(Some(StateId::Idle), &mut rig.ctx());
        rig.health.die();
        fsm.switch_state(Some(StateId::Death), &mut rig.ctx());
        assert!(!rig.nav.is_enabled());
        assert_eq!(rig.anim.trigger_count(params::DEATH), 1);

        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(fsm.current(), Some(StateId::Idle));
        assert!(rig.scheduler.is_pending(rig.id, &ScheduledAction::Despawn));

        fsm.update(0.1, &mut rig.ctx());
        assert_eq!(fsm.current(), Some(StateId::Idle));
    }
}
