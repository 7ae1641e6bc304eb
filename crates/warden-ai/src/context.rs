//! Per-tick context lent to NPC states.
//!
//! [`NpcContext`] bundles the owning NPC's blackboard and collaborators with
//! the level services (coordinator, scheduler, random source, event bus).
//! States never reach the level any other way. Cross-entity consequences
//! such as damage to another actor are queued as [`Effect`]s and applied by
//! the level after the update pass.

use glam::Vec3;
use tracing::{debug, trace};

use warden_common::{EntityId, Pose};

use crate::animation::{Animation, BehaviorCue, CueBinding, CROSS_FADE};
use crate::coordinator::NpcCoordinator;
use crate::events::{AiEvent, EventBus};
use crate::fsm::StateId;
use crate::health::Health;
use crate::navigation::Navigation;
use crate::npc::NpcKind;
use crate::perception::{turn_towards, Perception};
use crate::random::RandomSource;
use crate::registry::TagRegistry;
use crate::scheduler::{ScheduledAction, Scheduler};
use crate::spatial::SpatialQuery;
use crate::weapon::{FireOutcome, MeleeBlade, Weapon};

/// Data shared by every state of one NPC.
#[derive(Debug, Clone)]
pub struct Blackboard {
    /// Current pose. Position mirrors the navigation agent.
    pub pose: Pose,
    /// Sight and reach
    pub perception: Perception,
    /// Facing interpolation rate (fraction per second)
    pub turn_rate: f32,
    /// Height of the eyes and muzzle above the feet
    pub eye_height: f32,
    /// Melee blade collider, if the NPC wields one
    pub blade: Option<MeleeBlade>,
    /// Cue-to-animator binding
    pub cue_binding: CueBinding,
    /// Set while the NPC is registered in range of the player
    pub has_spotted_player: bool,
}

impl Blackboard {
    /// Creates a blackboard.
    #[must_use]
    pub fn new(pose: Pose, perception: Perception, turn_rate: f32) -> Self {
        Self {
            pose,
            perception,
            turn_rate,
            eye_height: 1.5,
            blade: None,
            cue_binding: CueBinding::new(),
            has_spotted_player: false,
        }
    }

    /// Sets the eye height.
    #[must_use]
    pub fn with_eye_height(mut self, eye_height: f32) -> Self {
        self.eye_height = eye_height;
        self
    }

    /// Equips a blade.
    #[must_use]
    pub fn with_blade(mut self, blade: MeleeBlade) -> Self {
        self.blade = Some(blade);
        self
    }
}

/// Snapshot of the player as seen this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetView {
    /// Player entity
    pub id: EntityId,
    /// Player position
    pub position: Vec3,
    /// Whether the player is dead
    pub dead: bool,
}

/// Cross-entity consequence queued by a state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    /// Apply damage to another entity
    Damage {
        /// Entity to damage
        target: EntityId,
        /// Entity dealing the damage
        source: EntityId,
        /// Damage amount
        amount: i32,
    },
    /// Alert nearby NPCs that the player was spotted
    AlertNearby {
        /// NPC that spotted the player
        source: EntityId,
        /// Where it stood
        position: Vec3,
    },
    /// Eject a spent casing
    EjectCasing {
        /// Shooter
        source: EntityId,
        /// Ejection point
        position: Vec3,
        /// Shooter facing
        forward: Vec3,
    },
}

/// Level services borrowed for one NPC update.
pub struct LevelContext<'a> {
    /// Simulation time in seconds
    pub now: f64,
    /// The player, if one is in the level
    pub target: Option<TargetView>,
    /// Physics and navmesh queries
    pub spatial: &'a dyn SpatialQuery,
    /// Tagged entity lookup
    pub registry: &'a TagRegistry,
    /// Attack turn and alert arbitration
    pub coordinator: &'a mut NpcCoordinator,
    /// Deferred actions
    pub scheduler: &'a mut Scheduler,
    /// Random draws
    pub rng: &'a mut (dyn RandomSource + 'static),
    /// Event bus
    pub events: &'a EventBus,
    /// Effects to apply after the update pass
    pub effects: &'a mut Vec<Effect>,
}

/// Everything a state may touch during one hook.
pub struct NpcContext<'a> {
    /// Owning NPC
    pub id: EntityId,
    /// Owning NPC archetype
    pub kind: NpcKind,
    /// Shared blackboard
    pub body: &'a mut Blackboard,
    /// Navigation agent
    pub nav: &'a mut (dyn Navigation + 'static),
    /// Animation sink
    pub anim: &'a mut (dyn Animation + 'static),
    /// Owner's health
    pub health: &'a Health,
    /// Firearm, if the NPC carries one
    pub weapon: Option<&'a mut Weapon>,
    /// Level services
    pub level: LevelContext<'a>,
}

impl NpcContext<'_> {
    /// Current pose, with the position read from the navigation agent.
    #[must_use]
    pub fn pose(&self) -> Pose {
        Pose {
            position: self.nav.position(),
            forward: self.body.pose.forward,
        }
    }

    /// Player position, if there is a player.
    #[must_use]
    pub fn player_position(&self) -> Option<Vec3> {
        self.level.target.map(|t| t.position)
    }

    /// Distance to the player, or infinity without one.
    #[must_use]
    pub fn distance_to_player(&self) -> f32 {
        self.player_position()
            .map_or(f32::INFINITY, |p| self.nav.position().distance(p))
    }

    /// Returns true if a living player is inside the sight cone.
    #[must_use]
    pub fn player_visible(&self) -> bool {
        self.level
            .target
            .is_some_and(|t| !t.dead && self.body.perception.is_visible(&self.pose(), t.position))
    }

    /// Returns true if a living player is within attack distance.
    #[must_use]
    pub fn player_attackable(&self) -> bool {
        self.level.target.is_some_and(|t| {
            !t.dead && self.body.perception.is_attackable(&self.pose(), t.position)
        })
    }

    /// Returns true if the player is dead or absent.
    #[must_use]
    pub fn player_dead(&self) -> bool {
        self.level.target.map_or(true, |t| t.dead)
    }

    /// Returns true if the owning NPC is dead.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.health.is_dead()
    }

    /// Radius of the player detection trigger, or infinity without one.
    #[must_use]
    pub fn detection_radius(&self) -> f32 {
        self.level
            .registry
            .detection_radius()
            .unwrap_or(f32::INFINITY)
    }

    /// Turns gradually towards the player.
    pub fn face_player(&mut self, dt: f32) {
        let Some(target) = self.player_position() else {
            return;
        };
        if let Some(dir) = self.pose().planar_direction_to(target) {
            let t = self.body.turn_rate * dt;
            self.body.pose.forward = turn_towards(self.body.pose.forward, dir, t);
        }
    }

    /// Faces the player immediately.
    pub fn snap_to_player(&mut self) {
        let Some(target) = self.player_position() else {
            return;
        };
        if let Some(dir) = self.pose().planar_direction_to(target) {
            self.body.pose.forward = dir;
        }
    }

    /// Moves the agent directly, bypassing path planning.
    pub fn step(&mut self, offset: Vec3) {
        self.nav.move_by(offset);
        self.body.pose.position = self.nav.position();
    }

    /// Raises a behavior cue on the animator binding and the event bus.
    pub fn cue(&mut self, cue: BehaviorCue) {
        self.body
            .cue_binding
            .apply(cue, &mut *self.anim, &mut *self.level.rng);
        self.level.events.publish(AiEvent::Cue {
            entity_id: self.id,
            cue,
        });
    }

    /// Cross-fades to `clip` with the standard blend time.
    pub fn cross_fade(&mut self, clip: &str) {
        self.anim.cross_fade(clip, CROSS_FADE);
    }

    /// 50/50 draw from the level random source.
    pub fn coin_flip(&mut self) -> bool {
        self.level.rng.coin_flip()
    }

    /// Random navigable point within `radius` of the agent.
    /// Falls back to the current position when no point can be sampled.
    pub fn random_nav_point(&mut self, radius: f32) -> Vec3 {
        let here = self.nav.position();
        let candidate = here + self.level.rng.inside_unit_sphere() * radius;
        self.level
            .spatial
            .sample_nav_point(candidate, radius)
            .unwrap_or(here)
    }

    /// Schedules a switch from `from` to `to` after `delay` seconds.
    /// The switch is dropped if `from` is no longer current by then.
    pub fn defer_switch(&mut self, from: StateId, to: StateId, delay: f32) {
        let action = ScheduledAction::SwitchState {
            from: Some(from),
            to,
        };
        if self
            .level
            .scheduler
            .schedule_once(self.id, delay, action)
            .is_some()
        {
            trace!(entity = ?self.id, ?from, ?to, delay, "Deferred switch");
        }
    }

    /// Enables the blade collider, if any.
    pub fn arm_blade(&mut self) {
        if let Some(blade) = self.body.blade.as_mut() {
            blade.arm();
        }
    }

    /// Disables the blade collider, if any.
    pub fn disarm_blade(&mut self) {
        if let Some(blade) = self.body.blade.as_mut() {
            blade.disarm();
        }
    }

    /// Pulls the trigger of the carried firearm.
    ///
    /// A fired round is resolved against the spatial query straight away;
    /// damage and the ejected casing are queued as effects.
    pub fn fire_weapon(&mut self) -> Option<FireOutcome> {
        let pose = self.pose();
        let id = self.id;
        let weapon = self.weapon.as_deref_mut()?;
        let outcome = weapon.try_fire(self.level.now);
        match outcome {
            FireOutcome::Fired { ammo_left } => {
                self.level.events.publish(AiEvent::WeaponFired {
                    entity_id: id,
                    ammo_left,
                });
                let muzzle = pose.position + Vec3::Y * self.body.eye_height;
                if let Some(hit) = weapon
                    .resolver()
                    .resolve(self.level.spatial, id, muzzle, pose.forward)
                {
                    debug!(entity = ?id, target = ?hit.target, region = ?hit.region, "Shot hit");
                    self.level.effects.push(Effect::Damage {
                        target: hit.target,
                        source: id,
                        amount: hit.damage,
                    });
                }
                self.level.effects.push(Effect::EjectCasing {
                    source: id,
                    position: muzzle,
                    forward: pose.forward,
                });
            },
            FireOutcome::DryFire => {
                self.level
                    .events
                    .publish(AiEvent::DryFired { entity_id: id });
            },
            FireOutcome::ReloadStarted => {
                debug!(entity = ?id, "Reloading");
            },
            FireOutcome::CoolingDown | FireOutcome::Reloading | FireOutcome::NoMagazine => {},
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use crate::animation::{params, AnimValue, BehaviorCue};
    use crate::events::AiEvent;
    use crate::fsm::StateId;
    use crate::mock::ContextRig;
    use crate::scheduler::ScheduledAction;
    use crate::weapon::FireOutcome;
    use glam::Vec3;

    #[test]
    fn test_player_queries_without_player() {
        let mut rig = ContextRig::soldier();
        let ctx = rig.ctx();
        assert_eq!(ctx.distance_to_player(), f32::INFINITY);
        assert!(!ctx.player_visible());
        assert!(!ctx.player_attackable());
        assert!(ctx.player_dead());
        assert_eq!(ctx.detection_radius(), f32::INFINITY);
    }

    #[test]
    fn test_dead_player_is_neither_visible_nor_attackable() {
        let mut rig = ContextRig::soldier().with_player_at(Vec3::new(0.0, 0.0, 1.0));
        assert!(rig.ctx().player_attackable());
        if let Some(target) = rig.target.as_mut() {
            target.dead = true;
        }
        let ctx = rig.ctx();
        assert!(!ctx.player_visible());
        assert!(!ctx.player_attackable());
        assert!(ctx.player_dead());
    }

    #[test]
    fn test_snap_and_face_player() {
        let mut rig = ContextRig::soldier().with_player_at(Vec3::new(4.0, 0.0, 0.0));
        let mut ctx = rig.ctx();
        ctx.face_player(0.1);
        let turned = ctx.body.pose.forward;
        assert!(turned.x > 0.0 && turned.z > 0.0);
        ctx.snap_to_player();
        assert!((ctx.body.pose.forward - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_cue_drives_binding_and_bus() {
        let mut rig = ContextRig::soldier();
        rig.ctx().cue(BehaviorCue::Walk);
        assert_eq!(rig.anim.parameter(params::SPEED), Some(AnimValue::Float(0.5)));
        assert_eq!(
            rig.events.drain(),
            [AiEvent::Cue {
                entity_id: rig.id,
                cue: BehaviorCue::Walk
            }]
        );
    }

    #[test]
    fn test_defer_switch_coalesces() {
        let mut rig = ContextRig::melee();
        rig.ctx().defer_switch(StateId::Chase, StateId::Circling, 1.0);
        rig.ctx().defer_switch(StateId::Chase, StateId::Circling, 1.0);
        assert_eq!(rig.scheduler.pending_for(rig.id), 1);
        assert!(rig.scheduler.is_pending(
            rig.id,
            &ScheduledAction::SwitchState {
                from: Some(StateId::Chase),
                to: StateId::Circling
            }
        ));
    }

    #[test]
    fn test_empty_magazine_reloads_then_fires() {
        let mut rig = ContextRig::soldier();
        assert_eq!(rig.ctx().fire_weapon(), Some(FireOutcome::ReloadStarted));
        assert_eq!(rig.ctx().fire_weapon(), Some(FireOutcome::Reloading));
        assert!(rig.weapon.as_mut().is_some_and(|w| w.tick(1.0)));
        assert_eq!(
            rig.ctx().fire_weapon(),
            Some(FireOutcome::Fired { ammo_left: 24 })
        );
        assert_eq!(rig.effects.len(), 1);
    }

    #[test]
    fn test_melee_has_no_firearm() {
        let mut rig = ContextRig::melee();
        assert_eq!(rig.ctx().fire_weapon(), None);
        rig.ctx().arm_blade();
        assert!(rig.body.blade.as_ref().is_some_and(|b| b.is_armed()));
        rig.ctx().disarm_blade();
        assert!(!rig.body.blade.as_ref().is_some_and(|b| b.is_armed()));
    }
}
