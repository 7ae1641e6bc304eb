//! States shared by soldiers and melee NPCs.

use glam::Vec3;
use tracing::debug;

use crate::animation::{clips, BehaviorCue};
use crate::context::NpcContext;
use crate::fsm::{NpcState, StateId, Transitions};
use crate::npc::NpcKind;
use crate::perception::{CoverFinder, CoverPick};

/// Keeps the last "real" state seen before `this`.
///
/// Used by states that hand control back to whatever preceded them. The
/// cached value survives re-entries of `this` so a burst of repeated
/// entries still returns to the original state.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Fallback {
    cached: Option<StateId>,
}

impl Fallback {
    pub(crate) fn refresh(&mut self, this: StateId, fsm: &Transitions) -> Option<StateId> {
        if let Some(previous) = fsm.previous().filter(|p| *p != this) {
            self.cached = Some(previous);
        }
        self.cached
    }
}

/// Sets the agent in motion at `speed`.
pub(crate) fn set_moving(ctx: &mut NpcContext<'_>, speed: f32) {
    ctx.nav.set_speed(speed);
    ctx.nav.set_stopped(false);
}

/// Brings the agent to a halt.
pub(crate) fn halt(ctx: &mut NpcContext<'_>) {
    ctx.nav.set_speed(0.0);
    ctx.nav.set_stopped(true);
}

/// Runs to a hiding point behind an obstacle and waits there until health
/// recovers above the threshold.
#[derive(Debug)]
pub struct CoverState {
    kind: NpcKind,
    speed: f32,
    threshold: f32,
    finder: CoverFinder,
    settled: bool,
}

impl CoverState {
    /// Creates a cover state.
    #[must_use]
    pub fn new(kind: NpcKind, speed: f32, offset: f32, threshold: f32) -> Self {
        Self {
            kind,
            speed,
            threshold,
            finder: CoverFinder::new(offset),
            settled: false,
        }
    }

    /// Cover spot used last.
    #[must_use]
    pub fn finder(&self) -> &CoverFinder {
        &self.finder
    }

    fn arrived(&self, ctx: &NpcContext<'_>) -> bool {
        let reached = ctx.nav.remaining_distance() <= ctx.nav.stopping_distance();
        match self.kind {
            NpcKind::Soldier => reached,
            NpcKind::Melee => reached || !ctx.nav.has_path(),
        }
    }
}

impl NpcState for CoverState {
    fn id(&self) -> StateId {
        StateId::Cover
    }

    fn enter(&mut self, ctx: &mut NpcContext<'_>) {
        self.settled = false;
        if ctx.nav.is_enabled() {
            set_moving(ctx, self.speed);
            let pick = if ctx.coin_flip() {
                CoverPick::Closest
            } else {
                CoverPick::Farthest
            };
            let here = ctx.nav.position();
            let threat = ctx.player_position().unwrap_or(here);
            let target = self.finder.hiding_point(
                ctx.level.registry.cover_spots(),
                threat,
                here,
                pick,
                ctx.level.spatial,
            );
            ctx.nav.reset_path();
            ctx.nav.set_destination(target);
            debug!(entity = ?ctx.id, ?pick, ?target, "Seeking cover");
        }
        match self.kind {
            NpcKind::Soldier => ctx.cue(BehaviorCue::CrouchingRun),
            NpcKind::Melee => {
                ctx.disarm_blade();
                ctx.cross_fade(clips::RUN);
            },
        }
    }

    fn update(&mut self, _dt: f32, ctx: &mut NpcContext<'_>, fsm: &mut Transitions) {
        if ctx.nav.is_enabled() && self.arrived(ctx) {
            ctx.nav.set_stopped(true);
            if !self.settled {
                self.settled = true;
                match self.kind {
                    NpcKind::Soldier => ctx.cue(BehaviorCue::Squat),
                    NpcKind::Melee => ctx.cross_fade(clips::IDLE),
                }
            }
        }

        if ctx.health.fraction() < self.threshold {
            return;
        }
        if ctx.player_visible() {
            fsm.switch_to(StateId::Chase);
            return;
        }
        match self.kind {
            NpcKind::Soldier => {
                let next = if ctx.coin_flip() {
                    StateId::Patrol
                } else {
                    StateId::Wander
                };
                fsm.switch_to(next);
            },
            NpcKind::Melee => fsm.switch_to(StateId::Wander),
        }
    }
}

/// Unit direction from `from` to `to` on the XZ plane.
pub(crate) fn planar_dir(from: Vec3, to: Vec3) -> Option<Vec3> {
    Vec3::new(to.x - from.x, 0.0, to.z - from.z).try_normalize()
}
