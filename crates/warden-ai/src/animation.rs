//! Animation playback sink and the soldier cue binding.
//!
//! Melee states cross-fade clips directly. Soldier states raise
//! [`BehaviorCue`]s instead; [`CueBinding`] turns each cue into animator
//! parameter writes.

use serde::{Deserialize, Serialize};

use crate::random::RandomSource;

/// Default cross-fade duration in seconds.
pub const CROSS_FADE: f32 = 0.1;

/// Number of distinct damage reactions in the soldier rig.
const DAMAGE_VARIANTS: i32 = 3;

/// Clip names used by the melee rig.
pub mod clips {
    /// Standing still
    pub const IDLE: &str = "Idle";
    /// Walking forward
    pub const WALK: &str = "Walk";
    /// Walking backward
    pub const WALK_BACKWARD: &str = "WalkBackward";
    /// Running
    pub const RUN: &str = "Run";
    /// Strafing counter-clockwise
    pub const STRAFE_LEFT: &str = "StrafeLeft";
    /// Strafing clockwise
    pub const STRAFE_RIGHT: &str = "StrafeRight";
    /// Sword strike
    pub const SWORD_SLASH: &str = "SwordSlash";
    /// Hit reaction
    pub const HIT_IMPACT: &str = "HitImpact";
    /// Death
    pub const DEATH: &str = "Death";
}

/// Animator parameters used by the soldier rig.
pub mod params {
    /// Locomotion blend (float)
    pub const SPEED: &str = "Speed";
    /// Weapon raised (bool)
    pub const AIMING: &str = "Aiming";
    /// Crouched (bool)
    pub const SQUAT: &str = "Squat";
    /// Damage reaction variant (int)
    pub const DAMAGE_ID: &str = "DamageID";
    /// Fire (trigger)
    pub const ATTACK: &str = "Attack";
    /// Die (trigger)
    pub const DEATH: &str = "Death";
    /// Flinch (trigger)
    pub const DAMAGE: &str = "Damage";
}

/// Value written to an animator parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AnimValue {
    /// Float parameter
    Float(f32),
    /// Bool parameter
    Bool(bool),
    /// Integer parameter
    Int(i32),
    /// Trigger parameter
    Trigger,
}

/// Animation playback sink attached to one entity.
pub trait Animation {
    /// Blends to `clip` over `blend` seconds.
    fn cross_fade(&mut self, clip: &str, blend: f32);

    /// Writes an animator parameter.
    fn set_parameter(&mut self, name: &str, value: AnimValue);

    /// Returns true if `clip` is the clip currently playing.
    fn is_playing(&self, clip: &str) -> bool;

    /// Normalized time of the current clip (1.0 = one full play).
    fn normalized_time(&self) -> f32;
}

/// Sink used when an entity has no animator. Every call is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnimation;

impl Animation for NoAnimation {
    fn cross_fade(&mut self, _clip: &str, _blend: f32) {}

    fn set_parameter(&mut self, _name: &str, _value: AnimValue) {}

    fn is_playing(&self, _clip: &str) -> bool {
        false
    }

    fn normalized_time(&self) -> f32 {
        0.0
    }
}

/// Behavior change raised by a soldier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BehaviorCue {
    /// Standing guard
    Idle,
    /// Patrolling or wandering
    Walk,
    /// Chasing
    Run,
    /// Running for cover
    CrouchingRun,
    /// Crouched behind cover
    Squat,
    /// Firing
    Attack,
    /// Flinching from a hit
    Damage,
    /// Dying
    Death,
}

/// Translates soldier cues into animator parameter writes.
#[derive(Debug, Clone, Default)]
pub struct CueBinding {
    last_damage: Option<i32>,
}

impl CueBinding {
    /// Creates a binding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last damage reaction variant played.
    #[must_use]
    pub const fn last_damage(&self) -> Option<i32> {
        self.last_damage
    }

    /// Applies `cue` to `anim`.
    pub fn apply(&mut self, cue: BehaviorCue, anim: &mut dyn Animation, rng: &mut dyn RandomSource) {
        match cue {
            BehaviorCue::Idle => {
                anim.set_parameter(params::AIMING, AnimValue::Bool(false));
                anim.set_parameter(params::SPEED, AnimValue::Float(0.0));
            },
            BehaviorCue::Walk => Self::locomotion(anim, 0.5),
            BehaviorCue::Run => Self::locomotion(anim, 0.7),
            BehaviorCue::CrouchingRun => {
                anim.set_parameter(params::SQUAT, AnimValue::Bool(true));
                anim.set_parameter(params::SPEED, AnimValue::Float(0.7));
            },
            BehaviorCue::Squat => {
                anim.set_parameter(params::SQUAT, AnimValue::Bool(true));
                anim.set_parameter(params::AIMING, AnimValue::Bool(false));
                anim.set_parameter(params::SPEED, AnimValue::Float(0.0));
            },
            BehaviorCue::Attack => {
                anim.set_parameter(params::SQUAT, AnimValue::Bool(false));
                anim.set_parameter(params::SPEED, AnimValue::Float(0.0));
                anim.set_parameter(params::AIMING, AnimValue::Bool(true));
                anim.set_parameter(params::ATTACK, AnimValue::Trigger);
            },
            BehaviorCue::Damage => {
                if anim.is_playing(clips::DEATH) {
                    return;
                }
                let variant = self.next_damage_variant(rng);
                anim.set_parameter(params::DAMAGE_ID, AnimValue::Int(variant));
                anim.set_parameter(params::DAMAGE, AnimValue::Trigger);
            },
            BehaviorCue::Death => {
                anim.set_parameter(params::SPEED, AnimValue::Float(0.0));
                anim.set_parameter(params::DEATH, AnimValue::Trigger);
            },
        }
    }

    fn locomotion(anim: &mut dyn Animation, speed: f32) {
        anim.set_parameter(params::AIMING, AnimValue::Bool(false));
        anim.set_parameter(params::SQUAT, AnimValue::Bool(false));
        anim.set_parameter(params::SPEED, AnimValue::Float(speed));
    }

    /// Picks a damage variant different from the previous one.
    fn next_damage_variant(&mut self, rng: &mut dyn RandomSource) -> i32 {
        let variant = match self.last_damage {
            Some(last) => {
                let v = rng.range_i32(0, DAMAGE_VARIANTS - 1);
                if v >= last {
                    v + 1
                } else {
                    v
                }
            },
            None => rng.range_i32(0, DAMAGE_VARIANTS),
        };
        self.last_damage = Some(variant);
        variant
    }
}
