//! Behavior states for each NPC archetype.

pub mod melee;
mod shared;
pub mod soldier;

pub use shared::CoverState;

use crate::context::NpcContext;
use crate::scheduler::ScheduledAction;

/// Queues removal of the owner's corpse after `delay` seconds.
pub(crate) fn schedule_despawn(ctx: &mut NpcContext<'_>, delay: f32) {
    ctx.level
        .scheduler
        .schedule_once(ctx.id, delay, ScheduledAction::Despawn);
}
