//! Deferred actions on a logical clock.
//!
//! Timed behavior ("wait a second, then switch state", "remove the corpse
//! after a few seconds") is queued here as data. Every task has an owning
//! entity; tearing the entity down cancels everything it still has pending.

use serde::{Deserialize, Serialize};
use tracing::trace;

use warden_common::{EntityId, PooledHandle};

use crate::fsm::StateId;

/// Identifier of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(u64);

/// Work to perform when a task comes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledAction {
    /// Switch the owner's state machine.
    SwitchState {
        /// State that requested the switch. The task is stale if this state
        /// is no longer current when it comes due.
        from: Option<StateId>,
        /// Target state
        to: StateId,
    },
    /// Remove the owner from the level.
    Despawn,
    /// Hand a pooled object back to its pool.
    ReturnToPool(PooledHandle),
}

/// A task that came due.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DueTask {
    /// Task id
    pub id: TaskId,
    /// Owning entity
    pub owner: EntityId,
    /// Action to perform
    pub action: ScheduledAction,
}

#[derive(Debug, Clone)]
struct Task {
    id: TaskId,
    owner: EntityId,
    due: f64,
    action: ScheduledAction,
}

/// Scheduler of deferred actions, ordered by due time then by insertion.
#[derive(Debug, Default)]
pub struct Scheduler {
    now: f64,
    next_id: u64,
    tasks: Vec<Task>,
}

impl Scheduler {
    /// Creates an empty scheduler at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current logical time in seconds.
    #[must_use]
    pub const fn now(&self) -> f64 {
        self.now
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Schedules `action` for `owner` after `delay` seconds.
    pub fn schedule(&mut self, owner: EntityId, delay: f32, action: ScheduledAction) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        let due = self.now + f64::from(delay.max(0.0));
        let index = self.tasks.partition_point(|t| t.due <= due);
        self.tasks.insert(
            index,
            Task {
                id,
                owner,
                due,
                action,
            },
        );
        trace!(?owner, ?action, due, "Scheduled task");
        id
    }

    /// Schedules `action` unless an identical action is already pending for `owner`.
    pub fn schedule_once(
        &mut self,
        owner: EntityId,
        delay: f32,
        action: ScheduledAction,
    ) -> Option<TaskId> {
        if self.is_pending(owner, &action) {
            return None;
        }
        Some(self.schedule(owner, delay, action))
    }

    /// Returns true if `owner` has `action` pending.
    #[must_use]
    pub fn is_pending(&self, owner: EntityId, action: &ScheduledAction) -> bool {
        self.tasks
            .iter()
            .any(|t| t.owner == owner && t.action == *action)
    }

    /// Number of tasks pending for `owner`.
    #[must_use]
    pub fn pending_for(&self, owner: EntityId) -> usize {
        self.tasks.iter().filter(|t| t.owner == owner).count()
    }

    /// Cancels a single task. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    /// Cancels every task owned by `owner`. Returns how many were dropped.
    pub fn cancel_owner(&mut self, owner: EntityId) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.owner != owner);
        before - self.tasks.len()
    }

    /// Advances the clock and returns the tasks that came due, oldest first.
    pub fn advance(&mut self, dt: f32) -> Vec<DueTask> {
        self.now += f64::from(dt.max(0.0));
        let now = self.now;
        let split = self.tasks.partition_point(|t| t.due <= now);
        self.tasks
            .drain(..split)
            .map(|t| DueTask {
                id: t.id,
                owner: t.owner,
                action: t.action,
            })
            .collect()
    }

    /// Removes every task and resets the clock.
    pub fn clear(&mut self) {
        self.tasks.clear();
        self.now = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switch(to: StateId) -> ScheduledAction {
        ScheduledAction::SwitchState {
            from: Some(StateId::Chase),
            to,
        }
    }

    #[test]
    fn test_tasks_fire_after_delay() {
        let mut scheduler = Scheduler::new();
        let owner = EntityId::from_raw(1);
        scheduler.schedule(owner, 1.0, switch(StateId::Circling));

        assert!(scheduler.advance(0.5).is_empty());
        let due = scheduler.advance(0.5);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].owner, owner);
        assert_eq!(due[0].action, switch(StateId::Circling));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_due_order_is_time_then_insertion() {
        let mut scheduler = Scheduler::new();
        let a = EntityId::from_raw(1);
        let b = EntityId::from_raw(2);
        scheduler.schedule(a, 2.0, ScheduledAction::Despawn);
        scheduler.schedule(b, 1.0, ScheduledAction::Despawn);
        scheduler.schedule(a, 1.0, switch(StateId::Attack));

        let due = scheduler.advance(3.0);
        let owners: Vec<_> = due.iter().map(|t| t.owner).collect();
        assert_eq!(owners, vec![b, a, a]);
        assert_eq!(due[2].action, ScheduledAction::Despawn);
    }

    #[test]
    fn test_cancel_owner_drops_pending() {
        let mut scheduler = Scheduler::new();
        let doomed = EntityId::from_raw(1);
        let other = EntityId::from_raw(2);
        scheduler.schedule(doomed, 1.0, switch(StateId::Retreat));
        scheduler.schedule(doomed, 3.0, ScheduledAction::Despawn);
        scheduler.schedule(other, 1.0, switch(StateId::Retreat));

        assert_eq!(scheduler.cancel_owner(doomed), 2);
        assert_eq!(scheduler.pending_for(doomed), 0);

        let due = scheduler.advance(5.0);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].owner, other);
    }

    #[test]
    fn test_schedule_once_coalesces() {
        let mut scheduler = Scheduler::new();
        let owner = EntityId::from_raw(4);
        assert!(scheduler
            .schedule_once(owner, 1.0, switch(StateId::Attack))
            .is_some());
        assert!(scheduler
            .schedule_once(owner, 1.0, switch(StateId::Attack))
            .is_none());
        assert!(scheduler
            .schedule_once(owner, 1.0, switch(StateId::Chase))
            .is_some());
        assert_eq!(scheduler.len(), 2);
    }

    #[test]
    fn test_cancel_single_task() {
        let mut scheduler = Scheduler::new();
        let owner = EntityId::from_raw(5);
        let id = scheduler.schedule(owner, 1.0, ScheduledAction::Despawn);
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert!(scheduler.advance(2.0).is_empty());
    }

    #[test]
    fn test_clock_advances() {
        let mut scheduler = Scheduler::new();
        scheduler.advance(0.25);
        scheduler.advance(0.25);
        assert!((scheduler.now() - 0.5).abs() < 1e-9);
        scheduler.advance(-1.0);
        assert!((scheduler.now() - 0.5).abs() < 1e-9);
    }
}
