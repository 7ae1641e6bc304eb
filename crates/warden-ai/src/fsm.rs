//! Per-NPC finite state machine.
//!
//! Every NPC owns a fixed set of states, built once at spawn and keyed by
//! [`StateId`]. At most one of them is current. States request transitions
//! through a [`Transitions`] handle during `update`; the machine applies
//! the requests in order once the hook returns.
//!
//! A switch runs `exit` on the outgoing state, records it as previous, makes
//! the new state current and runs its `enter`. Re-entering the state that is
//! already current is allowed, but it does not overwrite the previous state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

use warden_common::EntityId;

use crate::context::NpcContext;
use crate::events::AiEvent;

/// Identifier of a behavior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StateId {
    /// Standing still
    Idle,
    /// Walking a waypoint route
    Patrol,
    /// Walking to random points
    Wander,
    /// Pursuing the player
    Chase,
    /// Attacking the player
    Attack,
    /// Running to and holding a hiding spot
    Cover,
    /// Backing away after a strike
    Retreat,
    /// Orbiting the player while waiting for the attack turn
    Circling,
    /// Flinching from damage
    Hit,
    /// Dying
    Death,
}

impl StateId {
    /// Returns all state ids.
    #[must_use]
    pub const fn all() -> [Self; 10] {
        [
            Self::Idle,
            Self::Patrol,
            Self::Wander,
            Self::Chase,
            Self::Attack,
            Self::Cover,
            Self::Retreat,
            Self::Circling,
            Self::Hit,
            Self::Death,
        ]
    }

    /// Returns the display name for this state.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Patrol => "Patrol",
            Self::Wander => "Wander",
            Self::Chase => "Chase",
            Self::Attack => "Attack",
            Self::Cover => "Cover",
            Self::Retreat => "Retreat",
            Self::Circling => "Circling",
            Self::Hit => "Hit",
            Self::Death => "Death",
        }
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Out-of-band notification delivered to the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateSignal {
    /// The NPC bumped into an obstacle
    ObstacleContact,
}

/// A behavior state with enter/update/exit hooks.
pub trait NpcState: fmt::Debug {
    /// Identifier of this state.
    fn id(&self) -> StateId;

    /// Called when the state becomes current.
    fn enter(&mut self, ctx: &mut NpcContext<'_>);

    /// Called once per tick while the state is current.
    fn update(&mut self, dt: f32, ctx: &mut NpcContext<'_>, fsm: &mut Transitions);

    /// Called when the state stops being current.
    fn exit(&mut self, _ctx: &mut NpcContext<'_>) {}

    /// Handles an out-of-band signal.
    fn on_signal(&mut self, _signal: StateSignal, _ctx: &mut NpcContext<'_>) {}
}

/// Transition requests collected during an update hook.
#[derive(Debug, Clone, Default)]
pub struct Transitions {
    current: Option<StateId>,
    previous: Option<StateId>,
    requests: Vec<StateId>,
}

impl Transitions {
    fn new(current: Option<StateId>, previous: Option<StateId>) -> Self {
        Self {
            current,
            previous,
            requests: Vec::new(),
        }
    }

    /// State that was current before the running one.
    #[must_use]
    pub const fn previous(&self) -> Option<StateId> {
        self.previous
    }

    /// Running state.
    #[must_use]
    pub const fn current(&self) -> Option<StateId> {
        self.current
    }

    /// Requests a switch to `next`.
    pub fn switch_to(&mut self, next: StateId) {
        self.requests.push(next);
    }

    /// Requests a switch to `next` if there is one.
    pub fn switch_to_opt(&mut self, next: Option<StateId>) {
        match next {
            Some(next) => self.switch_to(next),
            None => debug!("Switch to missing state skipped"),
        }
    }

    /// Queued requests, in order.
    #[must_use]
    pub fn requests(&self) -> &[StateId] {
        &self.requests
    }
}

/// State machine of one NPC.
#[derive(Debug)]
pub struct StateMachine {
    owner: EntityId,
    states: BTreeMap<StateId, Box<dyn NpcState>>,
    current: Option<StateId>,
    previous: Option<StateId>,
}

impl StateMachine {
    /// Creates a machine with no states.
    #[must_use]
    pub fn new(owner: EntityId) -> Self {
        Self {
            owner,
            states: BTreeMap::new(),
            current: None,
            previous: None,
        }
    }

    /// Adds a state, replacing any state with the same id.
    pub fn insert(&mut self, state: Box<dyn NpcState>) {
        self.states.insert(state.id(), state);
    }

    /// Builder form of [`Self::insert`].
    #[must_use]
    pub fn with_state(mut self, state: Box<dyn NpcState>) -> Self {
        self.insert(state);
        self
    }

    /// Owning entity.
    #[must_use]
    pub const fn owner(&self) -> EntityId {
        self.owner
    }

    /// Current state.
    #[must_use]
    pub const fn current(&self) -> Option<StateId> {
        self.current
    }

    /// State that preceded the current one.
    #[must_use]
    pub const fn previous(&self) -> Option<StateId> {
        self.previous
    }

    /// Returns true if the machine has a state with this id.
    #[must_use]
    pub fn has_state(&self, id: StateId) -> bool {
        self.states.contains_key(&id)
    }

    /// Registered state ids.
    pub fn state_ids(&self) -> impl Iterator<Item = StateId> + '_ {
        self.states.keys().copied()
    }

    /// Switches to `next`.
    ///
    /// `None` and ids without a registered state are skipped. Returns true
    /// if a switch happened.
    pub fn switch_state(&mut self, next: Option<StateId>, ctx: &mut NpcContext<'_>) -> bool {
        let Some(next) = next else {
            debug!(entity = ?self.owner, "Switch to missing state skipped");
            return false;
        };
        if !self.states.contains_key(&next) {
            warn!(entity = ?self.owner, state = ?next, "State not found, switch skipped");
            return false;
        }

        let outgoing = self.current;
        if let Some(state) = outgoing.and_then(|id| self.states.get_mut(&id)) {
            state.exit(ctx);
            debug!(entity = ?self.owner, state = ?state.id(), "Exit");
        }
        if let Some(out) = outgoing {
            if out != next {
                self.previous = Some(out);
            }
        }
        self.current = Some(next);
        if let Some(state) = self.states.get_mut(&next) {
            debug!(entity = ?self.owner, state = ?next, "Enter");
            state.enter(ctx);
        }
        ctx.level.events.publish(AiEvent::StateChanged {
            entity_id: self.owner,
            from: outgoing,
            to: next,
        });
        true
    }

    /// Runs the current state's update and applies the transitions it requested.
    pub fn update(&mut self, dt: f32, ctx: &mut NpcContext<'_>) {
        let Some(current) = self.current else {
            return;
        };
        let mut fsm = Transitions::new(self.current, self.previous);
        if let Some(state) = self.states.get_mut(&current) {
            state.update(dt, ctx, &mut fsm);
        }
        for next in fsm.requests {
            self.switch_state(Some(next), ctx);
        }
    }

    /// Delivers a signal to the current state.
    pub fn signal(&mut self, signal: StateSignal, ctx: &mut NpcContext<'_>) {
        if let Some(state) = self.current.and_then(|id| self.states.get_mut(&id)) {
            state.on_signal(signal, ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ContextRig;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    #[derive(Debug)]
    struct Probe {
        id: StateId,
        log: Log,
        next: Option<StateId>,
    }

    impl Probe {
        fn boxed(id: StateId, log: &Log) -> Box<dyn NpcState> {
            Box::new(Self {
                id,
                log: Rc::clone(log),
                next: None,
            })
        }

        fn leading_to(id: StateId, next: StateId, log: &Log) -> Box<dyn NpcState> {
            Box::new(Self {
                id,
                log: Rc::clone(log),
                next: Some(next),
            })
        }
    }

    impl NpcState for Probe {
        fn id(&self) -> StateId {
            self.id
        }

        fn enter(&mut self, _ctx: &mut NpcContext<'_>) {
            self.log.borrow_mut().push(format!("enter {}", self.id));
        }

        fn update(&mut self, _dt: f32, _ctx: &mut NpcContext<'_>, fsm: &mut Transitions) {
            self.log.borrow_mut().push(format!("update {}", self.id));
            fsm.switch_to_opt(self.next);
        }

        fn exit(&mut self, _ctx: &mut NpcContext<'_>) {
            self.log.borrow_mut().push(format!("exit {}", self.id));
        }
    }

    fn machine(ids: &[StateId], log: &Log) -> StateMachine {
        ids.iter()
            .fold(StateMachine::new(EntityId::from_raw(1)), |m, id| {
                m.with_state(Probe::boxed(*id, log))
            })
    }

    #[test]
    fn test_switch_runs_exit_before_enter() {
        let log = Log::default();
        let mut fsm = machine(&[StateId::Idle, StateId::Chase], &log);
        let mut rig = ContextRig::soldier();

        assert!(fsm.switch_state(Some(StateId::Idle), &mut rig.ctx()));
        assert!(fsm.switch_state(Some(StateId::Chase), &mut rig.ctx()));

        assert_eq!(*log.borrow(), ["enter Idle", "exit Idle", "enter Chase"]);
        assert_eq!(fsm.current(), Some(StateId::Chase));
        assert_eq!(fsm.previous(), Some(StateId::Idle));
    }

    #[test]
    fn test_reentry_keeps_previous() {
        let log = Log::default();
        let mut fsm = machine(&[StateId::Chase, StateId::Hit], &log);
        let mut rig = ContextRig::soldier();

        fsm.switch_state(Some(StateId::Chase), &mut rig.ctx());
        fsm.switch_state(Some(StateId::Hit), &mut rig.ctx());
        fsm.switch_state(Some(StateId::Hit), &mut rig.ctx());

        assert_eq!(fsm.current(), Some(StateId::Hit));
        assert_eq!(fsm.previous(), Some(StateId::Chase));
        assert_eq!(
            *log.borrow(),
            ["enter Chase", "exit Chase", "enter Hit", "exit Hit", "enter Hit"]
        );
    }

    #[test]
    fn test_missing_state_is_skipped() {
        let log = Log::default();
        let mut fsm = machine(&[StateId::Idle], &log);
        let mut rig = ContextRig::melee();

        fsm.switch_state(Some(StateId::Idle), &mut rig.ctx());
        assert!(!fsm.switch_state(Some(StateId::Patrol), &mut rig.ctx()));
        assert!(!fsm.switch_state(None, &mut rig.ctx()));

        assert_eq!(fsm.current(), Some(StateId::Idle));
        assert_eq!(fsm.previous(), None);
        assert_eq!(*log.borrow(), ["enter Idle"]);
    }

    #[test]
    fn test_update_applies_requested_switch() {
        let log = Log::default();
        let mut fsm = StateMachine::new(EntityId::from_raw(1))
            .with_state(Probe::leading_to(StateId::Idle, StateId::Wander, &log))
            .with_state(Probe::boxed(StateId::Wander, &log));
        let mut rig = ContextRig::melee();

        fsm.update(0.1, &mut rig.ctx());
        assert!(log.borrow().is_empty());

        fsm.switch_state(Some(StateId::Idle), &mut rig.ctx());
        fsm.update(0.1, &mut rig.ctx());

        assert_eq!(fsm.current(), Some(StateId::Wander));
        assert_eq!(
            *log.borrow(),
            ["enter Idle", "update Idle", "exit Idle", "enter Wander"]
        );
        let changes: Vec<_> = rig
            .events
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                AiEvent::StateChanged { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            changes,
            [(None, StateId::Idle), (Some(StateId::Idle), StateId::Wander)]
        );
    }

    #[test]
    fn test_signal_reaches_current_state_only() {
        let log = Log::default();
        let mut fsm = machine(&[StateId::Idle], &log);
        let mut rig = ContextRig::melee();
        fsm.signal(StateSignal::ObstacleContact, &mut rig.ctx());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_state_id_names() {
        assert_eq!(StateId::all().len(), 10);
        assert_eq!(StateId::Circling.to_string(), "Circling");
    }

    proptest! {
        #[test]
        fn test_enter_exit_balanced(indices in prop::collection::vec(0usize..4, 1..40)) {
            let ids = [StateId::Idle, StateId::Chase, StateId::Hit, StateId::Cover];
            let log = Log::default();
            let mut fsm = machine(&ids, &log);
            let mut rig = ContextRig::soldier();

            for i in indices {
                fsm.switch_state(Some(ids[i]), &mut rig.ctx());
                let entries = log.borrow().iter().filter(|l| l.starts_with("enter")).count();
                let exits = log.borrow().iter().filter(|l| l.starts_with("exit")).count();
                prop_assert_eq!(entries, exits + 1);
                prop_assert_ne!(fsm.previous(), fsm.current());
            }
        }
    }
}
