//! Event bus for behavior notifications.
//!
//! States, weapons, health and the coordinator publish [`AiEvent`]s here.
//! Animation, audio and UI collaborators observe them either by draining the
//! bus or through their own subscription channel.

use crossbeam_channel::{bounded, Receiver, Sender};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use warden_common::{EntityCategory, EntityId, PooledHandle};

use crate::animation::BehaviorCue;
use crate::fsm::StateId;
use crate::npc::NpcKind;

/// Event types that can be sent through the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AiEvent {
    /// NPC added to the level
    NpcSpawned {
        /// Entity ID
        entity_id: EntityId,
        /// NPC archetype
        kind: NpcKind,
    },
    /// NPC removed from the level
    NpcDespawned {
        /// Entity ID
        entity_id: EntityId,
    },
    /// State machine changed state
    StateChanged {
        /// Entity ID
        entity_id: EntityId,
        /// Outgoing state
        from: Option<StateId>,
        /// Incoming state
        to: StateId,
    },
    /// Behavior cue for the animation binding
    Cue {
        /// Entity ID
        entity_id: EntityId,
        /// Cue raised by the active state
        cue: BehaviorCue,
    },
    /// Entity took damage and survived
    Damaged {
        /// Entity ID
        entity_id: EntityId,
        /// Side of the damaged entity
        category: EntityCategory,
        /// Damage amount
        amount: i32,
        /// Health left
        remaining: i32,
        /// Source entity (if any)
        source: Option<EntityId>,
    },
    /// Entity died
    Died {
        /// Entity ID
        entity_id: EntityId,
        /// Side of the dead entity
        category: EntityCategory,
    },
    /// An NPC saw the player
    PlayerSpotted {
        /// NPC that spotted the player
        entity_id: EntityId,
        /// Where the spotting NPC stood
        position: Vec3,
    },
    /// An alert forced an NPC into pursuit
    Alerted {
        /// NPC that was alerted
        entity_id: EntityId,
        /// NPC that raised the alert
        by: EntityId,
    },
    /// Coordinator granted the attack turn
    AttackerSelected {
        /// New attacker
        entity_id: EntityId,
    },
    /// Coordinator released the attack turn
    AttackerCleared {
        /// Previous attacker
        entity_id: EntityId,
    },
    /// Weapon fired a round
    WeaponFired {
        /// Shooter
        entity_id: EntityId,
        /// Rounds left in the magazine
        ammo_left: u32,
    },
    /// Trigger pulled on an empty weapon
    DryFired {
        /// Shooter
        entity_id: EntityId,
    },
    /// Magazine inserted and reloading
    MagazineAttached {
        /// Weapon holder
        entity_id: EntityId,
    },
    /// Magazine removed
    MagazineDetached {
        /// Weapon holder
        entity_id: EntityId,
    },
    /// Pooled object handed back
    ReturnedToPool {
        /// Object handle
        handle: PooledHandle,
    },
}

impl AiEvent {
    /// Entity the event is about, if any.
    #[must_use]
    pub const fn entity(&self) -> Option<EntityId> {
        match self {
            Self::NpcSpawned { entity_id, .. }
            | Self::NpcDespawned { entity_id }
            | Self::StateChanged { entity_id, .. }
            | Self::Cue { entity_id, .. }
            | Self::Damaged { entity_id, .. }
            | Self::Died { entity_id, .. }
            | Self::PlayerSpotted { entity_id, .. }
            | Self::Alerted { entity_id, .. }
            | Self::AttackerSelected { entity_id }
            | Self::AttackerCleared { entity_id }
            | Self::WeaponFired { entity_id, .. }
            | Self::DryFired { entity_id }
            | Self::MagazineAttached { entity_id }
            | Self::MagazineDetached { entity_id } => Some(*entity_id),
            Self::ReturnedToPool { .. } => None,
        }
    }
}

/// Identifier of a bus subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Event bus for broadcasting events to subscribers.
#[derive(Debug)]
pub struct EventBus {
    /// Sender for broadcasting events
    sender: Sender<AiEvent>,
    /// Receiver for collecting events
    receiver: Receiver<AiEvent>,
    /// Channel capacity
    capacity: usize,
    /// Additional subscriber channels
    subscribers: Vec<(SubscriptionId, Sender<AiEvent>)>,
    /// Next subscription id
    next_subscription: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
            subscribers: Vec::new(),
            next_subscription: 1,
        }
    }

    /// Publishes an event to the bus and every subscriber.
    pub fn publish(&self, event: AiEvent) {
        for (_, subscriber) in &self.subscribers {
            // Non-blocking send - a full or dropped subscriber misses the event
            let _ = subscriber.try_send(event.clone());
        }
        let _ = self.sender.try_send(event);
    }

    /// Drains all pending events from the main channel.
    pub fn drain(&self) -> Vec<AiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Returns the number of pending events on the main channel.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a new sender handle for publishing events.
    #[must_use]
    pub fn sender(&self) -> Sender<AiEvent> {
        self.sender.clone()
    }

    /// Opens a dedicated channel that receives every event published from now on.
    pub fn subscribe(&mut self) -> (SubscriptionId, Receiver<AiEvent>) {
        let (sender, receiver) = bounded(self.capacity);
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, sender));
        (id, receiver)
    }

    /// Closes a subscription. Returns false if it was unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    /// Number of open subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spotted(raw: u64) -> AiEvent {
        AiEvent::PlayerSpotted {
            entity_id: EntityId::from_raw(raw),
            position: Vec3::ZERO,
        }
    }

    #[test]
    fn test_publish_and_drain() {
        let bus = EventBus::new(8);
        bus.publish(spotted(1));
        bus.publish(spotted(2));
        assert_eq!(bus.pending_count(), 2);

        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].entity(), Some(EntityId::from_raw(1)));
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_full_bus_drops_events() {
        let bus = EventBus::new(1);
        bus.publish(spotted(1));
        bus.publish(spotted(2));
        assert_eq!(bus.drain().len(), 1);
    }

    #[test]
    fn test_subscription_lifecycle() {
        let mut bus = EventBus::new(8);
        let (id, rx) = bus.subscribe();
        bus.publish(spotted(3));
        assert_eq!(rx.try_recv().ok(), Some(spotted(3)));

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(spotted(4));
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.subscriber_count(), 0);
        // Main channel still sees both
        assert_eq!(bus.drain().len(), 2);
    }
}
