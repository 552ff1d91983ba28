//! Server-to-observer propagation of engagement state.
//!
//! The server side is a [`ReplicationChannel`] holding one FIFO queue per
//! attached observer, so every observer sees messages in send order.
//! Nothing crosses observers: a slow observer never delays another one.
//!
//! The client side is an [`ObserverView`], which turns received messages
//! into local [`EffectTrigger`]s. Observers never infer state: the last
//! `AttackingChanged` they received is the truth.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, Seconds};
use crate::engagement::AttackingChange;
use crate::error::{GameError, Result};

/// Identifier of an observing client.
pub type ObserverId = u64;

/// Transport class a message must travel with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// Must arrive, in order, per entity.
    ReliableOrdered,
    /// May be dropped; only cosmetics depend on it.
    Unreliable,
}

/// A message sent from the server to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicationMessage {
    /// The authoritative `attacking` flag of `entity` changed.
    AttackingChanged {
        /// Agent whose flag changed.
        entity: EntityId,
        /// Value before the change.
        previous: bool,
        /// Value after the change.
        new_value: bool,
    },
    /// One-shot: `entity` landed a strike.
    AttackSucceeded {
        /// Agent that struck.
        entity: EntityId,
    },
}

impl ReplicationMessage {
    /// Build the change notification for `entity`.
    #[must_use]
    pub const fn attacking_changed(entity: EntityId, change: AttackingChange) -> Self {
        Self::AttackingChanged {
            entity,
            previous: change.previous,
            new_value: change.current,
        }
    }

    /// Agent the message is about.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        match *self {
            Self::AttackingChanged { entity, .. } | Self::AttackSucceeded { entity } => entity,
        }
    }

    /// Transport class for this message.
    #[must_use]
    pub const fn delivery(&self) -> Delivery {
        match self {
            Self::AttackingChanged { .. } => Delivery::ReliableOrdered,
            Self::AttackSucceeded { .. } => Delivery::Unreliable,
        }
    }

    /// Encode for the wire.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::Codec(format!("Failed to encode message: {e}")))
    }

    /// Decode a frame produced by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| GameError::Codec(format!("Failed to decode message: {e}")))
    }
}

/// Per-observer outbound queues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationChannel {
    queues: BTreeMap<ObserverId, VecDeque<ReplicationMessage>>,
}

impl ReplicationChannel {
    /// Channel with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start delivering to `observer`. Earlier messages are not replayed.
    pub fn attach(&mut self, observer: ObserverId) -> Result<()> {
        if self.queues.contains_key(&observer) {
            return Err(GameError::DuplicateObserver(observer));
        }
        self.queues.insert(observer, VecDeque::new());
        tracing::debug!(observer, "Observer attached");
        Ok(())
    }

    /// Stop delivering to `observer` and drop whatever it had not drained.
    pub fn detach(&mut self, observer: ObserverId) -> Result<()> {
        let dropped = self
            .queues
            .remove(&observer)
            .ok_or(GameError::ObserverNotFound(observer))?;
        tracing::debug!(observer, dropped = dropped.len(), "Observer detached");
        Ok(())
    }

    /// True when `observer` is attached.
    #[must_use]
    pub fn is_attached(&self, observer: ObserverId) -> bool {
        self.queues.contains_key(&observer)
    }

    /// Attached observers in ascending id order.
    pub fn observers(&self) -> impl Iterator<Item = ObserverId> + '_ {
        self.queues.keys().copied()
    }

    /// Number of attached observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.queues.len()
    }

    /// Notify every observer that `entity`'s flag changed.
    pub fn publish_attacking(&mut self, entity: EntityId, change: AttackingChange) {
        self.broadcast(ReplicationMessage::attacking_changed(entity, change));
    }

    /// Fire-and-forget strike notification to current observers.
    pub fn broadcast_attack_succeeded(&mut self, entity: EntityId) {
        self.broadcast(ReplicationMessage::AttackSucceeded { entity });
    }

    /// Queue a message for one observer only.
    pub fn send_to(&mut self, observer: ObserverId, message: ReplicationMessage) -> Result<()> {
        self.queues
            .get_mut(&observer)
            .ok_or(GameError::ObserverNotFound(observer))?
            .push_back(message);
        Ok(())
    }

    /// Take everything queued for `observer`, oldest first.
    pub fn drain(&mut self, observer: ObserverId) -> Result<Vec<ReplicationMessage>> {
        let queue = self
            .queues
            .get_mut(&observer)
            .ok_or(GameError::ObserverNotFound(observer))?;
        Ok(queue.drain(..).collect())
    }

    /// Number of messages waiting for `observer`.
    #[must_use]
    pub fn pending(&self, observer: ObserverId) -> usize {
        self.queues.get(&observer).map_or(0, VecDeque::len)
    }

    fn broadcast(&mut self, message: ReplicationMessage) {
        for queue in self.queues.values_mut() {
            queue.push_back(message);
        }
    }
}

/// A local effect toggle on the observing client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectTrigger {
    /// Show or hide the "attacking" indicator of `entity`.
    AttackIndicator {
        /// Agent the indicator belongs to.
        entity: EntityId,
        /// Whether it should be visible.
        visible: bool,
    },
    /// Show or hide the "attack succeeded" indicator of `entity`.
    SuccessIndicator {
        /// Agent the indicator belongs to.
        entity: EntityId,
        /// Whether it should be visible.
        visible: bool,
    },
}

/// Client-side mirror of replicated engagement state.
///
/// Holds the last received `attacking` value per agent and a local timer
/// per visible success indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverView {
    success_duration: Seconds,
    attacking: BTreeMap<EntityId, bool>,
    success_until: BTreeMap<EntityId, Seconds>,
}

impl ObserverView {
    /// Empty view showing success indicators for `success_duration`.
    #[must_use]
    pub fn new(success_duration: Seconds) -> Self {
        Self {
            success_duration,
            attacking: BTreeMap::new(),
            success_until: BTreeMap::new(),
        }
    }

    /// Last received `attacking` value; `false` if nothing was received.
    #[must_use]
    pub fn is_attacking(&self, entity: EntityId) -> bool {
        self.attacking.get(&entity).copied().unwrap_or(false)
    }

    /// True while the success indicator of `entity` is shown.
    #[must_use]
    pub fn is_success_visible(&self, entity: EntityId) -> bool {
        self.success_until.contains_key(&entity)
    }

    /// Apply one received message at local time `now`.
    ///
    /// `AttackingChanged` always yields a toggle keyed on the new value;
    /// applying it twice is harmless. `AttackSucceeded` shows the indicator
    /// and extends an already visible one.
    pub fn apply(&mut self, message: ReplicationMessage, now: Seconds) -> Option<EffectTrigger> {
        match message {
            ReplicationMessage::AttackingChanged {
                entity, new_value, ..
            } => {
                self.attacking.insert(entity, new_value);
                Some(EffectTrigger::AttackIndicator {
                    entity,
                    visible: new_value,
                })
            }
            ReplicationMessage::AttackSucceeded { entity } => {
                let until = now + self.success_duration;
                match self.success_until.get_mut(&entity) {
                    Some(existing) => {
                        *existing = (*existing).max(until);
                        None
                    }
                    None => {
                        self.success_until.insert(entity, until);
                        Some(EffectTrigger::SuccessIndicator {
                            entity,
                            visible: true,
                        })
                    }
                }
            }
        }
    }

    /// Hide every success indicator whose time is up.
    pub fn advance(&mut self, now: Seconds) -> Vec<EffectTrigger> {
        let expired: Vec<EntityId> = self
            .success_until
            .iter()
            .filter(|(_, until)| now >= **until)
            .map(|(entity, _)| *entity)
            .collect();

        expired
            .into_iter()
            .map(|entity| {
                self.success_until.remove(&entity);
                EffectTrigger::SuccessIndicator {
                    entity,
                    visible: false,
                }
            })
            .collect()
    }
}
