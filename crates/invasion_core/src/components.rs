//! Shared component types.
//!
//! Components are pure data with no behavior. Agents, actors and gates
//! are all addressed by a network-unique [`EntityId`].

use serde::{Deserialize, Serialize};

use crate::math::{Fixed, Vec2Fixed};

/// Stable, network-unique actor identifier.
pub type EntityId = u64;

/// Simulation time or duration in seconds.
///
/// Timers store absolute instants (`next_x = now + delta`) and are compared
/// with `now >= next_x`, never decremented.
pub type Seconds = Fixed;

/// Position component in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    /// World position.
    pub value: Vec2Fixed,
}

impl Position {
    /// Create a new position at the given coordinates.
    #[must_use]
    pub const fn new(value: Vec2Fixed) -> Self {
        Self { value }
    }

    /// Create a position at the origin.
    pub const ORIGIN: Self = Self {
        value: Vec2Fixed::ZERO,
    };
}

/// Velocity component for moving entities, in world units per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Velocity {
    /// Velocity vector.
    pub value: Vec2Fixed,
}

impl Velocity {
    /// Create a new velocity.
    #[must_use]
    pub const fn new(value: Vec2Fixed) -> Self {
        Self { value }
    }

    /// Zero velocity (stationary).
    pub const ZERO: Self = Self {
        value: Vec2Fixed::ZERO,
    };

    /// Check if the entity is stationary.
    #[must_use]
    pub fn is_stationary(&self) -> bool {
        self.value.is_zero()
    }
}

/// A damage application produced by a strike.
///
/// Handed to the [`DamageReceiver`] collaborator; the core never observes
/// what the receiver does with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DamageEvent {
    /// Entity being damaged.
    pub target: EntityId,
    /// Entity that dealt the damage.
    pub source: EntityId,
    /// Amount of damage.
    pub amount: u32,
}

/// External collaborator that applies damage on the receiving side.
///
/// Fire-and-forget: nothing is returned to the caller.
pub trait DamageReceiver {
    /// Apply `amount` damage from `source` to `target`.
    fn receive_damage(&mut self, target: EntityId, amount: u32, source: EntityId);
}

impl DamageReceiver for Vec<DamageEvent> {
    fn receive_damage(&mut self, target: EntityId, amount: u32, source: EntityId) {
        self.push(DamageEvent {
            target,
            source,
            amount,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_stationary() {
        assert!(Velocity::ZERO.is_stationary());
        assert!(!Velocity::new(Vec2Fixed::from_ints(0, 1)).is_stationary());
    }

    #[test]
    fn test_vec_collects_damage() {
        let mut sink: Vec<DamageEvent> = Vec::new();
        sink.receive_damage(7, 3, 1);

        assert_eq!(
            sink,
            vec![DamageEvent {
                target: 7,
                source: 1,
                amount: 3
            }]
        );
    }
}
