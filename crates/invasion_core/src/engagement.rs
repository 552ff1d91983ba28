//! Per-agent attack state machine.
//!
//! ```text
//!            target enters range
//!   Idle ─────────────────────────▶ Engaged (attacking = true)
//!    ▲                                  │  now >= next_attack_decision_at
//!    │  target leaves range,            ▼
//!    │  target absent, or          strike, reschedule
//!    └── disabled ◀───────────────  decision at now + delay + recovery
//! ```
//!
//! `Recovering` is not stored: it is "not attacking, but `now` is still
//! before `next_attack_ready_at`". Movement stays suspended during it.
//!
//! The machine owns the authoritative `attacking` flag. Every mutation of
//! that flag is reported as an [`AttackingChange`] so the caller can
//! replicate it.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, Seconds};
use crate::config::EngagementConfig;
use crate::math::Fixed;

/// Observable engagement state at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngagementState {
    /// Not attacking, free to move.
    Idle,
    /// Attacking the current target.
    Engaged,
    /// Not attacking, inside the post-strike window.
    Recovering,
}

/// A change of the authoritative `attacking` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttackingChange {
    /// Value before the change.
    pub previous: bool,
    /// Value after the change.
    pub current: bool,
}

/// A strike that landed this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Strike {
    /// Entity that was hit.
    pub target: EntityId,
    /// Damage to apply.
    pub damage: u32,
}

/// Result of a per-tick evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Not engaged; nothing to do.
    Idle,
    /// Engaged, decision time not reached yet.
    WindingUp,
    /// Decision time reached with the target present.
    Struck(Strike),
    /// Engaged but the target is gone; dropped to idle without striking.
    TargetLost(AttackingChange),
}

/// Authoritative attack state of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngagementStateMachine {
    config: EngagementConfig,
    attacking: bool,
    #[serde(with = "crate::math::fixed_serde")]
    next_attack_decision_at: Seconds,
    #[serde(with = "crate::math::fixed_serde")]
    next_attack_ready_at: Seconds,
}

impl EngagementStateMachine {
    /// Idle machine with neutral timers.
    #[must_use]
    pub const fn new(config: EngagementConfig) -> Self {
        Self {
            config,
            attacking: false,
            next_attack_decision_at: Fixed::ZERO,
            next_attack_ready_at: Fixed::ZERO,
        }
    }

    /// Tuning in use.
    #[must_use]
    pub const fn config(&self) -> &EngagementConfig {
        &self.config
    }

    /// The authoritative flag.
    #[must_use]
    pub const fn attacking(&self) -> bool {
        self.attacking
    }

    /// Instant at which the next strike may land.
    #[must_use]
    pub const fn next_attack_decision_at(&self) -> Seconds {
        self.next_attack_decision_at
    }

    /// Instant at which the post-strike window ends.
    #[must_use]
    pub const fn next_attack_ready_at(&self) -> Seconds {
        self.next_attack_ready_at
    }

    /// True while the post-strike window is open.
    #[must_use]
    pub fn is_recovering(&self, now: Seconds) -> bool {
        now < self.next_attack_ready_at
    }

    /// State at `now`.
    #[must_use]
    pub fn state(&self, now: Seconds) -> EngagementState {
        if self.attacking {
            EngagementState::Engaged
        } else if self.is_recovering(now) {
            EngagementState::Recovering
        } else {
            EngagementState::Idle
        }
    }

    /// Something entered the attack range.
    ///
    /// Engages only when the entrant is the current target and the machine
    /// is not already engaged.
    pub fn on_region_enter(
        &mut self,
        entrant: EntityId,
        target: Option<EntityId>,
        now: Seconds,
    ) -> Option<AttackingChange> {
        if self.attacking || target != Some(entrant) {
            return None;
        }
        self.engage(now)
    }

    /// Something left the attack range.
    ///
    /// Leaving target always cancels the engagement, whatever the timers say.
    pub fn on_region_exit(
        &mut self,
        leaver: EntityId,
        target: Option<EntityId>,
    ) -> Option<AttackingChange> {
        if target != Some(leaver) {
            return None;
        }
        self.set_attacking(false)
    }

    /// Engage now with a fresh wind-up. No-op when already engaged.
    pub fn engage(&mut self, now: Seconds) -> Option<AttackingChange> {
        if self.attacking {
            return None;
        }
        self.next_attack_decision_at = now + self.config.attack_delay;
        self.set_attacking(true)
    }

    /// Drop to idle without touching the timers.
    pub fn disengage(&mut self) -> Option<AttackingChange> {
        self.set_attacking(false)
    }

    /// Per-tick strike evaluation.
    ///
    /// `target` is the target as resolved this tick: `None` when it has
    /// been destroyed or was never set. An absent target counts as an
    /// exit: no strike and no recovery charge.
    pub fn evaluate(&mut self, target: Option<EntityId>, now: Seconds) -> Evaluation {
        if !self.attacking {
            return Evaluation::Idle;
        }

        let Some(target) = target else {
            return match self.set_attacking(false) {
                Some(change) => Evaluation::TargetLost(change),
                None => Evaluation::Idle,
            };
        };

        if now < self.next_attack_decision_at {
            return Evaluation::WindingUp;
        }

        self.next_attack_decision_at = now + self.config.cycle();
        self.next_attack_ready_at = now + self.config.attack_recovery;

        Evaluation::Struck(Strike {
            target,
            damage: self.config.damage,
        })
    }

    /// Force idle and zero every timer.
    pub fn reset(&mut self) -> Option<AttackingChange> {
        self.next_attack_decision_at = Fixed::ZERO;
        self.next_attack_ready_at = Fixed::ZERO;
        self.set_attacking(false)
    }

    fn set_attacking(&mut self, value: bool) -> Option<AttackingChange> {
        if self.attacking == value {
            return None;
        }
        let previous = self.attacking;
        self.attacking = value;
        Some(AttackingChange {
            previous,
            current: value,
        })
    }
}
