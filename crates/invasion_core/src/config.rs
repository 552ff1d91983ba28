//! Tuning parameters supplied at agent, gate and simulation construction.
//!
//! Every struct deserializes from RON with decimal literals and falls back
//! to the stock values for omitted fields.
//!
//! # Example RON
//!
//! ```ron
//! AgentConfig(
//!     movement: Some(MovementConfig(
//!         move_speed: 300.0,
//!         movement_smoothing: 0.1,
//!         next_waypoint_distance: 3.0,
//!     )),
//!     engagement: Some(EngagementConfig(
//!         damage: 1,
//!         attack_delay: 0.5,
//!         attack_recovery: 1.0,
//!     )),
//!     path_update_interval: 0.5,
//!     attack_radius: 1.25,
//! )
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::components::Seconds;
use crate::error::{GameError, Result};
use crate::gate::GateMode;
use crate::math::{fixed_decimal, Fixed, Vec2Fixed};

/// Highest accepted `SimulationConfig::tick_rate`.
pub const MAX_TICK_RATE: u32 = 1000;

/// Parse any config type from RON text.
pub fn from_ron_str<T: DeserializeOwned>(text: &str) -> Result<T> {
    ron::from_str(text).map_err(|e| GameError::ConfigParse(e.to_string()))
}

/// Path-following parameters. Absent on stationary agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Movement speed. Target velocity is `direction * move_speed * tick_duration`.
    #[serde(with = "fixed_decimal")]
    pub move_speed: Fixed,
    /// Smoothing time constant of the velocity spring, in seconds.
    #[serde(with = "fixed_decimal")]
    pub movement_smoothing: Seconds,
    /// A waypoint counts as reached once the agent is closer than this.
    #[serde(with = "fixed_decimal")]
    pub next_waypoint_distance: Fixed,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            move_speed: Fixed::from_num(300),
            movement_smoothing: Fixed::from_num(0.1),
            next_waypoint_distance: Fixed::from_num(3),
        }
    }
}

/// Attack parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementConfig {
    /// Damage applied per strike.
    pub damage: u32,
    /// Wind-up between engaging and the first strike.
    #[serde(with = "fixed_decimal")]
    pub attack_delay: Seconds,
    /// Post-strike window during which movement is suspended.
    #[serde(with = "fixed_decimal")]
    pub attack_recovery: Seconds,
}

impl EngagementConfig {
    /// Full attack cycle: minimum time between two strikes.
    #[must_use]
    pub fn cycle(&self) -> Seconds {
        self.attack_delay + self.attack_recovery
    }
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            damage: 1,
            attack_delay: Fixed::from_num(0.5),
            attack_recovery: Fixed::ONE,
        }
    }
}

/// Per-agent configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Movement module settings; `None` builds a stationary agent.
    pub movement: Option<MovementConfig>,
    /// Engagement module settings; `None` builds an agent that never attacks.
    pub engagement: Option<EngagementConfig>,
    /// Minimum time between two path requests.
    #[serde(with = "fixed_decimal")]
    pub path_update_interval: Seconds,
    /// Radius of the attack-range region, used by the built-in proximity trigger.
    #[serde(with = "fixed_decimal")]
    pub attack_radius: Fixed,
}

impl AgentConfig {
    /// Same settings without a movement module.
    #[must_use]
    pub fn stationary(mut self) -> Self {
        self.movement = None;
        self
    }

    /// Reject values that would stall or destabilize the tick loop.
    pub fn validate(&self) -> Result<()> {
        if let Some(movement) = &self.movement {
            ensure_positive("move_speed", movement.move_speed)?;
            ensure_positive("movement_smoothing", movement.movement_smoothing)?;
            ensure_positive("next_waypoint_distance", movement.next_waypoint_distance)?;
        }
        if let Some(engagement) = &self.engagement {
            ensure_non_negative("attack_delay", engagement.attack_delay)?;
            ensure_non_negative("attack_recovery", engagement.attack_recovery)?;
            ensure_positive("attack cycle", engagement.cycle())?;
        }
        ensure_positive("path_update_interval", self.path_update_interval)?;
        ensure_non_negative("attack_radius", self.attack_radius)
    }

    /// Load and validate from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let config: Self = from_ron_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            movement: Some(MovementConfig::default()),
            engagement: Some(EngagementConfig::default()),
            path_update_interval: Fixed::from_num(0.5),
            attack_radius: Fixed::from_num(1.25),
        }
    }
}

/// Per-gate configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Static mode at level setup.
    pub mode: GateMode,
    /// Trigger region center, x.
    #[serde(with = "fixed_decimal")]
    pub center_x: Fixed,
    /// Trigger region center, y.
    #[serde(with = "fixed_decimal")]
    pub center_y: Fixed,
    /// Trigger region radius.
    #[serde(with = "fixed_decimal")]
    pub radius: Fixed,
}

impl GateConfig {
    /// Trigger region center.
    #[must_use]
    pub const fn center(&self) -> Vec2Fixed {
        Vec2Fixed::new(self.center_x, self.center_y)
    }

    /// Reject a negative trigger radius.
    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("gate radius", self.radius)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            mode: GateMode::Normal,
            center_x: Fixed::ZERO,
            center_y: Fixed::ZERO,
            radius: Fixed::from_num(2),
        }
    }
}

/// Simulation-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Ticks per simulated second.
    pub tick_rate: u32,
    /// How long observers show the attack-success indicator.
    #[serde(with = "fixed_decimal")]
    pub success_indicator_duration: Seconds,
    /// Derive enter/exit events from positions with the built-in
    /// proximity tracker instead of waiting for an external trigger source.
    pub proximity_triggers: bool,
}

impl SimulationConfig {
    /// Duration of one tick.
    #[must_use]
    pub fn tick_duration(&self) -> Seconds {
        Fixed::ONE / self.rate()
    }

    /// Simulation time at the start of `tick`.
    ///
    /// Derived from the tick count instead of summing tick durations, so
    /// instants such as 0.5 s at 20 Hz are hit exactly.
    #[must_use]
    pub fn time_at(&self, tick: u64) -> Seconds {
        Fixed::saturating_from_num(tick) / self.rate()
    }

    fn rate(&self) -> Fixed {
        Fixed::saturating_from_num(self.tick_rate.max(1))
    }

    /// Reject values that would stall the tick loop.
    pub fn validate(&self) -> Result<()> {
        if self.tick_rate == 0 || self.tick_rate > MAX_TICK_RATE {
            return Err(GameError::InvalidConfig(format!(
                "tick_rate must be between 1 and {MAX_TICK_RATE}, got {}",
                self.tick_rate
            )));
        }
        ensure_non_negative("success_indicator_duration", self.success_indicator_duration)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            success_indicator_duration: Fixed::from_num(0.1),
            proximity_triggers: false,
        }
    }
}

fn ensure_positive(name: &str, value: Fixed) -> Result<()> {
    if value > Fixed::ZERO {
        Ok(())
    } else {
        Err(GameError::InvalidConfig(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

fn ensure_non_negative(name: &str, value: Fixed) -> Result<()> {
    if value >= Fixed::ZERO {
        Ok(())
    } else {
        Err(GameError::InvalidConfig(format!(
            "{name} must not be negative, got {value}"
        )))
    }
}
