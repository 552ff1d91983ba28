//! Path following with a smoothed velocity.
//!
//! Each tick the controller steers toward the waypoint under the route's
//! cursor. The commanded velocity is eased toward the target velocity
//! with [`smooth_damp`] so waypoint transitions do not jitter.

use serde::{Deserialize, Serialize};

use crate::components::{Position, Seconds, Velocity};
use crate::config::MovementConfig;
use crate::math::{smooth_damp, Vec2Fixed};
use crate::pathfinding::Route;

/// Outcome of one movement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementStep {
    /// Steered toward a waypoint. `waypoint_reached` is set when the
    /// cursor advanced this step.
    Advanced {
        /// The cursor moved past a waypoint.
        waypoint_reached: bool,
    },
    /// Movement suspended; velocity was zeroed.
    Suspended(SuspendReason),
}

/// Why movement did not advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    /// No route installed, or it is empty.
    NoPath,
    /// Every waypoint has been reached; waits for a new route.
    EndOfPath,
    /// Inside the post-strike recovery window.
    Recovering,
    /// The agent is not controllable.
    Disabled,
}

/// Steers an agent along its cached route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovementController {
    config: MovementConfig,
    /// Internal rate of the velocity spring.
    spring_rate: Vec2Fixed,
}

impl MovementController {
    /// Controller at rest.
    #[must_use]
    pub const fn new(config: MovementConfig) -> Self {
        Self {
            config,
            spring_rate: Vec2Fixed::ZERO,
        }
    }

    /// Tuning in use.
    #[must_use]
    pub const fn config(&self) -> &MovementConfig {
        &self.config
    }

    /// Advance along `route` for one tick.
    pub fn step(
        &mut self,
        route: Option<&mut Route>,
        position: Position,
        velocity: &mut Velocity,
        dt: Seconds,
    ) -> MovementStep {
        let Some(route) = route.filter(|r| !r.is_empty()) else {
            return self.suspend(velocity, SuspendReason::NoPath);
        };

        let Some(waypoint) = route.current() else {
            return self.suspend(velocity, SuspendReason::EndOfPath);
        };

        let direction = (waypoint - position.value).normalize();
        let target_velocity = direction * self.config.move_speed * dt;
        velocity.value = smooth_damp(
            velocity.value,
            target_velocity,
            &mut self.spring_rate,
            self.config.movement_smoothing,
            dt,
        );

        let threshold = self.config.next_waypoint_distance;
        let waypoint_reached =
            position.value.distance_squared(waypoint) < threshold.saturating_mul(threshold);
        if waypoint_reached {
            route.advance();
        }

        MovementStep::Advanced { waypoint_reached }
    }

    /// Stop in place and drop any spring momentum.
    pub fn suspend(&mut self, velocity: &mut Velocity, reason: SuspendReason) -> MovementStep {
        *velocity = Velocity::ZERO;
        self.spring_rate = Vec2Fixed::ZERO;
        MovementStep::Suspended(reason)
    }
}

/// Integrate a velocity over one tick.
#[must_use]
pub fn integrate(position: Position, velocity: Velocity, dt: Seconds) -> Position {
    Position::new(position.value + velocity.value * dt)
}
