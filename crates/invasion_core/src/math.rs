//! Fixed-point math utilities for deterministic simulation.
//!
//! Agent movement, engagement timers and gate bookkeeping all run on
//! fixed-point numbers so that two servers fed the same inputs produce
//! bit-identical state. Floats only appear at the configuration boundary
//! (see [`fixed_decimal`]).

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// Lower bound applied to a smoothing time constant before dividing by it.
const MIN_SMOOTH_TIME: Fixed = Fixed::from_bits(429_497); // ~0.0001

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers in simulation state.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across snapshots and the wire.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for hand-edited configuration values.
///
/// Config files are written by designers as decimals (`attack_delay: 0.5`),
/// not raw bits. Parsing a decimal literal is exact and platform
/// independent, so converting at load time keeps the simulation
/// deterministic.
pub mod fixed_decimal {
    use super::Fixed;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a fixed-point number as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.to_num::<f64>())
    }

    /// Deserialize a fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = f64::deserialize(deserializer)?;
        if !raw.is_finite() {
            return Err(D::Error::custom(format!("{raw} is not a finite number")));
        }
        Fixed::checked_from_num(raw)
            .ok_or_else(|| D::Error::custom(format!("{raw} is out of fixed-point range")))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// Euclidean distance between two points.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x
            .saturating_mul(other.x)
            .saturating_add(self.y.saturating_mul(other.y))
    }

    /// Vector length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    /// Check whether both components are exactly zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.x == Fixed::ZERO && self.y == Fixed::ZERO
    }

    /// Normalize vector using fixed-point math.
    ///
    /// The zero vector normalizes to itself.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(self.x / len, self.y / len)
    }
}

/// Computes the square root of a fixed-point number using binary search.
fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::ONE { value } else { Fixed::ONE };

    for _ in 0..48 {
        let mid = low + (high - low) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

/// Gradually moves `current` toward `target` with a critically damped spring.
///
/// `rate` is the spring's own state (the rate of change of `current`) and
/// must be kept by the caller between calls. `smooth_time` is roughly the
/// time it takes to reach the target. The result never overshoots `target`.
#[must_use]
pub fn smooth_damp(
    current: Vec2Fixed,
    target: Vec2Fixed,
    rate: &mut Vec2Fixed,
    smooth_time: Fixed,
    dt: Fixed,
) -> Vec2Fixed {
    let smooth_time = smooth_time.max(MIN_SMOOTH_TIME);
    let omega = Fixed::from_num(2) / smooth_time;

    // Pade-style approximation of exp(-omega * dt).
    let x = omega.saturating_mul(dt);
    let x2 = x.saturating_mul(x);
    let x3 = x2.saturating_mul(x);
    let denominator = Fixed::ONE
        .saturating_add(x)
        .saturating_add(Fixed::from_num(0.48).saturating_mul(x2))
        .saturating_add(Fixed::from_num(0.235).saturating_mul(x3));
    let decay = Fixed::ONE / denominator;

    let change = current - target;
    let temp = (*rate + change * omega) * dt;
    *rate = (*rate - temp * omega) * decay;
    let mut output = target + (change + temp) * decay;

    if (target - current).dot(output - target) > Fixed::ZERO {
        output = target;
        *rate = Vec2Fixed::ZERO;
    }

    output
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Mul<Fixed> for Vec2Fixed {
    type Output = Self;

    fn mul(self, rhs: Fixed) -> Self::Output {
        Self {
            x: self.x.saturating_mul(rhs),
            y: self.y.saturating_mul(rhs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epsilon() -> Fixed {
        Fixed::ONE / Fixed::from_num(10000)
    }

    #[test]
    fn test_vec2_distance() {
        let a = Vec2Fixed::from_ints(3, 0);
        let b = Vec2Fixed::from_ints(0, 4);
        assert_eq!(a.distance_squared(b), Fixed::from_num(25));
        assert!((a.distance(b) - Fixed::from_num(5)).abs() < epsilon());
    }

    #[test]
    fn test_vec2_normalize() {
        let norm = Vec2Fixed::from_ints(3, 4).normalize();

        let len_sq = norm.dot(norm);
        assert!(
            (len_sq - Fixed::ONE).abs() < epsilon(),
            "normalized vector length² should be ~1, got {len_sq:?}"
        );

        // Direction preserved: x/y ratio matches 3/4
        let ratio_diff = (norm.x * Fixed::from_num(4)) - (norm.y * Fixed::from_num(3));
        assert!(ratio_diff.abs() < epsilon());
    }

    #[test]
    fn test_normalize_zero_is_zero() {
        assert_eq!(Vec2Fixed::ZERO.normalize(), Vec2Fixed::ZERO);
    }

    #[test]
    fn test_scale() {
        let v = Vec2Fixed::from_ints(2, -3) * Fixed::from_num(2);
        assert_eq!(v, Vec2Fixed::from_ints(4, -6));
    }

    #[test]
    fn test_smooth_damp_converges_without_overshoot() {
        let target = Vec2Fixed::from_ints(10, 0);
        let mut current = Vec2Fixed::ZERO;
        let mut rate = Vec2Fixed::ZERO;
        let dt = Fixed::from_num(0.05);

        let slack = Fixed::DELTA * Fixed::from_num(64);
        let mut previous_x = current.x;
        for _ in 0..200 {
            current = smooth_damp(current, target, &mut rate, Fixed::from_num(0.1), dt);
            assert!(current.x + slack >= previous_x, "spring must approach monotonically");
            assert!(current.x <= target.x + slack, "spring must not overshoot");
            previous_x = current.x;
        }

        assert!((current.x - target.x).abs() < epsilon());
    }

    #[test]
    fn test_smooth_damp_is_not_a_snap() {
        let target = Vec2Fixed::from_ints(10, 0);
        let mut rate = Vec2Fixed::ZERO;
        let first = smooth_damp(
            Vec2Fixed::ZERO,
            target,
            &mut rate,
            Fixed::from_num(0.1),
            Fixed::from_num(0.02),
        );

        assert!(first.x > Fixed::ZERO);
        assert!(first.x < target.x);
    }

    #[test]
    fn test_smooth_damp_determinism() {
        let run = || {
            let mut current = Vec2Fixed::from_ints(-4, 7);
            let mut rate = Vec2Fixed::ZERO;
            for step in 0..50 {
                let target = Vec2Fixed::from_ints(step % 5, 3 - step % 7);
                current = smooth_damp(
                    current,
                    target,
                    &mut rate,
                    Fixed::from_num(0.1),
                    Fixed::from_num(0.05),
                );
            }
            (current, rate)
        };

        assert_eq!(run(), run());
    }
}
