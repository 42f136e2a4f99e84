//! Volume Normalization
//!
//! Brokers only accept order volumes on a lattice `min + k * step` bounded by
//! `max`. This module snaps an arbitrary requested volume onto that lattice.
//!
//! # Algorithm
//!
//! 1. Reject non-positive requests.
//! 2. Clamp to `[min, max]`.
//! 3. Snap to the nearest lattice point, rounding half away from zero.
//! 4. If the snapped point overshoots `max`, step back once.
//! 5. Round to [`VOLUME_DECIMALS`] places and reject non-positive results.
//!
//! All failures are caller logic errors and must never be retried.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Decimal places kept after snapping.
pub const VOLUME_DECIMALS: u32 = 8;

/// Step used when the broker reports a zero or negative step (`0.00000001`).
pub const MIN_VOLUME_STEP: Decimal = Decimal::from_parts(1, 0, 0, false, VOLUME_DECIMALS);

/// Volume normalization errors (local validation, never retried).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VolumeError {
    /// The requested volume was zero or negative.
    #[error("requested volume must be positive, got {0}")]
    NonPositiveRequest(Decimal),

    /// The constraint bounds are inconsistent.
    #[error("invalid volume constraint: min {min} > max {max}")]
    InvalidConstraint {
        /// Minimum volume.
        min: Decimal,
        /// Maximum volume.
        max: Decimal,
    },

    /// Normalization produced a non-positive volume.
    #[error("normalized volume {0} is out of range")]
    OutOfRange(Decimal),
}

/// Allowed volume lattice for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConstraint {
    /// Smallest accepted volume.
    pub min: Decimal,
    /// Volume increment.
    pub step: Decimal,
    /// Largest accepted volume.
    pub max: Decimal,
}

impl VolumeConstraint {
    /// Create a constraint, substituting [`MIN_VOLUME_STEP`] for a
    /// non-positive step.
    #[must_use]
    pub fn new(min: Decimal, step: Decimal, max: Decimal) -> Self {
        let step = if step > Decimal::ZERO {
            step
        } else {
            MIN_VOLUME_STEP
        };
        Self { min, step, max }
    }

    /// Snap `requested` onto this lattice.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError`] when the request is non-positive, the bounds
    /// are inverted, or the result is non-positive.
    pub fn normalize(&self, requested: Decimal) -> Result<Decimal, VolumeError> {
        if requested <= Decimal::ZERO {
            return Err(VolumeError::NonPositiveRequest(requested));
        }
        if self.max < self.min {
            return Err(VolumeError::InvalidConstraint {
                min: self.min,
                max: self.max,
            });
        }

        let clamped = requested.clamp(self.min, self.max);
        let steps = ((clamped - self.min) / self.step)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

        let mut value = self.min + steps * self.step;
        if value > self.max && steps > Decimal::ZERO {
            value -= self.step;
        }

        let value = value
            .round_dp_with_strategy(VOLUME_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
            .normalize();

        if value <= Decimal::ZERO {
            return Err(VolumeError::OutOfRange(value));
        }
        Ok(value)
    }
}

/// Snap `requested` onto the `[min, step, max]` lattice.
///
/// Convenience wrapper over [`VolumeConstraint::normalize`].
///
/// # Errors
///
/// See [`VolumeConstraint::normalize`].
pub fn normalize_volume(
    requested: Decimal,
    min: Decimal,
    step: Decimal,
    max: Decimal,
) -> Result<Decimal, VolumeError> {
    VolumeConstraint::new(min, step, max).normalize(requested)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    use super::*;

    #[test_case(dec!(0.015), dec!(0.02) ; "half step rounds away from zero")]
    #[test_case(dec!(0.014), dec!(0.01) ; "below half step rounds down")]
    #[test_case(dec!(1000), dec!(100) ; "clamped to max")]
    #[test_case(dec!(0.001), dec!(0.01) ; "clamped to min")]
    #[test_case(dec!(1.234567), dec!(1.23) ; "drift absorbed")]
    fn normalizes_into_lattice(requested: Decimal, expected: Decimal) {
        assert_eq!(
            normalize_volume(requested, dec!(0.01), dec!(0.01), dec!(100)).unwrap(),
            expected
        );
    }

    #[test]
    fn rejects_non_positive_request() {
        assert_eq!(
            normalize_volume(dec!(-5), dec!(0.01), dec!(0.01), dec!(100)),
            Err(VolumeError::NonPositiveRequest(dec!(-5)))
        );
        assert!(normalize_volume(Decimal::ZERO, dec!(0.01), dec!(0.01), dec!(100)).is_err());
    }

    #[test]
    fn rejects_non_positive_result() {
        assert_eq!(
            normalize_volume(dec!(0.001), Decimal::ZERO, dec!(0.01), dec!(1)),
            Err(VolumeError::OutOfRange(Decimal::ZERO))
        );
    }

    #[test]
    fn rejects_inverted_bounds() {
        assert!(matches!(
            normalize_volume(dec!(1), dec!(5), dec!(1), dec!(2)),
            Err(VolumeError::InvalidConstraint { .. })
        ));
    }

    #[test]
    fn non_positive_step_falls_back_to_minimum() {
        let constraint = VolumeConstraint::new(dec!(0.1), Decimal::ZERO, dec!(10));
        assert_eq!(constraint.step, MIN_VOLUME_STEP);
        assert_eq!(constraint.normalize(dec!(0.123456789)).unwrap(), dec!(0.12345679));

        let constraint = VolumeConstraint::new(dec!(0.1), dec!(-1), dec!(10));
        assert_eq!(constraint.step, MIN_VOLUME_STEP);
    }

    #[test]
    fn max_off_lattice_steps_back() {
        // Lattice 0.1, 0.6, 1.1 ... with max 1.0: 0.95 snaps to 1.1, which overshoots.
        assert_eq!(
            normalize_volume(dec!(0.95), dec!(0.1), dec!(0.5), dec!(1.0)).unwrap(),
            dec!(0.6)
        );
    }

    fn constraint_strategy() -> impl Strategy<Value = (VolumeConstraint, Decimal)> {
        (1i64..500, 1i64..200, 0i64..400, 1i64..10_000_000).prop_map(
            |(min, step, extra_steps, requested)| {
                let min = Decimal::new(min, 2);
                let step = Decimal::new(step, 3);
                let max = min + step * Decimal::from(extra_steps) + Decimal::new(extra_steps % 7, 4);
                (
                    VolumeConstraint::new(min, step, max),
                    Decimal::new(requested, 4),
                )
            },
        )
    }

    proptest! {
        #[test]
        fn result_is_bounded_lattice_point_and_idempotent((constraint, requested) in constraint_strategy()) {
            let value = constraint.normalize(requested).unwrap();

            prop_assert!(value >= constraint.min);
            prop_assert!(value <= constraint.max);

            let steps = (value - constraint.min) / constraint.step;
            prop_assert_eq!(steps, steps.trunc());

            prop_assert_eq!(constraint.normalize(value).unwrap(), value);
        }
    }
}
