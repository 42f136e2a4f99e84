//! Trailing-Stop Rules
//!
//! Pure pieces of the trailing-stop worker: the request a caller submits,
//! candidate computation for each [`TrailMode`], and the [`TrailGate`] that
//! decides whether a candidate is worth sending to the terminal.
//!
//! # Gate Rules
//!
//! A candidate is applied only if all of these hold:
//!
//! | Rule | Long | Short |
//! |------|------|-------|
//! | Improves | `candidate > current` | `candidate < current` |
//! | Step | `candidate - current >= step` | `current - candidate >= step` |
//! | Interval | `now - last_applied >= min_interval` | same |
//!
//! With no readable current level the first two rules pass trivially.

use std::fmt;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::PositionSide;

/// Default minimum time between two applied stop changes.
pub const DEFAULT_MIN_APPLY_INTERVAL: Duration = Duration::from_millis(500);

// =============================================================================
// Request
// =============================================================================

/// How the trailing candidate is derived from price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailMode {
    /// Trail the current price at a fixed distance.
    #[default]
    Classic,
    /// Trail the best price seen since the worker started.
    Chandelier,
}

impl TrailMode {
    /// Label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Chandelier => "chandelier",
        }
    }
}

impl fmt::Display for TrailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrailMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classic" => Ok(Self::Classic),
            "chandelier" => Ok(Self::Chandelier),
            other => Err(format!("unknown trail mode: {other}")),
        }
    }
}

/// Invalid trailing request parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrailRequestError {
    /// Distance must be strictly positive.
    #[error("trail distance must be positive, got {0}")]
    NonPositiveDistance(Decimal),
    /// Step must be strictly positive.
    #[error("trail step must be positive, got {0}")]
    NonPositiveStep(Decimal),
}

/// Parameters of one trailing-stop worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailRequest {
    /// Position ticket the worker manages.
    pub ticket: u64,
    /// Symbol whose price drives the worker.
    pub symbol: String,
    /// Position direction.
    pub side: PositionSide,
    /// Price distance between reference price and stop.
    pub distance: Decimal,
    /// Minimum stop improvement worth sending.
    pub step: Decimal,
    /// Candidate derivation mode.
    pub mode: TrailMode,
}

impl TrailRequest {
    /// Check distance and step.
    ///
    /// # Errors
    ///
    /// Returns an error if either value is not strictly positive.
    pub fn validate(&self) -> Result<(), TrailRequestError> {
        if self.distance <= Decimal::ZERO {
            return Err(TrailRequestError::NonPositiveDistance(self.distance));
        }
        if self.step <= Decimal::ZERO {
            return Err(TrailRequestError::NonPositiveStep(self.step));
        }
        Ok(())
    }
}

// =============================================================================
// Candidate
// =============================================================================

/// Per-worker candidate tracker.
#[derive(Debug, Clone)]
pub struct TrailState {
    side: PositionSide,
    mode: TrailMode,
    distance: Decimal,
    extreme: Option<Decimal>,
}

impl TrailState {
    /// Create a tracker for the given request.
    #[must_use]
    pub const fn new(request: &TrailRequest) -> Self {
        Self {
            side: request.side,
            mode: request.mode,
            distance: request.distance,
            extreme: None,
        }
    }

    /// Best price seen so far (Chandelier mode only).
    #[must_use]
    pub const fn extreme(&self) -> Option<Decimal> {
        self.extreme
    }

    /// Feed a new price and return the stop candidate.
    pub fn candidate(&mut self, price: Decimal) -> Decimal {
        let reference = match self.mode {
            TrailMode::Classic => price,
            TrailMode::Chandelier => {
                let extreme = match (self.side, self.extreme) {
                    (_, None) => price,
                    (PositionSide::Long, Some(prev)) => prev.max(price),
                    (PositionSide::Short, Some(prev)) => prev.min(price),
                };
                self.extreme = Some(extreme);
                extreme
            }
        };

        match self.side {
            PositionSide::Long => reference - self.distance,
            PositionSide::Short => reference + self.distance,
        }
    }
}

// =============================================================================
// Gate
// =============================================================================

/// Outcome of evaluating a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Send the candidate to the terminal.
    Apply,
    /// Candidate is not more protective than the current level.
    NotImproved,
    /// Improvement is smaller than one step.
    BelowStep,
    /// Last change was applied too recently.
    Throttled,
}

/// Decides whether a candidate stop should be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailGate {
    step: Decimal,
    min_interval: Duration,
}

impl TrailGate {
    /// Create a gate.
    #[must_use]
    pub const fn new(step: Decimal, min_interval: Duration) -> Self {
        Self { step, min_interval }
    }

    /// Evaluate `candidate` against the current level and apply history.
    #[must_use]
    pub fn evaluate(
        &self,
        side: PositionSide,
        candidate: Decimal,
        current: Option<Decimal>,
        last_applied: Option<Instant>,
        now: Instant,
    ) -> GateDecision {
        if let Some(current) = current {
            let improvement = match side {
                PositionSide::Long => candidate - current,
                PositionSide::Short => current - candidate,
            };
            if improvement <= Decimal::ZERO {
                return GateDecision::NotImproved;
            }
            if improvement < self.step {
                return GateDecision::BelowStep;
            }
        }

        let throttled =
            last_applied.is_some_and(|last| now.saturating_duration_since(last) < self.min_interval);
        if throttled {
            return GateDecision::Throttled;
        }

        GateDecision::Apply
    }
}
