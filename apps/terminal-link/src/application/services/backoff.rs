//! Connect Backoff
//!
//! Exponential backoff with jitter for the *initial* connect wait, while the
//! gateway or terminal is still coming up. The executors never use it; their
//! retry pause is fixed.

use std::time::Duration;

use rand::Rng;

/// Backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(16),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Stateful delay sequence.
#[derive(Debug)]
pub struct ConnectBackoff {
    config: BackoffConfig,
    current: Duration,
    attempts: u32,
}

impl ConnectBackoff {
    /// Start a fresh sequence.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        let current = config.initial_delay;
        Self {
            config,
            current,
            attempts: 0,
        }
    }

    /// Next delay with jitter applied; grows the base delay for the next call.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts += 1;
        let delay = self.jittered(self.current);

        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        self.current = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));

        delay
    }

    /// Number of delays handed out so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Restart from the initial delay.
    pub const fn reset(&mut self) {
        self.current = self.config.initial_delay;
        self.attempts = 0;
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return base;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = base.as_millis() as f64;
        let range = base_millis * self.config.jitter_factor;
        let offset: f64 = rand::rng().random_range(-range..=range);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = (base_millis + offset).max(1.0) as u64;
        Duration::from_millis(millis)
    }
}
