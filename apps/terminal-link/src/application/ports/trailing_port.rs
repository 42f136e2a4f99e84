//! Trailing Port (Driven Port)
//!
//! What a trailing-stop worker needs from the terminal: a price feed, the
//! current stop level and a way to move it.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use super::error::GatewayError;
use crate::domain::market::{ProtectiveLevel, Tick};

/// Default tick polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Retried price updates for one symbol.
pub type PriceStream = Pin<Box<dyn Stream<Item = Result<Tick, GatewayError>> + Send>>;

/// Where a worker's prices come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    /// Pull the latest tick on a fixed interval.
    Poll {
        /// Time between polls.
        interval: Duration,
    },
    /// Subscribe to pushed tick updates.
    Push,
}

impl Default for PriceSource {
    fn default() -> Self {
        Self::Poll {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PriceSource {
    /// Label for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Poll { .. } => "poll",
            Self::Push => "push",
        }
    }
}

/// Terminal access used by trailing-stop workers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrailingPort: Send + Sync {
    /// Price updates for `symbol` until `cancel` fires or a fatal error.
    fn price_updates(
        &self,
        symbol: &str,
        source: PriceSource,
        cancel: &CancellationToken,
    ) -> PriceStream;

    /// Current stop loss of the position.
    async fn stop_loss(
        &self,
        ticket: u64,
        cancel: &CancellationToken,
    ) -> Result<ProtectiveLevel, GatewayError>;

    /// Move the position's stop loss.
    async fn apply_stop(
        &self,
        ticket: u64,
        stop_loss: Decimal,
        cancel: &CancellationToken,
    ) -> Result<(), GatewayError>;
}
