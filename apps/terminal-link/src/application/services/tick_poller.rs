//! Tick Poller
//!
//! Pull-based price feed for when push updates are unavailable. Polls the
//! latest tick on a fixed interval through the unary executor and yields
//! only ticks that differ from the previous one.

use std::time::Duration;

use futures::Stream;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::client::TerminalClient;
use crate::application::ports::GatewayError;
use crate::domain::market::Tick;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Periodic tick puller.
#[derive(Debug, Clone)]
pub struct TickPoller {
    client: TerminalClient,
    interval: Duration,
}

impl TickPoller {
    /// Create a poller; intervals below one millisecond are raised to it.
    #[must_use]
    pub fn new(client: TerminalClient, interval: Duration) -> Self {
        Self {
            client,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Polling interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Changed ticks for `symbol`.
    ///
    /// Ends quietly on cancellation; ends after yielding the error on a fatal
    /// failure. Recoverable failures are absorbed by the executor.
    pub fn ticks(
        &self,
        symbol: String,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<Tick, GatewayError>> + Send + 'static {
        let client = self.client.clone();
        let period = self.interval;

        async_stream::stream! {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last: Option<Tick> = None;

            loop {
                let due = tokio::select! {
                    biased;
                    () = cancel.cancelled() => false,
                    _ = ticker.tick() => true,
                };
                if !due {
                    break;
                }

                match client.symbol_tick(&symbol, &cancel).await {
                    Ok(tick) => {
                        if last.as_ref() != Some(&tick) {
                            last = Some(tick.clone());
                            yield Ok(tick);
                        }
                    }
                    Err(error) if error.is_cancelled() => break,
                    Err(error) => {
                        yield Err(error);
                        break;
                    }
                }
            }
        }
    }
}
