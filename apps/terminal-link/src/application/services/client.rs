//! Terminal Client
//!
//! Typed terminal operations with reconnect-and-retry. Each method describes
//! one raw [`TerminalPort`] call and hands it to the [`CallExecutor`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use super::executor::{CallDescriptor, CallExecutor, StreamDescriptor};
use super::outcome::classify_reply;
use super::tick_poller::TickPoller;
use crate::application::ports::{
    GatewayError, PositionModify, PriceSource, PriceStream, SessionHeaders, TerminalPort,
    TrailingPort,
};
use crate::domain::market::{PositionSnapshot, ProtectiveLevel, Tick, TradeEvent};
use crate::domain::volume::{VolumeConstraint, VolumeError};

/// Retried, typed access to the terminal.
#[derive(Clone)]
pub struct TerminalClient {
    port: Arc<dyn TerminalPort>,
    executor: CallExecutor,
}

impl std::fmt::Debug for TerminalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalClient")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl TerminalClient {
    /// Create a client over a raw port.
    #[must_use]
    pub fn new(port: Arc<dyn TerminalPort>, executor: CallExecutor) -> Self {
        Self { port, executor }
    }

    /// The executor this client runs calls on.
    #[must_use]
    pub const fn executor(&self) -> &CallExecutor {
        &self.executor
    }

    /// Latest tick for `symbol`.
    pub async fn symbol_tick(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<Tick, GatewayError> {
        let port = &self.port;
        let call = CallDescriptor::new(
            "symbol_tick",
            move |headers| port.symbol_tick(headers, symbol),
            classify_reply,
        );
        self.executor.execute_unary(call, cancel).await
    }

    /// Volume lattice for `symbol`.
    pub async fn volume_constraint(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<VolumeConstraint, GatewayError> {
        let port = &self.port;
        let call = CallDescriptor::new(
            "symbol_volume",
            move |headers| port.symbol_volume(headers, symbol),
            classify_reply,
        );
        self.executor.execute_unary(call, cancel).await
    }

    /// Open position by ticket.
    pub async fn position(
        &self,
        ticket: u64,
        cancel: &CancellationToken,
    ) -> Result<PositionSnapshot, GatewayError> {
        let port = &self.port;
        let call = CallDescriptor::new(
            "position_get",
            move |headers| port.position(headers, ticket),
            classify_reply,
        );
        self.executor.execute_unary(call, cancel).await
    }

    /// Move a position's stop loss, leaving take profit untouched.
    pub async fn modify_position_stop(
        &self,
        ticket: u64,
        stop_loss: Decimal,
        cancel: &CancellationToken,
    ) -> Result<(), GatewayError> {
        let port = &self.port;
        let change = PositionModify {
            ticket,
            stop_loss: Some(stop_loss),
            take_profit: None,
        };
        let call = CallDescriptor::new(
            "position_modify",
            move |headers| port.modify_position(headers, change),
            classify_reply,
        );
        self.executor.execute_unary(call, cancel).await
    }

    /// Snap `requested` onto the symbol's volume lattice.
    ///
    /// Non-positive requests fail before any network interaction.
    pub async fn normalize_volume(
        &self,
        symbol: &str,
        requested: Decimal,
        cancel: &CancellationToken,
    ) -> Result<Decimal, GatewayError> {
        if requested <= Decimal::ZERO {
            return Err(VolumeError::NonPositiveRequest(requested).into());
        }
        let constraint = self.volume_constraint(symbol, cancel).await?;
        Ok(constraint.normalize(requested)?)
    }

    /// Pushed ticks for `symbols`, surviving reconnects.
    pub fn stream_ticks(
        &self,
        symbols: Vec<String>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<Tick, GatewayError>> + Send + 'static {
        let port = Arc::clone(&self.port);
        let open = move |headers: SessionHeaders| {
            let port = Arc::clone(&port);
            let symbols = symbols.clone();
            async move { port.subscribe_ticks(headers, symbols).await }
        };
        self.executor.execute_stream(
            StreamDescriptor::new("on_symbol_tick", open, classify_reply, std::convert::identity),
            cancel,
        )
    }

    /// Pushed trade events, surviving reconnects.
    pub fn stream_trade_events(
        &self,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<TradeEvent, GatewayError>> + Send + 'static {
        let port = Arc::clone(&self.port);
        let open = move |headers: SessionHeaders| {
            let port = Arc::clone(&port);
            async move { port.subscribe_trades(headers).await }
        };
        self.executor.execute_stream(
            StreamDescriptor::new("on_trade", open, classify_reply, std::convert::identity),
            cancel,
        )
    }
}

#[async_trait]
impl TrailingPort for TerminalClient {
    fn price_updates(
        &self,
        symbol: &str,
        source: PriceSource,
        cancel: &CancellationToken,
    ) -> PriceStream {
        match source {
            PriceSource::Poll { interval } => Box::pin(
                TickPoller::new(self.clone(), interval).ticks(symbol.to_string(), cancel.clone()),
            ),
            PriceSource::Push => {
                Box::pin(self.stream_ticks(vec![symbol.to_string()], cancel.clone()))
            }
        }
    }

    async fn stop_loss(
        &self,
        ticket: u64,
        cancel: &CancellationToken,
    ) -> Result<ProtectiveLevel, GatewayError> {
        Ok(self.position(ticket, cancel).await?.stop_loss)
    }

    async fn apply_stop(
        &self,
        ticket: u64,
        stop_loss: Decimal,
        cancel: &CancellationToken,
    ) -> Result<(), GatewayError> {
        self.modify_position_stop(ticket, stop_loss, cancel).await
    }
}
