//! Terminal Port (Driven Port)
//!
//! Raw, non-retrying access to the remote terminal gateway. Every operation
//! takes the session headers for one attempt and returns the untouched
//! outcome so the executors can classify it.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use rust_decimal::Decimal;
use tonic::Status;
use tonic::metadata::MetadataValue;

use super::error::RemoteError;
use crate::domain::market::{PositionSnapshot, Tick, TradeEvent};
use crate::domain::session::SessionToken;
use crate::domain::volume::VolumeConstraint;

/// Metadata key carrying the session token.
pub const SESSION_HEADER: &str = "id";

/// Reply payload or the structured error the gateway put in its place.
pub type RemoteReply<T> = Result<T, RemoteError>;

/// Outcome of one raw gateway attempt.
pub type RawReply<T> = Result<RemoteReply<T>, Status>;

/// Server-push stream of raw replies.
pub type RemoteStream<T> = Pin<Box<dyn Stream<Item = RawReply<T>> + Send>>;

/// Session metadata attached to one call attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionHeaders {
    token: Option<SessionToken>,
}

impl SessionHeaders {
    /// Headers for the given token snapshot.
    #[must_use]
    pub const fn new(token: Option<SessionToken>) -> Self {
        Self { token }
    }

    /// Token snapshot, `None` when not connected.
    #[must_use]
    pub const fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    /// Wrap `message` in a request carrying the session header.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_ARGUMENT` if the token cannot be encoded as metadata.
    pub fn into_request<M>(self, message: M) -> Result<tonic::Request<M>, Status> {
        let mut request = tonic::Request::new(message);
        if let Some(token) = self.token {
            let value = MetadataValue::try_from(token.as_str())
                .map_err(|e| Status::invalid_argument(format!("invalid session header: {e}")))?;
            request.metadata_mut().insert(SESSION_HEADER, value);
        }
        Ok(request)
    }
}

/// Requested change of a position's protective levels.
///
/// `None` leaves the corresponding level untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionModify {
    /// Position ticket.
    pub ticket: u64,
    /// New stop loss.
    pub stop_loss: Option<Decimal>,
    /// New take profit.
    pub take_profit: Option<Decimal>,
}

/// Raw terminal operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TerminalPort: Send + Sync {
    /// Latest tick for `symbol`.
    async fn symbol_tick(&self, headers: SessionHeaders, symbol: &str) -> RawReply<Tick>;

    /// Volume lattice for `symbol`.
    async fn symbol_volume(
        &self,
        headers: SessionHeaders,
        symbol: &str,
    ) -> RawReply<VolumeConstraint>;

    /// Open position by ticket.
    async fn position(&self, headers: SessionHeaders, ticket: u64) -> RawReply<PositionSnapshot>;

    /// Change a position's protective levels.
    async fn modify_position(&self, headers: SessionHeaders, change: PositionModify)
    -> RawReply<()>;

    /// Open a tick subscription for `symbols`.
    async fn subscribe_ticks(
        &self,
        headers: SessionHeaders,
        symbols: Vec<String>,
    ) -> Result<RemoteStream<Tick>, Status>;

    /// Open a trade event subscription.
    async fn subscribe_trades(
        &self,
        headers: SessionHeaders,
    ) -> Result<RemoteStream<TradeEvent>, Status>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_set_session_metadata() {
        let token = SessionToken::new("tok-123").unwrap();
        let request = SessionHeaders::new(Some(token)).into_request(()).unwrap();
        assert_eq!(
            request.metadata().get(SESSION_HEADER).unwrap().to_str().unwrap(),
            "tok-123"
        );
    }

    #[test]
    fn empty_headers_leave_metadata_untouched() {
        let request = SessionHeaders::default().into_request(()).unwrap();
        assert!(request.metadata().get(SESSION_HEADER).is_none());
    }
}
