//! Gateway Wire Messages
//!
//! Prost message declarations for the `terminal.v1` gateway services and
//! their conversion into domain types. Every reply carries `data` (tag 1)
//! and `error` (tag 2); a non-empty `error.error_code` wins over `data`.

use chrono::{DateTime, Utc};
use prost_types::Timestamp;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use tonic::Status;

use crate::application::ports::{RawReply, RemoteError};
use crate::domain::market::{
    PositionSide, PositionSnapshot, ProtectiveLevel, Tick, TradeEvent, TradeEventKind,
};
use crate::domain::volume::VolumeConstraint;

// =============================================================================
// Shared
// =============================================================================

/// Structured gateway error.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ErrorDetail {
    /// Machine-readable code.
    #[prost(string, tag = "1")]
    pub error_code: String,
    /// Human-readable message.
    #[prost(string, tag = "2")]
    pub message: String,
}

/// Position direction on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PositionType {
    /// Long.
    Buy = 0,
    /// Short.
    Sell = 1,
}

/// Trade transaction kind on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum TradeKind {
    /// Unclassified transaction.
    Unspecified = 0,
    /// Position opened.
    PositionOpened = 1,
    /// Position modified.
    PositionModified = 2,
    /// Position closed.
    PositionClosed = 3,
}

// =============================================================================
// Connection
// =============================================================================

/// Connect to an explicit broker server.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ConnectRequest {
    /// Account login.
    #[prost(uint64, tag = "1")]
    pub user: u64,
    /// Account password.
    #[prost(string, tag = "2")]
    pub password: String,
    /// Broker server host.
    #[prost(string, tag = "3")]
    pub host: String,
    /// Broker server port.
    #[prost(uint32, tag = "4")]
    pub port: u32,
    /// Chart symbol the terminal is opened on.
    #[prost(string, tag = "5")]
    pub base_chart_symbol: String,
    /// Seconds the gateway may wait for terminal readiness.
    #[prost(uint32, tag = "6")]
    pub wait_timeout_seconds: u32,
}

/// Connect to a broker server resolved by cluster name.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ConnectExRequest {
    /// Account login.
    #[prost(uint64, tag = "1")]
    pub user: u64,
    /// Account password.
    #[prost(string, tag = "2")]
    pub password: String,
    /// Broker cluster name.
    #[prost(string, tag = "3")]
    pub cluster_name: String,
    /// Chart symbol the terminal is opened on.
    #[prost(string, tag = "4")]
    pub base_chart_symbol: String,
    /// Seconds the gateway may wait for terminal readiness.
    #[prost(uint32, tag = "5")]
    pub wait_timeout_seconds: u32,
}

/// Connect payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ConnectData {
    /// New session token.
    #[prost(string, tag = "1")]
    pub session_id: String,
}

/// Connect reply.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ConnectReply {
    /// Payload.
    #[prost(message, optional, tag = "1")]
    pub data: Option<ConnectData>,
    /// Error.
    #[prost(message, optional, tag = "2")]
    pub error: Option<ErrorDetail>,
}

/// Release the session named in the request metadata.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DisconnectRequest {}

/// Disconnect reply.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DisconnectReply {
    /// Whether the session was released.
    #[prost(bool, tag = "1")]
    pub data: bool,
    /// Error.
    #[prost(message, optional, tag = "2")]
    pub error: Option<ErrorDetail>,
}

// =============================================================================
// Market Info
// =============================================================================

/// Request scoped to one symbol.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SymbolRequest {
    /// Instrument symbol.
    #[prost(string, tag = "1")]
    pub symbol: String,
}

/// Quote payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TickData {
    /// Instrument symbol.
    #[prost(string, tag = "1")]
    pub symbol: String,
    /// Best bid.
    #[prost(double, tag = "2")]
    pub bid: f64,
    /// Best ask.
    #[prost(double, tag = "3")]
    pub ask: f64,
    /// Last traded price.
    #[prost(double, tag = "4")]
    pub last: f64,
    /// Server time.
    #[prost(message, optional, tag = "5")]
    pub time: Option<Timestamp>,
}

/// Tick reply.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TickReply {
    /// Payload.
    #[prost(message, optional, tag = "1")]
    pub data: Option<TickData>,
    /// Error.
    #[prost(message, optional, tag = "2")]
    pub error: Option<ErrorDetail>,
}

/// Volume lattice payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct VolumeData {
    /// Minimum volume.
    #[prost(double, tag = "1")]
    pub volume_min: f64,
    /// Volume step.
    #[prost(double, tag = "2")]
    pub volume_step: f64,
    /// Maximum volume.
    #[prost(double, tag = "3")]
    pub volume_max: f64,
}

/// Volume reply.
#[derive(Clone, PartialEq, prost::Message)]
pub struct VolumeReply {
    /// Payload.
    #[prost(message, optional, tag = "1")]
    pub data: Option<VolumeData>,
    /// Error.
    #[prost(message, optional, tag = "2")]
    pub error: Option<ErrorDetail>,
}

// =============================================================================
// Trading
// =============================================================================

/// Request scoped to one position.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PositionRequest {
    /// Position ticket.
    #[prost(uint64, tag = "1")]
    pub ticket: u64,
}

/// Position payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PositionData {
    /// Position ticket.
    #[prost(uint64, tag = "1")]
    pub ticket: u64,
    /// Instrument symbol.
    #[prost(string, tag = "2")]
    pub symbol: String,
    /// Direction.
    #[prost(enumeration = "PositionType", tag = "3")]
    pub r#type: i32,
    /// Open volume.
    #[prost(double, tag = "4")]
    pub volume: f64,
    /// Stop loss, zero when not placed.
    #[prost(double, tag = "5")]
    pub stop_loss: f64,
    /// Take profit, zero when not placed.
    #[prost(double, tag = "6")]
    pub take_profit: f64,
}

/// Position reply.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PositionReply {
    /// Payload.
    #[prost(message, optional, tag = "1")]
    pub data: Option<PositionData>,
    /// Error.
    #[prost(message, optional, tag = "2")]
    pub error: Option<ErrorDetail>,
}

/// Change a position's protective levels; absent fields stay unchanged.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PositionModifyRequest {
    /// Position ticket.
    #[prost(uint64, tag = "1")]
    pub ticket: u64,
    /// New stop loss.
    #[prost(double, optional, tag = "2")]
    pub stop_loss: Option<f64>,
    /// New take profit.
    #[prost(double, optional, tag = "3")]
    pub take_profit: Option<f64>,
}

/// Modify payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ModifyData {
    /// Trade server return code.
    #[prost(uint32, tag = "1")]
    pub retcode: u32,
    /// Trade server comment.
    #[prost(string, tag = "2")]
    pub comment: String,
}

/// Modify reply.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ModifyReply {
    /// Payload.
    #[prost(message, optional, tag = "1")]
    pub data: Option<ModifyData>,
    /// Error.
    #[prost(message, optional, tag = "2")]
    pub error: Option<ErrorDetail>,
}

/// Trade server return codes for a request that was carried out.
pub const TRADE_SUCCESS_RETCODES: [u32; 3] = [10008, 10009, 10010];

impl ModifyData {
    /// Whether the trade server carried out the change.
    #[must_use]
    pub fn is_success(&self) -> bool {
        TRADE_SUCCESS_RETCODES.contains(&self.retcode)
    }

    /// Machine-readable code for the return code.
    #[must_use]
    pub fn code(&self) -> String {
        let name = match self.retcode {
            10004 => "REQUOTE",
            10006 => "REJECT",
            10007 => "CANCEL",
            10013 => "INVALID",
            10016 => "INVALID_STOPS",
            10017 => "TRADE_DISABLED",
            10018 => "MARKET_CLOSED",
            10021 => "PRICE_OFF",
            10025 => "NO_CHANGES",
            10026 => "SERVER_DISABLES_AT",
            10027 => "CLIENT_DISABLES_AT",
            10029 => "FROZEN",
            10036 => "POSITION_CLOSED",
            other => return format!("TRADE_RETCODE_{other}"),
        };
        format!("TRADE_RETCODE_{name}")
    }
}

/// Fold a modify reply; a rejecting return code becomes a remote error.
pub fn modify_reply(reply: ModifyReply) -> RawReply<()> {
    Ok(into_reply(reply.data, reply.error, Ok)?.and_then(|data| {
        if data.is_success() {
            Ok(())
        } else {
            Err(RemoteError::new(data.code(), data.comment))
        }
    }))
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Subscribe to ticks for a set of symbols.
#[derive(Clone, PartialEq, prost::Message)]
pub struct OnSymbolTickRequest {
    /// Instrument symbols.
    #[prost(string, repeated, tag = "1")]
    pub symbols: Vec<String>,
}

/// Pushed tick.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TickEventReply {
    /// Payload.
    #[prost(message, optional, tag = "1")]
    pub data: Option<TickData>,
    /// Error.
    #[prost(message, optional, tag = "2")]
    pub error: Option<ErrorDetail>,
}

/// Subscribe to trade transactions.
#[derive(Clone, PartialEq, prost::Message)]
pub struct OnTradeRequest {}

/// Trade transaction payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TradeEventData {
    /// Position ticket.
    #[prost(uint64, tag = "1")]
    pub ticket: u64,
    /// Instrument symbol.
    #[prost(string, tag = "2")]
    pub symbol: String,
    /// Transaction kind.
    #[prost(enumeration = "TradeKind", tag = "3")]
    pub kind: i32,
    /// Server time.
    #[prost(message, optional, tag = "4")]
    pub time: Option<Timestamp>,
}

/// Pushed trade transaction.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TradeEventReply {
    /// Payload.
    #[prost(message, optional, tag = "1")]
    pub data: Option<TradeEventData>,
    /// Error.
    #[prost(message, optional, tag = "2")]
    pub error: Option<ErrorDetail>,
}

// =============================================================================
// Mapping
// =============================================================================

/// Fold a `data`/`error` pair into a raw reply.
pub fn into_reply<D, T>(
    data: Option<D>,
    error: Option<ErrorDetail>,
    map: impl FnOnce(D) -> Result<T, Status>,
) -> RawReply<T> {
    if let Some(error) = error.filter(|e| !e.error_code.is_empty()) {
        return Ok(Err(RemoteError::new(error.error_code, error.message)));
    }
    match data {
        Some(data) => map(data).map(Ok),
        None => Err(Status::internal("gateway reply carried neither data nor error")),
    }
}

/// Convert a wire price or volume.
pub fn decimal(value: f64, field: &'static str) -> Result<Decimal, Status> {
    Decimal::from_f64(value)
        .map(|d| d.normalize())
        .ok_or_else(|| Status::internal(format!("{field} is not a finite decimal: {value}")))
}

/// Convert a price for the wire.
pub fn wire_price(value: Decimal) -> Result<f64, Status> {
    value
        .to_f64()
        .ok_or_else(|| Status::invalid_argument(format!("price {value} is out of range")))
}

fn timestamp(time: Option<Timestamp>) -> DateTime<Utc> {
    time.and_then(|t| {
        let nanos = u32::try_from(t.nanos).ok()?;
        DateTime::from_timestamp(t.seconds, nanos)
    })
    .unwrap_or_default()
}

impl TryFrom<TickData> for Tick {
    type Error = Status;

    fn try_from(data: TickData) -> Result<Self, Self::Error> {
        Ok(Self {
            bid: decimal(data.bid, "bid")?,
            ask: decimal(data.ask, "ask")?,
            last: decimal(data.last, "last")?,
            time: timestamp(data.time),
            symbol: data.symbol,
        })
    }
}

impl TryFrom<VolumeData> for VolumeConstraint {
    type Error = Status;

    fn try_from(data: VolumeData) -> Result<Self, Self::Error> {
        Ok(Self::new(
            decimal(data.volume_min, "volume_min")?,
            decimal(data.volume_step, "volume_step")?,
            decimal(data.volume_max, "volume_max")?,
        ))
    }
}

impl TryFrom<PositionData> for PositionSnapshot {
    type Error = Status;

    fn try_from(data: PositionData) -> Result<Self, Self::Error> {
        let side = match PositionType::try_from(data.r#type) {
            Ok(PositionType::Buy) => PositionSide::Long,
            Ok(PositionType::Sell) => PositionSide::Short,
            Err(_) => {
                return Err(Status::internal(format!(
                    "unknown position type {}",
                    data.r#type
                )));
            }
        };

        Ok(Self {
            ticket: data.ticket,
            side,
            volume: decimal(data.volume, "volume")?,
            stop_loss: decimal(data.stop_loss, "stop_loss")
                .map_or(ProtectiveLevel::Unavailable, ProtectiveLevel::from_raw),
            take_profit: decimal(data.take_profit, "take_profit")
                .map_or(ProtectiveLevel::Unavailable, ProtectiveLevel::from_raw),
            symbol: data.symbol,
        })
    }
}

impl From<TradeEventData> for TradeEvent {
    fn from(data: TradeEventData) -> Self {
        let kind = match TradeKind::try_from(data.kind) {
            Ok(TradeKind::PositionOpened) => TradeEventKind::Opened,
            Ok(TradeKind::PositionModified) => TradeEventKind::Modified,
            Ok(TradeKind::PositionClosed) => TradeEventKind::Closed,
            Ok(TradeKind::Unspecified) | Err(_) => TradeEventKind::Other,
        };

        Self {
            ticket: data.ticket,
            symbol: data.symbol,
            kind,
            time: timestamp(data.time),
        }
    }
}
