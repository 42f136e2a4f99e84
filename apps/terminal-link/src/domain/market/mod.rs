//! Market and Position Types
//!
//! Typed views of the gateway payloads the core consumes: price ticks,
//! open positions with their protective levels, and trade events.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Position Side
// =============================================================================

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    /// Bought; protective stop sits below price.
    Long,
    /// Sold; protective stop sits above price.
    Short,
}

impl PositionSide {
    /// Whether this is a long position.
    #[must_use]
    pub const fn is_long(self) -> bool {
        matches!(self, Self::Long)
    }

    /// Label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PositionSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(Self::Long),
            "short" | "sell" => Ok(Self::Short),
            other => Err(format!("unknown position side: {other}")),
        }
    }
}

// =============================================================================
// Tick
// =============================================================================

/// Latest quote for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument symbol.
    pub symbol: String,
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Last traded price.
    pub last: Decimal,
    /// Server time of the quote.
    pub time: DateTime<Utc>,
}

impl Tick {
    /// Price at which a position of `side` would be closed.
    ///
    /// Long positions exit at the bid, short positions at the ask.
    #[must_use]
    pub const fn exit_price(&self, side: PositionSide) -> Decimal {
        match side {
            PositionSide::Long => self.bid,
            PositionSide::Short => self.ask,
        }
    }
}

// =============================================================================
// Protective Level
// =============================================================================

/// Current stop-loss or take-profit of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "price", rename_all = "snake_case")]
pub enum ProtectiveLevel {
    /// A level is placed at this price.
    Set(Decimal),
    /// No level is placed.
    Unset,
    /// The level could not be read.
    Unavailable,
}

impl ProtectiveLevel {
    /// Interpret a raw gateway price, where zero means "not placed".
    #[must_use]
    pub fn from_raw(price: Decimal) -> Self {
        if price.is_zero() {
            Self::Unset
        } else {
            Self::Set(price)
        }
    }

    /// The placed price, if any.
    #[must_use]
    pub const fn price(self) -> Option<Decimal> {
        match self {
            Self::Set(price) => Some(price),
            Self::Unset | Self::Unavailable => None,
        }
    }
}

// =============================================================================
// Position
// =============================================================================

/// Open position as reported by the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Position ticket.
    pub ticket: u64,
    /// Instrument symbol.
    pub symbol: String,
    /// Direction.
    pub side: PositionSide,
    /// Open volume.
    pub volume: Decimal,
    /// Current stop loss.
    pub stop_loss: ProtectiveLevel,
    /// Current take profit.
    pub take_profit: ProtectiveLevel,
}

// =============================================================================
// Trade Events
// =============================================================================

/// What happened to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeEventKind {
    /// Position opened.
    Opened,
    /// Position levels or volume changed.
    Modified,
    /// Position closed.
    Closed,
    /// Any other trade transaction.
    Other,
}

/// Trade transaction pushed by the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Position ticket.
    pub ticket: u64,
    /// Instrument symbol.
    pub symbol: String,
    /// Event kind.
    pub kind: TradeEventKind,
    /// Server time of the event.
    pub time: DateTime<Utc>,
}
