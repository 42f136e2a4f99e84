//! Application Ports (Driven)
//!
//! Interfaces the services use to reach the remote terminal gateway.
//! - **`SessionConnector`**: opens and closes logical sessions
//! - **`TerminalPort`**: raw, single-attempt terminal operations
//! - **`TrailingPort`**: retried operations a trailing worker depends on

mod connector_port;
mod error;
mod terminal_port;
mod trailing_port;

pub use connector_port::SessionConnector;
pub use error::{
    GatewayError, RemoteError, SESSION_LOST_CODES, TERMINAL_INSTANCE_NOT_FOUND,
    TERMINAL_REGISTRY_TERMINAL_NOT_FOUND,
};
pub use terminal_port::{
    PositionModify, RawReply, RemoteReply, RemoteStream, SESSION_HEADER, SessionHeaders,
    TerminalPort,
};
#[cfg(test)]
pub use connector_port::MockSessionConnector;
#[cfg(test)]
pub use terminal_port::MockTerminalPort;
#[cfg(test)]
pub use trailing_port::MockTrailingPort;
pub use trailing_port::{DEFAULT_POLL_INTERVAL, PriceSource, PriceStream, TrailingPort};
