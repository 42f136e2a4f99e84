//! Terminal Gateway Adapter
//!
//! tonic client for the `terminal.v1` gateway services with hand-declared
//! prost messages.

mod client;
mod config;
mod error;
pub mod messages;

pub use client::GrpcTerminal;
pub use config::{DEFAULT_GATEWAY_ENDPOINT, GatewayConfig};
pub use error::ChannelError;
