//! Error types for building the gateway channel.

use thiserror::Error;

/// Errors that can occur while preparing the gateway channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Transport error while configuring the channel.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message describing the configuration issue.
        message: String,
    },
}
