//! Gateway Errors
//!
//! Error taxonomy shared by every gateway-facing operation.
//!
//! | Class | Variant | Handling |
//! |-------|---------|----------|
//! | Transient-Transport | `Transport` with `UNAVAILABLE` | reconnect + retry |
//! | Transient-Session | `Remote` with a session-lost code | reconnect + retry |
//! | Fatal-Remote | other `Remote` / `Transport` | surfaced |
//! | Local-Validation | `Validation`, `Volume`, `NotConfigured` | surfaced, no I/O |
//! | Cancellation | `Cancelled`, `DeadlineExceeded` | surfaced |

use crate::domain::volume::VolumeError;

/// Remote code: the terminal instance behind the token no longer exists.
pub const TERMINAL_INSTANCE_NOT_FOUND: &str = "TERMINAL_INSTANCE_NOT_FOUND";

/// Remote code: the gateway registry has no terminal for the token.
pub const TERMINAL_REGISTRY_TERMINAL_NOT_FOUND: &str = "TERMINAL_REGISTRY_TERMINAL_NOT_FOUND";

/// Codes that mean the remote session is gone and must be re-established.
pub const SESSION_LOST_CODES: [&str; 2] = [
    TERMINAL_INSTANCE_NOT_FOUND,
    TERMINAL_REGISTRY_TERMINAL_NOT_FOUND,
];

/// Structured error carried inside a gateway reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl RemoteError {
    /// Create a remote error.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether this code means the remote session was lost.
    #[must_use]
    pub fn is_session_lost(&self) -> bool {
        SESSION_LOST_CODES.contains(&self.code.as_str())
    }
}

/// Error returned by gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::Status),

    /// Structured error returned by the gateway.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Volume could not be normalized.
    #[error("volume error: {0}")]
    Volume(#[from] VolumeError),

    /// Reconnect requested before any successful connect.
    #[error("session has never been connected")]
    NotConfigured,

    /// Operation cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Operation deadline elapsed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

impl GatewayError {
    /// Whether this is a cancellation outcome.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether a reconnect may recover from this error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(status) => status.code() == tonic::Code::Unavailable,
            Self::Remote(remote) => remote.is_session_lost(),
            _ => false,
        }
    }
}
