//! Session Identity and State
//!
//! Types describing *which* remote logical session the client is attached to
//! (addressing mode, credentials, chart symbol context) and the opaque token
//! the gateway hands back on a successful connect.
//!
//! The [`SessionCell`] is the only piece of state shared between concurrent
//! callers. Writers replace the state wholesale under a write lock; readers
//! always receive a full snapshot.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Default chart symbol used to anchor the remote terminal session.
pub const DEFAULT_CHART_SYMBOL: &str = "EURUSD";

/// Default time the gateway may wait for the terminal to become ready.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while building session values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The gateway returned an empty session token.
    #[error("session token is empty")]
    EmptyToken,
    /// The token cannot travel as a request header.
    #[error("session token contains non-ASCII or control characters")]
    InvalidToken,
}

// =============================================================================
// Session Token
// =============================================================================

/// Opaque identifier of a remote logical session.
///
/// Only valid for the addressing/credentials pair that produced it. Cheap to
/// clone; the underlying string is shared.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(Arc<str>);

impl SessionToken {
    /// Create a token from the raw value returned by the gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty or cannot be sent as an ASCII
    /// metadata header.
    pub fn new(value: impl Into<String>) -> Result<Self, SessionError> {
        let value = value.into();
        if value.is_empty() {
            return Err(SessionError::EmptyToken);
        }
        if !value.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(SessionError::InvalidToken);
        }
        Ok(Self(Arc::from(value)))
    }

    /// Borrow the raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionToken").field(&"[REDACTED]").finish()
    }
}

// =============================================================================
// Addressing & Credentials
// =============================================================================

/// How the gateway locates the broker server for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Addressing {
    /// Connect to an explicit broker server endpoint.
    Direct {
        /// Broker server host name or IP.
        host: String,
        /// Broker server port.
        port: u16,
    },
    /// Resolve the broker server by its published cluster name.
    Cluster {
        /// Broker cluster name (e.g. `"Broker-Demo"`).
        name: String,
    },
}

impl Addressing {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn mode(&self) -> &'static str {
        match self {
            Self::Direct { .. } => "direct",
            Self::Cluster { .. } => "cluster",
        }
    }
}

impl fmt::Display for Addressing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { host, port } => write!(f, "{host}:{port}"),
            Self::Cluster { name } => write!(f, "cluster:{name}"),
        }
    }
}

/// Trading account credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    login: u64,
    password: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(login: u64, password: String) -> Self {
        Self { login, password }
    }

    /// Get the account login.
    #[must_use]
    pub const fn login(&self) -> u64 {
        self.login
    }

    /// Get the account password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Session Identity
// =============================================================================

/// Everything needed to (re)establish a remote logical session.
///
/// The identity survives reconnects unchanged; only the token is replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Addressing mode used for the last successful connect.
    pub addressing: Addressing,
    /// Account credentials.
    pub credentials: Credentials,
    /// Chart symbol the remote terminal is opened on.
    pub chart_symbol: String,
    /// How long the gateway may wait for the terminal to become ready.
    pub readiness_timeout: Duration,
}

impl SessionIdentity {
    /// Create an identity with the default chart symbol and readiness timeout.
    #[must_use]
    pub fn new(addressing: Addressing, credentials: Credentials) -> Self {
        Self {
            addressing,
            credentials,
            chart_symbol: DEFAULT_CHART_SYMBOL.to_string(),
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
        }
    }

    /// Set the chart symbol.
    #[must_use]
    pub fn with_chart_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.chart_symbol = symbol.into();
        self
    }

    /// Set the readiness timeout.
    #[must_use]
    pub const fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Snapshot of the current logical session.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    identity: Option<SessionIdentity>,
    token: Option<SessionToken>,
}

impl SessionState {
    /// Identity used by the last connect, if any.
    #[must_use]
    pub const fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    /// Current token, `None` when not connected.
    #[must_use]
    pub const fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    /// Whether a session token is held.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.token.is_some()
    }
}

/// Shared, atomically replaced session state.
#[derive(Debug, Default)]
pub struct SessionCell {
    state: RwLock<SessionState>,
}

impl SessionCell {
    /// Create an empty (never connected) cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Full copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.state.read().clone()
    }

    /// Current token, if connected.
    #[must_use]
    pub fn token(&self) -> Option<SessionToken> {
        self.state.read().token.clone()
    }

    /// Identity of the last connect, if any.
    #[must_use]
    pub fn identity(&self) -> Option<SessionIdentity> {
        self.state.read().identity.clone()
    }

    /// Whether a session token is held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.read().is_connected()
    }

    /// Replace identity and token in one write.
    pub fn establish(&self, identity: SessionIdentity, token: SessionToken) {
        *self.state.write() = SessionState {
            identity: Some(identity),
            token: Some(token),
        };
    }

    /// Drop the token, keeping the identity for later reconnects.
    ///
    /// Returns the token that was held.
    pub fn clear_token(&self) -> Option<SessionToken> {
        self.state.write().token.take()
    }

    /// Forget identity and token, as after an explicit disconnect.
    ///
    /// Returns the token that was held.
    pub fn reset(&self) -> Option<SessionToken> {
        std::mem::take(&mut *self.state.write()).token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> SessionIdentity {
        SessionIdentity::new(
            Addressing::Cluster {
                name: "Demo-Cluster".to_string(),
            },
            Credentials::new(5_001, "hunter2".to_string()),
        )
    }

    #[test]
    fn token_rejects_empty_and_non_ascii() {
        assert_eq!(SessionToken::new(""), Err(SessionError::EmptyToken));
        assert_eq!(SessionToken::new("abc déf"), Err(SessionError::InvalidToken));
        assert_eq!(SessionToken::new("abc\n"), Err(SessionError::InvalidToken));
        assert_eq!(SessionToken::new("a1-b2").unwrap().as_str(), "a1-b2");
    }

    #[test]
    fn token_and_credentials_are_redacted() {
        let token = SessionToken::new("secret-token").unwrap();
        assert!(!format!("{token:?}").contains("secret-token"));

        let creds = Credentials::new(42, "hunter2".to_string());
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("42"));
    }

    #[test]
    fn addressing_display_and_mode() {
        let direct = Addressing::Direct {
            host: "10.0.0.1".to_string(),
            port: 443,
        };
        assert_eq!(direct.to_string(), "10.0.0.1:443");
        assert_eq!(direct.mode(), "direct");

        let cluster = Addressing::Cluster {
            name: "Demo".to_string(),
        };
        assert_eq!(cluster.to_string(), "cluster:Demo");
        assert_eq!(cluster.mode(), "cluster");
    }

    #[test]
    fn identity_builder_defaults() {
        let id = identity();
        assert_eq!(id.chart_symbol, DEFAULT_CHART_SYMBOL);
        assert_eq!(id.readiness_timeout, DEFAULT_READINESS_TIMEOUT);

        let id = id
            .with_chart_symbol("XAUUSD")
            .with_readiness_timeout(Duration::from_secs(5));
        assert_eq!(id.chart_symbol, "XAUUSD");
        assert_eq!(id.readiness_timeout, Duration::from_secs(5));
    }

    #[test]
    fn cell_lifecycle() {
        let cell = SessionCell::new();
        assert!(!cell.is_connected());
        assert!(cell.identity().is_none());

        let token = SessionToken::new("t-1").unwrap();
        cell.establish(identity(), token.clone());
        assert!(cell.is_connected());
        assert_eq!(cell.token(), Some(token.clone()));

        assert_eq!(cell.clear_token(), Some(token));
        assert!(!cell.is_connected());
        // Identity survives so the session can be re-established.
        assert_eq!(cell.identity(), Some(identity()));
        assert!(cell.clear_token().is_none());

        let token = SessionToken::new("t-2").unwrap();
        cell.establish(identity(), token.clone());
        assert_eq!(cell.reset(), Some(token));
        assert!(cell.identity().is_none());
        assert!(!cell.snapshot().is_connected());
    }
}
