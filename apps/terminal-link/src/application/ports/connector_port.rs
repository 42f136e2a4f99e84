//! Session Connector Port (Driven Port)
//!
//! Opens and closes remote logical sessions.

use async_trait::async_trait;

use super::error::GatewayError;
use crate::domain::session::{SessionIdentity, SessionToken};

/// Establishes remote logical sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Connect using the identity's addressing mode and return the new token.
    async fn connect(&self, identity: &SessionIdentity) -> Result<SessionToken, GatewayError>;

    /// Release a session.
    async fn disconnect(&self, token: &SessionToken) -> Result<(), GatewayError>;
}
