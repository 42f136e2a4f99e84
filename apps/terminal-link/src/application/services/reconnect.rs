//! Reconnect Coordinator
//!
//! Knows *how* to (re)establish the logical session, never *when*. Retry
//! timing belongs to the executors.
//!
//! Re-establishing a session:
//! 1. Read the identity of the last successful connect.
//! 2. Clear the token and release it with a best-effort disconnect.
//! 3. Connect again with the same addressing, chart symbol and readiness
//!    timeout, then publish the new token.
//!
//! Concurrent recoveries for the same stale token collapse into one connect.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::ports::{GatewayError, SessionConnector};
use crate::domain::session::{SessionCell, SessionIdentity, SessionToken};
use crate::infrastructure::metrics;

/// Re-establishes the logical session on demand.
pub struct ReconnectCoordinator {
    session: Arc<SessionCell>,
    connector: Arc<dyn SessionConnector>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for ReconnectCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectCoordinator")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl ReconnectCoordinator {
    /// Create a coordinator over the shared session cell.
    #[must_use]
    pub fn new(session: Arc<SessionCell>, connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            session,
            connector,
            lock: Mutex::new(()),
        }
    }

    /// Shared session state.
    #[must_use]
    pub const fn session(&self) -> &Arc<SessionCell> {
        &self.session
    }

    /// Initial connect with a new identity.
    ///
    /// Any previously held session is released first.
    pub async fn connect(
        &self,
        identity: SessionIdentity,
        cancel: &CancellationToken,
    ) -> Result<(), GatewayError> {
        let _guard = self.lock.lock().await;

        if let Some(old) = self.session.clear_token() {
            self.release(&old).await;
        }

        let token = bounded(self.connector.connect(&identity), None, cancel).await?;
        info!(
            addressing = %identity.addressing,
            mode = identity.addressing.mode(),
            chart_symbol = %identity.chart_symbol,
            "Terminal session established"
        );
        self.session.establish(identity, token);
        Ok(())
    }

    /// Explicitly end the session.
    ///
    /// Clears identity and token so later calls cannot silently reconnect.
    pub async fn disconnect(&self) -> Result<(), GatewayError> {
        let _guard = self.lock.lock().await;

        let Some(token) = self.session.reset() else {
            return Ok(());
        };
        self.connector.disconnect(&token).await?;
        info!("Terminal session closed");
        Ok(())
    }

    /// Tear down and re-establish the session with the last identity.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::NotConfigured`] if there was never a successful connect
    /// - [`GatewayError::DeadlineExceeded`] if `deadline` passes first
    /// - [`GatewayError::Cancelled`] if `cancel` fires first
    /// - the connector's error otherwise
    pub async fn reconnect(
        &self,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<(), GatewayError> {
        let _guard = self.lock.lock().await;
        self.reestablish(deadline, cancel).await
    }

    /// Reconnect unless another caller already replaced `stale`.
    pub(crate) async fn recover(
        &self,
        stale: Option<&SessionToken>,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<(), GatewayError> {
        let _guard = bounded(
            async { Ok::<_, GatewayError>(self.lock.lock().await) },
            deadline,
            cancel,
        )
        .await?;

        let current = self.session.token();
        if current.is_some() && current.as_ref() != stale {
            debug!("Session already re-established by another caller");
            return Ok(());
        }

        self.reestablish(deadline, cancel).await
    }

    async fn reestablish(
        &self,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<(), GatewayError> {
        let identity = self.session.identity().ok_or(GatewayError::NotConfigured)?;

        if let Some(old) = self.session.clear_token() {
            bounded(
                async {
                    self.release(&old).await;
                    Ok::<(), GatewayError>(())
                },
                deadline,
                cancel,
            )
            .await?;
        }

        match bounded(self.connector.connect(&identity), deadline, cancel).await {
            Ok(token) => {
                self.session.establish(identity.clone(), token);
                metrics::record_reconnect();
                info!(
                    addressing = %identity.addressing,
                    mode = identity.addressing.mode(),
                    "Terminal session re-established"
                );
                Ok(())
            }
            Err(e) => {
                if !e.is_cancelled() {
                    metrics::record_reconnect_failure();
                    warn!(
                        addressing = %identity.addressing,
                        error = %e,
                        "Failed to re-establish terminal session"
                    );
                }
                Err(e)
            }
        }
    }

    async fn release(&self, token: &SessionToken) {
        if let Err(e) = self.connector.disconnect(token).await {
            debug!(error = %e, "Ignoring error while releasing stale session");
        }
    }
}

/// Race `fut` against cancellation and an optional deadline.
pub(crate) async fn bounded<T, F>(
    fut: F,
    deadline: Option<Instant>,
    cancel: &CancellationToken,
) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    let expiry = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(GatewayError::Cancelled),
        () = expiry => Err(GatewayError::DeadlineExceeded),
        result = fut => result,
    }
}
