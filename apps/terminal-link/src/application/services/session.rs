//! Terminal Session
//!
//! Facade that owns the shared session state and every service built on it.
//! Strategies and the binary talk to this type only.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use rust_decimal::Decimal;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::backoff::{BackoffConfig, ConnectBackoff};
use super::client::TerminalClient;
use super::executor::{CallDescriptor, CallExecutor, ExecutorSettings, StreamDescriptor};
use super::outcome::CallOutcome;
use super::reconnect::{ReconnectCoordinator, bounded};
use super::trailing::{TrailingSettings, TrailingSupervisor};
use crate::application::ports::{
    GatewayError, RawReply, SessionConnector, SessionHeaders, TerminalPort,
};
use crate::domain::session::{SessionCell, SessionIdentity};
use crate::domain::trailing::TrailRequest;

/// Settings for every service owned by a session.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    /// Retry behaviour of the executors.
    pub executor: ExecutorSettings,
    /// Trailing-stop supervisor behaviour.
    pub trailing: TrailingSettings,
    /// Backoff for the initial connect wait.
    pub connect_backoff: BackoffConfig,
}

/// A resilient logical session with the remote terminal.
#[derive(Debug)]
pub struct TerminalSession {
    session: Arc<SessionCell>,
    coordinator: Arc<ReconnectCoordinator>,
    client: TerminalClient,
    supervisor: TrailingSupervisor,
    backoff: BackoffConfig,
    shutdown: CancellationToken,
}

impl TerminalSession {
    /// Wire a session from its gateway ports.
    #[must_use]
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        port: Arc<dyn TerminalPort>,
        settings: SessionSettings,
    ) -> Self {
        let session = Arc::new(SessionCell::new());
        let coordinator = Arc::new(ReconnectCoordinator::new(Arc::clone(&session), connector));
        let executor = CallExecutor::new(Arc::clone(&coordinator), settings.executor);
        let client = TerminalClient::new(port, executor);
        let supervisor = TrailingSupervisor::new(Arc::new(client.clone()), settings.trailing);

        Self {
            session,
            coordinator,
            client,
            supervisor,
            backoff: settings.connect_backoff,
            shutdown: CancellationToken::new(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connect with `identity`, replacing any current session.
    pub async fn connect(&self, identity: SessionIdentity) -> Result<(), GatewayError> {
        self.coordinator.connect(identity, &self.shutdown).await
    }

    /// Connect, retrying transient failures with backoff for up to `max_wait`.
    ///
    /// Non-transient failures (e.g. rejected credentials) are returned at once.
    pub async fn connect_with_retry(
        &self,
        identity: SessionIdentity,
        max_wait: Duration,
    ) -> Result<(), GatewayError> {
        let deadline = Instant::now() + max_wait;
        let mut backoff = ConnectBackoff::new(self.backoff.clone());

        loop {
            let attempt = bounded(
                self.coordinator.connect(identity.clone(), &self.shutdown),
                Some(deadline),
                &self.shutdown,
            )
            .await;

            match attempt {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => {
                    let delay = backoff.next_delay();
                    warn!(
                        attempt = backoff.attempts(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Terminal not reachable yet, retrying connect"
                    );
                    bounded(
                        async {
                            tokio::time::sleep(delay).await;
                            Ok::<(), GatewayError>(())
                        },
                        Some(deadline),
                        &self.shutdown,
                    )
                    .await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Re-establish the session with the last identity.
    pub async fn reconnect(&self, deadline: Option<Instant>) -> Result<(), GatewayError> {
        self.coordinator.reconnect(deadline, &self.shutdown).await
    }

    /// Close the session; later calls fail until the next `connect`.
    pub async fn disconnect(&self) -> Result<(), GatewayError> {
        self.coordinator.disconnect().await
    }

    /// Whether a session token is held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Stop every worker, cancel in-flight work and close the session.
    pub async fn shutdown(&self) {
        info!("Shutting down terminal session");
        self.supervisor.stop_all().await;
        self.shutdown.cancel();
        if let Err(e) = self.disconnect().await {
            warn!(error = %e, "Error while closing terminal session");
        }
    }

    /// Token cancelled by [`Self::shutdown`].
    #[must_use]
    pub const fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Typed terminal operations.
    #[must_use]
    pub const fn client(&self) -> &TerminalClient {
        &self.client
    }

    /// Run a caller-described unary call with reconnect-and-retry.
    pub async fn execute_unary<T, D, F, Fut, C>(
        &self,
        call: CallDescriptor<F, C>,
        cancel: &CancellationToken,
    ) -> Result<T, GatewayError>
    where
        F: Fn(SessionHeaders) -> Fut,
        Fut: Future<Output = RawReply<D>>,
        C: Fn(RawReply<D>) -> CallOutcome<T>,
    {
        self.client.executor().execute_unary(call, cancel).await
    }

    /// Run a caller-described server-push call with reconnect-and-retry.
    pub fn execute_stream<T, D, S, O, OFut, C, P>(
        &self,
        call: StreamDescriptor<O, C, P>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<T, GatewayError>> + Send + 'static
    where
        T: Send + 'static,
        D: Send + 'static,
        S: Stream<Item = RawReply<D>> + Send + 'static,
        O: FnMut(SessionHeaders) -> OFut + Send + 'static,
        OFut: Future<Output = Result<S, tonic::Status>> + Send + 'static,
        C: Fn(RawReply<D>) -> CallOutcome<D> + Send + 'static,
        P: Fn(D) -> T + Send + 'static,
    {
        self.client.executor().execute_stream(call, cancel)
    }

    /// Snap `requested` onto `symbol`'s volume lattice.
    pub async fn normalize_volume(
        &self,
        symbol: &str,
        requested: Decimal,
    ) -> Result<Decimal, GatewayError> {
        self.client
            .normalize_volume(symbol, requested, &self.shutdown)
            .await
    }

    // =========================================================================
    // Trailing
    // =========================================================================

    /// Start (or replace) the trailing worker for `request.ticket`.
    pub async fn start_trailing(
        &self,
        request: TrailRequest,
    ) -> Result<CancellationToken, GatewayError> {
        self.supervisor.start(request, &self.shutdown).await
    }

    /// Stop the trailing worker for `ticket`; no-op if there is none.
    pub async fn stop_trailing(&self, ticket: u64) -> bool {
        self.supervisor.stop(ticket).await
    }

    /// Trailing-stop supervisor.
    #[must_use]
    pub const fn supervisor(&self) -> &TrailingSupervisor {
        &self.supervisor
    }
}
