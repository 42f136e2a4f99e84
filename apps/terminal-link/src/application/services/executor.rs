//! Call Executors
//!
//! Retry wrappers around unary and server-push gateway calls. A call is
//! described once and attempted until it succeeds, fails fatally or is
//! cancelled. Recoverable failures (endpoint unavailable, remote session lost)
//! trigger a fixed pause and a session re-establishment before the next
//! attempt.
//!
//! # Streams
//!
//! [`CallExecutor::execute_stream`] presents one continuous sequence across
//! reconnects. Items already yielded are never replayed; the underlying
//! stream is dropped before every reconnect and whenever the consumer drops
//! the sequence.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::outcome::{CallOutcome, RetryClass};
use super::reconnect::ReconnectCoordinator;
use crate::application::ports::{GatewayError, RawReply, SessionHeaders};
use crate::domain::session::{SessionCell, SessionToken};
use crate::infrastructure::metrics;

/// Default pause before reconnecting after a recoverable failure.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Executor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Pause before each reconnect attempt.
    pub retry_delay: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// One unary call: how to invoke it and how to classify its result.
#[derive(Debug, Clone)]
pub struct CallDescriptor<F, C> {
    name: &'static str,
    invoke: F,
    classify: C,
}

impl<F, C> CallDescriptor<F, C> {
    /// Describe a call.
    pub const fn new<D, Fut>(name: &'static str, invoke: F, classify: C) -> Self
    where
        F: Fn(SessionHeaders) -> Fut,
        Fut: Future<Output = RawReply<D>>,
    {
        Self {
            name,
            invoke,
            classify,
        }
    }

    /// Call name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// One server-push call: opener, per-item classifier and data projector.
#[derive(Debug, Clone)]
pub struct StreamDescriptor<O, C, P> {
    name: &'static str,
    open: O,
    classify: C,
    project: P,
}

impl<O, C, P> StreamDescriptor<O, C, P> {
    /// Describe a stream.
    pub const fn new<S, OFut>(name: &'static str, open: O, classify: C, project: P) -> Self
    where
        O: FnMut(SessionHeaders) -> OFut,
        OFut: Future<Output = Result<S, tonic::Status>>,
    {
        Self {
            name,
            open,
            classify,
            project,
        }
    }

    /// Stream name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// How a pulled stream stopped producing items.
enum StreamBreak {
    Ended,
    Cancelled,
    Fatal(GatewayError),
    Reconnect(RetryClass),
}

// =============================================================================
// Executor
// =============================================================================

/// Runs call descriptors with reconnect-and-retry.
#[derive(Debug, Clone)]
pub struct CallExecutor {
    session: Arc<SessionCell>,
    coordinator: Arc<ReconnectCoordinator>,
    settings: ExecutorSettings,
}

impl CallExecutor {
    /// Create an executor over the coordinator's session.
    #[must_use]
    pub fn new(coordinator: Arc<ReconnectCoordinator>, settings: ExecutorSettings) -> Self {
        Self {
            session: Arc::clone(coordinator.session()),
            coordinator,
            settings,
        }
    }

    /// Executor settings.
    #[must_use]
    pub const fn settings(&self) -> ExecutorSettings {
        self.settings
    }

    /// Run a unary call until it succeeds, fails fatally or is cancelled.
    ///
    /// There is no attempt cap; only cancellation or a fatal outcome ends a
    /// call that keeps failing recoverably.
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
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }

            let token = self.session.token();
            let headers = SessionHeaders::new(token.clone());

            let reply = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(GatewayError::Cancelled),
                reply = (call.invoke)(headers) => reply,
            };

            let class = match (call.classify)(reply) {
                CallOutcome::Ok(value) => return Ok(value),
                CallOutcome::Fatal(error) => return Err(error),
                CallOutcome::RetryableTransport(_) => RetryClass::Transport,
                CallOutcome::RetryableSessionLost(_) => RetryClass::SessionLost,
            };

            attempt += 1;
            metrics::record_call_retry(class);
            warn!(
                call = call.name,
                attempt,
                class = class.as_str(),
                "Recoverable call failure, reconnecting"
            );

            self.recover(token.as_ref(), cancel).await?;
        }
    }

    /// Run a server-push call as one continuous sequence.
    ///
    /// The sequence ends cleanly when the server closes the stream, with one
    /// `Err(Cancelled)` when `cancel` fires, or with the fatal error of the
    /// item that caused it. Opener failures follow the transport rule:
    /// `UNAVAILABLE` reconnects, anything else is fatal.
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
        let executor = self.clone();
        let StreamDescriptor {
            name,
            mut open,
            classify,
            project,
        } = call;

        async_stream::stream! {
            let mut reopened = false;

            loop {
                let token = executor.session.token();
                let headers = SessionHeaders::new(token.clone());

                let opened = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    opened = open(headers) => Some(opened),
                };

                let stop = match opened {
                    None => StreamBreak::Cancelled,
                    Some(Err(status)) if status.code() == tonic::Code::Unavailable => {
                        StreamBreak::Reconnect(RetryClass::Transport)
                    }
                    Some(Err(status)) => StreamBreak::Fatal(GatewayError::Transport(status)),
                    Some(Ok(inner)) => {
                        if reopened {
                            metrics::record_stream_reopen();
                            debug!(stream = name, "Stream reopened");
                        }
                        let mut inner = Box::pin(inner);

                        let stop = loop {
                            let next = tokio::select! {
                                biased;
                                () = cancel.cancelled() => None,
                                item = inner.next() => Some(item),
                            };

                            let raw = match next {
                                None => break StreamBreak::Cancelled,
                                Some(None) => break StreamBreak::Ended,
                                Some(Some(raw)) => raw,
                            };

                            match classify(raw) {
                                CallOutcome::Ok(data) => {
                                    yield Ok(project(data));
                                }
                                CallOutcome::Fatal(error) => break StreamBreak::Fatal(error),
                                CallOutcome::RetryableTransport(_) => {
                                    break StreamBreak::Reconnect(RetryClass::Transport);
                                }
                                CallOutcome::RetryableSessionLost(_) => {
                                    break StreamBreak::Reconnect(RetryClass::SessionLost);
                                }
                            }
                        };

                        drop(inner);
                        stop
                    }
                };

                match stop {
                    StreamBreak::Ended => {
                        debug!(stream = name, "Stream closed by server");
                        break;
                    }
                    StreamBreak::Cancelled => {
                        yield Err(GatewayError::Cancelled);
                        break;
                    }
                    StreamBreak::Fatal(error) => {
                        yield Err(error);
                        break;
                    }
                    StreamBreak::Reconnect(class) => {
                        metrics::record_call_retry(class);
                        warn!(
                            stream = name,
                            class = class.as_str(),
                            "Stream interrupted, reconnecting"
                        );
                        if let Err(error) = executor.recover(token.as_ref(), &cancel).await {
                            yield Err(error);
                            break;
                        }
                        reopened = true;
                    }
                }
            }
        }
    }

    /// Pause, then re-establish the session; repeat while the reconnect
    /// itself fails recoverably.
    async fn recover(
        &self,
        stale: Option<&SessionToken>,
        cancel: &CancellationToken,
    ) -> Result<(), GatewayError> {
        loop {
            self.pause(cancel).await?;

            match self.coordinator.recover(stale, None, cancel).await {
                Ok(()) => return Ok(()),
                Err(error) if error.is_transient() => {
                    warn!(error = %error, "Reconnect failed, will retry");
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn pause(&self, cancel: &CancellationToken) -> Result<(), GatewayError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(GatewayError::Cancelled),
            () = tokio::time::sleep(self.settings.retry_delay) => Ok(()),
        }
    }
}
