//! Trailing-Stop Supervisor
//!
//! Owns zero or one background worker per position ticket. Each worker
//! follows a price feed, derives a stop candidate and moves the position's
//! stop loss when the [`TrailGate`] allows it.
//!
//! # Registry
//!
//! Workers live in a single map keyed by ticket. Every entry carries a
//! generation id; a worker's drop guard removes the entry only if the id
//! still matches, so a superseded worker never removes its successor.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::application::ports::{GatewayError, PriceSource, TrailingPort};
use crate::domain::trailing::{
    DEFAULT_MIN_APPLY_INTERVAL, GateDecision, TrailGate, TrailRequest, TrailState,
};
use crate::infrastructure::metrics;

/// Default number of consecutive apply failures before a worker gives up.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 20;

/// Supervisor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingSettings {
    /// Minimum time between two applied stop changes.
    pub min_apply_interval: Duration,
    /// Consecutive apply failures before the worker stops (0 = unlimited).
    pub max_consecutive_failures: u32,
    /// Price feed used by workers.
    pub price_source: PriceSource,
}

impl Default for TrailingSettings {
    fn default() -> Self {
        Self {
            min_apply_interval: DEFAULT_MIN_APPLY_INTERVAL,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            price_source: PriceSource::default(),
        }
    }
}

struct WorkerEntry {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

type Registry = Arc<Mutex<HashMap<u64, WorkerEntry>>>;

/// Removes a worker's registry entry when its task ends, however it ends.
struct RegistryGuard {
    registry: Registry,
    ticket: u64,
    id: u64,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        let mut workers = self.registry.lock();
        if workers.get(&self.ticket).is_some_and(|entry| entry.id == self.id) {
            workers.remove(&self.ticket);
            metrics::set_trailing_workers(workers.len());
            debug!(ticket = self.ticket, "Trailing worker deregistered");
        }
    }
}

/// Supervises trailing-stop workers.
pub struct TrailingSupervisor {
    port: Arc<dyn TrailingPort>,
    settings: TrailingSettings,
    workers: Registry,
    next_id: AtomicU64,
    start_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for TrailingSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrailingSupervisor")
            .field("settings", &self.settings)
            .field("workers", &self.workers.lock().len())
            .finish_non_exhaustive()
    }
}

impl TrailingSupervisor {
    /// Create a supervisor.
    #[must_use]
    pub fn new(port: Arc<dyn TrailingPort>, settings: TrailingSettings) -> Self {
        Self {
            port,
            settings,
            workers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            start_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Start trailing `request.ticket`, replacing any existing worker.
    ///
    /// The previous worker is cancelled and awaited before the new one is
    /// registered. Returns the new worker's cancellation token, a child of
    /// `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] if distance or step is not
    /// positive.
    pub async fn start(
        &self,
        request: TrailRequest,
        parent: &CancellationToken,
    ) -> Result<CancellationToken, GatewayError> {
        request
            .validate()
            .map_err(|e| GatewayError::Validation(e.to_string()))?;

        let _serialized = self.start_lock.lock().await;

        if self.stop(request.ticket).await {
            debug!(ticket = request.ticket, "Replaced existing trailing worker");
        }

        let ticket = request.ticket;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = parent.child_token();

        info!(
            ticket,
            symbol = %request.symbol,
            side = %request.side,
            mode = %request.mode,
            distance = %request.distance,
            step = %request.step,
            source = self.settings.price_source.as_str(),
            "Starting trailing worker"
        );

        let guard = RegistryGuard {
            registry: Arc::clone(&self.workers),
            ticket,
            id,
        };
        let worker = run_worker(
            Arc::clone(&self.port),
            request,
            self.settings,
            cancel.clone(),
            guard,
        );
        // The worker waits for its registry entry; the lock is never held
        // across the spawn.
        let (registered, ready) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            if ready.await.is_ok() {
                worker.await;
            }
        });

        let mut workers = self.workers.lock();
        workers.insert(
            ticket,
            WorkerEntry {
                id,
                cancel: cancel.clone(),
                handle,
            },
        );
        if registered.send(()).is_err() {
            workers.remove(&ticket);
            warn!(ticket, "Trailing worker dropped before it started");
        }
        metrics::set_trailing_workers(workers.len());
        drop(workers);

        Ok(cancel)
    }

    /// Stop the worker for `ticket` and wait for it to finish.
    ///
    /// Returns `false` if no worker was registered.
    pub async fn stop(&self, ticket: u64) -> bool {
        let entry = {
            let mut workers = self.workers.lock();
            let entry = workers.remove(&ticket);
            metrics::set_trailing_workers(workers.len());
            entry
        };

        let Some(entry) = entry else {
            return false;
        };

        entry.cancel.cancel();
        if let Err(e) = entry.handle.await
            && e.is_panic()
        {
            error!(ticket, "Trailing worker panicked");
        }
        info!(ticket, "Trailing worker stopped");
        true
    }

    /// Stop every worker and wait for all of them.
    pub async fn stop_all(&self) {
        let entries: Vec<(u64, WorkerEntry)> = {
            let mut workers = self.workers.lock();
            let drained = workers.drain().collect();
            metrics::set_trailing_workers(0);
            drained
        };

        for (_, entry) in &entries {
            entry.cancel.cancel();
        }
        for (ticket, entry) in entries {
            if let Err(e) = entry.handle.await
                && e.is_panic()
            {
                error!(ticket, "Trailing worker panicked");
            }
        }
    }

    /// Whether a worker is registered for `ticket`.
    #[must_use]
    pub fn is_trailing(&self, ticket: u64) -> bool {
        self.workers.lock().contains_key(&ticket)
    }

    /// Tickets with a registered worker.
    #[must_use]
    pub fn active_tickets(&self) -> Vec<u64> {
        let mut tickets: Vec<u64> = self.workers.lock().keys().copied().collect();
        tickets.sort_unstable();
        tickets
    }
}

async fn run_worker(
    port: Arc<dyn TrailingPort>,
    request: TrailRequest,
    settings: TrailingSettings,
    cancel: CancellationToken,
    _guard: RegistryGuard,
) {
    let ticket = request.ticket;
    let mut prices = port.price_updates(&request.symbol, settings.price_source, &cancel);
    let mut state = TrailState::new(&request);
    let gate = TrailGate::new(request.step, settings.min_apply_interval);
    let mut last_applied: Option<Instant> = None;
    let mut failures: u32 = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = prices.next() => next,
        };

        let tick = match next {
            None => {
                debug!(ticket, "Price feed ended");
                break;
            }
            Some(Ok(tick)) => tick,
            Some(Err(e)) if e.is_cancelled() => break,
            Some(Err(e)) => {
                error!(ticket, error = %e, "Price feed failed, stopping trailing worker");
                break;
            }
        };

        let price = tick.exit_price(request.side);
        let candidate = state.candidate(price);

        let current = match port.stop_loss(ticket, &cancel).await {
            Ok(level) => level.price(),
            Err(e) if e.is_cancelled() => break,
            Err(e) => {
                debug!(ticket, error = %e, "Stop level unreadable, treating as unset");
                None
            }
        };

        let decision =
            gate.evaluate(request.side, candidate, current, last_applied, Instant::now());
        if decision != GateDecision::Apply {
            trace!(ticket, %candidate, ?current, ?decision, "Candidate skipped");
            continue;
        }

        match port.apply_stop(ticket, candidate, &cancel).await {
            Ok(()) => {
                last_applied = Some(Instant::now());
                failures = 0;
                metrics::record_trailing_update();
                info!(ticket, stop_loss = %candidate, %price, "Trailing stop moved");
            }
            Err(e) if e.is_cancelled() => break,
            Err(e) => {
                failures += 1;
                metrics::record_trailing_apply_failure();
                warn!(ticket, error = %e, failures, "Failed to move trailing stop");

                if settings.max_consecutive_failures > 0
                    && failures >= settings.max_consecutive_failures
                {
                    error!(
                        ticket,
                        failures, "Too many consecutive failures, stopping trailing worker"
                    );
                    break;
                }
            }
        }
    }

    debug!(ticket, "Trailing worker exited");
}
