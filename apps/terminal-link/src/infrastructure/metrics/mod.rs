//! Prometheus Metrics Module
//!
//! Counters and gauges for session recovery and trailing-stop activity.
//!
//! # Metrics
//!
//! - **Recovery**: reconnects, reconnect failures, call retries by class,
//!   stream reopens
//! - **Trailing**: applied stop updates, apply failures, live workers
//!
//! Recording before [`init_metrics`] is a no-op.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::application::services::RetryClass;

static INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Error type for metrics setup.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to install the exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Install the Prometheus exporter with an HTTP listener on `addr`.
///
/// Subsequent calls are no-ops.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed (e.g. port in use).
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    let _ = INSTALLED.set(addr);
    register_metrics();

    tracing::info!(addr = %addr, "Prometheus metrics exporter started");
    Ok(())
}

fn register_metrics() {
    describe_counter!(
        "terminal_reconnects_total",
        "Successful session re-establishments"
    );
    describe_counter!(
        "terminal_reconnect_failures_total",
        "Failed session re-establishment attempts"
    );
    describe_counter!(
        "terminal_call_retries_total",
        "Call attempts retried after a recoverable failure, by class"
    );
    describe_counter!(
        "terminal_stream_reopens_total",
        "Server-push streams reopened after a reconnect"
    );
    describe_counter!(
        "terminal_trailing_updates_total",
        "Stop-loss changes applied by trailing workers"
    );
    describe_counter!(
        "terminal_trailing_apply_failures_total",
        "Stop-loss changes that the terminal rejected"
    );
    describe_gauge!(
        "terminal_trailing_workers",
        "Number of live trailing-stop workers"
    );
}

// =============================================================================
// Recording
// =============================================================================

/// Record a successful reconnect.
pub fn record_reconnect() {
    counter!("terminal_reconnects_total").increment(1);
}

/// Record a failed reconnect attempt.
pub fn record_reconnect_failure() {
    counter!("terminal_reconnect_failures_total").increment(1);
}

/// Record a retried call.
pub fn record_call_retry(class: RetryClass) {
    counter!("terminal_call_retries_total", "class" => class.as_str()).increment(1);
}

/// Record a reopened stream.
pub fn record_stream_reopen() {
    counter!("terminal_stream_reopens_total").increment(1);
}

/// Record an applied trailing stop change.
pub fn record_trailing_update() {
    counter!("terminal_trailing_updates_total").increment(1);
}

/// Record a failed trailing stop change.
pub fn record_trailing_apply_failure() {
    counter!("terminal_trailing_apply_failures_total").increment(1);
}

/// Update the live trailing worker count.
#[allow(clippy::cast_precision_loss)]
pub fn set_trailing_workers(count: usize) {
    gauge!("terminal_trailing_workers").set(count as f64);
}
