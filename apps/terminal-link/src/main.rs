//! Terminal Link Binary
//!
//! Connects to the trading-terminal gateway, optionally trails one position's
//! stop loss, and holds the session until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin terminal-link
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `TERMINAL_LOGIN`, `TERMINAL_PASSWORD`: account credentials
//! - `TERMINAL_HOST` (+ `TERMINAL_PORT`) or `TERMINAL_CLUSTER`: broker addressing
//!
//! ## Optional
//! - `TERMINAL_GATEWAY_ENDPOINT`: gateway URL (default: <http://localhost:50051>)
//! - `TERMINAL_METRICS_PORT`: Prometheus port, 0 disables (default: 9090)
//! - `TERMINAL_TRAIL_TICKET` with `TERMINAL_TRAIL_SYMBOL`, `TERMINAL_TRAIL_SIDE`,
//!   `TERMINAL_TRAIL_DISTANCE`, `TERMINAL_TRAIL_STEP`, `TERMINAL_TRAIL_MODE`:
//!   trail one position
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use terminal_link::infrastructure::telemetry;
use terminal_link::{ClientConfig, GrpcTerminal, TerminalSession, init_metrics};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Terminal Link");

    let config = ClientConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    if let Some(port) = config.metrics_port {
        init_metrics(SocketAddr::from(([0, 0, 0, 0], port)))
            .context("failed to start metrics exporter")?;
    }

    let gateway = Arc::new(
        GrpcTerminal::connect_lazy(&config.gateway).context("invalid gateway endpoint")?,
    );
    let session = TerminalSession::new(gateway.clone(), gateway, config.session.clone());

    tokio::select! {
        result = session.connect_with_retry(config.identity.clone(), config.connect_max_wait) => {
            result.context("could not establish terminal session")?;
        }
        () = await_shutdown() => {
            session.shutdown().await;
            return Ok(());
        }
    }

    if let Some(request) = config.trail.clone() {
        let ticket = request.ticket;
        session
            .start_trailing(request)
            .await
            .with_context(|| format!("could not start trailing for ticket {ticket}"))?;
    }

    await_shutdown().await;
    session.shutdown().await;

    tracing::info!("Terminal Link stopped");
    Ok(())
}

fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        endpoint = %config.gateway.endpoint,
        addressing = %config.identity.addressing,
        chart_symbol = %config.identity.chart_symbol,
        price_source = config.session.trailing.price_source.as_str(),
        metrics_port = ?config.metrics_port,
        trailing_ticket = ?config.trail.as_ref().map(|t| t.ticket),
        "Configuration loaded"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
