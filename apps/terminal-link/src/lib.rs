#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Terminal Link - Resilient Trading-Terminal Client
//!
//! Client-side access layer to a remote trading-terminal gateway. Callers get
//! a logical session that survives transport drops and terminal restarts:
//! calls and subscriptions are transparently reconnected and retried, volumes
//! are snapped to the broker lattice, and trailing stops run as supervised
//! background workers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and rules
//!   - `session`: Identity, token and shared session state
//!   - `market`: Ticks, positions and trade events
//!   - `volume`: Volume lattice normalization
//!   - `trailing`: Trailing-stop candidates and update gate
//!
//! - **Application**: Ports and services
//!   - `ports`: Gateway connector, raw terminal operations, trailing feed
//!   - `services`: Reconnect coordination, retried executors, trailing
//!     supervisor and the `TerminalSession` facade
//!
//! - **Infrastructure**: Adapters and process concerns
//!   - `grpc`: tonic client for the gateway
//!   - `config`: Environment configuration
//!   - `metrics`: Prometheus exporter
//!   - `telemetry`: tracing subscriber and OTLP export
//!
//! # Recovery Flow
//!
//! ```text
//! caller ──► executor ──► TerminalPort ──► gateway
//!               │  ▲
//!   retryable   ▼  │ new token
//!            ReconnectCoordinator ──► SessionConnector
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure session, market, volume and trailing types.
pub mod domain;

/// Application layer - Ports and resilient services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market::{
    PositionSide, PositionSnapshot, ProtectiveLevel, Tick, TradeEvent, TradeEventKind,
};
pub use domain::session::{Addressing, Credentials, SessionIdentity, SessionToken};
pub use domain::trailing::{TrailMode, TrailRequest};
pub use domain::volume::{VolumeConstraint, normalize_volume};

// Ports
pub use application::ports::{
    GatewayError, PriceSource, RemoteError, SessionConnector, SessionHeaders, TerminalPort,
};

// Services
pub use application::services::{
    CallDescriptor, CallOutcome, SessionSettings, StreamDescriptor, TerminalClient,
    TerminalSession, classify_reply,
};

// Infrastructure
pub use infrastructure::config::{ClientConfig, ConfigError};
pub use infrastructure::grpc::{GatewayConfig, GrpcTerminal};
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
