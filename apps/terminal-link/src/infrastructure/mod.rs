//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the process-level
//! concerns of the binary.

/// Environment-driven configuration.
pub mod config;

/// gRPC adapter for the terminal gateway.
pub mod grpc;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing and OpenTelemetry setup.
pub mod telemetry;
