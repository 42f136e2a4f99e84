//! Configuration Module
//!
//! Environment-driven settings for the client and the binary.

mod settings;

pub use settings::{ClientConfig, ConfigError, DEFAULT_CONNECT_MAX_WAIT, DEFAULT_METRICS_PORT};
