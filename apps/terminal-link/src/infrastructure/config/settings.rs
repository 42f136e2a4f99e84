//! Client configuration from environment variables.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::application::ports::{DEFAULT_POLL_INTERVAL, PriceSource};
use crate::application::services::{
    BackoffConfig, DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_RETRY_DELAY, ExecutorSettings,
    SessionSettings, TrailingSettings,
};
use crate::domain::session::{
    Addressing, Credentials, DEFAULT_CHART_SYMBOL, DEFAULT_READINESS_TIMEOUT, SessionIdentity,
};
use crate::domain::trailing::{
    DEFAULT_MIN_APPLY_INTERVAL, TrailMode, TrailRequest, TrailRequestError,
};
use crate::infrastructure::grpc::{DEFAULT_GATEWAY_ENDPOINT, GatewayConfig};

/// Default broker server port for direct addressing.
const DEFAULT_BROKER_PORT: u16 = 443;

/// Default time the binary waits for the first successful connect.
pub const DEFAULT_CONNECT_MAX_WAIT: Duration = Duration::from_secs(120);

/// Default Prometheus listener port (0 disables the exporter).
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// gRPC channel settings.
    pub gateway: GatewayConfig,
    /// Account, addressing and readiness settings.
    pub identity: SessionIdentity,
    /// Retry, backoff and trailing settings.
    pub session: SessionSettings,
    /// How long the first connect may keep retrying.
    pub connect_max_wait: Duration,
    /// Prometheus listener port, `None` when disabled.
    pub metrics_port: Option<u16>,
    /// Trailing worker to start after connecting.
    pub trail: Option<TrailRequest>,
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or
    /// malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let login = env.required("TERMINAL_LOGIN")?;
        let login = login
            .parse::<u64>()
            .map_err(|e| ConfigError::invalid("TERMINAL_LOGIN", &e))?;
        let password = env.required("TERMINAL_PASSWORD")?;

        let addressing = if let Some(name) = env.optional("TERMINAL_CLUSTER") {
            Addressing::Cluster { name }
        } else if let Some(host) = env.optional("TERMINAL_HOST") {
            Addressing::Direct {
                host,
                port: env.parsed("TERMINAL_PORT", DEFAULT_BROKER_PORT),
            }
        } else {
            return Err(ConfigError::MissingEnvVar(
                "TERMINAL_HOST or TERMINAL_CLUSTER".to_string(),
            ));
        };

        let identity = SessionIdentity::new(addressing, Credentials::new(login, password))
            .with_chart_symbol(
                env.optional("TERMINAL_CHART_SYMBOL")
                    .unwrap_or_else(|| DEFAULT_CHART_SYMBOL.to_string()),
            )
            .with_readiness_timeout(
                env.secs("TERMINAL_READY_TIMEOUT_SECS", DEFAULT_READINESS_TIMEOUT),
            );

        let defaults = GatewayConfig::default();
        let gateway = GatewayConfig::new(
            env.optional("TERMINAL_GATEWAY_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_GATEWAY_ENDPOINT.to_string()),
        )
        .with_connect_timeout(env.secs("TERMINAL_CONNECT_TIMEOUT_SECS", defaults.connect_timeout))
        .with_request_timeout(env.secs("TERMINAL_REQUEST_TIMEOUT_SECS", defaults.request_timeout));

        let session = SessionSettings {
            executor: ExecutorSettings {
                retry_delay: env.millis("TERMINAL_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY),
            },
            trailing: TrailingSettings {
                min_apply_interval: env
                    .millis("TERMINAL_TRAIL_MIN_INTERVAL_MS", DEFAULT_MIN_APPLY_INTERVAL),
                max_consecutive_failures: env
                    .parsed("TERMINAL_TRAIL_MAX_FAILURES", DEFAULT_MAX_CONSECUTIVE_FAILURES),
                price_source: price_source(&env)?,
            },
            connect_backoff: BackoffConfig::default(),
        };

        let metrics_port = match env.parsed("TERMINAL_METRICS_PORT", DEFAULT_METRICS_PORT) {
            0 => None,
            port => Some(port),
        };

        Ok(Self {
            gateway,
            identity,
            session,
            connect_max_wait: env.secs("TERMINAL_CONNECT_MAX_WAIT_SECS", DEFAULT_CONNECT_MAX_WAIT),
            metrics_port,
            trail: trail_request(&env)?,
        })
    }
}

fn price_source(env: &Env<'_>) -> Result<PriceSource, ConfigError> {
    let interval = env.millis("TERMINAL_TRAIL_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL);
    match env.optional("TERMINAL_TRAIL_PRICE_SOURCE") {
        None => Ok(PriceSource::Poll { interval }),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "poll" => Ok(PriceSource::Poll { interval }),
            "push" => Ok(PriceSource::Push),
            _ => Err(ConfigError::InvalidValue {
                key: "TERMINAL_TRAIL_PRICE_SOURCE".to_string(),
                message: format!("expected poll or push, got {value}"),
            }),
        },
    }
}

fn trail_request(env: &Env<'_>) -> Result<Option<TrailRequest>, ConfigError> {
    let Some(ticket) = env.optional("TERMINAL_TRAIL_TICKET") else {
        return Ok(None);
    };

    let request = TrailRequest {
        ticket: ticket
            .parse()
            .map_err(|e| ConfigError::invalid("TERMINAL_TRAIL_TICKET", &e))?,
        symbol: env.required("TERMINAL_TRAIL_SYMBOL")?,
        side: env.required_parsed("TERMINAL_TRAIL_SIDE")?,
        distance: env.required_parsed::<Decimal>("TERMINAL_TRAIL_DISTANCE")?,
        step: env.required_parsed::<Decimal>("TERMINAL_TRAIL_STEP")?,
        mode: match env.optional("TERMINAL_TRAIL_MODE") {
            Some(mode) => mode
                .parse::<TrailMode>()
                .map_err(|e| ConfigError::invalid("TERMINAL_TRAIL_MODE", &e))?,
            None => TrailMode::default(),
        },
    };

    request.validate().map_err(|e| {
        let key = match e {
            TrailRequestError::NonPositiveDistance(_) => "TERMINAL_TRAIL_DISTANCE",
            TrailRequestError::NonPositiveStep(_) => "TERMINAL_TRAIL_STEP",
        };
        ConfigError::invalid(key, &e)
    })?;
    Ok(Some(request))
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} is invalid: {message}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Parse failure.
        message: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, error: &impl std::fmt::Display) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: error.to_string(),
        }
    }
}

/// Variable source with the parsing helpers.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value)
    }

    fn required_parsed<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.required(key)?
            .trim()
            .parse()
            .map_err(|e| ConfigError::invalid(key, &e))
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        self.optional(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        self.optional(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        self.optional(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
