//! Application Services
//!
//! Session recovery, retried call execution and trailing-stop supervision.

mod backoff;
mod client;
mod executor;
mod outcome;
mod reconnect;
mod session;
mod tick_poller;
mod trailing;

pub use backoff::{BackoffConfig, ConnectBackoff};
pub use client::TerminalClient;
pub use executor::{
    CallDescriptor, CallExecutor, DEFAULT_RETRY_DELAY, ExecutorSettings, StreamDescriptor,
};
pub use outcome::{CallOutcome, RetryClass, classify_reply};
pub use reconnect::ReconnectCoordinator;
pub use session::{SessionSettings, TerminalSession};
pub use tick_poller::TickPoller;
pub use trailing::{DEFAULT_MAX_CONSECUTIVE_FAILURES, TrailingSettings, TrailingSupervisor};
