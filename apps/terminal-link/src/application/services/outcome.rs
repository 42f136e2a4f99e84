//! Call Outcome Classification
//!
//! Every raw gateway result is folded into a single [`CallOutcome`]. The
//! executors are the only code that interprets it.

use tonic::{Code, Status};

use crate::application::ports::{GatewayError, RawReply, RemoteError};

/// Why a call is being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Transport reported the endpoint unavailable.
    Transport,
    /// Remote session no longer exists.
    SessionLost,
}

impl RetryClass {
    /// Metric/log label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::SessionLost => "session_lost",
        }
    }
}

/// Classified result of one call attempt.
#[derive(Debug)]
pub enum CallOutcome<T> {
    /// Payload.
    Ok(T),
    /// Transport failure that a reconnect may fix.
    RetryableTransport(Status),
    /// Remote session lost; reconnect and retry.
    RetryableSessionLost(RemoteError),
    /// Surface this error to the caller.
    Fatal(GatewayError),
}

impl<T> CallOutcome<T> {
    /// Classify a transport status.
    #[must_use]
    pub fn from_status(status: Status) -> Self {
        if status.code() == Code::Unavailable {
            Self::RetryableTransport(status)
        } else {
            Self::Fatal(GatewayError::Transport(status))
        }
    }

    /// Classify a structured remote error.
    #[must_use]
    pub fn from_remote(error: RemoteError) -> Self {
        if error.is_session_lost() {
            Self::RetryableSessionLost(error)
        } else {
            Self::Fatal(GatewayError::Remote(error))
        }
    }

    /// Retry class, `None` for `Ok` and `Fatal`.
    #[must_use]
    pub const fn retry_class(&self) -> Option<RetryClass> {
        match self {
            Self::RetryableTransport(_) => Some(RetryClass::Transport),
            Self::RetryableSessionLost(_) => Some(RetryClass::SessionLost),
            Self::Ok(_) | Self::Fatal(_) => None,
        }
    }

    /// Map the payload.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            Self::Ok(value) => CallOutcome::Ok(f(value)),
            Self::RetryableTransport(status) => CallOutcome::RetryableTransport(status),
            Self::RetryableSessionLost(error) => CallOutcome::RetryableSessionLost(error),
            Self::Fatal(error) => CallOutcome::Fatal(error),
        }
    }
}

/// Default classifier for gateway replies.
#[must_use]
pub fn classify_reply<T>(reply: RawReply<T>) -> CallOutcome<T> {
    match reply {
        Ok(Ok(value)) => CallOutcome::Ok(value),
        Ok(Err(remote)) => CallOutcome::from_remote(remote),
        Err(status) => CallOutcome::from_status(status),
    }
}
