//! Typed error kinds for the probe engine and sink adapters.
//!
//! Explicit variants for deadline-exceeded vs transport-error vs other,
//! rather than classifying by matching substrings in an error message.

use thiserror::Error;

/// Why a probe attempt did not produce a response.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The request did not complete within `CHECK_TIMEOUT_MS`.
    #[error("probe timeout after {elapsed_ms}ms")]
    DeadlineExceeded { elapsed_ms: i64 },

    /// A lower-level transport failure (DNS, connection refused, TLS, etc).
    #[error("transport error: {0}")]
    Transport(String),

    /// Any other failure building or sending the request.
    #[error("probe failed: {0}")]
    Other(String),
}

impl ProbeError {
    /// Status code recorded for a failed probe: `408` for a deadline, `0`
    /// otherwise.
    pub fn status_code(&self) -> i32 {
        match self {
            ProbeError::DeadlineExceeded { .. } => 408,
            ProbeError::Transport(_) | ProbeError::Other(_) => 0,
        }
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::DeadlineExceeded { elapsed_ms: 0 }
        } else if err.is_connect() || err.is_request() {
            ProbeError::Transport(err.to_string())
        } else {
            ProbeError::Other(err.to_string())
        }
    }
}

/// Errors from a Sink Adapter (State Sink or History Sink). Every variant
/// is logged by the Worker Pool but never fails the job — a sink outage
/// must not cause re-probing storms.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink unreachable: {0}")]
    Unavailable(String),

    #[error("sink rejected the write: {0}")]
    Rejected(String),
}

/// Errors from the Dispatch Queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),

    #[error("job not found: {0}")]
    NotFound(String),
}

/// Errors from the Monitor repository (scheduler's eligibility scan + lease).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("store error: {0}")]
    Backend(String),

    #[error("monitor not found: {0}")]
    NotFound(String),
}
