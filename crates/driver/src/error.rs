//! Driver error types.

use thiserror::Error;

pub type Result<T, E = DriverError> = std::result::Result<T, E>;

/// Errors surfaced by a [`Driver`](crate::Driver).
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to connect to sidecar at {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("sidecar connection closed")]
    Disconnected,

    #[error("sidecar did not answer {command} within {timeout_ms}ms")]
    Timeout {
        command: &'static str,
        timeout_ms: u128,
    },

    #[error("sidecar rejected {command}: {message}")]
    Rejected {
        command: &'static str,
        message: String,
    },

    #[error("unexpected sidecar payload for {command}: {reason}")]
    Protocol {
        command: &'static str,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DriverError {
    /// Whether the error means the browser session is gone and the handle
    /// should be recreated rather than retried.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Connect { .. })
    }
}
