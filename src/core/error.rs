//! Error types for scheduler operations.

use thiserror::Error;

use crate::model::Exception;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A message of the wrong kind reached an entry point.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Unknown capability label or job token.
    #[error("not found: {0}")]
    NotFound(String),
    /// The identity may not use the capability.
    #[error("identity `{identity}` is not authorized for capability `{label}`")]
    Authorization {
        /// Capability label.
        label: String,
        /// Denied identity.
        identity: String,
    },
    /// Duplicate label, malformed module declaration or invalid settings.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Peer unreachable or answered with a non-success status.
    #[error("transport error: {0}")]
    Transport(String),
}

impl SchedulerError {
    /// Wire-level exception reporting this error for `token`.
    #[must_use]
    pub fn to_exception(&self, token: impl Into<String>, label: impl Into<String>) -> Exception {
        Exception::new(token, self.to_string()).with_label(label)
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
