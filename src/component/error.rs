//! Errors raised by the listener and initiator components.

use thiserror::Error;

use crate::core::SchedulerError;
use crate::model::ParseError;

/// Component-level failures.
#[derive(Debug, Error)]
pub enum ComponentError {
    /// Scheduler refused an operation.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// A peer sent something that is not a protocol message.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// HTTP client failure.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
    /// Socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The caller or peer identity could not be determined.
    #[error("no usable peer identity: {0}")]
    Identity(String),
    /// A full registration found nothing the peer may use.
    #[error("no capabilities are exposed to `{0}`; check permissions")]
    NoCapabilitiesExposed(String),
    /// The component was asked to stop while waiting.
    #[error("component is shutting down")]
    Shutdown,
    /// The peer refused a registration.
    #[error("registration rejected with status {status}: {body}")]
    Registration {
        /// HTTP status.
        status: u16,
        /// Response body.
        body: String,
    },
}

impl ComponentError {
    /// Whether the peer could not be reached at all.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_connect() || e.is_timeout() || e.is_request())
            || matches!(self, Self::Scheduler(SchedulerError::Transport(_)))
    }
}
