//! Errors raised while decoding wire messages and their embedded expressions.

use thiserror::Error;

/// Failure to turn bytes or an embedded expression into a protocol value.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The body is not a well-formed message object.
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    /// A temporal window expression could not be understood.
    #[error("invalid temporal window `{input}`: {reason}")]
    When {
        /// The offending expression.
        input: String,
        /// What was wrong with it.
        reason: String,
    },
    /// An element registry document was rejected.
    #[error("invalid element registry: {0}")]
    Registry(String),
}

impl ParseError {
    pub(crate) fn when(input: &str, reason: impl Into<String>) -> Self {
        Self::When {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
