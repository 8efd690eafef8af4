//! Message protocol model: typed messages, temporal windows, parameter
//! constraints and the element registry.
//!
//! The wire format is JSON with the message kind as the single outer key:
//!
//! ```json
//! {"specification": {"label": "ping-test", "when": "now ... now + 5s",
//!                    "parameters": {"destination.ip4": "10.0.0.1"},
//!                    "results": ["delay.twoway.icmp.us"]}}
//! ```

pub mod constraint;
pub mod element;
pub mod error;
pub mod message;
pub mod when;

pub use constraint::Constraint;
pub use element::{ElementRegistry, Primitive};
pub use error::ParseError;
pub use message::{
    Capability, Envelope, Exception, Interrupt, MeasurementResult, Message, MessageKind, Receipt,
    Specification, Withdrawal, CALLBACK_LABEL,
};
pub use when::{Bound, When};

/// Media type used for protocol messages over HTTP.
pub const CONTENT_TYPE: &str = "application/x-mplane+json";

/// Decode a message from its wire form.
///
/// # Errors
///
/// Returns [`ParseError::Json`] for malformed input or unknown kinds.
pub fn parse(bytes: &[u8]) -> Result<Message, ParseError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Encode a message to its wire form.
///
/// # Errors
///
/// Returns [`ParseError::Json`] if a free-form metadata value cannot be
/// encoded.
pub fn unparse(message: &Message) -> Result<Vec<u8>, ParseError> {
    Ok(serde_json::to_vec(message)?)
}

/// Encode a message as a pretty-printed string for human-facing pages.
///
/// # Errors
///
/// See [`unparse`].
pub fn unparse_pretty(message: &Message) -> Result<String, ParseError> {
    Ok(serde_json::to_string_pretty(message)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_unknown_kind() {
        assert!(parse(br#"{"statement": {"label": "x"}}"#).is_err());
        assert!(parse(b"{").is_err());
    }

    #[test]
    fn test_parse_specification() {
        let msg = parse(
            br#"{"specification": {"label": "ping-test", "token": "K",
                 "when": "now + 0s ... now + 5s"}}"#,
        )
        .unwrap();
        assert_eq!(msg.kind(), MessageKind::Specification);
        assert_eq!(msg.token(), "K");
    }
}
