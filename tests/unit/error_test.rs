//! Tests for error types

use measurement_plane::component::ComponentError;
use measurement_plane::core::SchedulerError;
use measurement_plane::model::ParseError;

#[test]
fn test_protocol_error() {
    let err = SchedulerError::Protocol("cannot process a receipt message".to_string());
    assert_eq!(format!("{}", err), "protocol error: cannot process a receipt message");
}

#[test]
fn test_not_found_error() {
    let err = SchedulerError::NotFound("no job for token `abc`".to_string());
    assert_eq!(format!("{}", err), "not found: no job for token `abc`");
}

#[test]
fn test_authorization_error() {
    let err = SchedulerError::Authorization {
        label: "ping-test".to_string(),
        identity: "Dummy".to_string(),
    };
    assert_eq!(
        format!("{}", err),
        "identity `Dummy` is not authorized for capability `ping-test`"
    );
}

#[test]
fn test_configuration_error() {
    let err = SchedulerError::Configuration("unknown module `x`".to_string());
    assert_eq!(format!("{}", err), "configuration error: unknown module `x`");
}

#[test]
fn test_error_to_exception() {
    let err = SchedulerError::Transport("connection refused".to_string());
    let exception = err.to_exception("tok", "ping-test");
    assert_eq!(exception.token, "tok");
    assert_eq!(exception.label, "ping-test");
    assert_eq!(exception.message, "transport error: connection refused");
}

#[test]
fn test_component_error_wraps_layers() {
    let err: ComponentError = SchedulerError::NotFound("no such service `x`".into()).into();
    assert_eq!(err.to_string(), "not found: no such service `x`");
    assert!(!err.is_transport());

    let parse: ParseError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
    let err: ComponentError = parse.into();
    assert!(err.to_string().starts_with("malformed message"));

    let err: ComponentError =
        SchedulerError::Transport("http://supervisor/result answered 503".into()).into();
    assert!(err.is_transport());
    assert!(err.to_string().contains("503"));

    let err = ComponentError::NoCapabilitiesExposed("Dummy".into());
    assert!(err.to_string().contains("Dummy"));
}
