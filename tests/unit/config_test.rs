//! Tests for configuration validation

use measurement_plane::config::{
    ComponentConfig, DuplicateLabelPolicy, InitiatorConfig, ListenerConfig, ResubmitPolicy,
};

#[test]
fn test_full_config_parses() {
    let raw = r#"{
        "listener": {"port": 8888, "interfaces": ["127.0.0.1"], "immediate_ms": 0},
        "modules": {"ping": {"count": 5}},
        "scheduler": {"duplicate_labels": "replace", "resubmit": "rerun", "job_retention_secs": 10},
        "authorization": {
            "identities": {"org.example.Clients.Client-1": ["guest"]},
            "capabilities": {"ping-test": ["guest"]}
        },
        "identity": {"forged_identity": "org.example.Clients.Client-1"}
    }"#;
    let cfg = ComponentConfig::from_json_str(raw).unwrap();
    assert!(cfg.validate().is_ok());

    let listener = cfg.listener.as_ref().unwrap();
    assert_eq!(listener.port, 8888);
    assert_eq!(listener.capability_link().as_deref(), Some("http://127.0.0.1:8888/"));
    assert!(listener.immediate_budget().is_zero());
    assert_eq!(cfg.scheduler.duplicate_labels, DuplicateLabelPolicy::Replace);
    assert_eq!(cfg.scheduler.resubmit, ResubmitPolicy::Rerun);
    assert_eq!(cfg.modules["ping"]["count"], 5);
    assert_eq!(
        cfg.authorization.unwrap().capabilities["ping-test"],
        vec!["guest".to_string()]
    );
}

#[test]
fn test_config_requires_a_role() {
    let cfg = ComponentConfig::from_json_str("{}").unwrap();
    assert!(cfg.validate().is_err());
}

#[test]
fn test_initiator_config_validation() {
    let valid = InitiatorConfig::new(
        "http://127.0.0.1:8889/register/capability",
        "http://127.0.0.1:8889/show/specification",
        "http://127.0.0.1:8889/register/result",
    );
    assert!(valid.validate().is_ok());
    assert_eq!(valid.idle_interval().as_millis(), 5000);

    let mut invalid = valid.clone();
    invalid.result_url = "not a url".into();
    assert!(invalid.validate().unwrap_err().contains("result_url"));

    let mut invalid = valid;
    invalid.idle_ms = 0;
    assert!(invalid.validate().is_err());
}

#[test]
fn test_initiator_section_defaults() {
    let raw = r#"{"initiator": {
        "capability_url": "http://s/c",
        "specification_url": "http://s/s",
        "result_url": "http://s/r"
    }}"#;
    let cfg = ComponentConfig::from_json_str(raw).unwrap();
    let initiator = cfg.initiator.unwrap();
    assert!(!initiator.supervisor);
    assert_eq!(initiator.reconnect_ms, 5000);
    assert_eq!(initiator.request_timeout_ms, 30_000);
}

#[test]
fn test_listener_bind_address_default() {
    let listener = ListenerConfig::default();
    assert_eq!(listener.bind_address(), "0.0.0.0:1228");
}
