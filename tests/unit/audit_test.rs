//! Tests for audit sink

use measurement_plane::core::{build_audit_event, AuditSink, InMemoryAuditSink, JobAction};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(
        "token1",
        "ping-test",
        "client-1",
        JobAction::Accept,
        Some("detail".to_string()),
    );

    sink.record(event.clone());
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].token, "token1");
    assert_eq!(events[0].label, "ping-test");
    assert_eq!(events[0].action, JobAction::Accept);
    assert!(events[0].event_id.starts_with("token1-accept-"));
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    for action in [JobAction::Accept, JobAction::Start, JobAction::Finish] {
        sink.record(build_audit_event("t", "ping-test", "client-1", action, None));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, JobAction::Start);
    assert_eq!(events[1].action, JobAction::Finish);
}

#[test]
fn test_events_for_token() {
    let mut sink = InMemoryAuditSink::new(10);
    sink.record(build_audit_event("a", "ping-test", "c", JobAction::Accept, None));
    sink.record(build_audit_event("b", "ping-test", "c", JobAction::Reject, None));
    sink.record(build_audit_event("a", "ping-test", "c", JobAction::Start, None));

    let actions: Vec<JobAction> = sink.events_for("a").iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![JobAction::Accept, JobAction::Start]);
}

#[test]
fn test_action_display() {
    assert_eq!(JobAction::Interrupt.to_string(), "interrupt");
    assert_eq!(JobAction::Reject.to_string(), "reject");
}
