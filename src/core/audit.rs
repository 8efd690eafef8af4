//! Audit trail of job lifecycle transitions.
//!
//! The scheduler records one event per accepted, started, finished, failed,
//! interrupted or rejected specification when a sink is attached.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::util::clock::now_ms;

/// Lifecycle step recorded by the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    /// Specification accepted and receipt issued.
    Accept,
    /// Measurement body started.
    Start,
    /// Job ended with a result.
    Finish,
    /// Job ended with an exception.
    Fail,
    /// Job ended after an interrupt.
    Interrupt,
    /// Specification refused (unmatched, withdrawn, unauthorized or invalid).
    Reject,
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Accept => "accept",
            Self::Start => "start",
            Self::Finish => "finish",
            Self::Fail => "fail",
            Self::Interrupt => "interrupt",
            Self::Reject => "reject",
        })
    }
}

/// Audit event structure.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Job token.
    pub token: String,
    /// Capability label.
    pub label: String,
    /// Identity that submitted the specification.
    pub identity: String,
    /// Action taken.
    pub action: JobAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context, such as a rejection reason.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }

    /// Events recorded for one job token, oldest first.
    #[must_use]
    pub fn events_for(&self, token: &str) -> Vec<AuditEvent> {
        self.events
            .iter()
            .filter(|e| e.token == token)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

impl<S: AuditSink> AuditSink for Arc<Mutex<S>> {
    fn record(&mut self, event: AuditEvent) {
        self.lock().record(event);
    }
}

/// Sink that forwards events to `tracing` at debug level.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&mut self, event: AuditEvent) {
        tracing::debug!(
            token = %event.token,
            label = %event.label,
            identity = %event.identity,
            action = %event.action,
            detail = event.detail.as_deref().unwrap_or(""),
            "job audit"
        );
    }
}

/// Helper to build an audit event from context.
#[must_use]
pub fn build_audit_event(
    token: impl Into<String>,
    label: impl Into<String>,
    identity: impl Into<String>,
    action: JobAction,
    detail: Option<String>,
) -> AuditEvent {
    let token = token.into();
    let created_at_ms = now_ms();
    AuditEvent {
        event_id: format!("{token}-{action}-{created_at_ms}"),
        token,
        label: label.into(),
        identity: identity.into(),
        action,
        created_at_ms,
        detail,
    }
}
