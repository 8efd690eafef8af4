//! Core scheduling: jobs, services, authorization, audit and the scheduler.

pub mod audit;
pub mod azn;
pub mod error;
pub mod job;
pub mod scheduler;
pub mod service;

pub use audit::{
    build_audit_event, AuditEvent, AuditSink, InMemoryAuditSink, JobAction, TracingAuditSink,
};
pub use azn::{authorization_from_config, Authorization, AuthorizationOff, AuthorizationOn};
pub use error::{AppResult, SchedulerError};
pub use job::{Job, JobState};
pub use scheduler::{Scheduler, SharedAuditSink};
pub use service::{FnService, ModuleRegistry, Service, ServiceFactory};
