//! The scheduler: capability registry, job table and specification intake.
//!
//! Every inbound specification is matched against the registered
//! capabilities, authorized, type-checked against the element registry and
//! turned into a [`Job`] whose body runs on a spawned task. Registry and job
//! table live under one lock; bodies never run while it is held.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::audit::{build_audit_event, AuditSink, JobAction};
use super::azn::Authorization;
use super::job::{Job, JobState};
use super::service::Service;
use super::SchedulerError;
use crate::config::{DuplicateLabelPolicy, ResubmitPolicy, SchedulerSettings};
use crate::model::{
    Capability, ElementRegistry, Exception, Message, Specification, Withdrawal, CALLBACK_LABEL,
};
use crate::runtime::{Spawn, TokioSpawner};
use crate::util::clock::{elapsed_ms, now_ms};

/// Shared audit sink handle.
pub type SharedAuditSink = Arc<Mutex<Box<dyn AuditSink>>>;

/// Registry entry for one label.
#[derive(Debug, Clone)]
enum Advertised {
    Live(Capability),
    Withdrawn(Withdrawal),
}

impl Advertised {
    fn to_message(&self) -> Message {
        match self {
            Self::Live(capability) => capability.clone().into(),
            Self::Withdrawn(withdrawal) => withdrawal.clone().into(),
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    capabilities: BTreeMap<String, Advertised>,
    services: HashMap<String, Arc<dyn Service>>,
    jobs: HashMap<String, Arc<Job>>,
}

/// Routes specifications to services and tracks the resulting jobs.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    authorization: Arc<dyn Authorization>,
    registry: Arc<ElementRegistry>,
    settings: SchedulerSettings,
    spawner: TokioSpawner,
    capability_link: Option<String>,
    audit: Option<SharedAuditSink>,
}

impl Scheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new(
        authorization: Arc<dyn Authorization>,
        registry: Arc<ElementRegistry>,
        settings: SchedulerSettings,
        spawner: TokioSpawner,
    ) -> Self {
        Self {
            state: Mutex::new(SchedulerState::default()),
            authorization,
            registry,
            settings,
            spawner,
            capability_link: None,
            audit: None,
        }
    }

    /// Link stamped on registered capabilities that carry none.
    #[must_use]
    pub fn with_capability_link(mut self, link: Option<String>) -> Self {
        self.capability_link = link;
        self
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: SharedAuditSink) -> Self {
        self.audit = Some(sink);
        self
    }

    /// The authorization gate.
    #[must_use]
    pub fn authorization(&self) -> &Arc<dyn Authorization> {
        &self.authorization
    }

    /// The element registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ElementRegistry> {
        &self.registry
    }

    /// Policy settings.
    #[must_use]
    pub const fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Register a service and advertise its capability.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Configuration`] when the label is reserved,
    /// the schema uses unknown elements, or the label is already live and
    /// duplicates are rejected.
    pub fn add_service(&self, service: Arc<dyn Service>) -> Result<Capability, SchedulerError> {
        let mut capability = service.capability().clone();
        if capability.label == CALLBACK_LABEL {
            return Err(SchedulerError::Configuration(format!(
                "label `{CALLBACK_LABEL}` is reserved"
            )));
        }
        self.registry
            .check_schema(&capability)
            .map_err(SchedulerError::Configuration)?;
        if capability.link.is_none() {
            capability.link.clone_from(&self.capability_link);
        }

        let mut state = self.state.lock();
        if let Some(Advertised::Live(_)) = state.capabilities.get(&capability.label) {
            match self.settings.duplicate_labels {
                DuplicateLabelPolicy::Reject => {
                    return Err(SchedulerError::Configuration(format!(
                        "capability `{}` is already registered",
                        capability.label
                    )));
                }
                DuplicateLabelPolicy::Replace => {
                    tracing::warn!(label = %capability.label, "replacing registered service");
                }
            }
        }
        state
            .capabilities
            .insert(capability.label.clone(), Advertised::Live(capability.clone()));
        state.services.insert(capability.label.clone(), service);
        tracing::info!(label = %capability.label, token = %capability.token(), "service registered");
        Ok(capability)
    }

    /// Withdraw the capability labelled `label` and drop its service.
    /// Jobs already running are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotFound`] when nothing is registered under
    /// `label`.
    pub fn remove_service(&self, label: &str) -> Result<Withdrawal, SchedulerError> {
        let mut state = self.state.lock();
        let withdrawal = match state.capabilities.get(label) {
            Some(Advertised::Live(capability)) => Withdrawal::of(capability.clone()),
            Some(Advertised::Withdrawn(withdrawal)) => return Ok(withdrawal.clone()),
            None => return Err(SchedulerError::NotFound(format!("no such service `{label}`"))),
        };
        state
            .capabilities
            .insert(label.to_string(), Advertised::Withdrawn(withdrawal.clone()));
        state.services.remove(label);
        tracing::info!(label, "service withdrawn");
        Ok(withdrawal)
    }

    /// Labels of every registry entry, live or withdrawn.
    #[must_use]
    pub fn capability_keys(&self) -> Vec<String> {
        self.state.lock().capabilities.keys().cloned().collect()
    }

    /// The capability or withdrawal registered under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotFound`] for unknown keys.
    pub fn capability_for_key(&self, key: &str) -> Result<Message, SchedulerError> {
        self.state
            .lock()
            .capabilities
            .get(key)
            .map(Advertised::to_message)
            .ok_or_else(|| SchedulerError::NotFound(format!("no capability `{key}`")))
    }

    /// Live capabilities `identity` may see, in label order.
    #[must_use]
    pub fn visible_capabilities(&self, identity: &str) -> Vec<Capability> {
        self.state
            .lock()
            .capabilities
            .values()
            .filter_map(|entry| match entry {
                Advertised::Live(capability) => Some(capability),
                Advertised::Withdrawn(_) => None,
            })
            .filter(|capability| self.authorization.check(capability, identity))
            .cloned()
            .collect()
    }

    /// Labels with a live service.
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut labels: Vec<String> = state.services.keys().cloned().collect();
        labels.sort_unstable();
        labels
    }

    /// The withdrawal `specification` would have matched, if any.
    #[must_use]
    pub fn withdrawal_for(&self, specification: &Specification) -> Option<Withdrawal> {
        match self.state.lock().capabilities.get(&specification.label) {
            Some(Advertised::Withdrawn(w)) if w.matches(specification) => Some(w.clone()),
            _ => None,
        }
    }

    /// Handle an inbound message on behalf of `identity`.
    ///
    /// Specifications answer with a receipt, a cached terminal reply, a
    /// withdrawal or an exception. Interrupts answer with the job's current
    /// reply. `subscriber` receives the job's terminal message once.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotFound`] for interrupts of unknown tokens
    /// and [`SchedulerError::Protocol`] for any other message kind.
    pub fn process_message(
        &self,
        identity: &str,
        message: Message,
        subscriber: Option<oneshot::Sender<Message>>,
    ) -> Result<Message, SchedulerError> {
        match message {
            Message::Specification(specification) => {
                Ok(self.submit_specification(identity, specification, subscriber))
            }
            Message::Interrupt(interrupt) => {
                let job = self.job_for_token(&interrupt.token)?;
                if job.interrupt() {
                    tracing::info!(token = %interrupt.token, label = %job.label(), "interrupt requested");
                }
                Ok(job.get_reply())
            }
            other => Err(SchedulerError::Protocol(format!(
                "cannot process a {} message",
                other.kind()
            ))),
        }
    }

    fn submit_specification(
        &self,
        identity: &str,
        specification: Specification,
        subscriber: Option<oneshot::Sender<Message>>,
    ) -> Message {
        let now = Utc::now();
        let token = specification.token();
        let label = specification.label.clone();
        let reject = |reason: String| -> Message {
            tracing::info!(%token, %label, %identity, %reason, "specification rejected");
            self.record(&token, &label, identity, JobAction::Reject, Some(reason.clone()));
            Exception::new(token.clone(), reason).with_label(label.clone()).into()
        };

        let mut state = self.state.lock();
        self.prune_locked(&mut state, now_ms());

        let matched = match state.capabilities.get(&label) {
            Some(Advertised::Withdrawn(withdrawal))
                if specification.fulfills_at(withdrawal.capability(), now) =>
            {
                Err(Some(withdrawal.clone()))
            }
            Some(Advertised::Live(capability)) if specification.fulfills_at(capability, now) => {
                Ok(capability.clone())
            }
            _ => Err(None),
        };
        let capability = match matched {
            Ok(capability) => capability,
            Err(Some(withdrawal)) => {
                drop(state);
                self.record(&token, &label, identity, JobAction::Reject, Some("withdrawn".into()));
                return withdrawal.into();
            }
            Err(None) => {
                drop(state);
                return reject(
                    SchedulerError::NotFound(format!(
                        "no capability matches specification `{label}`"
                    ))
                    .to_string(),
                );
            }
        };

        if !self.authorization.check(&capability, identity) {
            drop(state);
            return reject(
                SchedulerError::Authorization {
                    label: label.clone(),
                    identity: identity.to_string(),
                }
                .to_string(),
            );
        }
        if let Err(reason) = self.registry.check_values(&specification) {
            drop(state);
            return reject(reason);
        }

        if let Some(job) = state.jobs.get(&token) {
            if !job.is_terminal() || self.settings.resubmit == ResubmitPolicy::ReturnCached {
                let job = Arc::clone(job);
                drop(state);
                if let Some(subscriber) = subscriber {
                    job.subscribe(subscriber);
                }
                tracing::debug!(%token, state = %job.state(), "specification already known");
                return job.get_reply();
            }
        }

        let Some(service) = state.services.get(&label).cloned() else {
            drop(state);
            return reject(format!("no service for capability `{label}`"));
        };
        let job = Arc::new(Job::new(specification, identity));
        state.jobs.insert(token.clone(), Arc::clone(&job));
        drop(state);

        if let Some(subscriber) = subscriber {
            job.subscribe(subscriber);
        }
        let receipt = job.receipt().clone();
        tracing::info!(%token, %label, %identity, "specification accepted");
        self.record(&token, &label, identity, JobAction::Accept, None);
        self.dispatch(job, service);
        receipt.into()
    }

    fn dispatch(&self, job: Arc<Job>, service: Arc<dyn Service>) {
        let audit = self.audit.clone();
        self.spawner.spawn(async move {
            let record = |action: JobAction, detail: Option<String>| {
                if let Some(sink) = &audit {
                    sink.lock().record(build_audit_event(
                        job.token(),
                        job.label(),
                        job.identity(),
                        action,
                        detail,
                    ));
                }
            };

            if job.is_interrupt_requested() || !job.mark_running() {
                let state = job.complete(Err(anyhow::anyhow!("interrupted before start")));
                record(JobAction::Interrupt, None);
                tracing::info!(token = %job.token(), %state, "job ended before start");
                return;
            }
            record(JobAction::Start, None);
            tracing::debug!(token = %job.token(), label = %job.label(), "job started");

            let body = {
                let specification = job.specification().clone();
                let interrupt = job.interrupt_token();
                tokio::spawn(async move { service.run(specification, interrupt).await })
            };
            let outcome = match body.await {
                Ok(outcome) => outcome,
                Err(e) => Err(anyhow::anyhow!("measurement task aborted: {e}")),
            };

            let state = job.complete(outcome);
            let action = match state {
                JobState::Finished => JobAction::Finish,
                JobState::Interrupted => JobAction::Interrupt,
                _ => JobAction::Fail,
            };
            let detail = match job.get_reply() {
                Message::Exception(e) => Some(e.message),
                _ => None,
            };
            record(action, detail);
            tracing::info!(
                token = %job.token(),
                label = %job.label(),
                %state,
                elapsed_ms = elapsed_ms(job.created_at_ms()),
                "job ended"
            );
        });
    }

    /// The job whose token is carried by `message`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotFound`] when no such job exists.
    pub fn job_for_message(&self, message: &Message) -> Result<Arc<Job>, SchedulerError> {
        self.job_for_token(&message.token())
    }

    /// The job for `token`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotFound`] when no such job exists.
    pub fn job_for_token(&self, token: &str) -> Result<Arc<Job>, SchedulerError> {
        self.state
            .lock()
            .jobs
            .get(token)
            .cloned()
            .ok_or_else(|| SchedulerError::NotFound(format!("no job for token `{token}`")))
    }

    /// Number of jobs in the table.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.state.lock().jobs.len()
    }

    /// Drop terminal jobs that completed more than the retention period
    /// before `now_ms`. Returns how many were removed.
    pub fn prune_finished(&self, now_ms: u128) -> usize {
        let mut state = self.state.lock();
        self.prune_locked(&mut state, now_ms)
    }

    fn prune_locked(&self, state: &mut SchedulerState, now_ms: u128) -> usize {
        let Some(retention) = self.settings.job_retention() else {
            return 0;
        };
        let retention_ms = retention.as_millis();
        let before = state.jobs.len();
        state.jobs.retain(|_, job| {
            !(job.is_terminal()
                && job
                    .completed_at_ms()
                    .is_some_and(|done| now_ms.saturating_sub(done) > retention_ms))
        });
        let removed = before - state.jobs.len();
        if removed > 0 {
            tracing::debug!(removed, "pruned finished jobs");
        }
        removed
    }

    fn record(
        &self,
        token: &str,
        label: &str,
        identity: &str,
        action: JobAction,
        detail: Option<String>,
    ) {
        if let Some(sink) = &self.audit {
            sink.lock()
                .record(build_audit_event(token, label, identity, action, detail));
        }
    }
}
