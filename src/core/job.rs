//! Job lifecycle: one accepted specification and its eventual reply.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::AppResult;
use crate::model::{Exception, Message, Receipt, Specification};
use crate::util::clock::now_ms;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, body not started yet.
    Pending,
    /// Body running.
    Running,
    /// Ended with a result.
    Finished,
    /// Ended with an exception.
    Failed,
    /// Ended after an interrupt.
    Interrupted,
}

impl JobState {
    /// Whether the job has reached a final state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Interrupted)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        })
    }
}

struct JobInner {
    reply: Option<Message>,
    subscribers: Vec<oneshot::Sender<Message>>,
    completed_at_ms: Option<u128>,
}

/// A specification accepted by the scheduler.
///
/// The reply is the receipt until the job ends, then the terminal message.
/// Subscribers receive the terminal message exactly once.
pub struct Job {
    specification: Specification,
    token: String,
    identity: String,
    receipt: Receipt,
    state: watch::Sender<JobState>,
    inner: Mutex<JobInner>,
    interrupt: CancellationToken,
    created_at_ms: u128,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("token", &self.token)
            .field("label", &self.specification.label)
            .field("identity", &self.identity)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Job {
    pub(crate) fn new(specification: Specification, identity: impl Into<String>) -> Self {
        let (state, _) = watch::channel(JobState::Pending);
        let receipt = Receipt::for_specification(&specification);
        Self {
            token: receipt.token.clone(),
            specification,
            identity: identity.into(),
            receipt,
            state,
            inner: Mutex::new(JobInner {
                reply: None,
                subscribers: Vec::new(),
                completed_at_ms: None,
            }),
            interrupt: CancellationToken::new(),
            created_at_ms: now_ms(),
        }
    }

    /// Job token, shared with its specification, receipt and result.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Capability label the job runs.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.specification.label
    }

    /// The accepted specification.
    #[must_use]
    pub const fn specification(&self) -> &Specification {
        &self.specification
    }

    /// Identity that submitted the job.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Receipt issued at acceptance.
    #[must_use]
    pub const fn receipt(&self) -> &Receipt {
        &self.receipt
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Ended with a result.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.state() == JobState::Finished
    }

    /// Ended with an exception.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.state() == JobState::Failed
    }

    /// Ended after an interrupt.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.state() == JobState::Interrupted
    }

    /// Whether the job has ended.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Acceptance time in epoch milliseconds.
    #[must_use]
    pub const fn created_at_ms(&self) -> u128 {
        self.created_at_ms
    }

    /// Completion time in epoch milliseconds, once terminal.
    #[must_use]
    pub fn completed_at_ms(&self) -> Option<u128> {
        self.inner.lock().completed_at_ms
    }

    /// The receipt while the job is live, the terminal message afterwards.
    #[must_use]
    pub fn get_reply(&self) -> Message {
        self.inner
            .lock()
            .reply
            .clone()
            .unwrap_or_else(|| self.receipt.clone().into())
    }

    /// Request cancellation. Returns `false` when the job already ended.
    pub fn interrupt(&self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.interrupt.cancel();
        true
    }

    /// Whether an interrupt has been requested.
    #[must_use]
    pub fn is_interrupt_requested(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Deliver the terminal message to `subscriber` once available; at once
    /// when the job already ended.
    pub fn subscribe(&self, subscriber: oneshot::Sender<Message>) {
        let mut inner = self.inner.lock();
        match &inner.reply {
            Some(reply) => {
                let _ = subscriber.send(reply.clone());
            }
            None => inner.subscribers.push(subscriber),
        }
    }

    /// Wait until the job ends and return its terminal message.
    pub async fn wait_terminal(&self) -> Message {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| state.is_terminal()).await;
        self.get_reply()
    }

    pub(crate) fn interrupt_token(&self) -> CancellationToken {
        self.interrupt.clone()
    }

    /// Move from pending to running. `false` when the job is not pending.
    pub(crate) fn mark_running(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == JobState::Pending {
                *state = JobState::Running;
                true
            } else {
                false
            }
        })
    }

    /// Record the body's outcome and wake every waiter. The first completion
    /// wins; later calls return the state already reached.
    pub(crate) fn complete(&self, outcome: AppResult<Message>) -> JobState {
        let (state, reply) = match outcome {
            Ok(reply) if reply.is_terminal_reply() => {
                let state = if self.is_interrupt_requested() {
                    JobState::Interrupted
                } else {
                    JobState::Finished
                };
                (state, reply)
            }
            Ok(other) => (
                JobState::Failed,
                self.exception(format!("service returned a {} instead of a result", other.kind())),
            ),
            Err(err) => {
                let state = if self.is_interrupt_requested() {
                    JobState::Interrupted
                } else {
                    JobState::Failed
                };
                (state, self.exception(format!("{err:#}")))
            }
        };

        let subscribers = {
            let mut inner = self.inner.lock();
            if inner.reply.is_some() {
                return self.state();
            }
            inner.reply = Some(reply.clone());
            inner.completed_at_ms = Some(now_ms());
            std::mem::take(&mut inner.subscribers)
        };
        self.state.send_replace(state);
        for subscriber in subscribers {
            let _ = subscriber.send(reply.clone());
        }
        state
    }

    fn exception(&self, message: String) -> Message {
        Exception::new(self.token.clone(), message)
            .with_label(self.specification.label.clone())
            .into()
    }
}
