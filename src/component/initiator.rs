//! Active role: registers capabilities with a supervisor, polls it for
//! specifications and pushes receipts and results back.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{BaseComponent, ComponentError};
use crate::config::InitiatorConfig;
use crate::core::{Scheduler, SchedulerError};
use crate::model::{
    self, Capability, Envelope, Message, ParseError, When, CALLBACK_LABEL, CONTENT_TYPE,
};

/// Per-capability answer to a registration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistrationStatus {
    /// `"ok"` or `"no"`.
    pub registered: String,
    /// Why a registration was refused.
    #[serde(default)]
    pub reason: String,
}

impl RegistrationStatus {
    /// Whether the capability was accepted.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.registered == "ok"
    }
}

/// Registration answer keyed by capability label.
pub type RegistrationOutcome = BTreeMap<String, RegistrationStatus>;

/// What one specification poll produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// This many messages were handed to the scheduler.
    Processed(usize),
    /// The peer asked to be polled again after this interval.
    Idle(Duration),
    /// The peer does not know us; registration is needed.
    NotRegistered,
}

struct InitiatorInner {
    base: BaseComponent,
    config: InitiatorConfig,
    client: reqwest::Client,
    registration_url: Url,
    specification_url: Url,
    result_url: Url,
    delivery_urls: Mutex<HashMap<String, Url>>,
    peer_identity: Mutex<Option<String>>,
    shutdown: CancellationToken,
}

/// Initiator component. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct InitiatorComponent {
    inner: Arc<InitiatorInner>,
}

fn parse_url(name: &str, raw: &str) -> Result<Url, SchedulerError> {
    Url::parse(raw).map_err(|e| SchedulerError::Configuration(format!("{name}: {e}")))
}

impl InitiatorComponent {
    /// Initiator over `base`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the initiator section is missing
    /// or invalid, and [`ComponentError::Http`] when the client cannot be
    /// built.
    pub fn new(base: BaseComponent) -> Result<Self, ComponentError> {
        let config = base.config().initiator.clone().ok_or_else(|| {
            SchedulerError::Configuration("initiator section missing".into())
        })?;
        config.validate().map_err(SchedulerError::Configuration)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            inner: Arc::new(InitiatorInner {
                registration_url: parse_url("capability_url", &config.capability_url)?,
                specification_url: parse_url("specification_url", &config.specification_url)?,
                result_url: parse_url("result_url", &config.result_url)?,
                base,
                config,
                client,
                delivery_urls: Mutex::new(HashMap::new()),
                peer_identity: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Shared component state.
    #[must_use]
    pub fn base(&self) -> &BaseComponent {
        &self.inner.base
    }

    fn scheduler(&self) -> &Arc<Scheduler> {
        self.inner.base.scheduler()
    }

    /// Identity of the supervisor, once registration resolved it.
    #[must_use]
    pub fn peer_identity(&self) -> Option<String> {
        self.inner.peer_identity.lock().clone()
    }

    /// Register, then run the duty cycle on a spawned task.
    ///
    /// # Errors
    ///
    /// Returns the initial registration's failure.
    pub async fn start(&self) -> Result<JoinHandle<()>, ComponentError> {
        self.register(None).await?;
        let this = self.clone();
        Ok(tokio::spawn(async move { this.run().await }))
    }

    /// Stop the duty cycle and any pending retry.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    async fn pause(&self, interval: Duration) -> Result<(), ComponentError> {
        tokio::select! {
            () = self.inner.shutdown.cancelled() => Err(ComponentError::Shutdown),
            () = tokio::time::sleep(interval) => Ok(()),
        }
    }

    async fn resolve_identity(&self) -> Result<String, ComponentError> {
        loop {
            match self
                .base()
                .identity()
                .identity_for_peer(&self.inner.registration_url)
            {
                Ok(identity) => {
                    *self.inner.peer_identity.lock() = Some(identity.clone());
                    return Ok(identity);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_ms = self.inner.config.reconnect_ms,
                        "supervisor unreachable, retrying"
                    );
                    self.pause(self.inner.config.reconnect_interval()).await?;
                }
            }
        }
    }

    /// Send capabilities to the supervisor.
    ///
    /// With `None` every capability visible to the supervisor is sent, plus
    /// the callback capability. With an explicit list (withdrawals, for
    /// instance) only the authorized messages of that list are sent.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::NoCapabilitiesExposed`] when a full
    /// registration of a non-supervisor has nothing to send,
    /// [`ComponentError::Registration`] when the supervisor refuses, and
    /// [`ComponentError::Shutdown`] if stopped while retrying.
    pub async fn register(
        &self,
        capabilities: Option<Vec<Message>>,
    ) -> Result<RegistrationOutcome, ComponentError> {
        let identity = self.resolve_identity().await?;
        let authorization = self.scheduler().authorization();
        let mut envelope = Envelope::new();
        match capabilities {
            Some(explicit) => {
                for message in explicit {
                    let allowed = match &message {
                        Message::Capability(c) => authorization.check(c, &identity),
                        Message::Withdrawal(w) => authorization.check(w.capability(), &identity),
                        _ => false,
                    };
                    if allowed {
                        envelope.push(message);
                    }
                }
            }
            None => {
                let visible = self.scheduler().visible_capabilities(&identity);
                if visible.is_empty() {
                    tracing::warn!(%identity, "no capabilities are being exposed, check permissions");
                    if !self.inner.config.supervisor {
                        return Err(ComponentError::NoCapabilitiesExposed(identity));
                    }
                }
                for capability in visible {
                    envelope.push(capability.into());
                }
                envelope.push(Capability::callback(When::now_to_future()).into());
            }
        }

        let message = Message::from(envelope);
        loop {
            match self.send_message(&self.inner.registration_url, &message).await {
                Ok(response) => return Self::registration_outcome(response).await,
                Err(e) if e.is_transport() => {
                    tracing::warn!(
                        error = %e,
                        retry_ms = self.inner.config.reconnect_ms,
                        "supervisor unreachable, retrying registration"
                    );
                    self.pause(self.inner.config.reconnect_interval()).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn registration_outcome(
        response: reqwest::Response,
    ) -> Result<RegistrationOutcome, ComponentError> {
        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            tracing::error!(%status, %body, "error registering capabilities");
            return Err(ComponentError::Registration {
                status: status.as_u16(),
                body,
            });
        }
        let outcome: RegistrationOutcome =
            serde_json::from_str(&body).map_err(ParseError::from)?;
        for (label, status) in &outcome {
            if status.is_ok() {
                tracing::info!(%label, "capability registered");
            } else {
                tracing::warn!(%label, reason = %status.reason, "capability registration failed");
            }
        }
        Ok(outcome)
    }

    async fn reregister(&self) {
        match self.register(None).await {
            Ok(_) | Err(ComponentError::Shutdown) => {}
            Err(e) => tracing::error!(error = %e, "re-registration failed"),
        }
    }

    /// Poll until shut down.
    pub async fn run(&self) {
        tracing::info!(url = %self.inner.specification_url, "checking for specifications");
        let default_idle = self.inner.config.idle_interval();
        while !self.inner.shutdown.is_cancelled() {
            let idle = match self.poll_once().await {
                Ok(PollOutcome::Idle(idle)) => idle,
                Ok(PollOutcome::Processed(_)) => default_idle,
                Ok(PollOutcome::NotRegistered) => {
                    tracing::info!("re-registering capabilities");
                    self.reregister().await;
                    default_idle
                }
                Err(e) if e.is_transport() => {
                    tracing::warn!(error = %e, "supervisor down, re-registering");
                    self.reregister().await;
                    default_idle
                }
                Err(e) => {
                    tracing::warn!(error = %e, "specification poll failed");
                    default_idle
                }
            };
            if self.pause(idle).await.is_err() {
                break;
            }
        }
        tracing::info!("duty cycle stopped");
    }

    /// Fetch pending specifications once and hand them to the scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Http`] when the supervisor cannot be reached
    /// and [`ComponentError::Parse`] for unreadable bodies.
    pub async fn poll_once(&self) -> Result<PollOutcome, ComponentError> {
        let default_idle = self.inner.config.idle_interval();
        let response = self
            .inner
            .client
            .get(self.inner.specification_url.clone())
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::PRECONDITION_REQUIRED => return Ok(PollOutcome::NotRegistered),
            status => {
                tracing::debug!(%status, "no specifications");
                return Ok(PollOutcome::Processed(0));
            }
        }
        let body = response.bytes().await?;
        let batch: Vec<Message> = match model::parse(&body)? {
            Message::Envelope(envelope) => envelope.flatten().into_iter().cloned().collect(),
            single => vec![single],
        };

        let mut handled = 0;
        for message in batch {
            if message.label() == CALLBACK_LABEL {
                let idle = message
                    .when()
                    .and_then(|when| when.timer_delays(Utc::now()).1)
                    .unwrap_or(default_idle)
                    .max(self.inner.config.reconnect_interval());
                tracing::debug!(idle_ms = idle.as_millis(), "callback directive received");
                return Ok(PollOutcome::Idle(idle));
            }
            self.handle_message(message).await;
            handled += 1;
        }
        Ok(PollOutcome::Processed(handled))
    }

    fn delivery_url(&self, token: &str) -> Url {
        self.inner
            .delivery_urls
            .lock()
            .get(token)
            .cloned()
            .unwrap_or_else(|| self.inner.result_url.clone())
    }

    async fn handle_message(&self, message: Message) {
        let identity = self.peer_identity().unwrap_or_default();
        let token = message.token();
        let label = message.label().to_string();
        let is_interrupt = matches!(message, Message::Interrupt(_));
        let link = match &message {
            Message::Specification(spec) => spec.link.clone(),
            _ => None,
        };

        let (tx, rx) = oneshot::channel();
        let subscriber = (!is_interrupt).then_some(tx);
        let reply = match self
            .scheduler()
            .process_message(&identity, message, subscriber)
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(%token, %label, error = %e, "message refused");
                e.to_exception(token.clone(), label.clone()).into()
            }
        };

        if !is_interrupt {
            let url = link
                .and_then(|raw| match Url::parse(&raw) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        tracing::warn!(%token, link = %raw, error = %e, "ignoring bad result link");
                        None
                    }
                })
                .unwrap_or_else(|| self.inner.result_url.clone());
            self.inner.delivery_urls.lock().insert(token.clone(), url);
        }

        if reply.is_terminal_reply() {
            self.return_result(&token, reply).await;
            return;
        }
        let url = self.delivery_url(&token);
        match self.deliver(&url, &reply).await {
            Ok(()) => tracing::debug!(%token, kind = %reply.kind(), "reply delivered"),
            Err(e) => tracing::warn!(%token, error = %e, "reply delivery failed"),
        }

        if is_interrupt {
            return;
        }
        if !matches!(reply, Message::Receipt(_)) {
            self.inner.delivery_urls.lock().remove(&token);
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            match rx.await {
                Ok(terminal) => this.return_result(&token, terminal).await,
                Err(_) => {
                    this.inner.delivery_urls.lock().remove(&token);
                }
            }
        });
    }

    /// Push the terminal reply of job `token` to its delivery URL. The URL
    /// is forgotten afterwards whether or not the push succeeded.
    pub async fn return_result(&self, token: &str, reply: Message) {
        let url = self.delivery_url(token);
        let label = reply.label().to_string();
        let outcome = self.deliver(&url, &reply).await;
        self.inner.delivery_urls.lock().remove(token);
        match outcome {
            Ok(()) if matches!(reply, Message::Exception(_)) => {
                tracing::info!(%token, "exception successfully returned");
            }
            Ok(()) => tracing::info!(%label, "result successfully returned"),
            Err(e) => tracing::warn!(%label, error = %e, "error returning result"),
        }
    }

    /// Number of jobs whose terminal reply has not been pushed yet.
    #[must_use]
    pub fn pending_deliveries(&self) -> usize {
        self.inner.delivery_urls.lock().len()
    }

    /// Withdraw a capability and tell the supervisor.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotFound`] for unknown labels and
    /// registration errors from the push.
    pub async fn remove_capability(
        &self,
        label: &str,
    ) -> Result<RegistrationOutcome, ComponentError> {
        let withdrawal = self.base().remove_capability(label)?;
        self.register(Some(vec![withdrawal.into()])).await
    }

    async fn deliver(&self, url: &Url, message: &Message) -> Result<(), ComponentError> {
        let response = self.send_message(url, message).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SchedulerError::Transport(format!("{url} answered {status}: {body}")).into())
    }

    async fn send_message(
        &self,
        url: &Url,
        message: &Message,
    ) -> Result<reqwest::Response, ComponentError> {
        let body = model::unparse(message)?;
        Ok(self
            .inner
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(body)
            .send()
            .await?)
    }
}
