//! Passive role: an HTTP server clients send specifications to.
//!
//! Routes:
//! - `GET /` landing page with the visible capabilities inline
//! - `GET /capability` index of links to visible capabilities
//! - `GET /capability/{label}` one capability or withdrawal
//! - `POST /` a specification; answered with its receipt, or with the
//!   terminal reply if the job finishes within the immediate budget

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::identity::PeerIdentity;
use super::{BaseComponent, ComponentError};
use crate::config::ListenerConfig;
use crate::core::{Scheduler, SchedulerError};
use crate::model::{self, Message, Specification, CONTENT_TYPE};

/// Shared handler state.
#[derive(Clone)]
pub struct ListenerState {
    scheduler: Arc<Scheduler>,
    identity: Arc<dyn PeerIdentity>,
    immediate: Duration,
}

impl ListenerState {
    /// State answering from `scheduler`, waiting up to `immediate` for jobs.
    #[must_use]
    pub fn new(
        scheduler: Arc<Scheduler>,
        identity: Arc<dyn PeerIdentity>,
        immediate: Duration,
    ) -> Self {
        Self {
            scheduler,
            identity,
            immediate,
        }
    }
}

/// Router serving the listener's HTTP surface.
pub fn router(state: ListenerState) -> Router {
    Router::new()
        .route("/", get(landing_page).post(post_message))
        .route("/capability", get(capability_index))
        .route("/capability/{label}", get(capability_detail))
        .with_state(state)
}

/// Listener component bound to one configuration.
pub struct ListenerComponent {
    base: BaseComponent,
    config: ListenerConfig,
}

impl ListenerComponent {
    /// Listener over `base`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `base` has no listener section.
    pub fn new(base: BaseComponent) -> Result<Self, ComponentError> {
        let config = base.config().listener.clone().ok_or_else(|| {
            SchedulerError::Configuration("listener section missing".into())
        })?;
        Ok(Self { base, config })
    }

    /// Shared component state.
    #[must_use]
    pub const fn base(&self) -> &BaseComponent {
        &self.base
    }

    /// The HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        router(ListenerState::new(
            Arc::clone(self.base.scheduler()),
            Arc::clone(self.base.identity()),
            self.config.immediate_budget(),
        ))
    }

    /// Bind the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Io`] when the address cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener, ComponentError> {
        Ok(TcpListener::bind(self.config.bind_address()).await?)
    }

    /// Serve on `listener` until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Io`] on accept failures.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), ComponentError> {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "listener serving");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        tracing::info!(%addr, "listener stopped");
        Ok(())
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

fn mplane_response(message: &Message) -> Response {
    match model::unparse(message) {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn forbidden(err: &ComponentError) -> Response {
    tracing::warn!(error = %err, "rejecting request without identity");
    (StatusCode::FORBIDDEN, err.to_string()).into_response()
}

fn accepts_body(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim())
        .is_none_or(|v| v == CONTENT_TYPE || v == "application/json")
}

async fn landing_page(State(state): State<ListenerState>, headers: HeaderMap) -> Response {
    let identity = match state.identity.extract_peer_identity(&headers) {
        Ok(identity) => identity,
        Err(e) => return forbidden(&e),
    };
    let mut page = String::from(
        "<html><head><title>mPlane component</title></head><body>\n<h1>Capabilities</h1>\n",
    );
    for capability in state.scheduler.visible_capabilities(&identity) {
        match model::unparse_pretty(&capability.into()) {
            Ok(json) => {
                let _ = writeln!(page, "<pre>{}</pre>", escape_html(&json));
            }
            Err(e) => tracing::warn!(error = %e, "cannot render capability"),
        }
    }
    page.push_str("</body></html>\n");
    Html(page).into_response()
}

async fn capability_index(State(state): State<ListenerState>, headers: HeaderMap) -> Response {
    let identity = match state.identity.extract_peer_identity(&headers) {
        Ok(identity) => identity,
        Err(e) => return forbidden(&e),
    };
    let visible = state.scheduler.visible_capabilities(&identity);
    if visible.is_empty() {
        tracing::warn!(%identity, "no capabilities are being exposed, check permissions");
    }
    let mut page = String::from("<html><head><title>Capabilities</title></head><body>\n");
    for capability in &visible {
        let label = escape_html(&capability.label);
        let _ = writeln!(page, "<a href=\"/capability/{label}\">{label}</a><br/>");
    }
    page.push_str("</body></html>\n");
    Html(page).into_response()
}

async fn capability_detail(
    State(state): State<ListenerState>,
    Path(label): Path<String>,
) -> Response {
    match state.scheduler.capability_for_key(&label) {
        Ok(message) => mplane_response(&message),
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

async fn post_message(
    State(state): State<ListenerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let identity = match state.identity.extract_peer_identity(&headers) {
        Ok(identity) => identity,
        Err(e) => return forbidden(&e),
    };
    if !accepts_body(&headers) {
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("expected {CONTENT_TYPE}"),
        )
            .into_response();
    }
    let message = match model::parse(&body) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable request body");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let reply = match message {
        Message::Specification(specification) => {
            handle_specification(&state, &identity, specification).await
        }
        other => SchedulerError::Protocol(format!("cannot process a {} message", other.kind()))
            .to_exception(other.token(), other.label())
            .into(),
    };
    mplane_response(&reply)
}

async fn handle_specification(
    state: &ListenerState,
    identity: &str,
    specification: Specification,
) -> Message {
    if let Some(withdrawal) = state.scheduler.withdrawal_for(&specification) {
        return withdrawal.into();
    }
    let token = specification.token();
    let label = specification.label.clone();
    let reply = match state
        .scheduler
        .process_message(identity, specification.into(), None)
    {
        Ok(reply) => reply,
        Err(e) => return e.to_exception(token, label).into(),
    };
    if state.immediate.is_zero() || !matches!(reply, Message::Receipt(_)) {
        return reply;
    }
    let Ok(job) = state.scheduler.job_for_message(&reply) else {
        return reply;
    };
    match tokio::time::timeout(state.immediate, job.wait_terminal()).await {
        Ok(terminal) => terminal,
        Err(_) => {
            tracing::debug!(%token, "job still running, answering with receipt");
            reply
        }
    }
}
