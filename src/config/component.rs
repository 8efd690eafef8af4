//! Component and scheduler configuration structures.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What happens when a service is added under a label that is already live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateLabelPolicy {
    /// Refuse the second service.
    #[default]
    Reject,
    /// The newer service replaces the older one.
    Replace,
}

/// What happens when a specification arrives for a job that already ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResubmitPolicy {
    /// Answer with the job's terminal reply.
    #[default]
    ReturnCached,
    /// Start a fresh job under the same token.
    Rerun,
}

const fn default_job_retention_secs() -> u64 {
    3600
}

/// Scheduler policy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Duplicate label handling.
    #[serde(default)]
    pub duplicate_labels: DuplicateLabelPolicy,
    /// Terminal job resubmission handling.
    #[serde(default)]
    pub resubmit: ResubmitPolicy,
    /// Seconds a terminal job is kept; zero keeps jobs forever.
    #[serde(default = "default_job_retention_secs")]
    pub job_retention_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            duplicate_labels: DuplicateLabelPolicy::default(),
            resubmit: ResubmitPolicy::default(),
            job_retention_secs: default_job_retention_secs(),
        }
    }
}

impl SchedulerSettings {
    /// Retention as a duration; `None` when pruning is disabled.
    #[must_use]
    pub const fn job_retention(&self) -> Option<Duration> {
        if self.job_retention_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.job_retention_secs))
        }
    }
}

const fn default_port() -> u16 {
    1228
}

const fn default_immediate_ms() -> u64 {
    5000
}

/// Passive role: HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// TCP port; zero binds an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interfaces to advertise and bind; the first one is used for both.
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Milliseconds a POST waits for a job to finish before answering with
    /// its receipt; zero answers at once.
    #[serde(default = "default_immediate_ms")]
    pub immediate_ms: u64,
    /// Advertise `https` links instead of `http`.
    #[serde(default)]
    pub tls: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            interfaces: Vec::new(),
            immediate_ms: default_immediate_ms(),
            tls: false,
        }
    }
}

impl ListenerConfig {
    /// Link stamped on capabilities served by this listener.
    #[must_use]
    pub fn capability_link(&self) -> Option<String> {
        let scheme = if self.tls { "https" } else { "http" };
        self.interfaces
            .first()
            .map(|iface| format!("{scheme}://{iface}:{}/", self.port))
    }

    /// Address to bind.
    #[must_use]
    pub fn bind_address(&self) -> String {
        let iface = self.interfaces.first().map_or("0.0.0.0", String::as_str);
        format!("{iface}:{}", self.port)
    }

    /// Bounded wait applied to POSTed specifications.
    #[must_use]
    pub const fn immediate_budget(&self) -> Duration {
        Duration::from_millis(self.immediate_ms)
    }
}

const fn default_idle_ms() -> u64 {
    5000
}

const fn default_reconnect_ms() -> u64 {
    5000
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Active role: client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiatorConfig {
    /// Where capabilities are registered.
    pub capability_url: String,
    /// Where specifications are polled.
    pub specification_url: String,
    /// Where receipts and results go when a specification carries no link.
    pub result_url: String,
    /// Whether this component is itself a supervisor; supervisors may
    /// register with no capabilities.
    #[serde(default)]
    pub supervisor: bool,
    /// Milliseconds between polls unless the peer sends a callback window.
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    /// Milliseconds between retries while the peer is unreachable.
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_ms: u64,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl InitiatorConfig {
    /// Config with default intervals.
    #[must_use]
    pub fn new(
        capability_url: impl Into<String>,
        specification_url: impl Into<String>,
        result_url: impl Into<String>,
    ) -> Self {
        Self {
            capability_url: capability_url.into(),
            specification_url: specification_url.into(),
            result_url: result_url.into(),
            supervisor: false,
            idle_ms: default_idle_ms(),
            reconnect_ms: default_reconnect_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    /// Default idle interval.
    #[must_use]
    pub const fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    /// Retry interval.
    #[must_use]
    pub const fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate URLs and intervals.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first bad field.
    pub fn validate(&self) -> Result<(), String> {
        for (name, url) in [
            ("capability_url", &self.capability_url),
            ("specification_url", &self.specification_url),
            ("result_url", &self.result_url),
        ] {
            let parsed = reqwest::Url::parse(url).map_err(|e| format!("{name}: {e}"))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(format!("{name} must be an http(s) URL, got `{url}`"));
            }
        }
        if self.idle_ms == 0 {
            return Err("idle_ms must be > 0".into());
        }
        if self.reconnect_ms == 0 {
            return Err("reconnect_ms must be > 0".into());
        }
        Ok(())
    }
}

/// Element registry sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry documents merged over the core elements, in order.
    #[serde(default)]
    pub preload: Vec<PathBuf>,
}

/// Role-based authorization tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    /// Identity to held roles.
    #[serde(default)]
    pub identities: BTreeMap<String, Vec<String>>,
    /// Capability label to roles allowed to use it.
    #[serde(default)]
    pub capabilities: BTreeMap<String, Vec<String>>,
}

/// How peer identities are determined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Fixed identity used for every peer.
    #[serde(default)]
    pub forged_identity: Option<String>,
    /// Request header carrying the caller identity, set by a TLS-terminating
    /// proxy.
    #[serde(default)]
    pub header: Option<String>,
}

/// Root component configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Passive role settings.
    #[serde(default)]
    pub listener: Option<ListenerConfig>,
    /// Active role settings.
    #[serde(default)]
    pub initiator: Option<InitiatorConfig>,
    /// Service modules to load: module id to its parameters.
    #[serde(default)]
    pub modules: BTreeMap<String, Map<String, Value>>,
    /// Element registry sources.
    #[serde(default)]
    pub registries: RegistryConfig,
    /// Scheduler policies.
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Authorization tables; everything is allowed when absent.
    #[serde(default)]
    pub authorization: Option<AuthorizationConfig>,
    /// Peer identity settings.
    #[serde(default)]
    pub identity: IdentityConfig,
}

impl ComponentConfig {
    /// Validate configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid section.
    pub fn validate(&self) -> Result<(), String> {
        if self.listener.is_none() && self.initiator.is_none() {
            return Err("either a listener or an initiator section is required".into());
        }
        if let Some(initiator) = &self.initiator {
            initiator.validate().map_err(|e| format!("initiator: {e}"))?;
        }
        if let (Some(_), Some(_)) = (&self.identity.forged_identity, &self.identity.header) {
            return Err("identity: forged_identity and header are mutually exclusive".into());
        }
        if self
            .identity
            .forged_identity
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err("identity: forged_identity must not be empty".into());
        }
        Ok(())
    }

    /// Deserialize configuration from JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON parsing fails.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
