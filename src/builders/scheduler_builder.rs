//! Builders that assemble a scheduler from configuration and modules.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{ComponentConfig, RegistryConfig, SchedulerSettings};
use crate::core::{
    authorization_from_config, AuditSink, Authorization, AuthorizationOff, ModuleRegistry,
    Scheduler, SchedulerError,
};
use crate::model::ElementRegistry;
use crate::runtime::TokioSpawner;

/// Programmatic scheduler construction with sensible defaults: everything
/// authorized, core elements only, default policies.
pub struct SchedulerBuilder {
    authorization: Arc<dyn Authorization>,
    registry: Arc<ElementRegistry>,
    settings: SchedulerSettings,
    capability_link: Option<String>,
    audit: Option<Box<dyn AuditSink>>,
    spawner: Option<TokioSpawner>,
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self {
            authorization: Arc::new(AuthorizationOff),
            registry: Arc::new(ElementRegistry::core()),
            settings: SchedulerSettings::default(),
            capability_link: None,
            audit: None,
            spawner: None,
        }
    }
}

impl SchedulerBuilder {
    /// Builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an authorization gate.
    #[must_use]
    pub fn authorization(mut self, authorization: Arc<dyn Authorization>) -> Self {
        self.authorization = authorization;
        self
    }

    /// Use an element registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<ElementRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Use policy settings.
    #[must_use]
    pub fn settings(mut self, settings: SchedulerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Stamp this link on capabilities that carry none.
    #[must_use]
    pub fn capability_link(mut self, link: Option<String>) -> Self {
        self.capability_link = link;
        self
    }

    /// Record job events into `sink`.
    #[must_use]
    pub fn audit_sink(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Run job bodies on `spawner` instead of the current runtime.
    #[must_use]
    pub fn spawner(mut self, spawner: TokioSpawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Build the scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Configuration`] when no spawner was given
    /// and the caller is not inside a tokio runtime.
    pub fn build(self) -> Result<Scheduler, SchedulerError> {
        let spawner = match self.spawner {
            Some(spawner) => spawner,
            None => TokioSpawner::try_current()?,
        };
        let scheduler = Scheduler::new(self.authorization, self.registry, self.settings, spawner)
            .with_capability_link(self.capability_link);
        Ok(match self.audit {
            Some(sink) => scheduler.with_audit_sink(Arc::new(Mutex::new(sink))),
            None => scheduler,
        })
    }
}

/// Core elements plus every preloaded registry document.
///
/// # Errors
///
/// Returns [`SchedulerError::Configuration`] when a document cannot be read
/// or parsed.
pub fn build_registry(cfg: &RegistryConfig) -> Result<ElementRegistry, SchedulerError> {
    let mut registry = ElementRegistry::core();
    for path in &cfg.preload {
        let added = preload_file(&mut registry, path)?;
        tracing::info!(path = %path.display(), added, "element registry preloaded");
    }
    Ok(registry)
}

fn preload_file(registry: &mut ElementRegistry, path: &Path) -> Result<usize, SchedulerError> {
    let document = std::fs::read_to_string(path).map_err(|e| {
        SchedulerError::Configuration(format!("registry {}: {e}", path.display()))
    })?;
    registry
        .preload_json(&document)
        .map_err(|e| SchedulerError::Configuration(format!("registry {}: {e}", path.display())))
}

/// Build a scheduler from component configuration, instantiating every
/// configured module through `modules`.
///
/// # Errors
///
/// Returns [`SchedulerError::Configuration`] for invalid configuration,
/// unreadable registries, unknown modules or rejected services.
pub fn build_scheduler(
    cfg: &ComponentConfig,
    modules: &ModuleRegistry,
    spawner: TokioSpawner,
) -> Result<Scheduler, SchedulerError> {
    cfg.validate()
        .map_err(|e| SchedulerError::Configuration(format!("config invalid: {e}")))?;

    let registry = build_registry(&cfg.registries)?;
    let scheduler = SchedulerBuilder::new()
        .authorization(authorization_from_config(cfg.authorization.as_ref()))
        .registry(Arc::new(registry))
        .settings(cfg.scheduler.clone())
        .capability_link(cfg.listener.as_ref().and_then(|l| l.capability_link()))
        .spawner(spawner)
        .build()?;

    for (id, params) in &cfg.modules {
        for service in modules.services(id, params)? {
            scheduler.add_service(service)?;
        }
        tracing::info!(module = %id, "module loaded");
    }
    Ok(scheduler)
}
