//! State shared by both component roles.

use std::sync::Arc;

use super::identity::{identity_from_config, PeerIdentity};
use super::ComponentError;
use crate::builders::build_scheduler;
use crate::config::ComponentConfig;
use crate::core::{ModuleRegistry, Scheduler, SchedulerError};
use crate::model::Withdrawal;
use crate::runtime::TokioSpawner;

/// Configuration, scheduler and identity extractor of one component.
#[derive(Clone)]
pub struct BaseComponent {
    config: Arc<ComponentConfig>,
    scheduler: Arc<Scheduler>,
    identity: Arc<dyn PeerIdentity>,
}

impl BaseComponent {
    /// Build the scheduler from `config`, loading services from `modules`.
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns scheduler configuration errors and identity setup errors.
    pub fn new(config: ComponentConfig, modules: &ModuleRegistry) -> Result<Self, ComponentError> {
        let spawner = TokioSpawner::try_current()?;
        let scheduler = build_scheduler(&config, modules, spawner)?;
        let identity = identity_from_config(&config.identity)?;
        Ok(Self::from_parts(config, Arc::new(scheduler), identity))
    }

    /// Assemble from already-built parts.
    #[must_use]
    pub fn from_parts(
        config: ComponentConfig,
        scheduler: Arc<Scheduler>,
        identity: Arc<dyn PeerIdentity>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            scheduler,
            identity,
        }
    }

    /// Component configuration.
    #[must_use]
    pub fn config(&self) -> &ComponentConfig {
        &self.config
    }

    /// The scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// The identity extractor.
    #[must_use]
    pub const fn identity(&self) -> &Arc<dyn PeerIdentity> {
        &self.identity
    }

    /// Withdraw a capability locally.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotFound`] for unknown labels.
    pub fn remove_capability(&self, label: &str) -> Result<Withdrawal, ComponentError> {
        self.scheduler.remove_service(label).map_err(|e| {
            if let SchedulerError::NotFound(_) = e {
                tracing::warn!(label, "no such service");
            }
            e.into()
        })
    }
}
