//! Measurement services and the registry of module factories.
//!
//! A [`Service`] owns one capability and knows how to run specifications
//! against it. Modules are declared in configuration by id; the
//! [`ModuleRegistry`] maps each id to a factory producing services.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::{AppResult, SchedulerError};
use crate::model::{Capability, Message, Specification};

/// A measurement service bound to one capability.
///
/// `run` returns the terminal reply of the job: a result, an exception or an
/// envelope of results. Long-running bodies should watch `interrupt` and
/// return early, with whatever partial result they have, once it fires.
///
/// # Example
///
/// ```rust,ignore
/// struct Ping { capability: Capability }
///
/// #[async_trait]
/// impl Service for Ping {
///     fn capability(&self) -> &Capability { &self.capability }
///
///     async fn run(&self, spec: Specification, _interrupt: CancellationToken) -> AppResult<Message> {
///         Ok(MeasurementResult::for_specification(&spec).with_row(vec![1200.into()]).into())
///     }
/// }
/// ```
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// The capability this service implements.
    fn capability(&self) -> &Capability;

    /// Run one specification to completion.
    async fn run(&self, specification: Specification, interrupt: CancellationToken)
        -> AppResult<Message>;
}

/// Service whose body is a closure, handy for small modules and tests.
pub struct FnService<F> {
    capability: Capability,
    body: F,
}

impl<F> FnService<F> {
    /// Wrap `body` as the implementation of `capability`.
    #[must_use]
    pub fn new<Fut>(capability: Capability, body: F) -> Self
    where
        F: Fn(Specification, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<Message>> + Send + 'static,
    {
        Self { capability, body }
    }
}

#[async_trait]
impl<F, Fut> Service for FnService<F>
where
    F: Fn(Specification, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<Message>> + Send + 'static,
{
    fn capability(&self) -> &Capability {
        &self.capability
    }

    async fn run(
        &self,
        specification: Specification,
        interrupt: CancellationToken,
    ) -> AppResult<Message> {
        (self.body)(specification, interrupt).await
    }
}

/// Factory turning a module's configuration parameters into services.
pub type ServiceFactory =
    Box<dyn Fn(&Map<String, Value>) -> AppResult<Vec<Arc<dyn Service>>> + Send + Sync>;

/// Known service modules, keyed by the id used in configuration.
#[derive(Default)]
pub struct ModuleRegistry {
    factories: BTreeMap<String, ServiceFactory>,
}

impl ModuleRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `id`, replacing any earlier one.
    #[must_use]
    pub fn with_module<F>(mut self, id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> AppResult<Vec<Arc<dyn Service>>> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Box::new(factory));
        self
    }

    /// Whether a module id is known.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Known module ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiate the services of module `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Configuration`] for unknown ids or when the
    /// factory rejects its parameters.
    pub fn services(
        &self,
        id: &str,
        params: &Map<String, Value>,
    ) -> Result<Vec<Arc<dyn Service>>, SchedulerError> {
        let factory = self
            .factories
            .get(id)
            .ok_or_else(|| SchedulerError::Configuration(format!("unknown module `{id}`")))?;
        factory(params)
            .map_err(|e| SchedulerError::Configuration(format!("module `{id}`: {e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MeasurementResult;

    fn echo_module(params: &Map<String, Value>) -> AppResult<Vec<Arc<dyn Service>>> {
        let label = params
            .get("label")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("missing `label`"))?
            .to_string();
        let service: Arc<dyn Service> =
            Arc::new(FnService::new(Capability::new(label), |spec, _| async move {
                Ok(Message::from(MeasurementResult::for_specification(&spec)))
            }));
        Ok(vec![service])
    }

    #[test]
    fn test_module_lookup() {
        let registry = ModuleRegistry::new().with_module("echo", echo_module);
        assert!(registry.contains("echo"));
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["echo"]);

        let mut params = Map::new();
        params.insert("label".into(), Value::from("echo-test"));
        let services = registry.services("echo", &params).unwrap();
        assert_eq!(services[0].capability().label, "echo-test");
    }

    #[test]
    fn test_unknown_module_and_bad_params() {
        let registry = ModuleRegistry::new().with_module("echo", echo_module);
        assert!(matches!(
            registry.services("nope", &Map::new()),
            Err(SchedulerError::Configuration(_))
        ));
        let err = registry.services("echo", &Map::new()).err().unwrap();
        assert!(err.to_string().contains("missing `label`"));
    }

    #[tokio::test]
    async fn test_fn_service_runs_body() {
        let cap = Capability::new("echo-test");
        let service = FnService::new(cap.clone(), |spec, _| async move {
            Ok(Message::from(MeasurementResult::for_specification(&spec)))
        });
        let spec = Specification::from_capability(&cap, "now ... now + 1s".parse().unwrap());
        let reply = service.run(spec.clone(), CancellationToken::new()).await.unwrap();
        assert_eq!(reply.token(), spec.token());
    }
}
