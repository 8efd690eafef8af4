//! Tests for builder modules

use std::io::Write;
use std::sync::Arc;

use measurement_plane::builders::{build_registry, build_scheduler, SchedulerBuilder};
use measurement_plane::config::{ComponentConfig, RegistryConfig};
use measurement_plane::core::{AppResult, FnService, ModuleRegistry, SchedulerError, Service};
use measurement_plane::model::{Capability, MeasurementResult, Message, Primitive};
use measurement_plane::runtime::TokioSpawner;

fn ping_module(params: &serde_json::Map<String, serde_json::Value>) -> AppResult<Vec<Arc<dyn Service>>> {
    let label = params
        .get("label")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("ping-test")
        .to_string();
    let cap = Capability::new(label)
        .with_parameter("destination.ip4", "*".parse()?)
        .with_result("delay.twoway.icmp.us");
    let service: Arc<dyn Service> = Arc::new(FnService::new(cap, |spec, _| async move {
        Ok(Message::from(MeasurementResult::for_specification(&spec)))
    }));
    Ok(vec![service])
}

#[tokio::test]
async fn test_scheduler_builder_defaults() {
    let scheduler = SchedulerBuilder::new().build().unwrap();
    assert_eq!(scheduler.job_count(), 0);
    assert!(scheduler.capability_keys().is_empty());
    assert!(scheduler.registry().primitive("destination.ip4").is_some());
}

#[tokio::test]
async fn test_build_scheduler_loads_modules() {
    let cfg = ComponentConfig::from_json_str(
        r#"{"listener": {"port": 9000, "interfaces": ["probe.local"]},
            "modules": {"ping": {"label": "ping-average-ip4"}}}"#,
    )
    .unwrap();
    let modules = ModuleRegistry::new().with_module("ping", ping_module);
    let scheduler = build_scheduler(&cfg, &modules, TokioSpawner::try_current().unwrap()).unwrap();

    assert_eq!(scheduler.capability_keys(), vec!["ping-average-ip4".to_string()]);
    match scheduler.capability_for_key("ping-average-ip4").unwrap() {
        Message::Capability(cap) => assert_eq!(cap.link.as_deref(), Some("http://probe.local:9000/")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_build_scheduler_unknown_module() {
    let cfg = ComponentConfig::from_json_str(r#"{"listener": {}, "modules": {"trace": {}}}"#).unwrap();
    let modules = ModuleRegistry::new().with_module("ping", ping_module);
    let err = build_scheduler(&cfg, &modules, TokioSpawner::try_current().unwrap())
        .err()
        .unwrap();
    assert!(matches!(err, SchedulerError::Configuration(_)));
}

#[test]
fn test_build_registry_preloads_files() {
    let path = std::env::temp_dir().join(format!("registry-{}.json", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
        file,
        r#"{{"registry-uri": "http://example.org/reg", "elements": [{{"name": "jitter.us", "prim": "natural"}}]}}"#
    )
    .unwrap();

    let registry = build_registry(&RegistryConfig {
        preload: vec![path.clone()],
    })
    .unwrap();
    assert_eq!(registry.primitive("jitter.us"), Some(Primitive::Natural));
    std::fs::remove_file(path).unwrap();

    let missing = build_registry(&RegistryConfig {
        preload: vec!["/nonexistent/registry.json".into()],
    });
    assert!(matches!(missing, Err(SchedulerError::Configuration(_))));
}
