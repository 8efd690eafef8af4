//! Benchmarks for the message hot paths.
//!
//! - Fulfillment matching of a specification against capabilities
//! - Wire codec parse/unparse
//! - Scheduler intake from specification to terminal reply

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use measurement_plane::builders::SchedulerBuilder;
use measurement_plane::config::SchedulerSettings;
use measurement_plane::core::FnService;
use measurement_plane::model::{
    self, Capability, Envelope, MeasurementResult, Message, Specification,
};
use measurement_plane::runtime::TokioSpawner;
use tokio::runtime::Runtime;

fn ping(label: &str) -> Capability {
    Capability::new(label)
        .with_parameter("destination.ip4", "10.0.0.0 ... 10.0.255.255".parse().unwrap())
        .with_parameter("count", "1 ... 100".parse().unwrap())
        .with_result("delay.twoway.icmp.us")
}

fn spec_for(capability: &Capability) -> Specification {
    Specification::from_capability(capability, "now ... now + 30s".parse().unwrap())
        .with_parameter("destination.ip4", "10.0.17.4")
        .with_parameter("count", "10")
}

fn bench_fulfillment(c: &mut Criterion) {
    let mut group = c.benchmark_group("fulfillment");

    for size in [1_u64, 16, 256] {
        let capabilities: Vec<Capability> =
            (0..size).map(|i| ping(&format!("ping-{i}"))).collect();
        let target = spec_for(&capabilities[capabilities.len() - 1]);
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                black_box(
                    capabilities
                        .iter()
                        .position(|cap| black_box(&target).fulfills(cap)),
                )
            });
        });
    }

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let cap = ping("ping-codec");
    let spec = spec_for(&cap);
    let result = MeasurementResult::for_specification(&spec)
        .with_row(vec![1200.into()])
        .with_row(vec![1350.into()]);
    let envelope: Message = Envelope::from_iter([
        Message::from(cap),
        Message::from(spec.clone()),
        Message::from(result),
    ])
    .into();
    let wire = model::unparse(&envelope).unwrap();

    group.bench_function("unparse_specification", |b| {
        let message = Message::from(spec.clone());
        b.iter(|| black_box(model::unparse(black_box(&message)).unwrap()));
    });
    group.bench_function("parse_envelope", |b| {
        b.iter(|| black_box(model::parse(black_box(&wire)).unwrap()));
    });
    group.bench_function("specification_token", |b| {
        b.iter(|| black_box(black_box(&spec).token()));
    });

    group.finish();
}

fn bench_scheduler_intake(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_intake");
    let runtime = Runtime::new().unwrap();

    let scheduler = {
        let _guard = runtime.enter();
        let settings = SchedulerSettings {
            job_retention_secs: 1,
            ..SchedulerSettings::default()
        };
        let scheduler = SchedulerBuilder::new()
            .settings(settings)
            .spawner(TokioSpawner::new(runtime.handle().clone()))
            .build()
            .unwrap();
        scheduler
            .add_service(Arc::new(FnService::new(ping("ping-bench"), |spec, _| async move {
                Ok(Message::from(
                    MeasurementResult::for_specification(&spec).with_row(vec![1200.into()]),
                ))
            })))
            .unwrap();
        Arc::new(scheduler)
    };
    let template = spec_for(&ping("ping-bench"));
    let counter = Arc::new(AtomicU64::new(0));

    group.bench_function("receipt_only", |b| {
        b.iter(|| {
            let token = format!("r-{}", counter.fetch_add(1, Ordering::Relaxed));
            let spec = template.clone().with_token(token);
            black_box(scheduler.process_message("bench", spec.into(), None).unwrap())
        });
    });

    group.bench_function("to_result", |b| {
        b.to_async(&runtime).iter(|| {
            let scheduler = scheduler.clone();
            let token = format!("t-{}", counter.fetch_add(1, Ordering::Relaxed));
            let spec = template.clone().with_token(token);
            async move {
                let receipt = scheduler.process_message("bench", spec.into(), None).unwrap();
                let job = scheduler.job_for_message(&receipt).unwrap();
                black_box(job.wait_terminal().await)
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_fulfillment, bench_codec, bench_scheduler_intake);
criterion_main!(benches);
