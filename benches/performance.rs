//! Performance benchmarks for the event publisher.

use changefeed::subscribe::filter_by_auth;
use changefeed::{
    Authorizer, CatalogOp, CheckServiceNode, Context, Decision, Event, EventPublisher, Node,
    PublisherConfig, ServiceHealthUpdate, ServiceInstance, Snapshot, SnapshotHandlers,
    SubscribeRequest, Topic,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

fn health(service: &str, index: u64) -> Event {
    Event::new(
        Topic::ServiceHealth,
        service,
        index,
        ServiceHealthUpdate {
            op: CatalogOp::Register,
            check_service_node: CheckServiceNode {
                node: Some(Node {
                    name: "node1".to_string(),
                    address: "10.0.0.1".to_string(),
                    datacenter: "dc1".to_string(),
                }),
                service: Some(ServiceInstance {
                    id: format!("{}-1", service),
                    service: service.to_string(),
                    port: 8080,
                    tags: vec![],
                }),
                checks: vec![],
            },
        },
    )
}

fn snapshot_of(size: usize) -> SnapshotHandlers {
    SnapshotHandlers::new().with(Topic::ServiceHealth, move |req| {
        Ok(Snapshot {
            events: (0..size).map(|_| health(&req.key, 1)).collect(),
            index: 1,
        })
    })
}

fn publisher(size: usize, ttl: Duration) -> EventPublisher {
    EventPublisher::new(
        snapshot_of(size),
        PublisherConfig {
            idle_buffer_ttl: ttl,
            ..PublisherConfig::default()
        },
    )
}

/// Benchmark one publish consumed by a growing number of subscribers
fn bench_publish_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fan_out");

    for subscribers in [1, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &count| {
                let publisher = publisher(1, Duration::from_secs(10));
                let ctx = Context::new();
                let mut subs: Vec<_> = (0..count)
                    .map(|_| {
                        publisher
                            .subscribe(SubscribeRequest::new(Topic::ServiceHealth, "web"))
                            .unwrap()
                    })
                    .collect();

                // Drain snapshot and end marker
                for sub in subs.iter_mut() {
                    sub.next(&ctx).unwrap();
                    sub.next(&ctx).unwrap();
                }

                let mut index = 1;
                b.iter(|| {
                    index += 1;
                    publisher.publish(vec![health("web", index)]).unwrap();
                    for sub in subs.iter_mut() {
                        black_box(sub.next(&ctx).unwrap());
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark subscribing to a buffer that already exists
fn bench_subscribe_reuse(c: &mut Criterion) {
    let publisher = publisher(100, Duration::from_secs(10));
    let _holder = publisher
        .subscribe(SubscribeRequest::new(Topic::ServiceHealth, "web"))
        .unwrap();

    c.bench_function("subscribe_reuse", |b| {
        b.iter(|| {
            black_box(
                publisher
                    .subscribe(SubscribeRequest::new(Topic::ServiceHealth, "web"))
                    .unwrap(),
            );
        });
    });
}

/// Benchmark subscribing when a snapshot must be built
fn bench_subscribe_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("subscribe_snapshot");

    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("snapshot_events", size), &size, |b, &size| {
            // Buffers are discarded as soon as the subscription drops
            let publisher = publisher(size, Duration::ZERO);
            b.iter(|| {
                black_box(
                    publisher
                        .subscribe(SubscribeRequest::new(Topic::ServiceHealth, "web"))
                        .unwrap(),
                );
            });
        });
    }

    group.finish();
}

struct HalfVisible;

impl Authorizer for HalfVisible {
    fn node_read(&self, _node: &str) -> Decision {
        Decision::Allow
    }

    fn service_read(&self, service: &str) -> Decision {
        if service.ends_with(['0', '2', '4', '6', '8']) {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// Benchmark ACL filtering of snapshot batches
fn bench_filter_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_batch");

    for size in [10, 100, 1000] {
        let entries = (0..size).map(|i| health(&format!("svc{}", i), 1)).collect();
        let batch = Event::batch(Topic::ServiceHealth, "", 1, entries);
        group.bench_with_input(BenchmarkId::new("entries", size), &batch, |b, batch| {
            b.iter(|| black_box(filter_by_auth(Some(&HalfVisible), batch)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_publish_fan_out,
    bench_subscribe_reuse,
    bench_subscribe_snapshot,
    bench_filter_batch,
);

criterion_main!(benches);
