use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pubsub_facade::backend::memory::InMemoryBackend;
use pubsub_facade::backend::MessagingBackend;
use pubsub_facade::types::{Attributes, OutgoingMessage, SubscriptionConfig, TopicConfig};
use pubsub_facade::{ClientOptions, PubSub};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

/// Create a topic with one subscription on a fresh backend
async fn create_test_subscription(backend: &InMemoryBackend) -> (String, String) {
    let id = uuid::Uuid::new_v4().simple().to_string();
    let topic = format!("projects/bench-project/topics/bench-{}", id);
    let subscription = format!("projects/bench-project/subscriptions/bench-{}", id);

    backend.create_topic(TopicConfig::new(&topic)).await.unwrap();
    backend
        .create_subscription(SubscriptionConfig {
            name: subscription.clone(),
            topic: topic.clone(),
            ack_deadline_seconds: 60,
        })
        .await
        .unwrap();
    (topic, subscription)
}

/// Benchmark backend publish with different payload sizes
fn bench_publish(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("publish");

    for size in [100, 1024, 10240, 102400].iter() {
        let backend = InMemoryBackend::new();
        let (topic, _) = rt.block_on(create_test_subscription(&backend));
        let body = vec![b'x'; *size];

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.to_async(&rt).iter(|| async {
                let msg = OutgoingMessage::new(body.clone());
                black_box(backend.publish(&topic, msg).await.unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark publish fan-out across several subscriptions
fn bench_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("fan_out");

    for subscriptions in [1, 10, 50].iter() {
        let backend = InMemoryBackend::new();
        let (topic, _) = rt.block_on(create_test_subscription(&backend));
        for i in 1..*subscriptions {
            rt.block_on(backend.create_subscription(SubscriptionConfig {
                name: format!("projects/bench-project/subscriptions/fan-{}-{}", subscriptions, i),
                topic: topic.clone(),
                ack_deadline_seconds: 60,
            }))
            .unwrap();
        }

        group.throughput(Throughput::Elements(*subscriptions as u64));
        group.bench_with_input(BenchmarkId::from_parameter(subscriptions), subscriptions, |b, _| {
            b.to_async(&rt).iter(|| async {
                black_box(backend.publish(&topic, OutgoingMessage::new("fan")).await.unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark publish, pull and ack of a batch
fn bench_pull_ack(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("pull_ack");

    for batch in [1u32, 10, 100].iter() {
        let backend = InMemoryBackend::new();
        let (topic, subscription) = rt.block_on(create_test_subscription(&backend));

        group.throughput(Throughput::Elements(*batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            b.to_async(&rt).iter(|| async {
                for _ in 0..batch {
                    backend.publish(&topic, OutgoingMessage::new("work")).await.unwrap();
                }
                let deliveries = backend.pull(&subscription, batch).await.unwrap();
                for delivery in deliveries {
                    delivery.ack().await.unwrap();
                }
            });
        });
    }
    group.finish();
}

/// Benchmark the facade's publish path including validation and metrics
fn bench_facade_publish_with_attributes(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let backend = Arc::new(InMemoryBackend::new());
    let pubsub = PubSub::with_backend_and_options("bench-project", backend, ClientOptions::in_memory()).unwrap();
    let cancel = CancellationToken::new();
    rt.block_on(pubsub.ensure_topic("facade-bench", &cancel)).unwrap();

    let mut attributes = Attributes::new();
    attributes.insert("priority".to_string(), "high".to_string());
    attributes.insert("origin".to_string(), "bench".to_string());

    c.bench_function("facade_publish_with_attributes", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(
                pubsub
                    .publish_with_attributes("facade-bench", "payload", attributes.clone(), &cancel)
                    .await
                    .unwrap(),
            );
        });
    });
}

criterion_group!(
    benches,
    bench_publish,
    bench_fan_out,
    bench_pull_ack,
    bench_facade_publish_with_attributes,
);
criterion_main!(benches);
