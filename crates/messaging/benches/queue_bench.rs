use criterion::{Criterion, criterion_group, criterion_main};
use messaging::{InMemoryMessageQueue, MessageQueue};

fn payload() -> serde_json::Value {
    serde_json::json!({
        "to": "a@b.com",
        "subject": "Hi",
        "template": "welcome",
        "context": {"name": "Ana"}
    })
}

fn bench_publish(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("queue/publish", |b| {
        b.iter(|| {
            rt.block_on(async {
                let queue = InMemoryMessageQueue::new();
                queue
                    .publish("notification.email", payload())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_publish_receive_ack(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let queue = InMemoryMessageQueue::new();

    c.bench_function("queue/publish_receive_ack", |b| {
        b.iter(|| {
            rt.block_on(async {
                queue
                    .publish("notification.email", payload())
                    .await
                    .unwrap();
                let envelope = queue.receive().await.unwrap().unwrap();
                queue.ack(envelope.id, envelope.attempts).await.unwrap();
            });
        });
    });
}

fn bench_receive_with_backlog(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let queue = InMemoryMessageQueue::new();
    rt.block_on(async {
        for _ in 0..1_000 {
            queue
                .publish("notification.email", payload())
                .await
                .unwrap();
        }
    });

    c.bench_function("queue/receive_retry_with_1000_backlog", |b| {
        b.iter(|| {
            rt.block_on(async {
                let envelope = queue.receive().await.unwrap().unwrap();
                queue
                    .retry(envelope.id, envelope.attempts, "bench", chrono::Utc::now())
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_publish,
    bench_publish_receive_ack,
    bench_receive_with_backlog
);
criterion_main!(benches);
