use std::{hint::black_box, sync::Arc};

use bayeux_router::{pubsub::Inbox, Broker, BrokerConfig, LocalSession};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

fn subscribed(
    broker: &Broker,
    path: &str,
) -> (Arc<LocalSession>, Inbox) {
    let (session, inbox) = LocalSession::handshaken();
    broker.subscribe(&session.session_ref(), path).unwrap();
    (session, inbox)
}

fn bench_channel_lookup(c: &mut Criterion) {
    let broker = Broker::new(BrokerConfig::default());
    broker.channel("/a/b/c/d").unwrap();

    c.bench_function("channel_existing_depth4", |b| {
        b.iter(|| black_box(broker.channel("/a/b/c/d").unwrap()))
    });
    c.bench_function("get_channel_registry", |b| {
        b.iter(|| black_box(broker.get_channel("/a/b/c/d")))
    });
}

fn bench_subscribe_unsubscribe(c: &mut Criterion) {
    let broker = Broker::new(BrokerConfig::default());
    broker.channel("/chat").unwrap().set_persistent(true);
    let (session, _inbox) = LocalSession::handshaken();
    let sref = session.session_ref();

    c.bench_function("subscribe_unsubscribe", |b| {
        b.iter(|| {
            broker.subscribe(&sref, "/chat/room").unwrap();
            broker.unsubscribe(&sref, "/chat/room").unwrap();
        })
    });
}

fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fanout");
    for subscribers in [1usize, 10, 100] {
        let broker = Broker::new(BrokerConfig::default());
        let mut inboxes: Vec<_> = (0..subscribers)
            .map(|_| subscribed(&broker, "/fanout"))
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| {
                    broker.publish(None, "/fanout", black_box(json!(1))).unwrap();
                    for (_, inbox) in inboxes.iter_mut() {
                        inbox.drain();
                    }
                })
            },
        );
    }
    group.finish();
}

/// Публикация, проходящая через `*` и `**` на каждом уровне.
fn bench_publish_wildcards(c: &mut Criterion) {
    let broker = Broker::new(BrokerConfig::default());
    let mut inboxes = vec![
        subscribed(&broker, "/**"),
        subscribed(&broker, "/a/**"),
        subscribed(&broker, "/a/b/*"),
        subscribed(&broker, "/a/b/c"),
    ];

    c.bench_function("publish_wildcards_depth3", |b| {
        b.iter(|| {
            broker.publish(None, "/a/b/c", black_box(json!("x"))).unwrap();
            for (_, inbox) in inboxes.iter_mut() {
                inbox.drain();
            }
        })
    });
}

criterion_group!(
    benches,
    bench_channel_lookup,
    bench_subscribe_unsubscribe,
    bench_publish_fanout,
    bench_publish_wildcards
);
criterion_main!(benches);
