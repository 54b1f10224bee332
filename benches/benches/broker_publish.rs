use std::hint::black_box;

use bytes::Bytes;
use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};
use fleetcast::{pubsub::Broker, ChangeBus, PositionRecord, TelemetryStore};

fn bench_publish_no_subscribers(c: &mut Criterion) {
    let broker = Broker::new(1024);
    c.bench_function("broker_publish_0_subs", |b| {
        b.iter(|| black_box(broker.publish("telemetry:position:update", Bytes::from_static(b"{}"))))
    });
}

fn bench_publish_pattern_subscriber(c: &mut Criterion) {
    let broker = Broker::new(1024);
    // буфер канала кольцевой: непрочитанные сообщения вытесняются
    let _sub = broker.psubscribe("telemetry:*:update").unwrap();
    c.bench_function("broker_publish_pattern_sub", |b| {
        b.iter(|| black_box(broker.publish("telemetry:position:update", Bytes::from_static(b"{}"))))
    });
}

fn bench_bus_publish_position(c: &mut Criterion) {
    let bus = ChangeBus::new(1024);
    let publisher = bus.publisher();
    let position = PositionRecord::new(1.0, 2.0, 0.0, 45.0, Utc::now()).unwrap();
    c.bench_function("bus_publish_position_encode", |b| {
        b.iter(|| publisher.publish_position(black_box("veh-1"), &position))
    });
}

fn bench_store_roundtrip(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let store = TelemetryStore::in_memory();
    let position = PositionRecord::new(1.0, 2.0, 0.0, 45.0, Utc::now()).unwrap();
    c.bench_function("store_set_get_position", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.set_position("veh-1", &position).await.unwrap();
                black_box(store.get_position("veh-1").await.unwrap())
            })
        })
    });
}

criterion_group!(
    benches,
    bench_publish_no_subscribers,
    bench_publish_pattern_subscriber,
    bench_bus_publish_position,
    bench_store_roundtrip
);
criterion_main!(benches);
