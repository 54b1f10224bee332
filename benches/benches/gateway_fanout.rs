use std::hint::black_box;

use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use fleetcast::{BroadcastGateway, PositionRecord};

/// Рассылка одной позиции N клиентам общей комнаты; очереди дренируются
/// после каждой итерации, чтобы не упереться в переполнение.
fn bench_fanout_all_room(c: &mut Criterion) {
    let position = PositionRecord::new(1.0, 2.0, 0.0, 45.0, Utc::now()).unwrap();
    let mut group = c.benchmark_group("gateway_fanout_all");

    for clients in [1usize, 10, 100, 1000] {
        let gw = BroadcastGateway::new(16);
        let mut receivers: Vec<_> = (0..clients)
            .map(|_| {
                let (id, rx) = gw.connect();
                gw.subscribe_all(id).unwrap();
                rx
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(clients), &clients, |b, _| {
            b.iter(|| {
                black_box(gw.broadcast_position("veh-1", &position));
                for rx in receivers.iter_mut() {
                    while rx.try_recv().is_ok() {}
                }
            })
        });
    }
    group.finish();
}

/// Клиенты в обеих комнатах: проверка стоимости дедупликации.
fn bench_fanout_overlapping_rooms(c: &mut Criterion) {
    let position = PositionRecord::new(1.0, 2.0, 0.0, 45.0, Utc::now()).unwrap();
    let gw = BroadcastGateway::new(16);
    let mut receivers: Vec<_> = (0..100)
        .map(|_| {
            let (id, rx) = gw.connect();
            gw.subscribe_all(id).unwrap();
            gw.subscribe_vehicle(id, "veh-1").unwrap();
            rx
        })
        .collect();

    c.bench_function("gateway_fanout_overlap_100", |b| {
        b.iter(|| {
            black_box(gw.broadcast_position("veh-1", &position));
            for rx in receivers.iter_mut() {
                while rx.try_recv().is_ok() {}
            }
        })
    });
}

fn bench_subscribe_churn(c: &mut Criterion) {
    let gw = BroadcastGateway::new(16);
    c.bench_function("gateway_connect_subscribe_disconnect", |b| {
        b.iter(|| {
            let (id, _rx) = gw.connect();
            gw.subscribe_vehicle(id, "veh-1").unwrap();
            gw.subscribe_all(id).unwrap();
            black_box(gw.disconnect(id));
        })
    });
}

criterion_group!(
    benches,
    bench_fanout_all_room,
    bench_fanout_overlapping_rooms,
    bench_subscribe_churn
);
criterion_main!(benches);
