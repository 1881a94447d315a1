//! Benchmarks for connection registry churn
//!
//! - Connect/disconnect cycles for a single user with many live connections
//! - Snapshot reads while the map holds many users

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use sandbox_client_sdk::relay::ConnectionRegistry;

fn bench_churn(c: &mut Criterion) {
    let registry = ConnectionRegistry::new();
    for id in 0..1_000 {
        registry.on_connected("busy-user", &format!("conn-{id}"));
    }

    c.bench_function("registry_connect_disconnect", |b| {
        b.iter(|| {
            registry.on_connected(black_box("busy-user"), black_box("transient"));
            registry.on_disconnected(black_box("busy-user"), black_box("transient"));
        });
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let registry = ConnectionRegistry::new();
    for user in 0..10_000 {
        for id in 0..4 {
            registry.on_connected(&format!("user-{user}"), &format!("conn-{user}-{id}"));
        }
    }

    c.bench_function("registry_connections_for", |b| {
        b.iter(|| registry.connections_for(black_box("user-4242")));
    });
}

criterion_group!(benches, bench_churn, bench_snapshot);
criterion_main!(benches);
