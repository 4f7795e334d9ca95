use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use synclet_core::{LocalBroadcaster, MemoryEngine, Signal, SyncedOptions, SyncedSignal};

fn signal_read_write(c: &mut Criterion) {
    let signal = Signal::new(0u64);
    c.bench_function("signal_get", |b| b.iter(|| black_box(signal.get())));
    c.bench_function("signal_set", |b| {
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            signal.set(black_box(n));
        })
    });
}

fn synced_set_value(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("failed to build runtime");
    let _guard = runtime.enter();

    let hub = LocalBroadcaster::new();
    let signal = SyncedSignal::new(
        SyncedOptions::new("bench"),
        0u64,
        Arc::new(MemoryEngine::new()),
        &hub,
    )
    .expect("failed to create signal");
    runtime.block_on(signal.wait_until_ready());

    c.bench_function("synced_get", |b| b.iter(|| black_box(signal.get())));
    c.bench_function("synced_set_value", |b| {
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            signal.set_value(black_box(n));
        })
    });

    runtime.block_on(signal.flush());
    signal.dispose();
}

criterion_group!(benches, signal_read_write, synced_set_value);
criterion_main!(benches);
