//! Benchmarks for change propagation
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::reactive::{batch, computed, effect, signal, Signal};
use ripple_core::storage::{MemoryBackend, StoreBridge};
use ripple_core::BridgeConfig;

fn bench_signal_set_with_effect(c: &mut Criterion) {
    let s = signal(0u64);
    let reader = s.clone();
    let e = effect(move || {
        black_box(reader.get());
    });

    let mut n = 0u64;
    c.bench_function("signal_set_with_effect", |b| {
        b.iter(|| {
            n += 1;
            s.set(black_box(n));
        })
    });
    e.dispose();
}

fn bench_memo_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("memo_chain");
    for depth in [10usize, 100] {
        let source = signal(0u64);
        let mut tail = {
            let s = source.clone();
            computed(move || s.get() + 1)
        };
        for _ in 1..depth {
            let prev = tail.clone();
            tail = computed(move || prev.get() + 1);
        }

        let mut n = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                n += 1;
                source.set(n);
                black_box(tail.get())
            })
        });
    }
    group.finish();
}

fn bench_batched_fan_out(c: &mut Criterion) {
    let sources: Vec<Signal<u64>> = (0..100).map(|_| signal(0)).collect();
    let readers = sources.clone();
    let e = effect(move || {
        black_box(readers.iter().map(|s| s.get()).sum::<u64>());
    });

    let mut n = 0u64;
    c.bench_function("batch_100_writes", |b| {
        b.iter(|| {
            n += 1;
            batch(|| {
                for s in &sources {
                    s.set(n);
                }
            })
        })
    });
    e.dispose();
}

fn bench_bridge_read(c: &mut Criterion) {
    let store = StoreBridge::new(MemoryBackend::new(), BridgeConfig::new("bench")).unwrap();
    let _ = store.set("key", "value");
    c.bench_function("bridge_get", |b| {
        b.iter(|| black_box(store.get::<String>("key")))
    });
}

criterion_group!(
    benches,
    bench_signal_set_with_effect,
    bench_memo_chain,
    bench_batched_fan_out,
    bench_bridge_read,
);
criterion_main!(benches);
