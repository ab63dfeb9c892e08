//! Chase-Lev deque micro-benchmarks
//!
//! Measures owner-side push/pop throughput in isolation, and owner-vs-stealer
//! contention under a fixed number of concurrent stealers.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::thread;
use vtask_runtime::deque::{Deque, Steal};

fn bench_owner_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("deque_owner");

    group.bench_function("push_pop_uncontended", |b| {
        let deque: Deque<u64> = Deque::new(1024);
        b.iter(|| {
            deque.push(black_box(1)).ok();
            black_box(deque.pop());
        });
    });

    group.finish();
}

fn bench_steal_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("deque_steal");
    group.sample_size(20);

    group.bench_function("owner_pop_vs_4_stealers", |b| {
        b.iter_custom(|iters| {
            let deque = Arc::new(Deque::new(4096));
            for _ in 0..iters {
                deque.push(1u64).ok();
            }

            let consumed = Arc::new(std::sync::atomic::AtomicU64::new(0));
            let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
            let stealers: Vec<_> = (0..4)
                .map(|_| {
                    let deque = deque.clone();
                    let stop = stop.clone();
                    let consumed = consumed.clone();
                    thread::spawn(move || {
                        while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                            match deque.steal() {
                                Steal::Success(v) => {
                                    black_box(v);
                                    consumed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                                }
                                Steal::Empty | Steal::Retry => thread::yield_now(),
                            }
                        }
                    })
                })
                .collect();

            let start = std::time::Instant::now();
            while consumed.load(std::sync::atomic::Ordering::Relaxed) < iters {
                if deque.pop().is_some() {
                    consumed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
            }
            let elapsed = start.elapsed();

            stop.store(true, std::sync::atomic::Ordering::Relaxed);
            for t in stealers {
                let _ = t.join();
            }

            elapsed
        });
    });

    group.finish();
}

criterion_group!(benches, bench_owner_push_pop, bench_steal_contention);
criterion_main!(benches);
