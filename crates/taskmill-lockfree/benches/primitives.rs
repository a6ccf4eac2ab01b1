//! Benchmarks for the concurrent primitives.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::thread;

use taskmill_base::utils::SplitMix64;
use taskmill_lockfree::{AtomicF64, ConcurrentCounter, ConcurrentIndex};

fn bench_cell_add(c: &mut Criterion) {
    c.bench_function("cell_get_and_add", |b| {
        let cell = AtomicF64::new(0.0);
        b.iter(|| cell.get_and_add(black_box(1.0)));
    });
}

fn bench_counter_contended(c: &mut Criterion) {
    c.bench_function("counter_contended_increment", |b| {
        b.iter(|| {
            let counter = Arc::new(ConcurrentCounter::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let ctr = Arc::clone(&counter);
                    thread::spawn(move || {
                        let mut rng = SplitMix64::new(t);
                        for _ in 0..1000 {
                            ctr.increment_count(rng.next_below(16), 1.0);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            black_box(counter.total_count())
        });
    });
}

fn bench_index_add(c: &mut Criterion) {
    c.bench_function("index_add_mostly_hits", |b| {
        b.iter(|| {
            let index = Arc::new(ConcurrentIndex::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let idx = Arc::clone(&index);
                    thread::spawn(move || {
                        let mut rng = SplitMix64::new(t);
                        for _ in 0..1000 {
                            idx.add_to_index(rng.next_below(64));
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            black_box(index.len())
        });
    });
}

criterion_group!(benches, bench_cell_add, bench_counter_contended, bench_index_add);
criterion_main!(benches);
