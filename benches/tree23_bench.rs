//! Benchmark for Persistent23Tree vs standard BTreeSet.
//!
//! Compares insert, lookup, and iteration across the copy-on-write
//! snapshot boundary against Rust's standard BTreeSet.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use evergreen::persistent::Persistent23Tree;
use std::collections::BTreeSet;

// =============================================================================
// add Benchmark
// =============================================================================

fn benchmark_add(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("add");

    for size in [100, 1000, 10000] {
        group.bench_with_input(
            BenchmarkId::new("Persistent23Tree", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    let tree = Persistent23Tree::new();
                    let mut write = tree.begin_write();
                    for index in 0..size {
                        write.add(black_box(index));
                    }
                    assert!(write.end_write());
                    black_box(tree)
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("BTreeSet", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    let mut set = BTreeSet::new();
                    for index in 0..size {
                        set.insert(black_box(index));
                    }
                    black_box(set)
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// get Benchmark
// =============================================================================

fn benchmark_get(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("get");

    for size in [100, 1000, 10000] {
        let tree = Persistent23Tree::new();
        let mut write = tree.begin_write();
        for index in 0..size {
            write.add(index);
        }
        assert!(write.end_write());
        let snapshot = tree.begin_read();

        let set: BTreeSet<i32> = (0..size).collect();

        group.bench_with_input(
            BenchmarkId::new("Persistent23Tree", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    for index in 0..size {
                        black_box(snapshot.contains(&black_box(index)));
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("BTreeSet", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    for index in 0..size {
                        black_box(set.contains(&black_box(index)));
                    }
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// snapshot churn Benchmark
// =============================================================================

fn benchmark_versioned_updates(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("versioned_updates");

    for size in [100, 1000] {
        let tree = Persistent23Tree::new();
        let mut write = tree.begin_write();
        for index in 0..size {
            write.add(index);
        }
        assert!(write.end_write());

        // Each round opens a write view, flips one key, and commits,
        // measuring the cost of a minimal new version.
        group.bench_with_input(BenchmarkId::new("single_key_commit", size), &size, |bencher, &size| {
            let mut round = 0;
            bencher.iter(|| {
                let mut write = tree.begin_write();
                let key = round % size;
                write.remove(&key);
                write.add(key);
                round += 1;
                assert!(write.end_write());
            });
        });
    }

    group.finish();
}

// =============================================================================
// iteration Benchmark
// =============================================================================

fn benchmark_iteration(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("iteration");

    for size in [1000, 10000] {
        let tree = Persistent23Tree::new();
        let mut write = tree.begin_write();
        for index in 0..size {
            write.add(index);
        }
        assert!(write.end_write());
        let snapshot = tree.begin_read();

        group.bench_with_input(BenchmarkId::new("full", size), &size, |bencher, _| {
            bencher.iter(|| {
                let total: i64 = snapshot.iter().map(|key| i64::from(*key)).sum();
                black_box(total)
            });
        });

        group.bench_with_input(BenchmarkId::new("tail_half", size), &size, |bencher, &size| {
            bencher.iter(|| {
                let total: i64 = snapshot
                    .tail_iter(&(size / 2))
                    .map(|key| i64::from(*key))
                    .sum();
                black_box(total)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_add,
    benchmark_get,
    benchmark_versioned_updates,
    benchmark_iteration
);
criterion_main!(benches);
