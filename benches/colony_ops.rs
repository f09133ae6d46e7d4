//! Benchmarks for colony insert/remove on an in-memory pool

use colony_rs::{Colony, Durability, ElementKind, Pool, PoolBuilder};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn pool() -> Pool {
    PoolBuilder::new()
        .pool_size(32 * 1024 * 1024)
        .undo_log_size(4 * 1024 * 1024)
        .durability(Durability::Relaxed)
        .in_memory()
        .unwrap()
}

fn benchmark_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("colony_insert");
    group.sample_size(20);

    for block_capacity in [16u64, 256, 4096].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(block_capacity),
            block_capacity,
            |b, &block_capacity| {
                b.iter(|| {
                    let mut pool = pool();
                    let colony =
                        Colony::create(&mut pool, "bench", ElementKind::Int, block_capacity).unwrap();
                    for v in 0..1000 {
                        colony.insert(&mut pool, black_box(v)).unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn benchmark_remove_reinsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("colony_remove_reinsert");

    for block_capacity in [16u64, 256, 4096].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(block_capacity),
            block_capacity,
            |b, &block_capacity| {
                let mut pool = pool();
                let colony =
                    Colony::create(&mut pool, "bench", ElementKind::Int, block_capacity).unwrap();
                for v in 0..5000 {
                    colony.insert(&mut pool, v).unwrap();
                }

                let mut idx = 2500;
                b.iter(|| {
                    colony.remove(&mut pool, black_box(idx)).unwrap();
                    idx = colony.insert(&mut pool, 7).unwrap();
                });
            },
        );
    }

    group.finish();
}

fn benchmark_entries(c: &mut Criterion) {
    let mut pool = pool();
    let colony = Colony::create(&mut pool, "bench", ElementKind::Int, 64).unwrap();
    for v in 0..10_000 {
        colony.insert(&mut pool, v).unwrap();
    }
    colony.remove_range(&mut pool, 1000, 8999).unwrap();

    c.bench_function("colony_entries_sparse", |b| {
        b.iter(|| black_box(colony.entries(&pool).unwrap().len()));
    });
}

criterion_group!(
    benches,
    benchmark_insert,
    benchmark_remove_reinsert,
    benchmark_entries
);
criterion_main!(benches);
