//! Benchmarks for table runs
//!
//! Measures:
//! - Deterministic simulation throughput by table size
//! - Concurrent coordinator runs with zero-length pauses

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use symposium_table::{
    Coordinator, NullSink, Schedule, Simulation, SimulationConfig, TableConfig, Timing,
};

const MEALS: u32 = 10;

/// Benchmark a shuffled simulation at different table sizes
fn bench_simulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulation");

    for &philosophers in &[2usize, 5, 16, 64] {
        group.throughput(Throughput::Elements(philosophers as u64 * u64::from(MEALS)));
        group.bench_with_input(
            BenchmarkId::from_parameter(philosophers),
            &philosophers,
            |b, &n| {
                b.iter(|| {
                    let config = SimulationConfig {
                        philosophers: n,
                        meals: MEALS,
                        schedule: Schedule::Shuffled { seed: 7 },
                        max_steps: 1_000_000,
                    };
                    Simulation::new(config, Arc::new(NullSink))
                        .unwrap()
                        .run()
                        .unwrap()
                })
            },
        );
    }
    group.finish();
}

/// Benchmark the tokio coordinator with no delays
fn bench_coordinator(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("coordinator");

    for &philosophers in &[5usize, 16] {
        group.throughput(Throughput::Elements(philosophers as u64 * u64::from(MEALS)));
        group.bench_with_input(
            BenchmarkId::from_parameter(philosophers),
            &philosophers,
            |b, &n| {
                b.iter(|| {
                    let config = TableConfig::default()
                        .with_philosophers(black_box(n))
                        .with_meals(MEALS)
                        .with_timing(Timing::immediate());
                    runtime.block_on(async {
                        Coordinator::new(config, Arc::new(NullSink))
                            .unwrap()
                            .run()
                            .await
                            .unwrap()
                    })
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_simulation, bench_coordinator);
criterion_main!(benches);
