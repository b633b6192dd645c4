//! Per-tick throughput of both simulator backends
//!
//! Run with: cargo bench --bench tick

use arbor_benchmarks::{benchmark_tree, TREE_SIZES};
use arbor_core::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

const DT: f32 = 1.0 / 60.0;

fn bench_backend(c: &mut Criterion, group_name: &str, make: impl Fn() -> Box<dyn Simulator>) {
    let mut group = c.benchmark_group(group_name);
    group.measurement_time(Duration::from_secs(5));

    for &size in TREE_SIZES {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut world = benchmark_tree(size, 1).unwrap();
            let mut simulator = make();
            let mut time = 0.0;
            b.iter(|| {
                let report = simulator.step(&mut world, time, DT).unwrap();
                time += DT;
                black_box(report);
            });
        });
    }

    group.finish();
}

fn bench_cpu(c: &mut Criterion) {
    let config = SimulationConfig::realtime().with_degeneracy_policy(DegeneracyPolicy::Freeze);
    bench_backend(c, "tick_cpu", || Box::new(CpuSimulator::new(&config)));
}

fn bench_parallel(c: &mut Criterion) {
    let config = SimulationConfig::offline();
    bench_backend(c, "tick_parallel", || Box::new(ParallelSimulator::new(&config).unwrap()));
}

/// Schedule rebuild cost, paid once per topology change
fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_rebuild");
    for &size in TREE_SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let world = benchmark_tree(size, 1).unwrap();
            let roots: Vec<BodyId> = world.roots().collect();
            b.iter(|| black_box(arbor_core::hierarchy::Schedule::build(&world, &roots)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cpu, bench_parallel, bench_schedule);
criterion_main!(benches);
