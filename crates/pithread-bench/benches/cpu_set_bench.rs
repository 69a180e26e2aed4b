//! Affinity-set construction and conversion.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use pithread_core::{CoreAffinity, CpuSet};

fn bench_build(c: &mut Criterion) {
    let n = CpuSet::num_processors();
    let mut group = c.benchmark_group("cpu_set_build");

    group.bench_function("set_all", |b| {
        b.iter(|| criterion::black_box(CpuSet::from_cpus(0..n).unwrap()));
    });

    group.bench_function("num_processors", |b| {
        b.iter(|| criterion::black_box(CpuSet::num_processors()));
    });

    group.finish();
}

fn bench_convert(c: &mut Criterion) {
    let n = CpuSet::num_processors();
    let mut group = c.benchmark_group("cpu_set_convert");

    for stride in [1usize, 2, 4] {
        let set = CpuSet::from_cpus((0..n).step_by(stride)).unwrap();
        group.bench_with_input(BenchmarkId::new("to_core_affinity", stride), &set, |b, set| {
            b.iter(|| criterion::black_box(set.to_core_affinity()));
        });

        let affinity = set.to_core_affinity();
        group.bench_with_input(
            BenchmarkId::new("from_core_affinity", stride),
            &affinity,
            |b, affinity: &CoreAffinity| {
                b.iter(|| criterion::black_box(CpuSet::from_core_affinity(affinity).unwrap()));
            },
        );

        group.bench_with_input(BenchmarkId::new("native_words", stride), &set, |b, set| {
            b.iter(|| criterion::black_box(set.native_words()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build, bench_convert);
criterion_main!(benches);
