use std::num::NonZeroUsize;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use fanout::prelude::*;

fn fibonacci(c: &mut Criterion) {
    let parallelism = std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);

    let mut group = c.benchmark_group("fibonacci");
    group.sample_size(20);
    for mode in [CeilingMode::Hard, CeilingMode::Soft] {
        for policy in [AdmissionPolicy::Approximate, AdmissionPolicy::Strict] {
            let config = Config::new(parallelism)
                .with_ceiling_mode(mode)
                .with_admission(policy);
            let mut scheduler = Scheduler::new(config);
            for n in [25, 30] {
                let id = BenchmarkId::new(format!("{mode}/{policy:?}"), n);
                group.bench_with_input(id, &n, |b, &n| {
                    b.iter(|| scheduler.execute(n).unwrap().value)
                });
            }
        }
    }
    group.finish();
}

criterion_group!(benches, fibonacci);
criterion_main!(benches);
