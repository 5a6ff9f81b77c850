//! Benchmarks for the genetic operators.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use action_evolver::{
    compute::{GenomeRng, select_tournament},
    schema::{Fitness, GeneBounds, Individual, OperatorConfig},
};

fn bench_vary(c: &mut Criterion) {
    let mut group = c.benchmark_group("vary");
    let bounds = GeneBounds::new(0, 2);
    let ops = OperatorConfig::default();

    for size in [50, 200, 1000] {
        let mut rng = GenomeRng::new(42);
        let population = rng.fresh_population(size, 135, &bounds);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| rng.vary(black_box(&population), &ops, &bounds));
        });
    }

    group.finish();
}

fn bench_tournament(c: &mut Criterion) {
    let mut group = c.benchmark_group("tournament");
    let bounds = GeneBounds::new(0, 2);

    for size in [50, 200, 1000] {
        let mut rng = GenomeRng::new(7);
        let pool: Vec<Individual> = rng
            .fresh_population(size, 135, &bounds)
            .into_iter()
            .enumerate()
            .map(|(i, ind)| Individual::evaluated(ind.genome, Fitness::new(i as f64)))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| select_tournament(black_box(&pool), size, 3, rng.rng_mut()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_vary, bench_tournament);
criterion_main!(benches);
