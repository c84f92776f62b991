//! Benchmarks for the evolution hot paths: parsing, scoring and breeding.

#![allow(missing_docs)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use codevolve::gp::{
    evolve, CodeVariant, EvolutionConfig, FitnessConfig, FitnessEvaluator, MutationConfig,
    MutationOperator,
};
use codevolve::{parse, render};
use rand::rngs::SmallRng;
use rand::SeedableRng;

const PROGRAM: &str = "\
def total(xs):
    acc = 0
    for x in xs:
        acc += x
    return acc

def evens(xs):
    out = []
    for x in xs:
        if x % 2 == 0:
            out.append(x)
    return out

def count_down(n):
    steps = 0
    while n > 0:
        n = n - 1
        steps = steps + 1
    return steps
";

fn bench_parse_render(c: &mut Criterion) {
    c.bench_function("parse", |b| {
        b.iter(|| black_box(parse(black_box(PROGRAM))));
    });

    let tree = parse(PROGRAM).unwrap_or_else(|e| panic!("benchmark program: {e}"));
    c.bench_function("render", |b| {
        b.iter(|| black_box(render(black_box(&tree))));
    });
}

fn bench_fitness(c: &mut Criterion) {
    let tree = parse(PROGRAM).unwrap_or_else(|e| panic!("benchmark program: {e}"));
    let evaluator = FitnessEvaluator::for_reference(&tree, FitnessConfig::default());
    let variant = CodeVariant::new(PROGRAM);

    c.bench_function("score_variant", |b| {
        b.iter(|| black_box(evaluator.score(black_box(&variant))));
    });
}

fn bench_mutation(c: &mut Criterion) {
    let op = MutationOperator::new(&MutationConfig {
        rate: 1.0,
        ..MutationConfig::default()
    });
    let variant = CodeVariant::new(PROGRAM);
    let mut rng = SmallRng::seed_from_u64(42);

    c.bench_function("mutate_all_rules", |b| {
        b.iter(|| black_box(op.mutate(black_box(&variant), &mut rng)));
    });
}

fn bench_small_run(c: &mut Criterion) {
    let config = EvolutionConfig {
        population_size: 16,
        generations: 2,
        patience: 0,
        ..EvolutionConfig::default()
    };

    let mut group = c.benchmark_group("evolve");
    group.sample_size(10);
    group.bench_function("pop16_gen2", |b| {
        b.iter(|| black_box(evolve(black_box(PROGRAM), &config)));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_parse_render,
    bench_fitness,
    bench_mutation,
    bench_small_run
);
criterion_main!(benches);
