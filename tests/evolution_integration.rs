//! End-to-end tests for the evolution loop.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use rand::rngs::SmallRng;
use rand::SeedableRng;

use codevolve::interp::{run_function, Budget, Datum};
use codevolve::parse;
use codevolve::gp::{
    crossover, evolve, select, CodeVariant, CrossoverConfig, Evolution, EvolutionConfig,
    EvolutionError, Fitness, FitnessScore, FitnessWeights, MutationConfig, MutationOperator,
    SelectionConfig, Termination,
};

const SEED: &str = "\
def total(xs):
    acc = 0
    for x in xs:
        acc = acc + x
    return acc

def evens(xs):
    out = []
    for x in xs:
        if x % 2 == 0:
            out.append(x)
    return out
";

fn small_config() -> EvolutionConfig {
    EvolutionConfig {
        population_size: 10,
        generations: 5,
        workers: 2,
        patience: 0,
        ..EvolutionConfig::default()
    }
}

fn scored(source: &str, total: f64) -> CodeVariant {
    let mut variant = CodeVariant::new(source);
    let weights = FitnessWeights::default();
    variant.set_fitness(Fitness::Scored(
        FitnessScore::new(1.0, 1.0, 1.0, &weights).with_total_override(total),
    ));
    variant
}

#[test]
fn test_best_never_worse_than_seed() {
    let outcome = evolve(SEED, &small_config()).unwrap();
    assert!(outcome.best.total_score() >= outcome.seed_score.total_score());
    assert!(outcome.best.is_valid());
    assert_eq!(outcome.population.len(), 10);
}

#[test]
fn test_best_ever_is_monotone() {
    let outcome = evolve(SEED, &small_config()).unwrap();
    assert_eq!(outcome.stats.len(), outcome.generations_run);
    for pair in outcome.stats.windows(2) {
        assert!(pair[1].best_ever >= pair[0].best_ever);
    }
    for stats in &outcome.stats {
        assert!(stats.worst <= stats.mean + 1e-9 && stats.mean <= stats.best + 1e-9);
    }
}

#[test]
fn test_generation_limit_reached_without_patience() {
    let outcome = evolve(SEED, &small_config()).unwrap();
    assert!(matches!(
        outcome.termination,
        Termination::GenerationLimit | Termination::PerfectScore
    ));
}

#[test]
fn test_evolved_program_keeps_behaviour() {
    let outcome = evolve(SEED, &small_config()).unwrap();
    let best = outcome.best.fitness().score().unwrap();
    assert!((best.correctness() - 1.0).abs() < 1e-9);
}

#[test]
fn test_runs_are_reproducible() {
    let config = EvolutionConfig {
        workers: 1,
        ..small_config()
    };
    let a = evolve(SEED, &config).unwrap();
    let b = evolve(SEED, &config).unwrap();
    assert_eq!(a.best.source(), b.best.source());
    assert_eq!(a.generations_run, b.generations_run);
}

#[test]
fn test_selection_favours_fit_variants() {
    let population: Vec<CodeVariant> = (0..20)
        .map(|i| scored("def f():\n    return 1\n", f64::from(i) / 19.0))
        .collect();
    let mut rng = SmallRng::seed_from_u64(3);
    let chosen = select(&population, &SelectionConfig::default(), &mut rng);
    assert_eq!(chosen.len(), population.len());
    let mean = chosen.iter().map(CodeVariant::total_score).sum::<f64>() / 20.0;
    assert!(mean > 0.45, "selected mean {mean}");
}

#[test]
fn test_crossover_between_seed_functions_parses() {
    let a = CodeVariant::new(SEED);
    let b = CodeVariant::new("def total(xs):\n    return sum(xs)\n");
    let mut rng = SmallRng::seed_from_u64(11);
    for _ in 0..20 {
        let child = crossover(&a, &b, &CrossoverConfig::default(), &mut rng);
        assert!(child.is_valid());
    }
}

#[test]
fn test_mutation_rate_bounds() {
    let variant = CodeVariant::new(SEED);
    let mut rng = SmallRng::seed_from_u64(5);

    let frozen = MutationOperator::new(&MutationConfig {
        rate: 0.0,
        ..MutationConfig::default()
    });
    assert_eq!(frozen.mutate(&variant, &mut rng).source(), SEED);

    let eager = MutationOperator::new(&MutationConfig {
        rate: 1.0,
        ..MutationConfig::default()
    });
    assert_ne!(eager.mutate(&variant, &mut rng).source(), SEED);
}

#[test]
fn test_invalid_configurations_rejected() {
    let empty = EvolutionConfig {
        population_size: 0,
        ..EvolutionConfig::default()
    };
    assert!(matches!(
        evolve(SEED, &empty),
        Err(EvolutionError::InvalidConfig(_))
    ));

    let mut bad_rate = EvolutionConfig::default();
    bad_rate.crossover.rate = -0.5;
    assert!(bad_rate.validate().is_err());
}

#[test]
fn test_unparseable_seed_rejected() {
    assert!(matches!(
        Evolution::new("def f(:\n", small_config()),
        Err(EvolutionError::Parse(_))
    ));
}

#[test]
fn test_mutation_keeps_behaviour_around_scoped_loops() {
    let programs = [
        // The loop variable is read after the enclosing `if`.
        ("def f(xs):\n    x = 0\n    if True:\n        t = 0\n        for x in xs:\n            t += x\n    return x * 100 + t\n", Datum::List(vec![Datum::Int(1), Datum::Int(2)])),
        // `len` is only reached when the left operand holds.
        ("def f(x):\n    i = 0\n    while i < 0 and i < len(x):\n        i += 1\n    return i\n", Datum::Int(5)),
    ];
    let op = MutationOperator::new(&MutationConfig {
        rate: 1.0,
        ..MutationConfig::default()
    });

    for (source, arg) in programs {
        let before = run_function(&parse(source).unwrap(), "f", &[arg.clone()], Budget::with_fuel(10_000)).unwrap();
        for seed in 0..8 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let child = op.mutate(&CodeVariant::new(source), &mut rng);
            let after = run_function(child.tree().unwrap(), "f", &[arg.clone()], Budget::with_fuel(10_000))
                .unwrap_or_else(|e| panic!("{e} after rewriting to:\n{}", child.source()));
            assert_eq!(before.value, after.value, "changed by:\n{}", child.source());
        }
    }
}
