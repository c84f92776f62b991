//! Main evolution loop for genetic programming.
//!
//! This module orchestrates the evolutionary process: seeding, parallel
//! fitness evaluation, selection, crossover, mutation and replacement. It
//! owns the only long-lived state of a run: the population, the best
//! variant seen so far and the per-generation statistics.

use crate::error::ParseError;
use crate::gp::crossover::{crossover, CrossoverConfig};
use crate::gp::fitness::{FitnessConfig, FitnessEvaluator, FitnessScore};
use crate::gp::mutation::{MutationConfig, MutationOperator};
use crate::gp::selection::{select, select_elite, select_two, SelectionConfig, SelectionStats};
use crate::gp::variant::{CodeVariant, Fitness};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Stack size for evaluation threads; the interpreter recurses on nesting.
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Shared flag that stops a run at the next check.
///
/// Clones observe the same flag. The evolution loop checks it between
/// generations and the interpreter polls it while running variants.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Configuration for the evolution process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Population size.
    pub population_size: usize,
    /// Maximum number of generations to evaluate.
    pub generations: usize,
    /// RNG seed for reproducibility.
    pub seed: u64,
    /// Generations without a new best before stopping; 0 disables.
    pub patience: usize,
    /// Evaluation threads; 0 uses every available core.
    pub workers: usize,
    /// Fitness evaluation configuration.
    pub fitness: FitnessConfig,
    /// Selection configuration.
    pub selection: SelectionConfig,
    /// Crossover configuration.
    pub crossover: CrossoverConfig,
    /// Mutation configuration.
    pub mutation: MutationConfig,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            generations: 50,
            seed: 42,
            patience: 10,
            workers: 0,
            fitness: FitnessConfig::default(),
            selection: SelectionConfig::default(),
            crossover: CrossoverConfig::default(),
            mutation: MutationConfig::default(),
        }
    }
}

impl EvolutionConfig {
    /// Reject configurations the loop cannot run.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<(), EvolutionError> {
        let invalid = |message: String| Err(EvolutionError::InvalidConfig(message));
        if self.population_size == 0 {
            return invalid("population size must be at least 1".into());
        }
        if self.generations == 0 {
            return invalid("generation count must be at least 1".into());
        }
        for (name, value) in [
            ("crossover rate", self.crossover.rate),
            ("crossover function bias", self.crossover.function_bias),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} must be in [0, 1], got {value}"));
            }
        }
        self.mutation.validate().map_err(EvolutionError::InvalidConfig)?;
        self.selection.validate().map_err(EvolutionError::InvalidConfig)?;
        self.fitness.weights.validate().map_err(EvolutionError::InvalidConfig)?;
        Ok(())
    }
}

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Configured, not started.
    Initialized,
    /// Scoring the population.
    Evaluating,
    /// Drawing parents.
    Selecting,
    /// Producing children by crossover.
    Recombining,
    /// Mutating children.
    Mutating,
    /// The new generation replaced the old one.
    Replaced,
    /// The run is over.
    Terminated,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The configured number of generations was evaluated.
    GenerationLimit,
    /// A variant reached the maximum total score.
    PerfectScore,
    /// The best score did not improve for `patience` generations.
    Stagnation,
    /// The cancel token was triggered.
    Cancelled,
}

/// Statistics for a single generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationStats {
    /// Generation number, starting at 0.
    pub generation: usize,
    /// Best total score in this generation.
    pub best: f64,
    /// Mean total score.
    pub mean: f64,
    /// Worst total score.
    pub worst: f64,
    /// Standard deviation of total scores.
    pub std: f64,
    /// Best total score seen in any generation so far.
    pub best_ever: f64,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct EvolutionOutcome {
    /// Best variant seen in any generation.
    pub best: CodeVariant,
    /// Score of the unmodified seed.
    pub seed_score: FitnessScore,
    /// Last fully evaluated population, best first.
    pub population: Vec<CodeVariant>,
    /// Generations evaluated.
    pub generations_run: usize,
    /// Statistics per evaluated generation.
    pub stats: Vec<GenerationStats>,
    /// Why the run stopped.
    pub termination: Termination,
}

/// Error during evolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvolutionError {
    /// The seed program does not parse.
    #[error("seed program does not parse: {0}")]
    Parse(#[from] ParseError),
    /// The configuration cannot be run.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The evaluation thread pool could not be built.
    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),
}

/// One evolutionary run over a seed program.
#[derive(Debug)]
pub struct Evolution {
    seed: CodeVariant,
    config: EvolutionConfig,
    cancel: CancelToken,
    phase: Phase,
}

impl Evolution {
    /// Prepare a run.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::InvalidConfig`] for an unusable
    /// configuration and [`EvolutionError::Parse`] when `source` does not
    /// parse.
    pub fn new(source: &str, config: EvolutionConfig) -> Result<Self, EvolutionError> {
        config.validate()?;
        let seed = CodeVariant::new(source);
        if let Err(err) = seed.tree() {
            return Err(err.clone().into());
        }
        Ok(Self {
            seed,
            config,
            cancel: CancelToken::new(),
            phase: Phase::Initialized,
        })
    }

    /// Stop the run when `token` is cancelled.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Configuration of this run.
    #[must_use]
    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "phase transition");
        self.phase = phase;
    }

    /// Run to completion.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::ThreadPool`] if the worker pool cannot be
    /// started. Nothing else is fatal once the run has been created.
    pub fn run(&mut self) -> Result<EvolutionOutcome, EvolutionError> {
        self.run_with(|_| {})
    }

    /// Run to completion, calling `observer` after every evaluated
    /// generation.
    ///
    /// # Errors
    ///
    /// See [`Evolution::run`].
    pub fn run_with<F>(&mut self, mut observer: F) -> Result<EvolutionOutcome, EvolutionError>
    where
        F: FnMut(&GenerationStats),
    {
        let config = self.config.clone();
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .stack_size(WORKER_STACK_SIZE)
            .thread_name(|i| format!("codevolve-eval-{i}"))
            .build()
            .map_err(|e| EvolutionError::ThreadPool(e.to_string()))?;

        let mut rng = SmallRng::seed_from_u64(config.seed);
        let mutation = MutationOperator::new(&config.mutation);
        let mut memo: HashMap<String, FitnessScore> = HashMap::new();

        let mut seed = self.seed.clone();
        let evaluator = match seed.tree() {
            Ok(tree) => FitnessEvaluator::for_reference(tree, config.fitness),
            Err(err) => return Err(err.clone().into()),
        }
        .with_cancel_token(self.cancel.clone());
        info!(
            cases = evaluator.harness().cases().len(),
            population = config.population_size,
            generations = config.generations,
            "starting evolution"
        );

        self.enter(Phase::Evaluating);
        let seed_score = evaluator.evaluate(&mut seed);
        if self.cancel.is_cancelled() {
            // The harness stopped early, so the score is partial.
            self.enter(Phase::Terminated);
            let unscored = seed.offspring();
            return Ok(EvolutionOutcome {
                best: unscored.clone(),
                seed_score: FitnessScore::zero(),
                population: vec![unscored],
                generations_run: 0,
                stats: Vec::new(),
                termination: Termination::Cancelled,
            });
        }
        memo.insert(seed.source().to_string(), seed_score);
        info!(score = seed_score.total_score(), "seed evaluated");

        let mut population = Vec::with_capacity(config.population_size);
        population.push(seed.clone());
        while population.len() < config.population_size {
            population.push(mutation.mutate(&seed, &mut rng));
        }

        let mut last_evaluated = vec![seed.clone()];
        let mut best_ever = seed;
        let mut stats = Vec::new();
        let mut stagnant = 0usize;
        let mut generation = 0usize;

        let termination = loop {
            if self.cancel.is_cancelled() {
                break Termination::Cancelled;
            }

            self.enter(Phase::Evaluating);
            if !self.evaluate(&pool, &evaluator, &mut population, &mut memo) {
                warn!(generation, "generation interrupted, discarding it");
                break Termination::Cancelled;
            }
            last_evaluated.clone_from(&population);

            let summary = SelectionStats::from_population(&population);
            if let Some(leader) = population
                .iter()
                .max_by(|a, b| a.total_score().total_cmp(&b.total_score()))
            {
                if leader.total_score() > best_ever.total_score() {
                    best_ever = leader.clone();
                    stagnant = 0;
                } else if generation > 0 {
                    stagnant += 1;
                }
            }

            let stat = GenerationStats {
                generation,
                best: summary.best_fitness,
                mean: summary.mean_fitness,
                worst: summary.worst_fitness,
                std: summary.fitness_std,
                best_ever: best_ever.total_score(),
            };
            info!(
                generation,
                best = stat.best,
                mean = stat.mean,
                best_ever = stat.best_ever,
                "generation evaluated"
            );
            observer(&stat);
            stats.push(stat);
            generation += 1;

            if best_ever.total_score() >= 1.0 {
                break Termination::PerfectScore;
            }
            if config.patience > 0 && stagnant >= config.patience {
                break Termination::Stagnation;
            }
            if generation >= config.generations {
                break Termination::GenerationLimit;
            }

            population = self.breed(&population, &config, &mutation, &mut rng);
            self.enter(Phase::Replaced);
        };

        self.enter(Phase::Terminated);
        info!(?termination, generations = generation, best = best_ever.total_score(), "evolution finished");

        last_evaluated.sort_by(|a, b| b.total_score().total_cmp(&a.total_score()));
        Ok(EvolutionOutcome {
            best: best_ever,
            seed_score,
            population: last_evaluated,
            generations_run: generation,
            stats,
            termination,
        })
    }

    /// Score unscored variants, reusing scores of previously seen sources.
    /// Returns `false` when cancellation interrupted the evaluation.
    fn evaluate(
        &self,
        pool: &ThreadPool,
        evaluator: &FitnessEvaluator,
        population: &mut [CodeVariant],
        memo: &mut HashMap<String, FitnessScore>,
    ) -> bool {
        let mut reused = 0usize;
        for variant in population.iter_mut() {
            if variant.fitness().is_scored() {
                continue;
            }
            if let Some(score) = memo.get(variant.source()) {
                variant.set_fitness(Fitness::Scored(*score));
                reused += 1;
            }
        }
        debug!(reused, "scores reused from earlier generations");

        evaluator.evaluate_population(pool, population);
        if self.cancel.is_cancelled() {
            return false;
        }
        for variant in population.iter() {
            if let Some(score) = variant.fitness().score() {
                memo.entry(variant.source().to_string()).or_insert(*score);
            }
        }
        true
    }

    /// Produce the next generation from an evaluated one.
    fn breed(
        &mut self,
        population: &[CodeVariant],
        config: &EvolutionConfig,
        mutation: &MutationOperator,
        rng: &mut SmallRng,
    ) -> Vec<CodeVariant> {
        self.enter(Phase::Selecting);
        let parents = mating_pool(population, &config.selection, rng);
        let elites = select_elite(population, config.selection.elite_count.min(config.population_size));

        self.enter(Phase::Recombining);
        let slots = config.population_size - elites.len();
        let mut children = Vec::with_capacity(config.population_size);
        for _ in 0..slots {
            let Some((a, b)) = select_two(&parents, &config.selection, rng) else {
                break;
            };
            let child = if rng.gen_bool(config.crossover.rate) {
                crossover(a, b, &config.crossover, rng)
            } else {
                a.offspring()
            };
            children.push(child);
        }

        self.enter(Phase::Mutating);
        let mut next: Vec<CodeVariant> = children
            .iter()
            .map(|child| mutation.mutate(child, rng))
            .collect();
        next.extend(elites);
        next
    }
}

/// Selected parents with repeated sources dropped, so the two draws of
/// `select_two` name different programs whenever the pool allows it.
fn mating_pool(
    population: &[CodeVariant],
    config: &SelectionConfig,
    rng: &mut SmallRng,
) -> Vec<CodeVariant> {
    let mut seen = HashSet::new();
    select(population, config, rng)
        .into_iter()
        .filter(|variant| seen.insert(variant.source().to_string()))
        .collect()
}

/// Evolve `source` with `config` and return the outcome.
///
/// # Errors
///
/// See [`Evolution::new`] and [`Evolution::run`].
pub fn evolve(source: &str, config: &EvolutionConfig) -> Result<EvolutionOutcome, EvolutionError> {
    Evolution::new(source, config.clone())?.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str =
        "def f(xs):\n    total = 0\n    for x in xs:\n        total += x\n    return total\n";

    fn small_config() -> EvolutionConfig {
        EvolutionConfig {
            population_size: 8,
            generations: 4,
            workers: 2,
            ..EvolutionConfig::default()
        }
    }

    #[test]
    fn test_evolution_config_default() {
        let config = EvolutionConfig::default();
        assert_eq!(config.population_size, 100);
        assert_eq!(config.generations, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrips_through_json() {
        let config = small_config();
        let json = serde_json::to_string(&config).unwrap();
        let back: EvolutionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
        let partial: EvolutionConfig = serde_json::from_str(r#"{"generations": 3}"#).unwrap();
        assert_eq!(partial.generations, 3);
        assert_eq!(partial.population_size, 100);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let mut config = small_config();
        config.population_size = 0;
        assert!(matches!(Evolution::new(SEED, config), Err(EvolutionError::InvalidConfig(_))));

        let mut config = small_config();
        config.crossover.rate = 1.5;
        assert!(matches!(Evolution::new(SEED, config), Err(EvolutionError::InvalidConfig(_))));
    }

    #[test]
    fn test_unparsable_seed_rejected() {
        let err = Evolution::new("def f(:\n", small_config()).unwrap_err();
        assert!(matches!(err, EvolutionError::Parse(_)));
    }

    #[test]
    fn test_run_never_loses_best() {
        let mut evolution = Evolution::new(SEED, small_config()).unwrap();
        assert_eq!(evolution.phase(), Phase::Initialized);
        let outcome = evolution.run().unwrap();
        assert_eq!(evolution.phase(), Phase::Terminated);

        assert!(outcome.best.total_score() >= outcome.seed_score.total_score());
        assert!(outcome.generations_run <= 4);
        assert_eq!(outcome.stats.len(), outcome.generations_run);
        assert!(outcome.stats.windows(2).all(|w| w[1].best_ever >= w[0].best_ever));
        assert!(outcome
            .population
            .windows(2)
            .all(|w| w[0].total_score() >= w[1].total_score()));
    }

    #[test]
    fn test_same_seed_same_result() {
        let a = evolve(SEED, &small_config()).unwrap();
        let b = evolve(SEED, &small_config()).unwrap();
        assert_eq!(a.best.source(), b.best.source());
        assert_eq!(a.stats, b.stats);
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancelToken::new();
        token.cancel();
        let outcome = Evolution::new(SEED, small_config())
            .unwrap()
            .with_cancel_token(token)
            .run()
            .unwrap();
        assert_eq!(outcome.termination, Termination::Cancelled);
        assert_eq!(outcome.generations_run, 0);
        assert_eq!(outcome.best.source(), SEED);
        assert!(!outcome.best.fitness().is_scored());
        assert!(outcome.seed_score.total_score().abs() < f64::EPSILON);
    }

    #[test]
    fn test_mating_pool_has_distinct_sources() {
        let weights = crate::gp::FitnessWeights::default();
        let mut population = Vec::new();
        for (i, source) in ["def f():\n    return 1\n", "def f():\n    return 2\n"].iter().enumerate() {
            for _ in 0..5 {
                let mut variant = CodeVariant::new(*source);
                let total = if i == 0 { 0.9 } else { 0.1 };
                variant.set_fitness(Fitness::Scored(
                    FitnessScore::new(1.0, 1.0, 1.0, &weights).with_total_override(total),
                ));
                population.push(variant);
            }
        }
        let mut rng = SmallRng::seed_from_u64(9);
        for _ in 0..20 {
            let pool = mating_pool(&population, &SelectionConfig::default(), &mut rng);
            assert!(!pool.is_empty());
            let sources: HashSet<&str> = pool.iter().map(CodeVariant::source).collect();
            assert_eq!(sources.len(), pool.len());
        }
    }

    #[test]
    fn test_cancel_from_observer_stops_run() {
        let token = CancelToken::new();
        let handle = token.clone();
        let mut config = small_config();
        config.generations = 50;
        config.patience = 0;
        let outcome = Evolution::new(SEED, config)
            .unwrap()
            .with_cancel_token(token)
            .run_with(|stats| {
                if stats.generation == 1 {
                    handle.cancel();
                }
            })
            .unwrap();
        assert_eq!(outcome.termination, Termination::Cancelled);
        assert_eq!(outcome.generations_run, 2);
        assert!(!outcome.population.is_empty());
    }

    #[test]
    fn test_stagnation_stops_early() {
        let config = EvolutionConfig {
            population_size: 4,
            generations: 50,
            patience: 2,
            workers: 1,
            mutation: MutationConfig {
                rate: 0.0,
                ..MutationConfig::default()
            },
            crossover: CrossoverConfig {
                rate: 0.0,
                ..CrossoverConfig::default()
            },
            ..EvolutionConfig::default()
        };
        let outcome = evolve("def f(x):\n    return x\n", &config).unwrap();
        assert_eq!(outcome.termination, Termination::Stagnation);
        assert_eq!(outcome.generations_run, 3);
    }

    #[test]
    fn test_elites_survive() {
        let config = EvolutionConfig {
            selection: SelectionConfig {
                elite_count: 1,
                ..SelectionConfig::default()
            },
            ..small_config()
        };
        let outcome = evolve(SEED, &config).unwrap();
        let best = outcome.population[0].total_score();
        assert!(best >= outcome.seed_score.total_score());
    }
}
