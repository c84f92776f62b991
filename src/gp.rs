//! Genetic programming over source code.
//!
//! This module provides the evolutionary framework that improves a seed
//! program. Candidates are [`CodeVariant`]s: source text with a lazily
//! parsed syntax tree. They are scored by replaying behavioural test cases
//! recorded from the seed, then selected, recombined and rewritten over a
//! number of generations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │         Evolution Loop              │
//! ├─────────────────────────────────────┤
//! │  Selection │ Crossover │ Mutation   │
//! │            │           │ (rewrites) │
//! ├─────────────────────────────────────┤
//! │   Fitness Evaluation (rayon pool)   │
//! ├─────────────────────────────────────┤
//! │  Harness → fuel-metered interpreter │
//! └─────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use codevolve::gp::{evolve, EvolutionConfig};
//!
//! let seed = "def f(xs):\n    total = 0\n    for x in xs:\n        total += x\n    return total\n";
//! let outcome = evolve(seed, &EvolutionConfig::default())?;
//! println!("{}", outcome.best.source());
//! # Ok::<(), codevolve::gp::EvolutionError>(())
//! ```

mod crossover;
mod evolution;
mod fitness;
mod harness;
mod mutation;
mod rewrite;
mod selection;
mod variant;

pub use crossover::{crossover, CrossoverConfig};
pub use evolution::{
    evolve, CancelToken, Evolution, EvolutionConfig, EvolutionError, EvolutionOutcome,
    GenerationStats, Phase, Termination,
};
pub use fitness::{readability, FitnessConfig, FitnessEvaluator, FitnessScore, FitnessWeights};
pub use harness::{Harness, HarnessConfig, HarnessReport, TestCase};
pub use mutation::{MutationConfig, MutationKind, MutationOperator};
pub use selection::{
    select, select_elite, select_two, SelectionConfig, SelectionStats, SelectionStrategy,
};
pub use variant::{CodeVariant, Fitness};
