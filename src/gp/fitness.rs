//! Fitness evaluation for code variants.
//!
//! A variant is scored along three axes, each in [0, 1]:
//!
//! - **correctness**: share of harness cases whose output matches the seed's
//! - **performance**: fuel spent by the seed relative to the variant
//! - **readability**: static size, nesting and line-length measures
//!
//! The axes are combined into `total_score` by normalized weights. A variant
//! that does not parse scores zero on every axis.

// Fitness evaluation uses intentional casts
#![allow(clippy::cast_precision_loss)]

use crate::gp::harness::{Harness, HarnessConfig};
use crate::gp::variant::{CodeVariant, Fitness};
use crate::gp::CancelToken;
use crate::syntax::SyntaxTree;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Longest line counted as readable.
const MAX_LINE_LEN: usize = 79;

/// Relative weight of each fitness axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessWeights {
    /// Weight of the correctness axis.
    pub correctness: f64,
    /// Weight of the performance axis.
    pub performance: f64,
    /// Weight of the readability axis.
    pub readability: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            correctness: 0.5,
            performance: 0.3,
            readability: 0.2,
        }
    }
}

impl FitnessWeights {
    /// Check that every weight is finite and non-negative and that they do
    /// not all vanish.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        let weights = [self.correctness, self.performance, self.readability];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("fitness weights must be finite and non-negative".into());
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err("at least one fitness weight must be positive".into());
        }
        Ok(())
    }

    /// Weighted mean of the three axes, clamped to [0, 1].
    #[must_use]
    pub fn combine(&self, correctness: f64, performance: f64, readability: f64) -> f64 {
        let sum = self.correctness + self.performance + self.readability;
        if sum <= 0.0 || !sum.is_finite() {
            return 0.0;
        }
        let total = (self.correctness * correctness
            + self.performance * performance
            + self.readability * readability)
            / sum;
        clamp_unit(total)
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Scores of one evaluated variant.
///
/// `total_score` is derived from the axes and the weights; only
/// [`FitnessScore::with_total_override`] can set it directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitnessScore {
    correctness: f64,
    performance: f64,
    readability: f64,
    total_score: f64,
}

impl FitnessScore {
    /// Combine axis scores with `weights`. Axes are clamped to [0, 1].
    #[must_use]
    pub fn new(correctness: f64, performance: f64, readability: f64, weights: &FitnessWeights) -> Self {
        let correctness = clamp_unit(correctness);
        let performance = clamp_unit(performance);
        let readability = clamp_unit(readability);
        Self {
            correctness,
            performance,
            readability,
            total_score: weights.combine(correctness, performance, readability),
        }
    }

    /// Score of a variant that could not be parsed.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            correctness: 0.0,
            performance: 0.0,
            readability: 0.0,
            total_score: 0.0,
        }
    }

    /// Replace the derived total, for seeding and tests.
    #[must_use]
    pub fn with_total_override(mut self, total_score: f64) -> Self {
        self.total_score = clamp_unit(total_score);
        self
    }

    /// Behavioural agreement with the seed.
    #[must_use]
    pub fn correctness(&self) -> f64 {
        self.correctness
    }

    /// Fuel efficiency relative to the seed.
    #[must_use]
    pub fn performance(&self) -> f64 {
        self.performance
    }

    /// Static structure quality.
    #[must_use]
    pub fn readability(&self) -> f64 {
        self.readability
    }

    /// Weighted combination of the axes.
    #[must_use]
    pub fn total_score(&self) -> f64 {
        self.total_score
    }
}

/// Configuration for fitness evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessConfig {
    /// Axis weights.
    pub weights: FitnessWeights,
    /// Test-case generation and replay.
    pub harness: HarnessConfig,
}

/// Static readability of a program: size, nesting depth and line length.
#[must_use]
pub fn readability(source: &str, tree: &SyntaxTree) -> f64 {
    let size = 1.0 / (1.0 + tree.node_count() as f64 / 64.0);
    let depth = 1.0 / (1.0 + 0.25 * tree.max_depth().saturating_sub(1) as f64);

    let lines: Vec<&str> = source.lines().filter(|l| !l.trim().is_empty()).collect();
    let short = if lines.is_empty() {
        1.0
    } else {
        lines.iter().filter(|l| l.chars().count() <= MAX_LINE_LEN).count() as f64 / lines.len() as f64
    };

    clamp_unit(0.4 * size + 0.4 * depth + 0.2 * short)
}

/// Scores variants against a fixed harness.
#[derive(Debug, Clone)]
pub struct FitnessEvaluator {
    harness: Harness,
    config: FitnessConfig,
    cancel: Option<CancelToken>,
}

impl FitnessEvaluator {
    /// Create an evaluator around an existing harness.
    #[must_use]
    pub fn new(harness: Harness, config: FitnessConfig) -> Self {
        Self {
            harness,
            config,
            cancel: None,
        }
    }

    /// Record a harness from `reference` and evaluate against it.
    #[must_use]
    pub fn for_reference(reference: &SyntaxTree, config: FitnessConfig) -> Self {
        Self::new(Harness::from_reference(reference, config.harness), config)
    }

    /// Abort running programs when `token` is cancelled.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The harness variants are replayed against.
    #[must_use]
    pub fn harness(&self) -> &Harness {
        &self.harness
    }

    /// Compute the score of `variant` without recording it.
    #[must_use]
    pub fn score(&self, variant: &CodeVariant) -> FitnessScore {
        let tree = match variant.tree() {
            Ok(tree) => tree,
            Err(err) => {
                debug!(%err, "variant does not parse");
                return FitnessScore::zero();
            }
        };

        let report = self.harness.run(tree, self.cancel.as_ref());
        if report.timeouts > 0 || report.failures > 0 {
            trace!(
                timeouts = report.timeouts,
                failures = report.failures,
                "variant failed harness cases"
            );
        }
        FitnessScore::new(
            report.correctness,
            report.performance,
            readability(variant.source(), tree),
            &self.config.weights,
        )
    }

    /// Score `variant`, record the score on it and return it.
    pub fn evaluate(&self, variant: &mut CodeVariant) -> FitnessScore {
        let score = self.score(variant);
        variant.set_fitness(Fitness::Scored(score));
        score
    }

    /// Score every unscored variant in parallel on `pool`.
    ///
    /// Returns once all evaluations have finished.
    pub fn evaluate_population(&self, pool: &ThreadPool, variants: &mut [CodeVariant]) {
        pool.install(|| {
            variants
                .par_iter_mut()
                .filter(|variant| !variant.fitness().is_scored())
                .for_each(|variant| {
                    self.evaluate(variant);
                });
        });
    }
}
