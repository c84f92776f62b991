//! Mutation operator for code variants.
//!
//! Mutation walks an ordered table of behaviour-preserving rewrites (see
//! [`crate::gp::rewrite`]). Each enabled rewrite fires with probability
//! `rate`; a firing rewrite picks one of its matching sites uniformly at
//! random. A variant nothing applies to comes back unchanged.

use crate::gp::rewrite::{self, Rule};
use crate::gp::variant::CodeVariant;
use crate::syntax::SyntaxTree;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Rewrite families available to mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// Fold `if`/`while` statements whose condition is a constant.
    DeadBranch,
    /// Drop statements after `return`, `break` or `continue`.
    UnreachableCode,
    /// Evaluate integer arithmetic between literals.
    ConstantFold,
    /// Turn `x = x + 1` into `x += 1`.
    AugmentedAssign,
    /// Turn an accumulation loop into a call to `sum`.
    AccumulationToSum,
    /// Turn an append loop into a list comprehension.
    AppendToComprehension,
    /// Compute a loop-invariant `len()` once before a `while` loop.
    HoistLen,
}

impl MutationKind {
    /// Every kind, in application order.
    pub const ALL: [MutationKind; 7] = [
        Self::DeadBranch,
        Self::UnreachableCode,
        Self::ConstantFold,
        Self::AugmentedAssign,
        Self::AccumulationToSum,
        Self::AppendToComprehension,
        Self::HoistLen,
    ];
}

/// Configuration for mutation operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Probability that each enabled rewrite is attempted.
    pub rate: f64,
    /// Enabled rewrites.
    pub kinds: Vec<MutationKind>,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            rate: 0.1,
            kinds: MutationKind::ALL.to_vec(),
        }
    }
}

impl MutationConfig {
    /// Check that the rate is a probability.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem.
    pub fn validate(&self) -> Result<(), String> {
        if (0.0..=1.0).contains(&self.rate) {
            Ok(())
        } else {
            Err(format!("mutation rate must be in [0, 1], got {}", self.rate))
        }
    }
}

/// Applies rewrites to variants.
#[derive(Debug, Clone)]
pub struct MutationOperator {
    rate: f64,
    rules: Vec<Rule>,
}

impl MutationOperator {
    /// Build an operator. The rate is clamped to [0, 1]; a non-finite rate
    /// disables mutation.
    #[must_use]
    pub fn new(config: &MutationConfig) -> Self {
        let rate = if config.rate.is_finite() {
            config.rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let rules = rewrite::RULES
            .iter()
            .copied()
            .filter(|rule| config.kinds.contains(&rule.kind))
            .collect();
        Self { rate, rules }
    }

    /// Probability that each rewrite is attempted.
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Apply rewrites to a copy of `tree`. Returns `None` when nothing
    /// applied.
    pub fn mutate_tree<R: Rng>(&self, tree: &SyntaxTree, rng: &mut R) -> Option<SyntaxTree> {
        let mut current: Option<SyntaxTree> = None;
        for rule in &self.rules {
            if !rng.gen_bool(self.rate) {
                continue;
            }
            let base = current.as_ref().unwrap_or(tree);
            let sites = (rule.find)(base);
            if sites.is_empty() {
                continue;
            }
            let site = sites[rng.gen_range(0..sites.len())];
            let mut edited = base.clone();
            match (rule.apply)(&mut edited, site) {
                Ok(()) => {
                    trace!(kind = ?rule.kind, "applied rewrite");
                    current = Some(edited);
                }
                Err(err) => debug!(kind = ?rule.kind, %err, "rewrite failed"),
            }
        }
        current
    }

    /// Return a mutated copy of `variant`, leaving `variant` untouched.
    ///
    /// Variants that do not parse, or that no rewrite applies to, are
    /// returned as clones with their fitness intact.
    #[must_use]
    pub fn mutate<R: Rng>(&self, variant: &CodeVariant, rng: &mut R) -> CodeVariant {
        let Ok(tree) = variant.tree() else {
            return variant.clone();
        };
        match self.mutate_tree(tree, rng) {
            Some(edited) => CodeVariant::from_tree(&edited),
            None => variant.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gp::fitness::FitnessScore;
    use crate::gp::variant::Fitness;
    use crate::syntax::parse;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    const SEED: &str =
        "def f(xs):\n    total = 0\n    for x in xs:\n        total += x\n    return total\n";

    fn operator(rate: f64) -> MutationOperator {
        MutationOperator::new(&MutationConfig {
            rate,
            ..MutationConfig::default()
        })
    }

    #[test]
    fn test_zero_rate_returns_clone() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut variant = CodeVariant::new(SEED);
        variant.set_fitness(Fitness::Scored(FitnessScore::zero().with_total_override(0.4)));
        for _ in 0..20 {
            let out = operator(0.0).mutate(&variant, &mut rng);
            assert_eq!(out.source(), SEED);
            assert_eq!(out.fitness(), variant.fitness());
        }
    }

    #[test]
    fn test_full_rate_rewrites_seed() {
        let mut rng = SmallRng::seed_from_u64(42);
        let variant = CodeVariant::new(SEED);
        let out = operator(1.0).mutate(&variant, &mut rng);
        assert_eq!(out.source(), "def f(xs):\n    total = sum(xs)\n    return total\n");
        assert!(!out.fitness().is_scored());
        assert_eq!(variant.source(), SEED);
    }

    #[test]
    fn test_rewrites_chain_within_one_call() {
        let mut rng = SmallRng::seed_from_u64(1);
        let source = "def f(x):\n    if True:\n        x = x + 2 * 3\n    return x\n    x = 0\n";
        let out = operator(1.0).mutate(&CodeVariant::new(source), &mut rng);
        assert_eq!(out.source(), "def f(x):\n    x += 6\n    return x\n");
    }

    #[test]
    fn test_nothing_applicable_returns_clone() {
        let mut rng = SmallRng::seed_from_u64(5);
        let source = "def f(x):\n    return x\n";
        let out = operator(1.0).mutate(&CodeVariant::new(source), &mut rng);
        assert_eq!(out.source(), source);
    }

    #[test]
    fn test_invalid_rate_disables_mutation() {
        assert!(operator(f64::NAN).rate().abs() < f64::EPSILON);
        assert!((operator(7.0).rate() - 1.0).abs() < f64::EPSILON);
        assert!(MutationConfig { rate: 1.5, ..MutationConfig::default() }.validate().is_err());
    }

    #[test]
    fn test_disabled_kinds_are_skipped() {
        let mut rng = SmallRng::seed_from_u64(9);
        let op = MutationOperator::new(&MutationConfig {
            rate: 1.0,
            kinds: vec![MutationKind::ConstantFold],
        });
        let tree = parse(SEED).unwrap();
        assert!(op.mutate_tree(&tree, &mut rng).is_none());
    }

    #[test]
    fn test_mutated_sources_parse() {
        let mut rng = SmallRng::seed_from_u64(77);
        let op = operator(0.5);
        let mut variant = CodeVariant::new(
            "def f(xs):\n    out = []\n    i = 0\n    while i < len(xs):\n        out.append(xs[i] * 2)\n        i = i + 1\n    return out\n",
        );
        for _ in 0..30 {
            variant = op.mutate(&variant, &mut rng);
            assert!(parse(variant.source()).is_ok());
        }
    }
}
