//! Subtree crossover between two variants.
//!
//! The child is the first parent's tree with one subtree swapped for a
//! subtree of the same category taken from the second parent. Matching
//! categories keeps the swap type-compatible, so the child always renders
//! to valid source.

use crate::gp::variant::CodeVariant;
use crate::syntax::{self, Category};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for crossover operations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossoverConfig {
    /// Probability that a new slot is filled by crossover rather than by a
    /// copy of its first parent.
    pub rate: f64,
    /// Probability of swapping whole function definitions when both parents
    /// define functions.
    pub function_bias: f64,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            rate: 1.0,
            function_bias: 0.0,
        }
    }
}

/// Combine `parent` with `other`.
///
/// Picks a category present in both trees (never the module root), one node
/// of that category in each, and grafts `other`'s node into `parent`'s tree.
/// When either parent fails to parse or no category is shared, the result
/// is an unscored copy of `parent`. The result is always unscored.
#[must_use]
pub fn crossover<R: Rng>(
    parent: &CodeVariant,
    other: &CodeVariant,
    config: &CrossoverConfig,
    rng: &mut R,
) -> CodeVariant {
    let (Ok(own), Ok(donor)) = (parent.tree(), other.tree()) else {
        debug!("crossover parent does not parse");
        return parent.offspring();
    };

    let shared: Vec<Category> = own
        .categories()
        .intersection(&donor.categories())
        .copied()
        .filter(|&category| category != Category::Module)
        .collect();
    if shared.is_empty() {
        return parent.offspring();
    }

    let prefer_functions = shared.contains(&Category::FunctionDef)
        && config.function_bias > 0.0
        && rng.gen_bool(config.function_bias.min(1.0));
    let category = if prefer_functions {
        Category::FunctionDef
    } else {
        shared[rng.gen_range(0..shared.len())]
    };

    let targets = own.find_nodes_by_category(category);
    let replacements = donor.find_nodes_by_category(category);
    let target = targets[rng.gen_range(0..targets.len())];
    let replacement = replacements[rng.gen_range(0..replacements.len())];

    match own.replace_node(target, donor, replacement) {
        Ok(child) => CodeVariant::new(syntax::render(&child)),
        Err(err) => {
            debug!(%err, ?category, "crossover swap rejected");
            parent.offspring()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn test_crossover_mixes_material() {
        let mut rng = SmallRng::seed_from_u64(42);
        let a = CodeVariant::new("def f(xs):\n    return 1\n");
        let b = CodeVariant::new("def f(xs):\n    return 2\n");
        let children: Vec<String> = (0..30)
            .map(|_| crossover(&a, &b, &CrossoverConfig::default(), &mut rng).source().to_string())
            .collect();
        assert!(children.iter().any(|c| c.contains("return 2")));
        assert!(children.iter().all(|c| syntax::parse(c).is_ok()));
    }

    #[test]
    fn test_no_shared_category_returns_copy() {
        let mut rng = SmallRng::seed_from_u64(1);
        let a = CodeVariant::new("pass\n");
        let b = CodeVariant::new("break_me = 1\n");
        let child = crossover(&a, &b, &CrossoverConfig::default(), &mut rng);
        assert_eq!(child.source(), a.source());
        assert!(!child.fitness().is_scored());
    }

    #[test]
    fn test_unparsable_parent_returns_copy() {
        let mut rng = SmallRng::seed_from_u64(1);
        let a = CodeVariant::new("x = 1\n");
        let b = CodeVariant::new("x = (\n");
        let child = crossover(&a, &b, &CrossoverConfig::default(), &mut rng);
        assert_eq!(child.source(), a.source());
    }

    #[test]
    fn test_function_bias_swaps_whole_functions() {
        let mut rng = SmallRng::seed_from_u64(3);
        let config = CrossoverConfig {
            rate: 1.0,
            function_bias: 1.0,
        };
        let a = CodeVariant::new("def f(xs):\n    return 1\n");
        let b = CodeVariant::new("def g(ys):\n    return 2\n");
        let child = crossover(&a, &b, &config, &mut rng);
        assert_eq!(child.source(), "def g(ys):\n    return 2\n");
    }
}
