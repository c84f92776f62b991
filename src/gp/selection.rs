//! Selection operators for genetic programming.
//!
//! Selection determines which variants reproduce based on fitness. We
//! support tournament selection and fitness-proportionate (roulette)
//! selection, both with replacement, plus optional elitism. Unscored
//! variants count as fitness 0.

// Selection uses intentional casts for statistics
#![allow(clippy::cast_precision_loss)]

use crate::gp::variant::CodeVariant;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How parents are drawn from a population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Best of `tournament_size` uniform draws.
    #[default]
    Tournament,
    /// Probability proportional to total score.
    Roulette,
}

/// Configuration for selection operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Parent-drawing strategy.
    pub strategy: SelectionStrategy,
    /// Number of variants competing in each tournament.
    pub tournament_size: usize,
    /// Number of best variants copied unchanged into the next generation.
    pub elite_count: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::Tournament,
            tournament_size: 3,
            elite_count: 0,
        }
    }
}

impl SelectionConfig {
    /// Check that tournaments have at least one competitor.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem.
    pub fn validate(&self) -> Result<(), String> {
        if self.strategy == SelectionStrategy::Tournament && self.tournament_size == 0 {
            return Err("tournament size must be at least 1".into());
        }
        Ok(())
    }
}

/// Draw `population.len()` variants with replacement, biased toward
/// higher total score.
#[must_use]
pub fn select<R: Rng>(
    population: &[CodeVariant],
    config: &SelectionConfig,
    rng: &mut R,
) -> Vec<CodeVariant> {
    let fitness = totals(population);
    (0..population.len())
        .filter_map(|_| draw(&fitness, config, None, rng))
        .map(|idx| population[idx].clone())
        .collect()
}

/// Draw two parents. The second draw excludes the first variant unless the
/// population has a single member. Returns `None` for an empty population.
#[must_use]
pub fn select_two<'p, R: Rng>(
    population: &'p [CodeVariant],
    config: &SelectionConfig,
    rng: &mut R,
) -> Option<(&'p CodeVariant, &'p CodeVariant)> {
    let fitness = totals(population);
    let first = draw(&fitness, config, None, rng)?;
    let exclude = (population.len() > 1).then_some(first);
    let second = draw(&fitness, config, exclude, rng)?;
    Some((&population[first], &population[second]))
}

/// The `count` best variants, best first.
#[must_use]
pub fn select_elite(population: &[CodeVariant], count: usize) -> Vec<CodeVariant> {
    let fitness = totals(population);
    elite_indices(&fitness, count)
        .into_iter()
        .map(|idx| population[idx].clone())
        .collect()
}

fn totals(population: &[CodeVariant]) -> Vec<f64> {
    population.iter().map(CodeVariant::total_score).collect()
}

/// Indices of the top `count` entries, best first; ties keep input order.
fn elite_indices(fitness: &[f64], count: usize) -> Vec<usize> {
    let mut indexed: Vec<(usize, f64)> = fitness.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.into_iter().take(count).map(|(i, _)| i).collect()
}

fn draw<R: Rng>(
    fitness: &[f64],
    config: &SelectionConfig,
    exclude: Option<usize>,
    rng: &mut R,
) -> Option<usize> {
    match config.strategy {
        SelectionStrategy::Tournament => tournament_select(fitness, config.tournament_size, exclude, rng),
        SelectionStrategy::Roulette => roulette_select(fitness, exclude, rng),
    }
}

/// Uniform draw over `0..len` skipping `exclude`.
fn uniform<R: Rng>(len: usize, exclude: Option<usize>, rng: &mut R) -> Option<usize> {
    match exclude {
        Some(skip) if skip < len => {
            if len < 2 {
                return None;
            }
            let idx = rng.gen_range(0..len - 1);
            Some(if idx >= skip { idx + 1 } else { idx })
        }
        _ if len == 0 => None,
        _ => Some(rng.gen_range(0..len)),
    }
}

/// Tournament selection: randomly select k individuals and return the best.
fn tournament_select<R: Rng>(
    fitness: &[f64],
    k: usize,
    exclude: Option<usize>,
    rng: &mut R,
) -> Option<usize> {
    let mut best_idx = uniform(fitness.len(), exclude, rng)?;
    let mut best_fitness = fitness[best_idx];

    for _ in 1..k.max(1) {
        let Some(idx) = uniform(fitness.len(), exclude, rng) else {
            break;
        };
        if fitness[idx] > best_fitness {
            best_idx = idx;
            best_fitness = fitness[idx];
        }
    }

    Some(best_idx)
}

/// Roulette selection; uniform when no candidate has positive fitness.
fn roulette_select<R: Rng>(fitness: &[f64], exclude: Option<usize>, rng: &mut R) -> Option<usize> {
    let weight = |idx: usize| {
        let f = fitness[idx];
        if Some(idx) == exclude || !f.is_finite() || f <= 0.0 {
            0.0
        } else {
            f
        }
    };
    let total: f64 = (0..fitness.len()).map(weight).sum();
    if total <= 0.0 {
        return uniform(fitness.len(), exclude, rng);
    }

    let mut pick = rng.gen_range(0.0..total);
    let mut last = None;
    for idx in 0..fitness.len() {
        let w = weight(idx);
        if w <= 0.0 {
            continue;
        }
        if pick < w {
            return Some(idx);
        }
        pick -= w;
        last = Some(idx);
    }
    // Rounding can leave a sliver past the final bucket.
    last
}

/// Fitness statistics of a population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SelectionStats {
    /// Mean fitness of the population.
    pub mean_fitness: f64,
    /// Best fitness in the population.
    pub best_fitness: f64,
    /// Worst fitness in the population.
    pub worst_fitness: f64,
    /// Standard deviation of fitness.
    pub fitness_std: f64,
}

impl SelectionStats {
    /// Calculate statistics from fitness values.
    #[must_use]
    pub fn from_fitness(fitness: &[f64]) -> Self {
        if fitness.is_empty() {
            return Self {
                mean_fitness: 0.0,
                best_fitness: 0.0,
                worst_fitness: 0.0,
                fitness_std: 0.0,
            };
        }

        let sum: f64 = fitness.iter().sum();
        let mean = sum / fitness.len() as f64;

        let best = fitness.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let worst = fitness.iter().copied().fold(f64::INFINITY, f64::min);

        let variance: f64 =
            fitness.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / fitness.len() as f64;

        Self {
            mean_fitness: mean,
            best_fitness: best,
            worst_fitness: worst,
            fitness_std: variance.sqrt(),
        }
    }

    /// Statistics of a population's total scores.
    #[must_use]
    pub fn from_population(population: &[CodeVariant]) -> Self {
        Self::from_fitness(&totals(population))
    }
}
