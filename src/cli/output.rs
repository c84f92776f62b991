//! Output formatting utilities for CLI.

use codevolve::gp::{CodeVariant, EvolutionOutcome, FitnessScore, GenerationStats, Termination};
use serde::Serialize;

/// JSON-serializable scored variant.
#[derive(Debug, Serialize)]
pub(super) struct JsonVariant {
    /// Source text.
    source: String,
    /// Axis and total scores (null if never evaluated).
    score: Option<FitnessScore>,
}

impl JsonVariant {
    fn from_variant(variant: &CodeVariant) -> Self {
        Self {
            source: variant.source().to_string(),
            score: variant.fitness().score().copied(),
        }
    }
}

/// JSON-serializable evolution result.
#[derive(Debug, Serialize)]
pub(super) struct JsonEvolutionResult {
    /// Why the run stopped.
    termination: Termination,
    /// Generations evaluated.
    generations_run: usize,
    /// Score of the unmodified seed.
    seed_score: FitnessScore,
    /// Best variant found.
    best: JsonVariant,
    /// Runners-up from the final population, best first.
    top: Vec<JsonVariant>,
    /// Per-generation statistics.
    stats: Vec<GenerationStats>,
}

impl JsonEvolutionResult {
    /// Create from an outcome, keeping `top` population entries.
    pub(super) fn from_outcome(outcome: &EvolutionOutcome, top: usize) -> Self {
        Self {
            termination: outcome.termination,
            generations_run: outcome.generations_run,
            seed_score: outcome.seed_score,
            best: JsonVariant::from_variant(&outcome.best),
            top: outcome
                .population
                .iter()
                .take(top)
                .map(JsonVariant::from_variant)
                .collect(),
            stats: outcome.stats.clone(),
        }
    }
}

fn termination_text(termination: Termination) -> &'static str {
    match termination {
        Termination::GenerationLimit => "generation limit reached",
        Termination::PerfectScore => "perfect score reached",
        Termination::Stagnation => "no improvement within patience",
        Termination::Cancelled => "cancelled",
    }
}

fn score_line(label: &str, score: &FitnessScore) -> String {
    format!(
        "  {label}: {:.4} (correctness {:.3}, performance {:.3}, readability {:.3})\n",
        score.total_score(),
        score.correctness(),
        score.performance(),
        score.readability()
    )
}

/// Format an outcome as human-readable text.
pub(super) fn format_text(outcome: &EvolutionOutcome, top: usize) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Evolution Results ({} generations, {})\n",
        outcome.generations_run,
        termination_text(outcome.termination)
    ));
    output.push_str("========================================\n\n");

    output.push_str("Scores:\n");
    output.push_str(&score_line("Seed", &outcome.seed_score));
    match outcome.best.fitness().score() {
        Some(score) => output.push_str(&score_line("Best", score)),
        None => output.push_str("  Best: unscored\n"),
    }

    if let (Some(first), Some(last)) = (outcome.stats.first(), outcome.stats.last()) {
        output.push_str(&format!(
            "\nMean score: {:.4} -> {:.4}\n",
            first.mean, last.mean
        ));
    }

    output.push_str("\nBest variant:\n");
    output.push_str("----------------------------------------\n");
    output.push_str(outcome.best.source());
    if !outcome.best.source().ends_with('\n') {
        output.push('\n');
    }
    output.push_str("----------------------------------------\n");

    if top > 0 {
        output.push_str(&format!("\nTop {top} of final population:\n"));
        for (rank, variant) in outcome.population.iter().take(top).enumerate() {
            let lines = variant.source().lines().count();
            output.push_str(&format!(
                "  {:>2}. {:.4} ({lines} lines)\n",
                rank + 1,
                variant.total_score()
            ));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use codevolve::gp::{evolve, EvolutionConfig};

    fn outcome() -> EvolutionOutcome {
        let config = EvolutionConfig {
            population_size: 4,
            generations: 2,
            workers: 1,
            ..EvolutionConfig::default()
        };
        evolve("def f(x):\n    return x + 1\n", &config).unwrap()
    }

    #[test]
    fn test_format_text_lists_best_source() {
        let outcome = outcome();
        let text = format_text(&outcome, 2);
        assert!(text.contains("Evolution Results"));
        assert!(text.contains(outcome.best.source()));
        assert!(text.contains("Top 2 of final population"));
    }

    #[test]
    fn test_json_result_shape() {
        let outcome = outcome();
        let json = serde_json::to_value(JsonEvolutionResult::from_outcome(&outcome, 1)).unwrap();
        assert_eq!(json["top"].as_array().unwrap().len(), 1);
        assert!(json["best"]["score"]["total_score"].is_number());
        assert_eq!(json["stats"].as_array().unwrap().len(), outcome.generations_run);
    }
}
