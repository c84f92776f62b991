//! CLI command for evolving a program.

#![allow(clippy::needless_pass_by_value)]

use super::output::{format_text, JsonEvolutionResult};
use super::{read_source, CliError, OutputFormat};
use codevolve::gp::{Evolution, EvolutionConfig, FitnessWeights, GenerationStats};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Flags that override fields of the loaded configuration.
#[derive(Debug, Default)]
pub(crate) struct Overrides {
    pub(crate) population: Option<usize>,
    pub(crate) generations: Option<usize>,
    pub(crate) mutation_rate: Option<f64>,
    pub(crate) crossover_rate: Option<f64>,
    pub(crate) seed: Option<u64>,
    pub(crate) patience: Option<usize>,
    pub(crate) workers: Option<usize>,
    pub(crate) weights: Option<FitnessWeights>,
}

/// Presentation options.
#[derive(Debug)]
pub(crate) struct Presentation {
    pub(crate) format: OutputFormat,
    pub(crate) progress: bool,
    pub(crate) top: usize,
    pub(crate) output: Option<PathBuf>,
}

/// Build the run configuration from an optional JSON file and flags.
pub(crate) fn build_config(
    config_path: Option<&Path>,
    overrides: &Overrides,
) -> Result<EvolutionConfig, CliError> {
    let mut config = match config_path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| CliError::new(format!("Failed to read {}: {e}", path.display())))?;
            serde_json::from_str(&text)
                .map_err(|e| CliError::new(format!("Invalid config {}: {e}", path.display())))?
        }
        None => EvolutionConfig::default(),
    };

    if let Some(population) = overrides.population {
        config.population_size = population;
    }
    if let Some(generations) = overrides.generations {
        config.generations = generations;
    }
    if let Some(rate) = overrides.mutation_rate {
        config.mutation.rate = rate;
    }
    if let Some(rate) = overrides.crossover_rate {
        config.crossover.rate = rate;
    }
    if let Some(seed) = overrides.seed {
        config.seed = seed;
    }
    if let Some(patience) = overrides.patience {
        config.patience = patience;
    }
    if let Some(workers) = overrides.workers {
        config.workers = workers;
    }
    if let Some(weights) = overrides.weights {
        config.fitness.weights = weights;
    }

    config.validate()?;
    Ok(config)
}

/// Default destination for the optimized program: `optimized_<name>` next
/// to the input.
fn default_output(file: &Path) -> PathBuf {
    let name = file
        .file_name()
        .map_or_else(|| "program.py".to_string(), |n| n.to_string_lossy().to_string());
    file.with_file_name(format!("optimized_{name}"))
}

/// Execute the evolve command.
///
/// # Errors
///
/// Returns an error if the input cannot be read or parsed, the
/// configuration is invalid, or the result cannot be written.
pub(crate) fn execute(
    file: PathBuf,
    config_path: Option<PathBuf>,
    overrides: Overrides,
    presentation: Presentation,
) -> Result<(), CliError> {
    let source = read_source(&file)?;
    let config = build_config(config_path.as_deref(), &overrides)?;
    let generations = config.generations;

    let mut evolution = Evolution::new(&source, config)?;

    let pb = if presentation.progress {
        let pb = ProgressBar::new(generations as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} generations {msg}")
                .map_err(|e| CliError::new(format!("Invalid progress template: {e}")))?
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let start = Instant::now();
    let outcome = evolution.run_with(|stats: &GenerationStats| {
        if let Some(pb) = &pb {
            pb.set_position(stats.generation as u64 + 1);
            pb.set_message(format!("best {:.4}", stats.best_ever));
        }
    })?;
    if let Some(pb) = pb {
        pb.finish_with_message("done");
    }
    info!(seconds = start.elapsed().as_secs_f64(), "evolution run complete");

    let destination = presentation.output.unwrap_or_else(|| default_output(&file));
    fs::write(&destination, outcome.best.source()).map_err(|e| {
        CliError::new(format!("Failed to write {}: {e}", destination.display()))
    })?;

    match presentation.format {
        OutputFormat::Text => {
            print!("{}", format_text(&outcome, presentation.top));
            println!();
            println!("Wrote {}", destination.display());
        }
        OutputFormat::Json => {
            let json_result = JsonEvolutionResult::from_outcome(&outcome, presentation.top);
            let json = serde_json::to_string_pretty(&json_result)
                .map_err(|e| CliError::new(format!("JSON serialization failed: {e}")))?;
            println!("{json}");
        }
    }

    Ok(())
}
