//! codevolve CLI - evolve faster, cleaner variants of a program.

// Allow print in the CLI binary
#![allow(clippy::print_stdout, clippy::print_stderr)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod cli;

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// codevolve - evolutionary optimizer for small Python programs
#[derive(Parser, Debug)]
#[command(name = "codevolve")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Evolve a program and write the best variant found
    Evolve {
        /// Seed program
        #[arg(required = true)]
        file: PathBuf,

        /// Variants per generation (default: 100)
        #[arg(short, long)]
        population: Option<usize>,

        /// Maximum generations (default: 50)
        #[arg(short, long)]
        generations: Option<usize>,

        /// Probability of attempting each rewrite (default: 0.1)
        #[arg(short, long)]
        mutation_rate: Option<f64>,

        /// Probability of crossover per child (default: 1.0)
        #[arg(short, long)]
        crossover_rate: Option<f64>,

        /// Random seed (default: 42)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Stop after this many generations without improvement; 0 disables
        #[arg(long)]
        patience: Option<usize>,

        /// Evaluation threads (default: CPU count)
        #[arg(short = 'j', long)]
        workers: Option<usize>,

        /// Fitness weights as correctness,performance,readability
        #[arg(short, long, value_parser = cli::parse_weights)]
        weights: Option<codevolve::gp::FitnessWeights>,

        /// JSON file with a full evolution configuration
        #[arg(long)]
        config: Option<PathBuf>,

        /// Where to write the best variant (default: optimized_<file>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,

        /// Number of final-population variants to list
        #[arg(short, long, default_value = "5")]
        top: usize,

        /// Show progress bar
        #[arg(long)]
        progress: bool,
    },

    /// Print a program in canonical form
    Fmt {
        /// Program to format
        #[arg(required = true)]
        file: PathBuf,

        /// Exit with an error instead of printing if the file is not canonical
        #[arg(long)]
        check: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let result = match args.command {
        Commands::Evolve {
            file,
            population,
            generations,
            mutation_rate,
            crossover_rate,
            seed,
            patience,
            workers,
            weights,
            config,
            output,
            format,
            top,
            progress,
        } => cli::evolve::execute(
            file,
            config,
            cli::evolve::Overrides {
                population,
                generations,
                mutation_rate,
                crossover_rate,
                seed,
                patience,
                workers,
                weights,
            },
            cli::evolve::Presentation {
                format,
                progress,
                top,
                output,
            },
        ),

        Commands::Fmt { file, check } => cli::fmt::execute(file, check),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
