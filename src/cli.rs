//! CLI command implementations for codevolve.

pub(crate) mod evolve;
pub(crate) mod fmt;

mod output;

use clap::ValueEnum;
use codevolve::gp::{EvolutionError, FitnessWeights};
use codevolve::error::ParseError;
use std::error::Error;
use std::fmt as stdfmt;
use std::path::Path;

/// Output format for the `evolve` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// CLI error type.
#[derive(Debug)]
pub(crate) struct CliError {
    message: String,
}

impl CliError {
    /// Create a new CLI error.
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl stdfmt::Display for CliError {
    fn fmt(&self, f: &mut stdfmt::Formatter<'_>) -> stdfmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl From<EvolutionError> for CliError {
    fn from(e: EvolutionError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<ParseError> for CliError {
    fn from(e: ParseError) -> Self {
        Self::new(format!("parse error at {e}"))
    }
}

/// Read a source file with the path in the error message.
pub(crate) fn read_source(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path)
        .map_err(|e| CliError::new(format!("Failed to read {}: {e}", path.display())))
}

/// Parse `correctness,performance,readability` weights.
pub(crate) fn parse_weights(text: &str) -> Result<FitnessWeights, String> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    let [c, p, r] = parts.as_slice() else {
        return Err(format!("expected three comma-separated weights, got {text:?}"));
    };
    let number = |s: &str| s.parse::<f64>().map_err(|e| format!("invalid weight {s:?}: {e}"));
    let weights = FitnessWeights {
        correctness: number(c)?,
        performance: number(p)?,
        readability: number(r)?,
    };
    weights.validate()?;
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weights() {
        let weights = parse_weights("0.6, 0.2,0.2").unwrap();
        assert!((weights.correctness - 0.6).abs() < f64::EPSILON);
        assert!(parse_weights("1,2").is_err());
        assert!(parse_weights("a,b,c").is_err());
        assert!(parse_weights("0,0,0").is_err());
    }
}
