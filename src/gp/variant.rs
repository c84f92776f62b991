//! Candidate programs.

use crate::error::ParseError;
use crate::gp::crossover;
use crate::gp::fitness::FitnessScore;
use crate::syntax::{self, SyntaxTree};
use rand::Rng;
use std::sync::OnceLock;

/// Evaluation state of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Fitness {
    /// Not evaluated yet.
    #[default]
    Unscored,
    /// Evaluated.
    Scored(FitnessScore),
}

impl Fitness {
    /// Whether an evaluation has been recorded.
    #[must_use]
    pub fn is_scored(&self) -> bool {
        matches!(self, Self::Scored(_))
    }

    /// The recorded score, if any.
    #[must_use]
    pub fn score(&self) -> Option<&FitnessScore> {
        match self {
            Self::Unscored => None,
            Self::Scored(score) => Some(score),
        }
    }

    /// Total score, counting an unscored variant as zero.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.score().map_or(0.0, FitnessScore::total_score)
    }
}

/// One candidate program.
///
/// The source text is authoritative and never changes after construction.
/// The syntax tree is parsed from it on first use and cached; crossover and
/// mutation always build new variants rather than editing this one.
#[derive(Debug, Clone)]
pub struct CodeVariant {
    source: String,
    tree: OnceLock<Result<SyntaxTree, ParseError>>,
    fitness: Fitness,
}

impl CodeVariant {
    /// Wrap source text. The variant starts unscored.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            tree: OnceLock::new(),
            fitness: Fitness::Unscored,
        }
    }

    /// Render `tree` into a new unscored variant.
    #[must_use]
    pub fn from_tree(tree: &SyntaxTree) -> Self {
        Self::new(syntax::render(tree))
    }

    /// Source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Syntax tree parsed from the source.
    ///
    /// # Errors
    ///
    /// Returns the [`ParseError`] when the source is not valid.
    pub fn tree(&self) -> Result<&SyntaxTree, &ParseError> {
        self.tree
            .get_or_init(|| syntax::parse(&self.source))
            .as_ref()
    }

    /// Whether the source parses.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.tree().is_ok()
    }

    /// Evaluation state.
    #[must_use]
    pub fn fitness(&self) -> &Fitness {
        &self.fitness
    }

    /// Total score, zero when unscored.
    #[must_use]
    pub fn total_score(&self) -> f64 {
        self.fitness.total()
    }

    /// Record an evaluation.
    pub fn set_fitness(&mut self, fitness: Fitness) {
        self.fitness = fitness;
    }

    /// Copy of this variant with its score cleared.
    #[must_use]
    pub fn offspring(&self) -> Self {
        Self {
            fitness: Fitness::Unscored,
            ..self.clone()
        }
    }

    /// Combine this variant with `other`; see [`crossover::crossover`].
    #[must_use]
    pub fn crossover<R: Rng>(&self, other: &CodeVariant, rng: &mut R) -> CodeVariant {
        crossover::crossover(self, other, &crossover::CrossoverConfig::default(), rng)
    }
}
