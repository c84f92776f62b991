// Allow unwrap and unreadable literals in tests (test code is not production)
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::unreadable_literal))]
//! codevolve: an evolutionary optimizer for small Python programs.
//!
//! This crate searches the space of syntax-tree variants of a seed program
//! for versions that behave the same but run faster and read better:
//! - Canonical parsing and rendering of a Python subset
//! - Fuel-metered, deterministic execution of candidate programs
//! - Parallel fitness evaluation with genetic selection, crossover and
//!   behaviour-preserving rewrites
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Evolution Loop (gp)          │
//! ├─────────────────────────────────────┤
//! │   Fitness Harness │ Interpreter     │
//! ├─────────────────────────────────────┤
//! │    Syntax Trees (parse / render)    │
//! └─────────────────────────────────────┘
//! ```

pub mod error;
pub mod gp;
pub mod interp;
pub mod syntax;

pub use error::{ExecError, ParseError, TreeError};

// Re-export the main entry points at crate root for convenience
pub use gp::{evolve, CodeVariant, EvolutionConfig, EvolutionOutcome};
pub use syntax::{parse, render, SyntaxTree};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_render_roundtrip_at_root() {
        let source = "def f(x):\n    return x * 2\n";
        assert_eq!(render(&parse(source).unwrap()), source);
    }
}
