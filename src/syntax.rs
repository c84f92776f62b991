//! Syntax tree utilities: parse, render, locate and substitute.
//!
//! The supported language is an indentation-based Python subset: functions,
//! `if`/`elif`/`else`, `while`, `for`, assignments, calls, subscripts,
//! attribute access, list displays and single-clause comprehensions.

mod lexer;
mod parser;
mod render;
mod tree;

use crate::error::ParseError;

pub use tree::{
    BinaryOp, BoolOp, Category, CmpOp, ComprehensionKind, Literal, NodeClass, NodeId, SyntaxTree,
    TreeId, UnaryOp,
};
pub(crate) use tree::{Ix, NodeKind};

/// Parse source text into a [`SyntaxTree`].
///
/// # Errors
///
/// Returns [`ParseError`] when the text is not valid in the supported subset.
pub fn parse(source: &str) -> Result<SyntaxTree, ParseError> {
    parser::parse_module(source)
}

/// Render a tree back to canonical source text.
#[must_use]
pub fn render(tree: &SyntaxTree) -> String {
    render::render_tree(tree)
}
