//! Error types for parsing, tree editing and program execution.

use crate::syntax::{NodeClass, NodeId};
use thiserror::Error;

/// Source text could not be parsed into a syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    /// 1-based line of the offending token.
    pub line: usize,
    /// 1-based column of the offending token.
    pub column: usize,
    /// Human-readable description.
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Failure while editing a syntax tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The handle is foreign to the tree or no longer reachable from its root.
    #[error("node {0} does not belong to this tree")]
    NodeNotFound(NodeId),
    /// The replacement cannot stand where the target stands.
    #[error("cannot replace a {target:?} node with a {replacement:?} node")]
    Incompatible {
        /// Class required by the target's slot.
        target: NodeClass,
        /// Class of the offered replacement.
        replacement: NodeClass,
    },
    /// Only assignable expressions may replace an assignment target.
    #[error("replacement for an assignment target must be assignable")]
    NotAssignable,
    /// The module root has no parent slot to swap.
    #[error("the module root cannot be replaced")]
    RootReplacement,
    /// A rewrite was asked to edit a node that does not have its shape.
    #[error("node {0} does not match the rewrite pattern")]
    Unmatched(NodeId),
}

/// Result type for tree edits.
pub type TreeResult<T> = Result<T, TreeError>;

/// A program run stopped before producing a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// The fuel budget ran out.
    #[error("fuel budget of {0} units exhausted")]
    OutOfFuel(u64),
    /// The wall-clock deadline passed.
    #[error("deadline exceeded")]
    Deadline,
    /// The run was cancelled from outside.
    #[error("execution cancelled")]
    Cancelled,
    /// Too many nested function calls.
    #[error("maximum recursion depth of {0} exceeded")]
    RecursionLimit(usize),
    /// The program raised an error of its own.
    #[error("{0}")]
    Runtime(String),
}

impl ExecError {
    /// Whether the run exhausted its time or fuel budget.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::OutOfFuel(_) | Self::Deadline)
    }

    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }
}

/// Result type for program execution.
pub type ExecResult<T> = Result<T, ExecError>;
