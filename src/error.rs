//! Error taxonomy.
//!
//! - Construction errors ([`ExprError`], [`BuildError`]) reject the input.
//! - Evaluation errors ([`EvalError`], [`RunError`]) abort a single concrete run.
//! - Generation errors ([`GenerateError`]) cover malformed paths and solver
//!   inconclusiveness. An infeasible path is *not* an error.

use thiserror::Error;

use crate::types::{Label, Node};

/// Malformed expression built from untyped parts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("unknown arithmetic operator '{0}'")]
    UnknownArithOp(String),
    #[error("unknown boolean operator '{0}'")]
    UnknownBoolOp(String),
    #[error("operator '{op}' expects {expected} operands")]
    OperandKind { op: String, expected: &'static str },
}

/// Failure while evaluating an expression or executing a statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unbound variable '{0}'")]
    UnboundVariable(String),
    #[error("variable '{name}' is not {expected}")]
    TypeMismatch { name: String, expected: &'static str },
    #[error("division by zero")]
    DivisionByZero,
    #[error("negative exponent")]
    NegativeExponent,
    #[error("integer overflow")]
    Overflow,
    #[error("no input value left for '{0}'")]
    InputExhausted(String),
}

/// Malformed AST rejected by the CFG builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("label {0} is used by more than one statement")]
    DuplicateLabel(Label),
}

/// Failure of a concrete run over the CFG.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("evaluation failed at node {node}: {source}")]
    Eval {
        node: Node,
        #[source]
        source: EvalError,
    },
    #[error("no enabled edge leaves node {0}")]
    Stuck(Node),
    #[error("step limit of {0} exceeded")]
    StepLimit(usize),
}

/// Failure of test generation for a single path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("variable '{var}' is used both as an integer and as a boolean")]
    SortMismatch { var: String },
    #[error("solver inconclusive: {0}")]
    Inconclusive(String),
}
