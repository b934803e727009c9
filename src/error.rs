//! Error taxonomy.
//!
//! Only [`ConfigError`] is ever surfaced to callers of [`crate::mine`] and
//! [`crate::evaluate`]. Syntax, translation and evaluation errors are absorbed
//! per template, per candidate or per expression key, logged, and represented as
//! an absent value.

use thiserror::Error;

/// Rule text that the grammar cannot match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at byte {offset}: found {found}, expected {}", expected.join(" | "))]
pub struct SyntaxError {
    /// Byte offset of the farthest token the parser could not consume.
    pub offset: usize,
    /// Text of that token (`end of input` when the text ran out).
    pub found: String,
    /// Token kinds that would have allowed the parse to continue.
    pub expected: Vec<&'static str>,
}

/// Invalid caller configuration. Raised immediately at setup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("tolerance table has no \"default\" key")]
    MissingDefaultTolerance,
    #[error("tolerance key '{0}' contains whitespace")]
    WhitespaceInToleranceKey(String),
    #[error("tolerance band [{lower}, {upper}) under key '{key}' is empty or not a number")]
    InvalidToleranceBand { key: String, lower: f64, upper: f64 },
    #[error("unknown metric '{0}'")]
    UnknownMetric(String),
}

/// Table construction failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("column '{column}' has {found} rows, expected {expected}")]
    LengthMismatch { column: String, expected: usize, found: usize },
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
    #[error("column '{0}' mixes value types")]
    MixedTypes(String),
    #[error("index key has {found} levels, expected {expected}")]
    IndexLevels { expected: usize, found: usize },
}

/// A concrete rule that cannot be compiled against a table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("unknown auxiliary table '{0}'")]
    UnknownTable(String),
    #[error("auxiliary table '{table}' has no column '{column}'")]
    UnknownTableColumn { table: String, column: String },
    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity { function: &'static str, expected: &'static str, found: usize },
    #[error("unbound variable '{0}'")]
    UnboundVariable(String),
    #[error("right-hand side of '{op}' must be {expected}")]
    MalformedOperand { op: &'static str, expected: &'static str },
    #[error("invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

/// A runtime failure while executing a compiled operation against data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("cannot apply '{op}' to {lhs} and {rhs}")]
    TypeMismatch { op: &'static str, lhs: &'static str, rhs: &'static str },
    #[error("'{0}' requires a single value, got a column")]
    ExpectedScalar(&'static str),
    #[error("'{0}' produced a list where a column or value was expected")]
    UnexpectedList(&'static str),
    #[error("column length {found} does not match row count {expected}")]
    LengthMismatch { expected: usize, found: usize },
    #[error(transparent)]
    Translation(#[from] TranslationError),
}

/// Umbrella error for callers that want a single type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Translation(#[from] TranslationError),
    #[error(transparent)]
    Evaluation(#[from] EvalError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
