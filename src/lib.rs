//! Template-driven mining and evaluation of if-then data-quality rules.
//!
//! A rule reads `if <condition> then <condition>` (or just `<condition>`)
//! over the columns of a [`Table`]. Templates may write column names and
//! compared string values as regexes; [`mine`] expands them against the
//! table, scores every candidate with association metrics and keeps the
//! ones that pass the filter. [`evaluate`] reports, per rule, which rows
//! satisfy it and which violate it.
//!
//! ```text
//! Template ── mine ──> RuleSet ── evaluate ──> ResultSet
//! ```

extern crate self as rulequarry;

#[macro_use]
mod macros;
mod api;
mod engine;
mod error;
mod expr;
pub mod external;
mod table;

pub use api::{Options, ResultRow, ResultSet, Rule, RuleSet, Template, USER_DEFINED, evaluate, mine};
pub use engine::{
    DEFAULT_KEY, MINED, Metric, MetricValues, MiningStats, OutputMode, Outcome, Outcomes, Partition, PartitionCounts,
    PartitionSet, Selection, ToleranceBand, ToleranceTable, TranslateContext, Translation, calculate, canonical_expr,
    canonical_key, parse_condition, parse_rule, required_variables, translate,
};
pub use error::{ConfigError, Error, EvalError, Result, SyntaxError, TableError, TranslationError};
pub use expr::{
    BinaryOp, ColumnRef, CompareOp, Direction, Expr, Function, Literal, Part, RuleAst, ToleranceTag, UnaryOp,
};
pub use table::{Column, LogicalType, RowIndex, RowKey, Scalar, Table};
