//! Rule → partition operations.
//!
//! [`translate`] checks a concrete rule against a table and rewrites it for
//! execution:
//!
//! ```text
//!   RuleAst ──reformulate─▶ numeric ==/!= as interval tests     (decimal set)
//!           ──annotate────▶ tolerance tags on ordered comparisons (tolerance set)
//!           ──validate────▶ columns, arity, operands, regexes, variables
//!           ──────────────▶ Translation { if_part, then_part }
//! ```
//!
//! A [`Translation`] answers partition requests. Every partition variable is a
//! [`Selection`] over the if-part mask `X` and the then-part mask `Y`; masks are
//! computed at most once per execution and only when a requested variable needs
//! them. A mask that fails to evaluate makes exactly the variables that depend
//! on it [`Outcome::Undefined`].

use super::interp::Evaluator;
use super::partition::{Partition, PartitionCounts, PartitionSet};
use super::tolerance::{DEFAULT_KEY, ToleranceTable};
use crate::error::{EvalError, TranslationError};
use crate::expr::{BinaryOp, ColumnRef, CompareOp, Direction, Expr, Function, Literal, RuleAst, ToleranceTag, UnaryOp};
use crate::table::{LogicalType, Table};
use log::{debug, warn};
use once_cell::unsync::OnceCell;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

/// Inputs that shape how a rule is compiled.
#[derive(Debug, Clone, Copy)]
pub struct TranslateContext<'a> {
    pub tolerance: Option<&'a ToleranceTable>,
    /// Enables the equality rewrite.
    pub decimal: Option<i32>,
    pub tables: &'a BTreeMap<String, Table>,
    /// Columns never widened automatically.
    pub tolerance_skip: &'a [String],
}

/// Which masks a partition variable constrains: `Some(true)` must hold,
/// `Some(false)` must fail, `None` is unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub if_part: Option<bool>,
    pub then_part: Option<bool>,
}

impl Selection {
    pub fn of(p: Partition) -> Self {
        let (if_part, then_part) = match p {
            Partition::N => (None, None),
            Partition::X => (Some(true), None),
            Partition::NotX => (Some(false), None),
            Partition::Y => (None, Some(true)),
            Partition::NotY => (None, Some(false)),
            Partition::XY => (Some(true), Some(true)),
            Partition::XNotY => (Some(true), Some(false)),
            Partition::NotXNotY => (Some(false), Some(false)),
        };
        Selection { if_part, then_part }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let term = |name: &str, want: Option<bool>| want.map(|w| if w { name.to_string() } else { format!("¬{name}") });
        let parts: Vec<String> = [term("X", self.if_part), term("Y", self.then_part)].into_iter().flatten().collect();
        if parts.is_empty() { f.write_str("rows") } else { f.write_str(&parts.join(" ∧ ")) }
    }
}

/// Output shape of an executed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Counts,
    Rows,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Count(usize),
    /// Row positions, ascending.
    Rows(Vec<usize>),
    Undefined,
}

impl Outcome {
    pub fn count(&self) -> Option<usize> {
        match self {
            Outcome::Count(n) => Some(*n),
            Outcome::Rows(rows) => Some(rows.len()),
            Outcome::Undefined => None,
        }
    }
}

/// Results keyed by partition variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcomes(BTreeMap<Partition, Outcome>);

impl Outcomes {
    pub fn get(&self, p: Partition) -> Option<&Outcome> {
        self.0.get(&p)
    }

    pub fn counts(&self) -> PartitionCounts {
        let mut counts = PartitionCounts::default();
        for (p, outcome) in &self.0 {
            counts.set(*p, outcome.count());
        }
        counts
    }

    /// Row positions for `p`; empty when undefined or not requested.
    pub fn rows(&self, p: Partition) -> &[usize] {
        match self.0.get(&p) {
            Some(Outcome::Rows(rows)) => rows,
            _ => &[],
        }
    }
}

/// A compiled rule, ready to execute against tables with the same schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    if_part: Option<Expr>,
    then_part: Expr,
}

impl Translation {
    pub fn if_part(&self) -> Option<&Expr> {
        self.if_part.as_ref()
    }

    pub fn then_part(&self) -> &Expr {
        &self.then_part
    }

    /// The operation behind each requested partition variable.
    pub fn operations(&self, required: PartitionSet) -> Vec<(Partition, Selection)> {
        required.partitions().map(|p| (p, Selection::of(p))).collect()
    }

    /// Execute the requested operations. Never fails: a mask that cannot be
    /// evaluated leaves the variables depending on it undefined.
    pub fn execute(&self, table: &Table, ctx: &TranslateContext<'_>, required: PartitionSet, mode: OutputMode) -> Outcomes {
        let n = table.n_rows();
        let x: OnceCell<Option<Vec<bool>>> = OnceCell::new();
        let y: OnceCell<Option<Vec<bool>>> = OnceCell::new();
        let mask = |part: Option<&Expr>, name: &str| -> Option<Vec<bool>> {
            let Some(cond) = part else { return Some(vec![true; n]) };
            match Evaluator::new(table, ctx.tolerance, ctx.tables).mask(cond) {
                Ok(m) => Some(m),
                Err(err) => {
                    debug!("{} mask of '{}' is undefined: {}", name, cond, err);
                    None
                }
            }
        };

        let mut out = BTreeMap::new();
        for (p, sel) in self.operations(required) {
            let xm = match sel.if_part {
                Some(_) => x.get_or_init(|| mask(self.if_part.as_ref(), "if-part")).as_deref(),
                None => Some(&[][..]),
            };
            let ym = match sel.then_part {
                Some(_) => y.get_or_init(|| mask(Some(&self.then_part), "then-part")).as_deref(),
                None => Some(&[][..]),
            };
            let outcome = match (xm, ym) {
                (Some(xm), Some(ym)) => {
                    let keep = |row: usize| {
                        sel.if_part.is_none_or(|w| xm[row] == w) && sel.then_part.is_none_or(|w| ym[row] == w)
                    };
                    match mode {
                        OutputMode::Counts => Outcome::Count((0..n).filter(|&r| keep(r)).count()),
                        OutputMode::Rows => Outcome::Rows((0..n).filter(|&r| keep(r)).collect()),
                    }
                }
                _ => Outcome::Undefined,
            };
            out.insert(p, outcome);
        }
        Outcomes(out)
    }
}

/// Compile a concrete rule against `table`.
pub fn translate(rule: &RuleAst, table: &Table, ctx: &TranslateContext<'_>) -> Result<Translation, TranslationError> {
    let compile = |e: &Expr| -> Result<Expr, TranslationError> {
        let e = match ctx.decimal {
            Some(d) => reformulate(e, table, d, ctx.tolerance.is_some()),
            None => e.clone(),
        };
        let e = match ctx.tolerance {
            Some(tol) => annotate_conditions(&e, &Annotator { table, tolerance: tol, skip: ctx.tolerance_skip }),
            None => e,
        };
        validate(&e, table, ctx, &mut Vec::new())?;
        Ok(e)
    };
    let if_part = rule.if_part.as_ref().map(&compile).transpose()?;
    let then_part = compile(&rule.then_part)?;
    Ok(Translation { if_part, then_part })
}

// --- tolerance ----------------------------------------------------------------

struct Annotator<'a> {
    table: &'a Table,
    tolerance: &'a ToleranceTable,
    skip: &'a [String],
}

fn annotate_conditions(e: &Expr, a: &Annotator<'_>) -> Expr {
    match e {
        Expr::Binary { op: op @ (BinaryOp::And | BinaryOp::Or), lhs, rhs } => {
            Expr::binary(*op, annotate_conditions(lhs, a), annotate_conditions(rhs, a))
        }
        Expr::Unary { op: UnaryOp::Not, operand } => Expr::not(annotate_conditions(operand, a)),
        Expr::Binary { op: BinaryOp::Compare(cmp), lhs, rhs } => {
            let (l, r) = match cmp {
                CompareOp::Ge | CompareOp::Gt => (Direction::Up, Direction::Down),
                CompareOp::Le | CompareOp::Lt => (Direction::Down, Direction::Up),
                _ => return e.clone(),
            };
            Expr::compare(*cmp, annotate(lhs, l, a), annotate(rhs, r, a))
        }
        other => other.clone(),
    }
}

/// Tag numeric column references so that widening moves `e` in direction `dir`.
fn annotate(e: &Expr, dir: Direction, a: &Annotator<'_>) -> Expr {
    match e {
        Expr::Column(c) => {
            if a.skip.iter().any(|s| s == &c.name) {
                return e.clone();
            }
            let Some(column) = a.table.column(&c.name) else {
                warn!("tolerance requested for column '{}' which is not in the table; skipped", c.name);
                return e.clone();
            };
            if c.tolerance.is_some() || column.kind() != LogicalType::Numeric {
                return e.clone();
            }
            let key = if a.tolerance.contains_key(&c.name) { c.name.clone() } else { DEFAULT_KEY.to_string() };
            Expr::Column(ColumnRef { name: c.name.clone(), tolerance: Some(ToleranceTag { direction: dir, key }) })
        }
        Expr::Unary { op: UnaryOp::Neg, operand } => {
            Expr::Unary { op: UnaryOp::Neg, operand: Box::new(annotate(operand, dir.flip(), a)) }
        }
        Expr::Binary { op: op @ (BinaryOp::Add | BinaryOp::Mul), lhs, rhs } => {
            Expr::binary(*op, annotate(lhs, dir, a), annotate(rhs, dir, a))
        }
        Expr::Binary { op: op @ (BinaryOp::Sub | BinaryOp::Div), lhs, rhs } => {
            Expr::binary(*op, annotate(lhs, dir, a), annotate(rhs, dir.flip(), a))
        }
        Expr::Binary { op: BinaryOp::Pow, lhs, rhs } => Expr::binary(BinaryOp::Pow, annotate(lhs, dir, a), (**rhs).clone()),
        Expr::Call { func: func @ (Function::Min | Function::Max | Function::Floor | Function::Ceil), args } => {
            Expr::call(*func, args.iter().map(|x| annotate(x, dir, a)).collect())
        }
        Expr::Call { func: Function::Round, args } => {
            let mut args = args.clone();
            if let Some(first) = args.first_mut() {
                *first = annotate(first, dir, a);
            }
            Expr::call(Function::Round, args)
        }
        other => other.clone(),
    }
}

// --- reformulate --------------------------------------------------------------

/// Whether `e` is known to produce numbers against `table`.
fn is_numeric(e: &Expr, table: &Table) -> bool {
    match e {
        Expr::Literal(Literal::Number(_)) => true,
        Expr::Column(c) => table.column(&c.name).is_some_and(|col| col.kind() == LogicalType::Numeric),
        Expr::Unary { op: UnaryOp::Neg, .. } => true,
        Expr::Binary { op: BinaryOp::Add, lhs, rhs } => is_numeric(lhs, table) && is_numeric(rhs, table),
        Expr::Binary { op: BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow, .. } => true,
        Expr::Call { func: Function::Min | Function::Max, args } => args.iter().all(|x| is_numeric(x, table)),
        Expr::Call { func, .. } => !matches!(func, Function::Substr | Function::Split | Function::Exact | Function::Table),
        _ => false,
    }
}

/// Rewrite numeric equality into an interval test:
///
/// ```text
/// l == r  ─▶  abs(l - r) <= 1.5 * 10^-decimal       (no tolerance table)
/// l == r  ─▶  (l >= r) & (l <= r)                   (tolerance table; widened later)
/// l != r  ─▶  ~(...)
/// ```
fn reformulate(e: &Expr, table: &Table, decimal: i32, with_tolerance: bool) -> Expr {
    e.rewrite(&mut |node| match node {
        Expr::Binary { op: BinaryOp::Compare(op @ (CompareOp::Eq | CompareOp::Ne)), lhs, rhs }
            if !lhs.is_literal() && !rhs.is_literal() && is_numeric(&lhs, table) && is_numeric(&rhs, table) =>
        {
            let (l, r) = (*lhs, *rhs);
            let interval = if with_tolerance {
                Expr::and(Expr::compare(CompareOp::Ge, l.clone(), r.clone()), Expr::compare(CompareOp::Le, l, r))
            } else {
                let diff = Expr::call(Function::Abs, vec![Expr::binary(BinaryOp::Sub, l, r)]);
                Expr::compare(CompareOp::Le, diff, Expr::number(1.5 / 10f64.powi(decimal)))
            };
            if op == CompareOp::Ne { Expr::not(interval) } else { interval }
        }
        other => other,
    })
}

// --- validation ---------------------------------------------------------------

fn validate(e: &Expr, table: &Table, ctx: &TranslateContext<'_>, scope: &mut Vec<String>) -> Result<(), TranslationError> {
    match e {
        Expr::Column(c) if table.column(&c.name).is_none() => return Err(TranslationError::UnknownColumn(c.name.clone())),
        Expr::Var(v) if !scope.contains(v) => return Err(TranslationError::UnboundVariable(v.clone())),
        Expr::Comprehension { element, var, source } => {
            validate(source, table, ctx, scope)?;
            scope.push(var.clone());
            let result = validate(element, table, ctx, scope);
            scope.pop();
            return result;
        }
        Expr::Call { func, args } => {
            let (min, max) = func.arity();
            if args.len() < min || args.len() > max {
                return Err(TranslationError::Arity { function: func.name(), expected: func.arity_text(), found: args.len() });
            }
            if *func == Function::Table {
                return validate_table_call(args, ctx);
            }
        }
        Expr::Binary { op: BinaryOp::Compare(op), rhs, .. } => validate_operand(*op, rhs)?,
        _ => {}
    }
    e.children().into_iter().try_for_each(|c| validate(c, table, ctx, scope))
}

fn validate_operand(op: CompareOp, rhs: &Expr) -> Result<(), TranslationError> {
    let (positive, _) = op.positive();
    let malformed = |expected| Err(TranslationError::MalformedOperand { op: positive.symbol(), expected });
    match positive {
        CompareOp::In => match rhs {
            Expr::List(_) | Expr::Comprehension { .. } | Expr::Call { func: Function::Table, .. } => Ok(()),
            _ => malformed("a list or table(...)"),
        },
        CompareOp::Between => match rhs {
            Expr::List(items) if items.len() == 2 => Ok(()),
            _ => malformed("a [low, high] list"),
        },
        CompareOp::Match | CompareOp::Contains => match rhs {
            Expr::Literal(Literal::Text(pattern)) => Regex::new(pattern)
                .map(|_| ())
                .map_err(|e| TranslationError::InvalidRegex { pattern: pattern.clone(), reason: e.to_string() }),
            _ => malformed("a string pattern"),
        },
        _ => Ok(()),
    }
}

fn validate_table_call(args: &[Expr], ctx: &TranslateContext<'_>) -> Result<(), TranslationError> {
    let malformed = |expected| TranslationError::MalformedOperand { op: "table", expected };
    let Some(Expr::Literal(Literal::Text(name))) = args.first() else { return Err(malformed("a table name string")) };
    let aux = ctx.tables.get(name).ok_or_else(|| TranslationError::UnknownTable(name.clone()))?;
    let columns: Vec<&String> = match args.get(1) {
        Some(Expr::Literal(Literal::Text(c))) => vec![c],
        Some(Expr::List(items)) => items
            .iter()
            .map(|i| match i {
                Expr::Literal(Literal::Text(c)) => Ok(c),
                _ => Err(malformed("column name strings")),
            })
            .collect::<Result<_, _>>()?,
        _ => return Err(malformed("column name strings")),
    };
    match columns.into_iter().find(|c| aux.column(c).is_none()) {
        Some(c) => Err(TranslationError::UnknownTableColumn { table: name.clone(), column: c.clone() }),
        None => Ok(()),
    }
}

/// Evaluate a standalone condition with the same rewrites as a rule's parts.
pub(crate) fn condition_mask(
    cond: &Expr,
    table: &Table,
    ctx: &TranslateContext<'_>,
) -> Result<Vec<bool>, EvalError> {
    let rule = RuleAst { if_part: None, then_part: cond.clone() };
    let compiled = translate(&rule, table, ctx)?;
    Evaluator::new(table, ctx.tolerance, ctx.tables).mask(&compiled.then_part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::grammar::parse_rule;
    use crate::engine::tolerance::ToleranceBand;
    use crate::table::Column;

    fn ctx<'a>(tables: &'a BTreeMap<String, Table>, tolerance: Option<&'a ToleranceTable>) -> TranslateContext<'a> {
        TranslateContext { tolerance, decimal: None, tables, tolerance_skip: &[] }
    }

    fn tolerance() -> ToleranceTable {
        ToleranceTable::new([("default", vec![ToleranceBand::new(0.0, 1000.0, 1)])]).unwrap()
    }

    #[test]
    fn selections_cover_every_partition() {
        assert_eq!(Selection::of(Partition::XNotY), Selection { if_part: Some(true), then_part: Some(false) });
        assert_eq!(Selection::of(Partition::NotXNotY).to_string(), "¬X ∧ ¬Y");
        assert_eq!(Selection::of(Partition::N).to_string(), "rows");
    }

    #[test]
    fn counts_and_rows_for_a_bare_condition() {
        let t = Table::new([("A", Column::new([0.0, 1.0, 2.0]))]).unwrap();
        let tables = BTreeMap::new();
        let c = ctx(&tables, None);
        let tr = translate(&parse_rule(r#"{"A"} >= 1"#).unwrap(), &t, &c).unwrap();
        let all = PartitionSet::all();
        let counts = tr.execute(&t, &c, all, OutputMode::Counts).counts();
        assert_eq!(counts.get(Partition::N), Some(3));
        assert_eq!(counts.get(Partition::X), Some(3));
        assert_eq!(counts.get(Partition::NotX), Some(0));
        assert_eq!(counts.get(Partition::XY), Some(2));
        let rows = tr.execute(&t, &c, PartitionSet::X_Y | PartitionSet::X_NOT_Y, OutputMode::Rows);
        assert_eq!(rows.rows(Partition::XY), &[1, 2]);
        assert_eq!(rows.rows(Partition::XNotY), &[0]);
        assert_eq!(rows.get(Partition::N), None);
    }

    #[test]
    fn failing_masks_only_undefine_dependent_variables() {
        let t = Table::new([("A", Column::new([1.0, 2.0])), ("T", Column::new(["a", "b"]))]).unwrap();
        let tables = BTreeMap::new();
        let c = ctx(&tables, None);
        let tr = translate(&parse_rule(r#"if {"A"} > 1 then {"T"} > 0"#).unwrap(), &t, &c).unwrap();
        let out = tr.execute(&t, &c, PartitionSet::all(), OutputMode::Counts);
        assert_eq!(out.get(Partition::X), Some(&Outcome::Count(1)));
        assert_eq!(out.get(Partition::N), Some(&Outcome::Count(2)));
        assert_eq!(out.get(Partition::Y), Some(&Outcome::Undefined));
        assert_eq!(out.get(Partition::XY), Some(&Outcome::Undefined));
        // The then-part mask is never built when nothing needs it.
        let only_x = tr.execute(&t, &c, PartitionSet::N | PartitionSet::NOT_X, OutputMode::Counts);
        assert!(only_x.counts().iter().all(|(p, _)| p == Partition::N || p == Partition::NotX));
        assert_eq!(only_x.get(Partition::NotX), Some(&Outcome::Count(1)));
    }

    #[test]
    fn validation_errors() {
        let t = Table::new([("A", Column::new([1.0]))]).unwrap();
        let tables = BTreeMap::new();
        let c = ctx(&tables, None);
        let check = |text: &str| translate(&parse_rule(text).unwrap(), &t, &c).unwrap_err();
        assert_eq!(check(r#"{"B"} > 1"#), TranslationError::UnknownColumn("B".into()));
        assert!(matches!(check(r#"abs({"A"}, 2) > 1"#), TranslationError::Arity { function: "abs", .. }));
        assert_eq!(check(r#"{"A"} in 3"#), TranslationError::MalformedOperand { op: "in", expected: "a list or table(...)" });
        assert!(matches!(check(r#"{"A"} not between [1]"#), TranslationError::MalformedOperand { op: "between", .. }));
        assert!(matches!(check(r#"{"A"} match "(""#), TranslationError::InvalidRegex { .. }));
        assert_eq!(check(r#"{"A"} in [y for x in [1]]"#), TranslationError::UnboundVariable("y".into()));
        assert_eq!(check(r#"{"A"} in table("ref", "c")"#), TranslationError::UnknownTable("ref".into()));
    }

    #[test]
    fn automatic_tolerance_follows_comparison_direction() {
        let t = Table::new([
            ("A", Column::new([1.0])),
            ("B", Column::new([1.0])),
            ("C", Column::new([1.0])),
            ("T", Column::new(["x"])),
        ])
        .unwrap();
        let tables = BTreeMap::new();
        let tol = tolerance();
        let skip = vec!["C".to_string()];
        let c = TranslateContext { tolerance: Some(&tol), decimal: None, tables: &tables, tolerance_skip: &skip };
        let rule = parse_rule(r#"if {"T"} == "x" then {"A"} - {"B"} >= -{"C"}"#).unwrap();
        let tr = translate(&rule, &t, &c).unwrap();
        assert_eq!(tr.if_part().unwrap().to_string(), r#"({"T"} == "x")"#);
        assert_eq!(tr.then_part().to_string(), r#"({"A"}[+default] - {"B"}[-default] >= -{"C"})"#);

        let rule = parse_rule(r#"{"A"}[-default] < 2 * {"B"}"#).unwrap();
        let tr = translate(&rule, &t, &c).unwrap();
        assert_eq!(tr.then_part().to_string(), r#"({"A"}[-default] < 2 * {"B"}[+default])"#);
    }

    #[test]
    fn tolerance_skips_columns_missing_from_the_table() {
        let t = Table::new([("A", Column::new([1.0]))]).unwrap();
        let tol = tolerance();
        let a = Annotator { table: &t, tolerance: &tol, skip: &[] };
        let rule = parse_rule(r#"{"Gone"} >= {"A"}"#).unwrap();
        let annotated = annotate_conditions(&rule.then_part, &a);
        assert_eq!(annotated.to_string(), r#"({"Gone"} >= {"A"}[-default])"#);

        // The missing column is reported as such, never as a tolerance problem.
        let tables = BTreeMap::new();
        let c = ctx(&tables, Some(&tol));
        assert_eq!(translate(&rule, &t, &c).unwrap_err(), TranslationError::UnknownColumn("Gone".into()));
    }

    #[test]
    fn tolerance_widens_towards_satisfaction() {
        let t = Table::new([("A", Column::new([0.96, 0.9]))]).unwrap();
        let tables = BTreeMap::new();
        let tol = tolerance();
        let c = ctx(&tables, Some(&tol));
        let tr = translate(&parse_rule(r#"{"A"} >= 1"#).unwrap(), &t, &c).unwrap();
        let out = tr.execute(&t, &c, PartitionSet::X_Y | PartitionSet::X_NOT_Y, OutputMode::Rows);
        assert_eq!(out.rows(Partition::XY), &[0]);
        assert_eq!(out.rows(Partition::XNotY), &[1]);
    }

    #[test]
    fn reformulate_without_tolerance_uses_absolute_difference() {
        let t = Table::new([("A", Column::new([1.004, 1.02])), ("B", Column::new([1.0, 1.0]))]).unwrap();
        let tables = BTreeMap::new();
        let c = TranslateContext { tolerance: None, decimal: Some(2), tables: &tables, tolerance_skip: &[] };
        let tr = translate(&parse_rule(r#"{"A"} == {"B"}"#).unwrap(), &t, &c).unwrap();
        assert_eq!(tr.then_part().to_string(), r#"(abs({"A"} - {"B"}) <= 0.015)"#);
        let out = tr.execute(&t, &c, PartitionSet::X_Y, OutputMode::Rows);
        assert_eq!(out.rows(Partition::XY), &[0]);

        let tr = translate(&parse_rule(r#"{"A"} != {"B"}"#).unwrap(), &t, &c).unwrap();
        assert_eq!(tr.then_part().to_string(), r#"~(abs({"A"} - {"B"}) <= 0.015)"#);

        // Bare literals are left alone.
        let tr = translate(&parse_rule(r#"{"A"} == 1"#).unwrap(), &t, &c).unwrap();
        assert_eq!(tr.then_part().to_string(), r#"({"A"} == 1)"#);
    }

    #[test]
    fn reformulate_with_tolerance_uses_inclusive_bounds() {
        let t = Table::new([("A", Column::new([1.04, 1.2])), ("B", Column::new([1.0, 1.0]))]).unwrap();
        let tables = BTreeMap::new();
        let tol = tolerance();
        let c = TranslateContext { tolerance: Some(&tol), decimal: Some(1), tables: &tables, tolerance_skip: &[] };
        let tr = translate(&parse_rule(r#"{"A"} == {"B"}"#).unwrap(), &t, &c).unwrap();
        assert_eq!(
            tr.then_part().to_string(),
            r#"({"A"}[+default] >= {"B"}[-default]) & ({"A"}[-default] <= {"B"}[+default])"#
        );
        let out = tr.execute(&t, &c, PartitionSet::X_Y, OutputMode::Rows);
        assert_eq!(out.rows(Partition::XY), &[0]);
    }
}
