//! Typed interpreter over a [`Table`].
//!
//! Expressions evaluate to a [`Value`]: a broadcast scalar, a per-row series, a
//! list (bracketed lists and comprehensions) or a set of auxiliary-table rows
//! (`table(...)`). Conditions evaluate to a boolean mask with one entry per row.
//!
//! Missing values follow dataframe semantics: any comparison against a missing
//! value is false (so `!=` is true), arithmetic propagates them, aggregates
//! skip them. Comparing values of incomparable types is an [`EvalError`], which
//! makes the enclosing candidate inapplicable.

use super::tolerance::ToleranceTable;
use crate::error::{EvalError, TranslationError};
use crate::expr::{BinaryOp, ColumnRef, CompareOp, Expr, Function, Literal, UnaryOp};
use crate::table::{LogicalType, Scalar, ScalarKey, Table};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone)]
pub(crate) enum Value<'a> {
    Scalar(Scalar),
    Series(Cow<'a, [Scalar]>),
    List(Vec<Value<'a>>),
    Rows { width: usize, keys: HashSet<Vec<ScalarKey>> },
}

impl Value<'_> {
    fn at(&self, row: usize) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            Value::Series(v) => v.get(row),
            Value::List(_) | Value::Rows { .. } => None,
        }
    }
}

/// Parse the string forms accepted for dates in rule text.
pub(crate) fn parse_time(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(|d| d.and_time(chrono::NaiveTime::MIN)))
}

fn mismatch(op: &'static str, a: &Scalar, b: &Scalar) -> EvalError {
    EvalError::TypeMismatch { op, lhs: a.type_name(), rhs: b.type_name() }
}

fn malformed(op: &'static str, expected: &'static str) -> EvalError {
    EvalError::Translation(TranslationError::MalformedOperand { op, expected })
}

/// Ordering of two present values; `None` when either is missing.
fn ordering(op: &'static str, a: &Scalar, b: &Scalar) -> Result<Option<Ordering>, EvalError> {
    if a.is_null() || b.is_null() {
        return Ok(None);
    }
    match (a, b) {
        (Scalar::Text(x), Scalar::Text(y)) => Ok(Some(x.cmp(y))),
        (Scalar::Time(x), Scalar::Time(y)) => Ok(Some(x.cmp(y))),
        (Scalar::Time(x), Scalar::Text(s)) => parse_time(s).map(|y| Some(x.cmp(&y))).ok_or_else(|| mismatch(op, a, b)),
        (Scalar::Text(s), Scalar::Time(y)) => parse_time(s).map(|x| Some(x.cmp(y))).ok_or_else(|| mismatch(op, a, b)),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(x.partial_cmp(&y)),
            _ => Err(mismatch(op, a, b)),
        },
    }
}

/// Equality with date coercion; missing values never compare equal.
fn loose_eq(a: &Scalar, b: &Scalar) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    match (a, b) {
        (Scalar::Text(x), Scalar::Text(y)) => x == y,
        (Scalar::Time(x), Scalar::Time(y)) => x == y,
        (Scalar::Time(x), Scalar::Text(s)) | (Scalar::Text(s), Scalar::Time(x)) => parse_time(s) == Some(*x),
        _ => matches!((a.as_number(), b.as_number()), (Some(x), Some(y)) if x == y),
    }
}

fn arithmetic(op: BinaryOp, a: &Scalar, b: &Scalar) -> Result<Scalar, EvalError> {
    if a.is_null() || b.is_null() {
        return Ok(Scalar::Null);
    }
    let (Some(x), Some(y)) = (a.as_number(), b.as_number()) else { return Err(mismatch(op.symbol(), a, b)) };
    let v = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        BinaryOp::Pow => x.powf(y),
        _ => return Err(mismatch(op.symbol(), a, b)),
    };
    Ok(Scalar::Number(v))
}

fn quantile(mut values: Vec<f64>, q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let pos = q * (values.len() - 1) as f64;
    let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
    values[lo] + (values[hi] - values[lo]) * (pos - lo as f64)
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn pearson(pairs: &[(f64, f64)]) -> f64 {
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let (mx, my) = (pairs.iter().map(|p| p.0).sum::<f64>() / n, pairs.iter().map(|p| p.1).sum::<f64>() / n);
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    let den = (sxx * syy).sqrt();
    if den == 0.0 { f64::NAN } else { sxy / den }
}

fn date_part(func: Function, t: &NaiveDateTime) -> f64 {
    let v = match func {
        Function::Year => t.year() as u32,
        Function::Month => t.month(),
        Function::Day => t.day(),
        Function::Hour => t.hour(),
        Function::Minute => t.minute(),
        Function::Second => t.second(),
        Function::Weekday => t.weekday().num_days_from_monday(),
        Function::DayOfYear => t.ordinal(),
        _ => (t.month() - 1) / 3 + 1,
    };
    f64::from(v)
}

/// Evaluates expressions and conditions against one table.
pub(crate) struct Evaluator<'a> {
    table: &'a Table,
    tolerance: Option<&'a ToleranceTable>,
    tables: &'a BTreeMap<String, Table>,
    scope: Vec<(String, Scalar)>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(
        table: &'a Table,
        tolerance: Option<&'a ToleranceTable>,
        tables: &'a BTreeMap<String, Table>,
    ) -> Self {
        Evaluator { table, tolerance, tables, scope: Vec::new() }
    }

    fn rows(&self) -> usize {
        self.table.n_rows()
    }

    // --- conditions ---------------------------------------------------------------

    /// Boolean mask of a condition, one entry per row.
    pub(crate) fn mask(&mut self, cond: &Expr) -> Result<Vec<bool>, EvalError> {
        match cond {
            Expr::Binary { op: BinaryOp::And, lhs, rhs } => {
                let (l, r) = (self.mask(lhs)?, self.mask(rhs)?);
                Ok(l.into_iter().zip(r).map(|(a, b)| a && b).collect())
            }
            Expr::Binary { op: BinaryOp::Or, lhs, rhs } => {
                let (l, r) = (self.mask(lhs)?, self.mask(rhs)?);
                Ok(l.into_iter().zip(r).map(|(a, b)| a || b).collect())
            }
            Expr::Unary { op: UnaryOp::Not, operand } => Ok(self.mask(operand)?.into_iter().map(|b| !b).collect()),
            Expr::Binary { op: BinaryOp::Compare(op), lhs, rhs } => self.compare(*op, lhs, rhs),
            other => {
                let v = self.value(other)?;
                self.truthy(&v)
            }
        }
    }

    fn truthy(&self, v: &Value<'_>) -> Result<Vec<bool>, EvalError> {
        (0..self.rows())
            .map(|i| match v.at(i) {
                None => Err(EvalError::UnexpectedList("condition")),
                Some(Scalar::Bool(b)) => Ok(*b),
                Some(s) if s.is_null() => Ok(false),
                Some(Scalar::Number(x)) => Ok(*x != 0.0),
                Some(s) => Err(mismatch("condition", s, &Scalar::Bool(true))),
            })
            .collect()
    }

    fn rowwise(
        &self,
        op: &'static str,
        l: &Value<'_>,
        r: &Value<'_>,
        f: impl Fn(&Scalar, &Scalar) -> Result<bool, EvalError>,
    ) -> Result<Vec<bool>, EvalError> {
        (0..self.rows())
            .map(|i| match (l.at(i), r.at(i)) {
                (Some(a), Some(b)) => f(a, b),
                _ => Err(EvalError::UnexpectedList(op)),
            })
            .collect()
    }

    fn compare(&mut self, op: CompareOp, lhs: &Expr, rhs: &Expr) -> Result<Vec<bool>, EvalError> {
        let mask = match op {
            CompareOp::Eq | CompareOp::Ne => return self.equality(op == CompareOp::Eq, lhs, rhs),
            CompareOp::Ge | CompareOp::Gt | CompareOp::Le | CompareOp::Lt => {
                let (l, r) = (self.value(lhs)?, self.value(rhs)?);
                let sym = op.symbol();
                self.rowwise(sym, &l, &r, |a, b| {
                    Ok(match ordering(sym, a, b)? {
                        None => false,
                        Some(o) => match op {
                            CompareOp::Ge => o != Ordering::Less,
                            CompareOp::Gt => o == Ordering::Greater,
                            CompareOp::Le => o != Ordering::Greater,
                            _ => o == Ordering::Less,
                        },
                    })
                })?
            }
            CompareOp::In | CompareOp::NotIn => self.membership(lhs, rhs)?,
            CompareOp::Between | CompareOp::NotBetween => self.between(lhs, rhs)?,
            CompareOp::Match | CompareOp::NotMatch => self.pattern(lhs, rhs, true)?,
            CompareOp::Contains | CompareOp::NotContains => self.pattern(lhs, rhs, false)?,
        };
        let (_, negated) = op.positive();
        Ok(if negated { mask.into_iter().map(|b| !b).collect() } else { mask })
    }

    fn equality(&mut self, eq: bool, lhs: &Expr, rhs: &Expr) -> Result<Vec<bool>, EvalError> {
        let empty = |e: &Expr| matches!(e, Expr::Literal(Literal::Empty));
        if empty(lhs) || empty(rhs) {
            let other = if empty(lhs) { rhs } else { lhs };
            let v = self.value(other)?;
            return (0..self.rows())
                .map(|i| v.at(i).map(|s| s.is_null() == eq).ok_or(EvalError::UnexpectedList("==")))
                .collect();
        }
        let (l, r) = (self.value(lhs)?, self.value(rhs)?);
        self.rowwise(if eq { "==" } else { "!=" }, &l, &r, |a, b| Ok(loose_eq(a, b) == eq))
    }

    fn membership(&mut self, lhs: &Expr, rhs: &Expr) -> Result<Vec<bool>, EvalError> {
        let set = self.value(rhs)?;
        let probe = self.value(lhs)?;
        match set {
            Value::Rows { width, keys } => {
                let parts = match probe {
                    Value::List(items) => items,
                    other => vec![other],
                };
                if parts.len() != width {
                    return Err(malformed("in", "one value per column of the referenced table"));
                }
                (0..self.rows())
                    .map(|i| {
                        let key: Option<Vec<ScalarKey>> = parts.iter().map(|p| p.at(i).map(Scalar::key)).collect();
                        key.map(|k| keys.contains(&k)).ok_or(EvalError::UnexpectedList("in"))
                    })
                    .collect()
            }
            Value::List(items) => {
                let constant: Option<HashSet<ScalarKey>> = items
                    .iter()
                    .map(|item| match item {
                        Value::Scalar(s) => Some(s.key()),
                        _ => None,
                    })
                    .collect();
                (0..self.rows())
                    .map(|i| {
                        let key = probe.at(i).map(Scalar::key).ok_or(EvalError::UnexpectedList("in"))?;
                        match &constant {
                            Some(set) => Ok(set.contains(&key)),
                            None => Ok(items.iter().any(|item| item.at(i).map(Scalar::key).as_ref() == Some(&key))),
                        }
                    })
                    .collect()
            }
            _ => Err(malformed("in", "a list or table(...)")),
        }
    }

    fn between(&mut self, lhs: &Expr, rhs: &Expr) -> Result<Vec<bool>, EvalError> {
        let Value::List(bounds) = self.value(rhs)? else { return Err(malformed("between", "a [low, high] list")) };
        let [lo, hi] = bounds.as_slice() else { return Err(malformed("between", "a [low, high] list")) };
        let v = self.value(lhs)?;
        (0..self.rows())
            .map(|i| {
                let (Some(x), Some(l), Some(h)) = (v.at(i), lo.at(i), hi.at(i)) else {
                    return Err(EvalError::UnexpectedList("between"));
                };
                let above = ordering("between", x, l)?.is_some_and(|o| o != Ordering::Less);
                let below = ordering("between", x, h)?.is_some_and(|o| o != Ordering::Greater);
                Ok(above && below)
            })
            .collect()
    }

    fn pattern(&mut self, lhs: &Expr, rhs: &Expr, anchored: bool) -> Result<Vec<bool>, EvalError> {
        let op = if anchored { "match" } else { "contains" };
        let Value::Scalar(Scalar::Text(pattern)) = self.value(rhs)? else { return Err(malformed(op, "a string pattern")) };
        let source = if anchored { format!("^(?:{pattern})") } else { pattern.clone() };
        let re = Regex::new(&source)
            .map_err(|e| TranslationError::InvalidRegex { pattern: pattern.clone(), reason: e.to_string() })?;
        let v = self.value(lhs)?;
        (0..self.rows())
            .map(|i| match v.at(i) {
                None => Err(EvalError::UnexpectedList(op)),
                Some(s) if s.is_null() => Ok(false),
                Some(Scalar::Text(t)) => Ok(re.is_match(t)),
                Some(s) => Err(mismatch(op, s, &Scalar::Text(pattern.clone()))),
            })
            .collect()
    }

    // --- values -------------------------------------------------------------------

    pub(crate) fn value(&mut self, e: &Expr) -> Result<Value<'a>, EvalError> {
        match e {
            Expr::Literal(Literal::Number(v)) => Ok(Value::Scalar(Scalar::Number(*v))),
            Expr::Literal(Literal::Text(s)) => Ok(Value::Scalar(Scalar::Text(s.clone()))),
            Expr::Literal(Literal::Empty) => Ok(Value::Scalar(Scalar::Null)),
            Expr::Column(c) => self.column(c),
            Expr::Var(name) => self
                .scope
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| Value::Scalar(v.clone()))
                .ok_or_else(|| TranslationError::UnboundVariable(name.clone()).into()),
            Expr::Unary { op: UnaryOp::Neg, operand } => {
                let v = self.value(operand)?;
                self.map(&v, "-", |s| arithmetic(BinaryOp::Sub, &Scalar::Number(0.0), s))
            }
            Expr::Unary { op: UnaryOp::Not, .. }
            | Expr::Binary { op: BinaryOp::And | BinaryOp::Or | BinaryOp::Compare(_), .. } => {
                let mask = self.mask(e)?;
                Ok(Value::Series(Cow::Owned(mask.into_iter().map(Scalar::Bool).collect())))
            }
            Expr::Binary { op, lhs, rhs } => {
                let (l, r) = (self.value(lhs)?, self.value(rhs)?);
                self.zip(&l, &r, op.symbol(), |a, b| arithmetic(*op, a, b))
            }
            Expr::Call { func, args } => self.call(*func, args),
            Expr::List(items) => Ok(Value::List(items.iter().map(|i| self.value(i)).collect::<Result<_, _>>()?)),
            Expr::Comprehension { element, var, source } => {
                let Value::List(items) = self.value(source)? else { return Err(malformed("for", "a list of values")) };
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let Value::Scalar(bound) = item else { return Err(malformed("for", "a list of values")) };
                    self.scope.push((var.clone(), bound));
                    let v = self.value(element);
                    self.scope.pop();
                    out.push(v?);
                }
                Ok(Value::List(out))
            }
        }
    }

    fn column(&self, c: &ColumnRef) -> Result<Value<'a>, EvalError> {
        let col = self.table.column(&c.name).ok_or_else(|| TranslationError::UnknownColumn(c.name.clone()))?;
        match (&c.tolerance, self.tolerance) {
            (Some(tag), Some(tol)) if col.kind() == LogicalType::Numeric => {
                let widened = col
                    .values()
                    .iter()
                    .map(|v| match v {
                        Scalar::Number(x) if !x.is_nan() => {
                            Scalar::Number(x + tag.direction.sign() * tol.half_unit(&tag.key, *x))
                        }
                        other => other.clone(),
                    })
                    .collect();
                Ok(Value::Series(Cow::Owned(widened)))
            }
            _ => Ok(Value::Series(Cow::Borrowed(col.values()))),
        }
    }

    fn map(
        &self,
        v: &Value<'_>,
        op: &'static str,
        f: impl Fn(&Scalar) -> Result<Scalar, EvalError>,
    ) -> Result<Value<'a>, EvalError> {
        match v {
            Value::Scalar(s) => Ok(Value::Scalar(f(s)?)),
            Value::Series(values) => Ok(Value::Series(Cow::Owned(values.iter().map(f).collect::<Result<_, _>>()?))),
            _ => Err(EvalError::UnexpectedList(op)),
        }
    }

    fn zip(
        &self,
        l: &Value<'_>,
        r: &Value<'_>,
        op: &'static str,
        f: impl Fn(&Scalar, &Scalar) -> Result<Scalar, EvalError>,
    ) -> Result<Value<'a>, EvalError> {
        match (l, r) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(f(a, b)?)),
            _ => {
                let out = (0..self.rows())
                    .map(|i| match (l.at(i), r.at(i)) {
                        (Some(a), Some(b)) => f(a, b),
                        _ => Err(EvalError::UnexpectedList(op)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Series(Cow::Owned(out)))
            }
        }
    }

    /// Present numeric values of a series, scalar or list, for aggregation.
    fn numbers(&self, v: &Value<'_>, op: &'static str) -> Result<Vec<f64>, EvalError> {
        let scalars: Vec<&Scalar> = match v {
            Value::Scalar(s) => vec![s],
            Value::Series(values) => values.iter().collect(),
            Value::List(items) => items.iter().map(|i| i.at(0).ok_or(EvalError::UnexpectedList(op))).collect::<Result<_, _>>()?,
            Value::Rows { .. } => return Err(EvalError::UnexpectedList(op)),
        };
        scalars
            .into_iter()
            .filter(|s| !s.is_null())
            .map(|s| s.as_number().ok_or_else(|| mismatch(op, s, &Scalar::Number(0.0))))
            .collect()
    }

    fn scalar_arg(&mut self, e: &Expr, op: &'static str) -> Result<Scalar, EvalError> {
        match self.value(e)? {
            Value::Scalar(s) => Ok(s),
            _ => Err(EvalError::ExpectedScalar(op)),
        }
    }

    fn call(&mut self, func: Function, args: &[Expr]) -> Result<Value<'a>, EvalError> {
        let (min, max) = func.arity();
        if args.len() < min || args.len() > max {
            let found = args.len();
            return Err(TranslationError::Arity { function: func.name(), expected: func.arity_text(), found }.into());
        }
        let name = func.name();
        match func {
            Function::Min | Function::Max => {
                let pick = |acc: Option<Scalar>, s: &Scalar| -> Result<Option<Scalar>, EvalError> {
                    if s.is_null() {
                        return Ok(acc);
                    }
                    Ok(Some(match acc {
                        None => s.clone(),
                        Some(cur) => {
                            let o = ordering(name, s, &cur)?.unwrap_or(Ordering::Equal);
                            let better = if func == Function::Min { o == Ordering::Less } else { o == Ordering::Greater };
                            if better { s.clone() } else { cur }
                        }
                    }))
                };
                if let [only] = args {
                    let v = self.value(only)?;
                    let items: Vec<Scalar> = match &v {
                        Value::Scalar(s) => vec![s.clone()],
                        Value::Series(values) => values.to_vec(),
                        Value::List(items) => items.iter().filter_map(|i| i.at(0).cloned()).collect(),
                        Value::Rows { .. } => return Err(EvalError::UnexpectedList(name)),
                    };
                    let best = items.iter().try_fold(None, |acc, s| pick(acc, s))?;
                    return Ok(Value::Scalar(best.unwrap_or(Scalar::Null)));
                }
                let values = args.iter().map(|a| self.value(a)).collect::<Result<Vec<_>, _>>()?;
                if values.iter().all(|v| matches!(v, Value::Scalar(_))) {
                    let best = values.iter().filter_map(|v| v.at(0)).try_fold(None, |acc, s| pick(acc, s))?;
                    return Ok(Value::Scalar(best.unwrap_or(Scalar::Null)));
                }
                let out = (0..self.rows())
                    .map(|i| {
                        let mut acc = None;
                        for v in &values {
                            acc = pick(acc, v.at(i).ok_or(EvalError::UnexpectedList(name))?)?;
                        }
                        Ok(acc.unwrap_or(Scalar::Null))
                    })
                    .collect::<Result<Vec<_>, EvalError>>()?;
                Ok(Value::Series(Cow::Owned(out)))
            }
            Function::Abs | Function::Floor | Function::Ceil => {
                let v = self.value(&args[0])?;
                self.map(&v, name, |s| {
                    if s.is_null() {
                        return Ok(Scalar::Null);
                    }
                    let x = s.as_number().ok_or_else(|| mismatch(name, s, &Scalar::Number(0.0)))?;
                    Ok(Scalar::Number(match func {
                        Function::Abs => x.abs(),
                        Function::Floor => x.floor(),
                        _ => x.ceil(),
                    }))
                })
            }
            Function::Round => {
                let digits = match args.get(1) {
                    Some(d) => self.scalar_arg(d, name)?.as_number().ok_or(EvalError::ExpectedScalar(name))? as i32,
                    None => 0,
                };
                let scale = 10f64.powi(digits);
                let v = self.value(&args[0])?;
                self.map(&v, name, |s| {
                    if s.is_null() {
                        return Ok(Scalar::Null);
                    }
                    let x = s.as_number().ok_or_else(|| mismatch(name, s, &Scalar::Number(0.0)))?;
                    Ok(Scalar::Number((x * scale).round_ties_even() / scale))
                })
            }
            Function::Quantile => {
                let q = self.scalar_arg(&args[1], name)?.as_number().ok_or(EvalError::ExpectedScalar(name))?;
                if !(0.0..=1.0).contains(&q) {
                    return Err(malformed("quantile", "a probability between 0 and 1"));
                }
                let v = self.value(&args[0])?;
                Ok(Value::Scalar(Scalar::Number(quantile(self.numbers(&v, name)?, q))))
            }
            Function::Sum | Function::Mean | Function::Std => {
                let v = self.value(&args[0])?;
                let xs = self.numbers(&v, name)?;
                let out = match func {
                    Function::Sum => xs.iter().sum(),
                    Function::Mean if xs.is_empty() => f64::NAN,
                    Function::Mean => xs.iter().sum::<f64>() / xs.len() as f64,
                    _ => std_dev(&xs),
                };
                Ok(Value::Scalar(Scalar::Number(out)))
            }
            Function::Count => {
                let v = self.value(&args[0])?;
                let n = match &v {
                    Value::Scalar(s) => usize::from(!s.is_null()),
                    Value::Series(values) => values.iter().filter(|s| !s.is_null()).count(),
                    Value::List(items) => items.len(),
                    Value::Rows { keys, .. } => keys.len(),
                };
                Ok(Value::Scalar(Scalar::Number(n as f64)))
            }
            Function::SumIf => {
                let mask = self.mask(&args[1])?;
                let v = self.value(&args[0])?;
                let mut total = 0.0;
                for (i, keep) in mask.iter().enumerate() {
                    let s = v.at(i).ok_or(EvalError::UnexpectedList(name))?;
                    if *keep && !s.is_null() {
                        total += s.as_number().ok_or_else(|| mismatch(name, s, &Scalar::Number(0.0)))?;
                    }
                }
                Ok(Value::Scalar(Scalar::Number(total)))
            }
            Function::CountIf => {
                let n = match args {
                    [cond] => self.mask(cond)?.into_iter().filter(|b| *b).count(),
                    [x, cond] => {
                        let mask = self.mask(cond)?;
                        let v = self.value(x)?;
                        (0..self.rows()).filter(|&i| mask[i] && v.at(i).is_some_and(|s| !s.is_null())).count()
                    }
                    _ => 0,
                };
                Ok(Value::Scalar(Scalar::Number(n as f64)))
            }
            Function::Exact => {
                let (l, r) = (self.value(&args[0])?, self.value(&args[1])?);
                self.zip(&l, &r, name, |a, b| {
                    Ok(Scalar::Bool(!a.is_null() && !b.is_null() && a.to_string() == b.to_string()))
                })
            }
            Function::Corr => {
                let (l, r) = (self.value(&args[0])?, self.value(&args[1])?);
                let mut pairs = Vec::new();
                for i in 0..self.rows() {
                    let (Some(a), Some(b)) = (l.at(i), r.at(i)) else { return Err(EvalError::UnexpectedList(name)) };
                    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
                        pairs.push((x, y));
                    } else if !a.is_null() && !b.is_null() {
                        return Err(mismatch(name, a, b));
                    }
                }
                Ok(Value::Scalar(Scalar::Number(pearson(&pairs))))
            }
            Function::Substr => {
                let start = self.scalar_arg(&args[1], name)?.as_number().ok_or(EvalError::ExpectedScalar(name))?;
                let len = match args.get(2) {
                    Some(l) => Some(self.scalar_arg(l, name)?.as_number().ok_or(EvalError::ExpectedScalar(name))?),
                    None => None,
                };
                let v = self.value(&args[0])?;
                self.map(&v, name, |s| {
                    if s.is_null() {
                        return Ok(Scalar::Null);
                    }
                    let text = s.to_string();
                    let chars = text.chars().skip(start.max(0.0) as usize);
                    Ok(Scalar::Text(match len {
                        Some(l) => chars.take(l.max(0.0) as usize).collect(),
                        None => chars.collect(),
                    }))
                })
            }
            Function::Split => {
                let sep = match self.scalar_arg(&args[1], name)? {
                    Scalar::Text(s) => s,
                    _ => return Err(malformed("split", "a string separator")),
                };
                let nth = self.scalar_arg(&args[2], name)?.as_number().ok_or(EvalError::ExpectedScalar(name))?;
                let v = self.value(&args[0])?;
                self.map(&v, name, |s| {
                    if s.is_null() {
                        return Ok(Scalar::Null);
                    }
                    let text = s.to_string();
                    Ok(text.split(sep.as_str()).nth(nth.max(0.0) as usize).map(|p| Scalar::Text(p.to_string())).into())
                })
            }
            Function::Table => self.lookup(&args[0], &args[1]),
            Function::Year
            | Function::Month
            | Function::Day
            | Function::Hour
            | Function::Minute
            | Function::Second
            | Function::Weekday
            | Function::DayOfYear
            | Function::Quarter => {
                let v = self.value(&args[0])?;
                self.map(&v, name, |s| match s {
                    s if s.is_null() => Ok(Scalar::Null),
                    Scalar::Time(t) => Ok(Scalar::Number(date_part(func, t))),
                    Scalar::Text(text) => parse_time(text)
                        .map(|t| Scalar::Number(date_part(func, &t)))
                        .ok_or_else(|| mismatch(name, s, &Scalar::Null)),
                    other => Err(mismatch(name, other, &Scalar::Null)),
                })
            }
        }
    }

    /// `table(name, column)` / `table(name, [columns])`: rows of an auxiliary table.
    fn lookup(&mut self, name: &Expr, columns: &Expr) -> Result<Value<'a>, EvalError> {
        let Scalar::Text(table_name) = self.scalar_arg(name, "table")? else {
            return Err(malformed("table", "a table name string"));
        };
        let names: Vec<String> = match self.value(columns)? {
            Value::Scalar(Scalar::Text(c)) => vec![c],
            Value::List(items) => items
                .iter()
                .map(|i| match i {
                    Value::Scalar(Scalar::Text(c)) => Ok(c.clone()),
                    _ => Err(malformed("table", "column name strings")),
                })
                .collect::<Result<_, _>>()?,
            _ => return Err(malformed("table", "column name strings")),
        };
        let aux = self.tables.get(&table_name).ok_or_else(|| TranslationError::UnknownTable(table_name.clone()))?;
        let cols = names
            .iter()
            .map(|c| {
                aux.column(c).ok_or_else(|| TranslationError::UnknownTableColumn {
                    table: table_name.clone(),
                    column: c.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let keys = (0..aux.n_rows()).map(|i| cols.iter().map(|c| c.values()[i].key()).collect()).collect();
        Ok(Value::Rows { width: cols.len(), keys })
    }
}
