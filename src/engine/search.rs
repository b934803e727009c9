//! Wildcard discovery and substitution enumeration.
//!
//! A column reference whose name is not a column of the table is a wildcard:
//! its name is a regex, full-match anchored against the schema. When a column
//! reference is compared with `==`/`!=` against a string literal, the literal
//! is a value wildcard, matched against the distinct values of each matched
//! column. A reference naming an existing text column matches only itself.
//!
//! [`wildcards`] flattens one rule part into a list of [`Wildcard`]s with
//! child-index paths. [`substitutions`] takes the Cartesian product of the
//! per-wildcard [`Choice`]s. Then-part enumeration is narrowed by the mask of
//! the substituted if-part and may refer to if-part capture groups as `\1`
//! .. `\9` in column patterns.

use crate::expr::{BinaryOp, ColumnRef, CompareOp, Expr, Literal, Part, RuleAst};
use crate::table::{LogicalType, Table};
use itertools::Itertools;
use log::warn;
use regex::Regex;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Wildcard {
    pub part: Part,
    pub column_path: Vec<usize>,
    pub column: ColumnRef,
    /// The reference names an existing column and matches only that column.
    pub exact: bool,
    /// Path and pattern of a paired string literal.
    pub value: Option<(Vec<usize>, String)>,
}

/// One concrete binding of a wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Choice {
    pub column: String,
    pub value: Option<String>,
    /// Capture groups of the column match, then of the value match.
    pub captures: Vec<String>,
}

fn is_wildcard(e: &Expr, table: &Table) -> bool {
    matches!(e, Expr::Column(c) if table.column(&c.name).is_none())
}

/// Columns that may carry a value wildcard: patterns, or existing text columns.
fn pairs_with_value(c: &ColumnRef, table: &Table) -> bool {
    table.column(&c.name).is_none_or(|col| col.kind() == LogicalType::Text)
}

/// Wildcards of one rule part in pre-order.
pub(crate) fn wildcards(expr: &Expr, part: Part, table: &Table) -> Vec<Wildcard> {
    let mut out = Vec::new();
    let mut stack: Vec<(Vec<usize>, &Expr)> = vec![(Vec::new(), expr)];
    while let Some((path, node)) = stack.pop() {
        if let Expr::Binary { op: BinaryOp::Compare(CompareOp::Eq | CompareOp::Ne), lhs, rhs } = node {
            let paired = match (lhs.as_ref(), rhs.as_ref()) {
                (Expr::Column(c), Expr::Literal(Literal::Text(v))) if pairs_with_value(c, table) => Some((0, c, 1, v)),
                (Expr::Literal(Literal::Text(v)), Expr::Column(c)) if pairs_with_value(c, table) => Some((1, c, 0, v)),
                _ => None,
            };
            if let Some((ci, column, vi, value)) = paired {
                let at = |i: usize| path.iter().copied().chain([i]).collect::<Vec<_>>();
                let value = Some((at(vi), value.clone()));
                let exact = table.column(&column.name).is_some();
                out.push(Wildcard { part, column_path: at(ci), column: column.clone(), exact, value });
                continue;
            }
        }
        if let Expr::Column(c) = node {
            if is_wildcard(node, table) {
                out.push(Wildcard { part, column_path: path, column: c.clone(), exact: false, value: None });
            }
            continue;
        }
        for (i, child) in node.children().into_iter().enumerate().rev() {
            let mut child_path = path.clone();
            child_path.push(i);
            stack.push((child_path, child));
        }
    }
    out
}

fn anchored(pattern: &str) -> Option<Regex> {
    match Regex::new(&format!("^(?:{pattern})$")) {
        Ok(re) => Some(re),
        Err(err) => {
            warn!("wildcard pattern '{}' is not a valid regex: {}", pattern, err);
            None
        }
    }
}

fn groups(re: &Regex, text: &str) -> Option<Vec<String>> {
    let caps = re.captures(text)?;
    Some(caps.iter().skip(1).map(|g| g.map(|m| m.as_str().to_string()).unwrap_or_default()).collect())
}

/// Replace `\1`..`\9` with the escaped text of earlier capture groups.
fn resolve_backrefs(pattern: &str, captures: &[String]) -> String {
    regex!(r"\\([1-9])")
        .replace_all(pattern, |c: &regex::Captures<'_>| {
            let k: usize = c[1].parse().unwrap_or(0);
            match captures.get(k.wrapping_sub(1)) {
                Some(text) => regex::escape(text),
                None => c[0].to_string(),
            }
        })
        .into_owned()
}

/// Concrete bindings of `w`. Values are drawn from rows where `mask` holds.
pub(crate) fn choices(w: &Wildcard, table: &Table, mask: Option<&[bool]>, captures: &[String]) -> Vec<Choice> {
    let column_pattern =
        if w.exact { regex::escape(&w.column.name) } else { resolve_backrefs(&w.column.name, captures) };
    let Some(column_re) = anchored(&column_pattern) else { return Vec::new() };
    let value_re = match &w.value {
        Some((_, pattern)) => match anchored(pattern) {
            Some(re) => Some(re),
            None => return Vec::new(),
        },
        None => None,
    };
    let mut out = Vec::new();
    for name in table.column_names() {
        let Some(column_groups) = groups(&column_re, name) else { continue };
        match &value_re {
            None => out.push(Choice { column: name.to_string(), value: None, captures: column_groups }),
            Some(re) => {
                for value in table.distinct_text(name, mask) {
                    if let Some(value_groups) = groups(re, &value) {
                        let captures = column_groups.iter().cloned().chain(value_groups).collect();
                        out.push(Choice { column: name.to_string(), value: Some(value), captures });
                    }
                }
            }
        }
    }
    out
}

/// Cartesian product of the choices of every wildcard. No wildcards yields
/// exactly one empty substitution.
pub(crate) fn substitutions(
    ws: &[Wildcard],
    table: &Table,
    mask: Option<&[bool]>,
    captures: &[String],
) -> Vec<Vec<Choice>> {
    if ws.is_empty() {
        return vec![Vec::new()];
    }
    ws.iter().map(|w| choices(w, table, mask, captures)).multi_cartesian_product().collect()
}

/// Capture groups of a substitution, in wildcard order.
pub(crate) fn captures_of(sub: &[Choice]) -> Vec<String> {
    sub.iter().flat_map(|c| c.captures.iter().cloned()).collect()
}

/// Substitute concrete columns and values into `rule`.
pub(crate) fn apply(rule: &RuleAst, ws: &[Wildcard], sub: &[Choice]) -> RuleAst {
    ws.iter().zip(sub).fold(rule.clone(), |acc, (w, choice)| {
        let column = ColumnRef { name: choice.column.clone(), tolerance: w.column.tolerance.clone() };
        let acc = acc.replace_at(w.part, &w.column_path, Expr::Column(column));
        match (&w.value, &choice.value) {
            (Some((path, _)), Some(value)) => acc.replace_at(w.part, path, Expr::text(value.clone())),
            _ => acc,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::grammar::parse_rule;
    use crate::table::Column;

    fn table() -> Table {
        Table::new([
            ("Type", Column::new(["life_insurer", "bank", "life_insurer", "pension"])),
            ("TP_life", Column::new([1.0, 0.0, 2.0, 0.0])),
            ("TP_nonlife", Column::new([0.0, 0.0, 1.0, 0.0])),
            ("Other", Column::new([5.0, 5.0, 5.0, 5.0])),
        ])
        .unwrap()
    }

    #[test]
    fn finds_paired_and_bare_wildcards() {
        let t = table();
        let rule = parse_rule(r#"if ({".*"} == "life.*") then ({"TP.*"} > {"Other"})"#).unwrap();
        let ifs = wildcards(rule.if_part.as_ref().unwrap(), Part::If, &t);
        assert_eq!(ifs.len(), 1);
        assert_eq!(ifs[0].column_path, vec![0]);
        assert_eq!(ifs[0].value, Some((vec![1], "life.*".to_string())));
        let thens = wildcards(&rule.then_part, Part::Then, &t);
        assert_eq!(thens.len(), 1);
        assert_eq!(thens[0].column.name, "TP.*");
        assert_eq!(thens[0].value, None);
    }

    #[test]
    fn value_wildcards_enumerate_text_columns_only() {
        let t = table();
        let rule = parse_rule(r#"{".*"} == "life.*|bank""#).unwrap();
        let ws = wildcards(&rule.then_part, Part::Then, &t);
        let subs = substitutions(&ws, &t, None, &[]);
        let values: Vec<_> = subs.iter().map(|s| (s[0].column.as_str(), s[0].value.clone().unwrap())).collect();
        assert_eq!(values, vec![("Type", "life_insurer".to_string()), ("Type", "bank".to_string())]);
    }

    #[test]
    fn value_regex_on_an_existing_column() {
        let t = table();
        let rule = parse_rule(r#"if {"Type"} == "life.*" then {"TP_life"} > 0"#).unwrap();
        let ws = wildcards(rule.if_part.as_ref().unwrap(), Part::If, &t);
        assert_eq!(ws.len(), 1);
        assert!(ws[0].exact);
        let subs = substitutions(&ws, &t, None, &[]);
        assert_eq!(subs.len(), 1);
        assert_eq!(
            apply(&rule, &ws, &subs[0]).to_string(),
            r#"if ({"Type"} == "life_insurer") then ({"TP_life"} > 0)"#
        );
        // Numeric columns keep a literal comparison.
        let numeric = parse_rule(r#"{"Other"} == "5""#).unwrap();
        assert!(wildcards(&numeric.then_part, Part::Then, &t).is_empty());
    }

    #[test]
    fn mask_narrows_value_discovery() {
        let t = table();
        let rule = parse_rule(r#"{"Ty.e"} == ".*""#).unwrap();
        let ws = wildcards(&rule.then_part, Part::Then, &t);
        let subs = substitutions(&ws, &t, Some(&[false, true, false, true]), &[]);
        let values: Vec<_> = subs.iter().filter_map(|s| s[0].value.clone()).collect();
        assert_eq!(values, vec!["bank", "pension"]);
    }

    #[test]
    fn product_and_application() {
        let t = table();
        let rule = parse_rule(r#"{"TP.*"} + {"O.*"} > 0"#).unwrap();
        let ws = wildcards(&rule.then_part, Part::Then, &t);
        let subs = substitutions(&ws, &t, None, &[]);
        assert_eq!(subs.len(), 2);
        let rendered: Vec<String> = subs.iter().map(|s| apply(&rule, &ws, s).to_string()).collect();
        assert_eq!(rendered, vec![r#"({"TP_life"} + {"Other"} > 0)"#, r#"({"TP_nonlife"} + {"Other"} > 0)"#]);
    }

    #[test]
    fn no_wildcards_is_one_empty_substitution() {
        let t = table();
        let rule = parse_rule(r#"{"Other"} > 0"#).unwrap();
        let ws = wildcards(&rule.then_part, Part::Then, &t);
        assert!(ws.is_empty());
        assert_eq!(substitutions(&ws, &t, None, &[]), vec![Vec::<Choice>::new()]);
        assert_eq!(apply(&rule, &ws, &[]), rule);
    }

    #[test]
    fn unmatched_wildcards_yield_nothing() {
        let t = table();
        let rule = parse_rule(r#"{"Missing.*"} > 0"#).unwrap();
        let ws = wildcards(&rule.then_part, Part::Then, &t);
        assert!(substitutions(&ws, &t, None, &[]).is_empty());
        let bad = parse_rule(r#"{"(unclosed"} > 0"#).unwrap();
        let ws = wildcards(&bad.then_part, Part::Then, &t);
        assert!(substitutions(&ws, &t, None, &[]).is_empty());
    }

    #[test]
    fn backreferences_use_if_part_captures() {
        let t = table();
        let rule = parse_rule(r#"if {"TP_(.*)"} > 0 then {"TP_non\1"} >= 0"#).unwrap();
        let ifs = wildcards(rule.if_part.as_ref().unwrap(), Part::If, &t);
        let if_subs = substitutions(&ifs, &t, None, &[]);
        assert_eq!(if_subs[0][0].captures, vec!["life"]);
        let thens = wildcards(&rule.then_part, Part::Then, &t);
        let then_subs = substitutions(&thens, &t, None, &captures_of(&if_subs[0]));
        assert_eq!(then_subs.len(), 1);
        assert_eq!(then_subs[0][0].column, "TP_nonlife");
        // `nonlife` has no `TP_non` + `nonlife` counterpart.
        assert!(substitutions(&thens, &t, None, &captures_of(&if_subs[1])).is_empty());
    }
}
