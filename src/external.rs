//! Seams to external collaborators.
//!
//! Two outside systems use the rule language without being part of this
//! crate: a decision-tree learner that proposes split thresholds, and a
//! constraint solver that treats rules as opaque row predicates. Both are
//! reached through a trait so callers can plug in their own implementation.

use crate::api::{Options, Rule, Template};
use crate::engine::{OutputMode, Partition, PartitionSet, TranslateContext, parse_rule, translate};
use crate::expr::{BinaryOp, CompareOp, Expr, Literal, RuleAst};
use crate::table::{Scalar, Table};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

/// One split on a root-to-leaf path: `feature <= threshold` or, when
/// `above` is set, `feature > threshold`.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitStep {
    pub feature: String,
    pub threshold: f64,
    pub above: bool,
}

/// A root-to-leaf path of a fitted tree and the value predicted at the leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitPath {
    pub steps: Vec<SplitStep>,
    pub prediction: Scalar,
}

/// A decision-tree learner queried for split thresholds.
pub trait SplitSource {
    fn split_paths(&self, table: &Table, features: &[String], target: &str) -> Result<Vec<SplitPath>, Box<dyn Error>>;
}

fn literal(value: &Scalar) -> Expr {
    match value {
        Scalar::Number(v) => Expr::number(*v),
        Scalar::Bool(b) => Expr::number(if *b { 1.0 } else { 0.0 }),
        Scalar::Null => Expr::Literal(Literal::Empty),
        other => Expr::text(other.to_string()),
    }
}

/// Render each path of `source` as an if/then template predicting `target`.
pub fn templates_from_splits(
    source: &dyn SplitSource,
    table: &Table,
    features: &[String],
    target: &str,
    group: u32,
) -> Result<Vec<Template>, Box<dyn Error>> {
    let paths = source.split_paths(table, features, target)?;
    debug!("{} split path(s) for target '{}'", paths.len(), target);
    Ok(paths
        .into_iter()
        .map(|path| {
            let then_part = Expr::compare(CompareOp::Eq, Expr::column(target), literal(&path.prediction));
            let if_part = path
                .steps
                .iter()
                .map(|s| {
                    let op = if s.above { CompareOp::Gt } else { CompareOp::Le };
                    Expr::compare(op, Expr::column(s.feature.clone()), Expr::number(s.threshold))
                })
                .reduce(|acc, c| Expr::binary(BinaryOp::And, acc, c));
            Template::new(RuleAst { if_part, then_part }.to_string()).with_group(group)
        })
        .collect())
}

/// A row-level predicate over named values.
pub type RowPredicate = Box<dyn Fn(&BTreeMap<String, Scalar>) -> bool + Send + Sync>;

/// A constraint solver that accepts named predicates.
pub trait PredicateRegistry {
    fn register(&mut self, name: String, predicate: RowPredicate);
}

/// Register every parsable rule as `rule_<id>`. A record satisfies the
/// predicate unless it meets the if-part and violates the then-part; records
/// the rule cannot be evaluated on satisfy it. Returns the number registered.
pub fn register_rules(rules: &[Rule], options: &Options, registry: &mut dyn PredicateRegistry) -> usize {
    let options = Arc::new(options.clone());
    let mut registered = 0;
    for rule in rules {
        let ast = match parse_rule(&rule.definition) {
            Ok(ast) => ast,
            Err(err) => {
                warn!("rule {} not registered: {}", rule.id, err);
                continue;
            }
        };
        let options = Arc::clone(&options);
        let skip = rule.tolerance_skip.clone();
        let predicate = move |record: &BTreeMap<String, Scalar>| {
            let table = Table::from_record(record);
            let ctx = TranslateContext {
                tolerance: options.tolerance.as_ref(),
                decimal: options.decimal,
                tables: &options.tables,
                tolerance_skip: &skip,
            };
            match translate(&ast, &table, &ctx) {
                Ok(t) => {
                    let out = t.execute(&table, &ctx, PartitionSet::X_NOT_Y, OutputMode::Counts);
                    out.get(Partition::XNotY).and_then(|o| o.count()) != Some(1)
                }
                Err(_) => true,
            }
        };
        registry.register(format!("rule_{}", rule.id), Box::new(predicate));
        registered += 1;
    }
    registered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use std::collections::HashMap;

    struct FixedTree;

    impl SplitSource for FixedTree {
        fn split_paths(&self, _: &Table, features: &[String], _: &str) -> Result<Vec<SplitPath>, Box<dyn Error>> {
            let feature = features.first().ok_or("no features")?.clone();
            Ok(vec![
                SplitPath {
                    steps: vec![SplitStep { feature: feature.clone(), threshold: 2.5, above: false }],
                    prediction: Scalar::from("low"),
                },
                SplitPath {
                    steps: vec![
                        SplitStep { feature: feature.clone(), threshold: 2.5, above: true },
                        SplitStep { feature, threshold: 10.0, above: false },
                    ],
                    prediction: Scalar::from("high"),
                },
            ])
        }
    }

    #[derive(Default)]
    struct Solver(HashMap<String, RowPredicate>);

    impl PredicateRegistry for Solver {
        fn register(&mut self, name: String, predicate: RowPredicate) {
            self.0.insert(name, predicate);
        }
    }

    #[test]
    fn split_paths_render_as_templates() {
        let t = Table::new([("A", Column::new([1.0]))]).unwrap();
        let templates = templates_from_splits(&FixedTree, &t, &["A".to_string()], "Class", 3).unwrap();
        let texts: Vec<&str> = templates.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                r#"if ({"A"} <= 2.5) then ({"Class"} == "low")"#,
                r#"if ({"A"} > 2.5) & ({"A"} <= 10) then ({"Class"} == "high")"#,
            ]
        );
        assert!(templates.iter().all(|t| t.group == 3 && parse_rule(&t.text).is_ok()));
        assert!(templates_from_splits(&FixedTree, &t, &[], "Class", 0).is_err());
    }

    #[test]
    fn rules_become_row_predicates() {
        let rules = vec![Rule::new(4, r#"if {"T"} == "x" then {"A"} > 0"#), Rule::new(5, "if then")];
        let mut solver = Solver::default();
        assert_eq!(register_rules(&rules, &Options::default(), &mut solver), 1);
        let p = &solver.0["rule_4"];
        let record =
            |t: &str, a: f64| BTreeMap::from([("T".to_string(), Scalar::from(t)), ("A".to_string(), Scalar::from(a))]);
        assert!(p(&record("x", 1.0)));
        assert!(!p(&record("x", -1.0)));
        assert!(p(&record("y", -1.0)));
        assert!(p(&BTreeMap::new()));
    }
}
