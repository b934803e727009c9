//! Mining and evaluation passes.
//!
//! Both passes walk a small state machine per template or rule:
//!
//! ```text
//! mining      Idle ─▶ Parsing ─▶ Searching ─▶ Filtering ─▶ Accumulated
//!                        │ syntax error: template skipped
//! evaluation  Idle ─▶ Parsing ─▶ Evaluating ─▶ Accumulated
//! ```
//!
//! During mining every candidate is canonicalized first; a key seen earlier in
//! the run (accepted, rejected or inapplicable) is not evaluated again.
//! Per-candidate failures are logged and counted, never returned.

use super::canonical::canonical_key;
use super::grammar::parse_rule;
use super::interp::{Evaluator, Value};
use super::metrics::{Metric, MetricValues, calculate, required_variables};
use super::partition::{Partition, PartitionSet};
use super::search::{apply, captures_of, substitutions, wildcards};
use super::translate::{OutputMode, Outcome, TranslateContext, condition_mask, translate};
use crate::api::{Options, ResultRow, Rule, Template};
use crate::expr::{Expr, Function, Literal, Part, RuleAst};
use crate::table::{Scalar, Table};
use log::{debug, info, trace, warn};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Status label of rules produced by [`crate::mine`].
pub const MINED: &str = "mined";

/// Counters for one mining run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MiningStats {
    pub templates: usize,
    /// Templates that failed to parse.
    pub templates_skipped: usize,
    /// Concrete candidates produced by substitution, duplicates included.
    pub candidates: usize,
    pub duplicates: usize,
    /// Candidates that could not be compiled or evaluated.
    pub inapplicable: usize,
    pub rejected: usize,
    pub accepted: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Parsing,
    Searching,
    Filtering,
    Evaluating,
    Accumulated,
}

fn translate_context<'a>(options: &'a Options, tolerance_skip: &'a [String]) -> TranslateContext<'a> {
    TranslateContext {
        tolerance: options.tolerance.as_ref(),
        decimal: options.decimal,
        tables: &options.tables,
        tolerance_skip,
    }
}

/// Replace `quantile(...)` calls by their value on `table`. A missing result
/// becomes `empty`; calls that cannot be evaluated are kept.
pub(crate) fn fold_quantiles(rule: &RuleAst, table: &Table, options: &Options) -> RuleAst {
    rule.map(|e| {
        e.rewrite(&mut |node| match node {
            Expr::Call { func: Function::Quantile, .. } => {
                let mut ev = Evaluator::new(table, options.tolerance.as_ref(), &options.tables);
                match ev.value(&node) {
                    Ok(Value::Scalar(Scalar::Number(v))) if v.is_nan() => Expr::Literal(Literal::Empty),
                    Ok(Value::Scalar(Scalar::Number(v))) => Expr::number(v),
                    _ => node,
                }
            }
            other => other,
        })
    })
}

pub(crate) struct Miner<'a> {
    table: &'a Table,
    options: &'a Options,
    /// Configured metrics plus those named by the filter.
    computed: Vec<Metric>,
    required: PartitionSet,
    seen: HashSet<String>,
    state: State,
    rules: Vec<Rule>,
    stats: MiningStats,
}

impl<'a> Miner<'a> {
    pub(crate) fn new(table: &'a Table, options: &'a Options) -> Self {
        let mut computed = options.metrics.clone();
        for m in options.filter.keys() {
            if !computed.contains(m) {
                computed.push(*m);
            }
        }
        let required = required_variables(&computed);
        Miner {
            table,
            options,
            computed,
            required,
            seen: HashSet::new(),
            state: State::Idle,
            rules: Vec::new(),
            stats: MiningStats::default(),
        }
    }

    fn enter(&mut self, state: State) {
        trace!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    pub(crate) fn run(mut self, templates: &[Template]) -> (Vec<Rule>, MiningStats) {
        let start = Instant::now();
        for (i, template) in templates.iter().enumerate() {
            self.template(i, template);
        }
        self.enter(State::Idle);
        self.stats.elapsed = start.elapsed();
        info!(
            "mined {} rule(s) from {} template(s): {} candidate(s), {} duplicate(s), {} inapplicable, {} rejected",
            self.stats.accepted,
            self.stats.templates,
            self.stats.candidates,
            self.stats.duplicates,
            self.stats.inapplicable,
            self.stats.rejected
        );
        (self.rules, self.stats)
    }

    fn template(&mut self, i: usize, template: &Template) {
        self.stats.templates += 1;
        self.enter(State::Parsing);
        let ast = match parse_rule(&template.text) {
            Ok(ast) => ast,
            Err(err) => {
                warn!("template {} skipped: {}", i, err);
                self.stats.templates_skipped += 1;
                self.enter(State::Idle);
                return;
            }
        };

        self.enter(State::Searching);
        let (before_candidates, before_accepted) = (self.stats.candidates, self.stats.accepted);
        let table = self.table;
        let ctx = translate_context(self.options, &template.tolerance_skip);
        let if_ws = ast.if_part.as_ref().map(|e| wildcards(e, Part::If, table)).unwrap_or_default();
        let then_ws = wildcards(&ast.then_part, Part::Then, table);
        let narrow = then_ws.iter().any(|w| w.value.is_some());

        for if_sub in substitutions(&if_ws, table, None, &[]) {
            let partial = apply(&ast, &if_ws, &if_sub);
            let mask = match (&partial.if_part, narrow) {
                (Some(cond), true) => match condition_mask(cond, table, &ctx) {
                    Ok(mask) => Some(mask),
                    Err(err) => {
                        debug!("if-part '{}' is inapplicable: {}", cond, err);
                        self.stats.inapplicable += 1;
                        continue;
                    }
                },
                _ => None,
            };
            for then_sub in substitutions(&then_ws, table, mask.as_deref(), &captures_of(&if_sub)) {
                let candidate = apply(&partial, &then_ws, &then_sub);
                self.candidate(candidate, template, &ctx);
                self.enter(State::Searching);
            }
        }

        self.enter(State::Accumulated);
        info!(
            "template {} ('{}'): {} candidate(s), {} accepted",
            i,
            template.text,
            self.stats.candidates - before_candidates,
            self.stats.accepted - before_accepted
        );
    }

    fn candidate(&mut self, candidate: RuleAst, template: &Template, ctx: &TranslateContext<'_>) {
        self.stats.candidates += 1;
        let candidate =
            if self.options.evaluate_quantile { fold_quantiles(&candidate, self.table, self.options) } else { candidate };
        let key = canonical_key(&candidate);
        if !self.seen.insert(key.clone()) {
            debug!("duplicate candidate skipped: {}", key);
            self.stats.duplicates += 1;
            return;
        }

        self.enter(State::Filtering);
        let translation = match translate(&candidate, self.table, ctx) {
            Ok(t) => t,
            Err(err) => {
                debug!("candidate '{}' is inapplicable: {}", key, err);
                self.stats.inapplicable += 1;
                return;
            }
        };
        let outcomes = translation.execute(self.table, ctx, self.required, OutputMode::Counts);
        if self.required.partitions().any(|p| outcomes.get(p) == Some(&Outcome::Undefined)) {
            debug!("candidate '{}' is inapplicable: evaluation failed", key);
            self.stats.inapplicable += 1;
            return;
        }
        let values = calculate(&outcomes.counts(), &self.computed);
        if !passes(&values, self.options) {
            debug!("candidate '{}' rejected: {:?}", key, values);
            self.stats.rejected += 1;
            return;
        }

        let metrics: MetricValues = values.into_iter().filter(|(m, _)| self.options.metrics.contains(m)).collect();
        debug!("candidate '{}' accepted as rule {}", key, self.rules.len());
        self.rules.push(Rule {
            id: self.rules.len(),
            group: template.group,
            definition: key,
            status: MINED.to_string(),
            metrics,
            encodings: template.encodings.clone(),
            tolerance_skip: template.tolerance_skip.clone(),
        });
        self.stats.accepted += 1;
        self.enter(State::Accumulated);
    }
}

/// Every filter threshold must be met; an undefined value never passes.
fn passes(values: &MetricValues, options: &Options) -> bool {
    options.filter.iter().all(|(m, threshold)| values.get(m).is_some_and(|v| *v >= *threshold))
}

const CORE: [Metric; 3] = [Metric::AbsoluteSupport, Metric::AbsoluteExceptions, Metric::Confidence];

/// Evaluate stored rules against a table, one result row per co-occurring or
/// violating row.
pub(crate) fn evaluate_rules(rules: &[Rule], table: &Table, options: &Options) -> Vec<ResultRow> {
    let mut state = State::Idle;
    let mut enter = |next: State| {
        trace!("{:?} -> {:?}", state, next);
        state = next;
    };
    let required = PartitionSet::X | PartitionSet::X_Y | PartitionSet::X_NOT_Y;
    let mut out = Vec::new();

    for rule in rules {
        enter(State::Parsing);
        let ast = match parse_rule(&rule.definition) {
            Ok(ast) => ast,
            Err(err) => {
                warn!("rule {} skipped: {}", rule.id, err);
                continue;
            }
        };

        enter(State::Evaluating);
        let ctx = translate_context(options, &rule.tolerance_skip);
        let translation = match translate(&ast, table, &ctx) {
            Ok(t) => t,
            Err(err) => {
                debug!("rule {} is inapplicable: {}", rule.id, err);
                continue;
            }
        };
        let outcomes = translation.execute(table, &ctx, required, OutputMode::Rows);
        let core = calculate(&outcomes.counts(), &CORE);
        let row = |index: usize, satisfied: bool| ResultRow {
            rule_id: rule.id,
            group: rule.group,
            definition: rule.definition.clone(),
            status: rule.status.clone(),
            absolute_support: core[&Metric::AbsoluteSupport],
            absolute_exceptions: core[&Metric::AbsoluteExceptions],
            confidence: core[&Metric::Confidence],
            satisfied,
            index: table.index().key(index).cloned().unwrap_or_default(),
        };
        let before = out.len();
        out.extend(outcomes.rows(Partition::XY).iter().map(|&i| row(i, true)));
        out.extend(outcomes.rows(Partition::XNotY).iter().map(|&i| row(i, false)));
        debug!("rule {}: {} result row(s)", rule.id, out.len() - before);
        enter(State::Accumulated);
    }
    enter(State::Idle);
    out
}
