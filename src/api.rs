use crate::engine::{self, Metric, MetricValues, MiningStats, ToleranceTable};
use crate::error::ConfigError;
use crate::table::{IndexColumns, RowKey, Table};
use std::collections::BTreeMap;

/// Status label of caller-supplied rules.
pub const USER_DEFINED: &str = "user";

/// Options that affect mining and evaluation.
#[derive(Debug, Clone)]
pub struct Options {
    /// Widens numeric comparisons to absorb rounding noise.
    pub tolerance: Option<ToleranceTable>,
    /// Minimum value per metric; a candidate must meet all of them.
    pub filter: BTreeMap<Metric, f64>,
    /// Metrics computed and stored on each accepted rule.
    pub metrics: Vec<Metric>,
    /// Decimal precision for the numeric equality rewrite.
    pub decimal: Option<i32>,
    /// Fold `quantile(...)` calls into literals while mining.
    pub evaluate_quantile: bool,
    /// Auxiliary tables reachable through `table(name, columns)`.
    pub tables: BTreeMap<String, Table>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            tolerance: None,
            filter: BTreeMap::from([(Metric::Confidence, 0.5), (Metric::AbsoluteSupport, 2.0)]),
            metrics: vec![Metric::AbsoluteSupport, Metric::AbsoluteExceptions, Metric::Confidence],
            decimal: None,
            evaluate_quantile: false,
            tables: BTreeMap::new(),
        }
    }
}

impl Options {
    /// Check configuration before a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.tolerance {
            Some(t) => t.validate(),
            None => Ok(()),
        }
    }

    /// Build a filter from metric names, e.g. `[("confidence", 0.9)]`.
    pub fn with_filter<'n>(mut self, filter: impl IntoIterator<Item = (&'n str, f64)>) -> Result<Self, ConfigError> {
        self.filter = filter.into_iter().map(|(name, v)| Ok((name.parse()?, v))).collect::<Result<_, ConfigError>>()?;
        Ok(self)
    }

    /// Select computed metrics by name.
    pub fn with_metrics<'n>(mut self, metrics: impl IntoIterator<Item = &'n str>) -> Result<Self, ConfigError> {
        self.metrics = metrics.into_iter().map(str::parse).collect::<Result<_, _>>()?;
        Ok(self)
    }
}

/// A rule pattern whose column names and compared values may be regexes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub text: String,
    pub group: u32,
    /// Display annotations carried onto mined rules.
    pub encodings: BTreeMap<String, String>,
    /// Columns excluded from automatic tolerance.
    pub tolerance_skip: Vec<String>,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Template { text: text.into(), ..Default::default() }
    }

    pub fn with_group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    pub fn with_encodings(mut self, encodings: BTreeMap<String, String>) -> Self {
        self.encodings = encodings;
        self
    }

    pub fn with_tolerance_skip<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.tolerance_skip = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// A concrete rule. Mined rules carry their canonical text as `definition`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: usize,
    pub group: u32,
    pub definition: String,
    pub status: String,
    pub metrics: MetricValues,
    pub encodings: BTreeMap<String, String>,
    pub tolerance_skip: Vec<String>,
}

impl Rule {
    /// A caller-supplied rule.
    pub fn new(id: usize, definition: impl Into<String>) -> Self {
        Rule {
            id,
            group: 0,
            definition: definition.into(),
            status: USER_DEFINED.to_string(),
            metrics: MetricValues::new(),
            encodings: BTreeMap::new(),
            tolerance_skip: Vec::new(),
        }
    }
}

/// Output of [`mine`].
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
    pub stats: MiningStats,
}

impl RuleSet {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }
}

impl<'r> IntoIterator for &'r RuleSet {
    type Item = &'r Rule;
    type IntoIter = std::slice::Iter<'r, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

/// One evaluated row of one rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub rule_id: usize,
    pub group: u32,
    pub definition: String,
    pub status: String,
    pub absolute_support: f64,
    pub absolute_exceptions: f64,
    pub confidence: f64,
    /// `true` when the row satisfies both parts, `false` when it satisfies the
    /// if-part only.
    pub satisfied: bool,
    pub index: RowKey,
}

/// Output of [`evaluate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub rows: Vec<ResultRow>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResultRow> {
        self.rows.iter()
    }

    /// Rows of one rule.
    pub fn for_rule(&self, id: usize) -> impl Iterator<Item = &ResultRow> {
        self.rows.iter().filter(move |r| r.rule_id == id)
    }
}

/// Mine rules from `templates`.
///
/// Named index levels of `table` are visible to rules as columns for the
/// duration of the call. Only configuration errors are returned; templates
/// that fail to parse and candidates that fail to evaluate are logged and
/// skipped.
///
/// # Example
/// ```
/// use rulequarry::{Column, Options, Table, Template, mine};
///
/// let mut table = Table::new([
///     ("Type", Column::new(["life_insurer", "life_insurer", "bank"])),
///     ("TP_life", Column::new([10.0, 20.0, 0.0])),
/// ])
/// .unwrap();
/// let templates = [Template::new(r#"if ({".*"} == "life_insurer") then ({"TP.*"} > 0)"#)];
/// let rules = mine(&templates, &mut table, &Options::default()).unwrap();
/// assert_eq!(rules.len(), 1);
/// assert_eq!(rules.rules[0].definition, r#"if ({"Type"} == "life_insurer") then ({"TP_life"} > 0)"#);
/// ```
pub fn mine(templates: &[Template], table: &mut Table, options: &Options) -> Result<RuleSet, ConfigError> {
    options.validate()?;
    let view = IndexColumns::attach(table);
    let (rules, stats) = engine::Miner::new(&view, options).run(templates);
    Ok(RuleSet { rules, stats })
}

/// Evaluate `rules` against `table`, producing one row per co-occurring
/// (satisfied) and per violating row of each rule.
pub fn evaluate(rules: &[Rule], table: &mut Table, options: &Options) -> Result<ResultSet, ConfigError> {
    options.validate()?;
    let view = IndexColumns::attach(table);
    Ok(ResultSet { rows: engine::evaluate_rules(rules, &view, options) })
}
