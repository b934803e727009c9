//! Columnar table model.
//!
//! A [`Table`] is an ordered set of named, equally long [`Column`]s plus a
//! [`RowIndex`]. The index may have several levels; named levels can be exposed
//! as temporary pseudo-columns while rules are compiled and executed (see
//! [`IndexColumns`]), so that rules may reference key fields.

use crate::error::TableError;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::Deref;

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Number(f64),
    Text(String),
    Bool(bool),
    Time(NaiveDateTime),
}

/// Logical type shared by all values of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Numeric,
    Text,
    Boolean,
    Temporal,
}

/// Hashable projection of a [`Scalar`] used for set membership and distinct
/// value discovery. Booleans hash as numbers so `true == 1` holds in sets too.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ScalarKey {
    Null,
    Number(u64),
    Text(String),
    Time(NaiveDateTime),
}

impl Scalar {
    /// `Null` and numeric `NaN` are both treated as missing.
    pub fn is_null(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Number(v) => v.is_nan(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "empty",
            Scalar::Number(_) => "number",
            Scalar::Text(_) => "string",
            Scalar::Bool(_) => "boolean",
            Scalar::Time(_) => "datetime",
        }
    }

    /// Numeric view; booleans count as 1/0.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(v) if !v.is_nan() => Some(*v),
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn key(&self) -> ScalarKey {
        if self.is_null() {
            return ScalarKey::Null;
        }
        match self {
            Scalar::Number(v) => ScalarKey::Number(if *v == 0.0 { 0f64.to_bits() } else { v.to_bits() }),
            Scalar::Bool(b) => ScalarKey::Number(if *b { 1f64.to_bits() } else { 0f64.to_bits() }),
            Scalar::Text(s) => ScalarKey::Text(s.clone()),
            Scalar::Time(t) => ScalarKey::Time(*t),
            Scalar::Null => ScalarKey::Null,
        }
    }

    fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Scalar::Null => None,
            Scalar::Number(_) => Some(LogicalType::Numeric),
            Scalar::Text(_) => Some(LogicalType::Text),
            Scalar::Bool(_) => Some(LogicalType::Boolean),
            Scalar::Time(_) => Some(LogicalType::Temporal),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Number(v) => write!(f, "{}", v),
            Scalar::Text(s) => f.write_str(s),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Time(t) => {
                if t.time() == chrono::NaiveTime::MIN {
                    write!(f, "{}", t.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S"))
                }
            }
        }
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Number(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Number(v as f64)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Number(f64::from(v))
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl From<NaiveDateTime> for Scalar {
    fn from(v: NaiveDateTime) -> Self {
        Scalar::Time(v)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(v: NaiveDate) -> Self {
        Scalar::Time(v.and_time(chrono::NaiveTime::MIN))
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// A column of values sharing one logical type. Missing values are `Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    kind: LogicalType,
    values: Vec<Scalar>,
}

impl Column {
    /// Build a column, inferring its logical type from the first present value.
    /// All-missing columns are numeric.
    pub fn new<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Scalar>,
    {
        let values: Vec<Scalar> = values.into_iter().map(Into::into).collect();
        let kind = values.iter().find_map(Scalar::logical_type).unwrap_or(LogicalType::Numeric);
        Column { kind, values }
    }

    pub fn kind(&self) -> LogicalType {
        self.kind
    }

    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether every present value conforms to the column's logical type.
    fn is_uniform(&self) -> bool {
        self.values.iter().filter_map(Scalar::logical_type).all(|t| t == self.kind)
    }
}

/// Identifier of one row: one scalar per index level.
pub type RowKey = Vec<Scalar>;

/// Ordered, possibly multi-level row identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct RowIndex {
    names: Vec<Option<String>>,
    keys: Vec<RowKey>,
}

impl RowIndex {
    /// Default positional index `0..rows`, single unnamed level.
    pub fn range(rows: usize) -> Self {
        RowIndex { names: vec![None], keys: (0..rows).map(|i| vec![Scalar::Number(i as f64)]).collect() }
    }

    /// Single named level.
    pub fn named<I, T>(name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Scalar>,
    {
        RowIndex { names: vec![Some(name.into())], keys: keys.into_iter().map(|k| vec![k.into()]).collect() }
    }

    /// Multi-level index. Every key must have one value per level.
    pub fn levels(names: Vec<Option<String>>, keys: Vec<RowKey>) -> Result<Self, TableError> {
        if let Some(bad) = keys.iter().find(|k| k.len() != names.len()) {
            return Err(TableError::IndexLevels { expected: names.len(), found: bad.len() });
        }
        Ok(RowIndex { names, keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key(&self, row: usize) -> Option<&RowKey> {
        self.keys.get(row)
    }

    pub fn names(&self) -> &[Option<String>] {
        &self.names
    }
}

/// Named columns plus a row index.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<(String, Column)>,
    index: RowIndex,
}

impl Default for Table {
    fn default() -> Self {
        Table { columns: Vec::new(), index: RowIndex::range(0) }
    }
}

impl Table {
    /// Build a table from `(name, column)` pairs with a positional index.
    pub fn new<I, S>(columns: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = (S, Column)>,
        S: Into<String>,
    {
        let mut table = Table::default();
        for (name, column) in columns {
            table.push_column(name, column)?;
        }
        Ok(table)
    }

    /// Build a one-row table from a record of named values.
    pub fn from_record(record: &BTreeMap<String, Scalar>) -> Self {
        let columns = record.iter().map(|(name, value)| (name.clone(), Column::new([value.clone()]))).collect();
        Table { columns, index: RowIndex::range(1) }
    }

    /// Append a column. The first column fixes the row count.
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<(), TableError> {
        let name = name.into();
        if self.column(&name).is_some() {
            return Err(TableError::DuplicateColumn(name));
        }
        if !column.is_uniform() {
            return Err(TableError::MixedTypes(name));
        }
        if self.columns.is_empty() && self.index.is_empty() {
            self.index = RowIndex::range(column.len());
        } else if column.len() != self.n_rows() {
            return Err(TableError::LengthMismatch { column: name, expected: self.n_rows(), found: column.len() });
        }
        self.columns.push((name, column));
        Ok(())
    }

    /// Replace the row index. Its length must match the row count.
    pub fn with_index(mut self, index: RowIndex) -> Result<Self, TableError> {
        if !self.columns.is_empty() && index.len() != self.n_rows() {
            return Err(TableError::LengthMismatch {
                column: "<index>".to_string(),
                expected: self.n_rows(),
                found: index.len(),
            });
        }
        self.index = index;
        Ok(self)
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn index(&self) -> &RowIndex {
        &self.index
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Distinct text values of `name` in first-appearance order, restricted to
    /// rows where `mask` is set. Non-text columns yield nothing.
    pub(crate) fn distinct_text(&self, name: &str, mask: Option<&[bool]>) -> Vec<String> {
        let Some(column) = self.column(name) else { return Vec::new() };
        if column.kind() != LogicalType::Text {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (row, value) in column.values().iter().enumerate() {
            if mask.is_some_and(|m| !m.get(row).copied().unwrap_or(false)) {
                continue;
            }
            if let Scalar::Text(s) = value {
                if seen.insert(s.as_str()) {
                    out.push(s.clone());
                }
            }
        }
        out
    }

    fn remove_column(&mut self, name: &str) {
        self.columns.retain(|(n, _)| n != name);
    }
}

/// Scoped exposure of named index levels as pseudo-columns.
///
/// Levels that collide with an existing column are left alone. The added
/// columns are removed when the guard drops, on every exit path.
pub(crate) struct IndexColumns<'t> {
    table: &'t mut Table,
    added: Vec<String>,
}

impl<'t> IndexColumns<'t> {
    pub(crate) fn attach(table: &'t mut Table) -> Self {
        let mut added = Vec::new();
        let names: Vec<(usize, String)> =
            table.index.names().iter().enumerate().filter_map(|(l, n)| n.clone().map(|n| (l, n))).collect();
        for (level, name) in names {
            if table.column(&name).is_some() {
                continue;
            }
            let values: Vec<Scalar> = table.index.keys.iter().map(|k| k[level].clone()).collect();
            let column = Column::new(values);
            if table.push_column(name.clone(), column).is_ok() {
                added.push(name);
            }
        }
        IndexColumns { table, added }
    }
}

impl Deref for IndexColumns<'_> {
    type Target = Table;

    fn deref(&self) -> &Table {
        self.table
    }
}

impl Drop for IndexColumns<'_> {
    fn drop(&mut self) {
        for name in &self.added {
            self.table.remove_column(name);
        }
    }
}
