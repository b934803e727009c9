//! Magnitude-bucketed rounding tolerance.
//!
//! A [`ToleranceTable`] maps a key to half-open magnitude bands `[lower,
//! upper)`, each carrying a decimal precision. A value whose magnitude falls in
//! a band with precision `d` may carry rounding noise of up to half a unit in
//! the last place, `0.5 * 10^-d`.
//!
//! Lookups try the requested key first and fall back to `"default"`, which
//! every table must contain.

use crate::error::ConfigError;
use std::collections::BTreeMap;

pub const DEFAULT_KEY: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToleranceBand {
    pub lower: f64,
    pub upper: f64,
    pub decimals: i32,
}

impl ToleranceBand {
    pub fn new(lower: f64, upper: f64, decimals: i32) -> Self {
        ToleranceBand { lower, upper, decimals }
    }

    fn contains(&self, magnitude: f64) -> bool {
        self.lower <= magnitude && magnitude < self.upper
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceTable {
    entries: BTreeMap<String, Vec<ToleranceBand>>,
}

impl ToleranceTable {
    /// Validate and build a table. Fails when `"default"` is missing, a key
    /// contains whitespace, or a band is empty or not a number.
    pub fn new<I, K>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, Vec<ToleranceBand>)>,
        K: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (key, mut bands) in entries {
            let key = key.into();
            if regex!(r"\s").is_match(&key) {
                return Err(ConfigError::WhitespaceInToleranceKey(key));
            }
            if let Some(bad) = bands.iter().find(|b| b.lower.is_nan() || b.upper.is_nan() || b.lower >= b.upper) {
                return Err(ConfigError::InvalidToleranceBand { key, lower: bad.lower, upper: bad.upper });
            }
            bands.sort_by(|a, b| a.lower.total_cmp(&b.lower));
            map.insert(key, bands);
        }
        let table = ToleranceTable { entries: map };
        table.validate()?;
        Ok(table)
    }

    /// Re-check the invariants established by [`ToleranceTable::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.entries.contains_key(DEFAULT_KEY) {
            return Err(ConfigError::MissingDefaultTolerance);
        }
        match self.entries.keys().find(|k| regex!(r"\s").is_match(k)) {
            Some(key) => Err(ConfigError::WhitespaceInToleranceKey(key.clone())),
            None => Ok(()),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Decimal precision for `value` under `key`, falling back to `"default"`.
    pub fn decimals(&self, key: &str, value: f64) -> Option<i32> {
        let magnitude = value.abs();
        let lookup = |k: &str| self.entries.get(k)?.iter().find(|b| b.contains(magnitude)).map(|b| b.decimals);
        lookup(key).or_else(|| lookup(DEFAULT_KEY))
    }

    /// Half a unit in the last decimal place for `value`, or 0 when no band covers it.
    pub fn half_unit(&self, key: &str, value: f64) -> f64 {
        self.decimals(key, value).map(|d| 0.5 * 10f64.powi(-d)).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ToleranceTable {
        ToleranceTable::new([
            ("default", vec![ToleranceBand::new(0.0, 1000.0, 1), ToleranceBand::new(1000.0, f64::INFINITY, 0)]),
            ("amounts", vec![ToleranceBand::new(0.0, 10.0, 3)]),
        ])
        .unwrap()
    }

    #[test]
    fn missing_default_is_a_configuration_error() {
        let err = ToleranceTable::new([("amounts", vec![ToleranceBand::new(0.0, 1.0, 2)])]).unwrap_err();
        assert_eq!(err, ConfigError::MissingDefaultTolerance);
    }

    #[test]
    fn whitespace_keys_are_rejected() {
        let err = ToleranceTable::new([
            ("default", vec![ToleranceBand::new(0.0, 1.0, 2)]),
            ("total amount", vec![ToleranceBand::new(0.0, 1.0, 2)]),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigError::WhitespaceInToleranceKey("total amount".into()));
    }

    #[test]
    fn inverted_bands_are_rejected() {
        let err = ToleranceTable::new([("default", vec![ToleranceBand::new(5.0, 1.0, 2)])]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidToleranceBand { .. }));
    }

    #[test]
    fn bands_are_half_open_on_magnitude() {
        let t = table();
        assert_eq!(t.decimals("default", 999.99), Some(1));
        assert_eq!(t.decimals("default", 1000.0), Some(0));
        assert_eq!(t.decimals("default", -1500.0), Some(0));
        assert!((t.half_unit("default", 1.0) - 0.05).abs() < 1e-15);
    }

    #[test]
    fn unknown_or_uncovered_keys_fall_back_to_default() {
        let t = table();
        assert_eq!(t.decimals("amounts", 5.0), Some(3));
        assert_eq!(t.decimals("amounts", 50.0), Some(1));
        assert_eq!(t.decimals("nope", 50.0), Some(1));
        assert_eq!(t.half_unit("default", f64::NAN), 0.0);
    }
}
