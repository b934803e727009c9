//! Association-rule quality metrics.
//!
//! Pure functions over [`PartitionCounts`]. A zero denominator, or a count that
//! could not be computed, yields `NaN` for that metric; nothing here panics or
//! divides by zero silently.
//!
//! ```text
//! absolute_support    |X∧Y|
//! absolute_exceptions |X∧¬Y|
//! confidence          |X∧Y| / |X|
//! support             |X∧Y| / N
//! added_value         confidence - |Y|/N
//! casual_confidence   0.5·confidence + 0.5·(|¬X∧¬Y| / |¬X|)
//! conviction          (1 - |Y|/N) / (1 - confidence)
//! lift                confidence / (|Y|/N)
//! rule_power_factor   support · confidence
//! ```

use super::partition::{Partition, PartitionCounts, PartitionSet};
use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    AbsoluteSupport,
    AbsoluteExceptions,
    Confidence,
    Support,
    AddedValue,
    CasualConfidence,
    Conviction,
    Lift,
    RulePowerFactor,
}

/// Partition variables each metric reads.
const REQUIREMENTS: &[(Metric, PartitionSet)] = &[
    (Metric::AbsoluteSupport, PartitionSet::X_Y),
    (Metric::AbsoluteExceptions, PartitionSet::X_NOT_Y),
    (Metric::Confidence, PartitionSet::X_Y.union(PartitionSet::X)),
    (Metric::Support, PartitionSet::X_Y.union(PartitionSet::N)),
    (Metric::AddedValue, PartitionSet::X_Y.union(PartitionSet::X).union(PartitionSet::Y).union(PartitionSet::N)),
    (
        Metric::CasualConfidence,
        PartitionSet::X_Y.union(PartitionSet::X).union(PartitionSet::NOT_X_NOT_Y).union(PartitionSet::NOT_X),
    ),
    (Metric::Conviction, PartitionSet::X_Y.union(PartitionSet::X).union(PartitionSet::Y).union(PartitionSet::N)),
    (Metric::Lift, PartitionSet::X_Y.union(PartitionSet::X).union(PartitionSet::Y).union(PartitionSet::N)),
    (Metric::RulePowerFactor, PartitionSet::X_Y.union(PartitionSet::X).union(PartitionSet::N)),
];

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::AbsoluteSupport,
        Metric::AbsoluteExceptions,
        Metric::Confidence,
        Metric::Support,
        Metric::AddedValue,
        Metric::CasualConfidence,
        Metric::Conviction,
        Metric::Lift,
        Metric::RulePowerFactor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::AbsoluteSupport => "absolute_support",
            Metric::AbsoluteExceptions => "absolute_exceptions",
            Metric::Confidence => "confidence",
            Metric::Support => "support",
            Metric::AddedValue => "added_value",
            Metric::CasualConfidence => "casual_confidence",
            Metric::Conviction => "conviction",
            Metric::Lift => "lift",
            Metric::RulePowerFactor => "rule_power_factor",
        }
    }

    pub fn required(self) -> PartitionSet {
        REQUIREMENTS.iter().find(|(m, _)| *m == self).map(|(_, set)| *set).unwrap_or(PartitionSet::empty())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL.into_iter().find(|m| m.name() == s).ok_or_else(|| ConfigError::UnknownMetric(s.to_string()))
    }
}

/// Metric values keyed by metric, in a stable order.
pub type MetricValues = BTreeMap<Metric, f64>;

/// Union of the partition variables the given metrics need.
pub fn required_variables<'m>(metrics: impl IntoIterator<Item = &'m Metric>) -> PartitionSet {
    metrics.into_iter().fold(PartitionSet::empty(), |acc, m| acc | m.required())
}

/// Compute the requested metrics from partition counts.
pub fn calculate(counts: &PartitionCounts, metrics: &[Metric]) -> MetricValues {
    metrics.iter().map(|&m| (m, value(counts, m))).collect()
}

fn count(counts: &PartitionCounts, p: Partition) -> f64 {
    counts.get(p).map(|c| c as f64).unwrap_or(f64::NAN)
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 || den.is_nan() { f64::NAN } else { num / den }
}

fn value(counts: &PartitionCounts, metric: Metric) -> f64 {
    let n = || count(counts, Partition::N);
    let confidence = || ratio(count(counts, Partition::XY), count(counts, Partition::X));
    let y_rate = || ratio(count(counts, Partition::Y), n());
    match metric {
        Metric::AbsoluteSupport => count(counts, Partition::XY),
        Metric::AbsoluteExceptions => count(counts, Partition::XNotY),
        Metric::Confidence => confidence(),
        Metric::Support => ratio(count(counts, Partition::XY), n()),
        Metric::AddedValue => confidence() - y_rate(),
        Metric::CasualConfidence => {
            0.5 * confidence() + 0.5 * ratio(count(counts, Partition::NotXNotY), count(counts, Partition::NotX))
        }
        Metric::Conviction => ratio(1.0 - y_rate(), 1.0 - confidence()),
        Metric::Lift => ratio(confidence(), y_rate()),
        Metric::RulePowerFactor => ratio(count(counts, Partition::XY), n()) * confidence(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(n: usize, x: usize, y: usize, xy: usize) -> PartitionCounts {
        let not_x_not_y = n - x - (y - xy);
        PartitionCounts::default()
            .with(Partition::N, n)
            .with(Partition::X, x)
            .with(Partition::NotX, n - x)
            .with(Partition::Y, y)
            .with(Partition::NotY, n - y)
            .with(Partition::XY, xy)
            .with(Partition::XNotY, x - xy)
            .with(Partition::NotXNotY, not_x_not_y)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn required_variables_is_the_union_of_requirements() {
        let set = required_variables(&[Metric::AbsoluteSupport, Metric::Confidence]);
        assert_eq!(set, PartitionSet::X_Y | PartitionSet::X);
        assert_eq!(required_variables(&[]), PartitionSet::empty());
        for m in Metric::ALL {
            assert!(!m.required().is_empty(), "{m}");
        }
    }

    #[test]
    fn formulas_match_hand_computation() {
        // N=10, X=4, Y=6, X∧Y=3 -> X∧¬Y=1, ¬X=6, ¬X∧¬Y=3
        let c = counts(10, 4, 6, 3);
        let v = calculate(&c, &Metric::ALL);
        assert_eq!(v[&Metric::AbsoluteSupport], 3.0);
        assert_eq!(v[&Metric::AbsoluteExceptions], 1.0);
        assert!(close(v[&Metric::Confidence], 0.75));
        assert!(close(v[&Metric::Support], 0.3));
        assert!(close(v[&Metric::AddedValue], 0.75 - 0.6));
        assert!(close(v[&Metric::CasualConfidence], 0.5 * 0.75 + 0.5 * 0.5));
        assert!(close(v[&Metric::Conviction], 0.4 / 0.25));
        assert!(close(v[&Metric::Lift], 0.75 / 0.6));
        assert!(close(v[&Metric::RulePowerFactor], 0.3 * 0.75));
    }

    #[test]
    fn zero_denominators_are_undefined() {
        let empty = counts(0, 0, 0, 0);
        let v = calculate(&empty, &Metric::ALL);
        assert_eq!(v[&Metric::AbsoluteSupport], 0.0);
        for m in [Metric::Confidence, Metric::Support, Metric::Lift, Metric::Conviction, Metric::CasualConfidence] {
            assert!(v[&m].is_nan(), "{m}");
        }

        // X = N, so ¬X = 0.
        let all_x = counts(5, 5, 5, 5);
        assert!(calculate(&all_x, &[Metric::CasualConfidence])[&Metric::CasualConfidence].is_nan());
        assert!(calculate(&all_x, &[Metric::Conviction])[&Metric::Conviction].is_nan());
    }

    #[test]
    fn missing_counts_are_undefined() {
        let partial = PartitionCounts::default().with(Partition::XY, 2);
        let v = calculate(&partial, &[Metric::AbsoluteSupport, Metric::Confidence]);
        assert_eq!(v[&Metric::AbsoluteSupport], 2.0);
        assert!(v[&Metric::Confidence].is_nan());
    }

    #[test]
    fn metric_names_round_trip() {
        for m in Metric::ALL {
            assert_eq!(m.name().parse::<Metric>().unwrap(), m);
        }
        assert_eq!("bogus".parse::<Metric>(), Err(ConfigError::UnknownMetric("bogus".into())));
    }
}
