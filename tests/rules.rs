use proptest::prelude::*;
use rulequarry::{
    Column, Metric, Options, OutputMode, Partition, PartitionSet, Rule, Scalar, Table, Template, ToleranceBand,
    ToleranceTable, TranslateContext, evaluate, mine, parse_rule, translate,
};
use std::collections::BTreeMap;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn insurers() -> Table {
    Table::new([
        ("Type", Column::new(["life_insurer", "life_insurer", "life_insurer", "non-life", "non-life"])),
        ("TP_life", Column::new([10.0, 20.0, 0.0, 0.0, 0.0])),
        ("TP_nonlife", Column::new([0.0, 0.0, 5.0, 30.0, 40.0])),
    ])
    .unwrap()
}

fn summary(out: &rulequarry::ResultSet) -> Vec<(bool, Vec<Scalar>)> {
    out.iter().map(|r| (r.satisfied, r.index.clone())).collect()
}

#[test]
fn threshold_rule_splits_rows() {
    init_logging();
    let mut t = Table::new([("A", Column::new([0.0, 1.0, 2.0]))]).unwrap();
    let out = evaluate(&[Rule::new(0, r#"{"A"} >= 1"#)], &mut t, &Options::default()).unwrap();
    assert_eq!(
        summary(&out),
        vec![(true, vec![Scalar::from(1.0)]), (true, vec![Scalar::from(2.0)]), (false, vec![Scalar::from(0.0)])]
    );
    assert_eq!(out.rows[0].absolute_support, 2.0);
    assert_eq!(out.rows[0].absolute_exceptions, 1.0);
}

#[test]
fn tolerance_absorbs_rounding_noise() {
    init_logging();
    let tolerance = ToleranceTable::new([("default", vec![ToleranceBand::new(0.0, 1000.0, 1)])]).unwrap();
    let options = Options { tolerance: Some(tolerance), ..Options::default() };
    let mut t = Table::new([("A", Column::new([0.96, 0.9]))]).unwrap();
    let out = evaluate(&[Rule::new(0, r#"{"A"} >= 1"#)], &mut t, &options).unwrap();
    assert_eq!(summary(&out), vec![(true, vec![Scalar::from(0.0)]), (false, vec![Scalar::from(1.0)])]);
}

#[test]
fn wildcard_templates_mine_insurer_rules() {
    init_logging();
    let mut t = insurers();
    let templates = [Template::new(r#"if ({"Ty.*"} == ".*") then ({"TP.*"} > 0)"#).with_group(1)];
    let rules = mine(&templates, &mut t, &Options::default()).unwrap();

    assert_eq!(rules.stats.candidates, 4);
    assert_eq!(rules.stats.rejected, 2);
    let found: Vec<&str> = rules.iter().map(|r| r.definition.as_str()).collect();
    assert_eq!(
        found,
        vec![
            r#"if ({"Type"} == "life_insurer") then ({"TP_life"} > 0)"#,
            r#"if ({"Type"} == "non-life") then ({"TP_nonlife"} > 0)"#,
        ]
    );

    let life = &rules.rules[0];
    assert_eq!((life.id, life.group, life.status.as_str()), (0, 1, rulequarry::MINED));
    assert_eq!(life.metrics[&Metric::AbsoluteSupport], 2.0);
    assert_eq!(life.metrics[&Metric::AbsoluteExceptions], 1.0);
    assert!((life.metrics[&Metric::Confidence] - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(rules.rules[1].metrics[&Metric::Confidence], 1.0);

    let out = evaluate(&rules.rules, &mut t, &Options::default()).unwrap();
    let violations: Vec<(usize, Vec<Scalar>)> =
        out.iter().filter(|r| !r.satisfied).map(|r| (r.rule_id, r.index.clone())).collect();
    assert_eq!(violations, vec![(0, vec![Scalar::from(2.0)])]);
    assert_eq!(out.for_rule(1).count(), 2);
}

#[test]
fn any_column_pattern_mines_the_matching_category() {
    init_logging();
    let mut t = insurers();
    let templates = [Template::new(r#"if ({".*"}=="life_insurer") then ({"TP.*"}>0)"#)];
    let rules = mine(&templates, &mut t, &Options::default()).unwrap();

    assert_eq!(rules.stats.candidates, 2);
    assert_eq!(rules.stats.rejected, 1);
    assert_eq!(rules.len(), 1);
    let rule = &rules.rules[0];
    assert_eq!(rule.definition, r#"if ({"Type"} == "life_insurer") then ({"TP_life"} > 0)"#);
    assert_eq!(rule.metrics[&Metric::AbsoluteSupport], 2.0);
    assert_eq!(rule.metrics[&Metric::AbsoluteExceptions], 1.0);
    assert!((rule.metrics[&Metric::Confidence] - 2.0 / 3.0).abs() < 1e-12);
}

#[test]
fn value_patterns_on_named_columns_are_expanded() {
    init_logging();
    let mut t = insurers();
    let template = Template::new(r#"if ({"Type"} == "life.*") then ({"TP_life"} > 0)"#);
    let rules = mine(&[template], &mut t, &Options::default()).unwrap();
    assert_eq!(rules.stats.candidates, 1);
    assert_eq!(rules.len(), 1);
    assert_eq!(rules.rules[0].definition, r#"if ({"Type"} == "life_insurer") then ({"TP_life"} > 0)"#);
    assert_eq!(rules.rules[0].metrics[&Metric::AbsoluteSupport], 2.0);
    assert!((rules.rules[0].metrics[&Metric::Confidence] - 2.0 / 3.0).abs() < 1e-12);

    // Then-part values are drawn only from rows meeting the if-part.
    let template = Template::new(r#"if ({"TP_nonlife"} > 10) then ({"Type"} == ".*")"#);
    let rules = mine(&[template], &mut t, &Options::default()).unwrap();
    assert_eq!(rules.stats.candidates, 1);
    assert_eq!(rules.rules[0].definition, r#"if ({"TP_nonlife"} > 10) then ({"Type"} == "non-life")"#);
    assert_eq!(rules.rules[0].metrics[&Metric::Confidence], 1.0);
}

#[test]
fn tolerance_on_a_missing_column_leaves_the_rule_inapplicable() {
    init_logging();
    let tolerance = ToleranceTable::new([("default", vec![ToleranceBand::new(0.0, 1000.0, 1)])]).unwrap();
    let options = Options { tolerance: Some(tolerance), ..Options::default() };
    let mut t = insurers();
    let rules = [Rule::new(0, r#"{"Gone"} >= {"TP_life"}"#), Rule::new(1, r#"{"TP_life"} >= 10"#)];
    let out = evaluate(&rules, &mut t, &options).unwrap();
    assert_eq!(out.for_rule(0).count(), 0);
    assert_eq!(out.for_rule(1).count(), 5);
}

#[test]
fn commutative_variants_are_mined_once() {
    init_logging();
    let mut t = insurers();
    let templates = [
        Template::new(r#"if {"Type"} == "life_insurer" then {"TP_life"} + {"TP_nonlife"} > 0"#),
        Template::new(r#"if {"Type"} == "life_insurer" then {"TP_nonlife"} + {"TP_life"} > 0"#),
    ];
    let rules = mine(&templates, &mut t, &Options::default()).unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules.stats.duplicates, 1);
    assert_eq!(rules.rules[0].metrics[&Metric::Confidence], 1.0);
}

#[test]
fn invalid_configuration_is_reported() {
    let mut t = insurers();
    let mut options = Options::default();
    options.tolerance = ToleranceTable::new([("amounts", vec![ToleranceBand::new(0.0, 1.0, 2)])]).ok();
    assert!(options.tolerance.is_none());
    assert!(Options::default().with_filter([("speed", 1.0)]).is_err());
    assert!(mine(&[Template::new(r#"{"TP_life"} >= 0"#)], &mut t, &options).is_ok());
}

proptest! {
    #[test]
    fn partition_counts_are_consistent(
        rows in prop::collection::vec((prop::option::of(-5.0f64..5.0), prop::option::of(-5.0f64..5.0)), 0..24),
        x in -5.0f64..5.0,
        y in -5.0f64..5.0,
    ) {
        let table = Table::new([
            ("A", Column::new(rows.iter().map(|r| r.0))),
            ("B", Column::new(rows.iter().map(|r| r.1))),
        ])
        .unwrap();
        let rule = parse_rule(&format!(r#"if {{"A"}} > {x} then {{"B"}} <= {y}"#)).unwrap();
        let tables = BTreeMap::new();
        let ctx = TranslateContext { tolerance: None, decimal: None, tables: &tables, tolerance_skip: &[] };
        let out = translate(&rule, &table, &ctx).unwrap().execute(&table, &ctx, PartitionSet::all(), OutputMode::Counts);
        let c = out.counts();
        let get = |p| c.get(p).unwrap();
        prop_assert_eq!(get(Partition::N), rows.len());
        prop_assert_eq!(get(Partition::X), get(Partition::XY) + get(Partition::XNotY));
        prop_assert_eq!(get(Partition::N), get(Partition::X) + get(Partition::NotX));
        prop_assert_eq!(get(Partition::N), get(Partition::Y) + get(Partition::NotY));
        prop_assert!(get(Partition::NotXNotY) <= get(Partition::NotX));
    }
}
