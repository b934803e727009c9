//! Canonical dedup keys.
//!
//! The key is the rendered rule with commutative operands sorted: chains of
//! `&`, `|`, `+` and `*` are flattened and their operand strings sorted, as are
//! `min`/`max` argument lists. Mixed chains never merge (an `|` inside an `&`
//! chain is parenthesized and sorted as a single operand), so precedence is
//! preserved. Non-commutative shapes (`-`, `/`, `**`, comparisons) keep their
//! operand order.

use crate::expr::{Expr, Printer, RuleAst};

/// Dedup key of a rule.
pub fn canonical_key(rule: &RuleAst) -> String {
    Printer { sorted: true }.rule(rule)
}

/// Dedup key of a single expression.
pub fn canonical_expr(expr: &Expr) -> String {
    Printer { sorted: true }.expr(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::grammar::{parse_condition, parse_rule};
    use crate::expr::{BinaryOp, CompareOp};
    use proptest::prelude::*;

    fn key(text: &str) -> String {
        canonical_key(&parse_rule(text).unwrap())
    }

    #[test]
    fn commutative_operands_collapse() {
        assert_eq!(key(r#"{"A"} + {"B"} > 0"#), key(r#"{"B"} + {"A"} > 0"#));
        assert_eq!(key(r#"max({"A"}, {"B"}) > 0"#), key(r#"max({"B"}, {"A"}) > 0"#));
        assert_eq!(
            key(r#"if ({"T"} == "x") & ({"A"} > 0) then {"B"} > 0"#),
            key(r#"if ({"A"} > 0) and ({"T"} == "x") then {"B"} > 0"#)
        );
        assert_eq!(key(r#"{"A"} * ({"B"} * {"C"}) > 0"#), key(r#"({"C"} * {"A"}) * {"B"} > 0"#));
    }

    #[test]
    fn non_commutative_shapes_are_preserved() {
        assert_ne!(key(r#"{"A"} - {"B"} > 0"#), key(r#"{"B"} - {"A"} > 0"#));
        assert_ne!(key(r#"{"A"} / {"B"} > 0"#), key(r#"{"B"} / {"A"} > 0"#));
        assert_ne!(key(r#"{"A"} > {"B"}"#), key(r#"{"B"} > {"A"}"#));
    }

    #[test]
    fn sums_of_text_columns_are_rejected_either_way() {
        use crate::engine::interp::Evaluator;
        use crate::table::{Column, Table};
        use std::collections::BTreeMap;

        let t = Table::new([("F", Column::new(["a"])), ("L", Column::new(["b"]))]).unwrap();
        let tables = BTreeMap::new();
        let (fl, lf) = (r#"{"F"} + {"L"} == "ab""#, r#"{"L"} + {"F"} == "ab""#);
        assert_eq!(key(fl), key(lf));
        for text in [fl, lf] {
            let cond = parse_condition(text).unwrap();
            assert!(Evaluator::new(&t, None, &tables).mask(&cond).is_err());
        }
    }

    #[test]
    fn mixed_chains_keep_precedence() {
        let k = key(r#"({"A"} > 0) | ({"B"} > 0) & ({"C"} > 0)"#);
        assert_eq!(parse_rule(&k).unwrap(), parse_rule(&key(r#"({"C"} > 0) & ({"B"} > 0) | ({"A"} > 0)"#)).unwrap());
        assert_ne!(k, key(r#"(({"A"} > 0) | ({"B"} > 0)) & ({"C"} > 0)"#));
        assert_ne!(key(r#"{"A"} * {"B"} + {"C"} > 0"#), key(r#"{"A"} * ({"B"} + {"C"}) > 0"#));
    }

    fn math() -> impl Strategy<Value = Expr> {
        let leaf = prop_oneof![
            prop::sample::select(vec!["A", "B", "C", "D"]).prop_map(Expr::column),
            (0u8..20).prop_map(|v| Expr::number(f64::from(v))),
        ];
        leaf.prop_recursive(4, 24, 2, |inner| {
            (
                prop::sample::select(vec![BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::Div]),
                inner.clone(),
                inner,
            )
                .prop_map(|(op, l, r)| Expr::binary(op, l, r))
        })
    }

    fn condition() -> impl Strategy<Value = Expr> {
        let atom = (math(), math()).prop_map(|(l, r)| Expr::compare(CompareOp::Ge, l, r));
        atom.prop_recursive(3, 12, 2, |inner| {
            (prop::sample::select(vec![BinaryOp::And, BinaryOp::Or]), inner.clone(), inner)
                .prop_map(|(op, l, r)| Expr::binary(op, l, r))
        })
    }

    proptest! {
        #[test]
        fn canonical_key_is_idempotent(e in condition()) {
            let once = canonical_expr(&e);
            let reparsed = parse_condition(&once).unwrap();
            prop_assert_eq!(canonical_expr(&reparsed), once);
        }

        #[test]
        fn canonical_key_ignores_operand_order(l in condition(), r in condition()) {
            prop_assert_eq!(canonical_expr(&Expr::and(l.clone(), r.clone())), canonical_expr(&Expr::and(r, l)));
        }

        #[test]
        fn rendering_round_trips(e in condition()) {
            prop_assert_eq!(parse_condition(&e.to_string()).unwrap(), e);
        }
    }
}
