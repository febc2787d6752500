//! Property tests for the canonical printer.
//!
//! Every accepted expression must print to a form that reparses into a
//! structurally equal tree, and printing that tree again must not change it.

#[cfg(test)]
mod property_tests {
    use frontend::parse;
    use proptest::prelude::*;

    fn valid_identifier() -> impl Strategy<Value = String> {
        "[a-z_][a-zA-Z0-9_]{0,5}".prop_filter("Not a reserved word", |s| {
            !matches!(
                s.to_ascii_lowercase().as_str(),
                "true" | "false" | "null" | "new" | "instanceof" | "matches" | "between"
                    | "and" | "or" | "not" | "div" | "mod" | "lt" | "le" | "gt" | "ge" | "eq" | "ne"
            )
        })
    }

    fn literal() -> impl Strategy<Value = String> {
        prop_oneof![
            (0i32..100000).prop_map(|n| n.to_string()),
            (0i64..100000).prop_map(|n| format!("{n}L")),
            (0u32..1000, 0u32..1000).prop_map(|(a, b)| format!("{a}.{b}")),
            "[a-z' ]{0,6}".prop_map(|s| format!("'{}'", s.replace('\'', "''"))),
            Just("true".to_string()),
            Just("null".to_string()),
        ]
    }

    fn leaf() -> impl Strategy<Value = String> {
        prop_oneof![
            literal(),
            valid_identifier(),
            valid_identifier().prop_map(|v| format!("#{v}")),
            Just("#this".to_string()),
        ]
    }

    fn expression() -> impl Strategy<Value = String> {
        leaf().prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                (inner.clone(), prop::sample::select(vec!["+", "-", "*", "/", "%", "==", "<", ">=", "and", "or"]), inner.clone())
                    .prop_map(|(l, op, r)| format!("{l} {op} {r}")),
                (inner.clone(), inner.clone(), inner.clone()).prop_map(|(c, a, b)| format!("{c} ? {a} : {b}")),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} ?: {b}")),
                inner.clone().prop_map(|e| format!("-({e})")),
                inner.clone().prop_map(|e| format!("!({e})")),
                (inner.clone(), valid_identifier()).prop_map(|(e, p)| format!("({e}).{p}")),
                (inner.clone(), valid_identifier()).prop_map(|(e, p)| format!("({e})?.{p}")),
                (inner.clone(), valid_identifier(), inner.clone()).prop_map(|(e, m, a)| format!("({e}).{m}({a})")),
                (inner.clone(), inner.clone()).prop_map(|(e, i)| format!("({e})[{i}]")),
                prop::collection::vec(inner.clone(), 0..4).prop_map(|xs| format!("{{{}}}", xs.join(", "))),
                (valid_identifier(), inner.clone()).prop_map(|(k, v)| format!("{{{k}: {v}}}")),
                (inner.clone(), inner.clone()).prop_map(|(k, v)| format!("{{({k}): {v}}}")),
                (inner.clone(), inner.clone()).prop_map(|(e, p)| format!("({e}).?[{p}]")),
                inner.clone().prop_map(|e| format!("({e}).![#this]")),
                inner.prop_map(|e| format!("T(java.util.List) == ({e})")),
            ]
        })
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config {
            cases: 256,
            .. proptest::test_runner::Config::default()
        })]
        #[test]
        fn prop_canonical_round_trip(source in expression()) {
            let ast = parse(&source);
            prop_assume!(ast.is_ok());
            let ast = ast.unwrap();

            let canonical = ast.to_canonical_string();
            let reparsed = parse(&canonical);
            prop_assert!(reparsed.is_ok(), "canonical form '{}' of '{}' failed to parse: {:?}", canonical, source, reparsed.err());
            let reparsed = reparsed.unwrap();
            prop_assert!(ast.structural_eq(&reparsed), "'{}' and '{}' differ", source, canonical);
            prop_assert_eq!(reparsed.to_canonical_string(), canonical);
        }
    }

    proptest! {
        #[test]
        fn prop_integer_literals_parse(n in 0i32..=i32::MAX) {
            let ast = parse(&n.to_string()).unwrap();
            prop_assert_eq!(ast.to_canonical_string(), n.to_string());
        }
    }

    proptest! {
        #[test]
        fn prop_nested_parentheses_parse(depth in 1usize..40usize) {
            let source = format!("{}1 + 2{}", "(".repeat(depth), ")".repeat(depth));
            prop_assert!(parse(&source).is_ok());
        }
    }

    proptest! {
        #[test]
        fn prop_garbage_never_panics(source in "[ -~]{0,24}") {
            let _ = parse(&source);
        }
    }
}
