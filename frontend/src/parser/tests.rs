use crate::ast::*;
use crate::parse;
use crate::parser::error::ParserErrorKind;
use crate::parser::Parser;
use rstest::rstest;

fn root_expr(ast: &Ast) -> &Expr {
    ast.get(ast.root).unwrap()
}

#[cfg(test)]
mod parser_tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn parser_precedence_mul_over_add() {
        let ast = parse("2 + 3 * 4").unwrap();
        match root_expr(&ast) {
            Expr::Binary(Operator::Add, lhs, rhs) => {
                assert_eq!(ast.get(*lhs), Some(&Expr::Literal(Literal::Int(2))));
                assert!(matches!(ast.get(*rhs), Some(Expr::Binary(Operator::Mul, _, _))));
            }
            other => panic!("unexpected root {other:?}"),
        }
    }

    #[test]
    fn parser_left_associative_subtraction() {
        let ast = parse("10 - 4 - 3").unwrap();
        match root_expr(&ast) {
            Expr::Binary(Operator::Sub, lhs, rhs) => {
                assert!(matches!(ast.get(*lhs), Some(Expr::Binary(Operator::Sub, _, _))));
                assert_eq!(ast.get(*rhs), Some(&Expr::Literal(Literal::Int(3))));
            }
            other => panic!("unexpected root {other:?}"),
        }
    }

    #[test]
    fn parser_ternary_is_right_associative() {
        let ast = parse("a ? 1 : b ? 2 : 3").unwrap();
        match root_expr(&ast) {
            Expr::Ternary(_, _, otherwise) => {
                assert!(matches!(ast.get(*otherwise), Some(Expr::Ternary(..))));
            }
            other => panic!("unexpected root {other:?}"),
        }
    }

    #[test]
    fn parser_unary_minus_binds_looser_than_power() {
        let ast = parse("-2^2").unwrap();
        match root_expr(&ast) {
            Expr::Unary(UnaryOp::Minus, operand) => {
                assert!(matches!(ast.get(*operand), Some(Expr::Binary(Operator::Pow, _, _))));
            }
            other => panic!("unexpected root {other:?}"),
        }
    }

    #[test]
    fn parser_compound_chain_keeps_order() {
        let ast = parse("a.b[0]?.c(1)").unwrap();
        let Expr::Compound(parts) = root_expr(&ast) else {
            panic!("expected compound");
        };
        assert_eq!(parts.len(), 4);
        assert!(matches!(ast.get(parts[0]), Some(Expr::Property { null_safe: false, .. })));
        assert!(matches!(ast.get(parts[1]), Some(Expr::Property { .. })));
        assert!(matches!(ast.get(parts[2]), Some(Expr::Indexer(_))));
        match ast.get(parts[3]) {
            Some(Expr::MethodCall { name, args, null_safe }) => {
                assert_eq!(ast.resolve(*name), "c");
                assert_eq!(args.len(), 1);
                assert!(*null_safe);
            }
            other => panic!("unexpected accessor {other:?}"),
        }
    }

    #[test]
    fn parser_marks_constant_collections() {
        let constant = parse("{1, 2, -3, {'x'}}").unwrap();
        assert!(matches!(root_expr(&constant), Expr::InlineList { constant: true, .. }));

        let dynamic = parse("{1, 2, #x}").unwrap();
        assert!(matches!(root_expr(&dynamic), Expr::InlineList { constant: false, .. }));

        let map = parse("{a: 1, 'b': {2}}").unwrap();
        assert!(matches!(root_expr(&map), Expr::InlineMap { constant: true, .. }));
    }

    #[test]
    fn parser_bare_identifier_map_key_is_string() {
        let ast = parse("{name: 'x'}").unwrap();
        let Expr::InlineMap { entries, .. } = root_expr(&ast) else {
            panic!("expected map");
        };
        assert_eq!(ast.get(entries[0].0), Some(&Expr::Literal(Literal::String("name".to_string()))));
    }

    #[test]
    fn parser_empty_collections() {
        assert!(matches!(root_expr(&parse("{}").unwrap()), Expr::InlineList { elements, .. } if elements.is_empty()));
        assert!(matches!(root_expr(&parse("{:}").unwrap()), Expr::InlineMap { entries, .. } if entries.is_empty()));
    }

    #[test]
    fn parser_type_reference_and_constructor() {
        let ast = parse("T(java.lang.String[])").unwrap();
        assert_eq!(
            root_expr(&ast),
            &Expr::TypeReference { name: "java.lang.String".to_string(), dimensions: 1 }
        );

        let ast = parse("new Point(1, 2)").unwrap();
        assert!(matches!(root_expr(&ast), Expr::Constructor { type_name, args } if type_name == "Point" && args.len() == 2));

        let ast = parse("new int[3][]").unwrap();
        assert!(matches!(root_expr(&ast), Expr::ArrayConstructor { dimensions, initializer: None, .. } if dimensions.len() == 2));
    }

    #[test]
    fn parser_variables_functions_and_beans() {
        assert!(matches!(root_expr(&parse("#x").unwrap()), Expr::Variable(_)));
        assert!(matches!(root_expr(&parse("#max(1, 2)").unwrap()), Expr::FunctionCall { args, .. } if args.len() == 2));
        assert_eq!(root_expr(&parse("@service").unwrap()), &Expr::BeanReference("service".to_string()));
        assert_eq!(root_expr(&parse("@'a.b'").unwrap()), &Expr::BeanReference("a.b".to_string()));
    }

    #[test]
    fn parser_selection_and_projection() {
        let ast = parse("list.^[#this > 1].![#this]").unwrap();
        let Expr::Compound(parts) = root_expr(&ast) else {
            panic!("expected compound");
        };
        assert!(matches!(ast.get(parts[1]), Some(Expr::Selection { kind: SelectionKind::First, .. })));
        assert!(matches!(ast.get(parts[2]), Some(Expr::Projection { .. })));
    }

    #[test]
    fn parser_spans_cover_source() {
        let ast = parse("foo + bar").unwrap();
        assert_eq!(ast.node(ast.root), Node::new(0, 9));
        let Expr::Binary(_, lhs, rhs) = root_expr(&ast) else {
            panic!("expected binary");
        };
        assert_eq!(ast.node(*lhs), Node::new(0, 3));
        assert_eq!(ast.node(*rhs), Node::new(6, 9));
    }

    #[test]
    fn parser_variable_names() {
        let ast = parse("#a + #b * #a + #this.x + #root").unwrap();
        assert_eq!(ast.variable_names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn parser_accepts_valid_expressions_parallel() {
        let inputs = vec![
            "1",
            "'hello' + ' world'",
            "a.b.c",
            "#x = #x + 1",
            "x ?: 'default'",
            "name matches '[a-z]+'",
            "3 between {1, 5}",
            "1 instanceof T(Integer)",
            "a?.b?.c",
            "{1,2,3}.![#this * 2]",
            "map['key'].length()",
            "new String('x').toUpperCase()",
            "!true or false and true",
            "1 lt 2 and 3 GE 2",
            "10 div 3 mod 2",
            "[0]",
            "?[#this > 0]",
        ];
        inputs.par_iter().for_each(|input| {
            assert!(parse(input).is_ok(), "Failed to parse: {input}");
        });
    }
}

#[cfg(test)]
mod parser_error_tests {
    use super::*;

    #[rstest]
    #[case("1 +", "expression")]
    #[case("(1 + 2", ")")]
    #[case("{1, 2", "}")]
    #[case("a.", "property or method name")]
    #[case("f(1, 2", "',' or ')'")]
    #[case("1 2", "end of input")]
    #[case("a ? b", ":")]
    fn parser_reports_expected_token(#[case] input: &str, #[case] expected: &str) {
        let err = parse(input).unwrap_err();
        assert_eq!(err.expected(), Some(expected), "Input: '{input}' error: {err}");
    }

    #[test]
    fn parser_error_position_points_at_offending_token() {
        let err = parse("1 + )").unwrap_err();
        assert_eq!(err.position(), 4);
        assert_eq!(err.found(), Some(")"));
    }

    #[test]
    fn parser_surfaces_lex_errors() {
        let err = parse("1 + 'abc").unwrap_err();
        assert!(err.is_lex_error());
        assert_eq!(err.position(), 4);
    }

    #[test]
    fn parser_instanceof_requires_type_reference() {
        let err = parse("x instanceof String").unwrap_err();
        assert!(matches!(err.kind, ParserErrorKind::InvalidSyntax { .. }));
    }

    #[rstest]
    #[case("new int[]")]
    #[case("new int[2]{1, 2}")]
    #[case("new int[][2]")]
    fn parser_rejects_invalid_array_constructors(#[case] input: &str) {
        assert!(parse(input).is_err(), "Input: '{input}'");
    }

    #[test]
    fn parser_recursion_limit() {
        let result = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let deep = format!("{}1{}", "(".repeat(300), ")".repeat(300));
                let err = parse(&deep).unwrap_err();
                assert!(matches!(err.kind, ParserErrorKind::RecursionLimitExceeded { max_depth: 256 }));

                let shallow = format!("{}1{}", "(".repeat(50), ")".repeat(50));
                assert!(parse(&shallow).is_ok());
            })
            .unwrap()
            .join();
        assert!(result.is_ok());
    }

    #[test]
    fn parser_custom_depth() {
        let err = Parser::new("((1))").with_max_depth(3).parse_expression().unwrap_err();
        assert!(matches!(err.kind, ParserErrorKind::RecursionLimitExceeded { max_depth: 3 }));
    }
}
