mod common;
use common::*;

use interpreter::error::{AccessError, EvaluationErrorKind};
use interpreter::{ContextBuilder, EvaluationContext, NodeCaches, Value};
use rstest::rstest;

#[rstest]
#[case("2 + 3 * 4", Value::Int(14))]
#[case("(2 + 3) * 4", Value::Int(20))]
#[case("'a' + 'b'", Value::from("ab"))]
#[case("'n=' + 5", Value::from("n=5"))]
#[case("3 > 6 ? 1 : 2", Value::Int(2))]
#[case("{'a':1,'b':2}['b']", Value::Int(2))]
#[case("{a:1,b:2}[a]", Value::Int(1))]
#[case("10 div 3", Value::Int(3))]
#[case("7 % 4", Value::Int(3))]
#[case("7 mod 4", Value::Int(3))]
#[case("2 ^ 10", Value::Int(1024))]
#[case("2 ^ 40", Value::Long(1_099_511_627_776))]
#[case("1 + 2L", Value::Long(3))]
#[case("1 < 3.0", Value::Bool(true))]
#[case("1.5 * 2", Value::Double(3.0))]
#[case("'abc' matches 'a.c'", Value::Bool(true))]
#[case("'abcd' matches 'a.c'", Value::Bool(false))]
#[case("3 between {1, 5}", Value::Bool(true))]
#[case("'b' between {'a', 'c'}", Value::Bool(true))]
#[case("null ?: 'x'", Value::from("x"))]
#[case("'' ?: 'x'", Value::from("x"))]
#[case("'y' ?: 'x'", Value::from("y"))]
#[case("not true or 1 lt 2", Value::Bool(true))]
#[case("'hello'.toUpperCase()", Value::from("HELLO"))]
#[case("'hello'.substring(1, 3)", Value::from("el"))]
#[case("'abc'[1]", Value::from("b"))]
#[case("{1,2,3}.size()", Value::Int(3))]
#[case("{1,2,3,4}.^[#this > 2]", Value::Int(3))]
#[case("{1,2,3,4}.$[#this > 2]", Value::Int(4))]
#[case("{1,2,3,4}.^[#this > 9]", Value::Null)]
#[case("T(Integer).MAX_VALUE", Value::Int(i32::MAX))]
#[case("T(String).name", Value::from("String"))]
#[case("'x' instanceof T(String)", Value::Bool(true))]
#[case("1 instanceof T(String)", Value::Bool(false))]
#[case("new int[3].length", Value::Int(3))]
#[case("new String('abc').length()", Value::Int(3))]
#[case("#undefined", Value::Null)]
#[case("null?.length()", Value::Null)]
fn evaluates_to(#[case] source: &str, #[case] expected: Value) {
    assert_eq!(eval(source), expected);
}

#[rstest]
#[case("{1,2,3,4}.?[#this > 2]", &[3, 4])]
#[case("{1,2,3}.![#this * 2]", &[2, 4, 6])]
#[case("{1,2,3}.?[#this > 5]", &[])]
fn collection_operators(#[case] source: &str, #[case] expected: &[i32]) {
    assert_eq!(eval(source), list(expected));
}

#[test]
fn map_selection_and_projection() {
    let selected = eval("{a:1,b:2,c:3}.?[value > 1]");
    assert_eq!(selected.to_string(), "{b=2, c=3}");
    let keys = eval("{a:1,b:2}.![key]");
    assert_eq!(keys, Value::list(vec![Value::from("a"), Value::from("b")]));
    assert_eq!(eval("{a:1,b:2,c:3}.$[value < 3]").to_string(), "{b=2}");
}

#[test]
fn short_circuit_skips_the_right_operand() {
    assert_eq!(eval("false and (1/0 > 0)"), Value::Bool(false));
    assert_eq!(eval("true or (1/0 > 0)"), Value::Bool(true));
    let err = eval_with("true and (1/0 > 0)", &EvaluationContext::new(Value::Null)).unwrap_err();
    assert_eq!(err.kind.name(), "OperatorError");
}

#[test]
fn ternary_evaluates_one_branch() {
    let ctx = EvaluationContext::new(Value::Null);
    assert_eq!(eval_with("true ? #a = 1 : #b = 2", &ctx).unwrap(), Value::Int(1));
    assert_eq!(ctx.variable("a"), Some(Value::Int(1)));
    assert_eq!(ctx.variable("b"), None);
}

#[test]
fn root_object_members() {
    let ctx = person_context();
    assert_eq!(eval_with("name", &ctx).unwrap(), Value::from("Ada"));
    assert_eq!(eval_with("age + 1", &ctx).unwrap(), Value::Int(37));
    assert_eq!(eval_with("#root.name.length()", &ctx).unwrap(), Value::Int(3));
    assert_eq!(eval_with("greet('Bob')", &ctx).unwrap(), Value::from("Hello Bob, I am Ada"));
    assert_eq!(eval_with("nickname?.length()", &ctx).unwrap(), Value::Null);
    assert_eq!(eval_with("nickname ?: name", &ctx).unwrap(), Value::from("Ada"));
    assert_eq!(eval_with("#max(age, 40)", &ctx).unwrap(), Value::Int(40));
    assert_eq!(eval_with("{1,2,3}.![#root.age + #this]", &ctx).unwrap(), list(&[37, 38, 39]));
}

#[test]
fn overloads_follow_argument_types() {
    let ctx = person_context();
    assert_eq!(eval_with("describe(5)", &ctx).unwrap(), Value::from("number"));
    assert_eq!(eval_with("describe('x')", &ctx).unwrap(), Value::from("string"));
}

#[test]
fn cached_method_is_reresolved_when_argument_type_changes() {
    let ast = frontend::parse("describe(#v)").unwrap();
    let caches = NodeCaches::new(ast.len());
    let run = |v: Value| {
        let ctx = ContextBuilder::new().root(ada()).variable("v", v).build();
        interpreter::evaluation::evaluate(&ast, &caches, &ctx).unwrap()
    };
    assert_eq!(run(Value::Int(1)), Value::from("number"));
    assert_eq!(run(Value::Int(2)), Value::from("number"));
    assert_eq!(run(Value::from("s")), Value::from("string"));
    assert_eq!(run(Value::Double(1.5)), Value::from("number"));
}

#[test]
fn assignments() {
    let ctx = person_context();
    assert_eq!(eval_with("name = 'Grace'", &ctx).unwrap(), Value::from("Grace"));
    assert_eq!(eval_with("name", &ctx).unwrap(), Value::from("Grace"));
    assert_eq!(eval_with("age = '40'", &ctx).unwrap(), Value::Int(40));
    assert_eq!(eval_with("age", &ctx).unwrap(), Value::Int(40));
    assert_eq!(eval_with("#p = new Person('Linus', 54)", &ctx).unwrap().to_string(), "Person{name=Linus, age=54, nickname=null}");
    assert_eq!(eval_with("#p.age", &ctx).unwrap(), Value::Int(54));
    assert_eq!(eval_with("#list = {1, #p.age}", &ctx).unwrap(), list(&[1, 54]));
    assert_eq!(eval_with("#list[0] = 9", &ctx).unwrap(), Value::Int(9));
    assert_eq!(eval_with("#list", &ctx).unwrap(), list(&[9, 54]));
}

#[test]
fn failed_conversion_leaves_the_target_untouched() {
    let ctx = person_context();
    let err = eval_with("age = 'old'", &ctx).unwrap_err();
    assert_eq!(err.kind.name(), "ConversionError");
    assert_eq!(eval_with("age", &ctx).unwrap(), Value::Int(36));
}

#[rstest]
#[case("{1,2,3}[0] = 5", "UnsupportedMutationError")]
#[case("{a:1}['b'] = 2", "UnsupportedMutationError")]
#[case("missing", "AccessError")]
#[case("{1,2}[5]", "AccessError")]
#[case("#this = 1", "AccessError")]
#[case("T(Nowhere)", "TypeNotFoundError")]
#[case("'a' - 1", "OperatorError")]
#[case("3 between {1}", "OperatorError")]
#[case("{1,2}.?[#this]", "ConversionError")]
#[case("@anything", "AccessError")]
fn error_kinds(#[case] source: &str, #[case] kind: &str) {
    let err = eval_with(source, &EvaluationContext::new(Value::Null)).unwrap_err();
    assert_eq!(err.kind.name(), kind, "{source}: {err}");
}

#[test]
fn missing_property_reports_target_and_name() {
    let err = eval_with("salary", &person_context()).unwrap_err();
    match err.kind {
        EvaluationErrorKind::Access(AccessError::NotFound { ref target_type, ref member_name, .. }) => {
            assert_eq!(target_type, "Person");
            assert_eq!(member_name, "salary");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(err.position(), 0);
}

#[test]
fn constant_collections_are_folded_once() {
    let ast = frontend::parse("{1,2,3}").unwrap();
    let caches = NodeCaches::new(ast.len());
    let first = interpreter::evaluation::evaluate(&ast, &caches, &EvaluationContext::new(Value::Null)).unwrap();
    let second = interpreter::evaluation::evaluate(&ast, &caches, &EvaluationContext::new(Value::Int(1))).unwrap();
    assert!(first.same_identity(&second));

    let ast = frontend::parse("{1,2,#x}").unwrap();
    let caches = NodeCaches::new(ast.len());
    let ctx = ContextBuilder::new().variable("x", Value::Int(3)).build();
    let first = interpreter::evaluation::evaluate(&ast, &caches, &ctx).unwrap();
    let second = interpreter::evaluation::evaluate(&ast, &caches, &ctx).unwrap();
    assert_eq!(first, second);
    assert!(!first.same_identity(&second));
}

#[test]
fn beans_resolve_through_the_host() {
    let beans: std::collections::HashMap<String, Value> = [("config".to_string(), Value::from("prod"))].into();
    let ctx = ContextBuilder::new().bean_resolver(std::sync::Arc::new(beans)).build();
    assert_eq!(eval_with("@config.toUpperCase()", &ctx).unwrap(), Value::from("PROD"));
    assert_eq!(eval_with("@other", &ctx).unwrap_err().kind.name(), "AccessError");
}

#[test]
fn map_keys_as_properties_when_enabled() {
    let mut entries = indexmap::IndexMap::new();
    entries.insert(Value::from("region"), Value::from("eu"));
    let ctx = ContextBuilder::new().root(Value::map(entries)).map_property_access().build();
    assert_eq!(eval_with("region", &ctx).unwrap(), Value::from("eu"));
    assert_eq!(eval_with("region = 'us'", &ctx).unwrap(), Value::from("us"));
    assert_eq!(eval_with("['region']", &ctx).unwrap(), Value::from("us"));
}
