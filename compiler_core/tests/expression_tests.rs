use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, LazyLock};
use compiler_core::{
    global_configuration, parse, set_global_configuration, CompilerConfiguration, CompilerMode, ExpressionParser, ExpressionState,
};
use interpreter::{builtin, ContextBuilder, EvaluationContext, Function, TypeBuilder, TypeHandle, Value};
use rayon::prelude::*;
use rstest::rstest;
use serial_test::serial;

static ACCOUNT: LazyLock<TypeHandle> = LazyLock::new(|| {
    TypeBuilder::class("Account")
        .field("owner", builtin::string())
        .field("balance", builtin::long())
        .method("fee", vec![builtin::long().into()], builtin::long(), |_, args| match &args[0] {
            Value::Long(amount) => Ok(Value::Long(amount / 100)),
            _ => Ok(Value::Long(0)),
        })
        .build()
});

fn account(owner: &str, balance: i64) -> Value {
    Value::object(&ACCOUNT, [("owner", Value::from(owner)), ("balance", Value::Long(balance))])
}

fn context_for(balance: i64, limit: i64) -> EvaluationContext {
    ContextBuilder::new()
        .root(account("kim", balance))
        .register_type(ACCOUNT.clone())
        .variable("limit", Value::Long(limit))
        .build()
}

#[rstest]
#[case("2 + 3 * 4", Value::Int(14))]
#[case("'a' + 'b'", Value::from("ab"))]
#[case("3 > 6 ? 1 : 2", Value::Int(2))]
#[case("{'a':1,'b':2}['b']", Value::Int(2))]
#[case("false and (1/0 > 0)", Value::Bool(false))]
#[case("true or (1/0 > 0)", Value::Bool(true))]
fn end_to_end_under_every_mode(
    #[case] source: &str,
    #[case] expected: Value,
    #[values(CompilerConfiguration::interpreted_only(), CompilerConfiguration::immediate(), CompilerConfiguration::after_threshold(2))]
    configuration: CompilerConfiguration,
) {
    let expression = ExpressionParser::with_configuration(configuration).parse(source).unwrap();
    let context = EvaluationContext::new(Value::Null);
    for _ in 0..4 {
        assert_eq!(expression.evaluate(&context).unwrap(), expected, "{source} under {:?}", configuration.mode);
    }
}

#[rstest]
#[case("balance - fee(balance) > #limit")]
#[case("owner.toUpperCase() + ':' + balance")]
#[case("balance * 2L - #limit")]
#[case("balance >= #limit ? owner : 'none'")]
fn interpreted_and_compiled_agree(#[case] source: &str) {
    let interpreted = ExpressionParser::with_configuration(CompilerConfiguration::interpreted_only()).parse(source).unwrap();
    let adaptive = ExpressionParser::with_configuration(CompilerConfiguration::after_threshold(1)).parse(source).unwrap();
    for (balance, limit) in [(1_000, 10), (50, 500), (7_000, 6_000), (900, 900)] {
        let context = context_for(balance, limit);
        assert_eq!(adaptive.evaluate(&context), interpreted.evaluate(&context), "{source}");
    }
    let stats = adaptive.stats();
    assert_eq!(stats.state, ExpressionState::Compiled, "{source}: {stats}");
    assert!(stats.compiled >= 3, "{source}: {stats}");
}

#[test]
fn mixed_numeric_kinds_stay_interpreted_but_agree() {
    let interpreted = ExpressionParser::with_configuration(CompilerConfiguration::interpreted_only()).parse("1 < 3.0").unwrap();
    let adaptive = ExpressionParser::with_configuration(CompilerConfiguration::immediate()).parse("1 < 3.0").unwrap();
    let context = EvaluationContext::new(Value::Null);
    for _ in 0..3 {
        assert_eq!(adaptive.evaluate(&context), interpreted.evaluate(&context));
    }
    assert_eq!(adaptive.state(), ExpressionState::Interpreted);
    assert_eq!(adaptive.stats().compiled, 0);
}

#[test]
fn compiled_errors_equal_interpreted_errors() {
    let source = "balance / #limit";
    let interpreted = ExpressionParser::with_configuration(CompilerConfiguration::interpreted_only()).parse(source).unwrap();
    let adaptive = ExpressionParser::with_configuration(CompilerConfiguration::immediate()).parse(source).unwrap();
    adaptive.evaluate(&context_for(10, 2)).unwrap();
    assert_eq!(adaptive.state(), ExpressionState::Compiled);

    let failing = context_for(10, 0);
    let compiled_error = adaptive.evaluate(&failing).unwrap_err();
    assert_eq!(compiled_error, interpreted.evaluate(&failing).unwrap_err());
    assert_eq!(compiled_error.kind.name(), "OperatorError");
    assert_eq!(adaptive.stats().compiled, 1);
}

#[test]
fn guard_failure_falls_back_without_a_wrong_answer() {
    let expression = ExpressionParser::with_configuration(CompilerConfiguration::immediate()).parse("#v.balance + 1L").unwrap();
    let with_account = ContextBuilder::new().variable("v", account("a", 1)).build();
    assert_eq!(expression.evaluate(&with_account).unwrap(), Value::Long(2));
    assert_eq!(expression.state(), ExpressionState::Compiled);

    // same shape, but the field now holds something the program did not expect
    let odd = account("b", 1);
    if let Value::Object(instance) = &odd {
        instance.set_field("balance", Value::Int(5));
    }
    let context = ContextBuilder::new().variable("v", odd).build();
    assert_eq!(expression.evaluate(&context).unwrap(), Value::Long(6));
    assert_eq!(expression.stats().fallbacks, 1);
    assert_ne!(expression.state(), ExpressionState::Compiled);
}

#[test]
fn guard_failure_after_a_call_does_not_repeat_it() {
    let ticks = Arc::new(AtomicI64::new(0));
    let counter = ticks.clone();
    let target = account("c", 1);
    let context = ContextBuilder::new()
        .function(Function::new("tick", vec![], builtin::long(), move |_| {
            Ok(Value::Long(counter.fetch_add(1, Ordering::SeqCst) + 1))
        }))
        .variable("v", target.clone())
        .build();
    let expression = ExpressionParser::with_configuration(CompilerConfiguration::immediate()).parse("#tick() + #v.balance").unwrap();
    assert_eq!(expression.evaluate(&context).unwrap(), Value::Long(2));
    assert_eq!(expression.state(), ExpressionState::Compiled);

    // the compiled run calls #tick() and then trips over the int
    if let Value::Object(instance) = &target {
        instance.set_field("balance", Value::Int(5));
    }
    assert_eq!(expression.evaluate(&context).unwrap(), Value::Long(7));
    assert_eq!(expression.stats().fallbacks, 1);
    assert_eq!(ticks.load(Ordering::SeqCst), 2);

    assert_eq!(expression.evaluate(&context).unwrap(), Value::Long(8));
    assert_eq!(ticks.load(Ordering::SeqCst), 3);
}

#[test]
fn fallback_after_an_assignment_does_not_repeat_it() {
    let target = account("d", 1);
    let context = ContextBuilder::new().variable("n", Value::Long(0)).variable("v", target.clone()).build();
    let expression =
        ExpressionParser::with_configuration(CompilerConfiguration::immediate()).parse("(#n = #n + 1L) + #v.balance").unwrap();
    assert_eq!(expression.evaluate(&context).unwrap(), Value::Long(2));
    assert_eq!(expression.state(), ExpressionState::Compiled);

    if let Value::Object(instance) = &target {
        instance.set_field("balance", Value::Int(5));
    }
    assert_eq!(expression.evaluate(&context).unwrap(), Value::Long(7));
    assert_eq!(expression.stats().fallbacks, 1);
    assert_eq!(context.variable("n"), Some(Value::Long(2)));
}

#[test]
fn constant_collections_keep_their_identity() {
    let constant = parse("{1,2,3}").unwrap();
    let first = constant.evaluate(&EvaluationContext::new(Value::Null)).unwrap();
    let second = constant.evaluate(&EvaluationContext::new(Value::from("other root"))).unwrap();
    assert!(first.same_identity(&second));

    let varying = parse("{1,2,#x}").unwrap();
    let context = ContextBuilder::new().variable("x", Value::Int(3)).build();
    let first = varying.evaluate(&context).unwrap();
    let second = varying.evaluate(&context).unwrap();
    assert_eq!(first, second);
    assert!(!first.same_identity(&second));
}

#[test]
fn concurrent_threshold_crossing_compiles_once() {
    let expression = ExpressionParser::with_configuration(CompilerConfiguration::after_threshold(4)).parse("balance * 3L").unwrap();
    let results: Vec<Value> = (0..256i64)
        .into_par_iter()
        .map(|i| expression.evaluate(&context_for(i, 0)).unwrap())
        .collect();
    for (i, value) in results.into_iter().enumerate() {
        assert_eq!(value, Value::Long(i as i64 * 3));
    }
    let stats = expression.stats();
    assert_eq!(stats.compilations, 1, "{stats}");
    assert_eq!(stats.interpreted + stats.compiled, 256);
}

#[test]
fn canonical_form_round_trips() {
    let expression = parse("a?.b[1] + -2 * 3").unwrap();
    let again = parse(&expression.to_canonical_string()).unwrap();
    assert!(expression.ast().structural_eq(again.ast()));
}

#[test]
#[serial]
fn parser_follows_the_global_configuration() {
    let saved = global_configuration();
    set_global_configuration(CompilerConfiguration::after_threshold(2));

    let expression = parse("1 + 1").unwrap();
    assert_eq!(expression.configuration().mode, CompilerMode::CompileAfterThreshold(2));
    let context = EvaluationContext::new(Value::Null);
    expression.evaluate(&context).unwrap();
    assert_eq!(expression.state(), ExpressionState::Interpreted);
    expression.evaluate(&context).unwrap();
    assert_eq!(expression.state(), ExpressionState::Compiled);

    set_global_configuration(saved);
}

#[test]
#[serial]
fn session_override_beats_the_global_configuration() {
    let saved = global_configuration();
    set_global_configuration(CompilerConfiguration::immediate());

    let parser = ExpressionParser::with_configuration(CompilerConfiguration::interpreted_only());
    let expression = parser.parse("1 + 1").unwrap();
    expression.evaluate(&EvaluationContext::new(Value::Null)).unwrap();
    assert_eq!(expression.state(), ExpressionState::Interpreted);
    assert_eq!(ExpressionParser::new().configuration(), CompilerConfiguration::immediate());

    set_global_configuration(saved);
}
