use std::sync::LazyLock;
use compiler::{execute, generate, Flow, NotCompilable, Program, VmExit};
use frontend::Ast;
use interpreter::cache::CompileStatus;
use interpreter::error::ConversionError;
use interpreter::types::TypeRef;
use interpreter::{builtin, ContextBuilder, EvaluationContext, Function, NodeCaches, TypeBuilder, TypeHandle, Value};
use proptest::prelude::*;
use rstest::rstest;

static CITY: LazyLock<TypeHandle> = LazyLock::new(|| {
    TypeBuilder::class("City")
        .field("name", builtin::string())
        .field("population", builtin::int())
        .field("area", builtin::double())
        .method("describe", vec![builtin::string().into()], builtin::string(), |target, args| {
            let Value::Object(city) = target else {
                return Ok(Value::Null);
            };
            Ok(Value::from(format!("{}{}", city.get_field("name").unwrap_or_default(), args[0])))
        })
        .constructor(vec![TypeRef::Of(builtin::string()), TypeRef::Of(builtin::int())], |args| {
            Ok(city(&args[0], &args[1]))
        })
        .build()
});

fn city(name: &Value, population: &Value) -> Value {
    Value::object(&CITY, [("name", name.clone()), ("population", population.clone()), ("area", Value::Double(105.4))])
}

fn paris() -> Value {
    city(&Value::from("Paris"), &Value::Int(2_100_000))
}

fn clamp_function() -> Function {
    Function::new("clamp", vec![builtin::int(), builtin::int()], builtin::int(), |args| match (&args[0], &args[1]) {
        (Value::Int(v), Value::Int(max)) => Ok(Value::Int(*v.min(max))),
        (a, _) => Err(ConversionError::unsupported(a.type_name(), "int").into()),
    })
}

fn context() -> EvaluationContext {
    ContextBuilder::new()
        .root(paris())
        .register_type(CITY.clone())
        .function(clamp_function())
        .variable("limit", Value::Int(1_000))
        .variable("ratio", Value::Double(0.5))
        .variable("codes", Value::list(vec![Value::from("FR"), Value::from("DE")]))
        .build()
}

struct Warmed {
    ast: Ast,
    caches: NodeCaches,
    interpreted: Value,
}

fn warm(source: &str, context: &EvaluationContext) -> Warmed {
    let ast = frontend::parse(source).unwrap_or_else(|e| panic!("parse of {source:?} failed: {e}"));
    let caches = NodeCaches::new(ast.len());
    let interpreted = interpreter::evaluation::evaluate(&ast, &caches, context).unwrap_or_else(|e| panic!("{source:?} failed: {e}"));
    Warmed { ast, caches, interpreted }
}

fn compile(warmed: &Warmed) -> Result<Program, NotCompilable> {
    generate(&warmed.ast, &warmed.caches, Flow::observed(None))
}

#[rstest]
#[case::property("name")]
#[case::typed_arithmetic("population / 1000 + 1")]
#[case::double_arithmetic("area * #ratio")]
#[case::string_equality("name == 'Paris'")]
#[case::string_ordering("name < 'Rome'")]
#[case::concat("name + ' has ' + population")]
#[case::method("describe('!')")]
#[case::builtin_method("name.toUpperCase().length()")]
#[case::function("#clamp(population, #limit)")]
#[case::constructor("new City('Lyon', 500000).population")]
#[case::static_property("T(Integer).MAX_VALUE")]
#[case::list_index("#codes[1]")]
#[case::inline_map_index("{a: 1, b: 2}[b]")]
#[case::inline_list("{1, 2, 3}")]
#[case::logical("population > 1000 and !(name == 'Rome')")]
#[case::ternary("population > #limit ? 'big' : 'small'")]
#[case::elvis("name ?: 'unnamed'")]
#[case::null_comparison("name != null")]
#[case::instanceof("#root instanceof T(City)")]
#[case::negation("-population")]
#[case::non_constant_list("{name, #limit}")]
fn compiled_matches_interpreted(#[case] source: &str) {
    let context = context();
    let warmed = warm(source, &context);
    let program = compile(&warmed).unwrap_or_else(|e| panic!("{source:?} did not compile: {e}"));
    assert_eq!(execute(&program, &context), Ok(warmed.interpreted), "{source}\n{program}");
    assert_eq!(warmed.caches.node(warmed.ast.root).compile_status(), CompileStatus::Compilable);
}

#[rstest]
#[case::mixed_kinds("population > #ratio")]
#[case::power("population ^ 2")]
#[case::selection("#codes.?[#this == 'FR']")]
#[case::projection("#codes.![#this + '!']")]
#[case::matches("name matches 'P.*'")]
#[case::between("population between {1, 10}")]
#[case::property_assignment("name = 'Nice'")]
#[case::array("new int[3]")]
fn refuses_to_compile(#[case] source: &str) {
    let context = context();
    let warmed = warm(source, &context);
    assert!(compile(&warmed).is_err(), "{source} should not compile");
    assert_eq!(warmed.caches.node(warmed.ast.root).compile_status(), CompileStatus::NotCompilable);
}

#[test]
fn never_evaluated_member_blocks_compilation() {
    let context = context();
    let warmed = warm("population > 0 ? name : describe('x')", &context);
    assert!(matches!(compile(&warmed), Err(NotCompilable::Unresolved(_))));
}

#[test]
fn errors_match_the_interpreter() {
    let context = context();
    let warmed = warm("population / #limit", &context);
    let program = compile(&warmed).unwrap();
    context.set_variable("limit", Value::Int(0));

    let Err(VmExit::Error(compiled)) = execute(&program, &context) else { panic!("expected an error") };
    let interpreted = interpreter::evaluation::evaluate(&warmed.ast, &warmed.caches, &context).unwrap_err();
    assert_eq!(compiled, interpreted);
}

#[test]
fn null_target_errors_match_the_interpreter() {
    let context = context();
    let warmed = warm("#target.name", &ContextBuilder::new().variable("target", paris()).build());
    let program = compile(&warmed).unwrap();
    context.set_variable("target", Value::Null);

    let Err(VmExit::Error(compiled)) = execute(&program, &context) else { panic!("expected an error") };
    let interpreted = interpreter::evaluation::evaluate(&warmed.ast, &warmed.caches, &context).unwrap_err();
    assert_eq!(compiled.kind.name(), "AccessError");
    assert_eq!(compiled, interpreted);
}

#[test]
fn changed_root_type_falls_back() {
    let context = context();
    let warmed = warm("name", &context);
    let program = compile(&warmed).unwrap();
    let other = ContextBuilder::new().root(Value::map(Default::default())).build();
    assert!(matches!(execute(&program, &other), Err(VmExit::Fallback { .. })));
}

#[test]
fn replaced_function_falls_back() {
    let context = context();
    let warmed = warm("#clamp(3, 2)", &context);
    let program = compile(&warmed).unwrap();
    let replaced = ContextBuilder::new().function(clamp_function()).build();
    assert!(matches!(execute(&program, &replaced), Err(VmExit::Fallback { .. })));
    assert_eq!(execute(&program, &context), Ok(Value::Int(2)));
}

proptest! {
    #[test]
    fn integer_arithmetic_agrees(a in any::<i32>(), b in any::<i32>(), c in -50i32..50) {
        let source = "#a * #b - #c % 7 + (#a > #b ? #c : -#c)";
        let warm_context = ContextBuilder::new()
            .variable("a", Value::Int(1))
            .variable("b", Value::Int(2))
            .variable("c", Value::Int(3))
            .build();
        let warmed = warm(source, &warm_context);
        // both branches of the conditional must have run once
        warm_context.set_variable("a", Value::Int(5));
        interpreter::evaluation::evaluate(&warmed.ast, &warmed.caches, &warm_context).unwrap();
        let program = compile(&warmed).unwrap();

        let context = ContextBuilder::new()
            .variable("a", Value::Int(a))
            .variable("b", Value::Int(b))
            .variable("c", Value::Int(c))
            .build();
        let interpreted = interpreter::evaluation::evaluate(&warmed.ast, &warmed.caches, &context).unwrap();
        prop_assert_eq!(execute(&program, &context), Ok(interpreted));
    }

    #[test]
    fn string_comparisons_agree(l in "[a-c]{0,3}", r in "[a-c]{0,3}") {
        let source = "#l < #r or #l == #r";
        let seed = ContextBuilder::new().variable("l", Value::from("b")).variable("r", Value::from("a")).build();
        let warmed = warm(source, &seed);
        let program = compile(&warmed).unwrap();

        let context = ContextBuilder::new().variable("l", Value::from(l.as_str())).variable("r", Value::from(r.as_str())).build();
        prop_assert_eq!(execute(&program, &context), Ok(Value::Bool(l <= r)));
    }
}
