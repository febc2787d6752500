use criterion::{black_box, criterion_group, criterion_main, Criterion};
use compiler_core::{CompilerConfiguration, ExpressionParser};
use interpreter::{builtin, ContextBuilder, EvaluationContext, TypeBuilder, Value};

const ARITHMETIC: &str = "(#a + #b) * (#a - #b) / 3 + #a % 7";
const MEMBERS: &str = "name.length() * 2 + age > #limit ? name.toUpperCase() : 'young'";

fn arithmetic_context() -> EvaluationContext {
    ContextBuilder::new().variable("a", Value::Int(1_234)).variable("b", Value::Int(56)).build()
}

fn member_context() -> EvaluationContext {
    let person = TypeBuilder::class("Person").field("name", builtin::string()).field("age", builtin::int()).build();
    let root = Value::object(&person, [("name", Value::from("Grace")), ("age", Value::Int(85))]);
    ContextBuilder::new().root(root).variable("limit", Value::Int(40)).build()
}

fn bench_modes(c: &mut Criterion, name: &str, source: &str, context: &EvaluationContext) {
    let mut group = c.benchmark_group(name);
    for (label, configuration) in [
        ("interpreted", CompilerConfiguration::interpreted_only()),
        ("compiled", CompilerConfiguration::immediate()),
    ] {
        let expression = ExpressionParser::with_configuration(configuration).parse(source).unwrap();
        expression.evaluate(context).unwrap();
        group.bench_function(label, |b| b.iter(|| expression.evaluate(black_box(context)).unwrap()));
    }
    group.finish();
}

fn arithmetic_benchmark(c: &mut Criterion) {
    bench_modes(c, "arithmetic", ARITHMETIC, &arithmetic_context());
}

fn member_benchmark(c: &mut Criterion) {
    bench_modes(c, "members", MEMBERS, &member_context());
}

fn parse_benchmark(c: &mut Criterion) {
    c.bench_function("parse", |b| b.iter(|| frontend::parse(black_box(MEMBERS)).unwrap()));
}

criterion_group!(benches, arithmetic_benchmark, member_benchmark, parse_benchmark);
criterion_main!(benches);
