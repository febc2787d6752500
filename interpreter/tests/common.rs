#![allow(dead_code)]

use std::sync::LazyLock;
use interpreter::error::ConversionError;
use interpreter::types::TypeRef;
use interpreter::{builtin, evaluate, ContextBuilder, EvaluationContext, EvaluationResult, Function, TypeBuilder, TypeHandle, Value};

/// A host class with fields, a method, an overloaded method and a constructor.
pub fn person_type() -> TypeHandle {
    TypeBuilder::class("Person")
        .field("name", builtin::string())
        .field("age", builtin::int())
        .field("nickname", builtin::string())
        .method("greet", vec![builtin::string().into()], builtin::string(), |target, args| {
            let Value::Object(person) = target else {
                return Ok(Value::Null);
            };
            let own = person.get_field("name").unwrap_or_default();
            Ok(Value::from(format!("Hello {}, I am {own}", args[0])))
        })
        .method("describe", vec![builtin::string().into()], builtin::string(), |_, _| Ok(Value::from("string")))
        .method("describe", vec![builtin::number().into()], builtin::string(), |_, _| Ok(Value::from("number")))
        .constructor(vec![TypeRef::Of(builtin::string()), TypeRef::Of(builtin::int())], |args| {
            Ok(person_with(&args[0], &args[1]))
        })
        .build()
}

static PERSON: LazyLock<TypeHandle> = LazyLock::new(person_type);

pub fn person() -> TypeHandle {
    PERSON.clone()
}

fn person_with(name: &Value, age: &Value) -> Value {
    Value::object(&person(), [("name", name.clone()), ("age", age.clone()), ("nickname", Value::Null)])
}

pub fn ada() -> Value {
    person_with(&Value::from("Ada"), &Value::Int(36))
}

pub fn max_function() -> Function {
    Function::new("max", vec![builtin::int(), builtin::int()], builtin::int(), |args| match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(*a.max(b))),
        (a, _) => Err(ConversionError::unsupported(a.type_name(), "int").into()),
    })
}

pub fn person_context() -> EvaluationContext {
    ContextBuilder::new()
        .root(ada())
        .register_type(person())
        .function(max_function())
        .build()
}

pub fn eval_with(source: &str, context: &EvaluationContext) -> EvaluationResult<Value> {
    let ast = frontend::parse(source).unwrap_or_else(|e| panic!("parse of {source:?} failed: {e}"));
    evaluate(&ast, context)
}

pub fn eval(source: &str) -> Value {
    eval_with(source, &EvaluationContext::new(Value::Null)).unwrap_or_else(|e| panic!("{source:?} failed: {e}"))
}

pub fn list(items: &[i32]) -> Value {
    Value::list(items.iter().map(|i| Value::Int(*i)).collect())
}
