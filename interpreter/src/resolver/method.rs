use std::sync::Arc;
use crate::environment::EvaluationContext;
use crate::error::{EvaluationErrorKind, MemberKind};
use crate::object::Value;
use crate::overload::{self, ArgumentPlan, Signature};
use crate::resolver::{MethodExecutor, MethodResolver, Resolution, ResolveResult};
use crate::types::{builtin, MethodDescriptor, TypeHandle};

/// Methods declared on the target's type descriptor. For a type reference
/// target the type's static methods are searched first, then the methods of
/// the type object itself.
#[derive(Debug, Default)]
pub struct ReflectiveMethodResolver;

#[derive(Debug)]
pub struct ReflectiveMethod {
    method: MethodDescriptor,
    plan: ArgumentPlan,
    return_type: TypeHandle,
}

impl ReflectiveMethod {
    pub fn name(&self) -> &str {
        &self.method.name
    }

    pub fn plan(&self) -> &ArgumentPlan {
        &self.plan
    }
}

impl MethodExecutor for ReflectiveMethod {
    fn execute(&self, context: &EvaluationContext, target: &Value, args: Vec<Value>) -> Result<Value, EvaluationErrorKind> {
        let args = self.plan.apply(context.conversion_service(), args)?;
        (self.method.invoker)(target, &args)
    }

    fn return_type(&self) -> Option<TypeHandle> {
        Some(self.return_type.clone())
    }
}

fn candidates<'t>(target: &Value, owner: &'t TypeHandle, class: &'t TypeHandle, name: &str) -> (&'t TypeHandle, Vec<&'t MethodDescriptor>) {
    let mut found = Vec::new();
    if matches!(target, Value::Type(_)) {
        owner.collect_methods(name, true, &mut found);
        if found.is_empty() {
            class.collect_methods(name, false, &mut found);
            return (class, found);
        }
    } else {
        owner.collect_methods(name, false, &mut found);
    }
    (owner, found)
}

impl MethodResolver for ReflectiveMethodResolver {
    fn resolve(&self, context: &EvaluationContext, target: &Value, name: &str, args: &[Value]) -> ResolveResult<Arc<dyn MethodExecutor>> {
        let owner = match target {
            Value::Null => return Ok(Resolution::NotApplicable),
            Value::Type(t) => t.clone(),
            other => other.type_handle(),
        };
        let class = builtin::type_type();
        let (declaring, methods) = candidates(target, &owner, &class, name);
        if methods.is_empty() {
            return Ok(Resolution::NotApplicable);
        }
        let signatures: Vec<Signature> = methods
            .iter()
            .map(|m| Signature::new(m.parameter_types.iter().map(|p| p.resolve(declaring)).collect(), m.varargs))
            .collect();
        let (index, plan) = overload::resolve(MemberKind::Method, name, &signatures, args, context.conversion_service())?;
        let method = methods[index].clone();
        let return_type = method.return_type.resolve(declaring);
        Ok(Resolution::Resolved(Arc::new(ReflectiveMethod { method, plan, return_type })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OverloadError;
    use crate::types::TypeRef;

    fn resolve(target: &Value, name: &str, args: &[Value]) -> ResolveResult<Arc<dyn MethodExecutor>> {
        ReflectiveMethodResolver.resolve(&EvaluationContext::new(Value::Null), target, name, args)
    }

    fn call(target: &Value, name: &str, args: Vec<Value>) -> Value {
        let ctx = EvaluationContext::new(Value::Null);
        match ReflectiveMethodResolver.resolve(&ctx, target, name, &args) {
            Ok(Resolution::Resolved(executor)) => executor.execute(&ctx, target, args).unwrap(),
            other => panic!("unresolved: {other:?}"),
        }
    }

    #[test]
    fn string_methods() {
        let hello = Value::from("hello");
        assert_eq!(call(&hello, "toUpperCase", vec![]), Value::from("HELLO"));
        assert_eq!(call(&hello, "substring", vec![Value::Int(1), Value::Int(3)]), Value::from("el"));
        assert_eq!(call(&hello, "length", vec![]), Value::Int(5));
    }

    #[test]
    fn declaring_return_type_resolves_to_receiver_type() {
        let Ok(Resolution::Resolved(executor)) = resolve(&Value::from("x"), "trim", &[]) else {
            panic!("trim should resolve");
        };
        assert!(Arc::ptr_eq(&executor.return_type().unwrap(), &builtin::string()));
    }

    #[test]
    fn statics_then_type_object_methods() {
        let integer = Value::Type(builtin::integer());
        assert_eq!(call(&integer, "parseInt", vec![Value::from("42")]), Value::Int(42));
        assert_eq!(call(&integer, "getName", vec![]), Value::from("Integer"));
    }

    #[test]
    fn inherited_methods() {
        assert_eq!(call(&Value::Int(7), "doubleValue", vec![]), Value::Double(7.0));
        let counter = crate::types::TypeBuilder::class("Counter")
            .method("next", vec![TypeRef::from(builtin::long())], builtin::long(), |_, args| {
                Ok(Value::Long(args[0].as_i64().unwrap_or(0) + 1))
            })
            .build();
        let instance = Value::object(&counter, Vec::<(String, Value)>::new());
        // int argument widened to long by the plan
        assert_eq!(call(&instance, "next", vec![Value::Int(1)]), Value::Long(2));
    }

    #[test]
    fn unknown_and_mismatched() {
        assert!(matches!(resolve(&Value::from("x"), "frobnicate", &[]), Ok(Resolution::NotApplicable)));
        assert!(matches!(resolve(&Value::Null, "length", &[]), Ok(Resolution::NotApplicable)));
        let err = resolve(&Value::from("x"), "substring", &[Value::Bool(true)]).unwrap_err();
        assert!(matches!(err, EvaluationErrorKind::Overload(OverloadError::NoMatch { .. })));
    }
}
