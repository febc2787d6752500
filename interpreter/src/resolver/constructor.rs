use std::sync::Arc;
use crate::environment::EvaluationContext;
use crate::error::{EvaluationErrorKind, MemberKind};
use crate::object::Value;
use crate::overload::{self, ArgumentPlan, Signature};
use crate::resolver::{ConstructorExecutor, ConstructorResolver, Resolution, ResolveResult};
use crate::types::{ConstructorDescriptor, TypeHandle};

/// Constructors declared on a type descriptor.
#[derive(Debug, Default)]
pub struct ReflectiveConstructorResolver;

#[derive(Debug)]
pub struct ReflectiveConstructor {
    type_handle: TypeHandle,
    constructor: ConstructorDescriptor,
    plan: ArgumentPlan,
}

impl ConstructorExecutor for ReflectiveConstructor {
    fn execute(&self, context: &EvaluationContext, args: Vec<Value>) -> Result<Value, EvaluationErrorKind> {
        let args = self.plan.apply(context.conversion_service(), args)?;
        (self.constructor.factory)(&args)
    }

    fn constructed_type(&self) -> TypeHandle {
        self.type_handle.clone()
    }
}

impl ConstructorResolver for ReflectiveConstructorResolver {
    fn resolve(&self, context: &EvaluationContext, type_handle: &TypeHandle, args: &[Value]) -> ResolveResult<Arc<dyn ConstructorExecutor>> {
        let constructors = type_handle.constructors();
        if constructors.is_empty() {
            return Ok(Resolution::NotApplicable);
        }
        let signatures: Vec<Signature> = constructors
            .iter()
            .map(|c| Signature::new(c.parameter_types.iter().map(|p| p.resolve(type_handle)).collect(), c.varargs))
            .collect();
        let (index, plan) =
            overload::resolve(MemberKind::Constructor, type_handle.name(), &signatures, args, context.conversion_service())?;
        Ok(Resolution::Resolved(Arc::new(ReflectiveConstructor {
            type_handle: type_handle.clone(),
            constructor: constructors[index].clone(),
            plan,
        })))
    }
}
