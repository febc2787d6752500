//! Pluggable member resolution.
//!
//! The context holds ordered lists of resolvers. Each one either hands back an
//! accessor/executor, declines with [`Resolution::NotApplicable`] so the next
//! resolver is asked, or fails with an error that ends the search.

mod constructor;
mod method;
mod property;

use std::fmt::Debug;
use std::sync::{Arc, LazyLock};
use crate::environment::EvaluationContext;
use crate::error::EvaluationErrorKind;
use crate::object::Value;
use crate::types::TypeHandle;

pub use constructor::{ReflectiveConstructor, ReflectiveConstructorResolver};
pub use method::{ReflectiveMethod, ReflectiveMethodResolver};
pub use property::{MapKeyAccessor, MapPropertyResolver, ReflectiveProperty, ReflectivePropertyAccessor};

#[derive(Debug, Clone)]
pub enum Resolution<T> {
    Resolved(T),
    NotApplicable,
}

pub type ResolveResult<T> = Result<Resolution<T>, EvaluationErrorKind>;

/// A property bound to one target type.
pub trait ResolvedProperty: Send + Sync + Debug {
    fn read(&self, target: &Value) -> Result<Value, EvaluationErrorKind>;

    fn write(&self, target: &Value, value: Value) -> Result<(), EvaluationErrorKind>;

    fn is_writable(&self) -> bool;

    /// Declared type of the property, when the accessor knows it.
    fn value_type(&self) -> Option<TypeHandle>;

    /// Whether compiled code may call this accessor directly.
    fn is_compilable(&self) -> bool {
        true
    }
}

pub trait PropertyAccessor: Send + Sync {
    fn resolve_read(&self, context: &EvaluationContext, target: &Value, name: &str) -> ResolveResult<Arc<dyn ResolvedProperty>>;

    fn resolve_write(&self, context: &EvaluationContext, target: &Value, name: &str) -> ResolveResult<Arc<dyn ResolvedProperty>> {
        let _ = (context, target, name);
        Ok(Resolution::NotApplicable)
    }
}

/// A method bound to one target type and argument type list, with its
/// argument conversion plan.
pub trait MethodExecutor: Send + Sync + Debug {
    fn execute(&self, context: &EvaluationContext, target: &Value, args: Vec<Value>) -> Result<Value, EvaluationErrorKind>;

    fn return_type(&self) -> Option<TypeHandle>;

    fn is_compilable(&self) -> bool {
        true
    }
}

pub trait MethodResolver: Send + Sync {
    fn resolve(&self, context: &EvaluationContext, target: &Value, name: &str, args: &[Value]) -> ResolveResult<Arc<dyn MethodExecutor>>;
}

pub trait ConstructorExecutor: Send + Sync + Debug {
    fn execute(&self, context: &EvaluationContext, args: Vec<Value>) -> Result<Value, EvaluationErrorKind>;

    fn constructed_type(&self) -> TypeHandle;

    fn is_compilable(&self) -> bool {
        true
    }
}

pub trait ConstructorResolver: Send + Sync {
    fn resolve(&self, context: &EvaluationContext, type_handle: &TypeHandle, args: &[Value]) -> ResolveResult<Arc<dyn ConstructorExecutor>>;
}

static REFLECTIVE_PROPERTIES: LazyLock<Arc<dyn PropertyAccessor>> = LazyLock::new(|| Arc::new(ReflectivePropertyAccessor));
static MAP_PROPERTIES: LazyLock<Arc<dyn PropertyAccessor>> = LazyLock::new(|| Arc::new(MapPropertyResolver));
static REFLECTIVE_METHODS: LazyLock<Arc<dyn MethodResolver>> = LazyLock::new(|| Arc::new(ReflectiveMethodResolver));
static REFLECTIVE_CONSTRUCTORS: LazyLock<Arc<dyn ConstructorResolver>> = LazyLock::new(|| Arc::new(ReflectiveConstructorResolver));

/// Shared instances, so contexts built with defaults have equal fingerprints.
pub fn reflective_property_accessor() -> Arc<dyn PropertyAccessor> {
    REFLECTIVE_PROPERTIES.clone()
}

pub fn map_property_resolver() -> Arc<dyn PropertyAccessor> {
    MAP_PROPERTIES.clone()
}

pub fn reflective_method_resolver() -> Arc<dyn MethodResolver> {
    REFLECTIVE_METHODS.clone()
}

pub fn reflective_constructor_resolver() -> Arc<dyn ConstructorResolver> {
    REFLECTIVE_CONSTRUCTORS.clone()
}
