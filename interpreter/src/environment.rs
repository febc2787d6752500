use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use tracing::trace;
use crate::conversion::{ConversionService, DefaultConversionService};
use crate::error::{AccessError, ConversionError, EvaluationErrorKind, MemberKind, TypeNotFoundError};
use crate::object::Value;
use crate::overload::Signature;
use crate::resolver::{
    self, ConstructorExecutor, ConstructorResolver, MethodExecutor, MethodResolver, PropertyAccessor, Resolution,
    ResolveResult, ResolvedProperty,
};
use crate::type_locator::{StandardTypeLocator, TypeLocator};
use crate::types::{array_of, NativeResult, TypeHandle};

pub type FunctionInvoker = Arc<dyn Fn(&[Value]) -> NativeResult + Send + Sync>;

/// A host function callable as `#name(args)`.
pub struct Function {
    name: String,
    signature: Signature,
    return_type: TypeHandle,
    invoker: FunctionInvoker,
}

impl Function {
    pub fn new<F>(name: impl Into<String>, parameter_types: Vec<TypeHandle>, return_type: TypeHandle, invoker: F) -> Self
    where
        F: Fn(&[Value]) -> NativeResult + Send + Sync + 'static,
    {
        Function {
            name: name.into(),
            signature: Signature::new(parameter_types, false),
            return_type,
            invoker: Arc::new(invoker),
        }
    }

    /// Trailing arguments of `component` type are passed packed in one array.
    pub fn varargs<F>(
        name: impl Into<String>,
        mut parameter_types: Vec<TypeHandle>,
        component: TypeHandle,
        return_type: TypeHandle,
        invoker: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> NativeResult + Send + Sync + 'static,
    {
        parameter_types.push(array_of(&component));
        Function {
            name: name.into(),
            signature: Signature::new(parameter_types, true),
            return_type,
            invoker: Arc::new(invoker),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn return_type(&self) -> &TypeHandle {
        &self.return_type
    }

    pub fn invoke(&self, args: &[Value]) -> NativeResult {
        (self.invoker)(args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("return_type", &self.return_type.name())
            .finish()
    }
}

/// Looks up `@name` references.
pub trait BeanResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Value>;
}

impl BeanResolver for HashMap<String, Value> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Everything an expression is evaluated against: the root object, variables,
/// functions, and the collaborators that resolve members, convert values and
/// locate types.
pub struct EvaluationContext {
    root: Value,
    variables: RwLock<HashMap<String, Value>>,
    functions: HashMap<String, Arc<Function>>,
    property_accessors: Vec<Arc<dyn PropertyAccessor>>,
    method_resolvers: Vec<Arc<dyn MethodResolver>>,
    constructor_resolvers: Vec<Arc<dyn ConstructorResolver>>,
    conversion: Arc<dyn ConversionService>,
    type_locator: Arc<dyn TypeLocator>,
    bean_resolver: Option<Arc<dyn BeanResolver>>,
    fingerprint: u64,
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("root", &self.root)
            .field("variables", &self.variables.read().keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

fn walk_chain<R, T>(resolvers: &[Arc<R>], mut attempt: impl FnMut(&R) -> ResolveResult<T>) -> Result<Option<T>, EvaluationErrorKind>
where
    R: ?Sized,
{
    for resolver in resolvers {
        match attempt(resolver.as_ref())? {
            Resolution::Resolved(found) => return Ok(Some(found)),
            Resolution::NotApplicable => continue,
        }
    }
    Ok(None)
}

static NEXT_REGISTRATION: AtomicU64 = AtomicU64::new(1);

/// Process-unique id for a host-registered resolver or converter. Unlike an
/// address, it is never handed out twice.
pub(crate) fn registration_id() -> u64 {
    NEXT_REGISTRATION.fetch_add(1, Ordering::Relaxed)
}

impl EvaluationContext {
    /// A context with default collaborators and no variables.
    pub fn new(root: Value) -> Self {
        ContextBuilder::new().root(root).build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn variable(&self, name: &str) -> Option<Value> {
        self.variables.read().get(name).cloned()
    }

    pub fn set_variable(&self, name: impl Into<String>, value: Value) {
        self.variables.write().insert(name.into(), value);
    }

    pub fn function(&self, name: &str) -> Option<Arc<Function>> {
        self.functions.get(name).cloned()
    }

    pub fn conversion_service(&self) -> &dyn ConversionService {
        self.conversion.as_ref()
    }

    pub fn type_locator(&self) -> &dyn TypeLocator {
        self.type_locator.as_ref()
    }

    pub fn find_type(&self, name: &str) -> Result<TypeHandle, TypeNotFoundError> {
        self.type_locator.find_type(name)
    }

    pub fn convert(&self, value: Value, to: &TypeHandle) -> Result<Value, ConversionError> {
        self.conversion.convert(value, to)
    }

    pub fn bean(&self, name: &str) -> Result<Value, AccessError> {
        let resolver = self.bean_resolver.as_ref().ok_or_else(|| AccessError::NoBeanResolver(name.to_string()))?;
        resolver
            .resolve(name)
            .ok_or_else(|| AccessError::not_found("BeanResolver", name, MemberKind::Bean))
    }

    /// Identifies the resolver chain, conversion service and type locator.
    /// Cached resolutions are reused only under an equal fingerprint.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn resolve_property_read(&self, target: &Value, name: &str) -> Result<Arc<dyn ResolvedProperty>, EvaluationErrorKind> {
        trace!(property = name, target = %target.type_name(), "resolving property read");
        walk_chain(&self.property_accessors, |accessor| accessor.resolve_read(self, target, name))?
            .ok_or_else(|| AccessError::not_found(target.type_name(), name, MemberKind::Property).into())
    }

    pub fn resolve_property_write(&self, target: &Value, name: &str) -> Result<Arc<dyn ResolvedProperty>, EvaluationErrorKind> {
        trace!(property = name, target = %target.type_name(), "resolving property write");
        walk_chain(&self.property_accessors, |accessor| accessor.resolve_write(self, target, name))?
            .ok_or_else(|| AccessError::not_found(target.type_name(), name, MemberKind::Property).into())
    }

    pub fn resolve_method(&self, target: &Value, name: &str, args: &[Value]) -> Result<Arc<dyn MethodExecutor>, EvaluationErrorKind> {
        trace!(method = name, target = %target.type_name(), "resolving method");
        walk_chain(&self.method_resolvers, |resolver| resolver.resolve(self, target, name, args))?
            .ok_or_else(|| AccessError::not_found(target.type_name(), name, MemberKind::Method).into())
    }

    pub fn resolve_constructor(&self, type_handle: &TypeHandle, args: &[Value]) -> Result<Arc<dyn ConstructorExecutor>, EvaluationErrorKind> {
        trace!(constructor = type_handle.name(), "resolving constructor");
        walk_chain(&self.constructor_resolvers, |resolver| resolver.resolve(self, type_handle, args))?
            .ok_or_else(|| AccessError::not_found(type_handle.name(), type_handle.name(), MemberKind::Constructor).into())
    }
}

/// Assembles an `EvaluationContext`. Resolvers registered here are asked
/// before the built-in reflective ones.
#[derive(Default)]
pub struct ContextBuilder {
    root: Value,
    variables: HashMap<String, Value>,
    functions: HashMap<String, Arc<Function>>,
    property_accessors: Vec<Arc<dyn PropertyAccessor>>,
    method_resolvers: Vec<Arc<dyn MethodResolver>>,
    constructor_resolvers: Vec<Arc<dyn ConstructorResolver>>,
    registrations: Vec<u64>,
    map_property_access: bool,
    converters: Option<DefaultConversionService>,
    conversion_service: Option<Arc<dyn ConversionService>>,
    locator: Option<StandardTypeLocator>,
    type_locator: Option<Arc<dyn TypeLocator>>,
    bean_resolver: Option<Arc<dyn BeanResolver>>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, root: Value) -> Self {
        self.root = root;
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn function(mut self, function: Function) -> Self {
        self.functions.insert(function.name().to_string(), Arc::new(function));
        self
    }

    pub fn property_accessor(mut self, accessor: Arc<dyn PropertyAccessor>) -> Self {
        self.property_accessors.push(accessor);
        self.registrations.push(registration_id());
        self
    }

    pub fn method_resolver(mut self, resolver: Arc<dyn MethodResolver>) -> Self {
        self.method_resolvers.push(resolver);
        self.registrations.push(registration_id());
        self
    }

    pub fn constructor_resolver(mut self, resolver: Arc<dyn ConstructorResolver>) -> Self {
        self.constructor_resolvers.push(resolver);
        self.registrations.push(registration_id());
        self
    }

    /// Expose map keys as properties, after custom accessors and before
    /// reflective ones.
    pub fn map_property_access(mut self) -> Self {
        self.map_property_access = true;
        self
    }

    /// Register a converter on the default conversion service.
    pub fn conversion<F>(mut self, from: &TypeHandle, to: &TypeHandle, converter: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.converters.get_or_insert_with(DefaultConversionService::new).add_converter(from, to, converter);
        self
    }

    /// Replace the conversion service entirely. Converters registered with
    /// `conversion` are then ignored.
    pub fn conversion_service(mut self, service: Arc<dyn ConversionService>) -> Self {
        self.conversion_service = Some(service);
        self
    }

    /// Replace the type locator entirely. Types registered with `register_type`
    /// or `import` are then ignored.
    pub fn type_locator(mut self, locator: Arc<dyn TypeLocator>) -> Self {
        self.type_locator = Some(locator);
        self
    }

    pub fn register_type(mut self, type_handle: TypeHandle) -> Self {
        self.locator.get_or_insert_with(StandardTypeLocator::new).register(type_handle);
        self
    }

    pub fn register_type_as(mut self, name: impl Into<String>, type_handle: TypeHandle) -> Self {
        self.locator.get_or_insert_with(StandardTypeLocator::new).register_as(name, type_handle);
        self
    }

    pub fn import(mut self, prefix: impl Into<String>) -> Self {
        self.locator.get_or_insert_with(StandardTypeLocator::new).import(prefix);
        self
    }

    pub fn bean_resolver(mut self, resolver: Arc<dyn BeanResolver>) -> Self {
        self.bean_resolver = Some(resolver);
        self
    }

    pub fn build(self) -> EvaluationContext {
        let mut property_accessors = self.property_accessors;
        if self.map_property_access {
            property_accessors.push(resolver::map_property_resolver());
        }
        property_accessors.push(resolver::reflective_property_accessor());
        let mut method_resolvers = self.method_resolvers;
        method_resolvers.push(resolver::reflective_method_resolver());
        let mut constructor_resolvers = self.constructor_resolvers;
        constructor_resolvers.push(resolver::reflective_constructor_resolver());

        let conversion: Arc<dyn ConversionService> = match (self.conversion_service, self.converters) {
            (Some(service), _) => service,
            (None, Some(converters)) => Arc::new(converters),
            (None, None) => DefaultConversionService::shared(),
        };
        let type_locator: Arc<dyn TypeLocator> = match (self.type_locator, self.locator) {
            (Some(locator), _) => locator,
            (None, Some(locator)) => Arc::new(locator),
            (None, None) => StandardTypeLocator::shared(),
        };

        let mut hasher = DefaultHasher::new();
        self.registrations.hash(&mut hasher);
        self.map_property_access.hash(&mut hasher);
        conversion.fingerprint().hash(&mut hasher);
        type_locator.fingerprint().hash(&mut hasher);

        EvaluationContext {
            root: self.root,
            variables: RwLock::new(self.variables),
            functions: self.functions,
            property_accessors,
            method_resolvers,
            constructor_resolvers,
            conversion,
            type_locator,
            bean_resolver: self.bean_resolver,
            fingerprint: hasher.finish(),
        }
    }
}
