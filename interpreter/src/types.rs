use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use parking_lot::Mutex;
use crate::descriptor::ScalarKind;
use crate::error::{AccessError, EvaluationErrorKind};
use crate::object::Value;

pub type TypeHandle = Arc<TypeDescriptor>;

pub type NativeResult = Result<Value, EvaluationErrorKind>;
pub type Getter = Arc<dyn Fn(&Value) -> NativeResult + Send + Sync>;
pub type Setter = Arc<dyn Fn(&Value, Value) -> Result<(), EvaluationErrorKind> + Send + Sync>;
pub type Invoker = Arc<dyn Fn(&Value, &[Value]) -> NativeResult + Send + Sync>;
pub type Factory = Arc<dyn Fn(&[Value]) -> NativeResult + Send + Sync>;

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Null,
    Primitive(ScalarKind),
    Boxed(ScalarKind),
    Number,
    Object,
    String,
    List,
    Map,
    MapEntry,
    Array,
    Class,
    Type,
}

/// A member signature slot. `Declaring` stands for the type that declares the
/// member, which does not exist yet while its builder runs.
#[derive(Clone)]
pub enum TypeRef {
    Declaring,
    Of(TypeHandle),
}

impl TypeRef {
    pub fn resolve(&self, declaring: &TypeHandle) -> TypeHandle {
        match self {
            TypeRef::Declaring => declaring.clone(),
            TypeRef::Of(t) => t.clone(),
        }
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeRef::Declaring, TypeRef::Declaring) => true,
            (TypeRef::Of(a), TypeRef::Of(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<TypeHandle> for TypeRef {
    fn from(t: TypeHandle) -> Self {
        TypeRef::Of(t)
    }
}

impl From<&TypeHandle> for TypeRef {
    fn from(t: &TypeHandle) -> Self {
        TypeRef::Of(t.clone())
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Declaring => f.write_str("<declaring>"),
            TypeRef::Of(t) => f.write_str(t.name()),
        }
    }
}

#[derive(Clone)]
pub struct PropertyDescriptor {
    pub name: String,
    pub property_type: TypeRef,
    pub getter: Getter,
    pub setter: Option<Setter>,
    pub is_static: bool,
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("property_type", &self.property_type)
            .field("writable", &self.setter.is_some())
            .field("is_static", &self.is_static)
            .finish()
    }
}

#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub parameter_types: Vec<TypeRef>,
    /// The last parameter is an array type collecting trailing arguments.
    pub varargs: bool,
    pub return_type: TypeRef,
    pub is_static: bool,
    pub invoker: Invoker,
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("parameter_types", &self.parameter_types)
            .field("varargs", &self.varargs)
            .field("return_type", &self.return_type)
            .field("is_static", &self.is_static)
            .finish()
    }
}

#[derive(Clone)]
pub struct ConstructorDescriptor {
    pub parameter_types: Vec<TypeRef>,
    pub varargs: bool,
    pub factory: Factory,
}

impl fmt::Debug for ConstructorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDescriptor")
            .field("parameter_types", &self.parameter_types)
            .field("varargs", &self.varargs)
            .finish()
    }
}

/// Runtime type. Identity is reference identity; two descriptors with the
/// same name are still different types.
pub struct TypeDescriptor {
    id: u64,
    name: String,
    kind: TypeKind,
    supertypes: Vec<TypeHandle>,
    element_type: Option<TypeHandle>,
    properties: Vec<PropertyDescriptor>,
    methods: Vec<MethodDescriptor>,
    constructors: Vec<ConstructorDescriptor>,
}

impl TypeDescriptor {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn supertypes(&self) -> &[TypeHandle] {
        &self.supertypes
    }

    /// Component type of an array type.
    pub fn element_type(&self) -> Option<&TypeHandle> {
        self.element_type.as_ref()
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        &self.constructors
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(_))
    }

    /// Scalar kind of a primitive or its boxed counterpart.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self.kind {
            TypeKind::Primitive(kind) | TypeKind::Boxed(kind) => Some(kind),
            _ => None,
        }
    }

    /// Number of supertype edges from `self` up to `target`, if reachable.
    pub fn distance_to(&self, target: &TypeDescriptor) -> Option<u32> {
        if std::ptr::eq(self, target) {
            return Some(0);
        }
        self.supertypes
            .iter()
            .filter_map(|s| s.distance_to(target))
            .min()
            .map(|d| d + 1)
    }

    pub fn is_assignable_to(&self, target: &TypeDescriptor) -> bool {
        self.distance_to(target).is_some()
    }

    /// Property lookup through the supertype chain.
    pub fn find_property(&self, name: &str, is_static: bool) -> Option<&PropertyDescriptor> {
        self.properties
            .iter()
            .find(|p| p.name == name && p.is_static == is_static)
            .or_else(|| self.supertypes.iter().find_map(|s| s.find_property(name, is_static)))
    }

    /// Methods named `name`, own declarations first. A supertype method with the
    /// same parameter list as an already collected one is overridden and skipped.
    pub fn collect_methods<'a>(&'a self, name: &str, is_static: bool, out: &mut Vec<&'a MethodDescriptor>) {
        for method in self.methods.iter().filter(|m| m.name == name && m.is_static == is_static) {
            if !out.iter().any(|m| m.parameter_types == method.parameter_types) {
                out.push(method);
            }
        }
        for supertype in &self.supertypes {
            supertype.collect_methods(name, is_static, out);
        }
    }

    pub fn has_method_named(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m.name == name) || self.supertypes.iter().any(|s| s.has_method_named(name))
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

static ARRAY_TYPES: LazyLock<Mutex<HashMap<u64, TypeHandle>>> = LazyLock::new(|| Mutex::new(HashMap::new()));

/// The array type over `element`; one handle per element type.
pub fn array_of(element: &TypeHandle) -> TypeHandle {
    let mut types = ARRAY_TYPES.lock();
    types
        .entry(element.id())
        .or_insert_with(|| {
            TypeBuilder::with_kind(format!("{}[]", element.name()), TypeKind::Array)
                .element(element.clone())
                .property("length", builtin::int(), |target| match target {
                    Value::Array(array) => Ok(Value::Int(array.len() as i32)),
                    other => Err(receiver_error("length", other)),
                })
                .build()
        })
        .clone()
}

/// Assembles a `TypeDescriptor`. Hosts use it to expose their own classes.
pub struct TypeBuilder {
    name: String,
    kind: TypeKind,
    supertypes: Vec<TypeHandle>,
    element_type: Option<TypeHandle>,
    properties: Vec<PropertyDescriptor>,
    methods: Vec<MethodDescriptor>,
    constructors: Vec<ConstructorDescriptor>,
}

impl TypeBuilder {
    pub fn class(name: impl Into<String>) -> Self {
        Self::with_kind(name, TypeKind::Class)
    }

    pub fn with_kind(name: impl Into<String>, kind: TypeKind) -> Self {
        TypeBuilder {
            name: name.into(),
            kind,
            supertypes: Vec::new(),
            element_type: None,
            properties: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
        }
    }

    pub fn extends(mut self, supertype: &TypeHandle) -> Self {
        self.supertypes.push(supertype.clone());
        self
    }

    fn element(mut self, element: TypeHandle) -> Self {
        self.element_type = Some(element);
        self
    }

    /// An instance field stored on `Instance`, readable and writable.
    pub fn field(mut self, name: &str, field_type: impl Into<TypeRef>) -> Self {
        let getter_name = name.to_string();
        let setter_name = name.to_string();
        self.properties.push(PropertyDescriptor {
            name: name.to_string(),
            property_type: field_type.into(),
            getter: Arc::new(move |target| read_field(target, &getter_name)),
            setter: Some(Arc::new(move |target, value| match target {
                Value::Object(instance) => {
                    instance.set_field(&setter_name, value);
                    Ok(())
                }
                other => Err(receiver_error(&setter_name, other)),
            })),
            is_static: false,
        });
        self
    }

    /// An instance field that expressions may read but not assign.
    pub fn readonly_field(mut self, name: &str, field_type: impl Into<TypeRef>) -> Self {
        let getter_name = name.to_string();
        self.properties.push(PropertyDescriptor {
            name: name.to_string(),
            property_type: field_type.into(),
            getter: Arc::new(move |target| read_field(target, &getter_name)),
            setter: None,
            is_static: false,
        });
        self
    }

    pub fn property<F>(mut self, name: &str, property_type: impl Into<TypeRef>, getter: F) -> Self
    where
        F: Fn(&Value) -> NativeResult + Send + Sync + 'static,
    {
        self.properties.push(PropertyDescriptor {
            name: name.to_string(),
            property_type: property_type.into(),
            getter: Arc::new(getter),
            setter: None,
            is_static: false,
        });
        self
    }

    pub fn writable_property<F, S>(mut self, name: &str, property_type: impl Into<TypeRef>, getter: F, setter: S) -> Self
    where
        F: Fn(&Value) -> NativeResult + Send + Sync + 'static,
        S: Fn(&Value, Value) -> Result<(), EvaluationErrorKind> + Send + Sync + 'static,
    {
        self.properties.push(PropertyDescriptor {
            name: name.to_string(),
            property_type: property_type.into(),
            getter: Arc::new(getter),
            setter: Some(Arc::new(setter)),
            is_static: false,
        });
        self
    }

    pub fn static_property<F>(mut self, name: &str, property_type: impl Into<TypeRef>, getter: F) -> Self
    where
        F: Fn() -> NativeResult + Send + Sync + 'static,
    {
        self.properties.push(PropertyDescriptor {
            name: name.to_string(),
            property_type: property_type.into(),
            getter: Arc::new(move |_| getter()),
            setter: None,
            is_static: true,
        });
        self
    }

    pub fn method<F>(self, name: &str, parameter_types: Vec<TypeRef>, return_type: impl Into<TypeRef>, invoker: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> NativeResult + Send + Sync + 'static,
    {
        self.push_method(name, parameter_types, false, return_type.into(), false, Arc::new(invoker))
    }

    /// A method whose last parameter type is an array collecting the trailing arguments.
    pub fn varargs_method<F>(self, name: &str, parameter_types: Vec<TypeRef>, return_type: impl Into<TypeRef>, invoker: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> NativeResult + Send + Sync + 'static,
    {
        self.push_method(name, parameter_types, true, return_type.into(), false, Arc::new(invoker))
    }

    pub fn static_method<F>(self, name: &str, parameter_types: Vec<TypeRef>, return_type: impl Into<TypeRef>, invoker: F) -> Self
    where
        F: Fn(&[Value]) -> NativeResult + Send + Sync + 'static,
    {
        let invoker: Invoker = Arc::new(move |_, args| invoker(args));
        self.push_method(name, parameter_types, false, return_type.into(), true, invoker)
    }

    fn push_method(
        mut self,
        name: &str,
        parameter_types: Vec<TypeRef>,
        varargs: bool,
        return_type: TypeRef,
        is_static: bool,
        invoker: Invoker,
    ) -> Self {
        self.methods.push(MethodDescriptor {
            name: name.to_string(),
            parameter_types,
            varargs,
            return_type,
            is_static,
            invoker,
        });
        self
    }

    pub fn constructor<F>(mut self, parameter_types: Vec<TypeRef>, factory: F) -> Self
    where
        F: Fn(&[Value]) -> NativeResult + Send + Sync + 'static,
    {
        self.constructors.push(ConstructorDescriptor { parameter_types, varargs: false, factory: Arc::new(factory) });
        self
    }

    pub fn varargs_constructor<F>(mut self, parameter_types: Vec<TypeRef>, factory: F) -> Self
    where
        F: Fn(&[Value]) -> NativeResult + Send + Sync + 'static,
    {
        self.constructors.push(ConstructorDescriptor { parameter_types, varargs: true, factory: Arc::new(factory) });
        self
    }

    pub fn build(mut self) -> TypeHandle {
        let is_root = matches!(self.kind, TypeKind::Object | TypeKind::Primitive(_) | TypeKind::Null);
        if self.supertypes.is_empty() && !is_root {
            self.supertypes.push(builtin::object());
        }
        Arc::new(TypeDescriptor {
            id: NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            kind: self.kind,
            supertypes: self.supertypes,
            element_type: self.element_type,
            properties: self.properties,
            methods: self.methods,
            constructors: self.constructors,
        })
    }
}

fn read_field(target: &Value, name: &str) -> NativeResult {
    match target {
        Value::Object(instance) => Ok(instance.get_field(name).unwrap_or(Value::Null)),
        other => Err(receiver_error(name, other)),
    }
}

pub(crate) fn receiver_error(member: &str, target: &Value) -> EvaluationErrorKind {
    AccessError::invocation(member, format!("unexpected receiver of type {}", target.type_name())).into()
}

pub(crate) fn argument_error(member: &str, index: usize, args: &[Value]) -> EvaluationErrorKind {
    let found = args.get(index).map(|a| a.type_name()).unwrap_or_else(|| "nothing".to_string());
    AccessError::invocation(member, format!("unexpected argument {index} of type {found}")).into()
}

fn arg_int(member: &str, args: &[Value], index: usize) -> Result<i32, EvaluationErrorKind> {
    match args.get(index) {
        Some(Value::Int(v)) => Ok(*v),
        _ => Err(argument_error(member, index, args)),
    }
}

fn arg_str<'v>(member: &str, args: &'v [Value], index: usize) -> Result<&'v str, EvaluationErrorKind> {
    args.get(index).and_then(Value::as_str).ok_or_else(|| argument_error(member, index, args))
}

fn char_index_error(index: i32, size: usize) -> EvaluationErrorKind {
    AccessError::IndexOutOfBounds { target_type: "String".to_string(), index: i64::from(index), size }.into()
}

/// Built-in type handles. Each is created once per process.
pub mod builtin {
    use super::*;
    use crate::conversion::cast_number;

    macro_rules! builtin_type {
        ($fn_name:ident, $static_name:ident, $init:expr) => {
            static $static_name: LazyLock<TypeHandle> = LazyLock::new(|| $init);
            pub fn $fn_name() -> TypeHandle {
                $static_name.clone()
            }
        };
    }

    // Object is the root every other built-in refers to, so it declares nothing
    // that names another type.
    builtin_type!(object, OBJECT, TypeBuilder::with_kind("Object", TypeKind::Object)
        .constructor(vec![], |_| Ok(Value::object(&object(), Vec::<(String, Value)>::new())))
        .build());

    builtin_type!(null, NULL, TypeBuilder::with_kind("null", TypeKind::Null).build());

    builtin_type!(boolean, BOOLEAN, TypeBuilder::with_kind("boolean", TypeKind::Primitive(ScalarKind::Boolean)).build());
    builtin_type!(int, INT, TypeBuilder::with_kind("int", TypeKind::Primitive(ScalarKind::Int)).build());
    builtin_type!(long, LONG, TypeBuilder::with_kind("long", TypeKind::Primitive(ScalarKind::Long)).build());
    builtin_type!(float, FLOAT, TypeBuilder::with_kind("float", TypeKind::Primitive(ScalarKind::Float)).build());
    builtin_type!(double, DOUBLE, TypeBuilder::with_kind("double", TypeKind::Primitive(ScalarKind::Double)).build());

    builtin_type!(number, NUMBER, TypeBuilder::with_kind("Number", TypeKind::Number)
        .method("intValue", vec![], int(), |target, _| number_as(target, ScalarKind::Int, "intValue"))
        .method("longValue", vec![], long(), |target, _| number_as(target, ScalarKind::Long, "longValue"))
        .method("floatValue", vec![], float(), |target, _| number_as(target, ScalarKind::Float, "floatValue"))
        .method("doubleValue", vec![], double(), |target, _| number_as(target, ScalarKind::Double, "doubleValue"))
        .build());

    builtin_type!(boolean_boxed, BOOLEAN_BOXED, TypeBuilder::with_kind("Boolean", TypeKind::Boxed(ScalarKind::Boolean)).build());

    builtin_type!(integer, INTEGER, TypeBuilder::with_kind("Integer", TypeKind::Boxed(ScalarKind::Int))
        .extends(&number())
        .static_property("MAX_VALUE", int(), || Ok(Value::Int(i32::MAX)))
        .static_property("MIN_VALUE", int(), || Ok(Value::Int(i32::MIN)))
        .static_method("parseInt", vec![string().into()], int(), |args| {
            let text = arg_str("parseInt", args, 0)?;
            text.trim()
                .parse::<i32>()
                .map(Value::Int)
                .map_err(|e| crate::error::ConversionError::failed(text, "int", e.to_string()).into())
        })
        .build());

    builtin_type!(long_boxed, LONG_BOXED, TypeBuilder::with_kind("Long", TypeKind::Boxed(ScalarKind::Long))
        .extends(&number())
        .static_property("MAX_VALUE", long(), || Ok(Value::Long(i64::MAX)))
        .static_property("MIN_VALUE", long(), || Ok(Value::Long(i64::MIN)))
        .build());

    builtin_type!(float_boxed, FLOAT_BOXED, TypeBuilder::with_kind("Float", TypeKind::Boxed(ScalarKind::Float))
        .extends(&number())
        .build());

    builtin_type!(double_boxed, DOUBLE_BOXED, TypeBuilder::with_kind("Double", TypeKind::Boxed(ScalarKind::Double))
        .extends(&number())
        .build());

    builtin_type!(string, STRING, string_type());

    builtin_type!(list, LIST, TypeBuilder::with_kind("List", TypeKind::List)
        .method("size", vec![], int(), |target, _| match target {
            Value::List(list) => Ok(Value::Int(list.len() as i32)),
            other => Err(receiver_error("size", other)),
        })
        .method("isEmpty", vec![], boolean(), |target, _| match target {
            Value::List(list) => Ok(Value::Bool(list.is_empty())),
            other => Err(receiver_error("isEmpty", other)),
        })
        .method("get", vec![int().into()], object(), |target, args| match target {
            Value::List(list) => {
                let index = arg_int("get", args, 0)?;
                usize::try_from(index).ok().and_then(|i| list.get(i)).ok_or_else(|| {
                    AccessError::IndexOutOfBounds {
                        target_type: "List".to_string(),
                        index: i64::from(index),
                        size: list.len(),
                    }
                    .into()
                })
            }
            other => Err(receiver_error("get", other)),
        })
        .method("contains", vec![object().into()], boolean(), |target, args| match target {
            Value::List(list) => Ok(Value::Bool(args.first().is_some_and(|v| list.contains(v)))),
            other => Err(receiver_error("contains", other)),
        })
        .method("add", vec![object().into()], boolean(), |target, args| match target {
            Value::List(list) => {
                list.push(args.first().cloned().unwrap_or(Value::Null))?;
                Ok(Value::Bool(true))
            }
            other => Err(receiver_error("add", other)),
        })
        .build());

    builtin_type!(map, MAP, TypeBuilder::with_kind("Map", TypeKind::Map)
        .method("size", vec![], int(), |target, _| match target {
            Value::Map(map) => Ok(Value::Int(map.len() as i32)),
            other => Err(receiver_error("size", other)),
        })
        .method("isEmpty", vec![], boolean(), |target, _| match target {
            Value::Map(map) => Ok(Value::Bool(map.is_empty())),
            other => Err(receiver_error("isEmpty", other)),
        })
        .method("get", vec![object().into()], object(), |target, args| match target {
            Value::Map(map) => Ok(args.first().and_then(|k| map.get(k)).unwrap_or(Value::Null)),
            other => Err(receiver_error("get", other)),
        })
        .method("containsKey", vec![object().into()], boolean(), |target, args| match target {
            Value::Map(map) => Ok(Value::Bool(args.first().is_some_and(|k| map.contains_key(k)))),
            other => Err(receiver_error("containsKey", other)),
        })
        .method("keys", vec![], list(), |target, _| match target {
            Value::Map(map) => Ok(Value::list(map.snapshot().into_iter().map(|(k, _)| k).collect())),
            other => Err(receiver_error("keys", other)),
        })
        .method("values", vec![], list(), |target, _| match target {
            Value::Map(map) => Ok(Value::list(map.snapshot().into_iter().map(|(_, v)| v).collect())),
            other => Err(receiver_error("values", other)),
        })
        .method("put", vec![object().into(), object().into()], object(), |target, args| match target {
            Value::Map(map) => {
                let key = args.first().cloned().unwrap_or(Value::Null);
                let value = args.get(1).cloned().unwrap_or(Value::Null);
                Ok(map.insert(key, value)?.unwrap_or(Value::Null))
            }
            other => Err(receiver_error("put", other)),
        })
        .build());

    builtin_type!(map_entry, MAP_ENTRY, TypeBuilder::with_kind("MapEntry", TypeKind::MapEntry)
        .readonly_field("key", object())
        .readonly_field("value", object())
        .build());

    builtin_type!(type_type, TYPE, TypeBuilder::with_kind("Type", TypeKind::Type)
        .property("name", string(), |target| match target {
            Value::Type(t) => Ok(Value::from(t.name())),
            other => Err(receiver_error("name", other)),
        })
        .method("getName", vec![], string(), |target, _| match target {
            Value::Type(t) => Ok(Value::from(t.name())),
            other => Err(receiver_error("getName", other)),
        })
        .build());

    pub fn primitive(kind: ScalarKind) -> TypeHandle {
        match kind {
            ScalarKind::Boolean => boolean(),
            ScalarKind::Int => int(),
            ScalarKind::Long => long(),
            ScalarKind::Float => float(),
            ScalarKind::Double => double(),
        }
    }

    pub fn boxed(kind: ScalarKind) -> TypeHandle {
        match kind {
            ScalarKind::Boolean => boolean_boxed(),
            ScalarKind::Int => integer(),
            ScalarKind::Long => long_boxed(),
            ScalarKind::Float => float_boxed(),
            ScalarKind::Double => double_boxed(),
        }
    }

    /// Every named built-in, for type locators.
    pub fn all() -> Vec<TypeHandle> {
        vec![
            object(), boolean(), int(), long(), float(), double(), number(), boolean_boxed(), integer(),
            long_boxed(), float_boxed(), double_boxed(), string(), list(), map(), map_entry(), type_type(),
        ]
    }

    fn number_as(target: &Value, kind: ScalarKind, member: &str) -> NativeResult {
        cast_number(target, kind).ok_or_else(|| receiver_error(member, target))
    }

    fn receiver_chars(target: &Value, member: &str) -> Result<Vec<char>, EvaluationErrorKind> {
        target.as_str().map(|s| s.chars().collect()).ok_or_else(|| receiver_error(member, target))
    }

    fn string_method<F>(builder: TypeBuilder, name: &str, params: Vec<TypeRef>, ret: impl Into<TypeRef>, f: F) -> TypeBuilder
    where
        F: Fn(&str, &[Value]) -> NativeResult + Send + Sync + 'static,
    {
        let member = name.to_string();
        builder.method(name, params, ret, move |target, args| match target.as_str() {
            Some(s) => f(s, args),
            None => Err(receiver_error(&member, target)),
        })
    }

    fn string_type() -> TypeHandle {
        let builder = TypeBuilder::with_kind("String", TypeKind::String)
            .constructor(vec![], |_| Ok(Value::from(String::new())))
            .constructor(vec![TypeRef::Declaring], |args| {
                Ok(Value::from(arg_str("String", args, 0)?.to_string()))
            });
        let builder = string_method(builder, "length", vec![], int(), |s, _| Ok(Value::Int(s.chars().count() as i32)));
        let builder = string_method(builder, "isEmpty", vec![], boolean(), |s, _| Ok(Value::Bool(s.is_empty())));
        let builder = string_method(builder, "toUpperCase", vec![], TypeRef::Declaring, |s, _| Ok(Value::from(s.to_uppercase())));
        let builder = string_method(builder, "toLowerCase", vec![], TypeRef::Declaring, |s, _| Ok(Value::from(s.to_lowercase())));
        let builder = string_method(builder, "trim", vec![], TypeRef::Declaring, |s, _| Ok(Value::from(s.trim())));
        let builder = string_method(builder, "contains", vec![TypeRef::Declaring], boolean(), |s, args| {
            Ok(Value::Bool(s.contains(arg_str("contains", args, 0)?)))
        });
        let builder = string_method(builder, "startsWith", vec![TypeRef::Declaring], boolean(), |s, args| {
            Ok(Value::Bool(s.starts_with(arg_str("startsWith", args, 0)?)))
        });
        let builder = string_method(builder, "endsWith", vec![TypeRef::Declaring], boolean(), |s, args| {
            Ok(Value::Bool(s.ends_with(arg_str("endsWith", args, 0)?)))
        });
        let builder = string_method(builder, "indexOf", vec![TypeRef::Declaring], int(), |s, args| {
            let needle = arg_str("indexOf", args, 0)?;
            Ok(Value::Int(s.find(needle).map(|byte| s[..byte].chars().count() as i32).unwrap_or(-1)))
        });
        let builder = string_method(builder, "concat", vec![TypeRef::Declaring], TypeRef::Declaring, |s, args| {
            Ok(Value::from(format!("{s}{}", arg_str("concat", args, 0)?)))
        });
        let builder = builder
            .method("substring", vec![int().into()], TypeRef::Declaring, |target, args| {
                let chars = receiver_chars(target, "substring")?;
                let begin = arg_int("substring", args, 0)?;
                substring(&chars, begin, chars.len() as i32)
            })
            .method("substring", vec![int().into(), int().into()], TypeRef::Declaring, |target, args| {
                let chars = receiver_chars(target, "substring")?;
                substring(&chars, arg_int("substring", args, 0)?, arg_int("substring", args, 1)?)
            })
            .method("charAt", vec![int().into()], TypeRef::Declaring, |target, args| {
                let chars = receiver_chars(target, "charAt")?;
                let index = arg_int("charAt", args, 0)?;
                usize::try_from(index)
                    .ok()
                    .and_then(|i| chars.get(i))
                    .map(|c| Value::from(c.to_string()))
                    .ok_or_else(|| char_index_error(index, chars.len()))
            });
        builder.build()
    }

    fn substring(chars: &[char], begin: i32, end: i32) -> NativeResult {
        let size = chars.len();
        let b = usize::try_from(begin).ok().filter(|b| *b <= size).ok_or_else(|| char_index_error(begin, size))?;
        let e = usize::try_from(end).ok().filter(|e| *e <= size && *e >= b).ok_or_else(|| char_index_error(end, size))?;
        Ok(Value::from(chars[b..e].iter().collect::<String>()))
    }
}
