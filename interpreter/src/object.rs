use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use frontend::ast::Literal;
use indexmap::IndexMap;
use parking_lot::RwLock;
use crate::descriptor::ScalarKind;
use crate::error::UnsupportedMutationError;
use crate::types::{builtin, TypeHandle};

/// Runtime value. Collections and instances are shared; cloning a `Value`
/// never copies their contents.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(Arc<str>),
    List(Arc<ListValue>),
    Map(Arc<MapValue>),
    Array(Arc<ArrayValue>),
    Object(Arc<Instance>),
    Type(TypeHandle),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Elvis treats null and the empty string as absent.
    pub fn is_absent(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            Value::Bool(_) => Some(ScalarKind::Boolean),
            Value::Int(_) => Some(ScalarKind::Int),
            Value::Long(_) => Some(ScalarKind::Long),
            Value::Float(_) => Some(ScalarKind::Float),
            Value::Double(_) => Some(ScalarKind::Double),
            _ => None,
        }
    }

    pub fn numeric_kind(&self) -> Option<ScalarKind> {
        self.scalar_kind().filter(|k| k.is_numeric())
    }

    /// Runtime type. Scalars report their boxed type, as a value held in an
    /// object slot would.
    pub fn type_handle(&self) -> TypeHandle {
        match self {
            Value::Null => builtin::null(),
            Value::Bool(_) => builtin::boolean_boxed(),
            Value::Int(_) => builtin::integer(),
            Value::Long(_) => builtin::long_boxed(),
            Value::Float(_) => builtin::float_boxed(),
            Value::Double(_) => builtin::double_boxed(),
            Value::String(_) => builtin::string(),
            Value::List(_) => builtin::list(),
            Value::Map(_) => builtin::map(),
            Value::Array(array) => crate::types::array_of(&array.component),
            Value::Object(instance) => instance.type_handle.clone(),
            Value::Type(_) => builtin::type_type(),
        }
    }

    pub fn type_name(&self) -> String {
        self.type_handle().name().to_string()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integral view used for indexes; reals are not accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(f64::from(*v)),
            Value::Long(v) => Some(*v as f64),
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Shared-object identity for collections and instances, value equality otherwise.
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::String(a), Value::String(b)) => Arc::ptr_eq(a, b),
            _ => self == other,
        }
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(ListValue::new(items)))
    }

    pub fn constant_list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(ListValue::constant(items)))
    }

    pub fn map(entries: IndexMap<Value, Value>) -> Value {
        Value::Map(Arc::new(MapValue::new(entries)))
    }

    pub fn constant_map(entries: IndexMap<Value, Value>) -> Value {
        Value::Map(Arc::new(MapValue::constant(entries)))
    }

    pub fn array(component: TypeHandle, items: Vec<Value>) -> Value {
        Value::Array(Arc::new(ArrayValue::new(component, items)))
    }

    /// A fresh instance of a host type with the given field values.
    pub fn object<I, S>(type_handle: &TypeHandle, fields: I) -> Value
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        Value::Object(Arc::new(Instance::new(type_handle.clone(), fields)))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b) || *a.items.read() == *b.items.read(),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b) || *a.entries.read() == *b.entries.read(),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b) || *a.items.read() == *b.items.read(),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Long(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::List(list) => list.items.read().hash(state),
            // Map equality ignores entry order, so only the size takes part.
            Value::Map(map) => map.entries.read().len().hash(state),
            Value::Array(array) => array.items.read().hash(state),
            Value::Object(instance) => Arc::as_ptr(instance).hash(state),
            Value::Type(t) => t.id().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Double(v) => write!(f, "{v:?}"),
            Value::String(s) => f.write_str(s),
            Value::List(list) => write_sequence(f, &list.items.read()),
            Value::Array(array) => write_sequence(f, &array.items.read()),
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.entries.read().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("}")
            }
            Value::Object(instance) => {
                write!(f, "{}{{", instance.type_handle.name())?;
                for (i, (k, v)) in instance.fields.read().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("}")
            }
            Value::Type(t) => write!(f, "class {}", t.name()),
        }
    }
}

fn write_sequence(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str("]")
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<TypeHandle> for Value {
    fn from(t: TypeHandle) -> Self {
        Value::Type(t)
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Int(v) => Value::Int(*v),
            Literal::Long(v) => Value::Long(*v),
            Literal::Float(v) => Value::Float(*v),
            Literal::Double(v) => Value::Double(*v),
            Literal::String(s) => Value::from(s.as_str()),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
        }
    }
}

#[derive(Debug)]
pub struct ListValue {
    items: RwLock<Vec<Value>>,
    mutable: bool,
}

impl ListValue {
    pub fn new(items: Vec<Value>) -> Self {
        ListValue { items: RwLock::new(items), mutable: true }
    }

    pub fn constant(items: Vec<Value>) -> Self {
        ListValue { items: RwLock::new(items), mutable: false }
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.read().get(index).cloned()
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.items.read().clone()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.items.read().contains(value)
    }

    fn check_mutable(&self) -> Result<(), UnsupportedMutationError> {
        if self.mutable {
            Ok(())
        } else {
            Err(UnsupportedMutationError { collection: "list".to_string() })
        }
    }

    /// Replace an element. Returns `Ok(false)` when the index is out of range.
    pub fn set(&self, index: usize, value: Value) -> Result<bool, UnsupportedMutationError> {
        self.check_mutable()?;
        let mut items = self.items.write();
        match items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn push(&self, value: Value) -> Result<(), UnsupportedMutationError> {
        self.check_mutable()?;
        self.items.write().push(value);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MapValue {
    entries: RwLock<IndexMap<Value, Value>>,
    mutable: bool,
}

impl MapValue {
    pub fn new(entries: IndexMap<Value, Value>) -> Self {
        MapValue { entries: RwLock::new(entries), mutable: true }
    }

    pub fn constant(entries: IndexMap<Value, Value>) -> Self {
        MapValue { entries: RwLock::new(entries), mutable: false }
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn snapshot(&self) -> Vec<(Value, Value)> {
        self.entries.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Insert or replace, returning the previous value.
    pub fn insert(&self, key: Value, value: Value) -> Result<Option<Value>, UnsupportedMutationError> {
        if !self.mutable {
            return Err(UnsupportedMutationError { collection: "map".to_string() });
        }
        Ok(self.entries.write().insert(key, value))
    }
}

/// Fixed-length, always writable, typed by its component.
#[derive(Debug)]
pub struct ArrayValue {
    pub component: TypeHandle,
    items: RwLock<Vec<Value>>,
}

impl ArrayValue {
    pub fn new(component: TypeHandle, items: Vec<Value>) -> Self {
        ArrayValue { component, items: RwLock::new(items) }
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.read().get(index).cloned()
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.items.read().clone()
    }

    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.items.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// Instance of a host-registered type.
#[derive(Debug)]
pub struct Instance {
    pub type_handle: TypeHandle,
    fields: RwLock<IndexMap<String, Value>>,
}

impl Instance {
    pub fn new<I, S>(type_handle: TypeHandle, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Instance { type_handle, fields: RwLock::new(fields) }
    }

    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.read().get(name).cloned()
    }

    pub fn set_field(&self, name: &str, value: Value) {
        self.fields.write().insert(name.to_string(), value);
    }
}
