use std::sync::Arc;
use crate::environment::EvaluationContext;
use crate::error::{AccessError, EvaluationErrorKind, MemberKind};
use crate::object::Value;
use crate::resolver::{PropertyAccessor, Resolution, ResolveResult, ResolvedProperty};
use crate::types::{builtin, MethodDescriptor, PropertyDescriptor, TypeHandle};

/// Properties declared on the target's type descriptor, falling back to
/// `getX()`/`isX()` and `setX(v)` methods.
#[derive(Debug, Default)]
pub struct ReflectivePropertyAccessor;

#[derive(Debug)]
pub struct ReflectiveProperty {
    declaring: TypeHandle,
    property: PropertyDescriptor,
}

impl ResolvedProperty for ReflectiveProperty {
    fn read(&self, target: &Value) -> Result<Value, EvaluationErrorKind> {
        (self.property.getter)(target)
    }

    fn write(&self, target: &Value, value: Value) -> Result<(), EvaluationErrorKind> {
        match &self.property.setter {
            Some(setter) => setter(target, value),
            None => Err(AccessError::NotWritable {
                target_type: self.declaring.name().to_string(),
                member_name: self.property.name.clone(),
            }
            .into()),
        }
    }

    fn is_writable(&self) -> bool {
        self.property.setter.is_some()
    }

    fn value_type(&self) -> Option<TypeHandle> {
        Some(self.property.property_type.resolve(&self.declaring))
    }
}

/// A property exposed through accessor methods.
#[derive(Debug)]
pub struct MethodBackedProperty {
    declaring: TypeHandle,
    name: String,
    getter: Option<MethodDescriptor>,
    setter: Option<MethodDescriptor>,
}

impl ResolvedProperty for MethodBackedProperty {
    fn read(&self, target: &Value) -> Result<Value, EvaluationErrorKind> {
        match &self.getter {
            Some(getter) => (getter.invoker)(target, &[]),
            None => Err(AccessError::not_found(self.declaring.name(), &self.name, MemberKind::Property).into()),
        }
    }

    fn write(&self, target: &Value, value: Value) -> Result<(), EvaluationErrorKind> {
        match &self.setter {
            Some(setter) => (setter.invoker)(target, &[value]).map(|_| ()),
            None => Err(AccessError::NotWritable {
                target_type: self.declaring.name().to_string(),
                member_name: self.name.clone(),
            }
            .into()),
        }
    }

    fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    fn value_type(&self) -> Option<TypeHandle> {
        match (&self.getter, &self.setter) {
            (Some(getter), _) => Some(getter.return_type.resolve(&self.declaring)),
            (None, Some(setter)) => setter.parameter_types.first().map(|p| p.resolve(&self.declaring)),
            (None, None) => None,
        }
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn accessor_method(owner: &TypeHandle, method_name: &str, arity: usize) -> Option<MethodDescriptor> {
    let mut methods = Vec::new();
    owner.collect_methods(method_name, false, &mut methods);
    methods.into_iter().find(|m| m.parameter_types.len() == arity && !m.varargs).cloned()
}

impl ReflectivePropertyAccessor {
    /// The type whose members apply, and whether they are its static members.
    fn owner(target: &Value) -> Option<(TypeHandle, bool)> {
        match target {
            Value::Null => None,
            Value::Type(t) => Some((t.clone(), true)),
            other => Some((other.type_handle(), false)),
        }
    }

    fn find(target: &Value, name: &str) -> Option<ReflectiveProperty> {
        let (owner, is_static) = Self::owner(target)?;
        if let Some(property) = owner.find_property(name, is_static) {
            return Some(ReflectiveProperty { declaring: owner.clone(), property: property.clone() });
        }
        if is_static {
            // Members of the type object itself, like `T(String).name`.
            let class = builtin::type_type();
            let property = class.find_property(name, false)?.clone();
            return Some(ReflectiveProperty { declaring: class, property });
        }
        None
    }

    fn find_methods(target: &Value, name: &str) -> Option<MethodBackedProperty> {
        let (owner, is_static) = Self::owner(target)?;
        if is_static {
            return None;
        }
        let capitalized = capitalize(name);
        let getter = accessor_method(&owner, &format!("get{capitalized}"), 0)
            .or_else(|| accessor_method(&owner, &format!("is{capitalized}"), 0));
        let setter = accessor_method(&owner, &format!("set{capitalized}"), 1);
        (getter.is_some() || setter.is_some()).then(|| MethodBackedProperty {
            declaring: owner,
            name: name.to_string(),
            getter,
            setter,
        })
    }
}

impl PropertyAccessor for ReflectivePropertyAccessor {
    fn resolve_read(&self, _context: &EvaluationContext, target: &Value, name: &str) -> ResolveResult<Arc<dyn ResolvedProperty>> {
        if let Some(property) = Self::find(target, name) {
            return Ok(Resolution::Resolved(Arc::new(property)));
        }
        match Self::find_methods(target, name) {
            Some(property) if property.getter.is_some() => Ok(Resolution::Resolved(Arc::new(property))),
            _ => Ok(Resolution::NotApplicable),
        }
    }

    fn resolve_write(&self, _context: &EvaluationContext, target: &Value, name: &str) -> ResolveResult<Arc<dyn ResolvedProperty>> {
        let declared = Self::find(target, name);
        if let Some(property) = declared.as_ref().filter(|p| p.is_writable()) {
            return Ok(Resolution::Resolved(Arc::new(ReflectiveProperty {
                declaring: property.declaring.clone(),
                property: property.property.clone(),
            })));
        }
        match Self::find_methods(target, name) {
            Some(property) if property.setter.is_some() => Ok(Resolution::Resolved(Arc::new(property))),
            _ => match declared {
                Some(property) => Err(AccessError::NotWritable {
                    target_type: property.declaring.name().to_string(),
                    member_name: name.to_string(),
                }
                .into()),
                None => Ok(Resolution::NotApplicable),
            },
        }
    }
}

/// Exposes map keys as properties: `map.key` reads `map['key']`.
#[derive(Debug, Default)]
pub struct MapPropertyResolver;

#[derive(Debug)]
pub struct MapKeyAccessor {
    key: Value,
}

impl MapKeyAccessor {
    pub fn new(key: &str) -> Self {
        MapKeyAccessor { key: Value::from(key) }
    }
}

impl ResolvedProperty for MapKeyAccessor {
    fn read(&self, target: &Value) -> Result<Value, EvaluationErrorKind> {
        match target {
            Value::Map(map) => map
                .get(&self.key)
                .ok_or_else(|| AccessError::not_found("Map", self.key.to_string(), MemberKind::Property).into()),
            other => Err(AccessError::not_found(other.type_name(), self.key.to_string(), MemberKind::Property).into()),
        }
    }

    fn write(&self, target: &Value, value: Value) -> Result<(), EvaluationErrorKind> {
        match target {
            Value::Map(map) => {
                map.insert(self.key.clone(), value)?;
                Ok(())
            }
            other => Err(AccessError::not_found(other.type_name(), self.key.to_string(), MemberKind::Property).into()),
        }
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn value_type(&self) -> Option<TypeHandle> {
        None
    }
}

impl PropertyAccessor for MapPropertyResolver {
    fn resolve_read(&self, _context: &EvaluationContext, target: &Value, name: &str) -> ResolveResult<Arc<dyn ResolvedProperty>> {
        match target {
            Value::Map(map) if map.contains_key(&Value::from(name)) => {
                Ok(Resolution::Resolved(Arc::new(MapKeyAccessor::new(name))))
            }
            _ => Ok(Resolution::NotApplicable),
        }
    }

    fn resolve_write(&self, _context: &EvaluationContext, target: &Value, name: &str) -> ResolveResult<Arc<dyn ResolvedProperty>> {
        match target {
            Value::Map(_) => Ok(Resolution::Resolved(Arc::new(MapKeyAccessor::new(name)))),
            _ => Ok(Resolution::NotApplicable),
        }
    }
}
