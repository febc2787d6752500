use std::fmt;
use std::sync::Arc;
use crate::object::Value;
use crate::types::{TypeHandle, TypeKind};

/// Unboxed value kinds the compiler can specialize instructions for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarKind {
    Boolean,
    Int,
    Long,
    Float,
    Double,
}

impl ScalarKind {
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Boolean => "boolean",
            ScalarKind::Int => "int",
            ScalarKind::Long => "long",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, ScalarKind::Boolean)
    }

    /// Numeric widening order: int < long < float < double.
    pub fn rank(self) -> Option<u8> {
        match self {
            ScalarKind::Boolean => None,
            ScalarKind::Int => Some(0),
            ScalarKind::Long => Some(1),
            ScalarKind::Float => Some(2),
            ScalarKind::Double => Some(3),
        }
    }

    /// True when every value of `self` is representable as `target` without
    /// changing the numeric kind family (the lossless-ish Java widening set).
    pub fn widens_to(self, target: ScalarKind) -> bool {
        match (self.rank(), target.rank()) {
            (Some(from), Some(to)) => from < to,
            _ => false,
        }
    }

    /// The wider of two numeric kinds.
    pub fn promote(self, other: ScalarKind) -> Option<ScalarKind> {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => Some(if a >= b { self } else { other }),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a node leaves for its parent: an unboxed scalar, a reference of a
/// known type, or something that changes between evaluations.
#[derive(Debug, Clone)]
pub enum ValueDescriptor {
    Scalar(ScalarKind),
    Reference(TypeHandle),
    Dynamic,
}

impl PartialEq for ValueDescriptor {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValueDescriptor::Scalar(a), ValueDescriptor::Scalar(b)) => a == b,
            (ValueDescriptor::Reference(a), ValueDescriptor::Reference(b)) => Arc::ptr_eq(a, b),
            (ValueDescriptor::Dynamic, ValueDescriptor::Dynamic) => true,
            _ => false,
        }
    }
}

impl Eq for ValueDescriptor {}

impl ValueDescriptor {
    /// Descriptor observed for a runtime value. Null carries no type information.
    pub fn of_value(value: &Value) -> Option<ValueDescriptor> {
        if value.is_null() {
            return None;
        }
        Some(match value.scalar_kind() {
            Some(kind) => ValueDescriptor::Scalar(kind),
            None => ValueDescriptor::Reference(value.type_handle()),
        })
    }

    /// Descriptor for a declared member type. Primitive declarations are scalars,
    /// everything else (boxed types included) is a reference.
    pub fn of_declared(declared: &TypeHandle) -> ValueDescriptor {
        match declared.kind() {
            TypeKind::Primitive(kind) => ValueDescriptor::Scalar(kind),
            TypeKind::Null => ValueDescriptor::Dynamic,
            _ => ValueDescriptor::Reference(declared.clone()),
        }
    }

    /// Combine two observations of the same node. Any disagreement is sticky.
    pub fn merge(&self, other: &ValueDescriptor) -> ValueDescriptor {
        if self == other { self.clone() } else { ValueDescriptor::Dynamic }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ValueDescriptor::Dynamic)
    }

    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            ValueDescriptor::Scalar(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Scalar kind reachable through unboxing, for `Integer`-like references.
    pub fn boxed_kind(&self) -> Option<ScalarKind> {
        match self {
            ValueDescriptor::Reference(t) => match t.kind() {
                TypeKind::Boxed(kind) => Some(kind),
                _ => None,
            },
            _ => None,
        }
    }

    /// Scalar kind either directly or through unboxing.
    pub fn numeric_kind(&self) -> Option<ScalarKind> {
        self.scalar_kind().or_else(|| self.boxed_kind())
    }

    pub fn is_reference_to(&self, kind: TypeKind) -> bool {
        matches!(self, ValueDescriptor::Reference(t) if t.kind() == kind)
    }

    /// Runtime guard: does `value` still have the shape this descriptor promises?
    /// References admit null.
    pub fn admits(&self, value: &Value) -> bool {
        match self {
            ValueDescriptor::Dynamic => true,
            ValueDescriptor::Scalar(kind) => value.scalar_kind() == Some(*kind),
            ValueDescriptor::Reference(t) => {
                value.is_null() || match t.kind() {
                    TypeKind::Boxed(kind) => value.scalar_kind() == Some(kind),
                    _ => Arc::ptr_eq(&value.type_handle(), t),
                }
            }
        }
    }
}

impl fmt::Display for ValueDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueDescriptor::Scalar(kind) => write!(f, "{kind}"),
            ValueDescriptor::Reference(t) => write!(f, "{}", t.name()),
            ValueDescriptor::Dynamic => f.write_str("<dynamic>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::builtin;

    #[test]
    fn descriptor_merge_is_sticky() {
        let int = ValueDescriptor::Scalar(ScalarKind::Int);
        let double = ValueDescriptor::Scalar(ScalarKind::Double);
        assert_eq!(int.merge(&int), int);
        let merged = int.merge(&double);
        assert!(merged.is_dynamic());
        assert!(merged.merge(&int).is_dynamic());
    }

    #[test]
    fn descriptor_from_values_and_declarations() {
        assert_eq!(ValueDescriptor::of_value(&Value::Int(1)), Some(ValueDescriptor::Scalar(ScalarKind::Int)));
        assert_eq!(ValueDescriptor::of_value(&Value::Null), None);
        assert_eq!(
            ValueDescriptor::of_value(&Value::from("x")),
            Some(ValueDescriptor::Reference(builtin::string()))
        );
        assert_eq!(ValueDescriptor::of_declared(&builtin::int()), ValueDescriptor::Scalar(ScalarKind::Int));
        assert_eq!(ValueDescriptor::of_declared(&builtin::integer()).boxed_kind(), Some(ScalarKind::Int));
    }

    #[test]
    fn descriptor_guards() {
        let string = ValueDescriptor::Reference(builtin::string());
        assert!(string.admits(&Value::from("a")));
        assert!(string.admits(&Value::Null));
        assert!(!string.admits(&Value::Int(3)));
        assert!(!ValueDescriptor::Scalar(ScalarKind::Long).admits(&Value::Int(3)));
    }

    #[test]
    fn scalar_promotion() {
        assert_eq!(ScalarKind::Int.promote(ScalarKind::Double), Some(ScalarKind::Double));
        assert_eq!(ScalarKind::Long.promote(ScalarKind::Int), Some(ScalarKind::Long));
        assert_eq!(ScalarKind::Boolean.promote(ScalarKind::Int), None);
        assert!(ScalarKind::Int.widens_to(ScalarKind::Long));
        assert!(!ScalarKind::Double.widens_to(ScalarKind::Float));
    }
}
