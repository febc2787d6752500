use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};
use crate::descriptor::ScalarKind;
use crate::environment::registration_id;
use crate::error::ConversionError;
use crate::object::Value;
use crate::types::{builtin, TypeHandle, TypeKind};

/// Converts values between types. All implicit argument and assignment
/// conversions go through the context's service.
pub trait ConversionService: Send + Sync {
    fn can_convert(&self, from: &TypeHandle, to: &TypeHandle) -> bool;
    fn convert(&self, value: Value, to: &TypeHandle) -> Result<Value, ConversionError>;
    /// Changes whenever the set of conversions the service performs changes.
    fn fingerprint(&self) -> u64;
}

pub type Converter = Arc<dyn Fn(&Value) -> Result<Value, ConversionError> + Send + Sync>;

/// Built-in conversions plus host-registered `(from, to)` converters, which
/// take precedence.
#[derive(Clone, Default)]
pub struct DefaultConversionService {
    converters: Vec<(TypeHandle, TypeHandle, Converter)>,
    registrations: Vec<u64>,
}

static SHARED: LazyLock<Arc<DefaultConversionService>> = LazyLock::new(|| Arc::new(DefaultConversionService::new()));

impl DefaultConversionService {
    pub fn new() -> Self {
        DefaultConversionService { converters: Vec::new(), registrations: Vec::new() }
    }

    /// The process-wide instance without custom converters.
    pub fn shared() -> Arc<DefaultConversionService> {
        SHARED.clone()
    }

    pub fn add_converter<F>(&mut self, from: &TypeHandle, to: &TypeHandle, converter: F)
    where
        F: Fn(&Value) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.converters.push((from.clone(), to.clone(), Arc::new(converter)));
        self.registrations.push(registration_id());
    }

    pub fn add_shared_converter(&mut self, from: &TypeHandle, to: &TypeHandle, converter: Converter) {
        self.converters.push((from.clone(), to.clone(), converter));
        self.registrations.push(registration_id());
    }

    fn find_converter(&self, from: &TypeHandle, to: &TypeHandle) -> Option<&Converter> {
        self.converters
            .iter()
            .find(|(f, t, _)| Arc::ptr_eq(f, from) && Arc::ptr_eq(t, to))
            .or_else(|| self.converters.iter().find(|(f, t, _)| Arc::ptr_eq(t, to) && from.is_assignable_to(f)))
            .map(|(_, _, c)| c)
    }
}

impl ConversionService for DefaultConversionService {
    fn can_convert(&self, from: &TypeHandle, to: &TypeHandle) -> bool {
        if self.find_converter(from, to).is_some() {
            return true;
        }
        if from.kind() == TypeKind::Null {
            return !to.is_primitive();
        }
        if from.is_assignable_to(to) {
            return true;
        }
        match to.kind() {
            TypeKind::Primitive(target) | TypeKind::Boxed(target) => match from.scalar_kind() {
                Some(source) => source.is_numeric() == target.is_numeric(),
                None => from.kind() == TypeKind::String,
            },
            TypeKind::String | TypeKind::Object => true,
            TypeKind::Number => from.scalar_kind().is_some_and(ScalarKind::is_numeric),
            TypeKind::List | TypeKind::Array => matches!(from.kind(), TypeKind::List | TypeKind::Array),
            _ => false,
        }
    }

    fn convert(&self, value: Value, to: &TypeHandle) -> Result<Value, ConversionError> {
        let from = value.type_handle();
        if let Some(converter) = self.find_converter(&from, to) {
            return converter(&value);
        }
        if value.is_null() {
            return if to.is_primitive() {
                Err(ConversionError::failed("null", to.name(), "a primitive cannot be null"))
            } else {
                Ok(Value::Null)
            };
        }
        match to.kind() {
            TypeKind::Primitive(kind) | TypeKind::Boxed(kind) => convert_scalar(value, kind, to),
            TypeKind::String => match value {
                Value::String(_) => Ok(value),
                other => Ok(Value::from(other.to_string())),
            },
            TypeKind::Object => Ok(value),
            TypeKind::Number if value.numeric_kind().is_some() => Ok(value),
            TypeKind::List => match value {
                Value::List(_) => Ok(value),
                Value::Array(array) => Ok(Value::list(array.snapshot())),
                other => Err(ConversionError::unsupported(other.type_name(), to.name())),
            },
            TypeKind::Array => convert_to_array(self, value, to),
            _ if from.is_assignable_to(to) => Ok(value),
            _ => Err(ConversionError::unsupported(from.name(), to.name())),
        }
    }

    fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for (from, to, _) in &self.converters {
            from.id().hash(&mut hasher);
            to.id().hash(&mut hasher);
        }
        self.registrations.hash(&mut hasher);
        hasher.finish()
    }
}

fn convert_to_array(service: &dyn ConversionService, value: Value, to: &TypeHandle) -> Result<Value, ConversionError> {
    let Some(component) = to.element_type() else {
        return Err(ConversionError::unsupported(value.type_name(), to.name()));
    };
    let items = match &value {
        Value::Array(array) if Arc::ptr_eq(&array.component, component) => return Ok(value),
        Value::Array(array) => array.snapshot(),
        Value::List(list) => list.snapshot(),
        other => return Err(ConversionError::unsupported(other.type_name(), to.name())),
    };
    let converted = items
        .into_iter()
        .map(|item| service.convert(item, component))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::array(component.clone(), converted))
}

fn convert_scalar(value: Value, kind: ScalarKind, to: &TypeHandle) -> Result<Value, ConversionError> {
    match (&value, kind) {
        (Value::Bool(_), ScalarKind::Boolean) => Ok(value),
        (Value::String(s), ScalarKind::Boolean) => string_to_bool(s),
        (Value::String(s), _) => parse_number(s, kind),
        (_, ScalarKind::Boolean) => Err(ConversionError::unsupported(value.type_name(), to.name())),
        _ if value.numeric_kind().is_some() => checked_cast(&value, kind),
        _ => Err(ConversionError::unsupported(value.type_name(), to.name())),
    }
}

fn string_to_bool(s: &str) -> Result<Value, ConversionError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(Value::Bool(true)),
        "false" | "off" | "no" | "0" => Ok(Value::Bool(false)),
        "" => Ok(Value::Null),
        _ => Err(ConversionError::failed(s, "boolean", "not a boolean literal")),
    }
}

fn parse_number(s: &str, kind: ScalarKind) -> Result<Value, ConversionError> {
    let text = s.trim();
    let parsed = match kind {
        ScalarKind::Int => text.parse::<i32>().map(Value::Int).map_err(|e| e.to_string()),
        ScalarKind::Long => text.parse::<i64>().map(Value::Long).map_err(|e| e.to_string()),
        ScalarKind::Float => text.parse::<f32>().map(Value::Float).map_err(|e| e.to_string()),
        ScalarKind::Double => text.parse::<f64>().map(Value::Double).map_err(|e| e.to_string()),
        ScalarKind::Boolean => return string_to_bool(s),
    };
    parsed.map_err(|reason| ConversionError::failed(s, kind.name(), reason))
}

/// Primitive cast with the usual wrap/truncate semantics. `None` for non-numbers.
pub fn cast_number(value: &Value, kind: ScalarKind) -> Option<Value> {
    let cast = match (value, kind) {
        (Value::Int(v), ScalarKind::Int) => Value::Int(*v),
        (Value::Int(v), ScalarKind::Long) => Value::Long(i64::from(*v)),
        (Value::Int(v), ScalarKind::Float) => Value::Float(*v as f32),
        (Value::Int(v), ScalarKind::Double) => Value::Double(f64::from(*v)),
        (Value::Long(v), ScalarKind::Int) => Value::Int(*v as i32),
        (Value::Long(v), ScalarKind::Long) => Value::Long(*v),
        (Value::Long(v), ScalarKind::Float) => Value::Float(*v as f32),
        (Value::Long(v), ScalarKind::Double) => Value::Double(*v as f64),
        (Value::Float(v), ScalarKind::Int) => Value::Int(*v as i32),
        (Value::Float(v), ScalarKind::Long) => Value::Long(*v as i64),
        (Value::Float(v), ScalarKind::Float) => Value::Float(*v),
        (Value::Float(v), ScalarKind::Double) => Value::Double(f64::from(*v)),
        (Value::Double(v), ScalarKind::Int) => Value::Int(*v as i32),
        (Value::Double(v), ScalarKind::Long) => Value::Long(*v as i64),
        (Value::Double(v), ScalarKind::Float) => Value::Float(*v as f32),
        (Value::Double(v), ScalarKind::Double) => Value::Double(*v),
        _ => return None,
    };
    Some(cast)
}

/// Numeric conversion that refuses to lose the integral part.
pub fn checked_cast(value: &Value, kind: ScalarKind) -> Result<Value, ConversionError> {
    let overflow = || ConversionError::failed(value, kind.name(), "value out of range");
    match (value, kind) {
        (Value::Long(v), ScalarKind::Int) => i32::try_from(*v).map(Value::Int).map_err(|_| overflow()),
        (Value::Float(_) | Value::Double(_), ScalarKind::Int | ScalarKind::Long) => {
            let v = value.as_f64().unwrap_or(f64::NAN);
            let (min, max) = if kind == ScalarKind::Int {
                (f64::from(i32::MIN), f64::from(i32::MAX))
            } else {
                (i64::MIN as f64, i64::MAX as f64)
            };
            if v.is_finite() && v.trunc() >= min && v.trunc() <= max {
                cast_number(value, kind).ok_or_else(overflow)
            } else {
                Err(overflow())
            }
        }
        _ => cast_number(value, kind).ok_or_else(|| ConversionError::unsupported(value.type_name(), kind.name())),
    }
}

/// Condition values must be booleans or convertible to one; null is refused.
pub fn to_boolean(service: &dyn ConversionService, value: Value) -> Result<bool, ConversionError> {
    match value {
        Value::Bool(b) => Ok(b),
        Value::Null => Err(ConversionError::failed("null", "boolean", "a condition cannot be null")),
        other => match service.convert(other, &builtin::boolean())? {
            Value::Bool(b) => Ok(b),
            converted => Err(ConversionError::unsupported(converted.type_name(), "boolean")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::Int(7), builtin::long(), Value::Long(7))]
    #[case(Value::Long(7), builtin::int(), Value::Int(7))]
    #[case(Value::Double(2.9), builtin::int(), Value::Int(2))]
    #[case(Value::from(" 42 "), builtin::integer(), Value::Int(42))]
    #[case(Value::from("yes"), builtin::boolean(), Value::Bool(true))]
    #[case(Value::Int(3), builtin::string(), Value::from("3"))]
    #[case(Value::Double(1.5), builtin::string(), Value::from("1.5"))]
    #[case(Value::Int(3), builtin::number(), Value::Int(3))]
    fn default_conversions(#[case] value: Value, #[case] to: TypeHandle, #[case] expected: Value) {
        let service = DefaultConversionService::new();
        assert_eq!(service.convert(value, &to).unwrap(), expected);
    }

    #[rstest]
    #[case(Value::Long(i64::MAX), builtin::int())]
    #[case(Value::from("abc"), builtin::int())]
    #[case(Value::Null, builtin::int())]
    #[case(Value::Bool(true), builtin::int())]
    #[case(Value::from("maybe"), builtin::boolean())]
    fn failing_conversions(#[case] value: Value, #[case] to: TypeHandle) {
        let service = DefaultConversionService::new();
        assert!(service.convert(value, &to).is_err());
    }

    #[test]
    fn list_to_array_converts_elements() {
        let service = DefaultConversionService::new();
        let list = Value::list(vec![Value::Int(1), Value::from("2")]);
        let array_type = crate::types::array_of(&builtin::long());
        let Value::Array(array) = service.convert(list, &array_type).unwrap() else {
            panic!("expected array");
        };
        assert_eq!(array.snapshot(), vec![Value::Long(1), Value::Long(2)]);
    }

    #[test]
    fn custom_converter_takes_precedence() {
        let mut service = DefaultConversionService::new();
        let before = service.fingerprint();
        service.add_converter(&builtin::integer(), &builtin::string(), |v| Ok(Value::from(format!("#{v}"))));
        assert_ne!(service.fingerprint(), before);
        assert_eq!(service.convert(Value::Int(5), &builtin::string()).unwrap(), Value::from("#5"));
    }

    #[test]
    fn can_convert_matrix() {
        let service = DefaultConversionService::new();
        assert!(service.can_convert(&builtin::integer(), &builtin::long()));
        assert!(service.can_convert(&builtin::string(), &builtin::int()));
        assert!(service.can_convert(&builtin::null(), &builtin::string()));
        assert!(!service.can_convert(&builtin::null(), &builtin::int()));
        assert!(!service.can_convert(&builtin::boolean_boxed(), &builtin::int()));
        assert!(!service.can_convert(&builtin::map(), &builtin::list()));
    }

    #[test]
    fn condition_conversion() {
        let service = DefaultConversionService::new();
        assert!(to_boolean(&service, Value::Bool(true)).unwrap());
        assert!(!to_boolean(&service, Value::from("false")).unwrap());
        assert!(to_boolean(&service, Value::Null).is_err());
        assert!(to_boolean(&service, Value::Int(1)).is_err());
    }
}
