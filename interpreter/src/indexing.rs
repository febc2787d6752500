//! `target[index]` reads and writes, shared by the interpreter and compiled code.

use crate::environment::EvaluationContext;
use crate::error::{AccessError, ConversionError, EvaluationErrorKind};
use crate::object::Value;
use crate::types::builtin;

fn position(context: &EvaluationContext, index: &Value) -> Result<i32, EvaluationErrorKind> {
    match index {
        Value::Int(i) => Ok(*i),
        other => match context.convert(other.clone(), &builtin::int())? {
            Value::Int(i) => Ok(i),
            converted => Err(ConversionError::unsupported(converted.type_name(), "int").into()),
        },
    }
}

fn bounded(index: i32, size: usize, target_type: &str) -> Result<usize, EvaluationErrorKind> {
    usize::try_from(index).ok().filter(|i| *i < size).ok_or_else(|| {
        AccessError::IndexOutOfBounds { target_type: target_type.to_string(), index: i64::from(index), size }.into()
    })
}

fn property_name(index: &Value) -> String {
    match index {
        Value::String(s) => s.to_string(),
        other => other.to_string(),
    }
}

pub fn read_index(context: &EvaluationContext, target: &Value, index: &Value) -> Result<Value, EvaluationErrorKind> {
    match target {
        Value::Null => Err(AccessError::NullTarget { member_name: format!("[{index}]") }.into()),
        Value::List(list) => {
            let i = bounded(position(context, index)?, list.len(), "List")?;
            Ok(list.get(i).unwrap_or_default())
        }
        Value::Array(array) => {
            let i = bounded(position(context, index)?, array.len(), "Array")?;
            Ok(array.get(i).unwrap_or_default())
        }
        Value::Map(map) => Ok(map.get(index).unwrap_or_default()),
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = bounded(position(context, index)?, chars.len(), "String")?;
            Ok(Value::from(chars[i].to_string()))
        }
        Value::Object(_) => {
            let name = property_name(index);
            context.resolve_property_read(target, &name)?.read(target)
        }
        other => Err(AccessError::NotIndexable { target_type: other.type_name() }.into()),
    }
}

/// Store `value` at `target[index]`. Array elements are converted to the
/// component type first.
pub fn write_index(context: &EvaluationContext, target: &Value, index: &Value, value: Value) -> Result<(), EvaluationErrorKind> {
    match target {
        Value::Null => Err(AccessError::NullTarget { member_name: format!("[{index}]") }.into()),
        Value::List(list) => {
            let i = bounded(position(context, index)?, list.len(), "List")?;
            list.set(i, value)?;
            Ok(())
        }
        Value::Array(array) => {
            let i = bounded(position(context, index)?, array.len(), "Array")?;
            let converted = context.convert(value, &array.component)?;
            array.set(i, converted);
            Ok(())
        }
        Value::Map(map) => {
            map.insert(index.clone(), value)?;
            Ok(())
        }
        Value::Object(_) => {
            let name = property_name(index);
            let property = context.resolve_property_write(target, &name)?;
            let value = match property.value_type() {
                Some(t) => context.convert(value, &t)?,
                None => value,
            };
            property.write(target, value)
        }
        other => Err(AccessError::NotIndexable { target_type: other.type_name() }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{array_of, TypeBuilder};
    use indexmap::IndexMap;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(Value::Null)
    }

    #[test]
    fn lists_and_arrays() {
        let list = Value::list(vec![Value::Int(10), Value::Int(20)]);
        assert_eq!(read_index(&ctx(), &list, &Value::Int(1)).unwrap(), Value::Int(20));
        assert_eq!(read_index(&ctx(), &list, &Value::from("0")).unwrap(), Value::Int(10));
        let err = read_index(&ctx(), &list, &Value::Int(2)).unwrap_err();
        assert!(matches!(err, EvaluationErrorKind::Access(AccessError::IndexOutOfBounds { size: 2, .. })));

        let array = Value::array(builtin::long(), vec![Value::Long(1)]);
        write_index(&ctx(), &array, &Value::Int(0), Value::Int(5)).unwrap();
        assert_eq!(read_index(&ctx(), &array, &Value::Int(0)).unwrap(), Value::Long(5));
        assert!(std::sync::Arc::ptr_eq(&array.type_handle(), &array_of(&builtin::long())));
    }

    #[test]
    fn constant_lists_refuse_writes() {
        let list = Value::constant_list(vec![Value::Int(1)]);
        let err = write_index(&ctx(), &list, &Value::Int(0), Value::Int(2)).unwrap_err();
        assert_eq!(err.name(), "UnsupportedMutationError");
    }

    #[test]
    fn maps_strings_and_objects() {
        let mut entries = IndexMap::new();
        entries.insert(Value::from("a"), Value::Int(1));
        let map = Value::map(entries);
        assert_eq!(read_index(&ctx(), &map, &Value::from("a")).unwrap(), Value::Int(1));
        assert_eq!(read_index(&ctx(), &map, &Value::from("z")).unwrap(), Value::Null);
        write_index(&ctx(), &map, &Value::from("z"), Value::Int(26)).unwrap();
        assert_eq!(read_index(&ctx(), &map, &Value::from("z")).unwrap(), Value::Int(26));

        assert_eq!(read_index(&ctx(), &Value::from("héllo"), &Value::Int(1)).unwrap(), Value::from("é"));

        let point = TypeBuilder::class("Point").field("x", builtin::int()).build();
        let p = Value::object(&point, [("x", Value::Int(3))]);
        assert_eq!(read_index(&ctx(), &p, &Value::from("x")).unwrap(), Value::Int(3));
        write_index(&ctx(), &p, &Value::from("x"), Value::from("7")).unwrap();
        assert_eq!(read_index(&ctx(), &p, &Value::from("x")).unwrap(), Value::Int(7));
    }

    #[test]
    fn unindexable_targets() {
        assert!(matches!(
            read_index(&ctx(), &Value::Bool(true), &Value::Int(0)),
            Err(EvaluationErrorKind::Access(AccessError::NotIndexable { .. }))
        ));
        assert!(matches!(
            read_index(&ctx(), &Value::Null, &Value::Int(0)),
            Err(EvaluationErrorKind::Access(AccessError::NullTarget { .. }))
        ));
    }
}
