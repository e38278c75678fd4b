//! Array, map and byte-array coercion

use crate::amf::value::{OrderedMap, Value};
use crate::coerce::{Coercer, TypeDescriptor};
use crate::error::{CodecError, Result};

pub(crate) fn coerce_array(
    coercer: &mut Coercer,
    value: &Value,
    element: &TypeDescriptor,
) -> Result<Value> {
    match value {
        Value::Array(source) => {
            let result = Value::array(Vec::with_capacity(source.borrow().len()));
            // The result enters the known table before elements are visited
            // so a self-containing array folds onto itself
            coercer.remember(value, result.clone());

            let len = source.borrow().len();
            for index in 0..len {
                let item = source.borrow()[index].clone();
                let coerced = coercer.element_or_null(&item, element)?;
                if let Value::Array(target) = &result {
                    target.borrow_mut().push(coerced);
                }
            }
            Ok(result)
        }
        // A string fans out to its characters when characters are wanted
        Value::String(s) if *element == TypeDescriptor::Char => {
            Ok(Value::array(s.chars().map(Value::Char).collect()))
        }
        other => Err(CodecError::invalid_type(other.describe(), "array")),
    }
}

pub(crate) fn coerce_map(coercer: &mut Coercer, value: &Value, sorted: bool) -> Result<Value> {
    match value {
        // Already the right shape: entries resolve in place and the handle
        // keeps its identity
        Value::Map(rc) => {
            coercer.remember(value, value.clone());
            let keys: Vec<String> = rc.borrow().keys().map(str::to_string).collect();
            for key in keys {
                let member = rc.borrow().get(&key).cloned().unwrap_or(Value::Null);
                let coerced = coercer.element_or_null(&member, &TypeDescriptor::Any)?;
                rc.borrow_mut().insert(key, coerced);
            }
            if sorted {
                rc.borrow_mut().sort_keys();
            }
            Ok(value.clone())
        }
        Value::Record(rc) => {
            let entries: Vec<(String, Value)> = rc
                .borrow()
                .members
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();

            let result = Value::map(OrderedMap::with_capacity(entries.len()));
            coercer.remember(value, result.clone());

            for (key, member) in entries {
                let coerced = coercer.element_or_null(&member, &TypeDescriptor::Any)?;
                if let Value::Map(target) = &result {
                    target.borrow_mut().insert(key, coerced);
                }
            }
            if sorted {
                if let Value::Map(target) = &result {
                    target.borrow_mut().sort_keys();
                }
            }
            Ok(result)
        }
        other => Err(CodecError::invalid_type(other.describe(), "map")),
    }
}

pub(crate) fn coerce_bytes(value: &Value) -> Result<Value> {
    match value {
        Value::Bytes(_) => Ok(value.clone()),
        Value::Array(rc) => {
            let elements = rc.borrow();
            let mut bytes = Vec::with_capacity(elements.len());
            for element in elements.iter() {
                let n = element
                    .as_f64()
                    .ok_or_else(|| CodecError::invalid_type(element.describe(), "byte"))?;
                bytes.push(n as u8);
            }
            Ok(Value::bytes(bytes))
        }
        Value::String(s) => Ok(Value::bytes(s.as_bytes().to_vec())),
        other => Err(CodecError::invalid_type(other.describe(), "byte array")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::{coerce, coerce_strict, NumberKind, NumberType};
    use crate::config::CodecContext;
    use crate::registry::TypeRegistry;
    use std::sync::Arc;

    fn ctx() -> CodecContext {
        CodecContext::new(Default::default(), Arc::new(TypeRegistry::new()))
    }

    fn int_array() -> TypeDescriptor {
        TypeDescriptor::Array(Box::new(TypeDescriptor::Number(NumberType::of(
            NumberKind::I32,
        ))))
    }

    #[test]
    fn test_array_elements_coerced() {
        let source = Value::array(vec![Value::Number(1.5), Value::from("2"), Value::Int(3)]);
        match coerce(&source, &int_array(), &ctx()).unwrap() {
            Value::Array(rc) => {
                assert_eq!(*rc.borrow(), vec![Value::Int(1), Value::Int(2), Value::Int(3)])
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_lenient_failure_becomes_null_slot() {
        let source = Value::array(vec![Value::Int(1), Value::from("nope"), Value::Int(3)]);
        match coerce(&source, &int_array(), &ctx()).unwrap() {
            Value::Array(rc) => {
                assert_eq!(
                    *rc.borrow(),
                    vec![Value::Int(1), Value::Null, Value::Int(3)]
                )
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_strict_failure_propagates() {
        let source = Value::array(vec![Value::Int(1), Value::from("nope")]);
        assert!(coerce_strict(&source, &int_array(), &ctx()).is_err());
    }

    #[test]
    fn test_string_to_char_array() {
        let desired = TypeDescriptor::Array(Box::new(TypeDescriptor::Char));
        match coerce(&Value::from("hi"), &desired, &ctx()).unwrap() {
            Value::Array(rc) => {
                assert_eq!(*rc.borrow(), vec![Value::Char('h'), Value::Char('i')])
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_cyclic_array_folds_onto_itself() {
        let source = Value::array(vec![Value::Int(1)]);
        if let Value::Array(rc) = &source {
            let cycle = source.clone();
            rc.borrow_mut().push(cycle);
        }

        let desired = TypeDescriptor::Array(Box::new(TypeDescriptor::Any));
        let result = coerce(&source, &desired, &ctx()).unwrap();
        match &result {
            Value::Array(rc) => {
                let elements = rc.borrow();
                assert_eq!(elements.len(), 2);
                assert!(elements[1].same_identity(&result));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_sorted_map() {
        let mut map = OrderedMap::new();
        map.insert("z".into(), Value::Int(1));
        map.insert("a".into(), Value::Int(2));
        let source = Value::map(map);

        match coerce(&source, &TypeDescriptor::Map { sorted: true }, &ctx()).unwrap() {
            Value::Map(rc) => {
                let keys: Vec<String> = rc.borrow().keys().map(str::to_string).collect();
                assert_eq!(keys, vec!["a", "z"]);
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_map_source_passes_through_with_identity() {
        let mut map = OrderedMap::new();
        map.insert("k".into(), Value::Int(9));
        let source = Value::map(map);

        let result = coerce(&source, &TypeDescriptor::Map { sorted: false }, &ctx()).unwrap();
        assert!(result.same_identity(&source));
    }

    #[test]
    fn test_record_members_to_map() {
        let mut record = crate::amf::Record::typed("t");
        record.members.insert("k".into(), Value::Int(9));
        let source = Value::record(record);

        match coerce(&source, &TypeDescriptor::Map { sorted: false }, &ctx()).unwrap() {
            Value::Map(rc) => assert_eq!(rc.borrow().get("k"), Some(&Value::Int(9))),
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_bytes_from_number_array() {
        let source = Value::array(vec![Value::Int(0), Value::Number(255.0)]);
        match coerce(&source, &TypeDescriptor::Bytes, &ctx()).unwrap() {
            Value::Bytes(rc) => assert_eq!(*rc.borrow(), vec![0u8, 255]),
            other => panic!("expected bytes, got {other:?}"),
        }
    }
}
