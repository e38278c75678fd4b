//! Record coercion: wire records onto registered types through their
//! property accessors

use std::sync::Arc;

use crate::amf::value::Value;
use crate::coerce::{Coercer, NumberKind, TypeDescriptor};
use crate::error::{CodecError, Result};
use crate::registry::{DynamicAccessor, PropertyAccessor};

pub(crate) fn coerce_record(coercer: &mut Coercer, value: &Value, name: &str) -> Result<Value> {
    let members = source_members(value)?;

    let accessor: Arc<dyn PropertyAccessor> = match coercer.ctx.registry.accessor_for(name) {
        Some(accessor) => accessor,
        None if coercer.ctx.config.create_dynamic_for_missing_type => Arc::new(DynamicAccessor),
        None => return Err(CodecError::UnresolvableType(name.to_string())),
    };

    let instance = accessor.new_instance();
    // Remember the shell before member recursion so back-references land on
    // this instance
    coercer.remember(value, instance.clone());

    let ignore = coercer.ctx.config.ignore_property_errors;
    let log = coercer.ctx.config.log_property_errors;
    for (member_name, member_value) in members {
        let declared = accessor.declared_type(&member_name);
        let coerced = match coercer.coerce(&member_value, &declared) {
            Ok(v) => v,
            Err(err) if err.is_recoverable() && ignore => {
                if log {
                    tracing::warn!(property = %member_name, error = %err, "skipping property");
                }
                continue;
            }
            Err(err) => return Err(err),
        };
        if let Err(err) = accessor.set(&instance, &member_name, coerced) {
            if err.is_recoverable() && ignore {
                if log {
                    tracing::warn!(property = %member_name, error = %err, "skipping property");
                }
            } else {
                return Err(err);
            }
        }
    }

    fill_defaults(&*accessor, &instance);

    let finished = accessor.instance_complete(instance.clone());
    if !finished.same_identity(&instance) {
        coercer.replace_known(value, finished.clone());
    }
    Ok(finished)
}

/// Open-record target: members resolve in place, the handle survives
pub(crate) fn coerce_dynamic(coercer: &mut Coercer, value: &Value) -> Result<Value> {
    match value {
        Value::Record(rc) => {
            coercer.remember(value, value.clone());
            let names: Vec<String> = rc.borrow().members.keys().map(str::to_string).collect();
            for name in names {
                let member = rc
                    .borrow()
                    .members
                    .get(&name)
                    .cloned()
                    .unwrap_or(Value::Null);
                let resolved = coercer.element_or_null(&member, &TypeDescriptor::Any)?;
                rc.borrow_mut().members.insert(name, resolved);
            }
            Ok(value.clone())
        }
        Value::Map(rc) => {
            coercer.remember(value, value.clone());
            let keys: Vec<String> = rc.borrow().keys().map(str::to_string).collect();
            for key in keys {
                let member = rc.borrow().get(&key).cloned().unwrap_or(Value::Null);
                let resolved = coercer.element_or_null(&member, &TypeDescriptor::Any)?;
                rc.borrow_mut().insert(key, resolved);
            }
            Ok(value.clone())
        }
        other => Err(CodecError::invalid_type(other.describe(), "dynamic record")),
    }
}

fn source_members(value: &Value) -> Result<Vec<(String, Value)>> {
    match value {
        Value::Record(rc) => Ok(rc
            .borrow()
            .members
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()),
        Value::Map(rc) => Ok(rc
            .borrow()
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()),
        other => Err(CodecError::invalid_type(other.describe(), "record")),
    }
}

/// Declared members the wire never mentioned settle on their zero values
fn fill_defaults(accessor: &dyn PropertyAccessor, instance: &Value) {
    for name in accessor.member_names(instance) {
        if !matches!(accessor.get(instance, &name), Value::Undefined) {
            continue;
        }
        let default = match accessor.declared_type(&name) {
            TypeDescriptor::Number(nt) if !nt.nullable => match nt.kind {
                NumberKind::I64 | NumberKind::I32 | NumberKind::I16 | NumberKind::I8 => {
                    Value::Int(0)
                }
                _ => Value::Number(0.0),
            },
            TypeDescriptor::Bool => Value::Bool(false),
            TypeDescriptor::Char => Value::Char('\0'),
            _ => Value::Null,
        };
        let _ = accessor.set(instance, &name, default);
    }
}
