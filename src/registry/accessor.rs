//! Property access seam between the codec and concrete record types.
//!
//! The readers and coercers never touch record members directly; they go
//! through a [`PropertyAccessor`] so applications can plug in validation,
//! substitution and custom instantiation per registered type.

use std::sync::Arc;

use crate::amf::value::{Record, Value};
use crate::coerce::TypeDescriptor;
use crate::error::{CodecError, Result};
use crate::registry::TypeSchema;

/// Member-level access to one registered type.
///
/// Implementations must be shareable across concurrent codec passes; they
/// see instances but hold no per-instance state themselves.
pub trait PropertyAccessor: Send + Sync {
    /// Wire type name for an instance, if it has one
    fn type_name(&self, instance: &Value) -> Option<String>;

    /// Whether members beyond the declared set are accepted
    fn is_dynamic(&self) -> bool;

    /// Member names to serialize, in wire order
    fn member_names(&self, instance: &Value) -> Vec<String>;

    /// Declared member type, for coercion of incoming values
    fn declared_type(&self, _member: &str) -> TypeDescriptor {
        TypeDescriptor::Any
    }

    fn get(&self, instance: &Value, member: &str) -> Value;

    fn set(&self, instance: &Value, member: &str, value: Value) -> Result<()>;

    /// Fresh, empty instance for decoding into
    fn new_instance(&self) -> Value;

    /// Optionally substitute another value to serialize in place of the
    /// instance. Returning null here after the instance entered the
    /// reference table is an error the writer surfaces.
    fn instance_to_serialize(&self, _instance: &Value) -> Option<Value> {
        None
    }

    /// Hook invoked after all members were assigned; may return a
    /// replacement instance
    fn instance_complete(&self, instance: Value) -> Value {
        instance
    }
}

/// What the writers emit for an instance handled by a custom accessor: the
/// substituted instance when one is provided, otherwise a record built from
/// the accessor's member view
pub(crate) fn serialized_form(accessor: &dyn PropertyAccessor, instance: &Value) -> Value {
    if let Some(substitute) = accessor.instance_to_serialize(instance) {
        return substitute;
    }
    let mut record = match accessor.type_name(instance) {
        Some(name) => Record::typed(name),
        None => Record::anonymous(),
    };
    for name in accessor.member_names(instance) {
        let member = accessor.get(instance, &name);
        record.members.insert(name, member);
    }
    Value::record(record)
}

/// Fallback accessor for anonymous and unresolvable records: everything is
/// dynamic, every assignment sticks
#[derive(Debug, Default)]
pub struct DynamicAccessor;

impl PropertyAccessor for DynamicAccessor {
    fn type_name(&self, instance: &Value) -> Option<String> {
        match instance {
            Value::Record(rc) => rc.borrow().type_name.clone(),
            _ => None,
        }
    }

    fn is_dynamic(&self) -> bool {
        true
    }

    fn member_names(&self, instance: &Value) -> Vec<String> {
        match instance {
            Value::Record(rc) => rc.borrow().members.keys().map(str::to_string).collect(),
            Value::Map(rc) => rc.borrow().keys().map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }

    fn get(&self, instance: &Value, member: &str) -> Value {
        instance.get_member(member).unwrap_or(Value::Undefined)
    }

    fn set(&self, instance: &Value, member: &str, value: Value) -> Result<()> {
        match instance {
            Value::Record(rc) => {
                rc.borrow_mut().members.insert(member.to_string(), value);
                Ok(())
            }
            Value::Map(rc) => {
                rc.borrow_mut().insert(member.to_string(), value);
                Ok(())
            }
            other => Err(CodecError::PropertyAssignment {
                property: member.to_string(),
                reason: format!("{} has no members", other.describe()),
            }),
        }
    }

    fn new_instance(&self) -> Value {
        Value::record(Record::anonymous())
    }
}

/// Accessor derived from a registered [`TypeSchema`]: declared members are
/// typed, extra members are rejected unless the schema is dynamic
#[derive(Debug)]
pub struct SchemaAccessor {
    schema: Arc<TypeSchema>,
}

impl SchemaAccessor {
    pub fn new(schema: Arc<TypeSchema>) -> Self {
        Self { schema }
    }
}

impl PropertyAccessor for SchemaAccessor {
    fn type_name(&self, _instance: &Value) -> Option<String> {
        Some(self.schema.name.clone())
    }

    fn is_dynamic(&self) -> bool {
        self.schema.dynamic
    }

    fn member_names(&self, instance: &Value) -> Vec<String> {
        if self.schema.dynamic {
            match instance {
                Value::Record(rc) => rc.borrow().members.keys().map(str::to_string).collect(),
                _ => Vec::new(),
            }
        } else {
            self.schema.members.iter().map(|(n, _)| n.clone()).collect()
        }
    }

    fn declared_type(&self, member: &str) -> TypeDescriptor {
        self.schema
            .members
            .iter()
            .find(|(n, _)| n == member)
            .map(|(_, d)| d.clone())
            .unwrap_or(TypeDescriptor::Any)
    }

    fn get(&self, instance: &Value, member: &str) -> Value {
        instance.get_member(member).unwrap_or(Value::Undefined)
    }

    fn set(&self, instance: &Value, member: &str, value: Value) -> Result<()> {
        let declared = self.schema.members.iter().any(|(n, _)| n == member);
        if !declared && !self.schema.dynamic {
            return Err(CodecError::PropertyAssignment {
                property: member.to_string(),
                reason: format!("no such member on sealed type '{}'", self.schema.name),
            });
        }
        match instance {
            Value::Record(rc) => {
                rc.borrow_mut().members.insert(member.to_string(), value);
                Ok(())
            }
            other => Err(CodecError::PropertyAssignment {
                property: member.to_string(),
                reason: format!("{} has no members", other.describe()),
            }),
        }
    }

    fn new_instance(&self) -> Value {
        let record = if self.schema.dynamic {
            Record::typed(self.schema.name.clone())
        } else {
            Record::sealed(self.schema.name.clone())
        };
        Value::record(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_accessor_accepts_anything() {
        let accessor = DynamicAccessor;
        let instance = accessor.new_instance();
        accessor.set(&instance, "anything", Value::Int(1)).unwrap();
        assert_eq!(accessor.get(&instance, "anything"), Value::Int(1));
        assert_eq!(accessor.get(&instance, "missing"), Value::Undefined);
        assert_eq!(accessor.member_names(&instance), vec!["anything"]);
    }

    #[test]
    fn test_schema_accessor_seals_members() {
        let schema = Arc::new(
            TypeSchema::new("com.example.Point")
                .member("x", TypeDescriptor::Number(Default::default()))
                .member("y", TypeDescriptor::Number(Default::default())),
        );
        let accessor = SchemaAccessor::new(schema);
        let instance = accessor.new_instance();

        accessor.set(&instance, "x", Value::Number(1.0)).unwrap();
        let err = accessor
            .set(&instance, "z", Value::Number(2.0))
            .unwrap_err();
        assert!(matches!(err, CodecError::PropertyAssignment { .. }));
        assert!(err.is_recoverable());

        assert_eq!(accessor.member_names(&instance), vec!["x", "y"]);
    }
}
