//! Type-directed coercion from parsed values to desired shapes.
//!
//! Decoding is two-staged: the wire readers produce a loose [`Value`] tree,
//! then a [`Coercer`] folds it into the shapes the application declared.
//! The coercer keeps a table of already-coerced results keyed by source
//! identity, so shared and cyclic structure survives the fold and cyclic
//! graphs terminate.

mod container;
mod date;
mod number;
mod record;

use std::collections::HashMap;

use crate::amf::value::{DateKind, Value};
use crate::config::CodecContext;
use crate::error::{CodecError, Result};

/// Desired shape for a coercion target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    /// Anything; typed records still resolve against the registry when the
    /// context enables instantiation
    Any,
    Bool,
    Number(NumberType),
    Char,
    Str,
    Date(DateKind),
    /// Enumeration registered under this name
    Enum(String),
    /// Dense array with an element shape
    Array(Box<TypeDescriptor>),
    /// String-keyed map, optionally key-sorted
    Map { sorted: bool },
    /// Record registered under this name
    Record(String),
    /// Open record, no resolution attempted
    Dynamic,
    Bytes,
}

/// Numeric target: width plus whether null is representable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NumberType {
    pub kind: NumberKind,
    pub nullable: bool,
}

impl NumberType {
    pub fn of(kind: NumberKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    pub fn nullable(kind: NumberKind) -> Self {
        Self {
            kind,
            nullable: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberKind {
    #[default]
    F64,
    F32,
    I64,
    I32,
    I16,
    I8,
    /// Arbitrary-precision integer, travels as a string
    BigInt,
    /// Arbitrary-precision decimal, travels as a string
    BigDecimal,
}

/// How array element coercion failures are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayPolicy {
    /// A failed element becomes a null slot; the rest of the array survives
    #[default]
    Lenient,
    /// A failed element fails the whole array
    Strict,
}

/// One coercion pass over a value graph.
///
/// Not shareable across threads; build one per pass. [`coerce`] and
/// [`coerce_strict`] wrap the common cases.
pub struct Coercer {
    pub(crate) ctx: CodecContext,
    pub(crate) known: HashMap<usize, Value>,
    pub(crate) policy: ArrayPolicy,
    resolve_types: bool,
}

impl Coercer {
    pub fn new(ctx: CodecContext) -> Self {
        let resolve_types = ctx.config.instantiate_types;
        Self {
            ctx,
            known: HashMap::new(),
            policy: ArrayPolicy::Lenient,
            resolve_types,
        }
    }

    pub fn with_policy(mut self, policy: ArrayPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Coerce one value to the desired shape
    pub fn coerce(&mut self, value: &Value, desired: &TypeDescriptor) -> Result<Value> {
        if let Some(id) = value.identity() {
            if let Some(done) = self.known.get(&id) {
                return Ok(done.clone());
            }
        }

        if value.is_null_or_undefined() {
            return Ok(null_for(desired));
        }

        match desired {
            TypeDescriptor::Any => self.coerce_any(value),
            TypeDescriptor::Bool => coerce_bool(value),
            TypeDescriptor::Number(nt) => number::coerce_number(value, *nt),
            TypeDescriptor::Char => coerce_char(value),
            TypeDescriptor::Str => coerce_string(value),
            TypeDescriptor::Date(kind) => date::coerce_date(value, *kind),
            TypeDescriptor::Enum(name) => self.coerce_enum(value, name),
            TypeDescriptor::Array(element) => container::coerce_array(self, value, element),
            TypeDescriptor::Map { sorted } => container::coerce_map(self, value, *sorted),
            TypeDescriptor::Record(name) => record::coerce_record(self, value, name),
            TypeDescriptor::Dynamic => record::coerce_dynamic(self, value),
            TypeDescriptor::Bytes => container::coerce_bytes(value),
        }
    }

    /// Untyped target: typed records still resolve, containers are walked
    /// in place so their identity is preserved
    fn coerce_any(&mut self, value: &Value) -> Result<Value> {
        if !self.resolve_types {
            return Ok(value.clone());
        }
        match value {
            Value::Record(rc) => {
                let type_name = rc.borrow().type_name.clone();
                match type_name {
                    Some(name) => self.coerce(value, &TypeDescriptor::Record(name)),
                    None => record::coerce_dynamic(self, value),
                }
            }
            Value::Array(rc) => {
                self.remember(value, value.clone());
                let len = rc.borrow().len();
                for index in 0..len {
                    let element = rc.borrow()[index].clone();
                    let resolved = self.element_or_null(&element, &TypeDescriptor::Any)?;
                    rc.borrow_mut()[index] = resolved;
                }
                Ok(value.clone())
            }
            Value::Map(rc) => {
                self.remember(value, value.clone());
                let keys: Vec<String> = rc.borrow().keys().map(str::to_string).collect();
                for key in keys {
                    let member = rc.borrow().get(&key).cloned().unwrap_or(Value::Null);
                    let resolved = self.element_or_null(&member, &TypeDescriptor::Any)?;
                    rc.borrow_mut().insert(key, resolved);
                }
                Ok(value.clone())
            }
            other => Ok(other.clone()),
        }
    }

    fn coerce_enum(&mut self, value: &Value, name: &str) -> Result<Value> {
        let schema = self
            .ctx
            .registry
            .enum_schema(name)
            .ok_or_else(|| CodecError::UnresolvableType(name.to_string()))?;
        let variant = match value {
            Value::Enum { variant, .. } => variant.clone(),
            Value::String(s) => s.clone(),
            other => return Err(CodecError::invalid_type(other.describe(), &schema.name)),
        };
        // Exact symbolic name, case-sensitive
        if !schema.has_variant(&variant) {
            return Err(CodecError::invalid_type(
                format!("string \"{variant}\""),
                &schema.name,
            ));
        }
        Ok(Value::enumeration(schema.name.clone(), variant))
    }

    /// Element coercion honoring the array failure policy
    pub(crate) fn element_or_null(
        &mut self,
        element: &Value,
        desired: &TypeDescriptor,
    ) -> Result<Value> {
        match self.coerce(element, desired) {
            Ok(v) => Ok(v),
            Err(err) if err.is_recoverable() && self.policy == ArrayPolicy::Lenient => {
                tracing::debug!(error = %err, "element coercion failed, using null");
                Ok(Value::Null)
            }
            Err(err) => Err(err),
        }
    }

    /// Enter a result into the known-objects table before recursing into
    /// the source's children
    pub(crate) fn remember(&mut self, source: &Value, result: Value) {
        if let Some(id) = source.identity() {
            self.known.insert(id, result);
        }
    }

    /// Replace a remembered result (accessor completion hooks)
    pub(crate) fn replace_known(&mut self, source: &Value, result: Value) {
        if let Some(id) = source.identity() {
            self.known.insert(id, result);
        }
    }
}

/// Null source mapped onto the target shape
fn null_for(desired: &TypeDescriptor) -> Value {
    match desired {
        TypeDescriptor::Bool => Value::Bool(false),
        TypeDescriptor::Char => Value::Char('\0'),
        TypeDescriptor::Number(nt) if !nt.nullable => match nt.kind {
            NumberKind::I64 | NumberKind::I32 | NumberKind::I16 | NumberKind::I8 => Value::Int(0),
            _ => Value::Number(0.0),
        },
        _ => Value::Null,
    }
}

fn coerce_bool(value: &Value) -> Result<Value> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::String(s) => Ok(Value::Bool(s.eq_ignore_ascii_case("true"))),
        other => Err(CodecError::invalid_type(other.describe(), "boolean")),
    }
}

fn coerce_char(value: &Value) -> Result<Value> {
    match value {
        Value::Char(c) => Ok(Value::Char(*c)),
        Value::String(s) => Ok(Value::Char(s.chars().next().unwrap_or('\0'))),
        other => Err(CodecError::invalid_type(other.describe(), "character")),
    }
}

fn coerce_string(value: &Value) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(s.clone())),
        Value::Bool(_)
        | Value::Number(_)
        | Value::Int(_)
        | Value::BigNumber(_)
        | Value::Char(_)
        | Value::Enum { .. } => Ok(Value::String(value.key_string())),
        other => Err(CodecError::invalid_type(other.describe(), "string")),
    }
}

/// Coerce with the lenient array policy
pub fn coerce(value: &Value, desired: &TypeDescriptor, ctx: &CodecContext) -> Result<Value> {
    Coercer::new(ctx.clone()).coerce(value, desired)
}

/// Coerce, failing the whole value on any element failure
pub fn coerce_strict(value: &Value, desired: &TypeDescriptor, ctx: &CodecContext) -> Result<Value> {
    Coercer::new(ctx.clone())
        .with_policy(ArrayPolicy::Strict)
        .coerce(value, desired)
}
