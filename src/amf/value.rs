//! The loosely-typed value tree shared by both wire formats
//!
//! `Value` is both the parse result (before coercion) and the object graph
//! handed to the writer. Complex variants hold `Rc` handles so that shared
//! and cyclic structure is expressible: cloning a `Value` clones the handle,
//! not the contents, and the reference tables key off the handle address
//! (see [`Value::identity`]).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Unified AMF value representation
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null (AMF0: 0x05, AMF3: 0x01)
    Null,

    /// Undefined (AMF0: 0x06, AMF3: 0x00)
    Undefined,

    /// Boolean (AMF0: 0x01, AMF3: 0x02/0x03)
    Bool(bool),

    /// IEEE 754 double (AMF0: 0x00, AMF3: 0x05)
    Number(f64),

    /// 29-bit signed integer (AMF3 only: 0x04)
    Int(i32),

    /// Arbitrary-precision number; travels as a string so no precision is
    /// lost through a double round trip
    BigNumber(BigNumber),

    /// Single character; written as a 1-character string
    Char(char),

    /// UTF-8 string (AMF0: 0x02/0x0C, AMF3: 0x06)
    String(String),

    /// Date as milliseconds since the Unix epoch (AMF0: 0x0B, AMF3: 0x08)
    Date(Rc<AmfDate>),

    /// Enumeration constant; written as its symbolic name unless a custom
    /// accessor is registered for the type
    Enum { type_name: String, variant: String },

    /// XML document in textual form (AMF0: 0x0F, AMF3: 0x07/0x0B)
    Xml(String),

    /// Raw byte array (AMF3 only: 0x0C)
    Bytes(Rc<RefCell<Vec<u8>>>),

    /// Dense ordered list (AMF0: 0x0A, AMF3: 0x09 dense portion)
    Array(Rc<RefCell<Vec<Value>>>),

    /// String-keyed, insertion-ordered map (AMF0: 0x08, AMF3: 0x09
    /// associative portion or 0x11 dictionary)
    Map(Rc<RefCell<OrderedMap>>),

    /// Typed or anonymous record (AMF0: 0x03/0x10, AMF3: 0x0A)
    Record(Rc<RefCell<Record>>),
}

impl Value {
    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn map(map: OrderedMap) -> Self {
        Value::Map(Rc::new(RefCell::new(map)))
    }

    pub fn record(record: Record) -> Self {
        Value::Record(Rc::new(RefCell::new(record)))
    }

    pub fn bytes(bytes: Vec<u8>) -> Self {
        Value::Bytes(Rc::new(RefCell::new(bytes)))
    }

    /// Date value carrying epoch milliseconds
    pub fn date(epoch_millis: f64) -> Self {
        Value::Date(Rc::new(AmfDate::new(epoch_millis)))
    }

    pub fn enumeration(type_name: impl Into<String>, variant: impl Into<String>) -> Self {
        Value::Enum {
            type_name: type_name.into(),
            variant: variant.into(),
        }
    }

    /// Stable identity of a reference-tracked value: the handle address.
    /// Scalars have no identity and are never reference-tracked.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Array(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::Map(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::Record(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::Bytes(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::Date(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            _ => None,
        }
    }

    /// Two values referring to the same underlying handle
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Int(i) => Some(*i as f64),
            Value::BigNumber(b) => b.to_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Rc<RefCell<Vec<Value>>>> {
        match self {
            Value::Array(rc) => Some(rc),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Rc<RefCell<Record>>> {
        match self {
            Value::Record(rc) => Some(rc),
            _ => None,
        }
    }

    /// Member lookup on records and maps
    pub fn get_member(&self, name: &str) -> Option<Value> {
        match self {
            Value::Record(rc) => rc.borrow().members.get(name).cloned(),
            Value::Map(rc) => rc.borrow().get(name).cloned(),
            _ => None,
        }
    }

    /// Short human-readable description used in error messages
    pub fn describe(&self) -> String {
        match self {
            Value::Null => "null".into(),
            Value::Undefined => "undefined".into(),
            Value::Bool(b) => format!("boolean {b}"),
            Value::Number(n) => format!("number {n}"),
            Value::Int(i) => format!("integer {i}"),
            Value::BigNumber(b) => format!("big number {}", b.as_str()),
            Value::Char(c) => format!("character '{c}'"),
            Value::String(s) => {
                if s.len() > 32 {
                    format!("string ({} bytes)", s.len())
                } else {
                    format!("string \"{s}\"")
                }
            }
            Value::Date(d) => format!("date {}", d.epoch_millis),
            Value::Enum {
                type_name, variant, ..
            } => format!("enum {type_name}::{variant}"),
            Value::Xml(_) => "xml document".into(),
            Value::Bytes(b) => format!("byte array ({} bytes)", b.borrow().len()),
            Value::Array(a) => format!("array ({} elements)", a.borrow().len()),
            Value::Map(m) => format!("map ({} entries)", m.borrow().len()),
            Value::Record(r) => match &r.borrow().type_name {
                Some(name) => format!("record of type '{name}'"),
                None => "anonymous record".into(),
            },
        }
    }

    /// String form used for dictionary keys and string coercion of scalars
    pub(crate) fn key_string(&self) -> String {
        match self {
            Value::Null | Value::Undefined => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_f64(*n),
            Value::Int(i) => i.to_string(),
            Value::BigNumber(b) => b.as_str().to_string(),
            Value::Char(c) => c.to_string(),
            Value::String(s) => s.clone(),
            Value::Enum { variant, .. } => variant.clone(),
            other => other.describe(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(v: Vec<V>) -> Self {
        Value::array(v.into_iter().map(Into::into).collect())
    }
}

/// Integral doubles print without a trailing `.0` so numeric strings survive
/// a string round trip unchanged
pub(crate) fn format_f64(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// A date-time as a raw epoch-milliseconds double, optionally narrowed to a
/// calendar subtype by coercion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmfDate {
    pub epoch_millis: f64,
    pub kind: DateKind,
}

impl AmfDate {
    pub fn new(epoch_millis: f64) -> Self {
        Self {
            epoch_millis,
            kind: DateKind::DateTime,
        }
    }

    pub fn with_kind(epoch_millis: f64, kind: DateKind) -> Self {
        Self { epoch_millis, kind }
    }
}

/// Target shapes of the date/calendar coercion family. All are views over
/// the same epoch-milliseconds value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DateKind {
    /// Generic date-time
    #[default]
    DateTime,
    /// Calendar date, truncated to the UTC day
    DateOnly,
    /// Time of day, milliseconds within the UTC day
    TimeOnly,
    /// Timestamp with nanosecond resolution derivable from the milliseconds
    Timestamp,
}

/// Arbitrary-precision decimal carried in its textual form.
///
/// Stored exactly as written (sign, digits, optional fraction and exponent);
/// equality is textual. This is what lets big numbers round-trip through the
/// string encoding without ever becoming a double.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigNumber(String);

impl BigNumber {
    /// Validate and wrap a decimal string
    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim();
        if t.is_empty() {
            return None;
        }
        let rest = t.strip_prefix(['+', '-']).unwrap_or(t);
        let (mantissa, exponent) = match rest.split_once(['e', 'E']) {
            Some((m, e)) => (m, Some(e)),
            None => (rest, None),
        };
        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (mantissa, None),
        };
        let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
        let mantissa_ok = match frac_part {
            Some(f) => {
                (digits(int_part) || int_part.is_empty()) && digits(f) && !(int_part.is_empty() && f.is_empty())
            }
            None => digits(int_part),
        };
        if !mantissa_ok {
            return None;
        }
        if let Some(e) = exponent {
            let e = e.strip_prefix(['+', '-']).unwrap_or(e);
            if !digits(e) {
                return None;
            }
        }
        Some(BigNumber(t.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lossy conversion; only used when the legacy double path is configured
    pub fn to_f64(&self) -> Option<f64> {
        self.0.parse().ok()
    }

    /// No fractional part or exponent
    pub fn is_integral(&self) -> bool {
        !self.0.contains(['.', 'e', 'E'])
    }
}

impl fmt::Display for BigNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// String-keyed map preserving insertion order.
///
/// AMF associative structures are small and order-sensitive on the wire, so
/// a pair vector beats hashing here; lookups are linear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedMap {
    entries: Vec<(String, Value)>,
}

impl OrderedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace; a replaced key keeps its original position
    pub fn insert(&mut self, key: String, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Re-order entries by key; used when coercing to a sorted map target
    pub fn sort_keys(&mut self) {
        self.entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    }
}

impl FromIterator<(String, Value)> for OrderedMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut map = OrderedMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// A typed or anonymous record: the decoded form of an AMF object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    /// Wire type name; `None` for anonymous objects
    pub type_name: Option<String>,
    /// Whether members beyond the declared set are permitted
    pub dynamic: bool,
    pub members: OrderedMap,
}

impl Record {
    /// Open record with a wire type name, as produced by the parse stage
    pub fn typed(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            dynamic: true,
            members: OrderedMap::new(),
        }
    }

    /// Anonymous open record
    pub fn anonymous() -> Self {
        Self {
            type_name: None,
            dynamic: true,
            members: OrderedMap::new(),
        }
    }

    /// Sealed record for a resolved concrete type
    pub fn sealed(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            dynamic: false,
            members: OrderedMap::new(),
        }
    }
}
