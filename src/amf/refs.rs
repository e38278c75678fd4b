//! Reference tables for both codec directions.
//!
//! The encode side maps value identity to a table index; the decode side is
//! the inverse, a dense table indexed by position. Both sides must register
//! a value *before* descending into its contents so cyclic graphs terminate
//! and back-references resolve to the same handle.

use std::collections::HashMap;

use crate::amf::{Traits, Value};
use crate::error::{CodecError, Result};

/// Encode-side tables: object identity, string and traits interning.
///
/// The legacy format only uses the object table; the modern format uses all
/// three, each with its own index space.
#[derive(Debug, Default)]
pub(crate) struct EncodeRefs {
    objects: HashMap<usize, u32>,
    object_count: u32,
    strings: HashMap<String, u32>,
    traits: HashMap<Traits, u32>,
}

impl EncodeRefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_index(&self, value: &Value) -> Option<u32> {
        value.identity().and_then(|id| self.objects.get(&id).copied())
    }

    /// Register a value in the object table. Always consumes an index, even
    /// when the identity was seen before, so encode and decode tables stay
    /// aligned with what actually went inline on the wire.
    pub fn register_object(&mut self, value: &Value) -> u32 {
        let index = self.object_count;
        self.object_count += 1;
        if let Some(id) = value.identity() {
            self.objects.insert(id, index);
        }
        index
    }

    /// Consume an object-table index for a value with no trackable identity
    /// (inline XML in the modern format)
    pub fn register_anonymous(&mut self) -> u32 {
        let index = self.object_count;
        self.object_count += 1;
        index
    }

    pub fn string_index(&self, s: &str) -> Option<u32> {
        self.strings.get(s).copied()
    }

    pub fn register_string(&mut self, s: &str) {
        let index = self.strings.len() as u32;
        self.strings.entry(s.to_string()).or_insert(index);
    }

    pub fn traits_index(&self, traits: &Traits) -> Option<u32> {
        self.traits.get(traits).copied()
    }

    pub fn register_traits(&mut self, traits: Traits) {
        let index = self.traits.len() as u32;
        self.traits.entry(traits).or_insert(index);
    }

    pub fn reset(&mut self) {
        self.objects.clear();
        self.object_count = 0;
        self.strings.clear();
        self.traits.clear();
    }
}

/// Decode-side tables: values, strings and traits by wire index
#[derive(Debug, Default)]
pub(crate) struct DecodeRefs {
    objects: Vec<Value>,
    strings: Vec<String>,
    traits: Vec<Traits>,
}

impl DecodeRefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a value into the object table, returning its index. Must happen
    /// before the value's children are read.
    pub fn register_object(&mut self, value: Value) -> usize {
        self.objects.push(value);
        self.objects.len() - 1
    }

    /// Swap the value held at an already-registered index. Used when a
    /// decoded wrapper collapses to its payload after registration.
    pub fn replace_object(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.objects.get_mut(index) {
            *slot = value;
        }
    }

    pub fn object(&self, index: usize) -> Result<Value> {
        self.objects
            .get(index)
            .cloned()
            .ok_or_else(|| CodecError::malformed(format!("object reference {index} out of range")))
    }

    pub fn register_string(&mut self, s: String) {
        self.strings.push(s);
    }

    pub fn string(&self, index: usize) -> Result<String> {
        self.strings
            .get(index)
            .cloned()
            .ok_or_else(|| CodecError::malformed(format!("string reference {index} out of range")))
    }

    pub fn register_traits(&mut self, traits: Traits) {
        self.traits.push(traits);
    }

    pub fn traits(&self, index: usize) -> Result<Traits> {
        self.traits
            .get(index)
            .cloned()
            .ok_or_else(|| CodecError::malformed(format!("traits reference {index} out of range")))
    }

    pub fn reset(&mut self) {
        self.objects.clear();
        self.strings.clear();
        self.traits.clear();
    }
}
