//! Modern (AMF3) reader and writer
//!
//! AMF3 compresses aggressively: integers travel as variable-length u29,
//! strings, object traits and whole objects are interned in three separate
//! reference tables, and a value's low bit distinguishes an inline payload
//! (1) from a table reference (0). A reader and writer stay aligned because
//! both sides consume table indices in the exact same order, whether or not
//! deduplication actually hits.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::rc::Rc;

use crate::amf::markers::amf3 as marker;
use crate::amf::markers::INITIAL_COLLECTION_CAPACITY;
use crate::amf::refs::{DecodeRefs, EncodeRefs};
use crate::amf::value::{OrderedMap, Record, Value};
use crate::amf::Traits;
use crate::config::CodecContext;
use crate::error::{CodecError, Result};
use crate::registry::serialized_form;

/// Modern-format reader
pub struct Amf3Reader {
    ctx: CodecContext,
    refs: DecodeRefs,
    depth: usize,
    collection_depth: usize,
}

impl Amf3Reader {
    pub fn new(ctx: CodecContext) -> Self {
        Self {
            ctx,
            refs: DecodeRefs::new(),
            depth: 0,
            collection_depth: 0,
        }
    }

    pub fn reset(&mut self) {
        self.refs.reset();
        self.depth = 0;
        self.collection_depth = 0;
    }

    /// Read one value from the buffer
    pub fn read_value(&mut self, buf: &mut Bytes) -> Result<Value> {
        if !buf.has_remaining() {
            return Err(CodecError::eof());
        }

        self.depth += 1;
        if self.depth > self.ctx.config.max_object_nest_level {
            return Err(CodecError::NestingTooDeep(
                self.ctx.config.max_object_nest_level,
            ));
        }

        let m = buf.get_u8();
        let result = self.read_marked(m, buf);
        self.depth -= 1;
        result
    }

    fn read_marked(&mut self, m: u8, buf: &mut Bytes) -> Result<Value> {
        match m {
            marker::UNDEFINED => Ok(Value::Undefined),
            marker::NULL => Ok(Value::Null),
            marker::FALSE => Ok(Value::Bool(false)),
            marker::TRUE => Ok(Value::Bool(true)),
            marker::INTEGER => {
                let n = read_u29(buf)?;
                // Sign-extend from 29 bits
                Ok(Value::Int(((n << 3) as i32) >> 3))
            }
            marker::DOUBLE => {
                ensure(buf, 8)?;
                Ok(Value::Number(buf.get_f64()))
            }
            marker::STRING => Ok(Value::String(self.read_string(buf)?)),
            marker::XML_DOC | marker::XML => self.read_xml(buf),
            marker::DATE => self.read_date(buf),
            marker::ARRAY => self.read_array(buf),
            marker::OBJECT => self.read_object(buf),
            marker::BYTE_ARRAY => self.read_byte_array(buf),
            marker::VECTOR_INT | marker::VECTOR_UINT | marker::VECTOR_DOUBLE => {
                self.read_scalar_vector(m, buf)
            }
            marker::VECTOR_OBJECT => self.read_object_vector(buf),
            marker::DICTIONARY => self.read_dictionary(buf),
            other => Err(CodecError::unknown_marker(other)),
        }
    }

    /// Reference-or-inline string against the string table. The empty
    /// string is always inline and never interned.
    fn read_string(&mut self, buf: &mut Bytes) -> Result<String> {
        let n = read_u29(buf)?;
        if n & 1 == 0 {
            return self.refs.string((n >> 1) as usize);
        }
        let len = (n >> 1) as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let s = read_utf_body(buf, len, self.ctx.config.max_string_bytes)?;
        self.refs.register_string(s.clone());
        Ok(s)
    }

    fn read_xml(&mut self, buf: &mut Bytes) -> Result<Value> {
        let n = read_u29(buf)?;
        if n & 1 == 0 {
            return self.refs.object((n >> 1) as usize);
        }
        let len = (n >> 1) as usize;
        let s = read_utf_body(buf, len, self.ctx.config.max_string_bytes)?;
        let value = Value::Xml(s);
        self.refs.register_object(value.clone());
        Ok(value)
    }

    fn read_date(&mut self, buf: &mut Bytes) -> Result<Value> {
        let n = read_u29(buf)?;
        if n & 1 == 0 {
            return self.refs.object((n >> 1) as usize);
        }
        ensure(buf, 8)?;
        let value = Value::date(buf.get_f64());
        self.refs.register_object(value.clone());
        Ok(value)
    }

    fn read_array(&mut self, buf: &mut Bytes) -> Result<Value> {
        let n = read_u29(buf)?;
        if n & 1 == 0 {
            return self.refs.object((n >> 1) as usize);
        }
        let dense_len = (n >> 1) as usize;

        self.enter_collection()?;
        let first_key = self.read_string(buf)?;
        let result = if first_key.is_empty() {
            // Pure dense array
            let capacity = dense_len.min(INITIAL_COLLECTION_CAPACITY);
            let handle = Rc::new(std::cell::RefCell::new(Vec::with_capacity(capacity)));
            self.refs.register_object(Value::Array(Rc::clone(&handle)));
            for _ in 0..dense_len {
                let element = self.read_value(buf)?;
                handle.borrow_mut().push(element);
            }
            Value::Array(handle)
        } else {
            // Mixed array: associative entries, then the dense portion under
            // stringified indices
            let handle = Rc::new(std::cell::RefCell::new(OrderedMap::new()));
            self.refs.register_object(Value::Map(Rc::clone(&handle)));
            let mut key = first_key;
            loop {
                let value = self.read_value(buf)?;
                handle.borrow_mut().insert(key, value);
                key = self.read_string(buf)?;
                if key.is_empty() {
                    break;
                }
            }
            for index in 0..dense_len {
                let element = self.read_value(buf)?;
                handle.borrow_mut().insert(index.to_string(), element);
            }
            Value::Map(handle)
        };
        self.collection_depth -= 1;
        Ok(result)
    }

    fn read_object(&mut self, buf: &mut Bytes) -> Result<Value> {
        let n = read_u29(buf)?;
        if n & 1 == 0 {
            return self.refs.object((n >> 1) as usize);
        }

        let traits = if n & 0b10 == 0 {
            self.refs.traits((n >> 2) as usize)?
        } else {
            let externalizable = n & 0b100 != 0;
            let dynamic = n & 0b1000 != 0;
            let member_count = (n >> 4) as usize;
            let type_name = self.read_string(buf)?;
            if externalizable {
                // Opaque custom encoding; the payload length is unknowable
                // so the stream cannot be resynchronized past it
                return Err(CodecError::malformed(format!(
                    "externalizable type '{type_name}' is not supported"
                )));
            }
            let mut members = Vec::with_capacity(member_count.min(INITIAL_COLLECTION_CAPACITY));
            for _ in 0..member_count {
                members.push(self.read_string(buf)?);
            }
            let traits = Traits {
                type_name: if type_name.is_empty() {
                    None
                } else {
                    Some(type_name)
                },
                dynamic,
                externalizable: false,
                members,
            };
            self.refs.register_traits(traits.clone());
            traits
        };

        let record = Record {
            type_name: traits.type_name.clone(),
            dynamic: traits.dynamic,
            members: OrderedMap::with_capacity(traits.members.len()),
        };
        let handle = Rc::new(std::cell::RefCell::new(record));
        self.refs.register_object(Value::Record(Rc::clone(&handle)));

        for name in &traits.members {
            let value = self.read_value(buf)?;
            handle.borrow_mut().members.insert(name.clone(), value);
        }
        if traits.dynamic {
            loop {
                let name = self.read_string(buf)?;
                if name.is_empty() {
                    break;
                }
                let value = self.read_value(buf)?;
                handle.borrow_mut().members.insert(name, value);
            }
        }

        Ok(Value::Record(handle))
    }

    fn read_byte_array(&mut self, buf: &mut Bytes) -> Result<Value> {
        let n = read_u29(buf)?;
        if n & 1 == 0 {
            return self.refs.object((n >> 1) as usize);
        }
        let len = (n >> 1) as usize;
        ensure(buf, len)?;
        let bytes = buf.copy_to_bytes(len).to_vec();
        let value = Value::bytes(bytes);
        self.refs.register_object(value.clone());
        Ok(value)
    }

    fn read_scalar_vector(&mut self, m: u8, buf: &mut Bytes) -> Result<Value> {
        let n = read_u29(buf)?;
        if n & 1 == 0 {
            return self.refs.object((n >> 1) as usize);
        }
        let len = (n >> 1) as usize;
        ensure(buf, 1)?;
        let _fixed = buf.get_u8();

        let width = if m == marker::VECTOR_DOUBLE { 8 } else { 4 };
        ensure(buf, len.saturating_mul(width))?;

        let handle = Rc::new(std::cell::RefCell::new(Vec::with_capacity(
            len.min(INITIAL_COLLECTION_CAPACITY),
        )));
        self.refs.register_object(Value::Array(Rc::clone(&handle)));
        for _ in 0..len {
            let element = match m {
                marker::VECTOR_INT => Value::Int(buf.get_i32()),
                marker::VECTOR_UINT => Value::Number(f64::from(buf.get_u32())),
                _ => Value::Number(buf.get_f64()),
            };
            handle.borrow_mut().push(element);
        }
        Ok(Value::Array(handle))
    }

    fn read_object_vector(&mut self, buf: &mut Bytes) -> Result<Value> {
        let n = read_u29(buf)?;
        if n & 1 == 0 {
            return self.refs.object((n >> 1) as usize);
        }
        let len = (n >> 1) as usize;
        ensure(buf, 1)?;
        let _fixed = buf.get_u8();
        let _element_type = self.read_string(buf)?;

        let handle = Rc::new(std::cell::RefCell::new(Vec::with_capacity(
            len.min(INITIAL_COLLECTION_CAPACITY),
        )));
        self.refs.register_object(Value::Array(Rc::clone(&handle)));
        for _ in 0..len {
            let element = self.read_value(buf)?;
            handle.borrow_mut().push(element);
        }
        Ok(Value::Array(handle))
    }

    fn read_dictionary(&mut self, buf: &mut Bytes) -> Result<Value> {
        let n = read_u29(buf)?;
        if n & 1 == 0 {
            return self.refs.object((n >> 1) as usize);
        }
        let len = (n >> 1) as usize;
        ensure(buf, 1)?;
        let _weak_keys = buf.get_u8();

        let handle = Rc::new(std::cell::RefCell::new(OrderedMap::new()));
        self.refs.register_object(Value::Map(Rc::clone(&handle)));
        for _ in 0..len {
            let key = self.read_value(buf)?;
            let value = self.read_value(buf)?;
            handle.borrow_mut().insert(key.key_string(), value);
        }
        Ok(Value::Map(handle))
    }

    fn enter_collection(&mut self) -> Result<()> {
        self.collection_depth += 1;
        if self.collection_depth > self.ctx.config.max_collection_nest_level {
            return Err(CodecError::NestingTooDeep(
                self.ctx.config.max_collection_nest_level,
            ));
        }
        Ok(())
    }
}

/// Modern-format writer
pub struct Amf3Writer {
    ctx: CodecContext,
    refs: EncodeRefs,
    depth: usize,
}

impl Amf3Writer {
    pub fn new(ctx: CodecContext) -> Self {
        Self {
            ctx,
            refs: EncodeRefs::new(),
            depth: 0,
        }
    }

    pub fn reset(&mut self) {
        self.refs.reset();
        self.depth = 0;
    }

    /// Write one value into the output buffer
    pub fn write_value(&mut self, out: &mut BytesMut, value: &Value) -> Result<()> {
        self.depth += 1;
        if self.depth > self.ctx.config.max_object_nest_level {
            return Err(CodecError::NestingTooDeep(
                self.ctx.config.max_object_nest_level,
            ));
        }
        let result = self.write_dispatch(out, value);
        self.depth -= 1;
        result
    }

    fn write_dispatch(&mut self, out: &mut BytesMut, value: &Value) -> Result<()> {
        match value {
            Value::Undefined => {
                out.put_u8(marker::UNDEFINED);
                Ok(())
            }
            Value::Null => {
                out.put_u8(marker::NULL);
                Ok(())
            }
            Value::Bool(false) => {
                out.put_u8(marker::FALSE);
                Ok(())
            }
            Value::Bool(true) => {
                out.put_u8(marker::TRUE);
                Ok(())
            }
            Value::Int(i) => self.write_int(out, *i),
            Value::Number(n) => {
                out.put_u8(marker::DOUBLE);
                out.put_f64(*n);
                Ok(())
            }
            Value::BigNumber(b) => {
                if self.ctx.config.legacy_big_numbers {
                    out.put_u8(marker::DOUBLE);
                    out.put_f64(b.to_f64().unwrap_or(f64::NAN));
                    Ok(())
                } else {
                    self.write_string(out, b.as_str())
                }
            }
            Value::Char(c) => {
                let mut tmp = [0u8; 4];
                self.write_string(out, c.encode_utf8(&mut tmp))
            }
            Value::String(s) => self.write_string(out, s),
            Value::Enum { type_name, variant } => {
                // A registered accessor overrides the symbolic-name form
                match self.ctx.registry.custom_accessor(type_name) {
                    Some(accessor) => {
                        let surrogate = serialized_form(&*accessor, value);
                        self.write_value(out, &surrogate)
                    }
                    None => self.write_string(out, variant),
                }
            }
            Value::Date(d) => self.write_date(out, value, d.epoch_millis),
            Value::Xml(s) => {
                out.put_u8(marker::XML);
                // XML shares the object table but carries no identity, so
                // it always goes inline; the index is still consumed
                self.refs.register_anonymous();
                write_u29(out, ((s.len() as u32) << 1) | 1)?;
                out.put_slice(s.as_bytes());
                Ok(())
            }
            Value::Bytes(bytes) => {
                if self.write_by_reference(out, marker::BYTE_ARRAY, value)? {
                    return Ok(());
                }
                self.refs.register_object(value);
                out.put_u8(marker::BYTE_ARRAY);
                let bytes = bytes.borrow();
                write_u29(out, ((bytes.len() as u32) << 1) | 1)?;
                out.put_slice(&bytes);
                Ok(())
            }
            Value::Array(elements) => {
                if let Some(s) = collapse_char_array(&elements.borrow()) {
                    return self.write_string(out, &s);
                }
                if self.write_by_reference(out, marker::ARRAY, value)? {
                    return Ok(());
                }
                self.refs.register_object(value);
                out.put_u8(marker::ARRAY);
                let elements = elements.borrow();
                write_u29(out, ((elements.len() as u32) << 1) | 1)?;
                self.write_string_inner(out, "")?; // no associative portion
                for element in elements.iter() {
                    self.write_value(out, element)?;
                }
                Ok(())
            }
            Value::Map(map) => self.write_map(out, value, map),
            Value::Record(_) => self.write_record(out, value),
        }
    }

    fn write_int(&mut self, out: &mut BytesMut, i: i32) -> Result<()> {
        if (marker::INT28_MIN..=marker::INT28_MAX).contains(&i) {
            out.put_u8(marker::INTEGER);
            write_u29(out, (i as u32) & 0x1FFF_FFFF)
        } else {
            out.put_u8(marker::DOUBLE);
            out.put_f64(f64::from(i));
            Ok(())
        }
    }

    fn write_string(&mut self, out: &mut BytesMut, s: &str) -> Result<()> {
        out.put_u8(marker::STRING);
        self.write_string_inner(out, s)
    }

    /// Length-or-reference string body shared by strings, keys and traits
    fn write_string_inner(&mut self, out: &mut BytesMut, s: &str) -> Result<()> {
        if s.is_empty() {
            return write_u29(out, 1);
        }
        if let Some(index) = self.refs.string_index(s) {
            return write_u29(out, index << 1);
        }
        self.refs.register_string(s);
        write_u29(out, ((s.len() as u32) << 1) | 1)?;
        out.put_slice(s.as_bytes());
        Ok(())
    }

    fn write_date(&mut self, out: &mut BytesMut, value: &Value, epoch_millis: f64) -> Result<()> {
        out.put_u8(marker::DATE);
        if self.ctx.config.support_dates_by_reference {
            if let Some(index) = self.refs.object_index(value) {
                return write_u29(out, index << 1);
            }
        }
        self.refs.register_object(value);
        write_u29(out, 1)?;
        out.put_f64(epoch_millis);
        Ok(())
    }

    fn write_map(
        &mut self,
        out: &mut BytesMut,
        value: &Value,
        map: &Rc<std::cell::RefCell<OrderedMap>>,
    ) -> Result<()> {
        if self.ctx.config.legacy_map {
            // Associative array with an empty dense portion
            if self.write_by_reference(out, marker::ARRAY, value)? {
                return Ok(());
            }
            self.refs.register_object(value);
            out.put_u8(marker::ARRAY);
            let map = map.borrow();
            write_u29(out, 1)?;
            for (key, member) in map.iter() {
                self.write_string_inner(out, key)?;
                self.write_value(out, member)?;
            }
            self.write_string_inner(out, "")?;
            Ok(())
        } else {
            // Anonymous dynamic object
            if self.write_by_reference(out, marker::OBJECT, value)? {
                return Ok(());
            }
            self.refs.register_object(value);
            out.put_u8(marker::OBJECT);
            let map = map.borrow();
            self.write_traits(out, &Traits::dynamic_anonymous())?;
            for (key, member) in map.iter() {
                self.write_string_inner(out, key)?;
                self.write_value(out, member)?;
            }
            self.write_string_inner(out, "")?;
            Ok(())
        }
    }

    fn write_record(&mut self, out: &mut BytesMut, value: &Value) -> Result<()> {
        if self.write_by_reference(out, marker::OBJECT, value)? {
            return Ok(());
        }
        self.refs.register_object(value);

        let record = match value {
            Value::Record(rc) => rc,
            _ => unreachable!(),
        };
        let substituted = self.substitute(value)?;
        let record = match &substituted {
            Some(Value::Record(rc)) => rc,
            Some(other) => {
                return Err(CodecError::invalid_type(
                    other.describe(),
                    "record substitute",
                ))
            }
            None => record,
        };
        let record = record.borrow();

        let traits = Traits::for_record(&record);
        out.put_u8(marker::OBJECT);
        self.write_traits(out, &traits)?;

        if traits.dynamic {
            for (key, member) in record.members.iter() {
                self.write_string_inner(out, key)?;
                self.write_value(out, member)?;
            }
            self.write_string_inner(out, "")?;
        } else {
            for name in &traits.members {
                let member = record.members.get(name).cloned().unwrap_or(Value::Null);
                self.write_value(out, &member)?;
            }
        }
        Ok(())
    }

    fn write_traits(&mut self, out: &mut BytesMut, traits: &Traits) -> Result<()> {
        if let Some(index) = self.refs.traits_index(traits) {
            return write_u29(out, (index << 2) | 1);
        }
        self.refs.register_traits(traits.clone());

        let mut header: u32 = 0b11; // inline object, inline traits
        if traits.dynamic {
            header |= 0b1000;
        }
        header |= (traits.members.len() as u32) << 4;
        write_u29(out, header)?;
        self.write_string_inner(out, traits.type_name.as_deref().unwrap_or(""))?;
        for name in &traits.members {
            self.write_string_inner(out, name)?;
        }
        Ok(())
    }

    fn substitute(&self, value: &Value) -> Result<Option<Value>> {
        let record = match value {
            Value::Record(rc) => rc,
            _ => return Ok(None),
        };
        let type_name = match &record.borrow().type_name {
            Some(name) => name.clone(),
            None => return Ok(None),
        };
        let accessor = match self.ctx.registry.custom_accessor(&type_name) {
            Some(accessor) => accessor,
            None => return Ok(None),
        };
        match accessor.instance_to_serialize(value) {
            Some(substitute) if substitute.is_null_or_undefined() => {
                Err(CodecError::SubstitutionAfterReference { type_name })
            }
            other => Ok(other),
        }
    }

    fn write_by_reference(&mut self, out: &mut BytesMut, m: u8, value: &Value) -> Result<bool> {
        match self.refs.object_index(value) {
            Some(index) => {
                out.put_u8(m);
                write_u29(out, index << 1)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn collapse_char_array(elements: &[Value]) -> Option<String> {
    if elements.is_empty() {
        return None;
    }
    let mut s = String::with_capacity(elements.len());
    for element in elements {
        match element {
            Value::Char(c) => s.push(*c),
            _ => return None,
        }
    }
    Some(s)
}

fn ensure(buf: &Bytes, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(CodecError::eof());
    }
    Ok(())
}

/// Variable-length u29: 1-3 bytes of 7 payload bits with a continuation
/// flag, then a full 8-bit final byte
pub(crate) fn read_u29(buf: &mut Bytes) -> Result<u32> {
    let mut n: u32 = 0;
    for i in 0..4 {
        ensure(buf, 1)?;
        let b = buf.get_u8();
        if i == 3 {
            return Ok((n << 8) | u32::from(b));
        }
        n = (n << 7) | u32::from(b & 0x7F);
        if b & 0x80 == 0 {
            return Ok(n);
        }
    }
    unreachable!()
}

pub(crate) fn write_u29(out: &mut BytesMut, n: u32) -> Result<()> {
    if n >= marker::U29_BOUND {
        return Err(CodecError::malformed(format!(
            "value {n} exceeds the u29 range"
        )));
    }
    if n < 0x80 {
        out.put_u8(n as u8);
    } else if n < 0x4000 {
        out.put_u8(((n >> 7) | 0x80) as u8);
        out.put_u8((n & 0x7F) as u8);
    } else if n < 0x20_0000 {
        out.put_u8(((n >> 14) | 0x80) as u8);
        out.put_u8((((n >> 7) & 0x7F) | 0x80) as u8);
        out.put_u8((n & 0x7F) as u8);
    } else {
        out.put_u8(((n >> 22) | 0x80) as u8);
        out.put_u8((((n >> 15) & 0x7F) | 0x80) as u8);
        out.put_u8((((n >> 8) & 0x7F) | 0x80) as u8);
        out.put_u8((n & 0xFF) as u8);
    }
    Ok(())
}

fn read_utf_body(buf: &mut Bytes, len: usize, max_bytes: usize) -> Result<String> {
    if len > max_bytes {
        return Err(CodecError::StringTooLong {
            actual: len,
            limit: max_bytes,
        });
    }
    ensure(buf, len)?;
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec())
        .map_err(|_| CodecError::malformed("invalid UTF-8 in string payload"))
}

/// Encode a single value with a fresh writer
pub fn encode_value(value: &Value, ctx: &CodecContext) -> Result<Bytes> {
    let mut writer = Amf3Writer::new(ctx.clone());
    let mut out = BytesMut::with_capacity(256);
    writer.write_value(&mut out, value)?;
    Ok(out.freeze())
}

/// Decode a single value with a fresh reader
pub fn decode_value(data: &[u8], ctx: &CodecContext) -> Result<Value> {
    let mut reader = Amf3Reader::new(ctx.clone());
    let mut buf = Bytes::copy_from_slice(data);
    reader.read_value(&mut buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodecConfig;

    fn ctx() -> CodecContext {
        CodecContext::default()
    }

    fn roundtrip(value: &Value) -> Value {
        let encoded = encode_value(value, &ctx()).unwrap();
        decode_value(&encoded, &ctx()).unwrap()
    }

    fn u29_roundtrip(n: u32) -> u32 {
        let mut out = BytesMut::new();
        write_u29(&mut out, n).unwrap();
        read_u29(&mut out.freeze()).unwrap()
    }

    #[test]
    fn test_u29_boundaries() {
        for n in [
            0,
            1,
            0x7F,
            0x80,
            0x3FFF,
            0x4000,
            0x1F_FFFF,
            0x20_0000,
            0x1FFF_FFFF,
        ] {
            assert_eq!(u29_roundtrip(n), n, "u29 {n:#x}");
        }

        let mut out = BytesMut::new();
        assert!(write_u29(&mut out, 0x2000_0000).is_err());
        assert!(write_u29(&mut out, 0x3FFF_FFFF).is_err());
    }

    #[test]
    fn test_u29_encoded_widths() {
        let width = |n: u32| {
            let mut out = BytesMut::new();
            write_u29(&mut out, n).unwrap();
            out.len()
        };
        assert_eq!(width(0x7F), 1);
        assert_eq!(width(0x80), 2);
        assert_eq!(width(0x3FFF), 2);
        assert_eq!(width(0x4000), 3);
        assert_eq!(width(0x1F_FFFF), 3);
        assert_eq!(width(0x20_0000), 4);
    }

    #[test]
    fn test_integer_markers_and_sign_extension() {
        assert_eq!(roundtrip(&Value::Int(0)), Value::Int(0));
        assert_eq!(roundtrip(&Value::Int(-1)), Value::Int(-1));
        assert_eq!(
            roundtrip(&Value::Int(marker::INT28_MAX)),
            Value::Int(marker::INT28_MAX)
        );
        assert_eq!(
            roundtrip(&Value::Int(marker::INT28_MIN)),
            Value::Int(marker::INT28_MIN)
        );
    }

    #[test]
    fn test_wide_integer_becomes_double() {
        let encoded = encode_value(&Value::Int(marker::INT28_MAX + 1), &ctx()).unwrap();
        assert_eq!(encoded[0], marker::DOUBLE);
        assert_eq!(
            decode_value(&encoded, &ctx()).unwrap(),
            Value::Number(f64::from(marker::INT28_MAX + 1))
        );

        let encoded = encode_value(&Value::Int(i32::MIN), &ctx()).unwrap();
        assert_eq!(encoded[0], marker::DOUBLE);
    }

    #[test]
    fn test_string_interning() {
        let array = Value::array(vec![
            Value::from("repeat"),
            Value::from("repeat"),
            Value::from("repeat"),
        ]);
        let encoded = encode_value(&array, &ctx()).unwrap();
        // One inline body, two 2-byte references beat three inline copies
        let inline_count = encoded
            .windows(6)
            .filter(|w| *w == b"repeat")
            .count();
        assert_eq!(inline_count, 1);

        match decode_value(&encoded, &ctx()).unwrap() {
            Value::Array(rc) => {
                for element in rc.borrow().iter() {
                    assert_eq!(element, &Value::from("repeat"));
                }
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_string_never_interned() {
        let array = Value::array(vec![Value::from(""), Value::from("")]);
        let decoded = roundtrip(&array);
        match decoded {
            Value::Array(rc) => assert_eq!(rc.borrow().len(), 2),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_byte_array_roundtrip() {
        let value = Value::bytes(vec![0, 1, 2, 255]);
        match roundtrip(&value) {
            Value::Bytes(rc) => assert_eq!(*rc.borrow(), vec![0, 1, 2, 255]),
            other => panic!("expected bytes, got {other:?}"),
        }
    }

    #[test]
    fn test_dynamic_record_roundtrip() {
        let mut record = Record::typed("com.example.Pet");
        record.members.insert("name".into(), Value::from("Zoe"));
        record.members.insert("age".into(), Value::Int(4));
        let value = Value::record(record);

        match roundtrip(&value) {
            Value::Record(rc) => {
                let r = rc.borrow();
                assert_eq!(r.type_name.as_deref(), Some("com.example.Pet"));
                assert!(r.dynamic);
                assert_eq!(r.members.get("name"), Some(&Value::from("Zoe")));
                assert_eq!(r.members.get("age"), Some(&Value::Int(4)));
            }
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn test_sealed_record_roundtrip() {
        let mut record = Record::sealed("com.example.Point");
        record.members.insert("x".into(), Value::Number(1.5));
        record.members.insert("y".into(), Value::Number(-2.5));
        let value = Value::record(record);

        match roundtrip(&value) {
            Value::Record(rc) => {
                let r = rc.borrow();
                assert!(!r.dynamic);
                let keys: Vec<&str> = r.members.keys().collect();
                assert_eq!(keys, vec!["x", "y"]);
                assert_eq!(r.members.get("y"), Some(&Value::Number(-2.5)));
            }
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn test_traits_deduplicated_across_instances() {
        let make = |x: f64| {
            let mut record = Record::sealed("com.example.Point");
            record.members.insert("x".into(), Value::Number(x));
            record.members.insert("y".into(), Value::Number(0.0));
            Value::record(record)
        };
        let array = Value::array(vec![make(1.0), make(2.0), make(3.0)]);
        let encoded = encode_value(&array, &ctx()).unwrap();
        // Type name goes inline exactly once
        let name_count = encoded
            .windows(17)
            .filter(|w| *w == b"com.example.Point")
            .count();
        assert_eq!(name_count, 1);

        match decode_value(&encoded, &ctx()).unwrap() {
            Value::Array(rc) => {
                let elements = rc.borrow();
                assert_eq!(elements.len(), 3);
                for element in elements.iter() {
                    match element {
                        Value::Record(r) => {
                            assert_eq!(r.borrow().type_name.as_deref(), Some("com.example.Point"))
                        }
                        other => panic!("expected record, got {other:?}"),
                    }
                }
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_object_reference_restores_identity() {
        let shared = Value::record(Record::anonymous());
        let outer = Value::array(vec![shared.clone(), shared]);

        match roundtrip(&outer) {
            Value::Array(rc) => {
                let elements = rc.borrow();
                assert!(elements[0].same_identity(&elements[1]));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_cyclic_record_terminates() {
        let record = Value::record(Record::anonymous());
        if let Value::Record(rc) = &record {
            rc.borrow_mut().members.insert("me".into(), record.clone());
        }

        let decoded = roundtrip(&record);
        match &decoded {
            Value::Record(rc) => {
                let inner = rc.borrow().members.get("me").cloned().unwrap();
                assert!(inner.same_identity(&decoded));
            }
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn test_dates_deduplicated_only_when_configured() {
        let date = Value::date(1_000.0);
        let array = Value::array(vec![date.clone(), date]);

        let plain = encode_value(&array, &ctx()).unwrap();
        let mut cfg = CodecConfig::default();
        cfg.support_dates_by_reference = true;
        let dedup = encode_value(&array, &CodecContext::with_config(cfg)).unwrap();
        assert!(dedup.len() < plain.len());

        // Both decode to two dates; dedup restores shared identity
        match decode_value(&dedup, &ctx()).unwrap() {
            Value::Array(rc) => {
                let elements = rc.borrow();
                assert!(elements[0].same_identity(&elements[1]));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_mixed_array_becomes_map() {
        let mut out = BytesMut::new();
        out.put_u8(marker::ARRAY);
        write_u29(&mut out, (1 << 1) | 1).unwrap(); // dense length 1
        write_u29(&mut out, (4 << 1) | 1).unwrap();
        out.put_slice(b"name");
        out.put_u8(marker::TRUE);
        write_u29(&mut out, 1).unwrap(); // end of associative portion
        out.put_u8(marker::INTEGER);
        write_u29(&mut out, 9).unwrap();

        match decode_value(&out.freeze(), &ctx()).unwrap() {
            Value::Map(rc) => {
                let map = rc.borrow();
                assert_eq!(map.get("name"), Some(&Value::Bool(true)));
                assert_eq!(map.get("0"), Some(&Value::Int(9)));
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_dictionary_reads_as_map() {
        let mut out = BytesMut::new();
        out.put_u8(marker::DICTIONARY);
        write_u29(&mut out, (1 << 1) | 1).unwrap();
        out.put_u8(0); // strong keys
        out.put_u8(marker::INTEGER);
        write_u29(&mut out, 3).unwrap();
        out.put_u8(marker::DOUBLE);
        out.put_f64(1.5);

        match decode_value(&out.freeze(), &ctx()).unwrap() {
            Value::Map(rc) => assert_eq!(rc.borrow().get("3"), Some(&Value::Number(1.5))),
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_externalizable_rejected() {
        let mut out = BytesMut::new();
        out.put_u8(marker::OBJECT);
        write_u29(&mut out, 0b111).unwrap(); // inline, inline traits, externalizable
        write_u29(&mut out, (3 << 1) | 1).unwrap();
        out.put_slice(b"Ext");

        assert!(matches!(
            decode_value(&out.freeze(), &ctx()),
            Err(CodecError::MalformedStream(_))
        ));
    }

    #[test]
    fn test_bad_reference_index_rejected() {
        let mut out = BytesMut::new();
        out.put_u8(marker::STRING);
        write_u29(&mut out, 2 << 1).unwrap(); // reference into empty table

        assert!(matches!(
            decode_value(&out.freeze(), &ctx()),
            Err(CodecError::MalformedStream(_))
        ));
    }

    #[test]
    fn test_enum_writes_symbolic_name() {
        let e = Value::enumeration("com.example.Suit", "SPADES");
        assert_eq!(roundtrip(&e), Value::from("SPADES"));
    }

    #[test]
    fn test_enum_with_custom_accessor_writes_object_form() {
        use crate::registry::{PropertyAccessor, TypeRegistry};
        use std::sync::Arc;

        struct SuitAccessor;
        impl PropertyAccessor for SuitAccessor {
            fn type_name(&self, _instance: &Value) -> Option<String> {
                Some("com.example.Suit".into())
            }
            fn is_dynamic(&self) -> bool {
                true
            }
            fn member_names(&self, _instance: &Value) -> Vec<String> {
                vec!["value".into()]
            }
            fn get(&self, instance: &Value, _member: &str) -> Value {
                match instance {
                    Value::Enum { variant, .. } => Value::from(variant.as_str()),
                    _ => Value::Undefined,
                }
            }
            fn set(&self, _instance: &Value, _member: &str, _value: Value) -> crate::error::Result<()> {
                Ok(())
            }
            fn new_instance(&self) -> Value {
                Value::record(Record::typed("com.example.Suit"))
            }
        }

        let registry = TypeRegistry::new();
        registry.register_accessor("com.example.Suit", Arc::new(SuitAccessor));
        let ctx = CodecContext::new(Default::default(), Arc::new(registry));

        let e = Value::enumeration("com.example.Suit", "HEARTS");
        let encoded = encode_value(&e, &ctx).unwrap();
        assert_eq!(encoded[0], marker::OBJECT);

        match decode_value(&encoded, &ctx).unwrap() {
            Value::Record(rc) => {
                let r = rc.borrow();
                assert_eq!(r.type_name.as_deref(), Some("com.example.Suit"));
                assert_eq!(r.members.get("value"), Some(&Value::from("HEARTS")));
            }
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn test_scalar_vector_reads_as_array() {
        let mut out = BytesMut::new();
        out.put_u8(marker::VECTOR_INT);
        write_u29(&mut out, (2 << 1) | 1).unwrap();
        out.put_u8(0);
        out.put_i32(-5);
        out.put_i32(7);

        match decode_value(&out.freeze(), &ctx()).unwrap() {
            Value::Array(rc) => {
                assert_eq!(*rc.borrow(), vec![Value::Int(-5), Value::Int(7)])
            }
            other => panic!("expected array, got {other:?}"),
        }
    }
}
