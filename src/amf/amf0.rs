//! Legacy (AMF0) reader and writer
//!
//! AMF0 is the outer format of every envelope. Strings carry 16-bit length
//! prefixes (32-bit for the long flavor), objects are name/value pairs
//! terminated by an empty name plus the end marker, and complex values are
//! deduplicated through a single object reference table addressed by 16-bit
//! index. The 0x11 escape hands the remainder of a value to the modern
//! format; once escaped there is no way back within that value.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::rc::Rc;

use crate::amf::amf3::{Amf3Reader, Amf3Writer};
use crate::amf::markers::amf0 as marker;
use crate::amf::refs::{DecodeRefs, EncodeRefs};
use crate::amf::value::{OrderedMap, Record, Value};
use crate::amf::EncodingMode;
use crate::config::CodecContext;
use crate::error::{CodecError, Result};
use crate::registry::serialized_form;

/// Wire class name legacy clients use for growable collections; written when
/// `legacy_collection` is set and always unwrapped on read
const COLLECTION_TYPE: &str = "flex.messaging.io.ArrayCollection";

/// Legacy-format reader.
///
/// Holds the reference table for one payload; call [`Amf0Reader::reset`]
/// between headers/bodies so references never cross payload boundaries.
pub struct Amf0Reader {
    ctx: CodecContext,
    refs: DecodeRefs,
    amf3: Option<Box<Amf3Reader>>,
    depth: usize,
    collection_depth: usize,
}

impl Amf0Reader {
    pub fn new(ctx: CodecContext) -> Self {
        Self {
            ctx,
            refs: DecodeRefs::new(),
            amf3: None,
            depth: 0,
            collection_depth: 0,
        }
    }

    /// Clear reference tables and depth counters (call between payloads)
    pub fn reset(&mut self) {
        self.refs.reset();
        self.depth = 0;
        self.collection_depth = 0;
        if let Some(amf3) = &mut self.amf3 {
            amf3.reset();
        }
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
            marker::NUMBER => {
                ensure(buf, 8)?;
                Ok(Value::Number(buf.get_f64()))
            }
            marker::BOOLEAN => {
                ensure(buf, 1)?;
                Ok(Value::Bool(buf.get_u8() != 0))
            }
            marker::STRING => Ok(Value::String(self.read_utf(buf)?)),
            marker::LONG_STRING => Ok(Value::String(self.read_long_utf(buf)?)),
            marker::OBJECT => self.read_object(buf, None),
            marker::NULL => Ok(Value::Null),
            marker::UNDEFINED => Ok(Value::Undefined),
            marker::REFERENCE => {
                ensure(buf, 2)?;
                let index = buf.get_u16() as usize;
                self.refs.object(index)
            }
            marker::ECMA_ARRAY => self.read_ecma_array(buf),
            marker::STRICT_ARRAY => self.read_strict_array(buf),
            marker::DATE => {
                ensure(buf, 10)?;
                let epoch_millis = buf.get_f64();
                let _timezone = buf.get_i16();
                // Legacy dates are never entered into the reference table
                Ok(Value::date(epoch_millis))
            }
            marker::XML_DOCUMENT => Ok(Value::Xml(self.read_long_utf(buf)?)),
            marker::TYPED_OBJECT => {
                let type_name = self.read_utf(buf)?;
                self.read_object(buf, Some(type_name))
            }
            marker::AVMPLUS => self.modern_reader().read_value(buf),
            marker::OBJECT_END => Err(CodecError::malformed("object end marker outside an object")),
            marker::MOVIECLIP | marker::RECORDSET | marker::UNSUPPORTED => Err(
                CodecError::malformed(format!("reserved type marker 0x{m:02x}")),
            ),
            other => Err(CodecError::unknown_marker(other)),
        }
    }

    fn read_object(&mut self, buf: &mut Bytes, type_name: Option<String>) -> Result<Value> {
        let record = match type_name {
            Some(name) => Record::typed(name),
            None => Record::anonymous(),
        };
        let handle = Rc::new(std::cell::RefCell::new(record));
        // Register before members so self-references resolve to this handle
        let index = self.refs.register_object(Value::Record(Rc::clone(&handle)));

        loop {
            let name = self.read_utf(buf)?;
            if name.is_empty() {
                self.expect_object_end(buf)?;
                break;
            }
            let value = self.read_value(buf)?;
            handle.borrow_mut().members.insert(name, value);
        }

        // Collection wrappers unwrap to their backing array; the table slot
        // is replaced so later back-references see the array, not the wrapper
        if handle.borrow().type_name.as_deref() == Some(COLLECTION_TYPE) {
            let source = handle
                .borrow()
                .members
                .get("source")
                .cloned()
                .unwrap_or_else(|| Value::array(Vec::new()));
            self.refs.replace_object(index, source.clone());
            return Ok(source);
        }

        Ok(Value::Record(handle))
    }

    fn read_ecma_array(&mut self, buf: &mut Bytes) -> Result<Value> {
        ensure(buf, 4)?;
        // Length prefix is advisory only
        let _count = buf.get_u32();

        self.enter_collection()?;
        let handle = Rc::new(std::cell::RefCell::new(OrderedMap::new()));
        self.refs.register_object(Value::Map(Rc::clone(&handle)));

        loop {
            let name = self.read_utf(buf)?;
            if name.is_empty() {
                self.expect_object_end(buf)?;
                break;
            }
            let value = self.read_value(buf)?;
            // Associative arrays carry a synthetic length member; drop it
            if name != "length" {
                handle.borrow_mut().insert(name, value);
            }
        }

        self.collection_depth -= 1;
        Ok(Value::Map(handle))
    }

    fn read_strict_array(&mut self, buf: &mut Bytes) -> Result<Value> {
        ensure(buf, 4)?;
        let count = buf.get_u32() as usize;

        self.enter_collection()?;
        let capacity = count.min(crate::amf::markers::INITIAL_COLLECTION_CAPACITY);
        let handle = Rc::new(std::cell::RefCell::new(Vec::with_capacity(capacity)));
        self.refs.register_object(Value::Array(Rc::clone(&handle)));

        for _ in 0..count {
            let element = self.read_value(buf)?;
            handle.borrow_mut().push(element);
        }

        self.collection_depth -= 1;
        Ok(Value::Array(handle))
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

    fn expect_object_end(&mut self, buf: &mut Bytes) -> Result<()> {
        ensure(buf, 1)?;
        match buf.get_u8() {
            marker::OBJECT_END => Ok(()),
            other => Err(CodecError::malformed(format!(
                "expected object end, found marker 0x{other:02x}"
            ))),
        }
    }

    fn read_utf(&mut self, buf: &mut Bytes) -> Result<String> {
        read_utf(buf, self.ctx.config.max_string_bytes)
    }

    fn read_long_utf(&mut self, buf: &mut Bytes) -> Result<String> {
        ensure(buf, 4)?;
        let len = buf.get_u32() as usize;
        read_utf_body(buf, len, self.ctx.config.max_string_bytes)
    }

    fn modern_reader(&mut self) -> &mut Amf3Reader {
        let ctx = self.ctx.clone();
        self.amf3.get_or_insert_with(|| Box::new(Amf3Reader::new(ctx)))
    }
}

/// Legacy-format writer.
///
/// In [`EncodingMode::Upgrade`] every complex value is emitted as the 0x11
/// escape followed by the modern encoding; scalars stay legacy so the
/// envelope scaffolding remains readable to old peers.
pub struct Amf0Writer {
    ctx: CodecContext,
    mode: EncodingMode,
    refs: EncodeRefs,
    amf3: Option<Box<Amf3Writer>>,
    depth: usize,
}

impl Amf0Writer {
    pub fn new(ctx: CodecContext, mode: EncodingMode) -> Self {
        Self {
            ctx,
            mode,
            refs: EncodeRefs::new(),
            amf3: None,
            depth: 0,
        }
    }

    /// Clear reference tables and depth counters (call between payloads)
    pub fn reset(&mut self) {
        self.refs.reset();
        self.depth = 0;
        if let Some(amf3) = &mut self.amf3 {
            amf3.reset();
        }
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
            Value::Null => {
                out.put_u8(marker::NULL);
                Ok(())
            }
            Value::Undefined => {
                out.put_u8(marker::UNDEFINED);
                Ok(())
            }
            Value::Bool(b) => {
                out.put_u8(marker::BOOLEAN);
                out.put_u8(u8::from(*b));
                Ok(())
            }
            Value::Number(n) => {
                out.put_u8(marker::NUMBER);
                out.put_f64(*n);
                Ok(())
            }
            Value::Int(i) => {
                out.put_u8(marker::NUMBER);
                out.put_f64(f64::from(*i));
                Ok(())
            }
            Value::BigNumber(b) => {
                if self.ctx.config.legacy_big_numbers {
                    out.put_u8(marker::NUMBER);
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
            Value::Date(d) => {
                // Never reference-tracked in the legacy format
                out.put_u8(marker::DATE);
                out.put_f64(d.epoch_millis);
                out.put_i16(0);
                Ok(())
            }
            Value::Xml(s) => {
                out.put_u8(marker::XML_DOCUMENT);
                out.put_u32(s.len() as u32);
                out.put_slice(s.as_bytes());
                Ok(())
            }
            Value::Array(elements) => {
                if let Some(s) = collapse_char_array(&elements.borrow()) {
                    return self.write_string(out, &s);
                }
                self.write_complex(out, value)
            }
            Value::Map(_) | Value::Record(_) | Value::Bytes(_) => self.write_complex(out, value),
        }
    }

    fn write_complex(&mut self, out: &mut BytesMut, value: &Value) -> Result<()> {
        if self.mode == EncodingMode::Upgrade {
            out.put_u8(marker::AVMPLUS);
            let ctx = self.ctx.clone();
            let amf3 = self
                .amf3
                .get_or_insert_with(|| Box::new(Amf3Writer::new(ctx)));
            return amf3.write_value(out, value);
        }

        if self.write_by_reference(out, value) {
            return Ok(());
        }
        self.refs.register_object(value);

        match value {
            Value::Array(elements) => {
                let elements = elements.borrow();
                if self.ctx.config.legacy_collection {
                    // Typed wrapper around the array, for clients that expect
                    // a growable collection. The inline array consumes its
                    // own table slot after the wrapper's.
                    out.put_u8(marker::TYPED_OBJECT);
                    write_utf(out, COLLECTION_TYPE)?;
                    write_utf(out, "source")?;
                    self.refs.register_anonymous();
                    out.put_u8(marker::STRICT_ARRAY);
                    out.put_u32(elements.len() as u32);
                    for element in elements.iter() {
                        self.write_value(out, element)?;
                    }
                    out.put_slice(&marker::OBJECT_END_SEQUENCE);
                    return Ok(());
                }
                out.put_u8(marker::STRICT_ARRAY);
                out.put_u32(elements.len() as u32);
                for element in elements.iter() {
                    self.write_value(out, element)?;
                }
                Ok(())
            }
            Value::Map(map) => {
                let map = map.borrow();
                if self.ctx.config.legacy_map {
                    out.put_u8(marker::ECMA_ARRAY);
                    out.put_u32(map.len() as u32);
                } else {
                    out.put_u8(marker::OBJECT);
                }
                for (key, member) in map.iter() {
                    write_utf(out, key)?;
                    self.write_value(out, member)?;
                }
                out.put_slice(&marker::OBJECT_END_SEQUENCE);
                Ok(())
            }
            Value::Record(_) => self.write_record(out, value),
            Value::Bytes(bytes) => {
                // No byte array in the legacy format; fall back to a dense
                // array of numbers
                let bytes = bytes.borrow();
                out.put_u8(marker::STRICT_ARRAY);
                out.put_u32(bytes.len() as u32);
                for b in bytes.iter() {
                    out.put_u8(marker::NUMBER);
                    out.put_f64(f64::from(*b));
                }
                Ok(())
            }
            _ => unreachable!("write_complex called on scalar"),
        }
    }

    fn write_record(&mut self, out: &mut BytesMut, value: &Value) -> Result<()> {
        let record = match value {
            Value::Record(rc) => rc,
            _ => unreachable!(),
        };

        // An accessor may substitute the instance to serialize, but the
        // original is already in the reference table; a missing substitute
        // cannot be papered over at this point.
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

        match &record.type_name {
            Some(name) => {
                out.put_u8(marker::TYPED_OBJECT);
                write_utf(out, name)?;
            }
            None => out.put_u8(marker::OBJECT),
        }
        for (key, member) in record.members.iter() {
            write_utf(out, key)?;
            self.write_value(out, member)?;
        }
        out.put_slice(&marker::OBJECT_END_SEQUENCE);
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

    fn write_by_reference(&mut self, out: &mut BytesMut, value: &Value) -> bool {
        match self.refs.object_index(value) {
            Some(index) if index <= u16::MAX as u32 => {
                out.put_u8(marker::REFERENCE);
                out.put_u16(index as u16);
                true
            }
            _ => false,
        }
    }

    fn write_string(&mut self, out: &mut BytesMut, s: &str) -> Result<()> {
        if s.len() > u16::MAX as usize {
            out.put_u8(marker::LONG_STRING);
            out.put_u32(s.len() as u32);
            out.put_slice(s.as_bytes());
            Ok(())
        } else {
            out.put_u8(marker::STRING);
            write_utf(out, s)
        }
    }
}

/// Non-empty array of characters collapses to a string on the wire
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

/// Read a 16-bit length-prefixed UTF string, enforcing the payload cap
/// before any allocation
pub(crate) fn read_utf(buf: &mut Bytes, max_bytes: usize) -> Result<String> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    read_utf_body(buf, len, max_bytes)
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

/// Write a 16-bit length-prefixed UTF string (no type marker). Values that
/// do not fit the prefix fail rather than truncate into a corrupt stream.
pub(crate) fn write_utf(out: &mut BytesMut, s: &str) -> Result<()> {
    if s.len() > u16::MAX as usize {
        return Err(CodecError::malformed(format!(
            "UTF value of {} bytes exceeds the 16-bit length prefix",
            s.len()
        )));
    }
    out.put_u16(s.len() as u16);
    out.put_slice(s.as_bytes());
    Ok(())
}

/// Encode a single value with a fresh writer
pub fn encode_value(value: &Value, mode: EncodingMode, ctx: &CodecContext) -> Result<Bytes> {
    let mut writer = Amf0Writer::new(ctx.clone(), mode);
    let mut out = BytesMut::with_capacity(256);
    writer.write_value(&mut out, value)?;
    Ok(out.freeze())
}

/// Decode a single value with a fresh reader
pub fn decode_value(data: &[u8], ctx: &CodecContext) -> Result<Value> {
    let mut reader = Amf0Reader::new(ctx.clone());
    let mut buf = Bytes::copy_from_slice(data);
    reader.read_value(&mut buf)
}
