//! Envelope deserialization
//!
//! Parse failures are fatal: once the reader loses its place in the byte
//! stream nothing after the failure can be trusted. Resolution failures are
//! value-scoped and recoverable: the bytes were consumed cleanly, so the
//! failed payload is swapped for an error descriptor and its siblings are
//! still delivered.

use bytes::{Buf, Bytes};

use crate::amf::amf0::{read_utf, Amf0Reader};
use crate::amf::value::Value;
use crate::coerce::{Coercer, TypeDescriptor};
use crate::config::CodecContext;
use crate::envelope::{
    error_descriptor, Body, Envelope, Header, BODY_ENCODING_ERROR, HEADER_ENCODING_ERROR,
    VERSION_LEGACY, VERSION_LEGACY_ALIAS, VERSION_MODERN,
};
use crate::error::{CodecError, Result};

/// Read a complete envelope
pub fn read_envelope(data: &[u8], ctx: &CodecContext) -> Result<Envelope> {
    let mut buf = Bytes::copy_from_slice(data);

    if buf.remaining() < 2 {
        return Err(CodecError::eof());
    }
    let raw_version = buf.get_u16();
    let version = match raw_version {
        VERSION_LEGACY | VERSION_LEGACY_ALIAS => VERSION_LEGACY,
        VERSION_MODERN => VERSION_MODERN,
        other => return Err(CodecError::UnsupportedVersion(other)),
    };

    let mut reader = Amf0Reader::new(ctx.clone());
    let mut envelope = Envelope::new(version);

    if buf.remaining() < 2 {
        return Err(CodecError::eof());
    }
    let header_count = buf.get_u16();
    for _ in 0..header_count {
        let name = read_utf(&mut buf, ctx.config.max_string_bytes)?;
        if buf.remaining() < 5 {
            return Err(CodecError::eof());
        }
        let must_understand = buf.get_u8() != 0;
        let _declared_length = buf.get_i32(); // advisory only

        // References never cross payload boundaries
        reader.reset();
        let parsed = reader.read_value(&mut buf)?;
        let value = finish_payload(parsed, ctx, HEADER_ENCODING_ERROR)?;
        envelope.headers.push(Header::new(name, must_understand, value));
    }

    if buf.remaining() < 2 {
        return Err(CodecError::eof());
    }
    let body_count = buf.get_u16();
    for _ in 0..body_count {
        let target_uri = read_utf(&mut buf, ctx.config.max_string_bytes)?;
        let response_uri = read_utf(&mut buf, ctx.config.max_string_bytes)?;
        if buf.remaining() < 4 {
            return Err(CodecError::eof());
        }
        let _declared_length = buf.get_i32();

        reader.reset();
        let parsed = reader.read_value(&mut buf)?;
        let value = finish_payload(parsed, ctx, BODY_ENCODING_ERROR)?;
        envelope.bodies.push(Body::new(target_uri, response_uri, value));
    }

    tracing::debug!(
        version,
        headers = envelope.headers.len(),
        bodies = envelope.bodies.len(),
        "envelope read"
    );
    Ok(envelope)
}

/// Resolve typed records in a fully parsed payload. Recoverable failures
/// are contained to this payload.
fn finish_payload(parsed: Value, ctx: &CodecContext, code: &str) -> Result<Value> {
    let mut coercer = Coercer::new(ctx.clone());
    match coercer.coerce(&parsed, &TypeDescriptor::Any) {
        Ok(value) => Ok(value),
        Err(err) if err.is_recoverable() => {
            tracing::warn!(code, error = %err, "payload resolution failed");
            Ok(error_descriptor(code, &err))
        }
        Err(err) => Err(err),
    }
}
