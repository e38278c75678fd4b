//! Envelope serialization

use bytes::{BufMut, Bytes, BytesMut};

use crate::amf::amf0::{write_utf, Amf0Writer};
use crate::amf::markers::UNKNOWN_CONTENT_LENGTH;
use crate::amf::EncodingMode;
use crate::config::CodecContext;
use crate::envelope::{
    Envelope, NULL_URI, VERSION_LEGACY, VERSION_LEGACY_ALIAS, VERSION_MODERN,
};
use crate::error::{CodecError, Result};

/// Write a complete envelope.
///
/// A modern version selects the upgrade mode: scaffolding stays legacy,
/// complex payload values escape to the modern format.
pub fn write_envelope(envelope: &Envelope, ctx: &CodecContext) -> Result<Bytes> {
    let mode = match envelope.version {
        VERSION_LEGACY | VERSION_LEGACY_ALIAS => EncodingMode::Legacy,
        VERSION_MODERN => EncodingMode::Upgrade,
        other => return Err(CodecError::UnsupportedVersion(other)),
    };

    let mut out = BytesMut::with_capacity(256);
    out.put_u16(envelope.version);

    let mut writer = Amf0Writer::new(ctx.clone(), mode);

    out.put_u16(envelope.headers.len() as u16);
    for header in &envelope.headers {
        write_utf(&mut out, &header.name)?;
        out.put_u8(u8::from(header.must_understand));
        // Lengths are advisory; receivers recompute from the stream
        out.put_i32(UNKNOWN_CONTENT_LENGTH);
        writer.reset();
        writer.write_value(&mut out, &header.value)?;
    }

    out.put_u16(envelope.bodies.len() as u16);
    for body in &envelope.bodies {
        write_utf(&mut out, uri_or_null(&body.target_uri))?;
        write_utf(&mut out, uri_or_null(&body.response_uri))?;
        out.put_i32(UNKNOWN_CONTENT_LENGTH);
        writer.reset();
        writer.write_value(&mut out, &body.value)?;
    }

    tracing::debug!(
        version = envelope.version,
        headers = envelope.headers.len(),
        bodies = envelope.bodies.len(),
        bytes = out.len(),
        "envelope written"
    );
    Ok(out.freeze())
}

fn uri_or_null(uri: &str) -> &str {
    if uri.is_empty() {
        NULL_URI
    } else {
        uri
    }
}
