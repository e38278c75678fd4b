//! The message envelope: version word, headers and bodies.
//!
//! An envelope always wears legacy-format clothing: version, counts, names
//! and URIs are plain AMF0 scaffolding. A modern version number only changes
//! how payloads inside are written (complex values escape to AMF3).

mod reader;
mod writer;

pub use reader::read_envelope;
pub use writer::write_envelope;

use crate::amf::value::{Record, Value};
use crate::error::CodecError;

/// Original format generation
pub const VERSION_LEGACY: u16 = 0;
/// Accepted on input as a synonym for [`VERSION_LEGACY`]
pub const VERSION_LEGACY_ALIAS: u16 = 1;
/// Payloads upgrade to the modern format
pub const VERSION_MODERN: u16 = 3;

/// Literal written in place of an absent routing URI
pub const NULL_URI: &str = "null";

/// Error code carried by a descriptor replacing a failed header payload
pub const HEADER_ENCODING_ERROR: &str = "Client.Header.Encoding";
/// Error code carried by a descriptor replacing a failed body payload
pub const BODY_ENCODING_ERROR: &str = "Client.Message.Encoding";

/// Out-of-band instruction accompanying an envelope
#[derive(Debug, Clone)]
pub struct Header {
    pub name: String,
    /// Receiver must reject the envelope if it cannot process this header
    pub must_understand: bool,
    pub value: Value,
}

impl Header {
    pub fn new(name: impl Into<String>, must_understand: bool, value: Value) -> Self {
        Self {
            name: name.into(),
            must_understand,
            value,
        }
    }
}

/// One routed payload
#[derive(Debug, Clone)]
pub struct Body {
    /// Destination the payload is addressed to
    pub target_uri: String,
    /// Where the response to this payload should go
    pub response_uri: String,
    pub value: Value,
}

impl Body {
    pub fn new(
        target_uri: impl Into<String>,
        response_uri: impl Into<String>,
        value: Value,
    ) -> Self {
        Self {
            target_uri: target_uri.into(),
            response_uri: response_uri.into(),
            value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub version: u16,
    pub headers: Vec<Header>,
    pub bodies: Vec<Body>,
}

impl Envelope {
    pub fn new(version: u16) -> Self {
        Self {
            version,
            headers: Vec::new(),
            bodies: Vec::new(),
        }
    }

    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.bodies.push(body);
        self
    }
}

/// Replacement payload for a header/body whose decoded value could not be
/// resolved; the stream itself was fine, so siblings keep flowing
pub(crate) fn error_descriptor(code: &str, err: &CodecError) -> Value {
    let mut record = Record::typed("ErrorDescriptor");
    record.members.insert("code".into(), Value::from(code));
    record
        .members
        .insert("message".into(), Value::from(err.to_string()));
    Value::record(record)
}
