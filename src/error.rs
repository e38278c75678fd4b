//! Unified error type for AMF encoding, decoding and coercion

use thiserror::Error;

/// Result type alias using the library's error type
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised by the AMF codec.
///
/// Errors split into two severity classes. Stream-structural failures
/// (`MalformedStream`, `UnsupportedVersion`, `StringTooLong`,
/// `NestingTooDeep`) leave the byte stream in an unknown position and abort
/// the whole envelope. Value-scoped failures (`InvalidType`,
/// `UnresolvableType`, `PropertyAssignment`) occur after the payload bytes
/// were fully consumed and are recovered per header/body by the envelope
/// deserializer; see [`CodecError::is_recoverable`].
#[derive(Debug, Error)]
pub enum CodecError {
    /// Envelope version outside {0, 1, 3}
    #[error("unsupported AMF version: {0}")]
    UnsupportedVersion(u16),

    /// Declared string length exceeds the configured maximum.
    /// Raised before any buffer of that size is allocated.
    #[error("string of {actual} bytes exceeds the {limit} byte limit")]
    StringTooLong { actual: usize, limit: usize },

    /// No coercion rule exists for this value/target combination
    #[error("cannot convert {value} to {target}")]
    InvalidType { value: String, target: String },

    /// Wire type name has no registered target type and the dynamic-record
    /// fallback is disabled
    #[error("no type registered for wire name '{0}'")]
    UnresolvableType(String),

    /// A property accessor substituted a missing instance after the original
    /// was already entered into the reference table
    #[error("accessor for '{type_name}' substituted no instance after reference registration")]
    SubstitutionAfterReference { type_name: String },

    /// Truncated or corrupt bytes
    #[error("malformed AMF stream: {0}")]
    MalformedStream(String),

    /// An accessor rejected a value for a specific member
    #[error("could not assign property '{property}': {reason}")]
    PropertyAssignment { property: String, reason: String },

    /// Object graph nesting exceeded the configured limit
    #[error("object graph nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}

impl CodecError {
    /// Whether the envelope deserializer may replace the failed header/body
    /// payload with an error descriptor and keep reading siblings.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CodecError::InvalidType { .. }
                | CodecError::UnresolvableType(_)
                | CodecError::PropertyAssignment { .. }
        )
    }

    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        CodecError::MalformedStream(detail.into())
    }

    pub(crate) fn eof() -> Self {
        CodecError::MalformedStream("unexpected end of stream".into())
    }

    pub(crate) fn unknown_marker(marker: u8) -> Self {
        CodecError::MalformedStream(format!("unknown type marker 0x{marker:02x}"))
    }

    pub(crate) fn invalid_type(value: impl Into<String>, target: impl Into<String>) -> Self {
        CodecError::InvalidType {
            value: value.into(),
            target: target.into(),
        }
    }
}
