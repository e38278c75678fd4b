//! AMF object serialization engine for typed messaging middleware.
//!
//! Two wire generations are supported: the legacy format (AMF0) that every
//! envelope is built from, and the modern format (AMF3) reached through the
//! legacy escape marker. Decoding is two-staged: the wire readers produce a
//! loose [`Value`] tree, then the coercion layer folds it onto registered
//! types. Reference tables on both sides preserve shared and cyclic object
//! graphs end to end.
//!
//! ```no_run
//! use amfgate::{read_envelope, write_envelope, Body, CodecContext, Envelope, Value};
//!
//! let ctx = CodecContext::default();
//! let envelope = Envelope::new(amfgate::envelope::VERSION_MODERN)
//!     .body(Body::new("/orders", "/responses/1", Value::from("hello")));
//! let bytes = write_envelope(&envelope, &ctx)?;
//! let back = read_envelope(&bytes, &ctx)?;
//! assert_eq!(back.bodies[0].value, Value::from("hello"));
//! # Ok::<(), amfgate::CodecError>(())
//! ```

pub mod amf;
pub mod coerce;
pub mod config;
pub mod envelope;
pub mod error;
pub mod registry;

pub use amf::{AmfDate, BigNumber, DateKind, EncodingMode, OrderedMap, Record, Value};
pub use coerce::{coerce, coerce_strict, ArrayPolicy, NumberKind, NumberType, TypeDescriptor};
pub use config::{CodecConfig, CodecContext};
pub use envelope::{read_envelope, write_envelope, Body, Envelope, Header};
pub use error::{CodecError, Result};
pub use registry::{
    DynamicAccessor, EnumSchema, PropertyAccessor, SchemaAccessor, TypeRegistry, TypeSchema,
};
