//! Wire format constants for both AMF generations

/// AMF0 (legacy format) type markers
pub mod amf0 {
    pub const NUMBER: u8 = 0x00;
    pub const BOOLEAN: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const OBJECT: u8 = 0x03;
    /// Reserved, never valid in a stream
    pub const MOVIECLIP: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const UNDEFINED: u8 = 0x06;
    pub const REFERENCE: u8 = 0x07;
    pub const ECMA_ARRAY: u8 = 0x08;
    pub const OBJECT_END: u8 = 0x09;
    pub const STRICT_ARRAY: u8 = 0x0A;
    pub const DATE: u8 = 0x0B;
    pub const LONG_STRING: u8 = 0x0C;
    pub const UNSUPPORTED: u8 = 0x0D;
    /// Reserved, never valid in a stream
    pub const RECORDSET: u8 = 0x0E;
    pub const XML_DOCUMENT: u8 = 0x0F;
    pub const TYPED_OBJECT: u8 = 0x10;
    /// Escape to the modern format for the remainder of this value
    pub const AVMPLUS: u8 = 0x11;

    /// Empty UTF name followed by the end marker terminates an object
    pub const OBJECT_END_SEQUENCE: [u8; 3] = [0x00, 0x00, OBJECT_END];
}

/// AMF3 (modern format) type markers
pub mod amf3 {
    pub const UNDEFINED: u8 = 0x00;
    pub const NULL: u8 = 0x01;
    pub const FALSE: u8 = 0x02;
    pub const TRUE: u8 = 0x03;
    pub const INTEGER: u8 = 0x04;
    pub const DOUBLE: u8 = 0x05;
    pub const STRING: u8 = 0x06;
    /// Legacy XML document flavor; payload is identical to XML
    pub const XML_DOC: u8 = 0x07;
    pub const DATE: u8 = 0x08;
    pub const ARRAY: u8 = 0x09;
    pub const OBJECT: u8 = 0x0A;
    pub const XML: u8 = 0x0B;
    pub const BYTE_ARRAY: u8 = 0x0C;
    pub const VECTOR_INT: u8 = 0x0D;
    pub const VECTOR_UINT: u8 = 0x0E;
    pub const VECTOR_DOUBLE: u8 = 0x0F;
    pub const VECTOR_OBJECT: u8 = 0x10;
    pub const DICTIONARY: u8 = 0x11;

    /// Largest signed value carried by the integer marker; anything wider is
    /// written as a double
    pub const INT28_MAX: i32 = 0x0FFF_FFFF;
    pub const INT28_MIN: i32 = -0x1000_0000;

    /// Exclusive upper bound of the variable-length u29 encoding
    pub const U29_BOUND: u32 = 0x2000_0000;
}

/// Advisory header/body length written when the real length is unknown;
/// receivers recompute rather than trust it
pub const UNKNOWN_CONTENT_LENGTH: i32 = -1;

/// Initial capacity cap for length-prefixed collections so a tampered length
/// cannot reserve unbounded memory up front
pub const INITIAL_COLLECTION_CAPACITY: usize = 1024;
