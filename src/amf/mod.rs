//! AMF wire codecs: markers, the value tree, reference tables and the
//! readers/writers for both format generations

pub mod amf0;
pub mod amf3;
pub mod markers;
pub(crate) mod refs;
pub mod value;

pub use amf0::{Amf0Reader, Amf0Writer};
pub use amf3::{Amf3Reader, Amf3Writer};
pub use value::{AmfDate, BigNumber, DateKind, OrderedMap, Record, Value};

/// Which format generation complex values are written in.
///
/// The envelope layer always starts in the legacy format; `Upgrade` makes
/// the writer emit the AVMPLUS escape and hand complex values to the modern
/// writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingMode {
    /// Pure AMF0 output
    Legacy,
    /// AMF0 scaffolding with AMF3 payloads behind the 0x11 escape
    Upgrade,
}

/// The class shape of a modern-format object: name, openness and the sealed
/// member list. Interned in its own reference table so repeated instances of
/// one type carry the shape only once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Traits {
    pub type_name: Option<String>,
    pub dynamic: bool,
    pub externalizable: bool,
    pub members: Vec<String>,
}

impl Traits {
    pub fn dynamic_anonymous() -> Self {
        Self {
            type_name: None,
            dynamic: true,
            externalizable: false,
            members: Vec::new(),
        }
    }

    pub fn for_record(record: &Record) -> Self {
        Self {
            type_name: record.type_name.clone(),
            dynamic: record.dynamic,
            externalizable: false,
            members: if record.dynamic {
                Vec::new()
            } else {
                record.members.keys().map(str::to_string).collect()
            },
        }
    }
}
