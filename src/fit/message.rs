//! Messages and field values accepted by the encoder

use std::collections::BTreeMap;
use std::time::SystemTime;

/// A field value before it is typed for the wire.
///
/// `Int` and `Float` are typed by inference; the explicitly sized variants keep the
/// declared type. `Bool` and `List` exist so callers holding loosely typed data can
/// pass it through, but the wire format cannot carry them and the encoder rejects them.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Enum(u8),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    SInt8(i8),
    SInt16(i16),
    SInt32(i32),
    Float(f64),
    Text(String),
    Timestamp(SystemTime),
    Bytes(Vec<u8>),
    Bool(bool),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Int(_) => "integer",
            FieldValue::Enum(_) => "enum",
            FieldValue::UInt8(_) => "uint8",
            FieldValue::UInt16(_) => "uint16",
            FieldValue::UInt32(_) => "uint32",
            FieldValue::SInt8(_) => "sint8",
            FieldValue::SInt16(_) => "sint16",
            FieldValue::SInt32(_) => "sint32",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "string",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Bytes(_) => "byte array",
            FieldValue::Bool(_) => "boolean",
            FieldValue::List(_) => "list",
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value as i64)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(value as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<SystemTime> for FieldValue {
    fn from(value: SystemTime) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

/// One message: a global message number and its fields keyed by field id.
///
/// Fields are held in a `BTreeMap`, which is also the ascending field-id order the
/// encoder writes them in.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityMessage {
    pub global_id: u16,
    pub fields: BTreeMap<u8, FieldValue>,
}

impl ActivityMessage {
    pub fn new(global_id: u16) -> Self {
        Self { global_id, fields: BTreeMap::new() }
    }

    /// Builder-style field setter.
    pub fn with(mut self, field_id: u8, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field_id, value.into());
        self
    }

    pub fn set(&mut self, field_id: u8, value: impl Into<FieldValue>) {
        self.fields.insert(field_id, value.into());
    }
}
