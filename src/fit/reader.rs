//! Activity file reader
//!
//! Parses a finished file back into messages: validates the header, verifies both
//! checksums and walks definition and data records of either architecture.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use tirelab::fit::{ActivityFileReader, ChecksumKind, global};
//!
//! fn dump() -> tirelab::Result<()> {
//!     let reader = ActivityFileReader::open("run-1.fit", ChecksumKind::Ccitt)?;
//!     for record in reader.messages_of(global::RECORD) {
//!         println!("{:?}", record.field(6));
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use super::crc::ChecksumKind;
use super::format::{
    ARCHITECTURE_BIG_ENDIAN, BaseType, COMPRESSED_TIMESTAMP_BIT, DATA_TYPE_TAG, DEFINITION_BIT,
    DEVELOPER_DATA_BIT, FieldDefinition, HEADER_CRC_SPAN, LOCAL_TYPE_MASK, TRAILER_SIZE,
    semicircles_to_degrees,
};
use crate::{Result, TelemetryError};

/// Parsed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub header_size: u8,
    pub protocol_version: u8,
    pub profile_version: u16,
    pub data_size: u32,
    /// `None` for 12-byte headers
    pub header_crc: Option<u16>,
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    UInt(u64),
    SInt(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl DecodedValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DecodedValue::UInt(v) => i64::try_from(*v).ok(),
            DecodedValue::SInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DecodedValue::Float(v) => Some(*v),
            DecodedValue::UInt(v) => Some(*v as f64),
            DecodedValue::SInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DecodedValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Interpret a sint32 value as semicircles.
    pub fn as_degrees(&self) -> Option<f64> {
        match self {
            DecodedValue::SInt(v) => i32::try_from(*v).ok().map(semicircles_to_degrees),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedField {
    pub field_id: u8,
    pub base_type: BaseType,
    pub value: DecodedValue,
}

/// One data record with the definition it was decoded against.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub global_id: u16,
    pub local_type: u8,
    pub fields: Vec<DecodedField>,
}

impl DecodedMessage {
    pub fn field(&self, field_id: u8) -> Option<&DecodedValue> {
        self.fields.iter().find(|f| f.field_id == field_id).map(|f| &f.value)
    }
}

#[derive(Debug, Clone)]
struct Definition {
    global_id: u16,
    big_endian: bool,
    fields: Vec<FieldDefinition>,
}

/// A parsed activity file.
#[derive(Debug, Clone)]
pub struct ActivityFileReader {
    header: FileHeader,
    file_crc: u16,
    definitions: usize,
    messages: Vec<DecodedMessage>,
}

impl ActivityFileReader {
    pub fn open(path: impl AsRef<Path>, checksum: ChecksumKind) -> Result<Self> {
        let data = fs::read(path.as_ref())
            .map_err(|e| TelemetryError::file_error(path.as_ref().to_path_buf(), e))?;
        Self::from_bytes(&data, checksum)
    }

    pub fn from_bytes(data: &[u8], checksum: ChecksumKind) -> Result<Self> {
        let header = parse_header(data, checksum)?;
        let header_len = header.header_size as usize;
        let data_end = header_len + header.data_size as usize;
        if data.len() < data_end + TRAILER_SIZE {
            return Err(TelemetryError::parse_error(
                "File length",
                format!(
                    "header declares {} data bytes but file holds {} after the header",
                    header.data_size,
                    data.len().saturating_sub(header_len)
                ),
            ));
        }

        let stored = u16::from_le_bytes([data[data_end], data[data_end + 1]]);
        let covered =
            if checksum.trailer_covers_header() { &data[..data_end] } else { &data[header_len..data_end] };
        let computed = checksum.compute(covered);
        if stored != computed {
            return Err(TelemetryError::Checksum { region: "file", stored, computed });
        }

        let (definitions, messages) = parse_records(&data[header_len..data_end], header_len)?;
        debug!(definitions, messages = messages.len(), "Parsed activity file");

        Ok(Self { header, file_crc: stored, definitions, messages })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn file_crc(&self) -> u16 {
        self.file_crc
    }

    /// Definition records encountered.
    pub fn definition_count(&self) -> usize {
        self.definitions
    }

    pub fn messages(&self) -> &[DecodedMessage] {
        &self.messages
    }

    pub fn messages_of(&self, global_id: u16) -> impl Iterator<Item = &DecodedMessage> {
        self.messages.iter().filter(move |m| m.global_id == global_id)
    }
}

fn parse_header(data: &[u8], checksum: ChecksumKind) -> Result<FileHeader> {
    let Some(&header_size) = data.first() else {
        return Err(TelemetryError::parse_error("Header", "file is empty"));
    };
    if header_size != 12 && header_size != 14 {
        return Err(TelemetryError::parse_error(
            "Header",
            format!("unsupported header size {}", header_size),
        ));
    }
    if data.len() < header_size as usize {
        return Err(TelemetryError::parse_error(
            "Header",
            format!("file is {} bytes, header needs {}", data.len(), header_size),
        ));
    }
    if data[8..12] != DATA_TYPE_TAG {
        return Err(TelemetryError::parse_error("Header", "missing .FIT tag at offset 8"));
    }

    let header_crc = if header_size == 14 {
        let stored = u16::from_le_bytes([data[12], data[13]]);
        // zero means the writer did not compute one
        if stored != 0 {
            let computed = checksum.compute(&data[..HEADER_CRC_SPAN]);
            if stored != computed {
                return Err(TelemetryError::Checksum { region: "header", stored, computed });
            }
        }
        Some(stored)
    } else {
        None
    };

    Ok(FileHeader {
        header_size,
        protocol_version: data[1],
        profile_version: u16::from_be_bytes([data[2], data[3]]),
        data_size: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        header_crc,
    })
}

/// Byte cursor over the data region that reports absolute file offsets.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Cursor<'a> {
    fn offset(&self) -> usize {
        self.base + self.pos
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(TelemetryError::parse_error(
                format!("Record at offset {}", self.offset()),
                format!("truncated {}: need {} bytes, {} left", what, len, self.data.len() - self.pos),
            ));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }
}

fn parse_records(data: &[u8], base: usize) -> Result<(usize, Vec<DecodedMessage>)> {
    let mut cursor = Cursor { data, pos: 0, base };
    let mut definitions: HashMap<u8, Definition> = HashMap::new();
    let mut definition_count = 0;
    let mut messages = Vec::new();

    while cursor.pos < data.len() {
        let offset = cursor.offset();
        let record_header = cursor.byte("record header")?;

        if record_header & COMPRESSED_TIMESTAMP_BIT != 0 {
            return Err(TelemetryError::parse_error(
                format!("Record at offset {}", offset),
                "compressed timestamp records are not supported",
            ));
        }

        let local_type = record_header & LOCAL_TYPE_MASK;
        if record_header & DEFINITION_BIT != 0 {
            if record_header & DEVELOPER_DATA_BIT != 0 {
                return Err(TelemetryError::parse_error(
                    format!("Record at offset {}", offset),
                    "developer data fields are not supported",
                ));
            }
            let definition = parse_definition(&mut cursor)?;
            definitions.insert(local_type, definition);
            definition_count += 1;
        } else {
            let definition = definitions.get(&local_type).ok_or_else(|| {
                TelemetryError::parse_error(
                    format!("Record at offset {}", offset),
                    format!("data record for undefined local type {}", local_type),
                )
            })?;
            let mut fields = Vec::with_capacity(definition.fields.len());
            for def in &definition.fields {
                let raw = cursor.take(def.size as usize, "field value")?;
                fields.push(DecodedField {
                    field_id: def.field_id,
                    base_type: def.base_type,
                    value: decode_value(def.base_type, raw, definition.big_endian),
                });
            }
            messages.push(DecodedMessage { global_id: definition.global_id, local_type, fields });
        }
    }

    Ok((definition_count, messages))
}

fn parse_definition(cursor: &mut Cursor<'_>) -> Result<Definition> {
    let fixed = cursor.take(5, "definition")?;
    let big_endian = fixed[1] == ARCHITECTURE_BIG_ENDIAN;
    let global_id = if big_endian {
        u16::from_be_bytes([fixed[2], fixed[3]])
    } else {
        u16::from_le_bytes([fixed[2], fixed[3]])
    };
    let count = fixed[4] as usize;

    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = cursor.offset();
        let triple = cursor.take(3, "field definition")?;
        let base_type = BaseType::from_code(triple[2]).ok_or_else(|| {
            TelemetryError::parse_error(
                format!("Field definition at offset {}", offset),
                format!("unknown base type {:#04x}", triple[2]),
            )
        })?;
        fields.push(FieldDefinition { field_id: triple[0], size: triple[1], base_type });
    }

    Ok(Definition { global_id, big_endian, fields })
}

fn decode_value(base_type: BaseType, raw: &[u8], big_endian: bool) -> DecodedValue {
    match base_type {
        BaseType::String => {
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            return DecodedValue::Text(String::from_utf8_lossy(&raw[..end]).into_owned());
        }
        BaseType::Byte => return DecodedValue::Bytes(raw.to_vec()),
        _ => {}
    }

    // arrays and odd widths are passed through raw
    if base_type.fixed_size() != Some(raw.len()) {
        return DecodedValue::Bytes(raw.to_vec());
    }

    let mut buf = [0u8; 8];
    if big_endian {
        buf[8 - raw.len()..].copy_from_slice(raw);
    } else {
        buf[..raw.len()].copy_from_slice(raw);
    }
    let unsigned = if big_endian { u64::from_be_bytes(buf) } else { u64::from_le_bytes(buf) };

    match base_type {
        BaseType::Float32 => DecodedValue::Float(f32::from_bits(unsigned as u32) as f64),
        BaseType::Float64 => DecodedValue::Float(f64::from_bits(unsigned)),
        BaseType::SInt8 => DecodedValue::SInt(unsigned as u8 as i8 as i64),
        BaseType::SInt16 => DecodedValue::SInt(unsigned as u16 as i16 as i64),
        BaseType::SInt32 => DecodedValue::SInt(unsigned as u32 as i32 as i64),
        _ => DecodedValue::UInt(unsigned),
    }
}
