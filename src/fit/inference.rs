//! Field type inference
//!
//! Decides the wire type of a [`FieldValue`] the first time a field appears in a
//! message, then encodes values against that type.
//!
//! The legacy table infers types from the field id and the value's magnitude. Message
//! schemas reuse small field ids for different meanings, so ids 0/1 and 3 are
//! disambiguated by magnitude. This is preserved exactly for output compatibility:
//!
//! | field id | integer typing                                   |
//! |----------|--------------------------------------------------|
//! | 0, 1     | `abs(v) > 100` ⇒ sint32 coordinate, else enum    |
//! | 2        | uint16                                           |
//! | 3        | `v > 65535` ⇒ uint32z serial number, else uint16 |
//! | 4        | uint8                                            |
//! | 5        | uint32                                           |
//! | 7        | uint16                                           |
//! | 253, 254 | uint32                                           |
//! | other    | smallest fitting unsigned/signed 1/2/4-byte type |
//!
//! Known limitation: an integer coordinate within ±100 semicircles (a point on the
//! equator or prime meridian) is typed as an enum. Pass coordinates as floats, which
//! are always written as semicircles on ids 0/1, or use [`FieldTyping::Catalogue`].

use serde::{Deserialize, Serialize};

use super::format::{BaseType, FieldDefinition, degrees_to_semicircles, fit_timestamp, global};
use super::message::FieldValue;
use crate::{Result, TelemetryError};

/// How the encoder types inferred values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldTyping {
    /// Field-id table plus magnitude
    #[default]
    Legacy,
    /// Explicit (message, field) catalogue first, legacy table for anything not listed
    Catalogue,
}

/// A field's fixed wire layout plus how floats map onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldSlot {
    pub definition: FieldDefinition,
    /// Floats written to this field are converted to semicircles
    pub angle: bool,
}

impl FieldSlot {
    fn fixed(field_id: u8, base_type: BaseType, angle: bool) -> Self {
        let size = base_type.fixed_size().unwrap_or(1) as u8;
        Self { definition: FieldDefinition { field_id, size, base_type }, angle }
    }
}

/// Smallest integer type holding `value`.
pub fn type_by_magnitude(value: i64) -> BaseType {
    if value >= 0 {
        match value {
            0..=255 => BaseType::UInt8,
            256..=65_535 => BaseType::UInt16,
            _ => BaseType::UInt32,
        }
    } else if value >= i8::MIN as i64 {
        BaseType::SInt8
    } else if value >= i16::MIN as i64 {
        BaseType::SInt16
    } else {
        BaseType::SInt32
    }
}

/// Legacy integer typing: returns the base type and whether the field is a coordinate.
pub fn legacy_integer_type(field_id: u8, value: i64) -> (BaseType, bool) {
    match field_id {
        0 | 1 if value.unsigned_abs() > 100 => (BaseType::SInt32, true),
        0 | 1 => (BaseType::Enum, false),
        2 => (BaseType::UInt16, false),
        3 if value > 65_535 => (BaseType::UInt32z, false),
        3 => (BaseType::UInt16, false),
        4 => (BaseType::UInt8, false),
        5 => (BaseType::UInt32, false),
        7 => (BaseType::UInt16, false),
        253 | 254 => (BaseType::UInt32, false),
        _ => (type_by_magnitude(value), false),
    }
}

fn legacy_float_type(field_id: u8) -> (BaseType, bool) {
    match field_id {
        0 | 1 => (BaseType::SInt32, true),
        _ => (BaseType::Float32, false),
    }
}

/// Explicit field types for the messages this crate writes.
pub fn catalogue_type(global_id: u16, field_id: u8) -> Option<(BaseType, bool)> {
    use BaseType::*;

    let entry = match (global_id, field_id) {
        (global::FILE_ID, 0) => Enum,
        (global::FILE_ID, 1 | 2) => UInt16,
        (global::FILE_ID, 3) => UInt32z,
        (global::FILE_ID, 4) => UInt32,

        (global::EVENT, 253) => UInt32,
        (global::EVENT, 0 | 1) => Enum,
        (global::EVENT, 3) => UInt32,
        (global::EVENT, 4) => UInt8,

        (global::RECORD, 253) => UInt32,
        (global::RECORD, 0 | 1) => return Some((SInt32, true)),
        (global::RECORD, 2) => UInt16,
        (global::RECORD, 3 | 4) => UInt8,
        (global::RECORD, 5) => UInt32,
        (global::RECORD, 6 | 7) => UInt16,
        (global::RECORD, 13) => SInt8,

        (global::LAP, 253) => UInt32,
        (global::LAP, 254) => UInt16,
        (global::LAP, 0 | 1 | 24 | 25) => Enum,
        (global::LAP, 2 | 7 | 8 | 9) => UInt32,
        (global::LAP, 13 | 14) => UInt16,

        (global::SESSION, 253) => UInt32,
        (global::SESSION, 254) => UInt16,
        (global::SESSION, 0 | 1 | 5 | 6 | 28) => Enum,
        (global::SESSION, 2 | 7 | 8 | 9) => UInt32,
        (global::SESSION, 14 | 15 | 25 | 26) => UInt16,

        (global::ACTIVITY, 253 | 0 | 5) => UInt32,
        (global::ACTIVITY, 1) => UInt16,
        (global::ACTIVITY, 2 | 3 | 4) => Enum,

        _ => return None,
    };
    Some((entry, false))
}

/// Reject values the wire format cannot represent at all.
pub fn ensure_supported(global_id: u16, field_id: u8, value: &FieldValue) -> Result<()> {
    match value {
        FieldValue::Bool(_) | FieldValue::List(_) => Err(TelemetryError::UnsupportedValue {
            global_id,
            field_id,
            kind: value.kind(),
        }),
        _ => Ok(()),
    }
}

/// Type a field on its first occurrence.
pub fn infer_slot(
    typing: FieldTyping,
    global_id: u16,
    field_id: u8,
    value: &FieldValue,
) -> Result<FieldSlot> {
    ensure_supported(global_id, field_id, value)?;

    let catalogue = match typing {
        FieldTyping::Catalogue => catalogue_type(global_id, field_id),
        FieldTyping::Legacy => None,
    };

    // a catalogued coordinate stays a coordinate when first written as raw semicircles
    let explicit = |base: BaseType| {
        let angle = catalogue.is_some_and(|(entry, angle)| angle && entry == base);
        FieldSlot::fixed(field_id, base, angle)
    };

    let slot = match value {
        FieldValue::Int(v) => {
            let (base, angle) = catalogue
                .filter(|(base, _)| base.integer_range().is_some())
                .unwrap_or_else(|| legacy_integer_type(field_id, *v));
            FieldSlot::fixed(field_id, base, angle)
        }
        FieldValue::Float(_) => {
            let (base, angle) = catalogue
                .filter(|(base, angle)| *angle || *base == BaseType::Float32)
                .unwrap_or_else(|| legacy_float_type(field_id));
            FieldSlot::fixed(field_id, base, angle)
        }
        FieldValue::Text(text) => {
            let size = text.len() + 1;
            let size = u8::try_from(size).map_err(|_| {
                TelemetryError::out_of_range(
                    global_id,
                    field_id,
                    format!("string of {} bytes exceeds 254", text.len()),
                )
            })?;
            FieldSlot {
                definition: FieldDefinition { field_id, size, base_type: BaseType::String },
                angle: false,
            }
        }
        FieldValue::Bytes(bytes) => {
            let size = u8::try_from(bytes.len())
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| {
                    TelemetryError::out_of_range(
                        global_id,
                        field_id,
                        format!("byte array length {} not in 1..=255", bytes.len()),
                    )
                })?;
            FieldSlot {
                definition: FieldDefinition { field_id, size, base_type: BaseType::Byte },
                angle: false,
            }
        }
        FieldValue::Timestamp(_) => FieldSlot::fixed(field_id, BaseType::UInt32, false),
        FieldValue::Enum(_) => explicit(BaseType::Enum),
        FieldValue::UInt8(_) => explicit(BaseType::UInt8),
        FieldValue::UInt16(_) => explicit(BaseType::UInt16),
        FieldValue::UInt32(_) => explicit(BaseType::UInt32),
        FieldValue::SInt8(_) => explicit(BaseType::SInt8),
        FieldValue::SInt16(_) => explicit(BaseType::SInt16),
        FieldValue::SInt32(_) => explicit(BaseType::SInt32),
        FieldValue::Bool(_) | FieldValue::List(_) => unreachable!("rejected above"),
    };
    Ok(slot)
}

/// Encode `value` big-endian into the slot's layout.
///
/// Returns a description of the misfit when the value cannot be written without
/// changing the layout or losing information.
pub fn encode_value(
    slot: &FieldSlot,
    value: &FieldValue,
    out: &mut Vec<u8>,
) -> std::result::Result<(), String> {
    let base = slot.definition.base_type;
    let size = slot.definition.size as usize;

    let explicit = |declared: BaseType, raw: i64, out: &mut Vec<u8>| {
        if declared != base {
            return Err(format!("{:?} value cannot be written as {:?}", declared, base));
        }
        write_integer(raw, size, out);
        Ok(())
    };

    match value {
        FieldValue::Int(v) => match base.integer_range() {
            Some((lo, hi)) if (lo..=hi).contains(v) => {
                write_integer(*v, size, out);
                Ok(())
            }
            Some((lo, hi)) => Err(format!("{} outside {}..={} of {:?}", v, lo, hi, base)),
            None if base == BaseType::Float32 => {
                out.extend_from_slice(&(*v as f32).to_be_bytes());
                Ok(())
            }
            None => Err(format!("integer cannot be written as {:?}", base)),
        },
        FieldValue::Enum(v) => explicit(BaseType::Enum, *v as i64, out),
        FieldValue::UInt8(v) => explicit(BaseType::UInt8, *v as i64, out),
        FieldValue::UInt16(v) => explicit(BaseType::UInt16, *v as i64, out),
        FieldValue::UInt32(v) => explicit(BaseType::UInt32, *v as i64, out),
        FieldValue::SInt8(v) => explicit(BaseType::SInt8, *v as i64, out),
        FieldValue::SInt16(v) => explicit(BaseType::SInt16, *v as i64, out),
        FieldValue::SInt32(v) => explicit(BaseType::SInt32, *v as i64, out),
        FieldValue::Float(f) if slot.angle => {
            let semicircles = degrees_to_semicircles(*f)
                .ok_or_else(|| format!("{} degrees has no semicircle representation", f))?;
            out.extend_from_slice(&semicircles.to_be_bytes());
            Ok(())
        }
        FieldValue::Float(f) if base == BaseType::Float32 => {
            out.extend_from_slice(&(*f as f32).to_be_bytes());
            Ok(())
        }
        FieldValue::Float(_) => Err(format!("float cannot be written as {:?}", base)),
        FieldValue::Text(text) => {
            if base != BaseType::String {
                return Err(format!("string cannot be written as {:?}", base));
            }
            let bytes = text.as_bytes();
            if bytes.contains(&0) {
                return Err("string contains a zero byte".to_string());
            }
            if bytes.len() + 1 > size {
                return Err(format!("string of {} bytes exceeds field width {}", bytes.len(), size));
            }
            out.extend_from_slice(bytes);
            out.resize(out.len() + size - bytes.len(), 0);
            Ok(())
        }
        FieldValue::Bytes(bytes) => {
            if base != BaseType::Byte || bytes.len() != size {
                return Err(format!(
                    "{} raw bytes cannot be written as {:?}[{}]",
                    bytes.len(),
                    base,
                    size
                ));
            }
            out.extend_from_slice(bytes);
            Ok(())
        }
        FieldValue::Timestamp(time) => {
            if base != BaseType::UInt32 {
                return Err(format!("timestamp cannot be written as {:?}", base));
            }
            let seconds = fit_timestamp(*time).map_err(|e| e.to_string())?;
            out.extend_from_slice(&seconds.to_be_bytes());
            Ok(())
        }
        FieldValue::Bool(_) | FieldValue::List(_) => {
            Err(format!("{} values are not supported", value.kind()))
        }
    }
}

// Range is checked by the caller; truncation keeps two's-complement bytes.
fn write_integer(value: i64, size: usize, out: &mut Vec<u8>) {
    match size {
        1 => out.push(value as u8),
        2 => out.extend_from_slice(&(value as u16).to_be_bytes()),
        _ => out.extend_from_slice(&(value as u32).to_be_bytes()),
    }
}
