//! Activity file format constants and base types
//!
//! ## File Structure
//!
//! 1. **Header** (14 bytes, big-endian except the CRC)
//! 2. **Records** - interleaved definition and data records, big-endian payload
//! 3. **Trailer** - 2-byte CRC, little-endian
//!
//! ```text
//! offset  size  field
//! 0       1     header size (14)
//! 1       1     protocol version (0x20)
//! 2       2     profile version (BE)
//! 4       4     data size, bytes after the header excluding the trailer (BE)
//! 8       4     ".FIT"
//! 12      2     header CRC over bytes 0..12 (LE)
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::{Result, TelemetryError};

pub const HEADER_SIZE: usize = 14;
/// Bytes of the header covered by the header CRC.
pub const HEADER_CRC_SPAN: usize = 12;
pub const PROTOCOL_VERSION: u8 = 0x20;
pub const DEFAULT_PROFILE_VERSION: u16 = 2163;
pub const DATA_TYPE_TAG: [u8; 4] = *b".FIT";
pub const DATA_SIZE_OFFSET: usize = 4;
pub const HEADER_CRC_OFFSET: usize = 12;
pub const TRAILER_SIZE: usize = 2;

/// Record header bit marking a definition record.
pub const DEFINITION_BIT: u8 = 0x40;
/// Record header bit marking a compressed-timestamp record.
pub const COMPRESSED_TIMESTAMP_BIT: u8 = 0x80;
/// Record header bit marking developer field definitions.
pub const DEVELOPER_DATA_BIT: u8 = 0x20;
pub const LOCAL_TYPE_MASK: u8 = 0x0F;
/// Architecture byte for big-endian payloads.
pub const ARCHITECTURE_BIG_ENDIAN: u8 = 1;

/// Unix time of 1989-12-31T00:00:00Z, the activity-file epoch.
pub const FIT_EPOCH_UNIX_SECONDS: u64 = 631_065_600;

/// Well-known global message numbers.
pub mod global {
    pub const FILE_ID: u16 = 0;
    pub const SESSION: u16 = 18;
    pub const LAP: u16 = 19;
    pub const RECORD: u16 = 20;
    pub const EVENT: u16 = 21;
    pub const DEVICE_INFO: u16 = 23;
    pub const ACTIVITY: u16 = 34;
}

/// Field base types and their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    Enum,
    SInt8,
    UInt8,
    SInt16,
    UInt16,
    SInt32,
    UInt32,
    String,
    Float32,
    Float64,
    UInt8z,
    UInt16z,
    UInt32z,
    Byte,
}

impl BaseType {
    /// Wire type code as written in definition records.
    pub const fn code(self) -> u8 {
        match self {
            BaseType::Enum => 0x00,
            BaseType::SInt8 => 0x01,
            BaseType::UInt8 => 0x02,
            BaseType::SInt16 => 0x83,
            BaseType::UInt16 => 0x84,
            BaseType::SInt32 => 0x85,
            BaseType::UInt32 => 0x86,
            BaseType::String => 0x07,
            BaseType::Float32 => 0x88,
            BaseType::Float64 => 0x89,
            BaseType::UInt8z => 0x0A,
            BaseType::UInt16z => 0x8B,
            BaseType::UInt32z => 0x8C,
            BaseType::Byte => 0x0D,
        }
    }

    /// Look up a base type by wire code. Only the low five bits identify the type;
    /// bit 7 flags multi-byte types.
    pub fn from_code(code: u8) -> Option<Self> {
        let base = match code & 0x1F {
            0x00 => BaseType::Enum,
            0x01 => BaseType::SInt8,
            0x02 => BaseType::UInt8,
            0x03 => BaseType::SInt16,
            0x04 => BaseType::UInt16,
            0x05 => BaseType::SInt32,
            0x06 => BaseType::UInt32,
            0x07 => BaseType::String,
            0x08 => BaseType::Float32,
            0x09 => BaseType::Float64,
            0x0A => BaseType::UInt8z,
            0x0B => BaseType::UInt16z,
            0x0C => BaseType::UInt32z,
            0x0D => BaseType::Byte,
            _ => return None,
        };
        Some(base)
    }

    /// Width of one element, or `None` for variable-width types.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            BaseType::Enum | BaseType::SInt8 | BaseType::UInt8 | BaseType::UInt8z => Some(1),
            BaseType::SInt16 | BaseType::UInt16 | BaseType::UInt16z => Some(2),
            BaseType::SInt32 | BaseType::UInt32 | BaseType::UInt32z | BaseType::Float32 => {
                Some(4)
            }
            BaseType::Float64 => Some(8),
            BaseType::String | BaseType::Byte => None,
        }
    }

    /// Inclusive integer range this type can carry, if it is an integer type.
    pub const fn integer_range(self) -> Option<(i64, i64)> {
        match self {
            BaseType::Enum | BaseType::UInt8 | BaseType::UInt8z => Some((0, u8::MAX as i64)),
            BaseType::SInt8 => Some((i8::MIN as i64, i8::MAX as i64)),
            BaseType::UInt16 | BaseType::UInt16z => Some((0, u16::MAX as i64)),
            BaseType::SInt16 => Some((i16::MIN as i64, i16::MAX as i64)),
            BaseType::UInt32 | BaseType::UInt32z => Some((0, u32::MAX as i64)),
            BaseType::SInt32 => Some((i32::MIN as i64, i32::MAX as i64)),
            _ => None,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, BaseType::SInt8 | BaseType::SInt16 | BaseType::SInt32)
    }
}

/// One (field id, width, base type) triple of a definition record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldDefinition {
    pub field_id: u8,
    pub size: u8,
    pub base_type: BaseType,
}

/// Degrees to semicircles: `round(degrees × 2^31 / 180)`.
///
/// +180° is the same meridian as −180° and encodes as `i32::MIN`.
pub fn degrees_to_semicircles(degrees: f64) -> Option<i32> {
    let value = (degrees * (2f64.powi(31) / 180.0)).round();
    if value == 2f64.powi(31) {
        Some(i32::MIN)
    } else if value.is_finite() && value >= i32::MIN as f64 && value <= i32::MAX as f64 {
        Some(value as i32)
    } else {
        None
    }
}

/// Semicircles to degrees.
pub fn semicircles_to_degrees(semicircles: i32) -> f64 {
    semicircles as f64 * (180.0 / 2f64.powi(31))
}

/// Seconds since the activity-file epoch.
pub fn fit_timestamp(time: SystemTime) -> Result<u32> {
    let unix = time.duration_since(UNIX_EPOCH).map_err(|_| TelemetryError::Parse {
        context: "Timestamp conversion".to_string(),
        details: "time precedes the Unix epoch".to_string(),
    })?;
    let seconds = unix.as_secs().checked_sub(FIT_EPOCH_UNIX_SECONDS).ok_or_else(|| {
        TelemetryError::Parse {
            context: "Timestamp conversion".to_string(),
            details: "time precedes 1989-12-31".to_string(),
        }
    })?;
    u32::try_from(seconds).map_err(|_| TelemetryError::Parse {
        context: "Timestamp conversion".to_string(),
        details: format!("{} seconds past the epoch does not fit 32 bits", seconds),
    })
}

/// Inverse of [`fit_timestamp`].
pub fn system_time_from_fit(seconds: u32) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(FIT_EPOCH_UNIX_SECONDS + seconds as u64)
}
