//! Activity file encoding
//!
//! A compact binary format of interleaved definition and data records:
//!
//! - [`ActivityFileEncoder`] writes the header and records, inferring field types
//! - [`MessageDefinitionRegistry`] assigns local message types and fixes layouts
//! - [`ActivityFileFinalizer`] patches sizes and checksums when the file is finished
//! - [`ActivityFileReader`] parses a finished file back and verifies it
//!
//! See [`format`] for the byte layout and [`inference`] for the typing rules.

pub mod crc;
pub mod encoder;
pub mod finalizer;
pub mod format;
pub mod inference;
pub mod message;
pub mod reader;
pub mod registry;

pub use crc::{ChecksumKind, Crc16};
pub use encoder::{ActivityFileEncoder, EncoderOptions};
pub use finalizer::{ActivityFileFinalizer, FinishedFile, SealedFile};
pub use format::{BaseType, FieldDefinition, global};
pub use inference::{FieldSlot, FieldTyping};
pub use message::{ActivityMessage, FieldValue};
pub use reader::{ActivityFileReader, DecodedField, DecodedMessage, DecodedValue, FileHeader};
pub use registry::{MAX_FIELDS, MAX_LOCAL_TYPES, MessageDefinitionRegistry, MessageLayout};
