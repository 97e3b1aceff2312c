//! Activity file encoder
//!
//! Writes the 14-byte header on construction, then one definition record the first
//! time each message type appears and a data record for every message. The file is
//! staged in memory and committed to the sink by [`ActivityFileEncoder::finish`].
//!
//! ## Usage Example
//!
//! ```rust
//! use tirelab::fit::{ActivityFileEncoder, ActivityMessage, EncoderOptions, global};
//!
//! # fn main() -> tirelab::Result<()> {
//! let mut encoder = ActivityFileEncoder::new(Vec::new(), EncoderOptions::default());
//! encoder.write(&ActivityMessage::new(global::RECORD).with(253, 1_000u32).with(6, 5_000i64))?;
//! encoder.write(&ActivityMessage::new(global::RECORD).with(253, 1_001u32).with(6, 5_020i64))?;
//!
//! let (bytes, summary) = encoder.finish_into_inner()?;
//! assert_eq!(summary.definitions, 1);
//! assert_eq!(summary.records, 2);
//! assert_eq!(bytes.len(), summary.len);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info, trace};

use super::crc::ChecksumKind;
use super::finalizer::{ActivityFileFinalizer, FinishedFile};
use super::format::{DATA_TYPE_TAG, DEFAULT_PROFILE_VERSION, HEADER_SIZE, PROTOCOL_VERSION};
use super::inference::{FieldSlot, FieldTyping, encode_value, ensure_supported, infer_slot};
use super::message::{ActivityMessage, FieldValue};
use super::registry::{MAX_FIELDS, MessageDefinitionRegistry, MessageLayout};
use crate::config::RunConfig;
use crate::{Result, TelemetryError};

/// Encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderOptions {
    pub typing: FieldTyping,
    pub checksum: ChecksumKind,
    pub profile_version: u16,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            typing: FieldTyping::Legacy,
            checksum: ChecksumKind::Ccitt,
            profile_version: DEFAULT_PROFILE_VERSION,
        }
    }
}

impl From<&RunConfig> for EncoderOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            typing: config.field_typing,
            checksum: config.checksum,
            profile_version: config.profile_version,
        }
    }
}

/// Single-writer activity file encoder.
pub struct ActivityFileEncoder<W: Write> {
    sink: W,
    finalizer: ActivityFileFinalizer,
    options: EncoderOptions,
    registry: MessageDefinitionRegistry,
    bytes: Vec<u8>,
    records: usize,
}

impl ActivityFileEncoder<BufWriter<File>> {
    /// Create (truncating) a file at `path` and encode into it.
    pub fn create(path: impl AsRef<Path>, options: EncoderOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| TelemetryError::file_error(path.clone(), e))?;
        info!(path = %path.display(), "Creating activity file");

        let mut encoder = Self::new(BufWriter::new(file), options);
        encoder.finalizer = encoder.finalizer.with_path(path);
        Ok(encoder)
    }

    /// Finish and sync the file to storage.
    pub fn finish_synced(self) -> Result<FinishedFile> {
        let path = self.path().to_path_buf();
        let (writer, summary) = self.finish_into_inner()?;
        let file = writer
            .into_inner()
            .map_err(|e| TelemetryError::file_error(path.clone(), e.into_error()))?;
        file.sync_all().map_err(|e| TelemetryError::file_error(path, e))?;
        Ok(summary)
    }
}

impl<W: Write> ActivityFileEncoder<W> {
    pub fn new(sink: W, options: EncoderOptions) -> Self {
        let mut encoder = Self {
            sink,
            finalizer: ActivityFileFinalizer::new(options.checksum),
            options,
            registry: MessageDefinitionRegistry::new(),
            bytes: Vec::with_capacity(4096),
            records: 0,
        };
        encoder.write_header();
        encoder
    }

    /// Header with size and CRC placeholders, patched at finish.
    fn write_header(&mut self) {
        self.bytes.push(HEADER_SIZE as u8);
        self.bytes.push(PROTOCOL_VERSION);
        self.bytes.extend_from_slice(&self.options.profile_version.to_be_bytes());
        self.bytes.extend_from_slice(&[0; 4]);
        self.bytes.extend_from_slice(&DATA_TYPE_TAG);
        self.bytes.extend_from_slice(&[0; 2]);
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    pub fn registry(&self) -> &MessageDefinitionRegistry {
        &self.registry
    }

    /// Destination path, or `<memory>` for non-file sinks.
    pub fn path(&self) -> &Path {
        self.finalizer.path()
    }

    /// Bytes staged so far, including the header.
    pub fn staged_len(&self) -> usize {
        self.bytes.len()
    }

    /// Data records written so far.
    pub fn records_written(&self) -> usize {
        self.records
    }

    pub fn write(&mut self, message: &ActivityMessage) -> Result<()> {
        self.write_message(message.global_id, &message.fields)
    }

    /// Append one message, preceded by a definition record on first sight of its type.
    ///
    /// Nothing is appended when an error is returned.
    pub fn write_message(&mut self, global_id: u16, fields: &BTreeMap<u8, FieldValue>) -> Result<()> {
        let mut staged = Vec::new();

        match self.registry.get(global_id) {
            Some(layout) => encode_record(layout, fields, &mut staged)?,
            None => {
                if fields.len() > MAX_FIELDS {
                    return Err(TelemetryError::layout_mismatch(
                        global_id,
                        format!("{} fields exceed the {} a definition can describe", fields.len(), MAX_FIELDS),
                    ));
                }
                let local_type = self.registry.next_local_type(global_id)?;
                let slots = fields
                    .iter()
                    .map(|(&field_id, value)| infer_slot(self.options.typing, global_id, field_id, value))
                    .collect::<Result<Vec<FieldSlot>>>()?;
                let layout = MessageLayout::new(global_id, local_type, slots);

                layout.write_definition(&mut staged);
                staged.push(local_type);
                for (slot, value) in layout.slots.iter().zip(fields.values()) {
                    encode_value(slot, value, &mut staged).map_err(|details| {
                        TelemetryError::out_of_range(global_id, slot.definition.field_id, details)
                    })?;
                }

                debug!(global_id, local_type, fields = layout.slots.len(), "Defined message type");
                self.registry.register(layout)?;
            }
        }

        trace!(global_id, bytes = staged.len(), "Appending record");
        self.bytes.extend_from_slice(&staged);
        self.records += 1;
        Ok(())
    }

    /// Seal the file and commit it to the sink.
    pub fn finish(self) -> Result<FinishedFile> {
        self.finish_into_inner().map(|(_, summary)| summary)
    }

    /// Like [`finish`](Self::finish), returning the sink as well.
    pub fn finish_into_inner(mut self) -> Result<(W, FinishedFile)> {
        let sealed = self.finalizer.seal(&mut self.bytes)?;
        self.finalizer.commit(&self.bytes, &mut self.sink)?;

        let summary = FinishedFile {
            data_size: sealed.data_size,
            header_crc: sealed.header_crc,
            file_crc: sealed.file_crc,
            len: self.bytes.len(),
            definitions: self.registry.len(),
            records: self.records,
        };
        info!(
            len = summary.len,
            definitions = summary.definitions,
            records = summary.records,
            "Finished activity file"
        );
        Ok((self.sink, summary))
    }
}

/// Encode a data record against an existing layout.
fn encode_record(layout: &MessageLayout, fields: &BTreeMap<u8, FieldValue>, out: &mut Vec<u8>) -> Result<()> {
    if !layout.field_ids().eq(fields.keys().copied()) {
        return Err(TelemetryError::layout_mismatch(
            layout.global_id,
            format!(
                "fields {:?} differ from the defined fields {:?}",
                fields.keys().collect::<Vec<_>>(),
                layout.field_ids().collect::<Vec<_>>()
            ),
        ));
    }

    out.push(layout.local_type);
    for (slot, (&field_id, value)) in layout.slots.iter().zip(fields) {
        ensure_supported(layout.global_id, field_id, value)?;
        encode_value(slot, value, out).map_err(|details| {
            TelemetryError::layout_mismatch(layout.global_id, format!("field {}: {}", field_id, details))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::format::{BaseType, global};
    use crate::fit::reader::ActivityFileReader;
    use crate::fit::registry::MAX_LOCAL_TYPES;

    fn encoder() -> ActivityFileEncoder<Vec<u8>> {
        ActivityFileEncoder::new(Vec::new(), EncoderOptions::default())
    }

    #[test]
    fn header_placeholder_on_construction() {
        let encoder = encoder();
        assert_eq!(
            encoder.bytes,
            vec![14, 0x20, 0x08, 0x73, 0, 0, 0, 0, b'.', b'F', b'I', b'T', 0, 0]
        );
    }

    #[test]
    fn first_message_emits_definition_then_data() {
        let mut encoder = encoder();
        encoder
            .write(&ActivityMessage::new(global::FILE_ID).with(0, 4i64).with(1, 15i64))
            .unwrap();

        assert_eq!(
            &encoder.bytes[HEADER_SIZE..],
            &[
                0x40, 0, 1, 0x00, 0x00, 2, //
                0, 1, 0x00, //
                1, 1, 0x00, //
                0x00, 4, 15,
            ]
        );
    }

    #[test]
    fn later_records_reuse_the_layout() {
        let mut encoder = encoder();
        encoder.write(&ActivityMessage::new(global::RECORD).with(6, 1_000i64)).unwrap();
        let before = encoder.staged_len();
        encoder.write(&ActivityMessage::new(global::RECORD).with(6, 20i64)).unwrap();

        assert_eq!(&encoder.bytes[before..], &[0x00, 0x00, 20]);
        assert_eq!(encoder.registry().len(), 1);
        assert_eq!(encoder.records_written(), 2);
    }

    #[test]
    fn interleaves_message_types() {
        let mut encoder = encoder();
        encoder.write(&ActivityMessage::new(global::FILE_ID).with(0, 4i64)).unwrap();
        encoder.write(&ActivityMessage::new(global::RECORD).with(253, 1u32)).unwrap();
        encoder.write(&ActivityMessage::new(global::FILE_ID).with(0, 5i64)).unwrap();

        assert_eq!(encoder.registry().get(global::FILE_ID).unwrap().local_type, 0);
        assert_eq!(encoder.registry().get(global::RECORD).unwrap().local_type, 1);
        let tail = &encoder.bytes[encoder.staged_len() - 2..];
        assert_eq!(tail, &[0x00, 5]);
    }

    #[test]
    fn wider_later_value_is_a_layout_mismatch_and_appends_nothing() {
        let mut encoder = encoder();
        encoder.write(&ActivityMessage::new(global::RECORD).with(6, 10i64)).unwrap();
        let before = encoder.staged_len();

        let err = encoder.write(&ActivityMessage::new(global::RECORD).with(6, 1_000i64)).unwrap_err();
        assert!(matches!(err, TelemetryError::LayoutMismatch { global_id: 20, .. }));
        assert_eq!(encoder.staged_len(), before);
        assert_eq!(encoder.records_written(), 1);
    }

    #[test]
    fn different_field_set_is_a_layout_mismatch() {
        let mut encoder = encoder();
        encoder.write(&ActivityMessage::new(global::RECORD).with(6, 10i64)).unwrap();
        let err = encoder
            .write(&ActivityMessage::new(global::RECORD).with(6, 10i64).with(7, 3i64))
            .unwrap_err();
        assert!(matches!(err, TelemetryError::LayoutMismatch { .. }));
    }

    #[test]
    fn overflowing_override_on_first_record_is_out_of_range() {
        let mut encoder = encoder();
        let err = encoder.write(&ActivityMessage::new(global::RECORD).with(4, 300i64)).unwrap_err();
        assert!(matches!(err, TelemetryError::ValueOutOfRange { field_id: 4, .. }));
        assert!(encoder.registry().is_empty());
        assert_eq!(encoder.staged_len(), HEADER_SIZE);
    }

    #[test]
    fn unsupported_value_leaves_output_untouched() {
        let mut encoder = encoder();
        let err = encoder
            .write(&ActivityMessage::new(global::EVENT).with(0, 0i64).with(9, FieldValue::Bool(true)))
            .unwrap_err();
        assert!(matches!(err, TelemetryError::UnsupportedValue { field_id: 9, .. }));
        assert_eq!(encoder.staged_len(), HEADER_SIZE);
        assert!(encoder.registry().is_empty());
    }

    #[test]
    fn field_count_beyond_definition_byte_is_rejected() {
        let mut encoder = encoder();
        let full: BTreeMap<u8, FieldValue> = (0..=u8::MAX).map(|id| (id, FieldValue::UInt8(1))).collect();
        let err = encoder.write_message(300, &full).unwrap_err();
        assert!(matches!(err, TelemetryError::LayoutMismatch { global_id: 300, .. }));
        assert!(encoder.registry().is_empty());
        assert_eq!(encoder.staged_len(), HEADER_SIZE);

        let widest: BTreeMap<u8, FieldValue> = (0..u8::MAX).map(|id| (id, FieldValue::UInt8(1))).collect();
        encoder.write_message(300, &widest).unwrap();
        let bytes = encoder.finish_into_inner().unwrap().0;
        let reader = ActivityFileReader::from_bytes(&bytes, ChecksumKind::Ccitt).unwrap();
        assert_eq!(reader.messages()[0].fields.len(), MAX_FIELDS);
    }

    #[test]
    fn seventeenth_type_is_rejected() {
        let mut encoder = encoder();
        for global_id in 0..MAX_LOCAL_TYPES as u16 {
            encoder.write(&ActivityMessage::new(100 + global_id).with(9, 1i64)).unwrap();
        }
        let before = encoder.staged_len();
        let err = encoder.write(&ActivityMessage::new(500).with(9, 1i64)).unwrap_err();
        assert!(matches!(err, TelemetryError::LocalTypeCapacity { global_id: 500, capacity: 16 }));
        assert_eq!(encoder.staged_len(), before);
        // known types still encode
        encoder.write(&ActivityMessage::new(100).with(9, 2i64)).unwrap();
    }

    #[test]
    fn catalogue_typing_fixes_record_speed_width() {
        let options = EncoderOptions { typing: FieldTyping::Catalogue, ..EncoderOptions::default() };
        let mut encoder = ActivityFileEncoder::new(Vec::new(), options);
        encoder.write(&ActivityMessage::new(global::RECORD).with(6, 0i64)).unwrap();
        encoder.write(&ActivityMessage::new(global::RECORD).with(6, 8_000i64)).unwrap();

        let layout = encoder.registry().get(global::RECORD).unwrap();
        assert_eq!(layout.slots[0].definition.base_type, BaseType::UInt16);
    }

    #[test]
    fn finish_writes_sealed_bytes_to_sink() {
        let mut encoder = encoder();
        encoder.write(&ActivityMessage::new(global::RECORD).with(253, 7u32)).unwrap();
        let (bytes, summary) = encoder.finish_into_inner().unwrap();

        assert_eq!(bytes.len(), summary.len);
        assert_eq!(summary.data_size as usize, bytes.len() - HEADER_SIZE - 2);
        assert_eq!(&bytes[4..8], &summary.data_size.to_be_bytes());
        assert_eq!(ChecksumKind::Ccitt.compute(&bytes[..12]), summary.header_crc);
        assert_eq!(
            ChecksumKind::Ccitt.compute(&bytes[HEADER_SIZE..bytes.len() - 2]),
            summary.file_crc
        );
        assert_eq!(&bytes[bytes.len() - 2..], &summary.file_crc.to_le_bytes());
    }

    #[test]
    fn profile_version_comes_from_config() {
        let config = RunConfig { profile_version: 2100, ..RunConfig::default() };
        let encoder = ActivityFileEncoder::new(Vec::new(), EncoderOptions::from(&config));
        assert_eq!(&encoder.bytes[2..4], &2100u16.to_be_bytes());
    }
}
