//! Closing an activity file
//!
//! The finalizer patches the header of a staged file in place, appends the trailing
//! checksum and commits the bytes to a sink. A file that fails to commit is invalid;
//! there is no partial recovery.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::crc::ChecksumKind;
use super::format::{DATA_SIZE_OFFSET, HEADER_CRC_OFFSET, HEADER_CRC_SPAN, HEADER_SIZE};
use crate::{Result, TelemetryError};

/// Summary of a finished activity file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishedFile {
    /// Bytes after the header, excluding the trailer
    pub data_size: u32,
    pub header_crc: u16,
    pub file_crc: u16,
    /// Total file length
    pub len: usize,
    /// Definition records written
    pub definitions: usize,
    /// Data records written
    pub records: usize,
}

/// CRC and size values written into a sealed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealedFile {
    pub data_size: u32,
    pub header_crc: u16,
    pub file_crc: u16,
}

/// Patches sizes and checksums and commits the result.
#[derive(Debug, Clone)]
pub struct ActivityFileFinalizer {
    checksum: ChecksumKind,
    path: PathBuf,
}

impl ActivityFileFinalizer {
    pub fn new(checksum: ChecksumKind) -> Self {
        Self { checksum, path: PathBuf::from("<memory>") }
    }

    /// Attach the destination path used in error context.
    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn checksum(&self) -> ChecksumKind {
        self.checksum
    }

    /// Patch the data size and header CRC, then append the trailing CRC.
    ///
    /// `file` must start with a header placeholder. It is left untouched on error.
    pub fn seal(&self, file: &mut Vec<u8>) -> Result<SealedFile> {
        if file.len() < HEADER_SIZE {
            return Err(self.invalid(format!(
                "staged file is {} bytes, shorter than the {}-byte header",
                file.len(),
                HEADER_SIZE
            )));
        }

        let data_size = u32::try_from(file.len() - HEADER_SIZE)
            .map_err(|_| self.invalid("data region exceeds 4 GiB".to_string()))?;
        file[DATA_SIZE_OFFSET..DATA_SIZE_OFFSET + 4].copy_from_slice(&data_size.to_be_bytes());

        let header_crc = self.checksum.compute(&file[..HEADER_CRC_SPAN]);
        file[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 2].copy_from_slice(&header_crc.to_le_bytes());

        let covered = if self.checksum.trailer_covers_header() { &file[..] } else { &file[HEADER_SIZE..] };
        let file_crc = self.checksum.compute(covered);
        file.extend_from_slice(&file_crc.to_le_bytes());

        debug!(
            data_size,
            header_crc = format_args!("{:#06x}", header_crc),
            file_crc = format_args!("{:#06x}", file_crc),
            checksum = ?self.checksum,
            "Sealed activity file"
        );

        Ok(SealedFile { data_size, header_crc, file_crc })
    }

    /// Write the sealed bytes and flush the sink.
    pub fn commit<W: Write>(&self, file: &[u8], sink: &mut W) -> Result<()> {
        sink.write_all(file).map_err(|e| TelemetryError::file_error(self.path.clone(), e))?;
        sink.flush().map_err(|e| TelemetryError::file_error(self.path.clone(), e))
    }

    fn invalid(&self, details: String) -> TelemetryError {
        TelemetryError::file_error(
            self.path.clone(),
            std::io::Error::new(std::io::ErrorKind::InvalidData, details),
        )
    }
}
