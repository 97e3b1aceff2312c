//! 16-bit checksums for activity files

use serde::{Deserialize, Serialize};

/// Which checksum an activity file carries, and what the trailing CRC covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChecksumKind {
    /// CRC-16/CCITT (poly 0x1021, init 0). Trailer covers the data region only.
    #[default]
    Ccitt,
    /// The vendor SDK's nibble-table CRC (CRC-16/ARC). Trailer covers header and data.
    FitSdk,
}

impl ChecksumKind {
    /// Checksum of `bytes` from a zero seed.
    pub fn compute(self, bytes: &[u8]) -> u16 {
        let mut crc = Crc16::new(self);
        crc.update(bytes);
        crc.value()
    }

    /// Whether the trailing CRC includes the header bytes.
    pub fn trailer_covers_header(self) -> bool {
        matches!(self, ChecksumKind::FitSdk)
    }
}

const CCITT_TABLE: [u16; 256] = ccitt_table();

const fn ccitt_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const FIT_SDK_TABLE: [u16; 16] = [
    0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800,
    0xB401, 0x5000, 0x9C01, 0x8801, 0x4400,
];

/// Running checksum.
#[derive(Debug, Clone, Copy)]
pub struct Crc16 {
    kind: ChecksumKind,
    value: u16,
}

impl Crc16 {
    pub fn new(kind: ChecksumKind) -> Self {
        Self { kind, value: 0 }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        match self.kind {
            ChecksumKind::Ccitt => {
                for &byte in bytes {
                    let index = ((self.value >> 8) as u8 ^ byte) as usize;
                    self.value = (self.value << 8) ^ CCITT_TABLE[index];
                }
            }
            ChecksumKind::FitSdk => {
                for &byte in bytes {
                    self.value = fit_sdk_step(self.value, byte);
                }
            }
        }
    }

    pub fn value(&self) -> u16 {
        self.value
    }
}

fn fit_sdk_step(mut crc: u16, byte: u8) -> u16 {
    // low nibble
    let tmp = FIT_SDK_TABLE[(crc & 0xF) as usize];
    crc = (crc >> 4) & 0x0FFF;
    crc = crc ^ tmp ^ FIT_SDK_TABLE[(byte & 0xF) as usize];
    // high nibble
    let tmp = FIT_SDK_TABLE[(crc & 0xF) as usize];
    crc = (crc >> 4) & 0x0FFF;
    crc ^ tmp ^ FIT_SDK_TABLE[((byte >> 4) & 0xF) as usize]
}
