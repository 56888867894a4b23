//! File header shared by log segments and snapshots.
//!
//! # Layout (16 bytes, little-endian)
//!
//! ```text
//! ┌───────────┬──────────────┬────────────────┐
//! │ Magic (4) │ Version (4)  │ Database id (8)│
//! └───────────┴──────────────┴────────────────┘
//! ```
//!
//! The header is written once when a file is created and fsynced before any
//! other bytes. A file whose header is missing or wrong is never read further.

use byteorder::{ByteOrder, LittleEndian};
use std::io::Read;

/// Size of the file header in bytes
pub const FILE_HEADER_SIZE: usize = 16;

/// Magic bytes of a log segment: "ZKLG"
pub const LOG_MAGIC: [u8; 4] = *b"ZKLG";

/// Magic bytes of a snapshot: "ZKSN"
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"ZKSN";

/// Current on-disk format version
pub const FILE_FORMAT_VERSION: u32 = 2;

/// Header at the start of every log segment and snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// File kind marker
    pub magic: [u8; 4],
    /// Format version
    pub version: u32,
    /// Database id
    pub dbid: u64,
}

impl FileHeader {
    /// Header for a log segment
    pub fn log(dbid: u64) -> Self {
        FileHeader {
            magic: LOG_MAGIC,
            version: FILE_FORMAT_VERSION,
            dbid,
        }
    }

    /// Header for a snapshot
    pub fn snapshot(dbid: u64) -> Self {
        FileHeader {
            magic: SNAPSHOT_MAGIC,
            version: FILE_FORMAT_VERSION,
            dbid,
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        LittleEndian::write_u32(&mut bytes[4..8], self.version);
        LittleEndian::write_u64(&mut bytes[8..16], self.dbid);
        bytes
    }

    /// Parse and validate against the expected magic.
    pub fn from_bytes(bytes: &[u8], expected_magic: [u8; 4]) -> Result<Self, FileHeaderError> {
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(FileHeaderError::TooShort { len: bytes.len() });
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        if magic != expected_magic {
            return Err(FileHeaderError::BadMagic {
                expected: expected_magic,
                actual: magic,
            });
        }
        let version = LittleEndian::read_u32(&bytes[4..8]);
        if version != FILE_FORMAT_VERSION {
            return Err(FileHeaderError::UnsupportedVersion(version));
        }
        Ok(FileHeader {
            magic,
            version,
            dbid: LittleEndian::read_u64(&bytes[8..16]),
        })
    }

    /// Read and validate a header from the start of a stream.
    pub fn read_from<R: Read>(reader: &mut R, expected_magic: [u8; 4]) -> Result<Self, FileHeaderError> {
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        let mut filled = 0;
        while filled < FILE_HEADER_SIZE {
            match reader.read(&mut bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FileHeaderError::Io(e)),
            }
        }
        Self::from_bytes(&bytes[..filled], expected_magic)
    }
}

/// File header validation errors
#[derive(Debug, thiserror::Error)]
pub enum FileHeaderError {
    /// Fewer than 16 bytes available
    #[error("file header too short: {len} bytes")]
    TooShort {
        /// Bytes available
        len: usize,
    },

    /// Wrong magic bytes
    #[error("bad magic: expected {expected:?}, got {actual:?}")]
    BadMagic {
        /// Expected magic
        expected: [u8; 4],
        /// Magic found in the file
        actual: [u8; 4],
    },

    /// Version this build cannot read
    #[error("unsupported file format version {0}")]
    UnsupportedVersion(u32),

    /// I/O error while reading the header
    #[error("I/O error reading file header: {0}")]
    Io(#[from] std::io::Error),
}
