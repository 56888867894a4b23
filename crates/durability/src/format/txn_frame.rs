//! Transaction log record frame.
//!
//! # Frame Layout
//!
//! ```text
//! ┌─────────────────┬────────────────┬──────────────┬──────────────┬──────────┐
//! │ Length (4 bytes)│ Format Ver (1) │ Header (32)  │ Body (var)   │ CRC32 (4)│
//! └─────────────────┴────────────────┴──────────────┴──────────────┴──────────┘
//! ```
//!
//! `Length` counts the version byte, header and body. The CRC covers the same
//! bytes. A zero length word is never a record: segments are preallocated with
//! zeros, so it marks the end of the written log.

use super::txn_body::{read_header, read_txn, write_header, write_txn, TXN_HEADER_SIZE};
use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher;
use keeperlog_core::{Txn, TxnHeader};
use std::io::Cursor;

/// Current frame format version
pub const FRAME_FORMAT_VERSION: u8 = 1;

/// Largest accepted value of the length word
pub const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

/// Bytes a frame adds around its header and body (length, version, CRC)
pub const FRAME_OVERHEAD: usize = 4 + 1 + 4;

/// Frame decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes available than the frame declares
    #[error("truncated frame")]
    Truncated,

    /// Checksum, version or content is invalid
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Zero length word: preallocated padding, no more records
    #[error("end of log")]
    EndOfLog,
}

/// Frame codec for `(TxnHeader, Txn)` pairs
pub struct TxnFrame;

impl TxnFrame {
    /// Encode a record.
    ///
    /// The op code written in the header is taken from `txn`, so the frame is
    /// always self-consistent.
    pub fn encode(header: &TxnHeader, txn: &Txn) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_OVERHEAD + TXN_HEADER_SIZE + 64);
        buf.extend_from_slice(&[0u8; 4]);
        buf.push(FRAME_FORMAT_VERSION);
        write_header(&mut buf, header, txn.op_code());
        write_txn(&mut buf, txn);

        let len = (buf.len() - 4) as u32;
        LittleEndian::write_u32(&mut buf[0..4], len);

        let mut hasher = Hasher::new();
        hasher.update(&buf[4..]);
        let crc = hasher.finalize();
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode one record from the front of `bytes`.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(TxnHeader, Txn, usize), FrameError> {
        if bytes.len() < 4 {
            return Err(FrameError::Truncated);
        }
        let len = LittleEndian::read_u32(&bytes[0..4]) as usize;
        Self::check_length(len)?;
        let total = 4 + len + 4;
        if bytes.len() < total {
            return Err(FrameError::Truncated);
        }
        let (header, txn) = Self::decode_content(&bytes[4..4 + len], &bytes[4 + len..total])?;
        Ok((header, txn, total))
    }

    /// Validate a length word before reading the rest of the frame.
    pub fn check_length(len: usize) -> Result<(), FrameError> {
        if len == 0 {
            return Err(FrameError::EndOfLog);
        }
        if len > MAX_RECORD_SIZE {
            return Err(FrameError::Malformed(format!(
                "record length {} exceeds maximum {}",
                len, MAX_RECORD_SIZE
            )));
        }
        if len < 1 + TXN_HEADER_SIZE {
            return Err(FrameError::Malformed(format!(
                "record length {} too short for header",
                len
            )));
        }
        Ok(())
    }

    /// Decode `content` (version, header, body) against its stored CRC.
    pub fn decode_content(content: &[u8], crc_bytes: &[u8]) -> Result<(TxnHeader, Txn), FrameError> {
        if crc_bytes.len() < 4 {
            return Err(FrameError::Truncated);
        }
        let stored = LittleEndian::read_u32(&crc_bytes[0..4]);
        let mut hasher = Hasher::new();
        hasher.update(content);
        let computed = hasher.finalize();
        if stored != computed {
            return Err(FrameError::Malformed(format!(
                "CRC mismatch: stored {:08x}, computed {:08x}",
                stored, computed
            )));
        }

        let Some(&version) = content.first() else {
            return Err(FrameError::Malformed("empty record content".to_string()));
        };
        if version != FRAME_FORMAT_VERSION {
            return Err(FrameError::Malformed(format!(
                "unsupported frame version {}",
                version
            )));
        }

        let mut cur = Cursor::new(&content[1..]);
        let header = read_header(&mut cur)?;
        let txn = read_txn(&mut cur, header.op)?;
        if cur.position() as usize != content.len() - 1 {
            return Err(FrameError::Malformed(format!(
                "{} trailing bytes after body",
                content.len() - 1 - cur.position() as usize
            )));
        }
        Ok((header, txn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeperlog_core::{Acl, OpCode, SetAclTxn};

    fn sample() -> (TxnHeader, Txn) {
        let txn = Txn::SetAcl(SetAclTxn {
            path: "/config".to_string(),
            acl: Acl::read_unsafe(),
            version: 3,
        });
        (TxnHeader::new(0x55, 9, 77, 123_456, OpCode::SetAcl), txn)
    }

    #[test]
    fn test_decode_inverts_encode() {
        let (header, txn) = sample();
        let bytes = TxnFrame::encode(&header, &txn);
        let (h, t, consumed) = TxnFrame::decode(&bytes).unwrap();
        assert_eq!(h, header);
        assert_eq!(t, txn);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_header_op_follows_body() {
        let header = TxnHeader::new(1, 1, 1, 0, OpCode::Error);
        let bytes = TxnFrame::encode(&header, &Txn::delete("/x"));
        let (h, _, _) = TxnFrame::decode(&bytes).unwrap();
        assert_eq!(h.op, OpCode::Delete);
    }

    #[test]
    fn test_truncated() {
        let (header, txn) = sample();
        let bytes = TxnFrame::encode(&header, &txn);
        for cut in [0, 3, 4, 10, bytes.len() - 1] {
            assert_eq!(
                TxnFrame::decode(&bytes[..cut]).unwrap_err(),
                FrameError::Truncated,
                "cut at {}",
                cut
            );
        }
    }

    #[test]
    fn test_zero_length_is_end_of_log() {
        assert_eq!(TxnFrame::decode(&[0u8; 64]).unwrap_err(), FrameError::EndOfLog);
    }

    #[test]
    fn test_corruption_is_malformed() {
        let (header, txn) = sample();
        let mut bytes = TxnFrame::encode(&header, &txn);
        bytes[12] ^= 0x01;
        assert!(matches!(
            TxnFrame::decode(&bytes),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn test_unknown_op_is_malformed() {
        let (header, txn) = sample();
        let mut bytes = TxnFrame::encode(&header, &txn);
        // op code is the last header field: 4 (len) + 1 (ver) + 28
        bytes[33..37].copy_from_slice(&99i32.to_le_bytes());
        let end = bytes.len() - 4;
        let mut hasher = Hasher::new();
        hasher.update(&bytes[4..end]);
        let crc = hasher.finalize();
        bytes[end..].copy_from_slice(&crc.to_le_bytes());

        match TxnFrame::decode(&bytes) {
            Err(FrameError::Malformed(msg)) => assert!(msg.contains("op code")),
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_length_is_malformed() {
        let mut bytes = vec![0u8; 16];
        LittleEndian::write_u32(&mut bytes[0..4], (MAX_RECORD_SIZE + 1) as u32);
        assert!(matches!(
            TxnFrame::decode(&bytes),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn test_empty_content_is_malformed() {
        // CRC32 of no bytes is zero, so the checksum alone passes.
        let crc = Hasher::new().finalize().to_le_bytes();
        assert!(matches!(
            TxnFrame::decode_content(&[], &crc),
            Err(FrameError::Malformed(msg)) if msg.contains("empty")
        ));
    }

    #[test]
    fn test_content_without_header_is_malformed() {
        let content = [FRAME_FORMAT_VERSION];
        let mut hasher = Hasher::new();
        hasher.update(&content);
        let crc = hasher.finalize().to_le_bytes();
        assert!(TxnFrame::decode_content(&content, &crc).is_err());
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decode_arbitrary_bytes_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
                let _ = TxnFrame::decode(&bytes);
            }

            #[test]
            fn every_strict_prefix_is_truncated(data in proptest::collection::vec(any::<u8>(), 0..64), cut in 0usize..200) {
                let header = TxnHeader::new(3, 4, 5, 6, OpCode::SetData);
                let bytes = TxnFrame::encode(&header, &Txn::set_data("/p", data, 2));
                let cut = cut % bytes.len();
                prop_assert_eq!(TxnFrame::decode(&bytes[..cut]).unwrap_err(), FrameError::Truncated);
            }
        }
    }
}
