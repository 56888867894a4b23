//! Binary encoding of transaction headers and bodies.
//!
//! All integers are little-endian. Strings and byte buffers are prefixed with
//! a `u32` length. A body is decoded according to the op code carried in its
//! header; the header alone identifies the variant.
//!
//! # Header (32 bytes)
//!
//! ```text
//! ┌───────────────┬──────────┬──────────┬──────────┬──────────┐
//! │ ClientId (8)  │ Cxid (4) │ Zxid (8) │ Time (8) │ Op (4)   │
//! └───────────────┴──────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! # Bodies
//!
//! | Op            | Fields                                              |
//! |---------------|-----------------------------------------------------|
//! | Create        | path, data, acl, ephemeral u8, parent_cversion i32  |
//! | Delete        | path                                                |
//! | SetData       | path, data, version i32                             |
//! | SetAcl        | path, acl, version i32                              |
//! | Check         | path, version i32                                   |
//! | Multi         | count u32, then (op i32, body) per sub-transaction  |
//! | Error         | err i32                                             |
//! | CreateSession | timeout i32                                         |
//! | CloseSession  | (empty)                                             |

use super::txn_frame::FrameError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use keeperlog_core::{
    Acl, CheckVersionTxn, CreateSessionTxn, CreateTxn, DeleteTxn, ErrorTxn, MultiTxn, OpCode,
    SetAclTxn, SetDataTxn, Txn, TxnHeader,
};
use std::io::Cursor;

/// Encoded header size
pub const TXN_HEADER_SIZE: usize = 32;

type Reader<'a> = Cursor<&'a [u8]>;

fn short(_: std::io::Error) -> FrameError {
    FrameError::Malformed("insufficient body bytes".to_string())
}

// ============================================================================
// Encoding
// ============================================================================

/// Append the encoded header. `op` overrides `header.op`.
pub fn write_header(buf: &mut Vec<u8>, header: &TxnHeader, op: OpCode) {
    // Writes into a Vec cannot fail.
    let _ = buf.write_i64::<LittleEndian>(header.client_id);
    let _ = buf.write_i32::<LittleEndian>(header.cxid);
    let _ = buf.write_u64::<LittleEndian>(header.zxid);
    let _ = buf.write_i64::<LittleEndian>(header.time);
    let _ = buf.write_i32::<LittleEndian>(op.code());
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    let _ = buf.write_u32::<LittleEndian>(bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

fn write_acl(buf: &mut Vec<u8>, acl: &[Acl]) {
    let _ = buf.write_u32::<LittleEndian>(acl.len() as u32);
    for entry in acl {
        let _ = buf.write_i32::<LittleEndian>(entry.perms);
        write_bytes(buf, entry.scheme.as_bytes());
        write_bytes(buf, entry.id.as_bytes());
    }
}

/// Append the encoded body of `txn`.
pub fn write_txn(buf: &mut Vec<u8>, txn: &Txn) {
    match txn {
        Txn::Create(t) => {
            write_bytes(buf, t.path.as_bytes());
            write_bytes(buf, &t.data);
            write_acl(buf, &t.acl);
            buf.push(t.ephemeral as u8);
            let _ = buf.write_i32::<LittleEndian>(t.parent_cversion);
        }
        Txn::Delete(t) => write_bytes(buf, t.path.as_bytes()),
        Txn::SetData(t) => {
            write_bytes(buf, t.path.as_bytes());
            write_bytes(buf, &t.data);
            let _ = buf.write_i32::<LittleEndian>(t.version);
        }
        Txn::SetAcl(t) => {
            write_bytes(buf, t.path.as_bytes());
            write_acl(buf, &t.acl);
            let _ = buf.write_i32::<LittleEndian>(t.version);
        }
        Txn::Check(t) => {
            write_bytes(buf, t.path.as_bytes());
            let _ = buf.write_i32::<LittleEndian>(t.version);
        }
        Txn::Multi(t) => {
            let _ = buf.write_u32::<LittleEndian>(t.txns.len() as u32);
            for sub in &t.txns {
                let _ = buf.write_i32::<LittleEndian>(sub.op_code().code());
                write_txn(buf, sub);
            }
        }
        Txn::Error(t) => {
            let _ = buf.write_i32::<LittleEndian>(t.err);
        }
        Txn::CreateSession(t) => {
            let _ = buf.write_i32::<LittleEndian>(t.timeout);
        }
        Txn::CloseSession => {}
    }
}

// ============================================================================
// Decoding
// ============================================================================

fn read_op(cur: &mut Reader<'_>) -> Result<OpCode, FrameError> {
    let code = cur.read_i32::<LittleEndian>().map_err(short)?;
    OpCode::try_from(code).map_err(|_| FrameError::Malformed(format!("unknown op code {}", code)))
}

/// Decode a header.
pub fn read_header(cur: &mut Reader<'_>) -> Result<TxnHeader, FrameError> {
    let client_id = cur.read_i64::<LittleEndian>().map_err(short)?;
    let cxid = cur.read_i32::<LittleEndian>().map_err(short)?;
    let zxid = cur.read_u64::<LittleEndian>().map_err(short)?;
    let time = cur.read_i64::<LittleEndian>().map_err(short)?;
    let op = read_op(cur)?;
    Ok(TxnHeader::new(client_id, cxid, zxid, time, op))
}

fn read_bytes(cur: &mut Reader<'_>) -> Result<Vec<u8>, FrameError> {
    let len = cur.read_u32::<LittleEndian>().map_err(short)? as usize;
    let remaining = cur.get_ref().len() - cur.position() as usize;
    if len > remaining {
        return Err(FrameError::Malformed(format!(
            "buffer length {} exceeds remaining {}",
            len, remaining
        )));
    }
    let start = cur.position() as usize;
    let bytes = cur.get_ref()[start..start + len].to_vec();
    cur.set_position((start + len) as u64);
    Ok(bytes)
}

fn read_string(cur: &mut Reader<'_>) -> Result<String, FrameError> {
    String::from_utf8(read_bytes(cur)?)
        .map_err(|_| FrameError::Malformed("invalid UTF-8 in string".to_string()))
}

fn read_acl(cur: &mut Reader<'_>) -> Result<Vec<Acl>, FrameError> {
    let count = cur.read_u32::<LittleEndian>().map_err(short)? as usize;
    // Each entry takes at least 12 bytes; bound the allocation by what is left.
    let remaining = cur.get_ref().len() - cur.position() as usize;
    let mut acl = Vec::with_capacity(count.min(remaining / 12));
    for _ in 0..count {
        let perms = cur.read_i32::<LittleEndian>().map_err(short)?;
        let scheme = read_string(cur)?;
        let id = read_string(cur)?;
        acl.push(Acl { perms, scheme, id });
    }
    Ok(acl)
}

/// Decode the body for `op`.
pub fn read_txn(cur: &mut Reader<'_>, op: OpCode) -> Result<Txn, FrameError> {
    read_txn_nested(cur, op, false)
}

fn read_txn_nested(cur: &mut Reader<'_>, op: OpCode, in_multi: bool) -> Result<Txn, FrameError> {
    let txn = match op {
        OpCode::Create => Txn::Create(CreateTxn {
            path: read_string(cur)?,
            data: read_bytes(cur)?,
            acl: read_acl(cur)?,
            ephemeral: match cur.read_u8().map_err(short)? {
                0 => false,
                1 => true,
                other => {
                    return Err(FrameError::Malformed(format!(
                        "invalid ephemeral flag {}",
                        other
                    )))
                }
            },
            parent_cversion: cur.read_i32::<LittleEndian>().map_err(short)?,
        }),
        OpCode::Delete => Txn::Delete(DeleteTxn {
            path: read_string(cur)?,
        }),
        OpCode::SetData => Txn::SetData(SetDataTxn {
            path: read_string(cur)?,
            data: read_bytes(cur)?,
            version: cur.read_i32::<LittleEndian>().map_err(short)?,
        }),
        OpCode::SetAcl => Txn::SetAcl(SetAclTxn {
            path: read_string(cur)?,
            acl: read_acl(cur)?,
            version: cur.read_i32::<LittleEndian>().map_err(short)?,
        }),
        OpCode::Check => Txn::Check(CheckVersionTxn {
            path: read_string(cur)?,
            version: cur.read_i32::<LittleEndian>().map_err(short)?,
        }),
        OpCode::Multi => {
            if in_multi {
                return Err(FrameError::Malformed("nested multi".to_string()));
            }
            let count = cur.read_u32::<LittleEndian>().map_err(short)? as usize;
            let remaining = cur.get_ref().len() - cur.position() as usize;
            let mut txns = Vec::with_capacity(count.min(remaining / 4));
            for _ in 0..count {
                let sub_op = read_op(cur)?;
                txns.push(read_txn_nested(cur, sub_op, true)?);
            }
            Txn::Multi(MultiTxn { txns })
        }
        OpCode::Error => Txn::Error(ErrorTxn {
            err: cur.read_i32::<LittleEndian>().map_err(short)?,
        }),
        OpCode::CreateSession => Txn::CreateSession(CreateSessionTxn {
            timeout: cur.read_i32::<LittleEndian>().map_err(short)?,
        }),
        OpCode::CloseSession => Txn::CloseSession,
    };
    Ok(txn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        let mut buf = Vec::new();
        let header = TxnHeader::new(-1, 7, 42, 1_700_000_000_000, OpCode::Delete);
        write_header(&mut buf, &header, OpCode::Delete);
        assert_eq!(buf.len(), TXN_HEADER_SIZE);
        assert_eq!(read_header(&mut Cursor::new(&buf[..])).unwrap(), header);
    }

    #[test]
    fn test_multi_body() {
        let txn = Txn::multi(vec![
            Txn::create("/a", b"x".to_vec(), 3),
            Txn::Error(ErrorTxn { err: -101 }),
            Txn::CloseSession,
        ]);
        let mut buf = Vec::new();
        write_txn(&mut buf, &txn);
        let mut cur = Cursor::new(&buf[..]);
        assert_eq!(read_txn(&mut cur, OpCode::Multi).unwrap(), txn);
        assert_eq!(cur.position() as usize, buf.len());
    }

    #[test]
    fn test_nested_multi_rejected() {
        let mut buf = Vec::new();
        write_txn(&mut buf, &Txn::multi(vec![Txn::multi(vec![])]));
        assert!(matches!(
            read_txn(&mut Cursor::new(&buf[..]), OpCode::Multi),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn test_oversized_string_length_rejected() {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(1_000).unwrap();
        buf.extend_from_slice(b"/a");
        assert!(matches!(
            read_txn(&mut Cursor::new(&buf[..]), OpCode::Delete),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, &[0xff, 0xfe]);
        assert!(matches!(
            read_txn(&mut Cursor::new(&buf[..]), OpCode::Delete),
            Err(FrameError::Malformed(_))
        ));
    }
}
