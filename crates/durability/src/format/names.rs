//! File naming.
//!
//! Log segments are named `log.<zxid>` after the first zxid they contain and
//! snapshots `snapshot.<zxid>` after their tagged zxid. The zxid is written as
//! 16 lowercase hex digits so lexical order matches numeric order; parsing
//! accepts any hex width.

use keeperlog_core::Zxid;
use std::io;
use std::path::{Path, PathBuf};

/// Prefix of log segment files
pub const LOG_PREFIX: &str = "log";

/// Prefix of snapshot files
pub const SNAPSHOT_PREFIX: &str = "snapshot";

/// Name of the versioned subdirectory holding log and snapshot files
pub const VERSION_DIR: &str = "version-2";

/// `<prefix>.<016x zxid>`
pub fn make_file_name(prefix: &str, zxid: Zxid) -> String {
    format!("{}.{:016x}", prefix, zxid)
}

/// Log segment file name for its first zxid
pub fn log_file_name(first_zxid: Zxid) -> String {
    make_file_name(LOG_PREFIX, first_zxid)
}

/// Snapshot file name for its tagged zxid
pub fn snapshot_file_name(zxid: Zxid) -> String {
    make_file_name(SNAPSHOT_PREFIX, zxid)
}

/// Temporary name used while a snapshot is being written
pub fn snapshot_temp_name(zxid: Zxid) -> String {
    format!(".{}.tmp", snapshot_file_name(zxid))
}

/// Extract the zxid from `<prefix>.<hex>`.
pub fn zxid_from_name(name: &str, prefix: &str) -> Option<Zxid> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('.')?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Zxid::from_str_radix(rest, 16).ok()
}

/// All files in `dir` named `<prefix>.<hex>`, sorted by zxid ascending.
pub fn sorted_files(dir: &Path, prefix: &str) -> io::Result<Vec<(Zxid, PathBuf)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(zxid) = zxid_from_name(&name, prefix) {
            files.push((zxid, entry.path()));
        }
    }
    files.sort_by_key(|(zxid, _)| *zxid);
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(log_file_name(1), "log.0000000000000001");
        assert_eq!(snapshot_file_name(0x1f), "snapshot.000000000000001f");
        assert_eq!(snapshot_temp_name(2), ".snapshot.0000000000000002.tmp");
    }

    #[test]
    fn test_parse() {
        assert_eq!(zxid_from_name("log.0000000000000001", LOG_PREFIX), Some(1));
        assert_eq!(zxid_from_name("log.1f", LOG_PREFIX), Some(0x1f));
        assert_eq!(zxid_from_name("log.", LOG_PREFIX), None);
        assert_eq!(zxid_from_name("log.zz", LOG_PREFIX), None);
        assert_eq!(zxid_from_name("logx.1", LOG_PREFIX), None);
        assert_eq!(zxid_from_name("snapshot.10", LOG_PREFIX), None);
        assert_eq!(zxid_from_name(".snapshot.1.tmp", SNAPSHOT_PREFIX), None);
    }

    #[test]
    fn test_sorted_files_orders_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for zxid in [0x100u64, 0x2, 0x31] {
            std::fs::write(dir.path().join(log_file_name(zxid)), b"").unwrap();
        }
        std::fs::write(dir.path().join("log.junk"), b"").unwrap();
        std::fs::write(dir.path().join(snapshot_file_name(5)), b"").unwrap();

        let zxids: Vec<Zxid> = sorted_files(dir.path(), LOG_PREFIX)
            .unwrap()
            .into_iter()
            .map(|(z, _)| z)
            .collect();
        assert_eq!(zxids, vec![0x2, 0x31, 0x100]);
    }
}
