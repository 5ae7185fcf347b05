//! Data model shared by the pipeline, the RPC layer and the matcher.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

/// Wire sentinel: no further work, workers should shut down.
pub const SHUTDOWN_INODE: i64 = -1;

/// Wire sentinel: no record available right now, retry after a back-off.
pub const NO_DATA_INODE: i64 = 0;

/// One page inside one archive.
///
/// `data` carries the uncompressed page bytes only while the record is in
/// flight; it is dropped once `parsed` or `error` is set. `phash` is only
/// meaningful when `parsed` is true.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Identifier of the parent archive. Negative and zero values are
    /// reserved for the wire sentinels.
    pub inode: i64,
    /// 0-based ordinal within the archive, assigned by insertion order.
    pub nth: usize,
    /// Path-in-archive.
    pub name: String,
    /// CRC32 of the uncompressed page bytes, as reported by the container.
    pub crc32: u32,
    /// Uncompressed size in bytes.
    pub data_size: u64,
    /// Raw page bytes; present only while the record is in flight.
    pub data: Vec<u8>,
    /// Terminal flag: the page was decoded and fingerprinted.
    pub parsed: bool,
    /// Terminal flag: the page could not be decoded. Mutually exclusive
    /// with `parsed`.
    pub error: bool,
    /// 64-bit perceptual fingerprint.
    pub phash: u64,
    /// Decoded raster width in pixels (full resolution).
    pub width: u32,
    /// Decoded raster height in pixels (full resolution).
    pub height: u32,
}

impl ImageRecord {
    /// The "shut down" wire record.
    pub fn shutdown() -> Self {
        Self {
            inode: SHUTDOWN_INODE,
            ..Self::default()
        }
    }

    /// The "no data yet, retry later" wire record.
    pub fn no_data() -> Self {
        Self {
            inode: NO_DATA_INODE,
            ..Self::default()
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inode == SHUTDOWN_INODE
    }

    pub fn is_no_data(&self) -> bool {
        self.inode == NO_DATA_INODE
    }

    /// Merge a worker's outcome into this record and drop the in-flight
    /// bytes. An error outcome leaves phash and dimensions untouched.
    pub fn apply_outcome(&mut self, outcome: &ImageRecord) {
        if outcome.error {
            self.error = true;
        } else {
            self.parsed = true;
            self.phash = outcome.phash;
            self.width = outcome.width;
            self.height = outcome.height;
        }
        self.data = Vec::new();
    }
}

/// One container file on disk, with its pages in manifest order.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    /// Absolute path of the container.
    pub name: PathBuf,
    /// Filesystem modification time, known only at scan time.
    pub mtime: Option<SystemTime>,
    /// Stable 64-bit file identifier; the manifest filename is derived
    /// from it.
    pub inode: i64,
    pub images: Vec<ImageRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_distinct() {
        assert!(ImageRecord::shutdown().is_shutdown());
        assert!(ImageRecord::no_data().is_no_data());
        assert!(!ImageRecord::shutdown().is_no_data());
    }

    #[test]
    fn apply_outcome_success_drops_data() {
        let mut record = ImageRecord {
            inode: 7,
            nth: 0,
            name: "p01.jpg".into(),
            data: vec![1, 2, 3],
            ..ImageRecord::default()
        };

        let outcome = ImageRecord {
            parsed: true,
            phash: 0xDEAD_BEEF,
            width: 800,
            height: 1200,
            ..ImageRecord::default()
        };

        record.apply_outcome(&outcome);

        assert!(record.parsed);
        assert!(!record.error);
        assert_eq!(record.phash, 0xDEAD_BEEF);
        assert_eq!(record.width, 800);
        assert!(record.data.is_empty());
    }

    #[test]
    fn apply_outcome_error_leaves_hash_fields_zeroed() {
        let mut record = ImageRecord {
            data: vec![1, 2, 3],
            ..ImageRecord::default()
        };

        let outcome = ImageRecord {
            error: true,
            ..ImageRecord::default()
        };

        record.apply_outcome(&outcome);

        assert!(record.error);
        assert!(!record.parsed);
        assert_eq!(record.phash, 0);
        assert_eq!(record.width, 0);
        assert!(record.data.is_empty());
    }
}
