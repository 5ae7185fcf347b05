//! # Error Module
//!
//! Error types for the archive fingerprinting pipeline and matcher.
//!
//! ## Design Principles
//! - **Never panic** on user data - malformed archives, images, and
//!   manifests are recoverable conditions
//! - **Include context** - paths and entry names travel with the error
//! - **Local recovery** - per-page and per-archive failures are logged and
//!   skipped; only configuration and transport failures surface to the CLI

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum KagamiError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised while walking the scan root and reading archives.
///
/// Scoped to one archive: the pipeline logs these and moves on to the
/// next file.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open archive {path}: {reason}")]
    OpenArchive { path: PathBuf, reason: String },

    #[error("Failed to read entry {name} in {path}: {source}")]
    ReadEntry {
        path: PathBuf,
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create store directory {path}: {source}")]
    StoreDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while fingerprinting one page.
///
/// Scoped to one record: the page is flagged `error` and the archive
/// continues.
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Failed to decode image: {reason}")]
    Decode { reason: String },

    #[error("Decoded raster is empty ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

/// Errors raised by the manifest codec.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest line: {line:?}")]
    BadLine { line: String },

    #[error("Manifest filename is not an inode: {path}")]
    BadInode { path: PathBuf },
}

/// Errors raised by the RPC transport.
///
/// On the client these terminate the worker; on the server the call is
/// dropped and queue state is untouched.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Framing error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    OversizedFrame { len: u64, max: u64 },

    #[error("Unexpected reply for {method}")]
    UnexpectedReply { method: &'static str },
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, KagamiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_error_includes_path() {
        let error = ScanError::OpenArchive {
            path: PathBuf::from("/comics/vol1.cbz"),
            reason: "not a zip".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("/comics/vol1.cbz"));
        assert!(message.contains("not a zip"));
    }

    #[test]
    fn hash_error_includes_reason() {
        let error = HashError::Decode {
            reason: "invalid JPEG".to_string(),
        };
        assert!(error.to_string().contains("invalid JPEG"));
    }

    #[test]
    fn manifest_error_carries_offending_line() {
        let error = ManifestError::BadLine {
            line: "ZZZZ not a manifest line".to_string(),
        };
        assert!(error.to_string().contains("not a manifest line"));
    }

    #[test]
    fn top_level_error_wraps_subsystems() {
        let error: KagamiError = ScanError::DirectoryNotFound {
            path: PathBuf::from("/missing"),
        }
        .into();
        assert!(matches!(error, KagamiError::Scan(_)));
    }
}
