//! # Events Module
//!
//! Progress reporting from the pipeline to whatever front end is watching.
//!
//! The pipeline and worker pool emit [`Event`]s through a cloneable
//! [`EventSender`]; the CLI consumes them on a background thread to drive a
//! progress bar. Sending is never an error - if nobody is listening the
//! event is discarded.

mod channel;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};

use std::path::PathBuf;

/// Progress events emitted while fingerprinting archives.
#[derive(Debug, Clone)]
pub enum Event {
    /// A candidate archive was found by the walker.
    ArchiveFound { path: PathBuf },
    /// The archive has a fresh manifest and was skipped.
    ArchiveSkipped { path: PathBuf },
    /// The archive was opened and its pages queued.
    ArchiveStarted { path: PathBuf, pages: usize },
    /// One page finished hashing.
    PageHashed { nth: usize },
    /// One page failed to decode; it stays in the manifest flagged as error.
    PageFailed { nth: usize, message: String },
    /// The archive manifest was committed to the store.
    ManifestWritten { path: PathBuf, pages: usize },
    /// The walk is complete and the queue is closed.
    Finished { archives: usize, skipped: usize },
}
