//! # Work Queue
//!
//! The single shared work set for the archive currently being
//! fingerprinted. The producer fills it page by page, seals it with the
//! final length, and polls until consumers have drained it; consumers claim
//! records through an atomically advancing cursor.
//!
//! Every field lives behind one mutex. Read-modify-write sequences
//! (claiming a record, merging a result) hold the lock across the whole
//! transaction.

use crate::core::archive::ImageRecord;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Outcome of a [`Queue::get_next`] claim.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// A record to hash. The claim is exclusive.
    Job(ImageRecord),
    /// The producer has not filled the next slot yet; back off and retry.
    Pending,
    /// All archives are done; the worker should exit.
    Closed,
}

#[derive(Default)]
struct QueueState {
    inode: i64,
    name: PathBuf,
    records: HashMap<usize, ImageRecord>,
    done: HashMap<usize, bool>,
    cursor: usize,
    length: usize,
    sealed: bool,
    finished: bool,
}

/// Per-archive bounded work set with cursor, completion map and lifecycle
/// flags. Exactly one exists per pipeline.
#[derive(Default)]
pub struct Queue {
    state: Mutex<QueueState>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new archive. Clears records and completion state.
    ///
    /// The producer only calls this once the previous archive has fully
    /// drained, so no consumer still holds an unfinished record.
    pub fn reset(&self, inode: i64, name: &Path) {
        let mut state = self.state.lock().unwrap();
        state.inode = inode;
        state.name = name.to_path_buf();
        state.records.clear();
        state.done.clear();
        state.cursor = 0;
        state.length = 0;
        state.sealed = false;
    }

    /// Insert one page record at its ordinal.
    pub fn push(&self, record: ImageRecord) {
        let mut state = self.state.lock().unwrap();
        state.done.insert(record.nth, false);
        state.records.insert(record.nth, record);
    }

    /// Fix the archive's total record count; consumers may drain past the
    /// producer from this point on.
    pub fn seal(&self, length: usize) {
        let mut state = self.state.lock().unwrap();
        state.length = length;
        state.sealed = true;
    }

    /// Claim the next record.
    ///
    /// The cursor only advances when a record is actually handed out, so
    /// every ordinal is claimed by exactly one consumer; [`Fetched::Pending`]
    /// is a pure back-off signal.
    pub fn get_next(&self) -> Fetched {
        let mut state = self.state.lock().unwrap();
        if state.finished {
            return Fetched::Closed;
        }
        match state.records.get(&state.cursor).cloned() {
            Some(record) => {
                state.cursor += 1;
                Fetched::Job(record)
            }
            None => Fetched::Pending,
        }
    }

    /// Snapshot one record.
    pub fn get(&self, nth: usize) -> Option<ImageRecord> {
        let state = self.state.lock().unwrap();
        state.records.get(&nth).cloned()
    }

    /// Merge a worker's outcome into the nth record and mark it done.
    ///
    /// A result for an ordinal the queue no longer tracks (the archive was
    /// abandoned and the queue reset) is logged and dropped.
    pub fn set(&self, nth: usize, outcome: &ImageRecord) {
        let mut state = self.state.lock().unwrap();
        match state.records.get_mut(&nth) {
            Some(record) => {
                record.apply_outcome(outcome);
                state.done.insert(nth, true);
            }
            None => {
                warn!(nth, "dropping result for unknown record");
            }
        }
    }

    /// Number of records marked done.
    pub fn done_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.done.values().filter(|done| **done).count()
    }

    /// True once the archive is sealed and every record is done.
    pub fn drained(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.sealed && state.done.values().filter(|done| **done).count() >= state.length
    }

    /// Ordered snapshot of the current archive's records.
    pub fn snapshot(&self) -> Vec<ImageRecord> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<ImageRecord> = state.records.values().cloned().collect();
        records.sort_by_key(|record| record.nth);
        records
    }

    /// Identity of the archive being processed, as `(inode, path)`.
    pub fn current_archive(&self) -> (i64, PathBuf) {
        let state = self.state.lock().unwrap();
        (state.inode, state.name.clone())
    }

    /// No further archives: every subsequent claim returns
    /// [`Fetched::Closed`].
    pub fn mark_finished(&self) {
        let mut state = self.state.lock().unwrap();
        state.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().unwrap().finished
    }
}
