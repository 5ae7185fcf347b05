//! # Pipeline Driver
//!
//! Walks the scan root, opens each comic archive, streams its pages through
//! the shared [`Queue`] and commits one manifest per archive.
//!
//! Archives are processed strictly one at a time; concurrency lives inside
//! an archive, between the hashing consumers. The driver inlines every page
//! of the current archive into the queue, seals it, then polls until the
//! consumers have drained it before writing the manifest and moving on.

mod workers;

pub use workers::LocalWorkerPool;

use crate::core::archive::{Archive, ImageRecord};
use crate::core::manifest;
use crate::core::queue::Queue;
use crate::error::{KagamiError, ScanError};
use crate::events::{null_sender, Event, EventSender};
use std::fs::{self, File};
use std::io::Read;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

/// Interval for the producer's drain poll and the consumers' back-off.
pub const POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory to walk for `.cbz` archives.
    pub scan_root: PathBuf,
    /// Directory receiving `<inode>.txt` manifests.
    pub store_dir: PathBuf,
    /// Drain/back-off poll interval.
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scan_root: PathBuf::from("."),
            store_dir: PathBuf::from("store"),
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// Tally of one pipeline run.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineStats {
    /// Archives fingerprinted and committed this run.
    pub archives: usize,
    /// Archives skipped because their manifest was fresh.
    pub skipped: usize,
    /// Pages queued across all committed archives.
    pub pages: usize,
}

/// The producer side of the fingerprinting pipeline.
pub struct PipelineDriver {
    config: PipelineConfig,
    queue: Arc<Queue>,
    events: EventSender,
}

impl PipelineDriver {
    pub fn new(config: PipelineConfig, queue: Arc<Queue>) -> Self {
        Self {
            config,
            queue,
            events: null_sender(),
        }
    }

    /// Attach a progress event sender.
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Walk the scan root and fingerprint every stale archive.
    ///
    /// Consumers must already be attached to the queue (a
    /// [`LocalWorkerPool`] or the RPC listener); the driver blocks while
    /// each archive drains. On return the queue is closed.
    pub fn run(&self) -> Result<PipelineStats, KagamiError> {
        let root =
            fs::canonicalize(&self.config.scan_root).map_err(|_| ScanError::DirectoryNotFound {
                path: self.config.scan_root.clone(),
            })?;

        fs::create_dir_all(&self.config.store_dir).map_err(|source| ScanError::StoreDir {
            path: self.config.store_dir.clone(),
            source,
        })?;

        info!(root = %root.display(), "scanning for archives");

        let mut stats = PipelineStats::default();

        for entry in WalkDir::new(&root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(%err, "walk error");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if file_name.starts_with('.') || !is_archive_name(&file_name) {
                continue;
            }

            let path = entry.path();
            self.events.send(Event::ArchiveFound {
                path: path.to_path_buf(),
            });

            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(err) => {
                    warn!(path = %path.display(), %err, "cannot stat archive, skipping");
                    continue;
                }
            };
            let inode = meta.ino() as i64;

            let manifest_path = manifest::store_path(&self.config.store_dir, inode);
            if manifest::is_fresh(&manifest_path, SystemTime::now()) {
                debug!(path = %path.display(), "fresh manifest, skipping");
                stats.skipped += 1;
                self.events.send(Event::ArchiveSkipped {
                    path: path.to_path_buf(),
                });
                continue;
            }

            match self.process_archive(path, inode, meta.modified().ok()) {
                Ok(pages) => {
                    stats.archives += 1;
                    stats.pages += pages;
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "archive failed, skipping");
                }
            }
        }

        self.queue.mark_finished();
        self.events.send(Event::Finished {
            archives: stats.archives,
            skipped: stats.skipped,
        });
        info!(
            archives = stats.archives,
            skipped = stats.skipped,
            pages = stats.pages,
            "scan complete"
        );

        Ok(stats)
    }

    /// Queue every page of one archive, wait for the drain, commit the
    /// manifest.
    fn process_archive(
        &self,
        path: &Path,
        inode: i64,
        mtime: Option<SystemTime>,
    ) -> Result<usize, KagamiError> {
        let file = File::open(path).map_err(|e| ScanError::OpenArchive {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut container = ZipArchive::new(file).map_err(|e| ScanError::OpenArchive {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        self.queue.reset(inode, path);

        let mut count = 0;
        for index in 0..container.len() {
            let mut entry = match container.by_index(index) {
                Ok(entry) => entry,
                Err(e) => {
                    return Err(ScanError::OpenArchive {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    }
                    .into())
                }
            };
            if !is_page_name(entry.name()) {
                continue;
            }

            let mut data = Vec::with_capacity(entry.size() as usize);
            let name = entry.name().to_string();
            entry
                .read_to_end(&mut data)
                .map_err(|source| ScanError::ReadEntry {
                    path: path.to_path_buf(),
                    name: name.clone(),
                    source,
                })?;

            self.queue.push(ImageRecord {
                inode,
                nth: count,
                crc32: entry.crc32(),
                data_size: entry.size(),
                name,
                data,
                ..ImageRecord::default()
            });
            count += 1;
        }
        self.queue.seal(count);

        self.events.send(Event::ArchiveStarted {
            path: path.to_path_buf(),
            pages: count,
        });
        debug!(path = %path.display(), pages = count, "archive queued");

        self.wait_for_drain();

        let archive = Archive {
            name: path.to_path_buf(),
            mtime,
            inode,
            images: self.queue.snapshot(),
        };
        for image in &archive.images {
            debug!(line = %manifest::format_line(image), "page");
        }
        let manifest_path = manifest::write(&self.config.store_dir, &archive)?;
        self.events.send(Event::ManifestWritten {
            path: manifest_path,
            pages: count,
        });

        Ok(count)
    }

    /// Poll until every queued page has a terminal outcome.
    fn wait_for_drain(&self) {
        while !self.queue.drained() {
            thread::sleep(self.config.poll_interval);
        }
    }
}

/// `.cbz`, case-insensitive.
fn is_archive_name(name: &str) -> bool {
    has_suffix_ignore_case(name, ".cbz")
}

/// `.jpg`, `.jpeg` or `.png`, case-insensitive.
fn is_page_name(name: &str) -> bool {
    has_suffix_ignore_case(name, ".jpg")
        || has_suffix_ignore_case(name, ".jpeg")
        || has_suffix_ignore_case(name, ".png")
}

fn has_suffix_ignore_case(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len()
        && name
            .get(name.len() - suffix.len()..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_filter_is_case_insensitive() {
        assert!(is_archive_name("vol1.cbz"));
        assert!(is_archive_name("VOL1.CBZ"));
        assert!(!is_archive_name("vol1.zip"));
        assert!(!is_archive_name("cbz"));
    }

    #[test]
    fn page_filter_accepts_jpeg_and_png() {
        assert!(is_page_name("p01.jpg"));
        assert!(is_page_name("p01.JPEG"));
        assert!(is_page_name("cover.png"));
        assert!(!is_page_name("notes.txt"));
        assert!(!is_page_name("p01.gif"));
    }
}
