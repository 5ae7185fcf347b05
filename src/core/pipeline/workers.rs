//! In-process hashing consumers for the shared queue.

use crate::core::archive::ImageRecord;
use crate::core::hasher::PerceptualHasher;
use crate::core::queue::{Fetched, Queue};
use crate::events::{Event, EventSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// A pool of local worker threads draining the queue through
/// [`PerceptualHasher`]. Workers exit when the queue closes.
pub struct LocalWorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl LocalWorkerPool {
    /// Spawn `workers` consumers against the shared queue.
    pub fn spawn(
        queue: Arc<Queue>,
        workers: usize,
        poll_interval: Duration,
        events: EventSender,
    ) -> Self {
        let mut handles = Vec::new();
        for id in 0..workers.max(1) {
            let queue = Arc::clone(&queue);
            let events = events.clone();
            handles.push(thread::spawn(move || {
                worker_loop(id, &queue, poll_interval, &events);
            }));
        }
        Self { handles }
    }

    /// One worker per available core.
    pub fn default_workers() -> usize {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }

    /// Wait for every worker to observe the closed queue and exit.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(id: usize, queue: &Queue, poll_interval: Duration, events: &EventSender) {
    debug!(worker = id, "worker started");
    let hasher = PerceptualHasher::new();

    loop {
        match queue.get_next() {
            Fetched::Closed => break,
            Fetched::Pending => thread::sleep(poll_interval),
            Fetched::Job(record) => {
                let mut outcome = ImageRecord {
                    inode: record.inode,
                    nth: record.nth,
                    ..ImageRecord::default()
                };
                match hasher.hash_bytes(&record.data) {
                    Ok(fp) => {
                        outcome.parsed = true;
                        outcome.phash = fp.phash;
                        outcome.width = fp.width;
                        outcome.height = fp.height;
                        events.send(Event::PageHashed { nth: record.nth });
                    }
                    Err(err) => {
                        warn!(page = %record.name, %err, "page failed to hash");
                        outcome.error = true;
                        events.send(Event::PageFailed {
                            nth: record.nth,
                            message: err.to_string(),
                        });
                    }
                }
                queue.set(record.nth, &outcome);
            }
        }
    }

    debug!(worker = id, "worker finished");
}
