//! Remote worker side of the RPC: one hashing thread per local core, each
//! with its own connection to the coordinator.

use super::{read_frame, write_frame, Request, Response, RPC_PORT};
use crate::core::archive::ImageRecord;
use crate::core::hasher::PerceptualHasher;
use crate::core::pipeline::LocalWorkerPool;
use crate::error::{KagamiError, Result, RpcError};
use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connect to the coordinator and hash pages until it shuts down.
///
/// Spawns one worker per local core. Each worker exits cleanly on the
/// shutdown sentinel; a transport error terminates only that worker. The
/// call returns when every worker has exited.
pub fn connect(host_ip: &str, poll_interval: Duration) -> Result<()> {
    if host_ip.is_empty() {
        return Err(KagamiError::Config(
            "client mode needs a coordinator address".into(),
        ));
    }
    let addr = format!("{host_ip}:{RPC_PORT}");
    let workers = LocalWorkerPool::default_workers();
    info!(%addr, workers, "connecting to coordinator");

    let mut handles = Vec::new();
    for id in 0..workers {
        let addr = addr.clone();
        handles.push(thread::spawn(move || {
            match worker_loop(id, &addr, poll_interval) {
                Ok(pages) => debug!(worker = id, pages, "worker finished"),
                Err(err) => warn!(worker = id, %err, "worker terminated"),
            }
        }));
    }
    for handle in handles {
        let _ = handle.join();
    }

    info!("all workers finished");
    Ok(())
}

/// Pull, hash, push. Returns the number of pages processed.
fn worker_loop(
    id: usize,
    addr: &str,
    poll_interval: Duration,
) -> std::result::Result<usize, RpcError> {
    let stream = TcpStream::connect(addr).map_err(|source| RpcError::Connect {
        addr: addr.to_string(),
        source,
    })?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);

    let hasher = PerceptualHasher::new();
    let mut pages = 0;

    loop {
        write_frame(&mut writer, &Request::GetZipImage)?;
        let record = match read_frame::<_, Response>(&mut reader)? {
            Response::Image(record) => record,
            _ => {
                return Err(RpcError::UnexpectedReply {
                    method: "GetZipImage",
                })
            }
        };

        if record.is_shutdown() {
            debug!(worker = id, "shutdown sentinel received");
            return Ok(pages);
        }
        if record.is_no_data() {
            thread::sleep(poll_interval);
            continue;
        }

        let mut outcome = ImageRecord {
            inode: record.inode,
            nth: record.nth,
            name: record.name.clone(),
            crc32: record.crc32,
            data_size: record.data_size,
            ..ImageRecord::default()
        };
        match hasher.hash_bytes(&record.data) {
            Ok(fp) => {
                outcome.parsed = true;
                outcome.phash = fp.phash;
                outcome.width = fp.width;
                outcome.height = fp.height;
            }
            Err(err) => {
                warn!(worker = id, page = %record.name, %err, "page failed to hash");
                outcome.error = true;
            }
        }

        write_frame(&mut writer, &Request::SetZipImage(outcome))?;
        match read_frame::<_, Response>(&mut reader)? {
            Response::Ack => pages += 1,
            _ => {
                return Err(RpcError::UnexpectedReply {
                    method: "SetZipImage",
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_address_is_a_config_error() {
        assert!(matches!(
            connect("", Duration::from_millis(1)),
            Err(KagamiError::Config(_))
        ));
    }
}
