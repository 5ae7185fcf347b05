//! Coordinator side of the RPC: the pipeline driver runs in the
//! background while a TCP listener multiplexes worker calls against the
//! one shared queue.

use super::{read_frame, write_frame, Request, Response, RPC_PORT};
use crate::core::archive::ImageRecord;
use crate::core::pipeline::{PipelineConfig, PipelineDriver};
use crate::core::queue::{Fetched, Queue};
use crate::error::{Result, RpcError};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Run the coordinator: scan `config.scan_root`, serving page jobs to
/// remote workers connecting on `host_ip`.
///
/// Returns once every archive has been committed. A short linger lets
/// polling workers observe the shutdown sentinel before the listener goes
/// away.
pub fn serve(host_ip: &str, config: PipelineConfig) -> Result<()> {
    let bind_ip = if host_ip.is_empty() { "0.0.0.0" } else { host_ip };
    let addr = format!("{bind_ip}:{RPC_PORT}");

    let listener = TcpListener::bind(&addr).map_err(|source| RpcError::Bind {
        addr: addr.clone(),
        source,
    })?;
    info!(%addr, "rpc listener up");

    let queue = Arc::new(Queue::new());
    {
        let queue = Arc::clone(&queue);
        thread::spawn(move || accept_loop(listener, queue));
    }

    let linger = config.poll_interval * 2;
    let driver = PipelineDriver::new(config, Arc::clone(&queue));
    let stats = driver.run()?;

    info!(
        archives = stats.archives,
        skipped = stats.skipped,
        "all archives processed, shutting down"
    );
    thread::sleep(linger);
    Ok(())
}

fn accept_loop(listener: TcpListener, queue: Arc<Queue>) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let peer = stream
                        .peer_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|_| "unknown".into());
                    debug!(%peer, "worker connected");
                    match serve_connection(stream, &queue) {
                        Ok(()) => debug!(%peer, "worker disconnected"),
                        // The call is dropped; queue state is untouched.
                        Err(err) => warn!(%peer, %err, "connection error"),
                    }
                });
            }
            Err(err) => warn!(%err, "accept failed"),
        }
    }
}

/// Serve one worker connection until it hangs up.
fn serve_connection(stream: TcpStream, queue: &Queue) -> std::result::Result<(), RpcError> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);

    loop {
        let request: Request = match read_frame(&mut reader) {
            Ok(request) => request,
            Err(RpcError::Io(err)) if err.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        };
        let response = dispatch(queue, request);
        write_frame(&mut writer, &response)?;
    }
}

/// Map one request onto the queue, folding the tagged claim result back
/// into the wire's inode sentinels.
fn dispatch(queue: &Queue, request: Request) -> Response {
    match request {
        Request::GetZipImage => Response::Image(match queue.get_next() {
            Fetched::Job(record) => record,
            Fetched::Pending => ImageRecord::no_data(),
            Fetched::Closed => ImageRecord::shutdown(),
        }),
        Request::SetZipImage(record) => {
            queue.set(record.nth, &record);
            Response::Ack
        }
        Request::GetLine(line) => Response::Line(line.len() as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn get_maps_queue_states_to_sentinels() {
        let queue = Queue::new();
        queue.reset(11, Path::new("/a.cbz"));

        // Nothing produced yet: the no-data sentinel.
        match dispatch(&queue, Request::GetZipImage) {
            Response::Image(record) => assert!(record.is_no_data()),
            other => panic!("wrong response: {other:?}"),
        }

        queue.push(ImageRecord {
            inode: 11,
            nth: 0,
            name: "p00.png".into(),
            data: vec![9, 9],
            ..ImageRecord::default()
        });
        match dispatch(&queue, Request::GetZipImage) {
            Response::Image(record) => {
                assert_eq!(record.inode, 11);
                assert_eq!(record.data, vec![9, 9]);
            }
            other => panic!("wrong response: {other:?}"),
        }

        queue.mark_finished();
        match dispatch(&queue, Request::GetZipImage) {
            Response::Image(record) => assert!(record.is_shutdown()),
            other => panic!("wrong response: {other:?}"),
        }
    }

    #[test]
    fn set_acks_and_marks_done() {
        let queue = Queue::new();
        queue.reset(11, Path::new("/a.cbz"));
        queue.push(ImageRecord {
            inode: 11,
            nth: 0,
            name: "p00.png".into(),
            data: vec![1],
            ..ImageRecord::default()
        });
        queue.seal(1);

        let outcome = ImageRecord {
            inode: 11,
            nth: 0,
            parsed: true,
            phash: 0xFEED,
            width: 100,
            height: 200,
            ..ImageRecord::default()
        };
        assert!(matches!(
            dispatch(&queue, Request::SetZipImage(outcome)),
            Response::Ack
        ));

        assert!(queue.drained());
        let record = queue.get(0).unwrap();
        assert!(record.parsed);
        assert_eq!(record.phash, 0xFEED);
    }

    #[test]
    fn get_line_echoes_length() {
        let queue = Queue::new();
        match dispatch(&queue, Request::GetLine("ping".into())) {
            Response::Line(len) => assert_eq!(len, 4),
            other => panic!("wrong response: {other:?}"),
        }
    }
}
