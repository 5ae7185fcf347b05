//! # RPC Module
//!
//! The request/response protocol that lets remote workers pull page jobs
//! from the coordinator's queue and push fingerprints back.
//!
//! Three methods ride a persistent TCP connection on port 4122:
//! - `GetZipImage`: claim the next page record
//! - `SetZipImage`: return a fingerprinted record
//! - `GetLine`: diagnostic echo, replies with the line length
//!
//! Frames are a 4-byte big-endian length followed by a bincode payload,
//! symmetric in both directions. The page bytes inside
//! [`ImageRecord::data`] travel unchanged end to end.
//!
//! The in-process queue reports its state as a tagged result; on the wire
//! it collapses back into the record's inode field (`0` = nothing to do
//! yet, `-1` = shut down) so the protocol stays compatible with workers
//! that only understand the sentinel encoding.

pub mod client;
pub mod server;

use crate::core::archive::ImageRecord;
use crate::error::RpcError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Port the coordinator listens on.
pub const RPC_PORT: u16 = 4122;

/// Frames above this are rejected before allocation; no page comes close.
const MAX_FRAME_BYTES: u64 = 64 * 1024 * 1024;

/// Calls a worker can make against the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Claim the next page record.
    GetZipImage,
    /// Return one fingerprinted record.
    SetZipImage(ImageRecord),
    /// Diagnostic echo.
    GetLine(String),
}

/// Replies, one per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Image(ImageRecord),
    Ack,
    Line(u64),
}

/// Write one length-prefixed bincode frame.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), RpcError> {
    let payload = bincode::serialize(message)?;
    let len = payload.len() as u64;
    if len > MAX_FRAME_BYTES {
        return Err(RpcError::OversizedFrame {
            len,
            max: MAX_FRAME_BYTES,
        });
    }
    writer.write_all(&(len as u32).to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed bincode frame.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, RpcError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u64::from(u32::from_be_bytes(len_bytes));
    if len > MAX_FRAME_BYTES {
        return Err(RpcError::OversizedFrame {
            len,
            max: MAX_FRAME_BYTES,
        });
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(bincode::deserialize(&payload)?)
}
