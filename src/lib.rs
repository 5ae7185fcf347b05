//! # Kagami
//!
//! Detects near-duplicate comic archives. Every page of every `.cbz` is
//! reduced to a 64-bit perceptual fingerprint; archives are then compared
//! at the archive level over the stored fingerprint manifests.
//!
//! ## Architecture
//! - `core` - hasher, manifest codec, work queue, pipeline and matcher
//! - `rpc` - coordinator/worker protocol for distributed hashing
//! - `events` - progress reporting channel for front ends
//! - `error` - subsystem error types
//!
//! Fingerprinting runs either fully in-process (a local worker pool) or
//! distributed (remote workers pull page jobs over TCP). Duplicate
//! checking reads the manifests back and prints archive groups.

pub mod core;
pub mod error;
pub mod events;
pub mod rpc;

// Re-export commonly used types at the crate root
pub use error::{KagamiError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default tracing subscriber");
}
