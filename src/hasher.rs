//! Streaming file hasher
//!
//! One [`FileHasher`] is owned by exactly one walker worker. It keeps a
//! reusable read buffer and a cached digest context alive across files, so
//! hashing a file allocates nothing on the happy path.

use crate::algorithm::{Algorithm, DigestContext};
use crate::error::{Result, TreesumError};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Read chunk size for streaming file contents into the digest
const BUFFER_SIZE: usize = 64 * 1024;

/// Hashes one file at a time through a reusable buffer.
///
/// Not safe for concurrent reuse of the same instance; the walker constructs
/// one per worker.
pub struct FileHasher {
    algorithm: Algorithm,
    context: DigestContext,
    buffer: Vec<u8>,
    /// Shared throughput counter, never consulted for correctness
    bytes_hashed: Arc<AtomicU64>,
}

impl FileHasher {
    /// Create a hasher for `algorithm`, reporting into `bytes_hashed`
    pub fn new(algorithm: Algorithm, bytes_hashed: Arc<AtomicU64>) -> Self {
        Self {
            algorithm,
            context: algorithm.new_context(0),
            buffer: vec![0u8; BUFFER_SIZE],
            bytes_hashed,
        }
    }

    /// Stream `path` through the digest and return the final digest bytes.
    ///
    /// The file length is read up front to seed the Git envelope. Any I/O
    /// error aborts the current file and is surfaced to the caller.
    pub fn hash_file(&mut self, path: &Path) -> Result<Vec<u8>> {
        let mut file = File::open(path).map_err(|source| TreesumError::WalkIo {
            path: path.to_path_buf(),
            source,
        })?;
        let size = file
            .metadata()
            .map_err(|source| TreesumError::WalkIo {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        self.algorithm.reseed_context(&mut self.context, size);

        loop {
            let read = file
                .read(&mut self.buffer)
                .map_err(|source| TreesumError::WalkIo {
                    path: path.to_path_buf(),
                    source,
                })?;
            if read == 0 {
                break;
            }
            self.context.update(&self.buffer[..read]);
            self.bytes_hashed.fetch_add(read as u64, Ordering::Relaxed);
        }

        let digest = self.context.finalize_reset().into_vec();
        trace!("Hashed file {:?}: {}", path, hex::encode(&digest));
        Ok(digest)
    }
}
