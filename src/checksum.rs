//! Streaming content digests
//!
//! [`ChecksumEngine`] hashes file content with SHA-256 through a fixed-size
//! buffer, so memory use does not depend on file size. A read that fails part
//! way through yields an error and never a digest: callers must not persist
//! anything derived from a partial read.
//!
//! ## Example
//!
//! ```rust
//! use rotcheck::checksum::ChecksumEngine;
//! use rotcheck::types::Digest;
//!
//! let engine = ChecksumEngine::new();
//! let (digest, len) = engine.digest_reader(&b"hello"[..]).unwrap();
//! assert_eq!(digest, Digest::of(b"hello"));
//! assert_eq!(len, 5);
//! ```

use crate::error::{Result, RotcheckError};
use crate::types::Digest;
use sha2::{Digest as _, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::trace;

/// Default read buffer size (8 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// SHA-256 engine with a bounded read buffer
#[derive(Debug, Clone, Copy)]
pub struct ChecksumEngine {
    buffer_size: usize,
}

impl Default for ChecksumEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ChecksumEngine {
    /// Create an engine with the default buffer size
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Set the read buffer size (minimum 1 byte)
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Buffer size used for each read
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Hash everything `reader` yields until EOF
    ///
    /// Returns the digest and the number of bytes consumed. Interrupted reads
    /// are retried; any other read error aborts the digest.
    pub fn digest_reader<R: Read>(&self, mut reader: R) -> io::Result<(Digest, u64)> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.buffer_size];
        let mut total = 0u64;

        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..bytes_read]);
            total += bytes_read as u64;
        }

        Ok((Digest::from_bytes(hasher.finalize().into()), total))
    }

    /// Hash a file's content
    ///
    /// # Errors
    ///
    /// - [`RotcheckError::NotFound`] if the file vanished
    /// - [`RotcheckError::PermissionDenied`] if it cannot be opened
    /// - [`RotcheckError::Io`] if a read fails part way through
    pub fn digest_file(&self, path: &Path) -> Result<(Digest, u64)> {
        let file = File::open(path).map_err(|e| RotcheckError::from_io(path, e))?;
        let (digest, len) = self
            .digest_reader(file)
            .map_err(|e| RotcheckError::from_io(path, e))?;
        trace!("Hashed {:?}: {} bytes -> {}", path, len, digest);
        Ok((digest, len))
    }
}
