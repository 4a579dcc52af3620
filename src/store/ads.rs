//! NTFS alternate data stream store

use super::{resolve_journaled, MetadataStore, DEFAULT_ATTRIBUTE_PREFIX};
use crate::error::{Result, RotcheckError};
use crate::types::FileRecord;
use filetime::FileTime;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// `ERROR_INVALID_NAME`, returned by filesystems without stream support
const ERROR_INVALID_NAME: i32 = 123;

/// Records kept in one alternate data stream per file
///
/// The stream is `<file>:<name>.record` where `<name>` is the configured
/// prefix without its `user.` namespace (default `rotcheck.record`).
///
/// A stream cannot be replaced in one call, so writes are journaled: the
/// value first goes to `<name>.record.journal`, then replaces the primary
/// stream, then the journal is removed. A reader that finds the primary
/// missing, empty or torn falls back to a complete journal, so an interrupted
/// write leaves either the previous record or the new one.
///
/// On NTFS, writing any stream of a file bumps the file's own modification
/// time. [`AdsStore::write`] puts the mtime back to the record's timestamp
/// afterwards; if that fails the record no longer describes the file and the
/// write reports [`RotcheckError::InternalInvariantViolation`].
///
/// The restore also covers an edit made after the reconciler's last stat and
/// before the write: that edit's mtime is replaced by the record's, and the
/// next run reports the file as corrupt.
#[derive(Debug, Clone)]
pub struct AdsStore {
    stream: String,
    journal: String,
}

impl Default for AdsStore {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_ATTRIBUTE_PREFIX)
    }
}

impl AdsStore {
    /// Store using the `rotcheck.record` stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Store using the `<prefix>.record` stream
    pub fn with_prefix(prefix: &str) -> Self {
        let name = prefix.strip_prefix("user.").unwrap_or(prefix);
        Self {
            stream: format!("{}.record", name),
            journal: format!("{}.record.journal", name),
        }
    }

    fn stream_path(path: &Path, stream: &str) -> PathBuf {
        let mut full = OsString::from(path.as_os_str());
        full.push(":");
        full.push(stream);
        PathBuf::from(full)
    }

    fn read_stream(path: &Path, stream: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(Self::stream_path(path, stream)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::map_err(path, e)),
        }
    }

    fn write_stream(path: &Path, stream: &str, value: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(Self::stream_path(path, stream))
            .map_err(|e| Self::map_err(path, e))?;
        file.write_all(value)
            .and_then(|_| file.sync_all())
            .map_err(|e| Self::map_err(path, e))
    }

    fn map_err(path: &Path, err: io::Error) -> RotcheckError {
        if err.raw_os_error() == Some(ERROR_INVALID_NAME) {
            RotcheckError::NotSupported {
                path: path.to_path_buf(),
            }
        } else {
            RotcheckError::from_io(path, err)
        }
    }
}

impl MetadataStore for AdsStore {
    fn name(&self) -> &'static str {
        "ads"
    }

    fn read(&self, path: &Path) -> Result<Option<FileRecord>> {
        // A missing stream and a missing file both surface as NotFound
        fs::metadata(path).map_err(|e| RotcheckError::from_io(path, e))?;
        let primary = Self::read_stream(path, &self.stream)?;
        let journal = Self::read_stream(path, &self.journal)?;
        resolve_journaled(path, primary.as_deref(), journal.as_deref())
    }

    fn write(&self, path: &Path, record: &FileRecord) -> Result<()> {
        let value = record.encode();
        trace!("Writing stream {} on {:?}: {}", self.stream, path, value);

        let written = Self::write_stream(path, &self.journal, value.as_bytes())
            .and_then(|_| Self::write_stream(path, &self.stream, value.as_bytes()));
        if written.is_ok() {
            if let Err(e) = fs::remove_file(Self::stream_path(path, &self.journal)) {
                // The primary decodes, so a stale journal is never consulted
                debug!("Failed to remove journal stream of {:?}: {}", path, e);
            }
        }

        // Restored even after a failed write, which may already have bumped it
        let mtime = FileTime::from_unix_time(record.timestamp.secs(), record.timestamp.nanos());
        if let Err(e) = filetime::set_file_mtime(path, mtime) {
            warn!("Failed to restore mtime of {:?}: {}", path, e);
            written?;
            return Err(RotcheckError::invariant(
                path,
                format!("mtime not restored after stream write: {}", e),
            ));
        }
        written
    }

    fn preserves_subsecond(&self) -> bool {
        // NTFS keeps 100ns ticks, and so does the restored mtime
        true
    }
}
