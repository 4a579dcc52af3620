//! Metadata channel backends
//!
//! A [`MetadataStore`] associates one [`FileRecord`] with a file path,
//! independently of the file's content. The reconciler only ever talks to this
//! trait; it does not know where records live.
//!
//! ## Backends
//!
//! - [`XattrStore`] (unix): one extended attribute, `user.rotcheck.record`
//! - [`AdsStore`] (windows): one NTFS alternate data stream, `<file>:rotcheck.record`
//! - [`MemoryStore`]: an in-process map, for tests and embedding
//!
//! Every backend stores the encoded record as a single value (see
//! [`FileRecord::encode`]), so the timestamp and digest are always replaced
//! together. A reader sees either the previous record or the new one: a
//! `setxattr` replaces the attribute in one call, and the stream backend
//! journals its value first (see [`AdsStore`]).
//!
//! ## Timestamp precision
//!
//! Records compare timestamps exactly. A backend that cannot keep sub-second
//! precision (see [`MetadataStore::preserves_subsecond`]) still works, but two
//! edits within the same second become indistinguishable, which weakens
//! corruption detection inside that window.

use crate::error::{Result, RotcheckError};
use crate::types::{FileRecord, ScanConfig};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

mod memory;
pub use memory::MemoryStore;

#[cfg(unix)]
mod xattr_store;
#[cfg(unix)]
pub use xattr_store::XattrStore;

#[cfg(windows)]
mod ads;
#[cfg(windows)]
pub use ads::AdsStore;

/// Default attribute (or stream) name prefix
pub const DEFAULT_ATTRIBUTE_PREFIX: &str = "user.rotcheck";

/// Per-file record persistence
///
/// Implementations must be safe to call from many worker threads at once.
/// Calls for different paths are independent.
pub trait MetadataStore: Send + Sync + fmt::Debug {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Read the record attached to `path`
    ///
    /// Returns `Ok(None)` when the file carries no record.
    ///
    /// # Errors
    ///
    /// - [`RotcheckError::NotSupported`] if the path's filesystem has no
    ///   metadata channel
    /// - [`RotcheckError::MalformedRecord`] if a value exists but cannot be
    ///   decoded
    fn read(&self, path: &Path) -> Result<Option<FileRecord>>;

    /// Replace the record attached to `path`
    ///
    /// Either the whole record is stored or the previous value stays.
    ///
    /// # Errors
    ///
    /// - [`RotcheckError::PermissionDenied`] if the channel is read-only
    /// - [`RotcheckError::Io`] for other failures
    fn write(&self, path: &Path, record: &FileRecord) -> Result<()>;

    /// Whether stored timestamps keep their nanoseconds
    fn preserves_subsecond(&self) -> bool {
        true
    }
}

/// Build the metadata store native to this platform
pub fn platform_store(config: &ScanConfig) -> Result<Arc<dyn MetadataStore>> {
    #[cfg(unix)]
    {
        Ok(Arc::new(XattrStore::with_prefix(&config.attribute_prefix)))
    }
    #[cfg(windows)]
    {
        Ok(Arc::new(AdsStore::with_prefix(&config.attribute_prefix)))
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = config;
        Err(RotcheckError::config(
            "no metadata channel backend is available on this platform",
        ))
    }
}

/// Decode a raw stored value
pub(crate) fn decode_value(path: &Path, raw: &[u8]) -> Result<FileRecord> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| RotcheckError::malformed(path, format!("not UTF-8: {}", e)))?;
    FileRecord::decode(text).map_err(|reason| RotcheckError::malformed(path, reason))
}

/// Resolve a record kept as a primary value plus a journal copy
///
/// Writers put the new value in the journal before replacing the primary, so
/// the primary wins whenever it decodes. A missing or undecodable primary next
/// to a decodable journal is an interrupted replacement, and the journal holds
/// the complete new value. With no usable journal, an undecodable primary
/// stays [`RotcheckError::MalformedRecord`].
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn resolve_journaled(
    path: &Path,
    primary: Option<&[u8]>,
    journal: Option<&[u8]>,
) -> Result<Option<FileRecord>> {
    let primary = match primary.map(|raw| decode_value(path, raw)) {
        Some(Ok(record)) => return Ok(Some(record)),
        other => other,
    };
    if let Some(Ok(record)) = journal.map(|raw| decode_value(path, raw)) {
        trace!("Recovered record of {:?} from its journal", path);
        return Ok(Some(record));
    }
    match primary {
        Some(Err(e)) => Err(e),
        _ => Ok(None),
    }
}
