//! Extended attribute store

use super::{decode_value, MetadataStore, DEFAULT_ATTRIBUTE_PREFIX};
use crate::error::{Result, RotcheckError};
use crate::types::FileRecord;
use std::io;
use std::path::Path;
use tracing::trace;

/// Records kept in one extended attribute per file
///
/// The attribute is `<prefix>.record` (default `user.rotcheck.record`). A
/// single `setxattr` replaces the whole value, so readers see either the old
/// record or the new one. Setting an attribute does not touch the file's
/// mtime.
///
/// Extended attributes follow the file across renames within a filesystem and
/// across copies made with xattr-aware tools (`cp --preserve=xattr`,
/// `rsync -X`).
#[derive(Debug, Clone)]
pub struct XattrStore {
    attribute: String,
}

impl Default for XattrStore {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_ATTRIBUTE_PREFIX)
    }
}

impl XattrStore {
    /// Store using `user.rotcheck.record`
    pub fn new() -> Self {
        Self::default()
    }

    /// Store using `<prefix>.record`
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            attribute: format!("{}.record", prefix),
        }
    }

    /// Attribute name in use
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    fn map_err(path: &Path, err: io::Error) -> RotcheckError {
        if is_unsupported(&err) {
            RotcheckError::NotSupported {
                path: path.to_path_buf(),
            }
        } else {
            RotcheckError::from_io(path, err)
        }
    }
}

fn is_unsupported(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::Unsupported {
        return true;
    }
    match err.raw_os_error() {
        Some(code) => code == libc::ENOTSUP || code == libc::EOPNOTSUPP,
        None => false,
    }
}

impl MetadataStore for XattrStore {
    fn name(&self) -> &'static str {
        "xattr"
    }

    fn read(&self, path: &Path) -> Result<Option<FileRecord>> {
        match xattr::get(path, &self.attribute) {
            Ok(None) => Ok(None),
            Ok(Some(raw)) => decode_value(path, &raw).map(Some),
            Err(e) => Err(Self::map_err(path, e)),
        }
    }

    fn write(&self, path: &Path, record: &FileRecord) -> Result<()> {
        let value = record.encode();
        trace!("Setting {} on {:?} to {}", self.attribute, path, value);
        xattr::set(path, &self.attribute, value.as_bytes()).map_err(|e| Self::map_err(path, e))
    }
}
