//! In-process metadata store

use super::MetadataStore;
use crate::error::{Result, RotcheckError};
use crate::types::FileRecord;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// Records kept in a map keyed by path
///
/// Besides backing tests, the store can simulate the failure modes of a real
/// metadata channel: unsupported paths, denied writes, writes that are
/// acknowledged but lost, and a coarse (whole-second) timestamp resolution.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<PathBuf, FileRecord>>,
    faults: Mutex<Faults>,
    second_resolution: bool,
}

#[derive(Debug, Default)]
struct Faults {
    unsupported: HashSet<PathBuf>,
    denied_writes: HashSet<PathBuf>,
    lost_writes: HashSet<PathBuf>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Truncate stored timestamps to whole seconds
    pub fn with_second_resolution(mut self) -> Self {
        self.second_resolution = true;
        self
    }

    /// Make every access to `path` fail with `NotSupported`
    pub fn mark_unsupported(&self, path: impl Into<PathBuf>) {
        self.faults.lock().unsupported.insert(path.into());
    }

    /// Make writes to `path` fail with `PermissionDenied`
    pub fn deny_writes(&self, path: impl Into<PathBuf>) {
        self.faults.lock().denied_writes.insert(path.into());
    }

    /// Acknowledge writes to `path` without storing them
    pub fn lose_writes(&self, path: impl Into<PathBuf>) {
        self.faults.lock().lost_writes.insert(path.into());
    }

    /// Record currently held for `path`
    pub fn get(&self, path: &Path) -> Option<FileRecord> {
        self.records.lock().get(path).copied()
    }

    /// Place a record directly, bypassing fault injection
    pub fn insert(&self, path: impl Into<PathBuf>, record: FileRecord) {
        self.records.lock().insert(path.into(), record);
    }

    /// Drop every record, keeping the injected faults
    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether no record is held
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl MetadataStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(&self, path: &Path) -> Result<Option<FileRecord>> {
        if self.faults.lock().unsupported.contains(path) {
            return Err(RotcheckError::NotSupported {
                path: path.to_path_buf(),
            });
        }
        Ok(self.get(path))
    }

    fn write(&self, path: &Path, record: &FileRecord) -> Result<()> {
        {
            let faults = self.faults.lock();
            if faults.unsupported.contains(path) {
                return Err(RotcheckError::NotSupported {
                    path: path.to_path_buf(),
                });
            }
            if faults.denied_writes.contains(path) {
                return Err(RotcheckError::from_io(
                    path,
                    io::Error::new(io::ErrorKind::PermissionDenied, "write denied"),
                ));
            }
            if faults.lost_writes.contains(path) {
                return Ok(());
            }
        }

        let mut record = *record;
        if self.second_resolution {
            record.timestamp = record.timestamp.truncate_to_secs();
        }
        self.records.lock().insert(path.to_path_buf(), record);
        Ok(())
    }

    fn preserves_subsecond(&self) -> bool {
        !self.second_resolution
    }
}
