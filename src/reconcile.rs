//! Reconciliation of stored records against actual file state
//!
//! This is the decision core of rotcheck. For one file it compares the record
//! held by a [`MetadataStore`] with the file's current modification time and
//! content digest, classifies the file, and persists the record that should
//! describe it from now on.
//!
//! ## Decision table
//!
//! | Stored record | Timestamps | Digests | Classification | Write |
//! |---|---|---|---|---|
//! | none | - | - | `Untagged` | yes |
//! | present | equal | equal | `Unchanged` | no |
//! | present | equal | differ | `Corrupt` | only with [`CorruptionPolicy::Retag`] |
//! | present | differ | - | `Updated` | yes |
//!
//! Timestamps are compared exactly. Any difference, however small, means the
//! file was modified through a path that updates its mtime, and no corruption
//! can be inferred.
//!
//! ## Consistency
//!
//! - The digest comes from one complete sequential read. A failed read skips
//!   the file without writing.
//! - The mtime is sampled before and after hashing. If it moved, the content
//!   may have changed mid-read and the file is skipped with
//!   [`RotcheckError::ConcurrentModification`].
//! - Every write is read back. A store that acknowledges a write but does not
//!   return the same record yields [`RotcheckError::InternalInvariantViolation`].

use crate::checksum::ChecksumEngine;
use crate::error::{Result, RotcheckError};
use crate::store::MetadataStore;
use crate::types::{Classification, CorruptionPolicy, FileOutcome, FileRecord, Timestamp};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// What to verify, given the stored record and the current timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// No record yet: hash and tag
    Tag,
    /// Timestamp unchanged: hash and compare with the stored digest
    Verify {
        /// Record found on the file
        stored: FileRecord,
    },
    /// Timestamp moved: hash and retag
    Refresh {
        /// Record found on the file
        stored: FileRecord,
    },
}

impl Plan {
    /// Choose a plan from the stored record and the file's current mtime
    pub fn new(stored: Option<FileRecord>, actual_timestamp: Timestamp) -> Self {
        match stored {
            None => Plan::Tag,
            Some(stored) if stored.timestamp == actual_timestamp => Plan::Verify { stored },
            Some(stored) => Plan::Refresh { stored },
        }
    }

    /// Record found before the check
    pub fn stored(&self) -> Option<FileRecord> {
        match self {
            Plan::Tag => None,
            Plan::Verify { stored } | Plan::Refresh { stored } => Some(*stored),
        }
    }
}

/// Classification plus whether the actual state must be persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// How the file is classified
    pub classification: Classification,
    /// Whether the actual record replaces the stored one
    pub write: bool,
}

/// Settle a plan once the actual digest is known
pub fn decide(plan: &Plan, actual: &FileRecord, policy: CorruptionPolicy) -> Decision {
    match plan {
        Plan::Tag => Decision {
            classification: Classification::Untagged,
            write: true,
        },
        Plan::Verify { stored } if stored.digest == actual.digest => Decision {
            classification: Classification::Unchanged,
            write: false,
        },
        Plan::Verify { .. } => Decision {
            classification: Classification::Corrupt,
            write: policy == CorruptionPolicy::Retag,
        },
        Plan::Refresh { .. } => Decision {
            classification: Classification::Updated,
            write: true,
        },
    }
}

/// Outcome of one reconciliation together with the hashing cost
#[derive(Debug)]
pub struct Reconciled {
    /// What was observed and decided
    pub outcome: FileOutcome,
    /// Bytes read to compute the digest
    pub bytes_hashed: u64,
}

/// Per-file reconciliation engine
///
/// A `Reconciler` holds no per-file state and can be shared by any number of
/// worker threads.
#[derive(Debug, Clone)]
pub struct Reconciler {
    store: Arc<dyn MetadataStore>,
    engine: ChecksumEngine,
    policy: CorruptionPolicy,
    dry_run: bool,
}

impl Reconciler {
    /// Create a reconciler over `store` with default settings
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            engine: ChecksumEngine::new(),
            policy: CorruptionPolicy::default(),
            dry_run: false,
        }
    }

    /// Use a specific checksum engine
    pub fn with_engine(mut self, engine: ChecksumEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Set the corruption policy
    pub fn with_policy(mut self, policy: CorruptionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Classify without writing
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Store in use
    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Check one file
    ///
    /// A write failure does not turn into an `Err`: the classification is
    /// already known, so it is returned with
    /// [`FileOutcome::write_error`] set.
    ///
    /// # Errors
    ///
    /// - [`RotcheckError::NotFound`] / [`RotcheckError::Io`] if the file
    ///   cannot be stat'ed or fully read
    /// - [`RotcheckError::NotSupported`] if its storage has no metadata channel
    /// - [`RotcheckError::MalformedRecord`] if the stored record is unreadable
    /// - [`RotcheckError::ConcurrentModification`] if it changed while hashed
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub fn reconcile(&self, path: &Path) -> Result<Reconciled> {
        let before = self.stat_timestamp(path)?;
        let actual_timestamp = if self.store.preserves_subsecond() {
            before
        } else {
            before.truncate_to_secs()
        };

        let stored = self.store.read(path)?;
        let plan = Plan::new(stored, actual_timestamp);
        debug!("Plan for {:?}: {:?}", path, plan);

        let (digest, bytes_hashed) = self.engine.digest_file(path)?;

        let after = self.stat_timestamp(path)?;
        if after != before {
            warn!("{:?} changed while being hashed ({} -> {})", path, before, after);
            return Err(RotcheckError::ConcurrentModification {
                path: path.to_path_buf(),
            });
        }

        let actual = FileRecord::new(actual_timestamp, digest);
        let decision = decide(&plan, &actual, self.policy);

        let mut written = false;
        let mut write_error = None;
        if decision.write && !self.dry_run {
            match self.persist(path, &actual) {
                Ok(()) => written = true,
                Err(e) => {
                    warn!("Failed to write record for {:?}: {}", path, e);
                    write_error = Some(e);
                }
            }
        }

        match decision.classification {
            Classification::Corrupt => warn!(
                "Corrupt file {:?}: stored {} actual {}, mtime {}",
                path,
                plan.stored().map(|s| s.digest.to_hex()).unwrap_or_default(),
                actual.digest,
                actual
                    .timestamp
                    .to_datetime()
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_else(|| actual.timestamp.to_string())
            ),
            other => debug!("{:?} is {}", path, other),
        }

        Ok(Reconciled {
            outcome: FileOutcome {
                path: path.to_path_buf(),
                classification: decision.classification,
                stored: plan.stored(),
                actual,
                written,
                write_error,
            },
            bytes_hashed,
        })
    }

    fn stat_timestamp(&self, path: &Path) -> Result<Timestamp> {
        let metadata = fs::metadata(path).map_err(|e| RotcheckError::from_io(path, e))?;
        if !metadata.is_file() {
            return Err(RotcheckError::from_io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        let modified = metadata
            .modified()
            .map_err(|e| RotcheckError::from_io(path, e))?;
        Ok(Timestamp::from_system_time(modified))
    }

    fn persist(&self, path: &Path, record: &FileRecord) -> Result<()> {
        self.store.write(path, record)?;
        match self.store.read(path)? {
            Some(found) if found == *record => Ok(()),
            Some(found) => Err(RotcheckError::invariant(
                path,
                format!("wrote {} but read back {}", record.encode(), found.encode()),
            )),
            None => Err(RotcheckError::invariant(
                path,
                "write acknowledged but no record present",
            )),
        }
    }
}
