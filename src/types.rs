//! Core data types used throughout rotcheck
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Persisted state**: [`FileRecord`], made of a [`Timestamp`] and a [`Digest`]
//! - **Results**: [`Classification`], [`FileOutcome`] and [`ScanSummary`]
//! - **Configuration**: [`ScanConfig`] and [`CorruptionPolicy`]
//!
//! ## Examples
//!
//! ```rust
//! use rotcheck::types::{Digest, FileRecord, Timestamp};
//!
//! let record = FileRecord::new(
//!     Timestamp::new(1_909_669_684, 252_460_189).unwrap(),
//!     Digest::of(b""),
//! );
//! let encoded = record.encode();
//! assert_eq!(
//!     encoded,
//!     "1909669684.252460189 e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
//! );
//! assert_eq!(FileRecord::decode(&encoded).unwrap(), record);
//! ```

use crate::error::{ErrorKind, Result, RotcheckError};
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Modification time with nanosecond resolution
///
/// Stored as whole seconds since the Unix epoch (floored, so it may be
/// negative) plus a nanosecond offset in `0..1_000_000_000`. Equality is exact
/// on both fields; there is no fuzzy matching.
///
/// The textual form is `"<secs>.<nanos>"` with nanos zero-padded to nine
/// digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp {
    secs: i64,
    nanos: u32,
}

impl Timestamp {
    /// Create a timestamp, rejecting out-of-range nanoseconds
    pub fn new(secs: i64, nanos: u32) -> Option<Self> {
        (nanos < NANOS_PER_SEC).then_some(Self { secs, nanos })
    }

    /// Convert from a [`SystemTime`], preserving full precision
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Self {
                secs: d.as_secs() as i64,
                nanos: d.subsec_nanos(),
            },
            Err(e) => {
                let d = e.duration();
                if d.subsec_nanos() == 0 {
                    Self {
                        secs: -(d.as_secs() as i64),
                        nanos: 0,
                    }
                } else {
                    Self {
                        secs: -(d.as_secs() as i64) - 1,
                        nanos: NANOS_PER_SEC - d.subsec_nanos(),
                    }
                }
            }
        }
    }

    /// Convert back to a [`SystemTime`]
    pub fn to_system_time(&self) -> SystemTime {
        if self.secs >= 0 {
            UNIX_EPOCH + Duration::new(self.secs as u64, self.nanos)
        } else {
            UNIX_EPOCH - Duration::from_secs(self.secs.unsigned_abs())
                + Duration::from_nanos(self.nanos as u64)
        }
    }

    /// Whole seconds since the epoch (floored)
    pub fn secs(&self) -> i64 {
        self.secs
    }

    /// Sub-second part in nanoseconds
    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// Drop the sub-second part
    pub fn truncate_to_secs(&self) -> Self {
        Self {
            secs: self.secs,
            nanos: 0,
        }
    }

    /// Human-readable form, if representable
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.secs, self.nanos)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

impl FromStr for Timestamp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (secs, nanos) = s
            .split_once('.')
            .ok_or_else(|| format!("timestamp {:?} has no '.' separator", s))?;
        if nanos.is_empty() || nanos.len() > 9 || !nanos.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid nanoseconds in timestamp {:?}", s));
        }
        let secs: i64 = secs
            .parse()
            .map_err(|e| format!("invalid seconds in timestamp {:?}: {}", s, e))?;
        let nanos: u32 = nanos
            .parse()
            .map_err(|e| format!("invalid nanoseconds in timestamp {:?}: {}", s, e))?;
        Timestamp::new(secs, nanos).ok_or_else(|| format!("nanoseconds out of range in {:?}", s))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// SHA-256 digest of a file's content
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; Digest::LEN]);

impl Digest {
    /// Digest length in bytes
    pub const LEN: usize = 32;

    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Hash an in-memory buffer
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut bytes = [0u8; Self::LEN];
        hex::decode_to_slice(s.to_ascii_lowercase(), &mut bytes)
            .map_err(|e| format!("invalid digest {:?}: {}", s, e))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Last-known state of a file, persisted in its metadata channel
///
/// Both fields are always written together: the encoded form is a single
/// value, so a store never holds one half of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRecord {
    /// Modification time when the digest was taken
    pub timestamp: Timestamp,
    /// Content digest at that time
    pub digest: Digest,
}

impl FileRecord {
    /// Create a record
    pub fn new(timestamp: Timestamp, digest: Digest) -> Self {
        Self { timestamp, digest }
    }

    /// Encode as `"<secs>.<nanos> <hex digest>"`
    pub fn encode(&self) -> String {
        format!("{} {}", self.timestamp, self.digest)
    }

    /// Decode the form produced by [`FileRecord::encode`]
    pub fn decode(value: &str) -> std::result::Result<Self, String> {
        let mut parts = value.trim().split(' ');
        let (Some(ts), Some(digest), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("expected \"<timestamp> <digest>\", got {:?}", value));
        };
        Ok(Self {
            timestamp: ts.parse()?,
            digest: digest.parse()?,
        })
    }
}

/// Result of reconciling one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// No prior record; the file has just been tagged
    Untagged,
    /// Timestamp and digest both match the record
    Unchanged,
    /// Timestamp moved; the record follows the new content
    Updated,
    /// Timestamp matches but content does not
    Corrupt,
}

impl Classification {
    /// All classifications, in report order
    pub const ALL: [Classification; 4] = [
        Classification::Untagged,
        Classification::Unchanged,
        Classification::Updated,
        Classification::Corrupt,
    ];

    /// Short tag used in text reports
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Untagged => "new",
            Classification::Unchanged => "ok",
            Classification::Updated => "outdated",
            Classification::Corrupt => "corrupt",
        }
    }

    /// Index into [`Classification::ALL`]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything observed and decided for one file
#[derive(Debug)]
pub struct FileOutcome {
    /// File that was checked
    pub path: PathBuf,
    /// Classification
    pub classification: Classification,
    /// Record found before the check, if any
    pub stored: Option<FileRecord>,
    /// Actual timestamp and digest observed during the check
    pub actual: FileRecord,
    /// Whether a new record was persisted
    pub written: bool,
    /// Write failure, if the decided write did not go through
    pub write_error: Option<RotcheckError>,
}

impl FileOutcome {
    /// Stored and actual digests, when they differ
    pub fn digest_pair(&self) -> Option<(Digest, Digest)> {
        self.stored
            .filter(|s| s.digest != self.actual.digest)
            .map(|s| (s.digest, self.actual.digest))
    }
}

/// What the engine should do with the stored record of a corrupt file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionPolicy {
    /// Leave the last-known-good record in place; the file keeps reporting
    /// `Corrupt` until it is retagged explicitly
    #[default]
    Keep,
    /// Advance the record to the actual state once the corruption is reported
    Retag,
}

/// Aggregate counts for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Count per classification, indexed by [`Classification::index`]
    pub classifications: [usize; 4],
    /// Count per error kind, indexed by [`ErrorKind::index`]
    pub errors: [usize; 7],
    /// Every file classified `Corrupt`
    pub corrupt_files: Vec<PathBuf>,
    /// Records persisted
    pub records_written: usize,
    /// Bytes fed through the checksum engine
    pub bytes_hashed: u64,
}

impl ScanSummary {
    /// Count a classified file
    pub fn record_outcome(&mut self, outcome: &FileOutcome, bytes_hashed: u64) {
        self.classifications[outcome.classification.index()] += 1;
        if outcome.classification == Classification::Corrupt {
            self.corrupt_files.push(outcome.path.clone());
        }
        if outcome.written {
            self.records_written += 1;
        }
        if let Some(err) = &outcome.write_error {
            self.errors[err.kind().index()] += 1;
        }
        self.bytes_hashed += bytes_hashed;
    }

    /// Count a failed file
    pub fn record_error(&mut self, err: &RotcheckError) {
        self.errors[err.kind().index()] += 1;
    }

    /// Merge another partial summary into this one
    pub fn merge(mut self, other: ScanSummary) -> ScanSummary {
        for (a, b) in self.classifications.iter_mut().zip(other.classifications) {
            *a += b;
        }
        for (a, b) in self.errors.iter_mut().zip(other.errors) {
            *a += b;
        }
        self.corrupt_files.extend(other.corrupt_files);
        self.records_written += other.records_written;
        self.bytes_hashed += other.bytes_hashed;
        self
    }

    /// Number of files with the given classification
    pub fn count(&self, classification: Classification) -> usize {
        self.classifications[classification.index()]
    }

    /// Number of failures of the given kind
    pub fn error_count(&self, kind: ErrorKind) -> usize {
        self.errors[kind.index()]
    }

    /// Total files classified
    pub fn files_checked(&self) -> usize {
        self.classifications.iter().sum()
    }

    /// Total per-file failures
    pub fn total_errors(&self) -> usize {
        self.errors.iter().sum()
    }

    /// A run fails if and only if at least one file is corrupt
    pub fn is_failure(&self) -> bool {
        self.count(Classification::Corrupt) > 0
    }
}

/// Configuration for a scan
///
/// Serialized as JSON when loaded from a `--config` file. Missing fields
/// take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Descend into directories
    pub recursive: bool,
    /// Follow symbolic links while walking
    pub follow_symlinks: bool,
    /// Glob patterns of paths to skip
    pub exclude_patterns: Vec<String>,
    /// Number of concurrent workers
    pub jobs: usize,
    /// Handling of the stored record after a corruption
    pub corruption_policy: CorruptionPolicy,
    /// Classify without writing any record
    pub dry_run: bool,
    /// Read buffer size for hashing, in bytes
    pub buffer_size: usize,
    /// Attribute name prefix for the extended attribute store
    pub attribute_prefix: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            recursive: false,
            follow_symlinks: false,
            exclude_patterns: Vec::new(),
            jobs: num_cpus::get(),
            corruption_policy: CorruptionPolicy::Keep,
            dry_run: false,
            buffer_size: crate::checksum::DEFAULT_BUFFER_SIZE,
            attribute_prefix: crate::store::DEFAULT_ATTRIBUTE_PREFIX.to_string(),
        }
    }
}

impl ScanConfig {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RotcheckError::from_io(path, e))?;
        let config: ScanConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scanner cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(RotcheckError::config("jobs must be at least 1"));
        }
        if self.buffer_size == 0 {
            return Err(RotcheckError::config("buffer_size must be at least 1"));
        }
        if self.attribute_prefix.is_empty() {
            return Err(RotcheckError::config("attribute_prefix must not be empty"));
        }
        Ok(())
    }
}
