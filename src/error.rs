//! Error types for rotcheck
//!
//! This module defines every error that can occur while checking a file.
//! Almost all of them are local to a single file: the scanner reports them and
//! moves on. Only a failure to enumerate the inputs at all (see
//! [`RotcheckError::is_fatal`]) stops a run.
//!
//! Note that a detected corruption is *not* an error. It is the primary result
//! of a check and is carried by [`crate::types::Classification::Corrupt`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Type alias for Results in rotcheck
pub type Result<T> = std::result::Result<T, RotcheckError>;

/// Main error type for all rotcheck operations
#[derive(Debug, Error)]
pub enum RotcheckError {
    /// The filesystem holding the path does not offer the metadata channel
    #[error("Metadata channel not supported: {path:?}")]
    NotSupported {
        /// Path whose storage lacks the channel
        path: PathBuf,
    },

    /// File vanished between enumeration and check
    #[error("File not found: {path:?}")]
    NotFound {
        /// Path that no longer exists
        path: PathBuf,
    },

    /// Permission denied reading the file or its metadata channel
    #[error("Permission denied: {path:?}")]
    PermissionDenied {
        /// Path where permission was denied
        path: PathBuf,
    },

    /// Any other I/O failure tied to a path
    #[error("IO error on {path:?}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The stored record could not be decoded
    #[error("Malformed record on {path:?}: {reason}")]
    MalformedRecord {
        /// Path carrying the record
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// The file's timestamp moved while its content was being hashed
    #[error("File modified while being read: {path:?}")]
    ConcurrentModification {
        /// Path that changed underneath the read
        path: PathBuf,
    },

    /// A record write did not leave the store in a consistent state
    #[error("Internal invariant violated on {path:?}: {detail}")]
    InternalInvariantViolation {
        /// Path whose record is suspect
        path: PathBuf,
        /// Description of the violated invariant
        detail: String,
    },

    /// An input path could not be enumerated at all
    #[error("Cannot enumerate {path:?}: {reason}")]
    Enumeration {
        /// Input path given by the caller
        path: PathBuf,
        /// Why enumeration failed
        reason: String,
    },

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Pattern parsing error
    #[error("Invalid exclude pattern: {0}")]
    InvalidPattern(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Errors reading a JSON configuration
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Thread pool error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Coarse error category used for end-of-run counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// File excluded because its storage has no metadata channel
    NotSupported,
    /// File vanished mid-run
    NotFound,
    /// Read or write permission denied
    PermissionDenied,
    /// Other I/O failure, including malformed records and walk errors
    Io,
    /// Content changed during the read
    ConcurrentModification,
    /// Record write left the store inconsistent
    InternalInvariantViolation,
    /// Run-level failure (enumeration, configuration, thread pool)
    Fatal,
}

impl ErrorKind {
    /// All kinds, in report order
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::NotSupported,
        ErrorKind::NotFound,
        ErrorKind::PermissionDenied,
        ErrorKind::Io,
        ErrorKind::ConcurrentModification,
        ErrorKind::InternalInvariantViolation,
        ErrorKind::Fatal,
    ];

    /// Label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::NotSupported => "not supported",
            ErrorKind::NotFound => "not found",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Io => "io error",
            ErrorKind::ConcurrentModification => "modified while reading",
            ErrorKind::InternalInvariantViolation => "invariant violation",
            ErrorKind::Fatal => "fatal",
        }
    }

    /// Index into [`ErrorKind::ALL`]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl RotcheckError {
    /// Classify an I/O error raised while touching `path`
    ///
    /// `NotFound`, `PermissionDenied` and `Unsupported` get their own variants
    /// so the scanner can count and report them separately. Everything else
    /// keeps its source error.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        let path = path.to_path_buf();
        match err.kind() {
            io::ErrorKind::NotFound => RotcheckError::NotFound { path },
            io::ErrorKind::PermissionDenied => RotcheckError::PermissionDenied { path },
            io::ErrorKind::Unsupported => RotcheckError::NotSupported { path },
            _ => RotcheckError::Io { path, source: err },
        }
    }

    /// Create a malformed record error
    pub fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        RotcheckError::MalformedRecord {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create an invariant violation error
    pub fn invariant(path: &Path, detail: impl Into<String>) -> Self {
        RotcheckError::InternalInvariantViolation {
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        RotcheckError::InvalidConfiguration(msg.into())
    }

    /// Category of this error for summary counts
    pub fn kind(&self) -> ErrorKind {
        match self {
            RotcheckError::NotSupported { .. } => ErrorKind::NotSupported,
            RotcheckError::NotFound { .. } => ErrorKind::NotFound,
            RotcheckError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            RotcheckError::Io { .. }
            | RotcheckError::MalformedRecord { .. }
            | RotcheckError::WalkDir(_) => ErrorKind::Io,
            RotcheckError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            RotcheckError::InternalInvariantViolation { .. } => {
                ErrorKind::InternalInvariantViolation
            }
            RotcheckError::Enumeration { .. }
            | RotcheckError::InvalidPattern(_)
            | RotcheckError::InvalidConfiguration(_)
            | RotcheckError::Json(_)
            | RotcheckError::ThreadPool(_) => ErrorKind::Fatal,
        }
    }

    /// Path the error is about, when there is one
    pub fn path(&self) -> Option<&Path> {
        match self {
            RotcheckError::NotSupported { path }
            | RotcheckError::NotFound { path }
            | RotcheckError::PermissionDenied { path }
            | RotcheckError::Io { path, .. }
            | RotcheckError::MalformedRecord { path, .. }
            | RotcheckError::ConcurrentModification { path }
            | RotcheckError::InternalInvariantViolation { path, .. }
            | RotcheckError::Enumeration { path, .. } => Some(path),
            RotcheckError::WalkDir(e) => e.path(),
            _ => None,
        }
    }

    /// Whether this error aborts the whole run rather than a single file
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }

    /// Whether the file was excluded rather than failed
    pub fn is_exclusion(&self) -> bool {
        matches!(self, RotcheckError::NotSupported { .. })
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            RotcheckError::NotSupported { path } => {
                format!(
                    "{:?} is on a filesystem without extended attribute support. \
                     The file was skipped.",
                    path
                )
            }
            RotcheckError::PermissionDenied { path } => {
                format!(
                    "Permission denied for {:?}. Check file permissions or run with appropriate privileges.",
                    path
                )
            }
            RotcheckError::ConcurrentModification { path } => {
                format!("{:?} changed while it was being hashed. Run again once it is idle.", path)
            }
            RotcheckError::MalformedRecord { path, reason } => {
                format!(
                    "Stored record on {:?} is unreadable ({}). It was left untouched.",
                    path, reason
                )
            }
            _ => self.to_string(),
        }
    }
}
