//! # rotcheck - silent data corruption detection
//!
//! rotcheck detects bit rot by keeping, for every regular file, its last known
//! modification time and a SHA-256 digest of its content *in the file's own
//! metadata channel* (extended attributes on unix, alternate data streams on
//! NTFS). The record travels with the file across renames and metadata-aware
//! copies, so no external database has to be kept in sync.
//!
//! ## How a file is classified
//!
//! On every run the stored record is reconciled with the file's current state:
//!
//! - **Untagged**: no record yet. The file is hashed and tagged.
//! - **Unchanged**: same mtime, same digest. Nothing is written.
//! - **Updated**: the mtime moved. The file was edited through a normal write
//!   path, so the record simply follows the new content.
//! - **Corrupt**: same mtime, different digest. Content changed without any
//!   process recording a modification. This is the event rotcheck exists to
//!   surface.
//!
//! What happens to the record of a corrupt file is governed by
//! [`CorruptionPolicy`]. The default, [`CorruptionPolicy::Keep`], leaves the
//! last-known-good digest in place so the file keeps being reported until it
//! is explicitly retagged.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rotcheck::{Reporter, ReportFormat, ScannerBuilder};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scanner = ScannerBuilder::new().recursive(true).build()?;
//! let reporter = Reporter::stdout(ReportFormat::Text).with_quiet(true);
//!
//! let report = scanner.scan(&[PathBuf::from("./photos")], &reporter)?;
//! println!("{} corrupt", report.summary.corrupt_files.len());
//! # Ok(())
//! # }
//! ```
//!
//! ### Checking a single file against a custom store
//!
//! ```rust
//! use rotcheck::{Classification, MemoryStore, Reconciler};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let dir = tempfile::TempDir::new()?;
//! # let path = dir.path().join("file.txt");
//! # std::fs::write(&path, b"hello")?;
//! let reconciler = Reconciler::new(Arc::new(MemoryStore::new()));
//!
//! let first = reconciler.reconcile(&path)?;
//! assert_eq!(first.outcome.classification, Classification::Untagged);
//!
//! let second = reconciler.reconcile(&path)?;
//! assert_eq!(second.outcome.classification, Classification::Unchanged);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Per-file failures ([`RotcheckError::NotFound`],
//! [`RotcheckError::PermissionDenied`], [`RotcheckError::NotSupported`], ...)
//! are reported and counted but never stop a scan. Only a failure to enumerate
//! the inputs is fatal; see [`RotcheckError::is_fatal`].
//!
//! ## Module Organization
//!
//! - [`checksum`]: streaming SHA-256 engine
//! - [`store`]: the [`MetadataStore`] trait and its backends
//! - [`reconcile`]: the per-file decision core
//! - [`walker`]: input enumeration
//! - [`report`]: serialized text and JSON output
//! - [`scanner`]: worker pool tying it all together
//! - [`types`]: records, classifications, summary and configuration
//! - [`error`]: error types

pub mod checksum;
pub mod error;
pub mod reconcile;
pub mod report;
pub mod scanner;
pub mod store;
pub mod types;
pub mod walker;

mod utils;

pub use checksum::ChecksumEngine;
pub use error::{ErrorKind, Result, RotcheckError};
pub use reconcile::{Reconciled, Reconciler};
pub use report::{ReportFormat, Reporter};
pub use scanner::{ScanReport, Scanner, ScannerBuilder};
pub use store::{platform_store, MemoryStore, MetadataStore};
pub use types::*;
pub use utils::format_bytes;
pub use walker::Walker;

#[cfg(unix)]
pub use store::XattrStore;
#[cfg(windows)]
pub use store::AdsStore;
