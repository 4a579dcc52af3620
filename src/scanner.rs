//! Scan orchestration
//!
//! The [`Scanner`] wires the pieces together: a [`Walker`] enumerates files,
//! a bounded pool of workers runs each file through the [`Reconciler`], and
//! every result goes to a shared [`Reporter`].
//!
//! Workers share nothing mutable except the reporter's sink. Counts are
//! accumulated per worker and merged once all files are done.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use rotcheck::{Reporter, ReportFormat, ScannerBuilder};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scanner = ScannerBuilder::new()
//!     .recursive(true)
//!     .jobs(4)
//!     .exclude_patterns(vec!["*.part".to_string()])
//!     .build()?;
//!
//! let reporter = Reporter::stdout(ReportFormat::Text);
//! let report = scanner.scan(&[PathBuf::from("/srv/archive")], &reporter)?;
//! if report.summary.is_failure() {
//!     eprintln!("corruption detected");
//! }
//! # Ok(())
//! # }
//! ```

use crate::checksum::ChecksumEngine;
use crate::error::{Result, RotcheckError};
use crate::reconcile::{Reconciled, Reconciler};
use crate::report::Reporter;
use crate::store::{self, MetadataStore};
use crate::types::{CorruptionPolicy, ScanConfig, ScanSummary};
use crate::walker::Walker;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Result of a complete scan
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Aggregate counts
    pub summary: ScanSummary,
    /// Wall-clock duration
    pub elapsed: Duration,
    /// Whether the scan stopped early
    pub cancelled: bool,
}

/// Bounded-concurrency file checker
pub struct Scanner {
    config: ScanConfig,
    reconciler: Reconciler,
    pool: ThreadPool,
    cancelled: Arc<AtomicBool>,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("config", &self.config)
            .field("reconciler", &self.reconciler)
            .field("threads", &self.pool.current_num_threads())
            .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
            .finish()
    }
}

impl Scanner {
    /// Scanner with the platform store and default configuration
    pub fn new() -> Result<Self> {
        ScannerBuilder::new().build()
    }

    /// Active configuration
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Reconciler shared by the workers
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Flag that stops the scan when set
    ///
    /// Files already being checked run to completion, including their record
    /// write; no new file is started afterwards. The `rotcheck` binary sets it
    /// on SIGINT and SIGTERM.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Check a single file outside of a scan
    pub fn check_file(&self, path: &Path) -> Result<Reconciled> {
        self.reconciler.reconcile(path)
    }

    /// Check every file under `roots`
    ///
    /// Per-file failures are reported and counted; they never abort the scan.
    ///
    /// # Errors
    ///
    /// Only failures that prevent enumeration: invalid exclude patterns,
    /// missing inputs, or a directory input without `recursive`.
    #[instrument(skip(self, reporter))]
    pub fn scan(&self, roots: &[PathBuf], reporter: &Reporter) -> Result<ScanReport> {
        let start = Instant::now();
        let walker = Walker::from_config(roots.to_vec(), &self.config)?;
        let files = walker.walk()?;
        info!(
            "Scanning {} input(s) with {} worker(s)",
            roots.len(),
            self.pool.current_num_threads()
        );

        let cancelled = &self.cancelled;
        let reconciler = &self.reconciler;
        let summary = self.pool.install(|| {
            files
                .par_bridge()
                .fold(ScanSummary::default, |mut acc, entry| {
                    if cancelled.load(Ordering::Relaxed) {
                        return acc;
                    }
                    match entry.and_then(|path| reconciler.reconcile(&path)) {
                        Ok(reconciled) => {
                            reporter.file(&reconciled.outcome);
                            acc.record_outcome(&reconciled.outcome, reconciled.bytes_hashed);
                        }
                        Err(e) => {
                            debug!("Skipping file: {}", e);
                            reporter.error(&e);
                            acc.record_error(&e);
                        }
                    }
                    acc
                })
                .reduce(ScanSummary::default, ScanSummary::merge)
        });

        let elapsed = start.elapsed();
        info!(
            "Checked {} files in {:?}: {} corrupt, {} errors",
            summary.files_checked(),
            elapsed,
            summary.count(crate::types::Classification::Corrupt),
            summary.total_errors()
        );
        reporter.summary(&summary, elapsed);

        Ok(ScanReport {
            summary,
            elapsed,
            cancelled: self.cancelled.load(Ordering::Relaxed),
        })
    }
}

/// Builder for configuring a [`Scanner`]
#[derive(Debug, Default)]
pub struct ScannerBuilder {
    config: ScanConfig,
    store: Option<Arc<dyn MetadataStore>>,
}

impl ScannerBuilder {
    /// Start from the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    /// Descend into directories
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.config.recursive = recursive;
        self
    }

    /// Follow symbolic links while descending
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.config.follow_symlinks = follow;
        self
    }

    /// Glob patterns of paths to skip
    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.exclude_patterns = patterns;
        self
    }

    /// Number of concurrent workers
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.config.jobs = jobs;
        self
    }

    /// Handling of the record after a corruption
    pub fn corruption_policy(mut self, policy: CorruptionPolicy) -> Self {
        self.config.corruption_policy = policy;
        self
    }

    /// Classify without writing records
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    /// Read buffer size for hashing
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Attribute name prefix for the platform store
    pub fn attribute_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.attribute_prefix = prefix.into();
        self
    }

    /// Use `store` instead of the platform store
    pub fn store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the scanner
    ///
    /// # Errors
    ///
    /// - [`RotcheckError::InvalidConfiguration`] for out-of-range values
    /// - [`RotcheckError::ThreadPool`] if the worker pool cannot start
    pub fn build(self) -> Result<Scanner> {
        self.config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => store::platform_store(&self.config)?,
        };
        debug!("Using {} metadata store", store.name());

        let reconciler = Reconciler::new(store)
            .with_engine(ChecksumEngine::new().with_buffer_size(self.config.buffer_size))
            .with_policy(self.config.corruption_policy)
            .with_dry_run(self.config.dry_run);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .thread_name(|i| format!("rotcheck-worker-{}", i))
            .build()
            .map_err(|e| RotcheckError::ThreadPool(e.to_string()))?;

        Ok(Scanner {
            config: self.config,
            reconciler,
            pool,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }
}
