//! Enumeration of files to check
//!
//! [`Walker`] turns the paths given on the command line into a stream of
//! regular files. A file argument is yielded as-is; a directory argument is
//! descended into when `recursive` is set and rejected otherwise.
//!
//! Every file is yielded at most once, even when inputs overlap
//! (`dir` and `dir/f`) or reach the same file through a followed link.
//!
//! Problems with the arguments themselves are fatal and reported before any
//! file is checked. Problems found while descending (an unreadable
//! subdirectory, a broken link) become per-entry errors in the stream.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rotcheck::walker::Walker;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let walker = Walker::new(vec![PathBuf::from("./photos")])
//!     .with_recursive(true)
//!     .with_exclude_patterns(&["*.tmp".to_string(), "**/.cache/**".to_string()])?;
//!
//! for entry in walker.walk()? {
//!     println!("{}", entry?.display());
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, RotcheckError};
use crate::types::ScanConfig;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Stream of files to check
pub type WalkIter<'a> = Box<dyn Iterator<Item = Result<PathBuf>> + Send + 'a>;

/// File enumerator over one or more input paths
#[derive(Debug, Clone)]
pub struct Walker {
    roots: Vec<PathBuf>,
    recursive: bool,
    follow_symlinks: bool,
    excludes: GlobSet,
}

impl Walker {
    /// Create a walker over `roots` with default settings
    ///
    /// By default directories are not descended into, symbolic links are not
    /// followed while descending, and nothing is excluded.
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            recursive: false,
            follow_symlinks: false,
            excludes: GlobSet::empty(),
        }
    }

    /// Create a walker configured from a [`ScanConfig`]
    pub fn from_config(roots: Vec<PathBuf>, config: &ScanConfig) -> Result<Self> {
        Self::new(roots)
            .with_recursive(config.recursive)
            .with_follow_symlinks(config.follow_symlinks)
            .with_exclude_patterns(&config.exclude_patterns)
    }

    /// Descend into directory arguments
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Follow symbolic links found while descending
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Skip paths matching any of `patterns`
    ///
    /// Patterns use glob syntax and are matched against both the full path
    /// and the file name, so `*.tmp` and `**/cache/**` both work.
    ///
    /// # Errors
    ///
    /// [`RotcheckError::InvalidPattern`] if a pattern does not parse.
    pub fn with_exclude_patterns(mut self, patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| RotcheckError::InvalidPattern(format!("{}: {}", pattern, e)))?;
            builder.add(glob);
        }
        self.excludes = builder
            .build()
            .map_err(|e| RotcheckError::InvalidPattern(e.to_string()))?;
        Ok(self)
    }

    /// Whether `path` matches an exclude pattern
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.excludes.is_empty() {
            return false;
        }
        self.excludes.is_match(path)
            || path
                .file_name()
                .map(|name| self.excludes.is_match(name))
                .unwrap_or(false)
    }

    /// Validate the inputs and stream the files under them
    ///
    /// Files are told apart by canonical path, so no file reaches two
    /// workers of the same scan.
    ///
    /// # Errors
    ///
    /// [`RotcheckError::Enumeration`] if an input does not exist, cannot be
    /// stat'ed, is a directory while `recursive` is off, or is neither a file
    /// nor a directory.
    pub fn walk(&self) -> Result<WalkIter<'_>> {
        if self.roots.is_empty() {
            return Err(RotcheckError::config("no input paths given"));
        }

        let mut plans = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            let root = std::path::absolute(root).map_err(|e| RotcheckError::Enumeration {
                path: root.clone(),
                reason: e.to_string(),
            })?;
            let metadata = fs::metadata(&root).map_err(|e| RotcheckError::Enumeration {
                path: root.clone(),
                reason: e.to_string(),
            })?;

            if metadata.is_dir() {
                if !self.recursive {
                    return Err(RotcheckError::Enumeration {
                        path: root,
                        reason: "is a directory (use --recursive)".to_string(),
                    });
                }
                plans.push((root, true));
            } else if metadata.is_file() {
                plans.push((root, false));
            } else {
                return Err(RotcheckError::Enumeration {
                    path: root,
                    reason: "not a regular file or directory".to_string(),
                });
            }
        }
        debug!("Walking {} input path(s)", plans.len());

        let mut seen = HashSet::new();
        let iter = plans
            .into_iter()
            .flat_map(move |(root, is_dir)| self.walk_root(root, is_dir))
            .filter(move |entry| match entry {
                Ok(path) => {
                    let key = fs::canonicalize(path).unwrap_or_else(|_| path.clone());
                    let first = seen.insert(key);
                    if !first {
                        trace!("Skipping duplicate {:?}", path);
                    }
                    first
                }
                Err(_) => true,
            });
        Ok(Box::new(iter))
    }

    fn walk_root(&self, root: PathBuf, is_dir: bool) -> WalkIter<'_> {
        if !is_dir {
            return if self.is_excluded(&root) {
                trace!("Excluded {:?}", root);
                Box::new(std::iter::empty())
            } else {
                Box::new(std::iter::once(Ok(root)))
            };
        }
        Box::new(
            WalkDir::new(root)
                .follow_links(self.follow_symlinks)
                .into_iter()
                .filter_entry(move |entry| {
                    let keep = !self.is_excluded(entry.path());
                    if !keep {
                        trace!("Excluded {:?}", entry.path());
                    }
                    keep
                })
                .filter_map(|entry| match entry {
                    Ok(entry) if entry.file_type().is_file() => Some(Ok(entry.into_path())),
                    Ok(_) => None,
                    Err(e) => Some(Err(RotcheckError::WalkDir(e))),
                }),
        )
    }
}
