//! Integration tests against the platform metadata store
//!
//! Every test checks the temp directory first and returns early when the
//! filesystem has no metadata channel.

use crate::platform_store_or_skip;
use filetime::FileTime;
use rotcheck::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Test harness with a file tree and a scanner on the platform store
pub struct RotcheckTestHarness {
    pub temp_dir: TempDir,
    pub store: Arc<dyn MetadataStore>,
}

impl RotcheckTestHarness {
    /// Harness, or `None` if the filesystem cannot hold records
    pub fn new() -> Option<Self> {
        let temp_dir = TempDir::new().unwrap();
        let store = platform_store_or_skip(temp_dir.path())?;
        Some(Self { temp_dir, store })
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write `content` to `name` and pin its mtime
    pub fn write_file(&self, name: &str, content: &[u8], mtime: (i64, u32)) -> PathBuf {
        let path = self.root().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        self.set_mtime(&path, mtime);
        path
    }

    pub fn set_mtime(&self, path: &Path, (secs, nanos): (i64, u32)) {
        filetime::set_file_mtime(path, FileTime::from_unix_time(secs, nanos)).unwrap();
    }

    pub fn scanner(&self, policy: CorruptionPolicy) -> Scanner {
        ScannerBuilder::new()
            .recursive(true)
            .corruption_policy(policy)
            .store(self.store.clone())
            .build()
            .unwrap()
    }

    pub fn scan(&self, scanner: &Scanner) -> ScanSummary {
        let reporter = Reporter::new(Box::new(io::sink()), ReportFormat::Json);
        scanner
            .scan(&[self.root().to_path_buf()], &reporter)
            .unwrap()
            .summary
    }
}

const T0: (i64, u32) = (1_650_000_000, 987_654_321);

#[test]
fn test_idempotent_on_untouched_tree() {
    let Some(h) = RotcheckTestHarness::new() else { return };
    for i in 0..10 {
        h.write_file(&format!("dir{}/file{}.bin", i % 3, i), &[i as u8; 1000], T0);
    }
    let scanner = h.scanner(CorruptionPolicy::Keep);

    let first = h.scan(&scanner);
    assert_eq!(first.count(Classification::Untagged), 10);
    assert_eq!(first.records_written, 10);

    for _ in 0..3 {
        let again = h.scan(&scanner);
        assert_eq!(again.count(Classification::Unchanged), 10);
        assert_eq!(again.records_written, 0);
        assert_eq!(again.total_errors(), 0);
    }
}

#[test]
fn test_record_matches_file_state() {
    let Some(h) = RotcheckTestHarness::new() else { return };
    let path = h.write_file("photo.jpg", b"pixels", T0);
    h.scan(&h.scanner(CorruptionPolicy::Keep));

    let record = h.store.read(&path).unwrap().unwrap();
    assert_eq!(record.timestamp, Timestamp::new(T0.0, T0.1).unwrap());
    assert_eq!(record.digest, Digest::of(b"pixels"));

    // Tagging does not move the mtime
    let mtime = FileTime::from_last_modification_time(&fs::metadata(&path).unwrap());
    assert_eq!(mtime, FileTime::from_unix_time(T0.0, T0.1));
}

#[cfg(unix)]
#[test]
fn test_record_attribute_format() {
    let Some(h) = RotcheckTestHarness::new() else { return };
    let path = h.write_file("a", b"", T0);
    h.scan(&h.scanner(CorruptionPolicy::Keep));

    let raw = xattr::get(&path, "user.rotcheck.record").unwrap().unwrap();
    assert_eq!(
        String::from_utf8(raw).unwrap(),
        "1650000000.987654321 e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn test_corruption_detected_and_kept() {
    let Some(h) = RotcheckTestHarness::new() else { return };
    let victim = h.write_file("archive/victim.dat", b"original bytes", T0);
    h.write_file("archive/bystander.dat", b"fine", T0);
    let scanner = h.scanner(CorruptionPolicy::Keep);
    h.scan(&scanner);

    // Same length, flipped content, mtime restored
    fs::write(&victim, b"original bytez").unwrap();
    h.set_mtime(&victim, T0);

    for _ in 0..2 {
        let summary = h.scan(&scanner);
        assert_eq!(summary.count(Classification::Corrupt), 1);
        assert_eq!(summary.count(Classification::Unchanged), 1);
        assert_eq!(summary.corrupt_files, vec![victim.clone()]);
        assert!(summary.is_failure());
    }
    assert_eq!(
        h.store.read(&victim).unwrap().unwrap().digest,
        Digest::of(b"original bytes")
    );
}

#[test]
fn test_corruption_retagged_with_fix() {
    let Some(h) = RotcheckTestHarness::new() else { return };
    let path = h.write_file("f", b"A", T0);
    let scanner = h.scanner(CorruptionPolicy::Retag);
    h.scan(&scanner);

    fs::write(&path, b"B").unwrap();
    h.set_mtime(&path, T0);

    let summary = h.scan(&scanner);
    assert_eq!(summary.count(Classification::Corrupt), 1);
    assert_eq!(summary.records_written, 1);

    let summary = h.scan(&scanner);
    assert_eq!(summary.count(Classification::Unchanged), 1);
    assert!(!summary.is_failure());
}

#[test]
fn test_legitimate_edit_is_updated() {
    let Some(h) = RotcheckTestHarness::new() else { return };
    let path = h.write_file("notes.txt", b"v1", T0);
    let scanner = h.scanner(CorruptionPolicy::Keep);
    h.scan(&scanner);

    let t1 = (T0.0 + 60, 0);
    fs::write(&path, b"v2").unwrap();
    h.set_mtime(&path, t1);

    let summary = h.scan(&scanner);
    assert_eq!(summary.count(Classification::Updated), 1);
    assert!(!summary.is_failure());
    assert_eq!(
        h.store.read(&path).unwrap().unwrap(),
        FileRecord::new(Timestamp::new(t1.0, t1.1).unwrap(), Digest::of(b"v2"))
    );

    let summary = h.scan(&scanner);
    assert_eq!(summary.count(Classification::Unchanged), 1);
}

#[test]
fn test_touch_without_content_change_is_updated() {
    let Some(h) = RotcheckTestHarness::new() else { return };
    let path = h.write_file("f", b"same", T0);
    let scanner = h.scanner(CorruptionPolicy::Keep);
    h.scan(&scanner);

    h.set_mtime(&path, (T0.0, T0.1 + 1));
    let summary = h.scan(&scanner);
    assert_eq!(summary.count(Classification::Updated), 1);
}

#[test]
fn test_record_survives_rename() {
    let Some(h) = RotcheckTestHarness::new() else { return };
    let path = h.write_file("before", b"content", T0);
    let scanner = h.scanner(CorruptionPolicy::Keep);
    h.scan(&scanner);

    let renamed = h.root().join("after");
    fs::rename(&path, &renamed).unwrap();

    let summary = h.scan(&scanner);
    assert_eq!(summary.count(Classification::Unchanged), 1);
    assert_eq!(summary.records_written, 0);
}

#[test]
fn test_excluded_files_are_not_tagged() {
    let Some(h) = RotcheckTestHarness::new() else { return };
    let kept = h.write_file("keep.txt", b"k", T0);
    let skipped = h.write_file("cache/skip.tmp", b"s", T0);

    let scanner = ScannerBuilder::new()
        .recursive(true)
        .exclude_patterns(vec!["*.tmp".to_string()])
        .store(h.store.clone())
        .build()
        .unwrap();
    let summary = h.scan(&scanner);

    assert_eq!(summary.files_checked(), 1);
    assert!(h.store.read(&kept).unwrap().is_some());
    assert!(h.store.read(&skipped).unwrap().is_none());
}

#[test]
fn test_dry_run_writes_nothing() {
    let Some(h) = RotcheckTestHarness::new() else { return };
    let path = h.write_file("f", b"A", T0);
    let scanner = ScannerBuilder::new()
        .recursive(true)
        .dry_run(true)
        .store(h.store.clone())
        .build()
        .unwrap();

    let summary = h.scan(&scanner);
    assert_eq!(summary.count(Classification::Untagged), 1);
    assert_eq!(summary.records_written, 0);
    assert!(h.store.read(&path).unwrap().is_none());
}

#[cfg(unix)]
#[test]
fn test_garbage_attribute_is_malformed() {
    let Some(h) = RotcheckTestHarness::new() else { return };
    let path = h.write_file("f", b"A", T0);
    xattr::set(&path, "user.rotcheck.record", b"not a record").unwrap();

    let err = h.store.read(&path).unwrap_err();
    assert!(matches!(err, RotcheckError::MalformedRecord { .. }));

    // Reported per file, the scan itself succeeds
    let summary = h.scan(&h.scanner(CorruptionPolicy::Keep));
    assert_eq!(summary.files_checked(), 0);
    assert_eq!(summary.total_errors(), 1);
}
