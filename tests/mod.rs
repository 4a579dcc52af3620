//! Main test module for rotcheck
//!
//! This module includes all test suites:
//! - Integration tests against the real platform metadata store
//! - Property-based tests for the classification invariants
//! - Edge cases around odd inputs

pub mod integration;
pub mod property;

use rotcheck::{MetadataStore, RotcheckError};
use std::path::Path;
use std::sync::Arc;

/// Platform store, or `None` when the filesystem under `dir` has no
/// metadata channel (tmpfs without user xattrs, some containers)
pub fn platform_store_or_skip(dir: &Path) -> Option<Arc<dyn MetadataStore>> {
    let store = rotcheck::platform_store(&Default::default()).ok()?;
    let sample = dir.join(".support_check");
    std::fs::write(&sample, b"sample").ok()?;
    let record = rotcheck::FileRecord::new(
        rotcheck::Timestamp::new(0, 0)?,
        rotcheck::Digest::of(b"sample"),
    );
    let result = store.write(&sample, &record);
    let _ = std::fs::remove_file(&sample);
    match result {
        Ok(()) => Some(store),
        Err(RotcheckError::NotSupported { .. }) => {
            eprintln!("Skipping: metadata store not supported on this filesystem");
            None
        }
        Err(e) => panic!("Unexpected store failure: {}", e),
    }
}

#[cfg(test)]
mod edge_cases {
    use rotcheck::*;
    use std::fs;
    use std::io;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn memory_scanner(store: &Arc<MemoryStore>) -> Scanner {
        ScannerBuilder::new()
            .recursive(true)
            .store(store.clone())
            .build()
            .unwrap()
    }

    fn sink_reporter() -> Reporter {
        Reporter::new(Box::new(io::sink()), ReportFormat::Text)
    }

    #[test]
    fn test_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty");
        fs::write(&path, b"").unwrap();
        let store = Arc::new(MemoryStore::new());

        let reconciled = Reconciler::new(store.clone()).reconcile(&path).unwrap();
        assert_eq!(reconciled.outcome.classification, Classification::Untagged);
        assert_eq!(reconciled.bytes_hashed, 0);
        assert_eq!(
            reconciled.outcome.actual.digest.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());

        let report = memory_scanner(&store)
            .scan(&[temp_dir.path().to_path_buf()], &sink_reporter())
            .unwrap();
        assert_eq!(report.summary.files_checked(), 0);
        assert_eq!(report.summary.total_errors(), 0);
        assert!(!report.summary.is_failure());
    }

    #[test]
    fn test_special_filenames() {
        let temp_dir = TempDir::new().unwrap();
        let names = [
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file.with.dots.txt",
            "file@with#special$chars.txt",
            "файл.txt",
            "文件.txt",
        ];

        let mut created = 0;
        for name in &names {
            if fs::write(temp_dir.path().join(name), name.as_bytes()).is_ok() {
                created += 1;
            }
        }

        let store = Arc::new(MemoryStore::new());
        let scanner = memory_scanner(&store);
        let roots = [temp_dir.path().to_path_buf()];

        let first = scanner.scan(&roots, &sink_reporter()).unwrap();
        assert_eq!(first.summary.count(Classification::Untagged), created);
        let second = scanner.scan(&roots, &sink_reporter()).unwrap();
        assert_eq!(second.summary.count(Classification::Unchanged), created);
    }

    #[test]
    fn test_overlapping_roots_are_checked_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big.bin");
        fs::write(&path, vec![7u8; 4 * 1024 * 1024]).unwrap();
        let store = Arc::new(MemoryStore::new());
        let scanner = ScannerBuilder::new()
            .recursive(true)
            .jobs(4)
            .store(store.clone())
            .build()
            .unwrap();
        let roots = [
            temp_dir.path().to_path_buf(),
            path.clone(),
            path.clone(),
        ];

        for _ in 0..5 {
            store.clear();
            let report = scanner.scan(&roots, &sink_reporter()).unwrap();
            assert_eq!(report.summary.files_checked(), 1);
            assert_eq!(report.summary.count(Classification::Untagged), 1);
            assert_eq!(report.summary.records_written, 1);
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unsupported_file_is_per_file_error() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("good");
        let bad = temp_dir.path().join("bad");
        fs::write(&good, b"g").unwrap();
        fs::write(&bad, b"b").unwrap();

        let store = Arc::new(MemoryStore::new());
        store.mark_unsupported(std::path::absolute(&bad).unwrap());

        let report = memory_scanner(&store)
            .scan(&[temp_dir.path().to_path_buf()], &sink_reporter())
            .unwrap();
        assert_eq!(report.summary.count(Classification::Untagged), 1);
        assert_eq!(report.summary.total_errors(), 1);
        assert!(!report.summary.is_failure());
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        for value in [
            "",
            "1600000000.000000000",
            "abc.000000000 e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            "1600000000.000000000 not-hex",
            "1600000000.000000000 e3b0c442",
        ] {
            assert!(FileRecord::decode(value).is_err(), "accepted {:?}", value);
        }
    }
}
