//! Property-based testing for rotcheck
//!
//! Uses proptest to check the classification invariants over random edit
//! histories against an in-memory store.

use filetime::FileTime;
use proptest::prelude::*;
use rotcheck::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// One step in a file's life
#[derive(Debug, Clone)]
pub enum Edit {
    /// New content written through a normal write path
    Write { content: Vec<u8>, advance_nanos: u64 },
    /// Timestamp bumped without a content change
    Touch { advance_nanos: u64 },
    /// Nothing happens between two checks
    Idle,
}

fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (content_strategy(), 1u64..5_000_000_000)
            .prop_map(|(content, advance_nanos)| Edit::Write { content, advance_nanos }),
        (1u64..5_000_000_000).prop_map(|advance_nanos| Edit::Touch { advance_nanos }),
        Just(Edit::Idle),
    ]
}

fn set_mtime(path: &Path, nanos_since_epoch: u64) {
    let secs = (nanos_since_epoch / 1_000_000_000) as i64;
    let nanos = (nanos_since_epoch % 1_000_000_000) as u32;
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, nanos)).unwrap();
}

const START: u64 = 1_600_000_000 * 1_000_000_000;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Legitimate edits, touches and idle periods never look like corruption,
    /// and after every check the record describes the file as it is.
    #[test]
    fn prop_no_false_positives(
        initial in content_strategy(),
        edits in prop::collection::vec(edit_strategy(), 1..12),
    ) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store.clone());

        let mut now = START;
        let mut content = initial;
        fs::write(&path, &content).unwrap();
        set_mtime(&path, now);
        prop_assert_eq!(
            reconciler.reconcile(&path).unwrap().outcome.classification,
            Classification::Untagged
        );

        for edit in edits {
            let expected = match edit {
                Edit::Write { content: next, advance_nanos } => {
                    now += advance_nanos;
                    content = next;
                    fs::write(&path, &content).unwrap();
                    set_mtime(&path, now);
                    Classification::Updated
                }
                Edit::Touch { advance_nanos } => {
                    now += advance_nanos;
                    set_mtime(&path, now);
                    Classification::Updated
                }
                Edit::Idle => Classification::Unchanged,
            };

            let outcome = reconciler.reconcile(&path).unwrap().outcome;
            prop_assert_eq!(outcome.classification, expected);

            let record = store.get(&path).unwrap();
            prop_assert_eq!(record.digest, Digest::of(&content));
            prop_assert_eq!(record.timestamp.secs() as u64, now / 1_000_000_000);
            prop_assert_eq!(record.timestamp.nanos() as u64, now % 1_000_000_000);
        }
    }

    /// Any content change behind an unchanged timestamp is reported as
    /// corrupt, and under the default policy the record is left alone.
    #[test]
    fn prop_silent_change_is_corrupt(
        original in content_strategy(),
        replacement in content_strategy(),
        mtime in 0u64..2_000_000_000_000_000_000,
    ) {
        prop_assume!(original != replacement);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store.clone());

        fs::write(&path, &original).unwrap();
        set_mtime(&path, mtime);
        reconciler.reconcile(&path).unwrap();
        let before = store.get(&path).unwrap();

        fs::write(&path, &replacement).unwrap();
        set_mtime(&path, mtime);
        let outcome = reconciler.reconcile(&path).unwrap().outcome;

        prop_assert_eq!(outcome.classification, Classification::Corrupt);
        prop_assert_eq!(
            outcome.digest_pair(),
            Some((Digest::of(&original), Digest::of(&replacement)))
        );
        prop_assert!(!outcome.written);
        prop_assert_eq!(store.get(&path).unwrap(), before);
    }

    /// A record written to a store is read back unchanged, and its encoded
    /// value decodes to the same record
    #[test]
    fn prop_store_write_read(
        secs in 0i64..10_000_000_000,
        nanos in 0u32..1_000_000_000,
        bytes in prop::array::uniform32(any::<u8>()),
    ) {
        let record = FileRecord::new(
            Timestamp::new(secs, nanos).unwrap(),
            Digest::from_bytes(bytes),
        );
        let store = MemoryStore::new();
        let path = Path::new("/virtual/file");

        store.write(path, &record).unwrap();
        prop_assert_eq!(store.read(path).unwrap(), Some(record));
        prop_assert_eq!(FileRecord::decode(&record.encode()).unwrap(), record);
    }

    /// Whatever the read buffer size, the digest is the one of the content
    #[test]
    fn prop_digest_independent_of_buffer(
        content in prop::collection::vec(any::<u8>(), 0..4096),
        buffer_size in 1usize..1024,
    ) {
        let engine = ChecksumEngine::new().with_buffer_size(buffer_size);
        let (digest, len) = engine.digest_reader(content.as_slice()).unwrap();
        prop_assert_eq!(digest, Digest::of(&content));
        prop_assert_eq!(len, content.len() as u64);
    }
}
