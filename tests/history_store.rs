// tests/history_store.rs

use std::collections::BTreeMap;
use std::fs;

use kiln::cache::CacheKey;
use kiln::history::{
    ExecutionOutcome, ExecutionRecord, FileHistoryStore, HistoryStore, MemoryHistoryStore,
};
use kiln::snapshot::{Hash, InputFingerprint, OutputFingerprint, Snapshotter};
use kiln::dag::ScalarValue;
use tempfile::TempDir;

fn record(task: &str, outcome: ExecutionOutcome) -> ExecutionRecord {
    let snapshotter = Snapshotter::default();
    let inputs = InputFingerprint {
        implementation_hash: Hash::of(b"impl"),
        properties: BTreeMap::from([(
            "version".to_string(),
            snapshotter.snapshot_scalar(&ScalarValue::from("1.0")),
        )]),
    };
    ExecutionRecord::new(
        task,
        Some(CacheKey::from_hash(Hash::of(task.as_bytes()))),
        Some(inputs),
        OutputFingerprint::default(),
        outcome,
    )
}

fn exercise_store(store: &dyn HistoryStore) {
    assert_eq!(store.load(":app:compile").unwrap(), None);

    let compile = record(":app:compile", ExecutionOutcome::Executed);
    let test = record(":app:test", ExecutionOutcome::Failed);
    store.store(&compile).unwrap();
    store.store(&test).unwrap();

    assert_eq!(store.load(":app:compile").unwrap(), Some(compile.clone()));
    assert!(!store.load(":app:test").unwrap().unwrap().succeeded());
    assert_eq!(store.task_paths().unwrap(), vec![":app:compile", ":app:test"]);

    // Records are replaced as a whole.
    let replaced = record(":app:test", ExecutionOutcome::FromCache);
    store.store(&replaced).unwrap();
    assert_eq!(store.load(":app:test").unwrap(), Some(replaced));

    assert!(store.remove(":app:test").unwrap());
    assert!(!store.remove(":app:test").unwrap());
    assert_eq!(store.load(":app:test").unwrap(), None);

    store.store(&record(":lib:jar", ExecutionOutcome::Executed)).unwrap();
    assert_eq!(store.prune(&[":app:compile"]).unwrap(), 1);
    assert_eq!(store.task_paths().unwrap(), vec![":app:compile"]);
}

#[test]
fn test_memory_store_operations() {
    exercise_store(&MemoryHistoryStore::new());
}

#[test]
fn test_file_store_operations() {
    let dir = TempDir::new().unwrap();
    exercise_store(&FileHistoryStore::new(dir.path().join("history")));
}

#[test]
fn test_file_store_survives_reopening() {
    let dir = TempDir::new().unwrap();
    let compile = record(":app:compile", ExecutionOutcome::Executed);

    FileHistoryStore::new(dir.path()).store(&compile).unwrap();

    let reopened = FileHistoryStore::new(dir.path());
    assert_eq!(reopened.load(":app:compile").unwrap(), Some(compile));
}

#[test]
fn test_missing_directory_reads_as_empty() {
    let dir = TempDir::new().unwrap();
    let store = FileHistoryStore::new(dir.path().join("never-created"));

    assert_eq!(store.load(":a").unwrap(), None);
    assert!(store.task_paths().unwrap().is_empty());
    assert_eq!(store.prune(&[]).unwrap(), 0);
}

#[test]
fn test_corrupt_record_reads_as_absent_and_is_pruned() {
    let dir = TempDir::new().unwrap();
    let store = FileHistoryStore::new(dir.path());
    store.store(&record(":app:compile", ExecutionOutcome::Executed)).unwrap();

    let files: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    fs::write(&files[0], b"\xff\x00 not cbor").unwrap();

    assert_eq!(store.load(":app:compile").unwrap(), None);
    assert!(store.task_paths().unwrap().is_empty());
    assert_eq!(store.prune(&[":app:compile"]).unwrap(), 1);
}

#[test]
fn test_records_with_other_versions_are_ignored() {
    let dir = TempDir::new().unwrap();
    let store = FileHistoryStore::new(dir.path());

    let mut old = record(":app:compile", ExecutionOutcome::Executed);
    old.version += 1;
    store.store(&old).unwrap();

    assert_eq!(store.load(":app:compile").unwrap(), None);
}

#[test]
fn test_task_paths_with_odd_characters_are_valid_keys() {
    let dir = TempDir::new().unwrap();
    let store = FileHistoryStore::new(dir.path());
    let odd = record(":app:compile/../../etc:passwd", ExecutionOutcome::Executed);
    store.store(&odd).unwrap();

    assert_eq!(store.load(":app:compile/../../etc:passwd").unwrap(), Some(odd));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}
