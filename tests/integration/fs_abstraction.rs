use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln::dag::{PathSensitivity, ValueKind};
use kiln::fs::mock::MockFileSystem;
use kiln::fs::{FileSystem, RealFileSystem};
use kiln::snapshot::hash::compute_file_hash;
use kiln::snapshot::{PathFilter, Snapshotter};
use tempfile::TempDir;

#[test]
fn test_mock_fs_hashing() {
    let fs = MockFileSystem::new();
    fs.add_file("test.txt", b"hello world".to_vec());

    let hash = compute_file_hash(&fs, &PathBuf::from("test.txt")).unwrap();
    // blake3 hash of "hello world"
    assert_eq!(
        hash.to_hex(),
        "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
    );
}

#[test]
fn test_mock_fs_directories_are_implied_by_files() {
    let fs = MockFileSystem::new();
    fs.add_file("root/src/main.rs", b"fn main() {}".to_vec());
    fs.add_file("root/src/lib.rs", b"pub fn lib() {}".to_vec());

    assert!(fs.is_dir(Path::new("root")));
    assert!(fs.is_dir(Path::new("root/src")));
    assert!(fs.is_file(Path::new("root/src/lib.rs")));

    let mut entries = fs.read_dir(Path::new("root/src")).unwrap();
    entries.sort();
    assert_eq!(
        entries,
        vec![PathBuf::from("root/src/lib.rs"), PathBuf::from("root/src/main.rs")]
    );

    fs.remove("root/src/lib.rs");
    assert!(!fs.exists(Path::new("root/src/lib.rs")));
    assert_eq!(fs.read_dir(Path::new("root/src")).unwrap().len(), 1);
}

#[test]
fn test_real_and_mock_trees_hash_identically() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("tree/nested")).unwrap();
    std::fs::write(dir.path().join("tree/a.txt"), "alpha").unwrap();
    std::fs::write(dir.path().join("tree/nested/b.txt"), "beta").unwrap();

    let mock = MockFileSystem::new();
    mock.add_file("/virtual/tree/a.txt", b"alpha".to_vec());
    mock.add_file("/virtual/tree/nested/b.txt", b"beta".to_vec());

    let snapshot = |fs: Arc<dyn FileSystem>, root: &Path| {
        Snapshotter::new(fs)
            .snapshot_path(
                root,
                ValueKind::FileTree,
                PathSensitivity::Relative,
                &PathFilter::new(),
                false,
            )
            .unwrap()
    };

    let real = snapshot(Arc::new(RealFileSystem), &dir.path().join("tree"));
    let fake = snapshot(Arc::new(mock), Path::new("/virtual/tree"));
    assert_eq!(real.hash(), fake.hash());
    assert_eq!(real.file_count(), 2);
}

#[test]
fn test_real_fs_reports_missing_paths() {
    let dir = TempDir::new().unwrap();
    let fs = RealFileSystem;
    let missing = dir.path().join("nope.txt");

    assert!(!fs.exists(&missing));
    assert!(fs.open_read(&missing).is_err());
    assert!(compute_file_hash(&fs, &missing).is_err());
}
