// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

fn fp(hash: &str) -> Fingerprint {
    Fingerprint::new(hash, 5, 1_000)
}

#[test]
fn open_initialises_empty_index_in_sidecar() {
    let dir = TempDir::new().unwrap();
    let index = FingerprintIndex::open(dir.path()).unwrap();

    assert!(index.is_open());
    assert!(!index.was_rebuilt());
    assert!(index.get_all().is_empty());
    assert!(dir.path().join(".folder-mcp/fingerprints.json").exists());
}

#[test]
fn upsert_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let mut index = FingerprintIndex::open(dir.path()).unwrap();
        index.upsert(PathBuf::from("a.txt"), fp("h1")).unwrap();
        index.upsert(PathBuf::from("sub/b.md"), fp("h2")).unwrap();
    }

    let index = FingerprintIndex::open(dir.path()).unwrap();
    assert_eq!(index.get(Path::new("a.txt")).map(|f| f.content_hash.as_str()), Some("h1"));
    assert_eq!(index.get(Path::new("sub/b.md")).map(|f| f.content_hash.as_str()), Some("h2"));
    assert_eq!(index.get_all().len(), 2);
}

#[test]
fn upsert_replaces_existing_fingerprint() {
    let dir = TempDir::new().unwrap();
    let mut index = FingerprintIndex::open(dir.path()).unwrap();
    index.upsert(PathBuf::from("a.txt"), fp("h1")).unwrap();
    index.upsert(PathBuf::from("a.txt"), fp("h2")).unwrap();

    assert_eq!(index.get_all().len(), 1);
    assert_eq!(index.get(Path::new("a.txt")).map(|f| f.content_hash.as_str()), Some("h2"));
}

#[test]
fn remove_deletes_and_tolerates_absent_paths() {
    let dir = TempDir::new().unwrap();
    let mut index = FingerprintIndex::open(dir.path()).unwrap();
    index.upsert(PathBuf::from("a.txt"), fp("h1")).unwrap();

    index.remove(Path::new("a.txt")).unwrap();
    assert!(index.get(Path::new("a.txt")).is_none());

    // Removing again is a no-op
    index.remove(Path::new("a.txt")).unwrap();
}

#[test]
fn corrupt_index_is_rotated_and_rebuilt_empty() {
    let dir = TempDir::new().unwrap();
    {
        let mut index = FingerprintIndex::open(dir.path()).unwrap();
        index.upsert(PathBuf::from("a.txt"), fp("h1")).unwrap();
    }

    // Plant non-store bytes at the expected location
    let index_path = dir.path().join(".folder-mcp/fingerprints.json");
    fs::write(&index_path, b"this is not an index").unwrap();

    let index = FingerprintIndex::open(dir.path()).unwrap();
    assert!(index.was_rebuilt());
    assert!(index.get_all().is_empty());
    assert!(dir.path().join(".folder-mcp/fingerprints.bak").exists());

    // The replacement file is a valid, freshly initialised store
    let bytes = fs::read(&index_path).unwrap();
    assert!(serde_json::from_slice::<serde_json::Value>(&bytes).is_ok());
}

#[test]
fn closed_index_rejects_mutations() {
    let dir = TempDir::new().unwrap();
    let mut index = FingerprintIndex::open(dir.path()).unwrap();
    index.close();

    assert!(!index.is_open());
    assert!(matches!(
        index.upsert(PathBuf::from("a.txt"), fp("h1")),
        Err(IndexError::Closed)
    ));
}

#[test]
fn listing_order_is_insertion_order() {
    let dir = TempDir::new().unwrap();
    let mut index = FingerprintIndex::open(dir.path()).unwrap();
    index.upsert(PathBuf::from("z.txt"), fp("h1")).unwrap();
    index.upsert(PathBuf::from("a.txt"), fp("h2")).unwrap();

    let keys: Vec<_> = index.get_all().keys().cloned().collect();
    assert_eq!(keys, vec![PathBuf::from("z.txt"), PathBuf::from("a.txt")]);
}
