// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fmcp_adapters::{HashEmbedder, JsonlVectorStore, LocalFileSystem, ParagraphChunker};
use fmcp_core::FolderStatus;
use std::time::Duration;
use tempfile::TempDir;

const MODEL: &str = "all-minilm-l6";
const WAIT: Duration = Duration::from_secs(15);

fn orchestrator() -> (Arc<MonitoredFolders>, FmdmService) {
    let fmdm = FmdmService::new(std::process::id());
    let deps = OrchestratorDeps {
        fs: Arc::new(LocalFileSystem::new()),
        chunker: Arc::new(ParagraphChunker::default()),
        embedder: Arc::new(HashEmbedder::new()),
        store: Arc::new(JsonlVectorStore::new()),
        fmdm: fmdm.clone(),
    };
    let config = OrchestratorConfig {
        debounce: Duration::from_millis(50),
        ..OrchestratorConfig::default()
    };
    (MonitoredFolders::new(config, deps), fmdm)
}

async fn wait_for_folder_status(fmdm: &FmdmService, path: &Path, status: FolderStatus) {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let snapshot = fmdm.get();
        if snapshot.folder(path).is_some_and(|f| f.status == status) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {status} on {}: {snapshot:?}",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn added_folder_appears_in_fmdm_and_reaches_active() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
    let (orchestrator, fmdm) = orchestrator();

    orchestrator.add_folder(dir.path(), MODEL).await.unwrap();
    assert!(orchestrator.contains(dir.path()));
    assert!(dir.path().join(".folder-mcp").is_dir());

    wait_for_folder_status(&fmdm, dir.path(), FolderStatus::Active).await;
    let folder = fmdm.get();
    let folder = folder.folder(dir.path()).unwrap();
    assert_eq!(folder.progress.percentage, 100);
    assert_eq!(folder.model, MODEL);

    orchestrator.stop_all().await;
}

#[tokio::test]
async fn adding_same_folder_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
    let (orchestrator, fmdm) = orchestrator();

    orchestrator.add_folder(dir.path(), MODEL).await.unwrap();
    orchestrator.add_folder(dir.path(), MODEL).await.unwrap();

    wait_for_folder_status(&fmdm, dir.path(), FolderStatus::Active).await;
    assert_eq!(fmdm.get().folders.len(), 1);
    assert_eq!(orchestrator.list().len(), 1);

    orchestrator.stop_all().await;
}

#[tokio::test]
async fn adding_a_missing_path_is_a_validation_error() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, _fmdm) = orchestrator();

    let err = orchestrator
        .add_folder(&dir.path().join("does-not-exist"), MODEL)
        .await
        .unwrap_err();
    assert_eq!(err.kind, fmcp_core::ErrorKind::Validation);

    orchestrator.stop_all().await;
}

#[tokio::test]
async fn remove_folder_stops_lifecycle_and_keeps_sidecar() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
    let (orchestrator, fmdm) = orchestrator();

    orchestrator.add_folder(dir.path(), MODEL).await.unwrap();
    wait_for_folder_status(&fmdm, dir.path(), FolderStatus::Active).await;

    orchestrator.remove_folder(dir.path()).await.unwrap();
    assert!(!orchestrator.contains(dir.path()));
    assert!(fmdm.get().folder(dir.path()).is_none());
    // Sidecar stays for restart idempotence
    assert!(dir.path().join(".folder-mcp/fingerprints.json").exists());

    // Removing again reports Folder not found
    let err = orchestrator.remove_folder(dir.path()).await.unwrap_err();
    assert_eq!(err.kind, fmcp_core::ErrorKind::Validation);
}

#[tokio::test]
async fn folder_errors_are_isolated() {
    let good = TempDir::new().unwrap();
    std::fs::write(good.path().join("a.txt"), "alpha").unwrap();
    let bad = TempDir::new().unwrap();
    std::fs::write(bad.path().join("b.txt"), "beta").unwrap();
    let (orchestrator, fmdm) = orchestrator();

    orchestrator.add_folder(bad.path(), "no-such-model").await.unwrap();
    orchestrator.add_folder(good.path(), MODEL).await.unwrap();

    wait_for_folder_status(&fmdm, bad.path(), FolderStatus::Error).await;
    wait_for_folder_status(&fmdm, good.path(), FolderStatus::Active).await;

    let snapshot = fmdm.get();
    assert!(snapshot
        .folder(bad.path())
        .unwrap()
        .last_error
        .as_deref()
        .unwrap_or("")
        .contains("no-such-model"));
    assert!(snapshot.folder(good.path()).unwrap().last_error.is_none());

    orchestrator.stop_all().await;
}

#[tokio::test]
async fn live_file_change_triggers_targeted_reindex() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
    let (orchestrator, fmdm) = orchestrator();

    orchestrator.add_folder(dir.path(), MODEL).await.unwrap();
    wait_for_folder_status(&fmdm, dir.path(), FolderStatus::Active).await;
    let version_at_active = fmdm.get().version;

    // Touch the file; the watcher should drive scanning → active again
    std::fs::write(dir.path().join("a.txt"), "alpha v2").unwrap();

    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let snapshot = fmdm.get();
        let folder = snapshot.folder(dir.path()).unwrap();
        if snapshot.version > version_at_active && folder.status == FolderStatus::Active {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for watcher-driven reindex: {snapshot:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let store = JsonlVectorStore::new();
    let fps = store.list_fingerprints(dir.path()).await.unwrap();
    let expected = {
        use fmcp_adapters::FileSystem as _;
        LocalFileSystem::new().hash_content(&dir.path().join("a.txt")).unwrap()
    };
    assert_eq!(fps.get(Path::new("a.txt")), Some(&expected));

    orchestrator.stop_all().await;
}

#[tokio::test]
async fn global_concurrency_respects_configured_cap() {
    // Cap of 1: files are embedded one at a time across both folders.
    // Observable effect: everything still completes correctly.
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    for dir in [&a, &b] {
        for i in 0..3 {
            std::fs::write(dir.path().join(format!("f{i}.txt")), format!("body {i}")).unwrap();
        }
    }

    let fmdm = FmdmService::new(1);
    let deps = OrchestratorDeps {
        fs: Arc::new(LocalFileSystem::new()),
        chunker: Arc::new(ParagraphChunker::default()),
        embedder: Arc::new(HashEmbedder::new()),
        store: Arc::new(JsonlVectorStore::new()),
        fmdm: fmdm.clone(),
    };
    let config = OrchestratorConfig {
        max_concurrent_files: 1,
        debounce: Duration::from_millis(50),
        ..OrchestratorConfig::default()
    };
    let orchestrator = MonitoredFolders::new(config, deps);

    orchestrator.add_folder(a.path(), MODEL).await.unwrap();
    orchestrator.add_folder(b.path(), MODEL).await.unwrap();

    wait_for_folder_status(&fmdm, a.path(), FolderStatus::Active).await;
    wait_for_folder_status(&fmdm, b.path(), FolderStatus::Active).await;

    let store = JsonlVectorStore::new();
    assert_eq!(store.list_fingerprints(a.path()).await.unwrap().len(), 3);
    assert_eq!(store.list_fingerprints(b.path()).await.unwrap().len(), 3);

    orchestrator.stop_all().await;
}
