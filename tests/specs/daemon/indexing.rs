//! Indexing specs
//!
//! End-to-end: add a folder over the control channel, watch FMDM pushes
//! carry it to `active`, and verify the sidecar store and fingerprints.

use crate::prelude::*;
use tempfile::TempDir;

fn seed_three_files(docs: &TempDir) {
    std::fs::write(docs.path().join("x.txt"), "alpha").unwrap();
    std::fs::write(docs.path().join("y.md"), "# B").unwrap();
    std::fs::write(docs.path().join("z.txt"), "gamma").unwrap();
}

#[tokio::test]
async fn new_folder_with_three_files_indexes_to_active() {
    let docs = TempDir::new().unwrap();
    seed_three_files(&docs);
    let daemon = Daemon::start().await;
    let (mut write, mut read) = daemon.connect().await;

    add_folder(&mut write, &mut read, docs.path()).await;
    let sequence = wait_until_active(&mut read, docs.path()).await;

    // scanning → … → active, in order; ready and indexing appear between
    assert_eq!(sequence.first().map(String::as_str), Some("scanning"), "saw {sequence:?}");
    assert_eq!(sequence.last().map(String::as_str), Some("active"));
    let ready_pos = sequence.iter().position(|s| s == "ready");
    let indexing_pos = sequence.iter().position(|s| s == "indexing");
    assert!(ready_pos.is_some(), "no ready in {sequence:?}");
    assert!(indexing_pos.is_some(), "no indexing in {sequence:?}");
    assert!(ready_pos < indexing_pos);

    // The store holds exactly 3 document entries
    let documents = store_documents(docs.path());
    assert_eq!(documents.len(), 3);
    let mut paths: Vec<&str> =
        documents.iter().map(|d| d["path"].as_str().unwrap()).collect();
    paths.sort_unstable();
    assert_eq!(paths, vec!["x.txt", "y.md", "z.txt"]);

    // Fingerprint index and store agree on every (path, hash) pair
    let fps = fingerprints(docs.path());
    for doc in &documents {
        let path = doc["path"].as_str().unwrap();
        assert_eq!(
            fps[path]["contentHash"], doc["contentHash"],
            "fingerprint/store divergence for {path}"
        );
    }
}

#[tokio::test]
async fn ready_reports_total_tasks_before_indexing() {
    let docs = TempDir::new().unwrap();
    seed_three_files(&docs);
    let daemon = Daemon::start().await;
    let (mut write, mut read) = daemon.connect().await;

    add_folder(&mut write, &mut read, docs.path()).await;

    // Scan the push stream manually for the ready snapshot
    let deadline = tokio::time::Instant::now() + SPEC_WAIT;
    loop {
        let push = tokio::time::timeout_at(deadline, next_push(&mut read))
            .await
            .expect("never saw ready");
        let folders = push["fmdm"]["folders"].as_array().unwrap();
        let Some(entry) =
            folders.iter().find(|f| f["path"] == docs.path().to_str().unwrap())
        else {
            continue;
        };
        match entry["status"].as_str().unwrap() {
            "ready" if entry["progress"]["totalTasks"] == 3 => {
                assert_eq!(entry["progress"]["percentage"], 0);
                break;
            }
            "active" => panic!("skipped ready with 3 pending tasks"),
            _ => {}
        }
    }
}

#[tokio::test]
async fn modifying_one_file_reindexes_just_that_file() {
    let docs = TempDir::new().unwrap();
    seed_three_files(&docs);
    let daemon = Daemon::start().await;
    let (mut write, mut read) = daemon.connect().await;

    add_folder(&mut write, &mut read, docs.path()).await;
    wait_until_active(&mut read, docs.path()).await;
    let hash_before = fingerprints(docs.path())["y.md"]["contentHash"].clone();

    // Overwrite while the watcher is live
    std::fs::write(docs.path().join("y.md"), "# B2").unwrap();

    let sequence = wait_until_active(&mut read, docs.path()).await;
    assert_eq!(sequence.first().map(String::as_str), Some("scanning"), "saw {sequence:?}");

    let documents = store_documents(docs.path());
    assert_eq!(documents.len(), 3, "still exactly 3 documents");

    let fps = fingerprints(docs.path());
    assert_ne!(fps["y.md"]["contentHash"], hash_before, "y.md was re-fingerprinted");
    let stored = documents.iter().find(|d| d["path"] == "y.md").unwrap();
    assert_eq!(stored["contentHash"], fps["y.md"]["contentHash"]);
    assert_eq!(stored["chunks"][0]["text"], "# B2");
}

#[tokio::test]
async fn deleting_one_file_removes_its_document() {
    let docs = TempDir::new().unwrap();
    seed_three_files(&docs);
    let daemon = Daemon::start().await;
    let (mut write, mut read) = daemon.connect().await;

    add_folder(&mut write, &mut read, docs.path()).await;
    wait_until_active(&mut read, docs.path()).await;

    std::fs::remove_file(docs.path().join("z.txt")).unwrap();

    wait_until_active(&mut read, docs.path()).await;
    wait_for(|| store_documents(docs.path()).len() == 2, "store to drop to 2 documents").await;

    let fps = fingerprints(docs.path());
    assert!(fps.get("z.txt").is_none(), "fingerprint for z.txt removed");
    assert!(fps.get("x.txt").is_some());
    assert!(fps.get("y.md").is_some());
}

#[tokio::test]
async fn adding_the_same_folder_twice_does_not_double_process() {
    let docs = TempDir::new().unwrap();
    seed_three_files(&docs);
    let daemon = Daemon::start().await;
    let (mut write, mut read) = daemon.connect().await;

    add_folder(&mut write, &mut read, docs.path()).await;
    wait_until_active(&mut read, docs.path()).await;

    // Second add acks without spawning a second lifecycle
    add_folder(&mut write, &mut read, docs.path()).await;

    send(&mut write, serde_json::json!({"id": "q1", "type": "getFoldersConfig"})).await;
    let reply = next_reply(&mut read).await;
    assert_eq!(reply["folders"].as_array().unwrap().len(), 1);
    assert_eq!(store_documents(docs.path()).len(), 3);
}

#[tokio::test]
async fn get_folder_info_exposes_live_tasks() {
    let docs = TempDir::new().unwrap();
    seed_three_files(&docs);
    let daemon = Daemon::start().await;
    let (mut write, mut read) = daemon.connect().await;

    add_folder(&mut write, &mut read, docs.path()).await;
    wait_until_active(&mut read, docs.path()).await;

    send(
        &mut write,
        serde_json::json!({
            "id": "info-1",
            "type": "get_folder_info",
            "payload": { "path": docs.path() },
        }),
    )
    .await;
    let reply = next_reply(&mut read).await;
    assert_eq!(reply["type"], "get_folder_infoResponse");
    assert_eq!(reply["folder"]["status"], "active");
    assert_eq!(reply["tasks"].as_array().unwrap().len(), 3);
    assert!(reply["tasks"].as_array().unwrap().iter().all(|t| t["status"] == "done"));
}
