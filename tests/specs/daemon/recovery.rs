//! Crash-recovery specs
//!
//! A SIGKILLed daemon must rejoin its persisted per-folder state without
//! re-embedding, and planted garbage in a sidecar store must never crash
//! the daemon; the folder recovers to a fully indexed state.

use crate::prelude::*;
use tempfile::TempDir;

fn seed_three_files(docs: &TempDir) {
    std::fs::write(docs.path().join("x.txt"), "alpha").unwrap();
    std::fs::write(docs.path().join("y.md"), "# B").unwrap();
    std::fs::write(docs.path().join("z.txt"), "gamma").unwrap();
}

#[tokio::test]
async fn sigkill_then_restart_rejoins_without_reembedding() {
    let docs = TempDir::new().unwrap();
    seed_three_files(&docs);

    // First daemon: index the folder, then die without any shutdown
    let mut first = Daemon::start().await;
    {
        let (mut write, mut read) = first.connect().await;
        add_folder(&mut write, &mut read, docs.path()).await;
        wait_until_active(&mut read, docs.path()).await;
    }
    first.kill();

    let store_path = docs.path().join(".folder-mcp/vectors.jsonl");
    let store_before = std::fs::read_to_string(&store_path).unwrap();
    let index_before =
        std::fs::read_to_string(docs.path().join(".folder-mcp/fingerprints.json")).unwrap();
    assert!(!store_before.is_empty(), "store persisted before the crash");

    // Successor takes over and restores the folder from folders.json
    let config_dir = first.into_config_dir();
    let second = Daemon::start_in(config_dir, true).await;
    let (mut write, mut read) = second.connect().await;

    // The restored folder reaches active on its own (skip path everywhere)
    send(&mut write, serde_json::json!({"id": "q1", "type": "getFoldersConfig"})).await;
    let reply = next_reply(&mut read).await;
    assert_eq!(reply["folders"].as_array().unwrap().len(), 1);

    wait_for(
        || {
            let docs_list = store_documents(docs.path());
            docs_list.len() == 3
        },
        "restored store listing",
    )
    .await;

    send(
        &mut write,
        serde_json::json!({
            "id": "q2",
            "type": "get_folder_info",
            "payload": { "path": docs.path() },
        }),
    )
    .await;
    let deadline = tokio::time::Instant::now() + SPEC_WAIT;
    let mut reply = next_reply(&mut read).await;
    while reply["folder"]["status"] != "active" {
        assert!(
            tokio::time::Instant::now() < deadline,
            "restored folder never became active: {reply}"
        );
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        send(
            &mut write,
            serde_json::json!({
                "id": "q2",
                "type": "get_folder_info",
                "payload": { "path": docs.path() },
            }),
        )
        .await;
        reply = next_reply(&mut read).await;
    }

    // No re-embedding: sidecar contents are identical to the pre-crash state
    let store_after = std::fs::read_to_string(&store_path).unwrap();
    similar_asserts::assert_eq!(store_before, store_after);
    let index_after =
        std::fs::read_to_string(docs.path().join(".folder-mcp/fingerprints.json")).unwrap();
    similar_asserts::assert_eq!(index_before, index_after);
}

#[tokio::test]
async fn corrupted_store_recovers_to_full_document_set() {
    let docs = TempDir::new().unwrap();
    seed_three_files(&docs);

    // Plant non-store bytes where the store will live
    std::fs::create_dir_all(docs.path().join(".folder-mcp")).unwrap();
    std::fs::write(docs.path().join(".folder-mcp/vectors.jsonl"), b"\x00\x01 definitely not a store")
        .unwrap();
    std::fs::write(docs.path().join(".folder-mcp/fingerprints.json"), b"also not an index")
        .unwrap();

    let daemon = Daemon::start().await;
    let (mut write, mut read) = daemon.connect().await;

    // The daemon must not crash; the folder must reach active fully indexed
    add_folder(&mut write, &mut read, docs.path()).await;
    wait_until_active(&mut read, docs.path()).await;

    let documents = store_documents(docs.path());
    assert_eq!(documents.len(), 3, "store re-embedded from disk");

    let fps = fingerprints(docs.path());
    for doc in &documents {
        let path = doc["path"].as_str().unwrap();
        assert_eq!(fps[path]["contentHash"], doc["contentHash"]);
    }

    // The daemon is still healthy
    send(&mut write, serde_json::json!({"id": "q1", "type": "get_server_info"})).await;
    let reply = next_reply(&mut read).await;
    assert_eq!(reply["type"], "get_server_infoResponse");
}

#[tokio::test]
async fn removed_folder_keeps_sidecar_for_idempotent_readd() {
    let docs = TempDir::new().unwrap();
    seed_three_files(&docs);
    let daemon = Daemon::start().await;
    let (mut write, mut read) = daemon.connect().await;

    add_folder(&mut write, &mut read, docs.path()).await;
    wait_until_active(&mut read, docs.path()).await;
    let store_before =
        std::fs::read_to_string(docs.path().join(".folder-mcp/vectors.jsonl")).unwrap();

    send(
        &mut write,
        serde_json::json!({
            "id": "rm-1",
            "type": "folder.remove",
            "payload": { "path": docs.path() },
        }),
    )
    .await;
    let reply = next_reply(&mut read).await;
    assert_eq!(reply["type"], "folder.removeResponse");
    assert_eq!(reply["ok"], true);

    // Sidecar survives removal, so a re-add is pure skip path
    assert!(docs.path().join(".folder-mcp/vectors.jsonl").exists());

    add_folder(&mut write, &mut read, docs.path()).await;
    wait_until_active(&mut read, docs.path()).await;

    let store_after =
        std::fs::read_to_string(docs.path().join(".folder-mcp/vectors.jsonl")).unwrap();
    similar_asserts::assert_eq!(store_before, store_after);
}
