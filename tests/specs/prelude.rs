//! Test helpers for behavioral specifications.
//!
//! Provides a harness that spawns the daemon binary against a throw-away
//! config directory and speaks the control channel over WebSocket.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Fast debounce so watcher specs don't wait the production second.
pub const SPEC_DEBOUNCE_MS: &str = "100";

/// Generous ceiling for anything the daemon does asynchronously.
pub const SPEC_WAIT: Duration = Duration::from_secs(20);

pub const MODEL: &str = "all-minilm-l6";

pub type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, Message>;
pub type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Returns the path to the daemon binary in the workspace target dir.
///
/// Resolves relative to the test binary itself (target/debug/deps/specs-*),
/// falling back to CARGO_MANIFEST_DIR for unusual layouts.
pub fn daemon_binary() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let candidate = debug_dir.join("folder-mcpd");
            if candidate.exists() {
                return candidate;
            }
        }
    }
    Path::new(env!("CARGO_MANIFEST_DIR")).join("target/debug/folder-mcpd")
}

/// A running daemon wired to a throw-away config directory.
pub struct Daemon {
    pub config_dir: TempDir,
    child: Option<Child>,
    pub port: u16,
}

impl Daemon {
    /// Start a fresh daemon with its own config dir and an ephemeral port.
    pub async fn start() -> Self {
        let config_dir = TempDir::new().unwrap();
        std::fs::write(config_dir.path().join("config.json"), br#"{ "port": 0 }"#).unwrap();
        Self::start_in(config_dir, false).await
    }

    /// Start (or restart) a daemon over an existing config directory.
    pub async fn start_in(config_dir: TempDir, restart: bool) -> Self {
        // A stale port file from a prior instance must not be mistaken
        // for the new daemon's bind
        let _ = std::fs::remove_file(config_dir.path().join("daemon.port"));

        let mut command = Command::new(daemon_binary());
        command
            .env("FOLDER_MCP_USER_CONFIG_DIR", config_dir.path())
            .env("FOLDER_MCP_FILE_CHANGE_DEBOUNCE_MS", SPEC_DEBOUNCE_MS)
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if restart {
            command.arg("--restart");
        }
        let child = command.spawn().expect("failed to spawn folder-mcpd");

        let port = wait_for_port_file(config_dir.path()).await;
        Self { config_dir, child: Some(child), port }
    }

    pub fn pid(&self) -> u32 {
        self.child.as_ref().map(|c| c.id()).unwrap_or(0)
    }

    pub fn pid_path(&self) -> PathBuf {
        self.config_dir.path().join("daemon.pid")
    }

    pub fn daemon_log(&self) -> String {
        std::fs::read_to_string(self.config_dir.path().join("daemon.log")).unwrap_or_default()
    }

    /// Connect a control client.
    pub async fn connect(&self) -> (WsWrite, WsRead) {
        let url = format!("ws://127.0.0.1:{}", self.port);
        let deadline = tokio::time::Instant::now() + SPEC_WAIT;
        loop {
            match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok((ws, _)) => return ws.split(),
                Err(e) => {
                    assert!(
                        tokio::time::Instant::now() < deadline,
                        "could not connect to daemon: {e}\n{}",
                        self.daemon_log()
                    );
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            }
        }
    }

    /// SIGKILL, simulating a crash. The config dir survives for restart.
    pub fn kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.child = None;
    }

    /// SIGTERM and wait for a clean exit; returns the exit status code.
    pub fn terminate(&mut self) -> Option<i32> {
        let child = self.child.as_mut()?;
        let pid = child.id();
        let _ = Command::new("kill").args(["-TERM", &pid.to_string()]).status();
        let status = child.wait().ok()?;
        self.child = None;
        status.code()
    }

    /// Tear down into the config dir for a follow-up daemon.
    pub fn into_config_dir(mut self) -> TempDir {
        self.kill();
        // Steal the TempDir without running Drop's kill again
        let placeholder = TempDir::new().unwrap();
        std::mem::replace(&mut self.config_dir, placeholder)
    }

    /// Leave the daemon process running and hand back its config dir.
    ///
    /// A reaper thread waits on the child so the process is promptly
    /// reaped once something (e.g. a `--restart` successor) stops it;
    /// an unreaped zombie would still look alive to liveness checks.
    pub fn detach(mut self) -> TempDir {
        if let Some(mut child) = self.child.take() {
            std::thread::spawn(move || {
                let _ = child.wait();
            });
        }
        let placeholder = TempDir::new().unwrap();
        std::mem::replace(&mut self.config_dir, placeholder)
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn wait_for_port_file(config_dir: &Path) -> u16 {
    let port_path = config_dir.join("daemon.port");
    let deadline = tokio::time::Instant::now() + SPEC_WAIT;
    loop {
        if let Ok(text) = std::fs::read_to_string(&port_path) {
            if let Ok(port) = text.trim().parse::<u16>() {
                return port;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "daemon never wrote its port file; log:\n{}",
            std::fs::read_to_string(config_dir.join("daemon.log")).unwrap_or_default()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Send one control request frame.
pub async fn send(write: &mut WsWrite, value: Value) {
    write.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next reply frame (skipping FMDM pushes).
pub async fn next_reply(read: &mut WsRead) -> Value {
    next_matching(read, |v| v["type"] != "fmdm.update").await
}

/// Next FMDM push frame.
pub async fn next_push(read: &mut WsRead) -> Value {
    next_matching(read, |v| v["type"] == "fmdm.update").await
}

async fn next_matching(read: &mut WsRead, pred: impl Fn(&Value) -> bool) -> Value {
    let deadline = tokio::time::Instant::now() + SPEC_WAIT;
    loop {
        let msg = tokio::time::timeout_at(deadline, read.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .expect("read error");
        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(&text).unwrap();
            if pred(&value) {
                return value;
            }
        }
    }
}

/// Issue `folder.add` and assert the acknowledgement.
pub async fn add_folder(write: &mut WsWrite, read: &mut WsRead, path: &Path) {
    send(
        write,
        json!({
            "id": "add-1",
            "type": "folder.add",
            "payload": { "path": path, "model": MODEL },
        }),
    )
    .await;
    let reply = next_reply(read).await;
    assert_eq!(reply["type"], "folder.addResponse", "unexpected reply: {reply}");
    assert_eq!(reply["ok"], true);
}

/// Watch FMDM pushes until the folder reports `active` at 100%.
/// Returns the status sequence observed for that folder.
pub async fn wait_until_active(read: &mut WsRead, folder: &Path) -> Vec<String> {
    let mut sequence: Vec<String> = Vec::new();
    let deadline = tokio::time::Instant::now() + SPEC_WAIT;
    loop {
        let push = tokio::time::timeout_at(deadline, next_push(read))
            .await
            .unwrap_or_else(|_| panic!("folder never became active; saw {sequence:?}"));
        let folders = push["fmdm"]["folders"].as_array().unwrap().clone();
        let Some(entry) = folders.iter().find(|f| f["path"] == folder.to_str().unwrap()) else {
            continue;
        };
        let status = entry["status"].as_str().unwrap().to_string();
        if sequence.last() != Some(&status) {
            sequence.push(status.clone());
        }
        if status == "active" && entry["progress"]["percentage"] == 100 {
            return sequence;
        }
        if status == "error" {
            panic!("folder errored: {entry}");
        }
    }
}

/// Poll until `check` passes or the deadline hits.
pub async fn wait_for(check: impl Fn() -> bool, what: &str) {
    let deadline = tokio::time::Instant::now() + SPEC_WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Documents currently in a folder's vector store (one JSON line each).
pub fn store_documents(folder: &Path) -> Vec<Value> {
    let path = folder.join(".folder-mcp/vectors.jsonl");
    let Ok(text) = std::fs::read_to_string(path) else { return Vec::new() };
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

/// Fingerprint map from a folder's sidecar index.
pub fn fingerprints(folder: &Path) -> Value {
    let path = folder.join(".folder-mcp/fingerprints.json");
    serde_json::from_str::<Value>(&std::fs::read_to_string(path).unwrap())
        .unwrap()
        .get("files")
        .cloned()
        .unwrap_or(Value::Null)
}
