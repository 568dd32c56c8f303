//! Daemon lifecycle specs
//!
//! Verify PID discipline, the --restart takeover protocol, and clean
//! shutdown behaviour. Run-to-completion invocations of the binary go
//! through `assert_cmd`; long-running daemons use the harness.

use crate::prelude::*;
use assert_cmd::Command;

/// An `assert_cmd` command for the daemon, pointed at `config_dir`.
fn daemon_cmd(config_dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(daemon_binary());
    cmd.env("FOLDER_MCP_USER_CONFIG_DIR", config_dir);
    cmd
}

#[tokio::test]
async fn daemon_start_writes_pid_and_port_files() {
    let daemon = Daemon::start().await;

    let pid: u32 = std::fs::read_to_string(daemon.pid_path()).unwrap().trim().parse().unwrap();
    assert_eq!(pid, daemon.pid());
    assert!(daemon.port > 0);
}

#[tokio::test]
async fn second_daemon_without_restart_refuses_to_start() {
    let daemon = Daemon::start().await;

    let assert = daemon_cmd(daemon.config_dir.path()).assert().failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("already running"), "stderr was: {stderr}");

    // The running daemon keeps its PID file
    let pid: u32 = std::fs::read_to_string(daemon.pid_path()).unwrap().trim().parse().unwrap();
    assert_eq!(pid, daemon.pid());
}

#[tokio::test]
async fn restart_flag_takes_over_from_live_daemon() {
    let first = Daemon::start().await;
    let first_pid = first.pid();
    // Leave the first daemon running; --restart must stop it
    let config_dir = first.detach();

    let second = Daemon::start_in(config_dir, true).await;
    assert_ne!(second.pid(), first_pid);

    let pid: u32 = std::fs::read_to_string(second.pid_path()).unwrap().trim().parse().unwrap();
    assert_eq!(pid, second.pid());

    // The new daemon owns the control channel
    let (mut write, mut read) = second.connect().await;
    send(&mut write, serde_json::json!({"id": "r1", "type": "get_server_info"})).await;
    let reply = next_reply(&mut read).await;
    assert_eq!(reply["daemonPid"], second.pid());
}

#[tokio::test]
async fn sigterm_shuts_down_cleanly_and_removes_pid_file() {
    let mut daemon = Daemon::start().await;
    let pid_path = daemon.pid_path();
    let port_path = daemon.config_dir.path().join("daemon.port");

    let code = daemon.terminate().expect("daemon should exit");
    assert_eq!(code, 0, "clean shutdown exits 0");
    assert!(!pid_path.exists(), "PID file removed on clean shutdown");
    assert!(!port_path.exists(), "port file removed on clean shutdown");
}

#[tokio::test]
async fn version_flag_prints_and_exits_zero() {
    let assert = Command::new(daemon_binary()).arg("--version").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.starts_with("folder-mcpd "), "stdout was: {stdout}");
}

#[tokio::test]
async fn unexpected_argument_fails() {
    Command::new(daemon_binary()).arg("--bogus").assert().failure();
}
