// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup: PID takeover, lock acquisition, engine wiring.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fmcp_adapters::{Embedder, HashEmbedder, JsonlVectorStore, LocalFileSystem, ParagraphChunker};
use fmcp_engine::{FmdmService, MonitoredFolders, OrchestratorConfig, OrchestratorDeps};
use fmcp_storage::{FoldersConfig, Settings};
use fs2::FileExt;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::{Config, DaemonState, LifecycleError};

/// Bounded wait for a running daemon to exit after SIGTERM.
const TAKEOVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of daemon startup: state plus the bound control listener,
/// returned separately so the caller spawns the listener task itself.
pub struct StartupResult {
    pub daemon: DaemonState,
    pub listener: TcpListener,
}

/// Start the daemon.
///
/// With `restart`, a live prior instance is asked to exit (SIGTERM, then
/// SIGKILL after [`TAKEOVER_TIMEOUT`]); without it, a live instance is a
/// fatal "already running" error.
pub async fn startup(config: &Config, restart: bool) -> Result<StartupResult, LifecycleError> {
    match startup_inner(config, restart).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // Keep the files of a still-running daemon intact.
            if !matches!(
                e,
                LifecycleError::LockFailed(_) | LifecycleError::AlreadyRunning { .. }
            ) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config, restart: bool) -> Result<StartupResult, LifecycleError> {
    // 1. Config directory must exist before lock and port files
    std::fs::create_dir_all(&config.config_dir)?;

    // 2. Deal with a prior instance before touching its lock
    take_over_running_daemon(config, restart).await?;

    // 3. Acquire the PID lock. Open without truncating so a lost race
    // cannot wipe the winner's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.pid_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // 4. Load settings and the persisted folders list. An unreadable
    // folders list is fatal: silently dropping folders is worse.
    let settings = Settings::load(&config.settings_path)?;
    let folders_config = FoldersConfig::load(&config.folders_path)?;

    // 5. Wire capabilities and the engine
    let embedder = Arc::new(HashEmbedder::with_catalog(settings.models.clone()));
    let fmdm = FmdmService::new(std::process::id());
    fmdm.set_available_models(embedder.models());

    let orchestrator_config = OrchestratorConfig {
        max_concurrent_files: settings.onnx.max_concurrent_files,
        max_attempts: 3,
        max_consecutive_errors: settings.max_consecutive_errors,
        debounce: crate::env::file_change_debounce()
            .unwrap_or(fmcp_adapters::watch::DEFAULT_DEBOUNCE),
        scan_filters: Default::default(),
    };
    let orchestrator = MonitoredFolders::new(
        orchestrator_config,
        OrchestratorDeps {
            fs: Arc::new(LocalFileSystem::new()),
            chunker: Arc::new(ParagraphChunker::default()),
            embedder,
            store: Arc::new(JsonlVectorStore::new()),
            fmdm: fmdm.clone(),
        },
    );

    // 6. Bind the control channel LAST, once all validation has passed.
    // Configured port N means socket on N+1; 0 binds an ephemeral port.
    let bind_port = match settings.port {
        0 => 0,
        port => port + 1,
    };
    let listener = TcpListener::bind(("127.0.0.1", bind_port))
        .await
        .map_err(|e| LifecycleError::BindFailed(bind_port, e))?;
    let bound_port = listener.local_addr().map(|a| a.port()).unwrap_or(bind_port);

    // Publish the bound port so local clients can discover ephemeral binds
    std::fs::write(&config.port_path, format!("{bound_port}\n"))?;

    // 7. Restore persisted folders; sidecar state makes re-scans cheap
    // (unchanged files take the skip path, no re-embedding).
    for entry in folders_config.folders.iter().filter(|f| f.enabled) {
        match orchestrator.add_folder(&entry.path, &entry.model).await {
            Ok(()) => info!(folder = %entry.path.display(), "restored folder"),
            Err(e) => {
                warn!(folder = %entry.path.display(), error = %e, "failed to restore folder")
            }
        }
    }

    info!(port = bound_port, "daemon started");

    Ok(StartupResult {
        daemon: DaemonState {
            config: config.clone(),
            lock_file,
            settings,
            orchestrator,
            fmdm,
            start_time: Instant::now(),
        },
        listener,
    })
}

/// Read the PID file; `None` when absent or unparseable.
fn read_pid(config: &Config) -> Option<i32> {
    std::fs::read_to_string(&config.pid_path).ok()?.trim().parse().ok()
}

fn pid_alive(pid: i32) -> bool {
    // EPERM still means the process exists, just owned by someone else
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Enforce the single-instance restart protocol (see module docs).
async fn take_over_running_daemon(config: &Config, restart: bool) -> Result<(), LifecycleError> {
    let Some(pid) = read_pid(config) else { return Ok(()) };
    if pid == std::process::id() as i32 || !pid_alive(pid) {
        // Stale PID file; the lock acquisition below overwrites it
        return Ok(());
    }

    if !restart {
        return Err(LifecycleError::AlreadyRunning { pid });
    }

    info!(pid, "asking running daemon to exit");
    let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);

    let deadline = Instant::now() + TAKEOVER_TIMEOUT;
    while Instant::now() < deadline {
        if !pid_alive(pid) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    warn!(pid, "daemon ignored SIGTERM, killing");
    let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);

    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        if !pid_alive(pid) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    Err(LifecycleError::TakeoverFailed { pid, message: "survived SIGKILL".to_string() })
}

/// Clean up resources on startup failure.
fn cleanup_on_failure(config: &Config) {
    for path in [&config.port_path, &config.pid_path] {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
