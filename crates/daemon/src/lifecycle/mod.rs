// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, restart takeover, shutdown.

mod startup;
pub use startup::{startup, StartupResult};

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use fmcp_engine::{FmdmService, MonitoredFolders};
use fmcp_storage::{ConfigError, FoldersConfig, Settings};
use thiserror::Error;
use tracing::{info, warn};

/// Daemon configuration: fixed paths under the user config directory.
#[derive(Debug, Clone)]
pub struct Config {
    /// User config directory (honours `FOLDER_MCP_USER_CONFIG_DIR`).
    pub config_dir: PathBuf,
    /// PID/lock file
    pub pid_path: PathBuf,
    /// Bound control-channel port, written after bind
    pub port_path: PathBuf,
    /// Daemon log file
    pub log_path: PathBuf,
    /// Persisted folders list
    pub folders_path: PathBuf,
    /// Optional settings
    pub settings_path: PathBuf,
}

impl Config {
    /// Load configuration for the user-level daemon.
    pub fn load() -> Result<Self, LifecycleError> {
        let config_dir = crate::env::user_config_dir()?;
        Ok(Self {
            pid_path: config_dir.join("daemon.pid"),
            port_path: config_dir.join("daemon.port"),
            log_path: config_dir.join("daemon.log"),
            folders_path: config_dir.join("folders.json"),
            settings_path: config_dir.join("config.json"),
            config_dir,
        })
    }
}

/// Daemon state during operation.
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): held to maintain the exclusive PID-file lock;
    // released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub settings: Settings,
    pub orchestrator: Arc<MonitoredFolders>,
    pub fmdm: FmdmService,
    pub start_time: Instant,
}

impl DaemonState {
    /// Reload the persisted folders list (SIGHUP): add newly configured
    /// folders, drop folders no longer configured.
    pub async fn reload_folders(&self) {
        let config = match FoldersConfig::load(&self.config.folders_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "folders reload failed, keeping current set");
                return;
            }
        };

        for entry in config.folders.iter().filter(|f| f.enabled) {
            if !self.orchestrator.contains(&entry.path) {
                if let Err(e) = self.orchestrator.add_folder(&entry.path, &entry.model).await {
                    warn!(folder = %entry.path.display(), error = %e, "reload: add failed");
                }
            }
        }
        for (path, _) in self.orchestrator.list() {
            let still_configured = config.folders.iter().any(|f| f.path == path && f.enabled);
            if !still_configured {
                if let Err(e) = self.orchestrator.remove_folder(&path).await {
                    warn!(folder = %path.display(), error = %e, "reload: remove failed");
                }
            }
        }
        info!("folders configuration reloaded");
    }

    /// Shutdown the daemon gracefully.
    ///
    /// Every lifecycle service is stopped (in-flight tasks drain to a safe
    /// checkpoint) before the PID and port files are removed.
    pub async fn shutdown(&mut self) {
        info!("shutting down daemon...");

        self.orchestrator.stop_all().await;

        for path in [&self.config.port_path, &self.config.pid_path] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "failed to remove file");
                }
            }
        }

        // Lock file handle is released when self.lock_file drops
        info!("daemon shutdown complete");
    }
}

/// Lifecycle errors. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine user config directory")]
    NoConfigDir,

    #[error("Daemon already running (pid {pid}); use --restart to take over")]
    AlreadyRunning { pid: i32 },

    #[error("Failed to acquire PID lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind control channel on port {0}: {1}")]
    BindFailed(u16, std::io::Error),

    #[error("Running daemon (pid {pid}) did not exit: {message}")]
    TakeoverFailed { pid: i32, message: String },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] fmcp_core::CoreError),
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
