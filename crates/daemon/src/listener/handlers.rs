// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request handlers for the control channel.

use crate::protocol::{ControlRequest, ControlResponse, FolderInfo, HardwareInfo, ServerInfo};
use fmcp_core::FolderConfigEntry;
use fmcp_engine::MonitoredFolders;
use fmcp_storage::FoldersConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Shared daemon context for all request handlers.
pub struct ListenCtx {
    pub orchestrator: Arc<MonitoredFolders>,
    pub fmdm: fmcp_engine::FmdmService,
    /// Persisted folders list location (`folders.json`).
    pub folders_path: PathBuf,
    pub start_time: Instant,
}

/// Handle a single request and produce its reply.
pub(crate) async fn handle_request(request: ControlRequest, ctx: &ListenCtx) -> ControlResponse {
    match request {
        ControlRequest::FolderAdd { id, payload } => {
            match ctx.orchestrator.add_folder(&payload.path, &payload.model).await {
                Ok(()) => {
                    persist_add(ctx, &payload.path, &payload.model);
                    ControlResponse::FolderAdd { id, ok: true }
                }
                Err(e) => ControlResponse::Error { id, error: e.to_string() },
            }
        }

        ControlRequest::FolderRemove { id, payload } => {
            match ctx.orchestrator.remove_folder(&payload.path).await {
                Ok(()) => {
                    persist_remove(ctx, &payload.path);
                    ControlResponse::FolderRemove { id, ok: true }
                }
                Err(e) => ControlResponse::Error { id, error: e.to_string() },
            }
        }

        // Deliberately reads from disk, not from the FMDM: a freshly
        // started daemon can answer before any in-memory state exists.
        ControlRequest::GetFoldersConfig { id } => {
            match FoldersConfig::load(&ctx.folders_path) {
                Ok(config) => {
                    ControlResponse::GetFoldersConfig { id, folders: config.folders }
                }
                Err(e) => ControlResponse::Error { id, error: e.to_string() },
            }
        }

        ControlRequest::GetServerInfo { id } => ControlResponse::GetServerInfo {
            id,
            info: Box::new(server_info(ctx)),
        },

        ControlRequest::GetFolderInfo { id, payload } => match folder_info(ctx, &payload.path).await {
            Some(info) => ControlResponse::GetFolderInfo { id, info: Box::new(info) },
            None => ControlResponse::Error { id, error: "Folder not found".to_string() },
        }
    }
}

fn server_info(ctx: &ListenCtx) -> ServerInfo {
    ServerInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        platform: std::env::consts::OS.to_string(),
        runtime: "tokio".to_string(),
        daemon_pid: std::process::id(),
        daemon_uptime_sec: ctx.start_time.elapsed().as_secs(),
        hardware: HardwareInfo {
            gpu: None,
            cpu_cores: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            ram_gb: total_ram_gb(),
        },
    }
}

async fn folder_info(ctx: &ListenCtx, path: &Path) -> Option<FolderInfo> {
    let descriptor = ctx.fmdm.get().folder(path)?.clone();
    let snapshot = ctx.orchestrator.folder_snapshot(path).await.ok()?;
    Some(FolderInfo { folder: descriptor, tasks: snapshot.tasks })
}

/// Persist an accepted folder into `folders.json`.
fn persist_add(ctx: &ListenCtx, path: &Path, model: &str) {
    let mut config = match FoldersConfig::load(&ctx.folders_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "folders list unreadable, rewriting from scratch");
            FoldersConfig::default()
        }
    };
    config.upsert(FolderConfigEntry {
        path: path.to_path_buf(),
        model: model.to_string(),
        enabled: true,
    });
    if let Err(e) = config.save(&ctx.folders_path) {
        warn!(error = %e, "failed to persist folders list");
    }
}

fn persist_remove(ctx: &ListenCtx, path: &Path) {
    let mut config = match FoldersConfig::load(&ctx.folders_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "folders list unreadable during remove");
            return;
        }
    };
    if config.remove(path) {
        if let Err(e) = config.save(&ctx.folders_path) {
            warn!(error = %e, "failed to persist folders list");
        }
    }
}

/// Total RAM in GB from /proc/meminfo; 0 where unavailable.
fn total_ram_gb() -> u64 {
    let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") else { return 0 };
    meminfo
        .lines()
        .find(|l| l.starts_with("MemTotal:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb / (1024 * 1024))
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
