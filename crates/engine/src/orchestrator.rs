// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monitored-folders orchestrator.
//!
//! Owns the folder → lifecycle map, wires each folder's watcher to its
//! lifecycle service, applies lifecycle updates to the FMDM, and enforces
//! the global embedding concurrency cap via a shared fair semaphore (FIFO
//! permit handout keeps any one folder from starving the rest). Folders
//! fail independently: an error in one never blocks another.

use crate::fmdm_service::FmdmService;
use crate::lifecycle::{
    FolderLifecycleService, FolderSnapshot, LifecycleConfig, LifecycleDeps, LifecycleHandle,
};
use fmcp_adapters::{
    spawn_watcher, Chunker, Embedder, FileSystem, ScanFilters, VectorStore, WatchConfig,
    WatcherHandle,
};
use fmcp_core::{CoreError, FolderDescriptor, LifecycleUpdate, Outcome, WatchEvent, WatchKind};
use fmcp_storage::sidecar_dir;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

/// Orchestrator-wide configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Global cap on in-flight embedding tasks (`onnx.maxConcurrentFiles`).
    pub max_concurrent_files: usize,
    pub max_attempts: u32,
    pub max_consecutive_errors: u32,
    pub debounce: Duration,
    pub scan_filters: ScanFilters,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: 4,
            max_attempts: 3,
            max_consecutive_errors: 5,
            debounce: Duration::from_millis(1000),
            scan_filters: ScanFilters::default(),
        }
    }
}

/// Capabilities shared by every folder lifecycle.
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub fs: Arc<dyn FileSystem>,
    pub chunker: Arc<dyn Chunker>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    pub fmdm: FmdmService,
}

struct FolderEntry {
    handle: Arc<LifecycleHandle>,
    watcher: Option<WatcherHandle>,
    router: Option<tokio::task::JoinHandle<()>>,
    model: String,
}

/// The orchestrator: one per daemon.
pub struct MonitoredFolders {
    config: OrchestratorConfig,
    deps: OrchestratorDeps,
    permits: Arc<Semaphore>,
    folders: Mutex<HashMap<PathBuf, FolderEntry>>,
    updates_tx: mpsc::Sender<LifecycleUpdate>,
}

impl MonitoredFolders {
    /// Build the orchestrator and start the FMDM update applier.
    pub fn new(config: OrchestratorConfig, deps: OrchestratorDeps) -> Arc<Self> {
        let (updates_tx, updates_rx) = mpsc::channel(256);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_files));

        let orchestrator = Arc::new(Self {
            permits,
            folders: Mutex::new(HashMap::new()),
            updates_tx,
            config,
            deps,
        });

        tokio::spawn(apply_updates(updates_rx, orchestrator.deps.fmdm.clone()));
        orchestrator
    }

    /// Add a folder and start its lifecycle and watcher.
    ///
    /// Idempotent: adding a path that is already monitored succeeds without
    /// a second lifecycle or any double processing.
    pub async fn add_folder(&self, path: &Path, model: &str) -> Outcome<()> {
        if self.folders.lock().contains_key(path) {
            info!(folder = %path.display(), "folder already monitored");
            return Ok(());
        }
        if !path.is_dir() {
            return Err(CoreError::validation(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        std::fs::create_dir_all(sidecar_dir(path))
            .map_err(|e| CoreError::transient_io(format!("create sidecar: {e}")))?;

        // Publish the descriptor before the first lifecycle update so
        // clients see the folder from the moment it is accepted. The first
        // broadcast already shows it scanning.
        let mut descriptor = FolderDescriptor::new(path.to_path_buf(), model);
        descriptor.status = fmcp_core::FolderStatus::Scanning;
        let mut folders = self.deps.fmdm.get().folders;
        folders.push(descriptor);
        self.deps.fmdm.update_folders(folders);

        let lifecycle_config = LifecycleConfig {
            folder: path.to_path_buf(),
            model: model.to_string(),
            max_concurrent_files: self.config.max_concurrent_files,
            max_attempts: self.config.max_attempts,
            max_consecutive_errors: self.config.max_consecutive_errors,
            scan_filters: self.config.scan_filters.clone(),
        };
        let lifecycle_deps = LifecycleDeps {
            fs: Arc::clone(&self.deps.fs),
            chunker: Arc::clone(&self.deps.chunker),
            embedder: Arc::clone(&self.deps.embedder),
            store: Arc::clone(&self.deps.store),
            permits: Arc::clone(&self.permits),
            updates: self.updates_tx.clone(),
        };
        let handle = Arc::new(FolderLifecycleService::spawn(lifecycle_config, lifecycle_deps)?);

        // Watcher: live change feed. A folder without a working watcher
        // still indexes on explicit scans.
        let watch_config = WatchConfig {
            debounce: self.config.debounce,
            exclude_dirs: self.config.scan_filters.exclude_dirs.clone(),
        };
        let (watch_tx, watch_rx) = mpsc::channel(256);
        let (watcher, router) = match spawn_watcher(path, watch_config, watch_tx) {
            Ok(watcher) => {
                let router = tokio::spawn(route_watch_events(watch_rx, Arc::clone(&handle)));
                (Some(watcher), Some(router))
            }
            Err(e) => {
                warn!(folder = %path.display(), error = %e, "watcher unavailable, live updates disabled");
                (None, None)
            }
        };

        self.folders.lock().insert(
            path.to_path_buf(),
            FolderEntry { handle: Arc::clone(&handle), watcher, router, model: model.to_string() },
        );

        handle.request_scan().await;
        info!(folder = %path.display(), model, "folder added");
        Ok(())
    }

    /// Stop a folder's lifecycle and watcher. The sidecar is kept so a
    /// re-add (or daemon restart) resumes from persisted state.
    pub async fn remove_folder(&self, path: &Path) -> Outcome<()> {
        let entry = self
            .folders
            .lock()
            .remove(path)
            .ok_or_else(|| CoreError::validation("Folder not found"))?;

        if let Some(watcher) = entry.watcher {
            watcher.stop();
        }
        if let Some(router) = entry.router {
            router.abort();
        }
        entry.handle.stop().await;

        let folders =
            self.deps.fmdm.get().folders.into_iter().filter(|f| f.path != path).collect();
        self.deps.fmdm.update_folders(folders);

        info!(folder = %path.display(), "folder removed");
        Ok(())
    }

    /// Whether a folder is currently monitored.
    pub fn contains(&self, path: &Path) -> bool {
        self.folders.lock().contains_key(path)
    }

    /// Monitored folder paths with their models.
    pub fn list(&self) -> Vec<(PathBuf, String)> {
        self.folders.lock().iter().map(|(p, e)| (p.clone(), e.model.clone())).collect()
    }

    /// Point-in-time snapshot of one folder's lifecycle.
    pub async fn folder_snapshot(&self, path: &Path) -> Outcome<FolderSnapshot> {
        let handle = {
            let folders = self.folders.lock();
            folders
                .get(path)
                .map(|e| Arc::clone(&e.handle))
                .ok_or_else(|| CoreError::validation("Folder not found"))?
        };
        handle.inspect().await.ok_or_else(|| CoreError::validation("Folder not found"))
    }

    /// Request a fresh scan of one folder (recovery from watcher loss).
    pub async fn request_scan(&self, path: &Path) -> Outcome<()> {
        let handle = {
            let folders = self.folders.lock();
            folders
                .get(path)
                .map(|e| Arc::clone(&e.handle))
                .ok_or_else(|| CoreError::validation("Folder not found"))?
        };
        handle.request_scan().await;
        Ok(())
    }

    /// Stop every folder's lifecycle and watcher (daemon shutdown).
    pub async fn stop_all(&self) {
        let entries: Vec<(PathBuf, FolderEntry)> = self.folders.lock().drain().collect();
        for (path, entry) in entries {
            if let Some(watcher) = entry.watcher {
                watcher.stop();
            }
            if let Some(router) = entry.router {
                router.abort();
            }
            entry.handle.stop().await;
            info!(folder = %path.display(), "folder stopped");
        }
    }
}

/// Fold lifecycle updates into the FMDM, one version bump per update.
async fn apply_updates(mut rx: mpsc::Receiver<LifecycleUpdate>, fmdm: FmdmService) {
    while let Some(update) = rx.recv().await {
        fmdm.apply_lifecycle_update(&update);
    }
}

/// Forward debounced watch events to the folder's lifecycle.
///
/// Changes arriving in one flush are batched into a single targeted scan;
/// overflow triggers a full rescan; stream loss fails the folder.
async fn route_watch_events(
    mut rx: mpsc::Receiver<WatchEvent>,
    handle: Arc<LifecycleHandle>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            WatchEvent::Change { path, kind } => {
                let mut batch: Vec<(PathBuf, WatchKind)> = vec![(path, kind)];
                let mut followup = None;
                while let Ok(next) = rx.try_recv() {
                    match next {
                        WatchEvent::Change { path, kind } => batch.push((path, kind)),
                        other => {
                            followup = Some(other);
                            break;
                        }
                    }
                }
                handle.notify_changes(batch).await;
                match followup {
                    Some(WatchEvent::Rescan) => handle.request_rescan().await,
                    Some(WatchEvent::Lost { message }) => {
                        handle.watcher_lost(message).await;
                        break;
                    }
                    _ => {}
                }
            }
            WatchEvent::Rescan => handle.request_rescan().await,
            WatchEvent::Lost { message } => {
                handle.watcher_lost(message).await;
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
