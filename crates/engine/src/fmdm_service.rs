// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FMDM service: single owner of the authoritative daemon snapshot.
//!
//! Every public mutation bumps `version` by exactly 1 and publishes a
//! cloned snapshot to all subscribers before returning. Subscribers only
//! ever hold copies; the snapshot itself never escapes the owner by
//! reference. A short ring of recent snapshots is kept for diagnostics;
//! subscribers must not rely on replay.

use fmcp_core::{
    ClientId, ConnectionInfo, DaemonInfo, Fmdm, FolderDescriptor, FolderProgress, FolderStatus,
    LifecycleUpdate, ModelDescriptor,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Diagnostic ring size.
const RECENT_SNAPSHOTS: usize = 8;

struct Inner {
    fmdm: Fmdm,
    clients: HashSet<ClientId>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<Fmdm>>,
    next_subscriber: u64,
    recent: VecDeque<Fmdm>,
}

/// The FMDM owner. Cheap to clone; all clones share the snapshot.
#[derive(Clone)]
pub struct FmdmService {
    inner: Arc<Mutex<Inner>>,
    start_time: Instant,
}

/// Subscription disposer: dropping it unregisters the subscriber.
pub struct FmdmSubscription {
    inner: Arc<Mutex<Inner>>,
    id: u64,
}

impl Drop for FmdmSubscription {
    fn drop(&mut self) {
        self.inner.lock().subscribers.remove(&self.id);
    }
}

impl FmdmService {
    pub fn new(pid: u32) -> Self {
        let fmdm = Fmdm { daemon: DaemonInfo { pid, uptime_sec: 0 }, ..Default::default() };
        Self {
            inner: Arc::new(Mutex::new(Inner {
                fmdm,
                clients: HashSet::new(),
                subscribers: HashMap::new(),
                next_subscriber: 0,
                recent: VecDeque::new(),
            })),
            start_time: Instant::now(),
        }
    }

    /// Current snapshot copy.
    pub fn get(&self) -> Fmdm {
        let inner = self.inner.lock();
        self.snapshot_of(&inner)
    }

    /// Subscribe to every subsequent version change.
    ///
    /// Returns the receiving channel and a disposer; dropping the disposer
    /// unregisters the subscription. No replay: a reconnecting client
    /// calls [`get`](Self::get) for a fresh snapshot.
    pub fn subscribe(&self) -> (mpsc::UnboundedReceiver<Fmdm>, FmdmSubscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.insert(id, tx);
        (rx, FmdmSubscription { inner: Arc::clone(&self.inner), id })
    }

    /// Recent snapshots, oldest first (diagnostic only).
    pub fn recent(&self) -> Vec<Fmdm> {
        self.inner.lock().recent.iter().cloned().collect()
    }

    /// Replace the folder list.
    pub fn update_folders(&self, folders: Vec<FolderDescriptor>) {
        self.mutate(|fmdm| fmdm.folders = folders);
    }

    /// Set one folder's status, clearing any stale error on non-error states.
    pub fn update_folder_status(&self, path: &Path, status: FolderStatus) {
        self.mutate(|fmdm| {
            if let Some(folder) = fmdm.folders.iter_mut().find(|f| f.path == path) {
                folder.status = status;
                if status != FolderStatus::Error {
                    folder.last_error = None;
                }
            }
        });
    }

    /// Set one folder's status to error with a human-readable message.
    pub fn update_folder_error(&self, path: &Path, message: &str) {
        self.mutate(|fmdm| {
            if let Some(folder) = fmdm.folders.iter_mut().find(|f| f.path == path) {
                folder.status = FolderStatus::Error;
                folder.last_error = Some(message.to_string());
            }
        });
    }

    /// Set one folder's progress.
    pub fn update_folder_progress(&self, path: &Path, progress: FolderProgress) {
        self.mutate(|fmdm| {
            if let Some(folder) = fmdm.folders.iter_mut().find(|f| f.path == path) {
                folder.progress = progress;
            }
        });
    }

    /// Fold one lifecycle update in as a single version bump, so every
    /// published snapshot is internally consistent (a `ready` snapshot
    /// already carries its task totals).
    pub fn apply_lifecycle_update(&self, update: &LifecycleUpdate) {
        self.mutate(|fmdm| {
            if let Some(folder) = fmdm.folders.iter_mut().find(|f| f.path == update.folder) {
                folder.status = update.status;
                folder.progress = update.progress;
                folder.last_error = match update.status {
                    FolderStatus::Error => update.error.clone(),
                    _ => None,
                };
            }
        });
    }

    /// Replace the available model list.
    pub fn set_available_models(&self, models: Vec<ModelDescriptor>) {
        self.mutate(|fmdm| fmdm.models = models);
    }

    /// Register a control client.
    pub fn add_client(&self, id: ClientId) {
        self.mutate_inner(|inner| {
            inner.clients.insert(id);
            inner.fmdm.connections = ConnectionInfo { count: inner.clients.len() };
        });
    }

    /// Deregister a control client.
    pub fn remove_client(&self, id: ClientId) {
        self.mutate_inner(|inner| {
            inner.clients.remove(&id);
            inner.fmdm.connections = ConnectionInfo { count: inner.clients.len() };
        });
    }

    fn mutate(&self, f: impl FnOnce(&mut Fmdm)) {
        self.mutate_inner(|inner| f(&mut inner.fmdm));
    }

    /// Bump the version, apply the mutation, publish to subscribers.
    fn mutate_inner(&self, f: impl FnOnce(&mut Inner)) {
        let mut inner = self.inner.lock();
        f(&mut inner);
        inner.fmdm.version += 1;

        let snapshot = self.snapshot_of(&inner);
        inner.recent.push_back(snapshot.clone());
        if inner.recent.len() > RECENT_SNAPSHOTS {
            inner.recent.pop_front();
        }

        // Dead subscribers (dropped receivers) are pruned as we go.
        inner.subscribers.retain(|_, tx| tx.send(snapshot.clone()).is_ok());
    }

    fn snapshot_of(&self, inner: &Inner) -> Fmdm {
        let mut fmdm = inner.fmdm.clone();
        fmdm.daemon.uptime_sec = self.start_time.elapsed().as_secs();
        fmdm
    }
}

#[cfg(test)]
#[path = "fmdm_service_tests.rs"]
mod tests;
