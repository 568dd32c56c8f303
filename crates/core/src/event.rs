// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Messages flowing between watcher, lifecycle services and the orchestrator.

use crate::folder::{FolderProgress, FolderStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of a debounced filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchKind {
    Created,
    Modified,
    Deleted,
}

/// One coalesced change under a watched root.
///
/// Renames are delivered as `Deleted(from)` + `Created(to)` by the watcher,
/// so the lifecycle layer never sees a rename kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEvent {
    /// A stable per-path change.
    Change { path: PathBuf, kind: WatchKind },
    /// The backend lost events (overflow); a full rescan is required.
    Rescan,
    /// The watcher stream died; the folder must transition to error.
    Lost { message: String },
}

/// Status report from a folder's lifecycle service to the orchestrator.
///
/// The orchestrator folds these into the FMDM; nothing else observes them.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleUpdate {
    pub folder: PathBuf,
    pub status: FolderStatus,
    pub progress: FolderProgress,
    pub error: Option<String>,
}

impl LifecycleUpdate {
    pub fn new(folder: PathBuf, status: FolderStatus, progress: FolderProgress) -> Self {
        Self { folder, status, progress, error: None }
    }

    pub fn with_error(folder: PathBuf, status: FolderStatus, message: impl Into<String>) -> Self {
        Self { folder, status, progress: FolderProgress::default(), error: Some(message.into()) }
    }
}
