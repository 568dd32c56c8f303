// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Folder descriptors and lifecycle status.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle status of a monitored folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderStatus {
    Pending,
    Scanning,
    Ready,
    Indexing,
    Active,
    Error,
}

impl std::fmt::Display for FolderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FolderStatus::Pending => "pending",
            FolderStatus::Scanning => "scanning",
            FolderStatus::Ready => "ready",
            FolderStatus::Indexing => "indexing",
            FolderStatus::Active => "active",
            FolderStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Reconciliation progress over one folder's task set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderProgress {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub percentage: u8,
}

impl FolderProgress {
    /// Progress for `completed` terminal tasks out of `total`.
    ///
    /// `percentage` is `round(100 * completed / total)`; an empty task set
    /// reports 100 (there is nothing left to reconcile).
    pub fn of(total: usize, completed: usize) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            (((completed * 100) as f64 / total as f64).round() as u8).min(100)
        };
        Self { total_tasks: total, completed_tasks: completed, percentage }
    }
}

/// One monitored folder as seen by control clients.
///
/// `path`, `model` and `enabled` come from configuration; the runtime
/// fields are mutated only by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderDescriptor {
    pub path: PathBuf,
    pub name: String,
    pub model: String,
    pub enabled: bool,
    pub status: FolderStatus,
    pub progress: FolderProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl FolderDescriptor {
    /// Fresh descriptor for a newly added folder.
    ///
    /// `name` defaults to the final path component.
    pub fn new(path: PathBuf, model: impl Into<String>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            path,
            name,
            model: model.into(),
            enabled: true,
            status: FolderStatus::Pending,
            progress: FolderProgress::default(),
            last_error: None,
        }
    }
}

/// Persisted configuration entry for one folder (`folders.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderConfigEntry {
    pub path: PathBuf,
    pub model: String,
    pub enabled: bool,
}

#[cfg(test)]
#[path = "folder_tests.rs"]
mod tests;
