// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File embedding tasks: the atomic unit of reconciliation.

use crate::id::TaskId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What a task does to a file's embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskAction {
    CreateEmbeddings,
    UpdateEmbeddings,
    RemoveEmbeddings,
}

/// Task execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Error,
}

impl TaskStatus {
    /// Done, or failed with no retries remaining.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error)
    }
}

/// One unit of reconciliation for one file within one folder.
///
/// Owned exclusively by that folder's lifecycle service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingTask {
    pub id: TaskId,
    /// Path relative to the folder root.
    pub file: PathBuf,
    pub action: TaskAction,
    pub status: TaskStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl EmbeddingTask {
    pub fn new(file: PathBuf, action: TaskAction) -> Self {
        Self {
            id: TaskId::new(),
            file,
            action,
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
