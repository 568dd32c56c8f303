// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-folder embedding task queue.
//!
//! FIFO over an ordered map, with an in-flight cap, idempotent enqueue and
//! exponential retry backoff. Purely synchronous; the owning lifecycle
//! service supplies the current instant and does the sleeping.

use fmcp_core::{CoreError, EmbeddingTask, FolderProgress, TaskAction, TaskId, TaskStatus};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Base delay for the first retry; doubles per attempt (1s, 2s, 4s).
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Result of one task execution, reported by the worker.
pub type TaskCompletion = Result<(), CoreError>;

/// Bounded FIFO of one folder's reconciliation tasks.
#[derive(Debug)]
pub struct TaskQueue {
    tasks: IndexMap<TaskId, EmbeddingTask>,
    /// Retry backoff: pending tasks not eligible before this instant.
    not_before: HashMap<TaskId, Instant>,
    max_concurrent: usize,
    max_attempts: u32,
}

impl TaskQueue {
    pub fn new(max_concurrent: usize, max_attempts: u32) -> Self {
        Self {
            tasks: IndexMap::new(),
            not_before: HashMap::new(),
            max_concurrent,
            max_attempts,
        }
    }

    /// Enqueue a task, idempotent per file.
    ///
    /// An existing `pending` task for the same file is replaced (latest
    /// decision wins). An in-flight task is left running; the desired
    /// state is re-evaluated when it completes. Returns the queued task id.
    pub fn enqueue(&mut self, file: PathBuf, action: TaskAction) -> TaskId {
        let existing_pending = self
            .tasks
            .values()
            .find(|t| t.file == file && t.status == TaskStatus::Pending)
            .map(|t| t.id);
        if let Some(id) = existing_pending {
            self.tasks.shift_remove(&id);
            self.not_before.remove(&id);
        }

        let task = EmbeddingTask::new(file, action);
        let id = task.id;
        self.tasks.insert(id, task);
        id
    }

    /// Next eligible pending task, FIFO, respecting cap and backoff.
    pub fn next_pending(&self, now: Instant) -> Option<TaskId> {
        if self.in_flight() >= self.max_concurrent {
            return None;
        }
        self.tasks
            .values()
            .find(|t| {
                t.status == TaskStatus::Pending
                    && self.not_before.get(&t.id).map_or(true, |at| *at <= now)
            })
            .map(|t| t.id)
    }

    /// Earliest instant at which a backed-off task becomes eligible.
    pub fn next_retry_at(&self) -> Option<Instant> {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter_map(|t| self.not_before.get(&t.id))
            .min()
            .copied()
    }

    /// Move a pending task to in-progress.
    ///
    /// Refused (returns false) when the in-flight cap is reached or the
    /// task is not pending.
    pub fn start(&mut self, id: TaskId) -> bool {
        if self.in_flight() >= self.max_concurrent {
            return false;
        }
        match self.tasks.get_mut(&id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::InProgress;
                task.attempts += 1;
                self.not_before.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Complete an in-flight task.
    ///
    /// Failures re-enter `pending` after `1s·2^(attempts−1)` until the
    /// attempt ceiling, then become permanently failed. The folder can
    /// still reach active with permanent failures recorded on tasks.
    pub fn complete(&mut self, id: TaskId, result: TaskCompletion, now: Instant) {
        let Some(task) = self.tasks.get_mut(&id) else { return };
        if task.status != TaskStatus::InProgress {
            return;
        }

        match result {
            Ok(()) => {
                task.status = TaskStatus::Done;
                task.last_error = None;
            }
            Err(e) => {
                task.last_error = Some(e.to_string());
                if task.attempts >= self.max_attempts || !e.is_retryable() {
                    task.status = TaskStatus::Error;
                } else {
                    task.status = TaskStatus::Pending;
                    let exponent = task.attempts.saturating_sub(1).min(16);
                    let delay = RETRY_BASE_DELAY * 2u32.pow(exponent);
                    self.not_before.insert(id, now + delay);
                }
            }
        }
    }

    pub fn get(&self, id: TaskId) -> Option<&EmbeddingTask> {
        self.tasks.get(&id)
    }

    pub fn task_for_file(&self, file: &Path) -> Option<&EmbeddingTask> {
        self.tasks.values().find(|t| t.file == file)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &EmbeddingTask> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.values().filter(|t| t.status == TaskStatus::InProgress).count()
    }

    pub fn all_terminal(&self) -> bool {
        self.tasks.values().all(|t| t.status.is_terminal())
    }

    /// Progress over the current task set.
    pub fn progress(&self) -> FolderProgress {
        let total = self.tasks.len();
        let completed = self.tasks.values().filter(|t| t.status.is_terminal()).count();
        FolderProgress::of(total, completed)
    }

    /// Drop all tasks (lifecycle `reset`).
    pub fn clear(&mut self) {
        self.tasks.clear();
        self.not_before.clear();
    }
}

#[cfg(test)]
#[path = "task_queue_tests.rs"]
mod tests;
