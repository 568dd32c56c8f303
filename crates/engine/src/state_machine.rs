// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure folder lifecycle state machine.
//!
//! Validates transitions and produces the next state; never performs I/O.
//! Illegal transitions are no-ops that log a warning, so a confused caller
//! cannot corrupt a folder's lifecycle.

use fmcp_core::FolderStatus;
use tracing::warn;

/// A lifecycle trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Explicit scan request (initial, watcher-driven, or after error).
    StartScanning,
    /// Scan finished with `task_count` reconciliation tasks.
    ScanCompleted { task_count: usize },
    /// Scan failed.
    ScanFailed,
    /// Begin working the task set.
    StartIndexing,
    /// Every task reached a terminal status.
    IndexingCompleted,
    /// Folder-level fatal condition while indexing.
    IndexingFailed,
    /// Clear everything back to pending.
    Reset,
}

/// The state machine for one folder.
///
/// Holds only the status; task lists and progress live with the service
/// that owns the folder.
#[derive(Debug, Clone)]
pub struct FolderStateMachine {
    status: FolderStatus,
}

impl FolderStateMachine {
    pub fn new() -> Self {
        Self { status: FolderStatus::Pending }
    }

    pub fn status(&self) -> FolderStatus {
        self.status
    }

    /// Apply a transition; returns the new status if it was legal.
    ///
    /// Illegal transitions leave the status untouched and return `None`.
    pub fn apply(&mut self, transition: Transition) -> Option<FolderStatus> {
        use FolderStatus::*;

        let next = match (self.status, transition) {
            (Pending | Active | Error, Transition::StartScanning) => Some(Scanning),
            (Scanning, Transition::ScanCompleted { task_count }) => {
                if task_count > 0 {
                    Some(Ready)
                } else {
                    Some(Active)
                }
            }
            (Scanning, Transition::ScanFailed) => Some(Error),
            (Ready, Transition::StartIndexing) => Some(Indexing),
            (Indexing, Transition::IndexingCompleted) => Some(Active),
            (Indexing, Transition::IndexingFailed) => Some(Error),
            (_, Transition::Reset) => Some(Pending),
            _ => None,
        };

        match next {
            Some(status) => {
                self.status = status;
                Some(status)
            }
            None => {
                warn!(
                    from = %self.status,
                    transition = ?transition,
                    "ignoring illegal lifecycle transition",
                );
                None
            }
        }
    }
}

impl Default for FolderStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "state_machine_tests.rs"]
mod tests;
