// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure per-file processing decision.
//!
//! Given the current content hash, the stored fingerprint and the last
//! processing outcome, decide whether a file needs (re)processing. The
//! function owns no mutation; the lifecycle service acts on its output.

use fmcp_core::{Fingerprint, TaskAction};

/// Default retry ceiling for a single file.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What the caller should do with the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessAction {
    /// First-time processing → `CreateEmbeddings`.
    Process,
    /// Replace extant store state atomically → `UpdateEmbeddings`.
    Retry,
    /// Nothing to do.
    Skip,
}

impl ProcessAction {
    /// Task action produced when processing is required.
    pub fn task_action(&self) -> Option<TaskAction> {
        match self {
            ProcessAction::Process => Some(TaskAction::CreateEmbeddings),
            ProcessAction::Retry => Some(TaskAction::UpdateEmbeddings),
            ProcessAction::Skip => None,
        }
    }
}

/// Outcome of the last processing attempt for a file, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastOutcome {
    pub failed: bool,
    pub attempts: u32,
}

/// Inputs to the decision.
#[derive(Debug, Clone)]
pub struct FileStateInput<'a> {
    pub current_hash: &'a str,
    pub stored: Option<&'a Fingerprint>,
    pub last_outcome: Option<LastOutcome>,
    pub max_attempts: u32,
}

/// The decision plus its reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub should_process: bool,
    pub action: ProcessAction,
    pub reason: &'static str,
}

impl Decision {
    fn new(action: ProcessAction, reason: &'static str) -> Self {
        Self { should_process: action != ProcessAction::Skip, action, reason }
    }
}

/// Decide whether a file should be processed.
pub fn decide(input: &FileStateInput<'_>) -> Decision {
    let Some(stored) = input.stored else {
        return Decision::new(ProcessAction::Process, "no stored fingerprint");
    };

    if !stored.matches(input.current_hash) {
        return Decision::new(ProcessAction::Retry, "content changed");
    }

    match input.last_outcome {
        Some(outcome) if outcome.failed => {
            if outcome.attempts >= input.max_attempts {
                Decision::new(ProcessAction::Skip, "permanent failure")
            } else {
                Decision::new(ProcessAction::Retry, "previous attempt failed")
            }
        }
        _ => Decision::new(ProcessAction::Skip, "unchanged"),
    }
}

#[cfg(test)]
#[path = "file_state_tests.rs"]
mod tests;
