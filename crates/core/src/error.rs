// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across component boundaries.
//!
//! Components never throw across a boundary: failures are carried as
//! [`CoreError`] values with a stable [`ErrorKind`] and surface in folder
//! state or as protocol error replies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable failure kinds. Wire- and state-visible, so renames are breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Malformed request or illegal state transition. Not retried.
    Validation,
    /// Filesystem flap, embedder busy, store lock contention. Retried with backoff.
    #[serde(rename = "transientIO")]
    TransientIo,
    /// Embedder rejected the model id. Folder-level fatal.
    ModelUnavailable,
    /// Fingerprint or vector store failed integrity checks on open.
    StoreCorruption,
    /// Watcher stream ended unexpectedly.
    WatcherLost,
    /// Control-channel schema violation.
    Protocol,
    /// Unrecoverable daemon condition (startup only).
    Fatal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::TransientIo => "transientIO",
            ErrorKind::ModelUnavailable => "modelUnavailable",
            ErrorKind::StoreCorruption => "storeCorruption",
            ErrorKind::WatcherLost => "watcherLost",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

/// A classified failure with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn transient_io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientIo, message)
    }

    pub fn model_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ModelUnavailable, message)
    }

    pub fn store_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StoreCorruption, message)
    }

    pub fn watcher_lost(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WatcherLost, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// Whether the task-level retry path applies to this failure.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::TransientIo
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        Self::transient_io(e.to_string())
    }
}

/// Result alias used at component boundaries.
pub type Outcome<T> = Result<T, CoreError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
