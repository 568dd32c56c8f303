// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FMDM: the Folder-Mapped Daemon Model snapshot.
//!
//! A single versioned view of daemon state, fanned out to control clients.
//! Consumers must treat any snapshot with a lower-or-equal version as stale.

use crate::folder::FolderDescriptor;
use serde::{Deserialize, Serialize};

/// Daemon process identity within the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonInfo {
    pub pid: u32,
    pub uptime_sec: u64,
}

/// An embedding model the daemon can bind folders to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    pub dimension: usize,
}

/// Connected control-client count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub count: usize,
}

/// The authoritative daemon snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fmdm {
    /// Monotonic; incremented by exactly 1 on every published change.
    pub version: u64,
    pub daemon: DaemonInfo,
    pub folders: Vec<FolderDescriptor>,
    pub models: Vec<ModelDescriptor>,
    pub connections: ConnectionInfo,
}

impl Fmdm {
    /// Find a folder by absolute path.
    pub fn folder(&self, path: &std::path::Path) -> Option<&FolderDescriptor> {
        self.folders.iter().find(|f| f.path == path)
    }
}

#[cfg(test)]
#[path = "fmdm_tests.rs"]
mod tests;
