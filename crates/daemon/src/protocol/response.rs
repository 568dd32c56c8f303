// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use fmcp_core::{EmbeddingTask, Fmdm, FolderConfigEntry, FolderDescriptor};
use serde::{Deserialize, Serialize};

/// Reply from the daemon to a control client, correlated by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ControlResponse {
    #[serde(rename = "folder.addResponse")]
    FolderAdd { id: String, ok: bool },

    #[serde(rename = "folder.removeResponse")]
    FolderRemove { id: String, ok: bool },

    #[serde(rename = "getFoldersConfigResponse")]
    GetFoldersConfig { id: String, folders: Vec<FolderConfigEntry> },

    #[serde(rename = "get_server_infoResponse")]
    GetServerInfo {
        id: String,
        #[serde(flatten)]
        info: Box<ServerInfo>,
    },

    #[serde(rename = "get_folder_infoResponse")]
    GetFolderInfo {
        id: String,
        #[serde(flatten)]
        info: Box<FolderInfo>,
    },

    #[serde(rename = "error")]
    Error { id: String, error: String },
}

/// Daemon identity and host facts for `get_server_info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub version: String,
    pub platform: String,
    /// Runtime identifier; the field name is part of the wire contract.
    #[serde(rename = "nodeRuntime")]
    pub runtime: String,
    pub daemon_pid: u32,
    pub daemon_uptime_sec: u64,
    pub hardware: HardwareInfo,
}

/// Host hardware summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HardwareInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<String>,
    pub cpu_cores: usize,
    #[serde(rename = "ramGB")]
    pub ram_gb: u64,
}

/// Live lifecycle detail for `get_folder_info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FolderInfo {
    pub folder: FolderDescriptor,
    pub tasks: Vec<EmbeddingTask>,
}

/// Unsolicited server → client messages. No correlation id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PushMessage {
    /// Delivered to every subscribed client after each FMDM version bump.
    #[serde(rename = "fmdm.update")]
    FmdmUpdate { fmdm: Fmdm },
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
