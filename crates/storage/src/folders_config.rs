// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted folders list and daemon settings.
//!
//! `folders.json` holds the configured folders (`{ "folders": [...] }`);
//! `config.json` holds optional settings. Both live in the user config
//! directory. The folders list answers `getFoldersConfig` directly from
//! disk so a freshly started daemon can reply before any in-memory state
//! exists.

use crate::paths::write_atomic;
use fmcp_core::FolderConfigEntry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from config persistence.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config at {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The persisted folders list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldersConfig {
    pub folders: Vec<FolderConfigEntry>,
}

impl FoldersConfig {
    /// Load from `path`; a missing file is an empty list.
    ///
    /// An unreadable or invalid file is an error; the daemon treats it as
    /// a fatal startup condition rather than silently dropping folders.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ConfigError::Invalid { path: path.to_path_buf(), source: e })
    }

    /// Save atomically.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| ConfigError::Invalid { path: path.to_path_buf(), source: e })?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    pub fn get(&self, folder: &Path) -> Option<&FolderConfigEntry> {
        self.folders.iter().find(|f| f.path == folder)
    }

    /// Add or replace the entry for `entry.path`.
    pub fn upsert(&mut self, entry: FolderConfigEntry) {
        match self.folders.iter_mut().find(|f| f.path == entry.path) {
            Some(existing) => *existing = entry,
            None => self.folders.push(entry),
        }
    }

    /// Remove the entry for `folder`; returns whether one was present.
    pub fn remove(&mut self, folder: &Path) -> bool {
        let before = self.folders.len();
        self.folders.retain(|f| f.path != folder);
        self.folders.len() != before
    }
}

/// Embedding runtime settings (`config.json` `onnx` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnnxSettings {
    /// Global cap on in-flight embedding tasks across all folders.
    #[serde(rename = "maxConcurrentFiles", default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
}

impl Default for OnnxSettings {
    fn default() -> Self {
        Self { max_concurrent_files: default_max_concurrent_files() }
    }
}

fn default_max_concurrent_files() -> usize {
    4
}

/// Daemon settings (`config.json`), all optional with stable defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Control channel port; the actual socket binds port+1 (0 = ephemeral).
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub onnx: OnnxSettings,

    /// Model catalog override; empty means the embedder's built-in catalog.
    #[serde(default)]
    pub models: Vec<String>,

    /// Folder-wide consecutive store errors before the folder goes to error.
    #[serde(rename = "maxConsecutiveErrors", default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

fn default_port() -> u16 {
    31850
}

fn default_max_consecutive_errors() -> u32 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: default_port(),
            onnx: OnnxSettings::default(),
            models: Vec::new(),
            max_consecutive_errors: default_max_consecutive_errors(),
        }
    }
}

impl Settings {
    /// Load from `path`; missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ConfigError::Invalid { path: path.to_path_buf(), source: e })
    }
}

#[cfg(test)]
#[path = "folders_config_tests.rs"]
mod tests;
