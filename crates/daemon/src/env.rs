// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve the user config directory:
/// `FOLDER_MCP_USER_CONFIG_DIR` > OS config dir + `folder-mcp`.
///
/// The override is what test harnesses use to isolate daemons.
pub fn user_config_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("FOLDER_MCP_USER_CONFIG_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join("folder-mcp")).ok_or(LifecycleError::NoConfigDir)
}

/// Watcher debounce override (`FOLDER_MCP_FILE_CHANGE_DEBOUNCE_MS`).
pub fn file_change_debounce() -> Option<Duration> {
    std::env::var("FOLDER_MCP_FILE_CHANGE_DEBOUNCE_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Log level (`FOLDER_MCP_LOG_LEVEL`), defaulting to `info`.
pub fn log_level() -> String {
    std::env::var("FOLDER_MCP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

/// Whether development-only behaviours are unlocked
/// (`FOLDER_MCP_DEVELOPMENT_ENABLED`).
pub fn development_enabled() -> bool {
    std::env::var("FOLDER_MCP_DEVELOPMENT_ENABLED")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
