// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-system capability: enumerate, hash and stat files under a root.

use fmcp_core::{CoreError, Outcome};
use fmcp_storage::SIDECAR_DIR_NAME;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Directory names never scanned or watched.
pub const DEFAULT_EXCLUDES: &[&str] = &["node_modules", ".git", SIDECAR_DIR_NAME];

/// Extensions indexed when no explicit include list is configured.
const DEFAULT_EXTENSIONS: &[&str] =
    &["txt", "md", "pdf", "docx", "xlsx", "pptx", "csv", "json", "xml", "html", "log", "rs"];

/// Include/exclude filters applied during a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanFilters {
    /// Allowed extensions (lowercase, no dot). Empty means the default set.
    pub include_extensions: Vec<String>,
    /// Directory names to skip. The defaults are always applied on top.
    pub exclude_dirs: Vec<String>,
}

impl ScanFilters {
    /// Whether `name` is an excluded directory name.
    pub fn excludes_dir(&self, name: &str) -> bool {
        DEFAULT_EXCLUDES.contains(&name) || self.exclude_dirs.iter().any(|d| d == name)
    }

    /// Whether a file with this extension is included.
    pub fn includes_extension(&self, ext: &str) -> bool {
        if self.include_extensions.is_empty() {
            DEFAULT_EXTENSIONS.contains(&ext)
        } else {
            self.include_extensions.iter().any(|e| e == ext)
        }
    }
}

/// Size and times for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub mtime_ms: u64,
    pub is_file: bool,
    pub is_directory: bool,
}

/// File-system capability used by the lifecycle service.
///
/// `scan` applies the extension and ignore filters, so callers never see
/// sidecar or VCS internals.
pub trait FileSystem: Send + Sync {
    /// Enumerate files under `root`, relative paths, filters applied.
    fn scan(&self, root: &Path, filters: &ScanFilters) -> Outcome<Vec<PathBuf>>;

    /// Hex-encoded SHA-256 of the file bytes.
    fn hash_content(&self, path: &Path) -> Outcome<String>;

    fn stat(&self, path: &Path) -> Outcome<FileStat>;
}

/// Local disk implementation.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }

    fn walk(
        &self,
        root: &Path,
        dir: &Path,
        filters: &ScanFilters,
        out: &mut Vec<PathBuf>,
    ) -> Outcome<()> {
        let entries = fs::read_dir(dir)
            .map_err(|e| CoreError::transient_io(format!("read {}: {e}", dir.display())))?;

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                // Entries can vanish mid-scan (rename in progress); skip them.
                Err(_) => continue,
            };
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else { continue };

            if file_type.is_dir() {
                let name = entry.file_name();
                if filters.excludes_dir(&name.to_string_lossy()) {
                    continue;
                }
                self.walk(root, &path, filters, out)?;
            } else if file_type.is_file() {
                let ext = path
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                if !filters.includes_extension(&ext) {
                    continue;
                }
                if let Ok(rel) = path.strip_prefix(root) {
                    out.push(rel.to_path_buf());
                }
            }
        }
        Ok(())
    }
}

impl FileSystem for LocalFileSystem {
    fn scan(&self, root: &Path, filters: &ScanFilters) -> Outcome<Vec<PathBuf>> {
        let mut out = Vec::new();
        self.walk(root, root, filters, &mut out)?;
        out.sort();
        Ok(out)
    }

    fn hash_content(&self, path: &Path) -> Outcome<String> {
        let bytes = fs::read(path)
            .map_err(|e| CoreError::transient_io(format!("read {}: {e}", path.display())))?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }

    fn stat(&self, path: &Path) -> Outcome<FileStat> {
        let meta = fs::metadata(path)
            .map_err(|e| CoreError::transient_io(format!("stat {}: {e}", path.display())))?;
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(FileStat {
            size: meta.len(),
            mtime_ms,
            is_file: meta.is_file(),
            is_directory: meta.is_dir(),
        })
    }
}

#[cfg(test)]
#[path = "fs_tests.rs"]
mod tests;
