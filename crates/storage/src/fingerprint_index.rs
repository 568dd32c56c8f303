// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted per-folder fingerprint index.
//!
//! Maps relative file paths to content fingerprints under
//! `<folder>/.folder-mcp/fingerprints.json`. The index is the only
//! authoritative record of what is already in the vector store, so writes
//! are durable before the caller acknowledges the store mutation, and the
//! vector-store write always happens first, so a crash leaves the index
//! behind (reprocess on restart), never ahead.

use crate::paths::{rotate_bak_path, sidecar_dir, write_atomic};
use fmcp_core::Fingerprint;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors from fingerprint index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Index is closed")]
    Closed,
}

/// On-disk document format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexDocument {
    version: u32,
    files: IndexMap<PathBuf, Fingerprint>,
}

const FORMAT_VERSION: u32 = 1;
const INDEX_FILE_NAME: &str = "fingerprints.json";

/// Fingerprint index for one watched folder.
pub struct FingerprintIndex {
    path: PathBuf,
    entries: IndexMap<PathBuf, Fingerprint>,
    open: bool,
    rebuilt: bool,
}

impl FingerprintIndex {
    /// Open (or initialise) the index inside the folder's sidecar.
    ///
    /// Unreadable or structurally invalid bytes at the index location are
    /// rotated to `.bak` and replaced with a fresh empty index; the caller
    /// checks [`was_rebuilt`](Self::was_rebuilt) to schedule reindexing.
    pub fn open(folder: &Path) -> Result<Self, IndexError> {
        let path = sidecar_dir(folder).join(INDEX_FILE_NAME);

        if !path.exists() {
            let index =
                Self { path, entries: IndexMap::new(), open: true, rebuilt: false };
            index.save()?;
            return Ok(index);
        }

        let bytes = fs::read(&path)?;
        match serde_json::from_slice::<IndexDocument>(&bytes) {
            Ok(doc) => Ok(Self { path, entries: doc.files, open: true, rebuilt: false }),
            Err(e) => {
                let bak_path = rotate_bak_path(&path);
                warn!(
                    error = %e,
                    path = %path.display(),
                    bak = %bak_path.display(),
                    "corrupt fingerprint index, rotating to .bak and starting fresh",
                );
                fs::rename(&path, &bak_path)?;
                let index = Self { path, entries: IndexMap::new(), open: true, rebuilt: true };
                index.save()?;
                Ok(index)
            }
        }
    }

    /// Whether the index was rebuilt from a corrupt file at open time.
    pub fn was_rebuilt(&self) -> bool {
        self.rebuilt
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// All fingerprints keyed by relative path, in insertion order.
    pub fn get_all(&self) -> &IndexMap<PathBuf, Fingerprint> {
        &self.entries
    }

    pub fn get(&self, rel_path: &Path) -> Option<&Fingerprint> {
        self.entries.get(rel_path)
    }

    /// Insert or replace a fingerprint and persist durably before returning.
    pub fn upsert(&mut self, rel_path: PathBuf, fp: Fingerprint) -> Result<(), IndexError> {
        if !self.open {
            return Err(IndexError::Closed);
        }
        self.entries.insert(rel_path, fp);
        self.save()
    }

    /// Remove a fingerprint and persist durably before returning.
    ///
    /// Removing an absent path is a no-op (idempotent with replayed tasks).
    pub fn remove(&mut self, rel_path: &Path) -> Result<(), IndexError> {
        if !self.open {
            return Err(IndexError::Closed);
        }
        if self.entries.shift_remove(rel_path).is_some() {
            self.save()?;
        }
        Ok(())
    }

    /// Close the index; further mutations fail with [`IndexError::Closed`].
    pub fn close(&mut self) {
        self.open = false;
    }

    fn save(&self) -> Result<(), IndexError> {
        let doc = IndexDocumentRef { version: FORMAT_VERSION, files: &self.entries };
        let bytes = serde_json::to_vec_pretty(&doc)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}

/// Serialization helper for writing without cloning the map.
#[derive(Serialize)]
struct IndexDocumentRef<'a> {
    version: u32,
    files: &'a IndexMap<PathBuf, Fingerprint>,
}

#[cfg(test)]
#[path = "fingerprint_index_tests.rs"]
mod tests;
