// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vector store capability and the local JSONL-backed implementation.
//!
//! One record per document, keyed by (folder, relative path). Each record
//! carries the content hash it was embedded from, so the store can answer
//! `list_fingerprints` and the lifecycle can verify store/index agreement.
//!
//! Access discipline: a folder's store file is only touched by that
//! folder's lifecycle service, so operations do plain read-modify-write.

use crate::chunker::TextChunk;
use async_trait::async_trait;
use fmcp_core::{CoreError, Outcome};
use fmcp_storage::{rotate_bak_path, sidecar_dir, write_atomic};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One similarity-search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub path: PathBuf,
    pub chunk_index: usize,
    pub score: f32,
    pub text: String,
}

/// Vector store capability used by the lifecycle service.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Whether the folder's store can accept operations.
    async fn is_ready(&self, folder: &Path) -> bool;

    /// Insert or replace the document for `rel_path`.
    async fn upsert_document(
        &self,
        folder: &Path,
        rel_path: &Path,
        content_hash: &str,
        chunks: &[TextChunk],
        vectors: &[Vec<f32>],
    ) -> Outcome<()>;

    /// Remove the document for `rel_path`. Absent documents are a no-op.
    async fn remove_document(&self, folder: &Path, rel_path: &Path) -> Outcome<()>;

    /// Map of relative path → content hash for every stored document.
    async fn list_fingerprints(&self, folder: &Path) -> Outcome<HashMap<PathBuf, String>>;

    /// Cosine-similarity top-`limit` chunks for the query vector.
    async fn search(&self, folder: &Path, query: &[f32], limit: usize)
        -> Outcome<Vec<SearchHit>>;
}

/// On-disk record: one JSON line per document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentRecord {
    path: PathBuf,
    content_hash: String,
    chunks: Vec<TextChunk>,
    vectors: Vec<Vec<f32>>,
}

const STORE_FILE_NAME: &str = "vectors.jsonl";

/// JSONL vector store under each folder's `.folder-mcp/` sidecar.
#[derive(Debug, Clone, Default)]
pub struct JsonlVectorStore;

impl JsonlVectorStore {
    pub fn new() -> Self {
        Self
    }

    fn store_path(folder: &Path) -> PathBuf {
        sidecar_dir(folder).join(STORE_FILE_NAME)
    }

    /// Load all records, recovering from corruption.
    ///
    /// A file with unparseable content is rotated to `.bak`; records on
    /// valid lines before the damage are preserved and rewritten. The
    /// daemon never crashes on planted garbage; the folder just
    /// re-embeds whatever was lost.
    fn load(folder: &Path) -> Outcome<Vec<DocumentRecord>> {
        let path = Self::store_path(folder);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let bytes = fs::read(&path)
            .map_err(|e| CoreError::transient_io(format!("read {}: {e}", path.display())))?;
        let text = String::from_utf8_lossy(&bytes);

        let mut records = Vec::new();
        let mut corrupt = false;
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DocumentRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        valid_records = records.len(),
                        "corrupt vector store line, rotating file to .bak",
                    );
                    corrupt = true;
                    break;
                }
            }
        }

        if corrupt {
            let bak = rotate_bak_path(&path);
            fs::rename(&path, &bak)
                .map_err(|e| CoreError::store_corruption(format!("rotate store: {e}")))?;
            Self::save(folder, &records)?;
        }

        Ok(records)
    }

    fn save(folder: &Path, records: &[DocumentRecord]) -> Outcome<()> {
        let path = Self::store_path(folder);
        let mut out = Vec::new();
        for record in records {
            let line = serde_json::to_vec(record)
                .map_err(|e| CoreError::transient_io(format!("encode store record: {e}")))?;
            out.extend_from_slice(&line);
            out.push(b'\n');
        }
        write_atomic(&path, &out)
            .map_err(|e| CoreError::transient_io(format!("write {}: {e}", path.display())))?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for JsonlVectorStore {
    async fn is_ready(&self, folder: &Path) -> bool {
        sidecar_dir(folder).exists()
    }

    async fn upsert_document(
        &self,
        folder: &Path,
        rel_path: &Path,
        content_hash: &str,
        chunks: &[TextChunk],
        vectors: &[Vec<f32>],
    ) -> Outcome<()> {
        if chunks.len() != vectors.len() {
            return Err(CoreError::validation(format!(
                "chunk/vector count mismatch: {} vs {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let mut records = Self::load(folder)?;
        let record = DocumentRecord {
            path: rel_path.to_path_buf(),
            content_hash: content_hash.to_string(),
            chunks: chunks.to_vec(),
            vectors: vectors.to_vec(),
        };
        match records.iter_mut().find(|r| r.path == rel_path) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Self::save(folder, &records)
    }

    async fn remove_document(&self, folder: &Path, rel_path: &Path) -> Outcome<()> {
        let mut records = Self::load(folder)?;
        let before = records.len();
        records.retain(|r| r.path != rel_path);
        if records.len() != before {
            Self::save(folder, &records)?;
        }
        Ok(())
    }

    async fn list_fingerprints(&self, folder: &Path) -> Outcome<HashMap<PathBuf, String>> {
        let records = Self::load(folder)?;
        Ok(records.into_iter().map(|r| (r.path, r.content_hash)).collect())
    }

    async fn search(
        &self,
        folder: &Path,
        query: &[f32],
        limit: usize,
    ) -> Outcome<Vec<SearchHit>> {
        let records = Self::load(folder)?;

        let mut hits = Vec::new();
        for record in &records {
            for (chunk, vector) in record.chunks.iter().zip(&record.vectors) {
                hits.push(SearchHit {
                    path: record.path.clone(),
                    chunk_index: chunk.index,
                    score: cosine(query, vector),
                    text: chunk.text.clone(),
                });
            }
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
