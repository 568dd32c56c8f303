// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedder capability: batched chunk embedding behind a model catalog.
//!
//! The shipped implementation is a deterministic local embedder: vectors
//! are expanded from a SHA-256 seed of (model id, chunk text). It gives the
//! pipeline real fixed-dimension vectors with zero runtime dependencies;
//! ONNX or remote runtimes plug in behind the same trait.

use crate::chunker::TextChunk;
use async_trait::async_trait;
use fmcp_core::{CoreError, ModelDescriptor, Outcome};
use sha2::{Digest, Sha256};

/// Embedder capability used by the indexing pipeline.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Check a model id against the catalog.
    fn validate_model(&self, id: &str) -> Outcome<()>;

    /// Models this embedder can serve.
    fn models(&self) -> Vec<ModelDescriptor>;

    /// Vector width produced by `embed`.
    fn dimension(&self) -> usize;

    /// Embed a batch of chunks with the given model, one vector per chunk.
    async fn embed(&self, model: &str, chunks: &[TextChunk]) -> Outcome<Vec<Vec<f32>>>;
}

/// Vector width of the deterministic embedder.
pub const EMBEDDING_DIMENSION: usize = 384;

/// Models served when no catalog override is configured.
const DEFAULT_MODELS: &[&str] = &["all-minilm-l6", "bge-small"];

/// Deterministic SHA-256-seeded embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    catalog: Vec<String>,
}

impl HashEmbedder {
    /// Embedder with the built-in model catalog.
    pub fn new() -> Self {
        Self { catalog: DEFAULT_MODELS.iter().map(|s| s.to_string()).collect() }
    }

    /// Embedder with a configured catalog (`config.json` `models`).
    pub fn with_catalog(models: Vec<String>) -> Self {
        if models.is_empty() {
            Self::new()
        } else {
            Self { catalog: models }
        }
    }

    fn vector_for(model: &str, text: &str) -> Vec<f32> {
        let mut seed = Sha256::new();
        seed.update(model.as_bytes());
        seed.update([0u8]);
        seed.update(text.as_bytes());
        let seed = seed.finalize();

        // Expand the 32-byte seed into the full dimension by hashing
        // (seed, block counter), then normalize to unit length.
        let mut values = Vec::with_capacity(EMBEDDING_DIMENSION);
        let mut block: u32 = 0;
        while values.len() < EMBEDDING_DIMENSION {
            let mut hasher = Sha256::new();
            hasher.update(seed);
            hasher.update(block.to_be_bytes());
            for byte in hasher.finalize() {
                if values.len() == EMBEDDING_DIMENSION {
                    break;
                }
                values.push((byte as f32 / 127.5) - 1.0);
            }
            block += 1;
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        values
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn validate_model(&self, id: &str) -> Outcome<()> {
        if self.catalog.iter().any(|m| m == id) {
            Ok(())
        } else {
            Err(CoreError::model_unavailable(format!("unknown model: {id}")))
        }
    }

    fn models(&self) -> Vec<ModelDescriptor> {
        self.catalog
            .iter()
            .map(|id| ModelDescriptor { id: id.clone(), dimension: EMBEDDING_DIMENSION })
            .collect()
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    async fn embed(&self, model: &str, chunks: &[TextChunk]) -> Outcome<Vec<Vec<f32>>> {
        self.validate_model(model)?;
        Ok(chunks.iter().map(|c| Self::vector_for(model, &c.text)).collect())
    }
}

/// Test-support wrapper that fails matching embed calls a fixed number of
/// times before delegating. Drives the transient-failure retry paths.
#[cfg(any(test, feature = "test-support"))]
pub struct FlakyEmbedder {
    inner: HashEmbedder,
    matcher: Option<String>,
    remaining_failures: parking_lot::Mutex<u32>,
}

#[cfg(any(test, feature = "test-support"))]
impl FlakyEmbedder {
    /// Fail the first `failures` embed calls, then succeed.
    pub fn new(inner: HashEmbedder, failures: u32) -> Self {
        Self { inner, matcher: None, remaining_failures: parking_lot::Mutex::new(failures) }
    }

    /// Fail the first `failures` embed calls whose batch mentions `text`.
    pub fn failing_matching(inner: HashEmbedder, text: impl Into<String>, failures: u32) -> Self {
        Self {
            inner,
            matcher: Some(text.into()),
            remaining_failures: parking_lot::Mutex::new(failures),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl Embedder for FlakyEmbedder {
    fn validate_model(&self, id: &str) -> Outcome<()> {
        self.inner.validate_model(id)
    }

    fn models(&self) -> Vec<ModelDescriptor> {
        self.inner.models()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, model: &str, chunks: &[TextChunk]) -> Outcome<Vec<Vec<f32>>> {
        let matches = match &self.matcher {
            Some(needle) => chunks.iter().any(|c| c.text.contains(needle)),
            None => true,
        };
        if matches {
            let mut remaining = self.remaining_failures.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CoreError::transient_io("embedder busy"));
            }
        }
        self.inner.embed(model, chunks).await
    }
}

#[cfg(test)]
#[path = "embedder_tests.rs"]
mod tests;
