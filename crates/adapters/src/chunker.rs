// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chunker capability: turn a file into ordered text chunks.

use fmcp_core::{CoreError, Outcome};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One ordered chunk of extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
}

/// Chunker capability used by the indexing pipeline.
pub trait Chunker: Send + Sync {
    /// Ordered chunks for the file at `path`. Empty files yield no chunks.
    fn chunk(&self, path: &Path) -> Outcome<Vec<TextChunk>>;
}

/// Default chunk size ceiling in bytes of UTF-8 text.
pub const DEFAULT_MAX_CHUNK_LEN: usize = 1000;

/// Splits text on blank-line boundaries, packing paragraphs up to a size
/// ceiling. Oversized paragraphs are hard-split at char boundaries.
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    max_chunk_len: usize,
}

impl ParagraphChunker {
    pub fn new(max_chunk_len: usize) -> Self {
        Self { max_chunk_len }
    }

    fn split(&self, text: &str) -> Vec<TextChunk> {
        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for paragraph in text.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            if !current.is_empty() && current.len() + paragraph.len() + 2 > self.max_chunk_len {
                chunks.push(std::mem::take(&mut current));
            }
            if paragraph.len() > self.max_chunk_len {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                chunks.extend(hard_split(paragraph, self.max_chunk_len));
                continue;
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
            .into_iter()
            .enumerate()
            .map(|(index, text)| TextChunk { index, text })
            .collect()
    }
}

impl Default for ParagraphChunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_LEN)
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, path: &Path) -> Outcome<Vec<TextChunk>> {
        let bytes = fs::read(path)
            .map_err(|e| CoreError::transient_io(format!("read {}: {e}", path.display())))?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(self.split(&text))
    }
}

/// Split an oversized paragraph at char boundaries.
fn hard_split(paragraph: &str, max_len: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in paragraph.chars() {
        if current.len() + ch.len_utf8() > max_len {
            out.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[cfg(test)]
#[path = "chunker_tests.rs"]
mod tests;
