// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File fingerprints: the ground truth for "already indexed".

use serde::{Deserialize, Serialize};

/// Content identity of one file at the time it was indexed.
///
/// `content_hash` is a hex-encoded SHA-256 of the file bytes. `size` and
/// `mtime_ms` are advisory (cheap change pre-checks); the hash decides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub content_hash: String,
    pub size: u64,
    pub mtime_ms: u64,
}

impl Fingerprint {
    pub fn new(content_hash: impl Into<String>, size: u64, mtime_ms: u64) -> Self {
        Self { content_hash: content_hash.into(), size, mtime_ms }
    }

    /// True when the stored hash matches the given current hash.
    pub fn matches(&self, content_hash: &str) -> bool {
        self.content_hash == content_hash
    }
}
