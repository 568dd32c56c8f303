// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fmcp-adapters: external capability contracts and local implementations.
//!
//! The engine only knows these traits: file system, watcher, chunker,
//! embedder, vector store. The implementations here are the local
//! single-machine ones; model runtimes and alternative stores plug in
//! behind the same traits.

pub mod chunker;
pub mod embedder;
pub mod fs;
pub mod store;
pub mod watch;

pub use chunker::{Chunker, ParagraphChunker, TextChunk};
pub use embedder::{Embedder, HashEmbedder};
pub use fs::{FileStat, FileSystem, LocalFileSystem, ScanFilters};
pub use store::{JsonlVectorStore, SearchHit, VectorStore};
pub use watch::{spawn_watcher, WatchConfig, WatcherHandle};

#[cfg(any(test, feature = "test-support"))]
pub use embedder::FlakyEmbedder;
