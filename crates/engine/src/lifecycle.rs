// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Folder lifecycle service: one owner task per monitored folder.
//!
//! The owner task holds the state machine, the task queue and the
//! fingerprint index; nothing else mutates them. Embedding work
//! (hash → chunk → embed) fans out to worker tasks bounded by the global
//! permit pool, but store and fingerprint writes happen back in the owner,
//! in order: `store.upsert` before `fingerprint.upsert`, `store.remove`
//! before `fingerprint.remove`. A crash therefore leaves the index behind
//! (reprocess on restart), never ahead.

use crate::file_state::{self, FileStateInput, LastOutcome};
use crate::state_machine::{FolderStateMachine, Transition};
use crate::task_queue::TaskQueue;
use fmcp_adapters::{Chunker, Embedder, FileSystem, ScanFilters, TextChunk, VectorStore};
use fmcp_core::{
    CoreError, ErrorKind, Fingerprint, FolderProgress, FolderStatus, LifecycleUpdate, Outcome,
    TaskAction, TaskId, WatchKind,
};
use fmcp_storage::FingerprintIndex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-folder configuration.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub folder: PathBuf,
    pub model: String,
    pub max_concurrent_files: usize,
    pub max_attempts: u32,
    pub max_consecutive_errors: u32,
    pub scan_filters: ScanFilters,
}

/// Capabilities and channels the service runs against.
#[derive(Clone)]
pub struct LifecycleDeps {
    pub fs: Arc<dyn FileSystem>,
    pub chunker: Arc<dyn Chunker>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    /// Global in-flight embedding permits, shared across folders.
    pub permits: Arc<Semaphore>,
    /// Status/progress reports to the orchestrator.
    pub updates: mpsc::Sender<LifecycleUpdate>,
}

/// Commands accepted by the owner task.
enum Command {
    /// Full scan followed by indexing.
    Scan,
    /// Debounced watcher changes (absolute paths).
    Changes(Vec<(PathBuf, WatchKind)>),
    /// Watcher overflow: full rescan.
    Rescan,
    /// Watcher stream died.
    WatcherLost(String),
    /// Back to pending, clearing tasks and progress.
    Reset,
    /// Point-in-time folder snapshot for queries.
    Inspect(oneshot::Sender<FolderSnapshot>),
    /// Drain in-flight work and exit.
    Stop(oneshot::Sender<()>),
}

/// Point-in-time view of one folder's lifecycle, for queries and tests.
#[derive(Debug, Clone)]
pub struct FolderSnapshot {
    pub status: FolderStatus,
    pub progress: FolderProgress,
    pub tasks: Vec<fmcp_core::EmbeddingTask>,
    pub consecutive_errors: u32,
    pub error: Option<String>,
}

/// Handle to a running lifecycle service. Shareable; `stop` is idempotent.
pub struct LifecycleHandle {
    tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
    join: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl LifecycleHandle {
    pub async fn request_scan(&self) {
        let _ = self.tx.send(Command::Scan).await;
    }

    pub async fn notify_changes(&self, changes: Vec<(PathBuf, WatchKind)>) {
        let _ = self.tx.send(Command::Changes(changes)).await;
    }

    pub async fn request_rescan(&self) {
        let _ = self.tx.send(Command::Rescan).await;
    }

    pub async fn watcher_lost(&self, message: String) {
        let _ = self.tx.send(Command::WatcherLost(message)).await;
    }

    pub async fn reset(&self) {
        let _ = self.tx.send(Command::Reset).await;
    }

    /// Snapshot of status, progress and tasks. `None` if the service is gone.
    pub async fn inspect(&self) -> Option<FolderSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Command::Inspect(tx)).await.ok()?;
        rx.await.ok()
    }

    /// Stop the service: cancels pending work, drains in-flight tasks to a
    /// safe checkpoint, then resolves.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Stop(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        let join = self.join.lock().take();
        if let Some(join) = join {
            let _ = join.await;
        }
    }
}

/// Result of one worker's hash → chunk → embed run.
struct EmbeddedDoc {
    hash: String,
    size: u64,
    mtime_ms: u64,
    chunks: Vec<TextChunk>,
    vectors: Vec<Vec<f32>>,
}

enum IndexingEnd {
    Completed,
    Failed(String),
    Stopped,
}

/// The owner-task service for one folder.
pub struct FolderLifecycleService {
    config: LifecycleConfig,
    deps: LifecycleDeps,
    machine: FolderStateMachine,
    queue: TaskQueue,
    index: FingerprintIndex,
    /// Last processing outcome per relative path (in-memory; restart
    /// starts clean and the fingerprint index drives decisions).
    outcomes: HashMap<PathBuf, LastOutcome>,
    consecutive_errors: u32,
    error_message: Option<String>,
    cancel: CancellationToken,
}

impl FolderLifecycleService {
    /// Spawn the owner task. The fingerprint index is opened (and repaired
    /// if corrupt) before the task starts; open failure is an error.
    pub fn spawn(config: LifecycleConfig, deps: LifecycleDeps) -> Outcome<LifecycleHandle> {
        let index = FingerprintIndex::open(&config.folder)
            .map_err(|e| CoreError::store_corruption(format!("open fingerprint index: {e}")))?;
        if index.was_rebuilt() {
            info!(folder = %config.folder.display(), "fingerprint index rebuilt, full reindex scheduled");
        }

        let cancel = CancellationToken::new();
        let service = Self {
            queue: TaskQueue::new(config.max_concurrent_files, config.max_attempts),
            machine: FolderStateMachine::new(),
            index,
            outcomes: HashMap::new(),
            consecutive_errors: 0,
            error_message: None,
            cancel: cancel.clone(),
            config,
            deps,
        };

        let (tx, rx) = mpsc::channel(64);
        let join = tokio::spawn(service.run(rx));
        Ok(LifecycleHandle { tx, cancel, join: parking_lot::Mutex::new(Some(join)) })
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            if self.cancel.is_cancelled() {
                if let Command::Stop(ack) = command {
                    let _ = ack.send(());
                    break;
                }
                continue;
            }
            match command {
                Command::Scan | Command::Rescan => self.scan_and_index(None).await,
                Command::Changes(changes) => self.scan_and_index(Some(changes)).await,
                Command::WatcherLost(message) => {
                    self.fail(CoreError::watcher_lost(message));
                    self.emit().await;
                }
                Command::Reset => {
                    self.machine.apply(Transition::Reset);
                    self.queue.clear();
                    self.outcomes.clear();
                    self.consecutive_errors = 0;
                    self.error_message = None;
                    self.emit().await;
                }
                Command::Inspect(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                Command::Stop(ack) => {
                    let _ = ack.send(());
                    break;
                }
            }
        }
        debug!(folder = %self.config.folder.display(), "lifecycle service stopped");
    }

    /// One full cycle: scan (full or targeted) → indexing → active.
    ///
    /// Never propagates errors to the caller; failures land in the state
    /// machine and the emitted updates.
    async fn scan_and_index(&mut self, targeted: Option<Vec<(PathBuf, WatchKind)>>) {
        if self.machine.apply(Transition::StartScanning).is_none() {
            return;
        }
        self.error_message = None;
        self.emit().await;

        let task_count = match self.scan(targeted).await {
            Ok(count) => count,
            Err(e) => {
                self.machine.apply(Transition::ScanFailed);
                self.error_message = Some(e.to_string());
                warn!(folder = %self.config.folder.display(), error = %e, "scan failed");
                self.emit().await;
                return;
            }
        };

        self.machine.apply(Transition::ScanCompleted { task_count });
        self.emit().await;
        if self.machine.status() != FolderStatus::Ready {
            return;
        }

        self.machine.apply(Transition::StartIndexing);
        self.emit().await;

        match self.run_indexing().await {
            IndexingEnd::Completed => {
                self.machine.apply(Transition::IndexingCompleted);
                self.emit().await;
            }
            IndexingEnd::Failed(message) => {
                self.machine.apply(Transition::IndexingFailed);
                self.error_message = Some(message);
                self.emit().await;
            }
            IndexingEnd::Stopped => {}
        }
    }

    /// Reconcile disk against the fingerprint index, producing the task set.
    async fn scan(&mut self, targeted: Option<Vec<(PathBuf, WatchKind)>>) -> Outcome<usize> {
        self.deps.embedder.validate_model(&self.config.model)?;

        // The task set always reflects changes not yet reconciled; terminal
        // tasks from the previous cycle are history, not work.
        self.queue.clear();

        let folder = self.config.folder.clone();
        let store_hashes = self.deps.store.list_fingerprints(&folder).await?;

        match targeted {
            None => {
                let files = self.deps.fs.scan(&folder, &self.config.scan_filters)?;
                for rel in &files {
                    self.evaluate_file(rel, &store_hashes);
                }
                // Fingerprints with no file on disk become removals
                let to_remove: Vec<PathBuf> = self
                    .index
                    .get_all()
                    .keys()
                    .filter(|known| !files.contains(known))
                    .cloned()
                    .collect();
                for rel in to_remove {
                    self.queue.enqueue(rel, TaskAction::RemoveEmbeddings);
                }
            }
            Some(changes) => {
                for (path, kind) in changes {
                    let Ok(rel) = path.strip_prefix(&folder).map(Path::to_path_buf) else {
                        continue;
                    };
                    match kind {
                        WatchKind::Deleted => {
                            if self.index.get(&rel).is_some() {
                                self.queue.enqueue(rel, TaskAction::RemoveEmbeddings);
                            }
                        }
                        WatchKind::Created | WatchKind::Modified => {
                            self.evaluate_file(&rel, &store_hashes);
                        }
                    }
                }
            }
        }

        Ok(self.queue.len())
    }

    /// Ask the file-state service about one file and enqueue as decided.
    fn evaluate_file(&mut self, rel: &Path, store_hashes: &HashMap<PathBuf, String>) {
        let abs = self.config.folder.join(rel);
        let current_hash = match self.deps.fs.hash_content(&abs) {
            Ok(hash) => hash,
            Err(e) => {
                // Vanished or unreadable mid-scan; the watcher will bring
                // it back when it stabilises.
                warn!(file = %rel.display(), error = %e, "skipping unhashable file");
                return;
            }
        };

        // A stored fingerprint only counts when the vector store agrees;
        // a rebuilt or damaged store must force re-embedding.
        let stored = self
            .index
            .get(rel)
            .filter(|fp| store_hashes.get(rel).is_some_and(|h| fp.matches(h)));

        let decision = file_state::decide(&FileStateInput {
            current_hash: &current_hash,
            stored,
            last_outcome: self.outcomes.get(rel).copied(),
            max_attempts: self.config.max_attempts,
        });

        if let Some(action) = decision.action.task_action() {
            debug!(file = %rel.display(), ?action, reason = decision.reason, "queueing task");
            self.queue.enqueue(rel.to_path_buf(), action);
        }
    }

    /// Work the task set until every task is terminal, the folder fails,
    /// or the service is stopped.
    async fn run_indexing(&mut self) -> IndexingEnd {
        let mut workers: JoinSet<(TaskId, Outcome<EmbeddedDoc>)> = JoinSet::new();
        let cancel = self.cancel.clone();

        loop {
            // Launch eligible tasks while permits are immediately available.
            while let Some(id) = self.queue.next_pending(Instant::now()) {
                let Some(task) = self.queue.get(id) else { break };
                if task.action == TaskAction::RemoveEmbeddings {
                    if !self.queue.start(id) {
                        break;
                    }
                    let completion = self.execute_removal(id).await;
                    if let Some(end) = self.apply_completion(id, completion).await {
                        return end;
                    }
                    continue;
                }
                match Arc::clone(&self.deps.permits).try_acquire_owned() {
                    Ok(permit) => {
                        if !self.queue.start(id) {
                            break;
                        }
                        let Some(task) = self.queue.get(id) else { break };
                        let rel = task.file.clone();
                        let folder = self.config.folder.clone();
                        let model = self.config.model.clone();
                        let fs = Arc::clone(&self.deps.fs);
                        let chunker = Arc::clone(&self.deps.chunker);
                        let embedder = Arc::clone(&self.deps.embedder);
                        workers.spawn(async move {
                            let result = embed_file(&folder, &rel, &model, fs, chunker, embedder).await;
                            drop(permit);
                            (id, result)
                        });
                    }
                    Err(_) => break,
                }
            }

            if workers.is_empty() && self.queue.all_terminal() {
                return IndexingEnd::Completed;
            }

            let retry_at = self.queue.next_retry_at();
            let idle = workers.is_empty();
            let backoff_timer = async move {
                match retry_at {
                    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                    None => std::future::pending().await,
                }
            };
            // Waiting for a shared permit: poll again shortly. Another
            // folder releasing a permit does not wake this loop directly.
            let permit_poll = async move {
                if idle && retry_at.is_none() {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await
                } else {
                    std::future::pending().await
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.drain(&mut workers).await;
                    return IndexingEnd::Stopped;
                }
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    let completion = match joined {
                        Ok((id, result)) => (id, result),
                        Err(e) => {
                            warn!(error = %e, "embedding worker panicked or was aborted");
                            continue;
                        }
                    };
                    let (id, result) = completion;
                    if let Some(end) = self.finish_embed(id, result).await {
                        return end;
                    }
                }
                _ = backoff_timer => {}
                _ = permit_poll => {}
            }
        }
    }

    /// Store-then-fingerprint writes for a finished embed, plus task
    /// completion bookkeeping.
    async fn finish_embed(
        &mut self,
        id: TaskId,
        result: Outcome<EmbeddedDoc>,
    ) -> Option<IndexingEnd> {
        let completion = match result {
            Ok(doc) => self.persist_embedded(id, doc).await,
            Err(e) => Err(e),
        };
        self.apply_completion(id, completion).await
    }

    async fn persist_embedded(&mut self, id: TaskId, doc: EmbeddedDoc) -> Outcome<()> {
        let rel = self.queue.get(id).map(|t| t.file.clone()).ok_or_else(|| {
            CoreError::validation("completion for unknown task")
        })?;

        // Order is mandatory: store first, fingerprint second.
        self.deps
            .store
            .upsert_document(&self.config.folder, &rel, &doc.hash, &doc.chunks, &doc.vectors)
            .await?;
        self.index
            .upsert(rel, Fingerprint::new(doc.hash, doc.size, doc.mtime_ms))
            .map_err(|e| CoreError::transient_io(format!("fingerprint upsert: {e}")))?;
        Ok(())
    }

    async fn execute_removal(&mut self, id: TaskId) -> Outcome<()> {
        let rel = self.queue.get(id).map(|t| t.file.clone()).ok_or_else(|| {
            CoreError::validation("completion for unknown task")
        })?;

        // Same ordering rationale as upserts: store first.
        self.deps.store.remove_document(&self.config.folder, &rel).await?;
        self.index
            .remove(&rel)
            .map_err(|e| CoreError::transient_io(format!("fingerprint remove: {e}")))?;
        Ok(())
    }

    /// Apply a task completion; returns a folder-fatal end if warranted.
    async fn apply_completion(
        &mut self,
        id: TaskId,
        completion: Outcome<()>,
    ) -> Option<IndexingEnd> {
        let fatal = match &completion {
            Err(e) if e.kind == ErrorKind::ModelUnavailable => Some(e.to_string()),
            _ => None,
        };

        match &completion {
            Ok(()) => self.consecutive_errors = 0,
            Err(e) if e.kind == ErrorKind::TransientIo => self.consecutive_errors += 1,
            Err(_) => {}
        }

        self.queue.complete(id, completion, Instant::now());
        if let Some(task) = self.queue.get(id) {
            self.outcomes.insert(
                task.file.clone(),
                LastOutcome {
                    failed: task.status == fmcp_core::TaskStatus::Error
                        || task.last_error.is_some(),
                    attempts: task.attempts,
                },
            );
        }
        self.emit().await;

        if let Some(message) = fatal {
            return Some(IndexingEnd::Failed(message));
        }
        if self.consecutive_errors >= self.config.max_consecutive_errors {
            return Some(IndexingEnd::Failed(format!(
                "{} consecutive store errors",
                self.consecutive_errors
            )));
        }
        None
    }

    /// Await all in-flight workers, persisting what they finished.
    ///
    /// After this returns no task is left in-progress: finished work is
    /// completed normally, unfinished in-flight tasks fall back to pending.
    async fn drain(&mut self, workers: &mut JoinSet<(TaskId, Outcome<EmbeddedDoc>)>) {
        while let Some(joined) = workers.join_next().await {
            if let Ok((id, result)) = joined {
                let completion = match result {
                    Ok(doc) => self.persist_embedded(id, doc).await,
                    Err(e) => Err(e),
                };
                self.queue.complete(id, completion, Instant::now());
            }
        }
    }

    fn fail(&mut self, error: CoreError) {
        // Watcher loss outside a scan: force the machine into error via
        // the scanning path so the transition stays legal.
        self.machine.apply(Transition::StartScanning);
        self.machine.apply(Transition::ScanFailed);
        self.error_message = Some(error.to_string());
    }

    fn snapshot(&self) -> FolderSnapshot {
        FolderSnapshot {
            status: self.machine.status(),
            progress: self.queue.progress(),
            tasks: self.queue.tasks().cloned().collect(),
            consecutive_errors: self.consecutive_errors,
            error: self.error_message.clone(),
        }
    }

    /// Report status and progress to the orchestrator.
    async fn emit(&self) {
        let status = self.machine.status();
        let progress = match status {
            FolderStatus::Pending | FolderStatus::Scanning => FolderProgress::default(),
            _ => self.queue.progress(),
        };
        let update = LifecycleUpdate {
            folder: self.config.folder.clone(),
            status,
            progress,
            error: self.error_message.clone(),
        };
        let _ = self.deps.updates.send(update).await;
    }
}

/// Worker body: hash, chunk and embed one file. No store access here;
/// persistence happens in the owner so writes stay ordered.
async fn embed_file(
    folder: &Path,
    rel: &Path,
    model: &str,
    fs: Arc<dyn FileSystem>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
) -> Outcome<EmbeddedDoc> {
    let abs = folder.join(rel);
    let hash = fs.hash_content(&abs)?;
    let stat = fs.stat(&abs)?;
    let chunks = chunker.chunk(&abs)?;
    let vectors = if chunks.is_empty() {
        Vec::new()
    } else {
        embedder.embed(model, &chunks).await?
    };
    Ok(EmbeddedDoc { hash, size: stat.size, mtime_ms: stat.mtime_ms, chunks, vectors })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
