// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Debounced folder watcher using file notifications.
//!
//! One `notify::RecommendedWatcher` per watched root, bridged into tokio.
//! Raw events are coalesced per path within the debounce window so the
//! lifecycle layer sees exactly one event per stable change. Renames are
//! delivered as deleted(from) + created(to). Excluded directories (the
//! sidecar included) never produce events.

use fmcp_core::{CoreError, WatchEvent, WatchKind};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::fs::DEFAULT_EXCLUDES;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub debounce: Duration,
    /// Directory names excluded on top of the defaults.
    pub exclude_dirs: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce: DEFAULT_DEBOUNCE, exclude_dirs: Vec::new() }
    }
}

/// Handle to a running watcher; dropping or stopping it ends the stream.
pub struct WatcherHandle {
    cancel: CancellationToken,
    // NOTE(lifetime): held to keep the OS watch registered; released on drop
    #[allow(dead_code)]
    watcher: RecommendedWatcher,
}

impl WatcherHandle {
    /// Stop the debounce loop and release the OS watch.
    pub fn stop(self) {
        self.cancel.cancel();
    }
}

/// Start watching `root`, emitting debounced events on `events_tx`.
///
/// The stream ends with [`WatchEvent::Lost`] if the backend dies; transient
/// backend errors are logged and survived.
pub fn spawn_watcher(
    root: &Path,
    config: WatchConfig,
    events_tx: mpsc::Sender<WatchEvent>,
) -> Result<WatcherHandle, CoreError> {
    let (raw_tx, raw_rx) = mpsc::channel::<notify::Result<notify::Event>>(1024);

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        // Runs on the notify thread; the loop side keeps up, and a closed
        // channel just means the watcher is shutting down.
        let _ = raw_tx.blocking_send(res);
    })
    .map_err(|e| CoreError::watcher_lost(format!("create watcher: {e}")))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| CoreError::watcher_lost(format!("watch {}: {e}", root.display())))?;

    let cancel = CancellationToken::new();
    tokio::spawn(run_debounce(root.to_path_buf(), config, raw_rx, events_tx, cancel.clone()));

    Ok(WatcherHandle { cancel, watcher })
}

/// Debounce loop: coalesce raw events per path, flush after the window.
pub(crate) async fn run_debounce(
    root: PathBuf,
    config: WatchConfig,
    mut raw_rx: mpsc::Receiver<notify::Result<notify::Event>>,
    events_tx: mpsc::Sender<WatchEvent>,
    cancel: CancellationToken,
) {
    let mut pending: indexmap::IndexMap<PathBuf, WatchKind> = indexmap::IndexMap::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let flush_timer = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,

            raw = raw_rx.recv() => match raw {
                Some(Ok(event)) => {
                    let classified = classify(&event);
                    if classified.rescan {
                        debug!(root = %root.display(), "watch backend requested rescan");
                        let _ = events_tx.send(WatchEvent::Rescan).await;
                        pending.clear();
                        deadline = None;
                        continue;
                    }
                    for (path, kind) in classified.changes {
                        if is_excluded(&root, &path, &config.exclude_dirs) {
                            continue;
                        }
                        let merged = merge_kinds(pending.get(&path).copied(), kind);
                        match merged {
                            Some(kind) => { pending.insert(path, kind); }
                            None => { pending.shift_remove(&path); }
                        }
                    }
                    if !pending.is_empty() && deadline.is_none() {
                        deadline = Some(Instant::now() + config.debounce);
                    }
                }
                Some(Err(e)) => {
                    // Permission flaps and vanishing paths mid-rename are
                    // expected; keep watching.
                    warn!(root = %root.display(), error = %e, "watch error, continuing");
                }
                None => {
                    let _ = events_tx
                        .send(WatchEvent::Lost { message: "watch stream ended".to_string() })
                        .await;
                    break;
                }
            },

            _ = flush_timer => {
                for (path, kind) in pending.drain(..) {
                    if events_tx.send(WatchEvent::Change { path, kind }).await.is_err() {
                        return;
                    }
                }
                deadline = None;
            }
        }
    }
}

pub(crate) struct Classified {
    pub changes: Vec<(PathBuf, WatchKind)>,
    pub rescan: bool,
}

/// Map a raw notify event to per-path change kinds.
///
/// Renames split into deleted(from) + created(to); access events are noise.
pub(crate) fn classify(event: &notify::Event) -> Classified {
    if event.need_rescan() {
        return Classified { changes: Vec::new(), rescan: true };
    }

    let kinds: Vec<WatchKind> = match event.kind {
        EventKind::Create(_) => vec![WatchKind::Created; event.paths.len()],
        EventKind::Remove(_) => vec![WatchKind::Deleted; event.paths.len()],
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut kinds = Vec::with_capacity(event.paths.len());
            // Convention: [from, to]
            if !event.paths.is_empty() {
                kinds.push(WatchKind::Deleted);
            }
            for _ in 1..event.paths.len() {
                kinds.push(WatchKind::Created);
            }
            kinds
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            vec![WatchKind::Deleted; event.paths.len()]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            vec![WatchKind::Created; event.paths.len()]
        }
        EventKind::Modify(_) => vec![WatchKind::Modified; event.paths.len()],
        EventKind::Access(_) => Vec::new(),
        EventKind::Any | EventKind::Other => vec![WatchKind::Modified; event.paths.len()],
    };

    let changes = event.paths.iter().cloned().zip(kinds).collect();
    Classified { changes, rescan: false }
}

/// Merge a new change into the pending kind for the same path.
///
/// `None` means the path cancelled out (created then deleted inside one
/// window; it never stably existed).
pub(crate) fn merge_kinds(prev: Option<WatchKind>, next: WatchKind) -> Option<WatchKind> {
    match (prev, next) {
        (None, kind) => Some(kind),
        (Some(WatchKind::Created), WatchKind::Modified) => Some(WatchKind::Created),
        (Some(WatchKind::Created), WatchKind::Deleted) => None,
        (Some(WatchKind::Modified), WatchKind::Deleted) => Some(WatchKind::Deleted),
        (Some(WatchKind::Deleted), WatchKind::Created) => Some(WatchKind::Modified),
        (Some(_), kind) => Some(kind),
    }
}

/// Whether an event path falls under an excluded directory of `root`.
pub(crate) fn is_excluded(root: &Path, path: &Path, extra: &[String]) -> bool {
    let rel = match path.strip_prefix(root) {
        Ok(rel) => rel,
        // Outside the root (watch backend quirk): ignore.
        Err(_) => return true,
    };
    rel.components().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        DEFAULT_EXCLUDES.contains(&name.as_ref()) || extra.iter().any(|d| d.as_str() == name)
    })
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
