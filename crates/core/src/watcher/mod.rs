//! File system watcher with two-stage debouncing (C7).
//!
//! A raw filesystem event is noisy: an editor save can fire several
//! CREATE/MODIFY events for the same path within milliseconds, and a large
//! `git checkout` can touch thousands of paths at once. Two stages tame
//! this before anything reaches the indexer:
//!
//! 1. **Per-path debounce** (`debounce_ms`) -- repeated events for the same
//!    path collapse to the most recent one, last-event-wins.
//! 2. **Batch window** (`batch_window_ms`) -- debounced events are held and
//!    coalesced for a further window before being flushed as a group, so a
//!    burst of file changes becomes one indexing pass instead of many.
//!
//! The watcher runs on a dedicated OS thread (the `notify` backend is
//! synchronous), bridging into the async `PipelineEvent` channel the rest
//! of the pipeline consumes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{IndexingConfig, WatcherConfig};
use crate::discovery::{self, validate::Validator};
use crate::error::{CoreError, CoreResult};
use crate::types::PipelineEvent;

/// Lifecycle state of a running watcher, surfaced for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Not watching.
    Stopped,
    /// Performing the initial full scan before live events are accepted.
    Scanning,
    /// Live, debounced event delivery.
    Running,
    /// Shutting down; draining pending debounced events before stopping.
    Flushing,
}

/// What kind of raw change a path experienced, before mapping to a
/// `PipelineEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawChange {
    Upsert,
    Remove,
}

/// File system watcher that emits `PipelineEvent`s for the incremental
/// indexer.
pub struct FileWatcher {
    root: PathBuf,
    watcher_config: WatcherConfig,
    indexing_config: IndexingConfig,
}

impl FileWatcher {
    /// Create a new file watcher for the given root directory.
    pub fn new(root: &Path, watcher_config: &WatcherConfig, indexing_config: &IndexingConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            watcher_config: watcher_config.clone(),
            indexing_config: indexing_config.clone(),
        }
    }

    /// Perform a full directory scan and emit `FileChanged` for every file
    /// that passes validation. Returns the number of events sent.
    pub fn full_scan(&self, tx: &mpsc::Sender<PipelineEvent>) -> CoreResult<usize> {
        let files = discovery::scan_directory(&self.root, &self.indexing_config)?;
        let mut sent = 0;
        for file in &files {
            if tx.blocking_send(PipelineEvent::FileChanged { path: file.absolute_path.clone() }).is_err() {
                break;
            }
            sent += 1;
        }
        Ok(sent)
    }

    /// Start watching for file changes, sending `PipelineEvent`s through
    /// `tx` until `cancel` is triggered.
    ///
    /// Runs `Scanning` (unless `skip_startup_scan`) then `Running`, and
    /// transitions to `Flushing` once `cancel` fires, draining any
    /// in-flight debounce/batch window before returning.
    pub async fn watch(
        &self,
        tx: mpsc::Sender<PipelineEvent>,
        cancel: CancellationToken,
        skip_startup_scan: bool,
    ) -> CoreResult<()> {
        if !skip_startup_scan {
            let scan_tx = tx.clone();
            let scan_watcher = FileWatcher::new(&self.root, &self.watcher_config, &self.indexing_config);
            tokio::task::spawn_blocking(move || scan_watcher.full_scan(&scan_tx))
                .await
                .map_err(|e| CoreError::Internal(format!("startup scan task panicked: {e}")))??;
        }

        let root = self.root.clone();
        let watcher_config = self.watcher_config.clone();
        let indexing_config = self.indexing_config.clone();
        let worker_cancel = cancel.clone();

        tokio::task::spawn_blocking(move || {
            run_debounced_watch(&root, &watcher_config, &indexing_config, &tx, &worker_cancel)
        })
        .await
        .map_err(|e| CoreError::Internal(format!("watcher thread panicked: {e}")))?
    }

    /// Stop watching by cancelling `cancel`, run `f`, then return. The
    /// caller resumes with `watch(..., skip_startup_scan: true)` so the
    /// initial scan isn't repeated.
    pub async fn pause_while<F, Fut>(cancel: &CancellationToken, f: F) -> CoreResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = CoreResult<()>>,
    {
        cancel.cancel();
        f().await
    }
}

/// Runs on a dedicated OS thread: owns the `notify` watcher and the
/// two-stage debounce state machine. Blocks until `cancel` fires.
fn run_debounced_watch(
    root: &Path,
    watcher_config: &WatcherConfig,
    indexing_config: &IndexingConfig,
    tx: &mpsc::Sender<PipelineEvent>,
    cancel: &CancellationToken,
) -> CoreResult<()> {
    let (raw_tx, raw_rx) = std_mpsc::channel::<notify::Result<Event>>();

    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
        let _ = raw_tx.send(res);
    })
    .map_err(|e| CoreError::Internal(format!("failed to create file watcher: {e}")))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| CoreError::Internal(format!("failed to watch {}: {e}", root.display())))?;

    let validator = Validator::new(root, indexing_config)?;
    let debounce = Duration::from_millis(watcher_config.debounce_ms.max(1));
    let batch_window = Duration::from_millis(watcher_config.batch_window_ms);
    let tick = Duration::from_millis(25);

    let mut pending: HashMap<PathBuf, (RawChange, Instant)> = HashMap::new();
    let mut ready: HashMap<PathBuf, RawChange> = HashMap::new();
    let mut last_flush = Instant::now();

    loop {
        if cancel.is_cancelled() {
            flush_batch(&mut ready, tx);
            return Ok(());
        }

        match raw_rx.recv_timeout(tick) {
            Ok(Ok(event)) => handle_event(event, root, &validator, &mut pending),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "file watcher overflow or backend error, triggering rescan");
                ready.clear();
                pending.clear();
                if let Err(rescan_err) =
                    FileWatcher::new(root, watcher_config, indexing_config).full_scan(tx)
                {
                    tracing::warn!(error = %rescan_err, "overflow rescan failed");
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                return Err(CoreError::Internal("file watcher channel disconnected".into()));
            }
        }

        let now = Instant::now();
        let matured: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, (_, seen_at))| now.duration_since(*seen_at) >= debounce)
            .map(|(path, _)| path.clone())
            .collect();
        for path in matured {
            if let Some((change, _)) = pending.remove(&path) {
                ready.insert(path, change);
            }
        }

        if !ready.is_empty() && now.duration_since(last_flush) >= batch_window {
            flush_batch(&mut ready, tx);
            last_flush = now;
        }
    }
}

fn handle_event(
    event: Event,
    root: &Path,
    validator: &Validator,
    pending: &mut HashMap<PathBuf, (RawChange, Instant)>,
) {
    let change = match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => RawChange::Upsert,
        EventKind::Remove(_) => RawChange::Remove,
        _ => return,
    };

    for path in event.paths {
        if change == RawChange::Upsert {
            if path.is_dir() || validator.validate(root, &path).is_err() {
                continue;
            }
        }
        pending.insert(path, (change, Instant::now()));
    }
}

fn flush_batch(ready: &mut HashMap<PathBuf, RawChange>, tx: &mpsc::Sender<PipelineEvent>) {
    for (path, change) in ready.drain() {
        let event = match change {
            RawChange::Upsert => PipelineEvent::FileChanged { path },
            RawChange::Remove => PipelineEvent::FileDeleted { path },
        };
        if tx.blocking_send(event).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_scan_emits_event_per_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.rs"), "fn main() {}\n").expect("write");
        std::fs::write(dir.path().join("b.py"), "def f(): pass\n").expect("write");

        let indexing_config = IndexingConfig::default();
        let watcher = FileWatcher::new(dir.path(), &WatcherConfig::default(), &indexing_config);
        let (tx, mut rx) = mpsc::channel(16);

        let count = watcher.full_scan(&tx).expect("scan");
        drop(tx);

        let mut seen = 0;
        while rx.try_recv().is_ok() {
            seen += 1;
        }
        assert_eq!(count, 2);
        assert_eq!(seen, 2);
    }

    #[tokio::test]
    async fn test_watch_detects_new_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexing_config = IndexingConfig::default();
        let watcher_config = WatcherConfig { debounce_ms: 20, batch_window_ms: 20, ..WatcherConfig::default() };

        let watcher = FileWatcher::new(dir.path(), &watcher_config, &indexing_config);
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let watch_cancel = cancel.clone();
        let handle = tokio::spawn(async move { watcher.watch(tx, watch_cancel, true).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(dir.path().join("new_file.rs"), "fn hello() {}\n").expect("write");

        let mut found = false;
        for _ in 0..50 {
            match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
                Ok(Some(PipelineEvent::FileChanged { path })) => {
                    if path.file_name().and_then(|n| n.to_str()) == Some("new_file.rs") {
                        found = true;
                        break;
                    }
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }

        cancel.cancel();
        let _ = handle.await;
        assert!(found, "expected a FileChanged event for the newly created file");
    }
}
