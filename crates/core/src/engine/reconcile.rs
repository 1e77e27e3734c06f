//! Startup reconciler (C14).
//!
//! Between process restarts the filesystem can drift from the store: files
//! edited while the watcher wasn't running, files deleted outside any
//! watched event, files added before the watcher attached. Reconciliation
//! diffs the store's active file set against a fresh directory scan and
//! brings the two back in line before the watcher takes over live events.
//!
//! `new = FS \ DB`, `modified = hash differs`, `deleted = DB \ FS`. All three
//! are applied through the same `Indexer::update` used everywhere else, so
//! reconciliation can't diverge from the incremental indexer's own
//! classification rules.

use std::collections::HashSet;
use std::path::Path;

use crate::config::Config;
use crate::discovery;
use crate::embedder::Embedder;
use crate::engine::indexer::{Indexer, ProgressReport, UpdateResult};
use crate::error::CoreResult;
use crate::store::Store;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileSummary {
    /// Files present on disk but not in the store.
    pub new: u64,
    /// Files present in both but whose content hash differs.
    pub modified: u64,
    /// Files unchanged since the last index.
    pub unchanged: u64,
    /// Files present in the store but missing from disk.
    pub deleted: u64,
    /// Per-file failures encountered while reconciling.
    pub failures: u64,
    /// Wall-clock time the reconciliation pass took, in milliseconds.
    pub duration_ms: u64,
}

/// Diff the store's active file set against a fresh scan of `root` and apply
/// whatever's needed to bring the store back in line: reindex new/modified
/// files and mark files absent from disk as deleted.
///
/// Run once at startup, before the watcher attaches -- the watcher then only
/// has to handle changes from this point forward, not any backlog.
pub fn run(
    store: &Store,
    embedder: &Embedder,
    config: &Config,
    root: &Path,
    progress: Option<&mut dyn FnMut(ProgressReport)>,
) -> CoreResult<ReconcileSummary> {
    let started = std::time::Instant::now();

    let discovered = discovery::scan_directory(root, &config.indexing)?;
    let active = store.list_active_files()?;
    let active_paths: HashSet<String> = active.iter().map(|f| f.relative_path.clone()).collect();
    let discovered_paths: HashSet<String> = discovered.iter().map(|f| f.relative_path.clone()).collect();

    // Everything discovered on disk is handed to the indexer; content-hash
    // comparison inside `Indexer::update` already tells new from modified
    // from unchanged, so reconciliation doesn't need to reclassify here.
    let scan_paths: Vec<std::path::PathBuf> = discovered.iter().map(|f| f.absolute_path.clone()).collect();
    let indexer = Indexer::new(store, embedder, config, root);
    let UpdateResult { new, modified, unchanged, failures, .. } =
        indexer.update(&scan_paths, false, progress)?;

    // Files the store thinks are active but that no longer exist on disk at
    // all (not just absent from this scan's include/exclude filters --
    // genuinely gone) are marked deleted explicitly, since `Indexer::update`
    // was only given the discovered set and never saw these paths.
    let mut deleted = 0u64;
    for relative_path in active_paths.difference(&discovered_paths) {
        let absolute = root.join(relative_path);
        if absolute.exists() {
            // Still on disk; just excluded by the current scan filters
            // (e.g. a newly added ignore pattern). Leave it indexed.
            continue;
        }
        if let Some(file) = active.iter().find(|f| &f.relative_path == relative_path) {
            store.mark_file_deleted(file.id)?;
            deleted += 1;
        }
    }

    Ok(ReconcileSummary {
        new,
        modified,
        unchanged,
        deleted,
        failures: failures.len() as u64,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config as EngineConfig;
    use crate::types::FileState;

    fn setup() -> (tempfile::TempDir, Store, Embedder, EngineConfig) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open_in_memory().expect("store");
        let config = EngineConfig::defaults(dir.path());
        let embedder = Embedder::degraded(&config.embedding);
        (dir, store, embedder, config)
    }

    #[test]
    fn test_reconcile_indexes_new_file_discovered_on_disk() {
        let (dir, store, embedder, config) = setup();
        std::fs::write(dir.path().join("a.py"), "def f():\n    pass\n").expect("write");

        let summary = run(&store, &embedder, &config, dir.path(), None).expect("reconcile");
        assert_eq!(summary.new, 1);
        assert_eq!(store.active_file_count().unwrap(), 1);
    }

    #[test]
    fn test_reconcile_marks_vanished_file_deleted() {
        let (dir, store, embedder, config) = setup();
        let path = dir.path().join("a.py");
        std::fs::write(&path, "def f():\n    pass\n").expect("write");
        run(&store, &embedder, &config, dir.path(), None).expect("first reconcile");

        std::fs::remove_file(&path).expect("remove");
        let summary = run(&store, &embedder, &config, dir.path(), None).expect("second reconcile");

        assert_eq!(summary.deleted, 1);
        assert_eq!(store.active_file_count().unwrap(), 0);
    }

    #[test]
    fn test_reconcile_reindexes_modified_file() {
        let (dir, store, embedder, config) = setup();
        let path = dir.path().join("a.py");
        std::fs::write(&path, "def f():\n    pass\n").expect("write");
        run(&store, &embedder, &config, dir.path(), None).expect("first reconcile");

        std::fs::write(&path, "def f():\n    return 1\n").expect("rewrite");
        let summary = run(&store, &embedder, &config, dir.path(), None).expect("second reconcile");

        assert_eq!(summary.modified, 1);
    }

    #[test]
    fn test_reconcile_unchanged_reports_no_churn() {
        let (dir, store, embedder, config) = setup();
        std::fs::write(dir.path().join("a.py"), "def f():\n    pass\n").expect("write");
        run(&store, &embedder, &config, dir.path(), None).expect("first reconcile");

        let summary = run(&store, &embedder, &config, dir.path(), None).expect("second reconcile");
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.new, 0);
        assert_eq!(summary.modified, 0);
    }

    #[test]
    fn test_reconcile_leaves_stale_row_with_no_matching_discovery_but_still_on_disk() {
        // A file that's still on disk but not returned by this scan (e.g.
        // newly excluded) should not be marked deleted.
        let (dir, store, embedder, config) = setup();
        store
            .upsert_file_state(&FileState {
                id: 0,
                relative_path: "ghost.py".into(),
                content_hash: "h".into(),
                size_bytes: 1,
                mtime_ns: 0,
                language: None,
                kind: None,
                fingerprint: None,
                indexed_at: 0,
                is_deleted: false,
            })
            .expect("seed file state");
        std::fs::write(dir.path().join("ghost.py"), "still here").expect("write");

        // ghost.py will actually be discovered and reindexed by the normal
        // scan (it's a valid .py file), so this mainly exercises that the
        // explicit-deletion pass doesn't double-count it.
        let summary = run(&store, &embedder, &config, dir.path(), None).expect("reconcile");
        assert_eq!(summary.deleted, 0);
    }
}
