//! Bootstrap orchestrator (C13).
//!
//! The first index of a repository prioritizes small, high-signal files
//! (README-like filenames, configured priority extensions, small source
//! files) over large or low-signal ones, so a caller querying mid-bootstrap
//! already has useful coverage. Progress is persisted to `bootstrap_progress`
//! so a crash or restart resumes from where it left off instead of
//! rescanning everything.

use std::path::Path;

use crate::config::Config;
use crate::discovery::{self, DiscoveredFile};
use crate::embedder::Embedder;
use crate::engine::indexer::{Indexer, ProgressReport};
use crate::error::CoreResult;
use crate::store::Store;
use crate::types::{BootstrapProgress, BootstrapStatus};

/// Outcome of a full bootstrap sweep.
#[derive(Debug, Clone, Default)]
pub struct BootstrapSummary {
    /// Total files queued for bootstrap.
    pub total: u64,
    /// Files that finished successfully.
    pub completed: u64,
    /// Files that failed and were recorded with an error.
    pub failed: u64,
}

/// Names that trump extension/size ranking regardless of case.
const SPECIAL_FILENAMES: &[&str] = &["readme", "readme.md", "license", "main", "index", "mod.rs", "__init__.py"];

/// Run (or resume) a prioritized bootstrap sweep of `root`.
///
/// If `bootstrap_progress` already has rows (a prior run was interrupted),
/// resumes from the existing queue instead of rescanning and re-prioritizing.
pub fn run(
    store: &Store,
    embedder: &Embedder,
    config: &Config,
    root: &Path,
    mut progress: Option<&mut dyn FnMut(ProgressReport)>,
) -> CoreResult<BootstrapSummary> {
    let counts = store.bootstrap_counts()?;
    if counts.total() == 0 {
        let files = discovery::scan_directory(root, &config.indexing)?;
        enqueue(store, config, &files)?;
    }

    let indexer = Indexer::new(store, embedder, config, root);
    let mut summary = BootstrapSummary::default();
    let total = store.bootstrap_counts()?.total();
    summary.total = total;
    let mut processed = 0u64;

    while let Some(next) = store.next_pending_bootstrap()? {
        store.upsert_bootstrap_progress(
            &BootstrapProgress { relative_path: next.relative_path.clone(), status: BootstrapStatus::Processing, error: None },
            priority_rank_unchanged(),
        )?;

        let absolute = root.join(&next.relative_path);
        let outcome = indexer.update(&[absolute.clone()], false, None);
        processed += 1;

        match outcome {
            Ok(result) if result.failures.is_empty() => {
                store.upsert_bootstrap_progress(
                    &BootstrapProgress { relative_path: next.relative_path.clone(), status: BootstrapStatus::Completed, error: None },
                    priority_rank_unchanged(),
                )?;
                summary.completed += 1;
            }
            Ok(result) => {
                let message = result.failures.first().map(|f| f.message.clone()).unwrap_or_default();
                store.upsert_bootstrap_progress(
                    &BootstrapProgress {
                        relative_path: next.relative_path.clone(),
                        status: BootstrapStatus::Failed,
                        error: Some(message),
                    },
                    priority_rank_unchanged(),
                )?;
                summary.failed += 1;
            }
            Err(e) => {
                store.upsert_bootstrap_progress(
                    &BootstrapProgress {
                        relative_path: next.relative_path.clone(),
                        status: BootstrapStatus::Failed,
                        error: Some(e.to_string()),
                    },
                    priority_rank_unchanged(),
                )?;
                summary.failed += 1;
            }
        }

        if let Some(cb) = progress.as_deref_mut() {
            cb(ProgressReport {
                total: total as usize,
                processed: processed as usize,
                succeeded: summary.completed as usize,
                failed: summary.failed as usize,
                last_path: absolute,
                last_error: None,
            });
        }
    }

    if store.bootstrap_counts()?.pending == 0 && store.bootstrap_counts()?.processing == 0 {
        store.clear_bootstrap_progress()?;
    }

    Ok(summary)
}

/// `upsert_bootstrap_progress` takes a rank on every call and overwrites it
/// on conflict, but rank only orders `PENDING` rows; once a row moves to
/// `PROCESSING`/`COMPLETED`/`FAILED` its rank is never read again, so any
/// value is safe here.
fn priority_rank_unchanged() -> i64 {
    i64::MAX
}

/// Enqueue every discovered file with a deterministic priority rank: lower
/// ranks are processed first.
fn enqueue(store: &Store, config: &Config, files: &[DiscoveredFile]) -> CoreResult<()> {
    let mut ranked: Vec<(&DiscoveredFile, i64)> =
        files.iter().map(|f| (f, priority_rank(f, config))).collect();
    ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.relative_path.cmp(&b.0.relative_path)));

    for (file, rank) in ranked {
        store.upsert_bootstrap_progress(
            &BootstrapProgress { relative_path: file.relative_path.clone(), status: BootstrapStatus::Pending, error: None },
            rank,
        )?;
    }
    Ok(())
}

/// Lower is higher priority. Special filenames first, then configured
/// priority extensions, then small files, then everything else by size,
/// with oversized files pushed to the back.
fn priority_rank(file: &DiscoveredFile, config: &Config) -> i64 {
    let lower_name = Path::new(&file.relative_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();

    if SPECIAL_FILENAMES.iter().any(|n| *n == lower_name) {
        return 0;
    }

    let ext = Path::new(&file.relative_path).extension().and_then(|e| e.to_str()).unwrap_or("");
    if config.bootstrap.priority_extensions.iter().any(|p| p.trim_start_matches('.') == ext) {
        return 1;
    }

    let size_kb = file.size_bytes as f64 / 1024.0;
    let size_mb = file.size_bytes as f64 / (1024.0 * 1024.0);

    if size_mb > config.bootstrap.oversized_threshold_mb {
        return 1_000_000 + file.size_bytes as i64;
    }
    if size_kb <= config.bootstrap.small_threshold_kb {
        return 2;
    }

    100 + file.size_bytes as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config as EngineConfig;

    #[test]
    fn test_bootstrap_indexes_all_files_and_clears_progress() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("README.md"), "# hi\n\nmore text here\n").expect("write");
        std::fs::write(dir.path().join("big.py"), "def f():\n    pass\n".repeat(50)).expect("write");

        let store = Store::open_in_memory().expect("store");
        let config = EngineConfig::defaults(dir.path());
        let embedder = Embedder::degraded(&config.embedding);

        let summary = run(&store, &embedder, &config, dir.path(), None).expect("bootstrap");
        assert_eq!(summary.total, 2);
        assert_eq!(summary.completed, 2);
        assert_eq!(store.bootstrap_counts().unwrap().total(), 0);
        assert_eq!(store.active_file_count().unwrap(), 2);
    }

    #[test]
    fn test_special_filename_outranks_large_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = EngineConfig::defaults(dir.path());
        let readme = DiscoveredFile { absolute_path: dir.path().join("README.md"), relative_path: "README.md".into(), size_bytes: 50 };
        let big = DiscoveredFile { absolute_path: dir.path().join("big.py"), relative_path: "big.py".into(), size_bytes: 5_000_000 };
        assert!(priority_rank(&readme, &config) < priority_rank(&big, &config));
    }
}
