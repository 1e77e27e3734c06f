//! Incremental indexer (C12).
//!
//! Takes a batch of filesystem paths -- from a full scan, a bootstrap sweep,
//! or a watcher event -- and brings the store's derived state (chunks,
//! embeddings, symbols) in line with what's on disk. `content_hash` is the
//! sole authority for "has this file changed"; a file whose hash is
//! unchanged from the stored `FileState` is skipped entirely.
//!
//! Parsing is gated on `Language::is_code()`: only languages with a
//! registered tree-sitter analyzer go through `parser::parse_file`, so an
//! unsupported language never sees `CoreError::Parse` -- it falls straight
//! through to the paragraph fallback chunker, exactly as an analyzer
//! returning no structural elements would.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::chunker;
use crate::config::Config;
use crate::discovery::ValidationReason;
use crate::embedder::Embedder;
use crate::error::{CoreError, CoreResult};
use crate::parser;
use crate::store::Store;
use crate::types::{Chunk, Embedding, FileState, Language, Symbol};

/// Aggregate outcome of one `Indexer::update` call.
#[derive(Debug, Clone, Default)]
pub struct UpdateResult {
    /// Files seen for the first time.
    pub new: u64,
    /// Files whose content hash changed.
    pub modified: u64,
    /// Files whose content hash matched the stored state; skipped.
    pub unchanged: u64,
    /// Files removed from the index (explicit delete or implicit sweep).
    pub deleted: u64,
    /// Total chunks (re)persisted across new/modified files.
    pub chunks_created: u64,
    /// Total symbols (re)persisted across new/modified files.
    pub symbols_extracted: u64,
    /// Per-file failures; the rest of the batch still completes.
    pub failures: Vec<IndexFailure>,
}

/// A single file's indexing failure, isolated from the rest of the batch.
#[derive(Debug, Clone)]
pub struct IndexFailure {
    /// Absolute path that failed to index.
    pub path: PathBuf,
    /// Human-readable cause.
    pub message: String,
}

/// Progress reported after each path is processed.
#[derive(Debug, Clone)]
pub struct ProgressReport {
    /// Total paths in this batch.
    pub total: usize,
    /// Paths processed so far, including failures.
    pub processed: usize,
    /// Paths that succeeded so far.
    pub succeeded: usize,
    /// Paths that failed so far.
    pub failed: usize,
    /// The path just processed.
    pub last_path: PathBuf,
    /// Error message, if the last path failed.
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    New,
    Modified,
    Unchanged,
}

enum ProcessOutcome {
    New(u64, u64),
    Modified(u64, u64),
    Unchanged,
    Deleted,
}

/// Owns the indexing algorithm; borrows `Store`/`Embedder`/`Config` rather
/// than holding its own copies, so `Engine` remains the single owner.
pub struct Indexer<'a> {
    store: &'a Store,
    embedder: &'a Embedder,
    config: &'a Config,
    repo_root: &'a Path,
}

impl<'a> Indexer<'a> {
    /// Build an indexer over `repo_root`, which must be the same root every
    /// path passed to `update` is absolute under.
    pub fn new(store: &'a Store, embedder: &'a Embedder, config: &'a Config, repo_root: &'a Path) -> Self {
        Self { store, embedder, config, repo_root }
    }

    /// Index or re-index every path in `paths`. A missing path is treated as
    /// a deletion. When `detect_implicit_deletions` is set, any active file
    /// under `repo_root` that is both absent from `paths` and missing from
    /// disk is also deleted -- used by the startup reconciler, not by
    /// per-event watcher updates (which already know exactly what changed).
    pub fn update(
        &self,
        paths: &[PathBuf],
        detect_implicit_deletions: bool,
        mut progress: Option<&mut dyn FnMut(ProgressReport)>,
    ) -> CoreResult<UpdateResult> {
        let mut result = UpdateResult::default();
        let total = paths.len();

        for (i, path) in paths.iter().enumerate() {
            let mut last_error = None;
            match self.process_path(path) {
                Ok(ProcessOutcome::New(chunks, symbols)) => {
                    result.new += 1;
                    result.chunks_created += chunks;
                    result.symbols_extracted += symbols;
                }
                Ok(ProcessOutcome::Modified(chunks, symbols)) => {
                    result.modified += 1;
                    result.chunks_created += chunks;
                    result.symbols_extracted += symbols;
                }
                Ok(ProcessOutcome::Unchanged) => result.unchanged += 1,
                Ok(ProcessOutcome::Deleted) => result.deleted += 1,
                Err(e) => {
                    let message = e.to_string();
                    last_error = Some(message.clone());
                    tracing::warn!(path = %path.display(), error = %message, "indexing failed for path");
                    result.failures.push(IndexFailure { path: path.clone(), message });
                }
            }

            if let Some(cb) = progress.as_deref_mut() {
                cb(ProgressReport {
                    total,
                    processed: i + 1,
                    succeeded: i + 1 - result.failures.len(),
                    failed: result.failures.len(),
                    last_path: path.clone(),
                    last_error,
                });
            }
        }

        if detect_implicit_deletions {
            result.deleted += self.sweep_deleted(paths)?;
        }

        Ok(result)
    }

    /// Mark as deleted every active file not in `seen` and no longer on disk.
    fn sweep_deleted(&self, seen: &[PathBuf]) -> CoreResult<u64> {
        let seen_relative: std::collections::HashSet<String> =
            seen.iter().filter_map(|p| relative_path(self.repo_root, p)).collect();

        let mut deleted = 0u64;
        for file in self.store.list_active_files()? {
            if seen_relative.contains(&file.relative_path) {
                continue;
            }
            if !self.repo_root.join(&file.relative_path).exists() {
                self.store.mark_file_deleted(file.id)?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn process_path(&self, path: &Path) -> CoreResult<ProcessOutcome> {
        if !path.exists() {
            return self.delete_path(path);
        }

        let relative = relative_path(self.repo_root, path)
            .ok_or_else(|| CoreError::Internal(format!("{} is not under the repo root", path.display())))?;

        let bytes = fs::read(path).map_err(|source| CoreError::Io { path: Some(path.to_path_buf()), source })?;
        if bytes.len() as u64 > self.config.indexing.max_file_size {
            return Err(CoreError::ValidationRejection {
                path: path.to_path_buf(),
                reason: ValidationReason::SizeLimitExceeded,
            });
        }

        let content_hash = hash_content(&bytes);
        let existing = self.store.get_file_state(&relative)?;

        let classification = match &existing {
            Some(state) if state.is_deleted => Classification::New,
            Some(state) if state.content_hash == content_hash && state.fingerprint.as_deref() == Some(&self.fingerprint()) => {
                Classification::Unchanged
            }
            Some(_) => Classification::Modified,
            None => Classification::New,
        };

        if classification == Classification::Unchanged {
            return Ok(ProcessOutcome::Unchanged);
        }

        let language = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| Language::from_extension(&e.to_lowercase()))
            .unwrap_or(Language::Unknown);

        let now = unix_now();
        let file_id = self.store.upsert_file_state(&FileState {
            id: existing.as_ref().map(|s| s.id).unwrap_or(0),
            relative_path: relative,
            content_hash,
            size_bytes: bytes.len() as u64,
            mtime_ns: mtime_ns(path),
            language: Some(language),
            kind: existing.as_ref().and_then(|s| s.kind.clone()),
            fingerprint: Some(self.fingerprint()),
            indexed_at: now,
            is_deleted: false,
        })?;

        let (chunks, symbols) = self.build_chunks(path, &bytes, language, file_id, now)?;
        let embeddings = self.embed_with_retry(&chunks);
        let persisted = self.store.replace_file_contents(file_id, &chunks, &embeddings, &symbols)?;

        Ok(match classification {
            Classification::New => ProcessOutcome::New(persisted.len() as u64, symbols.len() as u64),
            Classification::Modified => ProcessOutcome::Modified(persisted.len() as u64, symbols.len() as u64),
            Classification::Unchanged => unreachable!("handled above"),
        })
    }

    fn delete_path(&self, path: &Path) -> CoreResult<ProcessOutcome> {
        let Some(relative) = relative_path(self.repo_root, path) else {
            return Ok(ProcessOutcome::Unchanged);
        };
        if let Some(state) = self.store.get_file_state(&relative)? {
            if !state.is_deleted {
                self.store.mark_file_deleted(state.id)?;
                return Ok(ProcessOutcome::Deleted);
            }
        }
        Ok(ProcessOutcome::Unchanged)
    }

    /// Parse and chunk, falling back to the paragraph splitter whenever the
    /// language has no registered analyzer or produces no elements.
    fn build_chunks(
        &self,
        path: &Path,
        bytes: &[u8],
        language: Language,
        file_id: i64,
        now: i64,
    ) -> CoreResult<(Vec<Chunk>, Vec<Symbol>)> {
        if language.is_code() {
            match parser::parse_file(path, bytes, language) {
                Ok(elements) if !elements.is_empty() => {
                    return Ok(chunker::chunk_elements(&elements, file_id, language, self.config, now));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "parse failed; using fallback chunker");
                }
            }
        }

        let content = String::from_utf8_lossy(bytes);
        Ok((chunker::chunk_document(&content, file_id, self.config, now), Vec::new()))
    }

    /// Embed every chunk's content, retrying a batch with failures up to
    /// `embedding.retry_attempts` times with exponential backoff before
    /// accepting whichever chunks the embedder still couldn't produce a
    /// vector for (keyword search still finds those).
    fn embed_with_retry(&self, chunks: &[Chunk]) -> Vec<(u32, Embedding)> {
        if chunks.is_empty() || !self.embedder.is_available() {
            return Vec::new();
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let mut results = self.embedder.embed_batch(&texts);

        let mut attempt = 0;
        while results.iter().any(Option::is_none) && attempt < self.config.embedding.retry_attempts {
            attempt += 1;
            std::thread::sleep(Duration::from_millis(
                self.config.embedding.retry_backoff_ms.saturating_mul(1u64 << (attempt - 1)),
            ));
            let retry = self.embedder.embed_batch(&texts);
            for (slot, value) in results.iter_mut().zip(retry) {
                if slot.is_none() {
                    *slot = value;
                }
            }
        }

        let now = unix_now();
        let model = self.embedder.model_name().to_string();
        chunks
            .iter()
            .zip(results)
            .filter_map(|(chunk, vector)| {
                let vector = vector?;
                Some((
                    chunk.ordinal,
                    Embedding {
                        id: 0,
                        chunk_id: chunk.id,
                        model: model.clone(),
                        dimensions: vector.len(),
                        vector,
                        created_at: now,
                    },
                ))
            })
            .collect()
    }

    /// Opaque stamp of the settings that affect chunk/embedding output. A
    /// mismatch forces reindexing even when content_hash is unchanged.
    fn fingerprint(&self) -> String {
        format!(
            "{}:{}:{:.3}:{}",
            self.config.indexing.max_chunk_tokens,
            self.config.indexing.overlap_lines,
            self.config.indexing.overlap_fraction,
            self.embedder.model_name(),
        )
    }
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root).ok().map(|p| p.to_string_lossy().replace('\\', "/"))
}

fn hash_content(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn mtime_ns(path: &Path) -> i64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config as EngineConfig;

    fn setup() -> (tempfile::TempDir, Store, Embedder, EngineConfig) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open_in_memory().expect("store");
        let config = EngineConfig::defaults(dir.path());
        let embedder = Embedder::degraded(&config.embedding);
        (dir, store, embedder, config)
    }

    #[test]
    fn test_new_file_is_indexed() {
        let (dir, store, embedder, config) = setup();
        let path = dir.path().join("a.py");
        fs::write(&path, "def f():\n    pass\n").expect("write");

        let indexer = Indexer::new(&store, &embedder, &config, dir.path());
        let result = indexer.update(&[path], false, None).expect("update");

        assert_eq!(result.new, 1);
        assert!(result.chunks_created > 0);
        assert_eq!(store.active_file_count().unwrap(), 1);
    }

    #[test]
    fn test_unchanged_file_is_skipped() {
        let (dir, store, embedder, config) = setup();
        let path = dir.path().join("a.py");
        fs::write(&path, "def f():\n    pass\n").expect("write");

        let indexer = Indexer::new(&store, &embedder, &config, dir.path());
        indexer.update(&[path.clone()], false, None).expect("first index");
        let second = indexer.update(&[path], false, None).expect("second index");

        assert_eq!(second.unchanged, 1);
        assert_eq!(second.new, 0);
        assert_eq!(second.modified, 0);
    }

    #[test]
    fn test_modified_file_is_reindexed() {
        let (dir, store, embedder, config) = setup();
        let path = dir.path().join("a.py");
        fs::write(&path, "def f():\n    pass\n").expect("write");

        let indexer = Indexer::new(&store, &embedder, &config, dir.path());
        indexer.update(&[path.clone()], false, None).expect("first index");

        fs::write(&path, "def f():\n    return 1\n").expect("rewrite");
        let second = indexer.update(&[path], false, None).expect("reindex");

        assert_eq!(second.modified, 1);
    }

    #[test]
    fn test_deleted_path_marks_file_deleted() {
        let (dir, store, embedder, config) = setup();
        let path = dir.path().join("a.py");
        fs::write(&path, "def f():\n    pass\n").expect("write");

        let indexer = Indexer::new(&store, &embedder, &config, dir.path());
        indexer.update(&[path.clone()], false, None).expect("first index");
        fs::remove_file(&path).expect("remove");

        let second = indexer.update(&[path], false, None).expect("delete pass");
        assert_eq!(second.deleted, 1);
        assert_eq!(store.active_file_count().unwrap(), 0);
    }

    #[test]
    fn test_unsupported_language_falls_back_to_paragraph_chunker() {
        let (dir, store, embedder, config) = setup();
        let path = dir.path().join("notes.xyz");
        fs::write(&path, "first paragraph\nstill first\n\nsecond paragraph\nstill second\n").expect("write");

        let indexer = Indexer::new(&store, &embedder, &config, dir.path());
        let result = indexer.update(&[path], false, None).expect("update");

        assert_eq!(result.new, 1);
        assert!(result.chunks_created >= 1);
        assert_eq!(result.symbols_extracted, 0);
    }

    #[test]
    fn test_progress_callback_reports_every_path() {
        let (dir, store, embedder, config) = setup();
        let a = dir.path().join("a.py");
        let b = dir.path().join("b.py");
        fs::write(&a, "def f(): pass\n").expect("write");
        fs::write(&b, "def g(): pass\n").expect("write");

        let indexer = Indexer::new(&store, &embedder, &config, dir.path());
        let mut calls = 0;
        let mut cb = |report: ProgressReport| {
            calls += 1;
            assert_eq!(report.total, 2);
        };
        indexer.update(&[a, b], false, Some(&mut cb)).expect("update");
        assert_eq!(calls, 2);
    }
}
