//! SQLite metadata store and FTS5 full-text search index.
//!
//! This module owns all persisted state: file records, chunks, embeddings,
//! symbols, cross-file links, bootstrap progress, and query usage metrics.
//! It also provides full-text search via FTS5 and is the source of truth
//! the incremental indexer and search providers read/write against.
//!
//! ## Concurrency
//!
//! SQLite is configured in WAL mode so readers never block on a writer.
//! Only one writer is allowed at a time (a SQLite constraint, not just a
//! convention), so all write paths funnel through a single `Mutex`-guarded
//! connection. Reads that don't need a consistent multi-statement view can
//! also go through the mutex -- WAL mode makes that cheap enough that a
//! second read-only connection isn't worth the complexity yet.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{CoreError, CoreResult};
use crate::types::{
    BootstrapProgress, BootstrapStatus, Chunk, ChunkKind, DependencyKind, Embedding, FileState,
    Language, Link, Symbol,
};

/// SQLite-backed metadata and full-text search index.
pub struct Store {
    conn: Mutex<Connection>,
}

/// Aggregate counts of bootstrap progress rows, by status.
#[derive(Debug, Clone, Copy, Default)]
pub struct BootstrapCounts {
    /// Rows still queued.
    pub pending: u64,
    /// Rows currently being processed.
    pub processing: u64,
    /// Rows finished successfully.
    pub completed: u64,
    /// Rows that failed.
    pub failed: u64,
}

impl BootstrapCounts {
    /// Total rows tracked, across every status.
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }
}

impl Store {
    /// Open or create a store at the given path.
    pub fn open(db_path: &Path) -> CoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "cache_size", "-64000")?; // 64MB cache
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Self::ensure_schema(&conn)?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory store. Used by tests and by callers that want a
    /// disposable index (e.g. a dry-run scan).
    pub fn open_in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::ensure_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Create all tables, indexes, and triggers if they don't exist.
    fn ensure_schema(conn: &Connection) -> CoreResult<()> {
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    /// Run an integrity check on the database.
    pub fn check_integrity(&self) -> CoreResult<bool> {
        let conn = self.conn.lock();
        let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Force a WAL checkpoint, folding the write-ahead log back into the
    /// main database file. Called on graceful shutdown.
    pub fn checkpoint(&self) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // file_state
    // -----------------------------------------------------------------

    /// Look up a file's state by its repo-relative path, including
    /// soft-deleted rows.
    pub fn get_file_state(&self, relative_path: &str) -> CoreResult<Option<FileState>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, relative_path, content_hash, size_bytes, mtime_ns, language, kind, \
             fingerprint, indexed_at, is_deleted FROM file_state WHERE relative_path = ?1",
            params![relative_path],
            row_to_file_state,
        )
        .optional()
        .map_err(CoreError::from)
    }

    /// Look up a file's state by its ID.
    pub fn get_file_state_by_id(&self, file_id: i64) -> CoreResult<Option<FileState>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, relative_path, content_hash, size_bytes, mtime_ns, language, kind, \
             fingerprint, indexed_at, is_deleted FROM file_state WHERE id = ?1",
            params![file_id],
            row_to_file_state,
        )
        .optional()
        .map_err(CoreError::from)
    }

    /// Insert or update a file's state, keyed on `relative_path`. Returns
    /// the row ID (existing or newly assigned).
    pub fn upsert_file_state(&self, state: &FileState) -> CoreResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO file_state \
                (relative_path, content_hash, size_bytes, mtime_ns, language, kind, \
                 fingerprint, indexed_at, is_deleted) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0) \
             ON CONFLICT(relative_path) DO UPDATE SET \
                content_hash = excluded.content_hash, \
                size_bytes = excluded.size_bytes, \
                mtime_ns = excluded.mtime_ns, \
                language = excluded.language, \
                kind = excluded.kind, \
                fingerprint = excluded.fingerprint, \
                indexed_at = excluded.indexed_at, \
                is_deleted = 0",
            params![
                state.relative_path,
                state.content_hash,
                state.size_bytes as i64,
                state.mtime_ns,
                state.language.map(|l| l.as_str()),
                state.kind,
                state.fingerprint,
                state.indexed_at,
            ],
        )?;
        conn.query_row(
            "SELECT id FROM file_state WHERE relative_path = ?1",
            params![state.relative_path],
            |row| row.get(0),
        )
        .map_err(CoreError::from)
    }

    /// Soft-delete a file: its chunks/embeddings/symbols/links are left in
    /// place for the caller's cascade bookkeeping, but the file no longer
    /// shows up in `list_active_files`.
    pub fn mark_file_deleted(&self, file_id: i64) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute("UPDATE file_state SET is_deleted = 1 WHERE id = ?1", params![file_id])?;
        Ok(())
    }

    /// Permanently remove a file and cascade-delete its chunks, embeddings,
    /// symbols, and links.
    pub fn delete_file(&self, file_id: i64) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM file_state WHERE id = ?1", params![file_id])?;
        Ok(())
    }

    /// All non-deleted files, for reconciliation scans.
    pub fn list_active_files(&self) -> CoreResult<Vec<FileState>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, relative_path, content_hash, size_bytes, mtime_ns, language, kind, \
             fingerprint, indexed_at, is_deleted FROM file_state WHERE is_deleted = 0",
        )?;
        let rows = stmt.query_map([], row_to_file_state)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    /// Count of active (non-deleted) files, for status reporting.
    pub fn active_file_count(&self) -> CoreResult<u64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM file_state WHERE is_deleted = 0", [], |row| row.get(0))
            .map(|n: i64| n as u64)
            .map_err(CoreError::from)
    }

    // -----------------------------------------------------------------
    // chunks / embeddings / symbols
    // -----------------------------------------------------------------

    /// Replace everything derived from `file_id` -- its chunks, embeddings,
    /// and symbols -- in a single transaction. Returns the newly inserted
    /// chunks with their assigned IDs, in ordinal order.
    ///
    /// This is the one write path the incremental indexer uses per file:
    /// re-chunking a file always supersedes its prior derived state rather
    /// than patching it incrementally, since ordinals can shift.
    pub fn replace_file_contents(
        &self,
        file_id: i64,
        chunks: &[Chunk],
        embeddings: &[(u32, Embedding)],
        symbols: &[Symbol],
    ) -> CoreResult<Vec<Chunk>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM chunks WHERE file_id = ?1", params![file_id])?;
        tx.execute("DELETE FROM symbols WHERE file_id = ?1", params![file_id])?;

        let mut persisted = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            tx.execute(
                "INSERT INTO chunks \
                    (file_id, ordinal, kind, start_line, end_line, token_estimate, content, \
                     summary, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    file_id,
                    chunk.ordinal,
                    chunk.kind.as_str(),
                    chunk.start_line,
                    chunk.end_line,
                    chunk.token_estimate,
                    chunk.content,
                    chunk.summary,
                    chunk.created_at,
                ],
            )?;
            let chunk_id = tx.last_insert_rowid();
            persisted.push(Chunk { id: chunk_id, file_id, ..chunk.clone() });
        }

        for (ordinal, embedding) in embeddings {
            let Some(chunk) = persisted.iter().find(|c| c.ordinal == *ordinal) else {
                continue;
            };
            tx.execute(
                "INSERT INTO embeddings (chunk_id, model, dimensions, vector, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(chunk_id, model) DO UPDATE SET vector = excluded.vector, \
                    dimensions = excluded.dimensions, created_at = excluded.created_at",
                params![
                    chunk.id,
                    embedding.model,
                    embedding.dimensions as i64,
                    vector_to_blob(&embedding.vector),
                    embedding.created_at,
                ],
            )?;
        }

        for symbol in symbols {
            let chunk_id = symbol
                .chunk_id
                .or_else(|| persisted.iter().find(|c| c.start_line <= symbol.start_line.unwrap_or(0) && c.end_line >= symbol.end_line.unwrap_or(0)).map(|c| c.id));
            tx.execute(
                "INSERT INTO symbols \
                    (file_id, chunk_id, kind, name, qualified_name, signature, language, \
                     start_line, end_line) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    file_id,
                    chunk_id,
                    symbol.kind.as_str(),
                    symbol.name,
                    symbol.qualified_name,
                    symbol.signature,
                    symbol.language.map(|l| l.as_str()),
                    symbol.start_line,
                    symbol.end_line,
                ],
            )?;
        }

        tx.commit()?;
        Ok(persisted)
    }

    /// All chunks belonging to a file, in ordinal order.
    pub fn get_chunks_for_file(&self, file_id: i64) -> CoreResult<Vec<Chunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, file_id, ordinal, kind, start_line, end_line, token_estimate, content, \
             summary, created_at FROM chunks WHERE file_id = ?1 ORDER BY ordinal",
        )?;
        let rows = stmt.query_map(params![file_id], row_to_chunk)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    /// Fetch a single chunk by ID.
    pub fn get_chunk(&self, chunk_id: i64) -> CoreResult<Option<Chunk>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, file_id, ordinal, kind, start_line, end_line, token_estimate, content, \
             summary, created_at FROM chunks WHERE id = ?1",
            params![chunk_id],
            row_to_chunk,
        )
        .optional()
        .map_err(CoreError::from)
    }

    /// Chunks immediately before/after `chunk_id` within the same file,
    /// within `window` ordinal positions on either side. Used by the
    /// neighbor expander (C19).
    pub fn neighbor_chunks(&self, chunk_id: i64, window: u32) -> CoreResult<Vec<Chunk>> {
        let conn = self.conn.lock();
        let (file_id, ordinal): (i64, u32) = conn.query_row(
            "SELECT file_id, ordinal FROM chunks WHERE id = ?1",
            params![chunk_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let low = ordinal.saturating_sub(window);
        let high = ordinal + window;
        let mut stmt = conn.prepare(
            "SELECT id, file_id, ordinal, kind, start_line, end_line, token_estimate, content, \
             summary, created_at FROM chunks \
             WHERE file_id = ?1 AND ordinal BETWEEN ?2 AND ?3 AND ordinal != ?4 \
             ORDER BY ordinal",
        )?;
        let rows = stmt.query_map(params![file_id, low, high, ordinal], row_to_chunk)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    /// The relative path of the file a chunk belongs to.
    pub fn file_path_for_chunk(&self, chunk_id: i64) -> CoreResult<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT f.relative_path FROM chunks c JOIN file_state f ON f.id = c.file_id \
             WHERE c.id = ?1",
            params![chunk_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(CoreError::from)
    }

    /// Every embedding for the given model, as `(chunk_id, vector)` pairs.
    /// Used by the semantic provider's brute-force cosine scan (no ANN
    /// index is carried -- see `DESIGN.md`).
    pub fn all_embeddings(&self, model: &str) -> CoreResult<Vec<(i64, Vec<f32>)>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT chunk_id, vector FROM embeddings WHERE model = ?1")?;
        let rows = stmt.query_map(params![model], |row| {
            let chunk_id: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((chunk_id, blob_to_vector(&blob)))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    // -----------------------------------------------------------------
    // full-text search
    // -----------------------------------------------------------------

    /// Full-text search over chunk content, ranked by BM25 (lower/more
    /// negative `rank` is a better match in SQLite's FTS5 convention; this
    /// returns the negated value so higher is better, matching every other
    /// provider's score orientation).
    pub fn search_fts(&self, query: &str, limit: usize) -> CoreResult<Vec<(i64, f64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT rowid, -bm25(chunks_fts) AS score FROM chunks_fts \
             WHERE chunks_fts MATCH ?1 ORDER BY score DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![query, limit as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
        });
        match rows {
            Ok(rows) => rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from),
            // A malformed FTS5 MATCH expression (stray quotes, bare NEAR, ...)
            // degrades to zero results rather than surfacing a query error.
            Err(rusqlite::Error::SqliteFailure(_, _)) => Ok(Vec::new()),
            Err(e) => Err(CoreError::from(e)),
        }
    }

    // -----------------------------------------------------------------
    // symbols
    // -----------------------------------------------------------------

    /// Symbols whose name or qualified name contains `query` (case
    /// insensitive), ranked with exact-name matches first.
    pub fn search_symbols_by_name(&self, query: &str, limit: usize) -> CoreResult<Vec<Symbol>> {
        let conn = self.conn.lock();
        let pattern = format!("%{}%", query.to_lowercase());
        let mut stmt = conn.prepare(
            "SELECT id, file_id, chunk_id, kind, name, qualified_name, signature, language, \
             start_line, end_line FROM symbols \
             WHERE lower(name) LIKE ?1 OR lower(qualified_name) LIKE ?1 \
             ORDER BY (lower(name) = ?2) DESC, length(name) ASC LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![pattern, query.to_lowercase(), limit as i64],
            row_to_symbol,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    /// Fetch a single symbol by ID.
    pub fn get_symbol(&self, symbol_id: i64) -> CoreResult<Option<Symbol>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, file_id, chunk_id, kind, name, qualified_name, signature, language, \
             start_line, end_line FROM symbols WHERE id = ?1",
            params![symbol_id],
            row_to_symbol,
        )
        .optional()
        .map_err(CoreError::from)
    }

    /// All symbols defined in a file.
    pub fn symbols_for_file(&self, file_id: i64) -> CoreResult<Vec<Symbol>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, file_id, chunk_id, kind, name, qualified_name, signature, language, \
             start_line, end_line FROM symbols WHERE file_id = ?1 ORDER BY start_line",
        )?;
        let rows = stmt.query_map(params![file_id], row_to_symbol)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    // -----------------------------------------------------------------
    // links
    // -----------------------------------------------------------------

    /// Persist a single link row. Links are additive and are not deleted
    /// as part of `replace_file_contents` since their source chunk ID
    /// cascades away on its own when the owning chunk is replaced.
    pub fn insert_link(&self, link: &Link) -> CoreResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO links (source_chunk_id, target_file_id, target_chunk_id, kind, label, score) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                link.source_chunk_id,
                link.target_file_id,
                link.target_chunk_id,
                link.kind.as_str(),
                link.label,
                link.score,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Links originating from a chunk.
    pub fn links_from_chunk(&self, chunk_id: i64) -> CoreResult<Vec<Link>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, source_chunk_id, target_file_id, target_chunk_id, kind, label, score \
             FROM links WHERE source_chunk_id = ?1",
        )?;
        let rows = stmt.query_map(params![chunk_id], row_to_link)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    // -----------------------------------------------------------------
    // bootstrap progress
    // -----------------------------------------------------------------

    /// Record (or update) a file's bootstrap status.
    pub fn upsert_bootstrap_progress(
        &self,
        progress: &BootstrapProgress,
        priority_rank: i64,
    ) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO bootstrap_progress (relative_path, status, error, priority_rank) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(relative_path) DO UPDATE SET \
                status = excluded.status, error = excluded.error, \
                priority_rank = excluded.priority_rank",
            params![progress.relative_path, progress.status.as_str(), progress.error, priority_rank],
        )?;
        Ok(())
    }

    /// The next pending file to bootstrap, in priority order (lowest
    /// `priority_rank` first, i.e. highest priority).
    pub fn next_pending_bootstrap(&self) -> CoreResult<Option<BootstrapProgress>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT relative_path, status, error FROM bootstrap_progress \
             WHERE status = 'PENDING' ORDER BY priority_rank ASC LIMIT 1",
            [],
            row_to_bootstrap_progress,
        )
        .optional()
        .map_err(CoreError::from)
    }

    /// Aggregate bootstrap counts, for `EngineStatus`/progress reporting.
    pub fn bootstrap_counts(&self) -> CoreResult<BootstrapCounts> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM bootstrap_progress GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        let mut counts = BootstrapCounts::default();
        for row in rows {
            let (status, n) = row?;
            match BootstrapStatus::from_str_lossy(&status) {
                BootstrapStatus::Pending => counts.pending = n,
                BootstrapStatus::Processing => counts.processing = n,
                BootstrapStatus::Completed => counts.completed = n,
                BootstrapStatus::Failed => counts.failed = n,
            }
        }
        Ok(counts)
    }

    /// Clear all bootstrap progress rows. Called once bootstrap completes,
    /// so a later incremental-only run doesn't see a stale completed set.
    pub fn clear_bootstrap_progress(&self) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM bootstrap_progress", [])?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // usage metrics
    // -----------------------------------------------------------------

    /// Record a single query's usage metrics, for observability.
    pub fn record_usage_metrics(
        &self,
        recorded_at: i64,
        query_fingerprint: &str,
        providers: &str,
        result_count: usize,
        tokens_used: u32,
        duration_ms: u64,
    ) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO usage_metrics \
                (recorded_at, query_fingerprint, providers, result_count, tokens_used, duration_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                recorded_at,
                query_fingerprint,
                providers,
                result_count as i64,
                tokens_used,
                duration_ms as i64,
            ],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// row mapping helpers
// ---------------------------------------------------------------------------

fn row_to_file_state(row: &Row<'_>) -> rusqlite::Result<FileState> {
    let language: Option<String> = row.get(5)?;
    Ok(FileState {
        id: row.get(0)?,
        relative_path: row.get(1)?,
        content_hash: row.get(2)?,
        size_bytes: row.get::<_, i64>(3)? as u64,
        mtime_ns: row.get(4)?,
        language: language.map(|l| Language::from_str_lossy(&l)),
        kind: row.get(6)?,
        fingerprint: row.get(7)?,
        indexed_at: row.get(8)?,
        is_deleted: row.get::<_, i64>(9)? != 0,
    })
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let kind: String = row.get(3)?;
    Ok(Chunk {
        id: row.get(0)?,
        file_id: row.get(1)?,
        ordinal: row.get::<_, i64>(2)? as u32,
        kind: ChunkKind::from_str_lossy(&kind),
        start_line: row.get::<_, i64>(4)? as u32,
        end_line: row.get::<_, i64>(5)? as u32,
        token_estimate: row.get::<_, Option<i64>>(6)?.map(|n| n as u32),
        content: row.get(7)?,
        summary: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn row_to_symbol(row: &Row<'_>) -> rusqlite::Result<Symbol> {
    let kind: String = row.get(3)?;
    let language: Option<String> = row.get(7)?;
    Ok(Symbol {
        id: row.get(0)?,
        file_id: row.get(1)?,
        chunk_id: row.get(2)?,
        kind: ChunkKind::from_str_lossy(&kind),
        name: row.get(4)?,
        qualified_name: row.get(5)?,
        signature: row.get(6)?,
        language: language.map(|l| Language::from_str_lossy(&l)),
        start_line: row.get::<_, Option<i64>>(8)?.map(|n| n as u32),
        end_line: row.get::<_, Option<i64>>(9)?.map(|n| n as u32),
    })
}

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<Link> {
    let kind: String = row.get(4)?;
    Ok(Link {
        id: row.get(0)?,
        source_chunk_id: row.get(1)?,
        target_file_id: row.get(2)?,
        target_chunk_id: row.get(3)?,
        kind: DependencyKind::from_str_lossy(&kind),
        label: row.get(5)?,
        score: row.get(6)?,
    })
}

fn row_to_bootstrap_progress(row: &Row<'_>) -> rusqlite::Result<BootstrapProgress> {
    let status: String = row.get(1)?;
    Ok(BootstrapProgress {
        relative_path: row.get(0)?,
        status: BootstrapStatus::from_str_lossy(&status),
        error: row.get(2)?,
    })
}

/// Serialize an `f32` vector to little-endian bytes for BLOB storage.
fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for x in vector {
        bytes.extend_from_slice(&x.to_le_bytes());
    }
    bytes
}

/// Inverse of `vector_to_blob`. Ignores a trailing partial element rather
/// than panicking on a corrupt row.
fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkKind;

    fn sample_file_state(path: &str) -> FileState {
        FileState {
            id: 0,
            relative_path: path.into(),
            content_hash: "abc123".into(),
            size_bytes: 42,
            mtime_ns: 1_000,
            language: Some(Language::Rust),
            kind: Some("source".into()),
            fingerprint: Some("fp1".into()),
            indexed_at: 1_700_000_000,
            is_deleted: false,
        }
    }

    fn sample_chunk(file_id: i64, ordinal: u32) -> Chunk {
        Chunk {
            id: 0,
            file_id,
            ordinal,
            kind: ChunkKind::Function,
            start_line: 1,
            end_line: 10,
            token_estimate: Some(64),
            content: "fn hello() {}".into(),
            summary: Some("hello".into()),
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_open_creates_database() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = Store::open(&dir.path().join("test.db")).expect("open store");
        assert!(store.check_integrity().expect("integrity check"));
    }

    #[test]
    fn test_upsert_file_state_is_idempotent_on_path() {
        let store = Store::open_in_memory().expect("open store");
        let state = sample_file_state("src/main.rs");
        let id1 = store.upsert_file_state(&state).expect("first upsert");
        let id2 = store.upsert_file_state(&state).expect("second upsert");
        assert_eq!(id1, id2);
        assert_eq!(store.list_active_files().expect("list").len(), 1);
    }

    #[test]
    fn test_soft_deleted_file_excluded_from_active_list() {
        let store = Store::open_in_memory().expect("open store");
        let id = store.upsert_file_state(&sample_file_state("src/lib.rs")).expect("upsert");
        store.mark_file_deleted(id).expect("mark deleted");
        assert!(store.list_active_files().expect("list").is_empty());
        assert!(store.get_file_state_by_id(id).expect("get").unwrap().is_deleted);
    }

    #[test]
    fn test_replace_file_contents_round_trips_chunks() {
        let store = Store::open_in_memory().expect("open store");
        let file_id = store.upsert_file_state(&sample_file_state("src/a.rs")).expect("upsert");
        let chunks = vec![sample_chunk(file_id, 0), sample_chunk(file_id, 1)];
        let persisted =
            store.replace_file_contents(file_id, &chunks, &[], &[]).expect("replace contents");
        assert_eq!(persisted.len(), 2);
        assert!(persisted.iter().all(|c| c.id != 0));

        let fetched = store.get_chunks_for_file(file_id).expect("get chunks");
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].ordinal, 0);
        assert_eq!(fetched[1].ordinal, 1);
    }

    #[test]
    fn test_replace_file_contents_supersedes_prior_chunks() {
        let store = Store::open_in_memory().expect("open store");
        let file_id = store.upsert_file_state(&sample_file_state("src/a.rs")).expect("upsert");
        store
            .replace_file_contents(file_id, &[sample_chunk(file_id, 0), sample_chunk(file_id, 1)], &[], &[])
            .expect("first replace");
        store
            .replace_file_contents(file_id, &[sample_chunk(file_id, 0)], &[], &[])
            .expect("second replace");
        assert_eq!(store.get_chunks_for_file(file_id).expect("get chunks").len(), 1);
    }

    #[test]
    fn test_embeddings_round_trip_through_blob() {
        let store = Store::open_in_memory().expect("open store");
        let file_id = store.upsert_file_state(&sample_file_state("src/a.rs")).expect("upsert");
        let chunk = sample_chunk(file_id, 0);
        let embedding = Embedding {
            id: 0,
            chunk_id: 0,
            model: "test-model".into(),
            dimensions: 4,
            vector: vec![0.1, 0.2, 0.3, 0.4],
            created_at: 1_700_000_000,
        };
        store
            .replace_file_contents(file_id, &[chunk], &[(0, embedding)], &[])
            .expect("replace with embedding");

        let all = store.all_embeddings("test-model").expect("all embeddings");
        assert_eq!(all.len(), 1);
        assert!((all[0].1[0] - 0.1).abs() < 1e-6);
        assert!((all[0].1[3] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_fts_search_finds_matching_chunk() {
        let store = Store::open_in_memory().expect("open store");
        let file_id = store.upsert_file_state(&sample_file_state("src/a.rs")).expect("upsert");
        let mut chunk = sample_chunk(file_id, 0);
        chunk.content = "fn compute_checksum(data: &[u8]) -> u32 { crc32(data) }".into();
        store.replace_file_contents(file_id, &[chunk], &[], &[]).expect("replace");

        let results = store.search_fts("checksum", 10).expect("fts search");
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_fts_search_malformed_query_returns_empty_not_error() {
        let store = Store::open_in_memory().expect("open store");
        let results = store.search_fts("\"unterminated", 10).expect("fts search should not error");
        assert!(results.is_empty());
    }

    #[test]
    fn test_symbol_search_prefers_exact_name_match() {
        let store = Store::open_in_memory().expect("open store");
        let file_id = store.upsert_file_state(&sample_file_state("src/a.rs")).expect("upsert");
        let chunk = sample_chunk(file_id, 0);
        let persisted = store.replace_file_contents(file_id, &[chunk], &[], &[]).expect("replace");
        let chunk_id = persisted[0].id;

        let symbols = vec![
            Symbol {
                id: 0,
                file_id,
                chunk_id: Some(chunk_id),
                kind: ChunkKind::Function,
                name: "parse_config_file".into(),
                qualified_name: Some("crate::config::parse_config_file".into()),
                signature: None,
                language: Some(Language::Rust),
                start_line: Some(1),
                end_line: Some(10),
            },
            Symbol {
                id: 0,
                file_id,
                chunk_id: Some(chunk_id),
                kind: ChunkKind::Function,
                name: "parse".into(),
                qualified_name: Some("crate::config::parse".into()),
                signature: None,
                language: Some(Language::Rust),
                start_line: Some(1),
                end_line: Some(10),
            },
        ];
        store.replace_file_contents(file_id, &[sample_chunk(file_id, 0)], &[], &symbols).expect("replace with symbols");

        let results = store.search_symbols_by_name("parse", 10).expect("symbol search");
        assert_eq!(results[0].name, "parse");
    }

    #[test]
    fn test_neighbor_chunks_respects_window() {
        let store = Store::open_in_memory().expect("open store");
        let file_id = store.upsert_file_state(&sample_file_state("src/a.rs")).expect("upsert");
        let chunks: Vec<_> = (0..5).map(|i| sample_chunk(file_id, i)).collect();
        let persisted = store.replace_file_contents(file_id, &chunks, &[], &[]).expect("replace");
        let middle = persisted[2].id;

        let neighbors = store.neighbor_chunks(middle, 1).expect("neighbors");
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].ordinal, 1);
        assert_eq!(neighbors[1].ordinal, 3);
    }

    #[test]
    fn test_bootstrap_progress_priority_order() {
        let store = Store::open_in_memory().expect("open store");
        store
            .upsert_bootstrap_progress(
                &BootstrapProgress {
                    relative_path: "b.rs".into(),
                    status: BootstrapStatus::Pending,
                    error: None,
                },
                5,
            )
            .expect("upsert");
        store
            .upsert_bootstrap_progress(
                &BootstrapProgress {
                    relative_path: "a.rs".into(),
                    status: BootstrapStatus::Pending,
                    error: None,
                },
                1,
            )
            .expect("upsert");

        let next = store.next_pending_bootstrap().expect("next pending").unwrap();
        assert_eq!(next.relative_path, "a.rs");
    }

    #[test]
    fn test_bootstrap_counts_aggregate_by_status() {
        let store = Store::open_in_memory().expect("open store");
        for (path, status) in [
            ("a.rs", BootstrapStatus::Completed),
            ("b.rs", BootstrapStatus::Completed),
            ("c.rs", BootstrapStatus::Failed),
        ] {
            store
                .upsert_bootstrap_progress(
                    &BootstrapProgress { relative_path: path.into(), status, error: None },
                    0,
                )
                .expect("upsert");
        }
        let counts = store.bootstrap_counts().expect("counts");
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 3);
    }
}
