//! Full-text (keyword/BM25) context provider, backed by SQLite FTS5.

use super::{ContextProvider, ProviderContext, ProviderHit};
use crate::error::CoreResult;

pub struct FullTextProvider;

impl ContextProvider for FullTextProvider {
    fn name(&self) -> &'static str {
        "full_text"
    }

    fn retrieve(&self, ctx: &ProviderContext<'_>, limit: usize) -> CoreResult<Vec<ProviderHit>> {
        let hits = ctx.store.search_fts(ctx.query, limit)?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }
        let max = hits.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);
        let min = hits.iter().map(|(_, s)| *s).fold(f64::MAX, f64::min);
        let range = max - min;

        Ok(hits
            .into_iter()
            .map(|(chunk_id, score)| {
                let normalized = if range > 0.0 { (score - min) / range } else { 1.0 };
                ProviderHit { chunk_id, score: normalized }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedder::Embedder;
    use crate::store::Store;
    use crate::types::{Chunk, ChunkKind, FileState};

    fn seed_chunk(store: &Store, content: &str) -> i64 {
        let file_id = store
            .upsert_file_state(&FileState {
                id: 0,
                relative_path: "a.rs".into(),
                content_hash: "h".into(),
                size_bytes: content.len() as u64,
                mtime_ns: 0,
                language: None,
                kind: None,
                fingerprint: None,
                indexed_at: 0,
                is_deleted: false,
            })
            .expect("upsert file state");
        let chunk = Chunk {
            id: 0,
            file_id,
            ordinal: 0,
            kind: ChunkKind::Function,
            start_line: 1,
            end_line: 1,
            token_estimate: None,
            content: content.to_string(),
            summary: None,
            created_at: 0,
        };
        store.replace_file_contents(file_id, &[chunk], &[], &[]).expect("replace contents");
        store.get_chunks_for_file(file_id).expect("chunks")[0].id
    }

    #[test]
    fn test_full_text_provider_finds_matching_chunk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open_in_memory().expect("store");
        seed_chunk(&store, "fn validate_token() { todo!() }");
        let config = Config::defaults(dir.path());
        let embedder = Embedder::degraded(&config.embedding);
        let ctx = ProviderContext { store: &store, embedder: &embedder, config: &config, query: "validate_token" };
        let provider = FullTextProvider;
        let hits = provider.retrieve(&ctx, 10).expect("retrieve");
        assert!(!hits.is_empty());
    }
}
