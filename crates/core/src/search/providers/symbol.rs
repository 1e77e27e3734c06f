//! Symbol-table context provider: exact/substring name lookup.

use super::{ContextProvider, ProviderContext, ProviderHit};
use crate::error::CoreResult;

pub struct SymbolProvider;

impl ContextProvider for SymbolProvider {
    fn name(&self) -> &'static str {
        "symbol"
    }

    fn retrieve(&self, ctx: &ProviderContext<'_>, limit: usize) -> CoreResult<Vec<ProviderHit>> {
        let symbols = ctx.store.search_symbols_by_name(ctx.query, limit)?;
        let total = symbols.len();
        Ok(symbols
            .into_iter()
            .enumerate()
            .filter_map(|(rank, symbol)| {
                let chunk_id = symbol.chunk_id?;
                // search_symbols_by_name already orders exact matches first,
                // so rank position itself is the normalization input: the
                // top hit scores 1.0, decaying linearly to the weakest match.
                let score = 1.0 - (rank as f64 / total.max(1) as f64);
                Some(ProviderHit { chunk_id, score })
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
    use crate::types::{Chunk, ChunkKind, FileState, Symbol};

    #[test]
    fn test_symbol_provider_finds_exact_match_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open_in_memory().expect("store");
        let file_id = store
            .upsert_file_state(&FileState {
                id: 0,
                relative_path: "a.py".into(),
                content_hash: "h".into(),
                size_bytes: 10,
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
            end_line: 2,
            token_estimate: None,
            content: "def login(): pass".into(),
            summary: None,
            created_at: 0,
        };
        let persisted = store
            .replace_file_contents(
                file_id,
                &[chunk],
                &[],
                &[Symbol {
                    id: 0,
                    file_id,
                    chunk_id: None,
                    kind: ChunkKind::Function,
                    name: "login".into(),
                    qualified_name: None,
                    signature: None,
                    language: None,
                    start_line: Some(1),
                    end_line: Some(2),
                }],
            )
            .expect("replace with symbols");
        let chunk_id = persisted[0].id;

        let config = Config::defaults(dir.path());
        let embedder = Embedder::degraded(&config.embedding);
        let ctx = ProviderContext { store: &store, embedder: &embedder, config: &config, query: "login" };
        let provider = SymbolProvider;
        let hits = provider.retrieve(&ctx, 10).expect("retrieve");
        assert_eq!(hits[0].chunk_id, chunk_id);
        assert!((hits[0].score - 1.0).abs() < 1e-9);
    }
}
