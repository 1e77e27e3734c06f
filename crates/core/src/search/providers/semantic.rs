//! Semantic (vector) context provider.
//!
//! Embeds the query with the same model used at index time and ranks every
//! stored embedding by cosine similarity. There is no ANN index (see
//! `Store::all_embeddings`'s doc comment) - this is a brute-force scan,
//! acceptable at the repository scale this system targets.

use super::{ContextProvider, ProviderContext, ProviderHit};
use crate::error::CoreResult;
use crate::search::cosine_similarity;

pub struct SemanticProvider;

impl ContextProvider for SemanticProvider {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn retrieve(&self, ctx: &ProviderContext<'_>, limit: usize) -> CoreResult<Vec<ProviderHit>> {
        if !ctx.embedder.is_available() {
            return Ok(Vec::new());
        }
        let query_vector = match ctx.embedder.embed_single(ctx.query) {
            Ok(v) => v,
            Err(_) => return Ok(Vec::new()),
        };

        let embeddings = ctx.store.all_embeddings(ctx.embedder.model_name())?;
        let mut scored: Vec<(i64, f64)> = embeddings
            .iter()
            .map(|(chunk_id, vector)| (*chunk_id, cosine_similarity(&query_vector, vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        // Cosine similarity is already in [-1, 1]; clamp negatives to 0 so
        // the provider's contract ([0, 1]) holds without distorting order.
        Ok(scored
            .into_iter()
            .map(|(chunk_id, score)| ProviderHit { chunk_id, score: score.max(0.0) })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedder::Embedder;
    use crate::store::Store;

    #[test]
    fn test_semantic_provider_empty_without_model() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open_in_memory().expect("store");
        let config = Config::defaults(dir.path());
        let embedder = Embedder::degraded(&config.embedding);
        let ctx = ProviderContext { store: &store, embedder: &embedder, config: &config, query: "auth" };
        let provider = SemanticProvider;
        let hits = provider.retrieve(&ctx, 10).expect("retrieve");
        assert!(hits.is_empty());
    }
}
