//! Query optimizer (C20): threshold filtering, the MMR-or-truncate branch,
//! and a TTL-bounded result cache keyed by query + budget.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::config::QueryConfig;
use crate::embedder::Embedder;
use crate::error::CoreResult;
use crate::store::Store;
use crate::types::TokenBudget;

use super::booster::BoostedCandidate;
use super::mmr::{self, MmrCandidate};

/// A candidate that has cleared thresholding and, if reranking was enabled,
/// MMR selection.
#[derive(Debug, Clone)]
pub struct OptimizedCandidate {
    pub chunk_id: i64,
    pub rrf_score: f64,
    pub provider_ranks: HashMap<String, u32>,
    pub score: f64,
    pub mmr_relevance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query_fingerprint: u64,
    budget_signature: u64,
}

struct CacheEntry {
    candidates: Vec<OptimizedCandidate>,
    inserted_at: Instant,
}

/// Query-result cache. Bypassed entirely when `rerank_enabled` is false,
/// since an un-reranked result is cheap enough to recompute that caching it
/// buys nothing but staleness risk.
pub struct QueryCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
}

impl QueryCache {
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).expect("max_entries >= 1 after max()");
        Self { entries: Mutex::new(LruCache::new(capacity)) }
    }
}

/// Drop candidates below `min_score_threshold`, then either rerank with MMR
/// (C17) or truncate to `default_k`, consulting/populating the query cache
/// along the way.
pub fn select(
    store: &Store,
    embedder: &Embedder,
    cache: &QueryCache,
    boosted: Vec<BoostedCandidate>,
    query: &str,
    budget: TokenBudget,
    config: &QueryConfig,
    limit: usize,
) -> CoreResult<Vec<OptimizedCandidate>> {
    let effective_limit = limit.clamp(1, config.max_limit);
    let cache_key = CacheKey {
        query_fingerprint: fingerprint(query, effective_limit),
        budget_signature: fingerprint(&format!("{}:{}", budget.max_tokens, budget.reserve_for_prompt), 0),
    };

    if config.rerank_enabled {
        let mut entries = cache.entries.lock();
        if let Some(entry) = entries.get(&cache_key) {
            if entry.inserted_at.elapsed() < Duration::from_secs(config.cache_ttl_secs) {
                return Ok(entry.candidates.clone());
            }
        }
        entries.pop(&cache_key);
    }

    let filtered: Vec<BoostedCandidate> =
        boosted.into_iter().filter(|c| c.score >= config.min_score_threshold).collect();

    let result = if config.rerank_enabled {
        rerank(store, embedder, filtered, config, budget)?
    } else {
        filtered.into_iter().take(config.default_k).map(without_mmr).collect()
    };
    let result: Vec<OptimizedCandidate> = result.into_iter().take(effective_limit).collect();

    if config.rerank_enabled {
        let mut entries = cache.entries.lock();
        entries.put(cache_key, CacheEntry { candidates: result.clone(), inserted_at: Instant::now() });
    }

    Ok(result)
}

fn rerank(
    store: &Store,
    embedder: &Embedder,
    filtered: Vec<BoostedCandidate>,
    config: &QueryConfig,
    budget: TokenBudget,
) -> CoreResult<Vec<OptimizedCandidate>> {
    let vectors: HashMap<i64, Vec<f32>> = if embedder.is_available() {
        store.all_embeddings(embedder.model_name())?.into_iter().collect()
    } else {
        HashMap::new()
    };

    let mut mmr_inputs = Vec::with_capacity(filtered.len());
    let mut by_id: HashMap<i64, BoostedCandidate> = HashMap::new();

    for candidate in filtered {
        let Some(chunk) = store.get_chunk(candidate.chunk_id)? else { continue };
        let vector = vectors.get(&candidate.chunk_id).cloned();
        mmr_inputs.push(MmrCandidate {
            chunk_id: candidate.chunk_id,
            relevance: candidate.score,
            token_estimate: chunk.token_estimate.unwrap_or(128),
            vector,
        });
        by_id.insert(candidate.chunk_id, candidate);
    }

    let selected = mmr::select(mmr_inputs, config.mmr_lambda, budget.available_for_snippets());

    Ok(selected
        .into_iter()
        .filter_map(|(chunk_id, relevance)| {
            let candidate = by_id.remove(&chunk_id)?;
            Some(OptimizedCandidate {
                chunk_id: candidate.chunk_id,
                rrf_score: candidate.rrf_score,
                provider_ranks: candidate.provider_ranks,
                score: candidate.score,
                mmr_relevance: Some(relevance),
            })
        })
        .collect())
}

fn without_mmr(candidate: BoostedCandidate) -> OptimizedCandidate {
    OptimizedCandidate {
        chunk_id: candidate.chunk_id,
        rrf_score: candidate.rrf_score,
        provider_ranks: candidate.provider_ranks,
        score: candidate.score,
        mmr_relevance: None,
    }
}

fn fingerprint(value: &str, salt: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    salt.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, QueryConfig};
    use crate::store::Store;
    use crate::types::{Chunk, ChunkKind, FileState};

    fn degraded_embedder() -> Embedder {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::defaults(dir.path());
        Embedder::degraded(&config.embedding)
    }

    fn seed_candidate(store: &Store, content: &str, score: f64) -> BoostedCandidate {
        let file_id = store
            .upsert_file_state(&FileState {
                id: 0,
                relative_path: format!("{content}.rs"),
                content_hash: "h".into(),
                size_bytes: 1,
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
            token_estimate: Some(10),
            content: content.to_string(),
            summary: None,
            created_at: 0,
        };
        let persisted = store.replace_file_contents(file_id, &[chunk], &[], &[]).expect("replace");
        BoostedCandidate {
            chunk_id: persisted[0].id,
            rrf_score: score,
            provider_ranks: HashMap::new(),
            boost: 1.0,
            score,
            mmr_relevance: None,
        }
    }

    #[test]
    fn test_select_drops_candidates_below_threshold() {
        let store = Store::open_in_memory().expect("store");
        let keep = seed_candidate(&store, "high", 0.9);
        let drop = seed_candidate(&store, "low", 0.01);
        let mut config = QueryConfig::default();
        config.min_score_threshold = 0.1;
        config.rerank_enabled = false;
        let cache = QueryCache::new(16);
        let embedder = degraded_embedder();
        let budget = TokenBudget { max_tokens: 4000, reserve_for_prompt: 0 };

        let result = select(&store, &embedder, &cache, vec![keep.clone(), drop], "q", budget, &config, 10).expect("select");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].chunk_id, keep.chunk_id);
    }

    #[test]
    fn test_select_truncates_to_default_k_when_rerank_disabled() {
        let store = Store::open_in_memory().expect("store");
        let candidates: Vec<BoostedCandidate> =
            (0..5).map(|i| seed_candidate(&store, &format!("c{i}"), 0.9 - i as f64 * 0.01)).collect();
        let mut config = QueryConfig::default();
        config.rerank_enabled = false;
        config.default_k = 2;
        let cache = QueryCache::new(16);
        let embedder = degraded_embedder();
        let budget = TokenBudget { max_tokens: 4000, reserve_for_prompt: 0 };

        let result = select(&store, &embedder, &cache, candidates, "q", budget, &config, 10).expect("select");
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_select_caches_reranked_results() {
        let store = Store::open_in_memory().expect("store");
        let candidate = seed_candidate(&store, "only", 0.9);
        let mut config = QueryConfig::default();
        config.rerank_enabled = true;
        let cache = QueryCache::new(16);
        let embedder = degraded_embedder();
        let budget = TokenBudget { max_tokens: 4000, reserve_for_prompt: 0 };

        let first = select(&store, &embedder, &cache, vec![candidate.clone()], "q", budget, &config, 10).expect("select");
        // Second call passes an empty candidate list; a cache hit should
        // still return the previous result rather than an empty one.
        let second = select(&store, &embedder, &cache, vec![], "q", budget, &config, 10).expect("select");
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].chunk_id, second[0].chunk_id);
    }
}
