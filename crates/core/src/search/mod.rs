//! Hybrid search pipeline: multi-provider retrieval, RRF fusion, MMR
//! diversification, scoring boosts, neighbor expansion, and context
//! rendering (C15-C21).
//!
//! ```text
//! providers (semantic/symbol/full_text/git_history) -> fuse (RRF)
//!   -> booster (path/language) -> optimizer (threshold, MMR or truncate, cache)
//!   -> neighbor expansion -> renderer (XML snippet document)
//! ```
//!
//! Each provider returns hits already normalized to `[0, 1]` and ordered by
//! descending relevance; fusion only ever sees ranks, never raw provider
//! scores, so providers with different scoring scales compose cleanly.

pub mod booster;
pub mod mmr;
pub mod neighbors;
pub mod optimizer;
pub mod providers;
pub mod renderer;

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::Config;
use crate::embedder::Embedder;
use crate::error::CoreResult;
use crate::store::Store;
use crate::types::{Chunk, ScoreBreakdown, SearchResult, TokenBudget};

pub use optimizer::QueryCache;
pub use providers::{ContextProvider, ProviderContext, ProviderHit};

/// A fused candidate moving through the pipeline: provider ranks collapsed
/// into a single RRF score, not yet boosted or reranked.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk_id: i64,
    pub rrf_score: f64,
    pub provider_ranks: HashMap<String, u32>,
}

/// Hybrid search engine that fuses multiple retrieval signals.
///
/// Owns the query-result cache (C20) as an explicit field rather than a
/// process-wide singleton, so `Engine` remains the sole place that owns
/// long-lived state.
pub struct SearchEngine {
    rrf_k: u32,
    cache: QueryCache,
}

impl SearchEngine {
    /// Create a new search engine with the given RRF constant.
    pub fn new(rrf_k: u32) -> Self {
        Self::with_cache_capacity(rrf_k, 256)
    }

    /// Create a new search engine with an explicit cache capacity.
    pub fn with_cache_capacity(rrf_k: u32, cache_max_entries: usize) -> Self {
        Self { rrf_k, cache: QueryCache::new(cache_max_entries) }
    }

    /// Run the full provider fan-out, fuse, boost, rerank, and neighbor
    /// expansion pipeline, returning results as `SearchResult`s suitable for
    /// direct display or for snippet rendering.
    ///
    /// Steps:
    /// 1. Run every enabled provider (C15), each returning normalized,
    ///    rank-ordered hits.
    /// 2. Fuse by chunk_id with RRF (C16).
    /// 3. Apply the path/language score booster (C18).
    /// 4. Run the query optimizer: threshold, MMR-or-truncate, cache (C17/C20).
    /// 5. Expand each surviving result with its file-local neighbors (C19).
    /// 6. Resolve chunk/file data and assemble `SearchResult`s.
    pub fn search(
        &self,
        store: &Store,
        embedder: &Embedder,
        config: &Config,
        query: &str,
        limit: usize,
    ) -> CoreResult<Vec<SearchResult>> {
        self.search_with_budget(store, embedder, config, query, limit, config.budget_as_token_budget())
    }

    /// As `search`, but with an explicit token budget (overriding
    /// `config.budget`) for the MMR reranking stage -- used by callers that
    /// size the response to a caller-supplied prompt budget.
    pub fn search_with_budget(
        &self,
        store: &Store,
        embedder: &Embedder,
        config: &Config,
        query: &str,
        limit: usize,
        budget: TokenBudget,
    ) -> CoreResult<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let ctx = ProviderContext { store, embedder, config, query };
        let provider_hits = providers::run_enabled(&ctx)?;
        let fused = fuse_rrf(&provider_hits, self.rrf_k, &config.providers);
        let boosted = booster::apply(store, fused, &config.query)?;
        let selected =
            optimizer::select(store, embedder, &self.cache, boosted, query, budget, &config.query, limit)?;

        let mut by_chunk: HashMap<i64, optimizer::OptimizedCandidate> =
            selected.into_iter().map(|c| (c.chunk_id, c)).collect();
        let seeds: Vec<(i64, f64)> = by_chunk.values().map(|c| (c.chunk_id, c.score)).collect();
        let expanded = neighbors::expand(store, &seeds, config.query.neighbor_window)?;

        let mut results = Vec::with_capacity(expanded.len());
        for (chunk_id, score) in expanded {
            let Some(chunk) = store.get_chunk(chunk_id)? else { continue };
            let Some(file_path) = store.file_path_for_chunk(chunk_id)? else { continue };
            let result = match by_chunk.remove(&chunk_id) {
                Some(candidate) => to_search_result(chunk, file_path, score, Some(candidate)),
                None => to_search_result(chunk, file_path, score, None),
            };
            results.push(result);
        }
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(results)
    }

    /// Compute RRF score from two rank lists. Kept for the simple two-signal
    /// case (and as the historical baseline this module's tests track);
    /// `fuse_rrf` below is the N-provider generalization used by `search`.
    pub fn rrf_score(&self, semantic_rank: Option<u32>, keyword_rank: Option<u32>) -> f64 {
        let k = f64::from(self.rrf_k);
        let semantic = semantic_rank.map_or(0.0, |r| 1.0 / (k + f64::from(r)));
        let keyword = keyword_rank.map_or(0.0, |r| 1.0 / (k + f64::from(r)));
        semantic + keyword
    }
}

/// `score` is the post-neighbor-expansion score (a seed's optimized score,
/// or a neighbor's inherited half-score); `candidate` carries the original
/// fusion/boost/rerank breakdown when this chunk was itself a seed.
fn to_search_result(
    chunk: Chunk,
    file_path: String,
    score: f64,
    candidate: Option<optimizer::OptimizedCandidate>,
) -> SearchResult {
    let score_breakdown = match candidate {
        Some(candidate) => ScoreBreakdown {
            provider_ranks: candidate.provider_ranks,
            rrf_score: candidate.rrf_score,
            mmr_relevance: candidate.mmr_relevance,
            structural_weight: chunk.kind.default_weight(),
            dependency_boost: 1.0,
            recency_boost: 1.0,
        },
        None => ScoreBreakdown {
            structural_weight: chunk.kind.default_weight(),
            ..ScoreBreakdown::default()
        },
    };
    SearchResult { chunk, file_path: PathBuf::from(file_path), score, score_breakdown }
}

/// Fuse per-provider rank lists into a single score per chunk_id.
///
/// A result at rank `r` (0-based) in provider `p` contributes
/// `weight(p) / (rrf_k + r + 1)`. Contributions are summed across providers
/// that surfaced the chunk and the result set is sorted descending.
pub fn fuse_rrf(
    provider_hits: &HashMap<String, Vec<ProviderHit>>,
    rrf_k: u32,
    providers_config: &crate::config::ProvidersConfig,
) -> Vec<Candidate> {
    let mut scores: HashMap<i64, (f64, HashMap<String, u32>)> = HashMap::new();
    let k = f64::from(rrf_k);

    for (provider, hits) in provider_hits {
        let weight = providers_config.weight_for(provider);
        for (rank, hit) in hits.iter().enumerate() {
            let contribution = weight / (k + rank as f64 + 1.0);
            let entry = scores.entry(hit.chunk_id).or_insert_with(|| (0.0, HashMap::new()));
            entry.0 += contribution;
            entry.1.insert(provider.clone(), rank as u32);
        }
    }

    let mut candidates: Vec<Candidate> = scores
        .into_iter()
        .map(|(chunk_id, (rrf_score, provider_ranks))| Candidate { chunk_id, rrf_score, provider_ranks })
        .collect();
    candidates.sort_by(|a, b| b.rrf_score.partial_cmp(&a.rrf_score).unwrap_or(std::cmp::Ordering::Equal));
    candidates
}

/// Cosine similarity between two equal-length vectors. Returns 0.0 for
/// mismatched lengths or zero-magnitude vectors rather than erroring, since
/// callers treat "no similarity signal" and "orthogonal" identically.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = f64::from(*x);
        let y = f64::from(*y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
