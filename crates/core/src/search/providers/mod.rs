//! Context providers (C15): independent retrieval signals fused by RRF.
//!
//! Each provider sees the same query and returns hits already normalized to
//! `[0, 1]` and sorted descending by relevance; fusion only consumes rank
//! order, so providers with incomparable raw scales (cosine similarity,
//! BM25, substring match, recency) compose without calibration.

pub mod full_text;
pub mod git_history;
pub mod semantic;
pub mod symbol;

use std::collections::HashMap;

use crate::config::Config;
use crate::embedder::Embedder;
use crate::error::CoreResult;
use crate::store::Store;

/// Everything a provider needs to answer one query.
pub struct ProviderContext<'a> {
    pub store: &'a Store,
    pub embedder: &'a Embedder,
    pub config: &'a Config,
    pub query: &'a str,
}

/// One normalized hit from a single provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderHit {
    pub chunk_id: i64,
    /// Normalized relevance in `[0, 1]`. Informational only once fused;
    /// `fuse_rrf` consumes rank, not this value.
    pub score: f64,
}

/// A single retrieval signal contributing hits to the fused result set.
pub trait ContextProvider {
    /// Stable name used as the RRF weight/rank key (`"semantic"`, `"symbol"`, ...).
    fn name(&self) -> &'static str;

    /// Produce normalized, descending-sorted hits for `ctx.query`.
    fn retrieve(&self, ctx: &ProviderContext<'_>, limit: usize) -> CoreResult<Vec<ProviderHit>>;
}

const CANDIDATE_POOL_SIZE: usize = 50;

/// Run every provider named in `config.providers.enabled`, skipping any
/// whose retrieval fails outright rather than failing the whole query -
/// a provider outage (e.g. the embedder is in keyword-only mode) degrades
/// gracefully to the remaining signals.
pub fn run_enabled(ctx: &ProviderContext<'_>) -> CoreResult<HashMap<String, Vec<ProviderHit>>> {
    let registry = all_providers();
    let mut results = HashMap::new();

    for name in &ctx.config.providers.enabled {
        let Some(provider) = registry.get(name.as_str()) else { continue };
        match provider.retrieve(ctx, CANDIDATE_POOL_SIZE) {
            Ok(hits) if !hits.is_empty() => {
                results.insert(name.clone(), hits);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(provider = %name, error = %e, "provider retrieval failed, skipping");
            }
        }
    }

    // Fallback: if every enabled provider came back empty, the keyword
    // full-text provider is invoked once more even if it wasn't enabled,
    // so a query never returns nothing when the repository has plain-text
    // matches.
    if results.is_empty() && !ctx.config.providers.enabled.iter().any(|p| p == "full_text") {
        let fallback = full_text::FullTextProvider;
        if let Ok(hits) = fallback.retrieve(ctx, CANDIDATE_POOL_SIZE) {
            if !hits.is_empty() {
                results.insert(fallback.name().to_string(), hits);
            }
        }
    }

    Ok(results)
}

fn all_providers() -> HashMap<&'static str, Box<dyn ContextProvider + Send + Sync>> {
    let mut map: HashMap<&'static str, Box<dyn ContextProvider + Send + Sync>> = HashMap::new();
    map.insert("semantic", Box::new(semantic::SemanticProvider));
    map.insert("symbol", Box::new(symbol::SymbolProvider));
    map.insert("full_text", Box::new(full_text::FullTextProvider));
    map.insert("git_history", Box::new(git_history::GitHistoryProvider));
    map
}
