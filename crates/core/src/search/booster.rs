//! Score booster (C18): path-prefix and language score multipliers.

use std::collections::HashMap;

use crate::config::QueryConfig;
use crate::error::CoreResult;
use crate::store::Store;

use super::Candidate;

/// A fused candidate after the path/language multiplier has been applied.
#[derive(Debug, Clone)]
pub struct BoostedCandidate {
    pub chunk_id: i64,
    pub rrf_score: f64,
    pub provider_ranks: HashMap<String, u32>,
    /// The path-prefix × language multiplier actually applied.
    pub boost: f64,
    /// `rrf_score * boost`, clamped to `1.0`.
    pub score: f64,
    /// Filled in by the optimizer/MMR stage, if reranking ran.
    pub mmr_relevance: Option<f64>,
}

/// Apply the path-prefix and language multipliers to every candidate and
/// re-sort by the resulting score. Candidates matching no configured prefix
/// or language are left unchanged (multiplier of `1.0`).
pub fn apply(store: &Store, candidates: Vec<Candidate>, query_config: &QueryConfig) -> CoreResult<Vec<BoostedCandidate>> {
    let mut boosted = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let path_mult = match store.file_path_for_chunk(candidate.chunk_id)? {
            Some(path) => longest_prefix_multiplier(&path, &query_config.path_boosts),
            None => 1.0,
        };
        let lang_mult = language_multiplier(store, candidate.chunk_id, &query_config.language_boosts)?;
        let boost = path_mult * lang_mult;
        let score = (candidate.rrf_score * boost).min(1.0);
        boosted.push(BoostedCandidate {
            chunk_id: candidate.chunk_id,
            rrf_score: candidate.rrf_score,
            provider_ranks: candidate.provider_ranks,
            boost,
            score,
            mmr_relevance: None,
        });
    }
    boosted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(boosted)
}

/// The multiplier for the longest `path_boosts` prefix matching
/// `relative_path`, or `1.0` if none match.
fn longest_prefix_multiplier(relative_path: &str, path_boosts: &[(String, f64)]) -> f64 {
    path_boosts
        .iter()
        .filter(|(prefix, _)| relative_path.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, mult)| *mult)
        .unwrap_or(1.0)
}

fn language_multiplier(store: &Store, chunk_id: i64, language_boosts: &HashMap<String, f64>) -> CoreResult<f64> {
    let Some(chunk) = store.get_chunk(chunk_id)? else { return Ok(1.0) };
    let Some(file_state) = store.get_file_state_by_id(chunk.file_id)? else { return Ok(1.0) };
    let Some(language) = file_state.language else { return Ok(1.0) };
    Ok(language_boosts.get(language.as_str()).copied().unwrap_or(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_prefix_multiplier_prefers_more_specific_match() {
        let boosts = vec![("src/".to_string(), 1.2), ("src/core/".to_string(), 1.5)];
        assert_eq!(longest_prefix_multiplier("src/core/engine.rs", &boosts), 1.5);
        assert_eq!(longest_prefix_multiplier("src/cli/main.rs", &boosts), 1.2);
        assert_eq!(longest_prefix_multiplier("vendor/lib.rs", &boosts), 1.0);
    }
}
