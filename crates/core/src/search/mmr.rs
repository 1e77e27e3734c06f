//! Maximal Marginal Relevance reranker (C17): greedy, token-budget-aware
//! diversification. Replaces the cross-encoder reranking a pure-inference
//! pipeline might reach for with an arithmetic pass over embedding vectors
//! already computed at index time - no model call on the query path.

use super::cosine_similarity;

/// A candidate entering the MMR selection loop.
#[derive(Debug, Clone)]
pub struct MmrCandidate {
    pub chunk_id: i64,
    pub relevance: f64,
    pub token_estimate: u32,
    /// Embedding vector, if one exists for this chunk. Candidates without a
    /// vector contribute zero similarity to any other candidate - they
    /// neither crowd out nor get crowded out by embedding-based diversity.
    pub vector: Option<Vec<f32>>,
}

/// Greedily select a token-budget-fitting, diversified subset of
/// `candidates`, highest relevance first, then trading relevance against
/// redundancy with already-selected items.
///
/// Returns chunk_ids in selection order paired with the relevance value used
/// to pick them (for `ScoreBreakdown::mmr_relevance`).
pub fn select(mut candidates: Vec<MmrCandidate>, lambda: f64, budget_tokens: u32) -> Vec<(i64, f64)> {
    candidates.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));

    let mut remaining_budget = budget_tokens;
    let mut selected: Vec<MmrCandidate> = Vec::new();
    let mut result = Vec::new();

    let Some(seed_idx) = candidates.iter().position(|c| c.token_estimate <= remaining_budget) else {
        return result;
    };
    let seed = candidates.remove(seed_idx);
    remaining_budget -= seed.token_estimate;
    result.push((seed.chunk_id, seed.relevance));
    selected.push(seed);

    loop {
        let mut best: Option<(usize, f64)> = None;
        for (idx, candidate) in candidates.iter().enumerate() {
            if candidate.token_estimate > remaining_budget {
                continue;
            }
            let max_sim = selected
                .iter()
                .map(|s| similarity(candidate, s))
                .fold(f64::MIN, f64::max)
                .max(0.0);
            let mmr = lambda * candidate.relevance - (1.0 - lambda) * max_sim;

            match best {
                None => best = Some((idx, mmr)),
                Some((best_idx, best_mmr)) => {
                    let is_better = mmr > best_mmr
                        || (mmr == best_mmr && candidate.relevance > candidates[best_idx].relevance);
                    if is_better {
                        best = Some((idx, mmr));
                    }
                }
            }
        }

        let Some((idx, _)) = best else { break };
        let chosen = candidates.remove(idx);
        remaining_budget -= chosen.token_estimate;
        result.push((chosen.chunk_id, chosen.relevance));
        selected.push(chosen);
    }

    result
}

fn similarity(a: &MmrCandidate, b: &MmrCandidate) -> f64 {
    match (&a.vector, &b.vector) {
        (Some(va), Some(vb)) => cosine_similarity(va, vb),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(chunk_id: i64, relevance: f64, tokens: u32, vector: Vec<f32>) -> MmrCandidate {
        MmrCandidate { chunk_id, relevance, token_estimate: tokens, vector: Some(vector) }
    }

    #[test]
    fn test_select_seeds_with_highest_relevance() {
        let candidates = vec![
            candidate(1, 0.9, 10, vec![1.0, 0.0]),
            candidate(2, 0.5, 10, vec![0.0, 1.0]),
        ];
        let selected = select(candidates, 0.7, 100);
        assert_eq!(selected[0].0, 1);
    }

    #[test]
    fn test_select_prefers_diverse_candidate_over_near_duplicate() {
        // Candidate 2 is nearly identical to 1 (already selected); candidate
        // 3 is less relevant but orthogonal, so should win once lambda
        // favors diversity.
        let candidates = vec![
            candidate(1, 0.95, 10, vec![1.0, 0.0]),
            candidate(2, 0.90, 10, vec![1.0, 0.01]),
            candidate(3, 0.60, 10, vec![0.0, 1.0]),
        ];
        let selected = select(candidates, 0.5, 100);
        assert_eq!(selected[0].0, 1);
        assert_eq!(selected[1].0, 3);
    }

    #[test]
    fn test_select_stops_when_budget_exhausted() {
        let candidates = vec![candidate(1, 0.9, 50, vec![1.0, 0.0]), candidate(2, 0.8, 60, vec![0.0, 1.0])];
        let selected = select(candidates, 0.7, 50);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0, 1);
    }

    #[test]
    fn test_select_empty_when_nothing_fits() {
        let candidates = vec![candidate(1, 0.9, 1000, vec![1.0, 0.0])];
        let selected = select(candidates, 0.7, 10);
        assert!(selected.is_empty());
    }
}
