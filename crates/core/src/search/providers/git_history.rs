//! Git-history context provider: surfaces chunks from recently or
//! frequently touched files as a relevance signal independent of content
//! matching.
//!
//! Shells out to `git log` via `vcs::load_history` rather than linking
//! `gix`, matching this crate's existing git integration.

use std::collections::HashMap;

use super::{ContextProvider, ProviderContext, ProviderHit};
use crate::error::CoreResult;
use crate::vcs;

pub struct GitHistoryProvider;

impl ContextProvider for GitHistoryProvider {
    fn name(&self) -> &'static str {
        "git_history"
    }

    fn retrieve(&self, ctx: &ProviderContext<'_>, limit: usize) -> CoreResult<Vec<ProviderHit>> {
        let history = match vcs::load_history(&ctx.config.repo_path, ctx.config.providers.max_commits) {
            Ok(h) => h,
            // Not a git repository, or git unavailable: no signal, not an error.
            Err(_) => return Ok(Vec::new()),
        };
        if history.is_empty() {
            return Ok(Vec::new());
        }

        let query_lower = ctx.query.to_lowercase();
        let mut file_scores: HashMap<String, f64> = HashMap::new();
        let total_commits = history.len() as f64;

        for (rank, commit) in history.iter().enumerate() {
            let matches_query = commit.message.to_lowercase().contains(&query_lower);
            // Earlier commits (lower rank) are more recent; recency decays
            // linearly across the scanned window.
            let recency = 1.0 - (rank as f64 / total_commits);
            for file in &commit.files_changed {
                let weight = if matches_query { recency } else { recency * 0.3 };
                let entry = file_scores.entry(file.clone()).or_insert(0.0);
                if weight > *entry {
                    *entry = weight;
                }
            }
        }

        let mut ranked: Vec<(String, f64)> = file_scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);

        let max_score = ranked.first().map(|(_, s)| *s).unwrap_or(1.0).max(1e-9);
        let mut hits = Vec::new();
        for (relative_path, score) in ranked {
            let Some(file_state) = ctx.store.get_file_state(&relative_path)? else { continue };
            let chunks = ctx.store.get_chunks_for_file(file_state.id)?;
            // Attribute the file-level score to its first chunk; neighbor
            // expansion (C19) pulls in the rest if it scores highly enough.
            if let Some(first) = chunks.first() {
                hits.push(ProviderHit { chunk_id: first.id, score: (score / max_score).min(1.0) });
            }
        }
        Ok(hits)
    }
}
