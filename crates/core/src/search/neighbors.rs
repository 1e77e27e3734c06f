//! Neighbor expander (C19): pulls in chunks adjacent to each seed result
//! within the same file, so a matched function doesn't show up without the
//! struct it belongs to or the helper it calls next door.

use std::collections::HashMap;

use crate::error::CoreResult;
use crate::store::Store;

/// For each `(chunk_id, score)` seed, include chunks at ordinals
/// `[ordinal-window, ordinal+window]` in the same file. Neighbors inherit
/// `score * 0.5`; when a chunk is reached as both a seed and a neighbor (or
/// a neighbor of two seeds), the maximum assigned score wins. `window = 0`
/// is a no-op (seeds pass through unchanged).
pub fn expand(store: &Store, seeds: &[(i64, f64)], window: u32) -> CoreResult<Vec<(i64, f64)>> {
    let mut scores: HashMap<i64, f64> = HashMap::new();

    for (chunk_id, score) in seeds {
        bump(&mut scores, *chunk_id, *score);
        if window == 0 {
            continue;
        }
        for neighbor in store.neighbor_chunks(*chunk_id, window)? {
            bump(&mut scores, neighbor.id, score * 0.5);
        }
    }

    let mut result: Vec<(i64, f64)> = scores.into_iter().collect();
    result.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(result)
}

fn bump(scores: &mut HashMap<i64, f64>, chunk_id: i64, score: f64) {
    let entry = scores.entry(chunk_id).or_insert(f64::MIN);
    if score > *entry {
        *entry = score;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::Store;
    use crate::types::{Chunk, ChunkKind, FileState};

    fn seed_file_with_chunks(store: &Store, n: usize) -> Vec<Chunk> {
        let file_id = store
            .upsert_file_state(&FileState {
                id: 0,
                relative_path: "a.rs".into(),
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
        let chunks: Vec<Chunk> = (0..n)
            .map(|i| Chunk {
                id: 0,
                file_id,
                ordinal: i as u32,
                kind: ChunkKind::Function,
                start_line: (i * 2 + 1) as u32,
                end_line: (i * 2 + 2) as u32,
                token_estimate: Some(10),
                content: format!("fn f{i}() {{}}"),
                summary: None,
                created_at: 0,
            })
            .collect();
        store.replace_file_contents(file_id, &chunks, &[], &[]).expect("replace")
    }

    #[test]
    fn test_expand_pulls_in_adjacent_chunks_with_half_score() {
        let dir = tempfile::tempdir().expect("tempdir");
        let _ = Config::defaults(dir.path());
        let store = Store::open_in_memory().expect("store");
        let chunks = seed_file_with_chunks(&store, 5);
        let seed = &chunks[2];

        let expanded = expand(&store, &[(seed.id, 0.8)], 1).expect("expand");
        let map: HashMap<i64, f64> = expanded.into_iter().collect();
        assert_eq!(map.get(&seed.id), Some(&0.8));
        assert_eq!(map.get(&chunks[1].id), Some(&0.4));
        assert_eq!(map.get(&chunks[3].id), Some(&0.4));
        assert!(!map.contains_key(&chunks[0].id));
    }

    #[test]
    fn test_expand_zero_window_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let _ = Config::defaults(dir.path());
        let store = Store::open_in_memory().expect("store");
        let chunks = seed_file_with_chunks(&store, 3);
        let expanded = expand(&store, &[(chunks[1].id, 0.6)], 0).expect("expand");
        assert_eq!(expanded, vec![(chunks[1].id, 0.6)]);
    }
}
