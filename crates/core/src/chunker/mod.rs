//! Semantic code chunker (C8) and symbol extractor (C9).
//!
//! Takes structural elements from the parser and produces chunks suitable
//! for embedding and indexing, plus the `Symbol` rows derived from them.
//! Chunks respect AST boundaries and never split mid-expression; only an
//! oversized *single* element is split further, at line boundaries.
//!
//! ## Chunking strategy
//!
//! 1. Single function/method/class/etc. if it fits in `max_chunk_tokens`
//!    (or a language-specific override from `chunking.max_tokens_overrides`).
//! 2. An oversized element is split into line-aligned slices of at most
//!    `max_chunk_tokens`, each overlapping the previous by
//!    `indexing.overlap_fraction` of its length for context continuity.
//! 3. Sequential element chunks additionally carry `indexing.overlap_lines`
//!    of trailing context from the previous chunk, prepended to their
//!    content, so a reader dropped into the middle of a file still has a
//!    few lines of lead-in.
//!
//! Files with no structural elements (plain documents, or a language with
//! no registered analyzer) fall back to `chunk_document`, a paragraph
//! splitter gated by `chunking.fallback_paragraph_min_lines`.

use crate::config::Config;
use crate::parser::StructuralElement;
use crate::types::{Chunk, ChunkKind, Language, Symbol};

/// Chunk structural elements into embedding-sized pieces, returning the
/// chunks in ordinal order plus the symbols derived from them.
pub fn chunk_elements(
    elements: &[StructuralElement],
    file_id: i64,
    language: Language,
    config: &Config,
    now: i64,
) -> (Vec<Chunk>, Vec<Symbol>) {
    let max_tokens = config
        .chunking
        .max_tokens_overrides
        .get(language.as_str())
        .copied()
        .unwrap_or(config.indexing.max_chunk_tokens);

    let mut chunks = Vec::new();
    let mut symbols = Vec::new();
    let mut ordinal = 0u32;
    let mut previous_tail: Option<String> = None;

    for elem in elements {
        let pieces = if estimate_tokens(&elem.content) <= max_tokens {
            vec![(elem.content.clone(), elem.line_start, elem.line_end)]
        } else {
            split_oversized(elem, max_tokens, config.indexing.overlap_fraction)
        };

        let piece_count = pieces.len();
        for (index, (content, start_line, end_line)) in pieces.into_iter().enumerate() {
            let content = match (index, &previous_tail) {
                (0, Some(tail)) if config.indexing.overlap_lines > 0 => {
                    format!("{tail}\n{content}")
                }
                _ => content,
            };
            let token_estimate = estimate_tokens(&content);

            chunks.push(Chunk {
                id: 0,
                file_id,
                ordinal,
                kind: elem.kind,
                start_line,
                end_line,
                token_estimate: Some(token_estimate),
                content: content.clone(),
                summary: chunk_summary(elem),
                created_at: now,
            });

            // Only the first (or sole) piece of an element stands for its
            // symbol -- later split pieces are continuation text, not
            // independent definitions.
            if index == 0 {
                symbols.push(Symbol {
                    id: 0,
                    file_id,
                    chunk_id: None,
                    kind: elem.kind,
                    name: short_name(&elem.symbol_path),
                    qualified_name: Some(elem.symbol_path.clone()),
                    signature: signature_line(&elem.content),
                    language: Some(language),
                    start_line: Some(elem.line_start),
                    end_line: Some(elem.line_end),
                });
            }

            previous_tail = tail_lines(&content, config.indexing.overlap_lines);
            ordinal += 1;
            let _ = piece_count;
        }
    }

    (chunks, symbols)
}

/// Fallback chunker for files with no structural elements: splits on blank
/// lines into paragraphs, merging runs shorter than
/// `fallback_paragraph_min_lines` into the following paragraph so trivial
/// one-liners don't become their own chunk.
pub fn chunk_document(content: &str, file_id: i64, config: &Config, now: i64) -> Vec<Chunk> {
    let max_tokens = config.indexing.max_chunk_tokens;
    let min_lines = config.chunking.fallback_paragraph_min_lines;

    let paragraphs = split_paragraphs(content, min_lines);
    let mut chunks = Vec::with_capacity(paragraphs.len());

    for (ordinal, (text, start_line, end_line)) in paragraphs.into_iter().enumerate() {
        #[expect(clippy::cast_possible_truncation)]
        let ordinal = ordinal as u32;
        if estimate_tokens(&text) <= max_tokens {
            chunks.push(Chunk {
                id: 0,
                file_id,
                ordinal,
                kind: ChunkKind::Paragraph,
                start_line,
                end_line,
                token_estimate: Some(estimate_tokens(&text)),
                summary: first_line(&text),
                content: text,
                created_at: now,
            });
        } else {
            for (sub_index, (sub_text, sub_start, sub_end)) in
                split_by_lines(&text, start_line, max_tokens, 0.0).into_iter().enumerate()
            {
                chunks.push(Chunk {
                    id: 0,
                    file_id,
                    ordinal: ordinal + sub_index as u32,
                    kind: ChunkKind::Paragraph,
                    start_line: sub_start,
                    end_line: sub_end,
                    token_estimate: Some(estimate_tokens(&sub_text)),
                    summary: first_line(&sub_text),
                    content: sub_text,
                    created_at: now,
                });
            }
        }
    }

    // Re-number ordinals gap-free after the possible sub-splitting above.
    for (i, chunk) in chunks.iter_mut().enumerate() {
        #[expect(clippy::cast_possible_truncation)]
        let i = i as u32;
        chunk.ordinal = i;
    }

    chunks
}

/// Rough token estimation: ~4 characters per token for code. This is
/// conservative; actual tokenization happens in the embedder.
fn estimate_tokens(content: &str) -> u32 {
    #[expect(clippy::cast_possible_truncation)]
    let estimate = (content.len() / 4) as u32;
    estimate.max(1)
}

/// Split a single oversized element into line-aligned slices of at most
/// `max_tokens`, each overlapping the previous by `overlap_fraction`.
fn split_oversized(
    elem: &StructuralElement,
    max_tokens: u32,
    overlap_fraction: f64,
) -> Vec<(String, u32, u32)> {
    split_by_lines(&elem.content, elem.line_start, max_tokens, overlap_fraction)
}

/// Core line-based splitter shared by element and paragraph oversized
/// handling. `base_line` is the 1-indexed source line the first character
/// of `content` corresponds to.
fn split_by_lines(
    content: &str,
    base_line: u32,
    max_tokens: u32,
    overlap_fraction: f64,
) -> Vec<(String, u32, u32)> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return vec![(content.to_string(), base_line, base_line)];
    }

    let max_chars = (max_tokens as usize) * 4;
    let mut pieces = Vec::new();
    let mut start_idx = 0usize;

    while start_idx < lines.len() {
        let mut end_idx = start_idx;
        let mut char_count = 0usize;
        while end_idx < lines.len() {
            let next_len = lines[end_idx].len() + 1;
            if char_count + next_len > max_chars && end_idx > start_idx {
                break;
            }
            char_count += next_len;
            end_idx += 1;
        }
        if end_idx == start_idx {
            end_idx = start_idx + 1; // a single line longer than max_chars
        }

        let piece_lines = &lines[start_idx..end_idx.min(lines.len())];
        let text = piece_lines.join("\n");
        #[expect(clippy::cast_possible_truncation)]
        let start_line = base_line + start_idx as u32;
        #[expect(clippy::cast_possible_truncation)]
        let end_line = base_line + end_idx.min(lines.len()).saturating_sub(1) as u32;
        pieces.push((text, start_line, end_line));

        if end_idx >= lines.len() {
            break;
        }
        #[expect(clippy::cast_possible_truncation)]
        let overlap_lines = ((end_idx - start_idx) as f64 * overlap_fraction).round() as usize;
        start_idx = end_idx.saturating_sub(overlap_lines).max(start_idx + 1);
    }

    pieces
}

/// Split document content into paragraphs (blank-line delimited),
/// merging runs shorter than `min_lines` into the following paragraph.
fn split_paragraphs(content: &str, min_lines: usize) -> Vec<(String, u32, u32)> {
    let lines: Vec<&str> = content.lines().collect();
    let mut paragraphs = Vec::new();
    let mut current_start = 0usize;
    let mut idx = 0usize;

    while idx < lines.len() {
        if lines[idx].trim().is_empty() {
            if idx > current_start {
                paragraphs.push((current_start, idx - 1));
            }
            current_start = idx + 1;
        }
        idx += 1;
    }
    if current_start < lines.len() {
        paragraphs.push((current_start, lines.len() - 1));
    }

    // Merge short runs forward.
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in paragraphs {
        if end + 1 - start < min_lines {
            if let Some(last) = merged.last_mut() {
                last.1 = end;
                continue;
            }
        }
        merged.push((start, end));
    }

    merged
        .into_iter()
        .map(|(start, end)| {
            let text = lines[start..=end].join("\n");
            #[expect(clippy::cast_possible_truncation)]
            let start_line = (start + 1) as u32;
            #[expect(clippy::cast_possible_truncation)]
            let end_line = (end + 1) as u32;
            (text, start_line, end_line)
        })
        .collect()
}

/// Last `n` lines of `content`, joined, for backward-overlap continuity.
fn tail_lines(content: &str, n: usize) -> Option<String> {
    if n == 0 {
        return None;
    }
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(n);
    Some(lines[start..].join("\n"))
}

/// A short human-facing summary for a chunk: the doc comment's first line,
/// or the first line of the element's content.
fn chunk_summary(elem: &StructuralElement) -> Option<String> {
    elem.doc_comment
        .as_ref()
        .and_then(|doc| doc.lines().next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .or_else(|| first_line(&elem.content))
}

fn first_line(content: &str) -> Option<String> {
    content.lines().next().map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

/// Extract the last path component as a short display name.
fn short_name(symbol_path: &str) -> String {
    symbol_path.rsplit("::").next().or_else(|| symbol_path.rsplit('.').next()).unwrap_or(symbol_path).to_string()
}

/// First non-blank line, as a crude function/type signature.
fn signature_line(content: &str) -> Option<String> {
    content.lines().find(|l| !l.trim().is_empty()).map(|l| l.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Visibility;
    use std::path::PathBuf;

    fn config() -> Config {
        Config::defaults(&PathBuf::from("/tmp/repo"))
    }

    fn element(name: &str, content: &str, kind: ChunkKind) -> StructuralElement {
        let line_count = content.lines().count().max(1) as u32;
        StructuralElement {
            symbol_path: name.into(),
            name: name.into(),
            kind,
            visibility: Visibility::Public,
            line_start: 1,
            line_end: line_count,
            content: content.into(),
            doc_comment: None,
            references: Vec::new(),
        }
    }

    #[test]
    fn test_small_element_becomes_single_chunk() {
        let elements = vec![element("foo", "fn foo() {}", ChunkKind::Function)];
        let (chunks, symbols) = chunk_elements(&elements, 1, Language::Rust, &config(), 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "foo");
    }

    #[test]
    fn test_oversized_element_is_split_not_truncated() {
        let mut cfg = config();
        cfg.indexing.max_chunk_tokens = 10; // 40 chars
        cfg.indexing.overlap_lines = 0;
        let long_content = (0..40).map(|i| format!("line {i} of a very long function body")).collect::<Vec<_>>().join("\n");
        let elements = vec![element("big", &long_content, ChunkKind::Function)];
        let (chunks, _) = chunk_elements(&elements, 1, Language::Rust, &cfg, 0);
        assert!(chunks.len() > 1, "oversized element should split into multiple chunks");
        // every produced chunk must be drawn from the original content
        for chunk in &chunks {
            assert!(long_content.contains(chunk.content.lines().next().unwrap()));
        }
    }

    #[test]
    fn test_sequential_chunks_carry_backward_overlap() {
        let mut cfg = config();
        cfg.indexing.overlap_lines = 2;
        let elements = vec![
            element("a", "line1\nline2\nline3", ChunkKind::Function),
            element("b", "line4\nline5\nline6", ChunkKind::Function),
        ];
        let (chunks, _) = chunk_elements(&elements, 1, Language::Rust, &cfg, 0);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].content.starts_with("line2\nline3"));
    }

    #[test]
    fn test_chunk_document_splits_on_blank_lines() {
        let content = "intro paragraph\nsecond line\n\nsecond paragraph\nmore text\n\nthird";
        let mut cfg = config();
        cfg.chunking.fallback_paragraph_min_lines = 1;
        let chunks = chunk_document(content, 1, &cfg, 0);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Paragraph));
    }

    #[test]
    fn test_chunk_document_merges_short_paragraphs() {
        let content = "one\n\ntwo\nthree\nfour";
        let mut cfg = config();
        cfg.chunking.fallback_paragraph_min_lines = 3;
        let chunks = chunk_document(content, 1, &cfg, 0);
        // "one" (1 line) is shorter than min_lines=3, so it merges forward
        // into the next paragraph instead of standing alone.
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_language_override_changes_effective_max_tokens() {
        let mut cfg = config();
        cfg.chunking.max_tokens_overrides.insert("python".into(), 5);
        let long_content = "x".repeat(100);
        let elements = vec![element("f", &long_content, ChunkKind::Function)];
        let (chunks, _) = chunk_elements(&elements, 1, Language::Python, &cfg, 0);
        assert!(chunks.len() > 1);
    }
}
