//! Snippet renderer (C21): serializes a budget-selected, ordered set of
//! search results into a deterministic XML-like `project_context` document
//! suitable for splicing straight into a prompt.
//!
//! Ordering is fixed by construction, not by insertion order: files are
//! emitted by descending max-snippet-score, and snippets within a file by
//! descending score. Truncation is token-budget-aware and happens here too,
//! as a second, more conservative pass over the MMR-selected set -- the
//! estimator used at render time accounts for CJK density, which the
//! indexer's own `token_estimate` (computed once, language-agnostic) does
//! not.

use std::collections::HashMap;

use crate::types::{ContextSnippet, SearchResult};

/// Counts and timing surfaced alongside the rendered document, so a caller
/// can tell a short result from a truncated one without re-parsing the XML.
#[derive(Debug, Clone)]
pub struct RenderDiagnostics {
    /// The query this document answers.
    pub query: String,
    /// Candidates handed to the renderer, before any budget truncation.
    pub candidates_considered: usize,
    /// Snippets actually emitted.
    pub snippets_rendered: usize,
    /// Tokens available for the response body.
    pub tokens_requested: u32,
    /// Tokens the rendered snippets actually consumed, by the renderer's
    /// own estimate.
    pub tokens_used: u32,
    /// Wall-clock time spent rendering, in milliseconds.
    pub duration_ms: u64,
}

/// Build a `ContextSnippet` from a `SearchResult`, the shape the renderer
/// consumes.
pub fn snippet_from_result(result: &SearchResult) -> ContextSnippet {
    ContextSnippet {
        chunk_id: result.chunk.id,
        score: result.score,
        file_path: result.file_path.to_string_lossy().replace('\\', "/"),
        label: None,
        kind: result.chunk.kind,
        text: result.chunk.content.clone(),
        language: None,
        offsets: Some((result.chunk.start_line, result.chunk.end_line)),
        metadata: HashMap::new(),
    }
}

/// Render `snippets` as a `project_context` XML document, truncating to fit
/// `budget_tokens` (estimated via [`estimate_tokens`]) and filling in
/// `diagnostics` with the counts/timing actually observed.
///
/// `document_metadata` becomes a top-level `<metadata>` block (e.g.
/// `repo_path`, `search_mode`); per-snippet metadata comes from each
/// `ContextSnippet::metadata` map.
pub fn render(
    query: &str,
    snippets: &[ContextSnippet],
    document_metadata: &HashMap<String, String>,
    budget_tokens: u32,
    model_hint: Option<&str>,
    duration_ms: u64,
) -> (String, RenderDiagnostics) {
    let ordered = order_for_rendering(snippets);

    let mut out = String::new();
    let mut tokens_used = 0u32;
    let mut rendered = Vec::with_capacity(ordered.len());
    let mut truncated = false;

    for snippet in &ordered {
        let cost = estimate_tokens(&snippet.text, model_hint);
        if tokens_used.saturating_add(cost) > budget_tokens && !rendered.is_empty() {
            truncated = true;
            break;
        }
        tokens_used = tokens_used.saturating_add(cost);
        rendered.push(*snippet);
        if tokens_used >= budget_tokens {
            truncated = truncated || rendered.len() < ordered.len();
            break;
        }
    }

    let diagnostics = RenderDiagnostics {
        query: query.to_string(),
        candidates_considered: snippets.len(),
        snippets_rendered: rendered.len(),
        tokens_requested: budget_tokens,
        tokens_used,
        duration_ms,
    };

    out.push_str("<project_context");
    write_attr(&mut out, "query", query);
    out.push_str(">\n");

    write_diagnostics(&mut out, &diagnostics, truncated);

    if !document_metadata.is_empty() {
        write_metadata_block(&mut out, document_metadata, 1);
    }

    for (file_path, file_snippets) in group_by_file(&rendered) {
        out.push_str("  <file");
        write_attr(&mut out, "path", file_path);
        out.push_str(">\n");
        for snippet in file_snippets {
            write_snippet(&mut out, snippet);
        }
        out.push_str("  </file>\n");
    }

    out.push_str("</project_context>\n");

    (out, diagnostics)
}

/// Order snippets into the renderer's fixed traversal: files by descending
/// max-snippet-score (ties broken by path, for determinism), snippets within
/// a file by descending score (ties broken by chunk_id).
fn order_for_rendering(snippets: &[ContextSnippet]) -> Vec<&ContextSnippet> {
    let mut by_file: HashMap<&str, Vec<&ContextSnippet>> = HashMap::new();
    for snippet in snippets {
        by_file.entry(snippet.file_path.as_str()).or_default().push(snippet);
    }

    let mut files: Vec<(&str, f64)> = by_file
        .iter()
        .map(|(path, items)| (*path, items.iter().map(|s| s.score).fold(f64::MIN, f64::max)))
        .collect();
    files.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(b.0)));

    let mut result = Vec::with_capacity(snippets.len());
    for (path, _) in files {
        let mut items = by_file.remove(path).unwrap_or_default();
        items.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        result.extend(items);
    }
    result
}

/// Re-group an already-ordered slice by file, preserving both the file order
/// and the within-file order established by [`order_for_rendering`].
fn group_by_file<'a>(ordered: &[&'a ContextSnippet]) -> Vec<(&'a str, Vec<&'a ContextSnippet>)> {
    let mut groups: Vec<(&str, Vec<&ContextSnippet>)> = Vec::new();
    for snippet in ordered {
        match groups.last_mut() {
            Some((path, items)) if *path == snippet.file_path => items.push(snippet),
            _ => groups.push((snippet.file_path.as_str(), vec![snippet])),
        }
    }
    groups
}

fn write_diagnostics(out: &mut String, diagnostics: &RenderDiagnostics, truncated: bool) {
    out.push_str("  <diagnostics");
    write_attr(out, "candidates", &diagnostics.candidates_considered.to_string());
    write_attr(out, "rendered", &diagnostics.snippets_rendered.to_string());
    write_attr(out, "tokens_requested", &diagnostics.tokens_requested.to_string());
    write_attr(out, "tokens_used", &diagnostics.tokens_used.to_string());
    write_attr(out, "duration_ms", &diagnostics.duration_ms.to_string());
    write_attr(out, "truncated", &truncated.to_string());
    out.push_str("/>\n");
}

fn write_snippet(out: &mut String, snippet: &ContextSnippet) {
    out.push_str("    <snippet");
    if let Some(label) = &snippet.label {
        write_attr(out, "label", label);
    }
    write_attr(out, "kind", snippet.kind.as_str());
    write_attr(out, "score", &format!("{:.3}", snippet.score));
    if let Some((start, end)) = snippet.offsets {
        write_attr(out, "lines", &format!("{start}-{end}"));
    }
    if let Some(language) = snippet.language {
        write_attr(out, "language", language.as_str());
    }
    out.push_str(">\n");
    out.push_str("      <![CDATA[");
    out.push_str(&escape_cdata(&snippet.text));
    out.push_str("]]>\n");
    if !snippet.metadata.is_empty() {
        write_metadata_block(out, &snippet.metadata, 3);
    }
    out.push_str("    </snippet>\n");
}

fn write_metadata_block(out: &mut String, metadata: &HashMap<String, String>, indent: usize) {
    let pad = "  ".repeat(indent);
    let mut keys: Vec<&String> = metadata.keys().collect();
    keys.sort();
    out.push_str(&pad);
    out.push_str("<metadata>\n");
    for key in keys {
        out.push_str(&pad);
        out.push_str("  <entry");
        write_attr(out, "key", &sanitize_metadata_key(key));
        out.push('>');
        out.push_str(&escape_attr(&metadata[key]));
        out.push_str("</entry>\n");
    }
    out.push_str(&pad);
    out.push_str("</metadata>\n");
}

fn write_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape_attr(value));
    out.push('"');
}

/// XML attribute escaping: the five predefined entities, in the order that
/// avoids double-escaping `&`.
fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// A CDATA section only needs escaping for its one illegal substring; split
/// it across two sections rather than entity-escaping (CDATA's whole point
/// is to avoid that).
fn escape_cdata(text: &str) -> String {
    text.replace("]]>", "]]]]><![CDATA[>")
}

/// Sanitize a free-form metadata key into a valid XML attribute-like name:
/// must start with a letter or underscore, and contain only letters,
/// digits, hyphens, dots, and underscores. Spaces become underscores; a
/// leading digit gets a leading underscore.
fn sanitize_metadata_key(key: &str) -> String {
    let mut sanitized: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' { c } else { '_' })
        .collect();
    if sanitized.is_empty() {
        return "_".to_string();
    }
    let starts_ok = sanitized.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !starts_ok {
        sanitized.insert(0, '_');
    }
    sanitized
}

/// Estimate the token cost of `text` as `chars / chars_per_token`, where
/// `chars_per_token` drops from 4.0 toward 1.5 as the proportion of CJK
/// characters in `text` rises (CJK text tokenizes far denser than Latin
/// text under typical BPE vocabularies). `model_hint` nudges the baseline
/// ratio for tokenizer families known to differ noticeably; unrecognized or
/// absent hints use the default ratio.
pub fn estimate_tokens(text: &str, model_hint: Option<&str>) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let total_chars = text.chars().count();
    let cjk_chars = text.chars().filter(|c| is_cjk(*c)).count();
    let cjk_ratio = cjk_chars as f64 / total_chars as f64;

    let base_ratio = match model_hint.map(str::to_ascii_lowercase).as_deref() {
        Some("claude") => 3.6,
        Some("gpt" | "openai") => 4.0,
        _ => 4.0,
    };
    let chars_per_token = base_ratio - (base_ratio - 1.5) * cjk_ratio;

    ((total_chars as f64) / chars_per_token).ceil().max(1.0) as u32
}

fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0xAC00..=0xD7A3 | 0x3400..=0x4DBF
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkKind;

    fn snippet(file_path: &str, chunk_id: i64, score: f64, text: &str) -> ContextSnippet {
        ContextSnippet {
            chunk_id,
            score,
            file_path: file_path.to_string(),
            label: None,
            kind: ChunkKind::Function,
            text: text.to_string(),
            language: None,
            offsets: Some((1, 2)),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_render_orders_files_by_max_score_descending() {
        let snippets = vec![
            snippet("b.rs", 1, 0.9, "fn b() {}"),
            snippet("a.rs", 2, 0.5, "fn a() {}"),
        ];
        let (xml, diagnostics) = render("q", &snippets, &HashMap::new(), 10_000, None, 5);
        let b_pos = xml.find("b.rs").unwrap();
        let a_pos = xml.find("a.rs").unwrap();
        assert!(b_pos < a_pos);
        assert_eq!(diagnostics.snippets_rendered, 2);
    }

    #[test]
    fn test_render_orders_snippets_within_file_by_score_descending() {
        let snippets = vec![
            snippet("a.rs", 1, 0.2, "low"),
            snippet("a.rs", 2, 0.9, "high"),
        ];
        let (xml, _) = render("q", &snippets, &HashMap::new(), 10_000, None, 5);
        let high_pos = xml.find("high").unwrap();
        let low_pos = xml.find("low").unwrap();
        assert!(high_pos < low_pos);
    }

    #[test]
    fn test_render_escapes_attribute_values() {
        let mut s = snippet("a.rs", 1, 0.5, "text");
        s.label = Some("a \"quoted\" & <label>".to_string());
        let (xml, _) = render("q", std::slice::from_ref(&s), &HashMap::new(), 10_000, None, 5);
        assert!(xml.contains("&quot;quoted&quot;"));
        assert!(xml.contains("&amp;"));
        assert!(xml.contains("&lt;label&gt;"));
    }

    #[test]
    fn test_render_wraps_text_in_cdata() {
        let snippets = vec![snippet("a.rs", 1, 0.5, "fn f() { if x < 1 && y > 2 {} }")];
        let (xml, _) = render("q", &snippets, &HashMap::new(), 10_000, None, 5);
        assert!(xml.contains("<![CDATA[fn f() { if x < 1 && y > 2 {} }]]>"));
    }

    #[test]
    fn test_render_splits_cdata_terminator_inside_text() {
        let snippets = vec![snippet("a.rs", 1, 0.5, "before ]]> after")];
        let (xml, _) = render("q", &snippets, &HashMap::new(), 10_000, None, 5);
        assert!(!xml.contains("before ]]> after"));
        assert!(xml.contains("before ]]]]><![CDATA[> after"));
    }

    #[test]
    fn test_render_truncates_to_budget() {
        let snippets = vec![
            snippet("a.rs", 1, 0.9, &"x".repeat(400)),
            snippet("b.rs", 2, 0.8, &"y".repeat(400)),
        ];
        // Roughly 100 tokens per snippet; a budget of 120 admits only one.
        let (xml, diagnostics) = render("q", &snippets, &HashMap::new(), 120, None, 5);
        assert_eq!(diagnostics.snippets_rendered, 1);
        assert!(xml.contains("a.rs"));
        assert!(!xml.contains("b.rs"));
        assert!(xml.contains("truncated=\"true\""));
    }

    #[test]
    fn test_render_empty_budget_still_admits_first_snippet() {
        // An empty budget would otherwise render nothing; the loop always
        // admits at least one snippet so a query never returns a document
        // with zero content when candidates exist.
        let snippets = vec![snippet("a.rs", 1, 0.9, "fn f() {}")];
        let (_, diagnostics) = render("q", &snippets, &HashMap::new(), 0, None, 5);
        assert_eq!(diagnostics.snippets_rendered, 1);
    }

    #[test]
    fn test_sanitize_metadata_key_rules() {
        assert_eq!(sanitize_metadata_key("provider name"), "provider_name");
        assert_eq!(sanitize_metadata_key("1stplace"), "_1stplace");
        assert_eq!(sanitize_metadata_key("valid-key.v2"), "valid-key.v2");
        assert_eq!(sanitize_metadata_key(""), "_");
    }

    #[test]
    fn test_estimate_tokens_scales_with_cjk_density() {
        let latin = "a".repeat(400);
        let cjk: String = std::iter::repeat('\u{4E2D}').take(400).collect();
        assert!(estimate_tokens(&cjk, None) > estimate_tokens(&latin, None));
    }

    #[test]
    fn test_estimate_tokens_empty_is_zero() {
        assert_eq!(estimate_tokens("", None), 0);
    }

    #[test]
    fn test_render_document_metadata_block() {
        let mut meta = HashMap::new();
        meta.insert("repo_path".to_string(), "/repo".to_string());
        let snippets = vec![snippet("a.rs", 1, 0.5, "fn f() {}")];
        let (xml, _) = render("q", &snippets, &meta, 10_000, None, 5);
        assert!(xml.contains("key=\"repo_path\">/repo</entry>"));
    }
}
