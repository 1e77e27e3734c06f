//! Extension, skip-glob, include-path, and size filters (C2): three
//! orthogonal gates applied in order -- extension allow/block, skip-glob,
//! include-paths -- plus the size ceiling.

use std::path::Path;

/// Returns the lowercase, dot-free extension for a path, canonicalized at
/// the single point extensions enter the system: downstream consumers may
/// assume it is already lowercase.
pub fn canonical_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Canonicalize a configured extension entry to lowercase with a leading
/// dot, per spec §4.2/§6 ("extensions canonicalized to lowercase with a
/// leading dot"). Accepts entries written with or without the dot.
pub fn canonical_extension_pattern(entry: &str) -> String {
    let lower = entry.to_ascii_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

/// Gate (1): allow-or-block extension list. `allowed` and `blocked` are
/// mutually exclusive (enforced by `Config::validate`); when `allowed` is
/// non-empty only those extensions pass, otherwise everything not in
/// `blocked` passes. A path with no extension is rejected by an allowlist
/// and admitted by a blocklist (there is nothing to match against).
pub fn extension_allowed(ext: Option<&str>, allowed: &[String], blocked: &[String]) -> bool {
    let dotted = ext.map(|e| format!(".{e}"));
    if !allowed.is_empty() {
        return match &dotted {
            Some(d) => allowed.iter().any(|a| canonical_extension_pattern(a) == *d),
            None => false,
        };
    }
    if !blocked.is_empty() {
        return match &dotted {
            Some(d) => !blocked.iter().any(|b| canonical_extension_pattern(b) == *d),
            None => true,
        };
    }
    true
}

/// Gate (2): skip-glob list, applied after the extension gate. Simple
/// patterns with no `/` and no `**` match the filename only; patterns
/// containing `**/` also try the suffix form (the part after `**/`) against
/// the filename, so `**/*.generated.ts` skips `a/b/x.generated.ts` whether
/// or not the pattern's literal directory depth lines up.
pub fn skipped_by_pattern(relative_path: &str, skip_patterns: &[String]) -> bool {
    let filename = Path::new(relative_path).file_name().and_then(|f| f.to_str()).unwrap_or(relative_path);

    for pattern in skip_patterns {
        if pattern.contains('/') {
            if glob_matches(pattern, relative_path) {
                return true;
            }
            if let Some(suffix) = pattern.rsplit("**/").next() {
                if suffix != *pattern && glob_matches(suffix, filename) {
                    return true;
                }
            }
        } else if glob_matches(pattern, filename) {
            return true;
        }
    }
    false
}

fn glob_matches(pattern: &str, text: &str) -> bool {
    globset::Glob::new(pattern).map(|g| g.compile_matcher().is_match(text)).unwrap_or(false)
}

/// Returns true if `size_bytes` exceeds the configured ceiling.
pub fn exceeds_size_limit(size_bytes: u64, max_file_size: u64) -> bool {
    size_bytes > max_file_size
}

/// Returns true if `relative_path` falls under one of `include_paths`.
/// An empty `include_paths` list means "no restriction" (everything passes).
pub fn within_include_paths(relative_path: &str, include_paths: &[String]) -> bool {
    if include_paths.is_empty() {
        return true;
    }
    include_paths
        .iter()
        .any(|prefix| relative_path == prefix.as_str() || relative_path.starts_with(&format!("{prefix}/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_extension_lowercases() {
        assert_eq!(canonical_extension(Path::new("Main.RS")), Some("rs".to_string()));
        assert_eq!(canonical_extension(Path::new("noext")), None);
    }

    #[test]
    fn test_canonical_extension_pattern_adds_leading_dot() {
        assert_eq!(canonical_extension_pattern("RS"), ".rs");
        assert_eq!(canonical_extension_pattern(".Py"), ".py");
    }

    #[test]
    fn test_extension_allowed_empty_lists_admit_everything() {
        assert!(extension_allowed(Some("rs"), &[], &[]));
        assert!(extension_allowed(None, &[], &[]));
    }

    #[test]
    fn test_extension_allowed_allowlist_rejects_unlisted() {
        let allowed = vec![".rs".to_string(), ".py".to_string()];
        assert!(extension_allowed(Some("rs"), &allowed, &[]));
        assert!(!extension_allowed(Some("js"), &allowed, &[]));
        assert!(!extension_allowed(None, &allowed, &[]));
    }

    #[test]
    fn test_extension_allowed_blocklist_rejects_listed() {
        let blocked = vec!["png".to_string()];
        assert!(!extension_allowed(Some("png"), &[], &blocked));
        assert!(extension_allowed(Some("rs"), &[], &blocked));
        assert!(extension_allowed(None, &[], &blocked));
    }

    #[test]
    fn test_skipped_by_pattern_filename_only_match() {
        let patterns = vec!["*.generated.ts".to_string()];
        assert!(skipped_by_pattern("a/b/x.generated.ts", &patterns));
        assert!(!skipped_by_pattern("a/b/x.ts", &patterns));
    }

    #[test]
    fn test_skipped_by_pattern_double_star_suffix_form() {
        let patterns = vec!["**/*.snap".to_string()];
        assert!(skipped_by_pattern("tests/fixtures/case.snap", &patterns));
    }

    #[test]
    fn test_size_limit() {
        assert!(exceeds_size_limit(10, 5));
        assert!(!exceeds_size_limit(5, 10));
    }

    #[test]
    fn test_include_paths_empty_allows_all() {
        assert!(within_include_paths("src/main.rs", &[]));
    }

    #[test]
    fn test_include_paths_prefix_match() {
        let includes = vec!["src".to_string()];
        assert!(within_include_paths("src/main.rs", &includes));
        assert!(!within_include_paths("tests/main.rs", &includes));
    }
}
