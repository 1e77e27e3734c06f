//! Gitignore-style pattern compilation and matching (C1).
//!
//! `globset` alone has no concept of `!`-negation or directory anchoring, so
//! this module layers that semantics on top: patterns are compiled in file
//! order, the last matching pattern wins, and a leading `!` re-includes a
//! path an earlier pattern excluded.

use std::path::Path;

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

/// A compiled set of gitignore-style patterns.
pub struct IgnoreMatcher {
    /// Parallel to `set`'s match indices: whether pattern N is a negation.
    negations: Vec<bool>,
    set: GlobSet,
}

impl IgnoreMatcher {
    /// Compile a list of gitignore-style patterns (as found in
    /// `IndexingConfig::exclude_patterns`, or combined with `load_root_files`
    /// below). Invalid patterns are skipped with a warning rather than
    /// failing the whole scan. Matching is case-insensitive by default.
    pub fn compile(patterns: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut negations = Vec::new();

        for raw in patterns {
            let (negated, pattern) = match raw.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw.as_str()),
            };
            if pattern.is_empty() {
                continue;
            }

            for anchored in expand_pattern(pattern) {
                match GlobBuilder::new(&anchored).case_insensitive(true).literal_separator(true).build() {
                    Ok(glob) => {
                        builder.add(glob);
                        negations.push(negated);
                    }
                    Err(e) => {
                        tracing::warn!(pattern = %raw, error = %e, "skipping invalid ignore pattern");
                    }
                }
            }
        }

        let set = builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().expect("empty globset"));

        Self { negations, set }
    }

    /// Returns true if `relative_path` should be ignored. Tests the full
    /// relative path and, separately, the filename-only form (so a bare
    /// `node_modules` pattern matches `a/b/node_modules` even though the
    /// pattern itself was anchored to `**/node_modules`) -- the last
    /// matching pattern across both forms determines the outcome, negated
    /// patterns re-include.
    pub fn is_ignored(&self, relative_path: &str) -> bool {
        let filename = Path::new(relative_path).file_name().and_then(|f| f.to_str());

        let mut last: Option<usize> = self.set.matches(relative_path).into_iter().max();
        if let Some(filename) = filename {
            if filename != relative_path {
                if let Some(m) = self.set.matches(filename).into_iter().max() {
                    last = Some(last.map_or(m, |l| l.max(m)));
                }
            }
        }

        match last {
            Some(idx) => !self.negations[idx],
            None => false,
        }
    }
}

/// Turn one raw gitignore-style pattern into the one or two globset patterns
/// that realize it, per spec §4.1:
///
/// - a trailing `/` implies `/**` (directory and everything under it)
/// - a leading `/` anchors to the root instead of matching at any depth
/// - a pattern with no wildcard characters and no interior `/` is expanded
///   to match both the path itself and everything under it (`P` and `P/**`)
fn expand_pattern(pattern: &str) -> Vec<String> {
    let dir_only = pattern.ends_with('/');
    let trimmed = pattern.trim_end_matches('/');
    let anchored = trimmed.starts_with('/');
    let core = trimmed.trim_start_matches('/');

    let has_wildcard = core.contains(|c| matches!(c, '*' | '?' | '['));
    let has_interior_slash = core.contains('/');

    let base = if anchored { core.to_string() } else { format!("**/{core}") };

    if dir_only {
        return vec![format!("{base}/**")];
    }
    if !has_wildcard && !has_interior_slash {
        return vec![base.clone(), format!("{base}/**")];
    }
    vec![base]
}

/// Read and concatenate exclude patterns from the well-known ignore files at
/// `root`, in the order spec §4.1 requires: explicit config patterns first,
/// then `.contextignore`, `.gitignore`, `.dockerignore`. Blank lines and
/// `#`-comments within each file are skipped. Missing files are silently
/// treated as empty.
pub fn load_combined(root: &Path, explicit_patterns: &[String]) -> Vec<String> {
    let mut combined = explicit_patterns.to_vec();
    for name in [".contextignore", ".gitignore", ".dockerignore"] {
        combined.extend(read_ignore_file(&root.join(name)));
    }
    combined
}

fn read_ignore_file(path: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_exclude() {
        let matcher = IgnoreMatcher::compile(&["node_modules".to_string(), "*.lock".to_string()]);
        assert!(matcher.is_ignored("node_modules/foo.js"));
        assert!(matcher.is_ignored("Cargo.lock"));
        assert!(!matcher.is_ignored("src/main.rs"));
    }

    #[test]
    fn test_negation_re_includes() {
        let matcher =
            IgnoreMatcher::compile(&["*.min.js".to_string(), "!important.min.js".to_string()]);
        assert!(matcher.is_ignored("vendor/other.min.js"));
        assert!(!matcher.is_ignored("important.min.js"));
    }

    #[test]
    fn test_case_insensitive_by_default() {
        let matcher = IgnoreMatcher::compile(&["NODE_MODULES".to_string()]);
        assert!(matcher.is_ignored("node_modules/foo.js"));
    }

    #[test]
    fn test_bare_pattern_matches_self_and_children() {
        let matcher = IgnoreMatcher::compile(&["build".to_string()]);
        assert!(matcher.is_ignored("build"));
        assert!(matcher.is_ignored("build/output.bin"));
        assert!(matcher.is_ignored("nested/build/output.bin"));
    }

    #[test]
    fn test_trailing_slash_implies_recursive_directory() {
        let matcher = IgnoreMatcher::compile(&["dist/".to_string()]);
        assert!(matcher.is_ignored("dist/bundle.js"));
        assert!(!matcher.is_ignored("distribution.js"));
    }

    #[test]
    fn test_leading_slash_anchors_to_root() {
        let matcher = IgnoreMatcher::compile(&["/vendor".to_string()]);
        assert!(matcher.is_ignored("vendor/lib.rs"));
        assert!(!matcher.is_ignored("nested/vendor/lib.rs"));
    }

    #[test]
    fn test_double_star_crosses_directories() {
        let matcher = IgnoreMatcher::compile(&["**/*.generated.rs".to_string()]);
        assert!(matcher.is_ignored("a/b/c/foo.generated.rs"));
    }

    #[test]
    fn test_load_combined_reads_root_ignore_files_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(".gitignore"), "# comment\n\ntarget/\n").expect("write");
        std::fs::write(dir.path().join(".contextignore"), "*.secret\n").expect("write");

        let combined = load_combined(dir.path(), &["explicit.tmp".to_string()]);
        assert_eq!(combined[0], "explicit.tmp");
        assert!(combined.contains(&"*.secret".to_string()));
        assert!(combined.contains(&"target/".to_string()));
    }

    #[test]
    fn test_load_combined_missing_files_are_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let combined = load_combined(dir.path(), &["a".to_string()]);
        assert_eq!(combined, vec!["a".to_string()]);
    }
}
