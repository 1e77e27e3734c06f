//! Path validator (C5): composes ignore matching, extension/size filters,
//! binary detection, and symlink handling into the single gate every path
//! -- from the initial scan or a watcher event -- must pass before it
//! reaches the indexer.

use std::path::{Path, PathBuf};

use crate::config::IndexingConfig;
use crate::discovery::{binary, filters, ignore::IgnoreMatcher, symlink, DiscoveredFile};
use crate::error::CoreResult;

/// Why a path was rejected by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationReason {
    /// Path attempted to escape the watch root via `..` components.
    PathTraversal,
    /// Resolved path lies outside the configured watch root.
    OutsideWatchPath,
    /// `include_paths` is non-empty and this path isn't under any prefix.
    NotInIncludePaths,
    /// Matched a gitignore-style exclude pattern.
    IgnoredByPattern,
    /// Extension is not one the indexer recognizes as source/document text.
    ExtensionNotAllowed,
    /// Matched a configured skip-glob pattern (applied after the extension
    /// gate, independent of the ignore-file patterns).
    SkippedByPattern,
    /// Content sniff or extension marked this file as binary.
    BinaryFile,
    /// `follow_symlinks` is false and this path is a symlink.
    SymlinkNotAllowed,
    /// Symlink resolves outside the watch root.
    SymlinkEscape,
    /// Symlink forms a loop, is broken, or exceeds `max_symlink_depth`.
    SymlinkLoopOrBroken,
    /// File exceeds the configured size ceiling.
    SizeLimitExceeded,
    /// An I/O error occurred while stat-ing the path.
    IoError,
}

/// Composes the C1-C4 checks into one validation pass.
pub struct Validator {
    root: PathBuf,
    ignore: IgnoreMatcher,
    allowed_extensions: Vec<String>,
    blocked_extensions: Vec<String>,
    skip_patterns: Vec<String>,
    include_paths: Vec<String>,
    max_file_size: u64,
    follow_symlinks: bool,
    max_symlink_depth: usize,
    visited: symlink::VisitedInodes,
}

impl Validator {
    /// Build a validator for `root` from the indexing config. Ignore
    /// patterns combine `config.exclude_patterns` with `.contextignore`,
    /// `.gitignore`, and `.dockerignore` found at `root` (spec §4.1).
    pub fn new(root: &Path, config: &IndexingConfig) -> CoreResult<Self> {
        let combined = crate::discovery::ignore::load_combined(root, &config.exclude_patterns);
        Ok(Self {
            root: root.to_path_buf(),
            ignore: IgnoreMatcher::compile(&combined),
            allowed_extensions: config.allowed_extensions.clone(),
            blocked_extensions: config.blocked_extensions.clone(),
            skip_patterns: config.skip_patterns.clone(),
            include_paths: config.include_paths.clone(),
            max_file_size: config.max_file_size,
            follow_symlinks: config.follow_symlinks,
            max_symlink_depth: config.max_symlink_depth,
            visited: symlink::VisitedInodes::new(),
        })
    }

    /// Cheap directory-level check so the scanner can prune whole subtrees
    /// (e.g. `node_modules`) without descending into them.
    pub fn allows_directory(&self, root: &Path, path: &Path) -> bool {
        let Some(relative) = relative_slash_path(root, path) else {
            return false;
        };
        !self.ignore.is_ignored(&relative)
    }

    /// Validate a single file path, returning the discovered-file record on
    /// success or the rejection reason on failure.
    pub fn validate(&self, root: &Path, path: &Path) -> Result<DiscoveredFile, ValidationReason> {
        let relative = relative_slash_path(root, path).ok_or(ValidationReason::PathTraversal)?;

        let canon_root = std::fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        let canon_path = std::fs::canonicalize(path);

        let meta = std::fs::symlink_metadata(path).map_err(|_| ValidationReason::IoError)?;

        if meta.file_type().is_symlink() {
            if !self.follow_symlinks {
                return Err(ValidationReason::SymlinkNotAllowed);
            }
            match symlink::resolve(path, &self.root, self.max_symlink_depth, &self.visited) {
                symlink::SymlinkResolution::Resolved(_) => {}
                symlink::SymlinkResolution::TooDeep => return Err(ValidationReason::SymlinkLoopOrBroken),
                symlink::SymlinkResolution::BrokenOrLoop => return Err(ValidationReason::SymlinkLoopOrBroken),
                symlink::SymlinkResolution::Escapes => return Err(ValidationReason::SymlinkEscape),
            }
        } else if let Ok(canon_path) = &canon_path {
            if !canon_path.starts_with(&canon_root) {
                return Err(ValidationReason::OutsideWatchPath);
            }
        }

        if self.ignore.is_ignored(&relative) {
            return Err(ValidationReason::IgnoredByPattern);
        }

        let ext = filters::canonical_extension(path);
        if !filters::extension_allowed(ext.as_deref(), &self.allowed_extensions, &self.blocked_extensions) {
            return Err(ValidationReason::ExtensionNotAllowed);
        }

        if filters::skipped_by_pattern(&relative, &self.skip_patterns) {
            return Err(ValidationReason::SkippedByPattern);
        }

        if !filters::within_include_paths(&relative, &self.include_paths) {
            return Err(ValidationReason::NotInIncludePaths);
        }

        let size_bytes = meta.len();
        if filters::exceeds_size_limit(size_bytes, self.max_file_size) {
            return Err(ValidationReason::SizeLimitExceeded);
        }

        let language = ext.as_deref().map(crate::types::Language::from_extension);
        if matches!(language, Some(crate::types::Language::Unknown) | None) {
            if binary::has_binary_extension(path) {
                return Err(ValidationReason::BinaryFile);
            }
            return Err(ValidationReason::ExtensionNotAllowed);
        }

        if let Ok(content) = std::fs::read(path) {
            if binary::looks_binary(&content) {
                return Err(ValidationReason::BinaryFile);
            }
        }

        Ok(DiscoveredFile {
            absolute_path: path.to_path_buf(),
            relative_path: relative,
            size_bytes,
        })
    }
}

/// Compute `path` relative to `root` as a forward-slash string, rejecting
/// any path containing a `..` component (path traversal).
fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return None;
    }
    Some(rel.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_slash_path_rejects_traversal() {
        let root = Path::new("/repo");
        assert!(relative_slash_path(root, Path::new("/repo/../etc/passwd")).is_none());
        assert_eq!(
            relative_slash_path(root, Path::new("/repo/src/main.rs")),
            Some("src/main.rs".to_string())
        );
    }

    #[test]
    fn test_validate_rejects_excluded_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("node_modules")).expect("mkdir");
        let file = dir.path().join("node_modules/foo.js");
        std::fs::write(&file, b"console.log(1)").expect("write");

        let config = IndexingConfig::default();
        let validator = Validator::new(dir.path(), &config).expect("validator");
        let result = validator.validate(dir.path(), &file);
        assert_eq!(result.unwrap_err(), ValidationReason::IgnoredByPattern);
    }

    #[test]
    fn test_validate_accepts_source_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("main.rs");
        std::fs::write(&file, b"fn main() {}").expect("write");

        let config = IndexingConfig::default();
        let validator = Validator::new(dir.path(), &config).expect("validator");
        let result = validator.validate(dir.path(), &file);
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_rejects_extension_not_in_allowlist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("main.rs");
        std::fs::write(&file, b"fn main() {}").expect("write");

        let mut config = IndexingConfig::default();
        config.allowed_extensions = vec![".py".to_string()];
        let validator = Validator::new(dir.path(), &config).expect("validator");
        let result = validator.validate(dir.path(), &file);
        assert_eq!(result.unwrap_err(), ValidationReason::ExtensionNotAllowed);
    }

    #[test]
    fn test_validate_rejects_skip_glob_match() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("schema.generated.rs");
        std::fs::write(&file, b"fn main() {}").expect("write");

        let mut config = IndexingConfig::default();
        config.skip_patterns = vec!["*.generated.rs".to_string()];
        let validator = Validator::new(dir.path(), &config).expect("validator");
        let result = validator.validate(dir.path(), &file);
        assert_eq!(result.unwrap_err(), ValidationReason::SkippedByPattern);
    }

    #[test]
    fn test_validate_reads_root_gitignore() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(".gitignore"), "vendor/\n").expect("write");
        std::fs::create_dir_all(dir.path().join("vendor")).expect("mkdir");
        let file = dir.path().join("vendor/lib.rs");
        std::fs::write(&file, b"fn f() {}").expect("write");

        let config = IndexingConfig::default();
        let validator = Validator::new(dir.path(), &config).expect("validator");
        let result = validator.validate(dir.path(), &file);
        assert_eq!(result.unwrap_err(), ValidationReason::IgnoredByPattern);
    }
}
