//! File discovery: ignore matching, filtering, binary detection, symlink
//! handling, and path validation, composed into a parallel directory scanner.
//!
//! ```text
//! walk root -> ignore.rs (prune) -> filters.rs (extension/size) -> binary.rs (sniff)
//!           -> symlink.rs (resolve, depth-bounded) -> validate.rs (compose all of the above)
//! ```
//!
//! The scanner (this module) fans the walk out over `rayon` so parsing and
//! hashing of independent subtrees proceed concurrently; `validate.rs` is the
//! single place every path (from both the initial scan and the watcher) is
//! required to pass through before it reaches the indexer.

pub mod binary;
pub mod filters;
pub mod ignore;
pub mod symlink;
pub mod validate;

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::config::IndexingConfig;
use crate::error::CoreResult;

pub use validate::{ValidationReason, Validator};

/// A file discovered by the scanner, already past validation.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Absolute path on disk.
    pub absolute_path: PathBuf,
    /// Path relative to the scan root, forward-slash separated.
    pub relative_path: String,
    /// File size in bytes.
    pub size_bytes: u64,
}

/// Walk `root` recursively, applying the validator to every candidate path.
/// Subdirectories are fanned out over a `rayon` thread pool so large trees
/// scan in parallel; results are collected and returned in path-sorted order
/// for deterministic downstream processing.
pub fn scan_directory(root: &Path, config: &IndexingConfig) -> CoreResult<Vec<DiscoveredFile>> {
    let validator = Validator::new(root, config)?;
    let mut results = walk_parallel(root, root, &validator);
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_parallel(root: &Path, dir: &Path, validator: &Validator) -> Vec<DiscoveredFile> {
    let entries: Vec<std::fs::DirEntry> = match std::fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(std::result::Result::ok).collect(),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to read directory");
            return Vec::new();
        }
    };

    entries
        .into_par_iter()
        .flat_map(|entry| -> Vec<DiscoveredFile> {
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(_) => return Vec::new(),
            };

            if file_type.is_dir() {
                if validator.allows_directory(root, &path) {
                    walk_parallel(root, &path, validator)
                } else {
                    Vec::new()
                }
            } else {
                match validator.validate(root, &path) {
                    Ok(discovered) => vec![discovered],
                    Err(reason) => {
                        tracing::trace!(path = %path.display(), ?reason, "path rejected");
                        Vec::new()
                    }
                }
            }
        })
        .collect()
}
