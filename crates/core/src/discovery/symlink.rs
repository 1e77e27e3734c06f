//! Symlink resolution with depth-bounded traversal and loop detection (C4).
//!
//! Visited inodes are tracked in a `dashmap::DashSet` so the directory
//! scanner's parallel `rayon` fan-out can share one visited-set across
//! threads without an external mutex.

use std::path::{Path, PathBuf};

use dashmap::DashSet;

/// Default maximum number of symlink hops to follow before giving up.
pub const DEFAULT_MAX_SYMLINK_DEPTH: usize = 3;

/// Outcome of attempting to resolve a symlink.
#[derive(Debug)]
pub enum SymlinkResolution {
    /// Resolved to a real path within `max_depth` hops.
    Resolved(PathBuf),
    /// Hop count exceeded `max_depth`.
    TooDeep,
    /// Target does not exist, or a loop was detected.
    BrokenOrLoop,
    /// Resolved target escapes the watch root.
    Escapes,
}

/// Tracks inodes visited during a scan to short-circuit symlink loops.
#[derive(Default)]
pub struct VisitedInodes {
    seen: DashSet<(u64, u64)>,
}

impl VisitedInodes {
    /// Create an empty visited set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path`'s (device, inode) pair; returns true if it was already
    /// present (i.e. this path has been visited before, signaling a loop).
    #[cfg(unix)]
    pub fn mark_and_check(&self, path: &Path) -> bool {
        use std::os::unix::fs::MetadataExt;
        let Ok(meta) = std::fs::metadata(path) else {
            return false;
        };
        !self.seen.insert((meta.dev(), meta.ino()))
    }

    /// Non-Unix fallback: dedupe on canonicalized path string since inode
    /// numbers aren't exposed uniformly.
    #[cfg(not(unix))]
    pub fn mark_and_check(&self, path: &Path) -> bool {
        let Ok(canon) = std::fs::canonicalize(path) else {
            return false;
        };
        let key = (canon.to_string_lossy().len() as u64, {
            use std::hash::{Hash, Hasher};
            let mut h = std::collections::hash_map::DefaultHasher::new();
            canon.hash(&mut h);
            h.finish()
        });
        !self.seen.insert(key)
    }
}

/// Resolve a symlink up to `max_depth` hops, rejecting targets that escape
/// `watch_root` or that form a loop.
pub fn resolve(path: &Path, watch_root: &Path, max_depth: usize, visited: &VisitedInodes) -> SymlinkResolution {
    let mut current = path.to_path_buf();

    for _ in 0..max_depth {
        if visited.mark_and_check(&current) {
            return SymlinkResolution::BrokenOrLoop;
        }

        let meta = match std::fs::symlink_metadata(&current) {
            Ok(m) => m,
            Err(_) => return SymlinkResolution::BrokenOrLoop,
        };

        if !meta.file_type().is_symlink() {
            return finish(current, watch_root);
        }

        current = match std::fs::read_link(&current) {
            Ok(target) if target.is_relative() => current
                .parent()
                .map(|p| p.join(&target))
                .unwrap_or(target),
            Ok(target) => target,
            Err(_) => return SymlinkResolution::BrokenOrLoop,
        };
    }

    SymlinkResolution::TooDeep
}

fn finish(resolved: PathBuf, watch_root: &Path) -> SymlinkResolution {
    let canon_root = std::fs::canonicalize(watch_root).unwrap_or_else(|_| watch_root.to_path_buf());
    let canon_target = std::fs::canonicalize(&resolved).unwrap_or(resolved);

    if canon_target.starts_with(&canon_root) {
        SymlinkResolution::Resolved(canon_target)
    } else {
        SymlinkResolution::Escapes
    }
}
