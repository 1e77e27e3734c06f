//! Git history parsing, feeding the git-history context provider (C15).
//!
//! Shells out to `git log` rather than using `gix`: the queries needed
//! here (recent commits touching a path, with author/message/timestamp)
//! are a single subprocess call and a few lines of line-oriented parsing,
//! and the repository's `git` binary is always present in a dev
//! environment whereas a from-scratch `gix` tree-diff walk would need to
//! reimplement pathspec filtering to get the same answer.
#![allow(clippy::doc_markdown, clippy::missing_errors_doc)]

use std::path::Path;

use crate::error::{CoreError, CoreResult};

/// A single commit touching one or more indexed files.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommitInfo {
    /// Git commit hash (full SHA).
    pub hash: String,
    /// Commit message (first line / subject).
    pub message: String,
    /// Author name.
    pub author: String,
    /// Commit timestamp, ISO 8601.
    pub timestamp: String,
    /// Files changed in this commit, repo-relative paths.
    pub files_changed: Vec<String>,
}

/// Default number of commits scanned when no override is configured.
pub const DEFAULT_MAX_COMMITS: usize = 500;

/// Load recent commit history from a repository via `git log`.
///
/// Returns commits newest-first, matching `git log`'s default order.
pub fn load_history(repo_path: &Path, max_commits: usize) -> CoreResult<Vec<CommitInfo>> {
    let output = std::process::Command::new("git")
        .args([
            "log",
            "--format=%H%n%s%n%an%n%aI",
            "--name-only",
            &format!("-{max_commits}"),
        ])
        .current_dir(repo_path)
        .output()
        .map_err(|e| CoreError::Internal(format!("git log failed to spawn: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CoreError::Internal(format!("git log exited with error: {stderr}")));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_git_log(&stdout))
}

/// Commits that touched `relative_path`, most recent first, capped at
/// `limit`. `history` is expected to already be sorted newest-first (as
/// `load_history` returns it).
pub fn commits_for_file<'a>(
    history: &'a [CommitInfo],
    relative_path: &str,
    limit: usize,
) -> Vec<&'a CommitInfo> {
    history
        .iter()
        .filter(|c| c.files_changed.iter().any(|f| f == relative_path))
        .take(limit)
        .collect()
}

/// The most active authors of `relative_path`, ranked by commit count,
/// scanning at most `scan_limit` of the most recent touching commits.
pub fn top_authors(history: &[CommitInfo], relative_path: &str, scan_limit: usize, top_n: usize) -> Vec<(String, usize)> {
    let touching = commits_for_file(history, relative_path, scan_limit);
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for commit in touching {
        *counts.entry(commit.author.clone()).or_default() += 1;
    }
    let mut sorted: Vec<(String, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(top_n);
    sorted
}

/// Parse `git log --format=%H%n%s%n%an%n%aI --name-only` output into
/// `CommitInfo` records.
///
/// Each commit block is: hash, subject, author, timestamp, a blank line,
/// then zero or more changed file paths, then a blank line (or EOF).
fn parse_git_log(output: &str) -> Vec<CommitInfo> {
    let mut commits = Vec::new();
    let mut lines = output.lines().peekable();

    while lines.peek().is_some() {
        let hash = match lines.next() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => break,
        };
        let message = lines.next().unwrap_or("").to_string();
        let author = lines.next().unwrap_or("").to_string();
        let timestamp = lines.next().unwrap_or("").to_string();

        if let Some(line) = lines.peek() {
            if line.is_empty() {
                lines.next();
            }
        }

        let mut files = Vec::new();
        while let Some(line) = lines.peek() {
            if line.is_empty() {
                lines.next();
                break;
            }
            files.push((*line).to_string());
            lines.next();
        }

        commits.push(CommitInfo { hash, message, author, timestamp, files_changed: files });
    }

    commits
}
