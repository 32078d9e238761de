//! Deterministic identifiers derived from a commit set
//!
//! The commits flow `source branch -> backport branch -> target branch`, e.g.
//! `main -> backport/7.x/pr-1234 -> 7.x`. The same commits and target branch
//! always yield the same branch name, so re-runs force-push over the previous
//! attempt instead of piling up branches.

use crate::github::types::Commit;

const MAX_REFS_LENGTH: usize = 200;
const SHORT_SHA_LENGTH: usize = 8;

/// Name of the backport branch, without remote
///
/// - single pull request: `backport/7.x/pr-1234`
/// - single commit: `backport/7.x/commit-abcdef12`
/// - several: `backport/7.x/pr-1234_commit-abcdef12`
///
/// The refs segment is cut at 200 characters, possibly in the middle of a
/// reference.
pub fn backport_branch_name(target_branch: &str, commits: &[Commit]) -> String {
    let refs: String = commits
        .iter()
        .map(commit_reference)
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .take(MAX_REFS_LENGTH)
        .collect();

    format!("backport/{target_branch}/{refs}")
}

fn commit_reference(commit: &Commit) -> String {
    match commit.pull_number {
        Some(number) => format!("pr-{number}"),
        None => format!("commit-{}", short_sha(&commit.sha)),
    }
}

/// First 8 characters of a sha
pub fn short_sha(sha: &str) -> &str {
    match sha.char_indices().nth(SHORT_SHA_LENGTH) {
        Some((index, _)) => &sha[..index],
        None => sha,
    }
}

/// First line of a commit message
pub fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or("").trim_end()
}
