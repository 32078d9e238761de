//! Explains a conflict by the commits that still owe a backport
//!
//! When a pick conflicts, older commits on the source branch touching the same
//! files that never landed on the target branch are the usual suspects. The
//! result is advisory text only; it never changes what gets picked.

use std::sync::Arc;
use tracing::debug;

use super::errors::BackportError;
use super::naming::first_line;
use crate::external::git::GitRepository;
use crate::github::commits::{CommitQuery, CommitSource};
use crate::github::types::{Commit, PullRequestState, TargetPullRequestExpectation};

/// Only this many conflicting paths are sent to the commit source
pub const MAX_CONFLICTING_FILES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitWithoutBackport {
    pub commit: Commit,
    pub expectation: TargetPullRequestExpectation,
}

impl CommitWithoutBackport {
    /// ` - <first line> (backport pending|missing)` plus the most useful link
    /// on a second line: the open backport, or else the source pull request
    pub fn formatted(&self) -> String {
        let (status, url) = match self.expectation.state {
            PullRequestState::Open => ("(backport pending)", self.expectation.url.as_deref()),
            _ => ("(backport missing)", self.commit.pull_url.as_deref()),
        };

        let line = format!(" - {} {status}", first_line(&self.commit.original_message));
        match url {
            Some(url) => format!("{line}\n   {url}"),
            None => line,
        }
    }
}

pub fn format_hint(target_branch: &str, commits: &[CommitWithoutBackport]) -> String {
    let lines: Vec<String> = commits.iter().map(CommitWithoutBackport::formatted).collect();
    format!(
        "Hint: Before fixing the conflicts manually you should consider backporting the following commits to \"{target_branch}\":\n{}",
        lines.join("\n")
    )
}

pub struct CompletenessAnalyzer {
    commit_source: Arc<dyn CommitSource>,
    repository: Arc<dyn GitRepository>,
    max_count: u32,
}

impl CompletenessAnalyzer {
    pub fn new(
        commit_source: Arc<dyn CommitSource>,
        repository: Arc<dyn GitRepository>,
        max_count: u32,
    ) -> Self {
        Self {
            commit_source,
            repository,
            max_count,
        }
    }

    pub async fn commits_without_backports(
        &self,
        commit: &Commit,
        target_branch: &str,
        conflicting_files: &[String],
    ) -> Result<Vec<CommitWithoutBackport>, BackportError> {
        let paths: Vec<String> = conflicting_files
            .iter()
            .take(MAX_CONFLICTING_FILES)
            .cloned()
            .collect();

        let candidates = self
            .commit_source
            .fetch_commits(&CommitQuery::History {
                source_branch: commit.source_branch.clone(),
                author: None,
                paths,
                max_count: self.max_count,
            })
            .await?;

        let mut result = Vec::new();
        for candidate in candidates {
            // raw string comparison: both dates come from the same source
            if candidate.committed_date >= commit.committed_date {
                continue;
            }

            let Some(expectation) = candidate.expectation_for(target_branch).cloned() else {
                continue;
            };
            if expectation.state == PullRequestState::Merged {
                continue;
            }

            // metadata can lag behind: the commit may be in the branch already
            if self.repository.is_commit_in_branch(&candidate.sha).await? {
                debug!(sha = %candidate.sha, "Commit already in target branch");
                continue;
            }

            result.push(CommitWithoutBackport {
                commit: candidate,
                expectation,
            });
        }

        Ok(result)
    }
}
