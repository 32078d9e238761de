//! Drives the engine once per target branch, strictly one after the other:
//! every branch shares the same working directory.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use super::engine::{CherrypickEngine, Collaborators};
use super::errors::BackportError;
use crate::config::BackportConfig;
use crate::github::commits::CommitQuery;
use crate::github::errors::GitHubError;
use crate::github::types::{Commit, PullRequestState};
use crate::telemetry::{backport_span, LogContext};

/// Result of one target branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BranchOutcome {
    Success {
        target_branch: String,
        pull_request_url: String,
        pull_request_number: u64,
        did_update: bool,
    },
    Failure {
        target_branch: String,
        error_message: String,
    },
}

impl BranchOutcome {
    pub fn target_branch(&self) -> &str {
        match self {
            BranchOutcome::Success { target_branch, .. }
            | BranchOutcome::Failure { target_branch, .. } => target_branch,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BranchOutcome::Success { .. })
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BackportResponse {
    Success {
        commits: Vec<Commit>,
        results: Vec<BranchOutcome>,
    },
    Failure {
        commits: Vec<Commit>,
        error_message: String,
    },
}

impl BackportResponse {
    /// Every branch that was attempted produced a pull request
    pub fn is_success(&self) -> bool {
        match self {
            BackportResponse::Success { results, .. } => results.iter().all(BranchOutcome::is_success),
            BackportResponse::Failure { .. } => false,
        }
    }

    pub fn commits(&self) -> &[Commit] {
        match self {
            BackportResponse::Success { commits, .. } | BackportResponse::Failure { commits, .. } => commits,
        }
    }
}

/// What to fetch, from the most specific option down to branch history
pub fn commit_query(config: &BackportConfig) -> CommitQuery {
    let options = &config.backport;
    if let Some(sha) = &options.sha {
        CommitQuery::Sha(sha.clone())
    } else if let Some(number) = options.pull_number {
        CommitQuery::PullNumber(number)
    } else {
        CommitQuery::History {
            source_branch: options.source_branch.clone(),
            author: options.author.clone(),
            paths: options.commit_paths.clone(),
            max_count: options.max_number,
        }
    }
}

/// Explicit target branches win; otherwise every branch some commit still
/// owes a backport to, in order of first appearance
pub fn select_target_branches(
    explicit: &[String],
    commits: &[Commit],
) -> Result<Vec<String>, BackportError> {
    let mut branches: Vec<String> = Vec::new();

    if explicit.is_empty() {
        let pending = commits
            .iter()
            .flat_map(|commit| commit.expected_target_pull_requests.iter())
            .filter(|expectation| {
                matches!(expectation.state, PullRequestState::Missing | PullRequestState::Closed)
            })
            .map(|expectation| expectation.branch.clone());
        for branch in pending {
            if !branches.contains(&branch) {
                branches.push(branch);
            }
        }
    } else {
        branches = explicit.to_vec();
    }

    if branches.is_empty() {
        return Err(BackportError::NoTargetBranches);
    }
    Ok(branches)
}

pub fn status_comment(response: &BackportResponse) -> String {
    match response {
        BackportResponse::Success { results, .. } => {
            let header = if results.iter().all(BranchOutcome::is_success) {
                "## 💚 All backports created successfully"
            } else {
                "## 💔 Some backports could not be created"
            };
            let rows: Vec<String> = results
                .iter()
                .map(|outcome| match outcome {
                    BranchOutcome::Success {
                        target_branch,
                        pull_request_url,
                        ..
                    } => format!("|✅|{target_branch}|{pull_request_url}|"),
                    BranchOutcome::Failure {
                        target_branch,
                        error_message,
                    } => format!(
                        "|❌|{target_branch}|{}|",
                        error_message.replace('\n', " ").replace('|', "\\|")
                    ),
                })
                .collect();
            format!(
                "{header}\n\n| Status | Branch | Result |\n|:------:|:------:|:------|\n{}",
                rows.join("\n")
            )
        }
        BackportResponse::Failure { error_message, .. } => {
            format!("## 💔 Backport failed\n\n{error_message}")
        }
    }
}

pub struct Sequencer {
    collaborators: Collaborators,
    config: Arc<BackportConfig>,
    log_context: LogContext,
    engine: CherrypickEngine,
}

impl Sequencer {
    pub fn new(collaborators: Collaborators, config: Arc<BackportConfig>, log_context: LogContext) -> Self {
        let engine = CherrypickEngine::new(collaborators.clone(), config.clone());
        Self {
            collaborators,
            config,
            log_context,
            engine,
        }
    }

    /// Clone the repository when missing, then point the upstream and fork
    /// remotes at the configured host
    pub async fn prepare_working_copy(&self) -> Result<(), BackportError> {
        let repository = &self.collaborators.repository;

        if !repository.repo_exists() {
            println!("Cloning repository to {}", repository.path().display());
            repository.clone_repo().await?;
        }

        let mut remotes = vec![self.config.github.owner.as_str()];
        let fork_owner = self.config.fork_owner();
        if fork_owner != self.config.github.owner {
            remotes.push(fork_owner);
        }

        for remote in remotes {
            repository.delete_remote(remote).await?;
            repository.add_remote(remote).await;
        }
        Ok(())
    }

    pub async fn fetch_commits(&self) -> Result<Vec<Commit>, BackportError> {
        let query = commit_query(&self.config);
        let mut commits = self.collaborators.commit_source.fetch_commits(&query).await?;

        if commits.is_empty() {
            let options = &self.config.backport;
            return Err(GitHubError::NoCommitsFound {
                author: options.author.clone(),
                paths: options.commit_paths.clone(),
            }
            .into());
        }

        // without a picker, history mode backports the newest commit
        if matches!(query, CommitQuery::History { .. }) {
            commits.truncate(1);
        }
        Ok(commits)
    }

    /// Handled failures are recorded and the next branch is attempted;
    /// anything else aborts the run
    pub async fn run(
        &self,
        commits: &[Commit],
        target_branches: &[String],
    ) -> Result<Vec<BranchOutcome>, BackportError> {
        let mut results = Vec::with_capacity(target_branches.len());

        for target_branch in target_branches {
            let span = backport_span(target_branch, &self.log_context.correlation_id);
            let outcome = self
                .engine
                .backport_to_branch(commits, target_branch)
                .instrument(span)
                .await;

            match outcome {
                Ok(pull_request) => results.push(BranchOutcome::Success {
                    target_branch: target_branch.clone(),
                    pull_request_url: pull_request.url,
                    pull_request_number: pull_request.number,
                    did_update: pull_request.did_update,
                }),
                Err(e) if e.is_handled() => {
                    let error_message = self.log_context.redactor.redact(&e.to_string());
                    warn!(target_branch = %target_branch, error = %error_message, "Backport failed");
                    println!("{error_message}");
                    results.push(BranchOutcome::Failure {
                        target_branch: target_branch.clone(),
                        error_message,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(results)
    }

    /// Complete run: working copy, commits, target branches, backports
    pub async fn backport(&self) -> Result<BackportResponse, (Vec<Commit>, BackportError)> {
        let commits = self.fetch_commits().await.map_err(|e| (Vec::new(), e))?;
        let target_branches = select_target_branches(&self.config.backport.target_branches, &commits)
            .map_err(|e| (commits.clone(), e))?;
        info!(
            commits = commits.len(),
            target_branches = ?target_branches,
            correlation_id = %self.log_context.correlation_id,
            "Starting backport"
        );

        self.prepare_working_copy()
            .await
            .map_err(|e| (commits.clone(), e))?;
        let results = self
            .run(&commits, &target_branches)
            .await
            .map_err(|e| (commits.clone(), e))?;

        let failed: Vec<&str> = results
            .iter()
            .filter(|outcome| !outcome.is_success())
            .map(BranchOutcome::target_branch)
            .collect();
        if !failed.is_empty() {
            warn!(failed_branches = ?failed, "Some backports could not be created");
        }

        Ok(BackportResponse::Success { commits, results })
    }

    /// Summarize the run on the source pull request. Only in CI mode, and
    /// never fatal.
    pub async fn post_status_comment(&self, response: &BackportResponse) {
        if !self.config.backport.ci {
            return;
        }
        let Some(number) = response.commits().first().and_then(|commit| commit.pull_number) else {
            return;
        };

        let body = status_comment(response);
        if let Err(e) = self.collaborators.publisher.create_comment(number, &body).await {
            warn!(number, error = %e, "Could not post status comment");
        }
    }
}
