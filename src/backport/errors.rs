use thiserror::Error;

use super::completeness::{format_hint, CommitWithoutBackport};
use crate::external::command::CommandError;
use crate::external::git::GitError;
use crate::github::errors::GitHubError;

#[derive(Debug, Error)]
pub enum BackportError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    GitHub(#[from] GitHubError),
    /// Unattended mode met a conflict
    #[error("{}", conflicts_message(.target_branch, .commits_without_backports))]
    ConflictsUnresolved {
        target_branch: String,
        commits_without_backports: Vec<CommitWithoutBackport>,
    },
    #[error("Aborted")]
    Aborted,
    #[error("Conflicts were still reported after {max_attempts} confirmations, giving up")]
    RetryLimitExceeded { max_attempts: usize },
    #[error("Could not read the answer to the prompt: {0}")]
    Prompt(#[source] std::io::Error),
    #[error("There are no branches to backport to. Specify one with \"--branch\" or add target labels to the pull request")]
    NoTargetBranches,
    #[error(transparent)]
    Command(#[from] CommandError),
}

fn conflicts_message(target_branch: &str, commits: &[CommitWithoutBackport]) -> String {
    let message = "Commit could not be cherrypicked due to conflicts".to_string();
    if commits.is_empty() {
        message
    } else {
        format!("{message}\n\n{}", format_hint(target_branch, commits))
    }
}

impl BackportError {
    /// Handled errors are user-actionable and shown without the
    /// unhandled-error banner
    pub fn is_handled(&self) -> bool {
        match self {
            BackportError::Git(e) => e.is_handled(),
            BackportError::GitHub(e) => e.is_handled(),
            BackportError::ConflictsUnresolved { .. }
            | BackportError::Aborted
            | BackportError::NoTargetBranches => true,
            BackportError::RetryLimitExceeded { .. }
            | BackportError::Prompt(_)
            | BackportError::Command(_) => false,
        }
    }
}
