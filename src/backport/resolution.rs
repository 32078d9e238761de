//! Interactive conflict resolution
//!
//! A bounded loop: show what is left, wait for the operator, look at the
//! working directory again. The file lists are recomputed on every round so
//! anything resolved out-of-band simply disappears.

use std::path::PathBuf;
use tracing::{debug, info};

use super::errors::BackportError;
use crate::external::git::{CherrypickResult, GitRepository};
use crate::external::prompt::ConfirmationPrompt;

pub const MAX_RESOLUTION_ATTEMPTS: usize = 100;

const DIVIDER: &str = "\n----------------------------------------\n";

/// Conflicting and unstaged files at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictSnapshot {
    pub conflicting_files: Vec<PathBuf>,
    pub unstaged_files: Vec<PathBuf>,
}

impl From<&CherrypickResult> for ConflictSnapshot {
    fn from(result: &CherrypickResult) -> Self {
        Self {
            conflicting_files: result
                .conflicting_files
                .iter()
                .map(|file| file.absolute.clone())
                .collect(),
            unstaged_files: result.unstaged_files.clone(),
        }
    }
}

impl ConflictSnapshot {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicting_files.is_empty()
    }

    /// Conflicting files show up as unstaged too; only the others count
    pub fn has_unstaged(&self) -> bool {
        self.unstaged_files
            .iter()
            .any(|file| !self.conflicting_files.contains(file))
    }

    pub fn is_resolved(&self) -> bool {
        !self.has_conflicts() && !self.has_unstaged()
    }

    pub fn prompt_text(&self) -> String {
        let mut sections = vec!["Fix the following conflicts manually:".to_string()];

        if self.has_conflicts() {
            sections.push(format!("Conflicting files:\n{}", bullet_list(&self.conflicting_files)));
        }
        if self.has_unstaged() {
            sections.push(format!("Unstaged files:\n{}", bullet_list(&self.unstaged_files)));
        }

        sections.push("Press ENTER when the conflicts are resolved and files are staged".to_string());
        sections.join("\n\n")
    }
}

fn bullet_list(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|file| format!(" - {}", file.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ResolutionLoop<'a> {
    repository: &'a dyn GitRepository,
    prompt: &'a dyn ConfirmationPrompt,
    max_attempts: usize,
}

impl<'a> ResolutionLoop<'a> {
    pub fn new(repository: &'a dyn GitRepository, prompt: &'a dyn ConfirmationPrompt) -> Self {
        Self {
            repository,
            prompt,
            max_attempts: MAX_RESOLUTION_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Returns the number of confirmations it took. Declining is `Aborted`;
    /// conflicts outliving `max_attempts` confirmations is `RetryLimitExceeded`.
    pub async fn run(&self, initial: ConflictSnapshot) -> Result<usize, BackportError> {
        let mut snapshot = initial;
        let mut attempts = 0;

        loop {
            if snapshot.is_resolved() {
                info!(attempts, "Conflicts resolved");
                return Ok(attempts);
            }
            if attempts >= self.max_attempts {
                return Err(BackportError::RetryLimitExceeded {
                    max_attempts: self.max_attempts,
                });
            }

            if attempts > 0 {
                println!("{DIVIDER}");
            }

            let confirmed = self
                .prompt
                .confirm(&snapshot.prompt_text())
                .await
                .map_err(BackportError::Prompt)?;
            if !confirmed {
                return Err(BackportError::Aborted);
            }
            attempts += 1;

            let (conflicting_files, unstaged_files) = tokio::try_join!(
                self.repository.conflicting_files(),
                self.repository.unstaged_files()
            )?;
            snapshot = ConflictSnapshot {
                conflicting_files: conflicting_files.into_iter().map(|file| file.absolute).collect(),
                unstaged_files,
            };
            debug!(
                attempts,
                conflicting = snapshot.conflicting_files.len(),
                unstaged = snapshot.unstaged_files.len(),
                "Re-checked working directory"
            );
        }
    }
}
