//! Cherry-pick engine: one target branch per call
//!
//! Creates the backport branch, picks the commits in the order given, routes
//! conflicts through the auto-fix hook and then the operator, pushes, deletes
//! the local branch and publishes the pull request.

use std::sync::Arc;
use tracing::{info, warn};

use super::completeness::{format_hint, CompletenessAnalyzer};
use super::errors::BackportError;
use super::lifecycle::{BackportLifecycle, LifecycleEvent};
use super::naming::{backport_branch_name, first_line};
use super::payload::{build_payload, PayloadTemplate};
use super::resolution::{ConflictSnapshot, ResolutionLoop};
use crate::config::BackportConfig;
use crate::external::autofix::ConflictAutoFixer;
use crate::external::command::CommandExecutor;
use crate::external::git::{CherrypickOptions, CherrypickResult, GitRepository};
use crate::external::prompt::ConfirmationPrompt;
use crate::github::commits::CommitSource;
use crate::github::pulls::PullRequestPublisher;
use crate::github::types::{Commit, CreatedPullRequest};
use statig::prelude::*;

/// The external collaborators of a run
#[derive(Clone)]
pub struct Collaborators {
    pub repository: Arc<dyn GitRepository>,
    pub commit_source: Arc<dyn CommitSource>,
    pub publisher: Arc<dyn PullRequestPublisher>,
    pub prompt: Arc<dyn ConfirmationPrompt>,
    /// Runs the editor
    pub executor: Arc<dyn CommandExecutor>,
    pub auto_fixer: Option<Arc<dyn ConflictAutoFixer>>,
}

/// How a commit made it onto the backport branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickOutcome {
    Applied,
    AutoFixed { conflicting_files: usize },
    ResolvedManually { conflicting_files: usize },
}

pub struct CherrypickEngine {
    collaborators: Collaborators,
    analyzer: CompletenessAnalyzer,
    config: Arc<BackportConfig>,
}

impl CherrypickEngine {
    pub fn new(collaborators: Collaborators, config: Arc<BackportConfig>) -> Self {
        let analyzer = CompletenessAnalyzer::new(
            collaborators.commit_source.clone(),
            collaborators.repository.clone(),
            config.backport.max_number,
        );
        Self {
            collaborators,
            analyzer,
            config,
        }
    }

    fn cherrypick_options(&self) -> CherrypickOptions {
        CherrypickOptions {
            mainline: self.config.backport.mainline,
            include_origin_reference: self.config.backport.cherrypick_ref,
        }
    }

    /// Backport `commits` to `target_branch` and open the pull request
    pub async fn backport_to_branch(
        &self,
        commits: &[Commit],
        target_branch: &str,
    ) -> Result<CreatedPullRequest, BackportError> {
        let repository = &self.collaborators.repository;
        let options = &self.config.backport;
        let backport_branch = backport_branch_name(target_branch, commits);
        let fork_owner = self.config.fork_owner();
        let payload = build_payload(
            &PayloadTemplate {
                owner: &self.config.github.owner,
                repo: &self.config.github.repo,
                fork_owner,
                title: &options.pr_title,
                description: options.pr_description.as_deref(),
            },
            target_branch,
            &backport_branch,
            commits,
        );

        let mut lifecycle = BackportLifecycle::new(target_branch).state_machine();

        info!(target_branch, backport_branch = %backport_branch, "Backporting via filesystem");
        repository
            .create_backport_branch(target_branch, &backport_branch)
            .await?;
        lifecycle.handle(&LifecycleEvent::BranchCreated {
            backport_branch: backport_branch.clone(),
        });

        for commit in commits {
            lifecycle.handle(&LifecycleEvent::PickStarted {
                sha: commit.sha.clone(),
            });
            println!("Cherry-picking: {}", first_line(&commit.original_message));

            match self.pick_commit(commit, target_branch).await? {
                PickOutcome::Applied => lifecycle.handle(&LifecycleEvent::Applied),
                PickOutcome::AutoFixed { conflicting_files } => {
                    lifecycle.handle(&LifecycleEvent::ConflictDetected {
                        files: conflicting_files,
                    });
                    lifecycle.handle(&LifecycleEvent::AutoFixed);
                    lifecycle.handle(&LifecycleEvent::CommitFinalized);
                }
                PickOutcome::ResolvedManually { conflicting_files } => {
                    lifecycle.handle(&LifecycleEvent::ConflictDetected {
                        files: conflicting_files,
                    });
                    lifecycle.handle(&LifecycleEvent::ResolutionStarted);
                    lifecycle.handle(&LifecycleEvent::CommitFinalized);
                }
            }
        }

        if options.reset_author {
            if let Some(username) = &self.config.github.username {
                repository.set_commit_author(username).await?;
                lifecycle.handle(&LifecycleEvent::AuthorReset);
            }
        }

        repository
            .push_backport_branch(fork_owner, &backport_branch)
            .await?;
        lifecycle.handle(&LifecycleEvent::Pushed);

        let source_branch = commits
            .first()
            .map(|commit| commit.source_branch.as_str())
            .unwrap_or(options.source_branch.as_str());
        repository
            .delete_backport_branch(source_branch, &backport_branch)
            .await?;
        lifecycle.handle(&LifecycleEvent::LocalBranchDeleted);

        let pull_request = self
            .collaborators
            .publisher
            .create_pull_request(&payload)
            .await?;
        self.decorate_pull_request(&pull_request, commits).await?;
        lifecycle.handle(&LifecycleEvent::PullRequestPublished {
            number: pull_request.number,
        });

        println!("View pull request: {}", pull_request.url);
        Ok(pull_request)
    }

    async fn pick_commit(
        &self,
        commit: &Commit,
        target_branch: &str,
    ) -> Result<PickOutcome, BackportError> {
        let repository = &self.collaborators.repository;

        repository.fetch_branch(&commit.source_branch).await?;
        let result = repository
            .cherrypick(&commit.sha, &self.cherrypick_options())
            .await?;
        if !result.needs_resolving {
            return Ok(PickOutcome::Applied);
        }
        let conflicting_files = result.conflicting_files.len();

        if let Some(auto_fixer) = &self.collaborators.auto_fixer {
            println!("Attempting to resolve conflicts automatically");
            let files: Vec<String> = result
                .conflicting_files
                .iter()
                .map(|file| file.absolute.display().to_string())
                .collect();

            if auto_fixer
                .fix(&files, repository.path(), target_branch)
                .await?
            {
                repository
                    .commit_changes(commit, self.config.backport.no_verify)
                    .await?;
                return Ok(PickOutcome::AutoFixed { conflicting_files });
            }
        }

        self.resolve_manually(commit, target_branch, &result).await?;
        Ok(PickOutcome::ResolvedManually { conflicting_files })
    }

    async fn resolve_manually(
        &self,
        commit: &Commit,
        target_branch: &str,
        result: &CherrypickResult,
    ) -> Result<(), BackportError> {
        let repository = &self.collaborators.repository;
        let relative: Vec<String> = result
            .conflicting_files
            .iter()
            .map(|file| file.relative.clone())
            .collect();
        let commits_without_backports = self
            .analyzer
            .commits_without_backports(commit, target_branch, &relative)
            .await?;

        if self.config.backport.ci {
            return Err(BackportError::ConflictsUnresolved {
                target_branch: target_branch.to_string(),
                commits_without_backports,
            });
        }

        println!("\nThe commit could not be backported due to conflicts\n");
        if !commits_without_backports.is_empty() {
            println!("{}\n\n", format_hint(target_branch, &commits_without_backports));
        }

        if let Some(editor) = &self.config.backport.editor {
            self.open_editor(editor).await?;
        }

        ResolutionLoop::new(repository.as_ref(), self.collaborators.prompt.as_ref())
            .run(ConflictSnapshot::from(result))
            .await?;

        println!("Finalizing cherrypick");
        repository
            .commit_changes(commit, self.config.backport.no_verify)
            .await?;
        Ok(())
    }

    async fn open_editor(&self, editor: &str) -> Result<(), BackportError> {
        let repository = &self.collaborators.repository;
        let mut parts = editor.split_whitespace();
        let Some(program) = parts.next() else {
            return Ok(());
        };

        let path = repository.path().display().to_string();
        let mut args: Vec<&str> = parts.collect();
        args.push(&path);

        let output = self
            .collaborators
            .executor
            .execute(repository.path(), program, &args)
            .await?;
        if !output.success() {
            warn!(editor, status_code = output.status_code, "Editor exited unsuccessfully");
        }
        Ok(())
    }

    /// Assignees, reviewers, labels and auto-merge on the new pull request,
    /// then labels on the source pull requests
    async fn decorate_pull_request(
        &self,
        pull_request: &CreatedPullRequest,
        commits: &[Commit],
    ) -> Result<(), BackportError> {
        let publisher = &self.collaborators.publisher;
        let options = &self.config.backport;

        let assignees = match (&self.config.github.username, options.auto_assign) {
            (Some(username), true) => vec![username.clone()],
            _ => options.assignees.clone(),
        };
        if !assignees.is_empty() {
            publisher
                .add_assignees(pull_request.number, &assignees)
                .await?;
        }

        if !options.reviewers.is_empty() {
            publisher
                .add_reviewers(pull_request.number, &options.reviewers)
                .await?;
        }

        if !options.target_pr_labels.is_empty() {
            publisher
                .add_labels(pull_request.number, &options.target_pr_labels)
                .await?;
        }

        if options.auto_merge {
            publisher
                .enable_auto_merge(pull_request.number, &options.auto_merge_method)
                .await?;
        }

        if !options.source_pr_labels.is_empty() {
            let labels = &options.source_pr_labels;
            futures::future::try_join_all(
                commits
                    .iter()
                    .filter_map(|commit| commit.pull_number)
                    .map(|number| publisher.add_labels(number, labels)),
            )
            .await?;
        }

        Ok(())
    }
}
