//! Git command abstractions
//!
//! The version-control gateway: every primitive the backport engine needs,
//! executed through a `CommandExecutor` against one working directory.
//!
//! Failures are classified by matching known diagnostic substrings in git's
//! output. This is a heuristic tied to git's wording; the tables below are the
//! only place that knows those strings and each one has a test.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::command::{CommandError, CommandExecutor, CommandOutput};
use crate::backport::naming::short_sha;
use crate::github::types::Commit;
use crate::telemetry::Redactor;

const MERGE_COMMIT_DIAGNOSTIC: &str = "is a merge but no -m option was given";
const EMPTY_PICK_DIAGNOSTIC: &str = "The previous cherry-pick is now empty";
const IDENTITY_DIAGNOSTIC: &str = "Please tell me who you are";
const NOTHING_TO_COMMIT_DIAGNOSTIC: &str = "nothing to commit";
const EMPTY_MESSAGE_DIAGNOSTIC: &str = "Aborting commit due to empty commit message";
// matched against lowercased stderr
const MISSING_REF_DIAGNOSTICS: [&str; 2] = ["couldn't find remote ref", "invalid refspec"];
const MISSING_REPOSITORY_DIAGNOSTIC: &str = "repository not found";

/// `git diff --check` exits with 2 when it found conflict markers
const DIFF_CHECK_CONFLICT_EXIT_CODE: i32 = 2;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("The branch \"{branch}\" is invalid or doesn't exist")]
    InvalidBranch { branch: String },
    #[error(
        "Cherrypick failed because the selected commit was a merge commit. Please try again by specifying the parent with the `mainline` argument:\n\n> backporter --mainline\n\nor:\n\n> backporter --mainline <parent-number>\n\nOr refer to the git documentation for more information: https://git-scm.com/docs/git-cherry-pick#Documentation/git-cherry-pick.txt---mainlineparent-number"
    )]
    CherrypickMergeCommit,
    #[error("Cherrypick failed because the selected commit ({short_sha}) is empty. Did you already backport this commit?")]
    CherrypickEmpty { short_sha: String },
    #[error("Cherrypick failed:\n{details}")]
    IdentityMissing { details: String },
    #[error("Cherrypick failed because commit \"{sha}\" was not found")]
    CommitNotFound { sha: String },
    #[error(
        "Error pushing to https://{hostname}/{fork_owner}/{repo_name}. Repository does not exist. Either fork the source repository (https://{hostname}/{repo_owner}/{repo_name}) or disable fork mode \"--no-fork\"."
    )]
    ForkMissing {
        hostname: String,
        fork_owner: String,
        repo_owner: String,
        repo_name: String,
    },
    #[error("`git {command}` failed with exit code {status_code}: {stderr}")]
    CommandFailed {
        command: String,
        status_code: i32,
        stdout: String,
        stderr: String,
    },
    #[error("Command execution error: {source}")]
    CommandError {
        #[from]
        source: CommandError,
    },
}

impl GitError {
    /// Recognized failures are shown to the user without a stack of context
    pub fn is_handled(&self) -> bool {
        !matches!(
            self,
            GitError::CommandFailed { .. } | GitError::CommandError { .. }
        )
    }
}

/// A file containing conflict markers, rooted at the working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictFile {
    pub absolute: PathBuf,
    pub relative: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CherrypickResult {
    pub conflicting_files: Vec<ConflictFile>,
    pub unstaged_files: Vec<PathBuf>,
    /// The pick failed and left conflicts or unstaged changes behind
    pub needs_resolving: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CherrypickOptions {
    pub mainline: Option<u32>,
    /// Append "(cherry picked from commit ...)" to the message (`-x`)
    pub include_origin_reference: bool,
}

/// Where the working copy lives and how to reach its remotes
#[derive(Debug, Clone)]
pub struct RepoCoordinates {
    pub owner: String,
    pub name: String,
    pub hostname: String,
    pub access_token: String,
    /// `<root>/<owner>/<name>`
    pub path: PathBuf,
}

impl RepoCoordinates {
    pub fn new(
        root: &Path,
        owner: impl Into<String>,
        name: impl Into<String>,
        hostname: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        let owner = owner.into();
        let name = name.into();
        let path = root.join(&owner).join(&name);
        Self {
            owner,
            name,
            hostname: hostname.into(),
            access_token: access_token.into(),
            path,
        }
    }

    pub fn owner_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.path.clone())
    }

    /// Remotes are named after their owner; the URL embeds the access token
    pub fn remote_url(&self, remote_owner: &str) -> String {
        format!(
            "https://x-access-token:{}@{}/{}/{}.git",
            self.access_token, self.hostname, remote_owner, self.name
        )
    }
}

/// Trait for the version-control primitives of one working directory
///
/// No two calls may overlap for the same repository: they all mutate the
/// single checked-out working copy.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait GitRepository: Send + Sync {
    /// Working directory
    fn path(&self) -> &Path;

    /// Whether the working directory holds a usable repository
    fn repo_exists(&self) -> bool;

    async fn clone_repo(&self) -> Result<(), GitError>;

    /// Reset, clean, fetch the target branch from upstream and check out a
    /// fresh untracked branch at it
    async fn create_backport_branch(
        &self,
        target_branch: &str,
        backport_branch: &str,
    ) -> Result<(), GitError>;

    async fn fetch_branch(&self, branch: &str) -> Result<(), GitError>;

    async fn cherrypick(
        &self,
        sha: &str,
        options: &CherrypickOptions,
    ) -> Result<CherrypickResult, GitError>;

    async fn conflicting_files(&self) -> Result<Vec<ConflictFile>, GitError>;

    async fn unstaged_files(&self) -> Result<Vec<PathBuf>, GitError>;

    async fn commit_changes(&self, commit: &Commit, no_verify: bool) -> Result<(), GitError>;

    async fn set_commit_author(&self, username: &str) -> Result<(), GitError>;

    async fn push_backport_branch(
        &self,
        fork_owner: &str,
        backport_branch: &str,
    ) -> Result<(), GitError>;

    /// Deletes the local branch only; the remote one backs the pull request
    async fn delete_backport_branch(
        &self,
        source_branch: &str,
        backport_branch: &str,
    ) -> Result<(), GitError>;

    /// Failures are swallowed: the remote usually exists already
    async fn add_remote(&self, remote_owner: &str);

    /// A missing remote is not an error
    async fn delete_remote(&self, remote_owner: &str) -> Result<(), GitError>;

    /// Ancestry test against HEAD
    async fn is_commit_in_branch(&self, sha: &str) -> Result<bool, GitError>;
}

/// Real Git implementation
pub struct GitClient {
    executor: Arc<dyn CommandExecutor>,
    coordinates: RepoCoordinates,
    redactor: Redactor,
}

impl GitClient {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        coordinates: RepoCoordinates,
        redactor: Redactor,
    ) -> Self {
        Self {
            executor,
            coordinates,
            redactor,
        }
    }

    pub fn coordinates(&self) -> &RepoCoordinates {
        &self.coordinates
    }

    async fn run_in(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput, GitError> {
        debug!(command = %self.redactor.redact(&args.join(" ")), "git");
        let output = self.executor.execute(dir, "git", args).await?;
        if !output.success() {
            debug!(
                status_code = output.status_code,
                stderr = %self.redactor.redact(output.stderr.trim()),
                "git command exited unsuccessfully"
            );
        }
        Ok(output)
    }

    /// Run git in the working directory; a non-zero exit is returned, not raised
    async fn run(&self, args: &[&str]) -> Result<CommandOutput, GitError> {
        self.run_in(&self.coordinates.path, args).await
    }

    /// Run git in the working directory; a non-zero exit becomes `CommandFailed`
    async fn run_checked(&self, args: &[&str]) -> Result<CommandOutput, GitError> {
        let output = self.run(args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(self.command_failed(args, output))
        }
    }

    fn command_failed(&self, args: &[&str], output: CommandOutput) -> GitError {
        GitError::CommandFailed {
            command: self.redactor.redact(&args.join(" ")),
            status_code: output.status_code,
            stdout: self.redactor.redact(&output.stdout),
            stderr: self.redactor.redact(output.stderr.trim()),
        }
    }

    /// Known cherry-pick diagnostics, checked before falling back to
    /// conflict inspection
    fn classify_cherrypick_failure(sha: &str, output: &CommandOutput) -> Option<GitError> {
        let text = output.combined();

        if text.contains(MERGE_COMMIT_DIAGNOSTIC) {
            Some(GitError::CherrypickMergeCommit)
        } else if text.contains(EMPTY_PICK_DIAGNOSTIC) {
            Some(GitError::CherrypickEmpty {
                short_sha: short_sha(sha).to_string(),
            })
        } else if text.contains(IDENTITY_DIAGNOSTIC) {
            Some(GitError::IdentityMissing {
                details: output.stderr.trim().to_string(),
            })
        } else if text.contains(&format!("bad object {sha}")) {
            Some(GitError::CommitNotFound {
                sha: sha.to_string(),
            })
        } else {
            None
        }
    }

    fn is_missing_ref(stderr: &str) -> bool {
        let stderr = stderr.to_lowercase();
        MISSING_REF_DIAGNOSTICS
            .iter()
            .any(|diagnostic| stderr.contains(diagnostic))
    }
}

/// Parse `git diff --check` output into conflicting files
///
/// Each diagnostic line is `<path>:<line>: <message>`; the diff excerpts that
/// follow (`+`/`-` lines) are skipped. Paths are deduplicated keeping the
/// order of first appearance.
pub fn parse_conflicting_files(repo_path: &Path, diff_check_output: &str) -> Vec<ConflictFile> {
    let mut files: Vec<ConflictFile> = Vec::new();

    for line in diff_check_output.lines() {
        if line.trim().is_empty() || line.starts_with('+') || line.starts_with('-') {
            continue;
        }

        let relative = match line.find(':') {
            Some(separator) => line[..separator].trim(),
            None => line.trim(),
        };

        if files.iter().any(|file| file.relative == relative) {
            continue;
        }

        files.push(ConflictFile {
            absolute: repo_path.join(relative),
            relative: relative.to_string(),
        });
    }

    files
}

/// Parse `git diff --name-only` output into absolute, deduplicated paths
pub fn parse_unstaged_files(repo_path: &Path, name_only_output: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    for file in name_only_output.lines().filter(|line| !line.is_empty()) {
        let path = repo_path.join(file);
        if !files.contains(&path) {
            files.push(path);
        }
    }
    files
}

#[async_trait]
impl GitRepository for GitClient {
    fn path(&self) -> &Path {
        &self.coordinates.path
    }

    fn repo_exists(&self) -> bool {
        git2::Repository::open(&self.coordinates.path).is_ok()
    }

    async fn clone_repo(&self) -> Result<(), GitError> {
        let owner_dir = self.coordinates.owner_dir();
        tokio::fs::create_dir_all(&owner_dir)
            .await
            .map_err(|e| CommandError::Io {
                message: format!("Could not create {}: {e}", owner_dir.display()),
            })?;

        let remote_url = self.coordinates.remote_url(&self.coordinates.owner);
        let args = ["clone", remote_url.as_str(), "--progress"];
        info!(
            repo = %format!("{}/{}", self.coordinates.owner, self.coordinates.name),
            path = %self.coordinates.path.display(),
            "Cloning repository"
        );

        let output = self.run_in(&owner_dir, &args).await?;
        if !output.success() {
            return Err(self.command_failed(&args, output));
        }
        Ok(())
    }

    async fn create_backport_branch(
        &self,
        target_branch: &str,
        backport_branch: &str,
    ) -> Result<(), GitError> {
        let upstream = self.coordinates.owner.as_str();
        let upstream_ref = format!("{upstream}/{target_branch}");
        let steps: [&[&str]; 4] = [
            &["reset", "--hard"],
            &["clean", "-d", "--force"],
            &["fetch", upstream, target_branch],
            &["checkout", "-B", backport_branch, upstream_ref.as_str(), "--no-track"],
        ];

        for args in steps {
            let output = self.run(args).await?;
            if output.success() {
                continue;
            }
            if Self::is_missing_ref(&output.stderr) {
                return Err(GitError::InvalidBranch {
                    branch: target_branch.to_string(),
                });
            }
            return Err(self.command_failed(args, output));
        }

        info!(target_branch, backport_branch, "Created backport branch");
        Ok(())
    }

    async fn fetch_branch(&self, branch: &str) -> Result<(), GitError> {
        let refspec = format!("{branch}:{branch}");
        self.run_checked(&["fetch", self.coordinates.owner.as_str(), refspec.as_str(), "--force"])
            .await?;
        Ok(())
    }

    async fn cherrypick(
        &self,
        sha: &str,
        options: &CherrypickOptions,
    ) -> Result<CherrypickResult, GitError> {
        let mainline = options.mainline.map(|parent| parent.to_string());
        let mut args = vec!["cherry-pick"];
        if options.include_origin_reference {
            args.push("-x");
        }
        if let Some(parent) = mainline.as_deref() {
            args.extend(["--mainline", parent]);
        }
        args.push(sha);

        let output = self.run(&args).await?;
        if output.success() {
            return Ok(CherrypickResult::default());
        }

        if let Some(error) = Self::classify_cherrypick_failure(sha, &output) {
            return Err(error);
        }

        // the pick itself failed: find out whether it left something to resolve
        let (conflicting_files, unstaged_files) =
            tokio::try_join!(self.conflicting_files(), self.unstaged_files())?;

        if !conflicting_files.is_empty() || !unstaged_files.is_empty() {
            return Ok(CherrypickResult {
                conflicting_files,
                unstaged_files,
                needs_resolving: true,
            });
        }

        Err(self.command_failed(&args, output))
    }

    async fn conflicting_files(&self) -> Result<Vec<ConflictFile>, GitError> {
        let args = ["--no-pager", "diff", "--check"];
        let output = self.run(&args).await?;

        match output.status_code {
            0 => Ok(Vec::new()),
            DIFF_CHECK_CONFLICT_EXIT_CODE => Ok(parse_conflicting_files(
                &self.coordinates.path,
                &output.stdout,
            )),
            _ => Err(self.command_failed(&args, output)),
        }
    }

    async fn unstaged_files(&self) -> Result<Vec<PathBuf>, GitError> {
        let output = self
            .run_checked(&["--no-pager", "diff", "--name-only"])
            .await?;
        Ok(parse_unstaged_files(&self.coordinates.path, &output.stdout))
    }

    async fn commit_changes(&self, commit: &Commit, no_verify: bool) -> Result<(), GitError> {
        let mut args = vec!["commit", "--no-edit"];
        if no_verify {
            args.push("--no-verify");
        }

        let output = self.run(&args).await?;
        if output.success() {
            return Ok(());
        }

        // the user may have committed by hand while resolving conflicts
        if output.combined().contains(NOTHING_TO_COMMIT_DIAGNOSTIC) {
            info!(
                sha = %commit.sha,
                "Could not run \"git commit\". Probably because the changes were manually committed"
            );
            return Ok(());
        }

        // the inferred message is gone, e.g. after `git reset HEAD` aborted the pick
        if output.stderr.contains(EMPTY_MESSAGE_DIAGNOSTIC) {
            let mut retry = vec!["commit", "-m", commit.original_message.as_str()];
            if no_verify {
                retry.push("--no-verify");
            }
            self.run_checked(&retry).await?;
            return Ok(());
        }

        Err(self.command_failed(&args, output))
    }

    async fn set_commit_author(&self, username: &str) -> Result<(), GitError> {
        let author = format!("{username} <{username}@users.noreply.github.com>");
        info!(author = %author, "Changing commit author");
        self.run_checked(&["commit", "--amend", "--no-edit", "--author", author.as_str()])
            .await?;
        Ok(())
    }

    async fn push_backport_branch(
        &self,
        fork_owner: &str,
        backport_branch: &str,
    ) -> Result<(), GitError> {
        let refspec = format!("{backport_branch}:{backport_branch}");
        let args = ["push", fork_owner, refspec.as_str(), "--force"];
        info!(branch = %format!("{fork_owner}:{backport_branch}"), "Pushing branch");

        let output = self.run(&args).await?;
        if output.success() {
            return Ok(());
        }

        if output
            .stderr
            .to_lowercase()
            .contains(MISSING_REPOSITORY_DIAGNOSTIC)
        {
            return Err(GitError::ForkMissing {
                hostname: self.coordinates.hostname.clone(),
                fork_owner: fork_owner.to_string(),
                repo_owner: self.coordinates.owner.clone(),
                repo_name: self.coordinates.name.clone(),
            });
        }

        Err(self.command_failed(&args, output))
    }

    async fn delete_backport_branch(
        &self,
        source_branch: &str,
        backport_branch: &str,
    ) -> Result<(), GitError> {
        self.run_checked(&["reset", "--hard"]).await?;
        self.run_checked(&["checkout", source_branch]).await?;
        self.run_checked(&["branch", "-D", backport_branch]).await?;
        Ok(())
    }

    async fn add_remote(&self, remote_owner: &str) {
        let url = self.coordinates.remote_url(remote_owner);
        match self.run(&["remote", "add", remote_owner, url.as_str()]).await {
            Ok(output) if output.success() => {}
            Ok(_) => debug!(remote = remote_owner, "Remote could not be added"),
            Err(e) => debug!(remote = remote_owner, error = %e, "Remote could not be added"),
        }
    }

    async fn delete_remote(&self, remote_owner: &str) -> Result<(), GitError> {
        // a non-zero exit means the remote didn't exist
        self.run(&["remote", "rm", remote_owner]).await?;
        Ok(())
    }

    async fn is_commit_in_branch(&self, sha: &str) -> Result<bool, GitError> {
        let output = self
            .run(&["merge-base", "--is-ancestor", sha, "HEAD"])
            .await?;
        Ok(output.success())
    }
}
