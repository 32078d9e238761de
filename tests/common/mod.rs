//! Scripted fake collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use backporter::backport::Collaborators;
use backporter::config::BackportConfig;
use backporter::external::{
    CherrypickOptions, CherrypickResult, CommandError, CommandExecutor, CommandOutput,
    ConfirmationPrompt, ConflictFile, GitError, GitRepository,
};
use backporter::github::commits::CommitQuery;
use backporter::github::types::{
    Commit, CreatedPullRequest, PullRequestPayload, PullRequestState, TargetPullRequestExpectation,
};
use backporter::github::{CommitSource, GitHubError, PullRequestPublisher};

pub const REPO_PATH: &str = "/tmp/backport-repositories/elastic/kibana";

pub fn config() -> BackportConfig {
    let mut config = BackportConfig::default();
    config.github.owner = "elastic".to_string();
    config.github.repo = "kibana".to_string();
    config.github.username = Some("sqren".to_string());
    config.github.token = Some("secret-token".to_string());
    config
}

pub fn commit(sha: &str, message: &str, pull_number: Option<u64>) -> Commit {
    Commit {
        sha: sha.to_string(),
        original_message: message.to_string(),
        committed_date: "2021-06-01T00:00:00Z".to_string(),
        source_branch: "main".to_string(),
        pull_number,
        pull_url: pull_number.map(|n| format!("https://github.com/elastic/kibana/pull/{n}")),
        expected_target_pull_requests: vec![],
    }
}

pub fn expectation(branch: &str, state: PullRequestState) -> TargetPullRequestExpectation {
    TargetPullRequestExpectation {
        branch: branch.to_string(),
        state,
        number: None,
        url: None,
    }
}

pub fn conflict(relative: &str) -> ConflictFile {
    ConflictFile {
        absolute: Path::new(REPO_PATH).join(relative),
        relative: relative.to_string(),
    }
}

/// Records every call; cherry-pick results are scripted per sha and
/// conflict re-checks are served from a queue
pub struct FakeRepository {
    path: PathBuf,
    pub exists: bool,
    calls: Mutex<Vec<String>>,
    cherrypicks: Mutex<HashMap<String, Result<CherrypickResult, GitError>>>,
    conflict_checks: Mutex<VecDeque<Vec<ConflictFile>>>,
    failing_branches: Mutex<HashMap<String, GitError>>,
}

impl Default for FakeRepository {
    fn default() -> Self {
        Self {
            path: PathBuf::from(REPO_PATH),
            exists: true,
            calls: Mutex::new(Vec::new()),
            cherrypicks: Mutex::new(HashMap::new()),
            conflict_checks: Mutex::new(VecDeque::new()),
            failing_branches: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeRepository {
    pub fn with_conflicts(self, sha: &str, files: Vec<ConflictFile>) -> Self {
        self.cherrypicks.lock().unwrap().insert(
            sha.to_string(),
            Ok(CherrypickResult {
                conflicting_files: files,
                unstaged_files: vec![],
                needs_resolving: true,
            }),
        );
        self
    }

    pub fn with_cherrypick_error(self, sha: &str, error: GitError) -> Self {
        self.cherrypicks.lock().unwrap().insert(sha.to_string(), Err(error));
        self
    }

    /// `create_backport_branch` fails for this target branch
    pub fn with_failing_branch(self, branch: &str, error: GitError) -> Self {
        self.failing_branches.lock().unwrap().insert(branch.to_string(), error);
        self
    }

    pub fn with_conflict_checks(self, checks: Vec<Vec<ConflictFile>>) -> Self {
        *self.conflict_checks.lock().unwrap() = checks.into();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl GitRepository for FakeRepository {
    fn path(&self) -> &Path {
        &self.path
    }

    fn repo_exists(&self) -> bool {
        self.exists
    }

    async fn clone_repo(&self) -> Result<(), GitError> {
        self.record("clone".to_string());
        Ok(())
    }

    async fn create_backport_branch(&self, target_branch: &str, backport_branch: &str) -> Result<(), GitError> {
        self.record(format!("create_backport_branch {target_branch} {backport_branch}"));
        match self.failing_branches.lock().unwrap().remove(target_branch) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn fetch_branch(&self, branch: &str) -> Result<(), GitError> {
        self.record(format!("fetch {branch}"));
        Ok(())
    }

    async fn cherrypick(&self, sha: &str, options: &CherrypickOptions) -> Result<CherrypickResult, GitError> {
        self.record(format!("cherrypick {sha} mainline={:?}", options.mainline));
        self.cherrypicks
            .lock()
            .unwrap()
            .remove(sha)
            .unwrap_or_else(|| Ok(CherrypickResult::default()))
    }

    async fn conflicting_files(&self) -> Result<Vec<ConflictFile>, GitError> {
        Ok(self.conflict_checks.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn unstaged_files(&self) -> Result<Vec<PathBuf>, GitError> {
        Ok(vec![])
    }

    async fn commit_changes(&self, commit: &Commit, no_verify: bool) -> Result<(), GitError> {
        self.record(format!("commit {} no_verify={no_verify}", commit.sha));
        Ok(())
    }

    async fn set_commit_author(&self, username: &str) -> Result<(), GitError> {
        self.record(format!("set_commit_author {username}"));
        Ok(())
    }

    async fn push_backport_branch(&self, fork_owner: &str, backport_branch: &str) -> Result<(), GitError> {
        self.record(format!("push {fork_owner} {backport_branch}"));
        Ok(())
    }

    async fn delete_backport_branch(&self, source_branch: &str, backport_branch: &str) -> Result<(), GitError> {
        self.record(format!("delete_backport_branch {source_branch} {backport_branch}"));
        Ok(())
    }

    async fn add_remote(&self, remote_owner: &str) {
        self.record(format!("add_remote {remote_owner}"));
    }

    async fn delete_remote(&self, remote_owner: &str) -> Result<(), GitError> {
        self.record(format!("delete_remote {remote_owner}"));
        Ok(())
    }

    async fn is_commit_in_branch(&self, sha: &str) -> Result<bool, GitError> {
        self.record(format!("is_commit_in_branch {sha}"));
        Ok(false)
    }
}

type Responder = Box<dyn Fn(&CommitQuery) -> Result<Vec<Commit>, GitHubError> + Send + Sync>;

pub struct FakeCommitSource {
    responder: Responder,
    queries: Mutex<Vec<CommitQuery>>,
}

impl FakeCommitSource {
    pub fn new(responder: impl Fn(&CommitQuery) -> Result<Vec<Commit>, GitHubError> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(commits: Vec<Commit>) -> Self {
        Self::new(move |_| Ok(commits.clone()))
    }

    pub fn queries(&self) -> Vec<CommitQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommitSource for FakeCommitSource {
    async fn fetch_commits(&self, query: &CommitQuery) -> Result<Vec<Commit>, GitHubError> {
        self.queries.lock().unwrap().push(query.clone());
        (self.responder)(query)
    }
}

/// Numbers pull requests from 100 upwards
#[derive(Default)]
pub struct FakePublisher {
    calls: Mutex<Vec<String>>,
    payloads: Mutex<Vec<PullRequestPayload>>,
    /// base branch -> error returned by `create_pull_request`
    failures: Mutex<HashMap<String, GitHubError>>,
}

impl FakePublisher {
    pub fn failing_for(self, base: &str, error: GitHubError) -> Self {
        self.failures.lock().unwrap().insert(base.to_string(), error);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn payloads(&self) -> Vec<PullRequestPayload> {
        self.payloads.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PullRequestPublisher for FakePublisher {
    async fn create_pull_request(&self, payload: &PullRequestPayload) -> Result<CreatedPullRequest, GitHubError> {
        if let Some(error) = self.failures.lock().unwrap().remove(&payload.base) {
            return Err(error);
        }
        let mut payloads = self.payloads.lock().unwrap();
        payloads.push(payload.clone());
        let number = 99 + payloads.len() as u64;
        self.record(format!("create {} -> {}", payload.head, payload.base));
        Ok(CreatedPullRequest {
            url: format!("https://github.com/elastic/kibana/pull/{number}"),
            number,
            did_update: false,
        })
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), GitHubError> {
        self.record(format!("labels #{number} {}", labels.join(",")));
        Ok(())
    }

    async fn add_assignees(&self, number: u64, assignees: &[String]) -> Result<(), GitHubError> {
        self.record(format!("assignees #{number} {}", assignees.join(",")));
        Ok(())
    }

    async fn add_reviewers(&self, number: u64, reviewers: &[String]) -> Result<(), GitHubError> {
        self.record(format!("reviewers #{number} {}", reviewers.join(",")));
        Ok(())
    }

    async fn enable_auto_merge(&self, number: u64, merge_method: &str) -> Result<(), GitHubError> {
        self.record(format!("auto_merge #{number} {merge_method}"));
        Ok(())
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<(), GitHubError> {
        self.record(format!("comment #{number} {body}"));
        Ok(())
    }
}

/// Answers from a queue; an exhausted queue declines
#[derive(Default)]
pub struct FakePrompt {
    answers: Mutex<VecDeque<bool>>,
    messages: Mutex<Vec<String>>,
}

impl FakePrompt {
    pub fn answering(answers: Vec<bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfirmationPrompt for FakePrompt {
    async fn confirm(&self, message: &str) -> io::Result<bool> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(false))
    }
}

/// Succeeds for every command and records it
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn execute(&self, _dir: &Path, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push(format!("{program} {}", args.join(" ")));
        Ok(CommandOutput {
            status_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

pub struct Harness {
    pub repository: Arc<FakeRepository>,
    pub commit_source: Arc<FakeCommitSource>,
    pub publisher: Arc<FakePublisher>,
    pub prompt: Arc<FakePrompt>,
    pub executor: Arc<RecordingExecutor>,
}

impl Harness {
    pub fn new(repository: FakeRepository, commit_source: FakeCommitSource, publisher: FakePublisher, prompt: FakePrompt) -> Self {
        Self {
            repository: Arc::new(repository),
            commit_source: Arc::new(commit_source),
            publisher: Arc::new(publisher),
            prompt: Arc::new(prompt),
            executor: Arc::new(RecordingExecutor::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            repository: self.repository.clone(),
            commit_source: self.commit_source.clone(),
            publisher: self.publisher.clone(),
            prompt: self.prompt.clone(),
            executor: self.executor.clone(),
            auto_fixer: None,
        }
    }
}
