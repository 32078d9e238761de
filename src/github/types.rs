use serde::{Deserialize, Serialize};

/// Landing state of a commit on one target branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PullRequestState {
    Open,
    Merged,
    Closed,
    /// A backport was expected (branch label mapping) but no pull request exists
    Missing,
}

impl PullRequestState {
    /// Parse the state string reported by the GitHub API. Unknown values
    /// are treated as closed.
    pub fn from_api(state: &str) -> Self {
        match state.to_ascii_uppercase().as_str() {
            "OPEN" => PullRequestState::Open,
            "MERGED" => PullRequestState::Merged,
            "MISSING" => PullRequestState::Missing,
            _ => PullRequestState::Closed,
        }
    }
}

/// Where a source commit is supposed to land, and how far it got
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPullRequestExpectation {
    pub branch: String,
    pub state: PullRequestState,
    pub number: Option<u64>,
    pub url: Option<String>,
}

impl TargetPullRequestExpectation {
    pub fn missing(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            state: PullRequestState::Missing,
            number: None,
            url: None,
        }
    }
}

/// A commit on the source branch, annotated with its expected backports.
/// Identity is the sha; values are never mutated after being fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub original_message: String,
    /// Raw ISO-8601 string as reported by the commit source. Compared
    /// lexicographically, never parsed.
    pub committed_date: String,
    pub source_branch: String,
    pub pull_number: Option<u64>,
    pub pull_url: Option<String>,
    pub expected_target_pull_requests: Vec<TargetPullRequestExpectation>,
}

impl Commit {
    pub fn expectation_for(&self, branch: &str) -> Option<&TargetPullRequestExpectation> {
        self.expected_target_pull_requests
            .iter()
            .find(|expectation| expectation.branch == branch)
    }
}

/// Everything the publisher needs to open the target pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestPayload {
    pub owner: String,
    pub repo: String,
    pub title: String,
    pub body: String,
    /// `<fork owner>:<backport branch>`
    pub head: String,
    pub base: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedPullRequest {
    pub url: String,
    pub number: u64,
    /// The pull request already existed and was updated by the force push
    pub did_update: bool,
}
