//! Commit source backed by the GitHub GraphQL API
//!
//! Every commit comes back annotated with its expected target pull requests:
//! branches named by the source pull request's labels (through the ordered
//! `branch_label_mapping` rules) and pull requests that cross-reference the
//! source pull request and carry the same change.

use async_trait::async_trait;
use octocrab::Octocrab;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::errors::GitHubError;
use super::types::{Commit, PullRequestState, TargetPullRequestExpectation};
use crate::backport::naming::first_line;
use crate::config::BranchLabelRule;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitQuery {
    /// Commits on a branch, newest first
    History {
        source_branch: String,
        author: Option<String>,
        /// One query per path; results are merged
        paths: Vec<String>,
        max_count: u32,
    },
    /// The merge commit of a pull request
    PullNumber(u64),
    Sha(String),
}

/// Where commits and their backport metadata come from
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommitSource: Send + Sync {
    /// An empty history is `Ok(vec![])`; a missing branch is `BranchNotFound`
    async fn fetch_commits(&self, query: &CommitQuery) -> Result<Vec<Commit>, GitHubError>;
}

const SOURCE_COMMIT_FRAGMENT: &str = r#"
fragment SourceCommitWithTargetPullRequest on Commit {
  sha: oid
  message
  committedDate
  associatedPullRequests(first: 1) {
    edges {
      node {
        url
        number
        baseRefName
        mergeCommit { oid }
        labels(first: 50) { nodes { name } }
        timelineItems(last: 20, itemTypes: CROSS_REFERENCED_EVENT) {
          edges {
            node {
              ... on CrossReferencedEvent {
                targetPullRequest: source {
                  __typename
                  ... on PullRequest {
                    url
                    number
                    state
                    baseRefName
                    commits(first: 20) {
                      edges { node { targetCommit: commit { message sha: oid } } }
                    }
                  }
                }
              }
            }
          }
        }
      }
    }
  }
}
"#;

const HISTORY_QUERY: &str = r#"
query CommitsByAuthor($repoOwner: String!, $repoName: String!, $maxNumber: Int!, $sourceBranch: String!, $authorId: ID, $commitPath: String) {
  repository(owner: $repoOwner, name: $repoName) {
    ref(qualifiedName: $sourceBranch) {
      target {
        ... on Commit {
          history(first: $maxNumber, author: { id: $authorId }, path: $commitPath) {
            edges { node { ...SourceCommitWithTargetPullRequest } }
          }
        }
      }
    }
  }
}
"#;

const PULL_REQUEST_QUERY: &str = r#"
query CommitByPullNumber($repoOwner: String!, $repoName: String!, $pullNumber: Int!) {
  repository(owner: $repoOwner, name: $repoName) {
    pullRequest(number: $pullNumber) {
      merged
      mergeCommit { ...SourceCommitWithTargetPullRequest }
    }
  }
}
"#;

const SHA_QUERY: &str = r#"
query CommitBySha($repoOwner: String!, $repoName: String!, $sha: String!) {
  repository(owner: $repoOwner, name: $repoName) {
    object(expression: $sha) { ...SourceCommitWithTargetPullRequest }
  }
}
"#;

const AUTHOR_ID_QUERY: &str = r#"
query AuthorId($author: String!) {
  user(login: $author) { id }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    edges: Vec<Edge<T>>,
}

impl<T> Default for Connection<T> {
    fn default() -> Self {
        Self { edges: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Debug, Deserialize)]
struct Oid {
    oid: String,
}

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Labels {
    #[serde(default)]
    nodes: Vec<Label>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SourceCommitNode {
    sha: String,
    message: String,
    committed_date: String,
    #[serde(default)]
    associated_pull_requests: Connection<AssociatedPullRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssociatedPullRequest {
    url: String,
    number: u64,
    base_ref_name: String,
    merge_commit: Option<Oid>,
    #[serde(default)]
    labels: Labels,
    #[serde(default)]
    timeline_items: Connection<TimelineItem>,
}

/// Non cross-reference events come back as `{}`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimelineItem {
    #[serde(default)]
    target_pull_request: Option<TargetPullRequestNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetPullRequestNode {
    #[serde(rename = "__typename")]
    typename: String,
    url: Option<String>,
    number: Option<u64>,
    state: Option<String>,
    base_ref_name: Option<String>,
    #[serde(default)]
    commits: Connection<TargetCommitEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetCommitEntry {
    target_commit: TargetCommit,
}

#[derive(Debug, Deserialize)]
struct TargetCommit {
    message: String,
}

#[derive(Debug, Deserialize)]
struct HistoryData {
    repository: HistoryRepository,
}

#[derive(Debug, Deserialize)]
struct HistoryRepository {
    #[serde(rename = "ref")]
    reference: Option<HistoryRef>,
}

#[derive(Debug, Deserialize)]
struct HistoryRef {
    target: HistoryTarget,
}

#[derive(Debug, Deserialize)]
struct HistoryTarget {
    #[serde(default)]
    history: Connection<SourceCommitNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestData {
    repository: PullRequestRepository,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestRepository {
    pull_request: Option<MergedPullRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MergedPullRequest {
    merged: bool,
    merge_commit: Option<SourceCommitNode>,
}

#[derive(Debug, Deserialize)]
struct ShaData {
    repository: ShaRepository,
}

#[derive(Debug, Deserialize)]
struct ShaRepository {
    object: Option<SourceCommitNode>,
}

#[derive(Debug, Deserialize)]
struct AuthorData {
    user: Option<AuthorNode>,
}

#[derive(Debug, Deserialize)]
struct AuthorNode {
    id: String,
}

/// A compiled `branch_label_mapping` rule
#[derive(Debug, Clone)]
pub struct LabelRule {
    regex: Regex,
    branch: String,
}

impl LabelRule {
    pub fn compile(rules: &[BranchLabelRule]) -> Result<Vec<LabelRule>, regex::Error> {
        rules
            .iter()
            .map(|rule| {
                Ok(LabelRule {
                    regex: Regex::new(&rule.pattern)?,
                    branch: rule.branch.clone(),
                })
            })
            .collect()
    }
}

/// Target branches named by labels: the first matching rule per label wins,
/// capture groups are substituted, and the source branch is never a target
pub fn branches_from_labels(labels: &[String], rules: &[LabelRule], source_branch: &str) -> Vec<String> {
    let mut branches: Vec<String> = Vec::new();

    for label in labels {
        let Some(rule) = rules.iter().find(|rule| rule.regex.is_match(label)) else {
            continue;
        };
        let branch = rule.regex.replace(label, rule.branch.as_str()).into_owned();
        if branch.is_empty() || branch == source_branch || branches.contains(&branch) {
            continue;
        }
        branches.push(branch);
    }

    branches
}

fn carries_change(target_message: &str, source_sha: &str, source_message: &str) -> bool {
    target_message.contains(&format!("(cherry picked from commit {source_sha})"))
        || first_line(target_message) == first_line(source_message)
}

/// Turn a GraphQL commit node into a `Commit` with its expectations
pub(crate) fn parse_source_commit(
    node: SourceCommitNode,
    default_source_branch: &str,
    rules: &[LabelRule],
) -> Commit {
    // only a pull request merged as this very commit is its source
    let source_pull = node
        .associated_pull_requests
        .edges
        .into_iter()
        .map(|edge| edge.node)
        .find(|pull| {
            pull.merge_commit
                .as_ref()
                .is_some_and(|merge| merge.oid == node.sha)
        });

    let Some(pull) = source_pull else {
        return Commit {
            sha: node.sha,
            original_message: node.message,
            committed_date: node.committed_date,
            source_branch: default_source_branch.to_string(),
            pull_number: None,
            pull_url: None,
            expected_target_pull_requests: Vec::new(),
        };
    };

    let labels: Vec<String> = pull.labels.nodes.into_iter().map(|label| label.name).collect();
    let mut expectations: Vec<TargetPullRequestExpectation> = Vec::new();

    for item in pull.timeline_items.edges {
        let Some(target) = item.node.target_pull_request else {
            continue;
        };
        if target.typename != "PullRequest" {
            continue;
        }
        let (Some(branch), Some(state)) = (target.base_ref_name, target.state) else {
            continue;
        };
        if branch == pull.base_ref_name || expectations.iter().any(|e| e.branch == branch) {
            continue;
        }
        let matches = target.commits.edges.iter().any(|entry| {
            carries_change(&entry.node.target_commit.message, &node.sha, &node.message)
        });
        if !matches {
            continue;
        }
        expectations.push(TargetPullRequestExpectation {
            branch,
            state: PullRequestState::from_api(&state),
            number: target.number,
            url: target.url,
        });
    }

    for branch in branches_from_labels(&labels, rules, &pull.base_ref_name) {
        if !expectations.iter().any(|e| e.branch == branch) {
            expectations.push(TargetPullRequestExpectation::missing(branch));
        }
    }

    Commit {
        sha: node.sha,
        original_message: node.message,
        committed_date: node.committed_date,
        source_branch: pull.base_ref_name,
        pull_number: Some(pull.number),
        pull_url: Some(pull.url),
        expected_target_pull_requests: expectations,
    }
}

/// Deduplicate by sha and order newest first
pub fn merge_histories(histories: Vec<Vec<Commit>>) -> Vec<Commit> {
    let mut commits: Vec<Commit> = Vec::new();
    for commit in histories.into_iter().flatten() {
        if !commits.iter().any(|existing| existing.sha == commit.sha) {
            commits.push(commit);
        }
    }
    commits.sort_by(|a, b| b.committed_date.cmp(&a.committed_date));
    commits
}

pub struct GraphQlCommitSource {
    octocrab: Octocrab,
    owner: String,
    repo: String,
    default_source_branch: String,
    rules: Vec<LabelRule>,
}

impl GraphQlCommitSource {
    pub fn new(
        octocrab: Octocrab,
        owner: String,
        repo: String,
        default_source_branch: String,
        rules: Vec<LabelRule>,
    ) -> Self {
        Self {
            octocrab,
            owner,
            repo,
            default_source_branch,
            rules,
        }
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T, GitHubError> {
        let payload = json!({
            "query": format!("{query}\n{SOURCE_COMMIT_FRAGMENT}"),
            "variables": variables,
        });
        let response: GraphQlResponse<T> = self.octocrab.graphql(&payload).await?;

        if !response.errors.is_empty() {
            let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(GitHubError::GraphQl(messages.join("\n")));
        }
        response
            .data
            .ok_or_else(|| GitHubError::UnexpectedResponse("GraphQL response without data".to_string()))
    }

    async fn author_id(&self, author: &str) -> Result<String, GitHubError> {
        // the fragment is unused here, so send the query on its own
        let payload = json!({ "query": AUTHOR_ID_QUERY, "variables": { "author": author } });
        let response: GraphQlResponse<AuthorData> = self.octocrab.graphql(&payload).await?;

        // an unknown login comes back as a null user next to a NOT_FOUND error
        match response.data {
            Some(AuthorData { user: Some(user) }) => Ok(user.id),
            Some(AuthorData { user: None }) => Err(GitHubError::AuthorNotFound {
                author: author.to_string(),
            }),
            None if !response.errors.is_empty() => {
                let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
                Err(GitHubError::GraphQl(messages.join("\n")))
            }
            None => Err(GitHubError::UnexpectedResponse(
                "GraphQL response without data".to_string(),
            )),
        }
    }

    async fn history_for_path(
        &self,
        source_branch: &str,
        author_id: Option<&str>,
        path: Option<&str>,
        max_count: u32,
    ) -> Result<Vec<Commit>, GitHubError> {
        let data: HistoryData = self
            .query(
                HISTORY_QUERY,
                json!({
                    "repoOwner": self.owner,
                    "repoName": self.repo,
                    "sourceBranch": source_branch,
                    "maxNumber": max_count,
                    "authorId": author_id,
                    "commitPath": path,
                }),
            )
            .await?;

        let reference = data
            .repository
            .reference
            .ok_or_else(|| GitHubError::BranchNotFound {
                branch: source_branch.to_string(),
            })?;

        Ok(reference
            .target
            .history
            .edges
            .into_iter()
            .map(|edge| parse_source_commit(edge.node, source_branch, &self.rules))
            .collect())
    }
}

#[async_trait]
impl CommitSource for GraphQlCommitSource {
    async fn fetch_commits(&self, query: &CommitQuery) -> Result<Vec<Commit>, GitHubError> {
        match query {
            CommitQuery::History {
                source_branch,
                author,
                paths,
                max_count,
            } => {
                let author_id = match author {
                    Some(author) => Some(self.author_id(author).await?),
                    None => None,
                };
                debug!(source_branch = %source_branch, ?author, ?paths, "Fetching commit history");

                let histories = if paths.is_empty() {
                    vec![
                        self.history_for_path(source_branch, author_id.as_deref(), None, *max_count)
                            .await?,
                    ]
                } else {
                    futures::future::try_join_all(paths.iter().map(|path| {
                        self.history_for_path(
                            source_branch,
                            author_id.as_deref(),
                            Some(path.as_str()),
                            *max_count,
                        )
                    }))
                    .await?
                };

                Ok(merge_histories(histories))
            }
            CommitQuery::PullNumber(number) => {
                info!(pull_number = number, "Fetching merge commit of pull request");
                let data: PullRequestData = self
                    .query(
                        PULL_REQUEST_QUERY,
                        json!({
                            "repoOwner": self.owner,
                            "repoName": self.repo,
                            "pullNumber": number,
                        }),
                    )
                    .await?;

                let pull = data.repository.pull_request.ok_or_else(|| {
                    GitHubError::UnexpectedResponse(format!("Pull request #{number} was not found"))
                })?;
                match (pull.merged, pull.merge_commit) {
                    (true, Some(node)) => Ok(vec![parse_source_commit(
                        node,
                        &self.default_source_branch,
                        &self.rules,
                    )]),
                    _ => Err(GitHubError::PullRequestNotMerged { number: *number }),
                }
            }
            CommitQuery::Sha(sha) => {
                let data: ShaData = self
                    .query(
                        SHA_QUERY,
                        json!({
                            "repoOwner": self.owner,
                            "repoName": self.repo,
                            "sha": sha,
                        }),
                    )
                    .await?;

                let node = data
                    .repository
                    .object
                    .ok_or_else(|| GitHubError::CommitNotFound { sha: sha.clone() })?;
                Ok(vec![parse_source_commit(
                    node,
                    &self.default_source_branch,
                    &self.rules,
                )])
            }
        }
    }
}
