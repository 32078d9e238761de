use async_trait::async_trait;
use octocrab::Octocrab;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{
    errors::GitHubError,
    types::{CreatedPullRequest, PullRequestPayload},
};

/// Mutations on the target pull request; each one is keyed by the pull
/// request number
#[async_trait]
pub trait PullRequestPublisher: Send + Sync {
    /// Opens the pull request, or returns the open one for the same head and
    /// base with `did_update` set
    async fn create_pull_request(
        &self,
        payload: &PullRequestPayload,
    ) -> Result<CreatedPullRequest, GitHubError>;

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), GitHubError>;

    async fn add_assignees(&self, number: u64, assignees: &[String]) -> Result<(), GitHubError>;

    async fn add_reviewers(&self, number: u64, reviewers: &[String]) -> Result<(), GitHubError>;

    /// `merge_method` is MERGE, SQUASH or REBASE
    async fn enable_auto_merge(&self, number: u64, merge_method: &str) -> Result<(), GitHubError>;

    async fn create_comment(&self, number: u64, body: &str) -> Result<(), GitHubError>;
}

/// Handler for GitHub pull request operations
#[derive(Debug, Clone)]
pub struct PullRequestHandler {
    octocrab: Octocrab,
    owner: String,
    repo: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestRef {
    html_url: String,
    number: u64,
}

#[derive(Debug, Deserialize)]
struct PullRequestNodeId {
    node_id: String,
}

const ENABLE_AUTO_MERGE_MUTATION: &str = r#"
mutation EnableAutoMerge($pullRequestId: ID!, $mergeMethod: PullRequestMergeMethod!) {
  enablePullRequestAutoMerge(input: { pullRequestId: $pullRequestId, mergeMethod: $mergeMethod }) {
    pullRequest { number }
  }
}
"#;

/// 422 with "A pull request already exists for ..."
fn is_already_exists(error: &octocrab::Error) -> bool {
    let octocrab::Error::GitHub { source, .. } = error else {
        return false;
    };
    source.message.contains("already exists")
        || source.errors.iter().flatten().any(|entry| {
            entry
                .get("message")
                .and_then(Value::as_str)
                .is_some_and(|message| message.contains("already exists"))
        })
}

impl PullRequestHandler {
    pub fn new(octocrab: Octocrab, owner: String, repo: String) -> Self {
        Self {
            octocrab,
            owner,
            repo,
        }
    }

    fn route(&self, path: &str) -> String {
        format!("/repos/{}/{}/{}", self.owner, self.repo, path)
    }

    async fn find_open_pull_request(
        &self,
        payload: &PullRequestPayload,
    ) -> Result<Option<PullRequestRef>, GitHubError> {
        let route = format!("/repos/{}/{}/pulls", payload.owner, payload.repo);
        let pulls: Vec<PullRequestRef> = self
            .octocrab
            .get(
                route,
                Some(&json!({
                    "head": payload.head,
                    "base": payload.base,
                    "state": "open",
                })),
            )
            .await?;
        Ok(pulls.into_iter().next())
    }
}

#[async_trait]
impl PullRequestPublisher for PullRequestHandler {
    async fn create_pull_request(
        &self,
        payload: &PullRequestPayload,
    ) -> Result<CreatedPullRequest, GitHubError> {
        info!(head = %payload.head, base = %payload.base, "Creating pull request");
        let route = format!("/repos/{}/{}/pulls", payload.owner, payload.repo);
        let result: Result<PullRequestRef, octocrab::Error> = self
            .octocrab
            .post(
                route,
                Some(&json!({
                    "title": payload.title,
                    "body": payload.body,
                    "head": payload.head,
                    "base": payload.base,
                })),
            )
            .await;

        match result {
            Ok(pull) => Ok(CreatedPullRequest {
                url: pull.html_url,
                number: pull.number,
                did_update: false,
            }),
            Err(error) if is_already_exists(&error) => {
                debug!(head = %payload.head, "Pull request already exists");
                let existing = self
                    .find_open_pull_request(payload)
                    .await?
                    .ok_or(GitHubError::ApiError(error))?;
                Ok(CreatedPullRequest {
                    url: existing.html_url,
                    number: existing.number,
                    did_update: true,
                })
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), GitHubError> {
        debug!(number, ?labels, "Adding labels");
        let _: Value = self
            .octocrab
            .post(
                self.route(&format!("issues/{number}/labels")),
                Some(&json!({ "labels": labels })),
            )
            .await?;
        Ok(())
    }

    async fn add_assignees(&self, number: u64, assignees: &[String]) -> Result<(), GitHubError> {
        debug!(number, ?assignees, "Adding assignees");
        let _: Value = self
            .octocrab
            .post(
                self.route(&format!("issues/{number}/assignees")),
                Some(&json!({ "assignees": assignees })),
            )
            .await?;
        Ok(())
    }

    async fn add_reviewers(&self, number: u64, reviewers: &[String]) -> Result<(), GitHubError> {
        debug!(number, ?reviewers, "Requesting reviews");
        let _: Value = self
            .octocrab
            .post(
                self.route(&format!("pulls/{number}/requested_reviewers")),
                Some(&json!({ "reviewers": reviewers })),
            )
            .await?;
        Ok(())
    }

    async fn enable_auto_merge(&self, number: u64, merge_method: &str) -> Result<(), GitHubError> {
        let pull: PullRequestNodeId = self
            .octocrab
            .get(self.route(&format!("pulls/{number}")), None::<&()>)
            .await?;

        let response: Value = self
            .octocrab
            .graphql(&json!({
                "query": ENABLE_AUTO_MERGE_MUTATION,
                "variables": {
                    "pullRequestId": pull.node_id,
                    "mergeMethod": merge_method.to_uppercase(),
                },
            }))
            .await?;

        if let Some(errors) = response.get("errors").and_then(Value::as_array) {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|error| error.get("message").and_then(Value::as_str))
                .collect();
            if !messages.is_empty() {
                return Err(GitHubError::GraphQl(messages.join("\n")));
            }
        }

        info!(number, merge_method, "Enabled auto-merge");
        Ok(())
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<(), GitHubError> {
        let _: Value = self
            .octocrab
            .post(
                self.route(&format!("issues/{number}/comments")),
                Some(&json!({ "body": body })),
            )
            .await?;
        Ok(())
    }
}
