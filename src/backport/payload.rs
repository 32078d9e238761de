use super::naming::{first_line, short_sha};
use crate::github::types::{Commit, PullRequestPayload};

/// Everything that goes into the target pull request besides the commits
#[derive(Debug, Clone)]
pub struct PayloadTemplate<'a> {
    pub owner: &'a str,
    pub repo: &'a str,
    pub fork_owner: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
}

fn commit_entry(commit: &Commit) -> String {
    let message = first_line(&commit.original_message);
    match &commit.pull_url {
        Some(url) => format!(" - [{message}]({url})"),
        None => format!(" - {message} ({})", short_sha(&commit.sha)),
    }
}

fn source_branch(commits: &[Commit]) -> &str {
    commits
        .first()
        .map(|commit| commit.source_branch.as_str())
        .unwrap_or_default()
}

pub fn default_description(target_branch: &str, commits: &[Commit]) -> String {
    let entries: Vec<String> = commits.iter().map(commit_entry).collect();
    format!(
        "# Backport\n\nThis will backport the following commits from `{}` to `{target_branch}`:\n{}",
        source_branch(commits),
        entries.join("\n")
    )
}

/// Substitutes `{targetBranch}`, `{sourceBranch}`, `{commitMessages}` and
/// `{defaultPrDescription}`
fn render(template: &str, target_branch: &str, commits: &[Commit], commit_messages: &str) -> String {
    template
        .replace("{defaultPrDescription}", &default_description(target_branch, commits))
        .replace("{targetBranch}", target_branch)
        .replace("{sourceBranch}", source_branch(commits))
        .replace("{commitMessages}", commit_messages)
}

pub fn build_payload(
    template: &PayloadTemplate<'_>,
    target_branch: &str,
    backport_branch: &str,
    commits: &[Commit],
) -> PullRequestPayload {
    let title_messages = commits
        .iter()
        .map(|commit| first_line(&commit.original_message))
        .collect::<Vec<_>>()
        .join(" | ");
    let body_messages = commits.iter().map(commit_entry).collect::<Vec<_>>().join("\n");

    let body = match template.description {
        Some(description) => render(description, target_branch, commits, &body_messages),
        None => default_description(target_branch, commits),
    };

    PullRequestPayload {
        owner: template.owner.to_string(),
        repo: template.repo.to_string(),
        title: render(template.title, target_branch, commits, &title_messages),
        body,
        head: format!("{}:{backport_branch}", template.fork_owner),
        base: target_branch.to_string(),
    }
}
