//! Multi-branch runs: failure isolation, target derivation, working copy
//! preparation and the CI status comment

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use backporter::backport::{BackportError, BackportResponse, BranchOutcome, Sequencer};
use backporter::external::GitError;
use backporter::github::types::PullRequestState;
use backporter::github::GitHubError;
use backporter::telemetry::{LogContext, Redactor};
use common::*;

fn log_context() -> LogContext {
    LogContext::new(
        PathBuf::from("/tmp/backport.log"),
        Redactor::new(vec!["secret-token".to_string()]),
    )
}

fn targets(branches: &[&str]) -> Vec<String> {
    branches.iter().map(|b| b.to_string()).collect()
}

#[tokio::test]
async fn test_handled_failure_moves_on_to_the_next_branch() {
    let harness = Harness::new(
        FakeRepository::default().with_failing_branch(
            "6.x",
            GitError::InvalidBranch {
                branch: "6.x".to_string(),
            },
        ),
        FakeCommitSource::returning(vec![]),
        FakePublisher::default(),
        FakePrompt::default(),
    );
    let sequencer = Sequencer::new(harness.collaborators(), Arc::new(config()), log_context());
    let commits = vec![commit("aaaa", "Add sheep emoji (#9)", Some(9))];

    let results = sequencer
        .run(&commits, &targets(&["7.x", "6.x", "5.x"]))
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(results[0].is_success());
    assert_eq!(
        results[1],
        BranchOutcome::Failure {
            target_branch: "6.x".to_string(),
            error_message: "The branch \"6.x\" is invalid or doesn't exist".to_string(),
        }
    );
    assert!(results[2].is_success());
    assert_eq!(results[2].target_branch(), "5.x");
}

#[tokio::test]
async fn test_unhandled_failure_aborts_the_run() {
    let harness = Harness::new(
        FakeRepository::default().with_failing_branch(
            "6.x",
            GitError::CommandFailed {
                command: "fetch elastic 6.x".to_string(),
                status_code: 128,
                stdout: String::new(),
                stderr: "fatal: unable to access".to_string(),
            },
        ),
        FakeCommitSource::returning(vec![]),
        FakePublisher::default(),
        FakePrompt::default(),
    );
    let sequencer = Sequencer::new(harness.collaborators(), Arc::new(config()), log_context());
    let commits = vec![commit("aaaa", "Add sheep emoji (#9)", Some(9))];

    let err = sequencer
        .run(&commits, &targets(&["7.x", "6.x", "5.x"]))
        .await
        .unwrap_err();

    assert!(!err.is_handled());
    assert!(!harness
        .repository
        .calls()
        .iter()
        .any(|call| call.starts_with("create_backport_branch 5.x")));
    assert_eq!(harness.publisher.payloads().len(), 1);
}

#[tokio::test]
async fn test_publisher_failure_is_recorded_per_branch() {
    let harness = Harness::new(
        FakeRepository::default(),
        FakeCommitSource::returning(vec![]),
        FakePublisher::default().failing_for(
            "6.x",
            GitHubError::BranchNotFound {
                branch: "6.x".to_string(),
            },
        ),
        FakePrompt::default(),
    );
    let sequencer = Sequencer::new(harness.collaborators(), Arc::new(config()), log_context());

    let results = sequencer
        .run(&[commit("aaaa", "Add sheep emoji (#9)", Some(9))], &targets(&["6.x", "7.x"]))
        .await
        .unwrap();

    assert!(!results[0].is_success());
    assert!(results[1].is_success());
}

#[tokio::test]
async fn test_full_run_derives_targets_and_prepares_the_working_copy() {
    let mut source = commit("aaaa", "Add sheep emoji (#9)", Some(9));
    source.expected_target_pull_requests = vec![
        expectation("7.x", PullRequestState::Missing),
        expectation("6.x", PullRequestState::Merged),
    ];
    let mut repository = FakeRepository::default();
    repository.exists = false;

    let harness = Harness::new(
        repository,
        FakeCommitSource::returning(vec![source]),
        FakePublisher::default(),
        FakePrompt::default(),
    );
    let mut config = config();
    config.backport.pull_number = Some(9);
    let sequencer = Sequencer::new(harness.collaborators(), Arc::new(config), log_context());

    let response = sequencer.backport().await.unwrap();

    assert!(response.is_success());
    let BackportResponse::Success { results, .. } = &response else {
        panic!("expected a successful response");
    };
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].target_branch(), "7.x");

    let calls = harness.repository.calls();
    assert_eq!(
        &calls[..5],
        &[
            "clone",
            "delete_remote elastic",
            "add_remote elastic",
            "delete_remote sqren",
            "add_remote sqren",
        ]
    );
}

#[tokio::test]
async fn test_empty_commit_list_is_a_handled_error() {
    let harness = Harness::new(
        FakeRepository::default(),
        FakeCommitSource::returning(vec![]),
        FakePublisher::default(),
        FakePrompt::default(),
    );
    let mut config = config();
    config.backport.author = Some("sqren".to_string());
    let sequencer = Sequencer::new(harness.collaborators(), Arc::new(config), log_context());

    let (commits, err) = sequencer.backport().await.unwrap_err();

    assert!(commits.is_empty());
    assert!(err.is_handled());
    assert!(matches!(err, BackportError::GitHub(GitHubError::NoCommitsFound { .. })));
    assert!(harness.repository.calls().is_empty());
}

#[tokio::test]
async fn test_history_mode_backports_the_newest_commit() {
    let harness = Harness::new(
        FakeRepository::default(),
        FakeCommitSource::returning(vec![
            commit("newest", "Newest (#2)", Some(2)),
            commit("older", "Older (#1)", Some(1)),
        ]),
        FakePublisher::default(),
        FakePrompt::default(),
    );
    let sequencer = Sequencer::new(harness.collaborators(), Arc::new(config()), log_context());

    let commits = sequencer.fetch_commits().await.unwrap();

    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].sha, "newest");
}

#[tokio::test]
async fn test_status_comment_is_posted_in_ci_mode() {
    let harness = Harness::new(
        FakeRepository::default(),
        FakeCommitSource::returning(vec![]),
        FakePublisher::default(),
        FakePrompt::default(),
    );
    let mut config = config();
    config.backport.ci = true;
    let sequencer = Sequencer::new(harness.collaborators(), Arc::new(config), log_context());

    let response = BackportResponse::Failure {
        commits: vec![commit("aaaa", "Add sheep emoji (#9)", Some(9))],
        error_message: "There are no branches to backport to".to_string(),
    };
    sequencer.post_status_comment(&response).await;

    assert_eq!(
        harness.publisher.calls(),
        vec!["comment #9 ## 💔 Backport failed\n\nThere are no branches to backport to"]
    );
}

#[tokio::test]
async fn test_no_status_comment_outside_ci_mode() {
    let harness = Harness::new(
        FakeRepository::default(),
        FakeCommitSource::returning(vec![]),
        FakePublisher::default(),
        FakePrompt::default(),
    );
    let sequencer = Sequencer::new(harness.collaborators(), Arc::new(config()), log_context());

    let response = BackportResponse::Success {
        commits: vec![commit("aaaa", "Add sheep emoji (#9)", Some(9))],
        results: vec![],
    };
    sequencer.post_status_comment(&response).await;

    assert!(harness.publisher.calls().is_empty());
}
