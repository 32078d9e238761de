pub mod commits;
pub mod errors;
pub mod pulls;
pub mod types;

pub use commits::{CommitQuery, CommitSource, GraphQlCommitSource};
pub use errors::GitHubError;
pub use pulls::{PullRequestHandler, PullRequestPublisher};
