// Backporter Library - backport orchestration engine
// This exposes the core components for testing and integration

pub mod backport;
pub mod cli;
pub mod config;
pub mod external;
pub mod github;
pub mod telemetry;

// Re-export key types for easy access
pub use backport::{BackportError, BackportResponse, BranchOutcome, CherrypickEngine, Collaborators, Sequencer};
pub use config::BackportConfig;
pub use external::{CommandExecutor, GitClient, GitRepository, ProcessCommandExecutor};
pub use github::{CommitSource, GitHubError, GraphQlCommitSource, PullRequestHandler, PullRequestPublisher};
pub use telemetry::{init_telemetry, LogContext, Redactor, Telemetry, TelemetryConfig};
