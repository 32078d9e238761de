//! External tool abstractions
//!
//! Trait-based seams for everything that leaves the process: child processes,
//! git, the operator's terminal and the conflict auto-fix hook. The backport
//! engine only ever talks to these traits.

pub mod autofix;
pub mod command;
pub mod git;
pub mod prompt;

pub use autofix::{CommandAutoFixer, ConflictAutoFixer};
pub use command::{CommandError, CommandExecutor, CommandOutput, ProcessCommandExecutor};
pub use git::{CherrypickOptions, CherrypickResult, ConflictFile, GitClient, GitError, GitRepository, RepoCoordinates};
pub use prompt::{ConfirmationPrompt, StdinPrompt};
