//! Base command execution abstraction
//!
//! Every version-control primitive goes through `CommandExecutor`, which only
//! exposes the `{stdout, stderr, exit code}` triple of a finished process. The
//! gateway never depends on a particular binary beyond its textual interface.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == 0
    }

    /// Both output streams, stdout first. Handy for diagnostics that git
    /// prints on either stream depending on the version.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Command not found: {command}")]
    CommandNotFound { command: String },
    #[error("Working directory does not exist: {directory}")]
    MissingDirectory { directory: String },
    #[error("IO error: {message}")]
    Io { message: String },
}

/// Trait for executing external commands
///
/// This abstraction allows the rest of the codebase to execute commands
/// without directly depending on `tokio::process::Command`, enabling testing
/// with mock implementations.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        dir: &Path,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, CommandError>;
}

/// Real implementation spawning child processes
pub struct ProcessCommandExecutor;

#[async_trait]
impl CommandExecutor for ProcessCommandExecutor {
    async fn execute(
        &self,
        dir: &Path,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, CommandError> {
        if !dir.is_dir() {
            return Err(CommandError::MissingDirectory {
                directory: dir.display().to_string(),
            });
        }

        let output = tokio::process::Command::new(program)
            .args(args)
            .current_dir(dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CommandError::CommandNotFound {
                        command: program.to_string(),
                    }
                } else {
                    CommandError::Io { message: e.to_string() }
                }
            })?;

        Ok(CommandOutput {
            status_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
