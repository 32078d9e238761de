//! Automatic conflict resolution hook

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::command::{CommandError, CommandExecutor};

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ConflictAutoFixer: Send + Sync {
    /// Whether every conflict in `files` was resolved
    async fn fix(
        &self,
        files: &[String],
        directory: &Path,
        target_branch: &str,
    ) -> Result<bool, CommandError>;
}

/// Runs a configured command as `<command> <target branch> <files...>` in the
/// working directory; exit code 0 means resolved
pub struct CommandAutoFixer {
    executor: Arc<dyn CommandExecutor>,
    command: String,
}

impl CommandAutoFixer {
    pub fn new(executor: Arc<dyn CommandExecutor>, command: impl Into<String>) -> Self {
        Self {
            executor,
            command: command.into(),
        }
    }
}

#[async_trait]
impl ConflictAutoFixer for CommandAutoFixer {
    async fn fix(
        &self,
        files: &[String],
        directory: &Path,
        target_branch: &str,
    ) -> Result<bool, CommandError> {
        let mut parts = self.command.split_whitespace();
        let Some(program) = parts.next() else {
            return Ok(false);
        };

        let mut args: Vec<&str> = parts.collect();
        args.push(target_branch);
        args.extend(files.iter().map(String::as_str));

        let output = self.executor.execute(directory, program, &args).await?;
        if output.success() {
            info!(program, files = files.len(), "Conflicts resolved automatically");
            Ok(true)
        } else {
            warn!(
                program,
                status_code = output.status_code,
                stderr = %output.stderr.trim(),
                "Automatic conflict resolution failed"
            );
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::command::tests::{failed, ok, MockCommandExecutor};

    #[tokio::test]
    async fn test_command_receives_branch_and_files() {
        let executor = Arc::new(MockCommandExecutor::new().expect_command(
            "fix-conflicts",
            &["--strategy", "ours", "7.x", "a.txt", "b.txt"],
            ok(""),
        ));
        let fixer = CommandAutoFixer::new(executor.clone(), "fix-conflicts --strategy ours");

        let resolved = fixer
            .fix(
                &["a.txt".to_string(), "b.txt".to_string()],
                Path::new("/repo"),
                "7.x",
            )
            .await
            .unwrap();

        assert!(resolved);
        assert_eq!(
            executor.calls(),
            vec!["fix-conflicts --strategy ours 7.x a.txt b.txt"]
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_unresolved() {
        let executor = Arc::new(MockCommandExecutor::new().expect_command(
            "fix-conflicts",
            &["7.x", "a.txt"],
            failed(1, "", "could not resolve"),
        ));
        let fixer = CommandAutoFixer::new(executor, "fix-conflicts");

        let resolved = fixer
            .fix(&["a.txt".to_string()], Path::new("/repo"), "7.x")
            .await
            .unwrap();
        assert!(!resolved);
    }

    #[tokio::test]
    async fn test_empty_command_is_unresolved() {
        let fixer = CommandAutoFixer::new(Arc::new(MockCommandExecutor::new()), "  ");
        assert!(!fixer.fix(&[], Path::new("/repo"), "7.x").await.unwrap());
    }
}
