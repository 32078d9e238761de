use clap::Parser;
use std::path::PathBuf;

use crate::config::BackportConfig;

#[derive(Parser, Debug, Default)]
#[command(name = "backporter")]
#[command(about = "Backport merged commits to release branches")]
#[command(long_about = "Backporter cherry-picks commits onto one or more target branches, \
                       walks you through any conflicts and opens a pull request per branch. \
                       Options given here override .backportrc.toml and ~/.backport/config.toml.")]
pub struct Cli {
    /// Backport the commits of a merged pull request
    #[arg(long = "pr", help = "Pull request number to backport")]
    pub pull_number: Option<u64>,

    /// Backport a single commit
    #[arg(long, help = "Commit sha to backport")]
    pub sha: Option<String>,

    #[arg(long, help = "Only consider commits by this author")]
    pub author: Option<String>,

    #[arg(long = "source-branch", help = "Branch the commits were merged into")]
    pub source_branch: Option<String>,

    #[arg(short = 'b', long = "branch", help = "Target branch (repeatable)")]
    pub target_branches: Vec<String>,

    #[arg(long = "path", help = "Only consider commits touching this path (repeatable)")]
    pub commit_paths: Vec<String>,

    #[arg(long, help = "Run unattended: never prompt, fail on conflicts")]
    pub ci: bool,

    #[arg(long, help = "Push backport branches to the upstream repository")]
    pub no_fork: bool,

    /// Parent number for merge commits; `--mainline` alone means 1
    #[arg(long, num_args = 0..=1, default_missing_value = "1", help = "Parent number when backporting merge commits")]
    pub mainline: Option<u32>,

    #[arg(long, help = "Omit the \"cherry picked from commit\" line")]
    pub no_cherrypick_ref: bool,

    #[arg(long, help = "Make the authenticated user the author of the backport commits")]
    pub reset_author: bool,

    #[arg(long, help = "Skip commit hooks")]
    pub no_verify: bool,

    #[arg(long, help = "Editor opened on the working directory when conflicts occur")]
    pub editor: Option<String>,

    #[arg(long = "auto-fix", help = "Command run to resolve conflicts automatically")]
    pub auto_fix_conflicts_command: Option<String>,

    #[arg(short = 'l', long = "label", help = "Label added to the backport pull request (repeatable)")]
    pub labels: Vec<String>,

    #[arg(long = "source-pr-label", help = "Label added to the source pull request (repeatable)")]
    pub source_pr_labels: Vec<String>,

    #[arg(long = "reviewer", help = "Reviewer requested on the backport pull request (repeatable)")]
    pub reviewers: Vec<String>,

    #[arg(long = "assignee", help = "Assignee of the backport pull request (repeatable)")]
    pub assignees: Vec<String>,

    #[arg(long, help = "Assign the backport pull request to yourself")]
    pub auto_assign: bool,

    #[arg(long, help = "Enable auto-merge on the backport pull request")]
    pub auto_merge: bool,

    #[arg(long, short = 'v', help = "Mirror logs to stderr")]
    pub verbose: bool,

    #[arg(long, help = "Project config file (default: .backportrc.toml)")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Command-line options take precedence over every config layer
    pub fn apply(&self, config: &mut BackportConfig) {
        let options = &mut config.backport;

        // a selector on the command line replaces whichever one the config set
        if let Some(number) = self.pull_number {
            options.pull_number = Some(number);
            options.sha = None;
        }
        if let Some(sha) = &self.sha {
            options.sha = Some(sha.clone());
            options.pull_number = None;
        }
        if let Some(author) = &self.author {
            options.author = Some(author.clone());
        }
        if let Some(source_branch) = &self.source_branch {
            options.source_branch = source_branch.clone();
        }
        if !self.target_branches.is_empty() {
            options.target_branches = self.target_branches.clone();
        }
        if !self.commit_paths.is_empty() {
            options.commit_paths = self.commit_paths.clone();
        }
        if self.mainline.is_some() {
            options.mainline = self.mainline;
        }
        if let Some(editor) = &self.editor {
            options.editor = Some(editor.clone());
        }
        if let Some(command) = &self.auto_fix_conflicts_command {
            options.auto_fix_conflicts_command = Some(command.clone());
        }

        options.ci |= self.ci;
        options.fork &= !self.no_fork;
        options.cherrypick_ref &= !self.no_cherrypick_ref;
        options.reset_author |= self.reset_author;
        options.no_verify |= self.no_verify;
        options.auto_assign |= self.auto_assign;
        options.auto_merge |= self.auto_merge;

        options.target_pr_labels.extend(self.labels.iter().cloned());
        options.source_pr_labels.extend(self.source_pr_labels.iter().cloned());
        options.reviewers.extend(self.reviewers.iter().cloned());
        options.assignees.extend(self.assignees.iter().cloned());

        config.observability.verbose |= self.verbose;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "backporter", "--pr", "9", "-b", "7.x", "-b", "6.x", "--no-fork", "--mainline", "--label", "backport",
        ]);
        let mut config = BackportConfig::default();
        config.backport.target_pr_labels = vec!["auto".to_string()];
        cli.apply(&mut config);

        assert_eq!(config.backport.pull_number, Some(9));
        assert_eq!(config.backport.target_branches, vec!["7.x", "6.x"]);
        assert!(!config.backport.fork);
        assert_eq!(config.backport.mainline, Some(1));
        assert_eq!(config.backport.target_pr_labels, vec!["auto", "backport"]);
        assert!(config.backport.cherrypick_ref);
    }

    #[test]
    fn test_explicit_mainline() {
        let cli = Cli::parse_from(["backporter", "--mainline", "2"]);
        assert_eq!(cli.mainline, Some(2));
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let cli = Cli::parse_from(["backporter"]);
        let mut config = BackportConfig::default();
        config.backport.target_branches = vec!["7.x".to_string()];
        config.backport.ci = true;
        cli.apply(&mut config);

        assert_eq!(config.backport.target_branches, vec!["7.x"]);
        assert!(config.backport.ci);
        assert!(config.backport.fork);
    }

    #[test]
    fn test_pull_number_replaces_configured_sha() {
        let cli = Cli::parse_from(["backporter", "--pr", "9"]);
        let mut config = BackportConfig::default();
        config.backport.sha = Some("abcd".to_string());
        cli.apply(&mut config);

        assert_eq!(config.backport.pull_number, Some(9));
        assert_eq!(config.backport.sha, None);
    }

    #[test]
    fn test_sha_replaces_configured_pull_number() {
        let cli = Cli::parse_from(["backporter", "--sha", "abcd"]);
        let mut config = BackportConfig::default();
        config.backport.pull_number = Some(9);
        cli.apply(&mut config);

        assert_eq!(config.backport.sha.as_deref(), Some("abcd"));
        assert_eq!(config.backport.pull_number, None);
    }
}
