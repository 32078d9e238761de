use anyhow::{bail, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const PROJECT_CONFIG_FILE: &str = ".backportrc.toml";
pub const DEFAULT_PR_TITLE: &str = "[{targetBranch}] {commitMessages}";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BackportConfig {
    pub github: GitHubConfig,
    pub backport: BackportOptions,
    pub working_copy: WorkingCopyConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token (can be set via env var)
    pub token: Option<String>,
    /// Upstream repository owner
    pub owner: String,
    /// Upstream repository name
    pub repo: String,
    /// Authenticated user; owner of the fork in fork mode
    pub username: Option<String>,
    pub hostname: String,
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            owner: String::new(),
            repo: String::new(),
            username: None,
            hostname: "github.com".to_string(),
            api_url: "https://api.github.com".to_string(),
        }
    }
}

/// One `branch_label_mapping` rule: a label matching `pattern` expects a
/// backport to `branch`, which may reference capture groups (`$1`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BranchLabelRule {
    pub pattern: String,
    pub branch: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackportOptions {
    pub source_branch: String,
    /// Explicit targets; derived from commit expectations when empty
    pub target_branches: Vec<String>,
    /// Ordered, first match wins
    pub branch_label_mapping: Vec<BranchLabelRule>,
    pub author: Option<String>,
    pub pull_number: Option<u64>,
    pub sha: Option<String>,
    pub commit_paths: Vec<String>,
    /// Upper bound for commit history queries
    pub max_number: u32,
    /// Parent number for merge commits
    pub mainline: Option<u32>,
    /// Add "(cherry picked from commit ...)" to picked commits
    pub cherrypick_ref: bool,
    /// Unattended mode
    pub ci: bool,
    /// Push to the authenticated user's fork instead of upstream
    pub fork: bool,
    /// Opened on the working directory before resolving conflicts by hand
    pub editor: Option<String>,
    pub auto_fix_conflicts_command: Option<String>,
    pub reset_author: bool,
    pub no_verify: bool,
    pub assignees: Vec<String>,
    pub auto_assign: bool,
    pub reviewers: Vec<String>,
    pub target_pr_labels: Vec<String>,
    pub source_pr_labels: Vec<String>,
    pub auto_merge: bool,
    /// MERGE, SQUASH or REBASE
    pub auto_merge_method: String,
    pub pr_title: String,
    pub pr_description: Option<String>,
}

impl Default for BackportOptions {
    fn default() -> Self {
        Self {
            source_branch: "main".to_string(),
            target_branches: Vec::new(),
            branch_label_mapping: Vec::new(),
            author: None,
            pull_number: None,
            sha: None,
            commit_paths: Vec::new(),
            max_number: 10,
            mainline: None,
            cherrypick_ref: true,
            ci: false,
            fork: true,
            editor: None,
            auto_fix_conflicts_command: None,
            reset_author: false,
            no_verify: false,
            assignees: Vec::new(),
            auto_assign: false,
            reviewers: Vec::new(),
            target_pr_labels: Vec::new(),
            source_pr_labels: Vec::new(),
            auto_merge: false,
            auto_merge_method: "MERGE".to_string(),
            pr_title: DEFAULT_PR_TITLE.to_string(),
            pr_description: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkingCopyConfig {
    /// Clones live at `<root>/<owner>/<repo>`
    pub root: PathBuf,
}

impl Default for WorkingCopyConfig {
    fn default() -> Self {
        Self {
            root: backport_home().join("repositories"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_dir: PathBuf,
    pub log_level: String,
    /// Log at debug level
    pub verbose: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_dir: backport_home(),
            log_level: "info".to_string(),
            verbose: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn effective_level(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.log_level
        }
    }
}

/// `~/.backport`
pub fn backport_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".backport")
}

/// Options read from the environment as comma separated lists
const LIST_KEYS: [&str; 6] = [
    "backport.target_branches",
    "backport.commit_paths",
    "backport.assignees",
    "backport.reviewers",
    "backport.target_pr_labels",
    "backport.source_pr_labels",
];

impl BackportConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. `~/.backport/config.toml`
    /// 3. `.backportrc.toml`, or the file given explicitly
    /// 4. Environment variables (`BACKPORT_GITHUB__TOKEN`, ...)
    pub fn load(explicit_file: Option<&Path>) -> Result<Self> {
        Self::load_env_file()?;

        let project_file = explicit_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
        if let Some(explicit) = explicit_file {
            if !explicit.exists() {
                bail!("Config file {} does not exist", explicit.display());
            }
        }

        Self::load_from(&[backport_home().join("config.toml"), project_file])
    }

    /// Layer the given files (missing ones are skipped) under the environment
    pub fn load_from(files: &[PathBuf]) -> Result<Self> {
        let mut builder = Config::builder();

        for file in files.iter().filter(|file| file.exists()) {
            tracing::debug!(path = %file.display(), "Reading config file");
            builder = builder.add_source(File::from(file.as_path()));
        }

        let environment = LIST_KEYS.iter().fold(
            Environment::with_prefix("BACKPORT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
            |environment, key| environment.with_list_parse_key(key),
        );
        builder = builder.add_source(environment);

        let mut config: BackportConfig = builder.build()?.try_deserialize()?;

        if config.github.token.is_none() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                config.github.token = Some(token);
            }
        }

        Ok(config)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.github.owner.is_empty() || self.github.repo.is_empty() {
            bail!("Repository owner and name are required. Set `github.owner` and `github.repo` in {PROJECT_CONFIG_FILE}");
        }
        if self.access_token().is_none() {
            bail!("A GitHub access token is required. Set GITHUB_TOKEN or `github.token` in ~/.backport/config.toml");
        }

        let options = &self.backport;
        if self.github.username.is_none() {
            if options.fork {
                bail!("`github.username` is required in fork mode. Set it or disable fork mode with \"--no-fork\"");
            }
            if options.reset_author {
                bail!("`github.username` is required to reset the commit author");
            }
            if options.auto_assign {
                bail!("`github.username` is required to auto-assign pull requests");
            }
        }

        for rule in &options.branch_label_mapping {
            if let Err(e) = regex::Regex::new(&rule.pattern) {
                bail!("Invalid branch label mapping pattern \"{}\": {e}", rule.pattern);
            }
        }

        Ok(())
    }

    pub fn access_token(&self) -> Option<&str> {
        self.github.token.as_deref().filter(|token| !token.is_empty())
    }

    /// Owner of the repository the backport branches are pushed to
    pub fn fork_owner(&self) -> &str {
        match (&self.github.username, self.backport.fork) {
            (Some(username), true) => username,
            _ => &self.github.owner,
        }
    }
}
