use octocrab::Error as OctocrabError;

#[derive(Debug)]
pub enum GitHubError {
    ApiError(OctocrabError),
    /// The queried source branch has no ref on the remote
    BranchNotFound {
        branch: String,
    },
    /// `--author` names a login GitHub does not know
    AuthorNotFound {
        author: String,
    },
    NoCommitsFound {
        author: Option<String>,
        paths: Vec<String>,
    },
    PullRequestNotMerged {
        number: u64,
    },
    CommitNotFound {
        sha: String,
    },
    /// Errors reported in the body of a GraphQL response
    GraphQl(String),
    UnexpectedResponse(String),
}

impl GitHubError {
    /// Handled errors are shown without the unhandled-error banner
    pub fn is_handled(&self) -> bool {
        matches!(
            self,
            GitHubError::BranchNotFound { .. }
                | GitHubError::AuthorNotFound { .. }
                | GitHubError::NoCommitsFound { .. }
                | GitHubError::PullRequestNotMerged { .. }
                | GitHubError::CommitNotFound { .. }
        )
    }

}

impl From<OctocrabError> for GitHubError {
    fn from(err: OctocrabError) -> Self {
        GitHubError::ApiError(err)
    }
}

impl std::fmt::Display for GitHubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitHubError::ApiError(octocrab_err) => {
                writeln!(f, "GitHub API Error")?;
                writeln!(f, "────────────────")?;

                match octocrab_err {
                    OctocrabError::GitHub { source, .. } => {
                        writeln!(f, "🌐 HTTP {}: {}", source.status_code, source.message)?;
                        writeln!(f)?;

                        match source.status_code.as_u16() {
                            401 => {
                                writeln!(f, "🔧 AUTHENTICATION FAILED:")?;
                                writeln!(f, "   → Token is invalid or expired")?;
                                write!(f, "   → Create a new one at https://github.com/settings/tokens")
                            }
                            403 => {
                                writeln!(f, "🔧 PERMISSION DENIED:")?;
                                writeln!(f, "   → Token lacks required permissions")?;
                                write!(f, "   → Needs 'repo' scope for private repositories")
                            }
                            404 => {
                                writeln!(f, "🔧 RESOURCE NOT FOUND:")?;
                                writeln!(f, "   → Repository may not exist or be private")?;
                                write!(f, "   → Check `github.owner` and `github.repo` settings")
                            }
                            422 => {
                                writeln!(f, "🔧 VALIDATION ERROR:")?;
                                writeln!(f, "   → Request data is invalid")?;
                                write!(f, "   → Check branch names, labels and reviewers")
                            }
                            _ => {
                                writeln!(f, "🔧 TROUBLESHOOTING:")?;
                                writeln!(f, "   → Verify GitHub API status: https://status.github.com")?;
                                write!(f, "   → Run again with --verbose and check the log file")
                            }
                        }
                    }
                    other => write!(f, "🌐 {other}"),
                }
            }
            GitHubError::BranchNotFound { branch } => write!(
                f,
                "The upstream branch \"{branch}\" does not exist. Try specifying a different branch with \"--source-branch <your-branch>\""
            ),
            GitHubError::AuthorNotFound { author } => write!(
                f,
                "The author \"{author}\" does not exist on GitHub. Check the spelling of `--author`"
            ),
            GitHubError::NoCommitsFound { author, paths } => {
                let path_text = if paths.is_empty() {
                    String::new()
                } else {
                    format!(" touching files in path: \"{}\"", paths.join(","))
                };
                match author {
                    Some(author) => write!(
                        f,
                        "There are no commits by \"{author}\" in this repository{path_text}. Try with `--author=<username>` for commits from a specific user"
                    ),
                    None => write!(f, "There are no commits in this repository{path_text}"),
                }
            }
            GitHubError::PullRequestNotMerged { number } => {
                write!(f, "The PR #{number} is not merged")
            }
            GitHubError::CommitNotFound { sha } => {
                write!(f, "No commit found with sha \"{sha}\"")
            }
            GitHubError::GraphQl(message) => {
                writeln!(f, "GitHub GraphQL Error")?;
                writeln!(f, "────────────────────")?;
                write!(f, "🌐 {message}")
            }
            GitHubError::UnexpectedResponse(message) => {
                write!(f, "Unexpected response from GitHub: {message}")
            }
        }
    }
}

impl std::error::Error for GitHubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GitHubError::ApiError(err) => Some(err),
            _ => None,
        }
    }
}
