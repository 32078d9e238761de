//! Layered configuration loading

use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;

use backporter::config::BackportConfig;

// the environment layer is process wide
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn test_project_file_overrides_global_file() {
    let _env = lock_env();
    let dir = TempDir::new().unwrap();
    let global = dir.path().join("config.toml");
    let project = dir.path().join(".backportrc.toml");

    fs::write(
        &global,
        r#"
[github]
token = "global-token"
username = "sqren"

[backport]
max_number = 20
"#,
    )
    .unwrap();
    fs::write(
        &project,
        r#"
[github]
owner = "elastic"
repo = "kibana"

[backport]
source_branch = "master"
target_branches = ["7.x", "6.8"]
max_number = 5

[[backport.branch_label_mapping]]
pattern = "^v(\\d+).(\\d+).\\d+$"
branch = "$1.$2"
"#,
    )
    .unwrap();

    let config = BackportConfig::load_from(&[global, project]).unwrap();

    assert_eq!(config.github.owner, "elastic");
    assert_eq!(config.github.token.as_deref(), Some("global-token"));
    assert_eq!(config.github.username.as_deref(), Some("sqren"));
    assert_eq!(config.backport.source_branch, "master");
    assert_eq!(config.backport.target_branches, vec!["7.x", "6.8"]);
    assert_eq!(config.backport.max_number, 5);
    assert_eq!(config.backport.branch_label_mapping[0].branch, "$1.$2");
    assert!(config.backport.fork);
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_files_are_skipped() {
    let _env = lock_env();
    let dir = TempDir::new().unwrap();
    let config = BackportConfig::load_from(&[dir.path().join("absent.toml")]).unwrap();

    assert_eq!(config.backport.source_branch, "main");
    assert_eq!(config.github.hostname, "github.com");
}

#[test]
fn test_invalid_label_pattern_fails_validation() {
    let _env = lock_env();
    let dir = TempDir::new().unwrap();
    let project = dir.path().join(".backportrc.toml");
    fs::write(
        &project,
        r#"
[github]
owner = "elastic"
repo = "kibana"
token = "token"

[backport]
fork = false

[[backport.branch_label_mapping]]
pattern = "^v(\\d+"
branch = "$1"
"#,
    )
    .unwrap();

    let config = BackportConfig::load_from(&[project]).unwrap();
    let err = config.validate().unwrap_err();

    assert!(err.to_string().contains("Invalid branch label mapping pattern"));
}

#[test]
fn test_environment_lists_are_comma_separated() {
    let _env = lock_env();
    let dir = TempDir::new().unwrap();
    let project = dir.path().join(".backportrc.toml");
    fs::write(
        &project,
        r#"
[backport]
target_branches = ["5.x"]
reviewers = ["sqren"]
"#,
    )
    .unwrap();

    std::env::set_var("BACKPORT_BACKPORT__TARGET_BRANCHES", "7.x,6.x");
    std::env::set_var("BACKPORT_BACKPORT__AUTHOR", "sqren");
    let loaded = BackportConfig::load_from(&[project]);
    std::env::remove_var("BACKPORT_BACKPORT__TARGET_BRANCHES");
    std::env::remove_var("BACKPORT_BACKPORT__AUTHOR");

    let config = loaded.unwrap();
    assert_eq!(config.backport.target_branches, vec!["7.x", "6.x"]);
    assert_eq!(config.backport.reviewers, vec!["sqren"]);
    assert_eq!(config.backport.author.as_deref(), Some("sqren"));
}
