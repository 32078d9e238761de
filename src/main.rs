use anyhow::{Context, Result};
use clap::Parser;
use octocrab::Octocrab;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::instrument::WithSubscriber;
use tracing::{error, info};

use backporter::backport::{BackportError, BackportResponse, Collaborators, Sequencer};
use backporter::cli::Cli;
use backporter::config::BackportConfig;
use backporter::external::{
    CommandAutoFixer, CommandExecutor, ConflictAutoFixer, GitClient, ProcessCommandExecutor,
    RepoCoordinates, StdinPrompt,
};
use backporter::github::commits::LabelRule;
use backporter::github::{GraphQlCommitSource, PullRequestHandler};
use backporter::telemetry::{init_telemetry, LogContext, TelemetryConfig};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let telemetry = match init_telemetry(&TelemetryConfig {
        log_dir: config.observability.log_dir.clone(),
        level: config.observability.effective_level().to_string(),
        console: config.backport.ci || config.observability.verbose,
        secrets: config.access_token().map(str::to_string).into_iter().collect(),
    }) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("❌ {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let context = telemetry.context.clone();
    let outcome = tokio::runtime::Runtime::new()
        .context("Could not start the async runtime")
        .and_then(|runtime| {
            runtime.block_on(
                run(Arc::new(config), context.clone()).with_subscriber(telemetry.dispatch.clone()),
            )
        });

    let code = match outcome {
        Ok(response) if response.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            report_unhandled(&format!("{e:#}"), &context);
            ExitCode::FAILURE
        }
    };

    telemetry.shutdown();
    code
}

fn load_config(cli: &Cli) -> Result<BackportConfig> {
    let mut config = BackportConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;
    Ok(config)
}

async fn run(config: Arc<BackportConfig>, context: LogContext) -> Result<BackportResponse> {
    info!(correlation_id = %context.correlation_id, "Backporter started");

    let collaborators = build_collaborators(&config, &context)?;
    let sequencer = Sequencer::new(collaborators, config, context.clone());

    let response = match sequencer.backport().await {
        Ok(response) => response,
        Err((commits, e)) => {
            let error_message = context.redactor.redact(&e.to_string());
            error!(error = %error_message, handled = e.is_handled(), "Backport run failed");
            let response = BackportResponse::Failure {
                commits,
                error_message: error_message.clone(),
            };
            sequencer.post_status_comment(&response).await;
            report_error(&e, &context);
            return Ok(response);
        }
    };

    sequencer.post_status_comment(&response).await;
    info!(success = response.is_success(), "Backporter finished");
    Ok(response)
}

fn build_collaborators(config: &BackportConfig, context: &LogContext) -> Result<Collaborators> {
    let token = config
        .access_token()
        .context("A GitHub access token is required")?
        .to_string();
    let github = &config.github;

    let octocrab = Octocrab::builder()
        .personal_token(token.clone())
        .base_uri(github.api_url.as_str())
        .context("Invalid GitHub API url")?
        .build()
        .context("Could not create the GitHub client")?;

    let executor: Arc<dyn CommandExecutor> = Arc::new(ProcessCommandExecutor);
    let coordinates = RepoCoordinates::new(
        &config.working_copy.root,
        github.owner.clone(),
        github.repo.clone(),
        github.hostname.clone(),
        token,
    );
    let rules = LabelRule::compile(&config.backport.branch_label_mapping)
        .context("Invalid branch label mapping")?;

    let auto_fixer = config
        .backport
        .auto_fix_conflicts_command
        .as_ref()
        .map(|command| Arc::new(CommandAutoFixer::new(executor.clone(), command.clone())) as Arc<dyn ConflictAutoFixer>);

    Ok(Collaborators {
        repository: Arc::new(GitClient::new(executor.clone(), coordinates, context.redactor.clone())),
        commit_source: Arc::new(GraphQlCommitSource::new(
            octocrab.clone(),
            github.owner.clone(),
            github.repo.clone(),
            config.backport.source_branch.clone(),
            rules,
        )),
        publisher: Arc::new(PullRequestHandler::new(octocrab, github.owner.clone(), github.repo.clone())),
        prompt: Arc::new(StdinPrompt),
        executor,
        auto_fixer,
    })
}

fn report_error(e: &BackportError, context: &LogContext) {
    let message = context.redactor.redact(&e.to_string());
    if e.is_handled() {
        println!("{message}");
    } else {
        report_unhandled(&message, context);
    }
}

fn report_unhandled(message: &str, context: &LogContext) {
    eprintln!("💥 An unhandled error occurred 💥");
    eprintln!("{}", context.redactor.redact(message));
    eprintln!();
    eprintln!("For additional details see the logs: {}", context.log_file.display());
}
