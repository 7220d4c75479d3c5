//! `pr-review` CLI entry-point.
//!
//! Available sub-commands:
//! - `review`: review a GitHub pull request and write an org-mode report.
//! - `plan`:   print the execution levels of the review graph.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use engine::{FailureSummary, StepRecord, WorkflowError, WorkflowOutput};
use review::{report_location, ReviewConfig, ReviewWorkflow};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pr-review",
    about = "Concurrent multi-role review of GitHub pull requests",
    version
)]
struct Cli {
    /// Log at debug level regardless of RUST_LOG.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML config file. Defaults to ./pr-review.toml when present.
    #[arg(long, global = true, env = "PR_REVIEW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Review a pull request.
    Review {
        /// Pull request URL, e.g. https://github.com/owner/repo/pull/42
        url: String,
        /// Directory for the generated report.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Print the outcome as JSON on stdout.
        #[arg(long)]
        json: bool,
    },
    /// Print the validated level partition of the review graph.
    Plan,
}

#[derive(Serialize)]
struct SuccessReport<'a> {
    execution_id: uuid::Uuid,
    location: Option<String>,
    steps: &'a [StepRecord],
}

#[derive(Serialize)]
struct FailureReport<'a> {
    execution_id: Option<uuid::Uuid>,
    level: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    invalid_trigger: Option<String>,
    failures: Vec<FailureSummary>,
    steps: &'a [StepRecord],
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = ReviewConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Plan => {
            let graph = review::plan(&config.workflow_settings())?;
            for (index, level) in graph.levels().iter().enumerate() {
                let ids: Vec<&str> = level.iter().map(String::as_str).collect();
                println!("level {index}: {}", ids.join(", "));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Review {
            url,
            output_dir,
            json,
        } => {
            if let Some(dir) = output_dir {
                config.output.dir = dir;
            }
            let collaborators = config.collaborators().context("configuring collaborators")?;
            let workflow = ReviewWorkflow::new(&collaborators, &config.workflow_settings())?;

            match workflow.review(&url).await {
                Ok(output) => {
                    print_success(&output, json)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    print_failure(&e, json)?;
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

fn print_success(output: &WorkflowOutput, json: bool) -> anyhow::Result<()> {
    let location = report_location(output);
    if json {
        let report = SuccessReport {
            execution_id: output.execution_id,
            location,
            steps: &output.records,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        info!(execution_id = %output.execution_id, "review finished");
        println!("{}", location.as_deref().unwrap_or("(no report location)"));
    }
    Ok(())
}

fn print_failure(error: &WorkflowError, json: bool) -> anyhow::Result<()> {
    let rendered = render_failure(error, json)?;
    if json {
        println!("{rendered}");
    } else {
        eprint!("{rendered}");
    }
    Ok(())
}

/// JSON document, or one `<step_id> [<kind>] <message>` line per failed step.
fn render_failure(error: &WorkflowError, json: bool) -> anyhow::Result<String> {
    if json {
        let report = match error {
            WorkflowError::InvalidTrigger(violation) => FailureReport {
                execution_id: None,
                level: None,
                invalid_trigger: Some(violation.to_string()),
                failures: Vec::new(),
                steps: &[],
            },
            WorkflowError::Failed(failed) => FailureReport {
                execution_id: Some(failed.execution_id),
                level: Some(failed.level),
                invalid_trigger: None,
                failures: failed.failures(),
                steps: &failed.records,
            },
        };
        return Ok(serde_json::to_string_pretty(&report)?);
    }

    let mut out = String::new();
    match error {
        WorkflowError::InvalidTrigger(violation) => {
            writeln!(out, "invalid trigger: {violation}")?;
        }
        WorkflowError::Failed(failed) => {
            writeln!(out, "{failed}")?;
            for f in failed.failures() {
                writeln!(out, "{} [{}] {}", f.step_id, f.kind, f.message)?;
            }
        }
    }
    Ok(out)
}
