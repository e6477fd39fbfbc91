use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use warehouse_sync::config::Config;
use warehouse_sync::services::{AwsControlPlane, ReconciliationService};
use warehouse_sync::template::patch_template_file;
use warehouse_sync::{ErrorDetail, ErrorReport, SyncError};

/// Keeps warehouse external functions in sync with a deployed API stack
#[derive(Parser, Debug)]
#[command(name = "warehouse-sync", version)]
struct Cli {
    /// Config file (defaults to warehouse-sync.{toml,yaml,json} in the working directory)
    #[arg(long, value_name = "PATH", global = true, env = "WAREHOUSE_SYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the API integration, trust it on the execution role and register functions
    Deploy,
    /// Drop the stack's external functions and its API integration
    Remove,
    /// Grant the warehouse invoke access in a compiled CloudFormation template
    PatchTemplate {
        #[arg(long, value_name = "PATH")]
        template: PathBuf,
        /// Write the patched template here instead of in place
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Stage to grant access on (defaults to deployment.stage)
        #[arg(long)]
        stage: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            let detail = match e.downcast_ref::<SyncError>() {
                Some(sync_error) => sync_error.to_detail(),
                None => ErrorDetail::new("INTERNAL_ERROR", format!("{:#}", e)),
            };
            // Reporting is best effort on the failure path
            let _ = print_json(&ErrorReport { error: detail });
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Deploy => {
            let config = load_config(cli.config.as_deref())?;
            let provider = Arc::new(AwsControlPlane::from_config(&config.aws).await);
            let service = ReconciliationService::new(config);
            let report = service
                .deploy(provider)
                .await
                .context("Deploy reconciliation failed")?;
            print_json(&report)
        }
        Command::Remove => {
            let config = load_config(cli.config.as_deref())?;
            let provider = Arc::new(AwsControlPlane::from_config(&config.aws).await);
            let service = ReconciliationService::new(config);
            let report = service.remove(provider).await.context("Teardown failed")?;
            print_json(&report)
        }
        Command::PatchTemplate {
            template,
            output,
            stage,
        } => {
            let stage = match stage {
                Some(stage) => {
                    init_logging("info");
                    stage
                }
                None => load_config(cli.config.as_deref())?.deployment.stage,
            };
            let patch = patch_template_file(&template, output.as_deref(), &stage)
                .with_context(|| format!("Failed to patch template {}", template.display()))?;
            print_json(&patch)
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = Config::load(path).context("Failed to load configuration")?;
    init_logging(&config.logging.level);
    info!(stack = %config.stack_name(), "Loaded configuration");
    Ok(config)
}

// Logs go to stderr so stdout carries only the JSON report
fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
