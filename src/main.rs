// Tabtrain - tabular model training and Vertex AI job submission
// Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

use tabtrain::config::{load_config, Settings};
use tabtrain::errors::{authentication_failed_error, UserFriendlyError};
use tabtrain::gcp;
use tabtrain::job::run_submit;
use tabtrain::storage::build_client;
use tabtrain::training::run_training;

#[derive(Parser, Debug)]
#[command(name = "tabtrain")]
#[command(about = "Train a tabular classifier from GCS and submit Vertex AI training jobs", version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// TOML config file (default: ./tabtrain.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the dataset, train, evaluate and publish the model
    Train,
    /// Submit the training container as a Vertex AI custom job
    Submit,
    /// Verify that GCP credentials work
    CheckAuth,
    /// List objects in the configured bucket
    List {
        /// Only objects whose name starts with this prefix
        #[arg(long, default_value = "")]
        prefix: String,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.debug);

    if let Err(e) = run(args).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let settings = load_config(args.config.as_deref())?;

    match args.command {
        Command::Train => {
            let outcome = run_training(settings).await?;
            tracing::info!(
                accuracy = outcome.accuracy,
                train = outcome.train_samples,
                test = outcome.test_samples,
                "Training run complete"
            );
            for uri in &outcome.uploaded {
                println!("{}", uri);
            }
        }
        Command::Submit => {
            let job = run_submit(settings).await?;
            println!("{}", job.resource_name);
        }
        Command::CheckAuth => check_auth(&settings).await?,
        Command::List { prefix } => list_objects(&settings, &prefix).await?,
    }

    Ok(())
}

async fn check_auth(settings: &Settings) -> Result<()> {
    let credentials = gcp::configure(&settings.cloud.credentials_path);
    let client = build_client(&settings.cloud, credentials.as_ref())?;

    if !client.check_authentication().await {
        anyhow::bail!(authentication_failed_error(&format!(
            "{} backend rejected the access check",
            client.backend()
        )));
    }

    match client.get_project_id() {
        Some(project) => println!("authenticated (project: {})", project),
        None => println!("authenticated (project unknown)"),
    }
    Ok(())
}

async fn list_objects(settings: &Settings, prefix: &str) -> Result<()> {
    let bucket = settings.cloud.bucket()?;
    let credentials = gcp::configure(&settings.cloud.credentials_path);
    let client = build_client(&settings.cloud, credentials.as_ref())?;

    let names = client
        .try_list(bucket, prefix)
        .await
        .context("Listing failed")
        .user_context_with_suggestion(
            &format!("Could not list gs://{}/{}", bucket, prefix),
            "run `tabtrain check-auth` to verify credentials",
        )?;
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

/// Initialize tracing to stderr
///
/// Default level is INFO; RUST_LOG overrides it unless --debug is given.
fn init_tracing(debug: bool) {
    let env_filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Bridge log crate → tracing (for dependencies using log crate)
    tracing_log::LogTracer::init().ok();
}
