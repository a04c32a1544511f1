//! promotion-runner - evaluate the staged delivery-ETA model and smoke-test the endpoint.

mod runner;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use eta_core::{load_config, smoke_test, SAMPLE_ROW};

#[derive(Parser)]
#[command(name = "promotion-runner")]
#[command(about = "Evaluate a staged model against production and promote it when strictly better")]
#[command(version)]
struct Cli {
    /// Configuration file (yaml, toml or json)
    #[arg(short, long, global = true, env = "ETA_CONFIG_FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score Staging vs Production and apply the promotion decision
    Evaluate {
        /// Registered model name (overrides configuration)
        #[arg(long)]
        model_name: Option<String>,

        /// Evaluation CSV path or URL (overrides configuration)
        #[arg(long)]
        dataset: Option<String>,
    },

    /// Send one sample row to the inference endpoint
    SmokeTest {
        /// Endpoint invocation URL (overrides configuration)
        #[arg(long)]
        endpoint_url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut cfg = load_config(cli.config.as_deref())?;
    eta_core::init_tracing("promotion-runner", &cfg.log_level, cfg.json_log)?;

    match cli.command {
        Commands::Evaluate { model_name, dataset } => {
            if let Some(m) = model_name { cfg.model_name = m; }
            if let Some(d) = dataset { cfg.dataset = d; }
            let engine = runner::build_engine(&cfg)?;
            let decision = runner::evaluate_with_retry(&engine, &cfg).await?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Commands::SmokeTest { endpoint_url } => {
            let url = endpoint_url
                .or_else(|| cfg.endpoint_url.clone())
                .context("no endpoint URL given (use --endpoint-url or endpoint_url in configuration)")?;
            let client = reqwest::Client::builder().timeout(cfg.artifact_timeout()).build()?;
            let prediction = smoke_test(&client, &url, &SAMPLE_ROW).await?;
            info!(prediction, "smoke test passed");
            println!("predicted delivery time: {prediction:.2} days");
        }
    }
    Ok(())
}
