//! vmverify CLI: run one verification from a trigger payload
//!
//! Stands in for the external orchestrator in local runs: reads the trigger
//! payload, drives the stage plan, and prints the final envelope JSON.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use vmverify::bootstrap::build_deps;
use vmverify::types::TriggerPayload;
use vmverify::utils::logging::init_tracing;
use vmverify::{Config, CorrelationId, Orchestrator};

#[derive(Debug, Parser)]
#[command(name = "vmverify", about = "Run a vending machine verification", version)]
struct Cli {
    /// Path to the trigger payload JSON, or '-' for stdin
    #[arg(long, value_name = "FILE", default_value = "-")]
    payload: String,

    /// Pretty-print the final envelope
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("configuration")?;
    init_tracing(config.log_level.as_deref()).ok();

    let raw = if cli.payload == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("reading trigger payload from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(&cli.payload)
            .with_context(|| format!("reading trigger payload from {}", cli.payload))?
    };
    let payload: TriggerPayload =
        serde_json::from_str(&raw).context("parsing trigger payload")?;

    let correlation_id = payload
        .request_id
        .as_deref()
        .map(CorrelationId::from_request)
        .unwrap_or_else(CorrelationId::generate);

    let deps = build_deps(config, correlation_id).await?;
    let orchestrator = Orchestrator::new(deps);
    let outcome = orchestrator.run(&payload).await?;

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&outcome.envelope)?
    } else {
        serde_json::to_string(&outcome.envelope)?
    };
    println!("{rendered}");

    if let Some(error) = outcome.error {
        eprintln!("{error}");
        std::process::exit(1);
    }
    Ok(())
}
