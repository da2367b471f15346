//! Binary entry point for doctrine.
//!
//! `doctrine serve` runs the MCP server on stdio; `doctrine status`
//! prints store statistics.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

use clap::{Parser, Subcommand};
use doctrine::config::DoctrineConfig;
use doctrine::mcp::McpServer;
use doctrine::observability::{LogFormat, init_logging};
use doctrine::services::ServiceContainer;
use doctrine::storage::DocumentStore;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "doctrine", version, about = "Document knowledge consolidation service")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the MCP tool server on stdio (the default).
    Serve,
    /// Print store statistics as JSON.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before anything reads the environment.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging(cli.verbose, format);

    let config = DoctrineConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Status => status(&config),
    }
}

async fn serve(config: DoctrineConfig) -> anyhow::Result<()> {
    let services = Arc::new(ServiceContainer::open(config)?);
    services.probe_endpoints();
    McpServer::new(services).run().await?;
    Ok(())
}

fn status(config: &DoctrineConfig) -> anyhow::Result<()> {
    let store = DocumentStore::open(&config.storage.db_path)?;
    let status = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "db_path": config.storage.db_path.display().to_string(),
        "documents": store.count_documents(true)?,
        "active_documents": store.count_active_documents()?,
        "sections": store.count_sections()?,
        "claims": store.count_claims()?,
        "vectors": store.count_vectors()?,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
