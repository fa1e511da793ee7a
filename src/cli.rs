use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::build_orchestrator;
use crate::config::AppConfig;
use crate::core::storage::models::{SyncRunStatus, SyncTrigger};
use crate::core::AppServices;
use crate::init_tracing;
use crate::server::{AppState, HttpServer};

#[derive(Debug, Parser)]
#[command(name = "wp-ingest")]
#[command(about = "Ingests WordPress posts into a local story database")]
#[command(version)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the scheduler and the HTTP API until Ctrl-C
    Serve {
        /// Listen address, overrides WP_INGEST_LISTEN_ADDR
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Run the pipeline once and print the log entry as JSON
    Sync,
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_level.raised_by(cli.verbose))?;

    match cli.command {
        Commands::Serve { listen } => serve(config, listen).await,
        Commands::Sync => sync_once(config).await,
    }
}

async fn serve(config: AppConfig, listen: Option<String>) -> Result<()> {
    let sync = Arc::new(build_orchestrator(&config).await?);
    let scheduler = Arc::clone(&sync).spawn_scheduler();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                let _ = shutdown_tx.send(());
            }
            Err(error) => warn!(%error, "cannot listen for Ctrl-C"),
        }
    });

    let server = HttpServer::new(
        listen.unwrap_or(config.listen_addr),
        AppState {
            sync,
            services: AppServices::default(),
        },
    );
    let result = server.run(shutdown_rx).await;
    scheduler.abort();
    result
}

async fn sync_once(config: AppConfig) -> Result<()> {
    let sync = build_orchestrator(&config).await?;
    let entry = sync.run_once(SyncTrigger::Cli).await?;
    println!("{}", serde_json::to_string_pretty(&entry)?);
    if entry.status == SyncRunStatus::Failed {
        bail!(
            "sync failed: {}",
            entry.message.as_deref().unwrap_or("no posts were stored")
        );
    }
    Ok(())
}
