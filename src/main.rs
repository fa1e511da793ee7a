use anyhow::Result;
use clap::Parser;
use wp_ingest::cli::{self, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    cli::run(Cli::parse()).await
}
