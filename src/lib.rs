pub mod cli;
pub mod config;
pub mod core;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, LogLevel};
use crate::core::cache::{CacheConfig, FileStorage, PostCache};
use crate::core::convert::{ConverterConfig, PostConverter};
use crate::core::sanitize::Sanitizer;
use crate::core::storage::repository::PostRepository;
use crate::core::sync::SyncOrchestrator;
use crate::core::wordpress::fetcher::PostFetcher;

/// `RUST_LOG` wins when set; otherwise this crate and the HTTP layer log at
/// `level` and everything else at `warn`.
pub fn init_tracing(level: LogLevel) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("wp_ingest={level},tower_http={level},warn"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|error| anyhow::anyhow!(error))
}

/// Wires cache, fetch client, converter and repository into an orchestrator.
pub async fn build_orchestrator(config: &AppConfig) -> Result<SyncOrchestrator> {
    let cache = match &config.cache_dir {
        Some(dir) => {
            let storage = FileStorage::open(dir)
                .with_context(|| format!("cannot open cache directory {}", dir.display()))?;
            PostCache::new(Arc::new(storage), CacheConfig::default())
        }
        None => PostCache::in_memory(),
    };
    let fetcher = PostFetcher::new(config.fetch_config(), cache.clone())
        .context("cannot build WordPress client")?;
    let converter = PostConverter::new(
        Sanitizer::new(config.sanitizer_rules()),
        ConverterConfig::default(),
    )
    .with_cache(cache);
    let repository = PostRepository::connect(&config.database_url)
        .await
        .with_context(|| format!("cannot open database {}", config.database_url))?;
    let orchestrator =
        SyncOrchestrator::load(fetcher, converter, repository, config.sync_config()).await?;
    Ok(orchestrator)
}
