//! Runs the ingestion pipeline (fetch, convert, cache, persist) on demand and
//! on a fixed interval, and keeps the status the admin dashboard polls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::core::convert::PostConverter;
use crate::core::storage::models::{
    NewSyncLog, SyncLogEntry, SyncRunStatus, SyncTrigger, UpsertOutcome,
};
use crate::core::storage::repository::{PostRepository, StorageError};
use crate::core::wordpress::fetcher::PostFetcher;
use crate::core::wordpress::RemoteHealth;

pub const SYNC_ENABLED_KEY: &str = "wordpress_sync_enabled";
const MAX_LOG_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub interval: Duration,
    /// Used until the flag has been persisted once.
    pub enabled_by_default: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            enabled_by_default: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("a sync run is already in progress")]
    AlreadyRunning,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncStatus {
    pub enabled: bool,
    pub running: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub next_sync_at: Option<DateTime<Utc>>,
    pub total_posts: i64,
    /// Errors accumulated across runs since the process started.
    pub error_count: i64,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct StatusState {
    enabled: bool,
    last_sync_at: Option<DateTime<Utc>>,
    next_sync_at: Option<DateTime<Utc>>,
    error_count: i64,
    last_error: Option<String>,
    remote: RemoteHealth,
}

#[derive(Debug, Default)]
struct RunCounts {
    created: i64,
    updated: i64,
    skipped: i64,
    stored: i64,
    errors: Vec<String>,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct SyncOrchestrator {
    fetcher: PostFetcher,
    converter: PostConverter,
    repository: PostRepository,
    config: SyncConfig,
    running: AtomicBool,
    state: RwLock<StatusState>,
}

impl SyncOrchestrator {
    /// Restores the persisted enabled flag.
    pub async fn load(
        fetcher: PostFetcher,
        converter: PostConverter,
        repository: PostRepository,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        let enabled = match repository.get_setting(SYNC_ENABLED_KEY).await? {
            Some(raw) => raw == "true",
            None => config.enabled_by_default,
        };
        Ok(Self {
            fetcher,
            converter,
            repository,
            config,
            running: AtomicBool::new(false),
            state: RwLock::new(StatusState {
                enabled,
                ..StatusState::default()
            }),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn repository(&self) -> &PostRepository {
        &self.repository
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.read().await.enabled
    }

    /// Remote API health as seen by the last fetch.
    pub async fn remote_health(&self) -> RemoteHealth {
        self.state.read().await.remote
    }

    /// One full pipeline pass. Overlapping runs are refused rather than queued.
    pub async fn run_once(&self, trigger: SyncTrigger) -> Result<SyncLogEntry, SyncError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SyncError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        let started_at = Utc::now();
        let clock = Instant::now();
        info!(trigger = trigger.as_str(), "sync started");

        let fetched = self.fetcher.fetch_all().await;
        self.state.write().await.remote = RemoteHealth::from_outcome(&fetched);
        let mut counts = RunCounts {
            errors: fetched.errors.clone(),
            ..RunCounts::default()
        };
        if fetched.from_cache {
            counts.errors.push("remote unavailable, used cached posts".to_string());
        }

        for post in self.converter.convert_all(&fetched.posts) {
            if post.is_error_placeholder() {
                counts.skipped += 1;
                let remote_id = post.metadata.get("wordpress_id").cloned().unwrap_or_default();
                let reason = post
                    .metadata
                    .get("error")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("conversion failed");
                counts.errors.push(format!("post {remote_id}: {reason}"));
                continue;
            }
            match self.repository.upsert_post(&post).await {
                Ok(UpsertOutcome::Created) => {
                    counts.created += 1;
                    counts.stored += 1;
                }
                Ok(UpsertOutcome::Updated) => {
                    counts.updated += 1;
                    counts.stored += 1;
                }
                Ok(UpsertOutcome::Unchanged) => counts.stored += 1,
                Ok(UpsertOutcome::SkippedDuplicateSlug) => {
                    debug!(post_id = post.id, slug = %post.slug, "slug already taken, skipping");
                    counts.skipped += 1;
                }
                Err(error) => {
                    warn!(post_id = post.id, %error, "could not persist post");
                    counts.skipped += 1;
                    counts.errors.push(format!("post {}: {error}", post.id));
                }
            }
        }

        let status = if counts.errors.is_empty() {
            SyncRunStatus::Success
        } else if counts.stored > 0 {
            SyncRunStatus::Partial
        } else {
            SyncRunStatus::Failed
        };
        let finished_at = Utc::now();
        let error_count = counts.errors.len() as i64;
        let message = counts.errors.first().cloned();

        {
            let mut state = self.state.write().await;
            state.last_sync_at = Some(finished_at);
            state.error_count += error_count;
            state.last_error = message.clone();
        }

        let entry = self
            .repository
            .insert_sync_log(&NewSyncLog {
                started_at,
                finished_at,
                status,
                trigger,
                posts_fetched: fetched.posts.len() as i64,
                posts_created: counts.created,
                posts_updated: counts.updated,
                posts_skipped: counts.skipped,
                error_count,
                duration_ms: i64::try_from(clock.elapsed().as_millis()).unwrap_or(i64::MAX),
                message,
            })
            .await?;

        info!(
            status = entry.status.as_str(),
            fetched = entry.posts_fetched,
            created = entry.posts_created,
            updated = entry.posts_updated,
            skipped = entry.posts_skipped,
            errors = entry.error_count,
            duration_ms = entry.duration_ms,
            "sync finished"
        );
        Ok(entry)
    }

    pub async fn status(&self) -> Result<SyncStatus, SyncError> {
        let total_posts = self.repository.count_posts().await?;
        let state = self.state.read().await;
        Ok(SyncStatus {
            enabled: state.enabled,
            running: self.is_running(),
            last_sync_at: state.last_sync_at,
            next_sync_at: state.next_sync_at,
            total_posts,
            error_count: state.error_count,
            last_error: state.last_error.clone(),
        })
    }

    /// Most recent runs first; `limit` is clamped to 1..=100.
    pub async fn logs(&self, limit: i64) -> Result<Vec<SyncLogEntry>, SyncError> {
        let logs = self
            .repository
            .list_sync_logs(limit.clamp(1, MAX_LOG_LIMIT))
            .await?;
        Ok(logs)
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<SyncStatus, SyncError> {
        self.repository
            .set_setting(SYNC_ENABLED_KEY, if enabled { "true" } else { "false" })
            .await?;
        {
            let mut state = self.state.write().await;
            state.enabled = enabled;
            state.next_sync_at = if enabled {
                state.next_sync_at.or_else(|| Some(self.next_tick_from(Utc::now())))
            } else {
                None
            };
        }
        info!(enabled, "scheduled sync toggled");
        self.status().await
    }

    pub async fn toggle(&self) -> Result<SyncStatus, SyncError> {
        let enabled = self.is_enabled().await;
        self.set_enabled(!enabled).await
    }

    /// Ticks every `interval`, the first tick immediately. Disabled ticks are
    /// skipped and a tick that lands on a running sync is dropped.
    pub fn spawn_scheduler(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let enabled = {
                    let mut state = self.state.write().await;
                    state.next_sync_at = state
                        .enabled
                        .then(|| self.next_tick_from(Utc::now()));
                    state.enabled
                };
                if !enabled {
                    debug!("scheduled sync disabled, skipping tick");
                    continue;
                }
                match self.run_once(SyncTrigger::Scheduled).await {
                    Ok(_) => {}
                    Err(SyncError::AlreadyRunning) => debug!("previous sync still running"),
                    Err(error) => warn!(%error, "scheduled sync failed"),
                }
            }
        })
    }

    fn next_tick_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.config.interval)
            .ok()
            .and_then(|interval| now.checked_add_signed(interval))
            .unwrap_or(now)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncService;

impl SyncService {
    pub fn name(&self) -> &'static str {
        "sync"
    }

    pub fn status(&self, running: bool, enabled: bool) -> &'static str {
        match (running, enabled) {
            (true, _) => "running",
            (false, true) => "idle",
            (false, false) => "disabled",
        }
    }
}
