use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::core::analysis::ThemeCategory;
use crate::core::convert::types::InternalPost;
use crate::core::wordpress::parse_wp_date;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PostRecord {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub author_id: String,
    pub reading_time_minutes: i64,
    pub theme_category: Option<String>,
    pub metadata: String,
    pub content_hash: String,
    pub created_at: String,
    pub imported_at: String,
    pub updated_at: String,
}

impl PostRecord {
    pub fn into_post(self) -> InternalPost {
        let created_at = parse_wp_date(&self.created_at).unwrap_or_default();
        let metadata = serde_json::from_str(&self.metadata).unwrap_or_default();
        InternalPost {
            id: self.id,
            title: self.title,
            content: self.content,
            excerpt: self.excerpt,
            slug: self.slug,
            created_at,
            author_id: self.author_id,
            reading_time_minutes: u32::try_from(self.reading_time_minutes).unwrap_or_default(),
            theme_category: self.theme_category.as_deref().and_then(ThemeCategory::parse),
            metadata,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
    SkippedDuplicateSlug,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Success,
    Partial,
    Failed,
}

impl SyncRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "success" => Self::Success,
            "partial" => Self::Partial,
            _ => Self::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Manual,
    Scheduled,
    Cli,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
            Self::Cli => "cli",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "scheduled" => Self::Scheduled,
            "cli" => Self::Cli,
            _ => Self::Manual,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewSyncLog {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: SyncRunStatus,
    pub trigger: SyncTrigger,
    pub posts_fetched: i64,
    pub posts_created: i64,
    pub posts_updated: i64,
    pub posts_skipped: i64,
    pub error_count: i64,
    pub duration_ms: i64,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncLogEntry {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: SyncRunStatus,
    pub trigger: SyncTrigger,
    pub posts_fetched: i64,
    pub posts_created: i64,
    pub posts_updated: i64,
    pub posts_skipped: i64,
    pub error_count: i64,
    pub duration_ms: i64,
    pub message: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SyncLogRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: String,
    pub status: String,
    pub trigger_kind: String,
    pub posts_fetched: i64,
    pub posts_created: i64,
    pub posts_updated: i64,
    pub posts_skipped: i64,
    pub error_count: i64,
    pub duration_ms: i64,
    pub message: Option<String>,
}

impl From<SyncLogRecord> for SyncLogEntry {
    fn from(record: SyncLogRecord) -> Self {
        Self {
            id: record.id,
            started_at: parse_wp_date(&record.started_at).unwrap_or_default(),
            finished_at: parse_wp_date(&record.finished_at).unwrap_or_default(),
            status: SyncRunStatus::parse(&record.status),
            trigger: SyncTrigger::parse(&record.trigger_kind),
            posts_fetched: record.posts_fetched,
            posts_created: record.posts_created,
            posts_updated: record.posts_updated,
            posts_skipped: record.posts_skipped,
            error_count: record.error_count,
            duration_ms: record.duration_ms,
            message: record.message,
        }
    }
}

/// Fixed-width UTC timestamp, so text ordering in SQLite is chronological.
pub fn to_db_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
