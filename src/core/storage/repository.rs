use sha2::{Digest, Sha256};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use super::models::{
    to_db_timestamp, NewSyncLog, PostRecord, SyncLogEntry, SyncLogRecord, UpsertOutcome,
};
use crate::core::convert::types::InternalPost;

const POST_COLUMNS: &str = "id, slug, title, content, excerpt, author_id, reading_time_minutes, theme_category, metadata, content_hash, created_at, imported_at, updated_at";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct PostRepository {
    pool: SqlitePool,
}

impl PostRepository {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Inserts or refreshes a post keyed by id.
    ///
    /// A slug already owned by another id is left alone and reported as a
    /// duplicate; identical content is reported as unchanged without a write.
    pub async fn upsert_post(&self, post: &InternalPost) -> Result<UpsertOutcome, StorageError> {
        let slug_owner: Option<i64> = sqlx::query_scalar("SELECT id FROM posts WHERE slug = ?1")
            .bind(&post.slug)
            .fetch_optional(&self.pool)
            .await?;
        if slug_owner.is_some_and(|owner| owner != post.id) {
            return Ok(UpsertOutcome::SkippedDuplicateSlug);
        }

        let hash = content_hash(post)?;
        let existing_hash: Option<String> =
            sqlx::query_scalar("SELECT content_hash FROM posts WHERE id = ?1")
                .bind(post.id)
                .fetch_optional(&self.pool)
                .await?;
        if existing_hash.as_deref() == Some(hash.as_str()) {
            return Ok(UpsertOutcome::Unchanged);
        }

        let metadata = serde_json::to_string(&post.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO posts (id, slug, title, content, excerpt, author_id, reading_time_minutes, theme_category, metadata, content_hash, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
              slug = excluded.slug,
              title = excluded.title,
              content = excluded.content,
              excerpt = excluded.excerpt,
              author_id = excluded.author_id,
              reading_time_minutes = excluded.reading_time_minutes,
              theme_category = excluded.theme_category,
              metadata = excluded.metadata,
              content_hash = excluded.content_hash,
              created_at = excluded.created_at,
              updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(post.id)
        .bind(&post.slug)
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.excerpt)
        .bind(&post.author_id)
        .bind(i64::from(post.reading_time_minutes))
        .bind(post.theme_category.map(|theme| theme.as_str()))
        .bind(metadata)
        .bind(&hash)
        .bind(to_db_timestamp(&post.created_at))
        .execute(&self.pool)
        .await?;

        Ok(if existing_hash.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        })
    }

    pub async fn get_post_by_id(&self, id: i64) -> Result<Option<InternalPost>, StorageError> {
        let row = sqlx::query_as::<_, PostRecord>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PostRecord::into_post))
    }

    pub async fn get_post_by_slug(&self, slug: &str) -> Result<Option<InternalPost>, StorageError> {
        let row = sqlx::query_as::<_, PostRecord>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE slug = ?1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PostRecord::into_post))
    }

    /// One-based page of posts, newest first.
    pub async fn list_posts(&self, page: u32, per_page: u32) -> Result<Vec<InternalPost>, StorageError> {
        let per_page = i64::from(per_page.max(1));
        let offset = i64::from(page.max(1) - 1) * per_page;
        let rows = sqlx::query_as::<_, PostRecord>(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
        ))
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PostRecord::into_post).collect())
    }

    pub async fn count_posts(&self) -> Result<i64, StorageError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn insert_sync_log(&self, log: &NewSyncLog) -> Result<SyncLogEntry, StorageError> {
        let id = sqlx::query(
            r#"
            INSERT INTO sync_logs (started_at, finished_at, status, trigger_kind, posts_fetched, posts_created, posts_updated, posts_skipped, error_count, duration_ms, message)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(to_db_timestamp(&log.started_at))
        .bind(to_db_timestamp(&log.finished_at))
        .bind(log.status.as_str())
        .bind(log.trigger.as_str())
        .bind(log.posts_fetched)
        .bind(log.posts_created)
        .bind(log.posts_updated)
        .bind(log.posts_skipped)
        .bind(log.error_count)
        .bind(log.duration_ms)
        .bind(&log.message)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(SyncLogEntry {
            id,
            started_at: log.started_at,
            finished_at: log.finished_at,
            status: log.status,
            trigger: log.trigger,
            posts_fetched: log.posts_fetched,
            posts_created: log.posts_created,
            posts_updated: log.posts_updated,
            posts_skipped: log.posts_skipped,
            error_count: log.error_count,
            duration_ms: log.duration_ms,
            message: log.message.clone(),
        })
    }

    /// Most recent runs first.
    pub async fn list_sync_logs(&self, limit: i64) -> Result<Vec<SyncLogEntry>, StorageError> {
        let rows = sqlx::query_as::<_, SyncLogRecord>(
            r#"
            SELECT id, started_at, finished_at, status, trigger_kind, posts_fetched, posts_created, posts_updated, posts_skipped, error_count, duration_ms, message
            FROM sync_logs
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SyncLogEntry::from).collect())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET
              value = excluded.value,
              updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn content_hash(post: &InternalPost) -> Result<String, StorageError> {
    let mut hasher = Sha256::new();
    for part in [
        post.slug.as_str(),
        post.title.as_str(),
        post.content.as_str(),
        post.excerpt.as_str(),
        post.author_id.as_str(),
        post.theme_category.map(|theme| theme.as_str()).unwrap_or_default(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update(b"::");
    }
    hasher.update(to_db_timestamp(&post.created_at).as_bytes());
    hasher.update(b"::");
    hasher.update(serde_json::to_vec(&post.metadata)?);
    let bytes = hasher.finalize();
    Ok(format!("{bytes:x}"))
}
