//! Local post cache: the fallback the fetch client reads from when the remote
//! API is unreachable.

pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::core::convert::types::InternalPost;
use crate::core::wordpress::parse_wp_date;
use crate::core::wordpress::types::RemotePost;

pub use store::{FileStorage, MemoryStorage, StoragePort};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid cache key: {0}")]
    InvalidKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub posts_key: String,
    pub last_updated_key: String,
    pub converted_key: String,
    /// Age after which the cache is reported stale. Advisory only.
    pub expiry: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            posts_key: "wp_posts_cache".to_string(),
            last_updated_key: "wp_posts_last_updated".to_string(),
            converted_key: "wp_converted_posts".to_string(),
            expiry: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// What the cache needs to know about a post to merge and order it.
pub trait CachedPost: Clone + Serialize + DeserializeOwned {
    fn cache_id(&self) -> i64;
    fn created_at(&self) -> Option<DateTime<Utc>>;
    fn modified_at(&self) -> Option<DateTime<Utc>>;
}

impl CachedPost for RemotePost {
    fn cache_id(&self) -> i64 {
        self.id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.date_gmt
            .as_deref()
            .and_then(parse_wp_date)
            .or_else(|| parse_wp_date(&self.date))
    }

    fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified.as_deref().and_then(parse_wp_date)
    }
}

impl CachedPost for InternalPost {
    fn cache_id(&self) -> i64 {
        self.id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }

    fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .get("modified")
            .and_then(|value| value.as_str())
            .and_then(parse_wp_date)
    }
}

#[derive(Clone)]
pub struct PostCache {
    storage: Arc<dyn StoragePort>,
    config: CacheConfig,
}

impl std::fmt::Debug for PostCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PostCache {
    pub fn new(storage: Arc<dyn StoragePort>, config: CacheConfig) -> Self {
        Self { storage, config }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Merges `posts` into the cached raw posts and stamps the update time.
    /// Returns the size of the merged set.
    pub fn save(&self, posts: &[RemotePost]) -> Result<usize, CacheError> {
        let existing: Vec<RemotePost> = self.load_for_merge(&self.config.posts_key)?;
        let merged = merge_posts(existing, posts);
        self.store(&self.config.posts_key, &merged)?;
        self.storage
            .set(&self.config.last_updated_key, &Utc::now().to_rfc3339())?;
        Ok(merged.len())
    }

    pub fn get_all(&self) -> Result<Vec<RemotePost>, CacheError> {
        self.load(&self.config.posts_key)
    }

    /// One-based page slice of the cached raw posts.
    pub fn get_page(&self, page: u32, per_page: u32) -> Result<Vec<RemotePost>, CacheError> {
        let all = self.get_all()?;
        Ok(page_slice(all, page, per_page))
    }

    pub fn save_converted(&self, post: &InternalPost) -> Result<(), CacheError> {
        self.save_converted_batch(std::slice::from_ref(post))
    }

    /// One read-merge-write of the converted list for a whole batch.
    pub fn save_converted_batch(&self, posts: &[InternalPost]) -> Result<(), CacheError> {
        if posts.is_empty() {
            return Ok(());
        }
        let existing: Vec<InternalPost> = self.load_for_merge(&self.config.converted_key)?;
        let merged = merge_posts(existing, posts);
        self.store(&self.config.converted_key, &merged)
    }

    pub fn get_converted(&self) -> Result<Vec<InternalPost>, CacheError> {
        self.load(&self.config.converted_key)
    }

    pub fn last_updated(&self) -> Result<Option<DateTime<Utc>>, CacheError> {
        let raw = self.storage.get(&self.config.last_updated_key)?;
        Ok(raw.as_deref().and_then(parse_wp_date))
    }

    /// A cache that was never written counts as stale.
    pub fn is_stale(&self, now: DateTime<Utc>) -> Result<bool, CacheError> {
        let Some(last_updated) = self.last_updated()? else {
            return Ok(true);
        };
        let age = now.signed_duration_since(last_updated);
        Ok(age.to_std().map(|age| age > self.config.expiry).unwrap_or(false))
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        self.storage.remove(&self.config.posts_key)?;
        self.storage.remove(&self.config.last_updated_key)?;
        self.storage.remove(&self.config.converted_key)?;
        Ok(())
    }

    fn load<T: CachedPost>(&self, key: &str) -> Result<Vec<T>, CacheError> {
        match self.storage.get(key)? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(Vec::new()),
        }
    }

    /// Like `load`, but an undecodable value is discarded so the next write replaces it.
    fn load_for_merge<T: CachedPost>(&self, key: &str) -> Result<Vec<T>, CacheError> {
        match self.load(key) {
            Err(CacheError::Serialization(error)) => {
                warn!(key, %error, "discarding undecodable cache value");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    fn store<T: CachedPost>(&self, key: &str, posts: &[T]) -> Result<(), CacheError> {
        let serialized = serde_json::to_string(posts)?;
        self.storage.set(key, &serialized)
    }
}

/// Overwrite-by-id merge, newest first.
///
/// An incoming post only loses to the cached one when both carry a modification
/// time and the incoming one is older.
pub fn merge_posts<T: CachedPost>(existing: Vec<T>, incoming: &[T]) -> Vec<T> {
    let mut by_id: HashMap<i64, T> = existing
        .into_iter()
        .map(|post| (post.cache_id(), post))
        .collect();
    for post in incoming {
        let keep_cached = by_id.get(&post.cache_id()).is_some_and(|cached| {
            matches!(
                (cached.modified_at(), post.modified_at()),
                (Some(cached), Some(incoming)) if incoming < cached
            )
        });
        if !keep_cached {
            by_id.insert(post.cache_id(), post.clone());
        }
    }

    let mut merged: Vec<T> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.cache_id().cmp(&a.cache_id()))
    });
    merged
}

fn page_slice<T>(items: Vec<T>, page: u32, per_page: u32) -> Vec<T> {
    let page = page.max(1) as usize;
    let per_page = per_page.max(1) as usize;
    items
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wordpress::types::Rendered;
    use chrono::TimeZone;

    fn remote(id: i64, title: &str, date: &str) -> RemotePost {
        RemotePost {
            id,
            date: date.to_string(),
            slug: format!("post-{id}"),
            title: Rendered::new(title),
            content: Rendered::new("<p>body</p>"),
            ..RemotePost::default()
        }
    }

    #[test]
    fn save_merges_by_id_with_last_write_winning() {
        let cache = PostCache::in_memory();
        cache
            .save(&[remote(1, "A", "2024-01-01T00:00:00")])
            .expect("first save");
        let size = cache
            .save(&[
                remote(1, "B", "2024-01-01T00:00:00"),
                remote(2, "C", "2024-02-01T00:00:00"),
            ])
            .expect("second save");

        let all = cache.get_all().expect("read back");
        assert_eq!(size, 2);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, 2);
        assert_eq!(all[1].id, 1);
        assert_eq!(all[1].title.rendered, "B");
    }

    #[test]
    fn older_modification_does_not_regress_cached_post() {
        let cache = PostCache::in_memory();
        let mut fresh = remote(1, "Fresh", "2024-01-01T00:00:00");
        fresh.modified = Some("2024-03-01T00:00:00".to_string());
        let mut stale = remote(1, "Stale", "2024-01-01T00:00:00");
        stale.modified = Some("2024-02-01T00:00:00".to_string());

        cache.save(&[fresh]).expect("save fresh");
        cache.save(&[stale]).expect("save stale");

        let all = cache.get_all().expect("read back");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title.rendered, "Fresh");
    }

    #[test]
    fn get_page_slices_sorted_posts() {
        let cache = PostCache::in_memory();
        let posts: Vec<RemotePost> = (1..=5)
            .map(|day| remote(day, "t", &format!("2024-01-0{day}T00:00:00")))
            .collect();
        cache.save(&posts).expect("save");

        let first = cache.get_page(1, 2).expect("page 1");
        let third = cache.get_page(3, 2).expect("page 3");
        let beyond = cache.get_page(4, 2).expect("page 4");
        assert_eq!(first.iter().map(|p| p.id).collect::<Vec<_>>(), vec![5, 4]);
        assert_eq!(third.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1]);
        assert!(beyond.is_empty());
    }

    #[test]
    fn staleness_is_advisory_and_tracks_last_update() {
        let cache = PostCache::in_memory();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(cache.is_stale(now).expect("empty cache is stale"));

        cache.save(&[remote(1, "A", "2024-01-01T00:00:00")]).expect("save");
        let written = cache.last_updated().expect("read").expect("timestamp set");
        assert!(!cache.is_stale(written).expect("fresh"));
        assert!(cache
            .is_stale(written + chrono::Duration::hours(25))
            .expect("stale after expiry"));
        assert_eq!(cache.get_all().expect("still readable").len(), 1);
    }

    #[test]
    fn converted_posts_use_their_own_key() {
        let cache = PostCache::in_memory();
        let post = InternalPost {
            id: 9,
            title: "T".to_string(),
            content: "<p>c</p>".to_string(),
            excerpt: "c".to_string(),
            slug: "t".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            author_id: "wordpress".to_string(),
            reading_time_minutes: 1,
            theme_category: None,
            metadata: serde_json::Map::new(),
        };
        cache.save_converted(&post).expect("save converted");
        cache.save_converted(&post).expect("save converted again");

        assert_eq!(cache.get_converted().expect("read").len(), 1);
        assert!(cache.get_all().expect("raw cache").is_empty());

        cache.clear().expect("clear");
        assert!(cache.get_converted().expect("read").is_empty());
    }

    fn internal(id: i64, day: u32) -> InternalPost {
        InternalPost {
            id,
            title: format!("T{id}"),
            content: "<p>c</p>".to_string(),
            excerpt: "c".to_string(),
            slug: format!("t-{id}"),
            created_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            author_id: "wordpress".to_string(),
            reading_time_minutes: 1,
            theme_category: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn corrupt_cache_surfaces_an_error() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("wp_posts_cache", "{not json").expect("seed");
        storage.set("wp_converted_posts", "[{\"id\":").expect("seed");
        let cache = PostCache::new(storage, CacheConfig::default());
        assert!(matches!(cache.get_all(), Err(CacheError::Serialization(_))));

        let size = cache
            .save(&[remote(3, "Recovered", "2024-01-03T00:00:00")])
            .expect("save replaces the bad value");
        assert_eq!(size, 1);
        let all = cache.get_all().expect("readable again");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title.rendered, "Recovered");

        cache
            .save_converted(&internal(3, 3))
            .expect("converted save replaces the bad value");
        assert_eq!(cache.get_converted().expect("readable again").len(), 1);
    }

    #[test]
    fn converted_batch_merges_in_one_write() {
        let cache = PostCache::in_memory();
        cache.save_converted(&internal(1, 1)).expect("seed");

        let mut updated = internal(1, 1);
        updated.title = "Rewritten".to_string();
        cache
            .save_converted_batch(&[updated, internal(2, 2), internal(3, 3)])
            .expect("batch save");
        cache.save_converted_batch(&[]).expect("empty batch is a no-op");

        let converted = cache.get_converted().expect("read");
        assert_eq!(
            converted.iter().map(|post| post.id).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );
        assert_eq!(converted[2].title, "Rewritten");
    }
}
