//! Maps remote WordPress posts onto [`InternalPost`].
//!
//! Conversion never fails from the caller's point of view: missing fields are
//! replaced with placeholders and anything worse yields an "Error Loading
//! Story" post, so one bad record cannot abort a batch import.

pub mod types;

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::core::analysis::analyze;
use crate::core::cache::PostCache;
use crate::core::sanitize::{plain_text, Sanitizer};
use crate::core::wordpress::parse_wp_date;
use crate::core::wordpress::types::RemotePost;

pub use types::InternalPost;

pub const UNTITLED_TITLE: &str = "Untitled Story";
pub const ERROR_TITLE: &str = "Error Loading Story";
const MISSING_CONTENT: &str = "<p>This story is missing its content.</p>";
const ERROR_CONTENT: &str = "<p>This story could not be loaded.</p>";
const ERROR_EXCERPT: &str = "This story could not be loaded.";
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterConfig {
    pub excerpt_length: usize,
    pub words_per_minute: usize,
    pub default_author_id: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            excerpt_length: 200,
            words_per_minute: 200,
            default_author_id: "wordpress-import".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("unparseable post date: {0:?}")]
    InvalidDate(String),
}

#[derive(Debug)]
pub struct PostConverter {
    sanitizer: Sanitizer,
    config: ConverterConfig,
    cache: Option<PostCache>,
    sequence: AtomicU64,
}

impl PostConverter {
    pub fn new(sanitizer: Sanitizer, config: ConverterConfig) -> Self {
        Self {
            sanitizer,
            config,
            cache: None,
            sequence: AtomicU64::new(0),
        }
    }

    /// Converted posts are written through to `cache`.
    pub fn with_cache(mut self, cache: PostCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn convert(&self, remote: &RemotePost) -> InternalPost {
        let post = match self.try_convert(remote) {
            Ok(post) => post,
            Err(error) => return self.error_placeholder(remote, &error),
        };
        if let Some(cache) = &self.cache {
            if let Err(error) = cache.save_converted(&post) {
                warn!(post_id = post.id, %error, "could not cache converted post");
            }
        }
        post
    }

    /// Converts a batch and writes the successful posts to the cache in one pass.
    pub fn convert_all(&self, remotes: &[RemotePost]) -> Vec<InternalPost> {
        let mut converted = Vec::with_capacity(remotes.len());
        let mut cacheable = Vec::with_capacity(remotes.len());
        for remote in remotes {
            match self.try_convert(remote) {
                Ok(post) => {
                    cacheable.push(post.clone());
                    converted.push(post);
                }
                Err(error) => converted.push(self.error_placeholder(remote, &error)),
            }
        }
        if let Some(cache) = &self.cache {
            if let Err(error) = cache.save_converted_batch(&cacheable) {
                warn!(count = cacheable.len(), %error, "could not cache converted posts");
            }
        }
        converted
    }


    pub fn try_convert(&self, remote: &RemotePost) -> Result<InternalPost, ConvertError> {
        let now = Utc::now();
        let created_at = resolve_created_at(remote)?.unwrap_or(now);
        let mut fallback = false;

        let title = if remote.title.is_blank() {
            fallback = true;
            UNTITLED_TITLE.to_string()
        } else {
            plain_text(&remote.title.rendered)
        };

        let mut content = if remote.content.is_blank() {
            String::new()
        } else {
            self.sanitizer.sanitize(&remote.content.rendered)
        };
        if content.is_empty() {
            fallback = true;
            content = MISSING_CONTENT.to_string();
        }
        let content_text = plain_text(&content);

        let slug = normalize_slug(&remote.slug).unwrap_or_else(|| {
            fallback = true;
            format!("story-{}", self.synthesize_suffix(now))
        });

        let excerpt = self
            .remote_excerpt(remote)
            .unwrap_or_else(|| derive_excerpt(&content_text, self.config.excerpt_length));

        let word_count = content_text.split_whitespace().count();
        let reading_time_minutes =
            word_count.div_ceil(self.config.words_per_minute.max(1)) as u32;

        let analysis = analyze(&format!("{title} {content_text}"));

        let id = if remote.id > 0 {
            remote.id
        } else {
            fallback = true;
            self.synthesize_id(now)
        };

        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!("wordpress"));
        metadata.insert("wordpress_id".to_string(), json!(remote.id));
        metadata.insert("original_date".to_string(), json!(remote.date));
        if let Some(modified) = &remote.modified {
            metadata.insert("modified".to_string(), json!(modified));
        }
        metadata.insert("intensity".to_string(), json!(analysis.intensity));
        if !analysis.matched_keywords.is_empty() {
            metadata.insert("keywords".to_string(), json!(analysis.matched_keywords));
        }
        if fallback {
            metadata.insert("fallback".to_string(), Value::Bool(true));
        }

        Ok(InternalPost {
            id,
            title,
            content,
            excerpt,
            slug,
            created_at,
            author_id: remote
                .author
                .map(|author| format!("wp-{author}"))
                .unwrap_or_else(|| self.config.default_author_id.clone()),
            reading_time_minutes,
            theme_category: analysis.theme,
            metadata,
        })
    }

    fn remote_excerpt(&self, remote: &RemotePost) -> Option<String> {
        if remote.excerpt.is_blank() {
            return None;
        }
        let text = plain_text(&self.sanitizer.sanitize(&remote.excerpt.rendered));
        // WordPress appends a bracketed ellipsis to generated excerpts.
        let text = text.trim_end_matches("[\u{2026}]").trim_end();
        (!text.is_empty()).then(|| text.to_string())
    }

    fn error_placeholder(&self, remote: &RemotePost, error: &ConvertError) -> InternalPost {
        warn!(remote_id = remote.id, %error, "conversion failed, using error placeholder");
        let now = Utc::now();
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!("wordpress"));
        metadata.insert("wordpress_id".to_string(), json!(remote.id));
        metadata.insert("error".to_string(), json!(error.to_string()));
        InternalPost {
            id: self.synthesize_id(now),
            title: ERROR_TITLE.to_string(),
            content: ERROR_CONTENT.to_string(),
            excerpt: ERROR_EXCERPT.to_string(),
            slug: format!("error-{}", self.synthesize_suffix(now)),
            created_at: now,
            author_id: self.config.default_author_id.clone(),
            reading_time_minutes: 1,
            theme_category: None,
            metadata,
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) % 1000
    }

    /// Millisecond timestamp scaled to leave room for a per-converter sequence,
    /// negated so it can never collide with a positive WordPress id.
    fn synthesize_id(&self, now: DateTime<Utc>) -> i64 {
        -(now.timestamp_millis() * 1000 + self.next_sequence() as i64)
    }

    fn synthesize_suffix(&self, now: DateTime<Utc>) -> String {
        format!("{}-{}", now.timestamp_millis(), self.next_sequence())
    }
}

impl Default for PostConverter {
    fn default() -> Self {
        Self::new(Sanitizer::default(), ConverterConfig::default())
    }
}

fn resolve_created_at(remote: &RemotePost) -> Result<Option<DateTime<Utc>>, ConvertError> {
    let candidates = [remote.date_gmt.as_deref(), Some(remote.date.as_str())];
    let mut first_invalid = None;
    for raw in candidates.into_iter().flatten() {
        if raw.trim().is_empty() {
            continue;
        }
        match parse_wp_date(raw) {
            Some(parsed) => return Ok(Some(parsed)),
            None => {
                first_invalid.get_or_insert_with(|| raw.to_string());
            }
        }
    }
    match first_invalid {
        Some(raw) => Err(ConvertError::InvalidDate(raw)),
        None => Ok(None),
    }
}

fn normalize_slug(raw: &str) -> Option<String> {
    let slug = raw.trim().to_lowercase();
    (!slug.is_empty()).then_some(slug)
}

/// First `limit` characters of `text`, cut back to a word boundary, plus "...".
pub fn derive_excerpt(text: &str, limit: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .nth(limit)
        .map(|(index, _)| index)
        .unwrap_or(text.len());
    let head = &text[..cut];
    let next_is_space = text[cut..].starts_with(char::is_whitespace);
    let head = match head.rfind(char::is_whitespace) {
        Some(space) if !next_is_space && space > 0 => &head[..space],
        _ => head,
    };
    format!("{}{ELLIPSIS}", head.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use crate::core::analysis::ThemeCategory;
    use crate::core::cache::{CacheConfig, CacheError, MemoryStorage, StoragePort};
    use crate::core::wordpress::types::Rendered;

    /// Memory storage that counts writes.
    #[derive(Default)]
    struct CountingStorage {
        inner: MemoryStorage,
        writes: AtomicUsize,
    }

    impl StoragePort for CountingStorage {
        fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), CacheError> {
            self.inner.remove(key)
        }
    }

    fn remote() -> RemotePost {
        RemotePost {
            id: 101,
            date: "2024-10-31T22:00:00".to_string(),
            date_gmt: Some("2024-11-01T03:00:00".to_string()),
            modified: Some("2024-11-02T00:00:00".to_string()),
            slug: "The-Hollow".to_string(),
            title: Rendered::new("The Hollow&#8217;s Edge"),
            content: Rendered::new(
                "<p>The ghost of the haunted mill <strong>waited</strong>.</p><script>x()</script>",
            ),
            excerpt: Rendered::new("<p>A ghost waits [&hellip;]</p>"),
            author: Some(4),
        }
    }

    #[test]
    fn converts_a_complete_post() {
        let post = PostConverter::default().convert(&remote());
        assert_eq!(post.id, 101);
        assert_eq!(post.title, "The Hollow\u{2019}s Edge");
        assert_eq!(
            post.content,
            "<p>The ghost of the haunted mill <strong>waited</strong>.</p>"
        );
        assert_eq!(post.excerpt, "A ghost waits");
        assert_eq!(post.slug, "the-hollow");
        assert_eq!(post.author_id, "wp-4");
        assert_eq!(post.reading_time_minutes, 1);
        assert_eq!(post.created_at.to_rfc3339(), "2024-11-01T03:00:00+00:00");
        assert_eq!(post.theme_category, Some(ThemeCategory::Supernatural));
        assert_eq!(post.metadata.get("wordpress_id"), Some(&json!(101)));
        assert!(!post.is_fallback());
    }

    #[test]
    fn missing_title_uses_placeholder_and_never_fails() {
        let mut input = remote();
        input.title = Rendered::default();
        input.slug = "  ".to_string();

        let post = PostConverter::default().convert(&input);
        assert_eq!(post.title, UNTITLED_TITLE);
        assert!(post.slug.starts_with("story-"));
        assert!(post.slug.len() > "story-".len());
        assert!(post.is_fallback());
        assert!(post.content.contains("haunted mill"));
    }

    #[test]
    fn missing_title_only_keeps_remote_slug() {
        let mut input = remote();
        input.title = Rendered::new("   ");

        let post = PostConverter::default().convert(&input);
        assert_eq!(post.title, UNTITLED_TITLE);
        assert_eq!(post.slug, "the-hollow");
        assert_eq!(post.id, 101);
        assert!(post.is_fallback());
        assert!(!post.is_error_placeholder());
    }

    #[test]
    fn titles_keep_punctuation_attached_to_inline_markup() {
        let mut input = remote();
        input.title = Rendered::new("<em>Hollow</em>&#8217;s <strong>Edge</strong>.");
        let post = PostConverter::default().convert(&input);
        assert_eq!(post.title, "Hollow\u{2019}s Edge.");
    }

    #[test]
    fn missing_content_gets_placeholder_content() {
        let mut input = remote();
        input.content = Rendered::new("<script>only()</script>");
        let post = PostConverter::default().convert(&input);
        assert_eq!(post.content, MISSING_CONTENT);
        assert!(post.is_fallback());
    }

    #[test]
    fn empty_excerpt_is_derived_from_content() {
        let mut input = remote();
        input.excerpt = Rendered::default();
        let sentence = "The lantern guttered and the stairwell breathed below us. ";
        input.content = Rendered::new(format!("<p>{}</p>", sentence.repeat(10)));

        let post = PostConverter::default().convert(&input);
        let content_text = plain_text(&post.content);
        assert!(post.excerpt.ends_with(ELLIPSIS));
        assert!(post.excerpt.chars().count() <= 203);
        let stem = post.excerpt.trim_end_matches(ELLIPSIS);
        assert!(content_text.starts_with(stem));
        assert!(!stem.ends_with(' '));
        assert!(content_text[stem.len()..].starts_with(' '));
    }

    #[test]
    fn short_content_is_its_own_excerpt() {
        let mut input = remote();
        input.excerpt = Rendered::default();
        let post = PostConverter::default().convert(&input);
        assert_eq!(post.excerpt, "The ghost of the haunted mill waited.");
    }

    #[test]
    fn reading_time_rounds_up() {
        let mut input = remote();
        input.content = Rendered::new(format!("<p>{}</p>", "word ".repeat(401)));
        let post = PostConverter::default().convert(&input);
        assert_eq!(post.reading_time_minutes, 3);
    }

    #[test]
    fn invalid_date_becomes_error_placeholder() {
        let mut input = remote();
        input.date_gmt = None;
        input.date = "the thirteenth hour".to_string();

        let converter = PostConverter::default();
        assert!(matches!(
            converter.try_convert(&input),
            Err(ConvertError::InvalidDate(_))
        ));
        let first = converter.convert(&input);
        let second = converter.convert(&input);
        assert_eq!(first.title, ERROR_TITLE);
        assert!(first.is_error_placeholder());
        assert!(first.id < 0);
        assert_ne!(first.id, second.id);
        assert_ne!(first.slug, second.slug);
    }

    #[test]
    fn missing_remote_id_is_synthesized() {
        let mut input = remote();
        input.id = 0;
        let post = PostConverter::default().convert(&input);
        assert!(post.id < 0);
        assert!(post.is_fallback());
    }

    #[test]
    fn converted_posts_are_written_to_cache() {
        let cache = PostCache::in_memory();
        let converter = PostConverter::default().with_cache(cache.clone());
        converter.convert(&remote());

        let mut broken = remote();
        broken.id = 202;
        broken.date_gmt = Some("not a date".to_string());
        broken.date = "nor this".to_string();
        converter.convert(&broken);

        let cached = cache.get_converted().expect("cache readable");
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, 101);
    }

    #[test]
    fn convert_all_caches_a_batch_with_one_write() {
        let storage = Arc::new(CountingStorage::default());
        let cache = PostCache::new(storage.clone(), CacheConfig::default());
        let converter = PostConverter::default().with_cache(cache.clone());

        let inputs: Vec<RemotePost> = (1..=50)
            .map(|id| {
                let mut input = remote();
                input.id = id;
                input.slug = format!("story-{id}");
                input
            })
            .chain(std::iter::once({
                let mut broken = remote();
                broken.id = 999;
                broken.date_gmt = None;
                broken.date = "never".to_string();
                broken
            }))
            .collect();

        let converted = converter.convert_all(&inputs);
        assert_eq!(converted.len(), 51);
        assert!(converted[50].is_error_placeholder());
        assert_eq!(storage.writes.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get_converted().expect("cache readable").len(), 50);
    }

    #[test]
    fn excerpt_cut_respects_word_boundary_and_multibyte_text() {
        let text = "\u{00e9}\u{00e9}\u{00e9} abc defgh";
        assert_eq!(derive_excerpt(text, 9), "\u{00e9}\u{00e9}\u{00e9} abc...");
        assert_eq!(derive_excerpt(text, 7), "\u{00e9}\u{00e9}\u{00e9} abc...");
        assert_eq!(derive_excerpt("abcdefghij", 4), "abcd...");
        assert_eq!(derive_excerpt("short", 200), "short");
    }
}
