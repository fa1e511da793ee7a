use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{FetchOutcome, FetchedPage, RemotePost};
use crate::core::cache::PostCache;

const TOTAL_PAGES_HEADER: &str = "x-wp-totalpages";
const TOTAL_HEADER: &str = "x-wp-total";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Site root (`https://blog.example.com`) or a full `/wp-json/...` endpoint.
    pub base_url: String,
    pub per_page: u32,
    /// Hard cap on posts gathered by one `fetch_all`.
    pub max_posts: usize,
    /// Page-following cap, independent of what the server reports.
    pub max_pages: u32,
    pub timeout: Duration,
    pub max_retries: usize,
    pub retry_backoff: Duration,
    /// Optional `_fields` projection.
    pub fields: Vec<String>,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            per_page: 100,
            max_posts: 1000,
            max_pages: 20,
            timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_backoff: Duration::from_millis(40),
            fields: Vec::new(),
            user_agent: concat!("wp-ingest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchConfig {
    pub fn endpoint(&self) -> String {
        let base = self.base_url.trim().trim_end_matches('/');
        if base.contains("/wp-json/") {
            base.to_string()
        } else {
            format!("{base}/wp-json/wp/v2/posts")
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("rate limited by remote (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("unexpected status code: {0}")]
    HttpStatus(u16),
    #[error("unexpected content type: {0}")]
    UnexpectedContentType(String),
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("payload is not a JSON array")]
    NotAnArray,
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Request(_))
            || matches!(self, FetchError::HttpStatus(code) if *code >= 500)
    }
}

/// Paginated client for the WordPress posts endpoint.
///
/// Successful pages are written through to the [`PostCache`], which is also
/// where failed pages are served from.
#[derive(Debug, Clone)]
pub struct PostFetcher {
    client: reqwest::Client,
    config: FetchConfig,
    endpoint: String,
    cache: PostCache,
}

impl PostFetcher {
    pub fn new(config: FetchConfig, cache: PostCache) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        let endpoint = config.endpoint();
        Ok(Self {
            client,
            config,
            endpoint,
            cache,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn cache(&self) -> &PostCache {
        &self.cache
    }

    pub async fn fetch_page(&self, page: u32) -> Result<FetchedPage, FetchError> {
        let mut query: Vec<(&str, String)> = vec![
            ("page", page.to_string()),
            ("per_page", self.config.per_page.to_string()),
            ("orderby", "date".to_string()),
            ("order", "desc".to_string()),
        ];
        if !self.config.fields.is_empty() {
            query.push(("_fields", self.config.fields.join(",")));
        }

        let response = self.client.get(&self.endpoint).query(&query).send().await?;
        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(FetchError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.to_lowercase().contains("json") {
            return Err(FetchError::UnexpectedContentType(content_type));
        }
        let total_pages = header_number(&response, TOTAL_PAGES_HEADER);
        let total = header_number(&response, TOTAL_HEADER);

        let body = response.bytes().await?;
        let payload: serde_json::Value = serde_json::from_slice(&body)?;
        let serde_json::Value::Array(items) = payload else {
            return Err(FetchError::NotAnArray);
        };
        let posts = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<RemotePost>(item) {
                Ok(post) => Some(post),
                Err(error) => {
                    warn!(page, %error, "skipping undecodable post");
                    None
                }
            })
            .collect();

        Ok(FetchedPage {
            page,
            posts,
            total_pages,
            total,
        })
    }

    pub async fn fetch_page_with_retry(&self, page: u32) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0_usize;
        loop {
            match self.fetch_page(page).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !err.is_retryable() || attempt >= self.config.max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    debug!(page, attempt, error = %err, "retrying page fetch");
                    tokio::time::sleep(self.config.retry_backoff * attempt as u32).await;
                }
            }
        }
    }

    /// Fetches one page, degrading to the cached slice (or nothing) on failure.
    pub async fn fetch_posts(&self, page: u32) -> Vec<RemotePost> {
        match self.fetch_page_with_retry(page).await {
            Ok(fetched) => {
                if let Err(error) = self.cache.save(&fetched.posts) {
                    warn!(page, %error, "could not cache fetched page");
                }
                fetched.posts
            }
            Err(error) => {
                warn!(
                    page,
                    %error,
                    rate_limited = error.is_rate_limited(),
                    "fetch failed, serving cached page"
                );
                self.cached_page(page)
            }
        }
    }

    /// Follows pages sequentially until the server runs out, `max_posts` is
    /// reached, or `max_pages` pages have been requested.
    pub async fn fetch_all(&self) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();
        let per_page = self.config.per_page.max(1);
        let mut page = 1_u32;

        loop {
            if page > self.config.max_pages {
                warn!(
                    max_pages = self.config.max_pages,
                    "page cap reached before the server ran out of pages"
                );
                break;
            }

            match self.fetch_page_with_retry(page).await {
                Ok(fetched) => {
                    outcome.pages_fetched += 1;
                    let has_more = fetched.has_more(per_page);
                    debug!(
                        page,
                        count = fetched.posts.len(),
                        total_pages = ?fetched.total_pages,
                        "fetched page"
                    );
                    if let Err(error) = self.cache.save(&fetched.posts) {
                        warn!(page, %error, "could not cache fetched page");
                    }
                    outcome.posts.extend(fetched.posts);

                    let requested = page as usize * per_page as usize;
                    if !has_more
                        || outcome.posts.len() >= self.config.max_posts
                        || requested >= self.config.max_posts
                    {
                        break;
                    }
                    page += 1;
                }
                Err(FetchError::HttpStatus(400)) if page > 1 => {
                    debug!(page, "remote reported page out of range");
                    break;
                }
                Err(error) => {
                    warn!(page, %error, "page fetch failed");
                    outcome.rate_limited |= error.is_rate_limited();
                    outcome.errors.push(format!("page {page}: {error}"));
                    if page == 1 {
                        outcome.posts = self.cached_all();
                        outcome.from_cache = true;
                    }
                    break;
                }
            }
        }

        outcome.posts.truncate(self.config.max_posts);
        info!(
            posts = outcome.posts.len(),
            pages = outcome.pages_fetched,
            from_cache = outcome.from_cache,
            "fetch finished"
        );
        outcome
    }

    fn cached_page(&self, page: u32) -> Vec<RemotePost> {
        self.log_staleness();
        self.cache
            .get_page(page, self.config.per_page)
            .unwrap_or_else(|error| {
                warn!(%error, "cache unavailable");
                Vec::new()
            })
    }

    fn cached_all(&self) -> Vec<RemotePost> {
        self.log_staleness();
        self.cache.get_all().unwrap_or_else(|error| {
            warn!(%error, "cache unavailable");
            Vec::new()
        })
    }

    fn log_staleness(&self) {
        if let Ok(true) = self.cache.is_stale(chrono::Utc::now()) {
            info!("serving posts from a stale cache");
        }
    }
}

fn header_number(response: &reqwest::Response, name: &str) -> Option<u32> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}
