use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rendered {
    #[serde(default)]
    pub rendered: String,
}

impl Rendered {
    pub fn new(rendered: impl Into<String>) -> Self {
        Self {
            rendered: rendered.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.rendered.trim().is_empty()
    }
}

/// A post as returned by `/wp-json/wp/v2/posts`.
///
/// Every field is optional on the wire so one malformed post never fails a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemotePost {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_gmt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: Rendered,
    #[serde(default)]
    pub content: Rendered,
    #[serde(default)]
    pub excerpt: Rendered,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<i64>,
}

/// One page of posts plus the pagination totals the server reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedPage {
    pub page: u32,
    pub posts: Vec<RemotePost>,
    pub total_pages: Option<u32>,
    pub total: Option<u32>,
}

impl FetchedPage {
    /// Uses `X-WP-TotalPages` when present, otherwise assumes a full page means
    /// another one follows.
    pub fn has_more(&self, per_page: u32) -> bool {
        match self.total_pages {
            Some(total_pages) => self.page < total_pages,
            None => !self.posts.is_empty() && self.posts.len() >= per_page as usize,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub posts: Vec<RemotePost>,
    pub pages_fetched: u32,
    pub errors: Vec<String>,
    pub rate_limited: bool,
    pub from_cache: bool,
}
