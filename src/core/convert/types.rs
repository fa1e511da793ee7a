use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::analysis::ThemeCategory;

/// A story in the blog's own schema, produced from a remote post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InternalPost {
    pub id: i64,
    pub title: String,
    /// Sanitized HTML.
    pub content: String,
    /// Plain text.
    pub excerpt: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub author_id: String,
    pub reading_time_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_category: Option<ThemeCategory>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl InternalPost {
    /// Whether conversion failed outright and this is the error stand-in.
    pub fn is_error_placeholder(&self) -> bool {
        self.metadata.contains_key("error")
    }

    pub fn is_fallback(&self) -> bool {
        self.metadata
            .get("fallback")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}
