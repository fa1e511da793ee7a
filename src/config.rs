//! Runtime configuration read from `WP_INGEST_*` environment variables.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::sanitize::SanitizerRules;
use crate::core::sync::SyncConfig;
use crate::core::wordpress::fetcher::FetchConfig;

const ENV_PREFIX: &str = "WP_INGEST_";
const WORDPRESS_MAX_PER_PAGE: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Each `-v` moves one step towards `Trace`.
    pub fn raised_by(self, steps: u8) -> Self {
        const ORDER: [LogLevel; 5] = [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ];
        let current = ORDER.iter().position(|level| *level == self).unwrap_or(2);
        ORDER[(current + steps as usize).min(ORDER.len() - 1)]
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub wordpress_url: String,
    pub database_url: String,
    /// File-backed post cache directory; in-memory when unset.
    pub cache_dir: Option<PathBuf>,
    pub listen_addr: String,
    pub sync_interval: Duration,
    pub sync_enabled: bool,
    pub per_page: u32,
    pub max_posts: usize,
    pub max_pages: u32,
    pub request_timeout: Duration,
    pub max_retries: usize,
    pub extra_class_keywords: Vec<String>,
    pub log_level: LogLevel,
}

impl Default for AppConfig {
    fn default() -> Self {
        let fetch = FetchConfig::default();
        let sync = SyncConfig::default();
        Self {
            wordpress_url: String::new(),
            database_url: "sqlite://wp-ingest.db?mode=rwc".to_string(),
            cache_dir: None,
            listen_addr: "127.0.0.1:8080".to_string(),
            sync_interval: sync.interval,
            sync_enabled: sync.enabled_by_default,
            per_page: fetch.per_page,
            max_posts: fetch.max_posts,
            max_pages: fetch.max_pages,
            request_timeout: fetch.timeout,
            max_retries: fetch.max_retries,
            extra_class_keywords: Vec::new(),
            log_level: LogLevel::Info,
        }
    }
}

impl AppConfig {
    /// Loads `.env.local` when present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::from_filename(".env.local");
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a validated config from `lookup`, which is given the full
    /// variable name (`WP_INGEST_WORDPRESS_URL`, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut errors = Vec::new();
        let var = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}"))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = var("WORDPRESS_URL") {
            config.wordpress_url = value;
        }
        if let Some(value) = var("DATABASE_URL") {
            config.database_url = value;
        }
        if let Some(value) = var("CACHE_DIR") {
            config.cache_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = var("LISTEN_ADDR") {
            config.listen_addr = value;
        }
        if let Some(secs) = parse_var::<u64>(&var, "SYNC_INTERVAL_SECS", &mut errors) {
            config.sync_interval = Duration::from_secs(secs);
        }
        if let Some(enabled) = parse_var::<bool>(&var, "SYNC_ENABLED", &mut errors) {
            config.sync_enabled = enabled;
        }
        if let Some(per_page) = parse_var(&var, "PER_PAGE", &mut errors) {
            config.per_page = per_page;
        }
        if let Some(max_posts) = parse_var(&var, "MAX_POSTS", &mut errors) {
            config.max_posts = max_posts;
        }
        if let Some(max_pages) = parse_var(&var, "MAX_PAGES", &mut errors) {
            config.max_pages = max_pages;
        }
        if let Some(secs) = parse_var::<u64>(&var, "TIMEOUT_SECS", &mut errors) {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var(&var, "MAX_RETRIES", &mut errors) {
            config.max_retries = retries;
        }
        if let Some(value) = var("EXTRA_CLASS_KEYWORDS") {
            config.extra_class_keywords = value
                .split(',')
                .map(str::trim)
                .filter(|keyword| !keyword.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = var("LOG_LEVEL") {
            match LogLevel::parse(&value) {
                Some(level) => config.log_level = level,
                None => errors.push(format!("{ENV_PREFIX}LOG_LEVEL: unknown level {value:?}")),
            }
        }

        if let Err(ConfigError::Invalid(problems)) = config.validate() {
            errors.extend(problems);
        }
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Reports every problem at once rather than stopping at the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let url = self.wordpress_url.trim();
        if url.is_empty() {
            errors.push(format!("{ENV_PREFIX}WORDPRESS_URL is required"));
        } else if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(format!(
                "{ENV_PREFIX}WORDPRESS_URL must start with http:// or https://"
            ));
        }
        if self.database_url.trim().is_empty() {
            errors.push(format!("{ENV_PREFIX}DATABASE_URL must not be empty"));
        }
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "{ENV_PREFIX}LISTEN_ADDR is not a socket address: {:?}",
                self.listen_addr
            ));
        }
        if self.sync_interval.is_zero() {
            errors.push(format!("{ENV_PREFIX}SYNC_INTERVAL_SECS must be positive"));
        }
        if self.per_page == 0 || self.per_page > WORDPRESS_MAX_PER_PAGE {
            errors.push(format!(
                "{ENV_PREFIX}PER_PAGE must be between 1 and {WORDPRESS_MAX_PER_PAGE}"
            ));
        }
        if self.max_posts == 0 {
            errors.push(format!("{ENV_PREFIX}MAX_POSTS must be positive"));
        }
        if self.max_pages == 0 {
            errors.push(format!("{ENV_PREFIX}MAX_PAGES must be positive"));
        }
        if self.request_timeout.is_zero() {
            errors.push(format!("{ENV_PREFIX}TIMEOUT_SECS must be positive"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            base_url: self.wordpress_url.clone(),
            per_page: self.per_page,
            max_posts: self.max_posts,
            max_pages: self.max_pages,
            timeout: self.request_timeout,
            max_retries: self.max_retries,
            ..FetchConfig::default()
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: self.sync_interval,
            enabled_by_default: self.sync_enabled,
        }
    }

    pub fn sanitizer_rules(&self) -> SanitizerRules {
        SanitizerRules::default().with_extra_class_keywords(self.extra_class_keywords.clone())
    }
}

fn parse_var<T>(
    var: &impl Fn(&str) -> Option<String>,
    suffix: &str,
    errors: &mut Vec<String>,
) -> Option<T>
where
    T: std::str::FromStr,
{
    let raw = var(suffix)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(format!("{ENV_PREFIX}{suffix}: cannot parse {raw:?}"));
            None
        }
    }
}
