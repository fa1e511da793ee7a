pub mod fetcher;
pub mod types;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use types::FetchOutcome;

/// How the remote API behaved on the most recent fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemoteHealth {
    /// No fetch has run since startup.
    #[default]
    Unknown,
    Ready,
    RateLimited,
    Unreachable,
}

impl RemoteHealth {
    pub fn from_outcome(outcome: &FetchOutcome) -> Self {
        if outcome.rate_limited {
            Self::RateLimited
        } else if outcome.from_cache || (outcome.pages_fetched == 0 && !outcome.errors.is_empty()) {
            Self::Unreachable
        } else {
            Self::Ready
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Ready => "ready",
            Self::RateLimited => "rate_limited",
            Self::Unreachable => "unreachable",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WordPressService;

impl WordPressService {
    pub fn name(&self) -> &'static str {
        "wordpress"
    }

    pub fn status(&self, health: RemoteHealth) -> &'static str {
        health.as_str()
    }
}

/// Parses the timestamp shapes WordPress emits: RFC 3339, or a naive
/// `YYYY-MM-DDTHH:MM:SS` which is taken as UTC.
pub fn parse_wp_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}
