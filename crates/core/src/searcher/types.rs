//! Types for the multi-site search system.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use super::discount::Promotion;

/// Media type of the item being searched for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    Tv,
    Anime,
    #[default]
    Unknown,
}

/// Caller-supplied filters for one search fan-out.
///
/// The dispatcher clones this per site; a dispatch never mutates the caller's copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterArgs {
    /// Allow-list of site names. Empty means every site.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sites: Vec<String>,
    /// Filter rule id; defaults to the site's own rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(default)]
    pub free_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    /// Regex a title must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
    /// Regex a title must not match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
    /// Opaque extra filter keys handed through to the result filter.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

/// What the caller already knows about the media being searched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaHint {
    #[serde(default)]
    pub media_type: MediaType,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Title was matched against a metadata provider.
    #[serde(default)]
    pub tmdb_matched: bool,
}

/// One torrent in the canonical schema every adapter produces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TorrentRecord {
    pub indexer_id: String,
    pub indexer_name: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Download url. Empty until resolved for sites that hand out tokens on demand.
    #[serde(default)]
    pub enclosure: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubdate: Option<String>,
    pub size: u64,
    pub seeders: u32,
    pub peers: u32,
    pub grabs: u32,
    pub free: bool,
    #[serde(rename = "2xfree")]
    pub double_free: bool,
    pub hr: bool,
    pub downloadvolumefactor: f64,
    pub uploadvolumefactor: f64,
    #[serde(default)]
    pub page_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdbid: Option<String>,
    #[serde(default)]
    pub site_priority: i32,
}

impl TorrentRecord {
    /// A record with every promotion field at its NORMAL default.
    pub fn new(indexer_id: impl Into<String>, title: impl Into<String>) -> Self {
        let promotion = Promotion::default();
        Self {
            indexer_id: indexer_id.into(),
            indexer_name: String::new(),
            title: title.into(),
            description: String::new(),
            enclosure: String::new(),
            pubdate: None,
            size: 0,
            seeders: 0,
            peers: 0,
            grabs: 0,
            free: promotion.free,
            double_free: promotion.double_free,
            hr: false,
            downloadvolumefactor: promotion.download_factor,
            uploadvolumefactor: promotion.upload_factor,
            page_url: String::new(),
            imdbid: None,
            site_priority: 0,
        }
    }

    pub fn apply_promotion(&mut self, promotion: Promotion) {
        self.free = promotion.free;
        self.double_free = promotion.double_free;
        self.downloadvolumefactor = promotion.download_factor;
        self.uploadvolumefactor = promotion.upload_factor;
    }
}

/// Parameters handed to an adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpiderQuery {
    /// `None` browses the site's listing instead of searching.
    pub keyword: Option<String>,
    /// Zero-based page.
    pub page: u32,
    pub media_type: Option<MediaType>,
}

/// Failure taxonomy carried into statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Network,
    Timeout,
    MalformedResponse,
    Plugin,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::Plugin => "plugin",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Why a dispatch never reached an adapter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingInput,
    RateLimited,
    NotSelected,
    Language,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Skipped(SkipReason),
    Failed(ErrorKind),
}

/// Result of one dispatch against one site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchOutcome {
    pub status: OutcomeStatus,
    pub records: Vec<TorrentRecord>,
}

impl SearchOutcome {
    pub fn completed(records: Vec<TorrentRecord>) -> Self {
        Self {
            status: OutcomeStatus::Completed,
            records,
        }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            status: OutcomeStatus::Skipped(reason),
            records: Vec::new(),
        }
    }

    pub fn failed(kind: ErrorKind) -> Self {
        Self {
            status: OutcomeStatus::Failed(kind),
            records: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed(_))
    }
}

/// Errors raised inside adapters. Never escape the dispatcher.
#[derive(Debug, Clone, Error)]
pub enum SpiderError {
    #[error("Site configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SpiderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpiderError::Configuration(_) => ErrorKind::Configuration,
            SpiderError::Network(_) => ErrorKind::Network,
            SpiderError::Timeout(_) => ErrorKind::Timeout,
            SpiderError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            SpiderError::Plugin(_) => ErrorKind::Plugin,
            SpiderError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<reqwest::Error> for SpiderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SpiderError::Timeout(Duration::ZERO)
        } else if e.is_decode() {
            SpiderError::MalformedResponse(e.to_string())
        } else {
            SpiderError::Network(e.to_string())
        }
    }
}

/// One per-site latency/success sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexerStatistic {
    pub indexer: String,
    /// Dispatcher id, `builtin` for this engine.
    pub engine: String,
    pub seconds: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Statistics storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_has_normal_promotion() {
        let record = TorrentRecord::new("hdsky", "Some.Movie.2023.1080p");
        assert!(!record.free);
        assert!(!record.double_free);
        assert!(!record.hr);
        assert_eq!(record.downloadvolumefactor, 1.0);
        assert_eq!(record.uploadvolumefactor, 1.0);
        assert!(record.enclosure.is_empty());
    }

    #[test]
    fn test_record_serializes_2xfree_key() {
        let record = TorrentRecord::new("hdsky", "x");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["2xfree"], serde_json::json!(false));
        assert!(json.get("double_free").is_none());
    }

    #[test]
    fn test_outcome_status_serialization() {
        let skipped = serde_json::to_value(OutcomeStatus::Skipped(SkipReason::RateLimited)).unwrap();
        assert_eq!(
            skipped,
            serde_json::json!({"status": "skipped", "reason": "rate_limited"})
        );
        let done = serde_json::to_value(OutcomeStatus::Completed).unwrap();
        assert_eq!(done, serde_json::json!({"status": "completed"}));
    }

    #[test]
    fn test_outcome_error_flag() {
        assert!(SearchOutcome::failed(ErrorKind::Timeout).is_error());
        assert!(!SearchOutcome::skipped(SkipReason::RateLimited).is_error());
        assert!(!SearchOutcome::completed(vec![]).is_error());
    }

    #[test]
    fn test_spider_error_kind() {
        assert_eq!(
            SpiderError::Configuration("no key".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(SpiderError::Timeout(Duration::from_secs(30)).kind(), ErrorKind::Timeout);
        assert_eq!(ErrorKind::MalformedResponse.as_str(), "malformed_response");
    }

    #[test]
    fn test_timeout_message_keeps_sub_second_deadlines() {
        let err = SpiderError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "Request timeout after 250ms");
    }

    #[test]
    fn test_filter_args_minimal_json() {
        let filters: FilterArgs = serde_json::from_str("{}").unwrap();
        assert!(filters.sites.is_empty());
        assert!(!filters.free_only);
        assert!(filters.rule.is_none());
    }
}
