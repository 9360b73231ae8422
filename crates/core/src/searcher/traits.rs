//! Collaborator seams of the dispatcher.
//!
//! Everything the engine does not own (rate-limit state, statistics storage,
//! UI progress, plugin loading, browser automation) sits behind one of these.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

use super::types::{
    FilterArgs, IndexerStatistic, MediaHint, SinkError, SpiderError, TorrentRecord,
};
use crate::site::SiteDescriptor;

/// Decides whether a site may be queried right now.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn allowed(&self, site_id: &str) -> bool;
}

/// Persists per-site latency and success samples.
pub trait StatisticsSink: Send + Sync {
    fn record(&self, stat: &IndexerStatistic) -> Result<(), SinkError>;
}

/// Progress categories shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressKey {
    Search,
}

impl ProgressKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressKey::Search => "search",
        }
    }
}

/// Fire-and-forget progress feedback.
pub trait ProgressSink: Send + Sync {
    fn update(&self, key: ProgressKey, text: &str);
}

/// Progress sink that only logs.
#[derive(Debug, Default, Clone)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn update(&self, key: ProgressKey, text: &str) {
        info!(category = key.as_str(), "{}", text);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginMethod {
    Search,
}

impl PluginMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginMethod::Search => "search",
        }
    }
}

/// Result of delegating a search to a plugin.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginSearch {
    Found(Vec<TorrentRecord>),
    /// The plugin has no parser for this site; fall back to the generic adapter.
    NotFound,
}

/// Third-party parser host. Loading plugin code is not this crate's concern.
#[async_trait]
pub trait PluginHost: Send + Sync {
    fn has_parser(&self, site_id: &str) -> bool;

    async fn invoke(
        &self,
        site_id: &str,
        method: PluginMethod,
        keyword: Option<&str>,
        site: &SiteDescriptor,
        page: u32,
    ) -> Result<PluginSearch, SpiderError>;

    /// Raw descriptors for sites contributed by plugins.
    fn sites(&self) -> Vec<Value> {
        Vec::new()
    }
}

/// Plugin host with no plugins installed.
#[derive(Debug, Default, Clone)]
pub struct NoPlugins;

#[async_trait]
impl PluginHost for NoPlugins {
    fn has_parser(&self, _site_id: &str) -> bool {
        false
    }

    async fn invoke(
        &self,
        _site_id: &str,
        _method: PluginMethod,
        _keyword: Option<&str>,
        _site: &SiteDescriptor,
        _page: u32,
    ) -> Result<PluginSearch, SpiderError> {
        Ok(PluginSearch::NotFound)
    }
}

/// A page to fetch, with the site's credentials.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRequest {
    pub url: String,
    pub cookie: Option<String>,
    pub ua: Option<String>,
    pub proxy: Option<String>,
}

impl PageRequest {
    /// Request carrying the site's cookie and user agent; the proxy applies only when the site asks.
    pub fn for_site(url: impl Into<String>, site: &SiteDescriptor, proxy: Option<&str>) -> Self {
        Self {
            url: url.into(),
            cookie: site.cookie.clone(),
            ua: site.ua.clone(),
            proxy: if site.proxy {
                proxy.map(str::to_string)
            } else {
                None
            },
        }
    }
}

/// Headless browser used for JS-rendered sites.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    fn available(&self) -> bool;

    /// Load the page, wait `settle` for scripts to finish, and return the DOM as HTML.
    async fn render(&self, request: &PageRequest, settle: Duration)
        -> Result<String, SpiderError>;
}

/// Retrieves raw page bodies for the HTML adapters.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: &PageRequest) -> Result<String, SpiderError>;
}

/// Post-filter applied to non-empty adapter results.
pub trait ResultFilter: Send + Sync {
    fn filter(
        &self,
        order_seq: u32,
        site: &SiteDescriptor,
        records: Vec<TorrentRecord>,
        filters: &FilterArgs,
        media: Option<&MediaHint>,
    ) -> Vec<TorrentRecord>;
}
