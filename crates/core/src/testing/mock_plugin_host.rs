//! Mock plugin host for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::searcher::{PluginHost, PluginMethod, PluginSearch, SpiderError, TorrentRecord};
use crate::site::SiteDescriptor;

#[derive(Debug, Clone, Default)]
enum Behavior {
    #[default]
    NotFound,
    Found(Vec<TorrentRecord>),
    Fail(SpiderError),
    Panic,
}

/// Mock implementation of [`PluginHost`].
///
/// Counts every `invoke`, which doubles as the adapter call count for
/// plugin-served sites.
#[derive(Debug, Default)]
pub struct MockPluginHost {
    parsers: HashSet<String>,
    behavior: Behavior,
    sites: Vec<Value>,
    invocations: AtomicUsize,
}

impl MockPluginHost {
    /// A host with no parsers installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// A host with a parser for `parser` that reports `NotFound` until configured.
    pub fn with_parser(parser: &str) -> Self {
        Self::new().and_parser(parser)
    }

    pub fn and_parser(mut self, parser: &str) -> Self {
        self.parsers.insert(parser.to_string());
        self
    }

    pub fn returning(mut self, records: Vec<TorrentRecord>) -> Self {
        self.behavior = Behavior::Found(records);
        self
    }

    pub fn failing(mut self, error: SpiderError) -> Self {
        self.behavior = Behavior::Fail(error);
        self
    }

    /// Panic inside `invoke`.
    pub fn panicking(mut self) -> Self {
        self.behavior = Behavior::Panic;
        self
    }

    /// Raw descriptors returned by `sites()`.
    pub fn with_sites(mut self, sites: Vec<Value>) -> Self {
        self.sites = sites;
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginHost for MockPluginHost {
    fn has_parser(&self, site_id: &str) -> bool {
        self.parsers.contains(site_id)
    }

    async fn invoke(
        &self,
        site_id: &str,
        method: PluginMethod,
        _keyword: Option<&str>,
        _site: &SiteDescriptor,
        _page: u32,
    ) -> Result<PluginSearch, SpiderError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::NotFound => Ok(PluginSearch::NotFound),
            Behavior::Found(records) => Ok(PluginSearch::Found(records.clone())),
            Behavior::Fail(error) => Err(error.clone()),
            Behavior::Panic => panic!("plugin {} crashed during {}", site_id, method.as_str()),
        }
    }

    fn sites(&self) -> Vec<Value> {
        self.sites.clone()
    }
}
