//! Adapter for sites that only produce their listing after running scripts.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::generic::GenericSpider;
use super::html::RenderFetcher;
use super::{Spider, SpiderKind};
use crate::searcher::traits::PageRenderer;
use crate::searcher::types::{SpiderError, SpiderQuery, TorrentRecord};
use crate::site::SiteDescriptor;

/// Generic parsing over a page obtained from the headless renderer.
pub struct RenderSpider {
    inner: GenericSpider,
}

impl RenderSpider {
    pub fn new(
        site: Arc<SiteDescriptor>,
        renderer: Arc<dyn PageRenderer>,
        proxy: Option<String>,
        timeout: Duration,
        settle: Duration,
    ) -> Self {
        let fetcher = Arc::new(RenderFetcher::new(renderer, settle));
        // The settle wait happens inside the worker, so the deadline has to cover it
        let inner = GenericSpider::new(site, fetcher, proxy, timeout + settle);
        Self { inner }
    }
}

#[async_trait]
impl Spider for RenderSpider {
    fn kind(&self) -> SpiderKind {
        SpiderKind::Render
    }

    async fn search(&self, query: &SpiderQuery) -> Result<Vec<TorrentRecord>, SpiderError> {
        self.inner.search(query).await
    }
}
