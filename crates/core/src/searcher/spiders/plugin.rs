use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::generic::GenericSpider;
use super::{Spider, SpiderKind};
use crate::searcher::traits::{PluginHost, PluginMethod, PluginSearch};
use crate::searcher::types::{SpiderError, SpiderQuery, TorrentRecord};
use crate::site::SiteDescriptor;

/// Delegates to the plugin registered for the site's parser.
///
/// A plugin that reports `NotFound` hands the query to the generic adapter.
pub struct PluginSpider {
    site: SiteDescriptor,
    plugins: Arc<dyn PluginHost>,
    fallback: GenericSpider,
}

impl PluginSpider {
    pub fn new(site: SiteDescriptor, plugins: Arc<dyn PluginHost>, fallback: GenericSpider) -> Self {
        Self {
            site,
            plugins,
            fallback,
        }
    }

    fn plugin_id(&self) -> &str {
        self.site.parser.as_deref().unwrap_or(&self.site.id)
    }
}

#[async_trait]
impl Spider for PluginSpider {
    fn kind(&self) -> SpiderKind {
        SpiderKind::Plugin
    }

    async fn search(&self, query: &SpiderQuery) -> Result<Vec<TorrentRecord>, SpiderError> {
        let plugin_id = self.plugin_id();
        let found = self
            .plugins
            .invoke(
                plugin_id,
                PluginMethod::Search,
                query.keyword.as_deref(),
                &self.site,
                query.page,
            )
            .await?;

        match found {
            PluginSearch::Found(records) => Ok(records),
            PluginSearch::NotFound => {
                debug!(site = %self.site.name, plugin = plugin_id, "Plugin has no parser, using generic adapter");
                self.fallback.search(query).await
            }
        }
    }
}
