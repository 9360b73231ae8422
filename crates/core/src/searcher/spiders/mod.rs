//! Protocol adapters.
//!
//! Each site speaks one of a handful of protocols. [`SpiderRegistry`] maps a
//! descriptor onto the adapter kind that handles it, and [`SpiderRegistry::build`]
//! constructs a fresh adapter for a single dispatch.

mod generic;
pub mod html;
pub mod mteam;
mod plugin;
mod render;
mod torrentleech;

pub use generic::GenericSpider;
pub use html::{HttpFetcher, RenderFetcher};
pub use mteam::MTeamSpider;
pub use plugin::PluginSpider;
pub use render::RenderSpider;
pub use torrentleech::TorrentLeechSpider;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::traits::{NoPlugins, PageFetcher, PageRenderer, PluginHost};
use super::types::{SpiderError, SpiderQuery, TorrentRecord};
use crate::config::Config;
use crate::site::SiteDescriptor;

/// A protocol adapter bound to one site.
#[async_trait]
pub trait Spider: Send + Sync {
    fn kind(&self) -> SpiderKind;

    async fn search(&self, query: &SpiderQuery) -> Result<Vec<TorrentRecord>, SpiderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpiderKind {
    #[serde(rename = "mteam")]
    MTeam,
    Generic,
    Render,
    #[serde(rename = "torrentleech")]
    TorrentLeech,
    Plugin,
}

impl SpiderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpiderKind::MTeam => "mteam",
            SpiderKind::Generic => "generic",
            SpiderKind::Render => "render",
            SpiderKind::TorrentLeech => "torrentleech",
            SpiderKind::Plugin => "plugin",
        }
    }
}

/// Shared settings and collaborators handed to every adapter.
#[derive(Clone)]
pub struct SpiderContext {
    pub timeout: Duration,
    pub page_size: u32,
    pub render_settle: Duration,
    /// Proxy url, applied only to sites flagged `proxy`.
    pub proxy: Option<String>,
    pub renderer: Option<Arc<dyn PageRenderer>>,
    pub plugins: Arc<dyn PluginHost>,
    /// Replaces the HTTP fetcher for the HTML adapters.
    pub fetcher: Option<Arc<dyn PageFetcher>>,
}

impl Default for SpiderContext {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            page_size: 100,
            render_settle: Duration::from_millis(2000),
            proxy: None,
            renderer: None,
            plugins: Arc::new(NoPlugins),
            fetcher: None,
        }
    }
}

impl SpiderContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(u64::from(config.search.timeout_secs)),
            page_size: config.search.page_size,
            render_settle: Duration::from_millis(config.search.render_settle_ms),
            proxy: config.proxy.as_ref().map(|p| p.url.clone()),
            ..Default::default()
        }
    }

    pub fn with_plugins(mut self, plugins: Arc<dyn PluginHost>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    fn http_fetcher(&self) -> Arc<dyn PageFetcher> {
        match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(HttpFetcher::new(self.timeout)),
        }
    }

    /// The renderer, when one is installed and reports itself usable.
    fn live_renderer(&self) -> Option<Arc<dyn PageRenderer>> {
        self.renderer.as_ref().filter(|r| r.available()).cloned()
    }

    /// Fetcher for a site's pages: rendered when the site asks and a renderer is up.
    pub fn page_fetcher(&self, site: &SiteDescriptor) -> Arc<dyn PageFetcher> {
        match self.live_renderer() {
            Some(renderer) if site.render => {
                Arc::new(RenderFetcher::new(renderer, self.render_settle))
            }
            _ => self.http_fetcher(),
        }
    }
}

/// Maps descriptors onto adapter kinds.
///
/// Precedence: domain fragment, then named parser, then an installed plugin
/// for the site's parser, then the generic HTML adapter.
#[derive(Debug, Clone)]
pub struct SpiderRegistry {
    domain_rules: Vec<(String, SpiderKind)>,
    parser_rules: HashMap<String, SpiderKind>,
}

impl Default for SpiderRegistry {
    fn default() -> Self {
        Self::empty()
            .with_domain_rule("m-team", SpiderKind::MTeam)
            .with_parser_rule("RenderSpider", SpiderKind::Render)
            .with_parser_rule("TorrentLeech", SpiderKind::TorrentLeech)
    }
}

impl SpiderRegistry {
    /// A registry that sends everything to plugins or the generic adapter.
    pub fn empty() -> Self {
        Self {
            domain_rules: Vec::new(),
            parser_rules: HashMap::new(),
        }
    }

    pub fn with_domain_rule(mut self, fragment: impl Into<String>, kind: SpiderKind) -> Self {
        self.domain_rules.push((fragment.into().to_lowercase(), kind));
        self
    }

    pub fn with_parser_rule(mut self, parser: impl Into<String>, kind: SpiderKind) -> Self {
        self.parser_rules.insert(parser.into(), kind);
        self
    }

    pub fn select(&self, site: &SiteDescriptor, plugins: &dyn PluginHost) -> SpiderKind {
        let domain = site.domain.to_lowercase();
        if let Some((_, kind)) = self
            .domain_rules
            .iter()
            .find(|(fragment, _)| domain.contains(fragment.as_str()))
        {
            return *kind;
        }

        let parser = site.parser.as_deref().filter(|p| !p.is_empty());
        if let Some(kind) = parser.and_then(|p| self.parser_rules.get(p)) {
            return *kind;
        }
        if parser.is_some_and(|p| plugins.has_parser(p)) {
            return SpiderKind::Plugin;
        }
        SpiderKind::Generic
    }

    /// Construct a fresh adapter for one dispatch.
    pub fn build(
        &self,
        kind: SpiderKind,
        site: &SiteDescriptor,
        ctx: &SpiderContext,
    ) -> Result<Box<dyn Spider>, SpiderError> {
        let proxy = ctx.proxy.clone();
        let spider: Box<dyn Spider> = match kind {
            SpiderKind::MTeam => Box::new(MTeamSpider::new(
                site.clone(),
                ctx.page_size,
                ctx.timeout,
                proxy.as_deref(),
            )?),
            SpiderKind::TorrentLeech => Box::new(TorrentLeechSpider::new(
                site.clone(),
                ctx.http_fetcher(),
                proxy,
            )),
            SpiderKind::Render => {
                let renderer = ctx.live_renderer().ok_or_else(|| {
                    SpiderError::Configuration(format!(
                        "{} needs a headless renderer but none is available",
                        site.name
                    ))
                })?;
                Box::new(RenderSpider::new(
                    Arc::new(site.clone()),
                    renderer,
                    proxy,
                    ctx.timeout,
                    ctx.render_settle,
                ))
            }
            SpiderKind::Plugin => {
                let fallback = GenericSpider::new(
                    Arc::new(site.clone()),
                    ctx.page_fetcher(site),
                    proxy,
                    ctx.timeout,
                );
                Box::new(PluginSpider::new(
                    site.clone(),
                    Arc::clone(&ctx.plugins),
                    fallback,
                ))
            }
            SpiderKind::Generic => Box::new(GenericSpider::new(
                Arc::new(site.clone()),
                ctx.page_fetcher(site),
                proxy,
                ctx.timeout,
            )),
        };
        Ok(spider)
    }
}
