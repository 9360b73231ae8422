//! Per-site search dispatch.
//!
//! [`Dispatcher::search`] runs one keyword against one site: gates (rate
//! limit, allow-list, language), adapter selection and invocation, statistics,
//! progress, then post-filtering. Every adapter failure ends as a
//! [`SearchOutcome`]; nothing propagates to the caller. Fan-out across sites
//! is the caller's job; the dispatcher is `Send + Sync` and holds no per-call
//! state.

use futures::FutureExt;
use regex_lite::Regex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::detail::{HtmlDetailInspector, MTeamDetailClient, TorrentAttr};
use super::keyword::{is_chinese, sanitize};
use super::rate_limiter::RateLimiterPool;
use super::spiders::{SpiderContext, SpiderKind, SpiderRegistry};
use super::traits::{
    LogProgress, ProgressKey, ProgressSink, RateLimiter, ResultFilter, StatisticsSink,
};
use super::types::{
    ErrorKind, FilterArgs, IndexerStatistic, MediaHint, SearchOutcome, SinkError, SkipReason,
    SpiderError, SpiderQuery, TorrentRecord,
};
use crate::config::SiteRow;
use crate::metrics;
use crate::site::{url_equal, IndexerRegistry, SiteDescriptor, SiteOverrides};

/// Dispatcher id written with every statistic.
pub const ENGINE_ID: &str = "builtin";

/// Statistics sink that drops every sample.
#[derive(Debug, Default, Clone)]
pub struct DiscardStatistics;

impl StatisticsSink for DiscardStatistics {
    fn record(&self, _stat: &IndexerStatistic) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Default post-filter: allow-list, free-only, size range and title patterns.
#[derive(Debug, Default, Clone)]
pub struct BasicResultFilter;

fn compile_pattern(site: &str, pattern: Option<&str>) -> Option<Regex> {
    let pattern = pattern.filter(|p| !p.is_empty())?;
    match Regex::new(&format!("(?i){}", pattern)) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(site = %site, pattern = %pattern, error = %e, "Ignoring invalid title pattern");
            None
        }
    }
}

impl ResultFilter for BasicResultFilter {
    fn filter(
        &self,
        _order_seq: u32,
        site: &SiteDescriptor,
        records: Vec<TorrentRecord>,
        filters: &FilterArgs,
        _media: Option<&MediaHint>,
    ) -> Vec<TorrentRecord> {
        if !filters.sites.is_empty() && !filters.sites.contains(&site.name) {
            return Vec::new();
        }
        let include = compile_pattern(&site.name, filters.include.as_deref());
        let exclude = compile_pattern(&site.name, filters.exclude.as_deref());

        records
            .into_iter()
            .filter(|r| !filters.free_only || r.free)
            .filter(|r| filters.min_size.map_or(true, |min| r.size >= min))
            .filter(|r| filters.max_size.map_or(true, |max| r.size <= max))
            .filter(|r| include.as_ref().map_or(true, |re| re.is_match(&r.title)))
            .filter(|r| exclude.as_ref().map_or(true, |re| !re.is_match(&r.title)))
            .collect()
    }
}

/// Runs single-site searches and browses against the shared registry.
///
/// Collaborators default to no rate limit, discarded statistics, log-only
/// progress and [`BasicResultFilter`]; override them with the `with_*` builders.
pub struct Dispatcher {
    registry: Arc<IndexerRegistry>,
    spiders: SpiderRegistry,
    ctx: SpiderContext,
    rate_limiter: Arc<dyn RateLimiter>,
    statistics: Arc<dyn StatisticsSink>,
    progress: Arc<dyn ProgressSink>,
    filter: Arc<dyn ResultFilter>,
    site_rows: Vec<SiteRow>,
    allow_space: bool,
}

impl Dispatcher {
    pub fn new(registry: Arc<IndexerRegistry>, ctx: SpiderContext) -> Self {
        Self {
            registry,
            spiders: SpiderRegistry::default(),
            ctx,
            rate_limiter: Arc::new(RateLimiterPool::empty()),
            statistics: Arc::new(DiscardStatistics),
            progress: Arc::new(LogProgress),
            filter: Arc::new(BasicResultFilter),
            site_rows: Vec::new(),
            allow_space: true,
        }
    }

    pub fn with_spiders(mut self, spiders: SpiderRegistry) -> Self {
        self.spiders = spiders;
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_statistics(mut self, statistics: Arc<dyn StatisticsSink>) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn ResultFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Configured site rows, used to attach credentials when browsing by url.
    pub fn with_site_rows(mut self, rows: Vec<SiteRow>) -> Self {
        self.site_rows = rows;
        self
    }

    pub fn with_allow_space(mut self, allow_space: bool) -> Self {
        self.allow_space = allow_space;
        self
    }

    pub fn registry(&self) -> &Arc<IndexerRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &SpiderContext {
        &self.ctx
    }

    /// Adapter kind that would serve this site.
    pub fn spider_kind(&self, site: &SiteDescriptor) -> SpiderKind {
        self.spiders.select(site, self.ctx.plugins.as_ref())
    }

    /// Search one site for `keyword`.
    pub async fn search(
        &self,
        order_seq: u32,
        site: Option<&SiteDescriptor>,
        keyword: &str,
        filters: Option<&FilterArgs>,
        media: Option<&MediaHint>,
    ) -> SearchOutcome {
        let Some(site) = site else {
            return SearchOutcome::skipped(SkipReason::MissingInput);
        };
        if keyword.trim().is_empty() {
            return SearchOutcome::skipped(SkipReason::MissingInput);
        }

        if !self.rate_limiter.allowed(site.limiter_key()).await {
            metrics::SITE_RATE_LIMITED
                .with_label_values(&[site.name.as_str()])
                .inc();
            self.progress.update(
                ProgressKey::Search,
                &format!("{} rate-limited, skipped", site.name),
            );
            return SearchOutcome::skipped(SkipReason::RateLimited);
        }

        let mut filters = filters.cloned().unwrap_or_default();
        if !filters.sites.is_empty() && !filters.sites.contains(&site.name) {
            return SearchOutcome::skipped(SkipReason::NotSelected);
        }
        if filters.rule.as_deref().map_or(true, str::is_empty) {
            filters.rule = site.rule.clone();
        }

        info!(site = %site.name, order_seq, "Searching site");
        let keyword = sanitize(keyword, " ", self.allow_space);
        if site.language.as_deref() == Some("en") && is_chinese(&keyword) {
            warn!(site = %site.name, keyword = %keyword, "Site does not accept Chinese keywords");
            return SearchOutcome::skipped(SkipReason::Language);
        }

        let query = SpiderQuery {
            keyword: Some(keyword),
            page: 0,
            media_type: media.filter(|m| m.tmdb_matched).map(|m| m.media_type),
        };
        let records = match self.invoke(site, &query).await {
            Ok(records) => records,
            Err(e) => {
                self.report_empty(site);
                return SearchOutcome::failed(e.kind());
            }
        };

        if records.is_empty() {
            self.report_empty(site);
            return SearchOutcome::completed(records);
        }

        info!(site = %site.name, results = records.len(), "Site returned results");
        self.progress.update(
            ProgressKey::Search,
            &format!("{} returned {} results", site.name, records.len()),
        );
        let filtered = self
            .filter
            .filter(order_seq, site, records, &filters, media);
        SearchOutcome::completed(filtered)
    }

    /// Page through a site's listing. No rate limit, allow-list or language gate.
    pub async fn browse(
        &self,
        site: &SiteDescriptor,
        page: u32,
        keyword: Option<&str>,
    ) -> SearchOutcome {
        let query = SpiderQuery {
            keyword: keyword.filter(|k| !k.trim().is_empty()).map(str::to_string),
            page,
            media_type: None,
        };
        match self.invoke(site, &query).await {
            Ok(records) => SearchOutcome::completed(records),
            Err(e) => SearchOutcome::failed(e.kind()),
        }
    }

    /// [`browse`](Self::browse) a site identified by any url on it.
    pub async fn browse_url(&self, url: &str, page: u32, keyword: Option<&str>) -> SearchOutcome {
        if url.trim().is_empty() {
            return SearchOutcome::skipped(SkipReason::MissingInput);
        }
        match self.resolve_site(url) {
            Some(site) => self.browse(&site, page, keyword).await,
            None => {
                warn!(url = %url, "No site matches url");
                SearchOutcome::skipped(SkipReason::MissingInput)
            }
        }
    }

    /// Promotion attributes of one torrent, read from its detail page.
    ///
    /// `None` when no site matches the url. Lookup failures yield the default attr.
    pub async fn torrent_attr(&self, page_url: &str) -> Option<TorrentAttr> {
        let site = self.resolve_site(page_url)?;
        let proxy = self.site_proxy(&site);
        let attr = match self.spider_kind(&site) {
            SpiderKind::MTeam => match MTeamDetailClient::new(self.ctx.timeout, proxy) {
                Ok(client) => {
                    client
                        .torrent_attr(page_url, site.api_key.as_deref(), site.ua.as_deref())
                        .await
                }
                Err(e) => {
                    warn!(site = %site.name, error = %e, "Detail client unavailable");
                    TorrentAttr::default()
                }
            },
            _ => {
                HtmlDetailInspector::new(self.ctx.page_fetcher(&site), proxy.map(str::to_string))
                    .torrent_attr(page_url, &site)
                    .await
            }
        };
        Some(attr)
    }

    /// Signed download url for a torrent on a site with a download-token API.
    pub async fn resolve_enclosure(&self, page_url: &str) -> Result<String, SpiderError> {
        let site = self.resolve_site(page_url).ok_or_else(|| {
            SpiderError::Configuration(format!("no site matches {}", page_url))
        })?;
        if self.spider_kind(&site) != SpiderKind::MTeam {
            return Err(SpiderError::Configuration(format!(
                "{} has no download token api",
                site.name
            )));
        }
        MTeamDetailClient::new(self.ctx.timeout, self.site_proxy(&site))?
            .resolve_enclosure(page_url, site.api_key.as_deref(), site.ua.as_deref())
            .await
    }

    fn site_proxy(&self, site: &SiteDescriptor) -> Option<&str> {
        self.ctx.proxy.as_deref().filter(|_| site.proxy)
    }

    /// Configured sites first so credentials apply, then the bare catalog entry.
    fn resolve_site(&self, url: &str) -> Option<SiteDescriptor> {
        self.registry
            .indexers(&self.site_rows, false, &[], false, Vec::new())
            .into_iter()
            .find(|site| url_equal(&site.domain, url))
            .or_else(|| self.registry.resolve_by_domain(url, &SiteOverrides::default()))
    }

    /// Select, build and run the adapter; always record a statistic.
    ///
    /// Returned records carry the site's name and priority.
    async fn invoke(
        &self,
        site: &SiteDescriptor,
        query: &SpiderQuery,
    ) -> Result<Vec<TorrentRecord>, SpiderError> {
        let started = Instant::now();
        let kind = self.spider_kind(site);

        let result = match self.spiders.build(kind, site, &self.ctx) {
            Ok(spider) => AssertUnwindSafe(spider.search(query))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!(site = %site.name, spider = kind.as_str(), "Adapter panicked");
                    Err(SpiderError::Internal(format!("{} adapter panicked", kind.as_str())))
                }),
            Err(e) => Err(e),
        };

        let elapsed = started.elapsed().as_secs_f64();
        let error_kind = result.as_ref().err().map(SpiderError::kind);
        if let Err(e) = &result {
            warn!(site = %site.name, spider = kind.as_str(), error = %e, "Site search failed");
        }
        self.record_statistic(site, elapsed, error_kind);
        let records = result.as_ref().map_or(0, Vec::len);
        self.observe(site, elapsed, error_kind, records);
        result.map(|records| {
            records
                .into_iter()
                .map(|mut r| {
                    r.indexer_name = site.name.clone();
                    r.site_priority = site.priority;
                    r
                })
                .collect()
        })
    }

    fn record_statistic(&self, site: &SiteDescriptor, seconds: f64, error_kind: Option<ErrorKind>) {
        let stat = IndexerStatistic {
            indexer: site.name.clone(),
            engine: ENGINE_ID.to_string(),
            seconds: (seconds * 10.0).round() / 10.0,
            success: error_kind.is_none(),
            error_kind,
        };
        if let Err(e) = self.statistics.record(&stat) {
            warn!(site = %site.name, error = %e, "Failed to record search statistic");
        }
    }

    fn observe(&self, site: &SiteDescriptor, seconds: f64, error_kind: Option<ErrorKind>, records: usize) {
        let result = error_kind.map_or("success", |k| k.as_str());
        metrics::SITE_SEARCHES
            .with_label_values(&[site.name.as_str(), result])
            .inc();
        metrics::SITE_SEARCH_DURATION
            .with_label_values(&[site.name.as_str()])
            .observe(seconds);
        if error_kind.is_none() {
            metrics::SITE_SEARCH_RESULTS
                .with_label_values(&[])
                .observe(records as f64);
        }
    }

    fn report_empty(&self, site: &SiteDescriptor) {
        warn!(site = %site.name, "No data found");
        self.progress
            .update(ProgressKey::Search, &format!("{} no data found", site.name));
    }
}
