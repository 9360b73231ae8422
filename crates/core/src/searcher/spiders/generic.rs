//! Generic HTML adapter.
//!
//! The scrape runs on its own task. The caller waits for it with a timeout;
//! when the timeout fires the task is aborted and joined before returning, so
//! no worker outlives the call.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::html::{build_url, parse_torrents};
use super::{Spider, SpiderKind};
use crate::searcher::traits::{PageFetcher, PageRequest};
use crate::searcher::types::{SpiderError, SpiderQuery, TorrentRecord};
use crate::site::SiteDescriptor;

pub struct GenericSpider {
    site: Arc<SiteDescriptor>,
    fetcher: Arc<dyn PageFetcher>,
    proxy: Option<String>,
    timeout: Duration,
}

impl GenericSpider {
    pub fn new(
        site: Arc<SiteDescriptor>,
        fetcher: Arc<dyn PageFetcher>,
        proxy: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            site,
            fetcher,
            proxy,
            timeout,
        }
    }
}

#[async_trait]
impl Spider for GenericSpider {
    fn kind(&self) -> SpiderKind {
        SpiderKind::Generic
    }

    async fn search(&self, query: &SpiderQuery) -> Result<Vec<TorrentRecord>, SpiderError> {
        let url = build_url(&self.site, query);
        let request = PageRequest::for_site(url, &self.site, self.proxy.as_deref());
        debug!(site = %self.site.name, url = %request.url, "Fetching listing page");

        let site = Arc::clone(&self.site);
        let fetcher = Arc::clone(&self.fetcher);
        let mut worker = tokio::spawn(async move {
            let body = fetcher.fetch(&request).await?;
            parse_torrents(&site, &body)
        });

        match tokio::time::timeout(self.timeout, &mut worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) if join_error.is_panic() => Err(SpiderError::Internal(format!(
                "{} worker panicked",
                self.site.name
            ))),
            Ok(Err(join_error)) => Err(SpiderError::Internal(join_error.to_string())),
            Err(_) => {
                worker.abort();
                // Join so the abort has taken effect before we return
                let _ = worker.await;
                warn!(
                    site = %self.site.name,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Listing worker timed out and was cancelled"
                );
                Err(SpiderError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteOverrides;
    use crate::testing::{fixtures, MockFetcher};
    use std::sync::atomic::Ordering;
    use tokio::time::Instant;

    fn site() -> Arc<SiteDescriptor> {
        Arc::new(
            SiteDescriptor::from_raw(&fixtures::nexus_site_raw(), &SiteOverrides::default())
                .unwrap(),
        )
    }

    fn query() -> SpiderQuery {
        SpiderQuery {
            keyword: Some("earth".to_string()),
            page: 0,
            media_type: None,
        }
    }

    #[tokio::test]
    async fn test_generic_spider_parses_fetched_page() {
        let fetcher = Arc::new(MockFetcher::with_body(fixtures::NEXUS_LISTING_HTML));
        let spider = GenericSpider::new(site(), fetcher.clone(), None, Duration::from_secs(5));

        let records = spider.search(&query()).await.unwrap();
        assert_eq!(records.len(), 2);

        let requests = fetcher.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.contains("search=earth"));
        assert_eq!(requests[0].cookie.as_deref(), Some("uid=1; pass=abc"));
    }

    #[tokio::test]
    async fn test_generic_spider_propagates_fetch_error() {
        let fetcher = Arc::new(MockFetcher::failing(SpiderError::Network(
            "connection reset".to_string(),
        )));
        let spider = GenericSpider::new(site(), fetcher, None, Duration::from_secs(5));

        let err = spider.search(&query()).await.unwrap_err();
        assert!(matches!(err, SpiderError::Network(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_spider_times_out_and_cancels_worker() {
        let fetcher = Arc::new(MockFetcher::never_completes());
        let spider = GenericSpider::new(site(), fetcher.clone(), None, Duration::from_millis(100));

        // The paused clock jumps straight to the deadline once every task is idle
        let started = Instant::now();
        let err = spider.search(&query()).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, SpiderError::Timeout(d) if d == Duration::from_millis(100)));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200));
        // The pending fetch future was dropped by the abort
        assert_eq!(fetcher.started.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.cancelled.load(Ordering::SeqCst), 1);
    }
}
