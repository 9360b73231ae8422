//! TorrentLeech JSON listing adapter.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use tracing::debug;

use super::html::extract_imdb_id;
use super::mteam::lenient_u64;
use super::{Spider, SpiderKind};
use crate::searcher::discount::from_factors;
use crate::searcher::traits::{PageFetcher, PageRequest};
use crate::searcher::types::{SpiderError, SpiderQuery, TorrentRecord};
use crate::site::domain::base_url;
use crate::site::SiteDescriptor;

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default, rename = "torrentList")]
    torrent_list: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default, deserialize_with = "lenient_u64")]
    fid: u64,
    #[serde(default, deserialize_with = "nullable_string")]
    filename: String,
    #[serde(default, deserialize_with = "nullable_string")]
    name: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    size: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    seeders: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    leechers: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    completed: u64,
    #[serde(default, rename = "addedTimestamp")]
    added: Option<String>,
    #[serde(default, rename = "imdbID")]
    imdb_id: Option<String>,
    #[serde(default)]
    download_multiplier: Option<f64>,
}

fn nullable_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn clamp(n: u64) -> u32 {
    n.min(u64::from(u32::MAX)) as u32
}

pub struct TorrentLeechSpider {
    site: SiteDescriptor,
    fetcher: Arc<dyn PageFetcher>,
    proxy: Option<String>,
}

impl TorrentLeechSpider {
    pub fn new(site: SiteDescriptor, fetcher: Arc<dyn PageFetcher>, proxy: Option<String>) -> Self {
        Self {
            site,
            fetcher,
            proxy,
        }
    }

    fn base(&self) -> String {
        base_url(&self.site.domain).unwrap_or_else(|| self.site.domain.clone())
    }

    pub fn listing_url(&self, query: &SpiderQuery) -> String {
        let base = self.base();
        let page = query.page + 1;
        match query.keyword.as_deref().filter(|k| !k.is_empty()) {
            Some(keyword) => format!(
                "{}torrents/browse/list/query/{}/page/{}",
                base,
                urlencoding::encode(keyword),
                page
            ),
            None => format!("{}torrents/browse/list/page/{}", base, page),
        }
    }

    /// Map a `torrentList` body onto records. Rows without a title are skipped.
    pub fn parse_listing(&self, body: &str) -> Result<Vec<TorrentRecord>, SpiderError> {
        let listing: Listing = serde_json::from_str(body)
            .map_err(|e| SpiderError::MalformedResponse(format!("invalid listing: {}", e)))?;
        let base = self.base();

        Ok(listing
            .torrent_list
            .into_iter()
            .filter(|entry| !entry.name.trim().is_empty())
            .map(|entry| {
                let mut record = TorrentRecord::new(self.site.id.clone(), entry.name);
                record.indexer_name = self.site.name.clone();
                record.enclosure = format!("{}download/{}/{}", base, entry.fid, entry.filename);
                record.page_url = format!("{}torrent/{}", base, entry.fid);
                record.size = entry.size;
                record.seeders = clamp(entry.seeders);
                record.peers = clamp(entry.leechers);
                record.grabs = clamp(entry.completed);
                record.pubdate = entry.added;
                record.imdbid = entry.imdb_id.as_deref().and_then(extract_imdb_id);
                let down = entry.download_multiplier.unwrap_or(1.0);
                record.apply_promotion(from_factors(down, 1.0));
                record
            })
            .collect())
    }
}

#[async_trait]
impl Spider for TorrentLeechSpider {
    fn kind(&self) -> SpiderKind {
        SpiderKind::TorrentLeech
    }

    async fn search(&self, query: &SpiderQuery) -> Result<Vec<TorrentRecord>, SpiderError> {
        let request =
            PageRequest::for_site(self.listing_url(query), &self.site, self.proxy.as_deref());
        debug!(site = %self.site.name, url = %request.url, "Fetching listing");
        let body = self.fetcher.fetch(&request).await?;
        self.parse_listing(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteOverrides;
    use crate::testing::MockFetcher;
    use serde_json::json;

    const LISTING: &str = r#"{
        "numFound": 2,
        "torrentList": [
            {"fid": 240001, "filename": "Dune.2021.1080p.torrent", "name": "Dune.2021.1080p.BluRay",
             "size": 10737418240, "seeders": 50, "leechers": 3, "completed": 900,
             "addedTimestamp": "2024-02-01 08:00:00", "imdbID": "tt1160419", "download_multiplier": 0},
            {"fid": "240002", "filename": "Other.torrent", "name": "Other.Show.S01E02",
             "size": "1024", "seeders": "7", "leechers": 0, "completed": 1}
        ]
    }"#;

    #[test]
    fn test_parse_listing_skips_rows_without_title() {
        let spider = spider(Arc::new(MockFetcher::with_body("")));
        let records = spider
            .parse_listing(
                r#"{"torrentList": [
                    {"fid": 1, "filename": null, "name": null},
                    {"fid": 2, "filename": "x.torrent", "name": "  "},
                    {"fid": 3, "filename": "Kept.torrent", "name": "Kept.2020.720p"}
                ]}"#,
            )
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Kept.2020.720p");
    }

    fn spider(fetcher: Arc<dyn PageFetcher>) -> TorrentLeechSpider {
        let site = SiteDescriptor::from_raw(
            &json!({"id": "tl", "name": "TorrentLeech", "domain": "https://www.torrentleech.org/",
                    "parser": "TorrentLeech"}),
            &SiteOverrides {
                cookie: Some("tluid=1".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        TorrentLeechSpider::new(site, fetcher, None)
    }

    #[test]
    fn test_listing_url() {
        let spider = spider(Arc::new(MockFetcher::with_body("")));
        assert_eq!(
            spider.listing_url(&SpiderQuery {
                keyword: Some("the matrix".to_string()),
                page: 0,
                media_type: None,
            }),
            "https://www.torrentleech.org/torrents/browse/list/query/the%20matrix/page/1"
        );
        assert_eq!(
            spider.listing_url(&SpiderQuery {
                keyword: None,
                page: 2,
                media_type: None,
            }),
            "https://www.torrentleech.org/torrents/browse/list/page/3"
        );
    }

    #[tokio::test]
    async fn test_search_maps_listing() {
        let fetcher = Arc::new(MockFetcher::with_body(LISTING));
        let spider = spider(fetcher.clone());
        let records = spider
            .search(&SpiderQuery {
                keyword: Some("dune".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        let dune = &records[0];
        assert_eq!(
            dune.enclosure,
            "https://www.torrentleech.org/download/240001/Dune.2021.1080p.torrent"
        );
        assert_eq!(dune.page_url, "https://www.torrentleech.org/torrent/240001");
        assert_eq!(dune.size, 10_737_418_240);
        assert_eq!(dune.grabs, 900);
        assert_eq!(dune.imdbid.as_deref(), Some("tt1160419"));
        assert!(dune.free);
        assert_eq!(dune.downloadvolumefactor, 0.0);

        let other = &records[1];
        assert_eq!(other.seeders, 7);
        assert_eq!(other.size, 1024);
        assert!(!other.free);
        assert_eq!(other.downloadvolumefactor, 1.0);

        assert_eq!(
            fetcher.requests()[0].cookie.as_deref(),
            Some("tluid=1")
        );
    }

    #[test]
    fn test_parse_listing_rejects_html() {
        let spider = spider(Arc::new(MockFetcher::with_body("")));
        let err = spider.parse_listing("<html>login</html>").unwrap_err();
        assert!(matches!(err, SpiderError::MalformedResponse(_)));
    }
}
