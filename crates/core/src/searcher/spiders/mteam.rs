//! API-key JSON adapter for M-Team style sites.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::html::extract_imdb_id;
use super::{Spider, SpiderKind};
use crate::searcher::discount::normalize;
use crate::searcher::types::{SpiderError, SpiderQuery, TorrentRecord};
use crate::site::domain::base_url;
use crate::site::SiteDescriptor;

pub(crate) const SUCCESS: &str = "SUCCESS";

/// M-Team's API host for a site url: the first host label becomes `api`.
///
/// `https://kp.m-team.cc/` -> `https://api.m-team.cc`
pub fn api_domain(domain: &str) -> Option<String> {
    let base = base_url(domain)?;
    let url = url::Url::parse(&base).ok()?;
    let host = url.host_str()?;
    let labels: Vec<&str> = host.split('.').collect();
    let api_host = if labels.len() >= 3 {
        format!("api.{}", labels[1..].join("."))
    } else {
        format!("api.{}", host)
    };
    Some(format!("https://{}", api_host))
}

pub(crate) fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// Epoch timestamps (seconds, or millis past 1e11) become `%Y-%m-%d %H:%M:%S` UTC.
/// Anything else is already a date string and passes through.
pub fn timestamp_to_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.to_string();
    }
    let Ok(mut secs) = raw.parse::<i64>() else {
        return raw.to_string();
    };
    if secs > 100_000_000_000 {
        secs /= 1000;
    }
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    lenient_u64(d).map(|n| n.min(u32::MAX as u64) as u32)
}

/// `data` is null on most failures; a missing field is also `None`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    data: Vec<SearchItem>,
}

#[allow(non_snake_case)]
#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default, deserialize_with = "lenient_u64")]
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    smallDescr: Option<String>,
    #[serde(default)]
    lastModifiedDate: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    size: u64,
    #[serde(default)]
    imdb: Option<String>,
    #[serde(default)]
    status: Option<ItemStatus>,
}

#[allow(non_snake_case)]
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ItemStatus {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub seeders: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub leechers: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub timesCompleted: u32,
    #[serde(default)]
    pub discount: Option<String>,
}

/// Map a search response body onto records.
///
/// `base` is the site's web base url, used for detail links.
pub fn parse_search_response(
    site: &SiteDescriptor,
    base: &str,
    body: &str,
) -> Result<Vec<TorrentRecord>, SpiderError> {
    let envelope: Envelope<SearchPage> = serde_json::from_str(body)
        .map_err(|e| SpiderError::MalformedResponse(format!("invalid search response: {}", e)))?;

    let message = envelope.message.unwrap_or_default();
    if message != SUCCESS {
        return Err(SpiderError::MalformedResponse(format!(
            "search failed: {}",
            if message.is_empty() { "no message" } else { &message }
        )));
    }

    let base = base.trim_end_matches('/');
    let items = envelope.data.map(|page| page.data).unwrap_or_default();
    let records = items
        .into_iter()
        .map(|item| {
            let status = item.status.unwrap_or_default();
            let mut record =
                TorrentRecord::new(site.id.clone(), item.name.unwrap_or_default());
            record.indexer_name = site.name.clone();
            record.description = item.smallDescr.unwrap_or_default();
            record.pubdate = item.lastModifiedDate.as_deref().map(timestamp_to_date);
            record.size = item.size;
            record.seeders = status.seeders;
            record.peers = status.leechers;
            record.grabs = status.timesCompleted;
            record.page_url = format!("{}/detail/{}", base, item.id);
            record.imdbid = item.imdb.as_deref().and_then(extract_imdb_id);
            record.apply_promotion(normalize(status.discount.as_deref()));
            record
        })
        .collect();
    Ok(records)
}

/// Headers every M-Team API call carries.
pub(crate) fn api_headers(
    api_key: &str,
    ua: Option<&str>,
    content_type: &'static str,
) -> Result<HeaderMap, SpiderError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-api-key",
        HeaderValue::from_str(api_key)
            .map_err(|_| SpiderError::Configuration("api key is not a valid header".to_string()))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(ua) = ua.and_then(|u| HeaderValue::from_str(u).ok()) {
        headers.insert(USER_AGENT, ua);
    }
    Ok(headers)
}

pub(crate) fn build_client(timeout: Duration, proxy: Option<&str>) -> Result<Client, SpiderError> {
    let mut builder = Client::builder().timeout(timeout);
    if let Some(url) = proxy {
        let proxy = reqwest::Proxy::all(url)
            .map_err(|e| SpiderError::Configuration(format!("invalid proxy: {}", e)))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| SpiderError::Internal(format!("failed to build HTTP client: {}", e)))
}

pub struct MTeamSpider {
    site: SiteDescriptor,
    client: Client,
    search_url: String,
    base: String,
    page_size: u32,
    timeout: Duration,
}

impl MTeamSpider {
    pub fn new(
        site: SiteDescriptor,
        page_size: u32,
        timeout: Duration,
        proxy: Option<&str>,
    ) -> Result<Self, SpiderError> {
        let api = api_domain(&site.domain).ok_or_else(|| {
            SpiderError::Configuration(format!("invalid domain: {}", site.domain))
        })?;
        let base = base_url(&site.domain).unwrap_or_else(|| site.domain.clone());
        let proxy = if site.proxy { proxy } else { None };
        Ok(Self {
            client: build_client(timeout, proxy)?,
            search_url: format!("{}/api/torrent/search", api),
            base,
            page_size,
            timeout,
            site,
        })
    }

    /// JSON body for one search page.
    pub fn request_body(&self, query: &SpiderQuery) -> Value {
        json!({
            "pageNumber": query.page + 1,
            "pageSize": self.page_size,
            "keyword": query.keyword.clone().unwrap_or_default(),
            "categories": [],
            "sources": [],
            "standards": [],
            "visible": 1,
            "mode": "normal",
        })
    }
}

#[async_trait]
impl Spider for MTeamSpider {
    fn kind(&self) -> SpiderKind {
        SpiderKind::MTeam
    }

    async fn search(&self, query: &SpiderQuery) -> Result<Vec<TorrentRecord>, SpiderError> {
        let api_key = self
            .site
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                warn!(site = %self.site.name, "No api key configured, cannot search");
                SpiderError::Configuration(format!("{} has no api key", self.site.name))
            })?;

        let headers = api_headers(
            api_key,
            self.site.ua.as_deref(),
            "application/json; charset=utf-8",
        )?;
        debug!(site = %self.site.name, page = query.page, "Searching API");

        let response = self
            .client
            .post(&self.search_url)
            .headers(headers)
            .json(&self.request_body(query))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SpiderError::Timeout(self.timeout)
                } else {
                    SpiderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpiderError::Network(format!("HTTP {}", status)));
        }
        let body = response.text().await.map_err(SpiderError::from)?;
        parse_search_response(&self.site, &self.base, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteOverrides;
    use crate::testing::fixtures;

    fn site() -> SiteDescriptor {
        SiteDescriptor::from_raw(
            &fixtures::mteam_site_raw(),
            &SiteOverrides {
                api_key: Some("key".to_string()),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_api_domain() {
        assert_eq!(
            api_domain("https://kp.m-team.cc/").as_deref(),
            Some("https://api.m-team.cc")
        );
        assert_eq!(
            api_domain("https://m-team.io").as_deref(),
            Some("https://api.m-team.io")
        );
    }

    #[test]
    fn test_timestamp_to_date() {
        assert_eq!(timestamp_to_date("1710936000"), "2024-03-20 12:00:00");
        assert_eq!(timestamp_to_date("1710936000000"), "2024-03-20 12:00:00");
        assert_eq!(timestamp_to_date("2024-03-20 12:00:00"), "2024-03-20 12:00:00");
        assert_eq!(timestamp_to_date(""), "");
    }

    #[test]
    fn test_parse_search_response_without_data_field() {
        let records =
            parse_search_response(&site(), "https://kp.m-team.cc/", r#"{"message": "SUCCESS"}"#)
                .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_request_body() {
        let spider = MTeamSpider::new(site(), 50, Duration::from_secs(30), None).unwrap();
        let body = spider.request_body(&SpiderQuery {
            keyword: Some("Dune".to_string()),
            page: 0,
            media_type: None,
        });
        assert_eq!(
            body,
            json!({
                "pageNumber": 1,
                "pageSize": 50,
                "keyword": "Dune",
                "categories": [],
                "sources": [],
                "standards": [],
                "visible": 1,
                "mode": "normal"
            })
        );
        assert_eq!(spider.search_url, "https://api.m-team.cc/api/torrent/search");
    }

    #[test]
    fn test_parse_search_response_double_free() {
        let records =
            parse_search_response(&site(), "https://kp.m-team.cc/", fixtures::MTEAM_SEARCH_RESPONSE)
                .unwrap();
        assert_eq!(records.len(), 2);

        let r = &records[0];
        assert_eq!(r.title, "Dune.Part.Two.2024.2160p.UHD.BluRay");
        assert_eq!(r.indexer_id, "mteam");
        assert_eq!(r.description, "沙丘2");
        assert_eq!(r.size, 85_899_345_920);
        assert_eq!(r.seeders, 321);
        assert_eq!(r.peers, 12);
        assert_eq!(r.grabs, 4567);
        assert_eq!(r.page_url, "https://kp.m-team.cc/detail/770123");
        assert_eq!(r.imdbid.as_deref(), Some("tt15239678"));
        assert_eq!(r.pubdate.as_deref(), Some("2024-03-20 12:00:00"));
        assert!(r.enclosure.is_empty());
        assert_eq!(r.downloadvolumefactor, 0.0);
        assert_eq!(r.uploadvolumefactor, 2.0);
        assert!(r.free);
        assert!(r.double_free);

        let normal = &records[1];
        assert_eq!(normal.downloadvolumefactor, 1.0);
        assert_eq!(normal.uploadvolumefactor, 1.0);
        assert!(!normal.free);
        assert!(normal.imdbid.is_none());
    }

    #[test]
    fn test_parse_search_response_rejects_failure_message() {
        let body = r#"{"message": "key invalid", "data": null}"#;
        let err = parse_search_response(&site(), "https://kp.m-team.cc/", body).unwrap_err();
        assert!(matches!(err, SpiderError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_search_response_rejects_garbage() {
        let err = parse_search_response(&site(), "https://kp.m-team.cc/", "<html>").unwrap_err();
        assert_eq!(err.kind(), crate::searcher::ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_search_without_api_key_is_configuration_error() {
        let mut site = site();
        site.api_key = None;
        let spider = MTeamSpider::new(site, 100, Duration::from_secs(1), None).unwrap();
        let err = spider
            .search(&SpiderQuery {
                keyword: Some("x".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SpiderError::Configuration(_)));
    }
}
