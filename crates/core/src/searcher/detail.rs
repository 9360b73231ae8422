//! Per-torrent detail lookups: promotion attributes and download links.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::discount::normalize;
use super::spiders::mteam::{api_domain, api_headers, build_client, Envelope, ItemStatus, SUCCESS};
use super::traits::{PageFetcher, PageRequest};
use super::types::SpiderError;
use crate::site::SiteDescriptor;

static DETAIL_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/detail/(\d+)").expect("valid regex"));

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Torrent id from an M-Team detail page url.
pub fn torrent_id_from_url(url: &str) -> Option<u64> {
    DETAIL_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Digits of `text` up to the first space.
///
/// `"1,234 seeders"` -> 1234, `"seeders: 12 now"` -> 0.
pub fn leading_peer_count(text: &str) -> u32 {
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        }
        if c == ' ' {
            break;
        }
    }
    digits.parse().unwrap_or(0)
}

/// Promotion state read from a torrent's detail page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TorrentAttr {
    pub free: bool,
    #[serde(rename = "2xfree")]
    pub double_free: bool,
    pub hr: bool,
    pub peer_count: u32,
    pub downloadvolumefactor: f64,
    pub uploadvolumefactor: f64,
}

impl Default for TorrentAttr {
    fn default() -> Self {
        Self {
            free: false,
            double_free: false,
            hr: false,
            peer_count: 0,
            downloadvolumefactor: 1.0,
            uploadvolumefactor: 1.0,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct DetailData {
    #[serde(default)]
    status: Option<ItemStatus>,
}

/// Parse a `torrent/detail` response body.
pub fn parse_detail_response(body: &str) -> Result<TorrentAttr, SpiderError> {
    let envelope: Envelope<DetailData> = serde_json::from_str(body)
        .map_err(|e| SpiderError::MalformedResponse(format!("invalid detail response: {}", e)))?;
    if envelope.message.as_deref() != Some(SUCCESS) {
        return Err(SpiderError::MalformedResponse(format!(
            "detail lookup failed: {}",
            envelope.message.unwrap_or_default()
        )));
    }
    let status = envelope.data.and_then(|d| d.status).unwrap_or_default();
    let promotion = normalize(status.discount.as_deref());
    Ok(TorrentAttr {
        free: promotion.free,
        double_free: promotion.double_free,
        hr: false,
        peer_count: status.seeders,
        downloadvolumefactor: promotion.download_factor,
        uploadvolumefactor: promotion.upload_factor,
    })
}

/// Parse a `genDlToken` response body into the download url.
pub fn parse_download_token(body: &str) -> Result<String, SpiderError> {
    let envelope: Envelope<Value> = serde_json::from_str(body)
        .map_err(|e| SpiderError::MalformedResponse(format!("invalid token response: {}", e)))?;
    if envelope.message.as_deref() != Some(SUCCESS) {
        return Err(SpiderError::MalformedResponse(format!(
            "token request failed: {}",
            envelope.message.unwrap_or_default()
        )));
    }
    match envelope.data {
        Some(Value::String(url)) if !url.is_empty() => Ok(url),
        _ => Err(SpiderError::MalformedResponse("token response has no url".to_string())),
    }
}

/// Detail and download-token calls against the M-Team API.
pub struct MTeamDetailClient {
    client: Client,
}

impl MTeamDetailClient {
    pub fn new(timeout: Duration, proxy: Option<&str>) -> Result<Self, SpiderError> {
        Ok(Self {
            client: build_client(timeout, proxy)?,
        })
    }

    async fn post_id(
        &self,
        page_url: &str,
        endpoint: &str,
        api_key: Option<&str>,
        ua: Option<&str>,
    ) -> Result<String, SpiderError> {
        let id = torrent_id_from_url(page_url).ok_or_else(|| {
            SpiderError::Configuration(format!("not a detail page url: {}", page_url))
        })?;
        let api_key = api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SpiderError::Configuration("no api key configured".to_string()))?;
        let api = api_domain(page_url)
            .ok_or_else(|| SpiderError::Configuration(format!("invalid url: {}", page_url)))?;

        let response = self
            .client
            .post(format!("{}/api/torrent/{}", api, endpoint))
            .headers(api_headers(api_key, ua, FORM_CONTENT_TYPE)?)
            .body(format!("id={}", id))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SpiderError::Network(format!("HTTP {}", status)));
        }
        Ok(response.text().await?)
    }

    /// Promotion attributes of one torrent. Any failure yields the default attr.
    pub async fn torrent_attr(
        &self,
        page_url: &str,
        api_key: Option<&str>,
        ua: Option<&str>,
    ) -> TorrentAttr {
        let result = self
            .post_id(page_url, "detail", api_key, ua)
            .await
            .and_then(|body| parse_detail_response(&body));
        match result {
            Ok(attr) => attr,
            Err(e) => {
                warn!(url = %page_url, error = %e, "Torrent detail lookup failed");
                TorrentAttr::default()
            }
        }
    }

    /// Exchange a detail page url for a signed download url.
    pub async fn resolve_enclosure(
        &self,
        page_url: &str,
        api_key: Option<&str>,
        ua: Option<&str>,
    ) -> Result<String, SpiderError> {
        let body = self.post_id(page_url, "genDlToken", api_key, ua).await?;
        let url = parse_download_token(&body)?;
        info!(url = %page_url, "Resolved download link");
        Ok(url)
    }
}

/// Reads promotion markers from an HTML detail page using the descriptor's
/// `detail` selectors (`2xfree`, `free`, `hr`, `peer_count`).
pub struct HtmlDetailInspector {
    fetcher: Arc<dyn PageFetcher>,
    proxy: Option<String>,
}

fn selectors(spec: &Value, key: &str) -> Vec<Selector> {
    let raw: Vec<&str> = match spec.get(key) {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .filter_map(|css| match Selector::parse(css) {
            Ok(selector) => Some(selector),
            Err(e) => {
                warn!(selector = css, error = ?e, "Skipping invalid detail selector");
                None
            }
        })
        .collect()
}

impl HtmlDetailInspector {
    pub fn new(fetcher: Arc<dyn PageFetcher>, proxy: Option<String>) -> Self {
        Self { fetcher, proxy }
    }

    /// Evaluate the descriptor's detail selectors against an already fetched page.
    pub fn inspect(site: &SiteDescriptor, html: &str) -> TorrentAttr {
        let document = Html::parse_document(html);
        let matches = |key: &str| {
            selectors(&site.detail, key)
                .iter()
                .any(|s| document.select(s).next().is_some())
        };

        let mut attr = TorrentAttr::default();
        if matches("2xfree") {
            attr.free = true;
            attr.double_free = true;
            attr.uploadvolumefactor = 2.0;
            attr.downloadvolumefactor = 0.0;
        }
        if matches("free") {
            attr.free = true;
            attr.downloadvolumefactor = 0.0;
        }
        attr.hr = matches("hr");
        for selector in selectors(&site.detail, "peer_count") {
            if let Some(node) = document.select(&selector).next() {
                attr.peer_count = leading_peer_count(&node.text().collect::<String>());
            }
        }
        attr
    }

    pub async fn torrent_attr(&self, page_url: &str, site: &SiteDescriptor) -> TorrentAttr {
        if page_url.is_empty() || !site.detail.is_object() {
            return TorrentAttr::default();
        }
        let request = PageRequest::for_site(page_url, site, self.proxy.as_deref());
        match self.fetcher.fetch(&request).await {
            Ok(html) => Self::inspect(site, &html),
            Err(e) => {
                warn!(site = %site.name, url = %page_url, error = %e, "Detail page fetch failed");
                TorrentAttr::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteOverrides;
    use crate::testing::{fixtures, MockFetcher};
    use serde_json::json;

    #[test]
    fn test_torrent_id_from_url() {
        assert_eq!(
            torrent_id_from_url("https://kp.m-team.cc/detail/770123"),
            Some(770123)
        );
        assert_eq!(torrent_id_from_url("https://kp.m-team.cc/browse"), None);
    }

    #[test]
    fn test_leading_peer_count() {
        assert_eq!(leading_peer_count("1,234 seeders"), 1234);
        assert_eq!(leading_peer_count("12"), 12);
        assert_eq!(leading_peer_count("seeders: 12 now"), 0);
        assert_eq!(leading_peer_count(""), 0);
    }

    #[test]
    fn test_parse_detail_response() {
        let attr = parse_detail_response(fixtures::MTEAM_DETAIL_RESPONSE).unwrap();
        assert!(attr.free);
        assert!(!attr.double_free);
        assert_eq!(attr.peer_count, 88);
        assert_eq!(attr.downloadvolumefactor, 0.0);
        assert_eq!(attr.uploadvolumefactor, 1.0);

        let err = parse_detail_response(r#"{"message": "not found"}"#).unwrap_err();
        assert!(matches!(err, SpiderError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_download_token() {
        let url = parse_download_token(
            r#"{"message": "SUCCESS", "data": "https://api.m-team.cc/api/rss/dl?credential=abc"}"#,
        )
        .unwrap();
        assert_eq!(url, "https://api.m-team.cc/api/rss/dl?credential=abc");
        assert!(parse_download_token(r#"{"message": "SUCCESS", "data": null}"#).is_err());
    }

    #[test]
    fn test_default_attr_is_normal() {
        let attr = TorrentAttr::default();
        assert!(!attr.free && !attr.double_free && !attr.hr);
        assert_eq!(attr.downloadvolumefactor, 1.0);
        let json = serde_json::to_value(&attr).unwrap();
        assert_eq!(json["2xfree"], json!(false));
    }

    fn detail_site() -> SiteDescriptor {
        let mut raw = fixtures::nexus_site_raw();
        raw["detail"] = json!({
            "free": ["h1#top b font.free"],
            "2xfree": "h1#top b font.twoupfree",
            "hr": ["img.hitandrun"],
            "peer_count": ["div#peercount b"]
        });
        SiteDescriptor::from_raw(&raw, &SiteOverrides::default()).unwrap()
    }

    const DETAIL_HTML: &str = r#"<html><body>
        <h1 id="top">Some.Movie <b><font class="free">Free</font></b></h1>
        <img class="hitandrun" src="hr.png">
        <div id="peercount"><b>17 seeders</b> | 2 leechers</div>
    </body></html>"#;

    #[test]
    fn test_inspect_detail_page() {
        let attr = HtmlDetailInspector::inspect(&detail_site(), DETAIL_HTML);
        assert!(attr.free);
        assert!(!attr.double_free);
        assert!(attr.hr);
        assert_eq!(attr.peer_count, 17);
    }

    #[tokio::test]
    async fn test_torrent_attr_fetches_with_cookie() {
        let fetcher = Arc::new(MockFetcher::with_body(DETAIL_HTML));
        let inspector = HtmlDetailInspector::new(fetcher.clone(), None);
        let attr = inspector
            .torrent_attr("https://nexus.example/details.php?id=101", &detail_site())
            .await;
        assert!(attr.free);

        let requests = fetcher.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].cookie.as_deref(), Some("uid=1; pass=abc"));
    }

    #[tokio::test]
    async fn test_torrent_attr_fetch_failure_is_default() {
        let fetcher = Arc::new(MockFetcher::failing(SpiderError::Network("down".to_string())));
        let inspector = HtmlDetailInspector::new(fetcher, None);
        let attr = inspector
            .torrent_attr("https://nexus.example/details.php?id=101", &detail_site())
            .await;
        assert_eq!(attr, TorrentAttr::default());
    }

    #[tokio::test]
    async fn test_mteam_attr_without_key_is_default() {
        let client = MTeamDetailClient::new(Duration::from_secs(1), None).unwrap();
        let attr = client
            .torrent_attr("https://kp.m-team.cc/detail/1", None, None)
            .await;
        assert_eq!(attr, TorrentAttr::default());
        let err = client
            .resolve_enclosure("https://kp.m-team.cc/browse", Some("k"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SpiderError::Configuration(_)));
    }
}
