//! Descriptor-driven HTML listing parser plus page fetchers.
//!
//! A site's `torrents` blob describes its listing table:
//!
//! ```json
//! {
//!   "list": {"selector": "table.torrents > tbody > tr"},
//!   "fields": {
//!     "title": {"selector": "a[href*='details.php']", "attribute": "title"},
//!     "details": {"selector": "a[href*='details.php']", "attribute": "href"},
//!     "size": {"selector": "td:nth-child(5)"},
//!     "downloadvolumefactor": {"case": {"img.pro_free": 0, "*": 1}}
//!   }
//! }
//! ```

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, USER_AGENT};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::searcher::discount::from_factors;
use crate::searcher::traits::{PageFetcher, PageRenderer, PageRequest};
use crate::searcher::types::{SpiderError, SpiderQuery, TorrentRecord};
use crate::site::domain::join_url;
use crate::site::SiteDescriptor;

const DEFAULT_SEARCH_PATH: &str = "torrents.php";

static SIZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([\d.,]+)\s*([KMGTP]i?B|B|bytes)?").expect("static regex")
});

static IMDB_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"tt\d+").expect("static regex"));

/// Parse a human size such as `1.5 GB` or `700 MiB` into bytes.
pub fn parse_size(text: &str) -> u64 {
    let Some(caps) = SIZE.captures(text.trim()) else {
        return 0;
    };
    let number: f64 = caps
        .get(1)
        .map(|m| m.as_str().replace(',', ""))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);
    let unit = caps
        .get(2)
        .map(|m| m.as_str().to_ascii_uppercase())
        .unwrap_or_default();
    let multiplier: f64 = match unit.chars().next() {
        Some('K') => 1024.0,
        Some('M') => 1024.0_f64.powi(2),
        Some('G') => 1024.0_f64.powi(3),
        Some('T') => 1024.0_f64.powi(4),
        Some('P') => 1024.0_f64.powi(5),
        _ => 1.0,
    };
    (number * multiplier) as u64
}

/// First `tt\d+` id in a string, e.g. an IMDb url.
pub fn extract_imdb_id(text: &str) -> Option<String> {
    IMDB_ID.find(text).map(|m| m.as_str().to_string())
}

fn parse_count(text: &str) -> u32 {
    let digits: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | ' '))
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

fn parse_flag(text: &str) -> bool {
    let t = text.trim();
    !t.is_empty() && !matches!(t.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "n")
}

fn substitute(template: &str, keyword: &str, page: u32) -> String {
    template
        .replace("{keyword}", &urlencoding::encode(keyword))
        .replace("{page}", &page.to_string())
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Listing url for a search or browse request.
pub fn build_url(site: &SiteDescriptor, query: &SpiderQuery) -> String {
    let (path, params, page) = match &query.keyword {
        Some(_) => {
            let path = site
                .search
                .pointer("/paths/0/path")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_SEARCH_PATH);
            let params = site.search.get("params").and_then(Value::as_object).cloned();
            let params = params.unwrap_or_else(|| {
                let mut m = Map::new();
                m.insert("search".to_string(), Value::from("{keyword}"));
                m.insert("page".to_string(), Value::from("{page}"));
                m
            });
            (path, params, query.page)
        }
        None => {
            let path = site
                .browse
                .get("path")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_SEARCH_PATH);
            let start = site.browse.get("start").and_then(Value::as_u64).unwrap_or(0) as u32;
            let params = site
                .browse
                .get("params")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_else(|| {
                    let mut m = Map::new();
                    m.insert("page".to_string(), Value::from("{page}"));
                    m
                });
            (path, params, query.page + start)
        }
    };

    let keyword = query.keyword.as_deref().unwrap_or("");
    let mut url = join_url(&site.domain, &substitute(path, keyword, page));
    let query_string: Vec<String> = params
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                urlencoding::encode(k),
                substitute(&value_to_text(v), keyword, page)
            )
        })
        .collect();
    if !query_string.is_empty() {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query_string.join("&"));
    }
    url
}

fn parse_selector(css: &str) -> Result<Selector, SpiderError> {
    Selector::parse(css)
        .map_err(|e| SpiderError::Configuration(format!("invalid selector {:?}: {:?}", css, e)))
}

/// One compiled `torrents.fields.<name>` entry.
struct FieldRule {
    selector: Option<Selector>,
    attribute: Option<String>,
    regex: Option<Regex>,
    default: Option<String>,
    case: Vec<(Option<Selector>, String)>,
}

impl FieldRule {
    fn compile(spec: &Value) -> Result<Self, SpiderError> {
        let selector = match spec.get("selector").and_then(Value::as_str) {
            Some(css) if !css.trim().is_empty() => Some(parse_selector(css)?),
            _ => None,
        };
        let regex = match spec.get("regex").and_then(Value::as_str) {
            Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
                SpiderError::Configuration(format!("invalid regex {:?}: {}", pattern, e))
            })?),
            None => None,
        };

        let mut case = Vec::new();
        let mut fallback = None;
        if let Some(map) = spec.get("case").and_then(Value::as_object) {
            for (key, value) in map {
                if key == "*" {
                    fallback = Some(value_to_text(value));
                } else {
                    case.push((Some(parse_selector(key)?), value_to_text(value)));
                }
            }
        }
        if let Some(value) = fallback {
            case.push((None, value));
        }

        Ok(Self {
            selector,
            attribute: spec
                .get("attribute")
                .and_then(Value::as_str)
                .map(str::to_string),
            regex,
            default: spec.get("default").map(value_to_text),
            case,
        })
    }

    fn extract(&self, row: ElementRef<'_>) -> Option<String> {
        if !self.case.is_empty() {
            return self
                .case
                .iter()
                .find(|(sel, _)| match sel {
                    Some(sel) => row.select(sel).next().is_some(),
                    None => true,
                })
                .map(|(_, value)| value.clone())
                .or_else(|| self.default.clone());
        }

        let element = match &self.selector {
            Some(sel) => row.select(sel).next(),
            None => Some(row),
        };
        let raw = element.and_then(|el| match &self.attribute {
            Some(attr) => el.value().attr(attr).map(str::to_string),
            None => Some(el.text().collect::<Vec<_>>().join(" ")),
        });
        let raw = raw
            .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|s| !s.is_empty());

        let value = match (&self.regex, raw) {
            (Some(re), Some(text)) => re.captures(&text).and_then(|caps| {
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string())
            }),
            (None, raw) => raw,
            (Some(_), None) => None,
        };
        value.or_else(|| self.default.clone())
    }
}

fn field<'a>(values: &'a Map<String, Value>, key: &str) -> &'a str {
    values.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Parse a listing page according to the site's `torrents` blob.
///
/// Rows without a title are skipped.
pub fn parse_torrents(site: &SiteDescriptor, html: &str) -> Result<Vec<TorrentRecord>, SpiderError> {
    let list_css = site
        .torrents
        .pointer("/list/selector")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            SpiderError::Configuration(format!("{} has no torrents.list.selector", site.name))
        })?;
    let list = parse_selector(list_css)?;

    let mut rules = Vec::new();
    if let Some(fields) = site.torrents.get("fields").and_then(Value::as_object) {
        for (name, spec) in fields {
            rules.push((name.as_str(), FieldRule::compile(spec)?));
        }
    }

    let document = Html::parse_document(html);
    let mut records = Vec::new();

    for row in document.select(&list) {
        let mut values: Map<String, Value> = Map::new();
        for (name, rule) in &rules {
            if let Some(value) = rule.extract(row) {
                values.insert((*name).to_string(), Value::String(value));
            }
        }
        let text = |key: &str| field(&values, key).to_string();

        let title = text("title");
        if title.trim().is_empty() {
            continue;
        }

        let mut record = TorrentRecord::new(site.id.clone(), title.trim());
        record.indexer_name = site.name.clone();
        record.description = text("description");
        record.enclosure = join_url(&site.domain, &text("download"));
        record.page_url = join_url(&site.domain, &text("details"));
        record.size = parse_size(&text("size"));
        record.seeders = parse_count(&text("seeders"));
        record.peers = parse_count(&text("leechers"));
        record.grabs = parse_count(&text("grabs"));
        record.pubdate = Some(text("date_added")).filter(|d| !d.is_empty());
        record.imdbid = extract_imdb_id(&text("imdbid"));
        record.hr = parse_flag(&text("hr"));

        let down = text("downloadvolumefactor").trim().parse::<f64>().unwrap_or(1.0);
        let up = text("uploadvolumefactor").trim().parse::<f64>().unwrap_or(1.0);
        record.apply_promotion(from_factors(down, up));

        records.push(record);
    }

    debug!(site = %site.name, records = records.len(), "Parsed listing page");
    Ok(records)
}

/// Fetches pages over HTTP with the site's cookie and user agent.
pub struct HttpFetcher {
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn client(&self, proxy: Option<&str>) -> Result<Client, SpiderError> {
        let mut builder = Client::builder().timeout(self.timeout).cookie_store(true);
        if let Some(url) = proxy {
            let proxy = reqwest::Proxy::all(url)
                .map_err(|e| SpiderError::Configuration(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| SpiderError::Internal(format!("failed to build HTTP client: {}", e)))
    }
}

pub(crate) fn request_headers(request: &PageRequest) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = request.cookie.as_deref().and_then(|c| HeaderValue::from_str(c).ok()) {
        headers.insert(COOKIE, cookie);
    }
    if let Some(ua) = request.ua.as_deref().and_then(|u| HeaderValue::from_str(u).ok()) {
        headers.insert(USER_AGENT, ua);
    }
    headers
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, request: &PageRequest) -> Result<String, SpiderError> {
        let client = self.client(request.proxy.as_deref())?;
        let response = client
            .get(&request.url)
            .headers(request_headers(request))
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
            return Err(SpiderError::Network(format!("HTTP {} for {}", status, request.url)));
        }
        response.text().await.map_err(SpiderError::from)
    }
}

/// Fetches pages through the headless renderer.
pub struct RenderFetcher {
    renderer: Arc<dyn PageRenderer>,
    settle: Duration,
}

impl RenderFetcher {
    pub fn new(renderer: Arc<dyn PageRenderer>, settle: Duration) -> Self {
        Self { renderer, settle }
    }
}

#[async_trait]
impl PageFetcher for RenderFetcher {
    async fn fetch(&self, request: &PageRequest) -> Result<String, SpiderError> {
        if !self.renderer.available() {
            return Err(SpiderError::Configuration(
                "headless renderer is not available".to_string(),
            ));
        }
        self.renderer.render(request, self.settle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteOverrides;
    use crate::testing::fixtures;
    use serde_json::json;

    fn nexus_site() -> SiteDescriptor {
        SiteDescriptor::from_raw(&fixtures::nexus_site_raw(), &SiteOverrides::default()).unwrap()
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1.5 GB"), 1_610_612_736);
        assert_eq!(parse_size("700 MiB"), 734_003_200);
        assert_eq!(parse_size("1,024 KB"), 1_048_576);
        assert_eq!(parse_size("512"), 512);
        assert_eq!(parse_size("n/a"), 0);
    }

    #[test]
    fn test_extract_imdb_id() {
        assert_eq!(
            extract_imdb_id("https://www.imdb.com/title/tt0111161/").as_deref(),
            Some("tt0111161")
        );
        assert_eq!(extract_imdb_id("none"), None);
    }

    #[test]
    fn test_build_search_url_substitutes_keyword_and_page() {
        let site = nexus_site();
        let url = build_url(
            &site,
            &SpiderQuery {
                keyword: Some("流浪 地球".to_string()),
                page: 2,
                media_type: None,
            },
        );
        assert!(url.starts_with("https://nexus.example/torrents.php?"));
        assert!(url.contains("search=%E6%B5%81%E6%B5%AA%20%E5%9C%B0%E7%90%83"));
        assert!(url.contains("page=2"));
    }

    #[test]
    fn test_build_browse_url_applies_start_offset() {
        let mut site = nexus_site();
        site.browse = json!({"path": "torrents.php?inclbookmarked=0", "start": 1});
        let url = build_url(
            &site,
            &SpiderQuery {
                keyword: None,
                page: 0,
                media_type: None,
            },
        );
        assert_eq!(url, "https://nexus.example/torrents.php?inclbookmarked=0&page=1");
    }

    #[test]
    fn test_parse_torrents_fixture() {
        let site = nexus_site();
        let records = parse_torrents(&site, fixtures::NEXUS_LISTING_HTML).unwrap();

        // The header row has no title and is skipped
        assert_eq!(records.len(), 2);

        let free = &records[0];
        assert_eq!(free.title, "The.Wandering.Earth.2019.1080p.BluRay");
        assert_eq!(free.indexer_id, "nexus");
        assert_eq!(free.page_url, "https://nexus.example/details.php?id=101");
        assert_eq!(free.enclosure, "https://nexus.example/download.php?id=101");
        assert_eq!(free.size, 1_610_612_736);
        assert_eq!(free.seeders, 1234);
        assert_eq!(free.peers, 5);
        assert_eq!(free.grabs, 88);
        assert!(free.free);
        assert_eq!(free.downloadvolumefactor, 0.0);
        assert_eq!(free.uploadvolumefactor, 1.0);
        assert_eq!(free.imdbid.as_deref(), Some("tt7605074"));
        assert!(free.hr);

        let normal = &records[1];
        assert!(!normal.free);
        assert!(!normal.hr);
        assert_eq!(normal.downloadvolumefactor, 1.0);
        assert_eq!(normal.pubdate.as_deref(), Some("2024-01-02 10:00:00"));
    }

    #[test]
    fn test_field_rule_with_selector_and_case_map() {
        let rule = FieldRule::compile(&json!({
            "selector": "td.size",
            "case": {"img.pro_free": 0, "*": 1}
        }))
        .unwrap();
        assert!(rule.selector.is_some());
        assert_eq!(rule.case.len(), 2);

        let html = Html::parse_fragment(
            r#"<table><tr><td class="size">1 GB</td><td><img class="pro_free"></td></tr></table>"#,
        );
        let row = html.select(&Selector::parse("tr").unwrap()).next().unwrap();
        assert_eq!(rule.extract(row).as_deref(), Some("0"));
    }

    #[test]
    fn test_parse_torrents_requires_list_selector() {
        let mut site = nexus_site();
        site.torrents = json!({});
        assert!(matches!(
            parse_torrents(&site, "<html></html>"),
            Err(SpiderError::Configuration(_))
        ));
    }

    #[test]
    fn test_parse_torrents_invalid_selector() {
        let mut site = nexus_site();
        site.torrents = json!({"list": {"selector": "tr[[["}});
        assert!(matches!(
            parse_torrents(&site, "<html></html>"),
            Err(SpiderError::Configuration(_))
        ));
    }
}
