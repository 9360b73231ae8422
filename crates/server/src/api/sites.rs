//! Site catalog API handlers.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use sitesweep_core::{
    searcher::{ErrorKind, OutcomeStatus, RateLimitStatus, SkipReason, SpiderError, SpiderKind, TorrentAttr},
    site::{normalize_domain, SiteStoreError, StoredStatistic},
    SiteDescriptor, TorrentRecord,
};

use super::handlers::{error_response, ErrorResponse};
use crate::state::AppState;

const DEFAULT_STATISTICS_LIMIT: u32 = 100;
const MAX_STATISTICS_LIMIT: u32 = 1000;

type ApiError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// Request/Response types
// ============================================================================

/// Public view of a descriptor. Credentials never leave the server.
#[derive(Debug, Serialize)]
pub struct SiteSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    pub name: String,
    pub domain: String,
    pub public: bool,
    pub priority: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub render: bool,
    pub spider: SpiderKind,
}

impl SiteSummary {
    fn new(site: &SiteDescriptor, spider: SpiderKind) -> Self {
        Self {
            id: site.id.clone(),
            site_id: site.site_id.clone(),
            name: site.name.clone(),
            domain: site.domain.clone(),
            public: site.public,
            priority: site.priority,
            language: site.language.clone(),
            render: site.render,
            spider,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SitesResponse {
    pub sites: Vec<SiteSummary>,
}

#[derive(Debug, Deserialize)]
pub struct BrowseParams {
    pub url: String,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub keyword: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BrowseResponse {
    pub url: String,
    pub page: u32,
    pub outcome: OutcomeStatus,
    pub records: Vec<TorrentRecord>,
}

#[derive(Debug, Deserialize)]
pub struct StatisticsParams {
    #[serde(default)]
    pub indexer: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StatisticsResponse {
    pub statistics: Vec<StoredStatistic>,
}

#[derive(Debug, Serialize)]
pub struct SiteRateLimitStatus {
    pub site_id: String,
    #[serde(flatten)]
    pub status: RateLimitStatus,
}

#[derive(Debug, Serialize)]
pub struct RateLimitsResponse {
    pub sites: Vec<SiteRateLimitStatus>,
}

#[derive(Debug, Deserialize)]
pub struct DetailParams {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub url: String,
    pub attr: TorrentAttr,
}

#[derive(Debug, Deserialize)]
pub struct EnclosureRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct EnclosureResponse {
    pub url: String,
    pub enclosure: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveSiteParams {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct CustomSiteResponse {
    pub domain: String,
    pub removed: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/sites
pub async fn list_sites(State(state): State<Arc<AppState>>) -> Json<SitesResponse> {
    Json(summarize(&state, state.indexers()))
}

/// GET /api/v1/sites/public
pub async fn list_public_sites(State(state): State<Arc<AppState>>) -> Json<SitesResponse> {
    Json(summarize(&state, state.registry().public_sites()))
}

/// GET /api/v1/sites/browse?url=&page=&keyword=
pub async fn browse(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BrowseParams>,
) -> Result<Json<BrowseResponse>, ApiError> {
    if params.url.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "url must not be empty"));
    }

    let outcome = state
        .dispatcher()
        .browse_url(&params.url, params.page, params.keyword.as_deref())
        .await;
    if outcome.status == OutcomeStatus::Skipped(SkipReason::MissingInput) {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            format!("No site matches {}", params.url),
        ));
    }

    Ok(Json(BrowseResponse {
        url: params.url,
        page: params.page,
        outcome: outcome.status,
        records: outcome.records,
    }))
}

/// GET /api/v1/sites/detail?url=
///
/// Promotion attributes read from a torrent's detail page.
pub async fn detail(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DetailParams>,
) -> Result<Json<DetailResponse>, ApiError> {
    if params.url.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "url must not be empty"));
    }
    let attr = state
        .dispatcher()
        .torrent_attr(&params.url)
        .await
        .ok_or_else(|| {
            error_response(StatusCode::NOT_FOUND, format!("No site matches {}", params.url))
        })?;
    Ok(Json(DetailResponse {
        url: params.url,
        attr,
    }))
}

/// POST /api/v1/sites/enclosure
///
/// Exchange a detail page url for a signed download url.
pub async fn enclosure(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnclosureRequest>,
) -> Result<Json<EnclosureResponse>, ApiError> {
    let enclosure = state
        .dispatcher()
        .resolve_enclosure(&request.url)
        .await
        .map_err(spider_error)?;
    Ok(Json(EnclosureResponse {
        url: request.url,
        enclosure,
    }))
}

/// GET /api/v1/sites/statistics?indexer=&limit=
pub async fn statistics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatisticsParams>,
) -> Result<Json<StatisticsResponse>, ApiError> {
    let store = state.store().ok_or_else(|| {
        error_response(StatusCode::SERVICE_UNAVAILABLE, "Statistics store not configured")
    })?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_STATISTICS_LIMIT)
        .min(MAX_STATISTICS_LIMIT);

    let statistics = store
        .statistics(params.indexer.as_deref(), limit)
        .map_err(store_error)?;
    Ok(Json(StatisticsResponse { statistics }))
}

/// GET /api/v1/sites/rate-limits
///
/// Token bucket state for every site with a configured limit.
pub async fn rate_limits(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RateLimitsResponse>, ApiError> {
    let pool = state.rate_limits().ok_or_else(|| {
        error_response(StatusCode::SERVICE_UNAVAILABLE, "Rate limiting not configured")
    })?;
    let mut sites: Vec<SiteRateLimitStatus> = pool
        .all_status()
        .await
        .into_iter()
        .map(|(site_id, status)| SiteRateLimitStatus { site_id, status })
        .collect();
    sites.sort_by(|a, b| a.site_id.cmp(&b.site_id));
    Ok(Json(RateLimitsResponse { sites }))
}

/// POST /api/v1/sites/custom
///
/// Save a user-defined site; it shadows any builtin row with the same domain.
pub async fn save_custom_site(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<Value>,
) -> Result<(StatusCode, Json<CustomSiteResponse>), ApiError> {
    state.registry().save_custom_site(&raw).map_err(store_error)?;
    let domain = raw
        .get("domain")
        .and_then(Value::as_str)
        .and_then(normalize_domain)
        .unwrap_or_default();
    Ok((
        StatusCode::CREATED,
        Json(CustomSiteResponse {
            domain,
            removed: false,
        }),
    ))
}

/// DELETE /api/v1/sites/custom?url=
pub async fn remove_custom_site(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RemoveSiteParams>,
) -> Result<Json<CustomSiteResponse>, ApiError> {
    let removed = state
        .registry()
        .remove_custom_site(&params.url)
        .map_err(store_error)?;
    Ok(Json(CustomSiteResponse {
        domain: normalize_domain(&params.url).unwrap_or_default(),
        removed,
    }))
}

fn summarize(state: &AppState, sites: Vec<SiteDescriptor>) -> SitesResponse {
    let dispatcher = state.dispatcher();
    SitesResponse {
        sites: sites
            .iter()
            .map(|site| SiteSummary::new(site, dispatcher.spider_kind(site)))
            .collect(),
    }
}

fn spider_error(e: SpiderError) -> ApiError {
    match e.kind() {
        ErrorKind::Configuration => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        ErrorKind::Timeout => error_response(StatusCode::GATEWAY_TIMEOUT, e.to_string()),
        _ => {
            warn!(error = %e, "Upstream site request failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

fn store_error(e: SiteStoreError) -> ApiError {
    match e {
        SiteStoreError::InvalidSite(msg) => {
            warn!(error = %msg, "Rejected custom site");
            error_response(StatusCode::BAD_REQUEST, msg)
        }
        SiteStoreError::NotConfigured => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Site store not configured")
        }
        SiteStoreError::Database(msg) => {
            error!(error = %msg, "Site store failure");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, msg)
        }
    }
}
