//! Search API handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::info;

use sitesweep_core::{
    searcher::{OutcomeStatus, SpiderKind},
    select_best, FilterArgs, MediaHint, OrderMode, RankCandidate, SiteDescriptor, TorrentRecord,
};

use super::handlers::{error_response, ErrorResponse};
use crate::state::AppState;

/// Resource-type preference handed to the ranker; one tier for now.
const DEFAULT_RES_ORDER: u32 = 1;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub keyword: String,
    /// Site ids or names to query; every indexer when absent.
    #[serde(default)]
    pub sites: Option<Vec<String>>,
    #[serde(default)]
    pub filters: Option<FilterArgs>,
    #[serde(default)]
    pub media: Option<MediaHint>,
    /// Collapse duplicates across sites to the best copy.
    #[serde(default)]
    pub select_best: bool,
    /// `seeder` or `priority`; defaults to `search.order_mode`.
    #[serde(default)]
    pub order_mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SiteOutcome {
    pub site_id: String,
    pub site_name: String,
    pub spider: SpiderKind,
    pub outcome: OutcomeStatus,
    pub results: usize,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub keyword: String,
    pub sites: Vec<SiteOutcome>,
    pub records: Vec<TorrentRecord>,
    pub ranked: bool,
    pub duration_ms: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/search
///
/// Fan the keyword out to every selected site at once and merge the results.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, Json<ErrorResponse>)> {
    let keyword = body.keyword.trim();
    if keyword.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "keyword must not be empty",
        ));
    }

    let started = Instant::now();
    let sites: Vec<SiteDescriptor> = state
        .indexers()
        .into_iter()
        .filter(|site| is_requested(site, body.sites.as_deref()))
        .collect();
    info!(keyword = %keyword, sites = sites.len(), "Search requested");

    let dispatcher = state.dispatcher();
    let outcomes = join_all(sites.iter().enumerate().map(|(order_seq, site)| {
        dispatcher.search(
            order_seq as u32,
            Some(site),
            keyword,
            body.filters.as_ref(),
            body.media.as_ref(),
        )
    }))
    .await;

    let mut summaries = Vec::with_capacity(sites.len());
    let mut records = Vec::new();
    for (site, outcome) in sites.iter().zip(outcomes) {
        summaries.push(SiteOutcome {
            site_id: site.id.clone(),
            site_name: site.name.clone(),
            spider: dispatcher.spider_kind(site),
            outcome: outcome.status,
            results: outcome.records.len(),
        });
        records.extend(outcome.records);
    }

    let records = if body.select_best {
        let mode = OrderMode::parse_lenient(
            body.order_mode
                .as_deref()
                .unwrap_or(&state.config().search.order_mode),
        );
        rank(records, body.media.as_ref(), mode)
    } else {
        records
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    info!(
        keyword = %keyword,
        results = records.len(),
        duration_ms,
        "Search completed"
    );

    Ok(Json(SearchResponse {
        keyword: keyword.to_string(),
        sites: summaries,
        records,
        ranked: body.select_best,
        duration_ms,
    }))
}

fn is_requested(site: &SiteDescriptor, wanted: Option<&[String]>) -> bool {
    match wanted {
        None => true,
        Some(wanted) => wanted.iter().any(|w| {
            *w == site.id || *w == site.name || site.site_id.as_deref() == Some(w.as_str())
        }),
    }
}

fn rank(records: Vec<TorrentRecord>, media: Option<&MediaHint>, mode: OrderMode) -> Vec<TorrentRecord> {
    let candidates = records
        .into_iter()
        .map(|record| RankCandidate::from_record(record, media, DEFAULT_RES_ORDER))
        .collect();
    select_best(candidates, mode)
        .into_iter()
        .map(|candidate| candidate.record)
        .collect()
}
