//! Prometheus metrics for core components.
//!
//! Per-site search counts, latency, rate-limit skips and result volume.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Site Search Metrics
// =============================================================================

/// Site searches total by result.
pub static SITE_SEARCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sitesweep_site_searches_total", "Total site searches"),
        &["site", "result"], // result: "success" or an error kind
    )
    .unwrap()
});

/// Site search duration in seconds.
pub static SITE_SEARCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "sitesweep_site_search_duration_seconds",
            "Duration of one site search",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]),
        &["site"],
    )
    .unwrap()
});

/// Searches skipped by the rate limiter.
pub static SITE_RATE_LIMITED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sitesweep_site_rate_limited_total",
            "Site searches skipped by the rate limiter",
        ),
        &["site"],
    )
    .unwrap()
});

/// Records returned per successful site search.
pub static SITE_SEARCH_RESULTS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "sitesweep_site_search_results",
            "Number of records returned per site search",
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SITE_SEARCHES.clone()),
        Box::new(SITE_SEARCH_DURATION.clone()),
        Box::new(SITE_RATE_LIMITED.clone()),
        Box::new(SITE_SEARCH_RESULTS.clone()),
    ]
}
