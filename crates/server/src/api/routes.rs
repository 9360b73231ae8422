use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware, search, sites};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Search fan-out
        .route("/search", post(search::search))
        // Site catalog
        .route("/sites", get(sites::list_sites))
        .route("/sites/public", get(sites::list_public_sites))
        .route("/sites/browse", get(sites::browse))
        .route("/sites/detail", get(sites::detail))
        .route("/sites/enclosure", post(sites::enclosure))
        .route("/sites/statistics", get(sites::statistics))
        .route("/sites/rate-limits", get(sites::rate_limits))
        .route(
            "/sites/custom",
            post(sites::save_custom_site).delete(sites::remove_custom_site),
        )
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
