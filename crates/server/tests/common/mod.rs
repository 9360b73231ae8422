//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! backed by a plugin-served site catalog, so the whole search path runs
//! without any network.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use sitesweep_core::{
    searcher::{RateLimiterPool, SiteRateLimit},
    testing::MockPluginHost,
    Config, Dispatcher, IndexerRegistry, SiteRow, SpiderContext, SqliteSiteStore,
};
use sitesweep_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use sitesweep_core::testing::fixtures;

/// Test fixture for API testing with a mock plugin host.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_search() {
///     let fixture = TestFixture::new();
///     let response = fixture.post("/api/v1/search", json!({"keyword": "dune"})).await;
///     assert_eq!(response.status, StatusCode::OK);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock plugin host serving both catalog sites
    pub plugins: Arc<MockPluginHost>,
    /// Statistics and custom-site store
    pub store: Arc<SqliteSiteStore>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

/// Builtin catalog: two plugin-served sites, beta English only.
pub fn catalog() -> Vec<Value> {
    vec![
        json!({"id": "alpha", "name": "Alpha", "domain": "https://alpha.example/",
               "parser": "PluginA", "pri": 2}),
        json!({"id": "beta", "name": "Beta", "domain": "https://beta.example/",
               "parser": "PluginB", "pri": 1, "language": "en"}),
        json!({"id": "open", "name": "Open", "domain": "https://open.example/",
               "public": true}),
    ]
}

pub fn test_config() -> Config {
    Config {
        sites: vec![
            SiteRow {
                id: Some("1".to_string()),
                url: "https://alpha.example/".to_string(),
                cookie: Some("uid=1; pass=alpha-secret".to_string()),
                rate_limit_rpm: Some(2),
                ..Default::default()
            },
            SiteRow {
                id: Some("2".to_string()),
                url: "https://beta.example/".to_string(),
                api_key: Some("beta-secret".to_string()),
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

impl TestFixture {
    /// Plugins answer every search with two copies of the same movie.
    pub fn new() -> Self {
        Self::with_plugins(
            MockPluginHost::with_parser("PluginA")
                .and_parser("PluginB")
                .returning(vec![
                    fixtures::torrent_record("plugin", "Dune.2021.2160p.UHD", 30),
                    fixtures::torrent_record("plugin", "Dune.2021.1080p.BluRay", 90),
                ]),
        )
    }

    pub fn with_plugins(plugins: MockPluginHost) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteSiteStore::new(&temp_dir.path().join("test.db"))
                .expect("Failed to create site store"),
        );
        let plugins = Arc::new(plugins);
        let config = test_config();

        let registry = Arc::new(IndexerRegistry::with_builtin(catalog(), Some(store.clone())));
        let rate_limiter = Arc::new(RateLimiterPool::new(&SiteRateLimit::from_rows(&config.sites)));
        let dispatcher = Dispatcher::new(
            registry,
            SpiderContext::from_config(&config).with_plugins(plugins.clone()),
        )
        .with_rate_limiter(rate_limiter.clone())
        .with_statistics(store.clone())
        .with_site_rows(config.sites.clone());

        let state = Arc::new(
            AppState::new(
                config,
                "0123456789abcdef0123456789abcdef".to_string(),
                Arc::new(dispatcher),
                Some(store.clone()),
            )
            .with_rate_limits(rate_limiter),
        );

        Self {
            router: create_router(state),
            plugins,
            store,
            temp_dir,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.send(Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse { status, body, text }
    }
}
