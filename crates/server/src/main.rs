use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sitesweep_core::{
    load_config, searcher::RateLimiterPool, searcher::SiteRateLimit, validate_config, Dispatcher,
    IndexerRegistry, SpiderContext, SqliteSiteStore,
};

use sitesweep_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Config path: first argument, then SITESWEEP_CONFIG, then ./config.toml
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SITESWEEP_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Configured sites: {}", config.sites.len());

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(version = VERSION, config_hash = &config_hash[..16], "Starting sitesweep");

    // SQLite store for custom sites and statistics
    let store = Arc::new(
        SqliteSiteStore::new(&config.database.path).context("Failed to open site store")?,
    );
    info!("Site store initialized");

    let registry = Arc::new(IndexerRegistry::from_file(
        config.registry.builtin_catalog.clone(),
        Some(store.clone()),
    ));
    info!(
        "Site catalog loaded from {:?} ({} entries)",
        config.registry.builtin_catalog,
        registry.len()
    );

    let rate_limits = SiteRateLimit::from_rows(&config.sites);
    info!("Rate limits configured for {} sites", rate_limits.len());
    let rate_limiter = Arc::new(RateLimiterPool::new(&rate_limits));

    let dispatcher = Dispatcher::new(registry, SpiderContext::from_config(&config))
        .with_rate_limiter(rate_limiter.clone())
        .with_statistics(store.clone())
        .with_site_rows(config.sites.clone())
        .with_allow_space(config.search.allow_space);

    let state = Arc::new(
        AppState::new(config.clone(), config_hash, Arc::new(dispatcher), Some(store))
            .with_rate_limits(rate_limiter),
    );

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
