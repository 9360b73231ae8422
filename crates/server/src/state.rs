use std::sync::Arc;

use sitesweep_core::{
    searcher::RateLimiterPool, Config, Dispatcher, IndexerRegistry, SanitizedConfig,
    SiteDescriptor, SqliteSiteStore,
};

/// Shared application state
pub struct AppState {
    config: Config,
    config_hash: String,
    dispatcher: Arc<Dispatcher>,
    store: Option<Arc<SqliteSiteStore>>,
    rate_limits: Option<Arc<RateLimiterPool>>,
}

impl AppState {
    pub fn new(
        config: Config,
        config_hash: String,
        dispatcher: Arc<Dispatcher>,
        store: Option<Arc<SqliteSiteStore>>,
    ) -> Self {
        Self {
            config,
            config_hash,
            dispatcher,
            store,
            rate_limits: None,
        }
    }

    /// Expose the dispatcher's token buckets for status reporting.
    pub fn with_rate_limits(mut self, rate_limits: Arc<RateLimiterPool>) -> Self {
        self.rate_limits = Some(rate_limits);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Arc<IndexerRegistry> {
        self.dispatcher.registry()
    }

    /// Statistics store, when a database is configured.
    pub fn store(&self) -> Option<&Arc<SqliteSiteStore>> {
        self.store.as_ref()
    }

    pub fn rate_limits(&self) -> Option<&Arc<RateLimiterPool>> {
        self.rate_limits.as_ref()
    }

    /// Every searchable site: configured rows, then public and plugin sites.
    pub fn indexers(&self) -> Vec<SiteDescriptor> {
        let registry = &self.config.registry;
        let selected = registry.selected_sites.as_deref();
        self.registry().indexers(
            &self.config.sites,
            selected.is_some(),
            selected.unwrap_or_default(),
            registry.show_public_sites,
            self.dispatcher.context().plugins.sites(),
        )
    }
}
