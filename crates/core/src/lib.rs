pub mod config;
pub mod metrics;
pub mod searcher;
pub mod site;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    SiteRow,
};
pub use searcher::{
    select_best, Dispatcher, FilterArgs, MediaHint, OrderMode, RankCandidate, SearchOutcome,
    SpiderContext, SpiderRegistry, TorrentRecord,
};
pub use site::{IndexerRegistry, SiteDescriptor, SiteOverrides, SqliteSiteStore};
