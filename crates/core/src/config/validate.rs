use super::{types::Config, ConfigError};
use crate::searcher::OrderMode;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Search timeout and page size are positive
/// - Order mode is a known value
/// - Every configured site has a url
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.search.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "search.timeout_secs must be greater than 0".to_string(),
        ));
    }

    if config.search.page_size == 0 {
        return Err(ConfigError::ValidationError(
            "search.page_size must be greater than 0".to_string(),
        ));
    }

    if config.search.order_mode.parse::<OrderMode>().is_err() {
        return Err(ConfigError::ValidationError(format!(
            "search.order_mode must be \"seeder\" or \"priority\", got {:?}",
            config.search.order_mode
        )));
    }

    if let Some(index) = config.sites.iter().position(|s| s.url.trim().is_empty()) {
        return Err(ConfigError::ValidationError(format!(
            "sites[{}].url cannot be empty",
            index
        )));
    }

    Ok(())
}
