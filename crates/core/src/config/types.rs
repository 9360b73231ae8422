use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    /// Sites the user holds credentials for.
    #[serde(default)]
    pub sites: Vec<SiteRow>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("sitesweep.db")
}

/// Site catalog configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Path to the packaged, base64-encoded builtin site catalog.
    #[serde(default = "default_builtin_catalog")]
    pub builtin_catalog: PathBuf,
    /// Include public builtin sites when listing indexers.
    #[serde(default)]
    pub show_public_sites: bool,
    /// When set, only these site ids are listed, including public and
    /// plugin sites. An empty list lists nothing.
    #[serde(default)]
    pub selected_sites: Option<Vec<String>>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            builtin_catalog: default_builtin_catalog(),
            show_public_sites: false,
            selected_sites: None,
        }
    }
}

fn default_builtin_catalog() -> PathBuf {
    PathBuf::from("sites.dat")
}

/// Search dispatch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Per-site request / worker timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Results requested per page from API sites (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Delay after a headless page load before reading the DOM (default: 2000)
    #[serde(default = "default_render_settle_ms")]
    pub render_settle_ms: u64,
    /// Keep single spaces when sanitizing keywords (default: true)
    #[serde(default = "default_true")]
    pub allow_space: bool,
    /// Ranking order: "seeder" or "priority" (default: "seeder")
    #[serde(default = "default_order_mode")]
    pub order_mode: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            page_size: default_page_size(),
            render_settle_ms: default_render_settle_ms(),
            allow_space: true,
            order_mode: default_order_mode(),
        }
    }
}

fn default_timeout() -> u32 {
    30
}

fn default_page_size() -> u32 {
    100
}

fn default_render_settle_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_order_mode() -> String {
    "seeder".to_string()
}

/// Outbound proxy used by sites flagged `proxy = true`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    pub url: String,
}

/// A configured site the user has credentials for.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SiteRow {
    /// Local row id, used for rate limiting and statistics.
    #[serde(default)]
    pub id: Option<String>,
    /// Sign-in or RSS url; matched against the catalog by domain.
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub ua: Option<String>,
    #[serde(default)]
    pub rule: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub proxy: bool,
    /// Use the headless renderer for this site when available.
    #[serde(default)]
    pub render: bool,
    /// Requests per minute allowed against this site (unset = unlimited).
    #[serde(default)]
    pub rate_limit_rpm: Option<u32>,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub registry: RegistryConfig,
    pub search: SearchConfig,
    pub proxy_configured: bool,
    pub sites: Vec<SanitizedSiteRow>,
}

/// Sanitized site row (cookie and API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSiteRow {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub cookie_configured: bool,
    pub api_key_configured: bool,
    pub priority: i32,
    pub proxy: bool,
    pub render: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_rpm: Option<u32>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            registry: config.registry.clone(),
            search: config.search.clone(),
            proxy_configured: config.proxy.is_some(),
            sites: config
                .sites
                .iter()
                .map(|s| SanitizedSiteRow {
                    url: s.url.clone(),
                    name: s.name.clone(),
                    cookie_configured: s.cookie.as_deref().is_some_and(|c| !c.is_empty()),
                    api_key_configured: s.api_key.as_deref().is_some_and(|k| !k.is_empty()),
                    priority: s.priority.unwrap_or(0),
                    proxy: s.proxy,
                    render: s.render,
                    rate_limit_rpm: s.rate_limit_rpm,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "sitesweep.db");
        assert_eq!(config.registry.builtin_catalog.to_str().unwrap(), "sites.dat");
        assert_eq!(config.search.timeout_secs, 30);
        assert_eq!(config.search.page_size, 100);
        assert!(config.search.allow_space);
        assert_eq!(config.search.order_mode, "seeder");
        assert!(config.proxy.is_none());
        assert!(config.sites.is_empty());
    }

    #[test]
    fn test_deserialize_sites() {
        let toml = r#"
[search]
timeout_secs = 10
order_mode = "priority"

[[sites]]
id = "7"
url = "https://kp.m-team.cc/"
api_key = "secret"
priority = 5
rate_limit_rpm = 6

[[sites]]
url = "https://hdsky.me/"
cookie = "c_secure_uid=1"
render = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.search.timeout_secs, 10);
        assert_eq!(config.search.order_mode, "priority");
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.sites[0].id.as_deref(), Some("7"));
        assert_eq!(config.sites[0].priority, Some(5));
        assert_eq!(config.sites[0].rate_limit_rpm, Some(6));
        assert!(config.sites[1].render);
        assert!(config.sites[1].api_key.is_none());
    }

    #[test]
    fn test_sanitized_config_hides_credentials() {
        let config = Config {
            sites: vec![SiteRow {
                url: "https://kp.m-team.cc/".to_string(),
                api_key: Some("secret-key".to_string()),
                cookie: Some(String::new()),
                ..Default::default()
            }],
            proxy: Some(ProxyConfig {
                url: "http://127.0.0.1:7890".to_string(),
            }),
            ..Default::default()
        };

        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.proxy_configured);
        assert!(sanitized.sites[0].api_key_configured);
        assert!(!sanitized.sites[0].cookie_configured);
        assert_eq!(sanitized.sites[0].priority, 0);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret-key"));
    }
}
