use thiserror::Error;

/// A user-defined site as persisted: the normalized domain plus its raw JSON row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSiteRow {
    pub domain: String,
    pub indexer: String,
}

#[derive(Debug, Error)]
pub enum SiteStoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid site: {0}")]
    InvalidSite(String),

    #[error("No site store configured")]
    NotConfigured,
}

/// Persistence for user-defined sites.
pub trait SiteStore: Send + Sync {
    /// All custom site rows, in insertion order.
    fn custom_sites(&self) -> Result<Vec<CustomSiteRow>, SiteStoreError>;

    /// Insert or replace the row for `row.domain`.
    fn save_custom_site(&self, row: &CustomSiteRow) -> Result<(), SiteStoreError>;

    /// Returns true when a row was removed.
    fn remove_custom_site(&self, domain: &str) -> Result<bool, SiteStoreError>;
}
