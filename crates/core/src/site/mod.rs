//! Site descriptors and the registry that resolves them.

mod descriptor;
pub mod domain;
mod registry;
mod sqlite;
mod store;

pub use descriptor::{parse_priority, SiteDescriptor, SiteOverrides};
pub use domain::{normalize_domain, url_equal};
pub use registry::{
    decode_builtin_catalog, encode_builtin_catalog, load_builtin_catalog, CatalogSource,
    IndexerRegistry,
};
pub use sqlite::{SqliteSiteStore, StoredStatistic};
pub use store::{CustomSiteRow, SiteStore, SiteStoreError};
