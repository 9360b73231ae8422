//! Site registry: the packaged builtin catalog merged with user-defined sites.
//!
//! Raw rows are cached behind a lock together with a domain index. A
//! generation counter marks the cache stale; the next lookup reloads custom
//! sites and rebuilds the index. Descriptors are built from the cached rows on
//! every lookup, so per-call overrides never leak into the cache.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::descriptor::{SiteDescriptor, SiteOverrides};
use super::domain::normalize_domain;
use super::store::{CustomSiteRow, SiteStore, SiteStoreError};
use crate::config::SiteRow;

/// Where the builtin catalog comes from.
#[derive(Debug, Clone)]
pub enum CatalogSource {
    /// Base64-encoded `{"indexer": [...]}` document on disk.
    File(PathBuf),
    /// Rows supplied directly, e.g. by tests.
    Inline(Vec<Value>),
}

#[derive(Debug, Clone)]
struct Entry {
    raw: Value,
    builtin: bool,
}

#[derive(Default)]
struct RegistryState {
    builtin: Option<Vec<Value>>,
    /// Last successfully loaded custom rows.
    custom: Vec<Value>,
    loaded_generation: Option<u64>,
    /// Deduplicated rows, custom first.
    entries: Vec<Entry>,
    /// Normalized domain -> position in `entries`.
    index: HashMap<String, usize>,
}

impl RegistryState {
    fn rebuild_index(&mut self) {
        let mut entries = Vec::new();
        let mut index = HashMap::new();

        let custom = self.custom.iter().map(|raw| (raw, false));
        let builtin = self.builtin.iter().flatten().map(|raw| (raw, true));

        for (raw, is_builtin) in custom.chain(builtin) {
            let Some(domain) = raw
                .get("domain")
                .and_then(Value::as_str)
                .and_then(normalize_domain)
            else {
                continue;
            };
            if index.contains_key(&domain) {
                debug!(domain = %domain, builtin = is_builtin, "Duplicate site domain skipped");
                continue;
            }
            index.insert(domain, entries.len());
            entries.push(Entry {
                raw: raw.clone(),
                builtin: is_builtin,
            });
        }

        self.entries = entries;
        self.index = index;
    }
}

/// Decode a base64 builtin catalog. Any failure yields an empty set.
pub fn decode_builtin_catalog(encoded: &str) -> Vec<Value> {
    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = match STANDARD.decode(cleaned.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Builtin site catalog is not valid base64");
            return Vec::new();
        }
    };
    let doc: Value = match serde_json::from_slice(&bytes) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "Builtin site catalog is not valid JSON");
            return Vec::new();
        }
    };
    match doc.get("indexer").and_then(Value::as_array) {
        Some(rows) => rows.clone(),
        None => {
            warn!("Builtin site catalog has no indexer list");
            Vec::new()
        }
    }
}

/// Read and decode the builtin catalog file. Never fails.
pub fn load_builtin_catalog(path: &Path) -> Vec<Value> {
    match std::fs::read_to_string(path) {
        Ok(encoded) => {
            let rows = decode_builtin_catalog(&encoded);
            info!(path = %path.display(), sites = rows.len(), "Loaded builtin site catalog");
            rows
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read builtin site catalog");
            Vec::new()
        }
    }
}

/// Encode rows the way [`decode_builtin_catalog`] expects.
pub fn encode_builtin_catalog(rows: &[Value]) -> String {
    let doc = serde_json::json!({ "indexer": rows });
    STANDARD.encode(doc.to_string())
}

fn is_selected(site: &SiteDescriptor, selected: &[String]) -> bool {
    selected.iter().any(|id| {
        *id == site.id || site.site_id.as_deref() == Some(id.as_str())
    })
}

/// Merged site catalog with domain lookup.
pub struct IndexerRegistry {
    source: CatalogSource,
    store: Option<Arc<dyn SiteStore>>,
    generation: AtomicU64,
    state: RwLock<RegistryState>,
}

impl IndexerRegistry {
    pub fn new(source: CatalogSource, store: Option<Arc<dyn SiteStore>>) -> Self {
        Self {
            source,
            store,
            generation: AtomicU64::new(0),
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Registry over a catalog file.
    pub fn from_file(path: impl Into<PathBuf>, store: Option<Arc<dyn SiteStore>>) -> Self {
        Self::new(CatalogSource::File(path.into()), store)
    }

    /// Registry over in-memory builtin rows.
    pub fn with_builtin(rows: Vec<Value>, store: Option<Arc<dyn SiteStore>>) -> Self {
        Self::new(CatalogSource::Inline(rows), store)
    }

    /// Current cache generation. Bumped by every invalidation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Mark the cache stale; the next lookup reloads custom sites.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop the cached builtin catalog as well.
    pub fn reset(&self) {
        self.state.write().builtin = None;
        self.invalidate();
    }

    /// Builtin catalog rows, loading them if not yet cached.
    pub fn load_builtin_catalog(&self) -> Vec<Value> {
        self.ensure_fresh();
        self.state.read().builtin.clone().unwrap_or_default()
    }

    /// Parse custom rows from the store. Unparseable rows are skipped.
    pub fn load_custom_sites(&self) -> Result<Vec<Value>, SiteStoreError> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        let rows = store.custom_sites()?;
        let mut sites = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_str::<Value>(&row.indexer) {
                Ok(value) if value.is_object() => sites.push(value),
                Ok(_) => warn!(domain = %row.domain, "Custom site row is not an object"),
                Err(e) => warn!(domain = %row.domain, error = %e, "Failed to parse custom site"),
            }
        }
        Ok(sites)
    }

    fn load_builtin_from_source(&self) -> Vec<Value> {
        match &self.source {
            CatalogSource::File(path) => load_builtin_catalog(path),
            CatalogSource::Inline(rows) => rows.clone(),
        }
    }

    fn ensure_fresh(&self) {
        let current = self.generation();
        if self.state.read().loaded_generation == Some(current) {
            return;
        }

        let mut state = self.state.write();
        if state.loaded_generation == Some(current) {
            return;
        }
        if state.builtin.is_none() {
            state.builtin = Some(self.load_builtin_from_source());
        }
        match self.load_custom_sites() {
            Ok(custom) => state.custom = custom,
            Err(e) => warn!(
                error = %e,
                kept = state.custom.len(),
                "Failed to load custom sites, keeping last known list"
            ),
        }
        state.rebuild_index();
        state.loaded_generation = Some(current);
        debug!(generation = current, sites = state.entries.len(), "Site registry rebuilt");
    }

    /// Number of distinct sites known.
    pub fn len(&self) -> usize {
        self.ensure_fresh();
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Descriptor for a url with per-call overrides applied.
    pub fn resolve_by_domain(&self, url: &str, overrides: &SiteOverrides) -> Option<SiteDescriptor> {
        let domain = normalize_domain(url)?;
        self.ensure_fresh();
        let state = self.state.read();
        let entry = &state.entries[*state.index.get(&domain)?];
        let overrides = SiteOverrides {
            builtin: overrides.builtin || entry.builtin,
            ..overrides.clone()
        };
        SiteDescriptor::from_raw(&entry.raw, &overrides)
    }

    /// Builtin sites flagged public.
    pub fn public_sites(&self) -> Vec<SiteDescriptor> {
        self.ensure_fresh();
        let state = self.state.read();
        let overrides = SiteOverrides {
            builtin: true,
            ..Default::default()
        };
        state
            .entries
            .iter()
            .filter(|e| e.builtin)
            .filter_map(|e| SiteDescriptor::from_raw(&e.raw, &overrides))
            .filter(|site| site.public)
            .collect()
    }

    /// Searchable descriptors for the configured rows, public sites and plugin sites.
    ///
    /// Rows without a url, or with neither cookie nor api key, are skipped.
    /// With `check` set, every entry must be named in `selected` by catalog
    /// id or site id, so an empty selection yields nothing. The result has
    /// one descriptor per normalized domain; the first wins.
    pub fn indexers(
        &self,
        rows: &[SiteRow],
        check: bool,
        selected: &[String],
        show_public: bool,
        plugin_sites: Vec<Value>,
    ) -> Vec<SiteDescriptor> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();

        let mut push = |site: SiteDescriptor, result: &mut Vec<SiteDescriptor>| {
            if check && !is_selected(&site, selected) {
                return;
            }
            if let Some(domain) = normalize_domain(&site.domain) {
                if seen.insert(domain) {
                    result.push(site);
                }
            }
        };

        for (position, row) in rows.iter().enumerate() {
            if row.url.trim().is_empty() {
                continue;
            }
            let has_cookie = row.cookie.as_deref().is_some_and(|c| !c.is_empty());
            let has_key = row.api_key.as_deref().is_some_and(|k| !k.is_empty());
            if !has_cookie && !has_key {
                debug!(url = %row.url, "Site has no credentials, skipped");
                continue;
            }
            let site_id = row
                .id
                .clone()
                .unwrap_or_else(|| (position + 1).to_string());
            let overrides = SiteOverrides {
                site_id: Some(site_id),
                name: row.name.clone(),
                cookie: row.cookie.clone(),
                api_key: row.api_key.clone(),
                ua: row.ua.clone(),
                rule: row.rule.clone(),
                proxy: row.proxy.then_some(true),
                render: row.render.then_some(true),
                priority: row.priority,
                ..Default::default()
            };
            match self.resolve_by_domain(&row.url, &overrides) {
                Some(site) => push(site, &mut result),
                None => debug!(url = %row.url, "No catalog entry for site"),
            }
        }

        if show_public {
            for site in self.public_sites() {
                push(site, &mut result);
            }
        }

        for raw in plugin_sites {
            if let Some(site) = SiteDescriptor::from_raw(&raw, &SiteOverrides::default()) {
                push(site, &mut result);
            }
        }

        result
    }

    /// Persist a user-defined site and invalidate the cache.
    pub fn save_custom_site(&self, raw: &Value) -> Result<(), SiteStoreError> {
        let store = self.store.as_ref().ok_or(SiteStoreError::NotConfigured)?;
        let domain = raw
            .get("domain")
            .and_then(Value::as_str)
            .and_then(normalize_domain)
            .ok_or_else(|| SiteStoreError::InvalidSite("missing or invalid domain".to_string()))?;
        store.save_custom_site(&CustomSiteRow {
            domain: domain.clone(),
            indexer: raw.to_string(),
        })?;
        info!(domain = %domain, "Saved custom site");
        self.invalidate();
        Ok(())
    }

    /// Remove a user-defined site by url or domain.
    pub fn remove_custom_site(&self, url: &str) -> Result<bool, SiteStoreError> {
        let store = self.store.as_ref().ok_or(SiteStoreError::NotConfigured)?;
        let domain = normalize_domain(url)
            .ok_or_else(|| SiteStoreError::InvalidSite(format!("invalid domain: {}", url)))?;
        let removed = store.remove_custom_site(&domain)?;
        if removed {
            info!(domain = %domain, "Removed custom site");
            self.invalidate();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SqliteSiteStore;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn builtin_rows() -> Vec<Value> {
        vec![
            json!({"id": "mteam", "name": "M-Team", "domain": "https://kp.m-team.cc/", "public": false}),
            json!({"id": "hdsky", "name": "HDSky", "domain": "https://hdsky.me/", "public": false}),
            json!({"id": "nyaa", "name": "Nyaa", "domain": "https://nyaa.si/", "public": true}),
            json!({"id": "dup", "name": "Dup", "domain": "http://www.HDSKY.me", "public": true}),
        ]
    }

    #[test]
    fn test_decode_builtin_catalog_round_trip() {
        let rows = builtin_rows();
        let decoded = decode_builtin_catalog(&encode_builtin_catalog(&rows));
        assert_eq!(decoded, rows);
    }

    #[test]
    fn test_decode_builtin_catalog_fail_soft() {
        assert!(decode_builtin_catalog("not base64 !!!").is_empty());
        assert!(decode_builtin_catalog(&STANDARD.encode("not json")).is_empty());
        assert!(decode_builtin_catalog(&STANDARD.encode(r#"{"other": []}"#)).is_empty());
    }

    #[test]
    fn test_load_builtin_catalog_missing_file_is_empty() {
        let registry = IndexerRegistry::from_file("/nonexistent/sites.dat", None);
        assert!(registry.load_builtin_catalog().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_builtin_catalog_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", encode_builtin_catalog(&builtin_rows())).unwrap();

        let registry = IndexerRegistry::from_file(file.path(), None);
        assert_eq!(registry.load_builtin_catalog().len(), 4);
        // The www. duplicate collapses onto hdsky.me
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_resolve_by_domain_is_scheme_and_case_insensitive() {
        let registry = IndexerRegistry::with_builtin(builtin_rows(), None);

        let site = registry
            .resolve_by_domain("http://WWW.hdsky.me/torrents.php", &SiteOverrides::default())
            .unwrap();
        assert_eq!(site.id, "hdsky");
        assert!(site.builtin);

        assert!(registry
            .resolve_by_domain("https://unknown.example/", &SiteOverrides::default())
            .is_none());
        assert!(registry
            .resolve_by_domain("", &SiteOverrides::default())
            .is_none());
    }

    #[test]
    fn test_public_sites() {
        let registry = IndexerRegistry::with_builtin(builtin_rows(), None);
        let public: Vec<String> = registry.public_sites().into_iter().map(|s| s.id).collect();
        assert_eq!(public, vec!["nyaa".to_string()]);
    }

    #[test]
    fn test_custom_site_wins_over_builtin() {
        let store = Arc::new(SqliteSiteStore::in_memory().unwrap());
        let registry = IndexerRegistry::with_builtin(builtin_rows(), Some(store));

        registry
            .save_custom_site(&json!({"id": "my-hdsky", "name": "Mine", "domain": "https://hdsky.me/"}))
            .unwrap();

        let site = registry
            .resolve_by_domain("hdsky.me", &SiteOverrides::default())
            .unwrap();
        assert_eq!(site.id, "my-hdsky");
        assert!(!site.builtin);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_invalidate_reloads_custom_sites() {
        let store = Arc::new(SqliteSiteStore::in_memory().unwrap());
        let registry = IndexerRegistry::with_builtin(vec![], Some(store.clone()));
        assert!(registry.is_empty());

        // Written behind the registry's back: invisible until invalidated
        store
            .save_custom_site(&CustomSiteRow {
                domain: "new.example".to_string(),
                indexer: json!({"id": "new", "domain": "https://new.example/"}).to_string(),
            })
            .unwrap();
        assert!(registry.is_empty());

        let before = registry.generation();
        registry.invalidate();
        assert_eq!(registry.generation(), before + 1);
        assert_eq!(registry.len(), 1);

        assert!(registry.remove_custom_site("https://new.example/").unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_bad_custom_rows_are_skipped() {
        let store = Arc::new(SqliteSiteStore::in_memory().unwrap());
        store
            .save_custom_site(&CustomSiteRow {
                domain: "bad.example".to_string(),
                indexer: "{not json".to_string(),
            })
            .unwrap();
        store
            .save_custom_site(&CustomSiteRow {
                domain: "good.example".to_string(),
                indexer: json!({"id": "good", "domain": "https://good.example/"}).to_string(),
            })
            .unwrap();

        let registry = IndexerRegistry::with_builtin(vec![], Some(store));
        assert_eq!(registry.load_custom_sites().unwrap().len(), 1);
        assert!(registry
            .resolve_by_domain("good.example", &SiteOverrides::default())
            .is_some());
    }

    #[test]
    fn test_save_custom_site_requires_store_and_domain() {
        let registry = IndexerRegistry::with_builtin(vec![], None);
        assert!(matches!(
            registry.save_custom_site(&json!({"domain": "https://a.example/"})),
            Err(SiteStoreError::NotConfigured)
        ));

        let store = Arc::new(SqliteSiteStore::in_memory().unwrap());
        let registry = IndexerRegistry::with_builtin(vec![], Some(store));
        assert!(matches!(
            registry.save_custom_site(&json!({"id": "x"})),
            Err(SiteStoreError::InvalidSite(_))
        ));
    }

    #[test]
    fn test_indexers_filters_and_dedups() {
        let registry = IndexerRegistry::with_builtin(builtin_rows(), None);
        let rows = vec![
            SiteRow {
                id: Some("1".to_string()),
                url: "https://kp.m-team.cc/".to_string(),
                api_key: Some("key".to_string()),
                priority: Some(5),
                ..Default::default()
            },
            SiteRow {
                id: Some("2".to_string()),
                url: "https://hdsky.me/".to_string(),
                ..Default::default()
            },
            SiteRow {
                id: Some("3".to_string()),
                url: "https://kp.m-team.cc/".to_string(),
                cookie: Some("c=1".to_string()),
                ..Default::default()
            },
            SiteRow {
                id: Some("4".to_string()),
                url: "https://nyaa.si/".to_string(),
                cookie: Some("c=1".to_string()),
                name: Some("My Nyaa".to_string()),
                ..Default::default()
            },
        ];

        let plugin = vec![json!({"id": "plug", "name": "Plugged", "domain": "https://plugin.example/"})];
        let sites = registry.indexers(&rows, false, &[], true, plugin);
        let ids: Vec<&str> = sites.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["mteam", "nyaa", "plug"]);
        assert_eq!(sites[0].site_id.as_deref(), Some("1"));
        assert_eq!(sites[0].priority, 5);
        // The configured row wins over the public listing of the same site
        assert_eq!(sites[1].name, "My Nyaa");

        let selected = registry.indexers(&rows, true, &["4".to_string()], false, vec![]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "nyaa");
    }

    #[test]
    fn test_indexers_selection_applies_to_public_and_plugin_sites() {
        let registry = IndexerRegistry::with_builtin(builtin_rows(), None);
        let rows = vec![SiteRow {
            id: Some("1".to_string()),
            url: "https://kp.m-team.cc/".to_string(),
            api_key: Some("key".to_string()),
            ..Default::default()
        }];
        let plugin = || vec![json!({"id": "plug", "name": "Plugged", "domain": "https://plugin.example/"})];

        let sites = registry.indexers(&rows, true, &["1".to_string()], true, plugin());
        let ids: Vec<&str> = sites.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["mteam"]);

        // Catalog ids select public and plugin sites too
        let selected = vec!["nyaa".to_string(), "plug".to_string()];
        let sites = registry.indexers(&rows, true, &selected, true, plugin());
        let ids: Vec<&str> = sites.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["nyaa", "plug"]);

        assert!(registry.indexers(&rows, true, &[], true, plugin()).is_empty());
        assert_eq!(registry.indexers(&rows, false, &[], true, plugin()).len(), 3);
    }

    #[test]
    fn test_reset_drops_builtin_cache() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", encode_builtin_catalog(&builtin_rows()[..1])).unwrap();
        let registry = IndexerRegistry::from_file(file.path(), None);
        assert_eq!(registry.len(), 1);

        std::fs::write(file.path(), encode_builtin_catalog(&builtin_rows())).unwrap();
        registry.invalidate();
        assert_eq!(registry.len(), 1);

        registry.reset();
        assert_eq!(registry.len(), 3);
    }
}
