//! SQLite-backed custom-site store and statistics sink.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;

use super::store::{CustomSiteRow, SiteStore, SiteStoreError};
use crate::searcher::{IndexerStatistic, SinkError, StatisticsSink};

/// One persisted statistics row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredStatistic {
    pub indexer: String,
    pub engine: String,
    pub seconds: f64,
    /// `Y` on success, `N` on failure.
    pub result: String,
    pub error_kind: Option<String>,
    pub created_at: String,
}

/// SQLite store for user-defined sites and per-site search statistics.
pub struct SqliteSiteStore {
    conn: Mutex<Connection>,
}

impl SqliteSiteStore {
    /// Open (or create) the database file and tables.
    pub fn new(path: &Path) -> Result<Self, SiteStoreError> {
        let conn = Connection::open(path).map_err(|e| SiteStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database (useful for testing).
    pub fn in_memory() -> Result<Self, SiteStoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| SiteStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), SiteStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS custom_sites (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL UNIQUE,
                indexer TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS indexer_statistics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                indexer TEXT NOT NULL,
                engine TEXT NOT NULL,
                seconds REAL NOT NULL,
                result TEXT NOT NULL,
                error_kind TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_indexer_statistics_indexer
                ON indexer_statistics(indexer);
            "#,
        )
        .map_err(|e| SiteStoreError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SiteStoreError> {
        self.conn
            .lock()
            .map_err(|_| SiteStoreError::Database("connection lock poisoned".to_string()))
    }

    /// Most recent statistics first, optionally for one indexer.
    pub fn statistics(
        &self,
        indexer: Option<&str>,
        limit: u32,
    ) -> Result<Vec<StoredStatistic>, SiteStoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT indexer, engine, seconds, result, error_kind, created_at
                 FROM indexer_statistics
                 WHERE (?1 IS NULL OR indexer = ?1)
                 ORDER BY id DESC
                 LIMIT ?2",
            )
            .map_err(|e| SiteStoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![indexer, limit], |row| {
                Ok(StoredStatistic {
                    indexer: row.get(0)?,
                    engine: row.get(1)?,
                    seconds: row.get(2)?,
                    result: row.get(3)?,
                    error_kind: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .map_err(|e| SiteStoreError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| SiteStoreError::Database(e.to_string()))
    }
}

impl SiteStore for SqliteSiteStore {
    fn custom_sites(&self) -> Result<Vec<CustomSiteRow>, SiteStoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT domain, indexer FROM custom_sites ORDER BY seq")
            .map_err(|e| SiteStoreError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CustomSiteRow {
                    domain: row.get(0)?,
                    indexer: row.get(1)?,
                })
            })
            .map_err(|e| SiteStoreError::Database(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| SiteStoreError::Database(e.to_string()))
    }

    fn save_custom_site(&self, row: &CustomSiteRow) -> Result<(), SiteStoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO custom_sites (domain, indexer) VALUES (?1, ?2)
             ON CONFLICT(domain) DO UPDATE SET indexer = excluded.indexer",
            params![row.domain, row.indexer],
        )
        .map_err(|e| SiteStoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn remove_custom_site(&self, domain: &str) -> Result<bool, SiteStoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute("DELETE FROM custom_sites WHERE domain = ?1", params![domain])
            .map_err(|e| SiteStoreError::Database(e.to_string()))?;
        Ok(changed > 0)
    }
}

impl StatisticsSink for SqliteSiteStore {
    fn record(&self, stat: &IndexerStatistic) -> Result<(), SinkError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| SinkError::Storage("connection lock poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO indexer_statistics
                (indexer, engine, seconds, result, error_kind, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                stat.indexer,
                stat.engine,
                stat.seconds,
                if stat.success { "Y" } else { "N" },
                stat.error_kind.map(|k| k.as_str()),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| SinkError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::searcher::ErrorKind;
    use tempfile::TempDir;

    fn row(domain: &str, name: &str) -> CustomSiteRow {
        CustomSiteRow {
            domain: domain.to_string(),
            indexer: format!(r#"{{"id":"{0}","name":"{0}","domain":"https://{1}/"}}"#, name, domain),
        }
    }

    #[test]
    fn test_custom_sites_empty() {
        let store = SqliteSiteStore::in_memory().unwrap();
        assert!(store.custom_sites().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_list_preserves_order() {
        let store = SqliteSiteStore::in_memory().unwrap();
        store.save_custom_site(&row("b.example", "b")).unwrap();
        store.save_custom_site(&row("a.example", "a")).unwrap();

        let sites = store.custom_sites().unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].domain, "b.example");
        assert_eq!(sites[1].domain, "a.example");
    }

    #[test]
    fn test_save_replaces_same_domain() {
        let store = SqliteSiteStore::in_memory().unwrap();
        store.save_custom_site(&row("a.example", "first")).unwrap();
        store.save_custom_site(&row("a.example", "second")).unwrap();

        let sites = store.custom_sites().unwrap();
        assert_eq!(sites.len(), 1);
        assert!(sites[0].indexer.contains("second"));
    }

    #[test]
    fn test_remove_custom_site() {
        let store = SqliteSiteStore::in_memory().unwrap();
        store.save_custom_site(&row("a.example", "a")).unwrap();
        assert!(store.remove_custom_site("a.example").unwrap());
        assert!(!store.remove_custom_site("a.example").unwrap());
        assert!(store.custom_sites().unwrap().is_empty());
    }

    #[test]
    fn test_record_statistics() {
        let store = SqliteSiteStore::in_memory().unwrap();
        store
            .record(&IndexerStatistic {
                indexer: "HDSky".to_string(),
                engine: "builtin".to_string(),
                seconds: 1.5,
                success: true,
                error_kind: None,
            })
            .unwrap();
        store
            .record(&IndexerStatistic {
                indexer: "M-Team".to_string(),
                engine: "builtin".to_string(),
                seconds: 30.0,
                success: false,
                error_kind: Some(ErrorKind::Timeout),
            })
            .unwrap();

        let all = store.statistics(None, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].indexer, "M-Team");
        assert_eq!(all[0].result, "N");
        assert_eq!(all[0].error_kind.as_deref(), Some("timeout"));

        let hdsky = store.statistics(Some("HDSky"), 10).unwrap();
        assert_eq!(hdsky.len(), 1);
        assert_eq!(hdsky[0].result, "Y");
        assert_eq!(hdsky[0].seconds, 1.5);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sites.db");
        {
            let store = SqliteSiteStore::new(&path).unwrap();
            store.save_custom_site(&row("a.example", "a")).unwrap();
        }
        let store = SqliteSiteStore::new(&path).unwrap();
        assert_eq!(store.custom_sites().unwrap().len(), 1);
    }
}
