//! Named caches and their entries.
//!
//! Mirrors the browser cache-storage model: a set of named caches, each a
//! map from (method, URL) to a stored response. Every single put, match and
//! delete is one statement or one transaction, so concurrent handlers never
//! observe a half-written entry.

use super::connection::CacheStore;
use super::hash::compute_entry_key;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, Transaction};

/// A stored response, keyed by the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub cached_at: String,
}

impl CachedResponse {
    pub fn key(&self) -> String {
        compute_entry_key(&self.method, &self.url)
    }

    /// First header value with the given (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

struct EntryRow {
    url: String,
    method: String,
    status: u16,
    headers_json: String,
    body: Vec<u8>,
    cached_at: String,
}

impl EntryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            url: row.get(0)?,
            method: row.get(1)?,
            status: row.get(2)?,
            headers_json: row.get(3)?,
            body: row.get(4)?,
            cached_at: row.get(5)?,
        })
    }

    fn decode(self) -> Result<CachedResponse, Error> {
        Ok(CachedResponse {
            url: self.url,
            method: self.method,
            status: self.status,
            headers: serde_json::from_str(&self.headers_json)?,
            body: self.body,
            cached_at: self.cached_at,
        })
    }
}

const SELECT_ENTRY: &str = "SELECT url, method, status, headers_json, body, cached_at
     FROM cache_entries WHERE cache_name = ?1 AND key_hash = ?2";

fn ensure_cache(tx: &Transaction<'_>, name: &str) -> Result<(), Error> {
    tx.execute(
        "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
        params![name, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn upsert_entry(tx: &Transaction<'_>, cache: &str, entry: &CachedResponse) -> Result<(), Error> {
    let headers_json = serde_json::to_string(&entry.headers)?;
    tx.execute(
        "INSERT INTO cache_entries (cache_name, key_hash, method, url, status, headers_json, body, cached_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(cache_name, key_hash) DO UPDATE SET
             status = excluded.status,
             headers_json = excluded.headers_json,
             body = excluded.body,
             cached_at = excluded.cached_at",
        params![
            cache,
            entry.key(),
            &entry.method,
            &entry.url,
            entry.status,
            headers_json,
            &entry.body,
            &entry.cached_at,
        ],
    )?;
    Ok(())
}

impl CacheStore {
    /// Open (create if missing) a named cache.
    pub async fn open_cache(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_cache(&tx, &name)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    pub async fn has_cache(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool =
                    conn.query_row("SELECT EXISTS(SELECT 1 FROM caches WHERE name = ?1)", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// All cache names, in creation order.
    pub async fn cache_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY rowid")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a named cache and all of its entries.
    ///
    /// Returns false if no cache had that name.
    pub async fn delete_cache(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM caches WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace one entry, creating the cache if needed.
    pub async fn put_entry(&self, cache: &str, entry: &CachedResponse) -> Result<(), Error> {
        self.put_entries(cache, std::slice::from_ref(entry)).await
    }

    /// Insert or replace several entries in one transaction.
    ///
    /// Either every entry is stored or none is.
    pub async fn put_entries(&self, cache: &str, entries: &[CachedResponse]) -> Result<(), Error> {
        let cache = cache.to_string();
        let entries = entries.to_vec();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_cache(&tx, &cache)?;
                for entry in &entries {
                    upsert_entry(&tx, &cache, entry)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up an entry in one named cache.
    pub async fn match_entry(&self, cache: &str, method: &str, url: &str) -> Result<Option<CachedResponse>, Error> {
        let cache = cache.to_string();
        let key = compute_entry_key(method, url);
        self.conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let row = conn
                    .query_row(SELECT_ENTRY, params![cache, key], EntryRow::from_row)
                    .optional()?;
                row.map(EntryRow::decode).transpose()
            })
            .await
            .map_err(Error::from)
    }

    /// Look up an entry across several caches, in the given order.
    ///
    /// Returns the name of the cache that answered along with the entry.
    pub async fn match_first(
        &self, caches: &[String], method: &str, url: &str,
    ) -> Result<Option<(String, CachedResponse)>, Error> {
        let caches = caches.to_vec();
        let key = compute_entry_key(method, url);
        self.conn
            .call(move |conn| -> Result<Option<(String, CachedResponse)>, Error> {
                let mut stmt = conn.prepare(SELECT_ENTRY)?;
                for cache in caches {
                    let row = stmt
                        .query_row(params![&cache, &key], EntryRow::from_row)
                        .optional()?;
                    if let Some(row) = row {
                        return Ok(Some((cache, row.decode()?)));
                    }
                }
                Ok(None)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one entry. Returns false if it was not present.
    pub async fn delete_entry(&self, cache: &str, method: &str, url: &str) -> Result<bool, Error> {
        let cache = cache.to_string();
        let key = compute_entry_key(method, url);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM cache_entries WHERE cache_name = ?1 AND key_hash = ?2",
                    params![cache, key],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn entry_count(&self, cache: &str) -> Result<u64, Error> {
        let cache = cache.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM cache_entries WHERE cache_name = ?1", params![cache], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// URLs stored in a cache, oldest first.
    pub async fn entry_urls(&self, cache: &str) -> Result<Vec<String>, Error> {
        let cache = cache.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt =
                    conn.prepare("SELECT url FROM cache_entries WHERE cache_name = ?1 ORDER BY cached_at, rowid")?;
                let urls = stmt
                    .query_map(params![cache], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, body: &str) -> CachedResponse {
        CachedResponse {
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            headers: vec![("Content-Type".to_string(), "text/css".to_string())],
            body: body.as_bytes().to_vec(),
            cached_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.put_entry("dynamic-v1", &entry("https://example.com/app.css", "body{}")).await.unwrap();

        let found = store
            .match_entry("dynamic-v1", "GET", "https://example.com/app.css")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.body, b"body{}");
        assert_eq!(found.header("content-type"), Some("text/css"));
        assert!(store.has_cache("dynamic-v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_match_is_scoped_to_cache_and_method() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.put_entry("dynamic-v1", &entry("https://example.com/a", "a")).await.unwrap();

        assert!(store.match_entry("images-v1", "GET", "https://example.com/a").await.unwrap().is_none());
        assert!(store.match_entry("dynamic-v1", "HEAD", "https://example.com/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_entry() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.put_entry("dynamic-v1", &entry("https://example.com/", "old")).await.unwrap();
        store.put_entry("dynamic-v1", &entry("https://example.com/", "new")).await.unwrap();

        let found = store.match_entry("dynamic-v1", "GET", "https://example.com/").await.unwrap().unwrap();
        assert_eq!(found.body, b"new");
        assert_eq!(store.entry_count("dynamic-v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_match_first_respects_order() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.put_entry("dynamic-v1", &entry("https://example.com/", "dynamic")).await.unwrap();
        store.put_entry("static-v1", &entry("https://example.com/", "static")).await.unwrap();

        let order = ["static-v1".to_string(), "dynamic-v1".to_string()];
        let (cache, found) = store.match_first(&order, "GET", "https://example.com/").await.unwrap().unwrap();
        assert_eq!(cache, "static-v1");
        assert_eq!(found.body, b"static");

        let missing = store.match_first(&order, "GET", "https://example.com/other").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_delete_cache_cascades() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.put_entry("static-v0", &entry("https://example.com/", "x")).await.unwrap();
        store.open_cache("static-v1").await.unwrap();

        assert!(store.delete_cache("static-v0").await.unwrap());
        assert!(!store.delete_cache("static-v0").await.unwrap());
        assert_eq!(store.cache_names().await.unwrap(), vec!["static-v1".to_string()]);
        assert_eq!(store.entry_count("static-v0").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_entries_is_atomic() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let entries = vec![entry("https://example.com/", "root"), entry("https://example.com/index.html", "shell")];
        store.put_entries("static-v1", &entries).await.unwrap();

        assert_eq!(store.entry_count("static-v1").await.unwrap(), 2);
        assert_eq!(
            store.entry_urls("static-v1").await.unwrap(),
            vec!["https://example.com/".to_string(), "https://example.com/index.html".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.put_entry("images-v1", &entry("https://example.com/a.png", "png")).await.unwrap();
        assert!(store.delete_entry("images-v1", "GET", "https://example.com/a.png").await.unwrap());
        assert!(!store.delete_entry("images-v1", "GET", "https://example.com/a.png").await.unwrap());
    }
}
