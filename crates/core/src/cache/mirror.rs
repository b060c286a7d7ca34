//! Local mirror of the last fetched content documents.
//!
//! The mirror is a degraded-mode read path only; the content store stays
//! authoritative.

use super::connection::CacheStore;
use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::OptionalExtension;

/// A mirrored content document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirroredDocument {
    pub endpoint: String,
    pub document: Value,
    pub fetched_at: String,
}

impl CacheStore {
    /// Replace the mirrored copy of an endpoint's document.
    pub async fn put_document(&self, endpoint: &str, document: &Value) -> Result<(), Error> {
        let endpoint = endpoint.to_string();
        let document_json = serde_json::to_string(document)?;
        let fetched_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO content_mirror (endpoint, document_json, fetched_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(endpoint) DO UPDATE SET
                         document_json = excluded.document_json,
                         fetched_at = excluded.fetched_at",
                    params![endpoint, document_json, fetched_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    pub async fn get_document(&self, endpoint: &str) -> Result<Option<MirroredDocument>, Error> {
        let endpoint = endpoint.to_string();
        self.conn
            .call(move |conn| -> Result<Option<MirroredDocument>, Error> {
                let row = conn
                    .query_row(
                        "SELECT endpoint, document_json, fetched_at FROM content_mirror WHERE endpoint = ?1",
                        params![endpoint],
                        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
                    )
                    .optional()?;

                match row {
                    Some((endpoint, json, fetched_at)) => {
                        Ok(Some(MirroredDocument { endpoint, document: serde_json::from_str(&json)?, fetched_at }))
                    }
                    None => Ok(None),
                }
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_and_get_document() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let doc = json!({"shacharit": "06:30", "mincha": "13:15"});
        store.put_document("prayer-times", &doc).await.unwrap();

        let mirrored = store.get_document("prayer-times").await.unwrap().unwrap();
        assert_eq!(mirrored.endpoint, "prayer-times");
        assert_eq!(mirrored.document, doc);
    }

    #[tokio::test]
    async fn test_missing_document() {
        let store = CacheStore::open_in_memory().await.unwrap();
        assert!(store.get_document("footer").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_is_wholesale() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.put_document("events", &json!({"items": [1, 2]})).await.unwrap();
        store.put_document("events", &json!({"items": []})).await.unwrap();

        let mirrored = store.get_document("events").await.unwrap().unwrap();
        assert_eq!(mirrored.document, json!({"items": []}));
    }
}
