//! [`KvStore`] — the pluggable persistence contract both C3 and C6 build
//! on, with an in-memory implementation for tests and a `sqlx`-backed one
//! for production, mirroring `vantage::runtimes::Checkpointer`'s own
//! in-memory/SQLite/Postgres split.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use sqlx::PgPool;

use crate::errors::CacheError;

#[derive(Debug, Clone)]
pub struct StoredValue {
    pub json: String,
    pub expires_at: DateTime<Utc>,
}

/// A single table's worth of key/value storage with TTL.
///
/// Lookup is O(1); eviction is lazy on read: an expired entry simply reads
/// back as absent, with an optional [`Self::sweep`] for proactive cleanup.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, table: &str, key: &str) -> Result<Option<String>, CacheError>;
    async fn put(
        &self,
        table: &str,
        key: &str,
        json: &str,
        ttl: Duration,
    ) -> Result<(), CacheError>;
    /// Remove all expired entries in `table`; returns the number removed.
    async fn sweep(&self, table: &str) -> Result<u64, CacheError>;
}

/// In-memory implementation for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    tables: Mutex<FxHashMap<String, FxHashMap<String, StoredValue>>>,
}

impl InMemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<String>, CacheError> {
        let tables = self.tables.lock();
        let Some(entry) = tables.get(table).and_then(|t| t.get(key)) else {
            return Ok(None);
        };
        if entry.expires_at < Utc::now() {
            return Ok(None);
        }
        Ok(Some(entry.json.clone()))
    }

    async fn put(
        &self,
        table: &str,
        key: &str,
        json: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut tables = self.tables.lock();
        tables.entry(table.to_string()).or_default().insert(
            key.to_string(),
            StoredValue {
                json: json.to_string(),
                expires_at: Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default(),
            },
        );
        Ok(())
    }

    async fn sweep(&self, table: &str) -> Result<u64, CacheError> {
        let mut tables = self.tables.lock();
        let Some(entries) = tables.get_mut(table) else {
            return Ok(0);
        };
        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, v| v.expires_at >= now);
        Ok((before - entries.len()) as u64)
    }
}

/// Postgres-backed implementation sharing the `enrichment_sessions` /
/// `stage_cache` table conventions used elsewhere in this crate.
///
/// Table names are restricted to the two callers use (`enrichment_sessions`,
/// `stage_cache`); both are created by `leadgraph/migrations`.
pub struct SqlxKvStore {
    pool: PgPool,
}

impl SqlxKvStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn columns(table: &str) -> (&'static str, &'static str) {
        match table {
            "enrichment_sessions" => ("cache_key", "session_data"),
            "stage_cache" => ("cache_key", "result"),
            _ => ("cache_key", "data"),
        }
    }
}

#[async_trait]
impl KvStore for SqlxKvStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<String>, CacheError> {
        let (key_col, value_col) = Self::columns(table);
        let sql = format!(
            "SELECT {value_col}::text AS value FROM {table} WHERE {key_col} = $1 AND expires_at > now()"
        );
        let row: Option<(String,)> = sqlx::query_as(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CacheError::Read(e.to_string()))?;
        Ok(row.map(|(v,)| v))
    }

    async fn put(
        &self,
        table: &str,
        key: &str,
        json: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let (key_col, value_col) = Self::columns(table);
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| CacheError::NotJsonSafe(e.to_string()))?;
        let sql = format!(
            "INSERT INTO {table} ({key_col}, {value_col}, expires_at, created_at) \
             VALUES ($1, $2, $3, now()) \
             ON CONFLICT ({key_col}) DO UPDATE SET {value_col} = EXCLUDED.{value_col}, \
             expires_at = EXCLUDED.expires_at"
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(value)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::Write(e.to_string()))?;
        Ok(())
    }

    async fn sweep(&self, table: &str) -> Result<u64, CacheError> {
        let sql = format!("DELETE FROM {table} WHERE expires_at <= now()");
        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::Write(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryKvStore::new();
        store
            .put("enrichment_sessions", "k1", "{\"a\":1}", Duration::from_secs(60))
            .await
            .unwrap();
        let got = store.get("enrichment_sessions", "k1").await.unwrap();
        assert_eq!(got, Some("{\"a\":1}".to_string()));
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let store = InMemoryKvStore::new();
        store
            .put("stage_cache", "k1", "{}", Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let got = store.get("stage_cache", "k1").await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn upsert_same_key_twice_yields_one_entry() {
        let store = InMemoryKvStore::new();
        store
            .put("stage_cache", "k1", "{\"v\":1}", Duration::from_secs(60))
            .await
            .unwrap();
        store
            .put("stage_cache", "k1", "{\"v\":2}", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.get("stage_cache", "k1").await.unwrap(),
            Some("{\"v\":2}".to_string())
        );
    }
}
