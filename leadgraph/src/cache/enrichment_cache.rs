//! Enrichment cache (C3) — a content-addressed store of completed
//! `EnrichmentSession`s keyed by `sha256(domain || email_bucket)`, 30-day
//! TTL, lazy-on-read eviction.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{pre_serialize, KvStore};
use crate::domain::EnrichmentSession;
use crate::errors::CacheError;

const TABLE: &str = "enrichment_sessions";

/// Thin domain-typed wrapper over [`KvStore`] for `EnrichmentSession`s.
pub struct EnrichmentCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl EnrichmentCache {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Look up a previously completed session by its cache key. Returns
    /// `None` on a miss or on an expired entry — callers re-run the
    /// orchestrator from scratch in either case.
    pub async fn get(&self, cache_key: &str) -> Result<Option<EnrichmentSession>, CacheError> {
        let Some(raw) = self.store.get(TABLE, cache_key).await? else {
            return Ok(None);
        };
        let session = serde_json::from_str(&raw)
            .map_err(|e| CacheError::Read(format!("corrupt cached session: {e}")))?;
        Ok(Some(session))
    }

    /// Persist a completed session under its cache key.
    pub async fn put(&self, cache_key: &str, session: &EnrichmentSession) -> Result<(), CacheError> {
        let value = serde_json::to_value(session)
            .map_err(|e| CacheError::NotJsonSafe(e.to_string()))?;
        let safe = pre_serialize(&value);
        let json = serde_json::to_string(&safe)
            .map_err(|e| CacheError::NotJsonSafe(e.to_string()))?;
        self.store.put(TABLE, cache_key, &json, self.ttl).await
    }

    /// Remove expired entries proactively; returns the count removed.
    pub async fn sweep(&self) -> Result<u64, CacheError> {
        self.store.sweep(TABLE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryKvStore;

    fn sample_session() -> EnrichmentSession {
        EnrichmentSession::new("key1", "https://acme.com", "a@acme.com")
    }

    #[tokio::test]
    async fn round_trips_a_session_through_the_store() {
        let cache = EnrichmentCache::new(Arc::new(InMemoryKvStore::new()), Duration::from_secs(3600));
        let session = sample_session();
        cache.put("key1", &session).await.unwrap();
        let fetched = cache.get("key1").await.unwrap().expect("cache hit");
        assert_eq!(fetched.session_id, session.session_id);
        assert_eq!(fetched.website_url, "https://acme.com");
    }

    #[tokio::test]
    async fn miss_on_unknown_key_returns_none() {
        let cache = EnrichmentCache::new(Arc::new(InMemoryKvStore::new()), Duration::from_secs(3600));
        assert!(cache.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entry_reads_as_a_miss() {
        let cache = EnrichmentCache::new(Arc::new(InMemoryKvStore::new()), Duration::from_millis(1));
        cache.put("key1", &sample_session()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("key1").await.unwrap().is_none());
    }
}
