//! Analysis-stage cache (C6) — a content-addressed store of individual
//! stage outputs keyed by `sha256(stage_id || canonical_json(inputs))`,
//! 7-day TTL, best-effort reads and writes (a cache failure degrades to a
//! live recompute rather than failing the pipeline).

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::cache::{pre_serialize, KvStore};
use crate::domain::{AnalysisStageResult, StageId};
use crate::errors::CacheError;

const TABLE: &str = "stage_cache";

/// `inputs` must carry the full argument set a stage consumes — company
/// name, industry, and every upstream `stage_kwargs` value — so that a
/// cache miss recomputes with the same inputs the cache would have keyed
/// on, rather than a partial view.
#[must_use]
pub fn fingerprint(stage: StageId, inputs: &Value) -> String {
    let canonical = canonical_json(inputs);
    let mut hasher = Sha256::new();
    hasher.update(stage.as_u8().to_le_bytes());
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Serialize with sorted object keys so that semantically identical input
/// maps produce the same fingerprint regardless of construction order.
fn canonical_json(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = serde_json::Map::with_capacity(entries.len());
                for (k, v) in entries {
                    out.insert(k.clone(), sort(v));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

pub struct StageCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl StageCache {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Best-effort lookup: a store error is logged and treated as a miss
    /// rather than propagated, since a cache is never load-bearing for
    /// correctness.
    pub async fn get(&self, stage: StageId, inputs: &Value) -> Option<AnalysisStageResult> {
        let key = fingerprint(stage, inputs);
        match self.store.get(TABLE, &key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(stage = stage.name(), error = %e, "corrupt stage cache entry, treating as a miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(stage = stage.name(), error = %e, "stage cache read failed, falling back to live recompute");
                None
            }
        }
    }

    /// Best-effort write: failures are logged, never surfaced, so a cache
    /// outage cannot fail an otherwise-successful stage run.
    pub async fn put(&self, stage: StageId, inputs: &Value, result: &AnalysisStageResult) {
        let key = fingerprint(stage, inputs);
        let Ok(value) = serde_json::to_value(result) else {
            warn!(stage = stage.name(), "stage result failed to serialize, skipping cache write");
            return;
        };
        let safe = pre_serialize(&value);
        let Ok(json) = serde_json::to_string(&safe) else {
            warn!(stage = stage.name(), "stage result failed to render as JSON, skipping cache write");
            return;
        };
        if let Err(e) = self.store.put(TABLE, &key, &json, self.ttl).await {
            warn!(stage = stage.name(), error = %e, "stage cache write failed, continuing without caching");
        }
    }

    /// Typed wrapper over [`CacheError`] for callers that want the failure
    /// surfaced (health checks, admin endpoints) rather than swallowed.
    pub async fn sweep(&self) -> Result<u64, CacheError> {
        self.store.sweep(TABLE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryKvStore;
    use serde_json::json;

    fn sample_result() -> AnalysisStageResult {
        AnalysisStageResult {
            stage: StageId::Extraction,
            output: json!({"summary": "ok"}),
            input_fingerprint: String::new(),
            model: "gpt-4o-mini".into(),
            tokens_in: 100,
            tokens_out: 50,
            cost_usd: 0.002,
            duration_ms: 120,
            cached: false,
        }
    }

    #[test]
    fn fingerprint_is_stable_under_key_reordering() {
        let a = json!({"company": "Acme", "industry": "tech"});
        let b = json!({"industry": "tech", "company": "Acme"});
        assert_eq!(fingerprint(StageId::Extraction, &a), fingerprint(StageId::Extraction, &b));
    }

    #[test]
    fn fingerprint_differs_across_stages_for_same_inputs() {
        let inputs = json!({"company": "Acme"});
        assert_ne!(
            fingerprint(StageId::Extraction, &inputs),
            fingerprint(StageId::GapAnalysis, &inputs)
        );
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = StageCache::new(Arc::new(InMemoryKvStore::new()), Duration::from_secs(3600));
        let inputs = json!({"company": "Acme", "industry": "tech"});
        cache.put(StageId::Extraction, &inputs, &sample_result()).await;
        let fetched = cache.get(StageId::Extraction, &inputs).await.expect("cache hit");
        assert_eq!(fetched.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn miss_on_different_inputs() {
        let cache = StageCache::new(Arc::new(InMemoryKvStore::new()), Duration::from_secs(3600));
        cache
            .put(StageId::Extraction, &json!({"company": "Acme"}), &sample_result())
            .await;
        assert!(cache
            .get(StageId::Extraction, &json!({"company": "Globex"}))
            .await
            .is_none());
    }
}
