//! Session Loader & User-Edit Ledger (C10) — hydrates a cached enrichment
//! session into the analysis pipeline and overlays the submitted form's
//! user-edited fields. User values win unconditionally; every field where
//! the user value differs from the cached value is appended to the edit
//! ledger, which [`crate::enrichment::orchestrator`] later reads back as
//! the confidence-penalty term (`-5 x edits_observed`).
//!
//! An expired or absent session is not an error here: the pipeline simply
//! runs on the user-supplied form alone, per spec's "never crash" rule for
//! this path.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use uuid::Uuid;
use vantage::observation::FieldObservation;

use crate::cache::EnrichmentCache;
use crate::domain::{EnrichmentSession, UserFieldEdit};
use crate::persistence::EditLedgerRepo;

/// Outcome of hydrating a submission's enrichment: the observations ready
/// to seed the analysis pipeline's `VersionedState`, plus the ledger
/// entries recorded for this submission (already persisted by
/// [`load_and_merge`]; returned for the caller's own audit/response use).
#[derive(Debug, Clone, Default)]
pub struct HydratedSession {
    pub observations: Vec<FieldObservation>,
    pub edits: Vec<UserFieldEdit>,
    pub session: Option<EnrichmentSession>,
}

/// Load the cached session for `session_id` (if any and unexpired), overlay
/// `user_fields` (always winning), and record one [`UserFieldEdit`] per
/// field whose user value differs from what was cached.
///
/// Never fails: a missing cache, an expired session, or a store error all
/// degrade to "no cached session", not an error returned to the caller —
/// matching spec's "proceed with an empty enrichment... never crash" rule.
#[tracing::instrument(skip(cache, ledger, user_fields), fields(session_id = ?session_id))]
pub async fn load_and_merge(
    cache: &EnrichmentCache,
    ledger: &dyn EditLedgerRepo,
    session_id: Option<Uuid>,
    cache_key_hint: Option<&str>,
    user_fields: &BTreeMap<String, Value>,
) -> HydratedSession {
    let cached = match (session_id, cache_key_hint) {
        (_, Some(key)) => cache.get(key).await.ok().flatten(),
        _ => None,
    };

    let cached = cached.filter(|session| !session.is_expired());

    let mut observations = Vec::new();
    let mut edits = Vec::new();

    if let Some(session) = &cached {
        for (field, value) in &session.fields {
            let source = session
                .attribution
                .get(field)
                .map(|a| a.source.clone())
                .unwrap_or_else(|| "cache".to_string());
            let layer = session.attribution.get(field).map_or(0, |a| a.layer);
            let confidence = session.confidence.get(field).copied().unwrap_or(50);
            observations.push(FieldObservation::new(field.clone(), value.clone(), source, layer, confidence));
        }
    }

    for (field, user_value) in user_fields {
        let cached_value = cached.as_ref().and_then(|s| s.fields.get(field));
        if cached_value.is_some_and(|v| v == user_value) {
            // Identical to what enrichment already found; not a user edit.
            continue;
        }
        observations.push(FieldObservation::from_user(field.clone(), user_value.clone()));
        if let Some(session) = &cached {
            let edit = UserFieldEdit {
                session_id: session.session_id,
                field_name: field.clone(),
                source_value: cached_value.cloned().unwrap_or(Value::Null),
                user_value: user_value.clone(),
                created_at: chrono::Utc::now(),
            };
            let _ = ledger.record(&edit).await;
            edits.push(edit);
        }
    }

    HydratedSession {
        observations,
        edits,
        session: cached,
    }
}

/// Count, per canonical field, how many edits have ever been recorded
/// against that field — the input to the confidence-penalty term in
/// [`crate::enrichment::orchestrator::score_observations`]. The ledger
/// indexes by field name alone (see `user_field_edits`), so this is a
/// global count rather than scoped to one domain; a field a user
/// habitually corrects is downranked everywhere, not just for the company
/// that taught the system to distrust it.
///
/// Best-effort: a per-field store failure contributes 0 (no penalty)
/// rather than failing the enrichment run that's asking for it.
pub async fn edit_counts(ledger: &dyn EditLedgerRepo) -> FxHashMap<String, u32> {
    let mut counts = FxHashMap::default();
    for field in crate::translator::CANONICAL_FIELDS {
        let count = ledger.count_for_field(field).await.unwrap_or(0);
        if count > 0 {
            counts.insert((*field).to_string(), count);
        }
    }
    counts
}

/// Build the `BTreeMap<String, Value>` of user-edited fields a
/// `POST /api/submit` body carries, from the free-form JSON object the
/// HTTP layer decodes. Keys not already canonical (see
/// [`crate::translator`]) are passed through unchanged, matching the
/// translator's identity-on-unknown-keys guarantee.
#[must_use]
pub fn user_fields_from_json(value: &Value) -> BTreeMap<String, Value> {
    let Value::Object(map) = value else {
        return BTreeMap::new();
    };
    map.iter().map(|(k, v)| (crate::translator::translate_key(k), v.clone())).collect()
}

/// Thin `Arc`-friendly handle bundling the pieces [`load_and_merge`] needs,
/// for callers (the HTTP layer) that want one object to pass around instead
/// of three.
pub struct SessionLoader {
    cache: Arc<EnrichmentCache>,
    ledger: Arc<dyn EditLedgerRepo>,
}

impl SessionLoader {
    #[must_use]
    pub fn new(cache: Arc<EnrichmentCache>, ledger: Arc<dyn EditLedgerRepo>) -> Self {
        Self { cache, ledger }
    }

    pub async fn load(
        &self,
        session_id: Option<Uuid>,
        cache_key_hint: Option<&str>,
        user_fields: &BTreeMap<String, Value>,
    ) -> HydratedSession {
        load_and_merge(&self.cache, self.ledger.as_ref(), session_id, cache_key_hint, user_fields).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryKvStore;
    use crate::persistence::InMemoryEditLedger;
    use serde_json::json;
    use std::time::Duration;

    fn sample_session() -> EnrichmentSession {
        let mut session = EnrichmentSession::new("key1", "https://acme.com", "a@acme.com");
        session.fields.insert("name".to_string(), json!("Acme"));
        session.confidence.insert("name".to_string(), 80);
        session
    }

    #[tokio::test]
    async fn absent_session_yields_only_user_fields() {
        let cache = EnrichmentCache::new(Arc::new(InMemoryKvStore::new()), Duration::from_secs(60));
        let ledger = InMemoryEditLedger::default();
        let mut user_fields = BTreeMap::new();
        user_fields.insert("name".to_string(), json!("Acme Corp"));

        let hydrated = load_and_merge(&cache, &ledger, None, Some("missing-key"), &user_fields).await;
        assert_eq!(hydrated.observations.len(), 1);
        assert!(hydrated.session.is_none());
        assert!(hydrated.edits.is_empty());
    }

    #[tokio::test]
    async fn user_value_overrides_cached_value_and_is_ledgered() {
        let cache = EnrichmentCache::new(Arc::new(InMemoryKvStore::new()), Duration::from_secs(60));
        let session = sample_session();
        cache.put("key1", &session).await.unwrap();
        let ledger = InMemoryEditLedger::default();

        let mut user_fields = BTreeMap::new();
        user_fields.insert("name".to_string(), json!("Acme Corporation"));

        let hydrated = load_and_merge(&cache, &ledger, Some(session.session_id), Some("key1"), &user_fields).await;

        let user_obs: Vec<_> = hydrated.observations.iter().filter(|o| o.is_from_user()).collect();
        assert_eq!(user_obs.len(), 1);
        assert_eq!(user_obs[0].value, json!("Acme Corporation"));
        assert_eq!(hydrated.edits.len(), 1);
        assert_eq!(ledger.count().await, 1);
    }

    #[tokio::test]
    async fn identical_user_value_is_not_counted_as_an_edit() {
        let cache = EnrichmentCache::new(Arc::new(InMemoryKvStore::new()), Duration::from_secs(60));
        let session = sample_session();
        cache.put("key1", &session).await.unwrap();
        let ledger = InMemoryEditLedger::default();

        let mut user_fields = BTreeMap::new();
        user_fields.insert("name".to_string(), json!("Acme"));

        let hydrated = load_and_merge(&cache, &ledger, Some(session.session_id), Some("key1"), &user_fields).await;
        assert!(hydrated.edits.is_empty());
        assert_eq!(ledger.count().await, 0);
    }

    #[tokio::test]
    async fn expired_session_is_treated_as_absent() {
        let cache = EnrichmentCache::new(Arc::new(InMemoryKvStore::new()), Duration::from_millis(1));
        cache.put("key1", &sample_session()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let ledger = InMemoryEditLedger::default();

        let hydrated = load_and_merge(&cache, &ledger, None, Some("key1"), &BTreeMap::new()).await;
        assert!(hydrated.session.is_none());
        assert!(hydrated.observations.is_empty());
    }

    #[test]
    fn user_fields_from_json_translates_keys() {
        let body = json!({"company_name": "Acme", "ai_industry": "Tech"});
        let fields = user_fields_from_json(&body);
        assert_eq!(fields.get("name"), Some(&json!("Acme")));
        assert_eq!(fields.get("industry"), Some(&json!("Tech")));
    }

    #[tokio::test]
    async fn edit_counts_only_reports_fields_with_recorded_edits() {
        let ledger = InMemoryEditLedger::default();
        let edit = UserFieldEdit {
            session_id: Uuid::new_v4(),
            field_name: "name".to_string(),
            source_value: json!("Acme"),
            user_value: json!("Acme Corp"),
            created_at: chrono::Utc::now(),
        };
        ledger.record(&edit).await.unwrap();
        ledger.record(&edit).await.unwrap();

        let counts = edit_counts(&ledger).await;
        assert_eq!(counts.get("name"), Some(&2));
        assert!(!counts.contains_key("industry"));
    }
}
