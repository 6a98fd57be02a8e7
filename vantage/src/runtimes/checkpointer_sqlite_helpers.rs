//! Small JSON (de)serialization helpers shared by the SQLite checkpointer.
//!
//! Kept separate from `checkpointer_sqlite.rs` so the query/transaction code
//! isn't interleaved with repetitive `serde_json` error mapping.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::runtimes::checkpointer::{CheckpointerError, Result};

/// Serializes `value` to a JSON string, tagging failures with `field_name`.
pub fn serialize_json<T: Serialize>(value: &T, field_name: &'static str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| CheckpointerError::Other {
        message: format!("failed to serialize {field_name}: {e}"),
    })
}

/// Parses a JSON string into a generic [`Value`], tagging failures with `field_name`.
pub fn deserialize_json(payload: &str, field_name: &'static str) -> Result<Value> {
    serde_json::from_str(payload).map_err(|e| CheckpointerError::Other {
        message: format!("failed to parse {field_name}: {e}"),
    })
}

/// Converts a generic [`Value`] into `T`, tagging failures with `field_name`.
pub fn deserialize_json_value<T: DeserializeOwned>(value: Value, field_name: &'static str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| CheckpointerError::Other {
        message: format!("failed to decode {field_name}: {e}"),
    })
}

/// Unwraps an `Option<String>` column that is required for a valid checkpoint row.
pub fn require_json_field(payload: Option<String>, field_name: &'static str) -> Result<String> {
    payload.ok_or(CheckpointerError::Other {
        message: format!("missing persisted field: {field_name}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_through_value() {
        let s = serialize_json(&json!({"a": 1}), "test").unwrap();
        let v = deserialize_json(&s, "test").unwrap();
        let back: serde_json::Value = deserialize_json_value(v, "test").unwrap();
        assert_eq!(back, json!({"a": 1}));
    }

    #[test]
    fn require_json_field_rejects_none() {
        let err = require_json_field(None, "state_json").unwrap_err();
        assert!(matches!(err, CheckpointerError::Other { .. }));
    }
}
