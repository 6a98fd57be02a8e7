use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One source's reported value for one canonical field.
///
/// Observations are the append-only ledger that flows through the fields
/// channel: every adapter call that touches a field appends an entry rather
/// than overwriting state directly, so the full provenance of a field
/// (who said what, at what confidence, in which layer) survives the run.
/// The reducer that folds observations into `VersionedState` picks the
/// winner per the confidence/layer/arrival tie-break; losers stay in the
/// ledger for audit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldObservation {
    /// Canonical field name (post-translation, see the field translator).
    pub field: String,
    /// Normalized value as understood by the canonical schema.
    pub value: Value,
    /// Raw value exactly as the source returned it, kept for audit.
    pub raw_value: Value,
    /// Source identifier, e.g. `"metadata-scraper"`, `"llm-inference"`.
    pub source: String,
    /// Enrichment layer this observation was produced in (1, 2, or 3).
    pub layer: u8,
    /// Confidence in [0, 100].
    pub confidence: u8,
    /// When the source produced this observation.
    #[serde(default = "Utc::now")]
    pub extracted_at: DateTime<Utc>,
    /// Whether the source call that produced this observation succeeded.
    pub success: bool,
}

impl FieldObservation {
    pub const USER_SOURCE: &'static str = "user";

    #[must_use]
    pub fn new(
        field: impl Into<String>,
        value: Value,
        source: impl Into<String>,
        layer: u8,
        confidence: u8,
    ) -> Self {
        let value = value;
        Self {
            field: field.into(),
            raw_value: value.clone(),
            value,
            source: source.into(),
            layer,
            confidence: confidence.clamp(0, 100),
            extracted_at: Utc::now(),
            success: true,
        }
    }

    /// An observation representing a user-supplied override. User values
    /// always win the merge tie-break regardless of confidence.
    #[must_use]
    pub fn from_user(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, value, Self::USER_SOURCE, 0, 100)
    }

    #[must_use]
    pub fn failed(field: impl Into<String>, source: impl Into<String>, layer: u8) -> Self {
        Self {
            field: field.into(),
            value: Value::Null,
            raw_value: Value::Null,
            source: source.into(),
            layer,
            confidence: 0,
            extracted_at: Utc::now(),
            success: false,
        }
    }

    #[must_use]
    pub fn is_from_user(&self) -> bool {
        self.source == Self::USER_SOURCE
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = confidence.clamp(0, 100);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn construction_clamps_confidence() {
        let obs = FieldObservation::new("name", json!("Acme"), "metadata", 1, 250);
        assert_eq!(obs.confidence, 100);
        assert!(obs.success);
    }

    #[test]
    fn user_observation_wins_by_convention() {
        let obs = FieldObservation::from_user("name", json!("Acme Corp"));
        assert!(obs.is_from_user());
        assert_eq!(obs.confidence, 100);
    }

    #[test]
    fn failed_observation_has_null_value() {
        let obs = FieldObservation::failed("industry", "llm-inference", 3);
        assert!(!obs.success);
        assert_eq!(obs.value, Value::Null);
    }

    #[test]
    fn serde_roundtrip() {
        let obs = FieldObservation::new("city", json!("Sao Paulo"), "places", 2, 80);
        let json = serde_json::to_string(&obs).unwrap();
        let back: FieldObservation = serde_json::from_str(&json).unwrap();
        assert_eq!(obs, back);
    }
}
