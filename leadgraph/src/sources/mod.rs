//! Enrichment sources (C1) — polymorphic capabilities the orchestrator fans
//! out to, never a closed enum it matches on.
//!
//! Every concrete adapter implements [`EnrichmentSource`] and is held
//! behind `Arc<dyn EnrichmentSource>` in [`crate::enrichment::orchestrator`].
//! Adding an eighth source later is a matter of writing one more file in
//! this module and pushing it onto the roster — the orchestrator's layer
//! loop never changes.

pub mod cnpj_registry;
pub mod geoip;
pub mod linkedin;
pub mod llm_inference;
pub mod metadata;
pub mod people_api;
pub mod places;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SourceErrorKind;

/// One field pulled out of a source call, already tagged with enough
/// provenance for [`crate::domain::SourceAttribution`] to be built from it
/// without going back to the adapter.
#[derive(Debug, Clone)]
pub struct SourceField {
    /// Source-native key, translated by [`crate::translator`] before it
    /// reaches a session's `fields` map.
    pub key: String,
    pub raw_value: Value,
    pub normalized_value: Value,
}

impl SourceField {
    #[must_use]
    pub fn new(key: impl Into<String>, raw_value: Value, normalized_value: Value) -> Self {
        Self {
            key: key.into(),
            raw_value,
            normalized_value,
        }
    }

    /// Shorthand for a field whose raw and normalized values are identical.
    #[must_use]
    pub fn simple(key: impl Into<String>, value: Value) -> Self {
        Self::new(key, value.clone(), value)
    }
}

/// Outcome of one [`EnrichmentSource::enrich`] call.
#[derive(Debug, Clone, Default)]
pub struct SourceResult {
    pub fields: Vec<SourceField>,
    pub cost_usd: f64,
}

impl SourceResult {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Hints an earlier layer has already gathered, passed down so a later
/// layer's sources can narrow their query (a registry lookup uses a
/// company name scraped at L1, an LLM-inference call reads everything
/// accumulated through L1+L2).
#[derive(Debug, Clone, Default)]
pub struct EnrichmentHints {
    pub company_name: Option<String>,
    pub country_hint: Option<String>,
    pub fields_so_far: Value,
}

/// A capability the progressive orchestrator can fan a layer out to.
///
/// Implementors own their own HTTP client / API credentials; the
/// orchestrator only ever calls [`Self::enrich`] under its own timeout and
/// consults [`Self::breaker_config`] once, at adapter construction, to seed
/// the shared [`crate::breaker::BreakerRegistry`].
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    /// Stable, lowercase identifier used as the breaker name, the
    /// attribution `source` field, and in structured logs.
    fn name(&self) -> &'static str;

    /// Upper bound the orchestrator enforces with `tokio::time::timeout`
    /// around the call, independent of any internal timeout the adapter
    /// sets on its own HTTP client.
    fn timeout(&self) -> Duration;

    /// Rough cost estimate in USD for one call, used for pre-flight quota
    /// checks. Adapters with no marginal cost (scrapers, geoip) return 0.0.
    fn cost_estimate_usd(&self) -> f64;

    /// The failure-threshold / recovery-window profile this source's
    /// breaker should be created with; see [`crate::breaker::BreakerConfig`].
    fn breaker_config(&self) -> crate::breaker::BreakerConfig;

    /// This source's declared prior confidence in `[0, 100]` for a field it
    /// reports, before the orchestrator's agreement bonus and user-edit
    /// penalty are applied. Scraped/inferred sources declare a lower prior
    /// than authoritative registries.
    fn confidence_prior(&self) -> u8 {
        70
    }

    /// Run the capability against `domain`, using whatever `hints` an
    /// earlier layer has already surfaced.
    ///
    /// # Errors
    ///
    /// Returns [`SourceErrorKind`] describing the failure category so the
    /// caller can update the breaker and decide whether to retry.
    async fn enrich(&self, domain: &str, hints: &EnrichmentHints) -> Result<SourceResult, SourceErrorKind>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_field_simple_duplicates_value() {
        let field = SourceField::simple("name", Value::String("Acme".into()));
        assert_eq!(field.raw_value, field.normalized_value);
    }
}
