//! State management for the enrichment/analysis workflow graphs.
//!
//! This module provides versioned state management with multiple channels
//! for different types of workflow data. State is managed through versioned
//! channels that support snapshotting, deep cloning, and persistence.
//!
//! # Channels
//!
//! State is organized into three channels:
//! - **fields**: the append-only ledger of [`FieldObservation`]s reported by
//!   enrichment sources and LLM stages
//! - **extra**: custom metadata and intermediate results (stage outputs,
//!   costs, tier labels, ...)
//! - **errors**: error events and diagnostic information
//!
//! # Examples
//!
//! ```rust
//! use vantage::state::VersionedState;
//! use vantage::channels::Channel;
//! use serde_json::json;
//!
//! let mut state = VersionedState::new();
//! state.extra.get_mut().insert("domain".to_string(), json!("example.com"));
//!
//! let snapshot = state.snapshot();
//! assert_eq!(snapshot.extra.get("domain"), Some(&json!("example.com")));
//! ```

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::{
    channels::{Channel, ErrorsChannel, ExtrasChannel, FieldsChannel},
    observation::FieldObservation,
};

/// The main state container for workflow execution.
///
/// `VersionedState` manages three independent channels of versioned data:
/// field observations, custom extras, and error events. Each channel
/// maintains its own version number for optimistic concurrency control and
/// change detection.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionedState {
    /// Append-only ledger of field observations reported by sources/stages.
    pub fields: FieldsChannel,
    /// Extra channel for custom metadata and intermediate results.
    pub extra: ExtrasChannel,
    /// Error channel for diagnostic information.
    pub errors: ErrorsChannel,
}

/// Immutable snapshot of workflow state at a specific point in time.
///
/// Snapshots are automatically created by [`VersionedState::snapshot()`] and
/// passed to nodes during workflow execution. Nodes should treat snapshots
/// as immutable input data.
#[derive(Clone, Debug)]
pub struct StateSnapshot {
    /// Field observations at the time of snapshot.
    pub fields: Vec<FieldObservation>,
    /// Version of the fields channel when the snapshot was taken.
    pub fields_version: u32,
    /// Extra data at the time of snapshot.
    pub extra: FxHashMap<String, Value>,
    /// Version of extra channel when snapshot was taken.
    pub extra_version: u32,
    /// Error events at the time of snapshot.
    pub errors: Vec<crate::channels::errors::ErrorEvent>,
    /// Version of errors channel when snapshot was taken.
    pub errors_version: u32,
}

impl StateSnapshot {
    /// Returns the most confident, non-losing observation for a field, if any.
    ///
    /// This mirrors the merge tie-break used by the fields reducer: highest
    /// confidence wins, ties go to the earlier layer, then to the first
    /// received. User observations always win outright.
    pub fn best_for(&self, field: &str) -> Option<&FieldObservation> {
        crate::reducers::winner_among(self.fields.iter().filter(|o| o.field == field && o.success))
    }
}

impl Default for VersionedState {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionedState {
    /// Creates a fresh, empty versioned state with all channels at version 1.
    pub fn new() -> Self {
        Self {
            fields: FieldsChannel::new(Vec::new(), 1),
            extra: ExtrasChannel::default(),
            errors: ErrorsChannel::default(),
        }
    }

    /// Creates a new versioned state seeded with a single observation, most
    /// commonly a user-supplied form field at submission time.
    pub fn new_with_observation(observation: FieldObservation) -> Self {
        Self {
            fields: FieldsChannel::new(vec![observation], 1),
            extra: ExtrasChannel::default(),
            errors: ErrorsChannel::default(),
        }
    }

    /// Creates a new versioned state initialized with a set of observations,
    /// e.g. the user-edited fields carried over from a submission form.
    pub fn new_with_observations(observations: Vec<FieldObservation>) -> Self {
        Self {
            fields: FieldsChannel::new(observations, 1),
            extra: ExtrasChannel::default(),
            errors: ErrorsChannel::default(),
        }
    }

    /// Creates a builder for constructing `VersionedState` with a fluent API.
    pub fn builder() -> VersionedStateBuilder {
        VersionedStateBuilder::new()
    }

    /// Convenience method for appending an observation to the fields channel.
    ///
    /// The version is not incremented here; that is the barrier's job.
    #[must_use = "consider using the returned self for method chaining"]
    pub fn add_observation(&mut self, observation: FieldObservation) -> &mut Self {
        self.fields.get_mut().push(observation);
        self
    }

    /// Convenience method for adding metadata to the extra channel.
    #[must_use = "consider using the returned self for method chaining"]
    pub fn add_extra(&mut self, key: &str, value: Value) -> &mut Self {
        self.extra.get_mut().insert(key.to_string(), value);
        self
    }

    /// Creates an immutable snapshot of the current state.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            fields: self.fields.snapshot(),
            fields_version: self.fields.version(),
            extra: self.extra.snapshot(),
            extra_version: self.extra.version(),
            errors: self.errors.snapshot(),
            errors_version: self.errors.version(),
        }
    }
}

/// Builder for constructing `VersionedState` with a fluent API.
///
/// Useful for tests and for seeding a session from user-submitted form data.
#[derive(Debug, Default)]
pub struct VersionedStateBuilder {
    fields: Vec<FieldObservation>,
    extra: FxHashMap<String, Value>,
}

impl VersionedStateBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Adds a field observation to the builder.
    pub fn with_observation(mut self, observation: FieldObservation) -> Self {
        self.fields.push(observation);
        self
    }

    /// Adds a user-supplied field value, which always wins merges.
    pub fn with_user_field(mut self, field: &str, value: Value) -> Self {
        self.fields.push(FieldObservation::from_user(field, value));
        self
    }

    /// Adds metadata to the extra channel.
    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    /// Builds the final `VersionedState`. All channels start at version 1.
    pub fn build(self) -> VersionedState {
        VersionedState {
            fields: FieldsChannel::new(self.fields, 1),
            extra: ExtrasChannel::new(self.extra, 1),
            errors: ErrorsChannel::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_with_observations_sets_version_one() {
        let state = VersionedState::new_with_observation(FieldObservation::from_user(
            "name",
            json!("Acme"),
        ));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.fields.len(), 1);
        assert_eq!(snapshot.fields_version, 1);
        assert!(snapshot.extra.is_empty());
    }

    #[test]
    fn snapshot_is_independent_of_source() {
        let mut state = VersionedState::new();
        state.add_extra("status", json!("processing"));
        let snapshot = state.snapshot();
        state.add_extra("status", json!("complete"));
        assert_eq!(snapshot.extra.get("status"), Some(&json!("processing")));
        assert_eq!(
            state.extra.snapshot().get("status"),
            Some(&json!("complete"))
        );
    }

    #[test]
    fn builder_collects_fields_and_extra() {
        let state = VersionedState::builder()
            .with_user_field("name", json!("Acme"))
            .with_extra("domain", json!("acme.com"))
            .build();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.fields.len(), 1);
        assert_eq!(snapshot.extra.len(), 1);
    }

    #[test]
    fn best_for_picks_higher_confidence() {
        let state = VersionedState::new_with_observations(vec![
            FieldObservation::new("city", json!("SP"), "geoip", 1, 60),
            FieldObservation::new("city", json!("Sao Paulo"), "places", 2, 85),
        ]);
        let snapshot = state.snapshot();
        let best = snapshot.best_for("city").unwrap();
        assert_eq!(best.source, "places");
    }
}
