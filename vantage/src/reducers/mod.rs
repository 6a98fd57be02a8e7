mod add_errors;
mod add_fields;
mod map_merge;
mod reducer_registry;

pub use add_errors::AddErrors;
pub use add_fields::AddFields;
pub use map_merge::MapMerge;
pub use reducer_registry::*;

use crate::node::NodePartial;
use crate::observation::FieldObservation;
use crate::state::VersionedState;
use crate::types::ChannelType;
use miette::Diagnostic;
use thiserror::Error;

/// Unified reducer trait: every reducer mutates VersionedState using a NodePartial delta.
/// Channels currently implemented: fields (append) and extra (shallow JSON map merge).
pub trait Reducer: Send + Sync {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial);
}

#[derive(Debug, Error, Diagnostic)]
pub enum ReducerError {
    #[error("no reducers registered for channel: {0:?}")]
    #[diagnostic(
        code(vantage::reducers::unknown_channel),
        help("Use GraphBuilder::with_reducer() to register a reducer for {0:?}")
    )]
    UnknownChannel(ChannelType),

    #[error("reducer apply failed for channel {channel:?}: {message}")]
    #[diagnostic(
        code(vantage::reducers::apply),
        help("Check that your reducer implementation correctly handles the NodePartial structure")
    )]
    Apply {
        channel: ChannelType,
        message: String,
    },
}

/// Resolves the winning observation among candidates for the same field,
/// per the merge tie-break: user values win unconditionally; otherwise
/// higher confidence wins; ties go to the earlier layer; remaining ties go
/// to the first one encountered.
pub fn winner_among<'a, I>(observations: I) -> Option<&'a FieldObservation>
where
    I: IntoIterator<Item = &'a FieldObservation>,
{
    let mut best: Option<&FieldObservation> = None;
    for candidate in observations {
        best = Some(match best {
            None => candidate,
            Some(current) => pick_winner(current, candidate),
        });
    }
    best
}

fn pick_winner<'a>(current: &'a FieldObservation, candidate: &'a FieldObservation) -> &'a FieldObservation {
    if current.is_from_user() {
        return current;
    }
    if candidate.is_from_user() {
        return candidate;
    }
    if candidate.confidence != current.confidence {
        return if candidate.confidence > current.confidence {
            candidate
        } else {
            current
        };
    }
    if candidate.layer != current.layer {
        return if candidate.layer < current.layer {
            candidate
        } else {
            current
        };
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_value_always_wins() {
        let a = FieldObservation::new("name", json!("Acme Inc"), "metadata", 1, 95);
        let b = FieldObservation::from_user("name", json!("Acme Corp"));
        let winner = winner_among([&a, &b]).unwrap();
        assert_eq!(winner.source, FieldObservation::USER_SOURCE);
    }

    #[test]
    fn earlier_layer_wins_on_confidence_tie() {
        let a = FieldObservation::new("industry", json!("Tech"), "llm", 3, 70);
        let b = FieldObservation::new("industry", json!("Technology"), "registry", 2, 70);
        let winner = winner_among([&a, &b]).unwrap();
        assert_eq!(winner.source, "registry");
    }

    #[test]
    fn first_received_wins_full_tie() {
        let a = FieldObservation::new("country", json!("US"), "geoip", 1, 80);
        let b = FieldObservation::new("country", json!("USA"), "metadata", 1, 80);
        let winner = winner_among([&a, &b]).unwrap();
        assert_eq!(winner.source, "geoip");
    }
}
