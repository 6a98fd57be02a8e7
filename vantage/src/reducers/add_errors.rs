use super::Reducer;
use crate::{channels::Channel, node::NodePartial, state::VersionedState};

/// Appends every error in the partial to the error log. Never drops or
/// dedups; the error log is an audit trail, not a current-state view.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AddErrors;

impl Reducer for AddErrors {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(errors_update) = &update.errors
            && !errors_update.is_empty()
        {
            state.errors.get_mut().extend(errors_update.iter().cloned());
        }
    }
}
