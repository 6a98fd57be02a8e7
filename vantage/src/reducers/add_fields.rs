use super::Reducer;
use crate::{channels::Channel, node::NodePartial, state::VersionedState};

/// Appends every observation in the partial to the fields ledger.
///
/// This reducer never overwrites; it only appends. The "current" value of a
/// field is a read-time concept resolved by [`crate::state::StateSnapshot::best_for`]
/// via [`super::winner_among`], not something this reducer picks at write
/// time. Keeping the ledger append-only is what makes provenance auditing
/// and the edit ledger (C10) possible.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AddFields;

impl Reducer for AddFields {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(fields_update) = &update.fields
            && !fields_update.is_empty()
        {
            state.fields.get_mut().extend(fields_update.iter().cloned());
        }
    }
}
