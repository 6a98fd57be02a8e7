//! Tiny constructors kept in one place so call sites don't repeat
//! `FxHashMap::default()` with a type annotation at every barrier merge.

use rustc_hash::FxHashMap;
use serde_json::Value;

/// Empty accumulator for the `extra` channel, sized for a typical merge.
pub fn new_extra_map() -> FxHashMap<String, Value> {
    FxHashMap::default()
}
