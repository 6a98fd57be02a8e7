//! Single-consumer handoff from a background run to its SSE handler.
//!
//! [`vantage::event_bus::EventStream`] is itself "single-subscriber,
//! at-least-once, lag-aware" (see `crate::events`'s module doc); this
//! registry is the matching single-consumer storage: a stream is
//! [`StreamRegistry::take`]n exactly once, by whichever request gets there
//! first. A second `GET` against the same id (reconnect, double-click)
//! finds nothing and the handler reports it as not-found rather than
//! silently handing out a stream nobody else can read.

use std::hash::Hash;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use vantage::event_bus::EventStream;

pub(crate) struct StreamRegistry<K> {
    streams: Mutex<FxHashMap<K, EventStream>>,
}

impl<K> Default for StreamRegistry<K> {
    fn default() -> Self {
        Self {
            streams: Mutex::new(FxHashMap::default()),
        }
    }
}

impl<K: Eq + Hash> StreamRegistry<K> {
    pub(crate) fn insert(&self, key: K, stream: EventStream) {
        self.streams.lock().insert(key, stream);
    }

    pub(crate) fn take(&self, key: &K) -> Option<EventStream> {
        self.streams.lock().remove(key)
    }
}
