//! Run and session id generation.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates process-unique run ids. Cheap to construct; holds no state of
/// its own beyond the shared atomic counter.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdGenerator;

impl IdGenerator {
    pub fn new() -> Self {
        Self
    }

    /// A short, sortable id suitable for a default session/run identifier.
    pub fn generate_run_id(&self) -> String {
        let seq = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("run-{seq}-{}", Uuid::new_v4())
    }
}
