//! Progressive Enrichment Engine: the orchestrator (C4) that runs the
//! three-layer fan-out over [`crate::sources`], consulting [`crate::cache`]
//! and [`crate::breaker`] along the way.

pub mod orchestrator;

pub use orchestrator::{CancellationRegistry, EnrichmentOrchestrator, OrchestratorError};
