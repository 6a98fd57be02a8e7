//! HTTP surface (C6.1) — a small `axum` router exposing the progressive
//! enrichment engine and the analysis pipeline to a form-driven front end.
//!
//! Every handler renders through the same `{success, data?, error?,
//! metadata?}` envelope (see [`envelope`]); every streaming endpoint hands
//! back a single-subscriber `text/event-stream` built from
//! [`vantage::event_bus::EventStream`], the pattern `vantage`'s own
//! `ChannelSink` doc comments demonstrate for a web server.

mod envelope;
mod form;
mod stream_registry;
mod submissions;

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cache::EnrichmentCache;
use crate::config::LeadgraphConfig;
use crate::enrichment::orchestrator::EnrichmentOrchestrator;
use crate::persistence::{EditLedgerRepo, SubmissionRepo};
use crate::pipeline::AnalysisPipeline;
use form::FormSessionRegistry;
use submissions::SubmissionStreamRegistry;

pub use envelope::ApiResponse;

/// Everything a handler needs, cloned cheaply per request (every field is
/// an `Arc`). Built once in `main.rs` and handed to [`router`].
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<LeadgraphConfig>,
    pub orchestrator: Arc<EnrichmentOrchestrator>,
    pub pipeline: Arc<AnalysisPipeline>,
    pub submissions: Arc<dyn SubmissionRepo>,
    pub ledger: Arc<dyn EditLedgerRepo>,
    pub enrichment_cache: Arc<EnrichmentCache>,
    pub(crate) form_sessions: Arc<FormSessionRegistry>,
    pub(crate) submission_streams: Arc<SubmissionStreamRegistry>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: Arc<LeadgraphConfig>,
        orchestrator: Arc<EnrichmentOrchestrator>,
        pipeline: Arc<AnalysisPipeline>,
        submissions: Arc<dyn SubmissionRepo>,
        ledger: Arc<dyn EditLedgerRepo>,
        enrichment_cache: Arc<EnrichmentCache>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            pipeline,
            submissions,
            ledger,
            enrichment_cache,
            form_sessions: Arc::new(FormSessionRegistry::default()),
            submission_streams: Arc::new(SubmissionStreamRegistry::default()),
        }
    }
}

/// Assemble the full router: CORS restricted to
/// [`LeadgraphConfig::allowed_stream_origins`], request tracing via
/// `tower_http`, and the five routes spec section 6.1 names.
#[must_use]
pub fn router(state: AppState) -> Router {
    let cors = build_cors(&state.config.allowed_stream_origins);

    Router::new()
        .route("/api/form/enrich", post(form::enrich))
        .route("/api/form/stream/:session_id", get(form::stream))
        .route("/api/form/session/:session_id", get(form::session))
        .route("/api/submit", post(submissions::submit))
        .route("/api/submissions/:id/stream", get(submissions::stream))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .max_age(Duration::from_secs(600));

    if allowed_origins.is_empty() {
        // No origins configured (development default): permissive, since
        // there is nothing narrower to restrict to.
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<_> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
