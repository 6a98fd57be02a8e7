//! `POST /api/form/enrich`, `GET /api/form/stream/{id}`, `GET
//! /api/form/session/{id}` — the progressive enrichment engine's HTTP face.
//!
//! The id returned from `enrich` addresses this request's event stream and
//! cache key; it is deliberately not the same value as
//! [`crate::domain::EnrichmentSession::session_id`] (that one is minted
//! inside [`EnrichmentOrchestrator::run`] itself, after the call has
//! already started) — callers never see the difference, since every
//! lookup here goes back through this id.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::Json;
use futures_util::stream::Stream;
use futures_util::StreamExt;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use vantage::event_bus::EventBus;

use crate::domain::EnrichmentSession;
use crate::errors::ApiError;
use crate::events::parse_wire_event;
use crate::http::envelope::ApiResponse;
use crate::http::stream_registry::StreamRegistry;
use crate::http::AppState;
use crate::normalize::{enrichment_cache_key, normalize_domain};
use crate::translator::translate_key;

/// Maps the HTTP-facing id to the cache key a completed run is filed
/// under, plus the one-shot event stream the run publishes to.
#[derive(Default)]
pub(crate) struct FormSessionRegistry {
    cache_keys: Mutex<FxHashMap<Uuid, String>>,
    streams: StreamRegistry<Uuid>,
}

impl FormSessionRegistry {
    /// The cache key `request_id` (the id returned by [`enrich`]) was
    /// registered under, if any — the lookup `/api/submit` uses to resolve
    /// a client-supplied `enrichment_session_id` back to a cached session
    /// without trusting the client to know the internal cache key.
    pub(crate) fn cache_key_for(&self, request_id: Uuid) -> Option<String> {
        self.cache_keys.lock().get(&request_id).cloned()
    }
}

#[derive(Debug, Deserialize)]
pub struct EnrichRequest {
    pub url: String,
    pub email: String,
}

pub async fn enrich(
    State(state): State<AppState>,
    Json(body): Json<EnrichRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if body.url.trim().is_empty() {
        return Err(ApiError::Validation("url must not be empty".to_string()));
    }
    if body.email.trim().is_empty() || !body.email.contains('@') {
        return Err(ApiError::Validation("email must be a valid address".to_string()));
    }

    let domain = normalize_domain(&body.url);
    let cache_key = enrichment_cache_key(&domain, &body.email);
    let request_id = Uuid::new_v4();

    let bus = EventBus::with_sinks(vec![]);
    let stream = bus.subscribe();
    state.form_sessions.cache_keys.lock().insert(request_id, cache_key);
    state.form_sessions.streams.insert(request_id, stream);

    let orchestrator = state.orchestrator.clone();
    let url = body.url.clone();
    let email = body.email.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run(&url, &email, bus).await {
            tracing::warn!(request_id = %request_id, error = %e, "enrichment run failed");
        }
    });

    Ok(Json(ApiResponse::ok(json!({
        "session_id": request_id,
        "stream_url": format!("/api/form/stream/{request_id}"),
    }))))
}

pub async fn stream(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let stream = state.form_sessions.streams.take(&session_id).ok_or(ApiError::NotFound)?;

    let sse_stream = stream.into_async_stream().filter_map(|event| async move {
        parse_wire_event(&event).map(|(scope, payload)| Ok(SseEvent::default().event(scope).json_data(payload).unwrap()))
    });

    Ok(Sse::new(sse_stream))
}

pub async fn session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ApiResponse<EnrichmentSession>>, ApiError> {
    let cache_key = state
        .form_sessions
        .cache_keys
        .lock()
        .get(&session_id)
        .cloned()
        .ok_or(ApiError::NotFound)?;

    let mut session = state
        .enrichment_cache
        .get(&cache_key)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .filter(|s| !s.is_expired())
        .ok_or(ApiError::NotFound)?;

    // Defensive re-application of the translator's fourth call site (the
    // read path); a no-op when L1-L3 already emitted canonical keys.
    session.fields = session.fields.into_iter().map(|(k, v)| (translate_key(&k), v)).collect();

    Ok(Json(ApiResponse::ok(session)))
}
