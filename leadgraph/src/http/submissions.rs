//! `POST /api/submit` and `GET /api/submissions/{id}/stream` — the
//! analysis pipeline's HTTP face.
//!
//! `submit` never runs [`AnalysisPipeline::run`] inline: it persists the
//! submission, registers its event stream, and hands the run to a spawned
//! task, matching C4's own "errors in peripheral enrichment never fail the
//! whole request" posture carried one level up — here it is the HTTP
//! response itself that must return before the (multi-second, multi-LLM
//! call) pipeline has anything to say.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::Json;
use futures_util::stream::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use vantage::event_bus::{Event, EventBus};

use crate::domain::{EnrichmentSession, Industry, Submission};
use crate::errors::{ApiError, SubmissionError};
use crate::events::{LeadEvent, SessionEvents};
use crate::http::envelope::ApiResponse;
use crate::http::stream_registry::StreamRegistry;
use crate::http::AppState;
use crate::pipeline::stage_id_from_error;
use crate::session_loader::{load_and_merge, user_fields_from_json};

#[derive(Default)]
pub(crate) struct SubmissionStreamRegistry {
    streams: StreamRegistry<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub contact_name: String,
    pub contact_email: String,
    pub company_name: String,
    pub website: String,
    pub industry: String,
    pub challenge: String,
    pub enrichment_session_id: Option<Uuid>,
    #[serde(flatten)]
    pub fields: Value,
}

fn parse_industry(raw: &str) -> Industry {
    match raw.to_ascii_lowercase().as_str() {
        "technology" => Industry::Technology,
        "retail" => Industry::Retail,
        "healthcare" => Industry::Healthcare,
        "finance" => Industry::Finance,
        "manufacturing" => Industry::Manufacturing,
        "hospitality" => Industry::Hospitality,
        "education" => Industry::Education,
        "real_estate" | "realestate" => Industry::RealEstate,
        _ => Industry::Other(raw.to_string()),
    }
}

pub async fn submit(
    State(state): State<AppState>,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let industry = parse_industry(&body.industry);
    let submission = Submission::new(
        0,
        &body.contact_name,
        &body.contact_email,
        &body.company_name,
        &body.website,
        industry.clone(),
        &body.challenge,
        body.enrichment_session_id,
    )
    .map_err(SubmissionError::from)?;

    let id = state.submissions.insert(&submission).await.map_err(|e| ApiError::Internal(e.to_string()))?;

    let cache_key_hint = body.enrichment_session_id.and_then(|rid| state.form_sessions.cache_key_for(rid));
    let user_fields = user_fields_from_json(&body.fields);
    let hydrated =
        load_and_merge(&state.enrichment_cache, state.ledger.as_ref(), body.enrichment_session_id, cache_key_hint.as_deref(), &user_fields)
            .await;

    let mut session = hydrated.session.unwrap_or_else(|| EnrichmentSession::new(cache_key_hint.unwrap_or_default(), &body.website, &body.contact_email));
    for obs in hydrated.observations.iter().filter(|o| o.is_from_user()) {
        session.fields.insert(obs.field.clone(), obs.value.clone());
        session.confidence.insert(obs.field.clone(), obs.confidence);
    }

    let bus = EventBus::with_sinks(vec![]);
    let stream = bus.subscribe();
    state.submission_streams.streams.insert(id, stream);

    let pipeline = state.pipeline.clone();
    let submissions = state.submissions.clone();
    let company_name = body.company_name.clone();
    let industry_label = body.industry.clone();
    let challenge = body.challenge.clone();
    let mut submission_for_run = submission;
    submission_for_run.id = id;

    tokio::spawn(async move {
        let events = SessionEvents::new(std::sync::Arc::new(bus));
        run_pipeline(&pipeline, submissions.as_ref(), &mut submission_for_run, &session, &company_name, &industry_label, &challenge, &events)
            .await;
    });

    Ok(Json(ApiResponse::ok(json!({ "id": id }))))
}

async fn run_pipeline(
    pipeline: &crate::pipeline::AnalysisPipeline,
    submissions: &dyn crate::persistence::SubmissionRepo,
    submission: &mut Submission,
    session: &EnrichmentSession,
    company: &str,
    industry: &str,
    challenge: &str,
    events: &SessionEvents,
) {
    match pipeline.run(session, company, industry, challenge).await {
        Ok(report) => {
            submission.mark_completed(report);
            let _ = submissions.update(submission).await;
            events.publish(LeadEvent::PipelineComplete { report_available: true, events_dropped: events.dropped() });
        }
        Err(e) => {
            let stage_id = stage_id_from_error(&e).unwrap_or(0);
            submission.mark_failed(format!("analysis pipeline failed at stage {stage_id}: {e}"));
            let _ = submissions.update(submission).await;
            events.publish(LeadEvent::Error { where_: "pipeline", kind: "pipeline_failed".to_string(), message: e.to_string() });
            events.publish(LeadEvent::PipelineComplete { report_available: false, events_dropped: events.dropped() });
        }
    }
}

pub async fn stream(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let stream = state.submission_streams.streams.take(&id).ok_or(ApiError::NotFound)?;

    let sse_stream = stream
        .into_async_stream()
        .filter_map(|event: Event| async move { crate::events::parse_wire_event(&event) })
        .map(|(scope, payload)| Ok(SseEvent::default().event(scope).json_data(payload).unwrap()));

    Ok(Sse::new(sse_stream))
}

