//! Event Stream (C9) — the leadgraph-specific payload shapes carried over
//! `vantage::event_bus`, plus the per-submission sequence counter the
//! transport needs for "client must tolerate duplicates, idempotent by
//! event kind + monotone sequence id".
//!
//! Every [`LeadEvent`] is wrapped as `vantage::event_bus::Event::Diagnostic`
//! (scope = the event kind, message = the JSON envelope including `seq`)
//! rather than inventing a second transport: nodes already have
//! `NodeContext::emit_diagnostic`, and `EventBus`/`EventStream` already give
//! the single-subscriber, at-least-once, lag-aware channel this component
//! asks for.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;
use vantage::event_bus::{Event, EventBus, EventStream};

/// One event in the ordering `{enrichment_started, layer1_complete,
/// layer2_complete, layer3_complete, stage_started_1, stage_complete_1,
/// …, stage_complete_6, pipeline_complete}` (plus `error`, which can
/// interleave with any of the above).
#[derive(Debug, Clone)]
pub enum LeadEvent {
    EnrichmentStarted {
        session_id: Uuid,
        domain: String,
    },
    LayerComplete {
        layer: u8,
        fields: Value,
        confidences: Value,
        cost_usd: f64,
    },
    StageStarted {
        stage_id: u8,
    },
    StageComplete {
        stage_id: u8,
        duration_ms: u64,
        cost_usd: f64,
    },
    PipelineComplete {
        report_available: bool,
        events_dropped: usize,
    },
    Error {
        where_: &'static str,
        kind: String,
        message: String,
    },
}

impl LeadEvent {
    /// The scope string used as the event's discriminator on the wire,
    /// e.g. `layer1_complete`, `stage_started`, `pipeline_complete`.
    #[must_use]
    pub fn scope(&self) -> String {
        match self {
            Self::EnrichmentStarted { .. } => "enrichment_started".to_string(),
            Self::LayerComplete { layer, .. } => format!("layer{layer}_complete"),
            Self::StageStarted { .. } => "stage_started".to_string(),
            Self::StageComplete { .. } => "stage_complete".to_string(),
            Self::PipelineComplete { .. } => "pipeline_complete".to_string(),
            Self::Error { .. } => "error".to_string(),
        }
    }

    fn payload(&self) -> Value {
        match self {
            Self::EnrichmentStarted { session_id, domain } => json!({
                "session_id": session_id,
                "domain": domain,
            }),
            Self::LayerComplete { fields, confidences, cost_usd, .. } => json!({
                "fields": fields,
                "confidences": confidences,
                "cost_usd": cost_usd,
            }),
            Self::StageStarted { stage_id } => json!({ "stage_id": stage_id }),
            Self::StageComplete { stage_id, duration_ms, cost_usd } => json!({
                "stage_id": stage_id,
                "duration_ms": duration_ms,
                "cost_usd": cost_usd,
            }),
            Self::PipelineComplete { report_available, events_dropped } => json!({
                "report_available": report_available,
                "events_dropped": events_dropped,
            }),
            Self::Error { where_, kind, message } => json!({
                "where": where_,
                "kind": kind,
                "message": message,
            }),
        }
    }
}

/// `seq`-stamped envelope, the unit actually serialized onto the wire.
#[derive(Debug, Clone, Serialize)]
struct Envelope {
    seq: u64,
    kind: String,
    #[serde(flatten)]
    payload: Value,
}

/// Render `event` into its wire scope and serialized envelope, stamped with
/// `seq`. Used by workflow nodes (the enrichment layers, the analysis
/// stages) that publish through `NodeContext::emit_diagnostic` directly
/// rather than through a [`SessionEvents`] handle — a node only has a
/// sequence number carried forward in the run's own state, not a counter of
/// its own.
#[must_use]
pub fn stamp(seq: u64, event: &LeadEvent) -> (String, String) {
    let envelope = Envelope {
        seq,
        kind: event.scope(),
        payload: event.payload(),
    };
    (event.scope(), serde_json::to_string(&envelope).unwrap_or_default())
}

/// Per-submission event publisher: owns the monotone sequence counter and
/// the `EventBus` events are multiplexed through.
///
/// One `SessionEvents` per in-flight submission, used for events published
/// outside workflow-node execution: the cache-hit synthetic `layer3_complete`
/// and any `pipeline_complete`/`error` event a driver publishes after a run
/// finishes. Events published from inside a node use [`stamp`] directly so
/// their sequence number comes from the run's own state instead of a second,
/// independent counter.
pub struct SessionEvents {
    bus: Arc<EventBus>,
    seq: AtomicU64,
}

impl SessionEvents {
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            seq: AtomicU64::new(1),
        }
    }

    /// Start the counter from `next_seq` rather than 1, continuing a
    /// sequence a node-driven run already advanced.
    #[must_use]
    pub fn starting_from(bus: Arc<EventBus>, next_seq: u64) -> Self {
        Self {
            bus,
            seq: AtomicU64::new(next_seq),
        }
    }

    /// Publish one event, stamping it with the next sequence number.
    /// Best-effort: a publish failure (no listener started, channel full)
    /// is not surfaced to the caller, matching the "events are advisory,
    /// the durable cache is the source of truth" rule.
    pub fn publish(&self, event: LeadEvent) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let (scope, message) = stamp(seq, &event);
        let emitter = self.bus.get_emitter();
        let _ = vantage::event_bus::EventEmitter::emit(&*emitter, Event::diagnostic(scope, message));
    }

    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        self.bus.subscribe()
    }

    /// Count of events dropped so far because the subscriber (the SSE
    /// client) lagged behind the bounded buffer. Surfaced as
    /// `events_dropped` on `pipeline_complete`.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.bus.dropped()
    }
}

/// Parse a wire event back into its scope and JSON payload, for the SSE
/// handler translating `vantage::event_bus::Event`s into `text/event-stream`
/// frames. Returns `None` for event kinds this component never emits
/// (`Node`/`LLM`), which should not reach a client subscribed to this
/// stream.
#[must_use]
pub fn parse_wire_event(event: &Event) -> Option<(String, Value)> {
    let Event::Diagnostic(diag) = event else {
        return None;
    };
    let envelope: Value = serde_json::from_str(diag.message()).ok()?;
    Some((diag.scope().to_string(), envelope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage::event_bus::StdOutSink;

    #[test]
    fn scope_names_match_the_documented_event_kinds() {
        assert_eq!(
            LeadEvent::LayerComplete { layer: 1, fields: json!({}), confidences: json!({}), cost_usd: 0.0 }.scope(),
            "layer1_complete"
        );
        assert_eq!(LeadEvent::PipelineComplete { report_available: true, events_dropped: 0 }.scope(), "pipeline_complete");
    }

    #[tokio::test]
    async fn published_events_carry_strictly_increasing_sequence_numbers() {
        let bus = Arc::new(EventBus::with_sink(StdOutSink::default()));
        bus.listen_for_events();
        let events = SessionEvents::new(Arc::clone(&bus));
        let mut stream = events.subscribe();

        events.publish(LeadEvent::EnrichmentStarted { session_id: Uuid::nil(), domain: "acme.com".to_string() });
        events.publish(LeadEvent::LayerComplete {
            layer: 1,
            fields: json!({"name": "Acme"}),
            confidences: json!({"name": 80}),
            cost_usd: 0.0,
        });

        let (first_scope, first) = parse_wire_event(&stream.recv().await.unwrap()).unwrap();
        let (second_scope, second) = parse_wire_event(&stream.recv().await.unwrap()).unwrap();
        assert_eq!(first_scope, "enrichment_started");
        assert_eq!(second_scope, "layer1_complete");
        assert_eq!(first["seq"], json!(1));
        assert_eq!(second["seq"], json!(2));
    }
}
