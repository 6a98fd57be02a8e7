//! Progressive Orchestrator (C4) — the three-layer, time-budgeted, parallel
//! enrichment run, built as a [`vantage::graphs::GraphBuilder`] app: one
//! [`LayerNode`] per layer, wired `Start -> layer1 -> layer2 -> layer3 ->
//! End`. The merge tie-break (user wins, then confidence, then layer, then
//! arrival order) is already [`vantage::reducers::winner_among`]; a layer
//! node only ever appends [`FieldObservation`]s, never overwrites one.
//!
//! Each layer fans out to its [`EnrichmentSource`] roster with a
//! `tokio::task::JoinSet`, a per-source [`EnrichmentSource::timeout`], and a
//! layer-wide deadline so one hung adapter never holds up the others past
//! its budget. `NodeContext` carries no cancellation hook, so an in-flight
//! run's [`tokio_util::sync::CancellationToken`] lives in
//! [`CancellationRegistry`], keyed by session id and consulted by every
//! layer's wait loop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use vantage::app::App;
use vantage::event_bus::EventBus;
use vantage::graphs::GraphBuilder;
use vantage::node::{Node, NodeContext, NodeError, NodePartial};
use vantage::observation::FieldObservation;
use vantage::reducers::winner_among;
use vantage::runtimes::runner::RunnerError;
use vantage::runtimes::{AppRunner, CheckpointerType};
use vantage::state::{StateSnapshot, VersionedState};
use vantage::types::NodeKind;

use crate::breaker::BreakerRegistry;
use crate::cache::EnrichmentCache;
use crate::domain::{EnrichmentSession, SessionStatus, SourceAttribution};
use crate::errors::SourceErrorKind;
use crate::events::{stamp, LeadEvent, SessionEvents};
use crate::normalize::{enrichment_cache_key, normalize_domain};
use crate::persistence::EditLedgerRepo;
use crate::sources::{EnrichmentHints, EnrichmentSource, SourceField, SourceResult};
use crate::translator::translate_key;

const L1_BUDGET: Duration = Duration::from_secs(2);
const L2_BUDGET: Duration = Duration::from_secs(6);
const L3_BUDGET: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Diagnostic)]
pub enum OrchestratorError {
    #[error("enrichment run failed: {0}")]
    #[diagnostic(code(leadgraph::enrichment::run_failed))]
    Run(#[from] RunnerError),
}

/// Per-session cancellation tokens. A run registers one at start and the
/// driver (or an HTTP cancel endpoint) calls [`Self::cancel`] with the same
/// session id to stop it; every layer node looks its token up by the same
/// key so cancellation reaches whichever layer is currently in flight.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: Mutex<FxHashMap<Uuid, CancellationToken>>,
}

impl CancellationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, session_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().insert(session_id, token.clone());
        token
    }

    fn token_for(&self, session_id: Uuid) -> CancellationToken {
        self.tokens
            .lock()
            .entry(session_id)
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    fn forget(&self, session_id: Uuid) {
        self.tokens.lock().remove(&session_id);
    }

    /// Cancel the run registered under `session_id`. Returns `false` if no
    /// run with that id is currently in flight.
    pub fn cancel(&self, session_id: Uuid) -> bool {
        match self.tokens.lock().get(&session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

fn extra_str(extra: &FxHashMap<String, Value>, key: &'static str) -> Result<String, NodeError> {
    extra
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(NodeError::MissingInput { what: key })
}

fn extra_uuid(extra: &FxHashMap<String, Value>, key: &'static str) -> Result<Uuid, NodeError> {
    let raw = extra_str(extra, key)?;
    Uuid::parse_str(&raw).map_err(|_| NodeError::MissingInput { what: key })
}

fn edit_count_for(extra: &FxHashMap<String, Value>, canonical_field: &str) -> u32 {
    extra
        .get("user_edit_counts")
        .and_then(|counts| counts.get(canonical_field))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32
}

fn next_event_seq(extra: &FxHashMap<String, Value>) -> u64 {
    extra.get("event_seq").and_then(Value::as_u64).unwrap_or(1)
}

/// Hints passed down from whatever an earlier layer has already merged,
/// narrowing what a later layer's sources query for.
fn build_hints(snapshot: &StateSnapshot, fields_so_far: &Value) -> EnrichmentHints {
    let company_name = snapshot
        .best_for("name")
        .map(|obs| obs.value.as_str().unwrap_or_default().to_string());
    let country_hint = snapshot
        .best_for("country")
        .map(|obs| obs.value.as_str().unwrap_or_default().to_string());
    EnrichmentHints {
        company_name,
        country_hint,
        fields_so_far: fields_so_far.clone(),
    }
}

/// One outcome of fanning a layer's sources out in parallel: the adapter
/// name, its declared confidence prior, and its result if it produced one.
struct LayerOutcome {
    source: &'static str,
    prior: u8,
    result: Option<SourceResult>,
}

/// Runs every source in `roster` whose breaker currently allows a call, in
/// parallel, bounded by `layer_budget` and `cancel`. A source's own
/// [`EnrichmentSource::timeout`] is enforced independently and always wins
/// if it is tighter than what remains of the layer budget.
async fn run_layer(
    roster: &[Arc<dyn EnrichmentSource>],
    domain: &str,
    hints: &EnrichmentHints,
    breakers: &Arc<BreakerRegistry>,
    layer_budget: Duration,
    cancel: &CancellationToken,
) -> Vec<LayerOutcome> {
    let mut set: JoinSet<LayerOutcome> = JoinSet::new();

    for source in roster {
        let breaker = breakers.get_or_create(source.name(), source.breaker_config());
        if !breaker.allow_call() {
            continue;
        }
        let source = Arc::clone(source);
        let domain = domain.to_string();
        let hints = hints.clone();
        let breakers = Arc::clone(breakers);
        set.spawn(async move {
            let name = source.name();
            let config = source.breaker_config();
            let prior = source.confidence_prior();
            let outcome = timeout(source.timeout(), source.enrich(&domain, &hints)).await;
            let (error_kind, result) = match outcome {
                Ok(Ok(result)) => (None, Some(result)),
                Ok(Err(kind)) => (Some(kind), None),
                Err(_elapsed) => (Some(SourceErrorKind::Timeout), None),
            };
            breakers.get_or_create(name, config).record_outcome(error_kind);
            LayerOutcome { source: name, prior, result }
        });
    }

    let mut outcomes = Vec::new();
    let deadline = tokio::time::sleep(layer_budget);
    tokio::pin!(deadline);
    loop {
        if set.is_empty() {
            break;
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = &mut deadline => break,
            joined = set.join_next() => {
                match joined {
                    Some(Ok(outcome)) => outcomes.push(outcome),
                    Some(Err(_join_error)) => {}
                    None => break,
                }
            }
        }
    }
    set.abort_all();
    outcomes
}

/// Turns this layer's successful [`LayerOutcome`]s into canonical-field
/// [`FieldObservation`]s, applying the confidence formula: agreement
/// between sources raises the base above any single prior, then the
/// user-edit penalty is subtracted.
fn score_observations(outcomes: &[LayerOutcome], layer: u8, extra: &FxHashMap<String, Value>) -> (Vec<FieldObservation>, f64) {
    struct Raw<'a> {
        source: &'a str,
        canonical: String,
        field: &'a SourceField,
        prior: u8,
    }

    let mut raws = Vec::new();
    let mut agreement: FxHashMap<(String, String), Vec<u8>> = FxHashMap::default();
    let mut cost_usd = 0.0;

    for outcome in outcomes {
        let Some(result) = &outcome.result else { continue };
        cost_usd += result.cost_usd;
        for field in &result.fields {
            let canonical = translate_key(&field.key);
            let value_key = field.normalized_value.to_string();
            agreement.entry((canonical.clone(), value_key)).or_default().push(outcome.prior);
            raws.push(Raw { source: outcome.source, canonical, field, prior: outcome.prior });
        }
    }

    let mut observations = Vec::new();
    for raw in raws {
        let value_key = raw.field.normalized_value.to_string();
        let group = agreement.get(&(raw.canonical.clone(), value_key)).expect("just inserted above");
        let base = if group.len() > 1 {
            let max_prior = group.iter().copied().max().unwrap_or(raw.prior);
            u8::try_from((max_prior as u16 + 5).min(100)).unwrap_or(100)
        } else {
            raw.prior
        };
        let edits = edit_count_for(extra, &raw.canonical);
        let penalty = u8::try_from((edits * 5).min(u32::from(base))).unwrap_or(base);
        let confidence = base.saturating_sub(penalty);
        observations.push(FieldObservation::new(
            raw.canonical,
            raw.field.normalized_value.clone(),
            raw.source,
            layer,
            confidence,
        ));
    }

    (observations, cost_usd)
}

/// Folds the full fields ledger (prior layers' observations plus this
/// layer's new ones) down to one winner per canonical field, building the
/// post-normalization view a `layer{N}_complete` event and a persisted
/// [`EnrichmentSession`] both need.
fn fold_session(
    session_id: Uuid,
    cache_key: &str,
    website_url: &str,
    requester_email: &str,
    prior_fields: &[FieldObservation],
    new_observations: &[FieldObservation],
    total_cost_usd: f64,
    layer: u8,
    cancelled: bool,
) -> EnrichmentSession {
    let mut by_field: FxHashMap<&str, Vec<&FieldObservation>> = FxHashMap::default();
    for obs in prior_fields.iter().chain(new_observations.iter()) {
        by_field.entry(obs.field.as_str()).or_default().push(obs);
    }

    let mut session = EnrichmentSession::new(cache_key, website_url, requester_email);
    session.session_id = session_id;

    let mut fields = BTreeMap::new();
    let mut attribution = BTreeMap::new();
    let mut confidence = BTreeMap::new();
    for (field, candidates) in by_field {
        let Some(winner) = winner_among(candidates.into_iter()) else { continue };
        if !winner.success {
            continue;
        }
        fields.insert(field.to_string(), winner.value.clone());
        confidence.insert(field.to_string(), winner.confidence);
        attribution.insert(
            field.to_string(),
            SourceAttribution {
                source: winner.source.clone(),
                layer: winner.layer,
                raw_value: winner.raw_value.clone(),
                normalized_value: winner.value.clone(),
                cost_usd: 0.0,
                extracted_at: winner.extracted_at,
                success: winner.success,
            },
        );
    }

    session.fields = fields;
    session.attribution = attribution;
    session.confidence = confidence;
    session.total_cost_usd = total_cost_usd;
    session.status = if cancelled {
        SessionStatus::Aborted
    } else if layer == 3 {
        SessionStatus::Complete
    } else {
        SessionStatus::InProgress
    };
    if session.status != SessionStatus::InProgress {
        session.completed_at = Some(Utc::now());
    }
    session
}

/// One enrichment layer (L1, L2, or L3) as a graph node. Stateless and
/// shared across every session that runs through the compiled app; the
/// per-run data it needs (`session_id`, `domain`, `cache_key`, ...) comes
/// entirely from the snapshot's `extra` channel, seeded once by
/// [`EnrichmentOrchestrator::run`].
struct LayerNode {
    layer: u8,
    budget: Duration,
    sources: Vec<Arc<dyn EnrichmentSource>>,
    breakers: Arc<BreakerRegistry>,
    cache: Arc<EnrichmentCache>,
    cancellations: Arc<CancellationRegistry>,
}

#[async_trait]
impl Node for LayerNode {
    async fn run(&self, snapshot: StateSnapshot, ctx: NodeContext) -> Result<NodePartial, NodeError> {
        let session_id = extra_uuid(&snapshot.extra, "session_id")?;
        let domain = extra_str(&snapshot.extra, "domain")?;
        let cache_key = extra_str(&snapshot.extra, "cache_key")?;
        let website_url = extra_str(&snapshot.extra, "website_url")?;
        let requester_email = snapshot
            .extra
            .get("requester_email")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let cancel = self.cancellations.token_for(session_id);
        let mut seq = next_event_seq(&snapshot.extra);

        if self.layer == 1 {
            let (scope, message) = stamp(seq, &LeadEvent::EnrichmentStarted { session_id, domain: domain.clone() });
            let _ = ctx.emit_diagnostic(scope, message);
            seq += 1;
        }

        let prior_cost = snapshot.extra.get("total_cost_usd").and_then(Value::as_f64).unwrap_or(0.0);

        let (new_observations, layer_cost, fields_so_far_json) = if cancel.is_cancelled() {
            (Vec::new(), 0.0, json!({}))
        } else {
            let mut fields_so_far = serde_json::Map::new();
            for obs in &snapshot.fields {
                if obs.success {
                    fields_so_far.insert(obs.field.clone(), obs.value.clone());
                }
            }
            let hints = build_hints(&snapshot, &Value::Object(fields_so_far.clone()));
            let outcomes = run_layer(&self.sources, &domain, &hints, &self.breakers, self.budget, &cancel).await;
            let (observations, cost) = score_observations(&outcomes, self.layer, &snapshot.extra);
            (observations, cost, Value::Object(fields_so_far))
        };
        let _ = fields_so_far_json;

        let total_cost = prior_cost + layer_cost;

        let session = fold_session(
            session_id,
            &cache_key,
            &website_url,
            &requester_email,
            &snapshot.fields,
            &new_observations,
            total_cost,
            self.layer,
            cancel.is_cancelled(),
        );

        let fields_value = serde_json::to_value(&session.fields).unwrap_or_else(|_| json!({}));
        let confidences_value = serde_json::to_value(&session.confidence).unwrap_or_else(|_| json!({}));
        let (scope, message) = stamp(
            seq,
            &LeadEvent::LayerComplete {
                layer: self.layer,
                fields: fields_value,
                confidences: confidences_value,
                cost_usd: total_cost,
            },
        );
        let _ = ctx.emit_diagnostic(scope, message);
        seq += 1;

        if session.status != SessionStatus::Aborted {
            let _ = self.cache.put(&cache_key, &session).await;
        } else {
            self.cancellations.forget(session_id);
        }

        let mut extra = FxHashMap::default();
        extra.insert("total_cost_usd".to_string(), json!(total_cost));
        extra.insert("event_seq".to_string(), json!(seq));

        Ok(NodePartial::new().with_fields(new_observations).with_extra(extra))
    }
}

/// Builds the three-layer enrichment graph and runs it per submission,
/// consulting [`EnrichmentCache`] for a cache hit before doing any work.
pub struct EnrichmentOrchestrator {
    app: Arc<App>,
    cache: Arc<EnrichmentCache>,
    cancellations: Arc<CancellationRegistry>,
    ledger: Arc<dyn EditLedgerRepo>,
}

impl EnrichmentOrchestrator {
    /// Builds the compiled graph from three already-assembled source
    /// rosters (L1, L2, L3). Which adapters land in which roster — and
    /// whether an optional one like LinkedIn is even constructed — is a
    /// caller concern (`main.rs`, from [`crate::config::SourceKeys`]); the
    /// orchestrator itself never branches on a source's identity. `ledger`
    /// supplies the per-field edit counts [`crate::session_loader::edit_counts`]
    /// turns into the confidence-penalty term.
    #[must_use]
    pub fn new(
        l1: Vec<Arc<dyn EnrichmentSource>>,
        l2: Vec<Arc<dyn EnrichmentSource>>,
        l3: Vec<Arc<dyn EnrichmentSource>>,
        breakers: Arc<BreakerRegistry>,
        cache: Arc<EnrichmentCache>,
        ledger: Arc<dyn EditLedgerRepo>,
    ) -> Self {
        let cancellations = Arc::new(CancellationRegistry::new());

        let layer1 = "layer1".to_string();
        let layer2 = "layer2".to_string();
        let layer3 = "layer3".to_string();

        let app = GraphBuilder::new()
            .add_node(
                NodeKind::Custom(layer1.clone()),
                LayerNode {
                    layer: 1,
                    budget: L1_BUDGET,
                    sources: l1,
                    breakers: Arc::clone(&breakers),
                    cache: Arc::clone(&cache),
                    cancellations: Arc::clone(&cancellations),
                },
            )
            .add_node(
                NodeKind::Custom(layer2.clone()),
                LayerNode {
                    layer: 2,
                    budget: L2_BUDGET,
                    sources: l2,
                    breakers: Arc::clone(&breakers),
                    cache: Arc::clone(&cache),
                    cancellations: Arc::clone(&cancellations),
                },
            )
            .add_node(
                NodeKind::Custom(layer3.clone()),
                LayerNode {
                    layer: 3,
                    budget: L3_BUDGET,
                    sources: l3,
                    breakers,
                    cache: Arc::clone(&cache),
                    cancellations: Arc::clone(&cancellations),
                },
            )
            .add_edge(NodeKind::Start, NodeKind::Custom(layer1.clone()))
            .add_edge(NodeKind::Custom(layer1), NodeKind::Custom(layer2.clone()))
            .add_edge(NodeKind::Custom(layer2), NodeKind::Custom(layer3.clone()))
            .add_edge(NodeKind::Custom(layer3), NodeKind::End)
            .compile();

        Self { app: Arc::new(app), cache, cancellations, ledger }
    }

    /// Cancels the in-flight run for `session_id`, if any. Propagation to
    /// whatever layer is currently fanning its sources out is near-instant:
    /// every layer's wait loop selects on the same token.
    pub fn cancel(&self, session_id: Uuid) -> bool {
        self.cancellations.cancel(session_id)
    }

    /// Runs the three-layer enrichment for `website_url`/`requester_email`
    /// over `event_bus`, a fresh per-submission bus the caller owns (the
    /// per-request isolation pattern `vantage::event_bus::EventBus`
    /// documents). Returns the completed [`EnrichmentSession`], either
    /// freshly computed or, on a cache hit, read straight from
    /// [`EnrichmentCache`] without running the graph at all.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] only if the underlying graph run
    /// itself fails to execute; a failed/timed-out source never surfaces
    /// here; it is folded into the session as a partial result instead.
    pub async fn run(
        &self,
        website_url: &str,
        requester_email: &str,
        event_bus: EventBus,
    ) -> Result<EnrichmentSession, OrchestratorError> {
        let domain = normalize_domain(website_url);
        let cache_key = enrichment_cache_key(&domain, requester_email);

        if let Ok(Some(cached)) = self.cache.get(&cache_key).await {
            if !cached.is_expired() {
                let events = SessionEvents::new(Arc::new(event_bus));
                let fields = serde_json::to_value(&cached.fields).unwrap_or_else(|_| json!({}));
                let confidences = serde_json::to_value(&cached.confidence).unwrap_or_else(|_| json!({}));
                events.publish(LeadEvent::LayerComplete {
                    layer: 3,
                    fields,
                    confidences,
                    cost_usd: cached.total_cost_usd,
                });
                return Ok(cached);
            }
        }

        let session_id = Uuid::new_v4();
        self.cancellations.register(session_id);

        let edit_counts = crate::session_loader::edit_counts(self.ledger.as_ref()).await;

        let initial_state = VersionedState::builder()
            .with_extra("session_id", json!(session_id))
            .with_extra("domain", json!(domain))
            .with_extra("cache_key", json!(cache_key))
            .with_extra("website_url", json!(website_url))
            .with_extra("requester_email", json!(requester_email))
            .with_extra("user_edit_counts", json!(edit_counts))
            .build();

        let mut runner =
            AppRunner::with_options_arc_and_bus(Arc::clone(&self.app), CheckpointerType::InMemory, false, event_bus, true)
                .await;

        runner.create_session(session_id.to_string(), initial_state).await.map_err(OrchestratorError::Run)?;
        let final_state = runner.run_until_complete(&session_id.to_string()).await.map_err(OrchestratorError::Run)?;
        self.cancellations.forget(session_id);

        let snapshot = final_state.snapshot();
        let total_cost = snapshot.extra.get("total_cost_usd").and_then(Value::as_f64).unwrap_or(0.0);
        let session = fold_session(
            session_id,
            &cache_key,
            website_url,
            requester_email,
            &snapshot.fields,
            &[],
            total_cost,
            3,
            false,
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::cache::InMemoryKvStore;
    use crate::persistence::InMemoryEditLedger;

    struct StubSource {
        name: &'static str,
        field: &'static str,
        value: Value,
        prior: u8,
        delay: Duration,
        fail: bool,
        calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl EnrichmentSource for StubSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(500)
        }

        fn cost_estimate_usd(&self) -> f64 {
            0.01
        }

        fn breaker_config(&self) -> BreakerConfig {
            BreakerConfig::llm_or_metadata()
        }

        fn confidence_prior(&self) -> u8 {
            self.prior
        }

        async fn enrich(&self, _domain: &str, _hints: &EnrichmentHints) -> Result<SourceResult, SourceErrorKind> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(SourceErrorKind::Network);
            }
            Ok(SourceResult {
                fields: vec![SourceField::simple(self.field, self.value.clone())],
                cost_usd: 0.01,
            })
        }
    }

    fn registry() -> Arc<BreakerRegistry> {
        Arc::new(BreakerRegistry::new())
    }

    #[tokio::test]
    async fn run_layer_collects_successful_outcomes_within_budget() {
        let sources: Vec<Arc<dyn EnrichmentSource>> = vec![Arc::new(StubSource {
            name: "stub_a",
            field: "company_name",
            value: json!("Acme"),
            prior: 70,
            delay: Duration::from_millis(5),
            fail: false,
            calls: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        })];
        let outcomes = run_layer(
            &sources,
            "acme.com",
            &EnrichmentHints::default(),
            &registry(),
            Duration::from_millis(200),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_some());
    }

    #[tokio::test]
    async fn run_layer_drops_results_past_the_layer_budget() {
        let sources: Vec<Arc<dyn EnrichmentSource>> = vec![Arc::new(StubSource {
            name: "slow",
            field: "company_name",
            value: json!("Acme"),
            prior: 70,
            delay: Duration::from_millis(200),
            fail: false,
            calls: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        })];
        let outcomes = run_layer(
            &sources,
            "acme.com",
            &EnrichmentHints::default(),
            &registry(),
            Duration::from_millis(20),
            &CancellationToken::new(),
        )
        .await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_the_wait_loop_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let sources: Vec<Arc<dyn EnrichmentSource>> = vec![Arc::new(StubSource {
            name: "stub_a",
            field: "company_name",
            value: json!("Acme"),
            prior: 70,
            delay: Duration::from_secs(5),
            fail: false,
            calls: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        })];
        let started = tokio::time::Instant::now();
        let outcomes = run_layer(&sources, "acme.com", &EnrichmentHints::default(), &registry(), L1_BUDGET, &cancel).await;
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(outcomes.is_empty());
    }

    #[test]
    fn agreement_between_sources_raises_confidence_above_either_prior() {
        let outcomes = vec![
            LayerOutcome {
                source: "a",
                prior: 60,
                result: Some(SourceResult {
                    fields: vec![SourceField::simple("company_name", json!("Acme"))],
                    cost_usd: 0.0,
                }),
            },
            LayerOutcome {
                source: "b",
                prior: 70,
                result: Some(SourceResult {
                    fields: vec![SourceField::simple("company_name", json!("Acme"))],
                    cost_usd: 0.0,
                }),
            },
        ];
        let (observations, _cost) = score_observations(&outcomes, 1, &FxHashMap::default());
        assert_eq!(observations.len(), 2);
        assert!(observations.iter().all(|o| o.confidence == 75));
    }

    #[test]
    fn user_edits_reduce_confidence_for_that_field() {
        let outcomes = vec![LayerOutcome {
            source: "a",
            prior: 80,
            result: Some(SourceResult {
                fields: vec![SourceField::simple("company_name", json!("Acme"))],
                cost_usd: 0.0,
            }),
        }];
        let mut extra = FxHashMap::default();
        extra.insert("user_edit_counts".to_string(), json!({"name": 2}));
        let (observations, _cost) = score_observations(&outcomes, 1, &extra);
        assert_eq!(observations[0].confidence, 70);
    }

    #[tokio::test]
    async fn cache_hit_returns_without_running_any_source() {
        let store = Arc::new(InMemoryKvStore::new());
        let cache = Arc::new(EnrichmentCache::new(store, Duration::from_secs(3600)));

        let website_url = "https://www.google.com/";
        let requester_email = "user@example.com";
        let cache_key = enrichment_cache_key(&normalize_domain(website_url), requester_email);

        let mut session = EnrichmentSession::new(&cache_key, website_url, requester_email);
        session.fields.insert("name".to_string(), json!("Google"));
        session.confidence.insert("name".to_string(), 90);
        cache.put(&cache_key, &session).await.unwrap();

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let never_called: Vec<Arc<dyn EnrichmentSource>> = vec![Arc::new(StubSource {
            name: "must_not_run",
            field: "name",
            value: json!("Should not be called"),
            prior: 1,
            delay: Duration::ZERO,
            fail: true,
            calls: Arc::clone(&calls),
        })];
        let orchestrator = EnrichmentOrchestrator::new(
            never_called,
            Vec::new(),
            Vec::new(),
            registry(),
            Arc::clone(&cache),
            Arc::new(InMemoryEditLedger::default()),
        );

        let bus = EventBus::with_sink(vantage::event_bus::StdOutSink::default());
        let result = orchestrator.run(website_url, requester_email, bus).await;

        let returned = result.expect("cache hit must short-circuit the graph run, never error");
        assert_eq!(returned.cache_key, cache_key);
        assert_eq!(returned.fields.get("name"), Some(&json!("Google")));
        assert_eq!(
            calls.load(std::sync::atomic::Ordering::SeqCst),
            0,
            "a warm cache hit must never invoke any source"
        );
    }
}
