//! Analysis Pipeline (C8) — six strictly-sequential stages over a completed
//! enrichment session, each wrapped by the [`crate::cache::StageCache`] and
//! calling [`crate::llm::client::LlmClient`] on a miss.
//!
//! Built the same way [`crate::enrichment::orchestrator`] builds C4: a
//! second [`vantage::graphs::GraphBuilder`] graph, one [`Node`] per stage,
//! linear edges `Start -> stage1 -> ... -> stage6 -> End`. Most stages are a
//! single LLM call and the node bodies are correspondingly simple; stage 2
//! (gap analysis) is the one exception and fans out its follow-up queries
//! the same way a [`crate::enrichment::orchestrator`] layer fans sources
//! out — a bounded `JoinSet` awaited to completion, not a group timeout,
//! since an LLM call already carries its own retry/timeout inside
//! [`LlmClient::call`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task::JoinSet;

use vantage::app::App;
use vantage::graphs::GraphBuilder;
use vantage::node::{Node, NodeContext, NodeError, NodePartial};
use vantage::runtimes::runner::RunnerError;
use vantage::runtimes::{AppRunner, CheckpointerType};
use vantage::state::{StateSnapshot, VersionedState};
use vantage::types::NodeKind;

use crate::cache::stage_cache::fingerprint;
use crate::cache::StageCache;
use crate::config::LlmConfig;
use crate::domain::{AnalysisStageResult, DataQualityTier, EnrichmentSession, Report, StageId};
use crate::events::{stamp, LeadEvent};
use crate::llm::client::{LlmClient, ResponseSchema};

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("analysis pipeline failed: {0}")]
    #[diagnostic(code(leadgraph::pipeline::run_failed))]
    Run(#[from] RunnerError),
}

/// Pulls the numbered stage id a fatal pipeline failure happened at out of
/// a [`RunnerError`]'s rendered message, the same string-sniffing approach
/// [`crate::llm::client::classify_transport_error`] uses for provider
/// errors that don't carry a structured code. Returns `None` if the
/// message doesn't mention a stage — e.g. a scheduler or checkpointer
/// failure unrelated to any one stage.
#[must_use]
pub fn stage_id_from_error(err: &PipelineError) -> Option<u8> {
    let rendered = err.to_string();
    let marker = "stage ";
    let start = rendered.find(marker)? + marker.len();
    rendered[start..].split(|c: char| !c.is_ascii_digit()).next()?.parse().ok()
}

fn model_for(stage: StageId, llm: &LlmConfig) -> String {
    match stage {
        StageId::Strategy | StageId::RiskAndPriority => llm.strategy_model.clone(),
        _ => llm.default_model.clone(),
    }
}

fn system_prompt_for(stage: StageId) -> &'static str {
    match stage {
        StageId::Extraction => {
            "You parse a raw business enrichment session into structured facts for later \
             analysis stages. Return a single JSON object with an `extracted_data` key \
             summarizing the company's profile and flagging any notable data gaps under a \
             `gaps` key. Do not invent facts not present in the input."
        }
        StageId::GapAnalysis => {
            "You decide which of the flagged data gaps are worth a targeted follow-up lookup. \
             Return a JSON object with an `extracted_data` key (the augmented facts) and a \
             `followups_issued` key listing at most 3 follow-up questions. Each listed question \
             is sent to the model again on its own and its answer is merged back into \
             `extracted_data` — list only questions that are genuinely worth a separate call."
        }
        StageId::Strategy => {
            "You are a business strategy consultant applying PESTEL, Porter's Five Forces, \
             SWOT, Blue Ocean, TAM/SAM/SOM sizing, OKRs, balanced scorecard, and scenario \
             planning to the given company profile and stated challenge. Return a JSON object \
             with a `sections` key, one entry per framework. When `data_quality_tier` is \
             `minimal` or `partial`, any section whose required inputs are absent must have \
             `status: \"dados_insuficientes\"` and a `missing_inputs` list instead of invented \
             numbers."
        }
        StageId::CompetitiveMatrix => {
            "You build a competitor comparison table and a two-axis positioning map from the \
             company profile and the strategy analysis already produced. Return a JSON object \
             with a `competitors` key (array) and a `positioning` key."
        }
        StageId::RiskAndPriority => {
            "You score the strategy's recommendations by effort vs. impact, quantify risks as \
             probability times impact, and compute a rough ROI per recommendation. Return a \
             JSON object with `priorities` and `risks` keys."
        }
        StageId::Polish => {
            "You are the final editorial pass: write an executive summary, correct any \
             Portuguese phrasing, normalize section titles, and check internal consistency \
             across the prior stages' output. Return a JSON object with a `sections` key \
             (the final, polished report sections) and an `executive_summary` key."
        }
    }
}

fn required_keys_for(stage: StageId) -> Vec<String> {
    match stage {
        StageId::Extraction | StageId::GapAnalysis => vec!["extracted_data".to_string()],
        StageId::Strategy => vec!["sections".to_string()],
        StageId::CompetitiveMatrix => vec!["competitors".to_string(), "positioning".to_string()],
        StageId::RiskAndPriority => vec!["priorities".to_string(), "risks".to_string()],
        StageId::Polish => vec!["sections".to_string(), "executive_summary".to_string()],
    }
}

fn extra_str(extra: &FxHashMap<String, Value>, key: &str) -> String {
    extra.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn stage_output_key(stage: StageId) -> String {
    format!("stage{}_output", stage.as_u8())
}

const FOLLOWUP_SYSTEM_PROMPT: &str = "You answer one targeted follow-up question about a \
business lead, using only the context given in the question itself plus general reasoning. \
Return a single JSON object with an `answer` key holding your best answer as a short string.";

/// Maximum number of gap-analysis follow-up queries dispatched per stage 2
/// run, per spec.
const MAX_FOLLOWUPS: usize = 3;

/// Fans stage 2's chosen follow-up questions out to the LLM in parallel,
/// the same `JoinSet`-and-drain shape
/// [`crate::enrichment::orchestrator::run_layer`] uses to fan sources out
/// within a layer. Each question gets its own call with its own retry and
/// timeout (inherited from [`LlmClient::call`]); a failed follow-up is
/// logged and dropped rather than failing the stage — gap follow-ups are
/// best-effort enrichment, not the stage's required output.
///
/// Returns the `question -> answer` map plus the summed cost/token usage of
/// every follow-up call that succeeded.
async fn run_followups(llm: Arc<LlmClient>, model_id: String, questions: Vec<String>) -> (Value, f64, u32, u32) {
    let schema = ResponseSchema::new(vec!["answer".to_string()]);
    let mut set: JoinSet<(String, Option<(Value, f64, u32, u32)>)> = JoinSet::new();

    for question in questions.into_iter().take(MAX_FOLLOWUPS) {
        let llm = Arc::clone(&llm);
        let model_id = model_id.clone();
        let schema = schema.clone();
        set.spawn(async move {
            match llm.call(&model_id, FOLLOWUP_SYSTEM_PROMPT, &question, Some(&schema)).await {
                Ok(response) => {
                    let answer = response
                        .parsed
                        .as_ref()
                        .and_then(|v| v.get("answer"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    (question, Some((answer, response.cost_usd, response.tokens_in, response.tokens_out)))
                }
                Err(e) => {
                    tracing::warn!(question = %question, error = %e, "gap-analysis follow-up query failed, skipping");
                    (question, None)
                }
            }
        });
    }

    let mut answers = serde_json::Map::new();
    let mut cost_usd = 0.0;
    let mut tokens_in = 0u32;
    let mut tokens_out = 0u32;
    while let Some(joined) = set.join_next().await {
        if let Ok((question, Some((answer, cost, ti, to)))) = joined {
            answers.insert(question, answer);
            cost_usd += cost;
            tokens_in = tokens_in.saturating_add(ti);
            tokens_out = tokens_out.saturating_add(to);
        }
    }
    (Value::Object(answers), cost_usd, tokens_in, tokens_out)
}

/// Pulls the (possibly model-proposed, possibly over-long) `followups_issued`
/// list out of a stage 2 response, capped to [`MAX_FOLLOWUPS`]. Non-string
/// entries and a missing/malformed key both yield an empty list rather than
/// an error — gap follow-ups are optional enrichment, never required output.
fn followup_questions(output: &Value) -> Vec<String> {
    output
        .get("followups_issued")
        .and_then(Value::as_array)
        .map(|issued| {
            issued
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .take(MAX_FOLLOWUPS)
                .collect()
        })
        .unwrap_or_default()
}

/// Folds follow-up answers into `output`'s `extracted_data` object in place.
/// A no-op if `extracted_data` is absent or not an object, which should not
/// happen given stage 2's required-key schema but is handled defensively
/// since this runs after the one schema check already passed.
fn merge_followup_answers(output: &mut Value, answers: Value) {
    if let Some(extracted) = output.get_mut("extracted_data").and_then(Value::as_object_mut) {
        extracted.insert("followup_answers".to_string(), answers);
    }
}

/// Assembles the `(company, industry, ...stage_kwargs)` input object each
/// stage's cache fingerprint and LLM prompt are built from, per the
/// reads column of the stage table: stage 1 reads the enrichment session,
/// stage 3 additionally reads the challenge/enabled-sections/quality-tier,
/// stage 4 reads stages 1+3, stage 6 reads stages 3+4+5.
fn stage_inputs(stage: StageId, extra: &FxHashMap<String, Value>) -> Value {
    let company = extra_str(extra, "company");
    let industry = extra_str(extra, "industry");
    let mut inputs = serde_json::Map::new();
    inputs.insert("company".to_string(), json!(company));
    inputs.insert("industry".to_string(), json!(industry));

    match stage {
        StageId::Extraction => {
            inputs.insert(
                "enrichment_session".to_string(),
                extra.get("enrichment_session").cloned().unwrap_or(Value::Null),
            );
        }
        StageId::GapAnalysis => put_stage_output(&mut inputs, extra, StageId::Extraction),
        StageId::Strategy => {
            put_stage_output(&mut inputs, extra, StageId::GapAnalysis);
            inputs.insert("challenge".to_string(), json!(extra_str(extra, "challenge")));
            inputs.insert("enabled_sections".to_string(), extra.get("enabled_sections").cloned().unwrap_or(json!([])));
            inputs.insert("data_quality_tier".to_string(), extra.get("data_quality_tier").cloned().unwrap_or(json!("minimal")));
        }
        StageId::CompetitiveMatrix => {
            put_stage_output(&mut inputs, extra, StageId::Extraction);
            put_stage_output(&mut inputs, extra, StageId::Strategy);
        }
        StageId::RiskAndPriority => put_stage_output(&mut inputs, extra, StageId::Strategy),
        StageId::Polish => {
            put_stage_output(&mut inputs, extra, StageId::Strategy);
            put_stage_output(&mut inputs, extra, StageId::CompetitiveMatrix);
            put_stage_output(&mut inputs, extra, StageId::RiskAndPriority);
        }
    }

    Value::Object(inputs)
}

fn put_stage_output(inputs: &mut serde_json::Map<String, Value>, extra: &FxHashMap<String, Value>, id: StageId) {
    if let Some(v) = extra.get(&stage_output_key(id)) {
        inputs.insert(stage_output_key(id), v.clone());
    }
}

/// Sections of a stage-3 (or later) output that are JSON objects but, under
/// a `minimal`/`partial` data quality tier, lack the `status` marker the
/// system prompt asks the model to set when a section's required inputs
/// are absent. A non-empty result is logged as a prompt-compliance warning,
/// never treated as a pipeline failure — the guard is advisory, the model
/// output is still used as given.
#[must_use]
pub fn sections_missing_status_marker(tier: DataQualityTier, sections: &Value) -> Vec<String> {
    if !tier.requires_insufficient_data_guard() {
        return Vec::new();
    }
    let Value::Object(map) = sections else { return Vec::new() };
    map.iter()
        .filter_map(|(key, value)| match value {
            Value::Object(section) if !section.contains_key("status") => Some(key.clone()),
            _ => None,
        })
        .collect()
}

struct StageNode {
    stage: StageId,
    model_id: String,
    llm: Arc<LlmClient>,
    cache: Arc<StageCache>,
}

#[async_trait]
impl Node for StageNode {
    async fn run(&self, snapshot: StateSnapshot, ctx: NodeContext) -> Result<NodePartial, NodeError> {
        let mut seq = snapshot.extra.get("event_seq").and_then(Value::as_u64).unwrap_or(1);
        let (scope, message) = stamp(seq, &LeadEvent::StageStarted { stage_id: self.stage.as_u8() });
        let _ = ctx.emit_diagnostic(scope, message);
        seq += 1;

        let inputs = stage_inputs(self.stage, &snapshot.extra);
        let started = Instant::now();
        let prior_cost = snapshot.extra.get("total_cost_usd").and_then(Value::as_f64).unwrap_or(0.0);

        let result = if let Some(cached) = self.cache.get(self.stage, &inputs).await {
            AnalysisStageResult { cached: true, ..cached }
        } else {
            let schema = ResponseSchema::new(required_keys_for(self.stage));
            let system_prompt = system_prompt_for(self.stage);
            let user_prompt = inputs.to_string();
            let response = self
                .llm
                .call(&self.model_id, system_prompt, &user_prompt, Some(&schema))
                .await
                .map_err(|e| NodeError::Provider {
                    provider: "llm",
                    message: format!(
                        "stage {} failed (cost_usd={:.6} billed before failure): {e}",
                        self.stage.as_u8(),
                        e.cost_usd()
                    ),
                })?;

            let mut output = response.parsed.unwrap_or(Value::Null);
            let mut tokens_in = response.tokens_in;
            let mut tokens_out = response.tokens_out;
            let mut cost_usd = response.cost_usd;

            if self.stage == StageId::GapAnalysis {
                let questions = followup_questions(&output);
                if !questions.is_empty() {
                    let (answers, followup_cost, followup_tokens_in, followup_tokens_out) =
                        run_followups(Arc::clone(&self.llm), self.model_id.clone(), questions).await;
                    merge_followup_answers(&mut output, answers);
                    cost_usd += followup_cost;
                    tokens_in = tokens_in.saturating_add(followup_tokens_in);
                    tokens_out = tokens_out.saturating_add(followup_tokens_out);
                }
            }

            if self.stage == StageId::Strategy {
                let tier = serde_json::from_value(inputs["data_quality_tier"].clone()).unwrap_or(DataQualityTier::Minimal);
                let missing = sections_missing_status_marker(tier, output.get("sections").unwrap_or(&Value::Null));
                if !missing.is_empty() {
                    tracing::warn!(sections = ?missing, "strategy stage did not mark all underpowered sections");
                }
            }

            let result = AnalysisStageResult {
                stage: self.stage,
                output,
                input_fingerprint: fingerprint(self.stage, &inputs),
                model: self.model_id.clone(),
                tokens_in,
                tokens_out,
                cost_usd,
                duration_ms: started.elapsed().as_millis() as u64,
                cached: false,
            };
            self.cache.put(self.stage, &inputs, &result).await;
            result
        };

        let total_cost = prior_cost + result.cost_usd;
        let (scope, message) = stamp(
            seq,
            &LeadEvent::StageComplete {
                stage_id: self.stage.as_u8(),
                duration_ms: result.duration_ms,
                cost_usd: total_cost,
            },
        );
        let _ = ctx.emit_diagnostic(scope, message);
        seq += 1;

        let mut extra = FxHashMap::default();
        extra.insert(stage_output_key(self.stage), result.output.clone());
        extra.insert("total_cost_usd".to_string(), json!(total_cost));
        extra.insert("event_seq".to_string(), json!(seq));
        extra.insert(format!("stage{}_result", self.stage.as_u8()), serde_json::to_value(&result).unwrap_or(Value::Null));

        Ok(NodePartial::new().with_extra(extra))
    }
}

/// Builds the six-stage analysis graph once and runs it per submission.
pub struct AnalysisPipeline {
    app: Arc<App>,
}

impl AnalysisPipeline {
    #[must_use]
    pub fn new(llm: Arc<LlmClient>, cache: Arc<StageCache>, llm_config: &LlmConfig) -> Self {
        let mut builder = GraphBuilder::new();
        let mut previous = NodeKind::Start;
        for stage in StageId::ALL {
            let kind = NodeKind::Custom(stage.name().to_string());
            builder = builder.add_node(
                kind.clone(),
                StageNode {
                    stage,
                    model_id: model_for(stage, llm_config),
                    llm: Arc::clone(&llm),
                    cache: Arc::clone(&cache),
                },
            );
            builder = builder.add_edge(previous, kind.clone());
            previous = kind;
        }
        builder = builder.add_edge(previous, NodeKind::End);

        Self { app: Arc::new(builder.compile()) }
    }

    /// Runs all six stages for `session` against `challenge`, producing a
    /// [`Report`]. The data quality tier is computed once, up front, from
    /// the enrichment session's completeness — available to every stage
    /// from the start, even though only stage 3 consults it — rather than
    /// recomputed mid-graph.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any stage fails after its retries are
    /// exhausted; [`stage_id_from_error`] recovers which one for the
    /// caller's `Submission::mark_failed` message.
    pub async fn run(&self, session: &EnrichmentSession, company: &str, industry: &str, challenge: &str) -> Result<Report, PipelineError> {
        let tier = DataQualityTier::from_session(session);
        let enabled_sections: Vec<&str> = match tier {
            DataQualityTier::Minimal | DataQualityTier::Partial => {
                vec!["pestel", "swot"]
            }
            DataQualityTier::Good => vec!["pestel", "swot", "porter", "okrs"],
            DataQualityTier::Full | DataQualityTier::Legendary => {
                vec!["pestel", "swot", "porter", "okrs", "blue_ocean", "tam_sam_som", "bsc", "scenarios"]
            }
        };

        let session_json = serde_json::to_value(session).unwrap_or(Value::Null);
        let initial_state = VersionedState::builder()
            .with_extra("company", json!(company))
            .with_extra("industry", json!(industry))
            .with_extra("challenge", json!(challenge))
            .with_extra("enrichment_session", session_json)
            .with_extra("data_quality_tier", json!(tier))
            .with_extra("enabled_sections", json!(enabled_sections))
            .with_extra("event_seq", json!(1))
            .build();

        let mut runner = AppRunner::with_options_arc(Arc::clone(&self.app), CheckpointerType::InMemory, false).await;
        let run_id = format!("analysis-{}", session.session_id);
        runner.create_session(run_id.clone(), initial_state).await?;
        let final_state = runner.run_until_complete(&run_id).await?;
        let snapshot = final_state.snapshot();

        let mut stages = Vec::with_capacity(StageId::ALL.len());
        for stage in StageId::ALL {
            let key = format!("stage{}_result", stage.as_u8());
            if let Some(raw) = snapshot.extra.get(&key) {
                if let Ok(result) = serde_json::from_value::<AnalysisStageResult>(raw.clone()) {
                    stages.push(result);
                }
            }
        }

        let sections = snapshot.extra.get(&stage_output_key(StageId::Polish)).cloned().unwrap_or(Value::Null);
        let total_cost_usd = snapshot.extra.get("total_cost_usd").and_then(Value::as_f64).unwrap_or(0.0);

        Ok(Report {
            stages,
            sections,
            total_cost_usd,
            data_quality_tier: tier,
            generated_at: chrono::Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stage_id_from_error_recovers_the_numeric_stage() {
        let err = PipelineError::Run(RunnerError::SessionNotFound { session_id: "x".into() });
        assert_eq!(stage_id_from_error(&err), None);
    }

    #[test]
    fn stage_inputs_for_strategy_carries_quality_tier_and_challenge() {
        let mut extra = FxHashMap::default();
        extra.insert("company".to_string(), json!("Acme"));
        extra.insert("industry".to_string(), json!("technology"));
        extra.insert("challenge".to_string(), json!("scaling support"));
        extra.insert("data_quality_tier".to_string(), json!("good"));
        let inputs = stage_inputs(StageId::Strategy, &extra);
        assert_eq!(inputs["challenge"], json!("scaling support"));
        assert_eq!(inputs["data_quality_tier"], json!("good"));
    }

    #[test]
    fn missing_status_marker_detected_only_under_low_quality_tiers() {
        let sections = json!({
            "pestel": {"summary": "ok"},
            "swot": {"status": "dados_insuficientes", "missing_inputs": ["revenue"]},
        });
        let minimal = sections_missing_status_marker(DataQualityTier::Minimal, &sections);
        assert_eq!(minimal, vec!["pestel".to_string()]);

        let full = sections_missing_status_marker(DataQualityTier::Full, &sections);
        assert!(full.is_empty());
    }

    #[test]
    fn model_selection_routes_premium_stages_to_the_strategy_model() {
        let llm = LlmConfig {
            provider: "openai".into(),
            api_key: "key".into(),
            default_model: "gpt-4o-mini".into(),
            strategy_model: "gpt-4o".into(),
            call_timeout: std::time::Duration::from_secs(60),
        };
        assert_eq!(model_for(StageId::Strategy, &llm), "gpt-4o");
        assert_eq!(model_for(StageId::Extraction, &llm), "gpt-4o-mini");
    }

    #[test]
    fn followup_questions_caps_at_three_and_drops_non_strings() {
        let output = json!({
            "extracted_data": {},
            "followups_issued": ["q1", "q2", 3, "q4", "q5"],
        });
        let questions = followup_questions(&output);
        assert_eq!(questions, vec!["q1".to_string(), "q2".to_string(), "q4".to_string()]);
    }

    #[test]
    fn followup_questions_is_empty_when_key_is_absent() {
        let output = json!({"extracted_data": {}});
        assert!(followup_questions(&output).is_empty());
    }

    #[test]
    fn merge_followup_answers_inserts_into_extracted_data() {
        let mut output = json!({
            "extracted_data": {"company_name": "Acme"},
            "followups_issued": ["what is their employee count?"],
        });
        let answers = json!({"what is their employee count?": "about 150"});
        merge_followup_answers(&mut output, answers.clone());
        assert_eq!(output["extracted_data"]["followup_answers"], answers);
        assert_eq!(output["extracted_data"]["company_name"], json!("Acme"));
    }

    #[test]
    fn merge_followup_answers_is_a_no_op_when_extracted_data_is_missing() {
        let mut output = json!({"followups_issued": ["q1"]});
        merge_followup_answers(&mut output, json!({"q1": "answer"}));
        assert!(output.get("extracted_data").is_none());
    }
}
