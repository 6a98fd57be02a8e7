//! The LLM client (C7) — a thin, provider-agnostic wrapper over `rig-core`
//! with retrying, a hard call timeout, and structured-output enforcement.
//!
//! Model access goes through `rig-core` exclusively so this crate never
//! hardcodes a vendor SDK; which concrete client gets built is decided once,
//! from [`crate::config::LlmConfig::provider`], the same way
//! `examples/demo3.rs` builds an `ollama::Client` for its single fixed
//! provider.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rig::client::CompletionClient;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::providers::{anthropic, openai};
use serde_json::Value;
use tokio::time::timeout;

use crate::config::LlmConfig;
use crate::errors::LlmError;
use crate::llm::pricing::price_for;
use crate::llm::sanitize::Sanitizer;

/// Names of keys a structured response must contain. A repair pass is given
/// one chance to fix a response that parses as JSON but is missing one of
/// these.
#[derive(Debug, Clone, Default)]
pub struct ResponseSchema {
    pub required_keys: Vec<String>,
}

impl ResponseSchema {
    #[must_use]
    pub fn new(required_keys: Vec<String>) -> Self {
        Self { required_keys }
    }

    fn validate(&self, value: &Value) -> Result<(), String> {
        let Value::Object(map) = value else {
            return Err("response is not a JSON object".to_string());
        };
        for key in &self.required_keys {
            if !map.contains_key(key) {
                return Err(format!("missing required key `{key}`"));
            }
        }
        Ok(())
    }
}

/// Result of a single [`LlmClient::call`], cost always populated even when
/// the call ultimately failed after retries (the last attempt's billed
/// tokens are what's reported).
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub parsed: Option<Value>,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

const MAX_ATTEMPTS: u32 = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

enum Provider {
    OpenAi(openai::Client),
    Anthropic(anthropic::Client),
}

/// Thin wrapper over `rig-core` providing retry, timeout, cost accounting,
/// and structured-output enforcement uniformly across whichever vendor is
/// configured.
pub struct LlmClient {
    provider: Provider,
    call_timeout: Duration,
    sanitizer: Arc<Sanitizer>,
}

impl LlmClient {
    /// # Errors
    ///
    /// Returns [`LlmError::Auth`] if the configured provider name is not
    /// recognized, and whatever the sanitizer's construction error is if the
    /// injection-detection pattern set fails to compile.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let provider = match config.provider.as_str() {
            "openai" => Provider::OpenAi(openai::Client::new(&config.api_key)),
            "anthropic" => Provider::Anthropic(anthropic::Client::new(&config.api_key)),
            other => {
                return Err(LlmError::Auth {
                    message: format!("unknown LLM provider `{other}`"),
                    cost_usd: 0.0,
                })
            }
        };
        let sanitizer = Arc::new(Sanitizer::new()?);
        Ok(Self {
            provider,
            call_timeout: if config.call_timeout.is_zero() {
                DEFAULT_TIMEOUT
            } else {
                config.call_timeout
            },
            sanitizer,
        })
    }

    /// Run a single completion call, retrying on transient failures and
    /// enforcing a JSON schema on the response if one is given.
    ///
    /// `user_prompt` is treated as untrusted — it passes through the
    /// injection-detection sanitizer before being sent. `system_prompt` is
    /// operator-controlled and is sent unmodified.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] if every retry attempt fails, or if the response
    /// fails structured-output validation after one repair attempt.
    pub async fn call(
        &self,
        model_id: &str,
        system_prompt: &str,
        user_prompt: &str,
        schema: Option<&ResponseSchema>,
    ) -> Result<LlmResponse, LlmError> {
        let sanitized = self.sanitizer.sanitize(user_prompt).await;
        let start = Instant::now();

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self
                .attempt(model_id, system_prompt, &sanitized.text, schema)
                .await
            {
                Ok(mut response) => {
                    response.duration_ms = start.elapsed().as_millis() as u64;
                    return Ok(response);
                }
                Err(err) => {
                    if !err.is_retryable() || attempt + 1 == MAX_ATTEMPTS {
                        return Err(err);
                    }
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
                    tracing::warn!(model = model_id, attempt, error = %err, "llm call failed, retrying");
                    tokio::time::sleep(backoff).await;
                    last_err = Some(err);
                }
            }
        }
        // Unreachable in practice: the loop above always returns within
        // MAX_ATTEMPTS iterations.
        Err(last_err.unwrap_or(LlmError::Transport {
            message: "exhausted retries".to_string(),
            cost_usd: 0.0,
        }))
    }

    async fn attempt(
        &self,
        model_id: &str,
        system_prompt: &str,
        user_prompt: &str,
        schema: Option<&ResponseSchema>,
    ) -> Result<LlmResponse, LlmError> {
        let (raw, tokens_in, tokens_out) = timeout(
            self.call_timeout,
            self.completion(model_id, system_prompt, user_prompt),
        )
        .await
        .map_err(|_| LlmError::Timeout { after: self.call_timeout, cost_usd: 0.0 })??;

        let price = price_for(model_id);
        let cost_usd = price.cost_usd(tokens_in, tokens_out);

        // `enforce_schema` is handed `cost_usd` (already billed by the call
        // above) so that a structured-output failure — including one that
        // fails again during the repair attempt — reports the real spend
        // instead of losing it; on success it returns the repair call's
        // *additional* cost, which is folded into the total below.
        let (parsed, extra_cost) = match schema {
            Some(schema) => {
                let (value, repair_cost) = self
                    .enforce_schema(&raw, schema, model_id, system_prompt, user_prompt, cost_usd)
                    .await?;
                (Some(value), repair_cost)
            }
            None => (None, 0.0),
        };

        Ok(LlmResponse {
            content: raw,
            parsed,
            model: model_id.to_string(),
            tokens_in,
            tokens_out,
            cost_usd: cost_usd + extra_cost,
            duration_ms: 0,
        })
    }

    async fn completion(
        &self,
        model_id: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<(String, u32, u32), LlmError> {
        let message = RigMessage::user(user_prompt);
        match &self.provider {
            Provider::OpenAi(client) => {
                let model = client.completion_model(model_id);
                let request = model
                    .completion_request(message)
                    .preamble(system_prompt.to_string())
                    .build();
                let response = model
                    .completion(request)
                    .await
                    .map_err(|e| classify_transport_error(&e.to_string()))?;
                Ok(extract_text_and_usage(response))
            }
            Provider::Anthropic(client) => {
                let model = client.completion_model(model_id);
                let request = model
                    .completion_request(message)
                    .preamble(system_prompt.to_string())
                    .build();
                let response = model
                    .completion(request)
                    .await
                    .map_err(|e| classify_transport_error(&e.to_string()))?;
                Ok(extract_text_and_usage(response))
            }
        }
    }

    /// Strip code fences, extract the first top-level JSON object, validate
    /// required keys, and make one repair attempt (echoing the validation
    /// error back to the model) before giving up with [`LlmError::Parse`].
    ///
    /// `cost_so_far` is the cost already billed for `raw` (the call that
    /// produced the response being validated here); it is folded into
    /// whatever error this returns so a structured-output failure never
    /// drops the spend that produced it. On success, returns the *additional*
    /// cost of the repair call only (`0.0` if no repair was needed), since
    /// `cost_so_far` is already accounted for by the caller.
    async fn enforce_schema(
        &self,
        raw: &str,
        schema: &ResponseSchema,
        model_id: &str,
        system_prompt: &str,
        user_prompt: &str,
        cost_so_far: f64,
    ) -> Result<(Value, f64), LlmError> {
        match parse_structured(raw, schema) {
            Ok(value) => Ok((value, 0.0)),
            Err(first_error) => {
                let repair_prompt = format!(
                    "{user_prompt}\n\nYour previous response failed validation: {first_error}. \
                     Respond again with a single corrected JSON object only."
                );
                let (repaired_raw, repair_tokens_in, repair_tokens_out) = self
                    .completion(model_id, system_prompt, &repair_prompt)
                    .await
                    .map_err(|e| e.with_added_cost(cost_so_far))?;
                let repair_cost = price_for(model_id).cost_usd(repair_tokens_in, repair_tokens_out);
                parse_structured(&repaired_raw, schema)
                    .map(|value| (value, repair_cost))
                    .map_err(|e| LlmError::Parse {
                        message: format!("after repair attempt: {e}"),
                        cost_usd: cost_so_far + repair_cost,
                    })
            }
        }
    }
}

/// Strip fenced code blocks and pull out the first top-level `{...}` object.
fn extract_json_object(raw: &str) -> Option<&str> {
    let without_fences = raw.trim().trim_start_matches("```json").trim_start_matches("```");
    let without_fences = without_fences.trim_end_matches("```").trim();

    let start = without_fences.find('{')?;
    let bytes = without_fences.as_bytes();
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&without_fences[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_structured(raw: &str, schema: &ResponseSchema) -> Result<Value, String> {
    let object = extract_json_object(raw).ok_or_else(|| "no JSON object found in response".to_string())?;
    let value: Value = serde_json::from_str(object).map_err(|e| e.to_string())?;
    schema.validate(&value)?;
    Ok(value)
}

/// Rough transport-error classification from the stringified `rig-core`
/// error, since the crate's error type does not expose status codes
/// directly to downstream callers.
fn classify_transport_error(message: &str) -> LlmError {
    // Always raised before any response (and therefore any billable usage)
    // came back, so `cost_usd` is genuinely `0.0` here; a retryable variant
    // picks up real cost later via `with_added_cost` if it turns out to have
    // been preceded by an already-billed attempt (the repair-call path).
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") {
        LlmError::RateLimited { cost_usd: 0.0 }
    } else if lower.contains("401") || lower.contains("403") || lower.contains("auth") {
        LlmError::Auth { message: message.to_string(), cost_usd: 0.0 }
    } else if lower.contains("500") || lower.contains("502") || lower.contains("503") {
        LlmError::Upstream5xx { message: message.to_string(), cost_usd: 0.0 }
    } else {
        LlmError::Transport { message: message.to_string(), cost_usd: 0.0 }
    }
}

fn extract_text_and_usage<T>(response: rig::completion::CompletionResponse<T>) -> (String, u32, u32) {
    let tokens_in = u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX);
    let tokens_out = u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX);
    let text = response
        .choice
        .into_iter()
        .filter_map(|content| match content {
            rig::message::AssistantContent::Text(text) => Some(text.text),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    (text, tokens_in, tokens_out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_validates_required_keys() {
        let schema = ResponseSchema::new(vec!["summary".to_string()]);
        assert!(schema.validate(&serde_json::json!({"summary": "ok"})).is_ok());
        assert!(schema.validate(&serde_json::json!({"other": 1})).is_err());
    }

    #[test]
    fn extracts_json_from_fenced_response() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json_object(raw), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn extracts_first_top_level_object_ignoring_trailing_prose() {
        let raw = "Sure, here you go: {\"a\": {\"b\": 1}} and some trailing text";
        assert_eq!(extract_json_object(raw), Some(r#"{"a": {"b": 1}}"#));
    }

    #[test]
    fn classify_transport_error_detects_rate_limit() {
        assert!(matches!(
            classify_transport_error("429 Too Many Requests"),
            LlmError::RateLimited { .. }
        ));
    }

    #[test]
    fn classify_transport_error_detects_auth() {
        assert!(matches!(
            classify_transport_error("401 Unauthorized"),
            LlmError::Auth { .. }
        ));
    }
}
