//! L3 derived-field source: asks the configured LLM to infer an industry
//! tier, a company-size tier, and a digital-maturity tier from everything
//! L1+L2 has accumulated so far.
//!
//! Unlike the other adapters this one does not reach the network directly;
//! it delegates to [`crate::llm::client::LlmClient`], which already owns
//! retry, timeout, and structured-output enforcement (C7). This source's
//! `timeout()` is intentionally generous since the client applies its own,
//! tighter call timeout underneath.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::breaker::BreakerConfig;
use crate::errors::{LlmError, SourceErrorKind};
use crate::llm::client::{LlmClient, ResponseSchema};

use super::{EnrichmentHints, EnrichmentSource, SourceField, SourceResult};

const SYSTEM_PROMPT: &str = "You classify a business lead from enrichment data already gathered about it. \
Respond with a single JSON object and nothing else, with exactly these keys: \
`industry_tier` (one of \"emerging\", \"established\", \"enterprise\"), \
`size_tier` (one of \"micro\", \"small\", \"mid_market\", \"enterprise\"), \
`digital_maturity` (one of \"nascent\", \"developing\", \"mature\", \"advanced\").";

fn classify_llm_error(err: &LlmError) -> SourceErrorKind {
    match err {
        LlmError::Timeout { .. } => SourceErrorKind::Timeout,
        LlmError::RateLimited { .. } => SourceErrorKind::RateLimited,
        LlmError::Auth { .. } => SourceErrorKind::Auth,
        LlmError::Parse { .. } => SourceErrorKind::Parse,
        LlmError::Upstream5xx { .. } => SourceErrorKind::Upstream5xx,
        LlmError::Quota { .. } | LlmError::Transport { .. } => SourceErrorKind::Network,
    }
}

pub struct LlmInferenceSource {
    client: Arc<LlmClient>,
    model_id: String,
}

impl LlmInferenceSource {
    #[must_use]
    pub fn new(client: Arc<LlmClient>, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
        }
    }
}

#[async_trait]
impl EnrichmentSource for LlmInferenceSource {
    fn name(&self) -> &'static str {
        "llm_inference"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn cost_estimate_usd(&self) -> f64 {
        0.01
    }

    fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig::llm_or_metadata()
    }

    fn confidence_prior(&self) -> u8 {
        55
    }

    async fn enrich(&self, domain: &str, hints: &EnrichmentHints) -> Result<SourceResult, SourceErrorKind> {
        let user_prompt = format!(
            "Domain: {domain}\nCompany name: {}\nCountry hint: {}\nFields gathered so far: {}",
            hints.company_name.as_deref().unwrap_or("unknown"),
            hints.country_hint.as_deref().unwrap_or("unknown"),
            hints.fields_so_far,
        );

        let schema = ResponseSchema::new(vec![
            "industry_tier".to_string(),
            "size_tier".to_string(),
            "digital_maturity".to_string(),
        ]);

        let response = self
            .client
            .call(&self.model_id, SYSTEM_PROMPT, &user_prompt, Some(&schema))
            .await
            .map_err(|e| classify_llm_error(&e))?;

        let Some(parsed) = response.parsed else {
            return Err(SourceErrorKind::Parse);
        };

        let mut fields = Vec::new();
        if let Some(tier) = parsed.get("industry_tier") {
            fields.push(SourceField::simple("ai_industry_tier", tier.clone()));
        }
        if let Some(tier) = parsed.get("size_tier") {
            fields.push(SourceField::simple("ai_size_tier", tier.clone()));
        }
        if let Some(tier) = parsed.get("digital_maturity") {
            fields.push(SourceField::simple("ai_digital_maturity", tier.clone()));
        }
        if fields.is_empty() {
            return Err(SourceErrorKind::Parse);
        }

        Ok(SourceResult {
            fields,
            cost_usd: response.cost_usd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limited_llm_errors() {
        assert_eq!(
            classify_llm_error(&LlmError::RateLimited { cost_usd: 0.0 }),
            SourceErrorKind::RateLimited
        );
    }

    #[test]
    fn classifies_parse_errors() {
        assert_eq!(
            classify_llm_error(&LlmError::Parse {
                message: "missing key".to_string(),
                cost_usd: 0.002,
            }),
            SourceErrorKind::Parse
        );
    }

    #[test]
    fn user_prompt_embeds_accumulated_fields() {
        let hints = EnrichmentHints {
            company_name: Some("Acme".to_string()),
            country_hint: Some("Brazil".to_string()),
            fields_so_far: json!({"employee_count_range": "51-200"}),
        };
        let prompt = format!(
            "Domain: {}\nCompany name: {}\nCountry hint: {}\nFields gathered so far: {}",
            "acme.com",
            hints.company_name.as_deref().unwrap_or("unknown"),
            hints.country_hint.as_deref().unwrap_or("unknown"),
            hints.fields_so_far,
        );
        assert!(prompt.contains("employee_count_range"));
    }
}
