//! Decision-maker lookup: the likely primary contact's name, title, and
//! seniority band for a company domain, from a people-search API.
//!
//! L2, structured business data. Expensive-external breaker profile — a
//! paid, rate-limited third-party API, same shape as
//! [`super::cnpj_registry`] and [`super::linkedin`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::breaker::BreakerConfig;
use crate::errors::SourceErrorKind;

use super::{EnrichmentHints, EnrichmentSource, SourceField, SourceResult};

#[derive(Debug, Deserialize)]
struct PersonResponse {
    full_name: Option<String>,
    title: Option<String>,
    seniority: Option<String>,
}

pub struct PeopleApiSource {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PeopleApiSource {
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: "https://api.peoplesearch.example/v1/decision-makers".to_string(),
        }
    }

    #[must_use]
    #[cfg(test)]
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }
}

fn classify_transport(err: &reqwest::Error) -> SourceErrorKind {
    if err.is_timeout() {
        SourceErrorKind::Timeout
    } else if err.status().is_some_and(|s| s.as_u16() == 401 || s.as_u16() == 403) {
        SourceErrorKind::Auth
    } else if err.status().is_some_and(|s| s.as_u16() == 404) {
        SourceErrorKind::NotFound
    } else if err.status().is_some_and(|s| s.as_u16() == 429) {
        SourceErrorKind::RateLimited
    } else if err.status().is_some_and(|s| s.is_server_error()) {
        SourceErrorKind::Upstream5xx
    } else {
        SourceErrorKind::Network
    }
}

#[async_trait]
impl EnrichmentSource for PeopleApiSource {
    fn name(&self) -> &'static str {
        "people_api"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn cost_estimate_usd(&self) -> f64 {
        0.03
    }

    fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig::expensive_external()
    }

    fn confidence_prior(&self) -> u8 {
        70
    }

    async fn enrich(&self, domain: &str, _hints: &EnrichmentHints) -> Result<SourceResult, SourceErrorKind> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("domain", domain)])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        if response.status().as_u16() == 404 {
            return Err(SourceErrorKind::NotFound);
        }
        if response.status().as_u16() == 401 || response.status().as_u16() == 403 {
            return Err(SourceErrorKind::Auth);
        }
        if response.status().as_u16() == 429 {
            return Err(SourceErrorKind::RateLimited);
        }
        if response.status().is_server_error() {
            return Err(SourceErrorKind::Upstream5xx);
        }

        let body: PersonResponse = response.json().await.map_err(|_| SourceErrorKind::Parse)?;

        let mut fields = Vec::new();
        if let Some(name) = body.full_name {
            fields.push(SourceField::simple("ai_decision_maker_name", json!(name)));
        }
        if let Some(title) = body.title {
            fields.push(SourceField::simple("ai_decision_maker_title", json!(title)));
        }
        if let Some(seniority) = body.seniority {
            fields.push(SourceField::simple("ai_decision_maker_seniority", json!(seniority)));
        }
        if fields.is_empty() {
            return Err(SourceErrorKind::NotFound);
        }

        Ok(SourceResult {
            fields,
            cost_usd: self.cost_estimate_usd(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn maps_decision_maker_fields() {
        let server = httpmock::MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/v1/decision-makers");
                then.status(200).json_body(json!({
                    "full_name": "Jordan Reyes",
                    "title": "VP of Operations",
                    "seniority": "executive"
                }));
            })
            .await;

        let source = PeopleApiSource::with_base_url(
            "key".to_string(),
            format!("{}/v1/decision-makers", server.base_url()),
        );
        let result = source.enrich("acme.com", &EnrichmentHints::default()).await.unwrap();
        assert!(result
            .fields
            .iter()
            .any(|f| f.key == "ai_decision_maker_name" && f.raw_value == json!("Jordan Reyes")));
    }

    #[tokio::test]
    async fn auth_failure_maps_to_auth_kind() {
        let server = httpmock::MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET);
                then.status(401);
            })
            .await;

        let source = PeopleApiSource::with_base_url("bad-key".to_string(), server.base_url());
        let err = source
            .enrich("acme.com", &EnrichmentHints::default())
            .await
            .unwrap_err();
        assert_eq!(err, SourceErrorKind::Auth);
    }
}
