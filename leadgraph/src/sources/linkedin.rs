//! Company social profile lookup: employee-count band, founded year, and
//! industry tag from a LinkedIn-style company-data API.
//!
//! L2, structured business data. Expensive-external breaker profile — a
//! paid, rate-limited third-party API, same shape as
//! [`super::cnpj_registry`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::breaker::BreakerConfig;
use crate::errors::SourceErrorKind;

use super::{EnrichmentHints, EnrichmentSource, SourceField, SourceResult};

#[derive(Debug, Deserialize)]
struct CompanyProfileResponse {
    employee_range: Option<String>,
    founded_year: Option<i32>,
    industry: Option<String>,
    headline: Option<String>,
}

pub struct LinkedInSource {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl LinkedInSource {
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: "https://api.linkedin-company-data.example/v1/companies".to_string(),
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
impl EnrichmentSource for LinkedInSource {
    fn name(&self) -> &'static str {
        "linkedin"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn cost_estimate_usd(&self) -> f64 {
        0.02
    }

    fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig::expensive_external()
    }

    fn confidence_prior(&self) -> u8 {
        80
    }

    async fn enrich(&self, domain: &str, hints: &EnrichmentHints) -> Result<SourceResult, SourceErrorKind> {
        let query = hints.company_name.clone().unwrap_or_else(|| domain.to_string());

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("domain", domain), ("name", query.as_str())])
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

        let body: CompanyProfileResponse = response.json().await.map_err(|_| SourceErrorKind::Parse)?;

        let mut fields = Vec::new();
        if let Some(range) = body.employee_range {
            fields.push(SourceField::simple("employee_count_range", json!(range)));
        }
        if let Some(year) = body.founded_year {
            fields.push(SourceField::simple("founded_year", json!(year)));
        }
        if let Some(industry) = body.industry {
            fields.push(SourceField::simple("ai_industry_tag", json!(industry)));
        }
        if let Some(headline) = body.headline {
            fields.push(SourceField::simple("description", json!(headline)));
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
    async fn maps_company_profile_fields() {
        let server = httpmock::MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/v1/companies");
                then.status(200).json_body(json!({
                    "employee_range": "51-200",
                    "founded_year": 2015,
                    "industry": "Information Technology",
                    "headline": "Cloud tooling for growing teams"
                }));
            })
            .await;

        let source = LinkedInSource::with_base_url(
            "key".to_string(),
            format!("{}/v1/companies", server.base_url()),
        );
        let result = source.enrich("acme.com", &EnrichmentHints::default()).await.unwrap();
        assert!(result
            .fields
            .iter()
            .any(|f| f.key == "employee_count_range" && f.raw_value == json!("51-200")));
    }

    #[tokio::test]
    async fn rate_limited_status_maps_to_rate_limited_kind() {
        let server = httpmock::MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET);
                then.status(429);
            })
            .await;

        let source = LinkedInSource::with_base_url("key".to_string(), server.base_url());
        let err = source
            .enrich("acme.com", &EnrichmentHints::default())
            .await
            .unwrap_err();
        assert_eq!(err, SourceErrorKind::RateLimited);
    }
}
