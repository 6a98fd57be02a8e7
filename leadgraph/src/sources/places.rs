//! Business-directory lookup: a places/maps style API resolving a
//! storefront's category, rating, and review count from its domain or
//! guessed company name.
//!
//! L2, structured business data — same call shape as [`super::geoip`], a
//! GET-with-API-key call against a single fixed endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::breaker::BreakerConfig;
use crate::errors::SourceErrorKind;

use super::{EnrichmentHints, EnrichmentSource, SourceField, SourceResult};

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    category: Option<String>,
    rating: Option<f64>,
    review_count: Option<u32>,
    formatted_address: Option<String>,
}

pub struct PlacesSource {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PlacesSource {
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: "https://api.placesdirectory.example/v1/search".to_string(),
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
    } else if err.status().is_some_and(|s| s.as_u16() == 429) {
        SourceErrorKind::RateLimited
    } else if err.status().is_some_and(|s| s.is_server_error()) {
        SourceErrorKind::Upstream5xx
    } else {
        SourceErrorKind::Network
    }
}

#[async_trait]
impl EnrichmentSource for PlacesSource {
    fn name(&self) -> &'static str {
        "places"
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(1800)
    }

    fn cost_estimate_usd(&self) -> f64 {
        0.0
    }

    fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig::llm_or_metadata()
    }

    fn confidence_prior(&self) -> u8 {
        65
    }

    async fn enrich(&self, domain: &str, hints: &EnrichmentHints) -> Result<SourceResult, SourceErrorKind> {
        let query = hints.company_name.clone().unwrap_or_else(|| domain.to_string());

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("key", self.api_key.as_str()), ("query", query.as_str())])
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        if response.status().as_u16() == 401 || response.status().as_u16() == 403 {
            return Err(SourceErrorKind::Auth);
        }
        if response.status().as_u16() == 429 {
            return Err(SourceErrorKind::RateLimited);
        }
        if response.status().is_server_error() {
            return Err(SourceErrorKind::Upstream5xx);
        }

        let body: PlacesResponse = response.json().await.map_err(|_| SourceErrorKind::Parse)?;

        let mut fields = Vec::new();
        if let Some(category) = body.category {
            fields.push(SourceField::simple("ai_business_category", json!(category)));
        }
        if let Some(rating) = body.rating {
            fields.push(SourceField::simple("ai_rating", json!(rating)));
        }
        if let Some(count) = body.review_count {
            fields.push(SourceField::simple("ai_review_count", json!(count)));
        }
        if let Some(address) = body.formatted_address {
            fields.push(SourceField::simple("address", json!(address)));
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
    async fn maps_category_rating_and_reviews() {
        let server = httpmock::MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/v1/search");
                then.status(200).json_body(json!({
                    "category": "Software Company",
                    "rating": 4.6,
                    "review_count": 128,
                    "formatted_address": "123 Market St, San Francisco, CA"
                }));
            })
            .await;

        let source =
            PlacesSource::with_base_url("key".to_string(), format!("{}/v1/search", server.base_url()));
        let hints = EnrichmentHints {
            company_name: Some("Acme".to_string()),
            ..Default::default()
        };
        let result = source.enrich("acme.com", &hints).await.unwrap();
        assert!(result.fields.iter().any(|f| f.key == "ai_rating" && f.raw_value == json!(4.6)));
    }

    #[tokio::test]
    async fn empty_body_is_not_found() {
        let server = httpmock::MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET);
                then.status(200).json_body(json!({}));
            })
            .await;

        let source = PlacesSource::with_base_url("key".to_string(), server.base_url());
        let err = source.enrich("acme.com", &EnrichmentHints::default()).await.unwrap_err();
        assert_eq!(err, SourceErrorKind::NotFound);
    }
}
