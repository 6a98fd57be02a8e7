//! Corporate-registry lookup: Brazilian CNPJ registry data (legal name,
//! region, founding year) keyed by company name guessed from an earlier
//! layer's hints.
//!
//! L2, structured business data. Expensive-external breaker profile — a
//! paid, rate-limited third-party API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::breaker::BreakerConfig;
use crate::errors::SourceErrorKind;

use super::{EnrichmentHints, EnrichmentSource, SourceField, SourceResult};

#[derive(Debug, Deserialize)]
struct RegistryResponse {
    razao_social: Option<String>,
    uf: Option<String>,
    pais: Option<String>,
    ano_fundacao: Option<i32>,
}

pub struct CnpjRegistrySource {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl CnpjRegistrySource {
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: "https://api.cnpjregistry.example/v1/search".to_string(),
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
impl EnrichmentSource for CnpjRegistrySource {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn cost_estimate_usd(&self) -> f64 {
        0.01
    }

    fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig::expensive_external()
    }

    fn confidence_prior(&self) -> u8 {
        90
    }

    async fn enrich(&self, domain: &str, hints: &EnrichmentHints) -> Result<SourceResult, SourceErrorKind> {
        let query = hints.company_name.clone().unwrap_or_else(|| domain.to_string());

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query.as_str())])
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

        let body: RegistryResponse = response.json().await.map_err(|_| SourceErrorKind::Parse)?;

        let mut fields = Vec::new();
        if let Some(legal_name) = body.razao_social {
            fields.push(SourceField::simple("legal_name", json!(legal_name)));
        }
        if let Some(uf) = body.uf {
            fields.push(SourceField::simple("region", json!(uf)));
        }
        if let Some(country) = body.pais {
            fields.push(SourceField::simple("country", json!(country)));
        }
        if let Some(year) = body.ano_fundacao {
            fields.push(SourceField::simple("founded_year", json!(year)));
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
    async fn maps_registry_fields() {
        let server = httpmock::MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/v1/search");
                then.status(200).json_body(json!({
                    "razao_social": "Acme Tecnologia Ltda",
                    "uf": "SP",
                    "pais": "Brasil",
                    "ano_fundacao": 2010
                }));
            })
            .await;

        let source = CnpjRegistrySource::with_base_url(
            "key".to_string(),
            format!("{}/v1/search", server.base_url()),
        );
        let hints = EnrichmentHints {
            company_name: Some("Acme".to_string()),
            ..Default::default()
        };
        let result = source.enrich("acme.com.br", &hints).await.unwrap();
        assert!(result.fields.iter().any(|f| f.key == "legal_name"));
        assert!(result.cost_usd > 0.0);
    }

    #[tokio::test]
    async fn not_found_status_maps_to_not_found_kind() {
        let server = httpmock::MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET);
                then.status(404);
            })
            .await;

        let source = CnpjRegistrySource::with_base_url("key".to_string(), server.base_url());
        let err = source
            .enrich("unknown.com", &EnrichmentHints::default())
            .await
            .unwrap_err();
        assert_eq!(err, SourceErrorKind::NotFound);
    }
}
