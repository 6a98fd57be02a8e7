//! IP-geolocation probe: resolves the domain's hosting country and
//! timezone from a third-party geo-IP API.
//!
//! L1, cheap, instant field hints. Disabled (never fanned out to) when no
//! `IPGEO_API_KEY` is configured — see
//! [`crate::config::SourceKeys::ip_geolocation`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::breaker::BreakerConfig;
use crate::errors::SourceErrorKind;
use crate::normalize::normalize_domain;

use super::{EnrichmentHints, EnrichmentSource, SourceField, SourceResult};

#[derive(Debug, Deserialize)]
struct GeoIpResponse {
    country_name: Option<String>,
    time_zone: Option<String>,
    city: Option<String>,
}

pub struct GeoIpSource {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeoIpSource {
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: "https://api.ipgeolocation.io/ipgeo".to_string(),
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
impl EnrichmentSource for GeoIpSource {
    fn name(&self) -> &'static str {
        "geoip"
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
        75
    }

    async fn enrich(&self, domain: &str, _hints: &EnrichmentHints) -> Result<SourceResult, SourceErrorKind> {
        let host = normalize_domain(domain);
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("apiKey", self.api_key.as_str()), ("domain", host.as_str())])
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

        let body: GeoIpResponse = response.json().await.map_err(|_| SourceErrorKind::Parse)?;

        let mut fields = Vec::new();
        if let Some(country) = body.country_name {
            fields.push(SourceField::simple("country", json!(country)));
        }
        if let Some(city) = body.city {
            fields.push(SourceField::simple("city", json!(city)));
        }
        if let Some(tz) = body.time_zone {
            fields.push(SourceField::simple("ai_timezone", json!(tz)));
        }
        if fields.is_empty() {
            return Err(SourceErrorKind::NotFound);
        }

        Ok(SourceResult {
            fields,
            cost_usd: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn maps_country_city_and_timezone() {
        let server = httpmock::MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/ipgeo");
                then.status(200).json_body(json!({
                    "country_name": "Brazil",
                    "city": "Sao Paulo",
                    "time_zone": "America/Sao_Paulo"
                }));
            })
            .await;

        let source = GeoIpSource::with_base_url("test-key".to_string(), format!("{}/ipgeo", server.base_url()));
        let result = source
            .enrich("acme.com.br", &EnrichmentHints::default())
            .await
            .unwrap();
        assert!(result.fields.iter().any(|f| f.key == "country" && f.raw_value == json!("Brazil")));
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

        let source = GeoIpSource::with_base_url("test-key".to_string(), server.base_url());
        let err = source.enrich("acme.com", &EnrichmentHints::default()).await.unwrap_err();
        assert_eq!(err, SourceErrorKind::NotFound);
    }
}
