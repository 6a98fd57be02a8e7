//! Web-metadata fetcher: title, meta description, Open Graph tags, and a
//! crude tech-stack sniff from response headers and script `src`s.
//!
//! L1, cheap, instant field hints. Grounded on the same `reqwest` +
//! `scraper` combination the retrieval pack's scraping examples use: fetch
//! once, parse with `scraper::Html`, select with CSS selectors rather than
//! hand-rolled string search.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{json, Value};

use crate::breaker::BreakerConfig;
use crate::errors::SourceErrorKind;
use crate::normalize::to_https_url;

use super::{EnrichmentHints, EnrichmentSource, SourceField, SourceResult};

pub struct MetadataSource {
    client: reqwest::Client,
}

impl MetadataSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .user_agent("leadgraph-metadata/1.0")
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for MetadataSource {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_transport(err: &reqwest::Error) -> SourceErrorKind {
    if err.is_timeout() {
        SourceErrorKind::Timeout
    } else if err.status().is_some_and(|s| s.as_u16() == 404) {
        SourceErrorKind::NotFound
    } else if err.status().is_some_and(|s| s.is_server_error()) {
        SourceErrorKind::Upstream5xx
    } else {
        SourceErrorKind::Network
    }
}

fn extract_fields(html: &str) -> Vec<SourceField> {
    let document = Html::parse_document(html);
    let mut fields = Vec::new();

    if let Ok(selector) = Selector::parse("title") {
        if let Some(title) = document.select(&selector).next() {
            let text = title.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                fields.push(SourceField::simple("company_name", json!(text)));
            }
        }
    }

    if let Ok(selector) = Selector::parse(r#"meta[name="description"]"#) {
        if let Some(meta) = document.select(&selector).next() {
            if let Some(content) = meta.value().attr("content") {
                fields.push(SourceField::simple("description", json!(content.trim())));
            }
        }
    }

    if let Ok(selector) = Selector::parse(r#"meta[property="og:site_name"]"#) {
        if let Some(meta) = document.select(&selector).next() {
            if let Some(content) = meta.value().attr("content") {
                fields.push(SourceField::simple("company_name", json!(content.trim())));
            }
        }
    }

    let tech_stack = sniff_tech_stack(&document);
    if !tech_stack.is_empty() {
        fields.push(SourceField::simple("ai_tech_stack", Value::Array(tech_stack)));
    }

    fields
}

/// A coarse, best-effort tech fingerprint from script `src` hostnames —
/// nowhere near Wappalyzer's depth, but enough to hint at platform choice.
fn sniff_tech_stack(document: &Html) -> Vec<Value> {
    let Ok(selector) = Selector::parse("script[src]") else {
        return Vec::new();
    };
    let mut found = Vec::new();
    for script in document.select(&selector) {
        let Some(src) = script.value().attr("src") else {
            continue;
        };
        let hit = if src.contains("shopify") {
            Some("shopify")
        } else if src.contains("wp-content") || src.contains("wordpress") {
            Some("wordpress")
        } else if src.contains("react") {
            Some("react")
        } else if src.contains("webflow") {
            Some("webflow")
        } else {
            None
        };
        if let Some(hit) = hit {
            let value = json!(hit);
            if !found.contains(&value) {
                found.push(value);
            }
        }
    }
    found
}

#[async_trait]
impl EnrichmentSource for MetadataSource {
    fn name(&self) -> &'static str {
        "metadata"
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
        60
    }

    async fn enrich(&self, domain: &str, _hints: &EnrichmentHints) -> Result<SourceResult, SourceErrorKind> {
        let url = to_https_url(domain);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        if response.status().as_u16() == 404 {
            return Err(SourceErrorKind::NotFound);
        }
        if response.status().is_server_error() {
            return Err(SourceErrorKind::Upstream5xx);
        }
        let html = response.text().await.map_err(|e| classify_transport(&e))?;

        Ok(SourceResult {
            fields: extract_fields(&html),
            cost_usd: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_description() {
        let html = r#"<html><head><title>Acme Corp</title>
            <meta name="description" content="We make widgets."></head></html>"#;
        let fields = extract_fields(html);
        assert!(fields.iter().any(|f| f.key == "company_name" && f.raw_value == json!("Acme Corp")));
        assert!(fields.iter().any(|f| f.key == "description"));
    }

    #[test]
    fn sniffs_wordpress_from_script_src() {
        let html = r#"<html><body><script src="/wp-content/themes/x/app.js"></script></body></html>"#;
        let document = Html::parse_document(html);
        let stack = sniff_tech_stack(&document);
        assert!(stack.contains(&json!("wordpress")));
    }

    #[test]
    fn missing_tags_produce_no_fields() {
        let fields = extract_fields("<html><body>hello</body></html>");
        assert!(fields.is_empty());
    }
}
