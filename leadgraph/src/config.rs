//! Environment configuration, loaded once at startup with fail-fast validation.
//!
//! Covers per-source API keys (optional — absence disables the
//! source), an LLM provider key (required), durable-store and event-store
//! credentials (required), allowed event-stream origins, a per-IP daily
//! submission quota, and an environment flag. No `std::env::var` calls are
//! scattered through the rest of the crate; everything funnels through
//! [`LeadgraphConfig::from_env`].

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "staging" => Self::Staging,
            _ => Self::Development,
        }
    }
}

/// Per-source API key, `None` when the source should be disabled.
#[derive(Debug, Clone, Default)]
pub struct SourceKeys {
    pub ip_geolocation: Option<String>,
    pub corporate_registry: Option<String>,
    pub linkedin: Option<String>,
    pub places_directory: Option<String>,
    pub people_api: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: String,
    pub api_key: String,
    pub default_model: String,
    pub strategy_model: String,
    pub call_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LeadgraphConfig {
    pub environment: Environment,
    pub source_keys: SourceKeys,
    pub llm: LlmConfig,
    pub database_url: String,
    pub event_store_url: String,
    pub bind_addr: String,
    pub allowed_stream_origins: Vec<String>,
    pub daily_submission_quota_per_ip: u32,
    pub enrichment_cache_ttl: Duration,
    pub stage_cache_ttl: Duration,
}

impl LeadgraphConfig {
    /// Load and validate configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] the first time a required variable is
    /// missing or malformed; never panics.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let environment = Environment::parse(&env_or("LEADGRAPH_ENV", "development"));

        let llm = LlmConfig {
            provider: env_or("LLM_PROVIDER", "openai"),
            api_key: require("LLM_API_KEY")?,
            default_model: env_or("LLM_DEFAULT_MODEL", "gpt-4o-mini"),
            strategy_model: env_or("LLM_STRATEGY_MODEL", "gpt-4o"),
            call_timeout: Duration::from_secs(parse_or("LLM_CALL_TIMEOUT_SECS", 60)?),
        };

        let database_url = require("DATABASE_URL")?;
        let event_store_url = env_or("EVENT_STORE_URL", &database_url);

        let allowed_stream_origins = std::env::var("ALLOWED_STREAM_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let daily_submission_quota_per_ip = parse_or("DAILY_SUBMISSION_QUOTA_PER_IP", 50)?;
        let bind_addr = env_or("BIND_ADDR", "0.0.0.0:8080");

        Ok(Self {
            environment,
            source_keys: SourceKeys {
                ip_geolocation: std::env::var("IPGEO_API_KEY").ok(),
                corporate_registry: std::env::var("CNPJ_API_KEY").ok(),
                linkedin: std::env::var("LINKEDIN_API_KEY").ok(),
                places_directory: std::env::var("PLACES_API_KEY").ok(),
                people_api: std::env::var("PEOPLE_API_KEY").ok(),
            },
            llm,
            database_url,
            event_store_url,
            bind_addr,
            allowed_stream_origins,
            daily_submission_quota_per_ip,
            enrichment_cache_ttl: Duration::from_secs(60 * 60 * 24 * 30),
            stage_cache_ttl: Duration::from_secs(60 * 60 * 24 * 7),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn require(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_defaults_to_development() {
        assert_eq!(Environment::parse(""), Environment::Development);
        assert_eq!(Environment::parse("PRODUCTION"), Environment::Production);
        assert_eq!(Environment::parse("staging"), Environment::Staging);
    }
}
