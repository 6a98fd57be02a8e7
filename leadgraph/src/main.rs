//! Leadgraph server binary — wires configuration, persistence, the
//! enrichment/analysis engines, and the HTTP surface together and serves
//! `axum::serve`.

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use leadgraph::breaker::BreakerRegistry;
use leadgraph::cache::{EnrichmentCache, SqlxKvStore, StageCache};
use leadgraph::config::{ConfigError, LeadgraphConfig, SourceKeys};
use leadgraph::enrichment::EnrichmentOrchestrator;
use leadgraph::errors::LlmError;
use leadgraph::http::{self, AppState};
use leadgraph::llm::LlmClient;
use leadgraph::persistence::{self, PersistenceError, SqlxRepo};
use leadgraph::pipeline::AnalysisPipeline;
use leadgraph::sources::EnrichmentSource;
use leadgraph::sources::{cnpj_registry, geoip, linkedin, llm_inference, metadata, people_api, places};

#[derive(Debug, Error)]
enum MainError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Serve(#[from] std::io::Error),
}

/// Builds the L1/L2/L3 source rosters from [`SourceKeys`], skipping any
/// source whose API key is absent (L1's metadata scraper needs no key and
/// is always present).
fn build_sources(keys: &SourceKeys, llm_client: Arc<LlmClient>, model_id: &str) -> (Vec<Arc<dyn EnrichmentSource>>, Vec<Arc<dyn EnrichmentSource>>, Vec<Arc<dyn EnrichmentSource>>) {
    let mut l1: Vec<Arc<dyn EnrichmentSource>> = vec![Arc::new(metadata::MetadataSource::new())];
    if let Some(key) = &keys.ip_geolocation {
        l1.push(Arc::new(geoip::GeoIpSource::new(key.clone())));
    }

    let mut l2: Vec<Arc<dyn EnrichmentSource>> = Vec::new();
    if let Some(key) = &keys.corporate_registry {
        l2.push(Arc::new(cnpj_registry::CnpjRegistrySource::new(key.clone())));
    }
    if let Some(key) = &keys.places_directory {
        l2.push(Arc::new(places::PlacesSource::new(key.clone())));
    }
    if let Some(key) = &keys.people_api {
        l2.push(Arc::new(people_api::PeopleApiSource::new(key.clone())));
    }
    if let Some(key) = &keys.linkedin {
        l2.push(Arc::new(linkedin::LinkedInSource::new(key.clone())));
    }

    let l3: Vec<Arc<dyn EnrichmentSource>> = vec![Arc::new(llm_inference::LlmInferenceSource::new(llm_client, model_id))];

    (l1, l2, l3)
}

#[tokio::main]
async fn main() -> Result<(), MainError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = LeadgraphConfig::from_env()?;
    tracing::info!(environment = ?config.environment, "loaded configuration");

    let pool = persistence::connect(&config.database_url).await?;
    tracing::info!("connected to postgres and ran migrations");

    let kv_store = Arc::new(SqlxKvStore::new(pool.clone()));
    let enrichment_cache = Arc::new(EnrichmentCache::new(kv_store.clone(), config.enrichment_cache_ttl));
    let stage_cache = Arc::new(StageCache::new(kv_store, config.stage_cache_ttl));

    let submission_repo: Arc<dyn persistence::SubmissionRepo> = Arc::new(SqlxRepo::new(pool.clone()));
    let ledger_repo: Arc<dyn persistence::EditLedgerRepo> = Arc::new(SqlxRepo::new(pool));

    let llm_client = Arc::new(LlmClient::new(&config.llm)?);
    let breakers = Arc::new(BreakerRegistry::new());

    let (l1, l2, l3) = build_sources(&config.source_keys, llm_client.clone(), &config.llm.default_model);
    let orchestrator = Arc::new(EnrichmentOrchestrator::new(l1, l2, l3, breakers, enrichment_cache.clone(), ledger_repo.clone()));
    let pipeline = Arc::new(AnalysisPipeline::new(llm_client, stage_cache, &config.llm));

    let config = Arc::new(config);
    let state = AppState::new(config.clone(), orchestrator, pipeline, submission_repo, ledger_repo, enrichment_cache);
    let router = http::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|source| MainError::Bind { addr: config.bind_addr.clone(), source })?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}
