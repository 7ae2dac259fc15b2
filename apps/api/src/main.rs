mod config;
mod db;
mod equivalency;
mod errors;
mod llm_client;
mod models;
mod routes;
mod state;
mod triage;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, TriageSettings};
use crate::db::create_pool;
use crate::equivalency::EquivalencyMap;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::triage::keywords::KeywordConfig;
use crate::triage::orchestrator::StructuredExtractor;
use crate::triage::pipeline::HeuristicTriage;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Passport API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Load keyword vocabulary and build the heuristic pipeline
    let keywords = load_keywords(&config.triage)?;
    let triage = HeuristicTriage::new(
        &keywords,
        config.triage.segment_policy,
        config.triage.min_block_chars,
    );
    info!(
        "Heuristic triage ready (policy: {:?}, categories: {:?})",
        triage.policy(),
        triage.categories()
    );

    let equivalency = load_equivalency(&config.triage)?;
    info!("Equivalency table loaded: {} tiers", equivalency.tiers().len());

    // Initialize LLM client for the assisted path
    let extractor: Option<Arc<dyn StructuredExtractor>> = match &config.anthropic_api_key {
        Some(key) => {
            info!("LLM client initialized (model: {})", llm_client::MODEL);
            Some(Arc::new(LlmClient::new(key.clone())))
        }
        None => {
            warn!("ANTHROPIC_API_KEY not set; assisted extraction disabled");
            None
        }
    };

    // Build app state
    let state = AppState {
        db,
        config: config.clone(),
        triage: Arc::new(triage),
        extractor,
        equivalency: Arc::new(equivalency),
    };

    // Build router
    // TODO: restrict CORS origins once the web client has a fixed host
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn load_keywords(settings: &TriageSettings) -> Result<KeywordConfig> {
    match &settings.keywords_path {
        Some(path) => {
            let keywords = KeywordConfig::from_file(path)
                .with_context(|| format!("KEYWORDS_PATH={path}"))?;
            info!("Keyword vocabulary loaded from {path}");
            Ok(keywords)
        }
        None => Ok(KeywordConfig::default()),
    }
}

fn load_equivalency(settings: &TriageSettings) -> Result<EquivalencyMap> {
    match &settings.equivalency_path {
        Some(path) => EquivalencyMap::from_file(path)
            .with_context(|| format!("EQUIVALENCY_PATH={path}")),
        None => Ok(EquivalencyMap::default()),
    }
}
