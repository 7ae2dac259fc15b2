use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::equivalency::EquivalencyMap;
use crate::triage::orchestrator::StructuredExtractor;
use crate::triage::pipeline::HeuristicTriage;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    /// Classifier + segmenter built from the active keyword vocabulary.
    pub triage: Arc<HeuristicTriage>,
    /// Extraction collaborator for the assisted path. `None` when no API key is configured.
    pub extractor: Option<Arc<dyn StructuredExtractor>>,
    pub equivalency: Arc<EquivalencyMap>,
}
