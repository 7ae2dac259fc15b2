pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;
use crate::triage::handlers;

/// Upper bound for uploaded CVs.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Triage API
        .route("/api/v1/triage", post(handlers::handle_triage_upload))
        .route("/api/v1/triage/text", post(handlers::handle_triage_text))
        .route(
            "/api/v1/triage/assisted",
            post(handlers::handle_triage_assisted),
        )
        .route("/api/v1/records/confirm", post(handlers::handle_confirm_records))
        // Equivalency / profile
        .route("/api/v1/equivalency", get(handlers::handle_list_tiers))
        .route(
            "/api/v1/equivalency/:tier",
            get(handlers::handle_tier_titles),
        )
        .route("/api/v1/profile/tier", put(handlers::handle_update_tier))
        // Export
        .route("/api/v1/export/bundle", post(handlers::handle_export_bundle))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
