//! Axum route handlers for the Triage API.

use std::ops::ControlFlow;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::equivalency::Tier;
use crate::errors::AppError;
use crate::models::record::ProfileRow;
use crate::state::AppState;
use crate::triage::export::{build_export_bundle, ExportBundle};
use crate::triage::extractor::extract_text;
use crate::triage::models::{Block, DocumentFormat, RawDocument, TriageResult};
use crate::triage::orchestrator::AssistedOutcome;
use crate::triage::pipeline::{assisted_triage, HeuristicTriage};
use crate::triage::records::{confirmable_blocks, confirmable_records, ConfirmedRecord};
use crate::triage::segmenter::SegmentPolicy;
use crate::triage::store;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TextTriageRequest {
    pub text: String,
    pub policy: Option<SegmentPolicy>,
}

#[derive(Debug, Serialize)]
pub struct TriageResponse {
    pub policy: SegmentPolicy,
    /// `None` when the upload had an unsupported extension.
    pub format: Option<DocumentFormat>,
    pub block_count: usize,
    pub result: TriageResult<Block>,
    pub confirmable: Vec<ConfirmedRecord>,
}

#[derive(Debug, Serialize)]
pub struct AssistedResponse {
    pub format: Option<DocumentFormat>,
    #[serde(flatten)]
    pub outcome: AssistedOutcome,
    pub confirmable: Vec<ConfirmedRecord>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub user_id: String,
    pub records: Vec<ConfirmedRecord>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub stored: usize,
    pub record_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct TierListResponse {
    pub jurisdictions: Vec<String>,
    pub tiers: Vec<Tier>,
}

#[derive(Debug, Deserialize)]
pub struct JurisdictionQuery {
    /// Comma-separated jurisdiction keys. All known jurisdictions when absent.
    pub jurisdictions: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TierTitlesResponse {
    pub tier: String,
    pub responsibilities: String,
    pub titles: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTierRequest {
    pub user_id: String,
    pub tier: String,
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub user_id: String,
    pub jurisdictions: Vec<String>,
    /// Overrides the stored profile tier.
    pub tier: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Upload helpers
// ────────────────────────────────────────────────────────────────────────────

struct Upload {
    filename: String,
    data: Bytes,
    policy: Option<SegmentPolicy>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, AppError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut policy = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("failed to read upload: {e}")))?;
                file = Some((filename, data));
            }
            Some("policy") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("failed to read policy: {e}")))?;
                policy = Some(raw.parse::<SegmentPolicy>().map_err(AppError::Validation)?);
            }
            _ => {}
        }
    }

    let (filename, data) =
        file.ok_or_else(|| AppError::Validation("multipart field 'file' is required".to_string()))?;
    Ok(Upload {
        filename,
        data,
        policy,
    })
}

/// Extracts text off the async runtime. Unsupported formats and extraction failures
/// both come back as an empty string.
async fn extract_upload(upload: &Upload) -> (Option<DocumentFormat>, String) {
    let Some(format) = DocumentFormat::from_filename(&upload.filename) else {
        warn!("Unsupported upload '{}', treating as empty", upload.filename);
        return (None, String::new());
    };

    let document = RawDocument {
        data: upload.data.clone(),
        format,
    };
    let text = tokio::task::spawn_blocking(move || extract_text(&document))
        .await
        .unwrap_or_else(|e| {
            warn!("Extraction task failed: {e}");
            String::new()
        });
    (Some(format), text)
}

/// The shared pipeline, or a copy with the requested segmentation policy.
fn triage_for(state: &AppState, policy: Option<SegmentPolicy>) -> Arc<HeuristicTriage> {
    match policy {
        Some(policy) if policy != state.triage.policy() => {
            Arc::new(state.triage.with_policy(policy))
        }
        _ => state.triage.clone(),
    }
}

fn triage_response(
    triage: &HeuristicTriage,
    format: Option<DocumentFormat>,
    result: TriageResult<Block>,
) -> TriageResponse {
    TriageResponse {
        policy: triage.policy(),
        format,
        block_count: result.total(),
        confirmable: confirmable_blocks(&result),
        result,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/triage
///
/// Multipart upload (`file`, optional `policy`). Runs the heuristic path.
/// Unreadable or unsupported documents yield an empty result, not an error.
pub async fn handle_triage_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<TriageResponse>, AppError> {
    let upload = read_upload(multipart).await?;
    let triage = triage_for(&state, upload.policy);

    let Some(format) = DocumentFormat::from_filename(&upload.filename) else {
        warn!("Unsupported upload '{}', treating as empty", upload.filename);
        return Ok(Json(triage_response(&triage, None, TriageResult::new())));
    };

    let document = RawDocument {
        data: upload.data,
        format,
    };
    let worker = triage.clone();
    let result = tokio::task::spawn_blocking(move || worker.triage_document(&document))
        .await
        .unwrap_or_else(|e| {
            warn!("Triage task failed: {e}");
            TriageResult::new()
        });
    info!(
        "Triage upload '{}': {} blocks",
        upload.filename,
        result.total()
    );
    Ok(Json(triage_response(&triage, Some(format), result)))
}

/// POST /api/v1/triage/text
///
/// Heuristic triage over already-extracted text.
pub async fn handle_triage_text(
    State(state): State<AppState>,
    Json(request): Json<TextTriageRequest>,
) -> Result<Json<TriageResponse>, AppError> {
    let triage = triage_for(&state, request.policy);
    let result = triage.triage_text(&request.text);
    Ok(Json(triage_response(&triage, None, result)))
}

/// POST /api/v1/triage/assisted
///
/// Multipart upload. Chunks the extracted text through the extraction collaborator
/// and returns the merged records with a per-chunk report.
pub async fn handle_triage_assisted(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AssistedResponse>, AppError> {
    let extractor = state.extractor.clone().ok_or_else(|| {
        AppError::Unavailable("assisted extraction is not configured".to_string())
    })?;

    let upload = read_upload(multipart).await?;
    let (format, text) = extract_upload(&upload).await;

    let outcome = assisted_triage(
        &text,
        extractor.as_ref(),
        state.config.triage.orchestrator(),
        |progress| {
            info!(
                chunk = progress.report.index,
                attempts = progress.report.attempts,
                "Assisted extraction {}/{}",
                progress.completed,
                progress.total
            );
            ControlFlow::Continue(())
        },
    )
    .await;

    Ok(Json(AssistedResponse {
        format,
        confirmable: confirmable_records(&outcome.result),
        outcome,
    }))
}

/// POST /api/v1/records/confirm
///
/// Persists user-confirmed records, one insert each.
pub async fn handle_confirm_records(
    State(state): State<AppState>,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>, AppError> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id cannot be empty".to_string()));
    }
    if request.records.is_empty() {
        return Err(AppError::Validation("records cannot be empty".to_string()));
    }

    let record_ids =
        store::insert_confirmed_records(&state.db, &request.user_id, &request.records).await?;

    Ok(Json(ConfirmResponse {
        stored: record_ids.len(),
        record_ids,
    }))
}

/// GET /api/v1/equivalency
pub async fn handle_list_tiers(State(state): State<AppState>) -> Json<TierListResponse> {
    Json(TierListResponse {
        jurisdictions: state
            .equivalency
            .jurisdictions()
            .into_iter()
            .map(str::to_string)
            .collect(),
        tiers: state.equivalency.tiers().to_vec(),
    })
}

/// GET /api/v1/equivalency/:tier?jurisdictions=UK,US
pub async fn handle_tier_titles(
    State(state): State<AppState>,
    Path(tier_name): Path<String>,
    Query(query): Query<JurisdictionQuery>,
) -> Result<Json<TierTitlesResponse>, AppError> {
    let tier = state
        .equivalency
        .tier(&tier_name)
        .ok_or_else(|| AppError::NotFound(format!("Tier '{tier_name}' not found")))?;

    let jurisdictions: Vec<String> = match query.jurisdictions.as_deref() {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|j| !j.is_empty())
            .map(str::to_string)
            .collect(),
        None => state
            .equivalency
            .jurisdictions()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };

    let titles = jurisdictions
        .into_iter()
        .map(|j| {
            let title = state.equivalency.lookup(&tier.name, &j).to_string();
            (j, title)
        })
        .collect();

    Ok(Json(TierTitlesResponse {
        tier: tier.name.clone(),
        responsibilities: tier.responsibilities.clone(),
        titles,
    }))
}

/// PUT /api/v1/profile/tier
pub async fn handle_update_tier(
    State(state): State<AppState>,
    Json(request): Json<UpdateTierRequest>,
) -> Result<Json<ProfileRow>, AppError> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id cannot be empty".to_string()));
    }
    if state.equivalency.tier(&request.tier).is_none() {
        return Err(AppError::Validation(format!(
            "unknown tier '{}'",
            request.tier
        )));
    }

    let profile = store::upsert_global_tier(&state.db, &request.user_id, &request.tier).await?;
    info!("Tier for {} set to '{}'", profile.user_id, profile.global_tier);
    Ok(Json(profile))
}

/// POST /api/v1/export/bundle
///
/// Assembles the renderer input from persisted records and the resolved tier.
pub async fn handle_export_bundle(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> Result<Json<ExportBundle>, AppError> {
    let rows = store::list_records(&state.db, &request.user_id).await?;

    let stored_tier = match request.tier {
        Some(tier) => Some(tier),
        None => store::get_profile(&state.db, &request.user_id)
            .await?
            .map(|p| p.global_tier),
    };
    let tier = state.equivalency.resolve(stored_tier.as_deref());

    Ok(Json(build_export_bundle(
        &request.user_id,
        rows.into_iter().map(ConfirmedRecord::from),
        tier,
        &request.jurisdictions,
    )))
}
