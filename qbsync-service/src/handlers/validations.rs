//! Invoice validation handlers.

use axum::extract::{Json, Path, Query, State};
use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

use crate::models::InvoiceValidation;
use crate::services::store::ValidationFilter;
use crate::services::validator::{ValidationBatchSummary, ValidationStats};
use crate::startup::AppState;
use service_core::error::AppError;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ValidationListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub ready_only: bool,
}

impl From<ValidationListQuery> for ValidationFilter {
    fn from(q: ValidationListQuery) -> Self {
        Self {
            status: q.status,
            search: q.search,
            ready_only: q.ready_only,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct BatchValidateRequest {
    #[validate(length(min = 1))]
    pub invoice_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunPendingQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApproveRequest {
    #[validate(length(min = 1))]
    pub approved_by: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MarkSyncedRequest {
    #[validate(length(min = 1))]
    pub qb_invoice_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Validate one invoice against current mappings.
///
/// POST /api/validations/:invoice_id
pub async fn validate_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
) -> Result<Json<InvoiceValidation>, AppError> {
    let validation = state.validator.validate_invoice(&invoice_id).await?;
    Ok(Json(validation))
}

/// Validate a list of invoices, isolating per-invoice failures.
///
/// POST /api/validations/batch
pub async fn validate_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchValidateRequest>,
) -> Result<Json<ValidationBatchSummary>, AppError> {
    req.validate()?;
    let summary = state.validator.validate_batch(&req.invoice_ids).await?;
    Ok(Json(summary))
}

/// Validate every invoice that has no validation row yet.
///
/// POST /api/validations/run-pending
pub async fn run_pending(
    State(state): State<AppState>,
    Query(query): Query<RunPendingQuery>,
) -> Result<Json<ValidationBatchSummary>, AppError> {
    let summary = state
        .validator
        .validate_all_pending(query.from, query.to, query.limit)
        .await?;
    Ok(Json(summary))
}

/// GET /api/validations
pub async fn list_validations(
    State(state): State<AppState>,
    Query(query): Query<ValidationListQuery>,
) -> Result<Json<Vec<InvoiceValidation>>, AppError> {
    let validations = state.validator.get_validations(&query.into()).await?;
    Ok(Json(validations))
}

/// GET /api/validations/stats
pub async fn validation_stats(
    State(state): State<AppState>,
) -> Result<Json<ValidationStats>, AppError> {
    let stats = state.validator.get_validation_stats().await?;
    Ok(Json(stats))
}

/// GET /api/validations/:invoice_id
pub async fn get_validation(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
) -> Result<Json<InvoiceValidation>, AppError> {
    state
        .validator
        .get_validation_status(&invoice_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("No validation for invoice {}", invoice_id))
        })
}

/// Approve a ready invoice for sync.
///
/// POST /api/validations/:invoice_id/approve
pub async fn approve_for_sync(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<InvoiceValidation>, AppError> {
    req.validate()?;
    let validation = state
        .validator
        .approve_for_sync(&invoice_id, &req.approved_by)
        .await?;
    Ok(Json(validation))
}

/// Manually mark an invoice synced (e.g. after an out-of-band write).
///
/// POST /api/validations/:invoice_id/mark-synced
pub async fn mark_synced(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
    Json(req): Json<MarkSyncedRequest>,
) -> Result<Json<InvoiceValidation>, AppError> {
    req.validate()?;
    let validation = state
        .validator
        .mark_as_synced(&invoice_id, &req.qb_invoice_id)
        .await?;
    Ok(Json(validation))
}

/// DELETE /api/validations/:invoice_id/clear
pub async fn clear_validation(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = state.validator.clear_validation(&invoice_id).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

/// Clear all non-synced validation rows.
///
/// DELETE /api/validations
pub async fn clear_all_validations(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = state.validator.clear_all_validations().await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
