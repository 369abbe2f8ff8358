//! SKU mapping handlers.

use axum::extract::{Json, Query, State};
use serde::Deserialize;
use validator::Validate;

use crate::handlers::customers::MappingListQuery;
use crate::models::SkuMapping;
use crate::services::sku_matcher::{SkuMatchStats, SkuMatchingRunSummary};
use crate::startup::AppState;
use service_core::error::AppError;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct ApproveMatchRequest {
    #[validate(length(min = 1))]
    pub sku_code: String,
}

fn default_item_type() -> String {
    "Service".to_string()
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateItemRequest {
    #[validate(length(min = 1))]
    pub sku_code: String,
    /// QuickBooks item type, "Service" or "NonInventory".
    #[serde(default = "default_item_type")]
    pub item_type: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Match every SKU found on sync-eligible invoices against QuickBooks items.
///
/// POST /api/skus/matching/run
pub async fn run_matching(
    State(state): State<AppState>,
) -> Result<Json<SkuMatchingRunSummary>, AppError> {
    let summary = state.sku_matcher.match_invoice_skus().await?;
    Ok(Json(summary))
}

/// GET /api/skus/mappings
pub async fn list_mappings(
    State(state): State<AppState>,
    Query(query): Query<MappingListQuery>,
) -> Result<Json<Vec<SkuMapping>>, AppError> {
    let mappings = state.sku_matcher.get_mappings(&query.into()).await?;
    Ok(Json(mappings))
}

/// GET /api/skus/matching/stats
pub async fn match_stats(State(state): State<AppState>) -> Result<Json<SkuMatchStats>, AppError> {
    let stats = state.sku_matcher.get_match_stats().await?;
    Ok(Json(stats))
}

/// POST /api/skus/matches/approve
pub async fn approve_match(
    State(state): State<AppState>,
    Json(req): Json<ApproveMatchRequest>,
) -> Result<Json<SkuMapping>, AppError> {
    req.validate()?;
    let mapping = state.sku_matcher.approve_match(&req.sku_code).await?;
    Ok(Json(mapping))
}

/// Approve every currently-matched SKU in one shot.
///
/// POST /api/skus/matches/approve-all
pub async fn approve_all_matches(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let approved = state.sku_matcher.approve_all_matches().await?;
    Ok(Json(serde_json::json!({ "approved": approved })))
}

/// Create a QuickBooks item for an unmatched SKU.
///
/// POST /api/skus/items
pub async fn create_item(
    State(state): State<AppState>,
    Json(req): Json<CreateItemRequest>,
) -> Result<Json<SkuMapping>, AppError> {
    req.validate()?;
    let mapping = state
        .sku_matcher
        .create_item_for_sku(&req.sku_code, &req.item_type)
        .await?;
    Ok(Json(mapping))
}
