//! Customer mapping handlers.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use validator::Validate;

use crate::models::CustomerMapping;
use crate::services::customer_matcher::{MappingStats, MatchingRunSummary};
use crate::services::store::MappingFilter;
use crate::startup::AppState;
use service_core::error::AppError;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct MappingListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
}

impl From<MappingListQuery> for MappingFilter {
    fn from(q: MappingListQuery) -> Self {
        Self {
            status: q.status,
            search: q.search,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub reviewed_by: String,
    pub notes: Option<String>,
}

/// Request to create a reviewer-chosen mapping.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateMappingRequest {
    #[validate(length(min = 1))]
    pub organization_id: String,
    /// Empty means "no manager distinction".
    #[serde(default)]
    pub manager_id: String,
    #[validate(length(min = 1))]
    pub qb_customer_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQbCustomerRequest {
    #[validate(length(min = 1))]
    pub qb_customer_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Run customer matching over all active customer organizations.
///
/// POST /api/customers/matching/run
pub async fn run_matching(
    State(state): State<AppState>,
) -> Result<Json<MatchingRunSummary>, AppError> {
    let summary = state.customer_matcher.run_matching().await?;
    Ok(Json(summary))
}

/// List customer mappings, optionally filtered by status or a name search.
///
/// GET /api/customers/mappings
pub async fn list_mappings(
    State(state): State<AppState>,
    Query(query): Query<MappingListQuery>,
) -> Result<Json<Vec<CustomerMapping>>, AppError> {
    let mappings = state.customer_matcher.get_mappings(&query.into()).await?;
    Ok(Json(mappings))
}

/// GET /api/customers/mappings/stats
pub async fn mapping_stats(
    State(state): State<AppState>,
) -> Result<Json<MappingStats>, AppError> {
    let stats = state.customer_matcher.get_mapping_stats().await?;
    Ok(Json(stats))
}

/// POST /api/customers/mappings/:id/approve
pub async fn approve_mapping(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<CustomerMapping>, AppError> {
    let mapping = state
        .customer_matcher
        .approve_mapping(id, &req.reviewed_by, req.notes.as_deref())
        .await?;
    Ok(Json(mapping))
}

/// POST /api/customers/mappings/:id/reject
pub async fn reject_mapping(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<CustomerMapping>, AppError> {
    let mapping = state
        .customer_matcher
        .reject_mapping(id, &req.reviewed_by, req.notes.as_deref())
        .await?;
    Ok(Json(mapping))
}

/// Create a manual, pre-approved mapping.
///
/// POST /api/customers/mappings
pub async fn create_mapping(
    State(state): State<AppState>,
    Json(req): Json<CreateMappingRequest>,
) -> Result<(StatusCode, Json<CustomerMapping>), AppError> {
    req.validate()?;
    let mapping = state
        .customer_matcher
        .create_manual_mapping(&req.organization_id, &req.manager_id, &req.qb_customer_id)
        .await?;
    Ok((StatusCode::CREATED, Json(mapping)))
}

/// Point an existing mapping at a different QuickBooks customer.
///
/// PUT /api/customers/mappings/:id/qb-customer
pub async fn update_qb_customer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateQbCustomerRequest>,
) -> Result<Json<CustomerMapping>, AppError> {
    req.validate()?;
    let mapping = state
        .customer_matcher
        .update_qb_customer(id, &req.qb_customer_id)
        .await?;
    Ok(Json(mapping))
}

/// Delete undecided mappings so the next matching run starts clean.
///
/// DELETE /api/customers/mappings
pub async fn clear_mappings(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = state.customer_matcher.clear_unapproved_mappings().await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
