//! Invoice sync and review-listing handlers.

use axum::extract::{Json, Path, Query, State};
use serde::Deserialize;
use validator::Validate;

use crate::services::sync::{
    InvoiceDetails, InvoiceListPage, SyncBatchSummary, SyncOptions, SyncResult,
};
use crate::startup::AppState;
use service_core::error::AppError;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SyncInvoiceRequest {
    /// Bypass mapping resolution and bill this customer directly.
    pub qb_customer_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SyncBatchRequest {
    #[validate(length(min = 1))]
    pub invoice_ids: Vec<String>,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct InvoiceListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Sync one invoice to QuickBooks.
///
/// POST /api/sync/invoices/:invoice_id
pub async fn sync_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
    body: Option<Json<SyncInvoiceRequest>>,
) -> Result<Json<SyncResult>, AppError> {
    let options = SyncOptions {
        qb_customer_id: body.and_then(|Json(req)| req.qb_customer_id),
    };
    let result = state.sync.sync_invoice(&invoice_id, &options).await?;
    Ok(Json(result))
}

/// Sync a list of invoices sequentially.
///
/// POST /api/sync/batch
pub async fn sync_batch(
    State(state): State<AppState>,
    Json(req): Json<SyncBatchRequest>,
) -> Result<Json<SyncBatchSummary>, AppError> {
    req.validate()?;
    let summary = state.sync.sync_batch(&req.invoice_ids).await?;
    Ok(Json(summary))
}

/// Sync every invoice whose validation row is ready.
///
/// POST /api/sync/run-ready
pub async fn sync_all_ready(
    State(state): State<AppState>,
) -> Result<Json<SyncBatchSummary>, AppError> {
    let summary = state.sync.sync_all_ready().await?;
    Ok(Json(summary))
}

/// Probe QuickBooks for an invoice with the given document number.
///
/// GET /api/sync/duplicate/:invoice_number
pub async fn check_duplicate(
    State(state): State<AppState>,
    Path(invoice_number): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let existing = state.sync.check_duplicate(&invoice_number).await;
    Ok(Json(serde_json::json!({
        "invoice_number": invoice_number,
        "duplicate": existing.is_some(),
        "qb_invoice_id": existing.and_then(|i| i.id),
    })))
}

/// Paginated invoice listing with validation state.
///
/// GET /api/invoices
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<InvoiceListQuery>,
) -> Result<Json<InvoiceListPage>, AppError> {
    let page = state
        .sync
        .list_invoices_with_validation(
            query.search.as_deref(),
            query.status.as_deref(),
            query.page,
            query.page_size,
        )
        .await?;
    Ok(Json(page))
}

/// Full detail view for one invoice.
///
/// GET /api/invoices/:invoice_id
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
) -> Result<Json<InvoiceDetails>, AppError> {
    let details = state.sync.get_invoice_details(&invoice_id).await?;
    Ok(Json(details))
}
