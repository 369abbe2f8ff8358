//! Persistence seam for mappings, validations and match audit logs.
//!
//! The engines only see this trait; the Postgres implementation lives in
//! `database.rs` and the integration tests supply an in-memory one.

use crate::models::{
    CustomerMapping, InvoiceValidation, MappingStatus, MatchLogEntry, NewCustomerMapping,
    NewSkuMapping, NewValidation, SkuMapping,
};
use async_trait::async_trait;
use service_core::error::AppError;

/// List filter for mapping tables.
#[derive(Debug, Clone, Default)]
pub struct MappingFilter {
    /// Exact status, e.g. "approved".
    pub status: Option<String>,
    /// Case-insensitive substring over names/codes.
    pub search: Option<String>,
}

/// List filter for the validation table.
#[derive(Debug, Clone, Default)]
pub struct ValidationFilter {
    pub status: Option<String>,
    pub search: Option<String>,
    pub ready_only: bool,
}

/// Result of attempting to persist a validation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationUpsert {
    Written,
    /// Row is already synced; validation never reopens it.
    SkippedSynced,
}

#[async_trait]
pub trait SyncStore: Send + Sync {
    // ====== Customer mappings ======

    async fn get_customer_mapping(
        &self,
        organization_id: &str,
        manager_id: &str,
    ) -> Result<Option<CustomerMapping>, AppError>;

    /// Resolve the mapping an invoice should use: exact
    /// `(organization, manager)` first, then the organization-wide row
    /// (empty manager id), then any row for the organization.
    async fn resolve_customer_mapping(
        &self,
        organization_id: &str,
        manager_id: &str,
    ) -> Result<Option<CustomerMapping>, AppError>;

    async fn list_customer_mappings(
        &self,
        filter: &MappingFilter,
    ) -> Result<Vec<CustomerMapping>, AppError>;

    /// Insert or update one mapping row. When `preserve_decided` is set,
    /// rows a reviewer has approved or rejected are left untouched; the
    /// return value is false in that case.
    async fn upsert_customer_mapping(
        &self,
        mapping: &NewCustomerMapping,
        preserve_decided: bool,
    ) -> Result<bool, AppError>;

    async fn set_customer_mapping_status(
        &self,
        id: i64,
        status: MappingStatus,
        reviewed_by: &str,
        notes: Option<&str>,
    ) -> Result<CustomerMapping, AppError>;

    /// Point an existing mapping at a different QuickBooks customer. The
    /// row becomes a manual, full-confidence mapping.
    async fn repoint_customer_mapping(
        &self,
        id: i64,
        qb_customer_id: &str,
        qb_customer_name: &str,
    ) -> Result<CustomerMapping, AppError>;

    /// Delete every mapping row a reviewer has not decided. Returns the
    /// number of rows removed.
    async fn delete_undecided_customer_mappings(&self) -> Result<u64, AppError>;

    // ====== SKU mappings ======

    async fn get_sku_mapping(&self, sku_code: &str) -> Result<Option<SkuMapping>, AppError>;

    async fn list_sku_mappings(&self, filter: &MappingFilter)
        -> Result<Vec<SkuMapping>, AppError>;

    /// Insert or update one SKU mapping row, keyed by SKU code. Approved
    /// and rejected rows are preserved when `preserve_decided` is set.
    async fn upsert_sku_mapping(
        &self,
        mapping: &NewSkuMapping,
        preserve_decided: bool,
    ) -> Result<bool, AppError>;

    // ====== Invoice validations ======

    async fn get_validation(&self, invoice_id: &str)
        -> Result<Option<InvoiceValidation>, AppError>;

    async fn list_validations(
        &self,
        filter: &ValidationFilter,
    ) -> Result<Vec<InvoiceValidation>, AppError>;

    /// Write a validation outcome. Synced rows are immutable; the write is
    /// skipped and reported as such.
    async fn upsert_validation(
        &self,
        validation: &NewValidation,
    ) -> Result<ValidationUpsert, AppError>;

    async fn approve_validation_for_sync(
        &self,
        invoice_id: &str,
        approved_by: &str,
    ) -> Result<InvoiceValidation, AppError>;

    /// Record a completed sync: status becomes `synced` and the QuickBooks
    /// invoice id and time are stamped. Creates the row when the invoice
    /// was synced without a prior validation pass.
    async fn mark_validation_synced(
        &self,
        invoice_id: &str,
        invoice_number: Option<&str>,
        qb_invoice_id: &str,
    ) -> Result<(), AppError>;

    async fn delete_validation(&self, invoice_id: &str) -> Result<bool, AppError>;

    async fn delete_all_validations(&self) -> Result<u64, AppError>;

    // ====== Match audit log ======

    async fn insert_match_log(&self, entry: &MatchLogEntry) -> Result<(), AppError>;

    /// Remove audit rows for one entity type ("customer", "sku" or
    /// "validation").
    async fn delete_match_logs(&self, entity_type: &str) -> Result<u64, AppError>;

    /// Remove audit rows for entities of one mapping type that no longer
    /// have a mapping row. Logs belonging to surviving rows, decided ones
    /// included, are kept.
    async fn delete_match_logs_for_unmapped(&self, entity_type: &str) -> Result<u64, AppError>;
}
