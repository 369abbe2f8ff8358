//! Invoice validation: is this invoice ready to push to QuickBooks?
//!
//! Validation is a pure function of the invoice and the current mapping
//! tables; it always completes with a verdict, never an exception. Issues
//! are data. The persisted row is the state machine over
//! {pending, ready, blocked, synced}; `synced` is terminal for validation.

use crate::clients::LedgerConnector;
use crate::models::{
    BlockingIssue, CustomerMapping, InvoiceValidation, IssueCode, LedgerInvoice,
    LedgerInvoiceStatus, MappingStatus, MatchLogEntry, NewValidation, SkuMapping,
    ValidationOutcome, ValidationStatus,
};
use crate::services::metrics::VALIDATION_OPERATIONS;
use crate::services::store::{SyncStore, ValidationFilter, ValidationUpsert};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

const ALGORITHM_VERSION: &str = "1.0";

/// One item of a batch validation result.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationBatchItem {
    pub invoice_id: String,
    pub success: bool,
    pub status: Option<String>,
    pub error: Option<String>,
}

/// Outcome of a batch validation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationBatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<ValidationBatchItem>,
}

/// Aggregate counts over the validation table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationStats {
    pub total: usize,
    pub ready: usize,
    pub blocked: usize,
    pub synced: usize,
    pub approved_for_sync: usize,
}

/// Evaluate one invoice against the current mappings.
///
/// `sku_mappings` is keyed by the invoice's SKU keys (code, falling back
/// to id). Issue order is customer, SKU, status, data quality.
pub fn evaluate(
    invoice: &LedgerInvoice,
    customer_mapping: Option<&CustomerMapping>,
    sku_mappings: &HashMap<String, SkuMapping>,
) -> ValidationOutcome {
    let mut issues: Vec<BlockingIssue> = Vec::new();

    // Customer check.
    let customer_ok = match invoice.organization_id.as_deref().filter(|o| !o.is_empty()) {
        None => {
            issues.push(BlockingIssue::error(
                IssueCode::CustomerNoOrg,
                "Invoice has no customer organization",
            ));
            false
        }
        Some(org_id) => match customer_mapping {
            None => {
                issues.push(BlockingIssue::error(
                    IssueCode::CustomerNoMapping,
                    format!("No customer mapping for organization {}", org_id),
                ));
                false
            }
            Some(mapping) if mapping.mapping_status() != MappingStatus::Approved => {
                issues.push(BlockingIssue::error(
                    IssueCode::CustomerNotApproved,
                    format!(
                        "Customer mapping for organization {} is {}",
                        org_id, mapping.status
                    ),
                ));
                false
            }
            Some(mapping) if mapping.qb_customer_id.is_none() => {
                issues.push(BlockingIssue::error(
                    IssueCode::CustomerNoQbLink,
                    format!(
                        "Approved mapping for organization {} has no QuickBooks customer",
                        org_id
                    ),
                ));
                false
            }
            Some(_) => true,
        },
    };

    // SKU check over the distinct SKUs on the invoice.
    let sku_keys = invoice.distinct_sku_keys();
    let total_skus = sku_keys.len();
    let mut missing: Vec<String> = Vec::new();
    let mut needs_creation: Vec<String> = Vec::new();
    let mut not_approved: Vec<String> = Vec::new();

    for key in &sku_keys {
        match sku_mappings.get(key) {
            None => missing.push(key.clone()),
            Some(mapping) => match mapping.mapping_status() {
                crate::models::SkuMappingStatus::NeedsCreation => {
                    needs_creation.push(key.clone())
                }
                crate::models::SkuMappingStatus::Approved if mapping.qb_item_id.is_some() => {}
                _ => not_approved.push(key.clone()),
            },
        }
    }

    if !missing.is_empty() {
        issues.push(
            BlockingIssue::error(
                IssueCode::SkuNoMapping,
                format!(
                    "{} SKU(s) have no mapping: {}",
                    missing.len(),
                    missing.join(", ")
                ),
            )
            .with_skus(missing.clone()),
        );
    }
    if !needs_creation.is_empty() {
        issues.push(
            BlockingIssue::warning(
                IssueCode::SkuNeedsCreation,
                format!(
                    "{} SKU(s) need a QuickBooks item created: {}",
                    needs_creation.len(),
                    needs_creation.join(", ")
                ),
            )
            .with_skus(needs_creation),
        );
    }
    if !not_approved.is_empty() {
        issues.push(
            BlockingIssue::error(
                IssueCode::SkuNotApproved,
                format!(
                    "{} SKU mapping(s) not approved: {}",
                    not_approved.len(),
                    not_approved.join(", ")
                ),
            )
            .with_skus(not_approved.clone()),
        );
    }

    // Invoice status check.
    match invoice.status {
        LedgerInvoiceStatus::Draft => issues.push(BlockingIssue::error(
            IssueCode::InvoiceDraft,
            "Invoice is still a draft",
        )),
        LedgerInvoiceStatus::Cancelled | LedgerInvoiceStatus::Void => {
            issues.push(BlockingIssue::error(
                IssueCode::InvoiceCancelled,
                "Invoice is cancelled or void",
            ))
        }
        s if !s.sync_eligible() => issues.push(BlockingIssue::error(
            IssueCode::InvoiceInvalidStatus,
            format!("Invoice status '{}' is not syncable", s.as_str()),
        )),
        _ => {}
    }

    // Data quality.
    if invoice.line_items.is_empty() {
        issues.push(BlockingIssue::error(
            IssueCode::MissingLineItems,
            "Invoice has no line items",
        ));
    }
    if invoice
        .invoice_number
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .is_none()
    {
        issues.push(BlockingIssue::warning(
            IssueCode::MissingInvoiceNumber,
            "Invoice has no invoice number",
        ));
    }
    if invoice.total <= Decimal::ZERO {
        issues.push(BlockingIssue::warning(
            IssueCode::ZeroTotal,
            "Invoice total is zero or negative",
        ));
    }

    // Needs-creation SKUs are surfaced but count as mapped for scoring.
    let skus_mapped = missing.is_empty() && not_approved.is_empty();
    let sku_ratio = if total_skus == 0 {
        1.0
    } else {
        (total_skus - missing.len() - not_approved.len()) as f64 / total_skus as f64
    };
    let confidence = 0.4 * if customer_ok { 1.0 } else { 0.0 } + 0.6 * sku_ratio;

    let blocked = issues.iter().any(BlockingIssue::is_blocking);
    let status = if blocked {
        ValidationStatus::Blocked
    } else {
        ValidationStatus::Ready
    };

    ValidationOutcome {
        status,
        customer_mapping_ok: customer_ok,
        skus_mapped,
        issues,
        confidence,
        ready_for_sync: status == ValidationStatus::Ready,
    }
}

/// Validates invoices against the mapping tables and persists verdicts.
pub struct InvoiceValidator {
    store: Arc<dyn SyncStore>,
    ledger: Arc<dyn LedgerConnector>,
}

impl InvoiceValidator {
    pub fn new(store: Arc<dyn SyncStore>, ledger: Arc<dyn LedgerConnector>) -> Self {
        Self { store, ledger }
    }

    /// Resolve the customer mapping an invoice should use.
    async fn resolve_customer(
        &self,
        invoice: &LedgerInvoice,
    ) -> Result<Option<CustomerMapping>, AppError> {
        let Some(org_id) = invoice.organization_id.as_deref().filter(|o| !o.is_empty())
        else {
            return Ok(None);
        };
        let manager_id = invoice.manager_id.as_deref().unwrap_or("");
        self.store.resolve_customer_mapping(org_id, manager_id).await
    }

    /// Look up SKU mappings for every line, by code with id fallback,
    /// keyed by the invoice's SKU keys.
    async fn resolve_skus(
        &self,
        invoice: &LedgerInvoice,
    ) -> Result<HashMap<String, SkuMapping>, AppError> {
        let mut mappings: HashMap<String, SkuMapping> = HashMap::new();
        for line in &invoice.line_items {
            let Some(key) = line.sku_key() else { continue };
            if mappings.contains_key(key) {
                continue;
            }

            let mut found = None;
            if let Some(code) = line.sku_code.as_deref().filter(|c| !c.is_empty()) {
                found = self.store.get_sku_mapping(code).await?;
            }
            if found.is_none() {
                if let Some(id) = line.sku_id.as_deref().filter(|i| !i.is_empty()) {
                    found = self.store.get_sku_mapping(id).await?;
                }
            }
            if let Some(mapping) = found {
                mappings.insert(key.to_string(), mapping);
            }
        }
        Ok(mappings)
    }

    /// Validate one invoice and persist the verdict. A row already marked
    /// synced is returned untouched.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn validate_invoice(
        &self,
        invoice_id: &str,
    ) -> Result<InvoiceValidation, AppError> {
        let started = Instant::now();

        let invoice = self.ledger.get_invoice(invoice_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Invoice {} not found in ledger", invoice_id))
        })?;

        let customer_mapping = self.resolve_customer(&invoice).await?;
        let sku_mappings = self.resolve_skus(&invoice).await?;
        let outcome = evaluate(&invoice, customer_mapping.as_ref(), &sku_mappings);

        VALIDATION_OPERATIONS
            .with_label_values(&[outcome.status.as_str()])
            .inc();

        let upsert = self
            .store
            .upsert_validation(&NewValidation {
                invoice_id: invoice.id.clone(),
                invoice_number: invoice.invoice_number.clone(),
                outcome: outcome.clone(),
            })
            .await?;

        let log = MatchLogEntry {
            entity_type: "validation".to_string(),
            entity_id: invoice.id.clone(),
            algorithm_version: ALGORITHM_VERSION.to_string(),
            candidate_count: 0,
            best_match_id: None,
            best_match_score: Some(outcome.confidence),
            candidates: Vec::new(),
            criteria: format!(
                "status={}, issues={}, skipped={}",
                outcome.status.as_str(),
                outcome.issues.len(),
                upsert == ValidationUpsert::SkippedSynced
            ),
            execution_ms: started.elapsed().as_millis() as i64,
        };
        if let Err(e) = self.store.insert_match_log(&log).await {
            warn!(invoice_id = %invoice.id, error = %e, "Failed to write validation log");
        }

        self.store
            .get_validation(&invoice.id)
            .await?
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!("Validation row vanished after upsert"))
            })
    }

    /// Validate a list of invoices, isolating per-item failures.
    #[instrument(skip(self, invoice_ids), fields(count = invoice_ids.len()))]
    pub async fn validate_batch(
        &self,
        invoice_ids: &[String],
    ) -> Result<ValidationBatchSummary, AppError> {
        let mut summary = ValidationBatchSummary {
            total: invoice_ids.len(),
            ..Default::default()
        };

        for invoice_id in invoice_ids {
            match self.validate_invoice(invoice_id).await {
                Ok(validation) => {
                    summary.succeeded += 1;
                    summary.items.push(ValidationBatchItem {
                        invoice_id: invoice_id.clone(),
                        success: true,
                        status: Some(validation.status),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(invoice_id = %invoice_id, error = %e, "Validation failed");
                    summary.failed += 1;
                    summary.items.push(ValidationBatchItem {
                        invoice_id: invoice_id.clone(),
                        success: false,
                        status: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(summary)
    }

    /// Validate every ledger invoice not yet present in the validation
    /// table, within optional date bounds and a row limit.
    #[instrument(skip(self))]
    pub async fn validate_all_pending(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<ValidationBatchSummary, AppError> {
        let invoices = self.ledger.list_invoices(&[], from, to, limit).await?;

        let mut pending_ids = Vec::new();
        for invoice in &invoices {
            if self.store.get_validation(&invoice.id).await?.is_none() {
                pending_ids.push(invoice.id.clone());
            }
        }

        info!(
            fetched = invoices.len(),
            pending = pending_ids.len(),
            "Validating pending invoices"
        );
        self.validate_batch(&pending_ids).await
    }

    pub async fn get_validation_status(
        &self,
        invoice_id: &str,
    ) -> Result<Option<InvoiceValidation>, AppError> {
        self.store.get_validation(invoice_id).await
    }

    pub async fn get_validations(
        &self,
        filter: &ValidationFilter,
    ) -> Result<Vec<InvoiceValidation>, AppError> {
        self.store.list_validations(filter).await
    }

    pub async fn get_validation_stats(&self) -> Result<ValidationStats, AppError> {
        let validations = self
            .store
            .list_validations(&ValidationFilter::default())
            .await?;

        let mut stats = ValidationStats {
            total: validations.len(),
            ..Default::default()
        };
        for validation in &validations {
            match validation.validation_status() {
                ValidationStatus::Ready => stats.ready += 1,
                ValidationStatus::Blocked => stats.blocked += 1,
                ValidationStatus::Synced => stats.synced += 1,
                ValidationStatus::Pending => {}
            }
            if validation.approved_by.is_some()
                && validation.validation_status() == ValidationStatus::Ready
            {
                stats.approved_for_sync += 1;
            }
        }
        Ok(stats)
    }

    #[instrument(skip(self))]
    pub async fn approve_for_sync(
        &self,
        invoice_id: &str,
        approved_by: &str,
    ) -> Result<InvoiceValidation, AppError> {
        self.store
            .approve_validation_for_sync(invoice_id, approved_by)
            .await
    }

    /// Manually mark an invoice synced, recording the remote invoice id.
    #[instrument(skip(self))]
    pub async fn mark_as_synced(
        &self,
        invoice_id: &str,
        qb_invoice_id: &str,
    ) -> Result<InvoiceValidation, AppError> {
        let number = self
            .store
            .get_validation(invoice_id)
            .await?
            .and_then(|v| v.invoice_number);
        self.store
            .mark_validation_synced(invoice_id, number.as_deref(), qb_invoice_id)
            .await?;
        self.store
            .get_validation(invoice_id)
            .await?
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!("Validation row vanished after sync mark"))
            })
    }

    #[instrument(skip(self))]
    pub async fn clear_validation(&self, invoice_id: &str) -> Result<bool, AppError> {
        self.store.delete_validation(invoice_id).await
    }

    /// Clear non-synced validation rows and the validation audit log.
    #[instrument(skip(self))]
    pub async fn clear_all_validations(&self) -> Result<u64, AppError> {
        let deleted = self.store.delete_all_validations().await?;
        self.store.delete_match_logs("validation").await?;
        info!(deleted = deleted, "Cleared validation rows");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LedgerLineItem, SkuMappingStatus};
    use chrono::Utc;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(code: &str) -> LedgerLineItem {
        LedgerLineItem {
            sku_id: None,
            sku_code: Some(code.to_string()),
            sku_name: format!("{} item", code),
            description: None,
            quantity: Decimal::ONE,
            unit_price: d("100.00"),
            discount_percent: Decimal::ZERO,
            amount: None,
            taxable: true,
        }
    }

    fn invoice(codes: &[&str]) -> LedgerInvoice {
        LedgerInvoice {
            id: "inv-1".to_string(),
            invoice_number: Some("INV-0042".to_string()),
            organization_id: Some("org-1".to_string()),
            manager_id: None,
            status: LedgerInvoiceStatus::Sent,
            issue_date: None,
            due_date: None,
            billing_address: None,
            shipping_addresses: vec![],
            line_items: codes.iter().map(|c| line(c)).collect(),
            subtotal: d("100.00"),
            tax_amount: d("14.98"),
            total: d("114.98"),
            currency: "CAD".to_string(),
            notes: None,
            po_number: None,
        }
    }

    fn approved_customer_mapping() -> CustomerMapping {
        CustomerMapping {
            id: 1,
            organization_id: "org-1".to_string(),
            manager_id: String::new(),
            organization_name: "Acme".to_string(),
            manager_name: None,
            manager_email: None,
            qb_customer_id: Some("12".to_string()),
            qb_customer_name: Some("0042 Acme".to_string()),
            qb_customer_email: None,
            status: "approved".to_string(),
            confidence: 1.0,
            match_method: "org_code".to_string(),
            factors: Default::default(),
            reviewed_by: None,
            reviewed_utc: None,
            review_notes: None,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    fn approved_sku_mapping(code: &str) -> SkuMapping {
        SkuMapping {
            id: 1,
            sku_code: code.to_string(),
            sku_name: format!("{} item", code),
            qb_item_id: Some("5".to_string()),
            qb_item_name: Some(format!("{} item", code)),
            qb_item_type: Some("Service".to_string()),
            status: SkuMappingStatus::Approved.as_str().to_string(),
            confidence: 1.0,
            match_method: "exact_code".to_string(),
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn fully_mapped_invoice_is_ready() {
        let inv = invoice(&["HW-100"]);
        let customer = approved_customer_mapping();
        let skus = HashMap::from([("HW-100".to_string(), approved_sku_mapping("HW-100"))]);

        let outcome = evaluate(&inv, Some(&customer), &skus);
        assert_eq!(outcome.status, ValidationStatus::Ready);
        assert!(outcome.ready_for_sync);
        assert!(outcome.issues.is_empty());
        assert!((outcome.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn one_unmapped_sku_blocks_with_seventy_percent_confidence() {
        let inv = invoice(&["HW-100", "HW-200"]);
        let customer = approved_customer_mapping();
        let skus = HashMap::from([("HW-100".to_string(), approved_sku_mapping("HW-100"))]);

        let outcome = evaluate(&inv, Some(&customer), &skus);
        assert_eq!(outcome.status, ValidationStatus::Blocked);
        assert!(!outcome.skus_mapped);

        let sku_issues: Vec<_> = outcome
            .issues
            .iter()
            .filter(|i| i.code == IssueCode::SkuNoMapping)
            .collect();
        assert_eq!(sku_issues.len(), 1);
        assert_eq!(sku_issues[0].skus, vec!["HW-200".to_string()]);
        assert!((outcome.confidence - 0.70).abs() < 1e-9);
    }

    #[test]
    fn no_customer_mapping_blocks_with_low_confidence() {
        let inv = invoice(&["HW-100"]);
        let skus = HashMap::from([("HW-100".to_string(), approved_sku_mapping("HW-100"))]);

        let outcome = evaluate(&inv, None, &skus);
        assert_eq!(outcome.status, ValidationStatus::Blocked);
        assert!(outcome
            .issues
            .iter()
            .any(|i| i.code == IssueCode::CustomerNoMapping));
        assert!(outcome.confidence <= 0.6);
    }

    #[test]
    fn needs_creation_is_a_warning_not_a_blocker() {
        let inv = invoice(&["HW-100"]);
        let customer = approved_customer_mapping();
        let mut mapping = approved_sku_mapping("HW-100");
        mapping.status = SkuMappingStatus::NeedsCreation.as_str().to_string();
        mapping.qb_item_id = None;
        let skus = HashMap::from([("HW-100".to_string(), mapping)]);

        let outcome = evaluate(&inv, Some(&customer), &skus);
        assert_eq!(outcome.status, ValidationStatus::Ready);
        assert!(outcome
            .issues
            .iter()
            .any(|i| i.code == IssueCode::SkuNeedsCreation && !i.is_blocking()));
        assert!((outcome.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn draft_invoice_is_blocked() {
        let mut inv = invoice(&["HW-100"]);
        inv.status = LedgerInvoiceStatus::Draft;
        let customer = approved_customer_mapping();
        let skus = HashMap::from([("HW-100".to_string(), approved_sku_mapping("HW-100"))]);

        let outcome = evaluate(&inv, Some(&customer), &skus);
        assert_eq!(outcome.status, ValidationStatus::Blocked);
        assert!(outcome
            .issues
            .iter()
            .any(|i| i.code == IssueCode::InvoiceDraft));
    }

    #[test]
    fn missing_number_and_zero_total_are_warnings_only() {
        let mut inv = invoice(&["HW-100"]);
        inv.invoice_number = None;
        inv.total = Decimal::ZERO;
        let customer = approved_customer_mapping();
        let skus = HashMap::from([("HW-100".to_string(), approved_sku_mapping("HW-100"))]);

        let outcome = evaluate(&inv, Some(&customer), &skus);
        assert_eq!(outcome.status, ValidationStatus::Ready);
        assert_eq!(outcome.issues.len(), 2);
        assert!(outcome.issues.iter().all(|i| !i.is_blocking()));
    }

    #[test]
    fn evaluation_is_idempotent() {
        let inv = invoice(&["HW-100", "HW-200"]);
        let customer = approved_customer_mapping();
        let skus = HashMap::from([("HW-100".to_string(), approved_sku_mapping("HW-100"))]);

        let first = evaluate(&inv, Some(&customer), &skus);
        let second = evaluate(&inv, Some(&customer), &skus);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_invoice_scores_customer_only() {
        let mut inv = invoice(&[]);
        inv.total = Decimal::ZERO;
        let outcome = evaluate(&inv, None, &HashMap::new());

        assert_eq!(outcome.status, ValidationStatus::Blocked);
        // No SKUs means the SKU ratio contributes fully.
        assert!((outcome.confidence - 0.6).abs() < 1e-9);
    }
}
