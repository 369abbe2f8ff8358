//! One-way invoice sync into QuickBooks.
//!
//! Within one invoice the steps are strictly ordered: resolve customer,
//! detect duplicate, build payload, write, mark synced. Batches are a
//! sequential loop; one invoice's failure never aborts its siblings. The
//! "never overwrite a synced validation row" rule is the idempotency
//! guard, and duplicate detection turns re-syncs into updates.

use crate::clients::{LedgerConnector, QuickBooks};
use crate::models::{
    CustomerMapping, InvoiceValidation, LedgerInvoice, MappingStatus, QbInvoice, QbInvoiceLine,
    SkuMapping, ValidationStatus,
};
use crate::services::address::parse_address;
use crate::services::metrics::SYNC_OPERATIONS;
use crate::services::store::{SyncStore, ValidationFilter};
use crate::services::tax::{TaxConfig, build_tax_detail, compute_tax};
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Per-call sync options.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Explicit target customer, bypassing mapping resolution.
    pub qb_customer_id: Option<String>,
}

/// Why an invoice was skipped rather than written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkippedReason {
    AlreadySynced,
    DuplicateInQb,
    NoCustomerMapping,
    MissingSkuMappings,
}

impl SkippedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadySynced => "already_synced",
            Self::DuplicateInQb => "duplicate_in_qb",
            Self::NoCustomerMapping => "no_customer_mapping",
            Self::MissingSkuMappings => "missing_sku_mappings",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Created,
    Updated,
}

/// Result of one invoice sync attempt.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub invoice_id: String,
    pub invoice_number: Option<String>,
    pub success: bool,
    pub qb_invoice_id: Option<String>,
    pub action: Option<SyncAction>,
    pub error: Option<String>,
    pub skipped_reason: Option<SkippedReason>,
}

impl SyncResult {
    fn skipped(invoice_id: &str, number: Option<String>, reason: SkippedReason) -> Self {
        Self {
            invoice_id: invoice_id.to_string(),
            invoice_number: number,
            success: false,
            qb_invoice_id: None,
            action: None,
            error: None,
            skipped_reason: Some(reason),
        }
    }

    fn failure(invoice_id: &str, number: Option<String>, error: String) -> Self {
        Self {
            invoice_id: invoice_id.to_string(),
            invoice_number: number,
            success: false,
            qb_invoice_id: None,
            action: None,
            error: Some(error),
            skipped_reason: None,
        }
    }
}

/// Tally of a batch sync.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncBatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<SyncResult>,
}

/// One row of the review listing, pairing a ledger invoice with its
/// validation state and remote counterpart.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceListItem {
    pub invoice_id: String,
    pub invoice_number: Option<String>,
    pub status: String,
    pub total: Decimal,
    pub validation_status: Option<String>,
    pub ready_for_sync: bool,
    pub qb_invoice_id: Option<String>,
    /// Agreement with the remote invoice, 0-100, when one exists.
    pub match_score: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceListPage {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub items: Vec<InvoiceListItem>,
}

/// Full detail view for one invoice.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetails {
    pub invoice: LedgerInvoice,
    pub validation: Option<InvoiceValidation>,
    pub customer_mapping: Option<CustomerMapping>,
}

/// Build the QuickBooks payload for a ledger invoice. Every line must have
/// an approved mapping; offending SKU keys are returned otherwise.
pub fn build_qb_invoice(
    invoice: &LedgerInvoice,
    qb_customer_id: &str,
    sku_mappings: &HashMap<String, SkuMapping>,
    tax: &TaxConfig,
) -> Result<QbInvoice, Vec<String>> {
    let mut lines: Vec<QbInvoiceLine> = Vec::with_capacity(invoice.line_items.len());
    let mut missing: Vec<String> = Vec::new();
    let mut subtotal = Decimal::ZERO;

    for line in &invoice.line_items {
        let key = match line.sku_key() {
            Some(key) => key,
            None => {
                missing.push(line.sku_name.clone());
                continue;
            }
        };
        let Some(mapping) = sku_mappings.get(key).filter(|m| m.sync_ready()) else {
            if !missing.iter().any(|m| m == key) {
                missing.push(key.to_string());
            }
            continue;
        };

        let amount = line.effective_amount();
        // Zero-amount lines (free/demo items) must carry a zero unit price
        // so that amount == unitPrice * quantity holds remotely.
        let unit_price = if amount.is_zero() {
            Decimal::ZERO
        } else {
            line.unit_price
        };
        subtotal += amount;

        lines.push(QbInvoiceLine {
            item_ref: mapping.qb_item_id.clone().unwrap_or_default(),
            item_name: mapping.qb_item_name.clone(),
            description: line
                .description
                .clone()
                .or_else(|| Some(line.sku_name.clone())),
            quantity: line.quantity,
            unit_price,
            amount,
            tax_code_ref: tax.taxable_code_ref.clone(),
        });
    }

    if !missing.is_empty() {
        return Err(missing);
    }

    let bill_addr = invoice
        .billing_address
        .as_deref()
        .map(parse_address)
        .filter(|a| !a.is_empty());
    let ship_addr = invoice
        .shipping_addresses
        .first()
        .map(|s| parse_address(s))
        .filter(|a| !a.is_empty());

    Ok(QbInvoice {
        id: None,
        sync_token: None,
        doc_number: invoice.invoice_number.clone(),
        customer_ref: qb_customer_id.to_string(),
        txn_date: invoice.issue_date,
        due_date: invoice.due_date,
        lines,
        bill_addr,
        ship_addr,
        txn_tax_detail: Some(build_tax_detail(tax, subtotal)),
        customer_memo: invoice.notes.clone(),
        po_number: invoice.po_number.clone(),
        total_amt: None,
    })
}

fn within_one_percent(a: Decimal, b: Decimal) -> bool {
    if a == b {
        return true;
    }
    if a.is_zero() {
        return b.is_zero();
    }
    ((a - b) / a).abs() <= Decimal::new(1, 2)
}

/// Weighted agreement score between a ledger invoice and its remote
/// counterpart, 0-100.
pub fn match_score(ledger: &LedgerInvoice, remote: &QbInvoice) -> i32 {
    let mut matched = 0u32;
    let total_weight = 9u32;

    if ledger.invoice_number.is_some() && ledger.invoice_number == remote.doc_number {
        matched += 2;
    }
    if ledger.issue_date.is_some() && ledger.issue_date == remote.txn_date {
        matched += 1;
    }
    if ledger.due_date.is_some() && ledger.due_date == remote.due_date {
        matched += 1;
    }
    if let Some(remote_subtotal) = remote.subtotal() {
        if within_one_percent(ledger.subtotal, remote_subtotal) {
            matched += 2;
        }
    }
    if let Some(remote_total) = remote.total_amt {
        if within_one_percent(ledger.total, remote_total) {
            matched += 2;
        }
    }
    if ledger.line_items.len() == remote.lines.len() {
        matched += 1;
    }

    ((matched as f64 / total_weight as f64) * 100.0).round() as i32
}

/// Pushes ledger invoices into QuickBooks.
pub struct SyncEngine {
    store: Arc<dyn SyncStore>,
    ledger: Arc<dyn LedgerConnector>,
    books: Arc<dyn QuickBooks>,
    tax: TaxConfig,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn SyncStore>,
        ledger: Arc<dyn LedgerConnector>,
        books: Arc<dyn QuickBooks>,
        tax: TaxConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            books,
            tax,
        }
    }

    async fn resolve_sku_mappings(
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

    /// Exact document-number lookup, with a broader search fallback.
    /// Lookup failure is treated as "no duplicate": creating twice is
    /// recoverable, silently skipping a needed sync is not.
    async fn find_existing(&self, invoice_number: Option<&str>) -> Option<QbInvoice> {
        let number = invoice_number?;

        match self.books.find_invoice_by_doc_number(number).await {
            Ok(Some(existing)) => return Some(existing),
            Ok(None) => {}
            Err(e) => {
                warn!(invoice_number = %number, error = %e, "Duplicate lookup failed, assuming none");
                return None;
            }
        }

        match self.books.search_invoices(number).await {
            Ok(results) => results
                .into_iter()
                .find(|i| i.doc_number.as_deref() == Some(number)),
            Err(e) => {
                warn!(invoice_number = %number, error = %e, "Duplicate search failed, assuming none");
                None
            }
        }
    }

    /// Sync one invoice. Mapping problems come back as skip/failure
    /// results; only a missing ledger invoice is a hard error.
    #[instrument(skip(self, options), fields(invoice_id = %invoice_id))]
    pub async fn sync_invoice(
        &self,
        invoice_id: &str,
        options: &SyncOptions,
    ) -> Result<SyncResult, AppError> {
        if let Some(validation) = self.store.get_validation(invoice_id).await? {
            if validation.validation_status() == ValidationStatus::Synced {
                SYNC_OPERATIONS.with_label_values(&["skipped"]).inc();
                let mut result = SyncResult::skipped(
                    invoice_id,
                    validation.invoice_number.clone(),
                    SkippedReason::AlreadySynced,
                );
                result.qb_invoice_id = validation.qb_invoice_id.clone();
                return Ok(result);
            }
        }

        let invoice = self.ledger.get_invoice(invoice_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Invoice {} not found in ledger", invoice_id))
        })?;
        let number = invoice.invoice_number.clone();

        // Resolve the target customer.
        let qb_customer_id = match &options.qb_customer_id {
            Some(id) => {
                info!(qb_customer_id = %id, "Using manual override customer");
                id.clone()
            }
            None => {
                let mapping = match invoice
                    .organization_id
                    .as_deref()
                    .filter(|o| !o.is_empty())
                {
                    Some(org_id) => {
                        let manager_id = invoice.manager_id.as_deref().unwrap_or("");
                        self.store
                            .resolve_customer_mapping(org_id, manager_id)
                            .await?
                    }
                    None => None,
                };
                match mapping.filter(|m| {
                    m.mapping_status() == MappingStatus::Approved && m.qb_customer_id.is_some()
                }) {
                    Some(m) => m.qb_customer_id.clone().unwrap_or_default(),
                    None => {
                        SYNC_OPERATIONS.with_label_values(&["skipped"]).inc();
                        return Ok(SyncResult::skipped(
                            invoice_id,
                            number,
                            SkippedReason::NoCustomerMapping,
                        ));
                    }
                }
            }
        };

        // Build the payload before touching the remote system.
        let sku_mappings = self.resolve_sku_mappings(&invoice).await?;
        let mut payload =
            match build_qb_invoice(&invoice, &qb_customer_id, &sku_mappings, &self.tax) {
                Ok(payload) => payload,
                Err(missing) => {
                    SYNC_OPERATIONS.with_label_values(&["skipped"]).inc();
                    let mut result = SyncResult::skipped(
                        invoice_id,
                        number,
                        SkippedReason::MissingSkuMappings,
                    );
                    result.error = Some(format!(
                        "Missing or unapproved SKU mappings: {}",
                        missing.join(", ")
                    ));
                    return Ok(result);
                }
            };

        // The itemized tax detail is always recomputed; flag disagreement
        // with the ledger's own figure for review.
        if let Some(detail) = &payload.txn_tax_detail {
            let computed = compute_tax(&self.tax, detail.tax_lines[0].net_amount_taxable);
            if (computed.total - invoice.tax_amount).abs() > Decimal::new(1, 2) {
                warn!(
                    invoice_id = %invoice.id,
                    ledger_tax = %invoice.tax_amount,
                    computed_tax = %computed.total,
                    "Ledger tax differs from computed jurisdiction tax"
                );
            }
        }

        // Update in place when the document number already exists remotely.
        let existing = self.find_existing(number.as_deref()).await;
        let write = match existing {
            Some(remote) => {
                payload.id = remote.id.clone();
                payload.sync_token = remote.sync_token.clone();
                self.books
                    .update_invoice(&payload)
                    .await
                    .map(|written| (written, SyncAction::Updated))
            }
            None => self
                .books
                .create_invoice(&payload)
                .await
                .map(|written| (written, SyncAction::Created)),
        };

        let (written, action) = match write {
            Ok(ok) => ok,
            Err(e) => {
                SYNC_OPERATIONS.with_label_values(&["failed"]).inc();
                warn!(invoice_id = %invoice.id, error = %e, "Remote invoice write failed");
                return Ok(SyncResult::failure(invoice_id, number, e.to_string()));
            }
        };

        let qb_invoice_id = written.id.clone().unwrap_or_default();
        self.store
            .mark_validation_synced(&invoice.id, number.as_deref(), &qb_invoice_id)
            .await?;

        SYNC_OPERATIONS
            .with_label_values(&[match action {
                SyncAction::Created => "created",
                SyncAction::Updated => "updated",
            }])
            .inc();
        info!(
            invoice_id = %invoice.id,
            qb_invoice_id = %qb_invoice_id,
            action = ?action,
            "Invoice synced"
        );

        Ok(SyncResult {
            invoice_id: invoice.id,
            invoice_number: number,
            success: true,
            qb_invoice_id: Some(qb_invoice_id),
            action: Some(action),
            error: None,
            skipped_reason: None,
        })
    }

    /// Sync a list of invoices sequentially, isolating per-item failures.
    #[instrument(skip(self, invoice_ids), fields(count = invoice_ids.len()))]
    pub async fn sync_batch(&self, invoice_ids: &[String]) -> Result<SyncBatchSummary, AppError> {
        let mut summary = SyncBatchSummary {
            total: invoice_ids.len(),
            ..Default::default()
        };

        for invoice_id in invoice_ids {
            let result = match self.sync_invoice(invoice_id, &SyncOptions::default()).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(invoice_id = %invoice_id, error = %e, "Sync failed");
                    SyncResult::failure(invoice_id, None, e.to_string())
                }
            };

            if result.success {
                summary.successful += 1;
            } else if result.skipped_reason.is_some() {
                summary.skipped += 1;
            } else {
                summary.failed += 1;
            }
            summary.results.push(result);
        }

        info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            skipped = summary.skipped,
            "Batch sync finished"
        );
        Ok(summary)
    }

    /// Sync every invoice whose validation row is ready.
    #[instrument(skip(self))]
    pub async fn sync_all_ready(&self) -> Result<SyncBatchSummary, AppError> {
        let ready = self
            .store
            .list_validations(&ValidationFilter {
                status: Some(ValidationStatus::Ready.as_str().to_string()),
                search: None,
                ready_only: true,
            })
            .await?;

        let ids: Vec<String> = ready.into_iter().map(|v| v.invoice_id).collect();
        self.sync_batch(&ids).await
    }

    /// Pure duplicate probe by document number.
    #[instrument(skip(self))]
    pub async fn check_duplicate(&self, invoice_number: &str) -> Option<QbInvoice> {
        self.find_existing(Some(invoice_number)).await
    }

    pub async fn get_invoice_details(
        &self,
        invoice_id: &str,
    ) -> Result<InvoiceDetails, AppError> {
        let invoice = self.ledger.get_invoice(invoice_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Invoice {} not found in ledger", invoice_id))
        })?;
        let validation = self.store.get_validation(invoice_id).await?;
        let customer_mapping = match invoice
            .organization_id
            .as_deref()
            .filter(|o| !o.is_empty())
        {
            Some(org_id) => {
                let manager_id = invoice.manager_id.as_deref().unwrap_or("");
                self.store
                    .resolve_customer_mapping(org_id, manager_id)
                    .await?
            }
            None => None,
        };

        Ok(InvoiceDetails {
            invoice,
            validation,
            customer_mapping,
        })
    }

    /// Paginated invoice listing with validation state and an advisory
    /// match score against the remote system for the page items.
    #[instrument(skip(self))]
    pub async fn list_invoices_with_validation(
        &self,
        search: Option<&str>,
        status: Option<&str>,
        page: usize,
        page_size: usize,
    ) -> Result<InvoiceListPage, AppError> {
        let invoices = self.ledger.list_invoices(&[], None, None, None).await?;

        let search_lower = search.map(str::to_lowercase);
        let filtered: Vec<&LedgerInvoice> = invoices
            .iter()
            .filter(|inv| {
                if let Some(status) = status {
                    if inv.status.as_str() != status {
                        return false;
                    }
                }
                if let Some(needle) = &search_lower {
                    let number = inv
                        .invoice_number
                        .as_deref()
                        .unwrap_or_default()
                        .to_lowercase();
                    return number.contains(needle)
                        || inv.id.to_lowercase().contains(needle);
                }
                true
            })
            .collect();

        let total = filtered.len();
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let start = (page - 1) * page_size;

        let mut items = Vec::new();
        for invoice in filtered.into_iter().skip(start).take(page_size) {
            let validation = self.store.get_validation(&invoice.id).await?;
            let remote = self.find_existing(invoice.invoice_number.as_deref()).await;
            let score = remote.as_ref().map(|r| match_score(invoice, r));

            items.push(InvoiceListItem {
                invoice_id: invoice.id.clone(),
                invoice_number: invoice.invoice_number.clone(),
                status: invoice.status.as_str().to_string(),
                total: invoice.total,
                validation_status: validation.as_ref().map(|v| v.status.clone()),
                ready_for_sync: validation.as_ref().is_some_and(|v| v.ready_for_sync),
                qb_invoice_id: validation.and_then(|v| v.qb_invoice_id),
                match_score: score,
            });
        }

        Ok(InvoiceListPage {
            total,
            page,
            page_size,
            items,
        })
    }
}
