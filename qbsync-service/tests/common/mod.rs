//! In-memory fixtures for engine-level integration tests.
//!
//! The engines talk to the outside world only through `SyncStore`,
//! `LedgerConnector` and `QuickBooks`; the implementations here replicate
//! the persistence rules so tests run without Postgres or live APIs.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use qbsync_service::clients::{LedgerConnector, QuickBooks};
use qbsync_service::models::{
    CustomerMapping, InvoiceValidation, LedgerInvoice, LedgerInvoiceStatus, LedgerLineItem,
    LedgerManager, LedgerOrganization, MappingStatus, MatchLogEntry, NewCustomerMapping,
    NewSkuMapping, NewValidation, QbCustomer, QbInvoice, QbItem, SkuMapping, SkuMappingStatus,
    ValidationStatus,
};
use qbsync_service::services::store::{
    MappingFilter, SyncStore, ValidationFilter, ValidationUpsert,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
struct StoreState {
    customer_mappings: Vec<CustomerMapping>,
    sku_mappings: Vec<SkuMapping>,
    validations: Vec<InvoiceValidation>,
    match_logs: Vec<MatchLogEntry>,
    next_id: i64,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn customer_mappings(&self) -> Vec<CustomerMapping> {
        self.state.lock().unwrap().customer_mappings.clone()
    }

    pub fn sku_mappings(&self) -> Vec<SkuMapping> {
        self.state.lock().unwrap().sku_mappings.clone()
    }

    pub fn validations(&self) -> Vec<InvoiceValidation> {
        self.state.lock().unwrap().validations.clone()
    }

    pub fn match_logs(&self, entity_type: &str) -> Vec<MatchLogEntry> {
        self.state
            .lock()
            .unwrap()
            .match_logs
            .iter()
            .filter(|l| l.entity_type == entity_type)
            .cloned()
            .collect()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl SyncStore for InMemoryStore {
    async fn get_customer_mapping(
        &self,
        organization_id: &str,
        manager_id: &str,
    ) -> Result<Option<CustomerMapping>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .customer_mappings
            .iter()
            .find(|m| m.organization_id == organization_id && m.manager_id == manager_id)
            .cloned())
    }

    async fn resolve_customer_mapping(
        &self,
        organization_id: &str,
        manager_id: &str,
    ) -> Result<Option<CustomerMapping>, AppError> {
        let state = self.state.lock().unwrap();
        let rows: Vec<&CustomerMapping> = state
            .customer_mappings
            .iter()
            .filter(|m| m.organization_id == organization_id)
            .collect();
        Ok(rows
            .iter()
            .find(|m| m.manager_id == manager_id)
            .or_else(|| rows.iter().find(|m| m.manager_id.is_empty()))
            .or_else(|| rows.first())
            .map(|m| (*m).clone()))
    }

    async fn list_customer_mappings(
        &self,
        filter: &MappingFilter,
    ) -> Result<Vec<CustomerMapping>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .customer_mappings
            .iter()
            .filter(|m| {
                filter.status.as_deref().map_or(true, |s| m.status == s)
                    && filter.search.as_deref().map_or(true, |q| {
                        contains_ci(&m.organization_name, q)
                            || m.qb_customer_name
                                .as_deref()
                                .is_some_and(|n| contains_ci(n, q))
                    })
            })
            .cloned()
            .collect())
    }

    async fn upsert_customer_mapping(
        &self,
        mapping: &NewCustomerMapping,
        preserve_decided: bool,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();

        if let Some(existing) = state.customer_mappings.iter_mut().find(|m| {
            m.organization_id == mapping.organization_id && m.manager_id == mapping.manager_id
        }) {
            if preserve_decided && MappingStatus::from_str(&existing.status).is_decided() {
                return Ok(false);
            }
            existing.organization_name = mapping.organization_name.clone();
            existing.manager_name = mapping.manager_name.clone();
            existing.manager_email = mapping.manager_email.clone();
            existing.qb_customer_id = mapping.qb_customer_id.clone();
            existing.qb_customer_name = mapping.qb_customer_name.clone();
            existing.qb_customer_email = mapping.qb_customer_email.clone();
            existing.status = mapping.status.as_str().to_string();
            existing.confidence = mapping.confidence;
            existing.match_method = mapping.match_method.as_str().to_string();
            existing.factors = mapping.factors.clone();
            existing.updated_utc = now;
            return Ok(true);
        }

        let id = state.next_id();
        state.customer_mappings.push(CustomerMapping {
            id,
            organization_id: mapping.organization_id.clone(),
            manager_id: mapping.manager_id.clone(),
            organization_name: mapping.organization_name.clone(),
            manager_name: mapping.manager_name.clone(),
            manager_email: mapping.manager_email.clone(),
            qb_customer_id: mapping.qb_customer_id.clone(),
            qb_customer_name: mapping.qb_customer_name.clone(),
            qb_customer_email: mapping.qb_customer_email.clone(),
            status: mapping.status.as_str().to_string(),
            confidence: mapping.confidence,
            match_method: mapping.match_method.as_str().to_string(),
            factors: mapping.factors.clone(),
            reviewed_by: None,
            reviewed_utc: None,
            review_notes: None,
            created_utc: now,
            updated_utc: now,
        });
        Ok(true)
    }

    async fn set_customer_mapping_status(
        &self,
        id: i64,
        status: MappingStatus,
        reviewed_by: &str,
        notes: Option<&str>,
    ) -> Result<CustomerMapping, AppError> {
        let mut state = self.state.lock().unwrap();
        let mapping = state
            .customer_mappings
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No customer mapping {}", id)))?;
        mapping.status = status.as_str().to_string();
        mapping.reviewed_by = Some(reviewed_by.to_string());
        mapping.reviewed_utc = Some(Utc::now());
        mapping.review_notes = notes.map(str::to_string);
        mapping.updated_utc = Utc::now();
        Ok(mapping.clone())
    }

    async fn repoint_customer_mapping(
        &self,
        id: i64,
        qb_customer_id: &str,
        qb_customer_name: &str,
    ) -> Result<CustomerMapping, AppError> {
        let mut state = self.state.lock().unwrap();
        let mapping = state
            .customer_mappings
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No customer mapping {}", id)))?;
        mapping.qb_customer_id = Some(qb_customer_id.to_string());
        mapping.qb_customer_name = Some(qb_customer_name.to_string());
        mapping.status = MappingStatus::Approved.as_str().to_string();
        mapping.confidence = 1.0;
        mapping.match_method = "manual".to_string();
        mapping.updated_utc = Utc::now();
        Ok(mapping.clone())
    }

    async fn delete_undecided_customer_mappings(&self) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        let before = state.customer_mappings.len();
        state
            .customer_mappings
            .retain(|m| MappingStatus::from_str(&m.status).is_decided());
        Ok((before - state.customer_mappings.len()) as u64)
    }

    async fn get_sku_mapping(&self, sku_code: &str) -> Result<Option<SkuMapping>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sku_mappings
            .iter()
            .find(|m| m.sku_code == sku_code)
            .cloned())
    }

    async fn list_sku_mappings(
        &self,
        filter: &MappingFilter,
    ) -> Result<Vec<SkuMapping>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sku_mappings
            .iter()
            .filter(|m| {
                filter.status.as_deref().map_or(true, |s| m.status == s)
                    && filter.search.as_deref().map_or(true, |q| {
                        contains_ci(&m.sku_code, q) || contains_ci(&m.sku_name, q)
                    })
            })
            .cloned()
            .collect())
    }

    async fn upsert_sku_mapping(
        &self,
        mapping: &NewSkuMapping,
        preserve_decided: bool,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();

        if let Some(existing) = state
            .sku_mappings
            .iter_mut()
            .find(|m| m.sku_code == mapping.sku_code)
        {
            let decided = matches!(
                SkuMappingStatus::from_str(&existing.status),
                SkuMappingStatus::Approved | SkuMappingStatus::Rejected
            );
            if preserve_decided && decided {
                return Ok(false);
            }
            existing.sku_name = mapping.sku_name.clone();
            existing.qb_item_id = mapping.qb_item_id.clone();
            existing.qb_item_name = mapping.qb_item_name.clone();
            existing.qb_item_type = mapping.qb_item_type.clone();
            existing.status = mapping.status.as_str().to_string();
            existing.confidence = mapping.confidence;
            existing.match_method = mapping.match_method.as_str().to_string();
            existing.updated_utc = now;
            return Ok(true);
        }

        let id = state.next_id();
        state.sku_mappings.push(SkuMapping {
            id,
            sku_code: mapping.sku_code.clone(),
            sku_name: mapping.sku_name.clone(),
            qb_item_id: mapping.qb_item_id.clone(),
            qb_item_name: mapping.qb_item_name.clone(),
            qb_item_type: mapping.qb_item_type.clone(),
            status: mapping.status.as_str().to_string(),
            confidence: mapping.confidence,
            match_method: mapping.match_method.as_str().to_string(),
            created_utc: now,
            updated_utc: now,
        });
        Ok(true)
    }

    async fn get_validation(
        &self,
        invoice_id: &str,
    ) -> Result<Option<InvoiceValidation>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .validations
            .iter()
            .find(|v| v.invoice_id == invoice_id)
            .cloned())
    }

    async fn list_validations(
        &self,
        filter: &ValidationFilter,
    ) -> Result<Vec<InvoiceValidation>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .validations
            .iter()
            .filter(|v| {
                filter.status.as_deref().map_or(true, |s| v.status == s)
                    && filter.search.as_deref().map_or(true, |q| {
                        contains_ci(&v.invoice_id, q)
                            || v.invoice_number
                                .as_deref()
                                .is_some_and(|n| contains_ci(n, q))
                    })
                    && (!filter.ready_only || v.ready_for_sync)
            })
            .cloned()
            .collect())
    }

    async fn upsert_validation(
        &self,
        validation: &NewValidation,
    ) -> Result<ValidationUpsert, AppError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let outcome = &validation.outcome;

        if let Some(existing) = state
            .validations
            .iter_mut()
            .find(|v| v.invoice_id == validation.invoice_id)
        {
            if existing.status == ValidationStatus::Synced.as_str() {
                return Ok(ValidationUpsert::SkippedSynced);
            }
            existing.invoice_number = validation.invoice_number.clone();
            existing.status = outcome.status.as_str().to_string();
            existing.customer_mapping_ok = outcome.customer_mapping_ok;
            existing.skus_mapped = outcome.skus_mapped;
            existing.issues = outcome.issues.clone();
            existing.confidence = outcome.confidence;
            existing.ready_for_sync = outcome.ready_for_sync;
            existing.approved_by = None;
            existing.approved_utc = None;
            existing.updated_utc = now;
            return Ok(ValidationUpsert::Written);
        }

        let id = state.next_id();
        state.validations.push(InvoiceValidation {
            id,
            invoice_id: validation.invoice_id.clone(),
            invoice_number: validation.invoice_number.clone(),
            status: outcome.status.as_str().to_string(),
            customer_mapping_ok: outcome.customer_mapping_ok,
            skus_mapped: outcome.skus_mapped,
            issues: outcome.issues.clone(),
            confidence: outcome.confidence,
            ready_for_sync: outcome.ready_for_sync,
            approved_by: None,
            approved_utc: None,
            qb_invoice_id: None,
            synced_utc: None,
            created_utc: now,
            updated_utc: now,
        });
        Ok(ValidationUpsert::Written)
    }

    async fn approve_validation_for_sync(
        &self,
        invoice_id: &str,
        approved_by: &str,
    ) -> Result<InvoiceValidation, AppError> {
        let mut state = self.state.lock().unwrap();
        let validation = state
            .validations
            .iter_mut()
            .find(|v| v.invoice_id == invoice_id)
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("No validation for invoice {}", invoice_id))
            })?;
        if validation.status != ValidationStatus::Ready.as_str() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} is {} and cannot be approved for sync",
                invoice_id,
                validation.status
            )));
        }
        validation.approved_by = Some(approved_by.to_string());
        validation.approved_utc = Some(Utc::now());
        validation.updated_utc = Utc::now();
        Ok(validation.clone())
    }

    async fn mark_validation_synced(
        &self,
        invoice_id: &str,
        invoice_number: Option<&str>,
        qb_invoice_id: &str,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();

        if let Some(existing) = state
            .validations
            .iter_mut()
            .find(|v| v.invoice_id == invoice_id)
        {
            existing.status = ValidationStatus::Synced.as_str().to_string();
            existing.ready_for_sync = false;
            existing.qb_invoice_id = Some(qb_invoice_id.to_string());
            existing.synced_utc = Some(now);
            existing.updated_utc = now;
            return Ok(());
        }

        let id = state.next_id();
        state.validations.push(InvoiceValidation {
            id,
            invoice_id: invoice_id.to_string(),
            invoice_number: invoice_number.map(str::to_string),
            status: ValidationStatus::Synced.as_str().to_string(),
            customer_mapping_ok: true,
            skus_mapped: true,
            issues: Vec::new(),
            confidence: 1.0,
            ready_for_sync: false,
            approved_by: None,
            approved_utc: None,
            qb_invoice_id: Some(qb_invoice_id.to_string()),
            synced_utc: Some(now),
            created_utc: now,
            updated_utc: now,
        });
        Ok(())
    }

    async fn delete_validation(&self, invoice_id: &str) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        let before = state.validations.len();
        state.validations.retain(|v| v.invoice_id != invoice_id);
        Ok(state.validations.len() < before)
    }

    async fn delete_all_validations(&self) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        let before = state.validations.len();
        state
            .validations
            .retain(|v| v.status == ValidationStatus::Synced.as_str());
        Ok((before - state.validations.len()) as u64)
    }

    async fn insert_match_log(&self, entry: &MatchLogEntry) -> Result<(), AppError> {
        self.state.lock().unwrap().match_logs.push(entry.clone());
        Ok(())
    }

    async fn delete_match_logs(&self, entity_type: &str) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        let before = state.match_logs.len();
        state.match_logs.retain(|l| l.entity_type != entity_type);
        Ok((before - state.match_logs.len()) as u64)
    }

    async fn delete_match_logs_for_unmapped(&self, entity_type: &str) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        let mapped: Vec<String> = match entity_type {
            "customer" => state
                .customer_mappings
                .iter()
                .map(|m| m.organization_id.clone())
                .collect(),
            "sku" => state
                .sku_mappings
                .iter()
                .map(|m| m.sku_code.clone())
                .collect(),
            other => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "No mapping table for entity type {}",
                    other
                )));
            }
        };
        let before = state.match_logs.len();
        state
            .match_logs
            .retain(|l| l.entity_type != entity_type || mapped.contains(&l.entity_id));
        Ok((before - state.match_logs.len()) as u64)
    }
}

// ============================================================================
// Mock ledger
// ============================================================================

#[derive(Default)]
pub struct MockLedger {
    pub invoices: Vec<LedgerInvoice>,
    pub organizations: Vec<LedgerOrganization>,
    pub managers: HashMap<String, Vec<LedgerManager>>,
}

#[async_trait]
impl LedgerConnector for MockLedger {
    async fn get_invoice(&self, id: &str) -> Result<Option<LedgerInvoice>, AppError> {
        Ok(self.invoices.iter().find(|i| i.id == id).cloned())
    }

    async fn get_invoice_by_number(
        &self,
        number: &str,
    ) -> Result<Option<LedgerInvoice>, AppError> {
        Ok(self
            .invoices
            .iter()
            .find(|i| i.invoice_number.as_deref() == Some(number))
            .cloned())
    }

    async fn list_invoices(
        &self,
        statuses: &[LedgerInvoiceStatus],
        _from: Option<NaiveDate>,
        _to: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<LedgerInvoice>, AppError> {
        let mut invoices: Vec<LedgerInvoice> = self
            .invoices
            .iter()
            .filter(|i| statuses.is_empty() || statuses.contains(&i.status))
            .cloned()
            .collect();
        if let Some(limit) = limit {
            invoices.truncate(limit as usize);
        }
        Ok(invoices)
    }

    async fn get_organization(
        &self,
        id: &str,
    ) -> Result<Option<LedgerOrganization>, AppError> {
        Ok(self.organizations.iter().find(|o| o.id == id).cloned())
    }

    async fn list_customer_organizations(&self) -> Result<Vec<LedgerOrganization>, AppError> {
        Ok(self.organizations.clone())
    }

    async fn get_manager(&self, id: &str) -> Result<Option<LedgerManager>, AppError> {
        Ok(self
            .managers
            .values()
            .flatten()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn manager_index(&self) -> Result<HashMap<String, Vec<LedgerManager>>, AppError> {
        Ok(self.managers.clone())
    }
}

// ============================================================================
// Mock QuickBooks
// ============================================================================

#[derive(Default)]
pub struct MockBooks {
    pub customers: Vec<QbCustomer>,
    pub items: Vec<QbItem>,
    pub remote_invoices: Mutex<Vec<QbInvoice>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_write_for: Mutex<Vec<String>>,
    pub next_id: Mutex<i64>,
}

impl MockBooks {
    pub fn with_remote_invoice(self, invoice: QbInvoice) -> Self {
        self.remote_invoices.lock().unwrap().push(invoice);
        self
    }

    /// Make writes fail for invoices with the given document number.
    pub fn fail_write_for(&self, doc_number: &str) {
        self.fail_write_for
            .lock()
            .unwrap()
            .push(doc_number.to_string());
    }

    pub fn remote_invoices(&self) -> Vec<QbInvoice> {
        self.remote_invoices.lock().unwrap().clone()
    }

    fn allocate_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("qb-{}", next)
    }

    fn write_should_fail(&self, invoice: &QbInvoice) -> bool {
        if self.fail_writes.load(Ordering::SeqCst) {
            return true;
        }
        let doomed = self.fail_write_for.lock().unwrap();
        invoice
            .doc_number
            .as_deref()
            .is_some_and(|n| doomed.iter().any(|d| d == n))
    }
}

#[async_trait]
impl QuickBooks for MockBooks {
    fn is_connected(&self) -> bool {
        true
    }

    async fn query_customers(&self) -> Result<Vec<QbCustomer>, AppError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::BadGateway("QuickBooks unreachable".to_string()));
        }
        Ok(self.customers.clone())
    }

    async fn get_customer(&self, id: &str) -> Result<Option<QbCustomer>, AppError> {
        Ok(self.customers.iter().find(|c| c.id == id).cloned())
    }

    async fn query_items(&self) -> Result<Vec<QbItem>, AppError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::BadGateway("QuickBooks unreachable".to_string()));
        }
        Ok(self.items.clone())
    }

    async fn create_item(
        &self,
        name: &str,
        sku: Option<&str>,
        item_type: &str,
    ) -> Result<QbItem, AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::BadGateway("QuickBooks unreachable".to_string()));
        }
        Ok(QbItem {
            id: self.allocate_id(),
            name: name.to_string(),
            sku: sku.map(str::to_string),
            item_type: Some(item_type.to_string()),
            active: true,
        })
    }

    async fn find_invoice_by_doc_number(
        &self,
        doc_number: &str,
    ) -> Result<Option<QbInvoice>, AppError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::BadGateway("QuickBooks unreachable".to_string()));
        }
        Ok(self
            .remote_invoices
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.doc_number.as_deref() == Some(doc_number))
            .cloned())
    }

    async fn search_invoices(
        &self,
        doc_number_like: &str,
    ) -> Result<Vec<QbInvoice>, AppError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::BadGateway("QuickBooks unreachable".to_string()));
        }
        Ok(self
            .remote_invoices
            .lock()
            .unwrap()
            .iter()
            .filter(|i| {
                i.doc_number
                    .as_deref()
                    .is_some_and(|n| n.contains(doc_number_like))
            })
            .cloned()
            .collect())
    }

    async fn create_invoice(&self, invoice: &QbInvoice) -> Result<QbInvoice, AppError> {
        if self.write_should_fail(invoice) {
            return Err(AppError::BadGateway(
                "QuickBooks create invoice failed".to_string(),
            ));
        }
        let mut written = invoice.clone();
        written.id = Some(self.allocate_id());
        written.sync_token = Some("0".to_string());
        self.remote_invoices.lock().unwrap().push(written.clone());
        Ok(written)
    }

    async fn update_invoice(&self, invoice: &QbInvoice) -> Result<QbInvoice, AppError> {
        if self.write_should_fail(invoice) {
            return Err(AppError::BadGateway(
                "QuickBooks update invoice failed".to_string(),
            ));
        }
        let id = invoice.id.clone().ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Invoice update requires an id"))
        })?;
        let mut remote = self.remote_invoices.lock().unwrap();
        let slot = remote
            .iter_mut()
            .find(|i| i.id.as_deref() == Some(id.as_str()))
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("QuickBooks invoice {} not found", id))
            })?;
        *slot = invoice.clone();
        Ok(invoice.clone())
    }

    async fn get_invoice(&self, id: &str) -> Result<Option<QbInvoice>, AppError> {
        Ok(self
            .remote_invoices
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id.as_deref() == Some(id))
            .cloned())
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn organization(id: &str, name: &str, code: Option<&str>) -> LedgerOrganization {
    LedgerOrganization {
        id: id.to_string(),
        name: name.to_string(),
        code: code.map(str::to_string),
        active: true,
    }
}

pub fn manager(id: &str, name: &str) -> LedgerManager {
    LedgerManager {
        id: id.to_string(),
        name: name.to_string(),
        email: Some(format!("{}@example.test", id)),
    }
}

pub fn qb_customer(id: &str, display_name: &str) -> QbCustomer {
    QbCustomer {
        id: id.to_string(),
        display_name: display_name.to_string(),
        email: None,
        active: true,
    }
}

pub fn qb_item(id: &str, name: &str, sku: Option<&str>) -> QbItem {
    QbItem {
        id: id.to_string(),
        name: name.to_string(),
        sku: sku.map(str::to_string),
        item_type: Some("Service".to_string()),
        active: true,
    }
}

pub fn line(code: &str, name: &str, quantity: &str, unit_price: &str) -> LedgerLineItem {
    LedgerLineItem {
        sku_id: None,
        sku_code: Some(code.to_string()),
        sku_name: name.to_string(),
        description: None,
        quantity: d(quantity),
        unit_price: d(unit_price),
        discount_percent: Decimal::ZERO,
        amount: None,
        taxable: true,
    }
}

pub fn invoice(id: &str, number: &str, org_id: &str, lines: Vec<LedgerLineItem>) -> LedgerInvoice {
    let subtotal: Decimal = lines.iter().map(|l| l.effective_amount()).sum();
    // Quebec GST + QST on the subtotal.
    let tax = (subtotal * d("0.14975")).round_dp(2);
    LedgerInvoice {
        id: id.to_string(),
        invoice_number: Some(number.to_string()),
        organization_id: Some(org_id.to_string()),
        manager_id: None,
        status: LedgerInvoiceStatus::Sent,
        issue_date: NaiveDate::from_ymd_opt(2024, 6, 1),
        due_date: NaiveDate::from_ymd_opt(2024, 6, 30),
        billing_address: Some("1 Main St\nMontréal QC H2X 1Y4\nCanada".to_string()),
        shipping_addresses: vec![],
        line_items: lines,
        subtotal,
        tax_amount: tax,
        total: subtotal + tax,
        currency: "CAD".to_string(),
        notes: None,
        po_number: None,
    }
}

/// Seed an approved customer mapping for an organization.
pub async fn seed_customer_mapping(
    store: &InMemoryStore,
    org_id: &str,
    org_name: &str,
    qb_customer_id: &str,
) {
    store
        .upsert_customer_mapping(
            &NewCustomerMapping {
                organization_id: org_id.to_string(),
                manager_id: String::new(),
                organization_name: org_name.to_string(),
                manager_name: None,
                manager_email: None,
                qb_customer_id: Some(qb_customer_id.to_string()),
                qb_customer_name: Some(org_name.to_string()),
                qb_customer_email: None,
                status: MappingStatus::Approved,
                confidence: 1.0,
                match_method: qbsync_service::models::CustomerMatchMethod::Manual,
                factors: Default::default(),
            },
            false,
        )
        .await
        .expect("Failed to seed customer mapping");
}

/// Seed an approved SKU mapping pointing at a QuickBooks item.
pub async fn seed_sku_mapping(store: &InMemoryStore, sku_code: &str, qb_item_id: &str) {
    store
        .upsert_sku_mapping(
            &NewSkuMapping {
                sku_code: sku_code.to_string(),
                sku_name: format!("{} item", sku_code),
                qb_item_id: Some(qb_item_id.to_string()),
                qb_item_name: Some(format!("{} item", sku_code)),
                qb_item_type: Some("Service".to_string()),
                status: SkuMappingStatus::Approved,
                confidence: 1.0,
                match_method: qbsync_service::models::SkuMatchMethod::ExactCode,
            },
            false,
        )
        .await
        .expect("Failed to seed SKU mapping");
}
