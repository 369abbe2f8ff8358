//! Internal representations of QuickBooks entities.
//!
//! These are the shapes the engine works with; the raw QuickBooks API JSON
//! is mapped onto them by the client adapter.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QbCustomer {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QbItem {
    pub id: String,
    pub name: String,
    pub sku: Option<String>,
    pub item_type: Option<String>,
    pub active: bool,
}

/// A structured QuickBooks address, best-effort populated from free text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QbAddress {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub line3: Option<String>,
    pub city: Option<String>,
    /// Province/state code, e.g. "QC".
    pub country_sub_division_code: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl QbAddress {
    pub fn is_empty(&self) -> bool {
        self.line1.is_none()
            && self.line2.is_none()
            && self.line3.is_none()
            && self.city.is_none()
            && self.country_sub_division_code.is_none()
            && self.postal_code.is_none()
            && self.country.is_none()
    }
}

/// One itemized tax line. QuickBooks does not reliably apply tax from a
/// code reference alone on updates, so the full detail is always sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QbTaxLine {
    pub tax_rate_ref: String,
    pub amount: Decimal,
    pub net_amount_taxable: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QbTxnTaxDetail {
    pub txn_tax_code_ref: String,
    pub total_tax: Decimal,
    pub tax_lines: Vec<QbTaxLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QbInvoiceLine {
    pub item_ref: String,
    pub item_name: Option<String>,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
    pub tax_code_ref: String,
}

/// A QuickBooks invoice, both as a payload to write and as a fetched
/// remote document (then `id`/`sync_token` are populated).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QbInvoice {
    pub id: Option<String>,
    pub sync_token: Option<String>,
    pub doc_number: Option<String>,
    pub customer_ref: String,
    pub txn_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub lines: Vec<QbInvoiceLine>,
    pub bill_addr: Option<QbAddress>,
    pub ship_addr: Option<QbAddress>,
    pub txn_tax_detail: Option<QbTxnTaxDetail>,
    pub customer_memo: Option<String>,
    pub po_number: Option<String>,
    /// Remote-reported grand total, present on fetched invoices.
    pub total_amt: Option<Decimal>,
}

impl QbInvoice {
    /// Subtotal of a fetched invoice: reported total minus itemized tax.
    pub fn subtotal(&self) -> Option<Decimal> {
        let total = self.total_amt?;
        let tax = self
            .txn_tax_detail
            .as_ref()
            .map(|d| d.total_tax)
            .unwrap_or_default();
        Some(total - tax)
    }
}
