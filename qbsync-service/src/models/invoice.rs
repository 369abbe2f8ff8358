//! Internal representation of ledger documents.
//!
//! The ledger's document store is loosely typed; everything here is the
//! already-normalized shape produced by the connector adapter. Business
//! logic never sees the raw external variants.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ledger invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerInvoiceStatus {
    Draft,
    Sent,
    Paid,
    Partial,
    Overdue,
    Cancelled,
    Void,
    Unknown,
}

impl LedgerInvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Partial => "partial",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
            Self::Void => "void",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "draft" => Self::Draft,
            "sent" => Self::Sent,
            "paid" => Self::Paid,
            "partial" => Self::Partial,
            "overdue" => Self::Overdue,
            "cancelled" => Self::Cancelled,
            "void" => Self::Void,
            _ => Self::Unknown,
        }
    }

    /// Statuses that make an invoice eligible for sync.
    pub fn sync_eligible(&self) -> bool {
        matches!(self, Self::Sent | Self::Paid | Self::Partial | Self::Overdue)
    }
}

/// One line of a ledger invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerLineItem {
    pub sku_id: Option<String>,
    pub sku_code: Option<String>,
    pub sku_name: String,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Percentage discount, 0-100.
    pub discount_percent: Decimal,
    /// Authoritative when present; derived otherwise.
    pub amount: Option<Decimal>,
    pub taxable: bool,
}

impl LedgerLineItem {
    /// The stored amount if the ledger computed one, else
    /// `quantity * unit_price * (1 - discount/100)`.
    pub fn effective_amount(&self) -> Decimal {
        match self.amount {
            Some(a) => a,
            None => {
                let discount_factor =
                    Decimal::ONE - self.discount_percent / Decimal::from(100);
                self.quantity * self.unit_price * discount_factor
            }
        }
    }

    /// Stable lookup key for mapping resolution: SKU code, falling back to
    /// the SKU id when the code is absent.
    pub fn sku_key(&self) -> Option<&str> {
        self.sku_code
            .as_deref()
            .filter(|c| !c.is_empty())
            .or(self.sku_id.as_deref().filter(|i| !i.is_empty()))
    }
}

/// A ledger invoice, normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerInvoice {
    pub id: String,
    pub invoice_number: Option<String>,
    pub organization_id: Option<String>,
    pub manager_id: Option<String>,
    pub status: LedgerInvoiceStatus,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    /// Free-form newline-delimited billing address.
    pub billing_address: Option<String>,
    pub shipping_addresses: Vec<String>,
    pub line_items: Vec<LedgerLineItem>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub notes: Option<String>,
    pub po_number: Option<String>,
}

impl LedgerInvoice {
    /// Distinct SKU keys on this invoice, grouped by code with id fallback,
    /// in first-seen order.
    pub fn distinct_sku_keys(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for line in &self.line_items {
            if let Some(key) = line.sku_key() {
                if !seen.iter().any(|s| s == key) {
                    seen.push(key.to_string());
                }
            }
        }
        seen
    }
}

/// A ledger organization tagged as a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerOrganization {
    pub id: String,
    pub name: String,
    /// Numeric organization code, when assigned.
    pub code: Option<String>,
    pub active: bool,
}

/// A manager/user in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerManager {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

/// A distinct SKU aggregated across sync-eligible invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkuUsage {
    pub sku_id: Option<String>,
    pub sku_code: Option<String>,
    /// First-seen name.
    pub name: String,
    pub description: Option<String>,
    pub unit_price: Decimal,
    pub taxable: bool,
    /// Number of invoices the SKU appears on.
    pub invoice_count: i64,
}

impl SkuUsage {
    pub fn key(&self) -> &str {
        self.sku_code
            .as_deref()
            .filter(|c| !c.is_empty())
            .or(self.sku_id.as_deref())
            .unwrap_or(&self.name)
    }
}
