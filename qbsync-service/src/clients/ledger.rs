//! Read-only connector to the ledger document store.
//!
//! The ledger's schema is loosely typed: amounts appear as numbers,
//! strings, wrapper objects or single-element arrays depending on document
//! age, and several fields have legacy spellings. All of that shape
//! branching stays inside this module; the rest of the service only sees
//! the normalized models.

use crate::models::{
    LedgerInvoice, LedgerInvoiceStatus, LedgerLineItem, LedgerManager, LedgerOrganization,
    SkuUsage,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use service_core::observability::TracedClientExt;
use std::collections::HashMap;
use tracing::{instrument, warn};

/// Read-only view of the ledger.
#[async_trait]
pub trait LedgerConnector: Send + Sync {
    async fn get_invoice(&self, id: &str) -> Result<Option<LedgerInvoice>, AppError>;

    async fn get_invoice_by_number(
        &self,
        number: &str,
    ) -> Result<Option<LedgerInvoice>, AppError>;

    /// List invoices matching a status set and optional issue-date range.
    async fn list_invoices(
        &self,
        statuses: &[LedgerInvoiceStatus],
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<LedgerInvoice>, AppError>;

    async fn get_organization(&self, id: &str)
        -> Result<Option<LedgerOrganization>, AppError>;

    /// Organizations tagged as customers.
    async fn list_customer_organizations(&self) -> Result<Vec<LedgerOrganization>, AppError>;

    async fn get_manager(&self, id: &str) -> Result<Option<LedgerManager>, AppError>;

    /// All managers grouped by the organization they belong to.
    async fn manager_index(&self) -> Result<HashMap<String, Vec<LedgerManager>>, AppError>;

    /// Distinct SKUs across sync-eligible invoices with first-seen metadata
    /// and usage counts.
    async fn collect_invoice_skus(&self) -> Result<Vec<SkuUsage>, AppError> {
        let eligible = [
            LedgerInvoiceStatus::Sent,
            LedgerInvoiceStatus::Paid,
            LedgerInvoiceStatus::Partial,
            LedgerInvoiceStatus::Overdue,
        ];
        let invoices = self.list_invoices(&eligible, None, None, None).await?;
        Ok(aggregate_skus(&invoices))
    }
}

/// Fold invoice line items into distinct SKUs, keyed by code with id
/// fallback, keeping first-seen metadata.
pub fn aggregate_skus(invoices: &[LedgerInvoice]) -> Vec<SkuUsage> {
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, SkuUsage> = HashMap::new();

    for invoice in invoices {
        let mut seen_on_invoice: std::collections::HashSet<String> =
            std::collections::HashSet::new();
        for line in &invoice.line_items {
            let Some(key) = line.sku_key() else { continue };
            let first_on_invoice = seen_on_invoice.insert(key.to_string());
            if let Some(existing) = by_key.get_mut(key) {
                if first_on_invoice {
                    existing.invoice_count += 1;
                }
            } else {
                order.push(key.to_string());
                by_key.insert(
                    key.to_string(),
                    SkuUsage {
                        sku_id: line.sku_id.clone(),
                        sku_code: line.sku_code.clone(),
                        name: line.sku_name.clone(),
                        description: line.description.clone(),
                        unit_price: line.unit_price,
                        taxable: line.taxable,
                        invoice_count: 1,
                    },
                );
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect()
}

// ============================================================================
// Raw document shapes
// ============================================================================

/// A money field in any of the legacy spellings the ledger uses.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum LooseAmount {
    Value(Decimal),
    Text(String),
    Wrapped { amount: Box<LooseAmount> },
    Many(Vec<LooseAmount>),
}

impl LooseAmount {
    fn resolve(&self) -> Option<Decimal> {
        match self {
            Self::Value(d) => Some(*d),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Wrapped { amount } => amount.resolve(),
            Self::Many(items) => items.first().and_then(LooseAmount::resolve),
        }
    }
}

fn resolve_amount(amount: &Option<LooseAmount>) -> Decimal {
    amount
        .as_ref()
        .and_then(LooseAmount::resolve)
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLineItem {
    #[serde(default)]
    sku_id: Option<String>,
    #[serde(default, alias = "code")]
    sku_code: Option<String>,
    #[serde(default, alias = "name")]
    sku_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    quantity: Option<LooseAmount>,
    #[serde(default, alias = "price")]
    unit_price: Option<LooseAmount>,
    #[serde(default, alias = "discount")]
    discount_percent: Option<LooseAmount>,
    #[serde(default)]
    amount: Option<LooseAmount>,
    #[serde(default = "default_true")]
    taxable: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInvoice {
    #[serde(alias = "_id")]
    id: String,
    #[serde(default, alias = "invoiceNo", alias = "number")]
    invoice_number: Option<String>,
    #[serde(default, alias = "customerOrgId")]
    organization_id: Option<String>,
    #[serde(default, alias = "accountManagerId")]
    manager_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "date")]
    issue_date: Option<NaiveDate>,
    #[serde(default)]
    due_date: Option<NaiveDate>,
    #[serde(default, alias = "billTo")]
    billing_address: Option<String>,
    #[serde(default)]
    billing_site_id: Option<String>,
    #[serde(default, alias = "shipTo")]
    shipping_addresses: Vec<String>,
    #[serde(default, alias = "items", alias = "lines")]
    line_items: Vec<RawLineItem>,
    #[serde(default)]
    subtotal: Option<LooseAmount>,
    #[serde(default, alias = "tax")]
    tax_amount: Option<LooseAmount>,
    #[serde(default)]
    total: Option<LooseAmount>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default, alias = "poNumber")]
    po_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrganization {
    #[serde(alias = "_id")]
    id: String,
    name: String,
    #[serde(default, alias = "orgNumber")]
    code: Option<String>,
    #[serde(default = "default_true")]
    active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManager {
    #[serde(alias = "_id")]
    id: String,
    #[serde(alias = "displayName")]
    name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, alias = "orgId")]
    organization_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBillingSite {
    #[serde(default)]
    address: Option<String>,
}

fn normalize_line(raw: RawLineItem) -> LedgerLineItem {
    LedgerLineItem {
        sku_id: raw.sku_id,
        sku_code: raw.sku_code,
        sku_name: raw.sku_name.unwrap_or_default(),
        description: raw.description,
        quantity: raw
            .quantity
            .as_ref()
            .and_then(LooseAmount::resolve)
            .unwrap_or(Decimal::ONE),
        unit_price: resolve_amount(&raw.unit_price),
        discount_percent: resolve_amount(&raw.discount_percent),
        amount: raw.amount.as_ref().and_then(LooseAmount::resolve),
        taxable: raw.taxable,
    }
}

fn normalize_invoice(raw: RawInvoice, billing_address: Option<String>) -> LedgerInvoice {
    LedgerInvoice {
        id: raw.id,
        invoice_number: raw.invoice_number,
        organization_id: raw.organization_id,
        manager_id: raw.manager_id,
        status: raw
            .status
            .as_deref()
            .map(LedgerInvoiceStatus::from_str)
            .unwrap_or(LedgerInvoiceStatus::Unknown),
        issue_date: raw.issue_date,
        due_date: raw.due_date,
        billing_address,
        shipping_addresses: raw.shipping_addresses,
        line_items: raw.line_items.into_iter().map(normalize_line).collect(),
        subtotal: resolve_amount(&raw.subtotal),
        tax_amount: resolve_amount(&raw.tax_amount),
        total: resolve_amount(&raw.total),
        currency: raw.currency.unwrap_or_else(|| "CAD".to_string()),
        notes: raw.notes,
        po_number: raw.po_number,
    }
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// Connector backed by the ledger's HTTP API.
pub struct HttpLedgerConnector {
    client: Client,
    base_url: String,
}

impl HttpLedgerConnector {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.traced_get(&url).query(query).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        Ok(Some(response.json::<T>().await?))
    }

    /// Billing address inline on the invoice wins; otherwise the referenced
    /// billing site is fetched for its address text.
    async fn resolve_billing_address(&self, raw: &RawInvoice) -> Option<String> {
        if let Some(addr) = &raw.billing_address {
            if !addr.trim().is_empty() {
                return Some(addr.clone());
            }
        }

        let site_id = raw.billing_site_id.as_deref()?;
        match self
            .get_json::<RawBillingSite>(&format!("/api/billing-sites/{}", site_id), &[])
            .await
        {
            Ok(site) => site.and_then(|s| s.address),
            Err(e) => {
                warn!(billing_site_id = %site_id, error = %e, "Failed to fetch billing site");
                None
            }
        }
    }

    async fn normalize(&self, raw: RawInvoice) -> LedgerInvoice {
        let billing = self.resolve_billing_address(&raw).await;
        normalize_invoice(raw, billing)
    }
}

#[async_trait]
impl LedgerConnector for HttpLedgerConnector {
    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn get_invoice(&self, id: &str) -> Result<Option<LedgerInvoice>, AppError> {
        let raw = self
            .get_json::<RawInvoice>(&format!("/api/invoices/{}", id), &[])
            .await?;
        match raw {
            Some(raw) => Ok(Some(self.normalize(raw).await)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(invoice_number = %number))]
    async fn get_invoice_by_number(
        &self,
        number: &str,
    ) -> Result<Option<LedgerInvoice>, AppError> {
        let raw = self
            .get_json::<Vec<RawInvoice>>("/api/invoices", &[("number", number.to_string())])
            .await?
            .unwrap_or_default()
            .into_iter()
            .next();
        match raw {
            Some(raw) => Ok(Some(self.normalize(raw).await)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, statuses))]
    async fn list_invoices(
        &self,
        statuses: &[LedgerInvoiceStatus],
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<LedgerInvoice>, AppError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if !statuses.is_empty() {
            let joined = statuses
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(",");
            query.push(("statuses", joined));
        }
        if let Some(from) = from {
            query.push(("from", from.to_string()));
        }
        if let Some(to) = to {
            query.push(("to", to.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let raws = self
            .get_json::<Vec<RawInvoice>>("/api/invoices", &query)
            .await?
            .unwrap_or_default();

        let mut invoices = Vec::with_capacity(raws.len());
        for raw in raws {
            invoices.push(self.normalize(raw).await);
        }
        Ok(invoices)
    }

    #[instrument(skip(self), fields(organization_id = %id))]
    async fn get_organization(
        &self,
        id: &str,
    ) -> Result<Option<LedgerOrganization>, AppError> {
        let raw = self
            .get_json::<RawOrganization>(&format!("/api/organizations/{}", id), &[])
            .await?;
        Ok(raw.map(|r| LedgerOrganization {
            id: r.id,
            name: r.name,
            code: r.code,
            active: r.active,
        }))
    }

    #[instrument(skip(self))]
    async fn list_customer_organizations(&self) -> Result<Vec<LedgerOrganization>, AppError> {
        let raws = self
            .get_json::<Vec<RawOrganization>>(
                "/api/organizations",
                &[("customer", "true".to_string())],
            )
            .await?
            .unwrap_or_default();
        Ok(raws
            .into_iter()
            .map(|r| LedgerOrganization {
                id: r.id,
                name: r.name,
                code: r.code,
                active: r.active,
            })
            .collect())
    }

    #[instrument(skip(self), fields(manager_id = %id))]
    async fn get_manager(&self, id: &str) -> Result<Option<LedgerManager>, AppError> {
        let raw = self
            .get_json::<RawManager>(&format!("/api/managers/{}", id), &[])
            .await?;
        Ok(raw.map(|r| LedgerManager {
            id: r.id,
            name: r.name,
            email: r.email,
        }))
    }

    #[instrument(skip(self))]
    async fn manager_index(&self) -> Result<HashMap<String, Vec<LedgerManager>>, AppError> {
        let raws = self
            .get_json::<Vec<RawManager>>("/api/managers", &[])
            .await?
            .unwrap_or_default();

        let mut index: HashMap<String, Vec<LedgerManager>> = HashMap::new();
        for raw in raws {
            let Some(org_id) = raw.organization_id.clone() else {
                continue;
            };
            index.entry(org_id).or_default().push(LedgerManager {
                id: raw.id,
                name: raw.name,
                email: raw.email,
            });
        }
        Ok(index)
    }
}
