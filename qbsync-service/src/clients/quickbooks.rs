//! QuickBooks Online API client.
//!
//! Reads go through the v3 query endpoint; writes post full entities.
//! Transient failures (rate limiting, timeouts, 5xx) are retried with
//! exponential backoff; business rejections surface immediately.

use crate::models::{
    QbAddress, QbCustomer, QbInvoice, QbInvoiceLine, QbItem, QbTaxLine, QbTxnTaxDetail,
};
use crate::services::metrics::QB_REQUEST_DURATION;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use service_core::observability::TracedClientExt;
use service_core::retry::{RetryConfig, retry_call};
use std::time::Duration;
use tracing::instrument;

/// Client-side view of the accounting platform.
#[async_trait]
pub trait QuickBooks: Send + Sync {
    /// Whether credentials are configured at all.
    fn is_connected(&self) -> bool;

    async fn query_customers(&self) -> Result<Vec<QbCustomer>, AppError>;

    async fn get_customer(&self, id: &str) -> Result<Option<QbCustomer>, AppError>;

    async fn query_items(&self) -> Result<Vec<QbItem>, AppError>;

    async fn create_item(
        &self,
        name: &str,
        sku: Option<&str>,
        item_type: &str,
    ) -> Result<QbItem, AppError>;

    async fn find_invoice_by_doc_number(
        &self,
        doc_number: &str,
    ) -> Result<Option<QbInvoice>, AppError>;

    /// Free-text search over invoice document numbers.
    async fn search_invoices(&self, doc_number_like: &str)
        -> Result<Vec<QbInvoice>, AppError>;

    async fn create_invoice(&self, invoice: &QbInvoice) -> Result<QbInvoice, AppError>;

    /// Update requires `id` and `sync_token` to be set on the payload.
    async fn update_invoice(&self, invoice: &QbInvoice) -> Result<QbInvoice, AppError>;

    async fn get_invoice(&self, id: &str) -> Result<Option<QbInvoice>, AppError>;
}

// ============================================================================
// Wire shapes (v3 API, PascalCase)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Ref {
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl Ref {
    fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            name: None,
        }
    }

    fn named(value: impl Into<String>, name: Option<String>) -> Self {
        Self {
            value: value.into(),
            name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmailAddr {
    #[serde(rename = "Address")]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCustomer {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "DisplayName")]
    display_name: String,
    #[serde(rename = "PrimaryEmailAddr")]
    email: Option<EmailAddr>,
    #[serde(rename = "Active", default = "default_true")]
    active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
struct RawItem {
    #[serde(rename = "Id", skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Sku", skip_serializing_if = "Option::is_none")]
    sku: Option<String>,
    #[serde(rename = "Type", skip_serializing_if = "Option::is_none")]
    item_type: Option<String>,
    #[serde(rename = "Active", default = "default_true")]
    active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawAddress {
    #[serde(rename = "Line1", skip_serializing_if = "Option::is_none")]
    line1: Option<String>,
    #[serde(rename = "Line2", skip_serializing_if = "Option::is_none")]
    line2: Option<String>,
    #[serde(rename = "Line3", skip_serializing_if = "Option::is_none")]
    line3: Option<String>,
    #[serde(rename = "City", skip_serializing_if = "Option::is_none")]
    city: Option<String>,
    #[serde(rename = "CountrySubDivisionCode", skip_serializing_if = "Option::is_none")]
    country_sub_division_code: Option<String>,
    #[serde(rename = "PostalCode", skip_serializing_if = "Option::is_none")]
    postal_code: Option<String>,
    #[serde(rename = "Country", skip_serializing_if = "Option::is_none")]
    country: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawSalesItemDetail {
    #[serde(rename = "ItemRef")]
    item_ref: Ref,
    #[serde(rename = "Qty", skip_serializing_if = "Option::is_none")]
    qty: Option<Decimal>,
    #[serde(rename = "UnitPrice", skip_serializing_if = "Option::is_none")]
    unit_price: Option<Decimal>,
    #[serde(rename = "TaxCodeRef", skip_serializing_if = "Option::is_none")]
    tax_code_ref: Option<Ref>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawLine {
    #[serde(rename = "DetailType")]
    detail_type: String,
    #[serde(rename = "Amount")]
    amount: Decimal,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "SalesItemLineDetail", skip_serializing_if = "Option::is_none")]
    sales_item_line_detail: Option<RawSalesItemDetail>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawTaxLineDetail {
    #[serde(rename = "TaxRateRef")]
    tax_rate_ref: Ref,
    #[serde(rename = "NetAmountTaxable", skip_serializing_if = "Option::is_none")]
    net_amount_taxable: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawTaxLine {
    #[serde(rename = "DetailType")]
    detail_type: String,
    #[serde(rename = "Amount")]
    amount: Decimal,
    #[serde(rename = "TaxLineDetail")]
    tax_line_detail: RawTaxLineDetail,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawTxnTaxDetail {
    #[serde(rename = "TxnTaxCodeRef", skip_serializing_if = "Option::is_none")]
    txn_tax_code_ref: Option<Ref>,
    #[serde(rename = "TotalTax", default)]
    total_tax: Decimal,
    #[serde(rename = "TaxLine", default)]
    tax_line: Vec<RawTaxLine>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Memo {
    value: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawInvoice {
    #[serde(rename = "Id", skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "SyncToken", skip_serializing_if = "Option::is_none")]
    sync_token: Option<String>,
    #[serde(rename = "DocNumber", skip_serializing_if = "Option::is_none")]
    doc_number: Option<String>,
    #[serde(rename = "CustomerRef")]
    customer_ref: Ref,
    #[serde(rename = "TxnDate", skip_serializing_if = "Option::is_none")]
    txn_date: Option<NaiveDate>,
    #[serde(rename = "DueDate", skip_serializing_if = "Option::is_none")]
    due_date: Option<NaiveDate>,
    #[serde(rename = "Line", default)]
    line: Vec<RawLine>,
    #[serde(rename = "BillAddr", skip_serializing_if = "Option::is_none")]
    bill_addr: Option<RawAddress>,
    #[serde(rename = "ShipAddr", skip_serializing_if = "Option::is_none")]
    ship_addr: Option<RawAddress>,
    #[serde(rename = "TxnTaxDetail", skip_serializing_if = "Option::is_none")]
    txn_tax_detail: Option<RawTxnTaxDetail>,
    #[serde(rename = "CustomerMemo", skip_serializing_if = "Option::is_none")]
    customer_memo: Option<Memo>,
    #[serde(rename = "PONumber", skip_serializing_if = "Option::is_none")]
    po_number: Option<String>,
    #[serde(rename = "TotalAmt", skip_serializing_if = "Option::is_none")]
    total_amt: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryBody {
    #[serde(rename = "Customer", default)]
    customers: Vec<RawCustomer>,
    #[serde(rename = "Item", default)]
    items: Vec<RawItem>,
    #[serde(rename = "Invoice", default)]
    invoices: Vec<RawInvoice>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(rename = "QueryResponse", default)]
    body: QueryBody,
}

#[derive(Debug, Deserialize)]
struct ItemEnvelope {
    #[serde(rename = "Item")]
    item: RawItem,
}

#[derive(Debug, Deserialize)]
struct InvoiceEnvelope {
    #[serde(rename = "Invoice")]
    invoice: RawInvoice,
}

#[derive(Debug, Deserialize)]
struct CustomerEnvelope {
    #[serde(rename = "Customer")]
    customer: RawCustomer,
}

// ============================================================================
// Wire <-> internal conversion
// ============================================================================

fn customer_from_raw(raw: RawCustomer) -> QbCustomer {
    QbCustomer {
        id: raw.id,
        display_name: raw.display_name,
        email: raw.email.and_then(|e| e.address),
        active: raw.active,
    }
}

fn item_from_raw(raw: RawItem) -> QbItem {
    QbItem {
        id: raw.id.unwrap_or_default(),
        name: raw.name,
        sku: raw.sku,
        item_type: raw.item_type,
        active: raw.active,
    }
}

fn address_from_raw(raw: RawAddress) -> QbAddress {
    QbAddress {
        line1: raw.line1,
        line2: raw.line2,
        line3: raw.line3,
        city: raw.city,
        country_sub_division_code: raw.country_sub_division_code,
        postal_code: raw.postal_code,
        country: raw.country,
    }
}

fn address_to_raw(addr: &QbAddress) -> RawAddress {
    RawAddress {
        line1: addr.line1.clone(),
        line2: addr.line2.clone(),
        line3: addr.line3.clone(),
        city: addr.city.clone(),
        country_sub_division_code: addr.country_sub_division_code.clone(),
        postal_code: addr.postal_code.clone(),
        country: addr.country.clone(),
    }
}

fn invoice_from_raw(raw: RawInvoice) -> QbInvoice {
    let lines = raw
        .line
        .into_iter()
        .filter_map(|l| {
            // Subtotal/discount pseudo-lines come back from the API too.
            let detail = l.sales_item_line_detail?;
            Some(QbInvoiceLine {
                item_ref: detail.item_ref.value,
                item_name: detail.item_ref.name,
                description: l.description,
                quantity: detail.qty.unwrap_or(Decimal::ONE),
                unit_price: detail.unit_price.unwrap_or_default(),
                amount: l.amount,
                tax_code_ref: detail
                    .tax_code_ref
                    .map(|r| r.value)
                    .unwrap_or_default(),
            })
        })
        .collect();

    QbInvoice {
        id: raw.id,
        sync_token: raw.sync_token,
        doc_number: raw.doc_number,
        customer_ref: raw.customer_ref.value,
        txn_date: raw.txn_date,
        due_date: raw.due_date,
        lines,
        bill_addr: raw.bill_addr.map(address_from_raw),
        ship_addr: raw.ship_addr.map(address_from_raw),
        txn_tax_detail: raw.txn_tax_detail.map(|d| QbTxnTaxDetail {
            txn_tax_code_ref: d.txn_tax_code_ref.map(|r| r.value).unwrap_or_default(),
            total_tax: d.total_tax,
            tax_lines: d
                .tax_line
                .into_iter()
                .map(|t| QbTaxLine {
                    tax_rate_ref: t.tax_line_detail.tax_rate_ref.value,
                    amount: t.amount,
                    net_amount_taxable: t.tax_line_detail.net_amount_taxable.unwrap_or_default(),
                })
                .collect(),
        }),
        customer_memo: raw.customer_memo.map(|m| m.value),
        po_number: raw.po_number,
        total_amt: raw.total_amt,
    }
}

fn invoice_to_raw(invoice: &QbInvoice) -> RawInvoice {
    RawInvoice {
        id: invoice.id.clone(),
        sync_token: invoice.sync_token.clone(),
        doc_number: invoice.doc_number.clone(),
        customer_ref: Ref::new(invoice.customer_ref.clone()),
        txn_date: invoice.txn_date,
        due_date: invoice.due_date,
        line: invoice
            .lines
            .iter()
            .map(|l| RawLine {
                detail_type: "SalesItemLineDetail".to_string(),
                amount: l.amount,
                description: l.description.clone(),
                sales_item_line_detail: Some(RawSalesItemDetail {
                    item_ref: Ref::named(l.item_ref.clone(), l.item_name.clone()),
                    qty: Some(l.quantity),
                    unit_price: Some(l.unit_price),
                    tax_code_ref: if l.tax_code_ref.is_empty() {
                        None
                    } else {
                        Some(Ref::new(l.tax_code_ref.clone()))
                    },
                }),
            })
            .collect(),
        bill_addr: invoice.bill_addr.as_ref().map(address_to_raw),
        ship_addr: invoice.ship_addr.as_ref().map(address_to_raw),
        txn_tax_detail: invoice.txn_tax_detail.as_ref().map(|d| RawTxnTaxDetail {
            txn_tax_code_ref: Some(Ref::new(d.txn_tax_code_ref.clone())),
            total_tax: d.total_tax,
            tax_line: d
                .tax_lines
                .iter()
                .map(|t| RawTaxLine {
                    detail_type: "TaxLineDetail".to_string(),
                    amount: t.amount,
                    tax_line_detail: RawTaxLineDetail {
                        tax_rate_ref: Ref::new(t.tax_rate_ref.clone()),
                        net_amount_taxable: Some(t.net_amount_taxable),
                    },
                })
                .collect(),
        }),
        customer_memo: invoice
            .customer_memo
            .clone()
            .map(|value| Memo { value }),
        po_number: invoice.po_number.clone(),
        total_amt: None,
    }
}

/// Escape a string literal for the v3 query language.
fn escape_query_literal(s: &str) -> String {
    s.replace('\'', "\\'")
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// HTTP client for one QuickBooks company file.
pub struct QboClient {
    client: Client,
    base_url: String,
    realm_id: String,
    access_token: Option<String>,
    retry: RetryConfig,
}

impl QboClient {
    pub fn new(base_url: String, realm_id: String, access_token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            realm_id,
            access_token,
            retry: RetryConfig::default(),
        }
    }

    fn token(&self) -> Result<&str, AppError> {
        self.access_token
            .as_deref()
            .ok_or(AppError::ServiceUnavailable)
    }

    fn entity_url(&self, entity: &str) -> String {
        format!("{}/v3/company/{}/{}", self.base_url, self.realm_id, entity)
    }

    async fn query(&self, operation: &str, query: &str) -> Result<QueryBody, AppError> {
        let token = self.token()?;
        let url = format!("{}/v3/company/{}/query", self.base_url, self.realm_id);
        let timer = QB_REQUEST_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let response = retry_call(&self.retry, operation, || async {
            self.client
                .traced_get(&url)
                .bearer_auth(token)
                .query(&[("query", query)])
                .header("Accept", "application/json")
                .send()
                .await?
                .error_for_status()
        })
        .await?;

        let parsed = response.json::<QueryResponse>().await?;
        timer.observe_duration();
        Ok(parsed.body)
    }

    async fn post_entity<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        entity: &str,
        body: &serde_json::Value,
    ) -> Result<T, AppError> {
        let token = self.token()?;
        let url = self.entity_url(entity);
        let timer = QB_REQUEST_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let response = retry_call(&self.retry, operation, || async {
            self.client
                .traced_post(&url)
                .bearer_auth(token)
                .json(body)
                .header("Accept", "application/json")
                .send()
                .await?
                .error_for_status()
        })
        .await
        .map_err(|e| AppError::BadGateway(format!("QuickBooks {} failed: {}", operation, e)))?;

        let parsed = response.json::<T>().await?;
        timer.observe_duration();
        Ok(parsed)
    }
}

#[async_trait]
impl QuickBooks for QboClient {
    fn is_connected(&self) -> bool {
        self.access_token.is_some()
    }

    #[instrument(skip(self))]
    async fn query_customers(&self) -> Result<Vec<QbCustomer>, AppError> {
        let body = self
            .query(
                "query_customers",
                "select * from Customer maxresults 1000",
            )
            .await?;
        Ok(body.customers.into_iter().map(customer_from_raw).collect())
    }

    #[instrument(skip(self), fields(customer_id = %id))]
    async fn get_customer(&self, id: &str) -> Result<Option<QbCustomer>, AppError> {
        let token = self.token()?;
        let url = format!("{}/{}", self.entity_url("customer"), id);

        let response = self
            .client
            .traced_get(&url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope = response.error_for_status()?.json::<CustomerEnvelope>().await?;
        Ok(Some(customer_from_raw(envelope.customer)))
    }

    #[instrument(skip(self))]
    async fn query_items(&self) -> Result<Vec<QbItem>, AppError> {
        let body = self
            .query("query_items", "select * from Item maxresults 1000")
            .await?;
        Ok(body.items.into_iter().map(item_from_raw).collect())
    }

    #[instrument(skip(self), fields(item_name = %name))]
    async fn create_item(
        &self,
        name: &str,
        sku: Option<&str>,
        item_type: &str,
    ) -> Result<QbItem, AppError> {
        let payload = serde_json::json!({
            "Name": name,
            "Sku": sku,
            "Type": item_type,
            "IncomeAccountRef": { "value": "1" },
        });
        let envelope: ItemEnvelope = self.post_entity("create_item", "item", &payload).await?;
        Ok(item_from_raw(envelope.item))
    }

    #[instrument(skip(self), fields(doc_number = %doc_number))]
    async fn find_invoice_by_doc_number(
        &self,
        doc_number: &str,
    ) -> Result<Option<QbInvoice>, AppError> {
        let query = format!(
            "select * from Invoice where DocNumber = '{}'",
            escape_query_literal(doc_number)
        );
        let body = self.query("find_invoice", &query).await?;
        Ok(body.invoices.into_iter().next().map(invoice_from_raw))
    }

    #[instrument(skip(self))]
    async fn search_invoices(
        &self,
        doc_number_like: &str,
    ) -> Result<Vec<QbInvoice>, AppError> {
        let query = format!(
            "select * from Invoice where DocNumber like '%{}%' maxresults 100",
            escape_query_literal(doc_number_like)
        );
        let body = self.query("search_invoices", &query).await?;
        Ok(body.invoices.into_iter().map(invoice_from_raw).collect())
    }

    #[instrument(skip(self, invoice), fields(doc_number = ?invoice.doc_number))]
    async fn create_invoice(&self, invoice: &QbInvoice) -> Result<QbInvoice, AppError> {
        let raw = invoice_to_raw(invoice);
        let payload = serde_json::to_value(&raw)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid payload: {}", e)))?;
        let envelope: InvoiceEnvelope = self
            .post_entity("create_invoice", "invoice", &payload)
            .await?;
        Ok(invoice_from_raw(envelope.invoice))
    }

    #[instrument(skip(self, invoice), fields(qb_invoice_id = ?invoice.id))]
    async fn update_invoice(&self, invoice: &QbInvoice) -> Result<QbInvoice, AppError> {
        if invoice.id.is_none() || invoice.sync_token.is_none() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invoice update requires id and sync token"
            )));
        }
        let raw = invoice_to_raw(invoice);
        let mut payload = serde_json::to_value(&raw)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid payload: {}", e)))?;
        payload["sparse"] = serde_json::Value::Bool(false);
        let envelope: InvoiceEnvelope = self
            .post_entity("update_invoice", "invoice", &payload)
            .await?;
        Ok(invoice_from_raw(envelope.invoice))
    }

    #[instrument(skip(self), fields(qb_invoice_id = %id))]
    async fn get_invoice(&self, id: &str) -> Result<Option<QbInvoice>, AppError> {
        let token = self.token()?;
        let url = format!("{}/{}", self.entity_url("invoice"), id);

        let response = self
            .client
            .traced_get(&url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope = response.error_for_status()?.json::<InvoiceEnvelope>().await?;
        Ok(Some(invoice_from_raw(envelope.invoice)))
    }
}
