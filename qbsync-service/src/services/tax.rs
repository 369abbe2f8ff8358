//! GST/QST computation for the operating jurisdiction.
//!
//! QuickBooks does not reliably apply tax from a TxnTaxCodeRef alone on
//! update operations, so the engine always computes and sends the full
//! itemized detail. Each component is rounded to cents independently.

use crate::models::{QbTaxLine, QbTxnTaxDetail};
use rust_decimal::{Decimal, RoundingStrategy};

/// Jurisdiction tax settings. Defaults are Quebec GST (5%) and QST
/// (9.975%) with the standard combined taxable code.
#[derive(Debug, Clone)]
pub struct TaxConfig {
    pub gst_rate: Decimal,
    pub qst_rate: Decimal,
    /// QuickBooks TaxRate id for the GST component.
    pub gst_rate_ref: String,
    /// QuickBooks TaxRate id for the QST component.
    pub qst_rate_ref: String,
    /// QuickBooks TaxCode id for "taxable", attached to every line.
    pub taxable_code_ref: String,
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self {
            gst_rate: Decimal::new(5, 2),       // 0.05
            qst_rate: Decimal::new(9975, 5),    // 0.09975
            gst_rate_ref: "5".to_string(),
            qst_rate_ref: "6".to_string(),
            taxable_code_ref: "TAX".to_string(),
        }
    }
}

/// Both jurisdiction components plus their sum, each rounded to cents.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxBreakdown {
    pub gst: Decimal,
    pub qst: Decimal,
    pub total: Decimal,
}

fn round_cents(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute GST and QST on a subtotal, rounding each component to cents
/// independently before summing.
pub fn compute_tax(config: &TaxConfig, subtotal: Decimal) -> TaxBreakdown {
    let gst = round_cents(subtotal * config.gst_rate);
    let qst = round_cents(subtotal * config.qst_rate);
    TaxBreakdown {
        gst,
        qst,
        total: gst + qst,
    }
}

/// Build the itemized tax detail attached to every outgoing invoice.
pub fn build_tax_detail(config: &TaxConfig, subtotal: Decimal) -> QbTxnTaxDetail {
    let breakdown = compute_tax(config, subtotal);
    QbTxnTaxDetail {
        txn_tax_code_ref: config.taxable_code_ref.clone(),
        total_tax: breakdown.total,
        tax_lines: vec![
            QbTaxLine {
                tax_rate_ref: config.gst_rate_ref.clone(),
                amount: breakdown.gst,
                net_amount_taxable: subtotal,
            },
            QbTaxLine {
                tax_rate_ref: config.qst_rate_ref.clone(),
                amount: breakdown.qst,
                net_amount_taxable: subtotal,
            },
        ],
    }
}
