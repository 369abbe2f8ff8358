//! Configuration module for qbsync-service.

use rust_decimal::Decimal;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct QbsyncConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
    pub quickbooks: QuickBooksConfig,
    pub tax: TaxSettings,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct QuickBooksConfig {
    pub base_url: String,
    pub realm_id: String,
    /// Absent until the company connection is established.
    pub access_token: Option<String>,
}

/// Jurisdiction tax overrides. Rates default to Quebec GST/QST.
#[derive(Debug, Clone)]
pub struct TaxSettings {
    pub gst_rate: Option<Decimal>,
    pub qst_rate: Option<Decimal>,
    pub gst_rate_ref: Option<String>,
    pub qst_rate_ref: Option<String>,
    pub taxable_code_ref: Option<String>,
}

fn decimal_var(name: &str) -> Option<Decimal> {
    env::var(name).ok().and_then(|s| Decimal::from_str(&s).ok())
}

impl QbsyncConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "qbsync-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            ledger: LedgerConfig {
                url: env::var("LEDGER_SERVICE_URL")
                    .unwrap_or_else(|_| "http://ledger-service:3001".to_string()),
            },
            quickbooks: QuickBooksConfig {
                base_url: env::var("QB_BASE_URL")
                    .unwrap_or_else(|_| "https://quickbooks.api.intuit.com".to_string()),
                realm_id: env::var("QB_REALM_ID").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("QB_REALM_ID is required"))
                })?,
                access_token: env::var("QB_ACCESS_TOKEN").ok(),
            },
            tax: TaxSettings {
                gst_rate: decimal_var("TAX_GST_RATE"),
                qst_rate: decimal_var("TAX_QST_RATE"),
                gst_rate_ref: env::var("TAX_GST_RATE_REF").ok(),
                qst_rate_ref: env::var("TAX_QST_RATE_REF").ok(),
                taxable_code_ref: env::var("TAX_CODE_REF").ok(),
            },
        })
    }

    /// Materialize tax settings, falling back to jurisdiction defaults.
    pub fn tax_config(&self) -> crate::services::TaxConfig {
        let defaults = crate::services::TaxConfig::default();
        crate::services::TaxConfig {
            gst_rate: self.tax.gst_rate.unwrap_or(defaults.gst_rate),
            qst_rate: self.tax.qst_rate.unwrap_or(defaults.qst_rate),
            gst_rate_ref: self
                .tax
                .gst_rate_ref
                .clone()
                .unwrap_or(defaults.gst_rate_ref),
            qst_rate_ref: self
                .tax
                .qst_rate_ref
                .clone()
                .unwrap_or(defaults.qst_rate_ref),
            taxable_code_ref: self
                .tax
                .taxable_code_ref
                .clone()
                .unwrap_or(defaults.taxable_code_ref),
        }
    }
}
