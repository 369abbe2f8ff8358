//! Invoice validation state and audit log models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Validation state machine. `pending` is implicit (no row yet); `synced`
/// is set only by the sync engine and never reverted by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Ready,
    Blocked,
    Synced,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Blocked => "blocked",
            Self::Synced => "synced",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "ready" => Self::Ready,
            "blocked" => Self::Blocked,
            "synced" => Self::Synced,
            _ => Self::Pending,
        }
    }
}

/// Severity of a blocking issue. Errors block sync; warnings do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
}

/// Stable issue codes surfaced to reviewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueCode {
    #[serde(rename = "CUSTOMER_NO_ORG")]
    CustomerNoOrg,
    #[serde(rename = "CUSTOMER_NO_MAPPING")]
    CustomerNoMapping,
    #[serde(rename = "CUSTOMER_NOT_APPROVED")]
    CustomerNotApproved,
    #[serde(rename = "CUSTOMER_NO_QB_LINK")]
    CustomerNoQbLink,
    #[serde(rename = "SKU_NO_MAPPING")]
    SkuNoMapping,
    #[serde(rename = "SKU_NEEDS_CREATION")]
    SkuNeedsCreation,
    #[serde(rename = "SKU_NOT_APPROVED")]
    SkuNotApproved,
    #[serde(rename = "INVOICE_DRAFT")]
    InvoiceDraft,
    #[serde(rename = "INVOICE_CANCELLED")]
    InvoiceCancelled,
    #[serde(rename = "INVOICE_INVALID_STATUS")]
    InvoiceInvalidStatus,
    #[serde(rename = "MISSING_LINE_ITEMS")]
    MissingLineItems,
    #[serde(rename = "MISSING_INVOICE_NUMBER")]
    MissingInvoiceNumber,
    #[serde(rename = "ZERO_TOTAL")]
    ZeroTotal,
}

/// A typed reason an invoice cannot (or should be reviewed before it can)
/// sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingIssue {
    pub code: IssueCode,
    pub severity: IssueSeverity,
    pub message: String,
    /// Offending SKU codes, for the SKU-scoped issues.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skus: Vec<String>,
}

impl BlockingIssue {
    pub fn error(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: IssueSeverity::Error,
            message: message.into(),
            skus: Vec::new(),
        }
    }

    pub fn warning(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: IssueSeverity::Warning,
            message: message.into(),
            skus: Vec::new(),
        }
    }

    pub fn with_skus(mut self, skus: Vec<String>) -> Self {
        self.skus = skus;
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == IssueSeverity::Error
    }
}

/// One row of the invoice validation table, keyed by ledger invoice id.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InvoiceValidation {
    pub id: i64,
    pub invoice_id: String,
    pub invoice_number: Option<String>,
    pub status: String,
    pub customer_mapping_ok: bool,
    pub skus_mapped: bool,
    #[sqlx(json)]
    pub issues: Vec<BlockingIssue>,
    pub confidence: f64,
    pub ready_for_sync: bool,
    pub approved_by: Option<String>,
    pub approved_utc: Option<DateTime<Utc>>,
    pub qb_invoice_id: Option<String>,
    pub synced_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl InvoiceValidation {
    pub fn validation_status(&self) -> ValidationStatus {
        ValidationStatus::from_str(&self.status)
    }
}

/// The pure result of evaluating one invoice against current mappings.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub status: ValidationStatus,
    pub customer_mapping_ok: bool,
    pub skus_mapped: bool,
    pub issues: Vec<BlockingIssue>,
    pub confidence: f64,
    pub ready_for_sync: bool,
}

/// Input for persisting a validation result.
#[derive(Debug, Clone)]
pub struct NewValidation {
    pub invoice_id: String,
    pub invoice_number: Option<String>,
    pub outcome: ValidationOutcome,
}

/// One candidate considered during a matching run, kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub id: String,
    pub name: String,
    pub score: f64,
    pub method: String,
}

/// Append-only audit row for a matching/validation execution.
#[derive(Debug, Clone)]
pub struct MatchLogEntry {
    pub entity_type: String,
    pub entity_id: String,
    pub algorithm_version: String,
    pub candidate_count: i32,
    pub best_match_id: Option<String>,
    pub best_match_score: Option<f64>,
    pub candidates: Vec<MatchCandidate>,
    pub criteria: String,
    pub execution_ms: i64,
}
