//! Customer and SKU mapping models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Customer mapping lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    Proposed,
    Approved,
    Rejected,
    NeedsReview,
}

impl MappingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::NeedsReview => "needs_review",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            "needs_review" => Self::NeedsReview,
            _ => Self::Proposed,
        }
    }

    /// Human-decided rows that batch matching must never clobber.
    pub fn is_decided(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// SKU mapping lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkuMappingStatus {
    Proposed,
    Approved,
    Rejected,
    NeedsCreation,
}

impl SkuMappingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::NeedsCreation => "needs_creation",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            "needs_creation" => Self::NeedsCreation,
            _ => Self::Proposed,
        }
    }
}

/// How a customer mapping was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerMatchMethod {
    OrgCode,
    FuzzyName,
    Manual,
    NoMatch,
}

impl CustomerMatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrgCode => "org_code",
            Self::FuzzyName => "fuzzy_name",
            Self::Manual => "manual",
            Self::NoMatch => "no_match",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "org_code" => Self::OrgCode,
            "fuzzy_name" => Self::FuzzyName,
            "manual" => Self::Manual,
            _ => Self::NoMatch,
        }
    }
}

/// How a SKU match was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkuMatchMethod {
    ExactCode,
    ExactName,
    FuzzyName,
    NoMatch,
}

impl SkuMatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactCode => "exact_code",
            Self::ExactName => "exact_name",
            Self::FuzzyName => "fuzzy_name",
            Self::NoMatch => "no_match",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "exact_code" => Self::ExactCode,
            "exact_name" => Self::ExactName,
            "fuzzy_name" => Self::FuzzyName,
            _ => Self::NoMatch,
        }
    }
}

/// Per-factor sub-scores behind a customer match confidence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchFactors {
    pub code_match: bool,
    pub name_similarity: f64,
    pub token_similarity: f64,
}

/// One row of the customer mapping table. Identity is
/// `(organization_id, manager_id)`; `manager_id` of `""` means "no manager
/// distinction".
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CustomerMapping {
    pub id: i64,
    pub organization_id: String,
    pub manager_id: String,
    pub organization_name: String,
    pub manager_name: Option<String>,
    pub manager_email: Option<String>,
    pub qb_customer_id: Option<String>,
    pub qb_customer_name: Option<String>,
    pub qb_customer_email: Option<String>,
    pub status: String,
    pub confidence: f64,
    pub match_method: String,
    #[sqlx(json)]
    pub factors: MatchFactors,
    pub reviewed_by: Option<String>,
    pub reviewed_utc: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl CustomerMapping {
    pub fn mapping_status(&self) -> MappingStatus {
        MappingStatus::from_str(&self.status)
    }
}

/// Input for upserting a customer mapping row.
#[derive(Debug, Clone)]
pub struct NewCustomerMapping {
    pub organization_id: String,
    pub manager_id: String,
    pub organization_name: String,
    pub manager_name: Option<String>,
    pub manager_email: Option<String>,
    pub qb_customer_id: Option<String>,
    pub qb_customer_name: Option<String>,
    pub qb_customer_email: Option<String>,
    pub status: MappingStatus,
    pub confidence: f64,
    pub match_method: CustomerMatchMethod,
    pub factors: MatchFactors,
}

/// One row of the SKU mapping table, keyed by ledger SKU code (SKU id when
/// the code is absent).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SkuMapping {
    pub id: i64,
    pub sku_code: String,
    pub sku_name: String,
    pub qb_item_id: Option<String>,
    pub qb_item_name: Option<String>,
    pub qb_item_type: Option<String>,
    pub status: String,
    pub confidence: f64,
    pub match_method: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl SkuMapping {
    pub fn mapping_status(&self) -> SkuMappingStatus {
        SkuMappingStatus::from_str(&self.status)
    }

    /// Approved and pointing at a concrete QB item.
    pub fn sync_ready(&self) -> bool {
        self.mapping_status() == SkuMappingStatus::Approved && self.qb_item_id.is_some()
    }
}

/// Input for upserting a SKU mapping row.
#[derive(Debug, Clone)]
pub struct NewSkuMapping {
    pub sku_code: String,
    pub sku_name: String,
    pub qb_item_id: Option<String>,
    pub qb_item_name: Option<String>,
    pub qb_item_type: Option<String>,
    pub status: SkuMappingStatus,
    pub confidence: f64,
    pub match_method: SkuMatchMethod,
}
